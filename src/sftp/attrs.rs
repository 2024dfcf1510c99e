use super::buffer::{InputBuffer, OutputBuffer};
use super::constants::*;
use super::error::EngineError;
use nix::sys::stat::{FileStat, Mode};
use nix::sys::time::{TimeVal, TimeValLike};

/// The SFTP v3 ATTRS structure: a flags bitmap plus the field groups the
/// flags declare. Absent groups are absent, not zero. Extended attribute
/// pairs are consumed on decode and discarded; encode never produces them.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FileAttributes {
    pub size: Option<u64>,
    pub uid_gid: Option<(u32, u32)>,
    pub permissions: Option<u32>,
    /// (atime, mtime), seconds since the epoch
    pub times: Option<(u32, u32)>,
}

impl FileAttributes {
    pub fn flags(&self) -> u32 {
        let mut flags = 0;
        if self.size.is_some() {
            flags |= SSH_FILEXFER_ATTR_SIZE;
        }
        if self.uid_gid.is_some() {
            flags |= SSH_FILEXFER_ATTR_UIDGID;
        }
        if self.permissions.is_some() {
            flags |= SSH_FILEXFER_ATTR_PERMISSIONS;
        }
        if self.times.is_some() {
            flags |= SSH_FILEXFER_ATTR_ACMODTIME;
        }
        flags
    }

    pub fn decode(input: &mut InputBuffer) -> Result<Self, EngineError> {
        let flags = input.read_u32()?;
        let mut attrs = FileAttributes::default();

        if flags & SSH_FILEXFER_ATTR_SIZE != 0 {
            attrs.size = Some(input.read_u64()?);
        }
        if flags & SSH_FILEXFER_ATTR_UIDGID != 0 {
            let uid = input.read_u32()?;
            let gid = input.read_u32()?;
            attrs.uid_gid = Some((uid, gid));
        }
        if flags & SSH_FILEXFER_ATTR_PERMISSIONS != 0 {
            attrs.permissions = Some(input.read_u32()?);
        }
        if flags & SSH_FILEXFER_ATTR_ACMODTIME != 0 {
            let atime = input.read_u32()?;
            let mtime = input.read_u32()?;
            attrs.times = Some((atime, mtime));
        }
        if flags & SSH_FILEXFER_ATTR_EXTENDED != 0 {
            // Discard (type, data) pairs; we store nothing for them
            let count = input.read_u32()?;
            for _ in 0..count {
                input.read_string()?;
                input.read_string()?;
            }
        }
        Ok(attrs)
    }

    pub fn encode(&self, out: &mut OutputBuffer) -> Result<(), EngineError> {
        out.write_u32(self.flags())?;
        if let Some(size) = self.size {
            out.write_u64(size)?;
        }
        if let Some((uid, gid)) = self.uid_gid {
            out.write_u32(uid)?;
            out.write_u32(gid)?;
        }
        if let Some(permissions) = self.permissions {
            out.write_u32(permissions)?;
        }
        if let Some((atime, mtime)) = self.times {
            out.write_u32(atime)?;
            out.write_u32(mtime)?;
        }
        Ok(())
    }

    /// All four groups, as replies to the stat family carry them.
    pub fn from_stat(st: &FileStat) -> Self {
        FileAttributes {
            size: Some(st.st_size as u64),
            uid_gid: Some((st.st_uid, st.st_gid)),
            permissions: Some(st.st_mode as u32),
            times: Some((st.st_atime as u32, st.st_mtime as u32)),
        }
    }

    /// The client-supplied mode for OPEN/MKDIR, masked to the permission
    /// bits, or `default` when the permissions group is absent.
    pub fn mode_or(&self, default: u32) -> Mode {
        let bits = match self.permissions {
            Some(permissions) => permissions & PERM_MASK,
            None => default,
        };
        Mode::from_bits_truncate(bits as _)
    }

    /// (atime, mtime) as timevals for utimes/futimes, usec always zero.
    pub fn timevals(&self) -> (TimeVal, TimeVal) {
        let (atime, mtime) = self.times.unwrap_or((0, 0));
        (TimeVal::seconds(atime as i64), TimeVal::seconds(mtime as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(attrs: &FileAttributes) -> FileAttributes {
        let mut out = OutputBuffer::new();
        attrs.encode(&mut out).unwrap();
        let mut input = InputBuffer::new();
        input.load(out.as_slice()).unwrap();
        let decoded = FileAttributes::decode(&mut input).unwrap();
        assert_eq!(input.remaining(), 0);
        decoded
    }

    #[test]
    fn test_round_trip_all_groups() {
        let attrs = FileAttributes {
            size: Some(0xDEAD_BEEF_0000_0001),
            uid_gid: Some((1000, 100)),
            permissions: Some(0o100644),
            times: Some((1_400_000_000, 1_500_000_000)),
        };
        assert_eq!(round_trip(&attrs), attrs);
        assert_eq!(attrs.flags(), 0x0F);
    }

    #[test]
    fn test_round_trip_each_group_alone() {
        let cases = [
            FileAttributes { size: Some(7), ..Default::default() },
            FileAttributes { uid_gid: Some((0, 0)), ..Default::default() },
            FileAttributes { permissions: Some(0o755), ..Default::default() },
            FileAttributes { times: Some((1, 2)), ..Default::default() },
            FileAttributes::default(),
        ];
        for attrs in &cases {
            assert_eq!(&round_trip(attrs), attrs);
        }
    }

    #[test]
    fn test_decode_discards_extended_pairs() {
        let mut out = OutputBuffer::new();
        out.write_u32(SSH_FILEXFER_ATTR_SIZE | SSH_FILEXFER_ATTR_EXTENDED)
            .unwrap();
        out.write_u64(42).unwrap();
        out.write_u32(2).unwrap();
        out.write_string(b"ext@example").unwrap();
        out.write_string(b"value1").unwrap();
        out.write_string(b"other@example").unwrap();
        out.write_string(b"value2").unwrap();

        let mut input = InputBuffer::new();
        input.load(out.as_slice()).unwrap();
        let attrs = FileAttributes::decode(&mut input).unwrap();
        assert_eq!(attrs.size, Some(42));
        assert_eq!(attrs.uid_gid, None);
        // Pairs fully consumed
        assert_eq!(input.remaining(), 0);
        // And never re-emitted
        assert_eq!(attrs.flags(), SSH_FILEXFER_ATTR_SIZE);
    }

    #[test]
    fn test_encoded_size_never_exceeds_max() {
        let attrs = FileAttributes {
            size: Some(u64::MAX),
            uid_gid: Some((u32::MAX, u32::MAX)),
            permissions: Some(u32::MAX),
            times: Some((u32::MAX, u32::MAX)),
        };
        let mut out = OutputBuffer::new();
        attrs.encode(&mut out).unwrap();
        assert_eq!(out.written(), MAX_ATTRS_BYTES);
    }

    #[test]
    fn test_mode_defaults() {
        let attrs = FileAttributes::default();
        assert_eq!(attrs.mode_or(DEFAULT_FILE_PERM), Mode::from_bits_truncate(0o666));

        let attrs = FileAttributes {
            permissions: Some(0o100640),
            ..Default::default()
        };
        // Only permission bits survive
        assert_eq!(attrs.mode_or(DEFAULT_FILE_PERM), Mode::from_bits_truncate(0o640));
    }

    #[test]
    fn test_timevals() {
        let attrs = FileAttributes {
            times: Some((100, 200)),
            ..Default::default()
        };
        let (atime, mtime) = attrs.timevals();
        assert_eq!(atime.tv_sec(), 100);
        assert_eq!(atime.tv_usec(), 0);
        assert_eq!(mtime.tv_sec(), 200);
        assert_eq!(mtime.tv_usec(), 0);
    }
}
