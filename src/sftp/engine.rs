use super::attrs::FileAttributes;
use super::buffer::{InputBuffer, OutputBuffer};
use super::constants::*;
use super::error::{EngineError, Status};
use super::handles::{DirEntry, HandleSlot, HandleTable};
use super::transport;
use log::{debug, warn};
use nix::dir::{Dir, OwningIter};
use nix::fcntl::{open, readlink, renameat, AtFlags, OFlag};
use nix::sys::stat::{fchmod, fchmodat, fstat, fstatat, futimens, lstat, stat, utimes, FchmodatFlags, Mode};
use nix::sys::time::{TimeSpec, TimeValLike};
use nix::unistd::{chown, close, fchown, lseek, mkdir, read, symlinkat, unlink, unlinkat, write, Gid, Uid, UnlinkatFlags, Whence};
use std::ffi::OsStr;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::os::unix::io::{AsRawFd, RawFd};

// DATA reply overhead in front of the payload: opcode, id, byte count
const DATA_HDR: usize = 1 + 4 + 4;

/// The request/response engine: one of these per session, owning the packet
/// buffers, the handle table and the init flag. Requests are handled one at
/// a time; each produces at most one reply, fully written before the next
/// request is read.
pub struct Engine {
    input: InputBuffer,
    output: OutputBuffer,
    handles: HandleTable,
    initialized: bool,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            input: InputBuffer::new(),
            output: OutputBuffer::new(),
            handles: HandleTable::new(),
            initialized: false,
        }
    }

    /// Serve requests from stdin to stdout until the peer closes the
    /// stream. Ok means an orderly close at a frame boundary.
    pub fn run(&mut self) -> Result<(), EngineError> {
        loop {
            match transport::read_frame(&mut self.input)? {
                None => return Ok(()),
                Some(payload_len) => {
                    if self.process(payload_len)? {
                        transport::write_frame(self.output.as_slice())?;
                    }
                }
            }
        }
    }

    /// Feed one request payload (no outer length word) through the engine,
    /// returning the complete reply frame, or None when the request
    /// produces no reply. This is the transportless entry point tests and
    /// embedders use.
    pub fn handle_frame(&mut self, payload: &[u8]) -> Result<Option<&[u8]>, EngineError> {
        self.input.load(payload)?;
        if self.process(payload.len() as u32)? {
            Ok(Some(self.output.as_slice()))
        } else {
            Ok(None)
        }
    }

    /// Dispatch the loaded request and finalize the reply frame: the outer
    /// length is written last, into the slot reserved for it up front.
    /// Returns whether there is a reply to send. Zero-length requests are
    /// silently discarded.
    fn process(&mut self, payload_len: u32) -> Result<bool, EngineError> {
        self.output.reset();
        let mut frame_mark = self.output.mark();
        self.output.write_u32(0)?;
        if payload_len > 0 {
            self.dispatch()?;
        }
        let total = self.output.written();
        if total <= 4 {
            return Ok(false);
        }
        self.output.swap(&mut frame_mark);
        self.output.write_u32((total - 4) as u32)?;
        self.output.swap(&mut frame_mark);
        Ok(true)
    }

    fn dispatch(&mut self) -> Result<(), EngineError> {
        let opcode = self.input.read_byte()?;
        debug!("request opcode {}", opcode);

        if !self.initialized {
            if opcode != SSH_FXP_INIT {
                return Err(EngineError::ProtocolViolation("first packet must be INIT"));
            }
            self.handle_init()?;
            self.initialized = true;
            return Ok(());
        }
        match opcode {
            SSH_FXP_INIT => Err(EngineError::ProtocolViolation("INIT received twice")),
            SSH_FXP_OPEN => self.handle_open(),
            SSH_FXP_CLOSE => self.handle_close(),
            SSH_FXP_READ => self.handle_read(),
            SSH_FXP_WRITE => self.handle_write(),
            SSH_FXP_LSTAT => self.handle_stat_common(false),
            SSH_FXP_FSTAT => self.handle_fstat(),
            SSH_FXP_SETSTAT => self.handle_setstat(),
            SSH_FXP_FSETSTAT => self.handle_fsetstat(),
            SSH_FXP_OPENDIR => self.handle_opendir(),
            SSH_FXP_READDIR => self.handle_readdir(),
            SSH_FXP_REMOVE => self.handle_remove(),
            SSH_FXP_MKDIR => self.handle_mkdir(),
            SSH_FXP_RMDIR => self.handle_rmdir(),
            SSH_FXP_REALPATH => self.handle_realpath(),
            SSH_FXP_STAT => self.handle_stat_common(true),
            SSH_FXP_RENAME => self.handle_rename(),
            SSH_FXP_READLINK => self.handle_readlink(),
            SSH_FXP_SYMLINK => self.handle_symlink(),
            _ => {
                // Every non-INIT request starts with an id; echo it back
                let Self { input, output, .. } = self;
                let id = input.read_u32()?;
                put_status(output, id, Status::OpUnsupported)
            }
        }
    }

    fn handle_init(&mut self) -> Result<(), EngineError> {
        let version = self.input.read_u32()?;
        if version < SFTP_SUPPORTED_VERSION {
            return Err(EngineError::ProtocolViolation("client protocol version too old"));
        }
        self.output.write_byte(SSH_FXP_VERSION)?;
        // No extension pairs
        self.output.write_u32(SFTP_SUPPORTED_VERSION)
    }

    fn handle_open(&mut self) -> Result<(), EngineError> {
        let Self { input, output, handles, .. } = self;
        let id = input.read_u32()?;
        let path = input.read_string()?;
        let pflags = input.read_u32()?;
        let attrs = FileAttributes::decode(input)?;

        let flags = pflags_to_oflag(pflags);
        let mode = attrs.mode_or(DEFAULT_FILE_PERM);
        let status = match open(&path[..], flags, mode) {
            Err(errno) => errno.into(),
            Ok(fd) => match handles.alloc(HandleSlot::File { fd }) {
                Some(handle) => return put_handle(output, id, handle),
                None => {
                    let _ = close(fd);
                    Status::Failure
                }
            },
        };
        put_status(output, id, status)
    }

    fn handle_close(&mut self) -> Result<(), EngineError> {
        let Self { input, output, handles, .. } = self;
        let id = input.read_u32()?;
        let wire = input.read_string()?;

        let status = match handles.take(&wire) {
            None => Status::Failure,
            Some(HandleSlot::File { fd }) => match close(fd) {
                Ok(()) => Status::Ok,
                Err(errno) => errno.into(),
            },
            Some(HandleSlot::Dir { fd, entries, .. }) => {
                // Dropping the stream would close the descriptor too, but
                // with no way to report a failure; close it ourselves first
                let status = match close(fd) {
                    Ok(()) => Status::Ok,
                    Err(errno) => errno.into(),
                };
                drop(entries);
                status
            }
        };
        put_status(output, id, status)
    }

    fn handle_read(&mut self) -> Result<(), EngineError> {
        let Self { input, output, handles, .. } = self;
        let id = input.read_u32()?;
        let wire = input.read_string()?;
        let offset = input.read_u64()?;
        let len = input.read_u32()? as usize;

        // Cap the read so the DATA reply fits the output packet
        let len = len.min(output.remaining() - DATA_HDR);
        let status = match handles.resolve(&wire) {
            Some(HandleSlot::File { fd }) => {
                let fd = *fd;
                match lseek(fd, offset as i64, Whence::SeekSet) {
                    Err(errno) => errno.into(),
                    Ok(_) => {
                        // Pull the file bytes straight into the reply's
                        // payload slot, then write the header over the gap
                        let slot = output.tail_mut(DATA_HDR, len)?;
                        match read(fd, slot) {
                            Err(errno) => errno.into(),
                            Ok(0) => Status::Eof,
                            Ok(count) => {
                                output.write_byte(SSH_FXP_DATA)?;
                                output.write_u32(id)?;
                                output.write_u32(count as u32)?;
                                return output.advance(count);
                            }
                        }
                    }
                }
            }
            _ => Status::Failure,
        };
        put_status(output, id, status)
    }

    fn handle_write(&mut self) -> Result<(), EngineError> {
        let Self { input, output, handles, .. } = self;
        let id = input.read_u32()?;
        let wire = input.read_string()?;
        let offset = input.read_u64()?;
        let data = input.read_data()?;

        let status = match handles.resolve(&wire) {
            Some(HandleSlot::File { fd }) => {
                let fd = *fd;
                match lseek(fd, offset as i64, Whence::SeekSet) {
                    Err(errno) => errno.into(),
                    Ok(_) => match write(fd, data) {
                        Err(errno) => errno.into(),
                        // A short write is a failure; the client reissues
                        Ok(count) if count == data.len() => Status::Ok,
                        Ok(_) => Status::Failure,
                    },
                }
            }
            _ => Status::Failure,
        };
        put_status(output, id, status)
    }

    fn handle_stat_common(&mut self, follow_symlinks: bool) -> Result<(), EngineError> {
        let Self { input, output, .. } = self;
        let id = input.read_u32()?;
        let path = input.read_string()?;

        let result = if follow_symlinks {
            stat(&path[..])
        } else {
            lstat(&path[..])
        };
        match result {
            Err(errno) => put_status(output, id, errno.into()),
            Ok(st) => {
                output.write_byte(SSH_FXP_ATTRS)?;
                output.write_u32(id)?;
                FileAttributes::from_stat(&st).encode(output)
            }
        }
    }

    fn handle_fstat(&mut self) -> Result<(), EngineError> {
        let Self { input, output, handles, .. } = self;
        let id = input.read_u32()?;
        let wire = input.read_string()?;

        let status = match handles.resolve(&wire) {
            Some(HandleSlot::File { fd }) => match fstat(*fd) {
                Err(errno) => errno.into(),
                Ok(st) => {
                    output.write_byte(SSH_FXP_ATTRS)?;
                    output.write_u32(id)?;
                    return FileAttributes::from_stat(&st).encode(output);
                }
            },
            _ => Status::Failure,
        };
        put_status(output, id, status)
    }

    fn handle_setstat(&mut self) -> Result<(), EngineError> {
        let Self { input, output, .. } = self;
        let id = input.read_u32()?;
        let path = input.read_string()?;
        let attrs = FileAttributes::decode(input)?;

        // Apply in fixed order; the first failing step is reported and the
        // rest are not attempted
        if let Some(permissions) = attrs.permissions {
            let mode = Mode::from_bits_truncate((permissions & PERM_MASK) as _);
            if let Err(errno) = fchmodat(None, &path[..], mode, FchmodatFlags::FollowSymlink) {
                return put_status(output, id, errno.into());
            }
        }
        if attrs.times.is_some() {
            let (atime, mtime) = attrs.timevals();
            if let Err(errno) = utimes(&path[..], &atime, &mtime) {
                return put_status(output, id, errno.into());
            }
        }
        if let Some((uid, gid)) = attrs.uid_gid {
            let result = chown(&path[..], Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid)));
            if let Err(errno) = result {
                return put_status(output, id, errno.into());
            }
        }
        put_status(output, id, Status::Ok)
    }

    fn handle_fsetstat(&mut self) -> Result<(), EngineError> {
        let Self { input, output, handles, .. } = self;
        let id = input.read_u32()?;
        let wire = input.read_string()?;
        let attrs = FileAttributes::decode(input)?;

        let fd = match handles.resolve(&wire) {
            Some(HandleSlot::File { fd }) => *fd,
            _ => return put_status(output, id, Status::Failure),
        };
        if let Some(permissions) = attrs.permissions {
            let mode = Mode::from_bits_truncate((permissions & PERM_MASK) as _);
            if let Err(errno) = fchmod(fd, mode) {
                return put_status(output, id, errno.into());
            }
        }
        if attrs.times.is_some() {
            let (atime, mtime) = attrs.timevals();
            let (atime, mtime) = (TimeSpec::seconds(atime.tv_sec()), TimeSpec::seconds(mtime.tv_sec()));
            if let Err(errno) = futimens(fd, &atime, &mtime) {
                return put_status(output, id, errno.into());
            }
        }
        if let Some((uid, gid)) = attrs.uid_gid {
            let result = fchown(fd, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid)));
            if let Err(errno) = result {
                return put_status(output, id, errno.into());
            }
        }
        put_status(output, id, Status::Ok)
    }

    fn handle_opendir(&mut self) -> Result<(), EngineError> {
        let Self { input, output, handles, .. } = self;
        let id = input.read_u32()?;
        let path = input.read_string()?;

        // Keep both the descriptor and the entry stream: the descriptor
        // lets READDIR stat entries relative to the directory instead of
        // concatenating paths
        let fd = match open(&path[..], OFlag::O_RDONLY, Mode::empty()) {
            Err(errno) => return put_status(output, id, errno.into()),
            Ok(fd) => fd,
        };
        match Dir::from_fd(fd) {
            Err(errno) => {
                let _ = close(fd);
                put_status(output, id, errno.into())
            }
            Ok(dir) => {
                let dirfd = dir.as_raw_fd();
                let slot = HandleSlot::Dir {
                    fd: dirfd,
                    entries: dir.into_iter(),
                    pending: None,
                };
                match handles.alloc(slot) {
                    Some(handle) => put_handle(output, id, handle),
                    None => put_status(output, id, Status::Failure),
                }
            }
        }
    }

    fn handle_readdir(&mut self) -> Result<(), EngineError> {
        let Self { input, output, handles, .. } = self;
        let id = input.read_u32()?;
        let wire = input.read_string()?;

        let (dirfd, entries, pending) = match handles.resolve(&wire) {
            Some(HandleSlot::Dir { fd, entries, pending }) => (*fd, entries, pending),
            _ => return put_status(output, id, Status::Failure),
        };

        // Write the NAME packet as if entries will follow; the saved marks
        // let us patch the count afterwards, or scrap the whole packet for
        // a STATUS when the stream is dry
        let packet_mark = output.mark();
        output.write_byte(SSH_FXP_NAME)?;
        output.write_u32(id)?;
        let mut count_mark = output.mark();
        output.write_u32(0)?;
        let mut count: u32 = 0;

        loop {
            let entry = match pending.take() {
                Some(entry) => entry,
                None => match next_entry(dirfd, entries) {
                    Some(entry) => entry,
                    None => break,
                },
            };
            let worst_case = (4 + entry.name.len()) * 2 + MAX_ATTRS_BYTES;
            if worst_case <= output.remaining() {
                output.write_string(&entry.name)?;
                // longname: same text, no ls -l dressing
                output.write_string(&entry.name)?;
                FileAttributes::from_stat(&entry.stat).encode(output)?;
                count += 1;
            } else if count > 0 {
                // Out of room; park the entry to lead the next reply
                *pending = Some(entry);
                break;
            } else {
                // Too long to fit even an empty packet; listing nothing at
                // all would be less helpful than leaving it out
                warn!("skipping unreportable directory entry of {} bytes", entry.name.len());
            }
        }

        if count > 0 {
            output.swap(&mut count_mark);
            output.write_u32(count)?;
            output.swap(&mut count_mark);
            Ok(())
        } else {
            output.rewind(packet_mark);
            put_status(output, id, Status::Eof)
        }
    }

    fn handle_remove(&mut self) -> Result<(), EngineError> {
        let Self { input, output, .. } = self;
        let id = input.read_u32()?;
        let path = input.read_string()?;
        put_result(output, id, unlink(&path[..]))
    }

    fn handle_mkdir(&mut self) -> Result<(), EngineError> {
        let Self { input, output, .. } = self;
        let id = input.read_u32()?;
        let path = input.read_string()?;
        // Only the permissions are honored here
        let attrs = FileAttributes::decode(input)?;
        put_result(output, id, mkdir(&path[..], attrs.mode_or(DEFAULT_DIR_PERM)))
    }

    fn handle_rmdir(&mut self) -> Result<(), EngineError> {
        let Self { input, output, .. } = self;
        let id = input.read_u32()?;
        let path = input.read_string()?;
        put_result(output, id, unlinkat(None, &path[..], UnlinkatFlags::RemoveDir))
    }

    fn handle_realpath(&mut self) -> Result<(), EngineError> {
        let Self { input, output, .. } = self;
        let id = input.read_u32()?;
        let path = input.read_string()?;

        match std::fs::canonicalize(OsStr::from_bytes(&path)) {
            Err(err) => put_status(output, id, Status::from_io(&err)),
            Ok(canonical) => {
                let bytes = canonical.into_os_string().into_vec();
                output.write_byte(SSH_FXP_NAME)?;
                output.write_u32(id)?;
                output.write_u32(1)?;
                output.write_string(&bytes)?;
                output.write_string(&bytes)?;
                // The protocol wants attributes here; it also works with
                // none, which is what clients get
                FileAttributes::default().encode(output)
            }
        }
    }

    fn handle_rename(&mut self) -> Result<(), EngineError> {
        let Self { input, output, .. } = self;
        let id = input.read_u32()?;
        let old_path = input.read_string()?;
        let new_path = input.read_string()?;
        put_result(output, id, renameat(None, &old_path[..], None, &new_path[..]))
    }

    fn handle_readlink(&mut self) -> Result<(), EngineError> {
        let Self { input, output, .. } = self;
        let id = input.read_u32()?;
        let path = input.read_string()?;

        let packet_mark = output.mark();
        output.write_byte(SSH_FXP_NAME)?;
        output.write_u32(id)?;
        output.write_u32(1)?;
        // The target appears twice (filename and longname), each with a
        // length word, followed by the empty attrs; bound it to fit
        let space = (output.remaining() - MAX_ATTRS_BYTES) / 2 - 4;
        match readlink(&path[..]) {
            Err(errno) => {
                output.rewind(packet_mark);
                put_status(output, id, errno.into())
            }
            Ok(target) => {
                let mut bytes = target.into_vec();
                bytes.truncate(space);
                output.write_string(&bytes)?;
                output.write_string(&bytes)?;
                FileAttributes::default().encode(output)
            }
        }
    }

    fn handle_symlink(&mut self) -> Result<(), EngineError> {
        let Self { input, output, .. } = self;
        let id = input.read_u32()?;
        // Link path first on the wire, target first in the OS call. Client
        // implementations are known to disagree about this ordering.
        let link_path = input.read_string()?;
        let target_path = input.read_string()?;
        put_result(output, id, symlinkat(&target_path[..], None, &link_path[..]))
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Advance to the next reportable entry: dot entries are not reported, and
/// entries that cannot be statted are invisible. None means the stream is
/// exhausted for good.
fn next_entry(dirfd: RawFd, entries: &mut OwningIter) -> Option<DirEntry> {
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(_) => return None,
        };
        let name = entry.file_name();
        let bytes = name.to_bytes();
        if bytes == b"." || bytes == b".." {
            continue;
        }
        match fstatat(dirfd, name, AtFlags::empty()) {
            Ok(stat) => {
                return Some(DirEntry {
                    name: bytes.to_vec(),
                    stat,
                })
            }
            Err(_) => continue,
        }
    }
    None
}

fn put_status(out: &mut OutputBuffer, id: u32, status: Status) -> Result<(), EngineError> {
    out.write_byte(SSH_FXP_STATUS)?;
    out.write_u32(id)?;
    out.write_u32(status.code())?;
    out.write_string(status.message().as_bytes())?;
    out.write_string(b"en")
}

/// STATUS from a host call that returns no payload: OK or the mapped errno.
fn put_result(out: &mut OutputBuffer, id: u32, result: nix::Result<()>) -> Result<(), EngineError> {
    match result {
        Ok(()) => put_status(out, id, Status::Ok),
        Err(errno) => put_status(out, id, errno.into()),
    }
}

fn put_handle(out: &mut OutputBuffer, id: u32, handle: u32) -> Result<(), EngineError> {
    out.write_byte(SSH_FXP_HANDLE)?;
    out.write_u32(id)?;
    out.write_string(HandleTable::encode(handle).as_bytes())
}

fn pflags_to_oflag(pflags: u32) -> OFlag {
    let mut flags = if pflags & SSH_FXF_READ != 0 && pflags & SSH_FXF_WRITE != 0 {
        OFlag::O_RDWR
    } else if pflags & SSH_FXF_READ != 0 {
        OFlag::O_RDONLY
    } else if pflags & SSH_FXF_WRITE != 0 {
        OFlag::O_WRONLY
    } else {
        OFlag::empty()
    };
    if pflags & SSH_FXF_CREAT != 0 {
        flags |= OFlag::O_CREAT;
    }
    if pflags & SSH_FXF_TRUNC != 0 {
        flags |= OFlag::O_TRUNC;
    }
    if pflags & SSH_FXF_EXCL != 0 {
        flags |= OFlag::O_EXCL;
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sftp::test_utils::{init_engine, FrameBuilder, Reply};

    #[test]
    fn test_pflags_mapping() {
        assert_eq!(pflags_to_oflag(SSH_FXF_READ), OFlag::O_RDONLY);
        assert_eq!(pflags_to_oflag(SSH_FXF_WRITE), OFlag::O_WRONLY);
        assert_eq!(pflags_to_oflag(SSH_FXF_READ | SSH_FXF_WRITE), OFlag::O_RDWR);
        assert_eq!(
            pflags_to_oflag(SSH_FXF_WRITE | SSH_FXF_CREAT | SSH_FXF_TRUNC),
            OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC
        );
        assert_eq!(
            pflags_to_oflag(SSH_FXF_WRITE | SSH_FXF_CREAT | SSH_FXF_EXCL),
            OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_EXCL
        );
        // Neither READ nor WRITE requested: no access mode at all
        assert_eq!(pflags_to_oflag(0), OFlag::empty());
    }

    #[test]
    fn test_init_handshake_bytes() {
        let mut engine = Engine::new();
        let request = FrameBuilder::new(SSH_FXP_INIT).u32(3).build();
        let reply = engine.handle_frame(&request).unwrap().unwrap();
        assert_eq!(reply, [0, 0, 0, 5, SSH_FXP_VERSION, 0, 0, 0, 3]);
    }

    #[test]
    fn test_init_with_newer_version_is_accepted() {
        let mut engine = Engine::new();
        let request = FrameBuilder::new(SSH_FXP_INIT).u32(6).build();
        let reply = engine.handle_frame(&request).unwrap().unwrap();
        let mut reply = Reply::parse(reply);
        assert_eq!(reply.byte(), SSH_FXP_VERSION);
        assert_eq!(reply.u32(), 3);
    }

    #[test]
    fn test_init_with_old_version_is_fatal() {
        let mut engine = Engine::new();
        let request = FrameBuilder::new(SSH_FXP_INIT).u32(2).build();
        assert!(matches!(
            engine.handle_frame(&request),
            Err(EngineError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_second_init_is_fatal() {
        let mut engine = init_engine();
        let request = FrameBuilder::new(SSH_FXP_INIT).u32(3).build();
        assert!(matches!(
            engine.handle_frame(&request),
            Err(EngineError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_first_packet_must_be_init() {
        let mut engine = Engine::new();
        let request = FrameBuilder::new(SSH_FXP_STAT).u32(1).string(b"/").build();
        assert!(matches!(
            engine.handle_frame(&request),
            Err(EngineError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_unknown_opcode_reports_unsupported() {
        let mut engine = init_engine();
        let request = FrameBuilder::new(250).u32(42).build();
        let reply = engine.handle_frame(&request).unwrap().unwrap();
        Reply::parse(reply).expect_status(42, Status::OpUnsupported);
    }

    #[test]
    fn test_extended_opcode_reports_unsupported() {
        let mut engine = init_engine();
        let request = FrameBuilder::new(SSH_FXP_EXTENDED)
            .u32(7)
            .string(b"hardlink@openssh.com")
            .build();
        let reply = engine.handle_frame(&request).unwrap().unwrap();
        Reply::parse(reply).expect_status(7, Status::OpUnsupported);
    }

    #[test]
    fn test_zero_length_packet_is_discarded() {
        let mut engine = init_engine();
        assert!(engine.handle_frame(&[]).unwrap().is_none());
    }

    #[test]
    fn test_truncated_request_is_fatal() {
        let mut engine = init_engine();
        // CLOSE with a string that claims more bytes than the packet holds
        let request = FrameBuilder::new(SSH_FXP_CLOSE).u32(1).u32(200).build();
        assert!(matches!(
            engine.handle_frame(&request),
            Err(EngineError::TruncatedPacket { .. })
        ));
    }

    #[test]
    fn test_invalid_handles_report_failure() {
        let mut engine = init_engine();
        for wire in [&b"00"[..], b"1", b"007", b"xx", b"99"] {
            let request = FrameBuilder::new(SSH_FXP_CLOSE).u32(5).string(wire).build();
            let reply = engine.handle_frame(&request).unwrap().unwrap();
            Reply::parse(reply).expect_status(5, Status::Failure);
        }
    }
}
