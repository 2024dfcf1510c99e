//! Shared fixtures for engine tests: build request payloads byte by byte,
//! pick replies apart, and assert on the common packet shapes.

use super::attrs::FileAttributes;
use super::constants::*;
use super::engine::Engine;
use super::error::Status;

/// Builds one request payload (everything after the outer length word).
pub struct FrameBuilder {
    data: Vec<u8>,
}

impl FrameBuilder {
    pub fn new(opcode: u8) -> Self {
        Self { data: vec![opcode] }
    }

    pub fn u32(mut self, value: u32) -> Self {
        self.data.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn u64(mut self, value: u64) -> Self {
        self.data.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn string(mut self, bytes: &[u8]) -> Self {
        self.data.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        self.data.extend_from_slice(bytes);
        self
    }

    pub fn attrs(self, attrs: &FileAttributes) -> Self {
        let mut this = self.u32(attrs.flags());
        if let Some(size) = attrs.size {
            this = this.u64(size);
        }
        if let Some((uid, gid)) = attrs.uid_gid {
            this = this.u32(uid).u32(gid);
        }
        if let Some(permissions) = attrs.permissions {
            this = this.u32(permissions);
        }
        if let Some((atime, mtime)) = attrs.times {
            this = this.u32(atime).u32(mtime);
        }
        this
    }

    pub fn build(self) -> Vec<u8> {
        self.data
    }
}

/// An engine with the INIT handshake already done.
pub fn init_engine() -> Engine {
    let mut engine = Engine::new();
    let request = FrameBuilder::new(SSH_FXP_INIT).u32(SFTP_SUPPORTED_VERSION).build();
    let reply = engine
        .handle_frame(&request)
        .expect("INIT must not fail")
        .expect("INIT must reply");
    assert_eq!(reply[4], SSH_FXP_VERSION);
    engine
}

/// Cursor over one reply frame. `parse` checks the outer length matches the
/// frame before handing out fields.
pub struct Reply<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reply<'a> {
    pub fn parse(frame: &'a [u8]) -> Self {
        let mut reply = Reply { data: frame, pos: 0 };
        let declared = reply.u32() as usize;
        assert_eq!(declared, frame.len() - 4, "outer length mismatch");
        reply
    }

    pub fn byte(&mut self) -> u8 {
        let value = self.data[self.pos];
        self.pos += 1;
        value
    }

    pub fn u32(&mut self) -> u32 {
        let bytes = &self.data[self.pos..self.pos + 4];
        self.pos += 4;
        u32::from_be_bytes(bytes.try_into().unwrap())
    }

    pub fn u64(&mut self) -> u64 {
        ((self.u32() as u64) << 32) | self.u32() as u64
    }

    pub fn string(&mut self) -> Vec<u8> {
        let len = self.u32() as usize;
        let bytes = self.data[self.pos..self.pos + len].to_vec();
        self.pos += len;
        bytes
    }

    pub fn attrs(&mut self) -> FileAttributes {
        let flags = self.u32();
        let mut attrs = FileAttributes::default();
        if flags & SSH_FILEXFER_ATTR_SIZE != 0 {
            attrs.size = Some(self.u64());
        }
        if flags & SSH_FILEXFER_ATTR_UIDGID != 0 {
            attrs.uid_gid = Some((self.u32(), self.u32()));
        }
        if flags & SSH_FILEXFER_ATTR_PERMISSIONS != 0 {
            attrs.permissions = Some(self.u32());
        }
        if flags & SSH_FILEXFER_ATTR_ACMODTIME != 0 {
            attrs.times = Some((self.u32(), self.u32()));
        }
        attrs
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Assert this is a STATUS reply with the given id and code, including
    /// the fixed message text and language tag.
    pub fn expect_status(mut self, id: u32, status: Status) {
        assert_eq!(self.byte(), SSH_FXP_STATUS);
        assert_eq!(self.u32(), id);
        assert_eq!(self.u32(), status.code());
        assert_eq!(self.string(), status.message().as_bytes());
        assert_eq!(self.string(), b"en");
        assert_eq!(self.remaining(), 0);
    }

    /// Assert this is a HANDLE reply for `id` and return the handle string.
    pub fn expect_handle(mut self, id: u32) -> Vec<u8> {
        assert_eq!(self.byte(), SSH_FXP_HANDLE);
        assert_eq!(self.u32(), id);
        let handle = self.string();
        assert_eq!(self.remaining(), 0);
        assert_eq!(handle.len(), MAX_HANDLE_DIGITS);
        assert!(handle.iter().all(|b| b.is_ascii_digit()));
        handle
    }

    /// Assert this is a DATA reply for `id` and return the payload.
    pub fn expect_data(mut self, id: u32) -> Vec<u8> {
        assert_eq!(self.byte(), SSH_FXP_DATA);
        assert_eq!(self.u32(), id);
        let data = self.string();
        assert_eq!(self.remaining(), 0);
        data
    }

    /// Assert this is an ATTRS reply for `id` and return the attributes.
    pub fn expect_attrs(mut self, id: u32) -> FileAttributes {
        assert_eq!(self.byte(), SSH_FXP_ATTRS);
        assert_eq!(self.u32(), id);
        let attrs = self.attrs();
        assert_eq!(self.remaining(), 0);
        attrs
    }

    /// Assert this is a NAME reply for `id` and return its
    /// (filename, longname, attrs) entries.
    pub fn expect_names(mut self, id: u32) -> Vec<(Vec<u8>, Vec<u8>, FileAttributes)> {
        assert_eq!(self.byte(), SSH_FXP_NAME);
        assert_eq!(self.u32(), id);
        let count = self.u32();
        let mut names = Vec::new();
        for _ in 0..count {
            let filename = self.string();
            let longname = self.string();
            let attrs = self.attrs();
            names.push((filename, longname, attrs));
        }
        assert_eq!(self.remaining(), 0);
        names
    }
}
