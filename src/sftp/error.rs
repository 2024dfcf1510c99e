use nix::errno::Errno;
use std::fmt;

/// Fatal engine errors. Any of these terminates the server; filesystem
/// errors requested by the client are not errors in this sense, they are
/// reported back as a [`Status`].
#[derive(Debug)]
pub enum EngineError {
    /// A read ran past the end of the current input payload, or a string
    /// declared a length larger than the bytes that follow it.
    TruncatedPacket { needed: usize, remaining: usize },
    /// A write would not fit in the output packet buffer.
    PacketOverflow { needed: usize, remaining: usize },
    /// The peer announced a frame larger than the packet buffer.
    OversizedFrame { len: u32 },
    /// The peer broke the protocol state machine (double INIT, non-INIT
    /// first packet, unsupported protocol version).
    ProtocolViolation(&'static str),
    /// Stream closed in the middle of a frame.
    UnexpectedEof,
    /// read/write/poll failure on the transport descriptors.
    Transport(&'static str, Errno),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::TruncatedPacket { needed, remaining } => {
                write!(f, "truncated packet: need {} bytes, {} left", needed, remaining)
            }
            EngineError::PacketOverflow { needed, remaining } => {
                write!(f, "reply too large: need {} bytes, {} left", needed, remaining)
            }
            EngineError::OversizedFrame { len } => {
                write!(f, "frame of {} bytes exceeds the packet limit", len)
            }
            EngineError::ProtocolViolation(what) => write!(f, "protocol violation: {}", what),
            EngineError::UnexpectedEof => write!(f, "stream closed mid-frame"),
            EngineError::Transport(what, errno) => write!(f, "{}: {}", what, errno.desc()),
        }
    }
}

impl std::error::Error for EngineError {}

/// SFTP status codes carried in SSH_FXP_STATUS replies.
///
/// NoConnection and ConnectionLost exist in the protocol but MUST NOT be
/// generated by servers; nothing here constructs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Status {
    Ok = 0,
    Eof = 1,
    NoSuchFile = 2,
    PermissionDenied = 3,
    Failure = 4,
    BadMessage = 5,
    NoConnection = 6,
    ConnectionLost = 7,
    OpUnsupported = 8,
}

impl Status {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn message(self) -> &'static str {
        match self {
            Status::Ok => "Success",
            Status::Eof => "End of file",
            Status::NoSuchFile => "No such file",
            Status::PermissionDenied => "Permission denied",
            Status::Failure => "Failure",
            Status::BadMessage => "Bad message",
            Status::OpUnsupported => "Operation unsupported",
            Status::NoConnection | Status::ConnectionLost => "Unknown error",
        }
    }

    /// Map an I/O error from std (REALPATH canonicalization) through its
    /// raw OS error number.
    pub fn from_io(err: &std::io::Error) -> Status {
        match err.raw_os_error() {
            Some(0) => Status::Ok,
            Some(num) => Errno::from_i32(num).into(),
            None => Status::Failure,
        }
    }
}

impl From<Errno> for Status {
    fn from(errno: Errno) -> Status {
        match errno {
            Errno::ENOENT | Errno::ENOTDIR | Errno::EBADF | Errno::ELOOP => Status::NoSuchFile,
            Errno::EPERM | Errno::EACCES | Errno::EFAULT => Status::PermissionDenied,
            Errno::ENAMETOOLONG | Errno::EINVAL => Status::BadMessage,
            // UnknownErrno stands in for every number nix has no name
            // for; a failed call maps to Failure either way
            _ => Status::Failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping_table() {
        for errno in [Errno::ENOENT, Errno::ENOTDIR, Errno::EBADF, Errno::ELOOP] {
            assert_eq!(Status::from(errno), Status::NoSuchFile);
        }
        for errno in [Errno::EPERM, Errno::EACCES, Errno::EFAULT] {
            assert_eq!(Status::from(errno), Status::PermissionDenied);
        }
        for errno in [Errno::ENAMETOOLONG, Errno::EINVAL] {
            assert_eq!(Status::from(errno), Status::BadMessage);
        }
        assert_eq!(Status::from(Errno::EIO), Status::Failure);
        assert_eq!(Status::from(Errno::ENOSPC), Status::Failure);
        assert_eq!(Status::from(Errno::EISDIR), Status::Failure);
        // Numbers nix has no name for are still failures
        assert_eq!(Status::from(Errno::UnknownErrno), Status::Failure);
        assert_eq!(Status::from(Errno::from_i32(123_456)), Status::Failure);
    }

    #[test]
    fn test_io_error_mapping() {
        use std::io::Error;
        assert_eq!(Status::from_io(&Error::from_raw_os_error(0)), Status::Ok);
        let err = Error::from_raw_os_error(Errno::ENOENT as i32);
        assert_eq!(Status::from_io(&err), Status::NoSuchFile);
        let err = Error::from_raw_os_error(Errno::EACCES as i32);
        assert_eq!(Status::from_io(&err), Status::PermissionDenied);
        let err = Error::new(std::io::ErrorKind::Other, "no os error");
        assert_eq!(Status::from_io(&err), Status::Failure);
    }

    #[test]
    fn test_mapping_never_yields_connection_codes() {
        for num in 1..200 {
            let status = Status::from(Errno::from_i32(num));
            assert_ne!(status, Status::NoConnection);
            assert_ne!(status, Status::ConnectionLost);
        }
    }

    #[test]
    fn test_status_messages() {
        assert_eq!(Status::Ok.message(), "Success");
        assert_eq!(Status::Eof.message(), "End of file");
        assert_eq!(Status::NoSuchFile.message(), "No such file");
        assert_eq!(Status::PermissionDenied.message(), "Permission denied");
        assert_eq!(Status::Failure.message(), "Failure");
        assert_eq!(Status::BadMessage.message(), "Bad message");
        assert_eq!(Status::OpUnsupported.message(), "Operation unsupported");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Status::Ok.code(), 0);
        assert_eq!(Status::Eof.code(), 1);
        assert_eq!(Status::NoSuchFile.code(), 2);
        assert_eq!(Status::PermissionDenied.code(), 3);
        assert_eq!(Status::Failure.code(), 4);
        assert_eq!(Status::BadMessage.code(), 5);
        assert_eq!(Status::OpUnsupported.code(), 8);
    }
}
