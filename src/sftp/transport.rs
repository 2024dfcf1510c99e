use super::buffer::InputBuffer;
use super::constants::MAX_PACKET;
use super::error::EngineError;
use nix::poll::{poll, PollFd, PollFlags};
use nix::unistd::{read, write};
use std::os::unix::io::RawFd;

// Frames go over the descriptors the SSH transport handed us: requests on
// stdin, replies on stdout. Each is a u32 payload length then the payload.
const INPUT_FD: RawFd = 0;
const OUTPUT_FD: RawFd = 1;

/// Wait until `fd` is ready for the given direction. The parent process may
/// have marked our descriptors non-blocking; polling first keeps the
/// read/write loops below from spinning on EAGAIN.
fn wait_ready(fd: RawFd, events: PollFlags, what: &'static str) -> Result<(), EngineError> {
    let mut fds = [PollFd::new(fd, events)];
    poll(&mut fds, -1).map_err(|errno| EngineError::Transport(what, errno))?;
    Ok(())
}

/// Read exactly `len` bytes into the front of `buf`. Returns the number of
/// bytes read before the stream ended: `len` normally, 0 on EOF before the
/// first byte. EOF anywhere else is fatal.
fn read_exact(buf: &mut [u8], len: usize) -> Result<usize, EngineError> {
    let mut count = 0;
    while count < len {
        wait_ready(INPUT_FD, PollFlags::POLLIN, "poll(stdin)")?;
        let n = read(INPUT_FD, &mut buf[count..len])
            .map_err(|errno| EngineError::Transport("read(stdin)", errno))?;
        if n == 0 {
            if count == 0 {
                return Ok(0);
            }
            return Err(EngineError::UnexpectedEof);
        }
        count += n;
    }
    Ok(count)
}

/// Read one frame into `input`. Returns the payload length, or None on an
/// orderly end of stream at a frame boundary.
pub fn read_frame(input: &mut InputBuffer) -> Result<Option<u32>, EngineError> {
    let mut header = [0u8; 4];
    if read_exact(&mut header, 4)? == 0 {
        return Ok(None);
    }
    let len = u32::from_be_bytes(header);
    if len as usize > MAX_PACKET {
        return Err(EngineError::OversizedFrame { len });
    }
    let storage = input.storage_mut();
    if read_exact(storage, len as usize)? < len as usize {
        return Err(EngineError::UnexpectedEof);
    }
    input.set_payload(len as usize);
    Ok(Some(len))
}

/// Write a complete frame (outer length already patched in), draining short
/// writes.
pub fn write_frame(frame: &[u8]) -> Result<(), EngineError> {
    let mut sent = 0;
    while sent < frame.len() {
        wait_ready(OUTPUT_FD, PollFlags::POLLOUT, "poll(stdout)")?;
        let n = write(OUTPUT_FD, &frame[sent..])
            .map_err(|errno| EngineError::Transport("write(stdout)", errno))?;
        sent += n;
    }
    Ok(())
}
