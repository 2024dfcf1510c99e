use super::constants::{MAX_HANDLES, MAX_HANDLE_DIGITS};
use log::warn;
use nix::dir::OwningIter;
use nix::sys::stat::FileStat;
use nix::unistd::close;
use std::os::unix::io::RawFd;

/// A directory entry read ahead of the reply it will go into. READDIR stats
/// entries before it knows whether they fit; one that does not fit is parked
/// here and leads the next reply.
pub struct DirEntry {
    pub name: Vec<u8>,
    pub stat: FileStat,
}

/// What an allocated handle refers to.
pub enum HandleSlot {
    File {
        fd: RawFd,
    },
    Dir {
        /// The directory's own descriptor, for fstatat-relative entry
        /// stats. Owned by `entries`; closed when the slot drops.
        fd: RawFd,
        entries: OwningIter,
        pending: Option<DirEntry>,
    },
}

/// Fixed-capacity table of open files and directories. Slot index i is
/// handle value i + 1; 0 is reserved invalid. On the wire a handle is an SSH
/// string of exactly MAX_HANDLE_DIGITS zero-padded decimal digits.
pub struct HandleTable {
    slots: Vec<Option<HandleSlot>>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            slots: (0..MAX_HANDLES).map(|_| None).collect(),
        }
    }

    /// Install `slot` in the first free position and return its handle
    /// value, or None when the table is full. On None the caller still owns
    /// any raw fd inside `slot` and must close it; a directory stream closes
    /// itself when the rejected slot drops.
    pub fn alloc(&mut self, slot: HandleSlot) -> Option<u32> {
        for (index, entry) in self.slots.iter_mut().enumerate() {
            if entry.is_none() {
                *entry = Some(slot);
                return Some(index as u32 + 1);
            }
        }
        warn!("out of handles ({} open)", MAX_HANDLES);
        None
    }

    /// Strict parse of a wire handle: exact width, digits only, in range,
    /// and referring to a live slot.
    fn parse(&self, wire: &[u8]) -> Option<usize> {
        if wire.len() != MAX_HANDLE_DIGITS {
            return None;
        }
        if !wire.iter().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let text = std::str::from_utf8(wire).ok()?;
        let value: usize = text.parse().ok()?;
        if value == 0 || value > MAX_HANDLES {
            return None;
        }
        self.slots[value - 1].as_ref()?;
        Some(value - 1)
    }

    pub fn resolve(&mut self, wire: &[u8]) -> Option<&mut HandleSlot> {
        let index = self.parse(wire)?;
        self.slots[index].as_mut()
    }

    /// Remove a slot from the table, transferring resource ownership to the
    /// caller (CLOSE reports the close result to the client).
    pub fn take(&mut self, wire: &[u8]) -> Option<HandleSlot> {
        let index = self.parse(wire)?;
        self.slots[index].take()
    }

    /// Wire form of a handle value returned by `alloc`.
    pub fn encode(handle: u32) -> String {
        format!("{:0width$}", handle, width = MAX_HANDLE_DIGITS)
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HandleTable {
    fn drop(&mut self) {
        // Directory streams close themselves; file descriptors need help
        for slot in self.slots.iter_mut() {
            if let Some(HandleSlot::File { fd }) = slot.take() {
                let _ = close(fd);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_is_fixed_width_decimal() {
        assert_eq!(HandleTable::encode(1), "01");
        assert_eq!(HandleTable::encode(42), "42");
        assert_eq!(HandleTable::encode(99), "99");
        for value in 1..=MAX_HANDLES as u32 {
            let text = HandleTable::encode(value);
            assert_eq!(text.len(), MAX_HANDLE_DIGITS);
            assert!(text.bytes().all(|b| b.is_ascii_digit()));
            assert_eq!(text.parse::<u32>().unwrap(), value);
        }
    }

    #[test]
    fn test_alloc_assigns_first_free_slot() {
        let mut table = HandleTable::new();
        assert_eq!(table.alloc(HandleSlot::File { fd: -1 }), Some(1));
        assert_eq!(table.alloc(HandleSlot::File { fd: -1 }), Some(2));
        assert!(table.take(b"01").is_some());
        // Freed slot is reused before higher ones
        assert_eq!(table.alloc(HandleSlot::File { fd: -1 }), Some(1));
    }

    #[test]
    fn test_alloc_exhausts_at_capacity() {
        let mut table = HandleTable::new();
        for expected in 1..=MAX_HANDLES as u32 {
            assert_eq!(table.alloc(HandleSlot::File { fd: -1 }), Some(expected));
        }
        assert_eq!(table.alloc(HandleSlot::File { fd: -1 }), None);
        // Closing one slot makes exactly one allocation possible again
        assert!(table.take(b"57").is_some());
        assert_eq!(table.alloc(HandleSlot::File { fd: -1 }), Some(57));
        assert_eq!(table.alloc(HandleSlot::File { fd: -1 }), None);
    }

    #[test]
    fn test_resolve_rejects_malformed_handles() {
        let mut table = HandleTable::new();
        table.alloc(HandleSlot::File { fd: -1 }).unwrap();

        assert!(table.resolve(b"01").is_some());
        assert!(table.resolve(b"1").is_none()); // wrong width
        assert!(table.resolve(b"001").is_none()); // wrong width
        assert!(table.resolve(b"0a").is_none()); // not a number
        assert!(table.resolve(b"-1").is_none()); // not digits
        assert!(table.resolve(b"+1").is_none()); // digits only, no signs
        assert!(table.resolve(b"00").is_none()); // zero is reserved
        assert!(table.resolve(b"02").is_none()); // free slot
        assert!(table.resolve(b"99").is_none()); // free slot
        assert!(table.resolve(b"").is_none());
    }

    #[test]
    fn test_take_frees_the_slot() {
        let mut table = HandleTable::new();
        table.alloc(HandleSlot::File { fd: -1 }).unwrap();
        assert!(table.take(b"01").is_some());
        assert!(table.take(b"01").is_none());
        assert!(table.resolve(b"01").is_none());
    }
}
