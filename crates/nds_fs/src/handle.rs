//! Open-file handles over filesystem slots.
//!
//! A [`FileHandle`] is a transient buffer view over exactly one slot. It
//! registers itself with its owning filesystem so that slot insertions and
//! removals can shift its ID (or force it closed when its slot goes away),
//! and it writes its buffer back into the slot on flush. Handles are not
//! deduplicated: opening the same path twice yields two independent buffers.

use std::cell::RefCell;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::rc::Rc;

use crate::error::{Error, Result};

/// The operation requested when opening a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Buffer seeded from the slot; not writable.
    Read,
    /// Buffer starts empty; flush overwrites the whole slot.
    Write,
    /// Buffer seeded from the slot with the cursor at its end. Flushing still
    /// overwrites the whole slot: this is read-modify-write, not an
    /// incremental byte-append.
    Append,
}

/// A parsed mode string.
///
/// The grammar is `^([rwa])(b?)(\+?)$`: operation, optional binary marker,
/// optional create-if-missing marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode {
    pub op: OpenMode,
    pub binary: bool,
    pub create: bool,
}

impl Mode {
    /// Parse a mode string, rejecting anything outside the grammar before the
    /// filesystem touches any state.
    pub fn parse(mode: &str) -> Result<Mode> {
        let mut chars = mode.chars();
        let op = match chars.next() {
            Some('r') => OpenMode::Read,
            Some('w') => OpenMode::Write,
            Some('a') => OpenMode::Append,
            _ => return Err(Error::InvalidMode(mode.to_owned())),
        };

        let mut rest = chars.as_str();
        let binary = rest.starts_with('b');
        if binary {
            rest = &rest[1..];
        }
        let create = rest.starts_with('+');
        if create {
            rest = &rest[1..];
        }
        if !rest.is_empty() {
            return Err(Error::InvalidMode(mode.to_owned()));
        }

        Ok(Mode { op, binary, create })
    }

    /// Whether handles opened with this mode may write.
    pub fn writable(&self) -> bool {
        self.op != OpenMode::Read
    }
}

/// A random-access byte stream, as produced by a filesystem, the OS, or a
/// compression wrapper.
///
/// This is the seam the format orchestration works against; it adds the two
/// things `std::io` cannot express for us: whether writes will be honored,
/// and explicit close-with-error-reporting.
pub trait Stream: Read + Write + Seek {
    /// Whether this stream accepts writes.
    fn writable(&self) -> bool;

    /// Discard all content, leaving an empty stream.
    fn truncate(&mut self) -> io::Result<()>;

    /// Flush durably and release the stream. Calling close twice is a no-op.
    fn close(&mut self) -> Result<()>;
}

impl Stream for Cursor<Vec<u8>> {
    fn writable(&self) -> bool {
        true
    }

    fn truncate(&mut self) -> io::Result<()> {
        self.get_mut().clear();
        self.set_position(0);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// An OS file with an explicit writability marker, so it can stand behind the
/// same [`Stream`] seam as filesystem handles.
pub struct OsStream {
    file: std::fs::File,
    writable: bool,
}

impl OsStream {
    /// Open an OS file read-only.
    pub fn open(path: &str) -> Result<OsStream> {
        Ok(OsStream {
            file: std::fs::File::open(path)?,
            writable: false,
        })
    }

    /// Create or truncate an OS file for writing.
    pub fn create(path: &str) -> Result<OsStream> {
        Ok(OsStream {
            file: std::fs::File::create(path)?,
            writable: true,
        })
    }
}

impl Read for OsStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for OsStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for OsStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl Stream for OsStream {
    fn writable(&self) -> bool {
        self.writable
    }

    fn truncate(&mut self) -> io::Result<()> {
        self.file.set_len(0)
    }

    fn close(&mut self) -> Result<()> {
        Ok(self.file.flush()?)
    }
}

/// Registry entry shared between a live handle and its filesystem.
#[derive(Debug)]
pub(crate) struct HandleEntry {
    pub id: u32,
    pub open: bool,
}

pub(crate) type HandleRef = Rc<RefCell<HandleEntry>>;

/// The per-filesystem table of live handles.
///
/// Every structural mutation of the slot sequence runs through
/// [`HandleRegistry::shift_for_insert`] or [`HandleRegistry::shift_for_remove`]
/// so that no live handle ever points at the wrong slot.
#[derive(Debug, Default)]
pub(crate) struct HandleRegistry {
    entries: Vec<HandleRef>,
}

impl HandleRegistry {
    pub fn register(&mut self, id: u32) -> HandleRef {
        self.entries.retain(|e| e.borrow().open);
        let entry = Rc::new(RefCell::new(HandleEntry { id, open: true }));
        self.entries.push(Rc::clone(&entry));
        entry
    }

    /// A slot was inserted at `new_id`: handles behind it move up, a handle
    /// that sat exactly at `new_id` referenced the displaced slot and is
    /// force-closed.
    pub fn shift_for_insert(&mut self, new_id: u32) {
        for entry in &self.entries {
            let mut entry = entry.borrow_mut();
            if !entry.open {
                continue;
            }
            if entry.id > new_id {
                entry.id += 1;
            } else if entry.id == new_id {
                entry.open = false;
            }
        }
        self.entries.retain(|e| e.borrow().open);
    }

    /// The slot at `removed_id` was deleted: the handle that pointed at it is
    /// force-closed, handles behind it move down.
    pub fn shift_for_remove(&mut self, removed_id: u32) {
        for entry in &self.entries {
            let mut entry = entry.borrow_mut();
            if !entry.open {
                continue;
            }
            if entry.id == removed_id {
                entry.open = false;
            } else if entry.id > removed_id {
                entry.id -= 1;
            }
        }
        self.entries.retain(|e| e.borrow().open);
    }
}

/// Storage a handle flushes into; implemented by both filesystem variants.
pub(crate) trait SlotStore {
    fn read_slot(&self, id: u32) -> Vec<u8>;
    fn write_slot(&mut self, id: u32, data: Vec<u8>);
}

/// A read/write/append view over one filesystem slot.
///
/// The handle exclusively owns its buffer until flush; the filesystem owns
/// the committed slot content between flushes. [`Stream::close`] is the
/// primary release contract and must be called on every path; `Drop` flushes
/// as a backstop so a handle leaving scope never loses written data, but it
/// cannot report errors.
pub struct FileHandle {
    store: Rc<RefCell<dyn SlotStore>>,
    entry: HandleRef,
    mode: Mode,
    buf: Cursor<Vec<u8>>,
    closed: bool,
}

impl FileHandle {
    pub(crate) fn new(store: Rc<RefCell<dyn SlotStore>>, entry: HandleRef, mode: Mode) -> Self {
        let initial = match mode.op {
            OpenMode::Write => Vec::new(),
            OpenMode::Read | OpenMode::Append => store.borrow().read_slot(entry.borrow().id),
        };

        let mut buf = Cursor::new(initial);
        if mode.op == OpenMode::Append {
            buf.set_position(buf.get_ref().len() as u64);
        }

        FileHandle {
            store,
            entry,
            mode,
            buf,
            closed: false,
        }
    }

    /// The slot ID this handle currently addresses. Insertions and removals
    /// elsewhere in the filesystem may shift it.
    pub fn id(&self) -> u32 {
        self.entry.borrow().id
    }

    /// The mode this handle was opened with.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Whether the filesystem force-closed this handle because its slot was
    /// displaced or removed.
    pub fn force_closed(&self) -> bool {
        !self.entry.borrow().open
    }

    /// Write the buffer back into the slot. A no-op for read mode and for
    /// handles that are no longer open; a force-closed handle's buffer is
    /// discarded rather than flushed through a stale ID.
    fn flush_to_slot(&mut self) {
        if self.closed || self.mode.op == OpenMode::Read {
            return;
        }
        let entry = self.entry.borrow();
        if !entry.open {
            return;
        }
        self.store
            .borrow_mut()
            .write_slot(entry.id, self.buf.get_ref().clone());
    }
}

impl Read for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.buf.read(buf)
    }
}

impl Write for FileHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.mode.writable() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "handle was opened read-only",
            ));
        }
        if self.closed || self.force_closed() {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "handle was closed",
            ));
        }
        self.buf.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_to_slot();
        Ok(())
    }
}

impl Seek for FileHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.buf.seek(pos)
    }
}

impl Stream for FileHandle {
    fn writable(&self) -> bool {
        self.mode.writable() && !self.closed && !self.force_closed()
    }

    fn truncate(&mut self) -> io::Result<()> {
        self.buf.get_mut().clear();
        self.buf.set_position(0);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.flush_to_slot();
        self.closed = true;
        self.entry.borrow_mut().open = false;
        Ok(())
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        if !self.closed {
            self.flush_to_slot();
            self.closed = true;
            self.entry.borrow_mut().open = false;
        }
    }
}

impl std::fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("FileHandle")
            .field("id", &self.id())
            .field("mode", &self.mode)
            .field("len", &self.buf.get_ref().len())
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{Mode, OpenMode};
    use crate::error::Error;

    #[test]
    fn parses_all_valid_modes() {
        for (input, op, binary, create) in [
            ("r", OpenMode::Read, false, false),
            ("rb", OpenMode::Read, true, false),
            ("r+", OpenMode::Read, false, true),
            ("rb+", OpenMode::Read, true, true),
            ("w", OpenMode::Write, false, false),
            ("wb+", OpenMode::Write, true, true),
            ("a", OpenMode::Append, false, false),
            ("ab", OpenMode::Append, true, false),
        ] {
            let mode = Mode::parse(input).unwrap();
            assert_eq!(mode.op, op, "{input}");
            assert_eq!(mode.binary, binary, "{input}");
            assert_eq!(mode.create, create, "{input}");
        }
    }

    #[test]
    fn rejects_malformed_modes() {
        for input in ["", "x", "rw", "r++", "rbb", "b", "+r", "rb+x"] {
            assert!(
                matches!(Mode::parse(input), Err(Error::InvalidMode(_))),
                "{input}"
            );
        }
    }
}
