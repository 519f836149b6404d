//! The filesystem capability shared by the outer image and nested archives.

use std::io::{Read, Write};

use crate::error::Result;
use crate::handle::{FileHandle, Mode, Stream};

/// Either side of the bidirectional path↔ID addressing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRef<'a> {
    /// A slash-separated path.
    Path(&'a str),
    /// A 0-based slot ID.
    Id(u32),
}

impl<'a> From<&'a str> for FileRef<'a> {
    fn from(path: &'a str) -> Self {
        FileRef::Path(path)
    }
}

impl From<u32> for FileRef<'_> {
    fn from(id: u32) -> Self {
        FileRef::Id(id)
    }
}

/// An ordered collection of named byte slots with open/add/remove/rename
/// operations.
///
/// Implemented by [`crate::rom::RomFs`] (path-addressed through a folder
/// tree) and [`crate::plz::PlzArchive`] (flat, folder-less). Every mutating
/// operation either fully completes, with slots, name bookkeeping, and the
/// open-handle registry consistent, or fails before mutating anything.
pub trait Filesystem {
    /// Open the file at `file` with a mode string (`r`/`w`/`a`, optional `b`,
    /// optional `+` to create a missing path).
    ///
    /// The returned handle is an independent buffer; opening the same path
    /// twice is intentionally not deduplicated.
    fn open(&self, file: FileRef<'_>, mode: &str) -> Result<FileHandle>;

    /// Create an empty file at `path` and return its slot ID.
    fn add_file(&self, path: &str) -> Result<u32>;

    /// Remove the file at `path`, deleting its slot.
    fn remove_file(&self, path: &str) -> Result<()>;

    /// Rename the file at `path` in place; its slot ID does not change.
    fn rename_file(&self, path: &str, new_name: &str) -> Result<()>;

    /// Open with the UTF-8 text adapter applied, for modes without the `b`
    /// marker.
    fn open_text(&self, file: FileRef<'_>, mode: &str) -> Result<TextFile> {
        let parsed = Mode::parse(mode)?;
        if parsed.binary {
            return Err(crate::error::Error::InvalidMode(mode.to_owned()));
        }
        Ok(TextFile::new(self.open(file, mode)?))
    }
}

/// UTF-8 adapter over a binary handle: strings in, strings out, validation at
/// the string boundary.
pub struct TextFile {
    inner: FileHandle,
}

impl TextFile {
    pub fn new(inner: FileHandle) -> TextFile {
        TextFile { inner }
    }

    /// Read the rest of the handle as UTF-8 text.
    pub fn read_to_string(&mut self) -> Result<String> {
        let mut out = String::new();
        self.inner.read_to_string(&mut out)?;
        Ok(out)
    }

    /// Write a string to the handle.
    pub fn write_str(&mut self, text: &str) -> Result<()> {
        self.inner.write_all(text.as_bytes())?;
        Ok(())
    }

    /// Flush and release the underlying handle.
    pub fn close(&mut self) -> Result<()> {
        self.inner.close()
    }

    /// Give back the binary handle.
    pub fn into_inner(self) -> FileHandle {
        self.inner
    }
}
