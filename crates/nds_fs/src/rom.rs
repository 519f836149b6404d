//! The outer game-image filesystem.
//!
//! [`RomFs`] presents the image's flat, ordered slot sequence as a
//! hierarchical, path-addressable filesystem through a [`Folder`] tree, and
//! owns the cache of nested PCK2 archives decoded out of individual slots.
//!
//! ## Image Structure
//!
//! The serialized image is little-endian:
//!
//! | Field        | Description                                            |
//! |--------------|--------------------------------------------------------|
//! | Magic number | 4 bytes: "RFS1"                                        |
//! | File Count   | 4 bytes: number of slots                               |
//! | Folder Tree  | root folder, recursive (see below)                     |
//! | Slots        | per file: 4-byte size, then the raw bytes              |
//!
//! Each folder: `first_id: u32`, `file_count: u16`, `folder_count: u16`,
//! the null-terminated UTF-8 file names, then per subfolder its
//! null-terminated name followed by the subfolder encoding.

use std::cell::RefCell;
use std::io::{Read, Seek, Write};
use std::rc::Rc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use indexmap::IndexMap;
use tracing::{instrument, warn};

use crate::compression::{compress, decompress};
use crate::error::{Error, FileNotFoundError, Result};
use crate::handle::{FileHandle, HandleRegistry, Mode, SlotStore, Stream};
use crate::plz::PlzArchive;
use crate::tree::{split_path, Folder};
use crate::vfs::{FileRef, Filesystem};

const IMAGE_MAGIC: [u8; 4] = *b"RFS1";

/// A cached nested archive together with the compression variant it was
/// stored with, so saving reproduces the exact byte form.
#[derive(Debug)]
struct CachedArchive {
    archive: PlzArchive,
    double_typed: bool,
}

#[derive(Debug, Default)]
struct RomInner {
    files: Vec<Vec<u8>>,
    tree: Folder,
    handles: HandleRegistry,
    archives: IndexMap<String, CachedArchive>,
    in_get_archive: bool,
}

impl SlotStore for RomInner {
    fn read_slot(&self, id: u32) -> Vec<u8> {
        self.files[id as usize].clone()
    }

    fn write_slot(&mut self, id: u32, data: Vec<u8>) {
        self.files[id as usize] = data;
    }
}

/// The outer container filesystem: ordered slots, a folder tree, live handle
/// registry, and the one-instance-per-path archive cache.
///
/// Cloning is shallow; clones operate on the same filesystem.
#[derive(Debug, Clone, Default)]
pub struct RomFs {
    inner: Rc<RefCell<RomInner>>,
}

impl RomFs {
    /// Create an empty filesystem.
    pub fn new() -> RomFs {
        RomFs::default()
    }

    /// Build a filesystem from an already-resolved folder tree and slot
    /// sequence, as an outer image loader would produce them.
    pub fn from_parts(tree: Folder, files: Vec<Vec<u8>>) -> RomFs {
        RomFs {
            inner: Rc::new(RefCell::new(RomInner {
                files,
                tree,
                ..Default::default()
            })),
        }
    }

    /// Load a filesystem from its serialized image.
    #[instrument(skip(reader), err)]
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<RomFs> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != IMAGE_MAGIC {
            return Err(Error::InvalidArchive);
        }

        let file_count = reader.read_u32::<LittleEndian>()?;
        let tree = read_folder(reader)?;

        let mut files = Vec::with_capacity(file_count as usize);
        for _ in 0..file_count {
            let size = reader.read_u32::<LittleEndian>()?;
            let mut data = vec![0u8; size as usize];
            reader.read_exact(&mut data)?;
            files.push(data);
        }

        Ok(RomFs::from_parts(tree, files))
    }

    /// Serialize the current slot and folder layout. Cached archives are not
    /// flushed; use [`RomFs::save`] for the full two-phase write.
    #[instrument(skip_all, err)]
    pub fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        let inner = self.inner.borrow();

        writer.write_all(&IMAGE_MAGIC)?;
        writer.write_u32::<LittleEndian>(inner.files.len() as u32)?;
        write_folder(writer, &inner.tree)?;

        for data in &inner.files {
            writer.write_u32::<LittleEndian>(data.len() as u32)?;
            writer.write_all(data)?;
        }

        Ok(())
    }

    /// Persist the filesystem: first re-encode every cached archive into its
    /// backing slot (compressed with its recorded variant), then serialize
    /// the image itself.
    #[instrument(skip_all, err)]
    pub fn save<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        let packed: Vec<(String, Vec<u8>)> = {
            let inner = self.inner.borrow();
            inner
                .archives
                .iter()
                .map(|(path, cached)| {
                    let encoded = cached.archive.to_bytes()?;
                    Ok((path.clone(), compress(&encoded, cached.double_typed)?))
                })
                .collect::<Result<_>>()?
        };

        for (path, data) in packed {
            let id = self
                .inner
                .borrow()
                .tree
                .id_of(&path)
                .ok_or_else(|| FileNotFoundError::Path(path.clone()))?;
            self.inner.borrow_mut().files[id as usize] = data;
        }

        self.write(writer)
    }

    /// The nested archive stored in the slot at `path`.
    ///
    /// The first access decodes the slot; later calls return the same cached
    /// instance. An archive must not be opened any other way, or its edits
    /// will be lost on save.
    #[instrument(skip(self), err)]
    pub fn get_archive(&self, path: &str) -> Result<PlzArchive> {
        if let Some(cached) = self.inner.borrow().archives.get(path) {
            return Ok(cached.archive.clone());
        }

        self.inner.borrow_mut().in_get_archive = true;
        let decoded = (|| {
            let mut f = self.open(path.into(), "rb")?;
            let mut raw = Vec::new();
            f.read_to_end(&mut raw)?;
            f.close()?;

            let (plain, double_typed) = decompress(&raw, None)?;
            Ok::<_, Error>((PlzArchive::from_bytes(&plain)?, double_typed))
        })();
        self.inner.borrow_mut().in_get_archive = false;

        let (archive, double_typed) = decoded?;
        self.inner.borrow_mut().archives.insert(
            path.to_owned(),
            CachedArchive {
                archive: archive.clone(),
                double_typed,
            },
        );

        Ok(archive)
    }

    /// Move a file's content to a new path.
    ///
    /// Implemented as read-all + remove + write: the operation is not atomic,
    /// the file loses its slot ID, and the content is fully materialized in
    /// memory. A nested archive cached under `old_path` is neither relocated
    /// nor invalidated (known gap inherited from the image editors this
    /// models).
    pub fn move_file(&self, old_path: &str, new_path: &str) -> Result<()> {
        let mut data = Vec::new();
        let mut src = self.open(old_path.into(), "rb")?;
        src.read_to_end(&mut data)?;
        src.close()?;

        self.remove_file(old_path)?;

        let mut dst = self.open(new_path.into(), "wb+")?;
        dst.write_all(&data)?;
        dst.close()
    }

    /// Create an empty folder at `path`.
    pub fn add_folder(&self, path: &str) -> Result<()> {
        let parts = split_path(path);
        let Some((name, parents)) = parts.split_last() else {
            return Err(Error::FolderNotFound(path.to_owned()));
        };
        let parent_path = parents.join("/");

        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        let first_id = inner.files.len() as u32;
        let parent = inner
            .tree
            .folder_mut(&parent_path)
            .ok_or_else(|| Error::FolderNotFound(parent_path.clone()))?;
        parent.push_folder(name, Folder::new(first_id));
        Ok(())
    }

    /// Remove the folder at `path`. Fails before touching anything when the
    /// folder still holds files or subfolders.
    pub fn remove_folder(&self, path: &str) -> Result<()> {
        let parts = split_path(path);
        let Some((name, parents)) = parts.split_last() else {
            return Err(Error::FolderNotFound(path.to_owned()));
        };
        let parent_path = parents.join("/");

        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        let folder = inner
            .tree
            .folder(path)
            .ok_or_else(|| Error::FolderNotFound(path.to_owned()))?;
        if !folder.files().is_empty() || !folder.folders().is_empty() {
            return Err(Error::FolderNotEmpty(path.to_owned()));
        }

        let parent = inner
            .tree
            .folder_mut(&parent_path)
            .ok_or_else(|| Error::FolderNotFound(parent_path.clone()))?;
        parent.take_folder(name);
        Ok(())
    }

    /// Rename or move the folder at `old_path` to `new_path`. The node and
    /// all its bookkeeping move as-is; slot IDs do not change.
    pub fn rename_folder(&self, old_path: &str, new_path: &str) -> Result<()> {
        let old_parts = split_path(old_path);
        let new_parts = split_path(new_path);
        let (Some((old_name, old_parents)), Some((new_name, new_parents))) =
            (old_parts.split_last(), new_parts.split_last())
        else {
            return Err(Error::FolderNotFound(old_path.to_owned()));
        };
        let old_parent_path = old_parents.join("/");
        let new_parent_path = new_parents.join("/");

        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        if inner.tree.folder(old_path).is_none() {
            return Err(Error::FolderNotFound(old_path.to_owned()));
        }
        if inner.tree.folder(&new_parent_path).is_none() {
            return Err(Error::FolderNotFound(new_parent_path.clone()));
        }

        if old_parent_path == new_parent_path {
            // Same parent keeps the child position.
            if let Some(parent) = inner.tree.folder_mut(&old_parent_path) {
                parent.replace_folder_name(old_name, new_name);
            }
        } else {
            let node = inner
                .tree
                .folder_mut(&old_parent_path)
                .and_then(|parent| parent.take_folder(old_name))
                .ok_or_else(|| Error::FolderNotFound(old_path.to_owned()))?;
            if let Some(parent) = inner.tree.folder_mut(&new_parent_path) {
                parent.push_folder(new_name, node);
            }
        }
        Ok(())
    }

    /// Number of slots in the filesystem.
    pub fn file_count(&self) -> usize {
        self.inner.borrow().files.len()
    }

    /// Depth-first list of every `(path, id)` pair.
    pub fn walk(&self) -> Vec<(String, u32)> {
        self.inner.borrow().tree.walk()
    }

    /// The slot ID behind `path`, if any.
    pub fn id_of(&self, path: &str) -> Option<u32> {
        self.inner.borrow().tree.id_of(path)
    }

    /// The full path of slot `id`, if it is named in the tree.
    pub fn path_of(&self, id: u32) -> Option<String> {
        self.inner.borrow().tree.path_of(id)
    }

    /// The committed bytes of slot `id`.
    pub fn file_bytes(&self, id: u32) -> Option<Vec<u8>> {
        self.inner.borrow().files.get(id as usize).cloned()
    }

    /// A snapshot of the folder tree.
    pub fn tree(&self) -> Folder {
        self.inner.borrow().tree.clone()
    }

    /// Whether two values are views of the same filesystem instance.
    pub fn same_instance(&self, other: &RomFs) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Filesystem for RomFs {
    fn open(&self, file: FileRef<'_>, mode: &str) -> Result<FileHandle> {
        let mode = Mode::parse(mode)?;

        let (id, path) = match file {
            FileRef::Id(id) => {
                if (id as usize) >= self.inner.borrow().files.len() {
                    return Err(FileNotFoundError::Id(id).into());
                }
                (id, self.inner.borrow().tree.path_of(id))
            }
            FileRef::Path(p) => {
                let existing = self.inner.borrow().tree.id_of(p);
                let id = match existing {
                    Some(id) => id,
                    None if mode.create => self.add_file(p)?,
                    None => return Err(FileNotFoundError::Path(p.to_owned()).into()),
                };
                (id, Some(p.to_owned()))
            }
        };

        if let Some(path) = &path {
            if path.to_ascii_lowercase().ends_with(".plz") && !self.inner.borrow().in_get_archive {
                warn!("PLZ archive '{path}' not opened through get_archive");
            }
        }

        let entry = self.inner.borrow_mut().handles.register(id);
        let store: Rc<RefCell<dyn SlotStore>> = self.inner.clone();
        Ok(FileHandle::new(store, entry, mode))
    }

    fn add_file(&self, path: &str) -> Result<u32> {
        let (dir, name) = path.rsplit_once('/').unwrap_or(("", path));

        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        let folder = inner
            .tree
            .folder_mut(dir)
            .ok_or_else(|| FileNotFoundError::Path(path.to_owned()))?;
        let new_id = folder.push_file(name);

        inner.files.insert(new_id as usize, Vec::new());
        inner.tree.cascade_insert(new_id, &split_path(dir));
        inner.handles.shift_for_insert(new_id);

        Ok(new_id)
    }

    fn remove_file(&self, path: &str) -> Result<()> {
        let (dir, name) = path.rsplit_once('/').unwrap_or(("", path));

        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        let folder = inner
            .tree
            .folder_mut(dir)
            .ok_or_else(|| FileNotFoundError::Path(path.to_owned()))?;
        let index = folder
            .files()
            .iter()
            .position(|f| f == name)
            .ok_or_else(|| FileNotFoundError::Path(path.to_owned()))?;
        let id = folder.first_id() + index as u32;
        folder.remove_file_name(name);

        inner.files.remove(id as usize);
        inner.tree.cascade_remove(id);
        inner.handles.shift_for_remove(id);

        Ok(())
    }

    fn rename_file(&self, path: &str, new_name: &str) -> Result<()> {
        let (dir, name) = path.rsplit_once('/').unwrap_or(("", path));

        let mut guard = self.inner.borrow_mut();
        let folder = guard
            .tree
            .folder_mut(dir)
            .ok_or_else(|| FileNotFoundError::Path(path.to_owned()))?;
        if !folder.rename_file_name(name, new_name) {
            return Err(FileNotFoundError::Path(path.to_owned()).into());
        }
        Ok(())
    }
}

fn read_folder<R: Read>(reader: &mut R) -> Result<Folder> {
    let first_id = reader.read_u32::<LittleEndian>()?;
    let file_count = reader.read_u16::<LittleEndian>()?;
    let folder_count = reader.read_u16::<LittleEndian>()?;

    let mut folder = Folder::new(first_id);
    for _ in 0..file_count {
        let name = read_cstr(reader)?;
        folder.push_file(&name);
    }
    for _ in 0..folder_count {
        let name = read_cstr(reader)?;
        let child = read_folder(reader)?;
        folder.push_folder(&name, child);
    }
    Ok(folder)
}

fn write_folder<W: Write>(writer: &mut W, folder: &Folder) -> Result<()> {
    writer.write_u32::<LittleEndian>(folder.first_id())?;
    writer.write_u16::<LittleEndian>(folder.files().len() as u16)?;
    writer.write_u16::<LittleEndian>(folder.folders().len() as u16)?;

    for name in folder.files() {
        write_cstr(writer, name)?;
    }
    for (name, child) in folder.folders() {
        write_cstr(writer, name)?;
        write_folder(writer, child)?;
    }
    Ok(())
}

fn read_cstr<R: Read>(reader: &mut R) -> Result<String> {
    let mut raw = Vec::new();
    loop {
        let byte = reader.read_u8()?;
        if byte == b'\0' {
            break;
        }
        raw.push(byte);
    }
    String::from_utf8(raw).map_err(|_| Error::InvalidArchive)
}

fn write_cstr<W: Write>(writer: &mut W, text: &str) -> Result<()> {
    writer.write_all(text.as_bytes())?;
    writer.write_u8(b'\0')?;
    Ok(())
}
