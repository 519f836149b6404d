//! This library handles reading from and editing the virtual filesystem of *Nintendo DS* game images.
//!
//! # Virtual Filesystem Documentation
//!
//! A game image stores its files as one flat, ordered sequence of byte slots.
//! A file is addressed either by its 0-based **slot ID** or by a
//! slash-separated **path**; the folder tree that assigns names and nesting
//! is pure bookkeeping layered over the slot sequence. Two filesystem
//! variants share the same capability surface:
//!
//! - [`RomFs`]: the outer image, path-addressed through a folder tree, with
//!   folder operations and a cache of nested archives.
//! - [`PlzArchive`]: a flat, folder-less **PCK2** archive stored compressed
//!   inside one slot of the outer image.
//!
//! ## Slot IDs
//!
//! A file's ID is its position in the slot sequence: every folder records the
//! lowest ID owned by its subtree, and a file's ID is that base plus its
//! position in the folder's file list. IDs are dense; adding or removing a
//! file shifts every ID behind it, including those held by open handles.
//!
//! ## PCK2 Archive Format
//!
//! A PCK2 archive is a header followed by self-delimiting records:
//!
//! | Offset (bytes) | Field         | Description                             |
//! |----------------|---------------|-----------------------------------------|
//! | 0x0000         | Header Size   | 4 bytes: size of this header (16)       |
//! | 0x0004         | Total Size    | 4 bytes: size of the whole archive      |
//! | 0x0008         | Magic number  | 4 bytes: "PCK2"                         |
//! | 0x000C         | Reserved      | 4 bytes: zero                           |
//!
//! Each record:
//!
//! | Offset (bytes) | Field         | Description                             |
//! |----------------|---------------|-----------------------------------------|
//! | 0x0000         | Header Size   | 4 bytes: record start to payload start  |
//! | 0x0004         | Total Size    | 4 bytes: record start to next record    |
//! | 0x0008         | Reserved      | 4 bytes: zero                           |
//! | 0x000C         | Payload Size  | 4 bytes: unpadded payload length        |
//! | 0x0010         | Name          | Shift JIS, null terminated, zero padded |
//! | ...            | Payload       | raw bytes, zero padded                  |
//!
//! ## Additional Information
//!
//! - **File Extension**: `.plz` (compressed PCK2 archives)
//! - **Endianness**: Little-endian for all multi-byte integers
//! - **Compression**: one-byte type tag (`0x02` = zlib) in front of the zlib
//!   stream, optionally duplicated (see [`compression`])

pub mod compression;
pub mod error;
pub mod format;
pub mod handle;
pub mod plz;
pub mod rom;
pub mod tree;
pub mod vfs;

pub use compression::CompressedView;
pub use error::{Error, Result};
pub use format::{load, save, CompressionPolicy, FileFormat, Source};
pub use handle::{FileHandle, Mode, OpenMode, OsStream, Stream};
pub use plz::PlzArchive;
pub use rom::RomFs;
pub use tree::Folder;
pub use vfs::{FileRef, Filesystem, TextFile};
