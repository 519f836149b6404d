//! Uniform load/save entry points for serializable file formats.
//!
//! A type implements [`FileFormat`] by describing how it reads and writes its
//! own bytes; [`load`] and [`save`] then take care of where those bytes live
//! (an OS path, a file inside a virtual filesystem, or an already-open
//! stream) and of the compression container around them. The compression
//! variant is chosen per call, never baked into the format type, because the
//! same format appears both plain and compressed across images.

use std::io::{Read, Seek, Write};

use tracing::instrument;

use crate::compression::CompressedView;
use crate::error::Result;
use crate::handle::{OsStream, Stream};
use crate::vfs::{FileRef, Filesystem};

/// How a format's serialized bytes are wrapped on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionPolicy {
    /// Raw bytes, no container.
    #[default]
    Plain,
    /// Type-tagged zlib. Reading detects a duplicated tag and preserves it.
    Typed,
    /// Type-tagged zlib with the tag stored twice.
    DoubleTyped,
}

/// A format that can serialize itself to and from a byte stream.
///
/// Implementations only see plaintext; compression and stream lifetime are
/// handled by [`load`] and [`save`].
pub trait FileFormat: Sized {
    fn read_stream<R: Read + Seek>(reader: R) -> Result<Self>;

    fn write_stream<W: Write + Seek>(&self, writer: W) -> Result<()>;
}

/// Where to read a format from or write it to.
///
/// Streams obtained from the first two variants are opened and closed by the
/// orchestration; a [`Source::Stream`] is borrowed and handed back untouched
/// apart from the bytes read or written.
pub enum Source<'a> {
    /// A path on the host filesystem.
    Os(&'a str),
    /// A file inside a virtual filesystem.
    Vfs {
        fs: &'a dyn Filesystem,
        file: FileRef<'a>,
    },
    /// An already-open stream owned by the caller.
    Stream(&'a mut dyn Stream),
}

impl std::fmt::Debug for Source<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Source::Os(path) => f.debug_tuple("Os").field(path).finish(),
            Source::Vfs { file, .. } => f.debug_struct("Vfs").field("file", file).finish(),
            Source::Stream(_) => f.debug_tuple("Stream").finish(),
        }
    }
}

/// Read a format out of `source`, unwrapping compression per `policy`.
#[instrument(skip(source), err)]
pub fn load<F: FileFormat>(source: Source<'_>, policy: CompressionPolicy) -> Result<F> {
    match source {
        Source::Os(path) => {
            let mut stream = OsStream::open(path)?;
            let value = read_via(&mut stream, policy, true)?;
            stream.close()?;
            Ok(value)
        }
        Source::Vfs { fs, file } => {
            let mut handle = fs.open(file, "rb")?;
            let value = read_via(&mut handle, policy, true)?;
            handle.close()?;
            Ok(value)
        }
        Source::Stream(stream) => read_via(stream, policy, false),
    }
}

/// Write a format into `target`, wrapping it per `policy`. Missing virtual
/// filesystem paths are created.
#[instrument(skip(value, target), err)]
pub fn save<F: FileFormat>(
    value: &F,
    target: Source<'_>,
    policy: CompressionPolicy,
) -> Result<()> {
    match target {
        Source::Os(path) => {
            let mut stream = OsStream::create(path)?;
            write_via(value, &mut stream, policy, true)?;
            stream.close()
        }
        Source::Vfs { fs, file } => {
            let mut handle = fs.open(file, "wb+")?;
            write_via(value, &mut handle, policy, true)?;
            handle.close()
        }
        Source::Stream(stream) => write_via(value, stream, policy, false),
    }
}

fn read_via<F: FileFormat>(
    stream: &mut dyn Stream,
    policy: CompressionPolicy,
    owned: bool,
) -> Result<F> {
    let hint = match policy {
        CompressionPolicy::Plain => return F::read_stream(&mut *stream),
        // Single-typed streams go through detection, so a file that turned
        // out double typed keeps its variant.
        CompressionPolicy::Typed => None,
        CompressionPolicy::DoubleTyped => Some(true),
    };

    let mut view = CompressedView::new(stream, hint)?;
    let value = F::read_stream(&mut view)?;
    if owned {
        view.close()?;
    } else {
        view.discard();
    }
    Ok(value)
}

fn write_via<F: FileFormat>(
    value: &F,
    stream: &mut dyn Stream,
    policy: CompressionPolicy,
    owned: bool,
) -> Result<()> {
    let double_typed = match policy {
        CompressionPolicy::Plain => return value.write_stream(&mut *stream),
        CompressionPolicy::Typed => false,
        CompressionPolicy::DoubleTyped => true,
    };

    let mut view = CompressedView::new(stream, Some(double_typed))?;
    view.truncate()?;
    value.write_stream(&mut view)?;
    if owned {
        view.close()
    } else {
        view.flush_back()
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use std::io::{Cursor, Read, Seek, Write};

    use super::{load, save, CompressionPolicy, FileFormat, Source};
    use crate::compression::{decompress, ZLIB_TAG};
    use crate::error::{Error, Result};
    use crate::rom::RomFs;
    use crate::tree::Folder;

    #[derive(Debug, PartialEq)]
    struct Greeting {
        text: String,
    }

    impl FileFormat for Greeting {
        fn read_stream<R: Read + Seek>(mut reader: R) -> Result<Self> {
            let mut raw = Vec::new();
            reader.read_to_end(&mut raw)?;
            let text = String::from_utf8(raw).map_err(|_| Error::InvalidArchive)?;
            Ok(Greeting { text })
        }

        fn write_stream<W: Write + Seek>(&self, mut writer: W) -> Result<()> {
            writer.write_all(self.text.as_bytes())?;
            Ok(())
        }
    }

    #[test]
    fn plain_roundtrip_through_borrowed_stream() -> Result<()> {
        let greeting = Greeting {
            text: "hello".to_owned(),
        };

        let mut stream = Cursor::new(Vec::new());
        save(&greeting, Source::Stream(&mut stream), CompressionPolicy::Plain)?;
        assert_eq!(stream.get_ref(), b"hello");

        stream.set_position(0);
        let back: Greeting = load(Source::Stream(&mut stream), CompressionPolicy::Plain)?;
        assert_eq!(back, greeting);

        Ok(())
    }

    #[test]
    fn typed_policy_stores_tagged_zlib() -> Result<()> {
        let greeting = Greeting {
            text: "compressed payload".to_owned(),
        };

        let mut stream = Cursor::new(Vec::new());
        save(&greeting, Source::Stream(&mut stream), CompressionPolicy::Typed)?;

        let stored = stream.get_ref().clone();
        assert_eq!(stored[0], ZLIB_TAG);
        assert_ne!(stored[1], ZLIB_TAG);
        let (plain, double) = decompress(&stored, None)?;
        assert_eq!(plain, b"compressed payload");
        assert!(!double);

        stream.set_position(0);
        let back: Greeting = load(Source::Stream(&mut stream), CompressionPolicy::Typed)?;
        assert_eq!(back, greeting);

        Ok(())
    }

    #[test]
    fn typed_read_keeps_a_double_typed_variant() -> Result<()> {
        let packed = crate::compression::compress(b"either way", true)?;
        let mut stream = Cursor::new(packed);

        let back: Greeting = load(Source::Stream(&mut stream), CompressionPolicy::Typed)?;
        assert_eq!(back.text, "either way");

        Ok(())
    }

    #[test]
    fn vfs_save_creates_and_wraps() -> Result<()> {
        let mut root = Folder::new(0);
        root.push_folder("data", Folder::new(0));
        let fs = RomFs::from_parts(root, Vec::new());

        let greeting = Greeting {
            text: "stored in a slot".to_owned(),
        };
        save(
            &greeting,
            Source::Vfs {
                fs: &fs,
                file: "data/hello.txt".into(),
            },
            CompressionPolicy::DoubleTyped,
        )?;

        let stored = fs.file_bytes(0).unwrap();
        assert_eq!(&stored[..2], &[ZLIB_TAG, ZLIB_TAG]);

        let back: Greeting = load(
            Source::Vfs {
                fs: &fs,
                file: "data/hello.txt".into(),
            },
            CompressionPolicy::DoubleTyped,
        )?;
        assert_eq!(back, greeting);

        Ok(())
    }

    #[test]
    fn borrowed_read_stream_is_left_untouched() -> Result<()> {
        let packed = crate::compression::compress(b"original", false)?;
        let mut stream = Cursor::new(packed.clone());

        let _: Greeting = load(Source::Stream(&mut stream), CompressionPolicy::Typed)?;

        // Reading must not rewrite the stream, even though a cursor is
        // writable.
        assert_eq!(stream.get_ref(), &packed);

        Ok(())
    }
}
