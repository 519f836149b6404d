//! Type-tagged compression handling.
//!
//! Compressed buffers inside a game image carry a one byte type tag in front
//! of the zlib stream. Some files duplicate that tag ("double typed"); the
//! duplication carries no information but has to survive a round-trip
//! byte-for-byte, so [`decompress`] reports it and [`compress`] reproduces it.
//!
//! | Offset | Field          | Description                                  |
//! |--------|----------------|----------------------------------------------|
//! | 0x00   | Type tag       | 1 byte: `0x02` (zlib)                        |
//! | 0x01   | Type tag (dup) | 1 byte: only present when double typed       |
//! | ...    | Payload        | zlib stream                                  |
//!
//! Detection of the duplicate is unambiguous: a zlib stream never begins with
//! the tag byte.

use std::io::{Read, Seek, SeekFrom, Write};

use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use tracing::{instrument, warn};

use crate::error::{Error, Result};
use crate::handle::Stream;

/// The type tag identifying a zlib payload.
pub const ZLIB_TAG: u8 = 0x02;

/// Decompress a type-tagged buffer.
///
/// Returns the plaintext and whether the type tag was duplicated. Pass
/// `Some(flag)` to skip detection when the variant is already known; an empty
/// buffer is only accepted together with an explicit flag.
#[instrument(skip(data), fields(len = data.len()))]
pub fn decompress(data: &[u8], double_typed: Option<bool>) -> Result<(Vec<u8>, bool)> {
    if data.is_empty() {
        return match double_typed {
            Some(flag) => Ok((Vec::new(), flag)),
            None => Err(Error::InvalidArchive),
        };
    }

    if data[0] != ZLIB_TAG {
        return Err(Error::UnknownCompressionTag(data[0]));
    }

    let double = match double_typed {
        Some(flag) => flag,
        None => data.len() > 1 && data[1] == ZLIB_TAG,
    };

    let payload = &data[1 + usize::from(double)..];
    let mut plain = Vec::new();
    ZlibDecoder::new(payload).read_to_end(&mut plain)?;

    Ok((plain, double))
}

/// Compress a buffer into the type-tagged container, duplicating the tag when
/// `double_typed` is set.
#[instrument(skip(data), fields(len = data.len()))]
pub fn compress(data: &[u8], double_typed: bool) -> Result<Vec<u8>> {
    let mut out = vec![ZLIB_TAG];
    if double_typed {
        out.push(ZLIB_TAG);
    }

    let mut encoder = ZlibEncoder::new(out, Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// A plaintext view over one compressed stream.
///
/// The underlying stream is read and decompressed eagerly on construction.
/// Flushing writes `compress(buffer, double_typed)` back, after truncating and
/// rewinding the underlying stream, but only when that stream is writable.
/// Call [`CompressedView::close`] on every path; the `Drop` implementation is
/// a best-effort backstop only.
pub struct CompressedView<'a> {
    inner: &'a mut dyn Stream,
    buf: std::io::Cursor<Vec<u8>>,
    double_typed: bool,
    closed: bool,
}

impl<'a> CompressedView<'a> {
    /// Wrap `stream`, decompressing its entire content into memory.
    ///
    /// `double_typed` follows the [`decompress`] convention: `None` detects
    /// the variant from the stream itself.
    pub fn new(stream: &'a mut dyn Stream, double_typed: Option<bool>) -> Result<Self> {
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw)?;

        let (plain, double) = decompress(&raw, double_typed)?;
        Ok(CompressedView {
            inner: stream,
            buf: std::io::Cursor::new(plain),
            double_typed: double,
            closed: false,
        })
    }

    /// Whether the wrapped stream stores its type tag twice.
    pub fn double_typed(&self) -> bool {
        self.double_typed
    }

    fn write_back(&mut self) -> Result<()> {
        if !self.inner.writable() {
            return Ok(());
        }

        let packed = compress(self.buf.get_ref(), self.double_typed)?;
        self.inner.truncate()?;
        self.inner.seek(SeekFrom::Start(0))?;
        self.inner.write_all(&packed)?;
        Ok(())
    }

    /// Flush the plaintext buffer into the underlying stream and close both.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.write_back()?;
        self.inner.close()
    }

    /// Flush the plaintext buffer back, leaving the underlying stream open
    /// for its owner.
    pub fn flush_back(mut self) -> Result<()> {
        self.closed = true;
        self.write_back()
    }

    /// Release the view without flushing or closing anything.
    pub fn discard(mut self) {
        self.closed = true;
    }
}

impl Read for CompressedView<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.buf.read(buf)
    }
}

impl Write for CompressedView<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buf.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.write_back()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        self.inner.flush()
    }
}

impl Seek for CompressedView<'_> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.buf.seek(pos)
    }
}

impl Stream for CompressedView<'_> {
    fn writable(&self) -> bool {
        self.inner.writable()
    }

    fn truncate(&mut self) -> std::io::Result<()> {
        self.buf.get_mut().clear();
        self.buf.set_position(0);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        CompressedView::close(self)
    }
}

impl Drop for CompressedView<'_> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                warn!("compressed view dropped without close: {e}");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use std::io::{Cursor, Read, Seek, SeekFrom, Write};

    use super::{compress, decompress, CompressedView, ZLIB_TAG};
    use crate::error::{Error, Result};

    #[test]
    fn roundtrip_single_typed() -> Result<()> {
        let plain = b"Hello World".to_vec();

        let packed = compress(&plain, false)?;
        assert_eq!(packed[0], ZLIB_TAG);
        assert_ne!(packed[1], ZLIB_TAG);

        let (unpacked, double) = decompress(&packed, None)?;
        assert_eq!(unpacked, plain);
        assert!(!double);

        Ok(())
    }

    #[test]
    fn roundtrip_double_typed() -> Result<()> {
        let plain = b"Hello World".to_vec();

        let packed = compress(&plain, true)?;
        assert_eq!(&packed[..2], &[ZLIB_TAG, ZLIB_TAG]);

        let (unpacked, double) = decompress(&packed, None)?;
        assert_eq!(unpacked, plain);
        assert!(double);

        // The flag alone decides the variant on re-encode.
        assert_eq!(compress(&unpacked, double)?, packed);

        Ok(())
    }

    #[test]
    fn explicit_flag_overrides_detection() -> Result<()> {
        let packed = compress(b"data", true)?;

        let (_, double) = decompress(&packed, Some(true))?;
        assert!(double);

        Ok(())
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let result = decompress(&[0x7F, 0x00, 0x01], None);
        assert!(matches!(result, Err(Error::UnknownCompressionTag(0x7F))));
    }

    #[test]
    fn empty_input_needs_explicit_flag() {
        assert!(matches!(decompress(&[], None), Err(Error::InvalidArchive)));
        assert!(decompress(&[], Some(false)).is_ok());
    }

    #[test]
    fn view_exposes_plaintext() -> Result<()> {
        let packed = compress(b"payload", false)?;
        let mut stream = Cursor::new(packed);

        let mut view = CompressedView::new(&mut stream, None)?;
        let mut plain = Vec::new();
        view.read_to_end(&mut plain)?;
        assert_eq!(plain, b"payload");
        view.close()?;

        Ok(())
    }

    #[test]
    fn view_writes_back_exact_variant() -> Result<()> {
        let packed = compress(b"before", true)?;
        let mut stream = Cursor::new(packed);

        let mut view = CompressedView::new(&mut stream, None)?;
        view.seek(SeekFrom::Start(0))?;
        view.write_all(b"after!")?;
        view.close()?;
        drop(view);

        let (plain, double) = decompress(stream.get_ref(), None)?;
        assert_eq!(plain, b"after!");
        assert!(double);

        Ok(())
    }
}
