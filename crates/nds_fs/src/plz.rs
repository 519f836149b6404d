//! The nested PCK2 archive: a flat, folder-less filesystem encoded into a
//! single byte buffer.
//!
//! ## File Structure
//!
//! A PCK2 file is a 16-byte header followed by back-to-back records. All
//! multi-byte integers are little-endian.
//!
//! | Offset (bytes) | Field        | Description                              |
//! |----------------|--------------|------------------------------------------|
//! | 0x0000         | Header Size  | 4 bytes: offset of the first record (16) |
//! | 0x0004         | Total Size   | 4 bytes: length of the whole archive     |
//! | 0x0008         | Magic number | 4 bytes: "PCK2"                          |
//! | 0x000C         | Reserved     | 4 bytes                                  |
//!
//! Each record:
//!
//! | Offset (bytes) | Field        | Description                              |
//! |----------------|--------------|------------------------------------------|
//! | 0x0000         | Header Size  | 4 bytes: offset of the payload           |
//! | 0x0004         | Record Size  | 4 bytes: offset of the next record       |
//! | 0x0008         | Reserved     | 4 bytes                                  |
//! | 0x000C         | Payload Size | 4 bytes: length of the raw payload       |
//! | 0x0010         | Name         | Shift-JIS, null-terminated               |
//! | ...            | Padding      | zero bytes up to Header Size             |
//! | Header Size    | Payload      | Payload Size raw bytes                   |
//! | ...            | Padding      | zero bytes up to Record Size             |
//!
//! Sizes are written pre-padded: header and record sizes are always rounded
//! up past the next 4-byte boundary (a full 4 bytes of padding when already
//! aligned — the games' own packer does this, so round-trips depend on it).
//! The reader never derives the next record's position from content lengths;
//! it jumps by the declared record size, which tolerates alignment gaps.

use std::cell::RefCell;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::rc::Rc;

use binrw::{BinRead, BinWrite};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use encoding_rs::SHIFT_JIS;
use tracing::instrument;

use crate::error::{Error, FileNotFoundError, Result};
use crate::handle::{FileHandle, HandleRegistry, Mode, SlotStore};
use crate::vfs::{FileRef, Filesystem};

const PLZ_MAGIC: [u8; 4] = *b"PCK2";
const PLZ_HEADER_SIZE: u32 = 16;

/// Round `n` up past the next 4-byte boundary. Always adds at least one byte.
fn pad4(n: u32) -> u32 {
    n + (4 - n % 4)
}

#[derive(BinRead, BinWrite, Debug, Clone, Copy, PartialEq)]
#[brw(little)]
struct PlzHeader {
    header_size: u32,
    total_size: u32,
    magic: [u8; 4],
    reserved: u32,
}

#[derive(BinRead, BinWrite, Debug, Default, Clone, Copy, PartialEq)]
#[brw(little)]
struct PlzRecord {
    header_size: u32,
    total_size: u32,
    reserved: u32,
    payload_size: u32,
}

#[derive(Debug, Default)]
struct PlzInner {
    filenames: Vec<String>,
    files: Vec<Vec<u8>>,
    handles: HandleRegistry,
}

impl SlotStore for PlzInner {
    fn read_slot(&self, id: u32) -> Vec<u8> {
        self.files[id as usize].clone()
    }

    fn write_slot(&mut self, id: u32, data: Vec<u8>) {
        self.files[id as usize] = data;
    }
}

/// An in-memory PCK2 archive.
///
/// IDs are plain positions in a parallel (names, buffers) pair; adding a file
/// appends at the end, so unlike the outer filesystem there is no folder
/// cascade. Cloning is shallow — clones share the same archive, which is what
/// the outer filesystem's archive cache hands out.
#[derive(Debug, Clone, Default)]
pub struct PlzArchive {
    inner: Rc<RefCell<PlzInner>>,
}

impl PlzArchive {
    /// Create an empty archive.
    pub fn new() -> PlzArchive {
        PlzArchive::default()
    }

    /// Decode an archive from a PCK2 byte stream.
    #[instrument(skip(reader), err)]
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<PlzArchive> {
        let header = PlzHeader::read(reader)?;
        if header.magic != PLZ_MAGIC {
            return Err(Error::InvalidArchive);
        }

        let mut inner = PlzInner::default();

        reader.seek(SeekFrom::Start(header.header_size as u64))?;
        while reader.stream_position()? < header.total_size as u64 {
            let start = reader.stream_position()?;
            let record = PlzRecord::read(reader)?;

            let mut raw_name = Vec::new();
            loop {
                let byte = reader.read_u8()?;
                if byte == b'\0' {
                    break;
                }
                raw_name.push(byte);
            }
            let (name, _, _) = SHIFT_JIS.decode(&raw_name);

            reader.seek(SeekFrom::Start(start + record.header_size as u64))?;
            let mut payload = vec![0u8; record.payload_size as usize];
            reader.read_exact(&mut payload)?;

            // Jump by the declared record size, never by content length.
            reader.seek(SeekFrom::Start(start + record.total_size as u64))?;

            inner.filenames.push(name.into_owned());
            inner.files.push(payload);
        }

        Ok(PlzArchive {
            inner: Rc::new(RefCell::new(inner)),
        })
    }

    /// Decode an archive from a byte buffer.
    pub fn from_bytes(data: &[u8]) -> Result<PlzArchive> {
        PlzArchive::read(&mut Cursor::new(data))
    }

    /// Encode the archive as a PCK2 byte stream.
    #[instrument(skip_all, err)]
    pub fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        let inner = self.inner.borrow();

        PlzHeader {
            header_size: PLZ_HEADER_SIZE,
            total_size: 0, // patched below
            magic: PLZ_MAGIC,
            reserved: 0,
        }
        .write(writer)?;

        for (name, data) in inner.filenames.iter().zip(&inner.files) {
            let (encoded, _, _) = SHIFT_JIS.encode(name);
            let header_size = pad4(16 + encoded.len() as u32 + 1);
            let total_size = pad4(header_size + data.len() as u32);

            let start = writer.stream_position()?;
            PlzRecord {
                header_size,
                total_size,
                reserved: 0,
                payload_size: data.len() as u32,
            }
            .write(writer)?;

            writer.write_all(&encoded)?;
            writer.write_u8(b'\0')?;
            pad_to(writer, start + header_size as u64)?;

            writer.write_all(data)?;
            pad_to(writer, start + total_size as u64)?;
        }

        let end = writer.stream_position()?;
        writer.seek(SeekFrom::Start(4))?;
        writer.write_u32::<LittleEndian>(end as u32)?;
        writer.seek(SeekFrom::Start(end))?;

        Ok(())
    }

    /// Encode the archive into a byte buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        self.write(&mut out)?;
        Ok(out.into_inner())
    }

    /// Number of entries in the archive.
    pub fn len(&self) -> usize {
        self.inner.borrow().files.len()
    }

    /// Whether the archive contains no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry names in slot order.
    pub fn file_names(&self) -> Vec<String> {
        self.inner.borrow().filenames.clone()
    }

    /// The committed bytes of the entry at `id`.
    pub fn file_bytes(&self, id: u32) -> Option<Vec<u8>> {
        self.inner.borrow().files.get(id as usize).cloned()
    }

    /// The ID of the entry named `name`, if present.
    pub fn id_for_name(&self, name: &str) -> Option<u32> {
        self.inner
            .borrow()
            .filenames
            .iter()
            .position(|f| f == name)
            .map(|i| i as u32)
    }

    /// Whether two values are views of the same archive instance.
    pub fn same_instance(&self, other: &PlzArchive) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Filesystem for PlzArchive {
    fn open(&self, file: FileRef<'_>, mode: &str) -> Result<FileHandle> {
        let mode = Mode::parse(mode)?;

        let id = match file {
            FileRef::Id(id) => {
                if (id as usize) >= self.len() {
                    return Err(FileNotFoundError::Id(id).into());
                }
                id
            }
            FileRef::Path(path) => match self.id_for_name(path) {
                Some(id) => id,
                None if mode.create => self.add_file(path)?,
                None => return Err(FileNotFoundError::Path(path.to_owned()).into()),
            },
        };

        let entry = self.inner.borrow_mut().handles.register(id);
        let store: Rc<RefCell<dyn SlotStore>> = self.inner.clone();
        Ok(FileHandle::new(store, entry, mode))
    }

    fn add_file(&self, path: &str) -> Result<u32> {
        let mut inner = self.inner.borrow_mut();
        let id = inner.files.len() as u32;
        inner.filenames.push(path.to_owned());
        inner.files.push(Vec::new());
        Ok(id)
    }

    fn remove_file(&self, path: &str) -> Result<()> {
        let id = self
            .id_for_name(path)
            .ok_or_else(|| FileNotFoundError::Path(path.to_owned()))?;

        let mut inner = self.inner.borrow_mut();
        inner.filenames.remove(id as usize);
        inner.files.remove(id as usize);
        inner.handles.shift_for_remove(id);
        Ok(())
    }

    fn rename_file(&self, path: &str, new_name: &str) -> Result<()> {
        let id = self
            .id_for_name(path)
            .ok_or_else(|| FileNotFoundError::Path(path.to_owned()))?;

        self.inner.borrow_mut().filenames[id as usize] = new_name.to_owned();
        Ok(())
    }
}

fn pad_to<W: Write + Seek>(writer: &mut W, target: u64) -> Result<()> {
    let mut pos = writer.stream_position()?;
    while pos < target {
        writer.write_u8(0)?;
        pos += 1;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use std::io::{Cursor, Read, Write};

    use super::PlzArchive;
    use crate::error::{Error, Result};
    use crate::handle::Stream;
    use crate::vfs::Filesystem;

    #[rustfmt::skip]
    const TWO_ENTRY_ARCHIVE: [u8; 64] = [
        // Header (16)
        0x10, 0x00, 0x00, 0x00,
        0x40, 0x00, 0x00, 0x00,
        0x50, 0x43, 0x4B, 0x32,
        0x00, 0x00, 0x00, 0x00,
        // Record "x" = [01 02 03] (24)
        0x14, 0x00, 0x00, 0x00,
        0x18, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00,
        0x03, 0x00, 0x00, 0x00,
        0x78, 0x00, 0x00, 0x00,
        0x01, 0x02, 0x03, 0x00,
        // Record "yy" = [] (24)
        0x14, 0x00, 0x00, 0x00,
        0x18, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00,
        0x79, 0x79, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00,
    ];

    #[test]
    fn read_invalid_magic() {
        let mut input = TWO_ENTRY_ARCHIVE;
        input[8] = 0x40;

        assert!(matches!(
            PlzArchive::from_bytes(&input),
            Err(Error::InvalidArchive)
        ));
    }

    #[test]
    fn read_two_entry_archive() -> Result<()> {
        let plz = PlzArchive::from_bytes(&TWO_ENTRY_ARCHIVE)?;

        assert_eq!(plz.len(), 2);
        assert_eq!(plz.file_names(), vec!["x".to_owned(), "yy".to_owned()]);
        assert_eq!(plz.file_bytes(0), Some(vec![0x01, 0x02, 0x03]));
        assert_eq!(plz.file_bytes(1), Some(Vec::new()));

        Ok(())
    }

    #[test]
    fn write_two_entry_archive() -> Result<()> {
        let plz = PlzArchive::new();
        for (name, data) in [("x", vec![0x01u8, 0x02, 0x03]), ("yy", vec![])] {
            plz.add_file(name)?;
            let mut f = plz.open(name.into(), "wb")?;
            f.write_all(&data)?;
            f.close()?;
        }

        assert_eq!(plz.to_bytes()?, TWO_ENTRY_ARCHIVE.to_vec());

        Ok(())
    }

    #[test]
    fn decode_encode_roundtrip() -> Result<()> {
        let plz = PlzArchive::from_bytes(&TWO_ENTRY_ARCHIVE)?;
        assert_eq!(plz.to_bytes()?, TWO_ENTRY_ARCHIVE.to_vec());

        Ok(())
    }

    #[test]
    fn reader_jumps_by_declared_record_size() -> Result<()> {
        // Widen the first record by 4 bytes of slack; the payload and the
        // second record must still be found through the declared sizes.
        let mut input = Vec::from(TWO_ENTRY_ARCHIVE);
        input.splice(40..40, [0u8; 4]);
        input[16 + 4] = 0x1C; // first record total_size 24 -> 28
        input[4] = 0x44; // archive total_size 64 -> 68

        let plz = PlzArchive::from_bytes(&input)?;
        assert_eq!(plz.len(), 2);
        assert_eq!(plz.file_bytes(0), Some(vec![0x01, 0x02, 0x03]));
        assert_eq!(plz.file_names()[1], "yy");

        Ok(())
    }

    #[test]
    fn empty_archive_roundtrip() -> Result<()> {
        #[rustfmt::skip]
        let expected = vec![
            0x10, 0x00, 0x00, 0x00,
            0x10, 0x00, 0x00, 0x00,
            0x50, 0x43, 0x4B, 0x32,
            0x00, 0x00, 0x00, 0x00,
        ];

        let encoded = PlzArchive::new().to_bytes()?;
        assert_eq!(encoded, expected);
        assert!(PlzArchive::from_bytes(&encoded)?.is_empty());

        Ok(())
    }

    #[test]
    fn shift_jis_names_survive_roundtrip() -> Result<()> {
        let plz = PlzArchive::new();
        plz.add_file("データ.dat")?;

        let decoded = PlzArchive::from_bytes(&plz.to_bytes()?)?;
        assert_eq!(decoded.file_names(), vec!["データ.dat".to_owned()]);

        Ok(())
    }

    #[test]
    fn filesystem_operations() -> Result<()> {
        let plz = PlzArchive::new();

        assert_eq!(plz.add_file("a.gds")?, 0);
        assert_eq!(plz.add_file("b.gds")?, 1);

        let mut f = plz.open("b.gds".into(), "wb")?;
        f.write_all(b"content")?;
        f.close()?;
        assert_eq!(plz.file_bytes(1), Some(b"content".to_vec()));

        plz.rename_file("a.gds", "c.gds")?;
        assert_eq!(plz.id_for_name("c.gds"), Some(0));

        plz.remove_file("c.gds")?;
        assert_eq!(plz.len(), 1);
        assert_eq!(plz.id_for_name("b.gds"), Some(0));

        assert!(matches!(
            plz.remove_file("missing"),
            Err(Error::FileNotFound(_))
        ));

        Ok(())
    }

    #[test]
    fn removal_shifts_open_handles() -> Result<()> {
        let plz = PlzArchive::new();
        plz.add_file("first")?;
        plz.add_file("second")?;

        let mut second = plz.open("second".into(), "wb")?;
        plz.remove_file("first")?;

        assert_eq!(second.id(), 0);
        second.write_all(b"shifted")?;
        second.close()?;
        assert_eq!(plz.file_bytes(0), Some(b"shifted".to_vec()));

        Ok(())
    }

    #[test]
    fn open_create_flag() -> Result<()> {
        let plz = PlzArchive::new();

        assert!(plz.open("fresh".into(), "rb").is_err());

        let mut f = plz.open("fresh".into(), "wb+")?;
        f.write_all(b"made")?;
        f.close()?;

        let mut readback = Vec::new();
        plz.open("fresh".into(), "rb")?.read_to_end(&mut readback)?;
        assert_eq!(readback, b"made");

        Ok(())
    }
}
