//! Well-formed sample archives
//!
//! Builds stored (uncompressed) ZIP files with correct CRC-32s. Used to seed a
//! fuzzing run when no base archive exists, and as the known-good reference
//! the header field offsets are checked against.

use crate::scanner::SignatureKind;

/// Version needed to extract: 2.0
const VERSION: u16 = 20;
/// Stored, no compression
const METHOD_STORED: u16 = 0;
/// 00:00:00
const DOS_TIME: u16 = 0;
/// 1980-01-01
const DOS_DATE: u16 = (1 << 5) | 1;

/// Where each entry landed in the built archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryLayout {
    pub name: String,
    pub local_header_offset: usize,
    pub directory_header_offset: usize,
    pub crc32: u32,
    pub size: usize,
}

/// Builder for a stored ZIP archive
#[derive(Debug, Clone, Default)]
pub struct SampleArchive {
    entries: Vec<(String, Vec<u8>)>,
    comment: Vec<u8>,
}

impl SampleArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// The default base archive: text, binary, empty, nested and long-named entries
    pub fn default_corpus() -> Self {
        let long_name = format!("very_long_name_{}.txt", "x".repeat(100));
        Self::new()
            .with_file(
                "normal_file.txt",
                "This is a normal text file for fuzzing".repeat(10).into_bytes(),
            )
            .with_file("binary_data.bin", (0..1000u32).map(|i| (i % 256) as u8).collect())
            .with_file("empty_file.txt", Vec::new())
            .with_file("folder/nested_file.txt", b"Nested file content".to_vec())
            .with_file(long_name, b"File with long name".to_vec())
    }

    /// Builder: add a file entry
    pub fn with_file(mut self, name: impl Into<String>, data: Vec<u8>) -> Self {
        self.entries.push((name.into(), data));
        self
    }

    /// Builder: set the archive comment
    pub fn with_comment(mut self, comment: impl Into<Vec<u8>>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize the archive
    pub fn build(&self) -> Vec<u8> {
        self.build_with_layout().0
    }

    /// Serialize the archive and report entry offsets
    pub fn build_with_layout(&self) -> (Vec<u8>, Vec<EntryLayout>) {
        let mut out = Vec::new();
        let mut layout = Vec::with_capacity(self.entries.len());

        for (name, data) in &self.entries {
            let crc32 = crc32fast::hash(data);
            layout.push(EntryLayout {
                name: name.clone(),
                local_header_offset: out.len(),
                directory_header_offset: 0,
                crc32,
                size: data.len(),
            });

            out.extend_from_slice(&SignatureKind::FileEntryHeader.signature());
            put_u16(&mut out, VERSION);
            put_u16(&mut out, 0);
            put_u16(&mut out, METHOD_STORED);
            put_u16(&mut out, DOS_TIME);
            put_u16(&mut out, DOS_DATE);
            put_u32(&mut out, crc32);
            put_u32(&mut out, to_u32(data.len()));
            put_u32(&mut out, to_u32(data.len()));
            let name = clip_u16(name.as_bytes());
            put_u16(&mut out, to_u16(name.len()));
            put_u16(&mut out, 0);
            out.extend_from_slice(name);
            out.extend_from_slice(data);
        }

        let directory_start = out.len();
        for entry in &mut layout {
            entry.directory_header_offset = out.len();

            out.extend_from_slice(&SignatureKind::DirectoryEntryHeader.signature());
            put_u16(&mut out, VERSION);
            put_u16(&mut out, VERSION);
            put_u16(&mut out, 0);
            put_u16(&mut out, METHOD_STORED);
            put_u16(&mut out, DOS_TIME);
            put_u16(&mut out, DOS_DATE);
            put_u32(&mut out, entry.crc32);
            put_u32(&mut out, to_u32(entry.size));
            put_u32(&mut out, to_u32(entry.size));
            let name = clip_u16(entry.name.as_bytes());
            put_u16(&mut out, to_u16(name.len()));
            put_u16(&mut out, 0); // extra
            put_u16(&mut out, 0); // comment
            put_u16(&mut out, 0); // disk start
            put_u16(&mut out, 0); // internal attributes
            put_u32(&mut out, 0); // external attributes
            put_u32(&mut out, to_u32(entry.local_header_offset));
            out.extend_from_slice(name);
        }
        let directory_len = out.len() - directory_start;

        out.extend_from_slice(&SignatureKind::EndOfDirectoryRecord.signature());
        put_u16(&mut out, 0);
        put_u16(&mut out, 0);
        put_u16(&mut out, to_u16(layout.len()));
        put_u16(&mut out, to_u16(layout.len()));
        put_u32(&mut out, to_u32(directory_len));
        put_u32(&mut out, to_u32(directory_start));
        let comment = clip_u16(&self.comment);
        put_u16(&mut out, to_u16(comment.len()));
        out.extend_from_slice(comment);

        (out, layout)
    }
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// Names and comments longer than their u16 length field are cut to fit
fn clip_u16(bytes: &[u8]) -> &[u8] {
    &bytes[..bytes.len().min(u16::MAX as usize)]
}

fn to_u16(v: usize) -> u16 {
    u16::try_from(v).unwrap_or(u16::MAX)
}

fn to_u32(v: usize) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{
        COMPRESSED_SIZE_OFFSET, COMPRESSION_METHOD_OFFSET, CRC32_OFFSET, UNCOMPRESSED_SIZE_OFFSET,
    };
    use crate::scanner::OffsetMap;

    fn read_u16(buf: &[u8], at: usize) -> u16 {
        u16::from_le_bytes([buf[at], buf[at + 1]])
    }

    fn read_u32(buf: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
    }

    #[test]
    fn test_scanner_finds_every_record() {
        let (bytes, layout) = SampleArchive::default_corpus().build_with_layout();
        let map = OffsetMap::from_bytes(&bytes);

        let files: Vec<usize> = map
            .of_kind(SignatureKind::FileEntryHeader)
            .map(|o| o.offset)
            .collect();
        let dirs: Vec<usize> = map
            .of_kind(SignatureKind::DirectoryEntryHeader)
            .map(|o| o.offset)
            .collect();

        assert_eq!(files, layout.iter().map(|e| e.local_header_offset).collect::<Vec<_>>());
        assert_eq!(dirs, layout.iter().map(|e| e.directory_header_offset).collect::<Vec<_>>());
        assert_eq!(map.end_of_directory().unwrap().offset, bytes.len() - 22);
    }

    #[test]
    fn test_local_header_field_offsets() {
        let (bytes, layout) = SampleArchive::new()
            .with_file("a.txt", b"hello zip".to_vec())
            .with_file("b.bin", vec![0xEE; 300])
            .build_with_layout();

        for entry in &layout {
            let at = entry.local_header_offset;
            assert_eq!(read_u16(&bytes, at + COMPRESSION_METHOD_OFFSET), METHOD_STORED);
            assert_eq!(read_u32(&bytes, at + CRC32_OFFSET), entry.crc32);
            assert_eq!(read_u32(&bytes, at + COMPRESSED_SIZE_OFFSET) as usize, entry.size);
            assert_eq!(read_u32(&bytes, at + UNCOMPRESSED_SIZE_OFFSET) as usize, entry.size);
        }
        assert_eq!(layout[0].crc32, crc32fast::hash(b"hello zip"));
    }

    #[test]
    fn test_directory_header_points_at_local_header() {
        let (bytes, layout) = SampleArchive::default_corpus().build_with_layout();
        for entry in &layout {
            // local header offset is the last fixed field of the 46-byte record
            let stored = read_u32(&bytes, entry.directory_header_offset + 42) as usize;
            assert_eq!(stored, entry.local_header_offset);
        }
    }

    #[test]
    fn test_oversized_name_is_cut_to_length_field() {
        let name = "n".repeat(70_000);
        let (bytes, layout) = SampleArchive::new()
            .with_file(name, b"data".to_vec())
            .with_comment(vec![b'c'; 70_000])
            .build_with_layout();
        let entry = &layout[0];

        assert_eq!(read_u16(&bytes, entry.local_header_offset + 26), u16::MAX);
        assert_eq!(
            entry.directory_header_offset,
            entry.local_header_offset + 30 + u16::MAX as usize + 4
        );
        assert_eq!(read_u16(&bytes, entry.directory_header_offset + 28), u16::MAX);

        let map = OffsetMap::from_bytes(&bytes);
        let eocd = map.end_of_directory().unwrap().offset;
        assert_eq!(read_u16(&bytes, eocd + 20), u16::MAX);
        assert_eq!(bytes.len(), eocd + 22 + u16::MAX as usize);
    }

    #[test]
    fn test_empty_archive_is_just_end_record() {
        let bytes = SampleArchive::new().with_comment(b"hi".to_vec()).build();
        assert_eq!(bytes.len(), 24);
        assert_eq!(&bytes[..4], b"PK\x05\x06");
        assert_eq!(read_u16(&bytes, 20), 2);
    }
}
