//! Signature scanner
//!
//! Byte-pattern matching only. Nothing here validates that a match is a real
//! record; a signature that happens to sit inside file data is reported the
//! same way as a genuine header.

use crate::image::ArchiveImage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of every record signature
pub const SIGNATURE_LEN: usize = 4;

/// Record kinds recognised by their 4-byte signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureKind {
    /// Local file header, `PK\x03\x04`
    FileEntryHeader,
    /// Central directory file header, `PK\x01\x02`
    DirectoryEntryHeader,
    /// End of central directory record, `PK\x05\x06`
    EndOfDirectoryRecord,
}

impl SignatureKind {
    pub const ALL: [SignatureKind; 3] = [
        SignatureKind::FileEntryHeader,
        SignatureKind::DirectoryEntryHeader,
        SignatureKind::EndOfDirectoryRecord,
    ];

    /// Magic bytes, little-endian as they appear on disk
    pub const fn signature(self) -> [u8; SIGNATURE_LEN] {
        match self {
            SignatureKind::FileEntryHeader => *b"PK\x03\x04",
            SignatureKind::DirectoryEntryHeader => *b"PK\x01\x02",
            SignatureKind::EndOfDirectoryRecord => *b"PK\x05\x06",
        }
    }

    /// Fixed-size part of the record, signature included
    pub const fn record_len(self) -> usize {
        match self {
            SignatureKind::FileEntryHeader => 30,
            SignatureKind::DirectoryEntryHeader => 46,
            SignatureKind::EndOfDirectoryRecord => 22,
        }
    }

    fn from_window(window: &[u8]) -> Option<Self> {
        Self::ALL.into_iter().find(|k| window == k.signature())
    }
}

impl fmt::Display for SignatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignatureKind::FileEntryHeader => "file-entry header",
            SignatureKind::DirectoryEntryHeader => "directory-entry header",
            SignatureKind::EndOfDirectoryRecord => "end-of-directory record",
        };
        f.write_str(name)
    }
}

/// A signature match in a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignatureOccurrence {
    pub kind: SignatureKind,
    pub offset: usize,
}

/// Lazy left-to-right scan over a buffer.
///
/// Yields occurrences by ascending offset. Only the last end-of-directory
/// match in the buffer is reported, since that is the one a reader finds
/// when it searches backwards from the end. A clone taken before iterating
/// replays the same sequence.
#[derive(Debug, Clone)]
pub struct Scan<'a> {
    bytes: &'a [u8],
    pos: usize,
    last_eocd: Option<usize>,
}

/// Scan `bytes` for the three record signatures
pub fn scan(bytes: &[u8]) -> Scan<'_> {
    let eocd = SignatureKind::EndOfDirectoryRecord.signature();
    let last_eocd = bytes.windows(SIGNATURE_LEN).rposition(|w| w == eocd);
    Scan {
        bytes,
        pos: 0,
        last_eocd,
    }
}

impl Iterator for Scan<'_> {
    type Item = SignatureOccurrence;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos + SIGNATURE_LEN <= self.bytes.len() {
            let offset = self.pos;
            self.pos += 1;

            if self.bytes[offset] != b'P' {
                continue;
            }
            let Some(kind) = SignatureKind::from_window(&self.bytes[offset..offset + SIGNATURE_LEN])
            else {
                continue;
            };
            if kind == SignatureKind::EndOfDirectoryRecord && self.last_eocd != Some(offset) {
                continue;
            }
            return Some(SignatureOccurrence { kind, offset });
        }
        None
    }
}

impl std::iter::FusedIterator for Scan<'_> {}

/// Collected scan results, grouped for the selector
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetMap {
    occurrences: Vec<SignatureOccurrence>,
}

impl OffsetMap {
    /// Scan an image and collect every occurrence
    pub fn from_image(image: &ArchiveImage<'_>) -> Self {
        Self::from_bytes(image.as_bytes())
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let occurrences: Vec<_> = scan(bytes).collect();
        log::trace!(
            "scanned {} bytes: {} file, {} directory, {} end-of-directory",
            bytes.len(),
            occurrences.iter().filter(|o| o.kind == SignatureKind::FileEntryHeader).count(),
            occurrences.iter().filter(|o| o.kind == SignatureKind::DirectoryEntryHeader).count(),
            occurrences.iter().filter(|o| o.kind == SignatureKind::EndOfDirectoryRecord).count(),
        );
        Self { occurrences }
    }

    /// All occurrences, ascending by offset
    pub fn occurrences(&self) -> &[SignatureOccurrence] {
        &self.occurrences
    }

    /// Occurrences of one kind, ascending by offset
    pub fn of_kind(&self, kind: SignatureKind) -> impl Iterator<Item = &SignatureOccurrence> + '_ {
        self.occurrences.iter().filter(move |o| o.kind == kind)
    }

    pub fn count(&self, kind: SignatureKind) -> usize {
        self.of_kind(kind).count()
    }

    pub fn has(&self, kind: SignatureKind) -> bool {
        self.of_kind(kind).next().is_some()
    }

    /// Occurrence of `kind` at exactly `offset`, if any
    pub fn find(&self, kind: SignatureKind, offset: usize) -> Option<SignatureOccurrence> {
        self.of_kind(kind).find(|o| o.offset == offset).copied()
    }

    pub fn end_of_directory(&self) -> Option<SignatureOccurrence> {
        self.of_kind(SignatureKind::EndOfDirectoryRecord).next().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.occurrences.is_empty()
    }

    pub fn len(&self) -> usize {
        self.occurrences.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LFH: &[u8] = b"PK\x03\x04";
    const CDH: &[u8] = b"PK\x01\x02";
    const EOCD: &[u8] = b"PK\x05\x06";

    fn concat(parts: &[&[u8]]) -> Vec<u8> {
        parts.iter().flat_map(|p| p.iter().copied()).collect()
    }

    #[test]
    fn test_empty_and_short_buffers() {
        assert_eq!(scan(&[]).count(), 0);
        assert_eq!(scan(b"PK\x03").count(), 0);
        assert_eq!(scan(&[0u8; 64]).count(), 0);
    }

    #[test]
    fn test_finds_all_kinds_in_order() {
        let buf = concat(&[LFH, &[0; 10], LFH, &[1; 3], CDH, CDH, &[9; 2], EOCD, &[0; 18]]);
        let found: Vec<_> = scan(&buf).collect();

        assert_eq!(
            found,
            vec![
                SignatureOccurrence { kind: SignatureKind::FileEntryHeader, offset: 0 },
                SignatureOccurrence { kind: SignatureKind::FileEntryHeader, offset: 14 },
                SignatureOccurrence { kind: SignatureKind::DirectoryEntryHeader, offset: 21 },
                SignatureOccurrence { kind: SignatureKind::DirectoryEntryHeader, offset: 25 },
                SignatureOccurrence { kind: SignatureKind::EndOfDirectoryRecord, offset: 31 },
            ]
        );
    }

    #[test]
    fn test_signature_at_very_end() {
        let buf = concat(&[&[7; 5], CDH]);
        let found: Vec<_> = scan(&buf).collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].offset, 5);
    }

    #[test]
    fn test_only_last_end_of_directory_reported() {
        let buf = concat(&[EOCD, &[0; 4], EOCD, &[0; 4], EOCD]);
        let map = OffsetMap::from_bytes(&buf);

        assert_eq!(map.count(SignatureKind::EndOfDirectoryRecord), 1);
        assert_eq!(map.end_of_directory().unwrap().offset, 16);
    }

    #[test]
    fn test_false_positive_inside_data_is_kept() {
        let buf = concat(&[b"hello ", LFH, b" world"]);
        let map = OffsetMap::from_bytes(&buf);
        assert_eq!(map.count(SignatureKind::FileEntryHeader), 1);
        assert_eq!(map.find(SignatureKind::FileEntryHeader, 6).unwrap().offset, 6);
        assert!(map.find(SignatureKind::FileEntryHeader, 7).is_none());
    }

    #[test]
    fn test_scan_is_restartable() {
        let buf = concat(&[LFH, CDH, EOCD]);
        let fresh = scan(&buf);
        let first: Vec<_> = fresh.clone().collect();
        let second: Vec<_> = fresh.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }
}
