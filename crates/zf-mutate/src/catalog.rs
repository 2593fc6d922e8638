//! Mutation catalog
//!
//! Ten independent strategies. Each one reads the image, writes into a
//! private copy, and reports the byte range it touched. Every window is
//! clamped to the buffer: a window that lands entirely past the end turns the
//! strategy into a no-op that returns an unchanged copy.

use crate::config::MutationConfig;
use crate::error::MutationError;
use crate::image::ArchiveImage;
use crate::rng::RandomnessSource;
use crate::scanner::{SignatureKind, SignatureOccurrence, SIGNATURE_LEN};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

// ============================================================================
// Kinds
// ============================================================================

/// The fixed set of mutation strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    /// Random bytes over the 30 bytes following a file-entry signature
    CorruptFileHeaderWindow,
    /// Random bytes over the 46 bytes following a directory-entry signature
    CorruptDirectoryHeaderWindow,
    /// New compression method in a file-entry header
    MutateCompressionMethod,
    /// New CRC-32 in a file-entry header
    MutateChecksum,
    /// New compressed and/or uncompressed size in a file-entry header
    MutateSizeFields,
    /// Splice a synthetic record into the buffer
    InsertSyntheticHeader,
    /// Flip 1-8 bits of one byte
    FlipRandomBits,
    /// Overwrite one byte with a boundary value
    SetBoundaryByte,
    /// Overwrite a run of bytes with one constant
    ReplaceRunWithConstant,
    /// Add, subtract or multiply one byte
    ArithmeticPerturb,
}

impl MutationKind {
    pub const ALL: [MutationKind; 10] = [
        MutationKind::CorruptFileHeaderWindow,
        MutationKind::CorruptDirectoryHeaderWindow,
        MutationKind::MutateCompressionMethod,
        MutationKind::MutateChecksum,
        MutationKind::MutateSizeFields,
        MutationKind::InsertSyntheticHeader,
        MutationKind::FlipRandomBits,
        MutationKind::SetBoundaryByte,
        MutationKind::ReplaceRunWithConstant,
        MutationKind::ArithmeticPerturb,
    ];

    /// Position in [`MutationKind::ALL`] and in the dispatch table
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Stable name used on the command line and in descriptors
    pub const fn name(self) -> &'static str {
        match self {
            MutationKind::CorruptFileHeaderWindow => "corrupt_file_header_window",
            MutationKind::CorruptDirectoryHeaderWindow => "corrupt_directory_header_window",
            MutationKind::MutateCompressionMethod => "mutate_compression_method",
            MutationKind::MutateChecksum => "mutate_checksum",
            MutationKind::MutateSizeFields => "mutate_size_fields",
            MutationKind::InsertSyntheticHeader => "insert_synthetic_header",
            MutationKind::FlipRandomBits => "flip_random_bits",
            MutationKind::SetBoundaryByte => "set_boundary_byte",
            MutationKind::ReplaceRunWithConstant => "replace_run_with_constant",
            MutationKind::ArithmeticPerturb => "arithmetic_perturb",
        }
    }

    /// Record kind this strategy must be aimed at, `None` for statistical kinds
    pub const fn required_target(self) -> Option<SignatureKind> {
        match self {
            MutationKind::CorruptFileHeaderWindow
            | MutationKind::MutateCompressionMethod
            | MutationKind::MutateChecksum
            | MutationKind::MutateSizeFields => Some(SignatureKind::FileEntryHeader),
            MutationKind::CorruptDirectoryHeaderWindow => Some(SignatureKind::DirectoryEntryHeader),
            MutationKind::InsertSyntheticHeader
            | MutationKind::FlipRandomBits
            | MutationKind::SetBoundaryByte
            | MutationKind::ReplaceRunWithConstant
            | MutationKind::ArithmeticPerturb => None,
        }
    }

    pub const fn is_structure_aware(self) -> bool {
        self.required_target().is_some()
    }

    /// Whether output length may differ from input length
    pub const fn changes_length(self) -> bool {
        matches!(self, MutationKind::InsertSyntheticHeader)
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MutationKind {
    type Err = MutationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_").to_ascii_lowercase();
        MutationKind::ALL
            .into_iter()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| MutationError::UnknownKind(s.to_string()))
    }
}

// ============================================================================
// Requests and outputs
// ============================================================================

/// One fully decided mutation: what to run and where.
///
/// `target` is required by structure-aware kinds and ignored by the rest.
#[derive(Debug, Clone, Copy)]
pub struct MutationRequest<'a> {
    pub image: ArchiveImage<'a>,
    pub kind: MutationKind,
    pub target: Option<SignatureOccurrence>,
}

/// Raw strategy output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutated {
    pub bytes: Vec<u8>,
    /// Range written in output coordinates, `None` for a no-op
    pub touched: Option<Range<usize>>,
    pub note: String,
}

impl Mutated {
    fn unchanged(image: &ArchiveImage<'_>, note: String) -> Self {
        log::debug!("mutation skipped: {}", note);
        Self {
            bytes: image.to_vec(),
            touched: None,
            note,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.touched.is_none()
    }
}

// ============================================================================
// Dispatch
// ============================================================================

type Handler = fn(&MutationRequest<'_>, &MutationConfig, &mut RandomnessSource) -> Mutated;

/// A catalog entry
pub struct Strategy {
    pub kind: MutationKind,
    handler: Handler,
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strategy").field("kind", &self.kind).finish()
    }
}

static CATALOG: [Strategy; 10] = [
    Strategy { kind: MutationKind::CorruptFileHeaderWindow, handler: corrupt_file_header_window },
    Strategy { kind: MutationKind::CorruptDirectoryHeaderWindow, handler: corrupt_directory_header_window },
    Strategy { kind: MutationKind::MutateCompressionMethod, handler: mutate_compression_method },
    Strategy { kind: MutationKind::MutateChecksum, handler: mutate_checksum },
    Strategy { kind: MutationKind::MutateSizeFields, handler: mutate_size_fields },
    Strategy { kind: MutationKind::InsertSyntheticHeader, handler: insert_synthetic_header },
    Strategy { kind: MutationKind::FlipRandomBits, handler: flip_random_bits },
    Strategy { kind: MutationKind::SetBoundaryByte, handler: set_boundary_byte },
    Strategy { kind: MutationKind::ReplaceRunWithConstant, handler: replace_run_with_constant },
    Strategy { kind: MutationKind::ArithmeticPerturb, handler: arithmetic_perturb },
];

/// Catalog entry for a kind
pub fn strategy(kind: MutationKind) -> &'static Strategy {
    &CATALOG[kind.index()]
}

/// Run the strategy named by `request.kind`
pub fn apply(
    request: &MutationRequest<'_>,
    config: &MutationConfig,
    rng: &mut RandomnessSource,
) -> Mutated {
    let entry = strategy(request.kind);
    debug_assert_eq!(entry.kind, request.kind);
    (entry.handler)(request, config, rng)
}

// ============================================================================
// Field layout (offsets relative to the signature)
// ============================================================================

/// Bytes after the local file header signature covered by the header window
pub const FILE_HEADER_WINDOW: usize = 30;
/// Bytes after the central directory signature covered by the header window
pub const DIRECTORY_HEADER_WINDOW: usize = 46;

pub const COMPRESSION_METHOD_OFFSET: usize = 8;
pub const CRC32_OFFSET: usize = 14;
pub const COMPRESSED_SIZE_OFFSET: usize = 18;
pub const UNCOMPRESSED_SIZE_OFFSET: usize = 22;

/// Method codes a reader knows but that will not match the stored data
const KNOWN_METHODS: [u16; 13] = [0, 1, 6, 8, 9, 12, 14, 93, 95, 96, 97, 98, 99];
/// Method codes no reader should accept
const INVALID_METHODS: [u16; 6] = [0x00FF, 0x0100, 0x7FFF, 0x8000, 0xFFFE, 0xFFFF];

pub const BOUNDARY_BYTES: [u8; 6] = [0x00, 0x01, 0x7F, 0x80, 0xFE, 0xFF];

/// `[start, start + width)` clamped to `[0, len)`
fn clamp_window(len: usize, start: usize, width: usize) -> Range<usize> {
    let lo = start.min(len);
    let hi = start.saturating_add(width).min(len);
    lo..hi
}

fn target_offset(request: &MutationRequest<'_>) -> Option<usize> {
    request.target.map(|t| t.offset)
}

fn missing_target(request: &MutationRequest<'_>) -> Mutated {
    Mutated::unchanged(&request.image, format!("{} called without a target", request.kind))
}

/// Fill `width` bytes starting `rel` bytes after the target signature
fn randomize_window(
    request: &MutationRequest<'_>,
    rng: &mut RandomnessSource,
    rel: usize,
    width: usize,
) -> Mutated {
    let Some(offset) = target_offset(request) else {
        return missing_target(request);
    };
    let len = request.image.len();
    let window = clamp_window(len, offset.saturating_add(rel), width);
    if window.is_empty() {
        return Mutated::unchanged(
            &request.image,
            format!("header window at {} is past the end of a {}-byte buffer", offset, len),
        );
    }

    let mut bytes = request.image.to_vec();
    rng.fill(&mut bytes[window.clone()]);
    Mutated {
        note: format!(
            "randomized {} of {} header bytes after signature at {}",
            window.len(),
            width,
            offset
        ),
        bytes,
        touched: Some(window),
    }
}

/// Write little-endian `value` at `rel` bytes after the target signature,
/// keeping only the low-order bytes that fit in the buffer
fn write_field(request: &MutationRequest<'_>, rel: usize, value: &[u8], what: &str) -> Mutated {
    let Some(offset) = target_offset(request) else {
        return missing_target(request);
    };
    let len = request.image.len();
    let window = clamp_window(len, offset.saturating_add(rel), value.len());
    if window.is_empty() {
        return Mutated::unchanged(
            &request.image,
            format!("{} field of header at {} is past the end of a {}-byte buffer", what, offset, len),
        );
    }

    let mut bytes = request.image.to_vec();
    bytes[window.clone()].copy_from_slice(&value[..window.len()]);
    let note = if window.len() < value.len() {
        format!("{} at {} truncated to {} bytes", what, window.start, window.len())
    } else {
        format!("{} at {}", what, window.start)
    };
    Mutated {
        bytes,
        touched: Some(window),
        note,
    }
}

// ============================================================================
// Structure-aware strategies
// ============================================================================

fn corrupt_file_header_window(
    request: &MutationRequest<'_>,
    _config: &MutationConfig,
    rng: &mut RandomnessSource,
) -> Mutated {
    randomize_window(request, rng, SIGNATURE_LEN, FILE_HEADER_WINDOW)
}

fn corrupt_directory_header_window(
    request: &MutationRequest<'_>,
    _config: &MutationConfig,
    rng: &mut RandomnessSource,
) -> Mutated {
    randomize_window(request, rng, SIGNATURE_LEN, DIRECTORY_HEADER_WINDOW)
}

fn compression_method_value(config: &MutationConfig, rng: &mut RandomnessSource) -> u16 {
    if !config.bias_compression_method {
        return rng.u16();
    }
    match rng.below(3) {
        0 => rng.choose(&KNOWN_METHODS).copied().unwrap_or_default(),
        1 => rng.choose(&INVALID_METHODS).copied().unwrap_or(u16::MAX),
        _ => rng.u16(),
    }
}

fn mutate_compression_method(
    request: &MutationRequest<'_>,
    config: &MutationConfig,
    rng: &mut RandomnessSource,
) -> Mutated {
    let method = compression_method_value(config, rng);
    write_field(
        request,
        COMPRESSION_METHOD_OFFSET,
        &method.to_le_bytes(),
        &format!("compression method {:#06x}", method),
    )
}

fn mutate_checksum(
    request: &MutationRequest<'_>,
    _config: &MutationConfig,
    rng: &mut RandomnessSource,
) -> Mutated {
    let crc = rng.u32();
    write_field(
        request,
        CRC32_OFFSET,
        &crc.to_le_bytes(),
        &format!("crc32 {:#010x}", crc),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SizeFields {
    Compressed,
    Uncompressed,
    Both,
}

fn mutate_size_fields(
    request: &MutationRequest<'_>,
    _config: &MutationConfig,
    rng: &mut RandomnessSource,
) -> Mutated {
    let fields = match rng.below(3) {
        0 => SizeFields::Compressed,
        1 => SizeFields::Uncompressed,
        _ => SizeFields::Both,
    };

    match fields {
        SizeFields::Compressed => {
            let size = rng.u32();
            write_field(
                request,
                COMPRESSED_SIZE_OFFSET,
                &size.to_le_bytes(),
                &format!("compressed size {}", size),
            )
        }
        SizeFields::Uncompressed => {
            let size = rng.u32();
            write_field(
                request,
                UNCOMPRESSED_SIZE_OFFSET,
                &size.to_le_bytes(),
                &format!("uncompressed size {}", size),
            )
        }
        SizeFields::Both => {
            let compressed = rng.u32();
            let uncompressed = rng.u32();
            let mut both = [0u8; 8];
            both[..4].copy_from_slice(&compressed.to_le_bytes());
            both[4..].copy_from_slice(&uncompressed.to_le_bytes());
            write_field(
                request,
                COMPRESSED_SIZE_OFFSET,
                &both,
                &format!("compressed size {} and uncompressed size {}", compressed, uncompressed),
            )
        }
    }
}

// ============================================================================
// Statistical strategies
// ============================================================================

fn insert_synthetic_header(
    request: &MutationRequest<'_>,
    _config: &MutationConfig,
    rng: &mut RandomnessSource,
) -> Mutated {
    let source = request.image.as_bytes();
    let kind = rng
        .choose(&SignatureKind::ALL)
        .copied()
        .unwrap_or(SignatureKind::FileEntryHeader);
    let pos = rng.range_inclusive(0, source.len());

    let mut record = vec![0u8; kind.record_len()];
    record[..SIGNATURE_LEN].copy_from_slice(&kind.signature());
    rng.fill(&mut record[SIGNATURE_LEN..]);

    let mut bytes = Vec::with_capacity(source.len() + record.len());
    bytes.extend_from_slice(&source[..pos]);
    bytes.extend_from_slice(&record);
    bytes.extend_from_slice(&source[pos..]);

    Mutated {
        note: format!("inserted {}-byte synthetic {} at {}", record.len(), kind, pos),
        touched: Some(pos..pos + record.len()),
        bytes,
    }
}

fn empty_buffer(request: &MutationRequest<'_>) -> Mutated {
    Mutated::unchanged(&request.image, format!("{} has nothing to mutate in an empty buffer", request.kind))
}

fn flip_random_bits(
    request: &MutationRequest<'_>,
    _config: &MutationConfig,
    rng: &mut RandomnessSource,
) -> Mutated {
    if request.image.is_empty() {
        return empty_buffer(request);
    }
    let mut bytes = request.image.to_vec();
    let pos = rng.below(bytes.len());
    let count = rng.range_inclusive(1, 8);

    let mut bits: [u8; 8] = [0, 1, 2, 3, 4, 5, 6, 7];
    rng.shuffle(&mut bits);
    let mask = bits[..count].iter().fold(0u8, |m, &b| m | (1 << b));
    bytes[pos] ^= mask;

    Mutated {
        bytes,
        touched: Some(pos..pos + 1),
        note: format!("flipped {} bits (mask {:#04x}) at {}", count, mask, pos),
    }
}

fn set_boundary_byte(
    request: &MutationRequest<'_>,
    _config: &MutationConfig,
    rng: &mut RandomnessSource,
) -> Mutated {
    if request.image.is_empty() {
        return empty_buffer(request);
    }
    let mut bytes = request.image.to_vec();
    let pos = rng.below(bytes.len());
    let old = bytes[pos];

    let candidates: Vec<u8> = BOUNDARY_BYTES.into_iter().filter(|&b| b != old).collect();
    let value = rng.choose(&candidates).copied().unwrap_or(BOUNDARY_BYTES[0]);
    bytes[pos] = value;

    Mutated {
        bytes,
        touched: Some(pos..pos + 1),
        note: format!("set byte at {} from {:#04x} to {:#04x}", pos, old, value),
    }
}

fn replace_run_with_constant(
    request: &MutationRequest<'_>,
    config: &MutationConfig,
    rng: &mut RandomnessSource,
) -> Mutated {
    if request.image.is_empty() {
        return empty_buffer(request);
    }
    let mut bytes = request.image.to_vec();
    let start = rng.below(bytes.len());
    let longest = (bytes.len() - start).min(config.max_run_len.max(1));
    let run = rng.range_inclusive(1, longest);
    let value = rng.byte();
    bytes[start..start + run].fill(value);

    Mutated {
        bytes,
        touched: Some(start..start + run),
        note: format!("filled {} bytes at {} with {:#04x}", run, start, value),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArithOp {
    Add,
    Sub,
    Mul,
}

fn arithmetic_perturb(
    request: &MutationRequest<'_>,
    _config: &MutationConfig,
    rng: &mut RandomnessSource,
) -> Mutated {
    if request.image.is_empty() {
        return empty_buffer(request);
    }
    let mut bytes = request.image.to_vec();
    let pos = rng.below(bytes.len());
    let op = match rng.below(3) {
        0 => ArithOp::Add,
        1 => ArithOp::Sub,
        _ => ArithOp::Mul,
    };
    let operand = rng.range_inclusive(1, 255) as u8;
    let old = bytes[pos];
    bytes[pos] = match op {
        ArithOp::Add => old.wrapping_add(operand),
        ArithOp::Sub => old.wrapping_sub(operand),
        ArithOp::Mul => old.wrapping_mul(operand),
    };

    Mutated {
        note: format!(
            "{:?} {} at {}: {:#04x} -> {:#04x}",
            op, operand, pos, old, bytes[pos]
        ),
        bytes,
        touched: Some(pos..pos + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(buf: &[u8], kind: MutationKind, target: Option<SignatureOccurrence>) -> MutationRequest<'_> {
        MutationRequest {
            image: ArchiveImage::new(buf),
            kind,
            target,
        }
    }

    fn file_target(offset: usize) -> Option<SignatureOccurrence> {
        Some(SignatureOccurrence {
            kind: SignatureKind::FileEntryHeader,
            offset,
        })
    }

    fn assert_local(input: &[u8], out: &Mutated) {
        let touched = out.touched.clone().unwrap_or(0..0);
        for (i, (a, b)) in input.iter().zip(out.bytes.iter()).enumerate() {
            if !touched.contains(&i) {
                assert_eq!(a, b, "byte {} changed outside {:?}", i, touched);
            }
        }
    }

    #[test]
    fn test_table_matches_kinds() {
        for kind in MutationKind::ALL {
            assert_eq!(strategy(kind).kind, kind);
            assert_eq!(kind.name().parse::<MutationKind>().unwrap(), kind);
        }
        assert_eq!("Flip-Random-Bits".parse::<MutationKind>().unwrap(), MutationKind::FlipRandomBits);
        assert!("shuffle_everything".parse::<MutationKind>().is_err());
    }

    #[test]
    fn test_file_header_window_scenario() {
        let mut buf = b"PK\x03\x04".to_vec();
        buf.extend_from_slice(&[0u8; 30]);
        let mut rng = RandomnessSource::new(42);

        let out = apply(
            &request(&buf, MutationKind::CorruptFileHeaderWindow, file_target(0)),
            &MutationConfig::default(),
            &mut rng,
        );

        assert_eq!(out.bytes.len(), 34);
        assert_eq!(&out.bytes[..4], b"PK\x03\x04");
        assert!(out.bytes[4..].iter().any(|&b| b != 0));
        assert_eq!(out.touched, Some(4..34));
    }

    #[test]
    fn test_directory_window_clamped() {
        let mut buf = vec![0xAAu8; 8];
        buf.extend_from_slice(b"PK\x01\x02");
        buf.extend_from_slice(&[0u8; 10]);
        let target = Some(SignatureOccurrence {
            kind: SignatureKind::DirectoryEntryHeader,
            offset: 8,
        });
        let mut rng = RandomnessSource::new(3);

        let out = apply(
            &request(&buf, MutationKind::CorruptDirectoryHeaderWindow, target),
            &MutationConfig::default(),
            &mut rng,
        );

        assert_eq!(out.bytes.len(), buf.len());
        assert_eq!(out.touched, Some(12..22));
        assert_local(&buf, &out);
    }

    #[test]
    fn test_window_past_end_is_noop() {
        let buf = b"PK\x03\x04".to_vec();
        let mut rng = RandomnessSource::new(5);

        let out = apply(
            &request(&buf, MutationKind::CorruptFileHeaderWindow, file_target(0)),
            &MutationConfig::default(),
            &mut rng,
        );
        assert!(out.is_noop());
        assert_eq!(out.bytes, buf);
        assert!(!out.note.is_empty());

        // stale target far beyond the buffer
        let out = apply(
            &request(&buf, MutationKind::MutateChecksum, file_target(usize::MAX - 2)),
            &MutationConfig::default(),
            &mut rng,
        );
        assert!(out.is_noop());
        assert_eq!(out.bytes, buf);
    }

    #[test]
    fn test_field_writes_stay_in_place() {
        let buf = vec![0x11u8; 40];
        let config = MutationConfig::default();

        for seed in 0..50 {
            let mut rng = RandomnessSource::new(seed);
            let out = apply(&request(&buf, MutationKind::MutateChecksum, file_target(2)), &config, &mut rng);
            assert_eq!(out.touched, Some(16..20));
            assert_local(&buf, &out);

            let out = apply(
                &request(&buf, MutationKind::MutateCompressionMethod, file_target(2)),
                &config,
                &mut rng,
            );
            assert_eq!(out.touched, Some(10..12));
            assert_local(&buf, &out);

            let out = apply(&request(&buf, MutationKind::MutateSizeFields, file_target(2)), &config, &mut rng);
            let touched = out.touched.clone().unwrap();
            assert!(
                touched == (20..24) || touched == (24..28) || touched == (20..28),
                "unexpected size range {:?}",
                touched
            );
            assert_local(&buf, &out);
        }
    }

    #[test]
    fn test_partial_field_is_truncated() {
        // method field at 8..10 but buffer ends at 9
        let buf = vec![0u8; 9];
        let mut rng = RandomnessSource::new(9);
        let out = apply(
            &request(&buf, MutationKind::MutateCompressionMethod, file_target(0)),
            &MutationConfig::default(),
            &mut rng,
        );
        assert_eq!(out.touched, Some(8..9));
        assert_eq!(out.bytes.len(), 9);
        assert!(out.note.contains("truncated"));
    }

    #[test]
    fn test_unbiased_compression_method() {
        let buf = vec![0u8; 30];
        let config = MutationConfig::default().with_compression_bias(false);
        let mut rng = RandomnessSource::new(77);
        let out = apply(&request(&buf, MutationKind::MutateCompressionMethod, file_target(0)), &config, &mut rng);
        assert_eq!(out.touched, Some(8..10));
    }

    #[test]
    fn test_missing_target_is_noop() {
        let buf = vec![1u8; 64];
        let mut rng = RandomnessSource::new(1);
        let out = apply(&request(&buf, MutationKind::MutateChecksum, None), &MutationConfig::default(), &mut rng);
        assert!(out.is_noop());
        assert_eq!(out.bytes, buf);
    }

    #[test]
    fn test_insert_synthetic_header_grows_buffer() {
        let buf = vec![0x55u8; 17];
        for seed in 0..40 {
            let mut rng = RandomnessSource::new(seed);
            let out = apply(
                &request(&buf, MutationKind::InsertSyntheticHeader, None),
                &MutationConfig::default(),
                &mut rng,
            );
            let touched = out.touched.clone().unwrap();
            let inserted = touched.len();

            assert!([30, 46, 22].contains(&inserted));
            assert_eq!(out.bytes.len(), buf.len() + inserted);
            assert_eq!(&out.bytes[..touched.start], &buf[..touched.start]);
            assert_eq!(&out.bytes[touched.end..], &buf[touched.start..]);

            let sig = &out.bytes[touched.start..touched.start + 4];
            assert!(SignatureKind::ALL.iter().any(|k| sig == k.signature()));
        }
    }

    #[test]
    fn test_insert_into_empty_buffer() {
        let mut rng = RandomnessSource::new(0);
        let out = apply(&request(&[], MutationKind::InsertSyntheticHeader, None), &MutationConfig::default(), &mut rng);
        assert_eq!(out.touched.clone().map(|r| r.start), Some(0));
        assert_eq!(out.bytes.len(), out.touched.unwrap().len());
    }

    #[test]
    fn test_flip_bits_changes_exactly_one_byte() {
        let buf = vec![0x3Cu8; 25];
        for seed in 0..100 {
            let mut rng = RandomnessSource::new(seed);
            let out = apply(&request(&buf, MutationKind::FlipRandomBits, None), &MutationConfig::default(), &mut rng);
            let diffs: Vec<_> = (0..buf.len()).filter(|&i| buf[i] != out.bytes[i]).collect();
            assert_eq!(diffs.len(), 1);
            let flipped = (buf[diffs[0]] ^ out.bytes[diffs[0]]).count_ones();
            assert!((1..=8).contains(&flipped));
            assert_local(&buf, &out);
        }
    }

    #[test]
    fn test_boundary_byte_scenario() {
        let buf = vec![0u8; 10];
        for seed in 0..100 {
            let mut rng = RandomnessSource::new(seed);
            let out = apply(&request(&buf, MutationKind::SetBoundaryByte, None), &MutationConfig::default(), &mut rng);
            assert_eq!(out.bytes.len(), 10);
            let changed: Vec<_> = out.bytes.iter().filter(|&&b| b != 0).collect();
            assert_eq!(changed.len(), 1);
            assert!(BOUNDARY_BYTES.contains(changed[0]));
        }
    }

    #[test]
    fn test_run_respects_cap_and_bounds() {
        let buf = vec![0x42u8; 300];
        let config = MutationConfig::default().with_max_run_len(16);
        for seed in 0..100 {
            let mut rng = RandomnessSource::new(seed);
            let out = apply(&request(&buf, MutationKind::ReplaceRunWithConstant, None), &config, &mut rng);
            let run = out.touched.clone().unwrap();
            assert!(!run.is_empty() && run.len() <= 16);
            assert!(run.end <= buf.len());
            let value = out.bytes[run.start];
            assert!(out.bytes[run.clone()].iter().all(|&b| b == value));
            assert_local(&buf, &out);
        }
    }

    #[test]
    fn test_arithmetic_single_byte() {
        let buf: Vec<u8> = (0..=255).collect();
        let mut rng = RandomnessSource::new(8);
        let out = apply(&request(&buf, MutationKind::ArithmeticPerturb, None), &MutationConfig::default(), &mut rng);
        assert_eq!(out.touched.as_ref().map(|r| r.len()), Some(1));
        assert_local(&buf, &out);
    }

    #[test]
    fn test_statistical_kinds_on_empty_buffer() {
        for kind in [
            MutationKind::FlipRandomBits,
            MutationKind::SetBoundaryByte,
            MutationKind::ReplaceRunWithConstant,
            MutationKind::ArithmeticPerturb,
        ] {
            let mut rng = RandomnessSource::new(1);
            let out = apply(&request(&[], kind, None), &MutationConfig::default(), &mut rng);
            assert!(out.is_noop());
            assert!(out.bytes.is_empty());
        }
    }
}
