//! Mutation engine facade
//!
//! scan -> select -> apply. The engine holds only immutable configuration;
//! all per-call state lives in the caller's [`RandomnessSource`].

use crate::catalog::{self, MutationKind, MutationRequest};
use crate::config::MutationConfig;
use crate::error::{MutationError, Result};
use crate::image::ArchiveImage;
use crate::rng::RandomnessSource;
use crate::scanner::{OffsetMap, SignatureOccurrence};
use crate::selector::{pick_target, MutationSelector, Selection};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Output of one mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationResult {
    /// Freshly allocated candidate bytes
    pub bytes: Vec<u8>,
    pub applied: MutationKind,
    pub target: Option<SignatureOccurrence>,
    /// Range written, in output coordinates; `None` when the strategy was a no-op
    pub touched_range: Option<Range<usize>>,
    pub note: String,
    input_len: usize,
}

impl MutationResult {
    /// Everything but the bytes, for logging next to the candidate
    pub fn descriptor(&self) -> MutationDescriptor {
        MutationDescriptor {
            applied: self.applied,
            target: self.target,
            touched_range: self.touched_range.clone(),
            note: self.note.clone(),
            input_len: self.input_len,
            output_len: self.bytes.len(),
        }
    }

    pub fn input_len(&self) -> usize {
        self.input_len
    }

    pub fn is_noop(&self) -> bool {
        self.touched_range.is_none()
    }
}

/// Serializable record of what a mutation did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationDescriptor {
    pub applied: MutationKind,
    pub target: Option<SignatureOccurrence>,
    pub touched_range: Option<Range<usize>>,
    pub note: String,
    pub input_len: usize,
    pub output_len: usize,
}

/// Caller-pinned selection for deterministic replay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pin {
    pub kind: MutationKind,
    /// Offset of the occurrence to aim at; structure-aware kinds only.
    /// When absent the target is drawn from the scan as usual.
    pub target_offset: Option<usize>,
}

impl Pin {
    pub fn of(kind: MutationKind) -> Self {
        Self {
            kind,
            target_offset: None,
        }
    }

    pub fn at(kind: MutationKind, offset: usize) -> Self {
        Self {
            kind,
            target_offset: Some(offset),
        }
    }
}

/// Several mutations applied in sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackedMutation {
    pub bytes: Vec<u8>,
    /// One descriptor per applied step, in order
    pub steps: Vec<MutationDescriptor>,
}

/// Entry point used by the fuzz harness
#[derive(Debug, Clone)]
pub struct MutationEngine {
    config: MutationConfig,
    selector: MutationSelector,
}

impl Default for MutationEngine {
    fn default() -> Self {
        let config = MutationConfig::default();
        Self {
            selector: MutationSelector::new(&config),
            config,
        }
    }
}

impl MutationEngine {
    /// Create an engine, rejecting configs that leave no fallback kind
    pub fn new(config: MutationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            selector: MutationSelector::new(&config),
            config,
        })
    }

    pub fn config(&self) -> &MutationConfig {
        &self.config
    }

    pub fn selector(&self) -> &MutationSelector {
        &self.selector
    }

    /// Apply one mutation, chosen by the selector unless `pinned` is given.
    ///
    /// A pinned kind bypasses the disabled list; it fails only when it needs a
    /// record the image does not contain.
    pub fn mutate(
        &self,
        image: &ArchiveImage<'_>,
        rng: &mut RandomnessSource,
        pinned: Option<MutationKind>,
    ) -> Result<MutationResult> {
        self.replay_inner(image, rng, pinned.map(Pin::of))
    }

    /// Apply a fully pinned mutation
    pub fn replay(
        &self,
        image: &ArchiveImage<'_>,
        rng: &mut RandomnessSource,
        pin: Pin,
    ) -> Result<MutationResult> {
        self.replay_inner(image, rng, Some(pin))
    }

    /// Apply `depth` selector-chosen mutations in sequence, rescanning the
    /// intermediate buffer before every step. `depth` is clamped to
    /// `1..=max_stack`.
    pub fn mutate_stacked(
        &self,
        image: &ArchiveImage<'_>,
        rng: &mut RandomnessSource,
        depth: usize,
    ) -> Result<StackedMutation> {
        let depth = depth.clamp(1, self.config.max_stack);
        let mut bytes = image.to_vec();
        let mut steps = Vec::with_capacity(depth);

        for _ in 0..depth {
            let result = self.mutate(&ArchiveImage::new(&bytes), rng, None)?;
            steps.push(result.descriptor());
            bytes = result.bytes;
        }

        Ok(StackedMutation { bytes, steps })
    }

    /// Draw a stack depth in `1..=max_stack`
    pub fn random_depth(&self, rng: &mut RandomnessSource) -> usize {
        rng.range_inclusive(1, self.config.max_stack)
    }

    fn replay_inner(
        &self,
        image: &ArchiveImage<'_>,
        rng: &mut RandomnessSource,
        pin: Option<Pin>,
    ) -> Result<MutationResult> {
        let map = OffsetMap::from_image(image);
        let selection = match pin {
            Some(pin) => resolve_pin(&map, pin, rng)?,
            None => self.selector.select(&map, rng).ok_or_else(|| {
                MutationError::InvalidConfig("no applicable mutation kind".into())
            })?,
        };
        Ok(self.run(image, selection, rng))
    }

    fn run(
        &self,
        image: &ArchiveImage<'_>,
        selection: Selection,
        rng: &mut RandomnessSource,
    ) -> MutationResult {
        let request = MutationRequest {
            image: *image,
            kind: selection.kind,
            target: selection.target,
        };
        let mutated = catalog::apply(&request, &self.config, rng);

        log::debug!(
            "{} (target {:?}, seed {:#x}/{}): {}",
            selection.kind,
            selection.target.map(|t| t.offset),
            rng.seed(),
            rng.stream(),
            mutated.note
        );

        MutationResult {
            bytes: mutated.bytes,
            applied: selection.kind,
            target: selection.target,
            touched_range: mutated.touched,
            note: mutated.note,
            input_len: image.len(),
        }
    }
}

fn resolve_pin(map: &OffsetMap, pin: Pin, rng: &mut RandomnessSource) -> Result<Selection> {
    let kind = pin.kind;
    match (kind.required_target(), pin.target_offset) {
        (None, None) => Ok(Selection { kind, target: None }),
        (None, Some(offset)) => Err(MutationError::UnexpectedTarget { kind, offset }),
        (Some(needs), Some(offset)) => match map.find(needs, offset) {
            Some(target) => Ok(Selection {
                kind,
                target: Some(target),
            }),
            None => Err(MutationError::TargetNotFound {
                kind,
                needs,
                offset,
            }),
        },
        (Some(needs), None) => match pick_target(map, needs, rng) {
            Some(target) => Ok(Selection {
                kind,
                target: Some(target),
            }),
            None => Err(MutationError::NoTarget { kind, needs }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::SignatureKind;

    fn file_header_buffer() -> Vec<u8> {
        let mut buf = b"PK\x03\x04".to_vec();
        buf.extend_from_slice(&[0u8; 30]);
        buf
    }

    #[test]
    fn test_pinned_kind_determinism() {
        let engine = MutationEngine::default();
        let buf = file_header_buffer();
        let image = ArchiveImage::new(&buf);

        for kind in MutationKind::ALL {
            if kind == MutationKind::CorruptDirectoryHeaderWindow {
                continue;
            }
            let a = engine
                .mutate(&image, &mut RandomnessSource::new(1234), Some(kind))
                .unwrap();
            let b = engine
                .mutate(&image, &mut RandomnessSource::new(1234), Some(kind))
                .unwrap();
            assert_eq!(a, b, "{} not deterministic", kind);
            assert_eq!(a.applied, kind);
        }
    }

    #[test]
    fn test_pinned_kind_without_target_is_config_fault() {
        let engine = MutationEngine::default();
        let buf = vec![0u8; 10];
        let err = engine
            .mutate(
                &ArchiveImage::new(&buf),
                &mut RandomnessSource::new(1),
                Some(MutationKind::MutateChecksum),
            )
            .unwrap_err();
        assert_eq!(
            err,
            MutationError::NoTarget {
                kind: MutationKind::MutateChecksum,
                needs: SignatureKind::FileEntryHeader,
            }
        );
    }

    #[test]
    fn test_pinned_target_offset() {
        let engine = MutationEngine::default();
        let mut buf = file_header_buffer();
        buf.extend_from_slice(&file_header_buffer());
        let image = ArchiveImage::new(&buf);
        let mut rng = RandomnessSource::new(3);

        let result = engine
            .replay(&image, &mut rng, Pin::at(MutationKind::MutateChecksum, 34))
            .unwrap();
        assert_eq!(result.target.map(|t| t.offset), Some(34));
        assert_eq!(result.touched_range, Some(48..52));

        let err = engine
            .replay(&image, &mut rng, Pin::at(MutationKind::MutateChecksum, 5))
            .unwrap_err();
        assert!(matches!(err, MutationError::TargetNotFound { offset: 5, .. }));

        let err = engine
            .replay(&image, &mut rng, Pin::at(MutationKind::FlipRandomBits, 0))
            .unwrap_err();
        assert!(matches!(err, MutationError::UnexpectedTarget { .. }));
    }

    #[test]
    fn test_never_mutates_input_and_falls_back() {
        let engine = MutationEngine::new(MutationConfig::length_preserving()).unwrap();
        let buf = vec![0u8; 10];
        let image = ArchiveImage::new(&buf);
        let mut rng = RandomnessSource::new(77);

        for _ in 0..100 {
            let result = engine.mutate(&image, &mut rng, None).unwrap();
            assert!(!result.applied.is_structure_aware());
            assert_eq!(result.bytes.len(), 10);
        }
        assert_eq!(buf, vec![0u8; 10]);
    }

    #[test]
    fn test_descriptor_fields() {
        let engine = MutationEngine::default();
        let buf = vec![1u8; 20];
        let result = engine
            .mutate(
                &ArchiveImage::new(&buf),
                &mut RandomnessSource::new(5),
                Some(MutationKind::InsertSyntheticHeader),
            )
            .unwrap();
        let desc = result.descriptor();

        assert_eq!(desc.input_len, 20);
        assert_eq!(desc.output_len, result.bytes.len());
        assert!(desc.output_len > 20);

        let json = serde_json::to_string(&desc).unwrap();
        assert!(json.contains("insert_synthetic_header"));
        let back: MutationDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, desc);
    }

    #[test]
    fn test_stacked_depth_is_clamped() {
        let engine = MutationEngine::new(MutationConfig::default().with_max_stack(3)).unwrap();
        let buf = vec![9u8; 64];
        let image = ArchiveImage::new(&buf);
        let mut rng = RandomnessSource::new(12);

        let stacked = engine.mutate_stacked(&image, &mut rng, 10).unwrap();
        assert_eq!(stacked.steps.len(), 3);
        assert_eq!(stacked.steps.last().unwrap().output_len, stacked.bytes.len());

        let stacked = engine.mutate_stacked(&image, &mut rng, 0).unwrap();
        assert_eq!(stacked.steps.len(), 1);

        for _ in 0..50 {
            let d = engine.random_depth(&mut rng);
            assert!((1..=3).contains(&d));
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = MutationConfig::default().only(&[MutationKind::CorruptFileHeaderWindow]);
        assert!(matches!(
            MutationEngine::new(config),
            Err(MutationError::InvalidConfig(_))
        ));
    }
}
