//! # zf-mutate
//!
//! Structure-aware mutation engine for ZIP archives.
//!
//! ## Features
//!
//! - **Signature Scanning**: Locate file, directory and end-of-directory records without parsing
//! - **Targeted Corruption**: Rewrite header windows, compression method, CRC and size fields
//! - **Statistical Noise**: Bit flips, boundary bytes, constant runs, arithmetic
//! - **Reproducible**: Every mutation is a function of the input bytes and a seed
//! - **Safe on Garbage**: Already-broken input degrades to statistical mutations, never errors
//!
//! ## Example
//!
//! ```rust,ignore
//! use zf_mutate::{ArchiveImage, MutationEngine, RandomnessSource};
//!
//! let engine = MutationEngine::default();
//! let mut rng = RandomnessSource::new(42);
//!
//! let result = engine.mutate(&ArchiveImage::new(&base), &mut rng, None)?;
//! std::fs::write("candidate.zip", &result.bytes)?;
//! println!("{}", serde_json::to_string(&result.descriptor())?);
//! ```

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod image;
pub mod rng;
pub mod sample;
pub mod scanner;
pub mod selector;

pub use catalog::{MutationKind, MutationRequest, Mutated};
pub use config::MutationConfig;
pub use engine::{MutationDescriptor, MutationEngine, MutationResult, Pin, StackedMutation};
pub use error::{MutationError, Result};
pub use image::ArchiveImage;
pub use rng::{parse_seed, RandomnessSource};
pub use sample::SampleArchive;
pub use scanner::{scan, OffsetMap, Scan, SignatureKind, SignatureOccurrence};
pub use selector::{MutationSelector, Selection};

/// One mutation of `bytes` with default settings
pub fn quick_mutate(bytes: &[u8], seed: u64) -> Result<MutationResult> {
    let engine = MutationEngine::default();
    let mut rng = RandomnessSource::new(seed);
    engine.mutate(&ArchiveImage::new(bytes), &mut rng, None)
}
