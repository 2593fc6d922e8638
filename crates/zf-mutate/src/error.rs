//! Error types for the mutation engine
//!
//! Only caller misuse is an error. Malformed or truncated input bytes never are.

use crate::catalog::MutationKind;
use crate::scanner::SignatureKind;
use thiserror::Error;

/// Configuration faults reported to the caller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
    #[error("{kind} needs a {needs} target but the image has none")]
    NoTarget {
        kind: MutationKind,
        needs: SignatureKind,
    },

    #[error("no {needs} signature at offset {offset} (pinned for {kind})")]
    TargetNotFound {
        kind: MutationKind,
        needs: SignatureKind,
        offset: usize,
    },

    #[error("{kind} does not take a target offset (got {offset})")]
    UnexpectedTarget { kind: MutationKind, offset: usize },

    #[error("Invalid seed: {0:?}")]
    InvalidSeed(String),

    #[error("Unknown mutation kind: {0:?}")]
    UnknownKind(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, MutationError>;
