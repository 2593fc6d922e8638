//! # zf-fuzz
//!
//! Fuzzing harness that feeds zf-mutate candidates to a ZIP reader.
//!
//! ## Features
//!
//! - **Replayable Iterations**: Candidate `i` depends only on `(seed, i)`
//! - **Crash Detection**: Exit codes, signals, output indicators and timeouts
//! - **Crash Records**: Candidate, mutation steps, hash and target output per crash
//! - **CI Integration**: Text, JSON and markdown run reports
//!
//! ## Example
//!
//! ```rust,ignore
//! use zf_fuzz::{FuzzConfig, FuzzRunner, ProcessTarget};
//!
//! let config = FuzzConfig::default().with_iterations(1000).with_seed(7);
//! let mut target = ProcessTarget::from_config(&config, "/usr/bin/7z".into());
//! let stats = FuzzRunner::new(config)?.run(&base, &mut target)?;
//! println!("{}", stats.summary());
//! ```

pub mod config;
pub mod crash;
pub mod harness;
pub mod report;
pub mod target;

pub use config::FuzzConfig;
pub use crash::{CrashRecord, CrashStore};
pub use harness::{FuzzRunner, FuzzStats};
pub use report::{FuzzReport, ReportFormat};
pub use target::{Execution, ProcessTarget, Target, Verdict};

use thiserror::Error;

/// Errors that can occur during fuzzing
#[derive(Error, Debug)]
pub enum FuzzError {
    #[error("Mutation error: {0}")]
    Mutation(#[from] zf_mutate::MutationError),

    #[error("Target not found: {0}")]
    TargetNotFound(String),

    #[error("Failed to launch target: {0}")]
    Launch(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FuzzError>;
