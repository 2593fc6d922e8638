//! Fuzzing configuration

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use zf_mutate::MutationConfig;

/// Placeholder replaced by the candidate path in target arguments
pub const CANDIDATE_PLACEHOLDER: &str = "{}";

/// Configuration for fuzzing runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzConfig {
    /// Number of fuzzing iterations
    pub iterations: usize,

    /// Random seed for reproducibility (None = drawn once and recorded)
    pub seed: Option<u64>,

    /// Program under test
    pub target: Option<PathBuf>,

    /// Arguments for the target; `{}` is replaced by the candidate path
    pub target_args: Vec<String>,

    /// Timeout per execution in milliseconds
    pub timeout_ms: u64,

    /// Directory for candidate files
    pub output_dir: PathBuf,

    /// Directory for saved crashes
    pub crash_dir: PathBuf,

    /// Stop after this many crashes
    pub max_crashes: usize,

    /// Exit codes that count as a crash
    pub crash_exit_codes: Vec<i32>,

    /// Substrings in stdout/stderr that count as a crash
    pub crash_indicators: Vec<String>,

    /// Whether a timeout is saved as a crash
    pub timeout_is_crash: bool,

    /// Keep every candidate file instead of deleting it after the run
    pub keep_candidates: bool,

    /// Log progress every N iterations
    pub progress_every: usize,

    /// Mutations stacked per candidate (1 = single mutation)
    pub stack_depth: usize,

    /// Mutation engine settings
    pub mutation: MutationConfig,
}

impl Default for FuzzConfig {
    fn default() -> Self {
        Self {
            iterations: 10_000,
            seed: None,
            target: None,
            target_args: vec!["t".into(), CANDIDATE_PLACEHOLDER.into()],
            timeout_ms: 15_000,
            output_dir: PathBuf::from("fuzzed_files"),
            crash_dir: PathBuf::from("crashes"),
            max_crashes: 50,
            crash_exit_codes: vec![2, 8],
            crash_indicators: [
                "Exception",
                "Access violation",
                "Segmentation fault",
                "CRASH",
                "Stack overflow",
                "Heap corruption",
                "Fatal error",
                "Internal error",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            timeout_is_crash: true,
            keep_candidates: false,
            progress_every: 100,
            stack_depth: 1,
            mutation: MutationConfig::default(),
        }
    }
}

impl FuzzConfig {
    /// Create a quick fuzzing config for CI
    pub fn ci() -> Self {
        Self {
            iterations: 1000,
            timeout_ms: 2000,
            progress_every: 250,
            ..Default::default()
        }
    }

    /// Create a minimal config for quick sanity checks
    pub fn minimal() -> Self {
        Self {
            iterations: 100,
            timeout_ms: 1000,
            progress_every: 0,
            ..Default::default()
        }
    }

    /// Load a config from a JSON file; missing fields take defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Save the config as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Builder: set iterations
    pub fn with_iterations(mut self, n: usize) -> Self {
        self.iterations = n;
        self
    }

    /// Builder: set seed for reproducibility
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Builder: set the program under test
    pub fn with_target(mut self, program: impl Into<PathBuf>) -> Self {
        self.target = Some(program.into());
        self
    }

    /// Builder: set the target argument template
    pub fn with_target_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: set timeout
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    /// Builder: set candidate directory
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Builder: set crash directory
    pub fn with_crash_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.crash_dir = dir.into();
        self
    }

    /// Builder: set the early-stop crash count
    pub fn with_max_crashes(mut self, n: usize) -> Self {
        self.max_crashes = n;
        self
    }

    /// Builder: set mutations per candidate
    pub fn with_stack_depth(mut self, depth: usize) -> Self {
        self.stack_depth = depth;
        self
    }

    /// Builder: set mutation engine settings
    pub fn with_mutation(mut self, mutation: MutationConfig) -> Self {
        self.mutation = mutation;
        self
    }

    /// Builder: keep candidate files
    pub fn keep_candidates(mut self, keep: bool) -> Self {
        self.keep_candidates = keep;
        self
    }

    /// Target arguments with the placeholder replaced by `candidate`
    pub fn render_args(&self, candidate: &Path) -> Vec<String> {
        render_args(&self.target_args, candidate)
    }
}

/// Substitute `candidate` into an argument template.
/// The path is appended when no argument carries the placeholder.
pub fn render_args(template: &[String], candidate: &Path) -> Vec<String> {
    let path = candidate.to_string_lossy();
    let mut args: Vec<String> = template
        .iter()
        .map(|a| a.replace(CANDIDATE_PLACEHOLDER, &path))
        .collect();
    if !template.iter().any(|a| a.contains(CANDIDATE_PLACEHOLDER)) {
        args.push(path.into_owned());
    }
    args
}
