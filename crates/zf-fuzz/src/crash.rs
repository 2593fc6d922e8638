//! Crash persistence

use crate::target::{Execution, Verdict};
use crate::Result;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use zf_mutate::MutationDescriptor;

/// Metadata written to `info.json` next to each crashing candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashRecord {
    pub timestamp: DateTime<Local>,
    pub iteration: usize,
    pub seed: u64,
    pub file_size: usize,
    pub sha256: String,
    pub target: String,
    pub verdict: Verdict,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub duration_ms: u64,
    /// Mutations that produced the candidate, in order
    pub steps: Vec<MutationDescriptor>,
}

/// Directory of saved crashes
#[derive(Debug, Clone)]
pub struct CrashStore {
    root: PathBuf,
}

impl CrashStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Save one crash; returns the directory it was written to
    pub fn save(
        &self,
        candidate: &[u8],
        iteration: usize,
        seed: u64,
        target: &str,
        execution: &Execution,
        steps: &[MutationDescriptor],
    ) -> Result<PathBuf> {
        let timestamp = Local::now();
        let dir = self.root.join(format!(
            "crash_{}_iter_{}",
            timestamp.format("%Y%m%d_%H%M%S_%3f"),
            iteration
        ));
        fs::create_dir_all(&dir)?;

        fs::write(dir.join("crash.zip"), candidate)?;

        let record = CrashRecord {
            timestamp,
            iteration,
            seed,
            file_size: candidate.len(),
            sha256: sha256_hex(candidate),
            target: target.to_string(),
            verdict: execution.verdict.clone(),
            exit_code: execution.exit_code,
            signal: execution.signal,
            duration_ms: execution.duration_ms,
            steps: steps.to_vec(),
        };
        fs::write(dir.join("info.json"), serde_json::to_string_pretty(&record)?)?;
        fs::write(dir.join("target_output.txt"), render_output(execution))?;

        log::warn!(
            "Crash at iteration {} ({:?}) saved to {}",
            iteration,
            execution.verdict,
            dir.display()
        );
        Ok(dir)
    }

    /// Load every `info.json` under the store, oldest first
    pub fn records(&self) -> Result<Vec<CrashRecord>> {
        let mut records = Vec::new();
        if !self.root.is_dir() {
            return Ok(records);
        }
        for entry in fs::read_dir(&self.root)? {
            let info = entry?.path().join("info.json");
            if info.is_file() {
                records.push(serde_json::from_str(&fs::read_to_string(info)?)?);
            }
        }
        records.sort_by_key(|r: &CrashRecord| (r.timestamp, r.iteration));
        Ok(records)
    }
}

/// Lowercase hex SHA-256 of `bytes`
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn render_output(execution: &Execution) -> String {
    let exit = match (execution.exit_code, execution.signal) {
        (Some(code), _) => code.to_string(),
        (None, Some(sig)) => format!("signal {}", sig),
        (None, None) => "none".to_string(),
    };
    format!(
        "Return code: {}\n\nSTDOUT:\n{}\n\nSTDERR:\n{}\n",
        exit, execution.stdout, execution.stderr
    )
}
