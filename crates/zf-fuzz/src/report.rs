//! Report generation for fuzzing runs

use crate::crash::CrashRecord;
use crate::harness::FuzzStats;
use crate::Result;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Fuzzing report for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuzzReport {
    /// Report title
    pub title: String,

    /// Timestamp
    pub timestamp: DateTime<Local>,

    /// Run statistics
    pub stats: FuzzStats,

    /// Crashes saved during the run
    pub crashes: Vec<CrashRecord>,
}

impl FuzzReport {
    /// Create a new report
    pub fn new(title: impl Into<String>, stats: FuzzStats) -> Self {
        Self {
            title: title.into(),
            timestamp: Local::now(),
            stats,
            crashes: Vec::new(),
        }
    }

    /// Builder: attach crash records
    pub fn with_crashes(mut self, crashes: Vec<CrashRecord>) -> Self {
        self.crashes = crashes;
        self
    }

    /// Check if the run found nothing
    pub fn is_clean(&self) -> bool {
        self.stats.is_clean()
    }

    /// Generate text report
    pub fn to_text(&self) -> String {
        let s = &self.stats;
        let mut output = String::new();

        output.push_str(&format!("{}\n", self.title));
        output.push_str(&format!("{}\n\n", "=".repeat(self.title.len())));
        output.push_str(&format!("Timestamp: {}\n", self.timestamp.to_rfc3339()));
        output.push_str(&format!("Target: {}\n", s.target));
        output.push_str(&format!("Seed: {:#x}\n\n", s.seed));

        output.push_str("Summary:\n");
        output.push_str(&format!(
            "  Iterations: {}{}\n",
            s.iterations,
            if s.stopped_early { " (stopped at crash limit)" } else { "" }
        ));
        output.push_str(&format!(
            "  Crashes: {} ({:.3}% of iterations)\n",
            s.crashes,
            s.crash_rate() * 100.0
        ));
        output.push_str(&format!(
            "  Timeouts: {}, launch errors: {}, no-op mutations: {}\n",
            s.timeouts, s.launch_errors, s.noops
        ));
        output.push_str(&format!(
            "  Duration: {} ms ({:.1} iter/s)\n\n",
            s.duration_ms,
            s.iterations_per_sec()
        ));

        output.push_str("Mutations:\n");
        for (kind, count) in &s.kind_counts {
            output.push_str(&format!("  {:<32} {}\n", kind.name(), count));
        }
        output.push('\n');

        if !self.crashes.is_empty() {
            output.push_str("Crashes:\n");
            output.push_str(&"-".repeat(80));
            output.push('\n');
            for (i, crash) in self.crashes.iter().take(10).enumerate() {
                output.push_str(&format!(
                    "  {}. iteration {}: {:?} ({} bytes, sha256 {})\n",
                    i + 1,
                    crash.iteration,
                    crash.verdict,
                    crash.file_size,
                    &crash.sha256[..crash.sha256.len().min(16)]
                ));
                for step in &crash.steps {
                    output.push_str(&format!("       {}: {}\n", step.applied, step.note));
                }
            }
            if self.crashes.len() > 10 {
                output.push_str(&format!("  ... and {} more crashes\n", self.crashes.len() - 10));
            }
        }

        output
    }

    /// Generate JSON report
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Generate markdown report
    pub fn to_markdown(&self) -> String {
        let s = &self.stats;
        let mut output = String::new();

        output.push_str(&format!("# {}\n\n", self.title));
        output.push_str(&format!("**Timestamp:** {}\n\n", self.timestamp.to_rfc3339()));

        let status = if self.is_clean() { "✅ CLEAN" } else { "❌ CRASHES FOUND" };
        output.push_str(&format!("## Status: {}\n\n", status));

        output.push_str("## Summary\n\n");
        output.push_str("| Metric | Value |\n");
        output.push_str("|--------|-------|\n");
        output.push_str(&format!("| Target | `{}` |\n", s.target));
        output.push_str(&format!("| Seed | `{:#x}` |\n", s.seed));
        output.push_str(&format!("| Iterations | {} |\n", s.iterations));
        output.push_str(&format!("| Crashes | {} |\n", s.crashes));
        output.push_str(&format!("| Timeouts | {} |\n", s.timeouts));
        output.push_str(&format!("| Launch Errors | {} |\n", s.launch_errors));
        output.push_str(&format!("| Duration | {} ms |\n\n", s.duration_ms));

        output.push_str("## Mutations\n\n");
        output.push_str("| Kind | Applied |\n");
        output.push_str("|------|---------|\n");
        for (kind, count) in &s.kind_counts {
            output.push_str(&format!("| `{}` | {} |\n", kind, count));
        }
        output.push('\n');

        if !self.crashes.is_empty() {
            output.push_str("## Crashes\n\n");
            for crash in self.crashes.iter().take(20) {
                let kinds: Vec<_> = crash.steps.iter().map(|st| st.applied.name()).collect();
                output.push_str(&format!(
                    "- **iteration {}**: {:?} via `{}` (sha256 `{}`)\n",
                    crash.iteration,
                    crash.verdict,
                    kinds.join(" > "),
                    crash.sha256
                ));
            }
            output.push('\n');
        }

        output
    }

    /// Save report to file
    pub fn save<P: AsRef<Path>>(&self, path: P, format: ReportFormat) -> Result<()> {
        let content = match format {
            ReportFormat::Text => self.to_text(),
            ReportFormat::Json => self.to_json()?,
            ReportFormat::Markdown => self.to_markdown(),
        };
        fs::write(path, content)?;
        Ok(())
    }
}

/// Report output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    Text,
    Json,
    Markdown,
}
