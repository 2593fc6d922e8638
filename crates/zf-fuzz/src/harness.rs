//! Fuzzing harness and runner

use crate::config::FuzzConfig;
use crate::crash::CrashStore;
use crate::target::{Target, Verdict};
use crate::{FuzzError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use zf_mutate::{
    ArchiveImage, MutationDescriptor, MutationEngine, MutationKind, Pin, RandomnessSource,
};

/// Statistics of a fuzzing run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FuzzStats {
    /// Seed used (for reproducibility)
    pub seed: u64,

    /// Name of the program under test
    pub target: String,

    /// Iterations executed
    pub iterations: usize,

    /// Candidates saved as crashes
    pub crashes: usize,

    /// Executions that hit the timeout
    pub timeouts: usize,

    /// Executions the target could not be launched for
    pub launch_errors: usize,

    /// Mutations that left their candidate unchanged
    pub noops: usize,

    /// Iterations that produced a saved crash
    pub crash_iterations: Vec<usize>,

    /// Applications per mutation kind, counting every stacked step
    pub kind_counts: BTreeMap<MutationKind, usize>,

    /// Whether the run ended at the crash limit
    pub stopped_early: bool,

    /// Total duration
    pub duration_ms: u64,
}

impl FuzzStats {
    /// Whether no crash was found
    pub fn is_clean(&self) -> bool {
        self.crashes == 0
    }

    /// Get iterations per second
    pub fn iterations_per_sec(&self) -> f64 {
        if self.duration_ms == 0 {
            0.0
        } else {
            self.iterations as f64 * 1000.0 / self.duration_ms as f64
        }
    }

    /// Fraction of iterations that crashed
    pub fn crash_rate(&self) -> f64 {
        if self.iterations == 0 {
            0.0
        } else {
            self.crashes as f64 / self.iterations as f64
        }
    }

    /// Get summary string
    pub fn summary(&self) -> String {
        format!(
            "{} - {} iterations, {} crashes, {} timeouts against {} in {}ms ({:.0} iter/s, seed {:#x})",
            if self.is_clean() { "CLEAN" } else { "CRASHES" },
            self.iterations,
            self.crashes,
            self.timeouts,
            self.target,
            self.duration_ms,
            self.iterations_per_sec(),
            self.seed
        )
    }

    fn record_steps(&mut self, steps: &[MutationDescriptor]) {
        for step in steps {
            *self.kind_counts.entry(step.applied).or_default() += 1;
            if step.touched_range.is_none() {
                self.noops += 1;
            }
        }
    }
}

/// One generated input and how it was made
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub iteration: usize,
    pub bytes: Vec<u8>,
    pub steps: Vec<MutationDescriptor>,
}

/// Main fuzzing runner
#[derive(Debug, Clone)]
pub struct FuzzRunner {
    config: FuzzConfig,
    engine: MutationEngine,
    seed: u64,
}

impl FuzzRunner {
    /// Create a runner; draws and records a seed when the config has none
    pub fn new(config: FuzzConfig) -> Result<Self> {
        if config.stack_depth == 0 {
            return Err(FuzzError::InvalidConfig("stack_depth must be at least 1".into()));
        }
        let engine = MutationEngine::new(config.mutation.clone())?;
        let seed = config
            .seed
            .unwrap_or_else(|| RandomnessSource::from_entropy().seed());

        Ok(Self {
            config,
            engine,
            seed,
        })
    }

    pub fn config(&self) -> &FuzzConfig {
        &self.config
    }

    /// Seed every iteration derives from
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Regenerate the candidate of `iteration`. Depends only on the base,
    /// the seed and the mutation settings.
    pub fn candidate(&self, base: &[u8], iteration: usize) -> Result<Candidate> {
        let mut rng = RandomnessSource::with_stream(self.seed, iteration as u64);
        let image = ArchiveImage::new(base);

        let (bytes, steps) = if self.config.stack_depth <= 1 {
            let result = self.engine.mutate(&image, &mut rng, None)?;
            let step = result.descriptor();
            (result.bytes, vec![step])
        } else {
            let stacked = self
                .engine
                .mutate_stacked(&image, &mut rng, self.config.stack_depth)?;
            (stacked.bytes, stacked.steps)
        };

        Ok(Candidate {
            iteration,
            bytes,
            steps,
        })
    }

    /// Like [`Self::candidate`], but the first step is pinned. The rest of
    /// the stack depth is filled with selector-chosen steps.
    pub fn pinned_candidate(&self, base: &[u8], iteration: usize, pin: Pin) -> Result<Candidate> {
        let mut rng = RandomnessSource::with_stream(self.seed, iteration as u64);
        let first = self.engine.replay(&ArchiveImage::new(base), &mut rng, pin)?;
        let mut steps = vec![first.descriptor()];
        let mut bytes = first.bytes;

        let rest = self
            .config
            .stack_depth
            .min(self.engine.config().max_stack)
            .saturating_sub(1);
        if rest > 0 {
            let stacked = self
                .engine
                .mutate_stacked(&ArchiveImage::new(&bytes), &mut rng, rest)?;
            steps.extend(stacked.steps);
            bytes = stacked.bytes;
        }

        Ok(Candidate {
            iteration,
            bytes,
            steps,
        })
    }

    /// Path the candidate of `iteration` is written to
    pub fn candidate_path(&self, iteration: usize) -> PathBuf {
        self.config
            .output_dir
            .join(format!("fuzz_{:06}.zip", iteration))
    }

    /// Run the fuzzing loop against `target`
    pub fn run<T: Target + ?Sized>(&self, base: &[u8], target: &mut T) -> Result<FuzzStats> {
        fs::create_dir_all(&self.config.output_dir)?;
        let crashes = CrashStore::new(&self.config.crash_dir);

        let mut stats = FuzzStats {
            seed: self.seed,
            target: target.name(),
            ..Default::default()
        };

        log::info!(
            "Fuzzing {} for {} iterations (seed {:#x}, base {} bytes)",
            stats.target,
            self.config.iterations,
            self.seed,
            base.len()
        );

        let start = Instant::now();

        for iteration in 0..self.config.iterations {
            if stats.crashes >= self.config.max_crashes {
                log::warn!("Reached maximum crashes ({}), stopping", self.config.max_crashes);
                stats.stopped_early = true;
                break;
            }

            let candidate = self.candidate(base, iteration)?;
            stats.record_steps(&candidate.steps);

            let path = self.candidate_path(iteration);
            fs::write(&path, &candidate.bytes)?;

            match target.execute(&path) {
                Ok(execution) => {
                    if execution.verdict == Verdict::Timeout {
                        stats.timeouts += 1;
                    }
                    if execution.is_crash(self.config.timeout_is_crash) {
                        crashes.save(
                            &candidate.bytes,
                            iteration,
                            self.seed,
                            &stats.target,
                            &execution,
                            &candidate.steps,
                        )?;
                        stats.crashes += 1;
                        stats.crash_iterations.push(iteration);
                    }
                }
                // a target that never started once is misconfigured
                Err(FuzzError::Launch(msg)) if stats.iterations == stats.launch_errors => {
                    self.discard(&path)?;
                    return Err(FuzzError::Launch(msg));
                }
                Err(FuzzError::Launch(msg)) => {
                    log::error!("Iteration {}: {}", iteration, msg);
                    stats.launch_errors += 1;
                }
                Err(e) => return Err(e),
            }

            self.discard(&path)?;
            stats.iterations += 1;

            if self.config.progress_every > 0 && stats.iterations % self.config.progress_every == 0 {
                log::info!(
                    "Progress: {}/{} iterations, {} crashes found, {:.1} iter/s",
                    stats.iterations,
                    self.config.iterations,
                    stats.crashes,
                    stats.iterations as f64 / start.elapsed().as_secs_f64().max(1e-9)
                );
            }
        }

        stats.duration_ms = start.elapsed().as_millis() as u64;
        log::info!("{}", stats.summary());
        Ok(stats)
    }

    fn discard(&self, path: &Path) -> Result<()> {
        if self.config.keep_candidates {
            return Ok(());
        }
        match fs::remove_file(path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
