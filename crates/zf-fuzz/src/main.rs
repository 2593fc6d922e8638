//! zipfuzz - ZIP reader fuzzer
//!
//! Usage:
//!   zipfuzz run --target /usr/bin/7z   - Fuzz a reader with mutated archives
//!   zipfuzz mutate base.zip out.zip    - Produce (or replay) one candidate
//!   zipfuzz scan file.zip              - List record signatures in a file
//!   zipfuzz seed-archive base.zip      - Write the built-in base archive
//!   zipfuzz kinds                      - List mutation kinds

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use zf_fuzz::target::resolve_program;
use zf_fuzz::{CrashStore, FuzzConfig, FuzzReport, FuzzRunner, ProcessTarget, ReportFormat};
use zf_mutate::{MutationKind, OffsetMap, Pin, SampleArchive, parse_seed};

#[derive(Parser)]
#[command(name = "zipfuzz", version, about = "Structure-aware ZIP reader fuzzer")]
struct Cli {
    /// Enable debug logging (one line per mutation)
    #[arg(long, global = true)]
    debug: bool,

    /// Write log output to a file instead of stderr
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fuzz a reader with mutated archives
    Run {
        /// Base archive; created from the built-in corpus if missing
        #[arg(short, long, default_value = "base_test.zip")]
        base: PathBuf,

        /// Program under test (default: config, then a 7-Zip install)
        #[arg(short, long)]
        target: Option<PathBuf>,

        /// Target argument; repeatable, `{}` is the candidate path
        #[arg(long = "arg", value_name = "ARG", allow_hyphen_values = true)]
        target_args: Vec<String>,

        /// JSON config file; command line flags override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short = 'n', long)]
        iterations: Option<usize>,

        /// Seed, decimal or 0x-hex
        #[arg(short, long, value_parser = seed_arg)]
        seed: Option<u64>,

        /// Per-execution timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Mutations stacked per candidate
        #[arg(long)]
        depth: Option<usize>,

        #[arg(long)]
        max_crashes: Option<usize>,

        #[arg(long)]
        output_dir: Option<PathBuf>,

        #[arg(long)]
        crash_dir: Option<PathBuf>,

        /// Keep every candidate file
        #[arg(long)]
        keep: bool,

        /// Write a run report here
        #[arg(long)]
        report: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "markdown")]
        format: ReportFormat,
    },
    /// Produce one candidate; replays iteration N of a run with the same seed
    Mutate {
        input: PathBuf,
        output: PathBuf,

        /// Seed, decimal or 0x-hex
        #[arg(short, long, value_parser = seed_arg)]
        seed: u64,

        /// Iteration (stream) to replay
        #[arg(short, long, default_value_t = 0)]
        iteration: usize,

        /// Pin the mutation kind
        #[arg(short, long, value_parser = kind_arg)]
        kind: Option<MutationKind>,

        /// Pin the targeted record offset (requires --kind)
        #[arg(long, requires = "kind")]
        offset: Option<usize>,

        /// Mutations stacked per candidate
        #[arg(long, default_value_t = 1)]
        depth: usize,

        /// JSON config file for mutation settings
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// List record signatures in a file
    Scan {
        input: PathBuf,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Write the built-in base archive
    SeedArchive {
        #[arg(default_value = "base_test.zip")]
        output: PathBuf,
    },
    /// List mutation kinds
    Kinds,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug, cli.log_file.as_deref())?;

    match cli.command {
        Commands::Run {
            base,
            target,
            target_args,
            config,
            iterations,
            seed,
            timeout_ms,
            depth,
            max_crashes,
            output_dir,
            crash_dir,
            keep,
            report,
            format,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(n) = iterations {
                config.iterations = n;
            }
            if seed.is_some() {
                config.seed = seed;
            }
            if let Some(ms) = timeout_ms {
                config.timeout_ms = ms;
            }
            if let Some(d) = depth {
                config.stack_depth = d;
            }
            if let Some(n) = max_crashes {
                config.max_crashes = n;
            }
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if let Some(dir) = crash_dir {
                config.crash_dir = dir;
            }
            if !target_args.is_empty() {
                config.target_args = target_args;
            }
            config.keep_candidates |= keep;
            if target.is_some() {
                config.target = target;
            }
            run_fuzz(config, &base, report.as_deref(), format)
        }
        Commands::Mutate {
            input,
            output,
            seed,
            iteration,
            kind,
            offset,
            depth,
            config,
        } => {
            let config = load_config(config.as_deref())?
                .with_seed(seed)
                .with_stack_depth(depth);
            mutate_one(config, &input, &output, iteration, kind, offset)
        }
        Commands::Scan { input, json } => scan_file(&input, json),
        Commands::SeedArchive { output } => seed_archive(&output),
        Commands::Kinds => {
            list_kinds();
            Ok(())
        }
    }
}

fn init_logging(debug: bool, log_file: Option<&Path>) -> Result<()> {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(if debug { LevelFilter::Debug } else { LevelFilter::Info })
        .parse_default_env();

    if let Some(path) = log_file {
        let file = fs::File::create(path)
            .with_context(|| format!("Failed to create log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

fn seed_arg(s: &str) -> std::result::Result<u64, String> {
    parse_seed(s).map_err(|e| e.to_string())
}

fn kind_arg(s: &str) -> std::result::Result<MutationKind, String> {
    s.parse::<MutationKind>().map_err(|e| e.to_string())
}

fn load_config(path: Option<&Path>) -> Result<FuzzConfig> {
    match path {
        Some(path) => FuzzConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(FuzzConfig::default()),
    }
}

fn read_or_create_base(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        seed_archive(path)?;
    }
    fs::read(path).with_context(|| format!("Failed to read base archive {}", path.display()))
}

fn run_fuzz(
    config: FuzzConfig,
    base: &Path,
    report: Option<&Path>,
    format: ReportFormat,
) -> Result<()> {
    let program = resolve_program(&config).context("Pass --target or install 7-Zip")?;
    let base = read_or_create_base(base)?;

    let mut target = ProcessTarget::from_config(&config, program);
    let crash_dir = config.crash_dir.clone();
    let runner = FuzzRunner::new(config)?;
    let stats = runner.run(&base, &mut target).context("Fuzzing run failed")?;

    println!("{}", stats.summary());

    if let Some(path) = report {
        let crashes = CrashStore::new(crash_dir)
            .records()?
            .into_iter()
            .filter(|c| c.seed == stats.seed && stats.crash_iterations.contains(&c.iteration))
            .collect();
        FuzzReport::new("ZIP Fuzzing Report", stats)
            .with_crashes(crashes)
            .save(path, format)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        log::info!("Report written to {}", path.display());
    }

    Ok(())
}

fn mutate_one(
    config: FuzzConfig,
    input: &Path,
    output: &Path,
    iteration: usize,
    kind: Option<MutationKind>,
    offset: Option<usize>,
) -> Result<()> {
    let base = fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;

    let runner = FuzzRunner::new(config)?;
    let candidate = match kind {
        Some(kind) => {
            let pin = Pin {
                kind,
                target_offset: offset,
            };
            runner.pinned_candidate(&base, iteration, pin)?
        }
        None => runner.candidate(&base, iteration)?,
    };

    fs::write(output, &candidate.bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("{}", serde_json::to_string_pretty(&candidate.steps)?);
    Ok(())
}

fn scan_file(input: &Path, json: bool) -> Result<()> {
    let bytes = fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let map = OffsetMap::from_bytes(&bytes);

    if json {
        println!("{}", serde_json::to_string_pretty(map.occurrences())?);
        return Ok(());
    }

    println!("{:>10}  {}", "OFFSET", "RECORD");
    for occ in map.occurrences() {
        println!("{:>10}  {}", occ.offset, occ.kind);
    }
    println!("{} signatures in {} bytes", map.len(), bytes.len());
    Ok(())
}

fn seed_archive(output: &Path) -> Result<()> {
    let archive = SampleArchive::default_corpus();
    let bytes = archive.build();
    fs::write(output, &bytes)
        .with_context(|| format!("Failed to write base archive {}", output.display()))?;
    log::info!(
        "Created base archive {} ({} entries, {} bytes)",
        output.display(),
        archive.len(),
        bytes.len()
    );
    Ok(())
}

fn list_kinds() {
    for kind in MutationKind::ALL {
        let aim = match kind.required_target() {
            Some(record) => record.to_string(),
            None => "-".to_string(),
        };
        println!(
            "{:<32} {:<24}{}",
            kind.name(),
            aim,
            if kind.changes_length() { " changes length" } else { "" }
        );
    }
}
