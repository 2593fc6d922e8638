//! Program under test

use crate::config::{render_args, FuzzConfig};
use crate::{FuzzError, Result};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

/// How long to keep reading output after the process is gone. Grandchildren
/// may inherit the pipes and hold them open well past that.
const PIPE_GRACE: Duration = Duration::from_millis(250);

/// Outcome of one execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum Verdict {
    Clean,
    Crash(String),
    Timeout,
}

/// Everything observed while running one candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub verdict: Verdict,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl Execution {
    /// Clean run with no output, for in-process targets
    pub fn clean() -> Self {
        Self {
            verdict: Verdict::Clean,
            exit_code: Some(0),
            signal: None,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 0,
        }
    }

    /// Whether this execution should be saved as a crash
    pub fn is_crash(&self, timeout_is_crash: bool) -> bool {
        match self.verdict {
            Verdict::Clean => false,
            Verdict::Crash(_) => true,
            Verdict::Timeout => timeout_is_crash,
        }
    }
}

/// Something that consumes candidate files
pub trait Target {
    /// Short name for logs and reports
    fn name(&self) -> String;

    /// Run the target on the candidate at `candidate`
    fn execute(&mut self, candidate: &Path) -> Result<Execution>;
}

/// External reader driven through its command line
#[derive(Debug, Clone)]
pub struct ProcessTarget {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    crash_exit_codes: Vec<i32>,
    crash_indicators: Vec<String>,
}

impl ProcessTarget {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self::from_config(&FuzzConfig::default(), program.into())
    }

    /// Take arguments, timeout and crash heuristics from `config`
    pub fn from_config(config: &FuzzConfig, program: PathBuf) -> Self {
        Self {
            program,
            args: config.target_args.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
            crash_exit_codes: config.crash_exit_codes.clone(),
            crash_indicators: config.crash_indicators.clone(),
        }
    }

    /// Builder: set argument template
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Decide a verdict from what the process left behind
    pub fn classify(
        &self,
        exit_code: Option<i32>,
        signal: Option<i32>,
        stdout: &str,
        stderr: &str,
    ) -> Verdict {
        if let Some(code) = exit_code.filter(|c| self.crash_exit_codes.contains(c)) {
            return Verdict::Crash(format!("exit code {}", code));
        }
        if let Some(sig) = signal {
            return Verdict::Crash(format!("killed by signal {}", sig));
        }
        if let Some(indicator) = self
            .crash_indicators
            .iter()
            .find(|i| stdout.contains(i.as_str()) || stderr.contains(i.as_str()))
        {
            return Verdict::Crash(format!("output contains {:?}", indicator));
        }
        Verdict::Clean
    }

    fn command(&self, candidate: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(render_args(&self.args, candidate))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd
    }
}

impl Target for ProcessTarget {
    fn name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    fn execute(&mut self, candidate: &Path) -> Result<Execution> {
        let start = Instant::now();
        let mut child = self
            .command(candidate)
            .spawn()
            .map_err(|e| FuzzError::Launch(format!("{}: {}", self.program.display(), e)))?;

        let (tx, rx) = mpsc::channel();
        drain(child.stdout.take(), Stream::Out, tx.clone());
        drain(child.stderr.take(), Stream::Err, tx);

        let status = match child.wait_timeout(self.timeout)? {
            Some(status) => Some(status),
            None => {
                log::warn!("Timeout testing file: {}", candidate.display());
                // already exited between the timeout and the kill is fine
                let _ = child.kill();
                child.wait()?;
                None
            }
        };

        let (stdout, stderr) = collect(rx, candidate);
        let stdout = String::from_utf8_lossy(&stdout).into_owned();
        let stderr = String::from_utf8_lossy(&stderr).into_owned();
        let duration_ms = start.elapsed().as_millis() as u64;

        let (exit_code, signal) = match status {
            Some(status) => (status.code(), exit_signal(&status)),
            None => (None, None),
        };
        let verdict = match status {
            None => Verdict::Timeout,
            Some(_) => self.classify(exit_code, signal, &stdout, &stderr),
        };

        Ok(Execution {
            verdict,
            exit_code,
            signal,
            stdout,
            stderr,
            duration_ms,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Out,
    Err,
}

/// Forward chunks from `pipe` until EOF. The thread is detached so a pipe
/// held open by a grandchild never blocks the caller.
fn drain<R: Read + Send + 'static>(
    pipe: Option<R>,
    stream: Stream,
    tx: Sender<(Stream, Vec<u8>)>,
) {
    let Some(mut pipe) = pipe else { return };
    thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            match pipe.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send((stream, buf[..n].to_vec())).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

/// Gather output until both pipes close or the grace period runs out
fn collect(rx: Receiver<(Stream, Vec<u8>)>, candidate: &Path) -> (Vec<u8>, Vec<u8>) {
    let deadline = Instant::now() + PIPE_GRACE;
    let (mut stdout, mut stderr) = (Vec::new(), Vec::new());
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok((Stream::Out, chunk)) => stdout.extend_from_slice(&chunk),
            Ok((Stream::Err, chunk)) => stderr.extend_from_slice(&chunk),
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                log::debug!(
                    "Output pipes still open after exit, keeping partial output: {}",
                    candidate.display()
                );
                break;
            }
        }
    }
    (stdout, stderr)
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

/// Look for a 7-Zip binary in the usual install locations, then on `PATH`
pub fn locate_7zip() -> Option<PathBuf> {
    const KNOWN: [&str; 7] = [
        r"C:\Program Files\7-Zip\7z.exe",
        r"C:\Program Files (x86)\7-Zip\7z.exe",
        r"C:\Program Files\7-Zip\7zG.exe",
        r"C:\Program Files (x86)\7-Zip\7zG.exe",
        "/usr/bin/7z",
        "/usr/local/bin/7z",
        "/opt/homebrew/bin/7z",
    ];
    const ON_PATH: [&str; 4] = ["7z", "7zz", "7za", "7z.exe"];

    if let Some(found) = KNOWN.iter().map(PathBuf::from).find(|p| p.is_file()) {
        return Some(found);
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .flat_map(|dir| ON_PATH.iter().map(move |name| dir.join(name)))
        .find(|p| p.is_file())
}

/// Program to fuzz: the configured target, else a local 7-Zip
pub fn resolve_program(config: &FuzzConfig) -> Result<PathBuf> {
    config.target.clone().or_else(locate_7zip).ok_or_else(|| {
        FuzzError::TargetNotFound("no target given and no 7-Zip installation found".into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ProcessTarget {
        ProcessTarget::new("/bin/sh")
    }

    #[test]
    fn test_classify() {
        let t = target();
        assert_eq!(t.classify(Some(0), None, "Everything is Ok", ""), Verdict::Clean);
        assert_eq!(t.classify(Some(1), None, "", "Warnings"), Verdict::Clean);
        assert_eq!(
            t.classify(Some(2), None, "", ""),
            Verdict::Crash("exit code 2".into())
        );
        assert_eq!(
            t.classify(None, Some(11), "", ""),
            Verdict::Crash("killed by signal 11".into())
        );
        assert!(matches!(
            t.classify(Some(0), None, "", "Heap corruption detected"),
            Verdict::Crash(_)
        ));
    }

    #[test]
    fn test_timeout_policy() {
        let mut exec = Execution::clean();
        assert!(!exec.is_crash(true));
        exec.verdict = Verdict::Timeout;
        assert!(exec.is_crash(true));
        assert!(!exec.is_crash(false));
    }

    #[test]
    fn test_verdict_json_shape() {
        let json = serde_json::to_string(&Verdict::Crash("exit code 8".into())).unwrap();
        assert_eq!(json, r#"{"verdict":"crash","reason":"exit code 8"}"#);
    }

    #[cfg(unix)]
    #[test]
    fn test_process_exit_code() {
        let mut t = target().with_args(["-c", "exit 2", "{}"]);
        let exec = t.execute(Path::new("candidate.zip")).unwrap();
        assert_eq!(exec.exit_code, Some(2));
        assert_eq!(exec.verdict, Verdict::Crash("exit code 2".into()));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_output_indicator() {
        let mut t = target().with_args(["-c", "echo 'Segmentation fault' >&2", "{}"]);
        let exec = t.execute(Path::new("candidate.zip")).unwrap();
        assert_eq!(exec.exit_code, Some(0));
        assert!(exec.stderr.contains("Segmentation fault"));
        assert!(matches!(exec.verdict, Verdict::Crash(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_timeout() {
        let mut t = target()
            .with_args(["-c", "exec sleep 5", "{}"])
            .with_timeout(Duration::from_millis(100));
        let exec = t.execute(Path::new("candidate.zip")).unwrap();
        assert_eq!(exec.verdict, Verdict::Timeout);
        assert!(exec.duration_ms < 5000);
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_with_grandchild_holding_pipes() {
        // sleep runs as a child of sh and inherits stdout/stderr
        let mut t = target()
            .with_args(["-c", "sleep 3; true", "{}"])
            .with_timeout(Duration::from_millis(100));
        let start = Instant::now();
        let exec = t.execute(Path::new("candidate.zip")).unwrap();
        assert_eq!(exec.verdict, Verdict::Timeout);
        assert!(start.elapsed() < Duration::from_millis(1000));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_with_background_grandchild_keeps_output() {
        let mut t = target()
            .with_args(["-c", "echo 'Segmentation fault'; sleep 3 & exit 0", "{}"])
            .with_timeout(Duration::from_millis(2000));
        let start = Instant::now();
        let exec = t.execute(Path::new("candidate.zip")).unwrap();
        assert!(start.elapsed() < Duration::from_millis(1000));
        assert_eq!(exec.exit_code, Some(0));
        assert!(exec.stdout.contains("Segmentation fault"));
        assert!(matches!(exec.verdict, Verdict::Crash(_)));
    }

    #[test]
    fn test_configured_target_wins() {
        let config = FuzzConfig::default().with_target("/opt/reader/unzip");
        assert_eq!(
            resolve_program(&config).unwrap(),
            PathBuf::from("/opt/reader/unzip")
        );
    }

    #[test]
    fn test_missing_program_is_launch_error() {
        let mut t = ProcessTarget::new("/definitely/not/a/real/reader");
        assert!(matches!(
            t.execute(Path::new("x.zip")),
            Err(FuzzError::Launch(_))
        ));
    }
}
