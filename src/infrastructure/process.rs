//! Subprocess runner for the platform CLIs
//!
//! Captures stdout and stderr interleaved line by line, enforces a deadline
//! and kills the child when the deadline passes. Output read before the
//! deadline is kept in the timeout error.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

use crate::error::ProcessError;

/// A command to run, with its working directory, environment and deadline
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    envs: Vec<(String, String)>,
    timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            envs: Vec::new(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Environment values are never included in `describe()`
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Command line for logs
    pub fn describe(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Exit status plus combined output
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub combined: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Run a command to completion or until its deadline
pub async fn run(spec: &CommandSpec) -> Result<CommandOutput, ProcessError> {
    tracing::debug!("Running {}", spec.describe());

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &spec.current_dir {
        command.current_dir(dir);
    }
    for (key, value) in &spec.envs {
        command.env(key, value);
    }

    let spawn_error = |source: std::io::Error| ProcessError::Spawn {
        program: spec.program.clone(),
        source,
    };
    let mut child = command.spawn().map_err(spawn_error)?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| spawn_error(std::io::Error::other("stdout was not captured")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| spawn_error(std::io::Error::other("stderr was not captured")))?;

    let mut stdout = BufReader::new(stdout);
    let mut stderr = BufReader::new(stderr);
    let (mut stdout_line, mut stderr_line) = (Vec::new(), Vec::new());
    let (mut stdout_done, mut stderr_done) = (false, false);
    let mut combined = String::new();

    let deadline = tokio::time::sleep(spec.timeout);
    tokio::pin!(deadline);

    // read_until keeps partial bytes in the buffer when another branch wins
    while !(stdout_done && stderr_done) {
        tokio::select! {
            read = stdout.read_until(b'\n', &mut stdout_line), if !stdout_done => {
                stdout_done = take_line(read, &mut stdout_line, &mut combined);
            }
            read = stderr.read_until(b'\n', &mut stderr_line), if !stderr_done => {
                stderr_done = take_line(read, &mut stderr_line, &mut combined);
            }
            () = &mut deadline => return Err(timed_out(spec, &mut child, combined).await),
        }
    }

    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => Ok(CommandOutput { status, combined }),
            Err(source) => Err(spawn_error(source)),
        },
        () = &mut deadline => Err(timed_out(spec, &mut child, combined).await),
    }
}

/// Move one finished line into `combined`; true once the stream is over
fn take_line(read: std::io::Result<usize>, line: &mut Vec<u8>, combined: &mut String) -> bool {
    match read {
        Ok(0) => true,
        Ok(_) => {
            let text = String::from_utf8_lossy(line);
            let text = text.trim_end_matches(['\n', '\r']);
            tracing::debug!("  │ {}", text);
            combined.push_str(text);
            combined.push('\n');
            line.clear();
            false
        }
        Err(e) => {
            tracing::warn!("⚠️  Stopped reading command output: {}", e);
            true
        }
    }
}

async fn timed_out(spec: &CommandSpec, child: &mut Child, output: String) -> ProcessError {
    if let Err(e) = child.kill().await {
        tracing::debug!("Failed to kill {}: {}", spec.program, e);
    }
    ProcessError::TimedOut {
        program: spec.program.clone(),
        timeout: spec.timeout,
        output,
    }
}

/// The last `n` lines of `text`
pub fn last_n_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_n_lines() {
        assert_eq!(last_n_lines("a\nb\nc\n", 2), "b\nc");
        assert_eq!(last_n_lines("a\nb", 10), "a\nb");
        assert_eq!(last_n_lines("", 5), "");
    }

    #[test]
    fn test_describe_omits_env_values() {
        let spec = CommandSpec::new("flyctl")
            .args(["deploy", "--remote-only"])
            .env("FLY_ACCESS_TOKEN", "secret-value");
        assert_eq!(spec.describe(), "flyctl deploy --remote-only");
        assert!(!spec.describe().contains("secret-value"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_both_streams_and_exit_code() {
        let spec = CommandSpec::new("sh")
            .args(["-c", "echo to-stdout; echo to-stderr >&2; exit 3"])
            .timeout(Duration::from_secs(10));
        let output = run(&spec).await.unwrap();

        assert!(!output.success());
        assert_eq!(output.status.code(), Some(3));
        assert!(output.combined.contains("to-stdout"));
        assert!(output.combined.contains("to-stderr"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_env_and_working_directory_are_applied() {
        let dir = tempfile::TempDir::new().unwrap();
        let spec = CommandSpec::new("sh")
            .args(["-c", "echo \"$GREETING\"; pwd"])
            .env("GREETING", "hello")
            .current_dir(dir.path())
            .timeout(Duration::from_secs(10));
        let output = run(&spec).await.unwrap();

        assert!(output.success());
        assert!(output.combined.starts_with("hello\n"));
        let dir_name = dir.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(output.combined.contains(&dir_name));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_deadline_kills_the_command() {
        let spec = CommandSpec::new("sleep")
            .args(["5"])
            .timeout(Duration::from_millis(100));
        let err = run(&spec).await.unwrap_err();
        assert!(matches!(err, ProcessError::TimedOut { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_keeps_output_read_so_far() {
        let spec = CommandSpec::new("sh")
            .args(["-c", "echo 'Error: building image step 3'; sleep 5"])
            .timeout(Duration::from_millis(500));
        match run(&spec).await.unwrap_err() {
            ProcessError::TimedOut { output, .. } => {
                assert_eq!(output, "Error: building image step 3\n");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invalid_utf8_does_not_stall_large_output() {
        let spec = CommandSpec::new("sh")
            .args([
                "-c",
                "printf '\\377\\n'; head -c 200000 /dev/zero | tr '\\0' a; echo; echo done",
            ])
            .timeout(Duration::from_secs(10));
        let output = run(&spec).await.unwrap();

        assert!(output.success());
        assert!(output.combined.starts_with('\u{FFFD}'));
        assert!(output.combined.len() > 200_000);
        assert!(output.combined.ends_with("done\n"));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let spec = CommandSpec::new("sol-cloud-definitely-missing-binary");
        let err = run(&spec).await.unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }
}
