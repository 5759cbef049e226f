use std::process::Stdio;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};

use crate::{Result, ScannerError};

// ─── DecoderProcess ───────────────────────────────────────────────────────

/// A running external decoder that prints one decoded payload per line on
/// stdout.
///
/// Stderr is drained in a background task and surfaced when the process
/// exits with an error. The child is killed when this value is dropped.
pub(crate) struct DecoderProcess {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stderr_buf: Arc<Mutex<String>>,
}

impl DecoderProcess {
    /// Spawn `program args...`, substituting `{device}` in each argument.
    pub(crate) fn spawn(program: &str, args: &[String], device: &str) -> Result<Self> {
        let mut cmd = Command::new(program);
        cmd.args(args.iter().map(|a| a.replace("{device}", device)));
        Self::from_command(cmd)
    }

    pub(crate) fn from_command(mut cmd: Command) -> Result<Self> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(ScannerError::Io)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ScannerError::Process("stdout not captured".into()))?;

        let stderr_buf = Arc::new(Mutex::new(String::new()));
        if let Some(stderr) = child.stderr.take() {
            let buf = Arc::clone(&stderr_buf);
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    if let Ok(mut b) = buf.lock() {
                        if !b.is_empty() {
                            b.push('\n');
                        }
                        b.push_str(&line);
                    }
                }
            });
        }

        Ok(Self {
            child,
            lines: BufReader::new(stdout).lines(),
            stderr_buf,
        })
    }

    /// Next raw line from stdout, or `Ok(None)` on EOF.
    pub(crate) async fn next_line(&mut self) -> Result<Option<String>> {
        self.lines.next_line().await.map_err(ScannerError::Io)
    }

    /// Wait for exit and describe a non-zero status, including stderr.
    pub(crate) async fn wait_exit_error(&mut self) -> Option<ScannerError> {
        let status = match self.child.wait().await {
            Ok(s) => s,
            Err(e) => return Some(ScannerError::Io(e)),
        };
        if status.success() {
            return None;
        }

        let stderr = self
            .stderr_buf
            .lock()
            .ok()
            .map(|b| b.clone())
            .unwrap_or_default();

        let head = match status.code() {
            Some(code) => format!("decoder exited with code {code}"),
            None => "decoder terminated by signal".to_string(),
        };
        let msg = if stderr.is_empty() {
            head
        } else {
            format!("{head}\nstderr: {stderr}")
        };
        Some(ScannerError::Process(msg))
    }

    pub(crate) async fn kill(&mut self) {
        let _ = self.child.kill().await;
    }
}
