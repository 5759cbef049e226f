use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::process::DecoderProcess;

// ─── DecodeStream ─────────────────────────────────────────────────────────

/// An async stream of decoded payload strings.
///
/// Backed by a bounded mpsc channel fed by a background task. When the
/// consumer falls behind and the channel is full, new events are dropped:
/// the decoder keeps producing the same code many times per second, so a
/// missed frame is harmless. Blank lines are skipped.
///
/// Dropping the stream (or calling [`DecodeStream::stop`]) aborts the
/// feeding task, which in turn kills any decoder process it owns.
pub struct DecodeStream {
    rx: mpsc::Receiver<String>,
    task: Option<JoinHandle<()>>,
}

impl DecodeStream {
    /// Stream lines read from any async reader (stdin, a pipe, a file).
    pub fn from_reader<R>(reader: R, capacity: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if !forward(&tx, line) {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "decode input read failed");
                        break;
                    }
                }
            }
        });
        Self {
            rx,
            task: Some(task),
        }
    }

    /// Stream lines from a running decoder process.
    pub(crate) fn from_process(mut process: DecoderProcess, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(async move {
            loop {
                match process.next_line().await {
                    Ok(Some(line)) => {
                        if !forward(&tx, line) {
                            break;
                        }
                    }
                    Ok(None) => {
                        if let Some(e) = process.wait_exit_error().await {
                            tracing::warn!(error = %e, "decoder exited");
                        } else {
                            tracing::info!("decoder finished");
                        }
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "decoder output read failed");
                        break;
                    }
                }
            }
            process.kill().await;
        });
        Self {
            rx,
            task: Some(task),
        }
    }

    /// Wrap a raw receiver; nothing is aborted on stop.
    pub fn from_channel(rx: mpsc::Receiver<String>) -> Self {
        Self { rx, task: None }
    }

    /// Stop delivery and release the underlying source.
    pub fn stop(&mut self) {
        self.rx.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Push one line; false once the receiver is gone.
fn forward(tx: &mpsc::Sender<String>, line: String) -> bool {
    let text = line.trim_end_matches(['\r', '\n']);
    if text.trim().is_empty() {
        return true;
    }
    match tx.try_send(text.to_string()) {
        Ok(()) => true,
        Err(TrySendError::Full(dropped)) => {
            tracing::trace!(text = %dropped, "decode event dropped; consumer busy");
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

impl Drop for DecodeStream {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Stream for DecodeStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
