//! I/O primitives for the CLI subprocess pipes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;

use crate::{Error, Result};

/// Bytes of stderr kept for diagnostics.
pub const STDERR_TAIL_BYTES: usize = 4 * 1024;

/// Reads newline-terminated lines from a pipe.
///
/// Invalid UTF-8 is replaced rather than rejected, and the line terminator
/// (`\n` or `\r\n`) is removed.
pub struct LineReader<R> {
    reader: BufReader<R>,
    buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buffer: Vec::with_capacity(4096),
        }
    }

    /// Read the next line. `Ok(None)` at end of input.
    ///
    /// Cancel-safe only between lines: dropping the future mid-line may lose
    /// the partial line, which is fine for a pipe that is about to be killed.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        self.buffer.clear();
        let read = self
            .reader
            .read_until(b'\n', &mut self.buffer)
            .await
            .map_err(Error::io)?;
        if read == 0 {
            return Ok(None);
        }

        let mut line = String::from_utf8_lossy(&self.buffer).into_owned();
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }
}

/// Writes an oversized prompt to the CLI's stdin and closes it.
pub struct ProcessWriter<W> {
    stdin: W,
}

impl<W: AsyncWrite + Unpin> ProcessWriter<W> {
    pub fn new(stdin: W) -> Self {
        Self { stdin }
    }

    /// Write the prompt, then shut the pipe down so the CLI sees end of input.
    pub async fn write_prompt(mut self, prompt: &str) -> Result<()> {
        self.stdin
            .write_all(prompt.as_bytes())
            .await
            .map_err(Error::io)?;
        self.stdin.shutdown().await.map_err(Error::io)?;
        Ok(())
    }
}

/// The last few KiB of a process's stderr, shared with the task draining it.
#[derive(Debug, Clone, Default)]
pub struct StderrTail {
    inner: Arc<Mutex<VecDeque<u8>>>,
}

impl StderrTail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line, evicting the oldest bytes past [`STDERR_TAIL_BYTES`].
    pub fn push_line(&self, line: &str) {
        let mut buf = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        buf.extend(line.as_bytes());
        buf.push_back(b'\n');
        let excess = buf.len().saturating_sub(STDERR_TAIL_BYTES);
        buf.drain(..excess);
    }

    /// The retained text, trimmed. A multi-byte character cut by eviction is
    /// replaced.
    pub fn snapshot(&self) -> String {
        let buf = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let bytes: Vec<u8> = buf.iter().copied().collect();
        String::from_utf8_lossy(&bytes).trim().to_string()
    }
}

/// Drain `stderr` in the background, logging each line at trace level and
/// keeping the tail.
pub fn drain_stderr<R>(stderr: R, tail: StderrTail, pid: Option<u32>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = LineReader::new(stderr);
        loop {
            match reader.next_line().await {
                Ok(Some(line)) => {
                    tracing::trace!(pid = ?pid, %line, "cli stderr");
                    tail.push_line(&line);
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(pid = ?pid, error = %e, "stderr read failed");
                    break;
                }
            }
        }
    })
}
