//! Per-deployment log sink
//!
//! Append-only log file with section framing. Child process output is tee'd
//! both to the file and to size-capped in-memory buffers so the pipeline can
//! surface the tail of stderr in error messages.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use chrono::Utc;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::warn;

use crate::errors::OrchestratorError;

/// Default capacity for the in-memory output buffers.
pub const TEE_BUFFER_CAP: usize = 64 * 1024;

/// Append-only, section-framed log file for one deployment.
///
/// A failure to open or write the sink degrades to standard error output via
/// `tracing`; it never fails the deployment. Handles are scoped to a phase:
/// each phase opens, writes, and closes its own sink.
pub struct LogSink {
    file: Option<fs::File>,
    path: PathBuf,
}

impl LogSink {
    /// Open the sink for appending, creating parent directories.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                warn!("Could not create log directory {}: {}", parent.display(), e);
            }
        }

        let file = match OpenOptions::new().create(true).append(true).open(&path).await {
            Ok(file) => Some(file),
            Err(e) => {
                warn!(
                    "Could not open log sink {}, logging to stderr only: {}",
                    path.display(),
                    e
                );
                None
            }
        };

        Self { file, path }
    }

    /// Get the log file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a raw chunk of child output.
    pub async fn write_chunk(&mut self, chunk: &[u8]) {
        if let Some(file) = self.file.as_mut() {
            if let Err(e) = file.write_all(chunk).await {
                warn!("Log sink write failed: {}", e);
            }
        }
    }

    /// Write a single line, terminated with a newline.
    pub async fn write_line(&mut self, line: &str) {
        let framed = format!("{}\n", line);
        self.write_chunk(framed.as_bytes()).await;
    }

    /// Frame the start of a section.
    pub async fn section_started(&mut self, section: &str) {
        self.write_line(&format!("--- {} Started: {} ---", section, iso_now()))
            .await;
    }

    /// Frame the successful end of a section.
    pub async fn section_finished(&mut self, section: &str) {
        self.write_line(&format!("--- {} Finished: {} ---", section, iso_now()))
            .await;
    }

    /// Frame the failed end of a section.
    pub async fn section_failed(&mut self, section: &str) {
        self.write_line(&format!("--- {} Failed: {} ---", section, iso_now()))
            .await;
    }

    /// Flush and close the sink.
    pub async fn close(mut self) {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush().await;
        }
    }
}

fn iso_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Size-capped in-memory byte ring; keeps the most recent bytes.
#[derive(Debug)]
pub struct TeeBuffer {
    cap: usize,
    buf: Vec<u8>,
}

impl TeeBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            buf: Vec::new(),
        }
    }

    /// Append a chunk, dropping the oldest bytes past capacity.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
        if self.buf.len() > self.cap {
            let drop = self.buf.len() - self.cap;
            self.buf.drain(..drop);
        }
    }

    /// The buffered tail as lossy UTF-8.
    pub fn tail(&self) -> String {
        String::from_utf8_lossy(&self.buf).to_string()
    }

    /// Whether the buffered output contains a marker string.
    pub fn contains(&self, needle: &str) -> bool {
        self.tail().contains(needle)
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl Default for TeeBuffer {
    fn default() -> Self {
        Self::new(TEE_BUFFER_CAP)
    }
}

/// Captured result of a tee'd child process.
pub struct TeedOutput {
    pub status: std::process::ExitStatus,
    pub stdout: TeeBuffer,
    pub stderr: TeeBuffer,
}

impl TeedOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn exit_code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }
}

#[derive(Clone, Copy)]
enum StreamKind {
    Stdout,
    Stderr,
}

/// Spawn a command, fanning each output chunk out to the sink and to
/// per-stream capped buffers.
pub async fn run_teed(
    mut command: Command,
    sink: &mut LogSink,
) -> Result<TeedOutput, OrchestratorError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn()?;

    let (tx, mut rx) = mpsc::channel::<(StreamKind, Vec<u8>)>(16);

    if let Some(stdout) = child.stdout.take() {
        let tx = tx.clone();
        tokio::spawn(copy_stream(stdout, StreamKind::Stdout, tx));
    }
    if let Some(stderr) = child.stderr.take() {
        let tx = tx.clone();
        tokio::spawn(copy_stream(stderr, StreamKind::Stderr, tx));
    }
    drop(tx);

    let mut stdout_buf = TeeBuffer::default();
    let mut stderr_buf = TeeBuffer::default();

    while let Some((kind, chunk)) = rx.recv().await {
        sink.write_chunk(&chunk).await;
        match kind {
            StreamKind::Stdout => stdout_buf.push(&chunk),
            StreamKind::Stderr => stderr_buf.push(&chunk),
        }
    }

    let status = child.wait().await?;

    Ok(TeedOutput {
        status,
        stdout: stdout_buf,
        stderr: stderr_buf,
    })
}

async fn copy_stream(
    mut stream: impl AsyncRead + Unpin,
    kind: StreamKind,
    tx: mpsc::Sender<(StreamKind, Vec<u8>)>,
) {
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if tx.send((kind, buf[..n].to_vec())).await.is_err() {
                    break;
                }
            }
        }
    }
}
