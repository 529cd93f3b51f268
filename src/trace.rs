//! JSONL trace of provider calls.
//!
//! [`ProviderClient`](crate::ProviderClient) emits one [`CallTrace`] per
//! attempt. [`JsonlTraceSink`] hands rows to a dedicated writer thread over a
//! channel, so recording never blocks the runtime on file IO.

use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::mpsc;
use std::thread::JoinHandle;

#[derive(Debug, Clone, Serialize)]
pub struct CallTrace {
    pub timestamp_ms: i64,
    pub run_id: Option<String>,
    pub task: String,
    pub model: String,
    pub template_slug: String,
    pub prompt_hash: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_nanodollars: i64,
    pub latency_ms: u64,
    /// Rendered provider error when the attempt failed.
    pub error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("trace io: {0}")]
    Io(#[from] std::io::Error),
    #[error("trace row not serializable: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("trace writer has stopped")]
    Closed,
    #[error("trace writer panicked")]
    Panicked,
}

pub trait TraceSink: Send + Sync {
    fn record(&self, event: CallTrace) -> Result<(), TraceError>;
}

/// Cloneable handle onto the writer thread.
#[derive(Clone)]
pub struct JsonlTraceSink {
    rows: mpsc::Sender<CallTrace>,
}

/// The writer thread. It exits once every [`JsonlTraceSink`] clone is
/// dropped; `join` then reports whether all rows reached disk.
pub struct TraceWorker {
    thread: JoinHandle<Result<(), TraceError>>,
}

impl TraceWorker {
    pub fn join(self) -> Result<(), TraceError> {
        self.thread.join().map_err(|_| TraceError::Panicked)?
    }
}

impl JsonlTraceSink {
    /// Truncates `path` and starts the writer.
    pub fn new(path: impl AsRef<Path>) -> Result<(Self, TraceWorker), TraceError> {
        let out = BufWriter::new(File::create(path)?);
        let (rows, inbox) = mpsc::channel();
        let thread = std::thread::Builder::new()
            .name("deck-trace".into())
            .spawn(move || drain(out, inbox))?;
        Ok((Self { rows }, TraceWorker { thread }))
    }
}

impl TraceSink for JsonlTraceSink {
    fn record(&self, event: CallTrace) -> Result<(), TraceError> {
        self.rows.send(event).map_err(|_| TraceError::Closed)
    }
}

fn drain(mut out: BufWriter<File>, inbox: mpsc::Receiver<CallTrace>) -> Result<(), TraceError> {
    for row in inbox {
        serde_json::to_writer(&mut out, &row)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

pub fn now_epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
