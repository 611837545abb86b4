//! Buffered persistence of captured records into per-profile stub files.

use super::tasks::InFlight;
use super::types::{Record, StubFile};
use crate::error::{GatewayError, Result};
use crate::metrics;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Serialize `value` as tab-indented JSON followed by a newline.
pub fn to_indented_json<T: Serialize>(value: &T) -> serde_json::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"\t");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    value.serialize(&mut serializer)?;
    buffer.push(b'\n');
    Ok(buffer)
}

/// In-memory buffer of records waiting to be merged into their stub files.
pub struct RecordStore {
    stub_dir: PathBuf,
    pending: Mutex<Vec<Record>>,
    in_flight: InFlight,
}

impl RecordStore {
    pub fn new(stub_dir: impl Into<PathBuf>, in_flight: InFlight) -> Self {
        Self {
            stub_dir: stub_dir.into(),
            pending: Mutex::new(Vec::new()),
            in_flight,
        }
    }

    /// Buffer `record` for the next flush. Each record holds one unit of in-flight work.
    pub fn enqueue(&self, record: Record) {
        self.in_flight.add(1);
        self.pending.lock().push(record);
        metrics::record_enqueued();
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    fn drain(&self) -> Vec<Record> {
        std::mem::take(&mut *self.pending.lock())
    }

    /// Write every buffered record to its stub file. Returns how many were written.
    ///
    /// A record whose file cannot be written is dropped and logged.
    pub fn flush(&self) -> usize {
        let records = self.drain();
        let mut written = 0;

        for record in records {
            let path = self.stub_dir.join(record.file_path());
            match write_to_file(&path, &record) {
                Ok(()) => {
                    written += 1;
                    metrics::record_flushed(true);
                    debug!(stub.file = %path.display(), "writeFileSucceed");
                }
                Err(e) => {
                    metrics::record_flushed(false);
                    error!(stub.file = %path.display(), "writeFileFailed: {}", e);
                }
            }
            self.in_flight.done();
        }

        written
    }

    /// Flush on every tick of `interval` until `shutdown` fires, then flush once more.
    pub async fn run_flush_loop(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.flush_blocking().await;
                }
                _ = shutdown.recv() => {
                    break;
                }
            }
        }

        self.flush_blocking().await;
        info!("flush loop stopped");
    }

    async fn flush_blocking(self: &Arc<Self>) {
        if self.pending_len() == 0 {
            return;
        }
        let store = Arc::clone(self);
        if let Err(e) = tokio::task::spawn_blocking(move || store.flush()).await {
            error!("flush task failed: {}", e);
        }
    }
}

/// Append `record` to the stub file at `path`, creating directories as needed.
///
/// An empty or whitespace-only file counts as holding zero records. Any other
/// content that does not decode as a stub file fails the write and leaves the
/// file untouched.
pub fn write_to_file(path: &Path, record: &Record) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent).map_err(|e| GatewayError::file_write(path, e))?;
    }

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| GatewayError::file_write(path, e))?;

    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|e| GatewayError::file_write(path, e))?;

    let mut stub_file = if contents.trim().is_empty() {
        StubFile::default()
    } else {
        serde_json::from_str::<StubFile>(&contents)
            .map_err(|e| GatewayError::file_write(path, format!("failed to decode: {e}")))?
    };
    stub_file.records.push(record.clone());

    let encoded = to_indented_json(&stub_file).map_err(|e| GatewayError::file_write(path, e))?;

    file.set_len(0)
        .and_then(|_| file.seek(SeekFrom::Start(0)))
        .and_then(|_| file.write_all(&encoded))
        .and_then(|_| file.flush())
        .map_err(|e| GatewayError::file_write(path, e))
}

#[cfg(unix)]
fn create_dir_all(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_dir_all(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}
