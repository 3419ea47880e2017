//! Record egress - writes violation, movement and metrics records to file
//!
//! Records are written in JSONL format (one JSON object per line)
//! to the file specified in config.

use crate::io::egress_channel::EgressMessage;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

/// Egress writer for records
pub struct Egress {
    file_path: String,
    /// Opened lazily on first write
    writer: Option<BufWriter<File>>,
    written: u64,
}

impl Egress {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "egress_initialized");
        Self { file_path: file_path.to_string(), writer: None, written: 0 }
    }

    /// Write one message as a JSON line
    /// Returns true if successful, false otherwise
    pub fn write_message(&mut self, msg: &EgressMessage) -> bool {
        let json = match serde_json::to_string(msg) {
            Ok(json) => json,
            Err(e) => {
                error!(kind = %msg.as_str(), error = %e, "egress_serialize_failed");
                return false;
            }
        };

        match self.append_line(&json) {
            Ok(()) => {
                self.written += 1;
                true
            }
            Err(e) => {
                error!(kind = %msg.as_str(), error = %e, "egress_write_failed");
                false
            }
        }
    }

    /// Append a line to the egress file
    fn append_line(&mut self, line: &str) -> std::io::Result<()> {
        if self.writer.is_none() {
            self.writer = Some(Self::open(&self.file_path)?);
        }
        if let Some(writer) = self.writer.as_mut() {
            writeln!(writer, "{}", line)?;
        }
        Ok(())
    }

    fn open(file_path: &str) -> std::io::Result<BufWriter<File>> {
        let path = Path::new(file_path);

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(BufWriter::new(file))
    }

    pub fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.flush() {
                error!(file = %self.file_path, error = %e, "egress_flush_failed");
            }
        }
    }

    /// Write every queued message, then flush
    pub fn write_batch(&mut self, first: EgressMessage, rx: &mut mpsc::Receiver<EgressMessage>) {
        self.write_message(&first);
        while let Ok(msg) = rx.try_recv() {
            self.write_message(&msg);
        }
        self.flush();
        debug!(file = %self.file_path, written = %self.written, "egress_batch_written");
    }

    /// Run the writer loop
    ///
    /// Consumes messages until the channel closes, shutdown is signalled
    /// or the shutdown sender is dropped, draining what is already queued
    /// before returning. Returns the number of lines written.
    pub async fn run(mut self, mut rx: mpsc::Receiver<EgressMessage>, mut shutdown: watch::Receiver<bool>) -> u64 {
        info!(file = %self.file_path, "egress_started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        while let Ok(msg) = rx.try_recv() {
                            self.write_message(&msg);
                        }
                        break;
                    }
                }
                msg = rx.recv() => {
                    match msg {
                        Some(msg) => self.write_batch(msg, &mut rx),
                        None => break, // Channel closed
                    }
                }
            }
        }

        self.flush();
        info!(file = %self.file_path, written = %self.written, "egress_stopped");
        self.written
    }
}
