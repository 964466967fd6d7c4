//! Degraded-mode log.
//!
//! Envelopes published while no broker is reachable are appended to one
//! JSON-lines file per topic (`<dir>/<topic>.log`), or kept in memory when no
//! directory is configured. Nothing is ever delivered from here; the log
//! exists so operators can see what the bus would have carried.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use healthtrack_core::{Category, Envelope};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::BusError;

/// One line of the degraded log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalLogEntry {
    /// Envelope key (the record id).
    pub key: String,
    /// Envelope payload as text.
    pub value: String,
    /// When the envelope was produced.
    pub timestamp: DateTime<Utc>,
}

impl From<&Envelope> for LocalLogEntry {
    fn from(envelope: &Envelope) -> Self {
        Self {
            key: envelope.key.clone(),
            value: envelope.payload_text(),
            timestamp: envelope.produced_at,
        }
    }
}

#[derive(Debug)]
enum Sink {
    Files {
        dir: PathBuf,
        write_lock: tokio::sync::Mutex<()>,
    },
    Memory(Mutex<HashMap<Category, Vec<LocalLogEntry>>>),
}

/// Append-only local record of undelivered envelopes.
#[derive(Debug)]
pub struct LocalLog {
    sink: Sink,
}

impl LocalLog {
    /// Opens a file-backed log, creating `dir` if needed.
    ///
    /// # Errors
    ///
    /// Returns `BusError::Io` when the directory cannot be created.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, BusError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            sink: Sink::Files {
                dir,
                write_lock: tokio::sync::Mutex::new(()),
            },
        })
    }

    /// A log that keeps entries in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            sink: Sink::Memory(Mutex::new(HashMap::new())),
        }
    }

    /// Directory of a file-backed log.
    #[must_use]
    pub fn dir(&self) -> Option<&Path> {
        match &self.sink {
            Sink::Files { dir, .. } => Some(dir),
            Sink::Memory(_) => None,
        }
    }

    fn topic_path(dir: &Path, topic: Category) -> PathBuf {
        dir.join(format!("{}.log", topic.topic()))
    }

    /// Appends an envelope to its topic's log.
    ///
    /// # Errors
    ///
    /// Returns `BusError::Io` or `BusError::Encoding` when the line cannot be
    /// written.
    pub async fn append(&self, envelope: &Envelope) -> Result<(), BusError> {
        let entry = LocalLogEntry::from(envelope);
        match &self.sink {
            Sink::Files { dir, write_lock } => {
                let mut line = serde_json::to_vec(&entry)?;
                line.push(b'\n');
                let path = Self::topic_path(dir, envelope.topic);

                let _guard = write_lock.lock().await;
                let mut file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .await?;
                file.write_all(&line).await?;
                file.flush().await?;
                debug!(topic = envelope.topic.topic(), key = %envelope.key, path = %path.display(), "envelope logged locally");
            }
            Sink::Memory(entries) => {
                let mut entries = entries
                    .lock()
                    .map_err(|_| std::io::Error::other("local log lock poisoned"))?;
                entries.entry(envelope.topic).or_default().push(entry);
            }
        }
        Ok(())
    }

    /// Reads back every entry logged for `topic`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `BusError::Io` when the file cannot be read and
    /// `BusError::Encoding` when a line is not a valid entry.
    pub async fn entries(&self, topic: Category) -> Result<Vec<LocalLogEntry>, BusError> {
        match &self.sink {
            Sink::Files { dir, .. } => {
                let path = Self::topic_path(dir, topic);
                let contents = match tokio::fs::read_to_string(&path).await {
                    Ok(contents) => contents,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
                    Err(e) => return Err(e.into()),
                };
                contents
                    .lines()
                    .filter(|line| !line.trim().is_empty())
                    .map(|line| serde_json::from_str(line).map_err(BusError::from))
                    .collect()
            }
            Sink::Memory(entries) => {
                let entries = entries
                    .lock()
                    .map_err(|_| std::io::Error::other("local log lock poisoned"))?;
                Ok(entries.get(&topic).cloned().unwrap_or_default())
            }
        }
    }
}
