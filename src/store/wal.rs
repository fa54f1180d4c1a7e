//! Append-only write-ahead log
//!
//! Every accepted ingest batch is appended as one newline-delimited JSON
//! record and fsynced before the in-memory indexes are touched, so a batch
//! is either fully durable or absent. A torn tail line (crash mid-write)
//! fails to parse on replay and is skipped with a warning.

use super::model::SpanRecord;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

const WAL_FILE_NAME: &str = "spans.wal";

/// One atomically-committed ingest batch.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct WalBatch {
    /// Commit wall-clock stamp (epoch ms), for operators reading the log.
    pub committed_at_ms: i64,
    pub spans: Vec<SpanRecord>,
}

impl WalBatch {
    pub fn new(spans: Vec<SpanRecord>) -> Self {
        Self {
            committed_at_ms: chrono::Utc::now().timestamp_millis(),
            spans,
        }
    }
}

pub struct Wal {
    file: File,
    path: PathBuf,
}

impl Wal {
    /// Open (or create) the WAL under `data_dir` and replay every committed
    /// batch in commit order.
    pub fn open(data_dir: &Path) -> Result<(Self, Vec<WalBatch>), WalError> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(WAL_FILE_NAME);

        let batches = if path.exists() {
            Self::replay(&path)?
        } else {
            Vec::new()
        };

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok((Self { file, path }, batches))
    }

    fn replay(path: &Path) -> Result<Vec<WalBatch>, WalError> {
        let reader = BufReader::new(File::open(path)?);
        let mut batches = Vec::new();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<WalBatch>(&line) {
                Ok(batch) => batches.push(batch),
                Err(e) => {
                    // Most likely a torn write from a crash mid-append.
                    tracing::warn!(
                        "Skipping unparseable WAL record at line {}: {}",
                        line_no + 1,
                        e
                    );
                }
            }
        }

        Ok(batches)
    }

    /// Append one batch and fsync. Returns only after the batch is durable.
    pub fn append(&mut self, batch: &WalBatch) -> Result<(), WalError> {
        let mut record =
            serde_json::to_vec(batch).map_err(|e| WalError::Serialization(e.to_string()))?;
        record.push(b'\n');
        self.file.write_all(&record)?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Current WAL size on disk.
    pub fn size_bytes(&self) -> u64 {
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
