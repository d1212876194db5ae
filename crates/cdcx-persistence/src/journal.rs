//! JSON Lines journal of finished execution attempts.
//!
//! One file per UTC day (`attempts_YYYYMMDD.jsonl`), opened in append mode.
//! Each line is a complete record, so an interrupted write costs at most the
//! last line. Every record is flushed immediately: an attempt moves real
//! funds and must be on disk before the next one starts.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use cdcx_core::ExecutionAttempt;
use cdcx_executor::AttemptSink;

use crate::error::PersistenceResult;

/// One journal line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub recorded_at: DateTime<Utc>,
    pub attempt: ExecutionAttempt,
}

struct ActiveFile {
    writer: BufWriter<File>,
    date: String,
    records_written: usize,
}

pub struct AttemptJournal {
    dir: PathBuf,
    active: Mutex<Option<ActiveFile>>,
}

impl AttemptJournal {
    pub fn new(dir: impl AsRef<Path>) -> PersistenceResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            active: Mutex::new(None),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, at: DateTime<Utc>) -> PathBuf {
        self.dir.join(format!("attempts_{}.jsonl", at.format("%Y%m%d")))
    }

    pub fn record(&self, attempt: &ExecutionAttempt) -> PersistenceResult<()> {
        self.record_at(attempt, Utc::now())
    }

    /// Append one record, rotating to a new file when the day changes.
    pub fn record_at(&self, attempt: &ExecutionAttempt, now: DateTime<Utc>) -> PersistenceResult<()> {
        let date = now.format("%Y%m%d").to_string();
        let line = serde_json::to_string(&JournalRecord {
            recorded_at: now,
            attempt: attempt.clone(),
        })?;

        let mut guard = self.active.lock();
        let mut active = match guard.take() {
            Some(active) if active.date == date => active,
            stale => {
                Self::close(stale);
                let path = self.path_for(now);
                info!(path = %path.display(), "Opening attempt journal (append mode)");
                let file = OpenOptions::new().create(true).append(true).open(&path)?;
                ActiveFile {
                    writer: BufWriter::new(file),
                    date,
                    records_written: 0,
                }
            }
        };

        writeln!(active.writer, "{line}")?;
        active.writer.flush()?;
        active.records_written += 1;
        *guard = Some(active);
        Ok(())
    }

    fn close(active: Option<ActiveFile>) {
        if let Some(mut active) = active {
            if let Err(e) = active.writer.flush() {
                warn!(?e, "Failed to flush attempt journal on close");
            }
            info!(
                date = %active.date,
                records = active.records_written,
                "Closed attempt journal"
            );
        }
    }
}

impl AttemptSink for AttemptJournal {
    fn on_attempt(&self, attempt: &ExecutionAttempt) {
        if let Err(e) = self.record(attempt) {
            error!(currency = %attempt.currency, error = %e, "Failed to journal attempt");
        }
    }
}

impl Drop for AttemptJournal {
    fn drop(&mut self) {
        Self::close(self.active.get_mut().take());
    }
}

impl std::fmt::Debug for AttemptJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttemptJournal")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

/// Read every intact record of a journal file. Malformed lines are skipped.
pub fn read_journal(path: impl AsRef<Path>) -> PersistenceResult<Vec<JournalRecord>> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(line = index + 1, error = %e, "Skipping malformed journal line"),
        }
    }
    Ok(records)
}
