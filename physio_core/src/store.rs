//! Local session storage.
//!
//! Sessions are appended to a JSONL (JSON Lines) log with file locking.
//! A session is written once when it starts and again when it completes;
//! readers fold the log so the last line for an id wins.

use crate::lockfile::FileLock;
use crate::{Error, ExerciseSession, Result};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::hash::Hash;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use uuid::Uuid;

/// Local persistence port used by the session driver and the statistics views
pub trait SessionStore {
    /// Insert a session, replacing any earlier version with the same id
    fn upsert(&mut self, session: &ExerciseSession) -> Result<()>;

    fn get(&self, id: Uuid) -> Result<Option<ExerciseSession>>;

    /// All sessions of a user, newest first
    fn sessions_for_user(&self, user_id: &str) -> Result<Vec<ExerciseSession>>;

    /// Completed sessions of a user that started on `today` (UTC)
    fn completed_today(&self, user_id: &str, today: NaiveDate) -> Result<Vec<ExerciseSession>> {
        Ok(self
            .sessions_for_user(user_id)?
            .into_iter()
            .filter(|s| s.completed && s.start_time.date_naive() == today)
            .collect())
    }

    fn completed_for_user(&self, user_id: &str) -> Result<Vec<ExerciseSession>> {
        Ok(self
            .sessions_for_user(user_id)?
            .into_iter()
            .filter(|s| s.completed)
            .collect())
    }
}

/// JSONL-based session store with file locking
pub struct JsonlSessionStore {
    path: PathBuf,
}

impl JsonlSessionStore {
    /// Create a new store backed by the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure the parent directory exists
    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Latest version of every session, in first-write order
    pub fn read_all(&self) -> Result<Vec<ExerciseSession>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let _lock = FileLock::shared(&self.path)?;
        let file = File::open(&self.path)?;
        let sessions = fold_latest(&file, |s: &ExerciseSession| s.id)?;

        tracing::debug!("Read {} sessions from {:?}", sessions.len(), self.path);
        Ok(sessions)
    }

    /// Rewrite the log with one line per session.
    ///
    /// Returns the number of sessions kept. Appends wait on the same sidecar
    /// lock, so none can land on the log being replaced.
    pub fn compact(&self) -> Result<usize> {
        if !self.path.exists() {
            return Ok(0);
        }

        let _lock = FileLock::exclusive(&self.path)?;
        let sessions = fold_latest(&File::open(&self.path)?, |s: &ExerciseSession| s.id)?;
        rewrite_jsonl(&self.path, &sessions)?;

        tracing::info!(
            "Compacted session log {:?} to {} sessions",
            self.path,
            sessions.len()
        );
        Ok(sessions.len())
    }
}

/// Fold a JSONL log so the last line for each key wins, in first-write order.
///
/// Lines that fail to parse are logged and skipped.
pub(crate) fn fold_latest<T, K, F>(file: &File, key: F) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let reader = BufReader::new(file);
    let mut records: Vec<T> = Vec::new();
    let mut index: HashMap<K, usize> = HashMap::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<T>(&line) {
            Ok(record) => match index.get(&key(&record)) {
                Some(&pos) => records[pos] = record,
                None => {
                    index.insert(key(&record), records.len());
                    records.push(record);
                }
            },
            Err(e) => {
                tracing::warn!("Failed to parse record at line {}: {}", line_num + 1, e);
                // Continue reading, don't fail completely
            }
        }
    }

    Ok(records)
}

/// Append one JSON line. Callers hold the exclusive sidecar lock.
pub(crate) fn append_jsonl<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = std::io::BufWriter::new(&file);
    let line = serde_json::to_string(record)?;
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Replace the log with `records` via temp file and rename.
/// Callers hold the exclusive sidecar lock.
pub(crate) fn rewrite_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::State(format!("log {:?} has no parent", path)))?;
    let temp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = std::io::BufWriter::new(temp.as_file());
        for record in records {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

impl SessionStore for JsonlSessionStore {
    fn upsert(&mut self, session: &ExerciseSession) -> Result<()> {
        self.ensure_parent_dir()?;

        let _lock = FileLock::exclusive(&self.path)?;
        append_jsonl(&self.path, session)?;

        tracing::debug!(
            "Stored session {} (completed: {})",
            session.id,
            session.completed
        );
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<Option<ExerciseSession>> {
        Ok(self.read_all()?.into_iter().find(|s| s.id == id))
    }

    fn sessions_for_user(&self, user_id: &str) -> Result<Vec<ExerciseSession>> {
        let mut sessions: Vec<_> = self
            .read_all()?
            .into_iter()
            .filter(|s| s.user_id == user_id)
            .collect();
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(sessions)
    }
}
