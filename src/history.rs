use crate::app_dirs::AppDirs;
use crate::error::HistoryError;
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use itertools::Itertools;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// One finished session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// ISO-8601, UTC with millisecond precision.
    pub timestamp: String,
    pub score: u32,
}

impl HistoryEntry {
    pub fn new(timestamp: impl Into<String>, score: u32) -> Self {
        Self {
            timestamp: timestamp.into(),
            score,
        }
    }

    pub fn now(score: u32) -> Self {
        Self::new(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true), score)
    }

    pub fn parsed_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.timestamp).ok()
    }
}

/// Durable per-user score history.
///
/// `read_all` returns entries in insertion order; callers that need time
/// order should go through [`sorted_by_timestamp`].
pub trait HistoryStore {
    fn append(&mut self, username: &str, entry: &HistoryEntry) -> Result<(), HistoryError>;
    fn read_all(&self, username: &str) -> Result<Vec<HistoryEntry>, HistoryError>;
}

impl<S: HistoryStore + ?Sized> HistoryStore for Box<S> {
    fn append(&mut self, username: &str, entry: &HistoryEntry) -> Result<(), HistoryError> {
        (**self).append(username, entry)
    }

    fn read_all(&self, username: &str) -> Result<Vec<HistoryEntry>, HistoryError> {
        (**self).read_all(username)
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryHistoryStore {
    entries: HashMap<String, Vec<HistoryEntry>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn append(&mut self, username: &str, entry: &HistoryEntry) -> Result<(), HistoryError> {
        self.entries
            .entry(username.to_string())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    fn read_all(&self, username: &str) -> Result<Vec<HistoryEntry>, HistoryError> {
        Ok(self.entries.get(username).cloned().unwrap_or_default())
    }
}

/// SQLite-backed history under the application state directory
#[derive(Debug)]
pub struct SqliteHistoryStore {
    conn: Connection,
}

impl SqliteHistoryStore {
    /// Open the store at the default location, creating it if needed
    pub fn open_default() -> Result<Self, HistoryError> {
        let path = AppDirs::db_path().unwrap_or_else(|| PathBuf::from("quantprep_history.db"));
        Self::open(path)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, HistoryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        tracing::debug!(path = %path.display(), "opening history database");
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, HistoryError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, HistoryError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS score_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                score INTEGER NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_score_history_user ON score_history(username)",
            [],
        )?;

        Ok(Self { conn })
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn append(&mut self, username: &str, entry: &HistoryEntry) -> Result<(), HistoryError> {
        self.conn.execute(
            "INSERT INTO score_history (username, timestamp, score) VALUES (?1, ?2, ?3)",
            params![username, entry.timestamp, entry.score],
        )?;
        Ok(())
    }

    fn read_all(&self, username: &str) -> Result<Vec<HistoryEntry>, HistoryError> {
        let mut stmt = self.conn.prepare(
            "SELECT timestamp, score FROM score_history WHERE username = ?1 ORDER BY id ASC",
        )?;

        let rows = stmt.query_map([username], |row| {
            Ok(HistoryEntry {
                timestamp: row.get(0)?,
                score: row.get(1)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

/// Oldest first. Entries whose timestamp does not parse sort ahead of the rest.
pub fn sorted_by_timestamp(entries: &[HistoryEntry]) -> Vec<HistoryEntry> {
    entries
        .iter()
        .cloned()
        .sorted_by_key(|e| e.parsed_timestamp())
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistorySummary {
    pub sessions: usize,
    pub best: u32,
    pub mean: f64,
}

pub fn summarize(entries: &[HistoryEntry]) -> Option<HistorySummary> {
    let best = entries.iter().map(|e| e.score).max()?;
    let total: u64 = entries.iter().map(|e| u64::from(e.score)).sum();
    Some(HistorySummary {
        sessions: entries.len(),
        best,
        mean: total as f64 / entries.len() as f64,
    })
}

/// Write `attempt,timestamp,score` rows, oldest first.
pub fn write_csv<W: Write>(entries: &[HistoryEntry], writer: W) -> Result<(), HistoryError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["attempt", "timestamp", "score"])?;
    for (i, entry) in sorted_by_timestamp(entries).iter().enumerate() {
        wtr.write_record([
            (i + 1).to_string(),
            entry.timestamp.clone(),
            entry.score.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_entry_now_is_iso8601() {
        let entry = HistoryEntry::now(12);
        assert!(entry.parsed_timestamp().is_some());
        assert!(entry.timestamp.ends_with('Z'));
        assert_eq!(entry.score, 12);
    }

    #[test]
    fn test_memory_store_is_per_user() {
        let mut store = MemoryHistoryStore::new();
        store
            .append("alice", &HistoryEntry::new("2024-01-01T00:00:00.000Z", 3))
            .unwrap();
        store
            .append("bob", &HistoryEntry::new("2024-01-02T00:00:00.000Z", 9))
            .unwrap();

        assert_eq!(store.read_all("alice").unwrap().len(), 1);
        assert_eq!(store.read_all("bob").unwrap()[0].score, 9);
        assert!(store.read_all("carol").unwrap().is_empty());
    }

    #[test]
    fn test_sqlite_store_keeps_insertion_order() {
        let mut store = SqliteHistoryStore::in_memory().unwrap();
        store
            .append("alice", &HistoryEntry::new("2024-03-01T00:00:00.000Z", 5))
            .unwrap();
        store
            .append("alice", &HistoryEntry::new("2024-01-01T00:00:00.000Z", 8))
            .unwrap();
        store
            .append("bob", &HistoryEntry::new("2024-02-01T00:00:00.000Z", 1))
            .unwrap();

        let alice = store.read_all("alice").unwrap();
        assert_eq!(
            alice.iter().map(|e| e.score).collect::<Vec<_>>(),
            vec![5, 8]
        );
        assert_eq!(store.read_all("bob").unwrap().len(), 1);
    }

    #[test]
    fn test_sqlite_store_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("history.db");

        {
            let mut store = SqliteHistoryStore::open(&path).unwrap();
            store.append("dana", &HistoryEntry::now(17)).unwrap();
        }

        let store = SqliteHistoryStore::open(&path).unwrap();
        let entries = store.read_all("dana").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].score, 17);
    }

    #[test]
    fn test_sorted_by_timestamp() {
        let entries = vec![
            HistoryEntry::new("2024-03-01T10:00:00.000Z", 3),
            HistoryEntry::new("2024-01-01T10:00:00.000Z", 1),
            HistoryEntry::new("2024-02-01T10:00:00+02:00", 2),
        ];

        let sorted = sorted_by_timestamp(&entries);

        assert_eq!(
            sorted.iter().map(|e| e.score).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_summarize() {
        assert_eq!(summarize(&[]), None);

        let summary = summarize(&[
            HistoryEntry::new("2024-01-01T00:00:00.000Z", 4),
            HistoryEntry::new("2024-01-02T00:00:00.000Z", 10),
            HistoryEntry::new("2024-01-03T00:00:00.000Z", 7),
        ])
        .unwrap();

        assert_eq!(summary.sessions, 3);
        assert_eq!(summary.best, 10);
        assert_eq!(summary.mean, 7.0);
    }

    #[test]
    fn test_write_csv() {
        let entries = vec![
            HistoryEntry::new("2024-01-02T00:00:00.000Z", 9),
            HistoryEntry::new("2024-01-01T00:00:00.000Z", 4),
        ];
        let mut out = Vec::new();

        write_csv(&entries, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "attempt,timestamp,score\n\
             1,2024-01-01T00:00:00.000Z,4\n\
             2,2024-01-02T00:00:00.000Z,9\n"
        );
    }
}
