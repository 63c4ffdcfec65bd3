//! Dual storage of prediction results: a process-lifetime history log and a
//! SQLite `predictions` table.
//!
//! The durable write is best effort. A failed or slow insert is logged and
//! never undoes the in-memory append or fails the request.

use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{RwLock, RwLockReadGuard};

use crate::error::{Result, StrokeError};
use crate::records::PredictionResult;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS predictions (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  timestamp TEXT,
  age INTEGER,
  hypertension INTEGER,
  heart_disease INTEGER,
  avg_glucose_level REAL,
  bmi REAL,
  smoking_status INTEGER,
  prediction INTEGER,
  stroke_probability REAL,
  no_stroke_probability REAL,
  risk_level TEXT
);
";

/// Append-only, in-memory sequence of results, shared between handlers.
///
/// Appends and reads take the lock briefly; `clear` holds it exclusively
/// while truncating.
#[derive(Clone, Default)]
pub struct HistoryLog {
    entries: Arc<RwLock<Vec<PredictionResult>>>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, result: PredictionResult) {
        self.entries.write().await.push(result);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Returns the total length together with the requested window, taken
    /// under one read lock. Out-of-range windows are clamped, never errors.
    pub async fn query(&self, limit: usize, offset: usize) -> (usize, Vec<PredictionResult>) {
        let entries = self.entries.read().await;
        let total = entries.len();
        let start = offset.min(total);
        let end = start.saturating_add(limit).min(total);
        (total, entries[start..end].to_vec())
    }

    /// Empties the log and reports how many entries were dropped.
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.write().await;
        let removed = entries.len();
        entries.clear();
        removed
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, Vec<PredictionResult>> {
        self.entries.read().await
    }
}

/// Handle on the SQLite table. rusqlite connections are not `Sync`, so
/// access is serialized behind a mutex and driven from the blocking pool.
#[derive(Clone)]
pub struct PredictionDb {
    conn: Arc<Mutex<Connection>>,
}

impl PredictionDb {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(PredictionDb {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // a panicked writer cannot leave a half-applied statement behind
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Inserts one row and returns its id.
    pub fn insert(&self, result: &PredictionResult) -> Result<i64> {
        let conn = self.lock();
        let record = &result.patient_data;
        conn.execute(
            "INSERT INTO predictions
               (timestamp, age, hypertension, heart_disease, avg_glucose_level, bmi,
                smoking_status, prediction, stroke_probability, no_stroke_probability, risk_level)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                result.timestamp.to_rfc3339(),
                record.age,
                record.hypertension,
                record.heart_disease,
                record.avg_glucose_level,
                record.bmi,
                record.smoking_status,
                result.prediction,
                result.stroke_probability,
                result.no_stroke_probability,
                result.risk_level.as_str(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn count(&self) -> Result<i64> {
        let conn = self.lock();
        let count = conn.query_row("SELECT COUNT(*) FROM predictions", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Writes every result to the history log and, when configured, to the
/// durable table.
#[derive(Clone)]
pub struct ResultStore {
    history: HistoryLog,
    db: Option<PredictionDb>,
    write_timeout: Duration,
    pending_writes: Arc<AtomicUsize>,
}

impl ResultStore {
    pub fn new(history: HistoryLog, db: Option<PredictionDb>, write_timeout: Duration) -> Self {
        ResultStore {
            history,
            db,
            write_timeout,
            pending_writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Inserts handed to the blocking pool that have not finished yet,
    /// including ones whose caller already gave up on them.
    pub fn pending_writes(&self) -> usize {
        self.pending_writes.load(Ordering::Acquire)
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn db(&self) -> Option<&PredictionDb> {
        self.db.as_ref()
    }

    /// Appends to the history log (always succeeds), then attempts the
    /// durable insert. Returns whether the insert landed in time.
    pub async fn append(&self, result: PredictionResult) -> bool {
        self.history.append(result.clone()).await;

        let Some(db) = self.db.clone() else {
            log::warn!("No database configured, prediction kept in memory only");
            return false;
        };

        match self.persist(db, result).await {
            Ok(id) => {
                log::debug!("Saved prediction row {}", id);
                true
            }
            Err(e) => {
                log::error!("DB save error: {}", e);
                false
            }
        }
    }

    /// On timeout the blocking insert is left to finish on its own; the row
    /// may still appear later.
    async fn persist(&self, db: PredictionDb, result: PredictionResult) -> Result<i64> {
        let pending = Arc::clone(&self.pending_writes);
        pending.fetch_add(1, Ordering::AcqRel);
        let task = tokio::task::spawn_blocking(move || {
            let inserted = db.insert(&result);
            pending.fetch_sub(1, Ordering::AcqRel);
            inserted
        });
        match tokio::time::timeout(self.write_timeout, task).await {
            Ok(Ok(inserted)) => inserted,
            Ok(Err(join_err)) => {
                self.pending_writes.fetch_sub(1, Ordering::AcqRel);
                Err(StrokeError::Task(join_err.to_string()))
            }
            Err(_) => {
                log::warn!(
                    "Database write still queued after {:?}, {} insert(s) pending",
                    self.write_timeout,
                    self.pending_writes()
                );
                Err(StrokeError::Timeout("database write"))
            }
        }
    }
}
