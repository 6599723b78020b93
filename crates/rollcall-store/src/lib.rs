//! rollcall-store — SQLite-backed persistence for face embeddings and
//! attendance bookkeeping.
//!
//! The embedding store owns the one-active-embedding-per-student
//! invariant; the attendance store owns sessions, check-in records and
//! absence marking. Both are served by a single [`SqliteStore`] behind the
//! [`EmbeddingStore`] and [`AttendanceStore`] traits.

pub mod attendance;
pub mod embeddings;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

pub use attendance::{AttendanceRecord, AttendanceStatus, AttendanceStore, Session, SessionStatus};
pub use embeddings::{EmbeddingStore, RegisteredFace};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("stored data is corrupt: {0}")]
    Corrupt(String),
    #[error("no face data found for student {student_id}")]
    NotFound { student_id: String },
    #[error("session {session_id} not found")]
    SessionNotFound { session_id: String },
    #[error("session {session_id} is not active")]
    SessionNotActive { session_id: String },
    #[error("class {class_id} already has an active session")]
    ActiveSessionExists { class_id: String },
    #[error("student already checked in for this session")]
    DuplicateCheckIn,
    #[error("no student registered for email {email}")]
    UnknownEmail { email: String },
}

/// Shared SQLite store. Connection access is serialized internally, so a
/// single instance can be shared across async tasks.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent() {
            // Ignore failures here; the open below reports a usable error.
            let _ = std::fs::create_dir_all(dir);
        }
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "opened attendance database");
        Self::from_connection(conn)
    }

    /// In-memory database, for tests and diagnostics.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        // A poisoned lock only means another caller panicked mid-query;
        // the connection itself is still usable.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS face_embeddings (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id    TEXT NOT NULL UNIQUE,
    embedding     TEXT NOT NULL,
    model_version TEXT,
    quality       REAL NOT NULL,
    is_active     INTEGER NOT NULL DEFAULT 1,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS students (
    student_id TEXT PRIMARY KEY,
    email      TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS attendance_sessions (
    id            TEXT PRIMARY KEY,
    class_id      TEXT NOT NULL,
    teacher_email TEXT NOT NULL,
    start_time    TEXT NOT NULL,
    end_time      TEXT NOT NULL,
    grace_minutes INTEGER NOT NULL,
    status        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS class_students (
    class_id   TEXT NOT NULL,
    student_id TEXT NOT NULL,
    PRIMARY KEY (class_id, student_id)
);

CREATE TABLE IF NOT EXISTS attendance_records (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id       TEXT NOT NULL,
    student_id       TEXT NOT NULL,
    check_in_time    TEXT NOT NULL,
    status           TEXT NOT NULL,
    face_match_score REAL,
    UNIQUE (session_id, student_id)
);
";
