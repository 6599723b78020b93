//! Attendance sessions, check-in records, roster and absence marking.

use crate::{SqliteStore, StoreError};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Timeliness classification of one attendance record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Late => "late",
            AttendanceStatus::Absent => "absent",
        }
    }

    fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "present" => Ok(AttendanceStatus::Present),
            "late" => Ok(AttendanceStatus::Late),
            "absent" => Ok(AttendanceStatus::Absent),
            other => Err(StoreError::Corrupt(format!("unknown attendance status {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Ended,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Ended => "ended",
        }
    }

    fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "ended" => Ok(SessionStatus::Ended),
            other => Err(StoreError::Corrupt(format!("unknown session status {other:?}"))),
        }
    }
}

/// One attendance session for a class.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub class_id: String,
    pub teacher_email: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Minutes after `start_time` during which a check-in still counts as
    /// present rather than late.
    pub grace_minutes: i64,
    pub status: SessionStatus,
}

/// One recorded attendance event.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceRecord {
    pub session_id: String,
    pub student_id: String,
    pub check_in_time: DateTime<Utc>,
    pub status: AttendanceStatus,
    /// Similarity of the accepted face match; `None` for absent records
    /// and for check-ins accepted without enrollment.
    pub face_match_score: Option<f32>,
}

/// Storage contract for sessions, records and the class roster.
pub trait AttendanceStore {
    fn add_student(&self, student_id: &str, email: &str) -> Result<(), StoreError>;

    /// Resolve a stored email to its student identity. This is the real
    /// lookup check-in must use; identities are never derived from the
    /// email text itself.
    fn lookup_student(&self, email: &str) -> Result<Option<String>, StoreError>;

    fn enroll_in_class(&self, class_id: &str, student_id: &str) -> Result<(), StoreError>;

    fn class_roster(&self, class_id: &str) -> Result<Vec<String>, StoreError>;

    /// Open a session; a class can have at most one active session.
    fn create_session(
        &self,
        class_id: &str,
        teacher_email: &str,
        duration_hours: i64,
        grace_minutes: i64,
    ) -> Result<Session, StoreError>;

    fn get_session(&self, session_id: &str) -> Result<Option<Session>, StoreError>;

    /// Close the session and write one absent record per enrolled student
    /// who never checked in. Returns the absent count.
    fn end_session(&self, session_id: &str) -> Result<usize, StoreError>;

    /// Persist an accepted check-in. Rejects duplicates and closed sessions.
    fn record_check_in(&self, record: &AttendanceRecord) -> Result<(), StoreError>;

    fn records_for_session(&self, session_id: &str) -> Result<Vec<AttendanceRecord>, StoreError>;
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp {s:?}: {e}")))
}

impl AttendanceStore for SqliteStore {
    fn add_student(&self, student_id: &str, email: &str) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO students (student_id, email) VALUES (?1, ?2)
             ON CONFLICT (student_id) DO UPDATE SET email = excluded.email",
            params![student_id, email],
        )?;
        Ok(())
    }

    fn lookup_student(&self, email: &str) -> Result<Option<String>, StoreError> {
        let id = self
            .conn()
            .query_row(
                "SELECT student_id FROM students WHERE email = ?1",
                params![email],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn enroll_in_class(&self, class_id: &str, student_id: &str) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT OR IGNORE INTO class_students (class_id, student_id) VALUES (?1, ?2)",
            params![class_id, student_id],
        )?;
        Ok(())
    }

    fn class_roster(&self, class_id: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT student_id FROM class_students WHERE class_id = ?1 ORDER BY student_id",
        )?;
        let roster = stmt
            .query_map(params![class_id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(roster)
    }

    fn create_session(
        &self,
        class_id: &str,
        teacher_email: &str,
        duration_hours: i64,
        grace_minutes: i64,
    ) -> Result<Session, StoreError> {
        let conn = self.conn();

        let active: Option<String> = conn
            .query_row(
                "SELECT id FROM attendance_sessions WHERE class_id = ?1 AND status = 'active'",
                params![class_id],
                |row| row.get(0),
            )
            .optional()?;
        if active.is_some() {
            return Err(StoreError::ActiveSessionExists { class_id: class_id.to_string() });
        }

        let session = Session {
            id: Uuid::new_v4().to_string(),
            class_id: class_id.to_string(),
            teacher_email: teacher_email.to_string(),
            start_time: Utc::now(),
            end_time: Utc::now() + Duration::hours(duration_hours),
            grace_minutes,
            status: SessionStatus::Active,
        };

        conn.execute(
            "INSERT INTO attendance_sessions
                 (id, class_id, teacher_email, start_time, end_time, grace_minutes, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session.id,
                session.class_id,
                session.teacher_email,
                session.start_time.to_rfc3339(),
                session.end_time.to_rfc3339(),
                session.grace_minutes,
                session.status.as_str(),
            ],
        )?;

        tracing::info!(session_id = %session.id, class_id, grace_minutes, "attendance session created");
        Ok(session)
    }

    fn get_session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        let row = self
            .conn()
            .query_row(
                "SELECT id, class_id, teacher_email, start_time, end_time, grace_minutes, status
                 FROM attendance_sessions WHERE id = ?1",
                params![session_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, class_id, teacher_email, start, end, grace_minutes, status)) = row else {
            return Ok(None);
        };

        Ok(Some(Session {
            id,
            class_id,
            teacher_email,
            start_time: parse_time(&start)?,
            end_time: parse_time(&end)?,
            grace_minutes,
            status: SessionStatus::parse(&status)?,
        }))
    }

    fn end_session(&self, session_id: &str) -> Result<usize, StoreError> {
        let session = self
            .get_session(session_id)?
            .ok_or_else(|| StoreError::SessionNotFound { session_id: session_id.to_string() })?;

        let ended_at = Utc::now();
        self.conn().execute(
            "UPDATE attendance_sessions SET status = 'ended' WHERE id = ?1",
            params![session_id],
        )?;

        let roster = self.class_roster(&session.class_id)?;
        let attended: Vec<String> = {
            let conn = self.conn();
            let mut stmt = conn
                .prepare("SELECT student_id FROM attendance_records WHERE session_id = ?1")?;
            let rows = stmt
                .query_map(params![session_id], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut absent = 0usize;
        for student_id in roster.iter().filter(|s| !attended.contains(s)) {
            self.conn().execute(
                "INSERT OR IGNORE INTO attendance_records
                     (session_id, student_id, check_in_time, status, face_match_score)
                 VALUES (?1, ?2, ?3, 'absent', NULL)",
                params![session_id, student_id, ended_at.to_rfc3339()],
            )?;
            absent += 1;
        }

        tracing::info!(session_id, absent, "attendance session ended");
        Ok(absent)
    }

    fn record_check_in(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        let session = self
            .get_session(&record.session_id)?
            .ok_or_else(|| StoreError::SessionNotFound { session_id: record.session_id.clone() })?;
        if session.status != SessionStatus::Active {
            return Err(StoreError::SessionNotActive { session_id: record.session_id.clone() });
        }

        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO attendance_records
                 (session_id, student_id, check_in_time, status, face_match_score)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.session_id,
                record.student_id,
                record.check_in_time.to_rfc3339(),
                record.status.as_str(),
                record.face_match_score,
            ],
        )?;
        if inserted == 0 {
            return Err(StoreError::DuplicateCheckIn);
        }

        tracing::info!(
            session_id = %record.session_id,
            student_id = %record.student_id,
            status = record.status.as_str(),
            score = ?record.face_match_score,
            "check-in recorded"
        );
        Ok(())
    }

    fn records_for_session(&self, session_id: &str) -> Result<Vec<AttendanceRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT session_id, student_id, check_in_time, status, face_match_score
             FROM attendance_records WHERE session_id = ?1 ORDER BY check_in_time",
        )?;
        let rows = stmt
            .query_map(params![session_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<f32>>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(session_id, student_id, time, status, score)| {
                Ok(AttendanceRecord {
                    session_id,
                    student_id,
                    check_in_time: parse_time(&time)?,
                    status: AttendanceStatus::parse(&status)?,
                    face_match_score: score,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(session_id: &str, student_id: &str, status: AttendanceStatus) -> AttendanceRecord {
        AttendanceRecord {
            session_id: session_id.to_string(),
            student_id: student_id.to_string(),
            check_in_time: Utc::now(),
            status,
            face_match_score: Some(0.91),
        }
    }

    #[test]
    fn test_student_lookup() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_student("s1", "s1@school.example").unwrap();

        assert_eq!(store.lookup_student("s1@school.example").unwrap().as_deref(), Some("s1"));
        assert!(store.lookup_student("nobody@school.example").unwrap().is_none());
    }

    #[test]
    fn test_one_active_session_per_class() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_session("cs101", "t@school.example", 2, 30).unwrap();

        let err = store.create_session("cs101", "t@school.example", 2, 30).unwrap_err();
        assert!(matches!(err, StoreError::ActiveSessionExists { .. }));

        // A different class is unaffected.
        store.create_session("cs102", "t@school.example", 2, 30).unwrap();
    }

    #[test]
    fn test_session_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let created = store.create_session("cs101", "t@school.example", 2, 15).unwrap();

        let fetched = store.get_session(&created.id).unwrap().unwrap();
        assert_eq!(fetched.class_id, "cs101");
        assert_eq!(fetched.grace_minutes, 15);
        assert_eq!(fetched.status, SessionStatus::Active);
        assert_eq!(fetched.start_time.timestamp(), created.start_time.timestamp());
    }

    #[test]
    fn test_duplicate_check_in_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let session = store.create_session("cs101", "t@school.example", 2, 30).unwrap();

        store.record_check_in(&record(&session.id, "s1", AttendanceStatus::Present)).unwrap();
        let err = store
            .record_check_in(&record(&session.id, "s1", AttendanceStatus::Late))
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateCheckIn));
    }

    #[test]
    fn test_check_in_requires_active_session() {
        let store = SqliteStore::open_in_memory().unwrap();
        let session = store.create_session("cs101", "t@school.example", 2, 30).unwrap();
        store.end_session(&session.id).unwrap();

        let err = store
            .record_check_in(&record(&session.id, "s1", AttendanceStatus::Present))
            .unwrap_err();
        assert!(matches!(err, StoreError::SessionNotActive { .. }));
    }

    #[test]
    fn test_end_session_marks_absentees() {
        // 5 enrolled, 3 checked in: exactly 2 absent records, no duplicates.
        let store = SqliteStore::open_in_memory().unwrap();
        let session = store.create_session("cs101", "t@school.example", 2, 30).unwrap();

        for i in 1..=5 {
            let id = format!("s{i}");
            store.add_student(&id, &format!("{id}@school.example")).unwrap();
            store.enroll_in_class("cs101", &id).unwrap();
        }
        store.record_check_in(&record(&session.id, "s1", AttendanceStatus::Present)).unwrap();
        store.record_check_in(&record(&session.id, "s2", AttendanceStatus::Present)).unwrap();
        store.record_check_in(&record(&session.id, "s3", AttendanceStatus::Late)).unwrap();

        let absent = store.end_session(&session.id).unwrap();
        assert_eq!(absent, 2);

        let records = store.records_for_session(&session.id).unwrap();
        assert_eq!(records.len(), 5);

        let absents: Vec<_> = records
            .iter()
            .filter(|r| r.status == AttendanceStatus::Absent)
            .collect();
        assert_eq!(absents.len(), 2);
        let mut absent_ids: Vec<_> = absents.iter().map(|r| r.student_id.as_str()).collect();
        absent_ids.sort();
        assert_eq!(absent_ids, vec!["s4", "s5"]);
        assert!(absents.iter().all(|r| r.face_match_score.is_none()));

        // Present/late rows are untouched.
        assert_eq!(
            records.iter().filter(|r| r.status != AttendanceStatus::Absent).count(),
            3
        );
    }

    #[test]
    fn test_end_unknown_session() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.end_session("nope").unwrap_err();
        assert!(matches!(err, StoreError::SessionNotFound { .. }));
    }

    #[test]
    fn test_records_ordered_by_check_in_time() {
        let store = SqliteStore::open_in_memory().unwrap();
        let session = store.create_session("cs101", "t@school.example", 2, 30).unwrap();

        let early = AttendanceRecord {
            check_in_time: Utc::now() - Duration::minutes(10),
            ..record(&session.id, "s1", AttendanceStatus::Present)
        };
        let late = record(&session.id, "s2", AttendanceStatus::Late);
        store.record_check_in(&late).unwrap();
        store.record_check_in(&early).unwrap();

        let records = store.records_for_session(&session.id).unwrap();
        assert_eq!(records[0].student_id, "s1");
        assert_eq!(records[1].student_id, "s2");
    }
}
