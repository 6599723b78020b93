//! Registration, verification and the check-in decision policy.

use crate::config::Config;
use crate::engine::{EngineError, EngineHandle};
use chrono::{DateTime, Duration, Utc};
use rollcall_capture::{CaptureError, ImageSource};
use rollcall_core::types::FaceRegion;
use rollcall_core::Matcher;
use rollcall_store::{
    AttendanceRecord, AttendanceStatus, AttendanceStore, EmbeddingStore, Session, StoreError,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// Encode rejections (no face, multiple faces, bad bytes) surface
    /// verbatim so the caller can correct framing.
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("image capture failed: {0}")]
    Capture(#[from] CaptureError),
    #[error("no face data found for student {student_id}")]
    NotEnrolled { student_id: String },
    #[error("face verification failed (similarity {similarity:.3})")]
    FaceMismatch { similarity: f32 },
}

#[derive(Debug, Serialize)]
pub struct RegistrationOutcome {
    pub student_id: String,
    pub quality_score: f32,
    pub face_region: FaceRegion,
}

#[derive(Debug, Serialize)]
pub struct VerificationOutcome {
    pub student_id: String,
    /// A failed match is an outcome, not an error — "verification says no"
    /// must stay distinguishable from "verification is broken".
    pub verified: bool,
    pub similarity: f32,
    pub quality_score: f32,
}

#[derive(Debug, Serialize)]
pub struct CheckInOutcome {
    pub session_id: String,
    pub student_id: String,
    pub status: AttendanceStatus,
    pub check_in_time: DateTime<Utc>,
    /// `None` when the check-in was accepted without enrollment.
    pub face_match_score: Option<f32>,
}

/// Classify a check-in against the session deadline. The deadline itself
/// (session start plus the grace period) still counts as present.
pub fn classify_timeliness(
    check_in_time: DateTime<Utc>,
    session_start: DateTime<Utc>,
    grace_minutes: i64,
) -> AttendanceStatus {
    let deadline = session_start + Duration::minutes(grace_minutes);
    if check_in_time <= deadline {
        AttendanceStatus::Present
    } else {
        AttendanceStatus::Late
    }
}

/// Attendance service over an engine handle and a record store.
///
/// Generic over the store traits; production wires in the SQLite store.
pub struct Service<S> {
    store: S,
    engine: EngineHandle,
    matcher: Matcher,
    allow_unenrolled_checkin: bool,
}

impl<S: EmbeddingStore + AttendanceStore> Service<S> {
    pub fn new(store: S, engine: EngineHandle, config: &Config) -> Self {
        Self {
            store,
            engine,
            matcher: Matcher::new(config.match_threshold),
            allow_unenrolled_checkin: config.allow_unenrolled_checkin,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Register (or re-register) a student's face from uploaded bytes.
    pub async fn register_face(
        &self,
        student_id: &str,
        image_bytes: Vec<u8>,
    ) -> Result<RegistrationOutcome, ServiceError> {
        let encoded = self.engine.encode(image_bytes).await?;
        self.store
            .upsert_active(student_id, &encoded.embedding, encoded.quality)?;

        tracing::info!(student_id, quality = encoded.quality, "face registered");
        Ok(RegistrationOutcome {
            student_id: student_id.to_string(),
            quality_score: encoded.quality,
            face_region: encoded.region,
        })
    }

    /// Verify uploaded bytes against the student's active embedding.
    pub async fn verify_face(
        &self,
        student_id: &str,
        image_bytes: Vec<u8>,
    ) -> Result<VerificationOutcome, ServiceError> {
        let reference = self
            .store
            .get_active(student_id)?
            .ok_or_else(|| ServiceError::NotEnrolled { student_id: student_id.to_string() })?;

        let encoded = self.engine.encode(image_bytes).await?;
        let result = self.matcher.compare(&reference, &encoded.embedding);

        tracing::info!(
            student_id,
            similarity = result.similarity,
            verified = result.is_match,
            "face verification"
        );

        Ok(VerificationOutcome {
            student_id: student_id.to_string(),
            verified: result.is_match,
            similarity: result.similarity,
            quality_score: encoded.quality,
        })
    }

    /// Remove the student's face from comparison without deleting the row.
    pub fn deactivate(&self, student_id: &str) -> Result<(), ServiceError> {
        self.store.deactivate(student_id)?;
        Ok(())
    }

    /// Record a face-verified attendance check-in.
    pub async fn check_in(
        &self,
        session_id: &str,
        student_email: &str,
        source: &ImageSource,
    ) -> Result<CheckInOutcome, ServiceError> {
        self.check_in_at(session_id, student_email, source, Utc::now()).await
    }

    /// Check-in with an explicit timestamp (the deadline comparison is a
    /// pure function of this value).
    pub async fn check_in_at(
        &self,
        session_id: &str,
        student_email: &str,
        source: &ImageSource,
        check_in_time: DateTime<Utc>,
    ) -> Result<CheckInOutcome, ServiceError> {
        let session = self
            .store
            .get_session(session_id)?
            .ok_or_else(|| StoreError::SessionNotFound { session_id: session_id.to_string() })?;

        // Identity comes from the stored mapping, never from the email text.
        let student_id = self
            .store
            .lookup_student(student_email)?
            .ok_or_else(|| StoreError::UnknownEmail { email: student_email.to_string() })?;

        let image_bytes = source.fetch().await?;
        let encoded = self.engine.encode(image_bytes).await?;

        let face_match_score = match self.store.get_active(&student_id)? {
            Some(reference) => {
                let result = self.matcher.compare(&reference, &encoded.embedding);
                if !result.is_match {
                    tracing::warn!(
                        student_id,
                        similarity = result.similarity,
                        threshold = result.threshold,
                        "check-in rejected: face mismatch"
                    );
                    return Err(ServiceError::FaceMismatch { similarity: result.similarity });
                }
                Some(result.similarity)
            }
            None if self.allow_unenrolled_checkin => {
                // Never-enrolled student accepted unverified; the missing
                // score keeps this distinguishable from a passed match.
                tracing::warn!(student_id, "check-in accepted without enrollment");
                None
            }
            None => {
                return Err(ServiceError::NotEnrolled { student_id });
            }
        };

        let status = classify_timeliness(check_in_time, session.start_time, session.grace_minutes);

        let record = AttendanceRecord {
            session_id: session_id.to_string(),
            student_id: student_id.clone(),
            check_in_time,
            status,
            face_match_score,
        };
        self.store.record_check_in(&record)?;

        tracing::info!(
            session_id,
            student_id,
            status = status.as_str(),
            score = ?face_match_score,
            "check-in accepted"
        );

        Ok(CheckInOutcome {
            session_id: session_id.to_string(),
            student_id,
            status,
            check_in_time,
            face_match_score,
        })
    }

    pub fn create_session(
        &self,
        class_id: &str,
        teacher_email: &str,
        duration_hours: i64,
        grace_minutes: i64,
    ) -> Result<Session, ServiceError> {
        Ok(self
            .store
            .create_session(class_id, teacher_email, duration_hours, grace_minutes)?)
    }

    /// End a session; returns the number of absent records written.
    pub fn end_session(&self, session_id: &str) -> Result<usize, ServiceError> {
        Ok(self.store.end_session(session_id)?)
    }

    pub fn session_records(&self, session_id: &str) -> Result<Vec<AttendanceRecord>, ServiceError> {
        Ok(self.store.records_for_session(session_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timeliness_at_deadline_is_present() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let at_deadline = start + Duration::minutes(30);
        assert_eq!(classify_timeliness(at_deadline, start, 30), AttendanceStatus::Present);
    }

    #[test]
    fn test_timeliness_one_second_late() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let one_late = start + Duration::minutes(30) + Duration::seconds(1);
        assert_eq!(classify_timeliness(one_late, start, 30), AttendanceStatus::Late);
    }

    #[test]
    fn test_timeliness_before_start() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let early = start - Duration::minutes(5);
        assert_eq!(classify_timeliness(early, start, 30), AttendanceStatus::Present);
    }

    #[test]
    fn test_timeliness_zero_grace() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        assert_eq!(classify_timeliness(start, start, 0), AttendanceStatus::Present);
        assert_eq!(
            classify_timeliness(start + Duration::seconds(1), start, 0),
            AttendanceStatus::Late
        );
    }
}
