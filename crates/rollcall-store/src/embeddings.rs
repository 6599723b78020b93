//! Active-embedding persistence, one per student identity.

use crate::{SqliteStore, StoreError};
use chrono::Utc;
use rollcall_core::FaceEmbedding;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

/// Summary row for a registered face, for listings and audit.
#[derive(Debug, Clone, Serialize)]
pub struct RegisteredFace {
    pub student_id: String,
    pub quality: f32,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Storage contract for the single active embedding per student.
pub trait EmbeddingStore {
    /// The embedding currently eligible for comparison, if any.
    fn get_active(&self, student_id: &str) -> Result<Option<FaceEmbedding>, StoreError>;

    /// Create or overwrite the student's embedding and mark it active.
    /// The upsert is keyed by identity, so concurrent registrations still
    /// leave exactly one active embedding.
    fn upsert_active(
        &self,
        student_id: &str,
        embedding: &FaceEmbedding,
        quality: f32,
    ) -> Result<(), StoreError>;

    /// Logical deletion: the row is kept for audit but no longer eligible
    /// for comparison.
    fn deactivate(&self, student_id: &str) -> Result<(), StoreError>;

    fn list_registered(&self) -> Result<Vec<RegisteredFace>, StoreError>;
}

impl EmbeddingStore for SqliteStore {
    fn get_active(&self, student_id: &str) -> Result<Option<FaceEmbedding>, StoreError> {
        let conn = self.conn();
        let row: Option<(String, Option<String>)> = conn
            .query_row(
                "SELECT embedding, model_version FROM face_embeddings
                 WHERE student_id = ?1 AND is_active = 1",
                params![student_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((json, model_version)) = row else {
            return Ok(None);
        };

        let values: Vec<f32> = serde_json::from_str(&json)
            .map_err(|e| StoreError::Corrupt(format!("embedding for {student_id}: {e}")))?;
        Ok(Some(FaceEmbedding { values, model_version }))
    }

    fn upsert_active(
        &self,
        student_id: &str,
        embedding: &FaceEmbedding,
        quality: f32,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(&embedding.values)
            .map_err(|e| StoreError::Corrupt(format!("embedding encode: {e}")))?;
        let now = Utc::now().to_rfc3339();

        self.conn().execute(
            "INSERT INTO face_embeddings
                 (student_id, embedding, model_version, quality, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)
             ON CONFLICT (student_id) DO UPDATE SET
                 embedding = excluded.embedding,
                 model_version = excluded.model_version,
                 quality = excluded.quality,
                 is_active = 1,
                 updated_at = excluded.updated_at",
            params![student_id, json, embedding.model_version, quality, now],
        )?;

        tracing::info!(student_id, quality, dim = embedding.dim(), "face embedding stored");
        Ok(())
    }

    fn deactivate(&self, student_id: &str) -> Result<(), StoreError> {
        let changed = self.conn().execute(
            "UPDATE face_embeddings SET is_active = 0, updated_at = ?2 WHERE student_id = ?1",
            params![student_id, Utc::now().to_rfc3339()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound { student_id: student_id.to_string() });
        }
        tracing::info!(student_id, "face embedding deactivated");
        Ok(())
    }

    fn list_registered(&self) -> Result<Vec<RegisteredFace>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT student_id, quality, is_active, created_at, updated_at
             FROM face_embeddings ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(RegisteredFace {
                    student_id: row.get(0)?,
                    quality: row.get(1)?,
                    is_active: row.get::<_, i64>(2)? != 0,
                    created_at: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedding(values: Vec<f32>) -> FaceEmbedding {
        FaceEmbedding { values, model_version: Some("face_resnet_128".into()) }
    }

    #[test]
    fn test_get_active_absent() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.get_active("s1").unwrap().is_none());
    }

    #[test]
    fn test_upsert_then_get_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let e = embedding(vec![0.25, -0.5, 0.75]);
        store.upsert_active("s1", &e, 0.8).unwrap();

        let stored = store.get_active("s1").unwrap().unwrap();
        assert_eq!(stored.values, e.values);
        assert_eq!(stored.model_version.as_deref(), Some("face_resnet_128"));
    }

    #[test]
    fn test_reregistration_overwrites_single_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert_active("s1", &embedding(vec![0.1]), 0.5).unwrap();
        store.upsert_active("s1", &embedding(vec![0.9]), 0.7).unwrap();

        let stored = store.get_active("s1").unwrap().unwrap();
        assert_eq!(stored.values, vec![0.9]);

        // Exactly one row per identity at any time.
        let rows = store.list_registered().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].quality, 0.7);
    }

    #[test]
    fn test_deactivate_hides_embedding_but_keeps_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert_active("s1", &embedding(vec![0.1]), 0.5).unwrap();
        store.deactivate("s1").unwrap();

        assert!(store.get_active("s1").unwrap().is_none());
        let rows = store.list_registered().unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].is_active);
    }

    #[test]
    fn test_reregistration_reactivates() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert_active("s1", &embedding(vec![0.1]), 0.5).unwrap();
        store.deactivate("s1").unwrap();
        store.upsert_active("s1", &embedding(vec![0.2]), 0.6).unwrap();

        assert!(store.get_active("s1").unwrap().is_some());
    }

    #[test]
    fn test_deactivate_unknown_student() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.deactivate("ghost").unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
