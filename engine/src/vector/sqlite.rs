//! SQLite-backed vector store

use anyhow::Result;
use async_trait::async_trait;

use super::{rank, ScoredRecord, VectorFilter, VectorRecord, VectorStore};
use crate::db::VectorRepository;

/// Durable store: records live in the `vector_records` table and similarity
/// is computed in process over the rows that match the filter.
pub struct SqliteVectorStore {
    repo: VectorRepository,
}

impl SqliteVectorStore {
    pub fn new(repo: VectorRepository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, record: VectorRecord) -> Result<()> {
        self.repo.insert_if_absent(&record).await
    }

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<ScoredRecord>> {
        let candidates = self.repo.load(filter).await?;
        Ok(rank(embedding, candidates, k))
    }

    async fn purge(&self, filter: &VectorFilter) -> Result<u64> {
        self.repo.delete(filter).await
    }

    async fn count(&self, filter: &VectorFilter) -> Result<usize> {
        self.repo.count(filter).await
    }

    async fn records(&self, filter: &VectorFilter) -> Result<Vec<VectorRecord>> {
        let mut records = self.repo.load(filter).await?;
        records.sort_by(|a, b| {
            a.metadata
                .created_at
                .cmp(&b.metadata.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::vector::test_support::record;
    use crate::vector::RecordKind;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("vectors.db");

        {
            let db = Database::new(&db_path).await.unwrap();
            let store = SqliteVectorStore::new(db.vectors());
            store
                .upsert(record("a", "s1", RecordKind::VoiceSample, vec![0.6, 0.8]))
                .await
                .unwrap();
            store
                .upsert(record("a", "s1", RecordKind::VoiceSample, vec![1.0, 0.0]))
                .await
                .unwrap();
            db.close().await.unwrap();
        }

        let db = Database::new(&db_path).await.unwrap();
        let store = SqliteVectorStore::new(db.vectors());
        let hits = store
            .query(&[0.6, 0.8], 5, &VectorFilter::session("s1"))
            .await
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.embedding, vec![0.6, 0.8]);
        assert!((hits[0].score - 1.0).abs() < 1e-5);
        assert_eq!(hits[0].record.metadata.kind, RecordKind::VoiceSample);
    }

    #[tokio::test]
    async fn test_purge_removes_matching_rows() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("vectors.db")).await.unwrap();
        let store = SqliteVectorStore::new(db.vectors());

        store
            .upsert(record("a", "s1", RecordKind::Research, vec![1.0]))
            .await
            .unwrap();
        store
            .upsert(record("b", "s1", RecordKind::VoiceSample, vec![1.0]))
            .await
            .unwrap();

        let removed = store
            .purge(&VectorFilter::session("s1").with_kind(RecordKind::Research))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count(&VectorFilter::all()).await.unwrap(), 1);
    }
}
