//! In-process vector store

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{rank, ScoredRecord, VectorFilter, VectorRecord, VectorStore};

/// Brute-force cosine search over a map. Used when no database is configured
/// and in tests.
#[derive(Default)]
pub struct InMemoryVectorStore {
    records: RwLock<HashMap<String, VectorRecord>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, record: VectorRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.entry(record.id.clone()).or_insert(record);
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<ScoredRecord>> {
        let records = self.records.read().await;
        let candidates = records
            .values()
            .filter(|r| filter.matches(&r.metadata))
            .cloned();
        Ok(rank(embedding, candidates, k))
    }

    async fn purge(&self, filter: &VectorFilter) -> Result<u64> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| !filter.matches(&r.metadata));
        Ok((before - records.len()) as u64)
    }

    async fn count(&self, filter: &VectorFilter) -> Result<usize> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| filter.matches(&r.metadata))
            .count())
    }

    async fn records(&self, filter: &VectorFilter) -> Result<Vec<VectorRecord>> {
        let records = self.records.read().await;
        let mut matching: Vec<VectorRecord> = records
            .values()
            .filter(|r| filter.matches(&r.metadata))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            a.metadata
                .created_at
                .cmp(&b.metadata.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(matching)
    }
}
