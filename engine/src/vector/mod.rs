//! Vector Store Adapter
//!
//! Pure storage and retrieval of embedded text fragments. Records are
//! append-only: `upsert` of an id that already exists is a no-op, and the only
//! way to remove a record is an explicit `purge`.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::llm::cosine_similarity;

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryVectorStore;
pub use sqlite::SqliteVectorStore;

/// What a record was created from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Brand voice training sample
    VoiceSample,
    /// Output of a research task
    Research,
    /// Any other generated artifact
    Artifact,
}

impl RecordKind {
    pub fn as_str(&self) -> &str {
        match self {
            RecordKind::VoiceSample => "voice_sample",
            RecordKind::Research => "research",
            RecordKind::Artifact => "artifact",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "voice_sample" => Some(RecordKind::VoiceSample),
            "research" => Some(RecordKind::Research),
            "artifact" => Some(RecordKind::Artifact),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub session_id: Option<String>,
    pub artifact_id: Option<String>,
    pub kind: RecordKind,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub source_text: String,
    pub metadata: RecordMetadata,
}

/// Conjunction of optional metadata constraints; the empty filter matches all
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorFilter {
    pub session_id: Option<String>,
    pub artifact_id: Option<String>,
    pub kind: Option<RecordKind>,
}

impl VectorFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }

    pub fn with_kind(mut self, kind: RecordKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn matches(&self, metadata: &RecordMetadata) -> bool {
        self.session_id
            .as_ref()
            .map_or(true, |s| metadata.session_id.as_ref() == Some(s))
            && self
                .artifact_id
                .as_ref()
                .map_or(true, |a| metadata.artifact_id.as_ref() == Some(a))
            && self.kind.map_or(true, |k| metadata.kind == k)
    }
}

/// A query hit
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: VectorRecord,
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert a record; a record with the same id is left untouched
    async fn upsert(&self, record: VectorRecord) -> Result<()>;

    /// Top `k` records matching `filter`, by similarity descending
    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<ScoredRecord>>;

    /// Delete every record matching `filter`; returns how many were removed
    async fn purge(&self, filter: &VectorFilter) -> Result<u64>;

    async fn count(&self, filter: &VectorFilter) -> Result<usize>;

    /// Every record matching `filter`, oldest first
    async fn records(&self, filter: &VectorFilter) -> Result<Vec<VectorRecord>>;
}

/// Score candidates and keep the best `k`.
///
/// Equal scores are ordered by record id so results never depend on storage
/// iteration order.
pub(crate) fn rank(
    embedding: &[f32],
    candidates: impl IntoIterator<Item = VectorRecord>,
    k: usize,
) -> Vec<ScoredRecord> {
    let mut scored: Vec<ScoredRecord> = candidates
        .into_iter()
        .map(|record| ScoredRecord {
            score: cosine_similarity(embedding, &record.embedding),
            record,
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
    scored.truncate(k);
    scored
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn record(id: &str, session: &str, kind: RecordKind, embedding: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            embedding,
            source_text: format!("text of {}", id),
            metadata: RecordMetadata {
                session_id: Some(session.to_string()),
                artifact_id: None,
                kind,
                created_at: 0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::record;
    use super::*;

    #[test]
    fn test_filter_matching() {
        let r = record("a", "s1", RecordKind::Research, vec![1.0]);

        assert!(VectorFilter::all().matches(&r.metadata));
        assert!(VectorFilter::session("s1").matches(&r.metadata));
        assert!(!VectorFilter::session("s2").matches(&r.metadata));
        assert!(VectorFilter::session("s1")
            .with_kind(RecordKind::Research)
            .matches(&r.metadata));
        assert!(!VectorFilter::session("s1")
            .with_kind(RecordKind::VoiceSample)
            .matches(&r.metadata));
    }

    #[test]
    fn test_rank_orders_by_similarity_then_id() {
        let query = vec![1.0, 0.0];
        let ranked = rank(
            &query,
            vec![
                record("c", "s", RecordKind::Artifact, vec![0.0, 1.0]),
                record("b", "s", RecordKind::Artifact, vec![1.0, 0.0]),
                record("a", "s", RecordKind::Artifact, vec![2.0, 0.0]),
                record("d", "s", RecordKind::Artifact, vec![1.0, 1.0]),
            ],
            3,
        );

        let ids: Vec<_> = ranked.iter().map(|r| r.record.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "d"]);
        assert!(ranked[0].score >= ranked[2].score);
    }

    #[test]
    fn test_record_kind_strings() {
        for kind in [RecordKind::VoiceSample, RecordKind::Research, RecordKind::Artifact] {
            assert_eq!(RecordKind::parse(kind.as_str()), Some(kind));
        }
    }
}
