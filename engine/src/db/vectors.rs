/// Vector record persistence
///
/// Embeddings are stored as little-endian f32 blobs.
use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::vector::{RecordKind, RecordMetadata, VectorFilter, VectorRecord};

#[derive(Clone)]
pub struct VectorRepository {
    pool: SqlitePool,
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// `WHERE` clause and its bind values for a filter
fn where_clause(filter: &VectorFilter) -> (String, Vec<String>) {
    let mut conditions = Vec::new();
    let mut binds = Vec::new();

    if let Some(session_id) = &filter.session_id {
        conditions.push("session_id = ?");
        binds.push(session_id.clone());
    }
    if let Some(artifact_id) = &filter.artifact_id {
        conditions.push("artifact_id = ?");
        binds.push(artifact_id.clone());
    }
    if let Some(kind) = filter.kind {
        conditions.push("record_kind = ?");
        binds.push(kind.as_str().to_string());
    }

    if conditions.is_empty() {
        (String::new(), binds)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), binds)
    }
}

fn row_to_record(r: &SqliteRow) -> VectorRecord {
    let blob: Vec<u8> = r.get("embedding");
    VectorRecord {
        id: r.get("id"),
        embedding: decode_embedding(&blob),
        source_text: r.get("source_text"),
        metadata: RecordMetadata {
            session_id: r.get("session_id"),
            artifact_id: r.get("artifact_id"),
            kind: RecordKind::parse(&r.get::<String, _>("record_kind"))
                .unwrap_or(RecordKind::Artifact),
            created_at: r.get("created_at"),
        },
    }
}

impl VectorRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a record unless its id already exists
    pub async fn insert_if_absent(&self, record: &VectorRecord) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO vector_records \
             (id, session_id, artifact_id, record_kind, source_text, embedding, dimension, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.metadata.session_id)
        .bind(&record.metadata.artifact_id)
        .bind(record.metadata.kind.as_str())
        .bind(&record.source_text)
        .bind(encode_embedding(&record.embedding))
        .bind(record.embedding.len() as i64)
        .bind(record.metadata.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert vector record")?;

        Ok(())
    }

    pub async fn load(&self, filter: &VectorFilter) -> Result<Vec<VectorRecord>> {
        let (clause, binds) = where_clause(filter);
        let sql = format!(
            "SELECT id, session_id, artifact_id, record_kind, source_text, embedding, created_at \
             FROM vector_records{}",
            clause
        );

        let mut query = sqlx::query(&sql);
        for value in &binds {
            query = query.bind(value);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .context("Failed to load vector records")?;

        Ok(rows.iter().map(row_to_record).collect())
    }

    pub async fn delete(&self, filter: &VectorFilter) -> Result<u64> {
        let (clause, binds) = where_clause(filter);
        let sql = format!("DELETE FROM vector_records{}", clause);

        let mut query = sqlx::query(&sql);
        for value in &binds {
            query = query.bind(value);
        }

        let result = query
            .execute(&self.pool)
            .await
            .context("Failed to purge vector records")?;

        Ok(result.rows_affected())
    }

    pub async fn count(&self, filter: &VectorFilter) -> Result<usize> {
        let (clause, binds) = where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM vector_records{}", clause);

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for value in &binds {
            query = query.bind(value);
        }

        let count = query
            .fetch_one(&self.pool)
            .await
            .context("Failed to count vector records")?;

        Ok(count as usize)
    }
}
