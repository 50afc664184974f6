/// Voice profile version persistence
///
/// Every trained version is kept; the active pointer lives on the session row.
/// Each row also stores the explicit guidelines the version was trained with,
/// so later training runs keep honoring them after a restart.
use crate::memory::voice::VoiceGuidelines;
use anyhow::{Context, Result};
use sdk::types::VoiceProfile;
use sqlx::{Row, SqlitePool};

#[derive(Clone)]
pub struct VoiceRepository {
    pool: SqlitePool,
}

impl VoiceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, profile: &VoiceProfile, guidelines: &VoiceGuidelines) -> Result<()> {
        let descriptors = serde_json::to_string(&profile.descriptors)
            .context("Failed to serialize style descriptors")?;
        let guidelines =
            serde_json::to_string(guidelines).context("Failed to serialize voice guidelines")?;

        sqlx::query(
            "INSERT INTO voice_profiles (id, session_id, version, descriptors, guidelines, sample_count, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&profile.id)
        .bind(&profile.session_id)
        .bind(profile.version as i64)
        .bind(descriptors)
        .bind(guidelines)
        .bind(profile.sample_count as i64)
        .bind(profile.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert voice profile")?;

        Ok(())
    }

    /// All versions of a session, oldest first
    pub async fn list(&self, session_id: &str) -> Result<Vec<VoiceProfile>> {
        let rows = sqlx::query(
            "SELECT id, session_id, version, descriptors, sample_count, created_at \
             FROM voice_profiles WHERE session_id = ? ORDER BY version ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch voice profiles")?;

        rows.into_iter()
            .map(|r| {
                let descriptors: String = r.get("descriptors");
                Ok(VoiceProfile {
                    id: r.get("id"),
                    session_id: r.get("session_id"),
                    version: r.get::<i64, _>("version") as u32,
                    descriptors: serde_json::from_str(&descriptors)
                        .context("Corrupt style descriptors")?,
                    sample_count: r.get::<i64, _>("sample_count") as usize,
                    created_at: r.get("created_at"),
                })
            })
            .collect()
    }

    /// Guidelines of the most recently trained version
    pub async fn latest_guidelines(&self, session_id: &str) -> Result<Option<VoiceGuidelines>> {
        let stored: Option<String> = sqlx::query_scalar(
            "SELECT guidelines FROM voice_profiles WHERE session_id = ? \
             ORDER BY version DESC LIMIT 1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch voice guidelines")?;

        stored
            .map(|g| serde_json::from_str(&g).context("Corrupt voice guidelines"))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::memory::voice::derive_descriptors;
    use sdk::types::Formality;
    use tempfile::TempDir;

    fn profile(version: u32) -> VoiceProfile {
        VoiceProfile {
            id: format!("p{}", version),
            session_id: "s1".into(),
            version,
            descriptors: derive_descriptors(
                &["We ship fast and we ship often.".to_string()],
                &VoiceGuidelines::default(),
            ),
            sample_count: 1,
            created_at: version as i64,
        }
    }

    #[tokio::test]
    async fn test_versions_roundtrip_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();
        db.sessions().create("s1", 0).await.unwrap();
        let repo = db.voices();

        repo.insert(&profile(2), &VoiceGuidelines::default()).await.unwrap();
        repo.insert(&profile(1), &VoiceGuidelines::default()).await.unwrap();

        let versions = repo.list("s1").await.unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0], profile(1));
        assert_eq!(versions[1].version, 2);
    }

    #[tokio::test]
    async fn test_duplicate_version_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();
        db.sessions().create("s1", 0).await.unwrap();
        let repo = db.voices();

        repo.insert(&profile(1), &VoiceGuidelines::default()).await.unwrap();
        let mut clash = profile(1);
        clash.id = "other".into();
        assert!(repo.insert(&clash, &VoiceGuidelines::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_latest_guidelines_follow_highest_version() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();
        db.sessions().create("s1", 0).await.unwrap();
        let repo = db.voices();
        assert_eq!(repo.latest_guidelines("s1").await.unwrap(), None);

        let strict = VoiceGuidelines {
            formality: Some(Formality::Formal),
            avoided_terms: vec!["synergy".into()],
            ..Default::default()
        };
        repo.insert(&profile(2), &strict).await.unwrap();
        repo.insert(&profile(1), &VoiceGuidelines::default()).await.unwrap();

        assert_eq!(repo.latest_guidelines("s1").await.unwrap(), Some(strict));
    }
}
