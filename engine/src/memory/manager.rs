//! Session store
//!
//! Every session lives in its own slot with independent locks, so sessions
//! never contend with each other:
//!
//! - `state`: messages, status and the active voice pointer. Appends take the
//!   write lock, which makes each append a single-writer critical section.
//! - `training`: serializes voice training and rollback for the session.
//! - `turn`: held by the service for a whole request so turns of one session
//!   complete in submission order.
//! - `permits`: the session's share of in-flight agent tasks.
//!
//! With a database attached, every mutation is written through before it
//! becomes visible in memory.

use crate::config::MemoryConfig;
use crate::db::{now_secs, Database, SessionRepository, VoiceRepository};
use crate::llm::EmbeddingProvider;
use crate::message_bus::{Event, MessageBus};
use crate::vector::{RecordKind, RecordMetadata, VectorFilter, VectorRecord, VectorStore};
use sdk::errors::EngineError;
use sdk::types::{AgentKind, GroundingFragment, VoiceProfile};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, Semaphore};
use tracing::{debug, info, warn};

use super::context::{assemble, ContextWindow};
use super::session::{ConversationSession, KindStats, Message, SessionStatus};
use super::voice::{derive_descriptors, VoiceGuidelines};

#[derive(Debug)]
struct SessionState {
    status: SessionStatus,
    messages: Vec<Message>,
    active_voice: Option<Arc<VoiceProfile>>,
    /// Every trained version, ascending
    versions: Vec<Arc<VoiceProfile>>,
    /// Accumulated training samples
    samples: Vec<String>,
    guidelines: VoiceGuidelines,
    kind_stats: BTreeMap<AgentKind, KindStats>,
    created_at: i64,
    last_active_at: i64,
}

impl SessionState {
    fn new(created_at: i64) -> Self {
        Self {
            status: SessionStatus::Active,
            messages: Vec::new(),
            active_voice: None,
            versions: Vec::new(),
            samples: Vec::new(),
            guidelines: VoiceGuidelines::default(),
            kind_stats: BTreeMap::new(),
            created_at,
            last_active_at: created_at,
        }
    }

    fn snapshot(&self, id: &str) -> ConversationSession {
        ConversationSession {
            id: id.to_string(),
            status: self.status,
            messages: self.messages.clone(),
            active_voice: self.active_voice.clone(),
            voice_versions: self.versions.iter().map(|v| v.version).collect(),
            kind_stats: self.kind_stats.clone(),
            created_at: self.created_at,
            last_active_at: self.last_active_at,
        }
    }
}

struct SessionSlot {
    state: RwLock<SessionState>,
    training: Mutex<()>,
    turn: Arc<Mutex<()>>,
    permits: Arc<Semaphore>,
}

impl SessionSlot {
    fn new(state: SessionState, max_in_flight: usize) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(state),
            training: Mutex::new(()),
            turn: Arc::new(Mutex::new(())),
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
        })
    }
}

#[derive(Clone)]
struct Persistence {
    sessions: SessionRepository,
    voices: VoiceRepository,
}

fn db_error(err: anyhow::Error) -> EngineError {
    EngineError::Database(format!("{:#}", err))
}

pub struct MemoryManager {
    sessions: RwLock<HashMap<String, Arc<SessionSlot>>>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    persistence: Option<Persistence>,
    config: MemoryConfig,
    session_max_in_flight: usize,
    bus: Option<Arc<MessageBus>>,
}

impl MemoryManager {
    pub fn new(
        config: MemoryConfig,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        session_max_in_flight: usize,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            vectors,
            embedder,
            persistence: None,
            config,
            session_max_in_flight,
            bus: None,
        }
    }

    /// Write sessions, messages and voice versions through to `db`
    pub fn with_database(mut self, db: &Database) -> Self {
        self.persistence = Some(Persistence {
            sessions: db.sessions(),
            voices: db.voices(),
        });
        self
    }

    pub fn with_bus(mut self, bus: Arc<MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn vectors(&self) -> &Arc<dyn VectorStore> {
        &self.vectors
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    async fn publish(&self, event: Event) {
        if let Some(bus) = &self.bus {
            bus.publish(event).await;
        }
    }

    async fn slot(&self, session_id: &str) -> Result<Arc<SessionSlot>, EngineError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))
    }

    /// Load every persisted session. Returns how many were restored.
    pub async fn restore(&self) -> Result<usize, EngineError> {
        let Some(persistence) = &self.persistence else {
            return Ok(0);
        };

        let stored = persistence.sessions.load_all().await.map_err(db_error)?;
        let mut restored = HashMap::with_capacity(stored.len());
        for session in stored {
            let mut state = SessionState::new(session.created_at);
            state.status = session.status;
            state.last_active_at = session.last_active_at;
            state.messages = persistence
                .sessions
                .messages(&session.id)
                .await
                .map_err(db_error)?;
            state.versions = persistence
                .voices
                .list(&session.id)
                .await
                .map_err(db_error)?
                .into_iter()
                .map(Arc::new)
                .collect();
            state.guidelines = persistence
                .voices
                .latest_guidelines(&session.id)
                .await
                .map_err(db_error)?
                .unwrap_or_default();
            state.active_voice = session.active_voice_version.and_then(|version| {
                state
                    .versions
                    .iter()
                    .find(|v| v.version == version)
                    .cloned()
            });
            for (kind, succeeded, failed) in persistence
                .sessions
                .kind_outcomes(&session.id)
                .await
                .map_err(db_error)?
            {
                state
                    .kind_stats
                    .insert(AgentKind::new(kind), KindStats { succeeded, failed });
            }
            state.samples = self
                .vectors
                .records(&VectorFilter::session(&session.id).with_kind(RecordKind::VoiceSample))
                .await
                .map_err(db_error)?
                .into_iter()
                .map(|r| r.source_text)
                .collect();

            restored.insert(
                session.id,
                SessionSlot::new(state, self.session_max_in_flight),
            );
        }

        let count = restored.len();
        self.sessions.write().await.extend(restored);
        info!("Restored {} session(s)", count);
        Ok(count)
    }

    pub async fn create_session(&self) -> Result<ConversationSession, EngineError> {
        let id = uuid::Uuid::now_v7().to_string();
        let state = SessionState::new(now_secs());

        if let Some(persistence) = &self.persistence {
            persistence
                .sessions
                .create(&id, state.created_at)
                .await
                .map_err(db_error)?;
        }

        let snapshot = state.snapshot(&id);
        self.sessions
            .write()
            .await
            .insert(id.clone(), SessionSlot::new(state, self.session_max_in_flight));
        info!(session_id = %id, "Session created");
        Ok(snapshot)
    }

    /// Point-in-time copy of a session; closed sessions stay readable
    pub async fn session(&self, session_id: &str) -> Result<ConversationSession, EngineError> {
        let slot = self.slot(session_id).await?;
        let state = slot.state.read().await;
        Ok(state.snapshot(session_id))
    }

    /// Snapshots of every session, oldest first
    pub async fn sessions(&self) -> Vec<ConversationSession> {
        let slots: Vec<(String, Arc<SessionSlot>)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, slot)| (id.clone(), Arc::clone(slot)))
            .collect();

        let mut snapshots = Vec::with_capacity(slots.len());
        for (id, slot) in slots {
            snapshots.push(slot.state.read().await.snapshot(&id));
        }
        snapshots.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        snapshots
    }

    pub async fn append_message(&self, session_id: &str, message: Message) -> Result<(), EngineError> {
        let slot = self.slot(session_id).await?;
        let mut state = slot.state.write().await;
        if state.status == SessionStatus::Closed {
            return Err(EngineError::SessionClosed(session_id.to_string()));
        }

        if let Some(persistence) = &self.persistence {
            persistence
                .sessions
                .append_message(session_id, state.messages.len() as i64, &message)
                .await
                .map_err(db_error)?;
        }

        state.last_active_at = state.last_active_at.max(message.timestamp);
        state.messages.push(message);
        Ok(())
    }

    /// History plus grounding for `query`, packed into `max_tokens`.
    ///
    /// Grounding is best effort: an embedding or vector-store failure, or a
    /// lookup slower than the grounding timeout, yields a history-only window.
    pub async fn get_context(
        &self,
        session_id: &str,
        query: &str,
        max_tokens: usize,
    ) -> Result<ContextWindow, EngineError> {
        let messages = {
            let slot = self.slot(session_id).await?;
            let state = slot.state.read().await;
            state.messages.clone()
        };

        let lookup = async {
            let embedding = self.embedder.embed(query).await?;
            let hits = self
                .vectors
                .query(&embedding, self.config.grounding_k, &VectorFilter::session(session_id))
                .await?;
            anyhow::Ok(hits)
        };

        let (fragments, degraded) =
            match tokio::time::timeout(self.config.grounding_timeout(), lookup).await {
                Ok(Ok(hits)) => (
                    hits.into_iter()
                        .map(|hit| GroundingFragment {
                            record_id: hit.record.id,
                            source_text: hit.record.source_text,
                            score: hit.score,
                            artifact_id: hit.record.metadata.artifact_id,
                        })
                        .collect(),
                    false,
                ),
                Ok(Err(e)) => {
                    warn!(session_id, "Grounding unavailable, using history only: {:#}", e);
                    (Vec::new(), true)
                }
                Err(_) => {
                    warn!(
                        session_id,
                        timeout_ms = self.config.grounding_timeout_ms,
                        "Grounding lookup timed out, using history only"
                    );
                    (Vec::new(), true)
                }
            };

        Ok(assemble(
            &messages,
            fragments,
            max_tokens,
            self.config.grounding_share,
            degraded,
        ))
    }

    /// Train a new voice version from the session's accumulated samples plus
    /// `samples`, and make it active.
    ///
    /// Runs under the session's training lock. Decisions already running keep
    /// the profile they captured at start.
    pub async fn train_voice(
        &self,
        session_id: &str,
        samples: Vec<String>,
        guidelines: Option<VoiceGuidelines>,
    ) -> Result<Arc<VoiceProfile>, EngineError> {
        let samples: Vec<String> = samples
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if samples.is_empty() {
            return Err(EngineError::EmptyVoiceSamples);
        }

        let slot = self.slot(session_id).await?;
        let _training = slot.training.lock().await;

        let (version, mut corpus, guidelines) = {
            let state = slot.state.read().await;
            if state.status == SessionStatus::Closed {
                return Err(EngineError::SessionClosed(session_id.to_string()));
            }
            let version = state.versions.last().map_or(1, |v| v.version + 1);
            (
                version,
                state.samples.clone(),
                guidelines.unwrap_or_else(|| state.guidelines.clone()),
            )
        };
        corpus.extend(samples.iter().cloned());

        let profile = Arc::new(VoiceProfile {
            id: uuid::Uuid::now_v7().to_string(),
            session_id: session_id.to_string(),
            version,
            descriptors: derive_descriptors(&corpus, &guidelines),
            sample_count: corpus.len(),
            created_at: now_secs(),
        });

        if let Some(persistence) = &self.persistence {
            persistence
                .voices
                .insert(&profile, &guidelines)
                .await
                .map_err(db_error)?;
            persistence
                .sessions
                .set_active_voice(session_id, version)
                .await
                .map_err(db_error)?;
        }

        for (i, sample) in samples.iter().enumerate() {
            if let Err(e) = self.store_sample(session_id, &profile.id, i, sample).await {
                warn!(session_id, "Failed to index voice sample: {:#}", e);
            }
        }

        {
            let mut state = slot.state.write().await;
            state.samples = corpus;
            state.guidelines = guidelines;
            state.versions.push(Arc::clone(&profile));
            state.active_voice = Some(Arc::clone(&profile));
        }

        info!(session_id, version, samples = profile.sample_count, "Voice profile trained");
        self.publish(Event::VoiceTrained {
            session_id: session_id.to_string(),
            version,
        })
        .await;
        Ok(profile)
    }

    async fn store_sample(
        &self,
        session_id: &str,
        profile_id: &str,
        index: usize,
        sample: &str,
    ) -> anyhow::Result<()> {
        let embedding = self.embedder.embed(sample).await?;
        self.vectors
            .upsert(VectorRecord {
                id: format!("{profile_id}-{index:04}"),
                embedding,
                source_text: sample.to_string(),
                metadata: RecordMetadata {
                    session_id: Some(session_id.to_string()),
                    artifact_id: None,
                    kind: RecordKind::VoiceSample,
                    created_at: now_secs(),
                },
            })
            .await
    }

    /// Re-point the active voice to an earlier version
    pub async fn rollback_voice(
        &self,
        session_id: &str,
        version: u32,
    ) -> Result<Arc<VoiceProfile>, EngineError> {
        let slot = self.slot(session_id).await?;
        let _training = slot.training.lock().await;

        let profile = {
            let state = slot.state.read().await;
            if state.status == SessionStatus::Closed {
                return Err(EngineError::SessionClosed(session_id.to_string()));
            }
            state
                .versions
                .iter()
                .find(|v| v.version == version)
                .cloned()
                .ok_or_else(|| EngineError::VoiceVersionNotFound {
                    session_id: session_id.to_string(),
                    version,
                })?
        };

        if let Some(persistence) = &self.persistence {
            persistence
                .sessions
                .set_active_voice(session_id, version)
                .await
                .map_err(db_error)?;
        }

        slot.state.write().await.active_voice = Some(Arc::clone(&profile));
        info!(session_id, version, "Voice profile rolled back");
        Ok(profile)
    }

    /// The active voice profile; callers keep the `Arc` for as long as they
    /// need a stable view
    pub async fn voice_snapshot(
        &self,
        session_id: &str,
    ) -> Result<Option<Arc<VoiceProfile>>, EngineError> {
        let slot = self.slot(session_id).await?;
        let state = slot.state.read().await;
        Ok(state.active_voice.clone())
    }

    pub async fn voice_versions(&self, session_id: &str) -> Result<Vec<Arc<VoiceProfile>>, EngineError> {
        let slot = self.slot(session_id).await?;
        let state = slot.state.read().await;
        Ok(state.versions.clone())
    }

    /// Mark a session closed. It stays readable until its TTL expires.
    pub async fn close_session(&self, session_id: &str) -> Result<(), EngineError> {
        let slot = self.slot(session_id).await?;
        {
            let mut state = slot.state.write().await;
            if state.status == SessionStatus::Closed {
                return Ok(());
            }
            if let Some(persistence) = &self.persistence {
                persistence
                    .sessions
                    .close(session_id, now_secs())
                    .await
                    .map_err(db_error)?;
            }
            state.status = SessionStatus::Closed;
        }

        info!(session_id, "Session closed");
        self.publish(Event::SessionClosed {
            session_id: session_id.to_string(),
        })
        .await;
        Ok(())
    }

    /// Count terminal task outcomes for the router's tie-break
    pub async fn record_outcomes(
        &self,
        session_id: &str,
        outcomes: &[(AgentKind, bool)],
    ) -> Result<(), EngineError> {
        let slot = self.slot(session_id).await?;
        let mut state = slot.state.write().await;
        for (kind, succeeded) in outcomes {
            state.kind_stats.entry(kind.clone()).or_default().record(*succeeded);
        }
        Ok(())
    }

    /// Wait for the session's turn. Hold the guard until the turn is recorded.
    pub async fn turn_lock(&self, session_id: &str) -> Result<OwnedMutexGuard<()>, EngineError> {
        let slot = self.slot(session_id).await?;
        Ok(Arc::clone(&slot.turn).lock_owned().await)
    }

    pub async fn session_permits(&self, session_id: &str) -> Result<Arc<Semaphore>, EngineError> {
        let slot = self.slot(session_id).await?;
        Ok(Arc::clone(&slot.permits))
    }

    /// Destroy sessions idle for longer than the TTL, together with their
    /// vector records. Sessions with a turn in progress are skipped.
    pub async fn purge_expired(&self, now: i64) -> Result<Vec<String>, EngineError> {
        let ttl = self.config.session_ttl_secs as i64;
        if ttl == 0 {
            return Ok(Vec::new());
        }
        let candidates: Vec<(String, Arc<SessionSlot>)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, slot)| (id.clone(), Arc::clone(slot)))
            .collect();

        let mut expired = Vec::new();
        for (id, slot) in candidates {
            let Ok(_turn) = Arc::clone(&slot.turn).try_lock_owned() else {
                continue;
            };
            if slot.state.read().await.last_active_at + ttl > now {
                continue;
            }

            self.sessions.write().await.remove(&id);
            if let Some(persistence) = &self.persistence {
                persistence.sessions.delete(&id).await.map_err(db_error)?;
            }
            let removed = self
                .vectors
                .purge(&VectorFilter::session(&id))
                .await
                .map_err(db_error)?;
            debug!(session_id = %id, removed, "Purged session vector records");
            info!(session_id = %id, "Session expired");
            self.publish(Event::SessionExpired {
                session_id: id.clone(),
            })
            .await;
            expired.push(id);
        }
        Ok(expired)
    }
}
