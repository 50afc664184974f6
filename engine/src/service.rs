//! Session API
//!
//! [`ContentService`] ties the router, orchestrator and memory together and
//! is the only entry point the CLI uses. A request runs as one turn under the
//! session's turn lock: route, gather context, orchestrate, then record the
//! outcome in memory, the vector store and the decision history.

use crate::agents::{builtin_specs, AgentRegistry};
use crate::config::Config;
use crate::db::{now_secs, Database, DecisionDetail, DecisionRepository, DecisionSummary};
use crate::llm::ollama::OllamaProvider;
use crate::llm::openai::OpenAIProvider;
use crate::llm::{EmbeddingProvider, HashingEmbedder, LLMProvider, RetryPolicy};
use crate::memory::{ConversationSession, MemoryManager, Message, VoiceGuidelines};
use crate::message_bus::MessageBus;
use crate::orchestrator::{AggregatedResponse, DecisionContext, Orchestrator};
use crate::router::{KindSpec, Router};
use crate::secrets::{SecretManager, KEYCHAIN_SERVICE};
use crate::vector::{
    InMemoryVectorStore, RecordKind, RecordMetadata, SqliteVectorStore, VectorRecord, VectorStore,
};
use sdk::errors::EngineError;
use sdk::types::{AgentKind, ContentArtifact, FailureReason, VoiceProfile};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Everything the service is assembled from
pub struct ServiceComponents {
    pub agents: AgentRegistry,
    pub specs: Vec<KindSpec>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub vectors: Arc<dyn VectorStore>,
    pub database: Option<Arc<Database>>,
    pub bus: Arc<MessageBus>,
}

impl ServiceComponents {
    /// In-memory components with the offline embedder; nothing is persisted
    pub fn in_memory(config: &Config, agents: AgentRegistry) -> Self {
        Self {
            agents,
            specs: builtin_specs(),
            embedder: Arc::new(HashingEmbedder::new(config.memory.embedding_dimension)),
            vectors: Arc::new(InMemoryVectorStore::new()),
            database: None,
            bus: Arc::new(MessageBus::new()),
        }
    }
}

pub struct ContentService {
    config: Config,
    memory: Arc<MemoryManager>,
    router: Router,
    orchestrator: Orchestrator,
    decisions: Option<DecisionRepository>,
    database: Option<Arc<Database>>,
    bus: Arc<MessageBus>,
}

fn db_error(err: anyhow::Error) -> EngineError {
    EngineError::Database(format!("{:#}", err))
}

impl ContentService {
    pub fn new(config: Config, components: ServiceComponents) -> Self {
        let ServiceComponents {
            agents,
            specs,
            embedder,
            vectors,
            database,
            bus,
        } = components;

        let mut memory = MemoryManager::new(
            config.memory.clone(),
            vectors,
            Arc::clone(&embedder),
            config.orchestrator.session_max_in_flight,
        )
        .with_bus(Arc::clone(&bus));
        if let Some(db) = &database {
            memory = memory.with_database(db);
        }

        let router = Router::new(specs, config.router.clone())
            .with_embedder(embedder)
            .with_retry_policy(RetryPolicy::from_config(&config.llm));
        let orchestrator =
            Orchestrator::new(Arc::new(agents), &config.orchestrator).with_bus(Arc::clone(&bus));

        Self {
            decisions: database.as_ref().map(|db| db.decisions()),
            database,
            memory: Arc::new(memory),
            router,
            orchestrator,
            bus,
            config,
        }
    }

    /// Production wiring: SQLite persistence, configured providers, restored
    /// sessions
    pub async fn open(config: Config) -> Result<Self, EngineError> {
        let database = Arc::new(
            Database::new(&config.database_path())
                .await
                .map_err(db_error)?,
        );
        let dimension = config.memory.embedding_dimension;
        let secrets = SecretManager::new(KEYCHAIN_SERVICE);

        let generator: Arc<dyn LLMProvider> = match config.llm.default_provider.as_str() {
            "openai" => Arc::new(OpenAIProvider::new(
                config.llm.openai.clone(),
                secrets.clone(),
                dimension,
            )),
            _ => Arc::new(
                OllamaProvider::new(&config.llm.ollama, dimension)
                    .map_err(|e| EngineError::ProviderUnavailable(e.to_string()))?,
            ),
        };

        let embedder: Arc<dyn EmbeddingProvider> = match config.llm.embedding_backend.as_str() {
            "ollama" => Arc::new(
                OllamaProvider::new(&config.llm.ollama, dimension)
                    .map_err(|e| EngineError::ProviderUnavailable(e.to_string()))?,
            ),
            "openai" => Arc::new(OpenAIProvider::new(
                config.llm.openai.clone(),
                secrets,
                dimension,
            )),
            _ => Arc::new(HashingEmbedder::new(dimension)),
        };

        info!(
            provider = generator.name(),
            embedder = embedder.name(),
            "Opening content service"
        );

        let components = ServiceComponents {
            agents: AgentRegistry::builtin(generator, RetryPolicy::from_config(&config.llm)),
            specs: builtin_specs(),
            embedder,
            vectors: Arc::new(SqliteVectorStore::new(database.vectors())),
            database: Some(database),
            bus: Arc::new(MessageBus::new()),
        };

        let service = Self::new(config, components);
        service.memory.restore().await?;
        Ok(service)
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn create_session(&self) -> Result<ConversationSession, EngineError> {
        self.memory.create_session().await
    }

    pub async fn session_view(&self, session_id: &str) -> Result<ConversationSession, EngineError> {
        self.memory.session(session_id).await
    }

    pub async fn sessions(&self) -> Vec<ConversationSession> {
        self.memory.sessions().await
    }

    pub async fn close_session(&self, session_id: &str) -> Result<(), EngineError> {
        self.memory.close_session(session_id).await
    }

    /// Train a new voice version from additional brand samples
    pub async fn submit_voice_sample(
        &self,
        session_id: &str,
        samples: Vec<String>,
        guidelines: Option<VoiceGuidelines>,
    ) -> Result<Arc<VoiceProfile>, EngineError> {
        self.memory.train_voice(session_id, samples, guidelines).await
    }

    pub async fn rollback_voice(
        &self,
        session_id: &str,
        version: u32,
    ) -> Result<Arc<VoiceProfile>, EngineError> {
        self.memory.rollback_voice(session_id, version).await
    }

    /// Submit a request that cannot be cancelled
    pub async fn submit(
        &self,
        session_id: &str,
        request: &str,
    ) -> Result<AggregatedResponse, EngineError> {
        let (_tx, rx) = watch::channel(false);
        self.submit_request(session_id, request, rx).await
    }

    /// Run one turn.
    ///
    /// Router errors and session lifecycle violations are returned as errors.
    /// Everything that goes wrong inside the workflow is reported in the
    /// response.
    pub async fn submit_request(
        &self,
        session_id: &str,
        request: &str,
        cancel: watch::Receiver<bool>,
    ) -> Result<AggregatedResponse, EngineError> {
        let _turn = self.memory.turn_lock(session_id).await?;
        if *cancel.borrow() {
            return Err(EngineError::Cancelled);
        }

        let session = self.memory.session(session_id).await?;
        if !session.is_active() {
            return Err(EngineError::SessionClosed(session_id.to_string()));
        }

        let routed = self.router.route(request, &session).await;
        self.memory
            .append_message(session_id, Message::user(request))
            .await?;
        let decision = match routed {
            Ok(decision) => decision,
            Err(e) => {
                self.memory
                    .append_message(session_id, Message::system(format!("Not routed: {}", e)))
                    .await?;
                return Err(e);
            }
        };

        let window = self
            .memory
            .get_context(session_id, request, self.config.memory.context_max_tokens)
            .await?;
        if let Some(decisions) = &self.decisions {
            decisions.insert_received(&decision).await.map_err(db_error)?;
        }

        let ctx = DecisionContext {
            session_id: session_id.to_string(),
            voice: self.memory.voice_snapshot(session_id).await?,
            history: window.history_lines(),
            grounding: window.grounding,
            session_permits: self.memory.session_permits(session_id).await?,
        };
        let response = self.orchestrator.run(&decision, ctx, cancel).await?;

        self.record_turn(session_id, &response).await?;
        if let Some(decisions) = &self.decisions {
            decisions.complete(&response).await.map_err(db_error)?;
        }

        Ok(response)
    }

    async fn record_turn(
        &self,
        session_id: &str,
        response: &AggregatedResponse,
    ) -> Result<(), EngineError> {
        for artifact in &response.artifacts {
            self.memory
                .append_message(
                    session_id,
                    Message::agent(artifact.payload.clone(), Some(artifact.id.clone())),
                )
                .await?;
        }
        self.memory
            .append_message(session_id, Message::system(response.summary()))
            .await?;

        let outcomes: Vec<(AgentKind, bool)> = response
            .tasks
            .iter()
            .filter(|t| {
                !matches!(
                    t.failure.as_ref().map(|f| f.reason),
                    Some(FailureReason::Cancelled | FailureReason::UpstreamFailure)
                )
            })
            .map(|t| (t.kind.clone(), t.failure.is_none()))
            .collect();
        self.memory.record_outcomes(session_id, &outcomes).await?;

        for artifact in &response.artifacts {
            if let Err(e) = self.index_artifact(session_id, artifact).await {
                warn!(artifact_id = %artifact.id, "Failed to index artifact: {:#}", e);
            }
        }

        debug!(session_id, decision_id = %response.decision_id, "Turn recorded");
        Ok(())
    }

    /// Make an artifact retrievable as grounding for later turns
    async fn index_artifact(&self, session_id: &str, artifact: &ContentArtifact) -> anyhow::Result<()> {
        let embedding = self.memory.embedder().embed(&artifact.payload).await?;
        let kind = if artifact.kind == AgentKind::research() {
            RecordKind::Research
        } else {
            RecordKind::Artifact
        };
        self.memory
            .vectors()
            .upsert(VectorRecord {
                id: artifact.id.clone(),
                embedding,
                source_text: artifact.payload.clone(),
                metadata: RecordMetadata {
                    session_id: Some(session_id.to_string()),
                    artifact_id: Some(artifact.id.clone()),
                    kind,
                    created_at: artifact.created_at,
                },
            })
            .await
    }

    /// Stored decisions, newest first
    pub async fn history(
        &self,
        session_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<DecisionSummary>, EngineError> {
        let decisions = self.require_history()?;
        decisions.history(session_id, limit).await.map_err(db_error)
    }

    pub async fn decision(&self, decision_id: &str) -> Result<DecisionDetail, EngineError> {
        let decisions = self.require_history()?;
        decisions
            .get(decision_id)
            .await
            .map_err(db_error)?
            .ok_or_else(|| EngineError::InvalidDecision(format!("unknown decision {decision_id}")))
    }

    /// Submit a stored decision's request again in its original session
    pub async fn replay_decision(&self, decision_id: &str) -> Result<AggregatedResponse, EngineError> {
        let detail = self.decision(decision_id).await?;
        info!(decision_id, session_id = %detail.summary.session_id, "Replaying decision");
        self.submit(&detail.summary.session_id, &detail.summary.request)
            .await
    }

    fn require_history(&self) -> Result<&DecisionRepository, EngineError> {
        self.decisions.as_ref().ok_or_else(|| {
            EngineError::Config("decision history needs a database".to_string())
        })
    }

    pub async fn purge_expired(&self) -> Result<Vec<String>, EngineError> {
        self.memory.purge_expired(now_secs()).await
    }

    /// Purge expired sessions every `interval` until the service is dropped
    pub fn spawn_session_reaper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let service = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(service) = service.upgrade() else {
                    break;
                };
                match service.purge_expired().await {
                    Ok(expired) if !expired.is_empty() => {
                        info!("Reaped {} expired session(s)", expired.len());
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Session reaper failed: {}", e),
                }
            }
        })
    }

    /// Flush and close the database, if any
    pub async fn shutdown(self) -> Result<(), EngineError> {
        let Self { database, memory, .. } = self;
        drop(memory);
        if let Some(db) = database.and_then(|db| Arc::try_unwrap(db).ok()) {
            db.close().await.map_err(db_error)?;
        }
        Ok(())
    }
}

