//! Router
//!
//! Classifies a request into a [`RoutingDecision`]. Every registered kind is
//! scored from keyword exemplars, optionally boosted by embedding similarity.
//! Kinds close to the top score join the decision as parallel tasks; declared
//! prerequisites become dependency edges. The router only reads the session.

pub mod decision;
pub mod kinds;
pub mod params;

pub use decision::{KindScore, RoutingDecision, TaskSpec};
pub use kinds::{KindSpec, Tokens};

use crate::config::RouterConfig;
use crate::llm::{call_with_retry, cosine_similarity, EmbeddingProvider, LLMError, RetryPolicy};
use crate::memory::ConversationSession;
use sdk::errors::EngineError;
use sdk::types::AgentKind;
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Success rate assumed for a kind that never ran in the session
const NEUTRAL_SUCCESS_RATE: f64 = 0.5;

/// Content types the engine has no agent for
const UNSUPPORTED_TERMS: &[&str] = &[
    "video", "podcast", "audio", "music", "song", "animation", "gif", "voiceover", "tiktok",
    "webinar",
];

#[derive(Debug, Clone)]
struct Candidate {
    index: usize,
    score: f64,
    success_rate: f64,
    named: bool,
}

pub struct Router {
    specs: Vec<KindSpec>,
    config: RouterConfig,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    retry: RetryPolicy,
    /// Filled on the first fully successful embedding pass only
    exemplar_vectors: OnceCell<Vec<Vec<f32>>>,
}

impl Router {
    pub fn new(specs: Vec<KindSpec>, config: RouterConfig) -> Self {
        Self {
            specs,
            config,
            embedder: None,
            retry: RetryPolicy::default(),
            exemplar_vectors: OnceCell::new(),
        }
    }

    /// Blend embedding similarity into keyword scores
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Backoff for embedding calls made while routing
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn specs(&self) -> &[KindSpec] {
        &self.specs
    }

    pub fn spec(&self, kind: &AgentKind) -> Option<&KindSpec> {
        self.specs.iter().find(|s| &s.kind == kind)
    }

    /// Classify `request` in the context of `session`.
    ///
    /// Deterministic: the same request against the same session state yields
    /// the same kinds, parameters and edges.
    pub async fn route(
        &self,
        request: &str,
        session: &ConversationSession,
    ) -> Result<RoutingDecision, EngineError> {
        let tokens = Tokens::new(request);
        let threshold = self.config.min_confidence;

        let mut scores = self.direct_scores(request, &tokens).await;
        let best_direct = scores.iter().cloned().fold(0.0, f64::max);

        let mut from_context = false;
        let mut evidence = vec![tokens.clone()];
        let mut topic_source = request.to_string();
        if best_direct < threshold {
            if let Some(term) = UNSUPPORTED_TERMS.iter().find(|t| tokens.contains(t)) {
                info!(session_id = %session.id, term, "Unsupported content type requested");
                return Err(EngineError::UnsupportedRequest(format!(
                    "no agent produces {term} content"
                )));
            }

            let recent = session.recent_user_messages(self.config.context_messages);
            if !recent.is_empty() {
                let context = Tokens::new(&recent.join(" "));
                for (score, spec) in scores.iter_mut().zip(&self.specs) {
                    let carried = spec.keyword_score(&context) * self.config.context_weight;
                    *score += carried * (1.0 - *score);
                }
                let best = scores.iter().cloned().fold(0.0, f64::max);
                if best >= threshold {
                    from_context = true;
                    evidence.push(context);
                    if params::topic(request) == request.trim().trim_end_matches(['.', '!', '?']) {
                        // Follow-up without its own subject keeps the last one
                        topic_source = recent[0].to_string();
                    }
                    debug!(session_id = %session.id, "Request classified through conversation context");
                }
            }
        }

        let mut ranked: Vec<Candidate> = scores
            .iter()
            .enumerate()
            .map(|(index, &score)| Candidate {
                index,
                score,
                success_rate: session
                    .success_rate(&self.specs[index].kind)
                    .unwrap_or(NEUTRAL_SUCCESS_RATE),
                named: evidence.iter().any(|t| self.specs[index].is_named(t)),
            })
            .collect();
        ranked.sort_by(|a, b| self.compare(a, b));

        let Some(top) = ranked.first().cloned() else {
            return Err(EngineError::Config("no agent kinds registered".to_string()));
        };
        if top.score < threshold {
            info!(
                session_id = %session.id,
                best_score = top.score,
                threshold,
                "Request intent is ambiguous"
            );
            return Err(EngineError::AmbiguousIntent {
                best_score: top.score,
                threshold,
            });
        }

        let mut selected = vec![top.index];
        for candidate in ranked.iter().skip(1) {
            // Parallel kinds must be asked for by name, not implied by shared words
            if !candidate.named
                || candidate.score < threshold
                || top.score - candidate.score > self.config.parallel_margin
            {
                continue;
            }
            let kind = &self.specs[candidate.index].kind;
            let conflicts = selected.iter().any(|&i| {
                self.specs[i].conflicts.contains(kind)
                    || self.specs[candidate.index].conflicts.contains(&self.specs[i].kind)
            });
            if !conflicts {
                selected.push(candidate.index);
            }
        }

        let tasks = self.plan(&selected, request, &topic_source)?;
        let mut decision = RoutingDecision::new(session.id.clone(), request, tasks);
        decision.from_context = from_context;
        decision.scores = ranked
            .iter()
            .map(|c| KindScore {
                kind: self.specs[c.index].kind.clone(),
                score: c.score,
            })
            .collect();

        info!(
            session_id = %session.id,
            decision_id = %decision.id,
            kinds = ?decision.kinds(),
            from_context,
            "Request routed"
        );
        Ok(decision)
    }

    /// Score desc, success rate desc, kind name asc
    fn compare(&self, a: &Candidate, b: &Candidate) -> Ordering {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.success_rate.total_cmp(&a.success_rate))
            .then_with(|| self.specs[a.index].kind.cmp(&self.specs[b.index].kind))
    }

    async fn direct_scores(&self, request: &str, tokens: &Tokens) -> Vec<f64> {
        let mut scores: Vec<f64> = self.specs.iter().map(|s| s.keyword_score(tokens)).collect();

        let Some(embedder) = &self.embedder else {
            return scores;
        };
        if self.config.embedding_weight <= 0.0 {
            return scores;
        }

        let label = embedder.name().to_string();
        let request_vector =
            match call_with_retry(&self.retry, &label, || embedder.embed(request)).await {
                Ok(vector) => vector,
                Err(e) => {
                    warn!("Embedding unavailable, routing on keywords only: {}", e);
                    return scores;
                }
            };
        let exemplars = match self
            .exemplar_vectors
            .get_or_try_init(|| async {
                let mut vectors = Vec::with_capacity(self.specs.len());
                for spec in &self.specs {
                    let text = format!("{} {}", spec.description, spec.strong.join(" "));
                    vectors.push(call_with_retry(&self.retry, &label, || embedder.embed(&text)).await?);
                }
                Ok::<_, LLMError>(vectors)
            })
            .await
        {
            Ok(vectors) => vectors,
            Err(e) => {
                warn!("Exemplar embedding failed, routing on keywords only: {}", e);
                return scores;
            }
        };

        for (score, exemplar) in scores.iter_mut().zip(exemplars) {
            let similarity = cosine_similarity(&request_vector, exemplar).clamp(0.0, 1.0) as f64;
            *score += self.config.embedding_weight * similarity * (1.0 - *score);
        }
        scores
    }

    /// Expand the selected kinds into tasks: prerequisites first, then the
    /// selected kinds in rank order, with edges for prerequisites and for
    /// consumed kinds present in the decision
    fn plan(
        &self,
        selected: &[usize],
        request: &str,
        topic_source: &str,
    ) -> Result<Vec<TaskSpec>, EngineError> {
        let mut order: Vec<usize> = Vec::new();
        for &index in selected {
            self.push_with_prerequisites(index, &mut order, 0)?;
        }

        let topic = params::topic(topic_source);
        let exclude: Vec<String> = self
            .specs
            .iter()
            .flat_map(|s| s.strong.iter().chain(s.weak.iter()).cloned())
            .collect();

        let kinds: Vec<&AgentKind> = order.iter().map(|&i| &self.specs[i].kind).collect();
        let tasks = order
            .iter()
            .map(|&index| {
                let spec = &self.specs[index];
                let mut task = TaskSpec::new(
                    spec.kind.as_str(),
                    spec.kind.clone(),
                    params::extract(request, &topic, spec.content_type, &exclude),
                );
                for upstream in spec.prerequisites.iter().chain(&spec.consumes) {
                    if kinds.contains(&upstream) && !task.depends_on.iter().any(|d| d == upstream.as_str()) {
                        task = task.depends_on(upstream.as_str());
                    }
                }
                task
            })
            .collect();
        Ok(tasks)
    }

    fn push_with_prerequisites(
        &self,
        index: usize,
        order: &mut Vec<usize>,
        depth: usize,
    ) -> Result<(), EngineError> {
        if order.contains(&index) {
            return Ok(());
        }
        if depth > self.specs.len() {
            return Err(EngineError::Config(format!(
                "prerequisite cycle through kind '{}'",
                self.specs[index].kind
            )));
        }
        for prerequisite in &self.specs[index].prerequisites {
            let Some(dep) = self.specs.iter().position(|s| &s.kind == prerequisite) else {
                return Err(EngineError::Config(format!(
                    "kind '{}' requires unregistered kind '{}'",
                    self.specs[index].kind, prerequisite
                )));
            };
            self.push_with_prerequisites(dep, order, depth + 1)?;
        }
        order.push(index);
        Ok(())
    }
}
