//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use blitz_engine::agents::AgentRegistry;
use blitz_engine::config::Config;
use blitz_engine::service::{ContentService, ServiceComponents};
use sdk::errors::AgentError;
use sdk::types::{AgentKind, AgentTask, ContentArtifact, ContentType};
use sdk::{Agent, TaskContext};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a scripted agent does on each attempt
#[derive(Debug, Clone)]
pub enum Script {
    Succeed,
    /// Fail every attempt with this error
    Fail(AgentError),
    /// Fail the first `n` attempts, then succeed
    FailTimes(u32, AgentError),
    /// Sleep before succeeding
    Sleep(Duration),
}

/// Invocation log shared by every agent of a test
#[derive(Debug, Default, Clone)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
    voices: Arc<Mutex<Vec<(String, Option<u32>)>>>,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Journal {
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    /// Voice version each invocation saw, by task id
    pub fn voices(&self) -> Vec<(String, Option<u32>)> {
        self.voices.lock().unwrap().clone()
    }

    /// Highest number of agents observed running at once
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub struct ScriptedAgent {
    kind: AgentKind,
    script: Script,
    calls: AtomicU32,
    journal: Journal,
}

impl ScriptedAgent {
    pub fn new(kind: AgentKind, script: Script, journal: Journal) -> Self {
        Self {
            kind,
            script,
            calls: AtomicU32::new(0),
            journal,
        }
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn kind(&self) -> &AgentKind {
        &self.kind
    }

    async fn invoke(
        &self,
        task: &AgentTask,
        ctx: &TaskContext,
    ) -> Result<ContentArtifact, AgentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.journal
            .entries
            .lock()
            .unwrap()
            .push(format!("{}#{}", task.id, call));
        self.journal
            .voices
            .lock()
            .unwrap()
            .push((task.id.clone(), ctx.voice.as_ref().map(|v| v.version)));
        let running = self.journal.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.journal.peak.fetch_max(running, Ordering::SeqCst);

        let outcome = match &self.script {
            Script::Succeed => Ok(()),
            Script::Fail(err) => Err(err.clone()),
            Script::FailTimes(n, err) if call <= *n => Err(err.clone()),
            Script::FailTimes(..) => Ok(()),
            Script::Sleep(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(())
            }
        };
        self.journal.running.fetch_sub(1, Ordering::SeqCst);
        outcome?;

        let upstream: Vec<&str> = ctx.upstream.iter().map(|a| a.kind.as_str()).collect();
        Ok(ContentArtifact {
            id: format!("{}-{}-{}", task.decision_id, task.id, call),
            task_id: task.id.clone(),
            kind: self.kind.clone(),
            content_type: ContentType::Text,
            payload: format!("{} about {} using [{}]", task.id, task.topic(), upstream.join(",")),
            quality: 1.0,
            voice_conformance: None,
            created_at: 0,
        })
    }
}

/// Registry holding a scripted agent for every built-in kind.
/// Kinds missing from `overrides` succeed immediately.
pub fn registry(overrides: &[(&str, Script)], journal: &Journal) -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    for kind in [
        AgentKind::RESEARCH,
        AgentKind::BLOG,
        AgentKind::LINKEDIN,
        AgentKind::IMAGE,
    ] {
        let script = overrides
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, s)| s.clone())
            .unwrap_or(Script::Succeed);
        registry.register(Arc::new(ScriptedAgent::new(
            AgentKind::new(kind),
            script,
            journal.clone(),
        )));
    }
    registry
}

/// Config with a short task deadline and no backoff delay worth waiting for
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.orchestrator.task_timeout_secs = 1;
    config.orchestrator.max_attempts = 2;
    config.orchestrator.backoff_base_ms = 10;
    config.orchestrator.backoff_max_ms = 50;
    config.memory.grounding_timeout_ms = 200;
    config
}

/// In-memory service wired with scripted agents
pub fn service(config: Config, overrides: &[(&str, Script)], journal: &Journal) -> ContentService {
    let components = ServiceComponents::in_memory(&config, registry(overrides, journal));
    ContentService::new(config, components)
}
