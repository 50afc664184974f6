//! Content agents
//!
//! The registry maps each kind to the [`Agent`] that serves it. The built-in
//! kinds (research, blog, LinkedIn, image) are all served by [`LlmAgent`]
//! with different instructions; a new content type is added by registering
//! another agent and a matching [`KindSpec`].

pub mod llm_agent;
pub mod prompt;

pub use llm_agent::LlmAgent;

use crate::llm::{LLMProvider, RetryPolicy};
use crate::router::KindSpec;
use sdk::agent::Agent;
use sdk::types::{AgentKind, ContentType};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Registered agents by kind
#[derive(Default)]
pub struct AgentRegistry {
    agents: BTreeMap<AgentKind, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent under its own kind, replacing any previous one
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        self.agents.insert(agent.kind().clone(), agent);
    }

    pub fn get(&self, kind: &AgentKind) -> Option<Arc<dyn Agent>> {
        self.agents.get(kind).cloned()
    }

    pub fn kinds(&self) -> Vec<&AgentKind> {
        self.agents.keys().collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Registry with an [`LlmAgent`] for every built-in kind
    pub fn builtin(provider: Arc<dyn LLMProvider>, retry: RetryPolicy) -> Self {
        let mut registry = Self::new();
        for spec in builtin_specs() {
            registry.register(Arc::new(LlmAgent::new(
                spec.kind.clone(),
                spec.content_type,
                instructions(&spec.kind),
                Arc::clone(&provider),
                retry,
            )));
        }
        registry
    }
}

/// Routing metadata for the built-in kinds, in registration order
pub fn builtin_specs() -> Vec<KindSpec> {
    vec![
        KindSpec::new(AgentKind::research(), ContentType::Research)
            .strong([
                "research",
                "investigate",
                "fact-check",
                "trends",
                "statistics",
                "analysis",
                "analyze",
            ])
            .weak(["find", "search", "data", "sources", "latest", "study"])
            .describe("web research, data gathering, fact checking and trend analysis"),
        KindSpec::new(AgentKind::blog(), ContentType::BlogPost)
            .strong(["blog", "article", "long-form", "seo"])
            .weak(["write", "post", "guide", "essay", "tutorial"])
            .requires(AgentKind::research())
            .describe("blog posts, articles and long-form SEO content"),
        KindSpec::new(AgentKind::linkedin(), ContentType::LinkedInPost)
            .strong(["linkedin", "carousel"])
            .weak([
                "professional",
                "post",
                "network",
                "announcement",
                "thought leadership",
            ])
            .consumes(AgentKind::research())
            .describe("LinkedIn posts, professional updates and carousels"),
        KindSpec::new(AgentKind::image(), ContentType::ImagePrompt)
            .strong([
                "image",
                "picture",
                "illustration",
                "graphic",
                "visual",
                "photo",
                "banner",
                "thumbnail",
            ])
            .weak(["hd", "design", "draw", "logo"])
            .describe("image generation, graphics and social media visuals"),
    ]
}

/// System instructions for a built-in kind
fn instructions(kind: &AgentKind) -> String {
    match kind.as_str() {
        AgentKind::RESEARCH => "You are a research analyst. Summarize the most relevant, \
             current facts about the topic as short bullet points, then list key takeaways."
            .to_string(),
        AgentKind::BLOG => "You are a blog writer. Write a structured article with a title, \
             headings and a conclusion. Use the research provided and do not invent statistics."
            .to_string(),
        AgentKind::LINKEDIN => "You write LinkedIn posts: a strong opening line, short \
             paragraphs, a call to action and at most five hashtags."
            .to_string(),
        AgentKind::IMAGE => "You write prompts for an image generation model. Describe \
             subject, composition, style, lighting and colors in one paragraph."
            .to_string(),
        other => format!("You produce {other} content for the request."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Message, Result as LLMResult};
    use async_trait::async_trait;

    struct NullProvider;

    #[async_trait]
    impl LLMProvider for NullProvider {
        fn name(&self) -> &str {
            "null"
        }

        fn is_local(&self) -> bool {
            true
        }

        async fn generate(&self, _messages: &[Message]) -> LLMResult<String> {
            Ok(String::new())
        }
    }

    #[test]
    fn test_builtin_registry_covers_every_spec() {
        let registry = AgentRegistry::builtin(Arc::new(NullProvider), RetryPolicy::default());
        for spec in builtin_specs() {
            assert!(registry.get(&spec.kind).is_some(), "missing {}", spec.kind);
        }
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_builtin_wiring() {
        let specs = builtin_specs();
        let blog = specs.iter().find(|s| s.kind == AgentKind::blog()).unwrap();
        assert_eq!(blog.prerequisites, vec![AgentKind::research()]);
        assert!(blog.conflicts.contains(&AgentKind::linkedin()));
    }
}
