use blitz_engine::agents::builtin_specs;
use blitz_engine::config::RouterConfig;
use blitz_engine::llm::HashingEmbedder;
use blitz_engine::memory::{ConversationSession, Message, SessionStatus};
use blitz_engine::orchestrator::TaskGraph;
use blitz_engine::router::Router;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

fn session(history: &[String]) -> ConversationSession {
    ConversationSession {
        id: "s1".into(),
        status: SessionStatus::Active,
        messages: history.iter().map(|m| Message::user(m.clone())).collect(),
        active_voice: None,
        voice_versions: vec![],
        kind_stats: BTreeMap::new(),
        created_at: 0,
        last_active_at: 0,
    }
}

fn request_strategy() -> impl Strategy<Value = String> {
    let words = prop::sample::select(vec![
        "write", "a", "blog", "post", "about", "linkedin", "image", "research", "trends",
        "our", "launch", "hd", "video", "with", "and", "make", "it", "shorter", "1200x630",
        "on", "edge", "computing", "article", "banner", "500", "words",
    ]);
    prop::collection::vec(words, 1..12).prop_map(|w| w.join(" "))
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

// The same request against the same session state yields the same decision
proptest! {
    #[test]
    fn test_routing_is_deterministic(
        request in request_strategy(),
        history in prop::collection::vec(request_strategy(), 0..3),
    ) {
        let rt = runtime();
        let router = Router::new(builtin_specs(), RouterConfig::default())
            .with_embedder(Arc::new(HashingEmbedder::new(64)));
        let session = session(&history);

        let first = rt.block_on(router.route(&request, &session));
        let second = rt.block_on(router.route(&request, &session));

        match (first, second) {
            (Ok(a), Ok(b)) => {
                prop_assert_eq!(&a.tasks, &b.tasks);
                prop_assert_eq!(&a.scores, &b.scores);
                prop_assert_eq!(a.from_context, b.from_context);
            }
            (Err(a), Err(b)) => prop_assert_eq!(a.to_string(), b.to_string()),
            (a, b) => prop_assert!(false, "diverged: {:?} vs {:?}", a.is_ok(), b.is_ok()),
        }
    }
}

// Every routed decision is a valid DAG whose prerequisites precede dependents
proptest! {
    #[test]
    fn test_routed_decisions_are_acyclic(request in request_strategy()) {
        let rt = runtime();
        let router = Router::new(builtin_specs(), RouterConfig::default());

        if let Ok(decision) = rt.block_on(router.route(&request, &session(&[]))) {
            let graph = TaskGraph::build(&decision).unwrap();
            prop_assert_eq!(graph.len(), decision.tasks.len());
            for (index, task) in decision.tasks.iter().enumerate() {
                prop_assert!(!task.params["topic"].as_str().unwrap_or_default().is_empty());
                for dep in graph.deps(index) {
                    prop_assert!(graph.rank(*dep) < graph.rank(index));
                }
            }
            let kinds = decision.kinds();
            let mut unique = kinds.clone();
            unique.sort();
            unique.dedup();
            prop_assert_eq!(unique.len(), kinds.len());
            if let Some(blog) = decision.task("blog") {
                prop_assert_eq!(blog.depends_on.clone(), vec!["research".to_string()]);
            }
        }
    }
}
