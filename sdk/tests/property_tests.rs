use proptest::prelude::*;
use sdk::errors::{AgentError, BlitzErrorExt, EngineError};
use sdk::types::{AgentKind, FailureReason, TaskStatus};

// User hints are static text and never echo the message they wrap
proptest! {
    #[test]
    fn test_error_user_hint_completeness(detail in "\\PC*") {
        let errs = vec![
            EngineError::UnsupportedRequest(detail.clone()),
            EngineError::SessionNotFound(detail.clone()),
            EngineError::SessionClosed(detail.clone()),
            EngineError::InvalidDecision(detail.clone()),
            EngineError::Config(detail.clone()),
            EngineError::Database(detail.clone()),
            EngineError::ProviderUnavailable(detail.clone()),
            EngineError::KeyringError(detail.clone()),
            EngineError::VoiceVersionNotFound { session_id: detail.clone(), version: 3 },
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            if detail.len() > 12 {
                prop_assert!(!hint.contains(detail.as_str()));
            }
        }
    }
}

proptest! {
    #[test]
    fn test_agent_kind_is_case_and_space_insensitive(name in "[a-zA-Z]{1,16}", pad in " {0,3}") {
        let padded = format!("{pad}{name}{pad}");
        let kind = AgentKind::new(&padded);
        prop_assert_eq!(kind.as_str(), name.to_lowercase());
        prop_assert_eq!(kind, AgentKind::new(name.to_uppercase()));
    }
}

proptest! {
    #[test]
    fn test_only_permanent_agent_errors_stop_retries(message in "\\PC*", wait in proptest::option::of(0u64..60_000)) {
        prop_assert!(AgentError::Transient(message.clone()).is_retryable());
        let rate_limited = AgentError::RateLimited { retry_after_ms: wait };
        prop_assert!(rate_limited.is_retryable());
        prop_assert!(!AgentError::Permanent(message).is_retryable());
    }
}

#[test]
fn test_status_serialization_matches_storage_strings() {
    for status in [
        TaskStatus::Pending,
        TaskStatus::Running,
        TaskStatus::Succeeded,
        TaskStatus::Failed,
        TaskStatus::TimedOut,
    ] {
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, format!("\"{}\"", status.as_str()));
    }

    let json = serde_json::to_string(&FailureReason::UpstreamFailure).unwrap();
    assert_eq!(json, "\"upstream_failure\"");
}
