// Blitz content engine
// Main entry point for the blitz binary

use clap::Parser;
use blitz_engine::cli::{Cli, Command, SecretAction, SessionAction, VoiceAction};
use blitz_engine::config::Config;
use blitz_engine::handlers::{
    handle_history, handle_purge, handle_replay, handle_run, handle_secret_delete,
    handle_secret_set, handle_secret_status, handle_session_close, handle_session_list,
    handle_session_new, handle_session_show, handle_voice_rollback, handle_voice_show,
    handle_voice_train, OutputFormat,
};
use blitz_engine::secrets::{SecretManager, KEYCHAIN_SERVICE};
use blitz_engine::service::ContentService;
use blitz_engine::telemetry::init_telemetry_with_level;
use sdk::errors::{BlitzErrorExt, EngineError};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        if let Some(engine_error) = e.downcast_ref::<EngineError>() {
            eprintln!("Hint: {}", engine_error.user_hint());
        }
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the config file; RUST_LOG wins over both
    init_telemetry_with_level(cli.log.as_deref().unwrap_or(&config.core.log_level));

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");
    tracing::debug!("Blitz v{} ({} - {})", version, commit, timestamp);

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let service = ContentService::open(config).await?;

    let result = match cli.command {
        Command::Session { action } => match action {
            SessionAction::New => handle_session_new(&service, format).await,
            SessionAction::List => handle_session_list(&service, format).await,
            SessionAction::Show { id } => handle_session_show(&service, &id, format).await,
            SessionAction::Close { id } => handle_session_close(&service, &id, format).await,
        },

        Command::Run { session, request } => {
            handle_run(&service, &session, &request, format).await
        }

        Command::Voice { action } => match action {
            VoiceAction::Train {
                session,
                files,
                guidelines,
            } => {
                handle_voice_train(&service, &session, &files, guidelines.as_deref(), format)
                    .await
            }
            VoiceAction::Rollback { session, version } => {
                handle_voice_rollback(&service, &session, version, format).await
            }
            VoiceAction::Show { session } => handle_voice_show(&service, &session, format).await,
        },

        Command::History { session, limit } => {
            handle_history(&service, session.as_deref(), limit, format).await
        }

        Command::Replay { decision_id, show } => {
            handle_replay(&service, &decision_id, show, format).await
        }

        Command::Purge => handle_purge(&service, format).await,

        Command::Secret { action } => {
            let secrets = SecretManager::new(KEYCHAIN_SERVICE);
            match action {
                SecretAction::Set { key, value } => handle_secret_set(&secrets, &key, value, format),
                SecretAction::Delete { key } => handle_secret_delete(&secrets, &key, format),
                SecretAction::Status { key } => handle_secret_status(&secrets, &key, format),
            }
        }
    };

    service.shutdown().await?;
    result
}
