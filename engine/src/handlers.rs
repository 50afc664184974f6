//! Command handlers for CLI operations
//!
//! Each handler drives one [`ContentService`] operation and prints the
//! result as text or JSON.

use anyhow::{Context, Result};
use serde_json::json;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::watch;

use crate::memory::{ConversationSession, VoiceGuidelines};
use crate::orchestrator::AggregatedResponse;
use crate::secrets::SecretManager;
use crate::service::ContentService;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_time(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

fn print_response(response: &AggregatedResponse) {
    println!("Decision {} ({})", response.decision_id, response.status);
    println!();
    for task in &response.tasks {
        let marker = if task.failure.is_none() { "✓" } else { "✗" };
        print!(
            "{} {} [{}] attempts: {}",
            marker,
            task.task_id,
            task.status.as_str(),
            task.attempts
        );
        if let Some(failure) = &task.failure {
            print!(" - {}: {}", failure.reason, failure.message);
        }
        println!();
    }
    for artifact in &response.artifacts {
        println!();
        println!("── {} ({}) ──", artifact.kind, artifact.content_type.as_str());
        println!("{}", artifact.payload);
        if let Some(conformance) = artifact.voice_conformance {
            println!("  Voice conformance: {:.0}%", conformance * 100.0);
        }
    }
}

fn print_session(session: &ConversationSession) {
    println!("Session {}", session.id);
    println!("  Status: {}", session.status.as_str());
    println!("  Created: {}", format_time(session.created_at));
    println!("  Last active: {}", format_time(session.last_active_at));
    match &session.active_voice {
        Some(voice) => println!(
            "  Voice: v{} of {:?}",
            voice.version, session.voice_versions
        ),
        None => println!("  Voice: none"),
    }
}

pub async fn handle_session_new(service: &ContentService, format: OutputFormat) -> Result<()> {
    let session = service.create_session().await?;
    match format {
        OutputFormat::Text => println!("Created session {}", session.id),
        OutputFormat::Json => print_json(&json!({ "session_id": session.id }))?,
    }
    Ok(())
}

pub async fn handle_session_list(service: &ContentService, format: OutputFormat) -> Result<()> {
    let sessions = service.sessions().await;
    match format {
        OutputFormat::Text => {
            if sessions.is_empty() {
                println!("No sessions");
            }
            for session in &sessions {
                println!(
                    "{}  {:<6}  {} message(s)  last active {}",
                    session.id,
                    session.status.as_str(),
                    session.messages.len(),
                    format_time(session.last_active_at)
                );
            }
        }
        OutputFormat::Json => print_json(&sessions)?,
    }
    Ok(())
}

pub async fn handle_session_show(
    service: &ContentService,
    session_id: &str,
    format: OutputFormat,
) -> Result<()> {
    let session = service.session_view(session_id).await?;
    match format {
        OutputFormat::Text => {
            print_session(&session);
            println!();
            for message in &session.messages {
                println!("[{}] {}: {}", format_time(message.timestamp), message.role.as_str(), message.content);
            }
        }
        OutputFormat::Json => print_json(&session)?,
    }
    Ok(())
}

pub async fn handle_session_close(
    service: &ContentService,
    session_id: &str,
    format: OutputFormat,
) -> Result<()> {
    service.close_session(session_id).await?;
    match format {
        OutputFormat::Text => println!("Closed session {}", session_id),
        OutputFormat::Json => print_json(&json!({ "session_id": session_id, "status": "closed" }))?,
    }
    Ok(())
}

/// Submit a request. Ctrl-C cancels the running decision.
pub async fn handle_run(
    service: &ContentService,
    session_id: &str,
    request: &str,
    format: OutputFormat,
) -> Result<()> {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling request");
            cancel_tx.send(true).ok();
        }
    });

    let result = service.submit_request(session_id, request, cancel_rx).await;
    interrupt.abort();
    let response = result?;

    match format {
        OutputFormat::Text => print_response(&response),
        OutputFormat::Json => print_json(&response)?,
    }
    Ok(())
}

async fn read_samples(files: &[PathBuf]) -> Result<Vec<String>> {
    let mut samples = Vec::with_capacity(files.len());
    for file in files {
        let text = tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("Failed to read sample {}", file.display()))?;
        samples.push(text);
    }
    Ok(samples)
}

fn read_guidelines(path: &Path) -> Result<VoiceGuidelines> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read guidelines {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("Invalid guidelines in {}", path.display()))
}

pub async fn handle_voice_train(
    service: &ContentService,
    session_id: &str,
    files: &[PathBuf],
    guidelines: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let samples = read_samples(files).await?;
    let guidelines = guidelines.map(read_guidelines).transpose()?;
    let profile = service
        .submit_voice_sample(session_id, samples, guidelines)
        .await?;

    match format {
        OutputFormat::Text => {
            println!(
                "Trained voice v{} from {} sample(s)",
                profile.version, profile.sample_count
            );
            let tone = &profile.descriptors.tone;
            println!(
                "  Tone: {:?}, {:?}, {:?}",
                tone.formality, tone.emotion, tone.perspective
            );
        }
        OutputFormat::Json => print_json(profile.as_ref())?,
    }
    Ok(())
}

pub async fn handle_voice_rollback(
    service: &ContentService,
    session_id: &str,
    version: u32,
    format: OutputFormat,
) -> Result<()> {
    let profile = service.rollback_voice(session_id, version).await?;
    match format {
        OutputFormat::Text => println!("Active voice is now v{}", profile.version),
        OutputFormat::Json => print_json(profile.as_ref())?,
    }
    Ok(())
}

pub async fn handle_voice_show(
    service: &ContentService,
    session_id: &str,
    format: OutputFormat,
) -> Result<()> {
    let versions = service.memory().voice_versions(session_id).await?;
    let active = service.memory().voice_snapshot(session_id).await?;

    match format {
        OutputFormat::Text => {
            if versions.is_empty() {
                println!("No voice trained for session {}", session_id);
                return Ok(());
            }
            for profile in &versions {
                let marker = if active.as_ref().map(|a| a.version) == Some(profile.version) {
                    "*"
                } else {
                    " "
                };
                println!(
                    "{} v{}  {} sample(s)  {}",
                    marker,
                    profile.version,
                    profile.sample_count,
                    format_time(profile.created_at)
                );
            }
            if let Some(active) = &active {
                println!();
                println!("{}", crate::agents::prompt::voice_rules(active));
            }
        }
        OutputFormat::Json => {
            let versions: Vec<_> = versions.iter().map(|v| v.as_ref()).collect();
            print_json(&json!({
                "active_version": active.as_ref().map(|a| a.version),
                "versions": versions,
            }))?
        }
    }
    Ok(())
}

pub async fn handle_history(
    service: &ContentService,
    session_id: Option<&str>,
    limit: u32,
    format: OutputFormat,
) -> Result<()> {
    let decisions = service.history(session_id, limit).await?;

    match format {
        OutputFormat::Text => {
            if decisions.is_empty() {
                println!("No decisions in history");
                return Ok(());
            }
            println!("Decision History (last {}):", limit);
            println!();
            for decision in &decisions {
                println!("Decision ID: {}", decision.id);
                println!("  Session: {}", decision.session_id);
                println!("  Request: {}", decision.request);
                println!("  Status: {} ({} task(s))", decision.status, decision.task_count);
                println!("  Created: {}", format_time(decision.created_at));
                println!();
            }
        }
        OutputFormat::Json => print_json(&decisions)?,
    }
    Ok(())
}

pub async fn handle_replay(
    service: &ContentService,
    decision_id: &str,
    show_only: bool,
    format: OutputFormat,
) -> Result<()> {
    if show_only {
        let detail = service.decision(decision_id).await?;
        match format {
            OutputFormat::Text => {
                println!("Decision {}: {}", detail.summary.id, detail.summary.request);
                println!("Status: {}", detail.summary.status);
                println!();
                for task in &detail.tasks {
                    print!("{} [{}] attempts: {}", task.id, task.status.as_str(), task.attempts);
                    if !task.depends_on.is_empty() {
                        print!(" after {}", task.depends_on.join(", "));
                    }
                    if let Some(failure) = &task.failure {
                        print!(" - {}", failure.reason);
                    }
                    println!();
                }
                println!();
                println!("{} artifact(s) stored", detail.artifacts.len());
            }
            OutputFormat::Json => print_json(&detail)?,
        }
        return Ok(());
    }

    let response = service.replay_decision(decision_id).await?;
    match format {
        OutputFormat::Text => print_response(&response),
        OutputFormat::Json => print_json(&response)?,
    }
    Ok(())
}

pub async fn handle_purge(service: &ContentService, format: OutputFormat) -> Result<()> {
    let expired = service.purge_expired().await?;
    match format {
        OutputFormat::Text => println!("Purged {} expired session(s)", expired.len()),
        OutputFormat::Json => print_json(&json!({ "purged": expired }))?,
    }
    Ok(())
}

/// Store a provider key in the OS keychain
pub fn handle_secret_set(
    secrets: &SecretManager,
    key: &str,
    value: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let value = match value {
        Some(value) => value,
        None => {
            if matches!(format, OutputFormat::Text) {
                print!("Enter value for '{}': ", key);
                std::io::stdout().flush()?;
            }
            let mut line = String::new();
            std::io::stdin()
                .read_line(&mut line)
                .context("Failed to read secret from stdin")?;
            line.trim().to_string()
        }
    };

    secrets.set_secret(key, &value)?;
    match format {
        OutputFormat::Text => println!("Stored '{}' in the keychain", key),
        OutputFormat::Json => print_json(&json!({ "key": key, "stored": true }))?,
    }
    Ok(())
}

pub fn handle_secret_delete(secrets: &SecretManager, key: &str, format: OutputFormat) -> Result<()> {
    secrets.delete_secret(key)?;
    match format {
        OutputFormat::Text => println!("Deleted '{}' from the keychain", key),
        OutputFormat::Json => print_json(&json!({ "key": key, "deleted": true }))?,
    }
    Ok(())
}

pub fn handle_secret_status(secrets: &SecretManager, key: &str, format: OutputFormat) -> Result<()> {
    let available = secrets.has_secret(key);
    match format {
        OutputFormat::Text => {
            if available {
                println!("'{}' is set", key);
            } else {
                println!(
                    "'{}' is not set (export {} or run 'blitz secret set {}')",
                    key,
                    SecretManager::env_var_name(key),
                    key
                );
            }
        }
        OutputFormat::Json => print_json(&json!({ "key": key, "available": available }))?,
    }
    Ok(())
}
