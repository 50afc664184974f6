//! Prompt assembly for LLM-backed agents

use crate::llm::Message;
use sdk::agent::TaskContext;
use sdk::types::{AgentTask, Emotion, Formality, Perspective, VoiceProfile};

/// Upstream payloads longer than this are cut before prompting
const MAX_UPSTREAM_CHARS: usize = 6000;

/// Render a voice profile as writing rules
pub fn voice_rules(profile: &VoiceProfile) -> String {
    let d = &profile.descriptors;
    let formality = match d.tone.formality {
        Formality::Casual => "casual",
        Formality::Balanced => "balanced",
        Formality::Formal => "formal",
    };
    let perspective = match d.tone.perspective {
        Perspective::FirstPerson => "first person (we/I)",
        Perspective::SecondPerson => "second person (you)",
        Perspective::ThirdPerson => "third person",
    };
    let emotion = match d.tone.emotion {
        Emotion::Neutral => "neutral",
        Emotion::Professional => "professional",
        Emotion::Enthusiastic => "enthusiastic",
    };

    let mut rules = vec![
        format!("Tone: {formality}, {emotion}, written in the {perspective}."),
        format!(
            "Aim for about {:.0} words per sentence.",
            d.formatting.avg_sentence_words.max(1.0)
        ),
    ];
    if !d.vocabulary.preferred_terms.is_empty() {
        rules.push(format!(
            "Prefer these terms: {}.",
            d.vocabulary.preferred_terms.join(", ")
        ));
    }
    if !d.vocabulary.avoided_terms.is_empty() {
        rules.push(format!(
            "Never use: {}.",
            d.vocabulary.avoided_terms.join(", ")
        ));
    }
    if d.formatting.uses_headings {
        rules.push("Use headings.".to_string());
    }
    if d.formatting.uses_bullets {
        rules.push("Bullet lists are welcome.".to_string());
    }
    if !d.formatting.uses_emoji {
        rules.push("No emoji.".to_string());
    }
    rules.join("\n")
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Messages for one attempt of `task`
pub fn build_messages(instructions: &str, task: &AgentTask, ctx: &TaskContext) -> Vec<Message> {
    let mut system = instructions.to_string();

    if let Some(voice) = &ctx.voice {
        system.push_str("\n\nBrand voice:\n");
        system.push_str(&voice_rules(voice));
    }

    if !ctx.grounding.is_empty() {
        system.push_str("\n\nRelevant material:\n");
        for fragment in &ctx.grounding {
            system.push_str(&format!("- {}\n", fragment.source_text));
        }
    }

    if !ctx.history.is_empty() {
        system.push_str("\n\nRecent conversation (newest first):\n");
        for line in &ctx.history {
            system.push_str(&format!("{line}\n"));
        }
    }

    let mut request = format!("Topic: {}\n", task.topic());
    for (key, value) in &task.params {
        if key == "topic" {
            continue;
        }
        let value = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        request.push_str(&format!("{key}: {value}\n"));
    }

    for upstream in &ctx.upstream {
        request.push_str(&format!(
            "\nInput from {}:\n{}\n",
            upstream.kind,
            truncate(&upstream.payload, MAX_UPSTREAM_CHARS)
        ));
    }

    vec![Message::system(system), Message::user(request)]
}
