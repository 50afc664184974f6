//! Task parameter extraction from free-form requests

use regex::Regex;
use sdk::types::{ContentType, TaskParams};
use serde_json::json;
use std::sync::OnceLock;

const DEFAULT_IMAGE_SIZE: &str = "1024x1024";
const MAX_KEYWORDS: usize = 8;

const FILLER: &[&str] = &[
    "a", "an", "the", "and", "or", "for", "of", "to", "in", "on", "about", "with", "me", "my",
    "our", "your", "please", "can", "you", "some", "that", "this", "it", "is", "are", "be",
    "write", "create", "make", "generate", "draft", "give", "need", "want", "also", "plus",
];

static TOPIC_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
static LENGTH_PATTERN: OnceLock<Regex> = OnceLock::new();
static SIZE_PATTERN: OnceLock<Regex> = OnceLock::new();
static HD_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Tried in order; "on" is ambiguous ("a post on LinkedIn") so it comes last
fn topic_patterns() -> &'static [Regex] {
    TOPIC_PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"(?i)\b(?:about|regarding|covering)\s+(.+)").expect("Invalid topic pattern"),
            Regex::new(r"(?i)\bon\s+(.+)").expect("Invalid topic pattern"),
        ]
    })
}

fn length_pattern() -> &'static Regex {
    LENGTH_PATTERN
        .get_or_init(|| Regex::new(r"(?i)\b(\d{2,5})\s*-?\s*words?\b").expect("Invalid length pattern"))
}

fn size_pattern() -> &'static Regex {
    SIZE_PATTERN
        .get_or_init(|| Regex::new(r"\b(\d{3,4})\s*[xX×]\s*(\d{3,4})\b").expect("Invalid size pattern"))
}

fn hd_pattern() -> &'static Regex {
    HD_PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(?:hd|high[- ]quality|high[- ]res(?:olution)?)\b")
            .expect("Invalid quality pattern")
    })
}

/// Subject of a request: the text after "about"/"on", cut at the first
/// clause that asks for another deliverable
pub fn topic(request: &str) -> String {
    let tail = topic_patterns()
        .iter()
        .find_map(|pattern| pattern.captures(request).and_then(|c| c.get(1)))
        .map(|m| m.as_str())
        .unwrap_or(request);

    let lower = tail.to_ascii_lowercase();
    let cut = [
        " with an ", " with a ", " and an ", " and a ", " plus ", ", ", ". ", " in ", "\n",
    ]
    .iter()
    .filter_map(|sep| lower.find(sep))
    .min()
    .unwrap_or(tail.len());

    tail[..cut]
        .trim()
        .trim_end_matches(['.', '!', '?'])
        .trim()
        .to_string()
}

/// Distinctive words of the request, in first-seen order
pub fn keywords(request: &str, exclude: &[String]) -> Vec<String> {
    let mut seen = Vec::new();
    for word in request
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .filter(|w| w.len() >= 4)
    {
        if FILLER.contains(&word)
            || exclude.iter().any(|e| e == word)
            || word.chars().all(|c| c.is_ascii_digit())
            || seen.iter().any(|s: &String| s == word)
        {
            continue;
        }
        seen.push(word.to_string());
        if seen.len() == MAX_KEYWORDS {
            break;
        }
    }
    seen
}

/// Parameters for one task of the given content type
pub fn extract(request: &str, topic: &str, content_type: ContentType, exclude: &[String]) -> TaskParams {
    let mut params = TaskParams::new();
    params.insert("topic".into(), json!(topic));
    params.insert("request".into(), json!(request.trim()));
    params.insert("keywords".into(), json!(keywords(topic, exclude)));

    match content_type {
        ContentType::BlogPost | ContentType::LinkedInPost => {
            if let Some(length) = length_pattern()
                .captures(request)
                .and_then(|c| c[1].parse::<u32>().ok())
            {
                params.insert("target_length".into(), json!(length));
            }
        }
        ContentType::Image | ContentType::ImagePrompt => {
            let size = size_pattern()
                .captures(request)
                .map(|c| format!("{}x{}", &c[1], &c[2]))
                .unwrap_or_else(|| DEFAULT_IMAGE_SIZE.to_string());
            params.insert("size".into(), json!(size));
            let quality = if hd_pattern().is_match(request) {
                "hd"
            } else {
                "standard"
            };
            params.insert("quality".into(), json!(quality));
        }
        ContentType::Research | ContentType::Text => {}
    }

    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_after_about() {
        assert_eq!(
            topic("Write a LinkedIn post about our Series A funding with an image"),
            "our Series A funding"
        );
        assert_eq!(topic("Research quantum networking."), "Research quantum networking");
        assert_eq!(
            topic("A post on LinkedIn about remote onboarding"),
            "remote onboarding"
        );
    }

    #[test]
    fn test_image_params() {
        let params = extract(
            "HD banner 1200x630 of a rocket",
            "a rocket",
            ContentType::Image,
            &[],
        );
        assert_eq!(params["size"], "1200x630");
        assert_eq!(params["quality"], "hd");

        let params = extract("an image of a cat", "a cat", ContentType::Image, &[]);
        assert_eq!(params["size"], DEFAULT_IMAGE_SIZE);
        assert_eq!(params["quality"], "standard");
    }

    #[test]
    fn test_target_length_and_keywords() {
        let params = extract(
            "a 1500 word blog about edge computing latency",
            "edge computing latency",
            ContentType::BlogPost,
            &["blog".to_string()],
        );
        assert_eq!(params["target_length"], 1500);
        assert_eq!(params["keywords"], json!(["edge", "computing", "latency"]));
    }
}
