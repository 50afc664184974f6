//! Brand voice analysis
//!
//! Derives [`StyleDescriptors`] from sample writing and scores how closely a
//! generated text follows them. Explicit guidelines always override what the
//! analysis infers.

use regex::Regex;
use sdk::types::{
    Emotion, Formality, FormattingRules, Perspective, StyleDescriptors, ToneDescriptor,
    VocabularyRules, VoiceProfile,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

const CASUAL_MARKERS: &[&str] = &[
    "hey", "awesome", "gonna", "wanna", "cool", "super", "stuff", "folks", "lol", "yeah", "kinda",
];

const FORMAL_MARKERS: &[&str] = &[
    "therefore",
    "furthermore",
    "moreover",
    "consequently",
    "however",
    "regarding",
    "accordingly",
    "thus",
    "hereby",
    "respectively",
];

const ENTHUSIASTIC_MARKERS: &[&str] = &[
    "excited", "amazing", "love", "thrilled", "incredible", "awesome", "fantastic", "delighted",
];

const PROFESSIONAL_MARKERS: &[&str] = &[
    "solution",
    "solutions",
    "strategy",
    "business",
    "customers",
    "results",
    "performance",
    "enterprise",
    "teams",
    "growth",
];

const STOPWORDS: &[&str] = &[
    "about", "after", "again", "their", "there", "these", "those", "which", "while", "would",
    "could", "should", "where", "other", "every", "because", "being", "before", "through",
    "what", "with", "from", "that", "this", "have", "will", "your", "into", "more", "than",
];

const MAX_PREFERRED_TERMS: usize = 10;

/// Explicit brand rules supplied alongside samples
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceGuidelines {
    pub formality: Option<Formality>,
    pub emotion: Option<Emotion>,
    pub perspective: Option<Perspective>,
    #[serde(default)]
    pub preferred_terms: Vec<String>,
    #[serde(default)]
    pub avoided_terms: Vec<String>,
}

fn sentence_splitter() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]+(\s+|$)|\n+").expect("Invalid voice pattern"))
}

fn contraction_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b[a-z]+'(t|s|re|ve|ll|d|m)\b").expect("Invalid voice pattern")
    })
}

fn hashtag_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(^|\s)#[A-Za-z]\w*").expect("Invalid voice pattern"))
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .map(|w| w.trim_matches('\'').to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

fn sentences(text: &str) -> Vec<&str> {
    sentence_splitter()
        .split(text)
        .map(str::trim)
        .filter(|s| s.chars().any(char::is_alphanumeric))
        .collect()
}

fn is_emoji(c: char) -> bool {
    matches!(c as u32, 0x1F300..=0x1FAFF | 0x2600..=0x27BF)
}

fn is_bullet(line: &str) -> bool {
    let line = line.trim_start();
    if line.starts_with("- ") || line.starts_with("* ") || line.starts_with("• ") {
        return true;
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    digits > 0 && line[digits..].starts_with(". ")
}

fn is_heading(line: &str) -> bool {
    let line = line.trim_start();
    let hashes = line.chars().take_while(|c| *c == '#').count();
    (1..=6).contains(&hashes) && line[hashes..].starts_with(' ')
}

/// Aggregate surface statistics of one or more texts
#[derive(Debug, Default)]
struct TextStats {
    words: usize,
    sentences: usize,
    paragraphs: usize,
    exclamations: usize,
    contractions: usize,
    casual: usize,
    formal: usize,
    enthusiastic: usize,
    professional: usize,
    first_person: usize,
    second_person: usize,
    headings: bool,
    bullets: bool,
    emoji: bool,
    hashtags: bool,
}

impl TextStats {
    fn add(&mut self, text: &str) {
        let tokens = words(text);
        self.words += tokens.len();
        self.sentences += sentences(text).len();
        self.paragraphs += text
            .split("\n\n")
            .filter(|p| p.chars().any(char::is_alphanumeric))
            .count();
        self.exclamations += text.matches('!').count();
        self.contractions += contraction_pattern().find_iter(text).count();

        for token in &tokens {
            let token = token.as_str();
            self.casual += CASUAL_MARKERS.contains(&token) as usize;
            self.formal += FORMAL_MARKERS.contains(&token) as usize;
            self.enthusiastic += ENTHUSIASTIC_MARKERS.contains(&token) as usize;
            self.professional += PROFESSIONAL_MARKERS.contains(&token) as usize;
            // "we're" counts as "we"
            let base = token.split('\'').next().unwrap_or(token);
            self.first_person += matches!(base, "i" | "we" | "our" | "us" | "my" | "me") as usize;
            self.second_person += matches!(base, "you" | "your" | "yours") as usize;
        }

        self.headings |= text.lines().any(is_heading);
        self.bullets |= text.lines().any(is_bullet);
        self.emoji |= text.chars().any(is_emoji);
        self.hashtags |= hashtag_pattern().is_match(text);
    }

    fn avg_sentence_words(&self) -> f32 {
        if self.sentences == 0 {
            0.0
        } else {
            self.words as f32 / self.sentences as f32
        }
    }

    fn formality(&self) -> Formality {
        let words = self.words.max(1) as f32;
        let casual = (self.casual + self.contractions + self.exclamations) as f32;
        let formal = self.formal as f32 + if self.avg_sentence_words() > 22.0 { 2.0 } else { 0.0 };

        if casual / words > 0.03 && casual > formal {
            Formality::Casual
        } else if formal / words > 0.01 && formal > casual {
            Formality::Formal
        } else {
            Formality::Balanced
        }
    }

    fn emotion(&self) -> Emotion {
        let words = self.words.max(1) as f32;
        let enthusiastic = (self.enthusiastic + self.exclamations) as f32;
        if enthusiastic / words > 0.02 && enthusiastic >= self.professional as f32 {
            Emotion::Enthusiastic
        } else if self.professional > 0 {
            Emotion::Professional
        } else {
            Emotion::Neutral
        }
    }

    fn perspective(&self) -> Perspective {
        if self.first_person == 0 && self.second_person == 0 {
            Perspective::ThirdPerson
        } else if self.first_person > self.second_person {
            Perspective::FirstPerson
        } else {
            Perspective::SecondPerson
        }
    }
}

/// Distinctive words shared across samples, most frequent first
fn preferred_terms(samples: &[&str]) -> Vec<String> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut spread: BTreeMap<String, BTreeSet<usize>> = BTreeMap::new();

    for (index, sample) in samples.iter().enumerate() {
        for word in words(sample) {
            if word.len() < 5 || STOPWORDS.contains(&word.as_str()) || word.contains('\'') {
                continue;
            }
            *counts.entry(word.clone()).or_default() += 1;
            spread.entry(word).or_default().insert(index);
        }
    }

    let needed_spread = if samples.len() > 1 { 2 } else { 1 };
    let mut terms: Vec<(String, usize)> = counts
        .into_iter()
        .filter(|(word, count)| {
            *count >= 2 && spread.get(word).map_or(0, BTreeSet::len) >= needed_spread
        })
        .collect();

    terms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    terms
        .into_iter()
        .take(MAX_PREFERRED_TERMS)
        .map(|(word, _)| word)
        .collect()
}

/// Derive style descriptors from non-empty samples.
pub fn derive_descriptors(samples: &[String], guidelines: &VoiceGuidelines) -> StyleDescriptors {
    let samples: Vec<&str> = samples
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();

    let mut stats = TextStats::default();
    for sample in &samples {
        stats.add(sample);
    }

    let mut preferred = preferred_terms(&samples);
    for term in &guidelines.preferred_terms {
        let term = term.trim().to_lowercase();
        if !term.is_empty() && !preferred.contains(&term) {
            preferred.push(term);
        }
    }

    let avoided: Vec<String> = guidelines
        .avoided_terms
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    preferred.retain(|t| !avoided.contains(t));

    let avg_paragraph_sentences = if stats.paragraphs == 0 {
        0.0
    } else {
        stats.sentences as f32 / stats.paragraphs as f32
    };

    StyleDescriptors {
        tone: ToneDescriptor {
            formality: guidelines.formality.unwrap_or_else(|| stats.formality()),
            perspective: guidelines.perspective.unwrap_or_else(|| stats.perspective()),
            emotion: guidelines.emotion.unwrap_or_else(|| stats.emotion()),
        },
        vocabulary: VocabularyRules {
            preferred_terms: preferred,
            avoided_terms: avoided,
        },
        formatting: FormattingRules {
            avg_sentence_words: stats.avg_sentence_words(),
            avg_paragraph_sentences,
            uses_headings: stats.headings,
            uses_bullets: stats.bullets,
            uses_emoji: stats.emoji,
            uses_hashtags: stats.hashtags,
        },
    }
}

fn formality_distance(a: Formality, b: Formality) -> u8 {
    let rank = |f: Formality| match f {
        Formality::Casual => 0u8,
        Formality::Balanced => 1,
        Formality::Formal => 2,
    };
    rank(a).abs_diff(rank(b))
}

/// How closely `text` follows the profile, from 0.0 (not at all) to 1.0.
pub fn conformance(profile: &VoiceProfile, text: &str) -> f32 {
    let descriptors = &profile.descriptors;
    let mut stats = TextStats::default();
    stats.add(text);
    if stats.words == 0 {
        return 0.0;
    }

    let tokens: BTreeSet<String> = words(text).into_iter().collect();
    let lowered = text.to_lowercase();

    let avoided_hits = descriptors
        .vocabulary
        .avoided_terms
        .iter()
        .filter(|t| lowered.contains(t.as_str()))
        .count();
    let avoided_score = (1.0 - 0.5 * avoided_hits as f32).max(0.0);

    let preferred = &descriptors.vocabulary.preferred_terms;
    let preferred_score = if preferred.is_empty() {
        1.0
    } else {
        let hits = preferred.iter().filter(|t| tokens.contains(*t)).count();
        0.5 + 0.5 * (hits as f32 / 3.0).min(1.0)
    };

    let target = descriptors.formatting.avg_sentence_words;
    let length_score = if target <= 0.0 {
        1.0
    } else {
        1.0 - ((stats.avg_sentence_words() - target).abs() / target).min(1.0)
    };

    let formality_score = match formality_distance(descriptors.tone.formality, stats.formality()) {
        0 => 1.0,
        1 => 0.5,
        _ => 0.0,
    };

    let perspective_score = if stats.first_person == 0 && stats.second_person == 0 {
        // Too short to tell
        0.75
    } else if stats.perspective() == descriptors.tone.perspective {
        1.0
    } else {
        0.5
    };

    let score = 0.3 * avoided_score
        + 0.15 * preferred_score
        + 0.2 * length_score
        + 0.2 * formality_score
        + 0.15 * perspective_score;
    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(descriptors: StyleDescriptors) -> VoiceProfile {
        VoiceProfile {
            id: "p1".into(),
            session_id: "s1".into(),
            version: 1,
            descriptors,
            sample_count: 1,
            created_at: 0,
        }
    }

    #[test]
    fn test_casual_enthusiastic_samples() {
        let samples = vec![
            "Hey folks! We're so excited to share this. It's gonna be awesome!".to_string(),
            "We love building cool stuff with you! Can't wait! 🚀 #launch".to_string(),
        ];
        let d = derive_descriptors(&samples, &VoiceGuidelines::default());

        assert_eq!(d.tone.formality, Formality::Casual);
        assert_eq!(d.tone.emotion, Emotion::Enthusiastic);
        assert_eq!(d.tone.perspective, Perspective::FirstPerson);
        assert!(d.formatting.uses_emoji);
        assert!(d.formatting.uses_hashtags);
        assert!(!d.formatting.uses_headings);
    }

    #[test]
    fn test_formal_samples() {
        let samples = vec![
            "The platform consolidates reporting across regions. Furthermore, it reduces \
             reconciliation effort. Consequently, finance teams close books faster."
                .to_string(),
        ];
        let d = derive_descriptors(&samples, &VoiceGuidelines::default());

        assert_eq!(d.tone.formality, Formality::Formal);
        assert_eq!(d.tone.perspective, Perspective::ThirdPerson);
        assert!(d.formatting.avg_sentence_words > 5.0);
    }

    #[test]
    fn test_guidelines_override_analysis() {
        let samples = vec!["Hey folks! This is gonna be awesome!".to_string()];
        let guidelines = VoiceGuidelines {
            formality: Some(Formality::Formal),
            avoided_terms: vec![" Synergy ".into()],
            ..Default::default()
        };
        let d = derive_descriptors(&samples, &guidelines);

        assert_eq!(d.tone.formality, Formality::Formal);
        assert_eq!(d.vocabulary.avoided_terms, vec!["synergy".to_string()]);
    }

    #[test]
    fn test_preferred_terms_need_repetition() {
        let samples = vec![
            "Observability matters. Pipelines break.".to_string(),
            "Good observability keeps pipelines healthy.".to_string(),
        ];
        let d = derive_descriptors(&samples, &VoiceGuidelines::default());
        assert_eq!(
            d.vocabulary.preferred_terms,
            vec!["observability".to_string(), "pipelines".to_string()]
        );
    }

    #[test]
    fn test_markdown_formatting_detected() {
        let samples = vec!["# Release notes\n\n- faster builds\n- fewer bugs\n1. upgrade".to_string()];
        let d = derive_descriptors(&samples, &VoiceGuidelines::default());
        assert!(d.formatting.uses_headings);
        assert!(d.formatting.uses_bullets);
        assert!(!d.formatting.uses_hashtags);
    }

    #[test]
    fn test_conformance_penalizes_avoided_terms() {
        let samples = vec!["We help teams ship reliable software every week.".to_string()];
        let guidelines = VoiceGuidelines {
            avoided_terms: vec!["synergy".into()],
            ..Default::default()
        };
        let p = profile(derive_descriptors(&samples, &guidelines));

        let clean = conformance(&p, "We help teams ship dependable releases every week.");
        let dirty = conformance(&p, "We unlock synergy for teams every single week.");
        assert!(clean > dirty);
        assert!((0.0..=1.0).contains(&clean));
    }

    #[test]
    fn test_conformance_of_empty_text_is_zero() {
        let p = profile(derive_descriptors(
            &["Plain sample text here.".to_string()],
            &VoiceGuidelines::default(),
        ));
        assert_eq!(conformance(&p, "   "), 0.0);
    }
}
