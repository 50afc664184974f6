//! Kind registry entries: how the router recognizes and wires each agent kind

use sdk::types::{AgentKind, ContentType};

/// Exemplar weight for terms that name the kind outright
pub const STRONG_WEIGHT: f64 = 1.0;
/// Exemplar weight for terms that only hint at the kind
pub const WEAK_WEIGHT: f64 = 0.3;

/// Routing metadata for one agent kind
#[derive(Debug, Clone)]
pub struct KindSpec {
    pub kind: AgentKind,
    pub content_type: ContentType,
    /// Terms or phrases that name the kind ("blog post", "linkedin")
    pub strong: Vec<String>,
    /// Terms that make the kind more likely ("write", "professional")
    pub weak: Vec<String>,
    /// Kinds that always run first and feed this one
    pub prerequisites: Vec<AgentKind>,
    /// Kinds whose output this one consumes when they are in the same decision
    pub consumes: Vec<AgentKind>,
    /// Kinds that never share a decision with this one
    pub conflicts: Vec<AgentKind>,
    /// Short description embedded for similarity scoring
    pub description: String,
}

impl KindSpec {
    pub fn new(kind: AgentKind, content_type: ContentType) -> Self {
        Self {
            description: kind.to_string(),
            kind,
            content_type,
            strong: Vec::new(),
            weak: Vec::new(),
            prerequisites: Vec::new(),
            consumes: Vec::new(),
            conflicts: Vec::new(),
        }
    }

    pub fn strong<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.strong
            .extend(terms.into_iter().map(|t| t.as_ref().to_lowercase()));
        self
    }

    pub fn weak<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.weak
            .extend(terms.into_iter().map(|t| t.as_ref().to_lowercase()));
        self
    }

    pub fn requires(mut self, kind: AgentKind) -> Self {
        self.prerequisites.push(kind);
        self
    }

    pub fn consumes(mut self, kind: AgentKind) -> Self {
        self.consumes.push(kind);
        self
    }

    pub fn conflicts_with(mut self, kind: AgentKind) -> Self {
        self.conflicts.push(kind);
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Keyword evidence for this kind in a tokenized request.
    ///
    /// Matched exemplar weights are summed and squashed with `1 - e^-sum`,
    /// so one strong term gives ~0.63 and each extra term adds less.
    pub fn keyword_score(&self, tokens: &Tokens) -> f64 {
        let sum: f64 = self
            .strong
            .iter()
            .filter(|term| tokens.contains(term))
            .map(|_| STRONG_WEIGHT)
            .chain(
                self.weak
                    .iter()
                    .filter(|term| tokens.contains(term))
                    .map(|_| WEAK_WEIGHT),
            )
            .sum();
        1.0 - (-sum).exp()
    }

    /// Whether the request names this kind with at least one strong term
    pub fn is_named(&self, tokens: &Tokens) -> bool {
        self.strong.iter().any(|term| tokens.contains(term))
    }
}

/// Lowercased word tokens of a request
#[derive(Debug, Clone)]
pub struct Tokens {
    words: Vec<String>,
    joined: String,
}

impl Tokens {
    pub fn new(text: &str) -> Self {
        let words: Vec<String> = text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect();
        let joined = format!(" {} ", words.join(" "));
        Self { words, joined }
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Whole-word match of a term or a multi-word phrase; a trailing plural
    /// "s" on the request side also matches
    pub fn contains(&self, term: &str) -> bool {
        let normalized = Tokens::new(term);
        if normalized.words.len() > 1 {
            let phrase = normalized.joined.trim();
            return self.joined.contains(&format!(" {phrase} "))
                || self.joined.contains(&format!(" {phrase}s "));
        }
        let Some(word) = normalized.words.first() else {
            return false;
        };
        self.words
            .iter()
            .any(|w| w == word || w.strip_suffix('s') == Some(word.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phrase_and_plural_matching() {
        let tokens = Tokens::new("Write two LinkedIn posts, plus a long-form article!");
        assert!(tokens.contains("linkedin"));
        assert!(tokens.contains("post"));
        assert!(tokens.contains("long-form"));
        assert!(tokens.contains("linkedin post"));
        assert!(!tokens.contains("blog"));
        assert!(!tokens.contains("art"));
    }

    #[test]
    fn test_keyword_score_saturates() {
        let spec = KindSpec::new(AgentKind::blog(), ContentType::BlogPost)
            .strong(["blog", "article"])
            .weak(["write"]);

        let none = spec.keyword_score(&Tokens::new("hello there"));
        let one = spec.keyword_score(&Tokens::new("a blog"));
        let more = spec.keyword_score(&Tokens::new("write a blog article"));

        assert_eq!(none, 0.0);
        assert!((one - 0.632).abs() < 0.001);
        assert!(more > one && more < 1.0);
    }
}
