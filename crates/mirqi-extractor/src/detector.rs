//! Rule-based phrase detector
//!
//! A lightweight negation/uncertainty detector driven by trigger phrases.
//! Each trigger opens a scope that runs to the end of the sentence or to
//! the first scope terminator after it ("but", "however", ...). A hit is
//! reported only when some mention lies entirely inside the scope.

use regex::{Regex, RegexBuilder};

use mirqi_core::{
    Assertion, DetectorConfig, MirqiError, PatternDetector, PatternHit, Result, Sentence, Span,
};

/// Trigger-phrase implementation of [`PatternDetector`]
pub struct PhraseDetector {
    /// (regex, assertion, phrase)
    triggers: Vec<(Regex, Assertion, String)>,
    terminators: Vec<Regex>,
}

impl PhraseDetector {
    /// Compile the configured trigger phrases
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        let mut triggers = Vec::new();
        for phrase in &config.negation_triggers {
            triggers.push((compile_phrase(phrase)?, Assertion::Negation, phrase.clone()));
        }
        for phrase in &config.uncertainty_triggers {
            triggers.push((compile_phrase(phrase)?, Assertion::Uncertainty, phrase.clone()));
        }

        let terminators = config
            .scope_terminators
            .iter()
            .map(|phrase| compile_phrase(phrase))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            triggers,
            terminators,
        })
    }

    /// Byte offset where a scope opened at `from` closes
    fn scope_end(&self, text: &str, from: usize) -> usize {
        self.terminators
            .iter()
            .filter_map(|t| t.find_at(text, from).map(|m| m.start()))
            .min()
            .unwrap_or(text.len())
    }
}

impl PatternDetector for PhraseDetector {
    fn detect(&self, sentence: &Sentence, mention_spans: &[Span]) -> Result<Vec<PatternHit>> {
        let text = sentence.text.as_str();
        let mut hits = Vec::new();

        for (regex, assertion, phrase) in &self.triggers {
            for found in regex.find_iter(text) {
                let end = self.scope_end(text, found.end());
                let span = Span::new(
                    sentence.offset + char_offset(text, found.start()),
                    sentence.offset + char_offset(text, end),
                );

                if mention_spans.iter().any(|m| span.contains(m)) {
                    hits.push(PatternHit::new(*assertion, phrase.clone(), span));
                }
            }
        }

        Ok(hits)
    }
}

/// Case-insensitive, word-bounded regex for a literal phrase
fn compile_phrase(phrase: &str) -> Result<Regex> {
    let trimmed = phrase.trim();
    if trimmed.is_empty() {
        return Err(MirqiError::Config("empty detector phrase".to_string()));
    }

    let is_word = |c: Option<char>| c.map(|c| c.is_alphanumeric() || c == '_').unwrap_or(false);
    let mut pattern = String::new();
    if is_word(trimmed.chars().next()) {
        pattern.push_str(r"\b");
    }
    pattern.push_str(&regex::escape(trimmed));
    if is_word(trimmed.chars().last()) {
        pattern.push_str(r"\b");
    }

    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| MirqiError::Config(format!("invalid detector phrase '{phrase}': {e}")))
}

/// Convert a byte offset into a character offset
fn char_offset(text: &str, byte: usize) -> usize {
    text[..byte].chars().count()
}
