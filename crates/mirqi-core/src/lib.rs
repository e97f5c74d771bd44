//! MIRQI Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout MIRQI:
//! - Annotated report models (documents, passages, sentences, mentions)
//! - Polarity values and the ordered category registry
//! - Common error types
//! - The pattern detector contract consumed by negation resolution
//! - Configuration management

pub mod category;
pub mod config;
pub mod document;

pub use category::{CategoryRegistry, Polarity};
pub use config::{
    AppConfig, ConfigError, DetectorConfig, LoggingConfig, ResolverConfig, ScoringConfig,
};
pub use document::{
    Document, Location, Mention, MentionId, Passage, Relation, Sentence, Span, Token,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for MIRQI operations
#[derive(Error, Debug)]
pub enum MirqiError {
    #[error("Cannot process document {document_id}: {reason}")]
    DocumentResolution { document_id: String, reason: String },

    #[error(
        "Input shape mismatch: {ground_truth} ground-truth documents vs {candidate} candidate documents"
    )]
    InputShape { ground_truth: usize, candidate: usize },

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Mention {mention_id} is missing required infon '{key}'")]
    MissingInfon { mention_id: String, key: String },

    #[error("Pattern detector error: {0}")]
    Detector(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ConfigError> for MirqiError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MirqiError>;

// ============================================================================
// Pattern Detection
// ============================================================================

/// Assertion a detector rule can attach to a mention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Assertion {
    Negation,
    Uncertainty,
}

impl Assertion {
    /// Rule name, identical to the infon key carrying the flag
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Negation => document::infon::NEGATION,
            Self::Uncertainty => document::infon::UNCERTAINTY,
        }
    }
}

impl std::fmt::Display for Assertion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Assertion {
    type Err = MirqiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "negation" => Ok(Self::Negation),
            "uncertainty" => Ok(Self::Uncertainty),
            other => Err(MirqiError::Detector(format!("unknown rule name: {other}"))),
        }
    }
}

/// One match reported by a pattern detector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternHit {
    /// Which flag the rule sets
    pub rule: Assertion,
    /// The pattern (or trigger) that fired
    pub pattern: String,
    /// Document-level character span the rule covers
    pub span: Span,
}

impl PatternHit {
    pub fn new(rule: Assertion, pattern: impl Into<String>, span: Span) -> Self {
        Self {
            rule,
            pattern: pattern.into(),
            span,
        }
    }
}

/// Trait for sentence-level negation/uncertainty detectors
///
/// `mention_spans` holds the total span of every mention in the enclosing
/// passage, in passage order.
pub trait PatternDetector: Send + Sync {
    fn detect(&self, sentence: &Sentence, mention_spans: &[Span]) -> Result<Vec<PatternHit>>;
}

impl<F> PatternDetector for F
where
    F: Fn(&Sentence, &[Span]) -> Result<Vec<PatternHit>> + Send + Sync,
{
    fn detect(&self, sentence: &Sentence, mention_spans: &[Span]) -> Result<Vec<PatternHit>> {
        self(sentence, mention_spans)
    }
}

// ============================================================================
// Tests
// ============================================================================
