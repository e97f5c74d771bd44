//! Annotated report model
//!
//! Documents arrive already split into passages and sentences, with
//! dependency parses attached to each sentence and observation mentions
//! attached to each passage. The JSON layout follows BioC conventions:
//! mentions carry an `infons` property map and one or more `locations`.
//!
//! All offsets are character offsets into the original report text.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{MirqiError, Result};

/// Infon keys read from mention property maps
pub mod infon {
    /// Matching key (UMLS concept id)
    pub const CONCEPT_ID: &str = "CUI";
    /// Observation category label
    pub const OBSERVATION: &str = "observation";
    /// Canonical phrase-dictionary term
    pub const TERM: &str = "term";
    /// Pre-seeded attribute string
    pub const ATTRIBUTES: &str = "attributes";
    /// Negation flag (presence means set)
    pub const NEGATION: &str = "negation";
    /// Uncertainty flag (presence means set)
    pub const UNCERTAINTY: &str = "uncertainty";
}

// ============================================================================
// Offsets
// ============================================================================

/// A single (offset, length) location of a mention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub offset: usize,
    pub length: usize,
}

impl Location {
    pub fn new(offset: usize, length: usize) -> Self {
        Self { offset, length }
    }

    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}

/// Half-open character interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Strict containment: both endpoints of `other` lie within `self`
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Offset test that treats the end boundary as inside
    pub fn contains_offset_inclusive(&self, offset: usize) -> bool {
        self.start <= offset && offset <= self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Sentences
// ============================================================================

/// A parsed token inside a sentence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    pub text: String,
    /// Part-of-speech tag
    #[serde(default)]
    pub tag: String,
}

impl Token {
    pub fn new(id: impl Into<String>, text: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            tag: tag.into(),
        }
    }
}

/// A typed dependency between two tokens of the same sentence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    /// Dependency label (e.g. `amod`, `nmod:within`)
    pub dependency: String,
    /// Token ids of the two endpoints, governor first
    pub nodes: [String; 2],
}

impl Relation {
    pub fn new(
        dependency: impl Into<String>,
        governor: impl Into<String>,
        dependent: impl Into<String>,
    ) -> Self {
        Self {
            dependency: dependency.into(),
            nodes: [governor.into(), dependent.into()],
        }
    }
}

/// A sentence with its tokens and dependency relations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    pub offset: usize,
    pub text: String,
    #[serde(default)]
    pub tokens: Vec<Token>,
    #[serde(default)]
    pub relations: Vec<Relation>,
}

impl Sentence {
    /// Create a sentence without parse information
    pub fn new(offset: usize, text: impl Into<String>) -> Self {
        Self {
            offset,
            text: text.into(),
            tokens: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn with_tokens(mut self, tokens: Vec<Token>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_relations(mut self, relations: Vec<Relation>) -> Self {
        self.relations = relations;
        self
    }

    /// Length in characters
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn span(&self) -> Span {
        Span::new(self.offset, self.offset + self.char_len())
    }

    pub fn token(&self, id: &str) -> Option<&Token> {
        self.tokens.iter().find(|t| t.id == id)
    }

    /// Check that every relation endpoint names a token of this sentence
    pub fn validate(&self) -> Result<()> {
        let ids: HashSet<&str> = self.tokens.iter().map(|t| t.id.as_str()).collect();
        for relation in &self.relations {
            for node in &relation.nodes {
                if !ids.contains(node.as_str()) {
                    return Err(MirqiError::InvalidDocument(format!(
                        "relation '{}' at sentence offset {} references unknown token '{}'",
                        relation.dependency, self.offset, node
                    )));
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Mentions
// ============================================================================

/// Stable address of a mention inside its document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MentionId {
    pub passage: usize,
    pub index: usize,
}

impl MentionId {
    pub fn new(passage: usize, index: usize) -> Self {
        Self { passage, index }
    }
}

impl std::fmt::Display for MentionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.passage, self.index)
    }
}

/// An observation mention found by the upstream phrase matcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub id: String,
    pub text: String,
    pub locations: Vec<Location>,
    #[serde(default)]
    pub infons: BTreeMap<String, String>,
}

impl Mention {
    pub fn new(id: impl Into<String>, text: impl Into<String>, location: Location) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            locations: vec![location],
            infons: BTreeMap::new(),
        }
    }

    /// Add an infon
    pub fn with_infon(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.infons.insert(key.into(), value.into());
        self
    }

    /// Set the observation category
    pub fn with_category(self, category: impl Into<String>) -> Self {
        self.with_infon(infon::OBSERVATION, category)
    }

    /// Set the concept id used as matching key
    pub fn with_concept(self, concept_id: impl Into<String>) -> Self {
        self.with_infon(infon::CONCEPT_ID, concept_id)
    }

    pub fn add_location(mut self, location: Location) -> Self {
        self.locations.push(location);
        self
    }

    pub fn infon(&self, key: &str) -> Option<&str> {
        self.infons.get(key).map(String::as_str)
    }

    pub fn concept_id(&self) -> Option<&str> {
        self.infon(infon::CONCEPT_ID)
    }

    pub fn category(&self) -> Option<&str> {
        self.infon(infon::OBSERVATION)
    }

    /// Dictionary term, falling back to the surface text
    pub fn term(&self) -> &str {
        self.infon(infon::TERM).unwrap_or(&self.text)
    }

    /// Smallest span covering every location
    pub fn total_span(&self) -> Option<Span> {
        let start = self.locations.iter().map(|l| l.offset).min()?;
        let end = self.locations.iter().map(Location::end).max()?;
        Some(Span::new(start, end))
    }

    /// Total span, or an error for a mention without locations
    pub fn require_span(&self) -> Result<Span> {
        self.total_span().ok_or_else(|| {
            MirqiError::InvalidDocument(format!("mention {} has no locations", self.id))
        })
    }
}

// ============================================================================
// Passages and Documents
// ============================================================================

/// A report section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    #[serde(default)]
    pub offset: usize,
    /// Section text; empty when only sentences were supplied
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub sentences: Vec<Sentence>,
    #[serde(default)]
    pub mentions: Vec<Mention>,
}

impl Passage {
    pub fn new(offset: usize) -> Self {
        Self {
            offset,
            ..Default::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_sentence(mut self, sentence: Sentence) -> Self {
        self.sentences.push(sentence);
        self
    }

    pub fn with_mention(mut self, mention: Mention) -> Self {
        self.mentions.push(mention);
        self
    }

    /// Check sentence relations, then mention bounds against the passage
    /// text (when present)
    pub fn validate(&self) -> Result<()> {
        for sentence in &self.sentences {
            sentence.validate()?;
        }
        if self.text.is_empty() {
            return Ok(());
        }
        let bounds = Span::new(self.offset, self.offset + self.text.chars().count());
        for mention in &self.mentions {
            let span = mention.require_span()?;
            if !bounds.contains(&span) {
                return Err(MirqiError::InvalidDocument(format!(
                    "mention {} at {}..{} lies outside passage {}..{}",
                    mention.id, span.start, span.end, bounds.start, bounds.end
                )));
            }
        }
        Ok(())
    }
}

/// An annotated report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub passages: Vec<Passage>,
}

impl Document {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            passages: Vec::new(),
        }
    }

    pub fn with_passage(mut self, passage: Passage) -> Self {
        self.passages.push(passage);
        self
    }

    /// The impression section used for labeling
    pub fn impression(&self) -> Option<&Passage> {
        self.passages.first()
    }

    pub fn mention(&self, id: MentionId) -> Option<&Mention> {
        self.passages.get(id.passage)?.mentions.get(id.index)
    }

    /// Validate every passage
    pub fn validate(&self) -> Result<()> {
        self.passages.iter().try_for_each(Passage::validate)
    }

    /// All mention ids in passage order
    pub fn mention_ids(&self) -> impl Iterator<Item = MentionId> + '_ {
        self.passages
            .iter()
            .enumerate()
            .flat_map(|(p, passage)| (0..passage.mentions.len()).map(move |i| MentionId::new(p, i)))
    }
}

// ============================================================================
// Tests
// ============================================================================
