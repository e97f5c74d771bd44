//! Mention annotation builder and snapshot
//!
//! Resolution never touches the input [`Document`]. Instead a
//! [`DocumentAnnotator`] collects per-mention flags and attribute words
//! keyed by [`MentionId`], and `finish` freezes them into an
//! [`AnnotatedDocument`] that aggregation reads.

use serde::{Deserialize, Serialize};

use mirqi_core::document::infon;
use mirqi_core::{Assertion, Document, MentionId, Polarity, Span};

// ============================================================================
// Builder
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct MentionState {
    negated: bool,
    uncertain: bool,
    attributes: Vec<String>,
}

/// Mutable resolution state for one document
#[derive(Debug)]
pub struct DocumentAnnotator<'a> {
    document: &'a Document,
    states: Vec<Vec<MentionState>>,
}

impl<'a> DocumentAnnotator<'a> {
    /// Start from the flags and attributes already present in the infons
    pub fn new(document: &'a Document) -> Self {
        let states = document
            .passages
            .iter()
            .map(|passage| {
                passage
                    .mentions
                    .iter()
                    .map(|mention| MentionState {
                        negated: mention.infons.contains_key(infon::NEGATION),
                        uncertain: mention.infons.contains_key(infon::UNCERTAINTY),
                        attributes: mention
                            .infon(infon::ATTRIBUTES)
                            .map(split_attributes)
                            .unwrap_or_default(),
                    })
                    .collect()
            })
            .collect();

        Self { document, states }
    }

    pub fn document(&self) -> &'a Document {
        self.document
    }

    /// Set a flag on one mention
    pub fn mark(&mut self, id: MentionId, assertion: Assertion) {
        if let Some(state) = self.state_mut(id) {
            match assertion {
                Assertion::Negation => state.negated = true,
                Assertion::Uncertainty => state.uncertain = true,
            }
        }
    }

    /// Set a flag on every mention of a passage whose total span lies
    /// inside `span`; returns how many mentions were marked
    pub fn mark_within(&mut self, passage: usize, span: Span, assertion: Assertion) -> usize {
        let Some(source) = self.document.passages.get(passage) else {
            return 0;
        };

        let inside: Vec<MentionId> = source
            .mentions
            .iter()
            .enumerate()
            .filter(|(_, mention)| {
                mention
                    .total_span()
                    .map(|s| span.contains(&s))
                    .unwrap_or(false)
            })
            .map(|(index, _)| MentionId::new(passage, index))
            .collect();

        for id in &inside {
            self.mark(*id, assertion);
        }
        inside.len()
    }

    /// Append attribute words; empty words are dropped
    pub fn push_attributes<I>(&mut self, id: MentionId, words: I)
    where
        I: IntoIterator<Item = String>,
    {
        if let Some(state) = self.state_mut(id) {
            state
                .attributes
                .extend(words.into_iter().filter(|w| !w.is_empty()));
        }
    }

    pub fn is_negated(&self, id: MentionId) -> bool {
        self.state(id).map(|s| s.negated).unwrap_or(false)
    }

    pub fn is_uncertain(&self, id: MentionId) -> bool {
        self.state(id).map(|s| s.uncertain).unwrap_or(false)
    }

    pub fn attributes(&self, id: MentionId) -> &[String] {
        self.state(id).map(|s| s.attributes.as_slice()).unwrap_or(&[])
    }

    /// Freeze into an immutable snapshot
    pub fn finish(self) -> AnnotatedDocument {
        let passages = self
            .document
            .passages
            .iter()
            .zip(self.states)
            .enumerate()
            .map(|(p, (passage, states))| AnnotatedPassage {
                mentions: passage
                    .mentions
                    .iter()
                    .zip(states)
                    .enumerate()
                    .map(|(i, (mention, state))| AnnotatedMention {
                        id: MentionId::new(p, i),
                        mention_id: mention.id.clone(),
                        text: mention.text.clone(),
                        term: mention.term().to_string(),
                        category: mention.category().map(str::to_string),
                        concept_id: mention.concept_id().map(str::to_string),
                        negated: state.negated,
                        uncertain: state.uncertain,
                        attributes: state.attributes,
                    })
                    .collect(),
            })
            .collect();

        AnnotatedDocument {
            id: self.document.id.clone(),
            passages,
        }
    }

    fn state(&self, id: MentionId) -> Option<&MentionState> {
        self.states.get(id.passage)?.get(id.index)
    }

    fn state_mut(&mut self, id: MentionId) -> Option<&mut MentionState> {
        self.states.get_mut(id.passage)?.get_mut(id.index)
    }
}

fn split_attributes(value: &str) -> Vec<String> {
    value
        .split('/')
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

// ============================================================================
// Snapshot
// ============================================================================

/// A mention with its resolved flags and attribute words
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedMention {
    pub id: MentionId,
    /// Upstream mention identifier
    pub mention_id: String,
    /// Surface text
    pub text: String,
    /// Dictionary term (surface text when none was given)
    pub term: String,
    pub category: Option<String>,
    pub concept_id: Option<String>,
    pub negated: bool,
    pub uncertain: bool,
    pub attributes: Vec<String>,
}

impl AnnotatedMention {
    pub fn polarity(&self) -> Polarity {
        Polarity::from_flags(self.negated, self.uncertain)
    }

    /// Attribute words joined with `/`
    pub fn attribute_string(&self) -> String {
        self.attributes.join("/")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedPassage {
    pub mentions: Vec<AnnotatedMention>,
}

/// Immutable result of resolving one document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedDocument {
    pub id: String,
    pub passages: Vec<AnnotatedPassage>,
}

impl AnnotatedDocument {
    /// Snapshot a document as-is, without resolution
    pub fn from_document(document: &Document) -> Self {
        DocumentAnnotator::new(document).finish()
    }

    pub fn impression(&self) -> Option<&AnnotatedPassage> {
        self.passages.first()
    }

    pub fn mention(&self, id: MentionId) -> Option<&AnnotatedMention> {
        self.passages.get(id.passage)?.mentions.get(id.index)
    }
}

// ============================================================================
// Tests
// ============================================================================
