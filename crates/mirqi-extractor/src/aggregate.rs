//! Mention aggregation
//!
//! Collapses the resolved mentions of a report's impression passage into
//! either one polarity per category ([`CategoryVector`]) or a flat list of
//! [`LabeledEntity`] tuples consumed by the MIRQI scorer.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use mirqi_core::category::{CARDIOMEGALY, OTHER_FINDING, SUPPORT_DEVICES};
use mirqi_core::document::infon;
use mirqi_core::{CategoryRegistry, MirqiError, Polarity, Result};

use crate::annotate::{AnnotatedDocument, AnnotatedMention};

/// Mention texts that also count as an uncertain cardiomegaly vote
const HEART_FAILURE_TERMS: [&str; 2] = ["chf", "heart failure"];

/// Polarity votes per category name
pub type CategoryVotes = HashMap<String, Vec<Polarity>>;

// ============================================================================
// Output Types
// ============================================================================

/// One slot per registry category; `None` when the category is not mentioned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryVector(Vec<Option<Polarity>>);

impl CategoryVector {
    /// All slots absent
    pub fn absent(len: usize) -> Self {
        Self(vec![None; len])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Polarity> {
        self.0.get(index).copied().flatten()
    }

    /// Look a slot up by category name
    pub fn category(&self, registry: &CategoryRegistry, name: &str) -> Option<Polarity> {
        registry.index_of(name).and_then(|i| self.get(i))
    }

    pub fn slots(&self) -> &[Option<Polarity>] {
        &self.0
    }

    /// Numeric codes (1 / 0 / -1), `None` for absent slots
    pub fn codes(&self) -> Vec<Option<i8>> {
        self.0.iter().map(|slot| slot.map(|p| p.code())).collect()
    }
}

/// (mention, category, polarity, attributes) tuple for one mention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledEntity {
    pub mention: String,
    /// Category, also the key used to match entities during scoring
    pub category: String,
    pub polarity: Polarity,
    /// Attribute words joined with `/`
    #[serde(default)]
    pub attributes: String,
}

impl LabeledEntity {
    pub fn new(
        mention: impl Into<String>,
        category: impl Into<String>,
        polarity: Polarity,
        attributes: impl Into<String>,
    ) -> Self {
        Self {
            mention: mention.into(),
            category: category.into(),
            polarity,
            attributes: attributes.into(),
        }
    }

    /// Attribute tokens; empty when there are no attributes
    pub fn attribute_tokens(&self) -> Vec<&str> {
        if self.attributes.is_empty() {
            Vec::new()
        } else {
            self.attributes.split('/').collect()
        }
    }
}

// ============================================================================
// Aggregator
// ============================================================================

/// Aggregates resolved mentions into per-report labels
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    registry: CategoryRegistry,
}

impl Aggregator {
    pub fn new(registry: CategoryRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &CategoryRegistry {
        &self.registry
    }

    /// Reduce conflicting votes for one category
    ///
    /// Positive wins over anything; without a positive vote, uncertain wins
    /// over negative.
    pub fn resolve_votes(votes: &[Polarity]) -> Option<Polarity> {
        match votes {
            [] => None,
            [single] => Some(*single),
            _ => {
                let positive = votes.contains(&Polarity::Positive);
                let negative = votes.contains(&Polarity::Negative);
                let uncertain = votes.contains(&Polarity::Uncertain);

                if negative && uncertain && !positive {
                    Some(Polarity::Uncertain)
                } else if positive && (negative || uncertain) {
                    Some(Polarity::Positive)
                } else {
                    Some(votes[0])
                }
            }
        }
    }

    /// Lay the votes out over the registry order
    pub fn votes_to_vector(&self, votes: &CategoryVotes) -> CategoryVector {
        CategoryVector(
            self.registry
                .iter()
                .map(|category| {
                    votes
                        .get(category)
                        .and_then(|list| Self::resolve_votes(list))
                })
                .collect(),
        )
    }

    /// Collect the category votes of a report's impression passage
    pub fn collect_votes(&self, document: &AnnotatedDocument) -> Result<CategoryVotes> {
        let mut votes = CategoryVotes::new();
        let mut no_finding = true;

        for mention in impression_mentions(document)? {
            let category = require_category(mention)?;
            let polarity = mention.polarity();

            // Any non-device finding rules out "no finding"
            if category != SUPPORT_DEVICES && polarity.is_finding() {
                no_finding = false;
            }

            if category == OTHER_FINDING {
                continue;
            }

            if polarity.is_finding() && HEART_FAILURE_TERMS.contains(&mention.text.as_str()) {
                votes
                    .entry(CARDIOMEGALY.to_string())
                    .or_default()
                    .push(Polarity::Uncertain);
            }

            votes
                .entry(category.to_string())
                .or_default()
                .push(polarity);
        }

        if no_finding {
            votes.insert(OTHER_FINDING.to_string(), vec![Polarity::Positive]);
        }

        Ok(votes)
    }

    /// Category vector for one report
    pub fn aggregate_document(&self, document: &AnnotatedDocument) -> Result<CategoryVector> {
        let votes = self.collect_votes(document)?;
        Ok(self.votes_to_vector(&votes))
    }

    /// Category vectors for a collection, in input order
    pub fn aggregate(&self, documents: &[AnnotatedDocument]) -> Result<Vec<CategoryVector>> {
        documents
            .iter()
            .map(|document| self.aggregate_document(document))
            .collect()
    }

    /// One entity tuple per impression mention, in mention order
    pub fn attribute_output_document(
        &self,
        document: &AnnotatedDocument,
    ) -> Result<Vec<LabeledEntity>> {
        impression_mentions(document)?
            .iter()
            .map(|mention| -> Result<LabeledEntity> {
                Ok(LabeledEntity {
                    mention: mention.term.clone(),
                    category: require_category(mention)?.to_string(),
                    polarity: mention.polarity(),
                    attributes: mention.attribute_string(),
                })
            })
            .collect()
    }

    /// Entity tuples for a collection, in input order
    pub fn attribute_output(
        &self,
        documents: &[AnnotatedDocument],
    ) -> Result<Vec<Vec<LabeledEntity>>> {
        documents
            .iter()
            .map(|document| self.attribute_output_document(document))
            .collect()
    }
}

fn impression_mentions(document: &AnnotatedDocument) -> Result<&[AnnotatedMention]> {
    document
        .impression()
        .map(|passage| passage.mentions.as_slice())
        .ok_or_else(|| {
            MirqiError::InvalidDocument(format!("document {} has no passages", document.id))
        })
}

fn require_category(mention: &AnnotatedMention) -> Result<&str> {
    mention
        .category
        .as_deref()
        .ok_or_else(|| MirqiError::MissingInfon {
            mention_id: mention.mention_id.clone(),
            key: infon::OBSERVATION.to_string(),
        })
}

// ============================================================================
// Tests
// ============================================================================
