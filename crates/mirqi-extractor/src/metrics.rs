//! MIRQI scoring
//!
//! Medical Image Reporting Quality Index: compares a candidate report's
//! labeled entities against the ground-truth report's entities and yields
//! recall (MIRQI-r), precision (MIRQI-p) and F1 (MIRQI-f) per report.
//!
//! Each candidate entity is linked to the *first* ground-truth entity with
//! the same category, scanning ground truth in order. Linking is therefore
//! order dependent when a report repeats a category; this keeps scores
//! reproducible.

use serde::{Deserialize, Serialize};

use mirqi_core::{MirqiError, Polarity, Result, ScoringConfig};

use crate::aggregate::LabeledEntity;

/// Denominator offset used by every ratio
const EPSILON: f64 = 1e-6;

// ============================================================================
// Scores
// ============================================================================

/// MIRQI result for one report pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentScore {
    /// MIRQI-r
    pub recall: f64,
    /// MIRQI-p
    pub precision: f64,
    /// MIRQI-f
    pub f1: f64,
    /// True-positive credit (keyword plus partial attribute credit)
    pub true_positives: f64,
    pub false_positives: f64,
    pub true_negatives: f64,
    pub false_negatives: f64,
    /// Ground-truth entities that are positive or uncertain
    pub gt_positive: usize,
    /// Candidate entities that are positive or uncertain
    pub cand_positive: usize,
}

/// Per-report MIRQI results for a collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MirqiScores {
    pub documents: Vec<DocumentScore>,
}

impl MirqiScores {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn recall(&self) -> Vec<f64> {
        self.documents.iter().map(|d| d.recall).collect()
    }

    pub fn precision(&self) -> Vec<f64> {
        self.documents.iter().map(|d| d.precision).collect()
    }

    pub fn f1(&self) -> Vec<f64> {
        self.documents.iter().map(|d| d.f1).collect()
    }

    /// Mean scores over all reports
    pub fn summary(&self) -> ScoreSummary {
        let n = self.documents.len();
        if n == 0 {
            return ScoreSummary::default();
        }

        let mean = |f: fn(&DocumentScore) -> f64| self.documents.iter().map(f).sum::<f64>() / n as f64;
        ScoreSummary {
            num_documents: n,
            mean_recall: mean(|d| d.recall),
            mean_precision: mean(|d| d.precision),
            mean_f1: mean(|d| d.f1),
        }
    }

    /// Print a summary report
    pub fn report(&self) -> String {
        let summary = self.summary();
        let mut out = format!(
            "=== MIRQI Report ===\n\n\
             Reports scored: {}\n\n\
             Mean MIRQI-r: {:.3}\n\
             Mean MIRQI-p: {:.3}\n\
             Mean MIRQI-f: {:.3}\n",
            summary.num_documents, summary.mean_recall, summary.mean_precision, summary.mean_f1,
        );

        if !self.documents.is_empty() {
            out.push_str("\n  #   recall  precision     f1\n");
            for (i, d) in self.documents.iter().enumerate() {
                out.push_str(&format!(
                    "{:>3}   {:.3}     {:.3}    {:.3}\n",
                    i, d.recall, d.precision, d.f1
                ));
            }
        }

        out
    }
}

/// Mean MIRQI scores
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub num_documents: usize,
    pub mean_recall: f64,
    pub mean_precision: f64,
    pub mean_f1: f64,
}

// ============================================================================
// Scorer
// ============================================================================

/// MIRQI scorer
#[derive(Debug, Clone, Copy)]
pub struct MirqiScorer {
    /// Weight of the positive/uncertain part when negatives also matched
    pos_weight: f64,
    /// Share of a true positive earned through attributes
    attribute_weight: f64,
}

impl MirqiScorer {
    /// Create a scorer with the default weights (0.8 / 0.3)
    pub fn new() -> Self {
        let defaults = ScoringConfig::default();
        Self {
            pos_weight: defaults.pos_weight,
            attribute_weight: defaults.attribute_weight,
        }
    }

    /// Weights outside [0, 1] are rejected
    pub fn from_config(config: &ScoringConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            pos_weight: config.pos_weight,
            attribute_weight: config.attribute_weight,
        })
    }

    pub fn with_pos_weight(self, weight: f64) -> Result<Self> {
        Self::from_config(&ScoringConfig {
            pos_weight: weight,
            attribute_weight: self.attribute_weight,
        })
    }

    pub fn with_attribute_weight(self, weight: f64) -> Result<Self> {
        Self::from_config(&ScoringConfig {
            pos_weight: self.pos_weight,
            attribute_weight: weight,
        })
    }

    /// Score report pairs; both collections must have the same length
    pub fn score(
        &self,
        ground_truth: &[Vec<LabeledEntity>],
        candidates: &[Vec<LabeledEntity>],
    ) -> Result<MirqiScores> {
        if ground_truth.len() != candidates.len() {
            return Err(MirqiError::InputShape {
                ground_truth: ground_truth.len(),
                candidate: candidates.len(),
            });
        }

        Ok(MirqiScores {
            documents: ground_truth
                .iter()
                .zip(candidates)
                .map(|(gt, cand)| self.score_document(gt, cand))
                .collect(),
        })
    }

    /// Score a single report pair
    pub fn score_document(&self, gt: &[LabeledEntity], cand: &[LabeledEntity]) -> DocumentScore {
        let mut score = DocumentScore {
            gt_positive: gt.iter().filter(|e| e.polarity.is_finding()).count(),
            ..Default::default()
        };

        for entity in cand {
            let linked = gt.iter().find(|g| g.category == entity.category);

            if entity.polarity == Polarity::Negative {
                match linked {
                    Some(g) if g.polarity == Polarity::Negative => score.true_negatives += 1.0,
                    Some(_) => score.false_negatives += 1.0,
                    None => {}
                }
            } else {
                score.cand_positive += 1;
                match linked {
                    Some(g) if g.polarity == Polarity::Negative => score.false_positives += 1.0,
                    Some(g) => {
                        score.true_positives +=
                            1.0 - self.attribute_weight + self.attribute_credit(g, entity)
                    }
                    None => {}
                }
            }
        }

        // Positive/uncertain findings
        let (mut recall, mut precision) = match (score.gt_positive, score.cand_positive) {
            (0, 0) => (1.0, 1.0),
            (0, _) | (_, 0) => (0.0, 0.0),
            _ => (
                score.true_positives / (score.true_positives + score.false_negatives + EPSILON),
                score.true_positives / (score.true_positives + score.false_positives + EPSILON),
            ),
        };

        // Blend in negative findings when any were matched
        if score.true_negatives != 0.0 {
            let tn = score.true_negatives;
            recall = recall * self.pos_weight
                + tn / (tn + score.false_positives + EPSILON) * (1.0 - self.pos_weight);
            precision = precision * self.pos_weight
                + tn / (tn + score.false_negatives + EPSILON) * (1.0 - self.pos_weight);
        }

        score.recall = recall;
        score.precision = precision;
        score.f1 = if recall + precision != 0.0 {
            2.0 * recall * precision / (recall + precision)
        } else {
            0.0
        };
        score
    }

    /// Partial credit for ground-truth attribute tokens found in the candidate
    fn attribute_credit(&self, gt: &LabeledEntity, cand: &LabeledEntity) -> f64 {
        let tokens = gt.attribute_tokens();
        if tokens.is_empty() {
            return 0.0;
        }

        let hits = tokens
            .iter()
            .filter(|token| cand.attributes.contains(*token))
            .count();
        hits as f64 / tokens.len() as f64 * self.attribute_weight
    }
}

impl Default for MirqiScorer {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
