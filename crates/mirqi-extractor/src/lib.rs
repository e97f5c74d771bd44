//! MIRQI Extractor - Finding labeling and report scoring pipeline
//!
//! Turns already-parsed, already-phrase-matched radiology reports into
//! structured findings and scores two sets of findings against each other:
//! - [`resolver`]: negation/uncertainty flags and attribute-word binding
//! - [`aggregate`]: per-report category vectors and entity tuples
//! - [`metrics`]: the MIRQI recall/precision/F1 metric

pub mod aggregate;
pub mod annotate;
pub mod detector;
pub mod metrics;
pub mod pipeline;
pub mod resolver;

pub use aggregate::{Aggregator, CategoryVector, CategoryVotes, LabeledEntity};
pub use annotate::{AnnotatedDocument, AnnotatedMention, DocumentAnnotator};
pub use detector::PhraseDetector;
pub use metrics::{DocumentScore, MirqiScorer, MirqiScores, ScoreSummary};
pub use pipeline::{LabeledReport, Labeler};
pub use resolver::{NegationResolver, Resolution};
