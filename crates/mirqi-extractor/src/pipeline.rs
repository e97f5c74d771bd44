//! Labeling pipeline
//!
//! Wires resolver, detector and aggregator together for a collection of
//! annotated reports, the way the CLI runs them.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use mirqi_core::{AppConfig, Document, PatternDetector, Result};

use crate::aggregate::{Aggregator, LabeledEntity};
use crate::detector::PhraseDetector;
use crate::resolver::{NegationResolver, Resolution};

/// Labels produced for one report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledReport {
    pub document_id: String,
    pub entities: Vec<LabeledEntity>,
    /// Category codes (1 / 0 / -1 / null), when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<Option<i8>>>,
    /// Resolution error kept for this report, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Resolver + detector + aggregator
pub struct Labeler {
    resolver: NegationResolver,
    detector: Box<dyn PatternDetector>,
    aggregator: Aggregator,
}

impl Labeler {
    pub fn new(
        resolver: NegationResolver,
        detector: Box<dyn PatternDetector>,
        aggregator: Aggregator,
    ) -> Self {
        Self {
            resolver,
            detector,
            aggregator,
        }
    }

    /// Build with the built-in phrase detector
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self::new(
            NegationResolver::new(config.resolver.clone())?,
            Box::new(PhraseDetector::new(&config.detector)?),
            Aggregator::new(config.categories.clone()),
        ))
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Resolve every report of a collection
    pub fn resolve(&self, documents: &[Document]) -> Vec<Resolution> {
        self.resolver
            .resolve_collection(documents, self.detector.as_ref())
    }

    /// Entity tuples per report, in input order
    pub fn entities(&self, documents: &[Document]) -> Result<Vec<Vec<LabeledEntity>>> {
        let snapshots: Vec<_> = self
            .resolve(documents)
            .into_iter()
            .map(|resolution| resolution.document)
            .collect();
        self.aggregator.attribute_output(&snapshots)
    }

    /// Full labels per report
    pub fn label(&self, documents: &[Document], with_vectors: bool) -> Result<Vec<LabeledReport>> {
        let reports = self
            .resolve(documents)
            .into_iter()
            .map(|resolution| -> Result<LabeledReport> {
                let error = resolution.error().map(ToString::to_string);
                let snapshot = resolution.document;
                let vector = if with_vectors {
                    Some(self.aggregator.aggregate_document(&snapshot)?.codes())
                } else {
                    None
                };

                Ok(LabeledReport {
                    entities: self.aggregator.attribute_output_document(&snapshot)?,
                    document_id: snapshot.id,
                    vector,
                    error,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let failed = reports.iter().filter(|r| r.error.is_some()).count();
        if failed > 0 {
            warn!("{} of {} report(s) were only partially resolved", failed, reports.len());
        }
        info!("Labeled {} report(s)", reports.len());

        Ok(reports)
    }
}
