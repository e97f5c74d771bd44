//! Negation/uncertainty resolution and attribute binding
//!
//! Two passes run over each document:
//! - `detect` sets negation/uncertainty flags from concept codes, the
//!   "Findings: no ..." sentence override, and a [`PatternDetector`]
//! - `extract_attributes` binds modifier words to each mention by walking
//!   the sentence dependency relations
//!
//! A failure in one document never stops the rest of a collection; the
//! partially resolved snapshot is kept next to the captured error.

use std::collections::HashSet;

use regex::{Regex, RegexBuilder};
use tracing::{debug, info, warn};

use mirqi_core::{
    Assertion, Document, Mention, MentionId, MirqiError, PatternDetector, ResolverConfig, Result,
    Sentence, Span,
};

use crate::annotate::{AnnotatedDocument, DocumentAnnotator};

// ============================================================================
// Resolution Outcome
// ============================================================================

/// Result of resolving one document
#[derive(Debug)]
pub struct Resolution {
    /// Resolved (possibly partially) snapshot
    pub document: AnnotatedDocument,
    /// `Err` when a pass failed for this document
    pub outcome: Result<()>,
}

impl Resolution {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn error(&self) -> Option<&MirqiError> {
        self.outcome.as_ref().err()
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Marks mentions as negated/uncertain and binds their attribute words
pub struct NegationResolver {
    config: ResolverConfig,
    negative_sentence: Regex,
    attribute_dependencies: HashSet<String>,
    excluded_tags: HashSet<String>,
}

impl NegationResolver {
    pub fn new(config: ResolverConfig) -> Result<Self> {
        let negative_sentence = RegexBuilder::new(&config.negative_sentence_pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| {
                MirqiError::Config(format!(
                    "invalid negative sentence pattern '{}': {e}",
                    config.negative_sentence_pattern
                ))
            })?;

        Ok(Self {
            attribute_dependencies: config.attribute_dependencies.iter().cloned().collect(),
            excluded_tags: config.excluded_tags.iter().cloned().collect(),
            negative_sentence,
            config,
        })
    }

    /// Whether a sentence negates everything it contains
    pub fn is_negative_sentence(&self, text: &str) -> bool {
        self.negative_sentence.is_match(text)
    }

    /// Set negation/uncertainty flags for every passage of the document
    pub fn detect(
        &self,
        annotator: &mut DocumentAnnotator<'_>,
        detector: &dyn PatternDetector,
    ) -> Result<()> {
        let document = annotator.document();

        for (p, passage) in document.passages.iter().enumerate() {
            self.mark_concepts(annotator, p, &passage.mentions);

            let spans = passage
                .mentions
                .iter()
                .map(Mention::require_span)
                .collect::<Result<Vec<Span>>>()?;

            for sentence in &passage.sentences {
                if self.is_negative_sentence(&sentence.text) {
                    let marked =
                        annotator.mark_within(p, sentence.span(), Assertion::Negation);
                    debug!(
                        "Negative sentence at {} negated {} mention(s)",
                        sentence.offset, marked
                    );
                    continue;
                }

                for hit in detector.detect(sentence, &spans)? {
                    debug!("Find: {}, {}, {:?}", hit.rule, hit.pattern, hit.span);
                    annotator.mark_within(p, hit.span, hit.rule);
                }
            }
        }

        Ok(())
    }

    /// Concept codes that carry their own assertion
    fn mark_concepts(&self, annotator: &mut DocumentAnnotator<'_>, passage: usize, mentions: &[Mention]) {
        for (index, mention) in mentions.iter().enumerate() {
            let Some(concept) = mention.concept_id() else {
                continue;
            };
            let id = MentionId::new(passage, index);
            if concept == self.config.negative_concept {
                annotator.mark(id, Assertion::Negation);
            }
            if concept == self.config.uncertain_concept {
                annotator.mark(id, Assertion::Uncertainty);
            }
        }
    }

    /// Bind attribute words to every mention through dependency relations
    ///
    /// Relation endpoints that name no token of the sentence never match.
    pub fn extract_attributes(&self, annotator: &mut DocumentAnnotator<'_>) {
        let document = annotator.document();

        for (p, passage) in document.passages.iter().enumerate() {
            for (index, mention) in passage.mentions.iter().enumerate() {
                let id = MentionId::new(p, index);

                for sentence in &passage.sentences {
                    let bounds = sentence.span();
                    let in_range = mention
                        .locations
                        .iter()
                        .any(|loc| bounds.contains_offset_inclusive(loc.offset));
                    if !in_range {
                        continue;
                    }

                    let words = self.attribute_words(mention, sentence);
                    if !words.is_empty() {
                        debug!("Mention {} ({}) attributes: {:?}", id, mention.text, words);
                        annotator.push_attributes(id, words);
                    }
                }
            }
        }
    }

    /// Words linked to the mention by an allowed dependency, in sentence order
    fn attribute_words(&self, mention: &Mention, sentence: &Sentence) -> Vec<String> {
        let term = mention.text.as_str();

        // Tokens that make up the mention itself
        let local: HashSet<&str> = sentence
            .tokens
            .iter()
            .filter(|t| term.contains(t.text.as_str()) || t.text.contains(term))
            .map(|t| t.id.as_str())
            .collect();

        let mut linked: HashSet<&str> = HashSet::new();
        for relation in sentence
            .relations
            .iter()
            .filter(|r| self.attribute_dependencies.contains(&r.dependency))
        {
            let [first, second] = &relation.nodes;
            match (local.contains(first.as_str()), local.contains(second.as_str())) {
                (true, false) => {
                    linked.insert(second.as_str());
                }
                (false, true) => {
                    linked.insert(first.as_str());
                }
                _ => {}
            }
        }

        sentence
            .tokens
            .iter()
            .filter(|t| linked.contains(t.id.as_str()) && !self.excluded_tags.contains(&t.tag))
            .map(|t| t.text.clone())
            .collect()
    }

    /// Run both passes on one document
    ///
    /// An invalid document (dangling relation endpoint, mention outside its
    /// passage) fails before either pass touches it.
    pub fn resolve(&self, document: &Document, detector: &dyn PatternDetector) -> Resolution {
        let mut annotator = DocumentAnnotator::new(document);

        let outcome = document.validate().and_then(|()| {
            // Attribute binding runs even when detection failed
            let detected = self.detect(&mut annotator, detector);
            self.extract_attributes(&mut annotator);
            detected
        });

        let outcome = outcome.map_err(|e| {
            warn!("Cannot process {}: {}", document.id, e);
            MirqiError::DocumentResolution {
                document_id: document.id.clone(),
                reason: e.to_string(),
            }
        });

        Resolution {
            document: annotator.finish(),
            outcome,
        }
    }

    /// Resolve a collection; one [`Resolution`] per input, in input order
    pub fn resolve_collection(
        &self,
        documents: &[Document],
        detector: &dyn PatternDetector,
    ) -> Vec<Resolution> {
        let resolutions: Vec<Resolution> = documents
            .iter()
            .map(|document| self.resolve(document, detector))
            .collect();

        let failed = resolutions.iter().filter(|r| !r.is_ok()).count();
        info!(
            "Resolved {} document(s), {} with errors",
            resolutions.len(),
            failed
        );

        resolutions
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use mirqi_core::{Location, Passage, PatternHit, Polarity, Relation, Token};

    fn resolver() -> NegationResolver {
        NegationResolver::new(ResolverConfig::default()).unwrap()
    }

    fn no_hits(_: &Sentence, _: &[Span]) -> Result<Vec<PatternHit>> {
        Ok(Vec::new())
    }

    fn polarity_of(resolution: &Resolution, index: usize) -> Polarity {
        resolution
            .document
            .mention(MentionId::new(0, index))
            .unwrap()
            .polarity()
    }

    #[test]
    fn test_negative_sentence_pattern() {
        let resolver = resolver();
        assert!(resolver.is_negative_sentence("Findings: no acute disease."));
        assert!(resolver.is_negative_sentence("IMPRESSION: No pneumothorax."));
        assert!(!resolver.is_negative_sentence("Findings: normal. No effusion."));
        assert!(!resolver.is_negative_sentence("findings: none"));
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let config = ResolverConfig {
            negative_sentence_pattern: "(unclosed".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            NegationResolver::new(config),
            Err(MirqiError::Config(_))
        ));
    }

    #[test]
    fn test_negative_sentence_bypasses_detector() {
        // "Findings: no acute disease. Edema present."
        let doc = Document::new("r1").with_passage(
            Passage::new(0)
                .with_sentence(Sentence::new(0, "Findings: no acute disease."))
                .with_sentence(Sentence::new(28, "Edema present."))
                .with_mention(
                    Mention::new("m0", "disease", Location::new(19, 7)).with_category("Other Finding"),
                )
                .with_mention(Mention::new("m1", "Edema", Location::new(28, 5)).with_category("Edema")),
        );

        // Would mark everything uncertain if it were consulted
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let detector = |sentence: &Sentence, _: &[Span]| -> Result<Vec<PatternHit>> {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(vec![PatternHit::new(Assertion::Uncertainty, "any", sentence.span())])
        };

        let resolution = resolver().resolve(&doc, &detector);
        assert!(resolution.is_ok());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        let disease = resolution.document.mention(MentionId::new(0, 0)).unwrap();
        assert!(disease.negated);
        assert!(!disease.uncertain);
        assert_eq!(polarity_of(&resolution, 1), Polarity::Uncertain);
    }

    #[test]
    fn test_concept_codes_force_flags() {
        let doc = Document::new("r2").with_passage(
            Passage::new(0)
                .with_mention(
                    Mention::new("m0", "negative", Location::new(0, 8)).with_concept("C0332125"),
                )
                .with_mention(
                    Mention::new("m1", "suspected", Location::new(9, 9)).with_concept("C0332148"),
                )
                .with_mention(
                    Mention::new("m2", "opacity", Location::new(19, 7)).with_concept("C0029053"),
                ),
        );

        let resolution = resolver().resolve(&doc, &no_hits);
        assert_eq!(polarity_of(&resolution, 0), Polarity::Negative);
        assert_eq!(polarity_of(&resolution, 1), Polarity::Uncertain);
        assert_eq!(polarity_of(&resolution, 2), Polarity::Positive);
    }

    #[test]
    fn test_detector_hits_need_full_containment() {
        let doc = Document::new("r3").with_passage(
            Passage::new(0)
                .with_sentence(Sentence::new(0, "No effusion or consolidation."))
                .with_mention(Mention::new("m0", "effusion", Location::new(3, 8)))
                .with_mention(Mention::new("m1", "consolidation", Location::new(15, 13))),
        );

        let detector = |_: &Sentence, spans: &[Span]| -> Result<Vec<PatternHit>> {
            assert_eq!(spans.len(), 2);
            Ok(vec![PatternHit::new(Assertion::Negation, "no", Span::new(0, 20))])
        };

        let resolution = resolver().resolve(&doc, &detector);
        assert_eq!(polarity_of(&resolution, 0), Polarity::Negative);
        assert_eq!(polarity_of(&resolution, 1), Polarity::Positive);
    }

    #[test]
    fn test_detector_failure_is_isolated() {
        let failing = |_: &Sentence, _: &[Span]| -> Result<Vec<PatternHit>> {
            Err(MirqiError::Detector("rule engine unavailable".to_string()))
        };

        let broken = Document::new("broken").with_passage(
            Passage::new(0)
                .with_sentence(Sentence::new(0, "Edema."))
                .with_mention(
                    Mention::new("m0", "negative", Location::new(0, 5)).with_concept("C0332125"),
                ),
        );
        let empty = Document::new("empty");

        let resolutions = resolver().resolve_collection(&[broken, empty], &failing);
        assert_eq!(resolutions.len(), 2);

        let first = &resolutions[0];
        assert!(matches!(
            first.error(),
            Some(MirqiError::DocumentResolution { document_id, .. }) if document_id == "broken"
        ));
        // Flags set before the failure are kept
        assert_eq!(polarity_of(first, 0), Polarity::Negative);

        assert!(resolutions[1].is_ok());
        assert_eq!(resolutions[1].document.id, "empty");
    }

    #[test]
    fn test_mention_without_location_fails_document() {
        let mut mention = Mention::new("m0", "edema", Location::new(0, 5));
        mention.locations.clear();
        let doc = Document::new("r4").with_passage(Passage::new(0).with_mention(mention));

        let resolution = resolver().resolve(&doc, &no_hits);
        assert!(!resolution.is_ok());
    }

    fn parsed_sentence() -> Sentence {
        // "Small left pleural effusion ."
        Sentence::new(0, "Small left pleural effusion.")
            .with_tokens(vec![
                Token::new("T0", "Small", "JJ"),
                Token::new("T1", "left", "JJ"),
                Token::new("T2", "pleural", "JJ"),
                Token::new("T3", "effusion", "NN"),
                Token::new("T4", ".", "."),
            ])
            .with_relations(vec![
                Relation::new("amod", "T3", "T0"),
                Relation::new("amod", "T3", "T1"),
                Relation::new("amod", "T3", "T2"),
                Relation::new("punct", "T3", "T4"),
            ])
    }

    #[test]
    fn test_attribute_binding_follows_dependencies() {
        let doc = Document::new("r5").with_passage(
            Passage::new(0)
                .with_sentence(parsed_sentence())
                .with_mention(
                    Mention::new("m0", "pleural effusion", Location::new(11, 16))
                        .with_category("Pleural Effusion"),
                ),
        );

        let resolution = resolver().resolve(&doc, &no_hits);
        let mention = resolution.document.mention(MentionId::new(0, 0)).unwrap();
        // "pleural" is part of the mention, "punct" is not an allowed label
        assert_eq!(mention.attribute_string(), "Small/left");
    }

    #[test]
    fn test_attribute_binding_skips_excluded_tags() {
        let sentence = Sentence::new(0, "1. Remove tube")
            .with_tokens(vec![
                Token::new("T0", "1.", "LS"),
                Token::new("T1", "Remove", "VB"),
                Token::new("T2", "tube", "NN"),
            ])
            .with_relations(vec![
                Relation::new("dep", "T2", "T0"),
                Relation::new("dobj", "T1", "T2"),
            ]);
        let doc = Document::new("r6").with_passage(
            Passage::new(0)
                .with_sentence(sentence)
                .with_mention(Mention::new("m0", "tube", Location::new(10, 4))),
        );

        let resolution = resolver().resolve(&doc, &no_hits);
        let mention = resolution.document.mention(MentionId::new(0, 0)).unwrap();
        assert!(mention.attributes.is_empty());
    }

    #[test]
    fn test_attributes_accumulate_across_sentences() {
        // The mention starts exactly at the end of the first sentence, so the
        // inclusive boundary test matches both sentences.
        let first = Sentence::new(0, "Small effusion")
            .with_tokens(vec![
                Token::new("A0", "Small", "JJ"),
                Token::new("A1", "effusion", "NN"),
            ])
            .with_relations(vec![Relation::new("amod", "A1", "A0")]);
        let second = Sentence::new(14, "effusion small")
            .with_tokens(vec![
                Token::new("B0", "effusion", "NN"),
                Token::new("B1", "small", "JJ"),
            ])
            .with_relations(vec![Relation::new("amod", "B0", "B1")]);

        let doc = Document::new("r7").with_passage(
            Passage::new(0)
                .with_sentence(first)
                .with_sentence(second)
                .with_mention(Mention::new("m0", "effusion", Location::new(14, 8))),
        );

        let resolution = resolver().resolve(&doc, &no_hits);
        let mention = resolution.document.mention(MentionId::new(0, 0)).unwrap();
        assert_eq!(mention.attribute_string(), "Small/small");
    }

    #[test]
    fn test_dangling_relation_fails_document() {
        let sentence = Sentence::new(0, "Mild edema")
            .with_tokens(vec![Token::new("T1", "edema", "NN")])
            .with_relations(vec![Relation::new("amod", "T1", "T0")]);
        let doc = Document::new("r8").with_passage(
            Passage::new(0)
                .with_sentence(sentence)
                .with_mention(Mention::new("m0", "edema", Location::new(5, 5))),
        );

        let resolution = resolver().resolve(&doc, &no_hits);
        assert!(matches!(
            resolution.error(),
            Some(MirqiError::DocumentResolution { .. })
        ));
    }

    #[test]
    fn test_invalid_document_fails_before_either_pass() {
        // Passage 0 is fine; passage 1 has a dangling relation endpoint
        let dangling = Sentence::new(7, "Mild edema")
            .with_tokens(vec![Token::new("T1", "edema", "NN")])
            .with_relations(vec![Relation::new("amod", "T1", "T0")]);
        let doc = Document::new("r9")
            .with_passage(
                Passage::new(0)
                    .with_sentence(Sentence::new(0, "Small negative effusion"))
                    .with_mention(
                        Mention::new("m0", "negative", Location::new(6, 8))
                            .with_concept("C0332125"),
                    ),
            )
            .with_passage(
                Passage::new(7)
                    .with_sentence(dangling)
                    .with_mention(Mention::new("m1", "edema", Location::new(12, 5))),
            );

        let calls = std::sync::atomic::AtomicUsize::new(0);
        let counting = |_: &Sentence, _: &[Span]| -> Result<Vec<PatternHit>> {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(Vec::new())
        };

        let resolution = resolver().resolve(&doc, &counting);
        assert!(!resolution.is_ok());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        // Concept codes in the valid passage were not applied either
        assert_eq!(polarity_of(&resolution, 0), Polarity::Positive);
    }

    #[test]
    fn test_mention_outside_passage_fails_document() {
        let doc = Document::new("r10").with_passage(
            Passage::new(0)
                .with_text("Edema.")
                .with_sentence(Sentence::new(0, "Edema."))
                .with_mention(Mention::new("m0", "edema", Location::new(10, 5))),
        );

        let resolution = resolver().resolve(&doc, &no_hits);
        match resolution.error() {
            Some(MirqiError::DocumentResolution {
                document_id,
                reason,
            }) => {
                assert_eq!(document_id, "r10");
                assert!(reason.contains("outside passage"));
            }
            other => panic!("expected resolution error, got {other:?}"),
        }
    }

    #[test]
    fn test_negative_sentence_only_affects_its_passage() {
        // Passage 0: "Edema."  Passage 1: "Findings: no edema."
        let doc = Document::new("r11")
            .with_passage(
                Passage::new(0)
                    .with_sentence(Sentence::new(0, "Edema."))
                    .with_mention(Mention::new("m0", "Edema", Location::new(0, 5))),
            )
            .with_passage(
                Passage::new(7)
                    .with_sentence(Sentence::new(7, "Findings: no edema."))
                    .with_mention(Mention::new("m1", "edema", Location::new(20, 5))),
            );

        let resolution = resolver().resolve(&doc, &no_hits);
        assert!(resolution.is_ok());
        assert_eq!(polarity_of(&resolution, 0), Polarity::Positive);

        let second = resolution.document.mention(MentionId::new(1, 0)).unwrap();
        assert_eq!(second.polarity(), Polarity::Negative);
    }
}
