//! Sentiment and toxicity enrichment shared by both source pipelines.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::parse::{self, Parsed};

/// Class label the toxicity service uses for content it wants flagged.
pub const FLAG_CLASS: &str = "flag";

/// Minimum classifier confidence before a record is marked toxic.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.9;

/// Verdict returned by the toxicity classification service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Moderation {
    pub class: String,
    pub confidence: f64,
}

/// Remote toxicity classification service.
pub trait ToxicityClassifier: Send + Sync + Clone {
    fn classify(&self, text: &str) -> impl Future<Output = Result<Moderation, AppError>> + Send;
}

/// Local sentiment scorer. Pure function of the text.
pub trait SentimentScorer: Send + Sync + Clone {
    /// Compound sentiment in [-1, +1], or `None` for non-scorable text.
    fn score(&self, text: &str) -> Option<f64>;
}

/// Result of enriching one piece of text.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Enrichment {
    pub sentiment: Option<f64>,
    pub is_toxic: bool,
}

/// Enrichment seam the crawl handlers depend on.
pub trait Enricher: Send + Sync + Clone {
    fn enrich(&self, text: &str) -> impl Future<Output = Enrichment> + Send;
}

/// Combines the sentiment scorer and the toxicity classifier.
///
/// Empty text is skipped, not defaulted: `sentiment = None` says "no
/// content", 0.0 would say "neutral content". A classifier failure
/// degrades to non-toxic instead of failing the job — false negatives
/// are accepted over pipeline stalls.
#[derive(Clone)]
pub struct EnrichmentService<X, Y>
where
    X: ToxicityClassifier,
    Y: SentimentScorer,
{
    classifier: X,
    scorer: Y,
    confidence_threshold: f64,
}

impl<X, Y> EnrichmentService<X, Y>
where
    X: ToxicityClassifier,
    Y: SentimentScorer,
{
    pub fn new(classifier: X, scorer: Y) -> Self {
        Self {
            classifier,
            scorer,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Enrich one piece of text. Never returns an error.
    pub async fn enrich(&self, text: &str) -> Enrichment {
        if text.trim().is_empty() {
            return Enrichment::default();
        }

        let sentiment = match self.scorer.score(text) {
            Some(raw) => match parse::sentiment(raw) {
                Parsed::Ok(v) => Some(v),
                Parsed::Skip(reason) => {
                    tracing::warn!(%reason, "Discarding sentiment score");
                    None
                }
            },
            None => None,
        };

        let is_toxic = match self.classifier.classify(text).await {
            Ok(moderation) => {
                moderation.class == FLAG_CLASS && moderation.confidence > self.confidence_threshold
            }
            Err(e) => {
                tracing::warn!(error = %e, "Toxicity check failed, defaulting to non-toxic");
                false
            }
        };

        Enrichment {
            sentiment,
            is_toxic,
        }
    }
}

impl<X, Y> Enricher for EnrichmentService<X, Y>
where
    X: ToxicityClassifier,
    Y: SentimentScorer,
{
    async fn enrich(&self, text: &str) -> Enrichment {
        EnrichmentService::enrich(self, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MockScorer, MockToxicity};

    fn service(
        classifier: MockToxicity,
        scorer: MockScorer,
    ) -> EnrichmentService<MockToxicity, MockScorer> {
        EnrichmentService::new(classifier, scorer)
    }

    #[tokio::test]
    async fn empty_text_is_skipped_entirely() {
        let svc = service(MockToxicity::flagging(0.99), MockScorer::fixed(0.8));
        for text in ["", "   ", "\n\t"] {
            let e = svc.enrich(text).await;
            assert_eq!(e.sentiment, None);
            assert!(!e.is_toxic);
        }
        // Neither collaborator was consulted.
        assert_eq!(svc.classifier.calls(), 0);
    }

    #[tokio::test]
    async fn flagged_above_threshold_is_toxic() {
        let svc = service(MockToxicity::flagging(0.95), MockScorer::fixed(-0.4));
        let e = svc.enrich("some text").await;
        assert!(e.is_toxic);
        assert_eq!(e.sentiment, Some(-0.4));
    }

    #[tokio::test]
    async fn flagged_below_threshold_is_not_toxic() {
        let svc = service(MockToxicity::flagging(0.5), MockScorer::fixed(0.0));
        assert!(!svc.enrich("some text").await.is_toxic);
    }

    #[tokio::test]
    async fn normal_class_is_not_toxic_regardless_of_confidence() {
        let svc = service(MockToxicity::normal(0.99), MockScorer::fixed(0.0));
        assert!(!svc.enrich("some text").await.is_toxic);
    }

    #[tokio::test]
    async fn classifier_failure_degrades_to_non_toxic() {
        let svc = service(
            MockToxicity::failing(AppError::Timeout(10)),
            MockScorer::fixed(0.3),
        );
        let e = svc.enrich("some text").await;
        assert!(!e.is_toxic);
        // Sentiment is still computed; one failure does not zero the record.
        assert_eq!(e.sentiment, Some(0.3));
    }

    #[tokio::test]
    async fn out_of_range_sentiment_is_dropped() {
        let svc = service(MockToxicity::normal(0.1), MockScorer::fixed(3.0));
        assert_eq!(svc.enrich("some text").await.sentiment, None);
    }
}
