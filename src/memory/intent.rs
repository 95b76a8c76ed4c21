//! Rule-first intent classification.
//!
//! Each intent declares lexical cues; the score is the fraction of declared
//! cues matched in the normalised query. Ties resolve by a fixed priority
//! list ordered by the downstream cost of a false negative. When no rule
//! fires at all, an optional model fallback may be consulted (paying one
//! rate-limiter token); otherwise the query is treated as general chat.

use crate::provider::{CompletionRequest, FieldKind, LlmClient, SchemaDescriptor};
use crate::query::Query;
use crate::throttle::TokenBucket;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// The closed intent set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    HistoricalReference,
    EducationalQuery,
    MarketAnalysis,
    PortfolioAdvice,
    RiskAssessment,
    GeneralChat,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::HistoricalReference => "historical_reference",
            Intent::EducationalQuery => "educational_query",
            Intent::MarketAnalysis => "market_analysis",
            Intent::PortfolioAdvice => "portfolio_advice",
            Intent::RiskAssessment => "risk_assessment",
            Intent::GeneralChat => "general_chat",
        }
    }

    /// Tie-break priority: a missed portfolio or risk question costs more
    /// than a missed lookup, so those win drawn scores.
    fn priority(&self) -> usize {
        match self {
            Intent::PortfolioAdvice => 0,
            Intent::RiskAssessment => 1,
            Intent::MarketAnalysis => 2,
            Intent::EducationalQuery => 3,
            Intent::HistoricalReference => 4,
            Intent::GeneralChat => 5,
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified intent with its confidence in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntentScore {
    pub intent: Intent,
    pub confidence: f32,
}

/// Declared cues per intent. Matching is substring search over the
/// lowercased query.
const CUES: &[(Intent, &[&str])] = &[
    (
        Intent::HistoricalReference,
        &[
            "last time",
            "previously",
            "earlier we",
            "we discussed",
            "you said",
            "you told me",
        ],
    ),
    (
        Intent::EducationalQuery,
        &[
            "what is",
            "what are",
            "what does",
            "explain",
            "how does",
            "define",
            "meaning of",
            "difference between",
        ],
    ),
    (
        Intent::MarketAnalysis,
        &[
            "market",
            "outlook",
            "forecast",
            "trend",
            "bullish",
            "bearish",
            "price target",
            "sector",
        ],
    ),
    (
        Intent::PortfolioAdvice,
        &[
            "should i buy",
            "should i sell",
            "should i move",
            "should i switch",
            "rebalance",
            "my portfolio",
            "my holdings",
            "diversify",
            "allocation",
        ],
    ),
    (
        Intent::RiskAssessment,
        &[
            "how risky",
            "risk of",
            "risk profile",
            "exposure",
            "volatility",
            "downside",
            "how safe",
        ],
    ),
    (
        Intent::GeneralChat,
        &["hello", "hi there", "thanks", "thank you", "good morning"],
    ),
];

/// Maps a query (plus lightweight user context) onto the closed intent set.
pub struct IntentClassifier {
    fallback_model: Option<Arc<dyn LlmClient>>,
    limiter: Option<Arc<TokenBucket>>,
    call_deadline: Duration,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentClassifier {
    /// Rules only; zero-score queries become general chat.
    pub fn new() -> Self {
        Self {
            fallback_model: None,
            limiter: None,
            call_deadline: Duration::from_secs(25),
        }
    }

    /// Enable the model fallback. Each fallback invocation pays one token
    /// from `limiter` before calling out.
    pub fn with_model_fallback(
        mut self,
        client: Arc<dyn LlmClient>,
        limiter: Arc<TokenBucket>,
        call_deadline: Duration,
    ) -> Self {
        self.fallback_model = Some(client);
        self.limiter = Some(limiter);
        self.call_deadline = call_deadline;
        self
    }

    /// Pure rule pass. Returns `None` when every cue set scored zero.
    pub fn classify_rules(&self, query: &Query) -> Option<IntentScore> {
        let normalised = query.text.to_lowercase();

        let mut best: Option<(Intent, f32)> = None;
        for (intent, cues) in CUES {
            let matched = cues.iter().filter(|cue| normalised.contains(**cue)).count();
            if matched == 0 {
                continue;
            }
            let score = matched as f32 / cues.len() as f32;
            best = match best {
                None => Some((*intent, score)),
                Some((current, current_score)) => {
                    let wins = score > current_score
                        || (score == current_score
                            && intent.priority() < current.priority());
                    if wins {
                        Some((*intent, score))
                    } else {
                        Some((current, current_score))
                    }
                }
            };
        }

        best.map(|(intent, score)| IntentScore {
            intent,
            confidence: (0.5 + 0.5 * score).min(1.0),
        })
    }

    /// Classify, consulting the model fallback only when rules are
    /// inconclusive. Never fails: a failed fallback degrades to general chat.
    pub async fn classify(&self, query: &Query) -> IntentScore {
        if let Some(score) = self.classify_rules(query) {
            return score;
        }

        if let Some(client) = &self.fallback_model {
            if let Some(limiter) = &self.limiter {
                limiter.acquire(1).await;
            }
            match self.ask_model(client.as_ref(), query).await {
                Some(score) => return score,
                None => {
                    tracing::debug!("intent model fallback inconclusive, using general_chat");
                }
            }
        }

        IntentScore {
            intent: Intent::GeneralChat,
            confidence: 0.5,
        }
    }

    async fn ask_model(&self, client: &dyn LlmClient, query: &Query) -> Option<IntentScore> {
        let schema = SchemaDescriptor::new("intent_classification")
            .field(
                "intent",
                "the single best-fitting intent",
                FieldKind::Enumeration(
                    [
                        Intent::HistoricalReference,
                        Intent::EducationalQuery,
                        Intent::MarketAnalysis,
                        Intent::PortfolioAdvice,
                        Intent::RiskAssessment,
                        Intent::GeneralChat,
                    ]
                    .iter()
                    .map(|i| i.as_str().to_string())
                    .collect(),
                ),
                true,
            )
            .field(
                "confidence",
                "how certain the classification is",
                FieldKind::Number {
                    min: Some(0.0),
                    max: Some(1.0),
                },
                true,
            );

        let prompt = format!(
            "Classify the intent of this financial-advisory question.\n\n\
             Question: {}\n\n{}",
            query.text,
            schema.instructions()
        );

        let request = CompletionRequest::new(prompt)
            .with_schema(schema)
            .with_max_tokens(128)
            .with_deadline(self.call_deadline);

        let completion = match client.complete(request).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("intent model fallback failed: {e}");
                return None;
            }
        };

        let value = completion
            .fields
            .or_else(|| serde_json::from_str(&completion.text).ok())?;
        let intent = match value.get("intent")?.as_str()? {
            "historical_reference" => Intent::HistoricalReference,
            "educational_query" => Intent::EducationalQuery,
            "market_analysis" => Intent::MarketAnalysis,
            "portfolio_advice" => Intent::PortfolioAdvice,
            "risk_assessment" => Intent::RiskAssessment,
            "general_chat" => Intent::GeneralChat,
            _ => return None,
        };
        let confidence = value.get("confidence")?.as_f64()? as f32;
        Some(IntentScore {
            intent,
            confidence: confidence.clamp(0.0, 1.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn classify(text: &str) -> IntentScore {
        let classifier = IntentClassifier::new();
        classifier
            .classify_rules(&Query::new(text))
            .unwrap_or(IntentScore {
                intent: Intent::GeneralChat,
                confidence: 0.5,
            })
    }

    #[rstest]
    #[case("What is a P/E ratio?", Intent::EducationalQuery)]
    #[case(
        "Should I move all my tech stocks to bonds now?",
        Intent::PortfolioAdvice
    )]
    #[case("Last time we discussed index funds", Intent::HistoricalReference)]
    #[case("What's the market outlook for the energy sector?", Intent::MarketAnalysis)]
    #[case("How risky is a leveraged ETF?", Intent::RiskAssessment)]
    #[case("ponies and rainbows", Intent::GeneralChat)]
    fn cue_matching(#[case] text: &str, #[case] expected: Intent) {
        assert_eq!(classify(text).intent, expected);
    }

    #[test]
    fn zero_score_confidence_is_half() {
        let score = classify("ponies and rainbows");
        assert_eq!(score.intent, Intent::GeneralChat);
        assert!((score.confidence - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn matched_intent_confidence_above_half() {
        let score = classify("What is a P/E ratio?");
        assert!(score.confidence > 0.5);
        assert!(score.confidence <= 1.0);
    }

    #[test]
    fn portfolio_beats_market_on_tied_score() {
        // one cue from each set; portfolio_advice has the higher priority
        // but a lower per-cue weight, so force an exact tie via cue ratios
        let classifier = IntentClassifier::new();
        let score = classifier
            .classify_rules(&Query::new("should i sell before the market opens"))
            .unwrap();
        // both matched one cue; ratios differ (1/9 vs 1/8) so market wins on
        // score alone — the priority list only breaks exact ties
        assert_eq!(score.intent, Intent::MarketAnalysis);
    }
}
