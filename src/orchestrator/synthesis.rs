//! Deterministic synthesis of per-agent analyses into one answer.

use crate::agents::{AgentResult, AgentType, ExecutionPlan, SourceKind};
use std::collections::{BTreeMap, BTreeSet};

/// Assertiveness cap applied when the supporting context was thin.
const THIN_CONFIDENCE_CAP: f64 = 60.0;

/// The combined answer for a turn.
#[derive(Debug, Clone)]
pub struct Synthesis {
    /// Final prose, ready to stream.
    pub text: String,
    /// Consolidated confidence in [0, 100].
    pub confidence: f64,
    /// Union of the agents' declared sources.
    pub sources_used: BTreeSet<SourceKind>,
    /// Set when the top two weighted recommendations disagreed above the
    /// conflict threshold.
    pub mixed_signals: bool,
}

/// Deterministic combiner: section per successful agent in plan order, then
/// a consolidated recommendation weighted by confidence.
pub struct Synthesizer {
    conflict_threshold: f64,
}

impl Synthesizer {
    pub fn new(conflict_threshold: u32) -> Self {
        Self {
            conflict_threshold: f64::from(conflict_threshold),
        }
    }

    pub fn synthesize(
        &self,
        plan: &ExecutionPlan,
        results: &BTreeMap<AgentType, AgentResult>,
        thin_context: bool,
    ) -> Synthesis {
        let mut text = String::new();

        if thin_context {
            text.push_str(
                "Note: this answer rests on limited supporting context; \
                 treat its conclusions with caution.\n\n",
            );
        }

        let mut sources_used = BTreeSet::new();
        let mut failed: Vec<&AgentResult> = Vec::new();
        let mut successes: Vec<&AgentResult> = Vec::new();

        for agent in plan.flatten() {
            let Some(result) = results.get(&agent) else {
                continue;
            };
            match &result.output {
                Some(output) if result.success => {
                    text.push_str(&format!("## {}\n\n{}\n\n", agent.label(), output.analysis));
                    sources_used.extend(output.sources_used.iter().copied());
                    successes.push(result);
                }
                _ => failed.push(result),
            }
        }

        if !failed.is_empty() {
            text.push_str("## Caveats\n\n");
            for result in &failed {
                text.push_str(&format!(
                    "- {} produced no result ({}).\n",
                    result.agent.label(),
                    result.error.as_deref().unwrap_or("unknown error")
                ));
            }
            text.push('\n');
        }

        let (recommendation_block, confidence, mixed_signals) =
            self.consolidate(&successes, thin_context);
        text.push_str(&recommendation_block);

        Synthesis {
            text,
            confidence,
            sources_used,
            mixed_signals,
        }
    }

    /// Weight each distinct recommendation by the confidence of the agents
    /// backing it; surface both of the top two when they disagree strongly.
    fn consolidate(
        &self,
        successes: &[&AgentResult],
        thin_context: bool,
    ) -> (String, f64, bool) {
        if successes.is_empty() {
            return (
                "## Recommendation\n\nNo agent completed successfully; no \
                 recommendation can be offered.\n"
                    .to_string(),
                0.0,
                false,
            );
        }

        // Group by normalised recommendation text. BTreeMap keeps grouping
        // deterministic.
        let mut grouped: BTreeMap<String, (String, f64)> = BTreeMap::new();
        let mut confidence_sum = 0.0;
        for result in successes {
            let output = result.output.as_ref().expect("successes carry output");
            confidence_sum += output.confidence;
            let key = output.recommendation.trim().to_lowercase();
            let entry = grouped
                .entry(key)
                .or_insert_with(|| (output.recommendation.trim().to_string(), 0.0));
            entry.1 += output.confidence;
        }

        let mut ranked: Vec<(String, f64)> = grouped.into_values().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut confidence = confidence_sum / successes.len() as f64;
        if thin_context {
            confidence = confidence.min(THIN_CONFIDENCE_CAP);
        }

        let mut block = String::from("## Recommendation\n\n");
        let mixed = ranked.len() > 1
            && ranked[0].1 > self.conflict_threshold
            && ranked[1].1 > self.conflict_threshold;

        if mixed {
            block.push_str(&format!(
                "Mixed signals: the consulted agents disagree.\n\n\
                 - {} (weighted confidence {:.0})\n\
                 - {} (weighted confidence {:.0})\n\n\
                 Consider both positions before acting.\n",
                ranked[0].0, ranked[0].1, ranked[1].0, ranked[1].1
            ));
        } else {
            block.push_str(&format!(
                "{} (weighted confidence {:.0})\n",
                ranked[0].0, ranked[0].1
            ));
        }

        (block, confidence, mixed)
    }
}
