//! Top-level orchestration: agent selection, staged execution, synthesis.

pub mod synthesis;

pub use synthesis::{Synthesis, Synthesizer};

use crate::agents::{
    AgentRegistry, AgentResult, AgentRunner, AgentType, ExecutionPlan, PlanError, build_stages,
    resolve_selection,
};
use crate::config::MissingDependencyPolicy;
use crate::memory::{Intent, RagService, Retrieval};
use crate::query::Query;
use crate::session::events::ChatEvent;
use crate::throttle::BatchExecutor;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum OrchestrateError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("turn cancelled")]
    Cancelled,
}

/// Orchestrator tuning, lifted from the runtime config.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub missing_dependency_policy: MissingDependencyPolicy,
    pub synthesis_conflict_threshold: u32,
}

/// Composes the planner, the throttled executor, the RAG layer and the agent
/// runner into one turn-scoped pipeline. Process-wide collaborators arrive
/// through the constructor so tests can substitute fakes.
pub struct Orchestrator {
    registry: Arc<AgentRegistry>,
    runner: AgentRunner,
    executor: BatchExecutor,
    rag: RagService,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<AgentRegistry>,
        runner: AgentRunner,
        executor: BatchExecutor,
        rag: RagService,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            registry,
            runner,
            executor,
            rag,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn rag(&self) -> &RagService {
        &self.rag
    }

    /// The fixed intent → agent-set map used when the caller names no
    /// agents. Curated to the canonical tiers; executed as given, without
    /// dependency augmentation.
    pub fn agents_for_intent(intent: Intent) -> BTreeSet<AgentType> {
        let agents: &[AgentType] = match intent {
            Intent::EducationalQuery | Intent::HistoricalReference | Intent::GeneralChat => {
                &[AgentType::Education]
            }
            Intent::MarketAnalysis => &[
                AgentType::MarketAnalyst,
                AgentType::TechnicalAnalysis,
                AgentType::NewsSentiment,
            ],
            Intent::PortfolioAdvice => &[
                AgentType::MarketAnalyst,
                AgentType::TechnicalAnalysis,
                AgentType::RiskAssessment,
                AgentType::PortfolioOptimizer,
            ],
            Intent::RiskAssessment => &[
                AgentType::MarketAnalyst,
                AgentType::TechnicalAnalysis,
                AgentType::EconomicAnalysis,
                AgentType::RiskAssessment,
            ],
        };
        agents.iter().copied().collect()
    }

    /// Resolve the agent selection for a turn and order it into stages.
    ///
    /// An empty `required` derives the set from the intent; an explicit set
    /// goes through the missing-dependency policy first. Planner errors fail
    /// the turn before any LLM call.
    pub fn plan(
        &self,
        intent: Intent,
        required: &BTreeSet<AgentType>,
    ) -> Result<ExecutionPlan, PlanError> {
        let selection = if required.is_empty() {
            Self::agents_for_intent(intent)
        } else {
            resolve_selection(&self.registry, required, self.config.missing_dependency_policy)?
        };
        let plan = build_stages(&self.registry, &selection)?;
        tracing::info!(
            stages = plan.stage_count(),
            agents = plan.agent_count(),
            "execution plan built"
        );
        Ok(plan)
    }

    /// Classify and retrieve for a turn.
    pub async fn retrieve(&self, query: &Query) -> Retrieval {
        self.rag.retrieve(query).await
    }

    /// Execute the plan stage by stage.
    ///
    /// Within a stage, agents run concurrently under the executor's ceiling
    /// and the rate budget; stage `i` completes before stage `i + 1` starts.
    /// Failed agents are recorded, never thrown; cancellation discards the
    /// partial results collected so far.
    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        query: &Query,
        retrieval: &Retrieval,
        cancel: &CancellationToken,
        events: &mpsc::Sender<ChatEvent>,
    ) -> Result<BTreeMap<AgentType, AgentResult>, OrchestrateError> {
        let mut results: BTreeMap<AgentType, AgentResult> = BTreeMap::new();

        for (index, stage) in plan.stages().iter().enumerate() {
            let names: Vec<&str> = stage.iter().map(AgentType::as_str).collect();
            let _ = events
                .send(ChatEvent::thought(format!(
                    "Stage {}: consulting {}",
                    index + 1,
                    names.join(", ")
                )))
                .await;

            let tasks: Vec<_> = stage
                .iter()
                .map(|agent| {
                    let dependencies = self.dependency_inputs(*agent, &results);
                    let events = events.clone();
                    async move {
                        let _ = events
                            .send(ChatEvent::agent_thought(agent.as_str(), "analysing"))
                            .await;
                        let result = self
                            .runner
                            .run(*agent, query, &retrieval.bundle, &dependencies)
                            .await;
                        let note = if result.success {
                            "done".to_string()
                        } else {
                            format!(
                                "failed: {}",
                                result.error.as_deref().unwrap_or("unknown error")
                            )
                        };
                        let _ = events
                            .send(ChatEvent::agent_thought(agent.as_str(), note))
                            .await;
                        result
                    }
                })
                .collect();

            let stage_results = self.executor.execute_batch(tasks, cancel).await;

            for outcome in stage_results {
                let result = outcome.map_err(|_| OrchestrateError::Cancelled)?;
                tracing::debug!(
                    agent = %result.agent,
                    success = result.success,
                    "agent finished"
                );
                // StageResults invariant: written once, never overwritten
                results.entry(result.agent).or_insert(result);
            }
        }

        Ok(results)
    }

    /// Combine the stage results into the final answer.
    pub fn synthesize(
        &self,
        plan: &ExecutionPlan,
        results: &BTreeMap<AgentType, AgentResult>,
        thin_context: bool,
    ) -> Synthesis {
        Synthesizer::new(self.config.synthesis_conflict_threshold)
            .synthesize(plan, results, thin_context)
    }

    /// The declared dependencies of `agent` that were part of this run,
    /// successes and failures alike.
    fn dependency_inputs(
        &self,
        agent: AgentType,
        accumulated: &BTreeMap<AgentType, AgentResult>,
    ) -> BTreeMap<AgentType, AgentResult> {
        let Some(declared) = self.registry.depends_on(agent) else {
            return BTreeMap::new();
        };
        declared
            .iter()
            .filter_map(|dep| accumulated.get(dep).map(|r| (*dep, r.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_map_matches_tiers() {
        let portfolio = Orchestrator::agents_for_intent(Intent::PortfolioAdvice);
        assert_eq!(
            portfolio,
            [
                AgentType::MarketAnalyst,
                AgentType::TechnicalAnalysis,
                AgentType::RiskAssessment,
                AgentType::PortfolioOptimizer,
            ]
            .into_iter()
            .collect()
        );

        let educational = Orchestrator::agents_for_intent(Intent::EducationalQuery);
        assert_eq!(educational.len(), 1);
        assert!(educational.contains(&AgentType::Education));
    }
}
