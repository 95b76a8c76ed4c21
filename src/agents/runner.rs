//! Single-agent invocation.
//!
//! Builds the prompt from (query, facets, context bundle, dependency
//! outputs), invokes the abstract LLM client against the agent's declared
//! output schema, and turns whatever happens into an [`AgentResult`]. Only
//! the result's `success` flag carries failure downstream; nothing here
//! aborts a stage.

use super::catalog::{AgentRegistry, AgentType};
use super::output::{AgentOutput, AgentResult};
use crate::memory::ContextBundle;
use crate::provider::{CompletionRequest, LlmClient, ProviderError};
use crate::query::Query;
use crate::tools::render_tools;
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const DEPENDENCY_FAILED: &str = "dependency_failed";
const MALFORMED_OUTPUT: &str = "malformed_output";

/// Invokes one catalogue agent per call.
pub struct AgentRunner {
    client: Arc<dyn LlmClient>,
    registry: Arc<AgentRegistry>,
    call_deadline: Duration,
    max_tokens: u32,
}

impl AgentRunner {
    pub fn new(
        client: Arc<dyn LlmClient>,
        registry: Arc<AgentRegistry>,
        call_deadline: Duration,
        max_tokens: u32,
    ) -> Self {
        Self {
            client,
            registry,
            call_deadline,
            max_tokens,
        }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Run one agent. `dependencies` holds the results of this agent's
    /// declared dependencies that were part of the run (successes and
    /// failures alike); inputs are never mutated.
    pub async fn run(
        &self,
        agent: AgentType,
        query: &Query,
        bundle: &ContextBundle,
        dependencies: &BTreeMap<AgentType, AgentResult>,
    ) -> AgentResult {
        let started_at = Utc::now();

        let Some(spec) = self.registry.spec(agent) else {
            return AgentResult::failed(agent, "agent not in registry", started_at);
        };

        let failed_deps: Vec<AgentType> = dependencies
            .values()
            .filter(|r| !r.success)
            .map(|r| r.agent)
            .collect();
        let any_succeeded = dependencies.values().any(|r| r.success);

        // Every upstream input this agent was going to reason over is gone:
        // don't burn an LLM call on it.
        if !failed_deps.is_empty() && !any_succeeded {
            tracing::warn!(agent = %agent, ?failed_deps, "all dependencies failed");
            return AgentResult::failed(agent, DEPENDENCY_FAILED, started_at);
        }

        let prompt = self.build_prompt(spec.role_prompt, spec.tools, query, bundle, dependencies);
        let request = CompletionRequest::new(prompt)
            .with_schema(spec.output_schema.clone())
            .with_max_tokens(self.max_tokens)
            .with_deadline(self.call_deadline);

        let give_up_at = Instant::now() + self.call_deadline;
        let mut strict_retry_done = false;
        let mut request = request;

        let value = loop {
            let completion = match self.complete_within(&request, give_up_at).await {
                Ok(c) => c,
                Err(ProviderError::MalformedOutput(reason)) if !strict_retry_done => {
                    strict_retry_done = true;
                    tracing::debug!(agent = %agent, "malformed output, retrying strictly: {reason}");
                    request = self.stricter(request);
                    continue;
                }
                Err(ProviderError::MalformedOutput(_)) => {
                    return AgentResult::failed(agent, MALFORMED_OUTPUT, started_at);
                }
                Err(e) => {
                    tracing::warn!(agent = %agent, "LLM call failed: {e}");
                    return AgentResult::failed(agent, e.kind().as_str(), started_at);
                }
            };

            match parse_structured(completion.fields, &completion.text) {
                Some(value) => match AgentOutput::from_value(&spec.output_schema, value) {
                    Ok(output) => break Ok(output),
                    Err(violation) if !strict_retry_done => {
                        strict_retry_done = true;
                        tracing::debug!(
                            agent = %agent,
                            "schema violation, retrying strictly: {violation}"
                        );
                        request = self.stricter(request);
                    }
                    Err(_) => break Err(()),
                },
                None if !strict_retry_done => {
                    strict_retry_done = true;
                    request = self.stricter(request);
                }
                None => break Err(()),
            }
        };

        let Ok(mut output) = value else {
            return AgentResult::failed(agent, MALFORMED_OUTPUT, started_at);
        };

        // Partial upstream failure: run completed, but flag the weaker footing.
        if !failed_deps.is_empty() {
            output.confidence = (output.confidence * 0.5).clamp(0.0, 100.0);
            let names: Vec<&str> = failed_deps.iter().map(AgentType::as_str).collect();
            output.analysis.push_str(&format!(
                "\n\nConfidence reduced: upstream input from {} was unavailable.",
                names.join(", ")
            ));
        }

        AgentResult::succeeded(agent, output, started_at)
    }

    /// One provider call bounded by the remaining per-agent deadline.
    /// Provider-side throttling waits out the hinted delay and tries again
    /// while the deadline allows; an exhausted deadline reads as a timeout.
    async fn complete_within(
        &self,
        request: &CompletionRequest,
        give_up_at: Instant,
    ) -> Result<crate::provider::Completion, ProviderError> {
        loop {
            let remaining = give_up_at.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ProviderError::Timeout {
                    elapsed_ms: self.call_deadline.as_millis() as u64,
                });
            }

            let attempt = tokio::time::timeout(
                remaining,
                self.client.complete(request.clone().with_deadline(remaining)),
            )
            .await;

            match attempt {
                Err(_) => {
                    return Err(ProviderError::Timeout {
                        elapsed_ms: self.call_deadline.as_millis() as u64,
                    });
                }
                Ok(Err(ProviderError::RateLimited { retry_after_ms })) => {
                    let pause = Duration::from_millis(retry_after_ms.unwrap_or(1_000));
                    if Instant::now() + pause >= give_up_at {
                        return Err(ProviderError::Timeout {
                            elapsed_ms: self.call_deadline.as_millis() as u64,
                        });
                    }
                    tracing::warn!(pause_ms = pause.as_millis() as u64, "provider rate limited");
                    tokio::time::sleep(pause).await;
                }
                Ok(other) => return other,
            }
        }
    }

    fn stricter(&self, request: CompletionRequest) -> CompletionRequest {
        let mut request = request;
        request.prompt.push_str(
            "\n\nREMINDER: your previous answer was not valid. Respond with ONLY the \
             JSON object described above — no prose, no code fences, every required \
             field present.",
        );
        request
    }

    fn build_prompt(
        &self,
        role_prompt: &str,
        tools: &[&str],
        query: &Query,
        bundle: &ContextBundle,
        dependencies: &BTreeMap<AgentType, AgentResult>,
    ) -> String {
        let mut prompt = String::new();
        prompt.push_str(role_prompt);
        prompt.push_str("\n\n## Question\n\n");
        prompt.push_str(&query.text);
        prompt.push('\n');

        let facets = query.facets.render();
        if !facets.is_empty() {
            prompt.push_str("\n## User profile\n\n");
            prompt.push_str(&facets);
            prompt.push('\n');
        }

        let context = bundle.render();
        if !context.is_empty() {
            prompt.push('\n');
            prompt.push_str(&context);
        }

        if !dependencies.is_empty() {
            prompt.push_str("\n## Upstream analyses\n\n");
            for result in dependencies.values() {
                match (&result.output, result.success) {
                    (Some(output), true) => {
                        prompt.push_str(&format!(
                            "### {}\nrecommendation: {} (confidence {:.0})\n{}\n\n",
                            result.agent.as_str(),
                            output.recommendation,
                            output.confidence,
                            output.analysis
                        ));
                    }
                    _ => {
                        prompt.push_str(&format!(
                            "### {}\n[{DEPENDENCY_FAILED}] no output available ({})\n\n",
                            result.agent.as_str(),
                            result.error.as_deref().unwrap_or("unknown error"),
                        ));
                    }
                }
            }
        }

        let tool_section = render_tools(tools);
        if !tool_section.is_empty() {
            prompt.push('\n');
            prompt.push_str(&tool_section);
        }

        prompt.push('\n');
        prompt
    }
}

/// Prefer structured fields from the client; otherwise carve the first JSON
/// object out of the raw text.
fn parse_structured(fields: Option<Value>, text: &str) -> Option<Value> {
    if let Some(value) = fields {
        return Some(value);
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}
