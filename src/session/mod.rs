//! Per-turn streaming sessions.
//!
//! [`Advisor`] is the exposed surface: one `process` call per user turn,
//! returning an async stream of tagged events while the turn moves through
//! its state machine and, at the end, persists the exchanged pair.

pub mod events;
pub mod persistence;

pub use events::{ChatEvent, TurnMetadata, TurnStatus};
pub use persistence::{
    ConversationStore, InMemoryConversationStore, MessageRecord, PersistenceError, Role,
};

use crate::agents::{
    AgentRegistry, AgentResult, AgentRunner, AgentType, ExecutionPlan, SourceKind,
};
use crate::config::Config;
use crate::error::ErrorKind;
use crate::memory::{
    ContextBundle, Embedder, IntentClassifier, RagService, Retrieval, VectorStore,
};
use crate::orchestrator::{OrchestrateError, Orchestrator, OrchestratorConfig, Synthesis};
use crate::provider::LlmClient;
use crate::query::Query;
use crate::throttle::{BatchExecutor, TokenBucket};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Fragment score above which retrieved support counts as knowledge-base
/// grounding in the terminal metadata.
const SUPPORT_FLOOR: f32 = 0.5;

/// Upper bound on the size of one streamed `token` delta, in bytes.
const TOKEN_CHUNK: usize = 48;

/// One user turn's input to [`Advisor::process`].
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub query: Query,
    /// Explicit agent selection; empty derives the set from the intent.
    pub required_agents: BTreeSet<AgentType>,
    /// Continue an existing conversation, or `None` to start one.
    pub conversation_id: Option<Uuid>,
}

impl TurnRequest {
    pub fn new(query: Query) -> Self {
        Self {
            query,
            required_agents: BTreeSet::new(),
            conversation_id: None,
        }
    }

    pub fn with_agents(mut self, agents: impl IntoIterator<Item = AgentType>) -> Self {
        self.required_agents = agents.into_iter().collect();
        self
    }

    pub fn with_conversation(mut self, conversation_id: Uuid) -> Self {
        self.conversation_id = Some(conversation_id);
        self
    }
}

/// The per-turn state machine. Transitions are one-way; each emits a
/// `thought` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnState {
    Received,
    Retrieving,
    Planning,
    Executing,
    Synthesising,
    Persisting,
}

impl TurnState {
    fn message(&self) -> &'static str {
        match self {
            TurnState::Received => "Looking at your question",
            TurnState::Retrieving => "Retrieving relevant context",
            TurnState::Planning => "Planning which specialists to consult",
            TurnState::Executing => "Consulting specialists",
            TurnState::Synthesising => "Drafting the answer",
            TurnState::Persisting => "Saving this exchange",
        }
    }
}

/// Builder for [`Advisor`]; all collaborators are injected here so tests can
/// substitute fakes for every external surface.
pub struct AdvisorBuilder {
    client: Arc<dyn LlmClient>,
    embedder: Arc<dyn Embedder>,
    conversations: Arc<dyn ConversationStore>,
    config: Config,
    registry: AgentRegistry,
    stores: Vec<Arc<dyn VectorStore>>,
    intent_model_fallback: bool,
}

impl AdvisorBuilder {
    pub fn with_registry(mut self, registry: AgentRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.stores.push(store);
        self
    }

    /// Let the intent classifier fall back to a model call when no rule
    /// fires. Each fallback call pays one rate-limiter token.
    pub fn with_intent_model_fallback(mut self, enabled: bool) -> Self {
        self.intent_model_fallback = enabled;
        self
    }

    pub fn build(self) -> Advisor {
        let runtime = &self.config.runtime;
        let limiter = Arc::new(TokenBucket::per_minute(runtime.rpm_limit));
        let executor = BatchExecutor::new(runtime.max_concurrent, Arc::clone(&limiter));
        let call_deadline = Duration::from_millis(runtime.llm_call_deadline_ms);

        let mut classifier = IntentClassifier::new();
        if self.intent_model_fallback {
            classifier = classifier.with_model_fallback(
                Arc::clone(&self.client),
                Arc::clone(&limiter),
                call_deadline,
            );
        }

        let mut rag = RagService::new(
            classifier,
            Arc::clone(&self.embedder),
            runtime.verification_threshold,
        );
        for store in self.stores {
            rag = rag.with_store(store);
        }

        let registry = Arc::new(self.registry);
        let runner = AgentRunner::new(
            Arc::clone(&self.client),
            Arc::clone(&registry),
            call_deadline,
            runtime.max_tokens,
        );
        let orchestrator = Orchestrator::new(
            registry,
            runner,
            executor,
            rag,
            OrchestratorConfig {
                missing_dependency_policy: runtime.missing_dependency_policy,
                synthesis_conflict_threshold: runtime.synthesis_conflict_threshold,
            },
        );

        Advisor {
            orchestrator: Arc::new(orchestrator),
            conversations: self.conversations,
            embedder: self.embedder,
            turn_deadline: Duration::from_millis(runtime.turn_deadline_ms),
            model_label: self.client.name().to_string(),
        }
    }
}

/// The conversational advisory service.
#[derive(Clone)]
pub struct Advisor {
    orchestrator: Arc<Orchestrator>,
    conversations: Arc<dyn ConversationStore>,
    embedder: Arc<dyn Embedder>,
    turn_deadline: Duration,
    model_label: String,
}

impl Advisor {
    pub fn builder(
        client: Arc<dyn LlmClient>,
        embedder: Arc<dyn Embedder>,
        conversations: Arc<dyn ConversationStore>,
        config: Config,
    ) -> AdvisorBuilder {
        AdvisorBuilder {
            client,
            embedder,
            conversations,
            config,
            registry: AgentRegistry::standard(),
            stores: Vec::new(),
            intent_model_fallback: false,
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Run one turn, streaming events as it progresses. The returned stream
    /// ends after the terminal `metadata` (or `error` + `metadata`) events;
    /// backpressure propagates from the consumer's pull rate.
    pub fn process(&self, request: TurnRequest) -> ReceiverStream<ChatEvent> {
        let (tx, rx) = mpsc::channel::<ChatEvent>(32);
        let advisor = self.clone();
        tokio::spawn(async move {
            advisor.run_turn(request, tx).await;
        });
        ReceiverStream::new(rx)
    }

    async fn run_turn(&self, request: TurnRequest, tx: mpsc::Sender<ChatEvent>) {
        let started = Instant::now();
        let cancel = CancellationToken::new();

        emit_state(&tx, TurnState::Received).await;

        let pipeline = self.pipeline(&request, &cancel, &tx);
        let outcome = tokio::time::timeout(self.turn_deadline, pipeline).await;

        match outcome {
            Err(_) => {
                // Turn deadline: cancel in-flight work, discard partials.
                cancel.cancel();
                tracing::warn!(
                    deadline_ms = self.turn_deadline.as_millis() as u64,
                    "turn deadline exceeded"
                );
                self.finish_failed(
                    &request,
                    ErrorKind::Timeout,
                    "turn deadline exceeded",
                    started,
                    &tx,
                )
                .await;
            }
            Ok(Err(OrchestrateError::Cancelled)) => {
                self.finish_failed(&request, ErrorKind::Timeout, "turn cancelled", started, &tx)
                    .await;
            }
            Ok(Err(OrchestrateError::Plan(plan_error))) => {
                let kind = plan_error.kind();
                self.finish_failed(&request, kind, &plan_error.to_string(), started, &tx)
                    .await;
            }
            Ok(Ok(turn)) => {
                self.finish_ok(&request, turn, started, &tx).await;
            }
        }
    }

    /// RETRIEVING → PLANNING → EXECUTING(stages) → SYNTHESISING, bounded by
    /// the turn deadline at the call site.
    async fn pipeline(
        &self,
        request: &TurnRequest,
        cancel: &CancellationToken,
        tx: &mpsc::Sender<ChatEvent>,
    ) -> Result<CompletedTurn, OrchestrateError> {
        emit_state(tx, TurnState::Retrieving).await;
        let retrieval = self.orchestrator.retrieve(&request.query).await;
        let _ = tx
            .send(ChatEvent::thought(format!(
                "Intent: {} (confidence {:.2})",
                retrieval.intent.intent, retrieval.intent.confidence
            )))
            .await;

        emit_state(tx, TurnState::Planning).await;
        let plan = self
            .orchestrator
            .plan(retrieval.intent.intent, &request.required_agents)?;

        emit_state(tx, TurnState::Executing).await;
        let results = self
            .orchestrator
            .execute(&plan, &request.query, &retrieval, cancel, tx)
            .await?;

        emit_state(tx, TurnState::Synthesising).await;
        let synthesis = self
            .orchestrator
            .synthesize(&plan, &results, retrieval.bundle.thin);

        Ok(CompletedTurn {
            retrieval,
            plan,
            results,
            synthesis,
        })
    }

    async fn finish_ok(
        &self,
        request: &TurnRequest,
        turn: CompletedTurn,
        started: Instant,
        tx: &mpsc::Sender<ChatEvent>,
    ) {
        // The synthesis is complete before the first token leaves, so a
        // cancelled turn never leaks a partial answer.
        for delta in chunk_deltas(&turn.synthesis.text) {
            if tx.send(ChatEvent::Token { delta }).await.is_err() {
                // consumer went away; nothing left to stream to
                return;
            }
        }

        emit_state(tx, TurnState::Persisting).await;
        let (conversation_id, persisted) = self.persist_success(request, &turn).await;

        let status = if turn.results.values().all(|r| r.success) {
            TurnStatus::Ok
        } else {
            TurnStatus::Partial
        };

        let metadata = TurnMetadata {
            conversation_id,
            status,
            confidence: turn.synthesis.confidence,
            duration_ms: started.elapsed().as_millis() as u64,
            agents_consulted: turn
                .plan
                .flatten()
                .iter()
                .map(|a| a.as_str().to_string())
                .collect(),
            sources_used: effective_sources(&turn.synthesis, &turn.retrieval.bundle),
            persisted,
        };
        let _ = tx.send(ChatEvent::Metadata(metadata)).await;
    }

    async fn finish_failed(
        &self,
        request: &TurnRequest,
        kind: ErrorKind,
        message: &str,
        started: Instant,
        tx: &mpsc::Sender<ChatEvent>,
    ) {
        let (conversation_id, persisted) = self.persist_failure(request, kind).await;

        let _ = tx
            .send(ChatEvent::Error {
                kind,
                message: message.to_string(),
            })
            .await;
        let _ = tx
            .send(ChatEvent::Metadata(TurnMetadata {
                conversation_id,
                status: TurnStatus::Failed,
                confidence: 0.0,
                duration_ms: started.elapsed().as_millis() as u64,
                agents_consulted: Vec::new(),
                sources_used: Vec::new(),
                persisted,
            }))
            .await;
    }

    /// Append the user + assistant pair atomically. A persistence failure
    /// degrades the turn to `persisted = false`, it does not fail it.
    async fn persist_success(
        &self,
        request: &TurnRequest,
        turn: &CompletedTurn,
    ) -> (Option<Uuid>, bool) {
        let user = MessageRecord::new(
            Role::User,
            &request.query.text,
            self.embed_or_empty(&request.query.text).await,
        );
        let assistant = MessageRecord::new(
            Role::Assistant,
            &turn.synthesis.text,
            self.embed_or_empty(&turn.synthesis.text).await,
        )
        .with_confidence(turn.synthesis.confidence)
        .with_model(self.model_label.clone());

        match self
            .conversations
            .append_turn(request.conversation_id, user, Some(assistant))
            .await
        {
            Ok(id) => (Some(id), true),
            Err(e) => {
                tracing::error!("failed to persist turn: {e}");
                (request.conversation_id, false)
            }
        }
    }

    /// On terminal failure only the user message is kept, marked with the
    /// failure kind, so retries stay auditable.
    async fn persist_failure(
        &self,
        request: &TurnRequest,
        kind: ErrorKind,
    ) -> (Option<Uuid>, bool) {
        let user = MessageRecord::new(
            Role::User,
            &request.query.text,
            self.embed_or_empty(&request.query.text).await,
        )
        .with_error(kind.as_str());

        match self
            .conversations
            .append_turn(request.conversation_id, user, None)
            .await
        {
            Ok(id) => (Some(id), true),
            Err(e) => {
                tracing::error!("failed to persist failed turn: {e}");
                (request.conversation_id, false)
            }
        }
    }

    async fn embed_or_empty(&self, text: &str) -> Vec<f32> {
        match self.embedder.embed(text).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("embedding for persistence failed: {e}");
                Vec::new()
            }
        }
    }
}

/// Everything a successful pipeline hands to the emission/persistence tail.
struct CompletedTurn {
    retrieval: Retrieval,
    plan: ExecutionPlan,
    results: BTreeMap<AgentType, AgentResult>,
    synthesis: Synthesis,
}

async fn emit_state(tx: &mpsc::Sender<ChatEvent>, state: TurnState) {
    tracing::debug!(?state, "turn state transition");
    let _ = tx.send(ChatEvent::thought(state.message())).await;
}

/// Agents' declared sources, grounded against what retrieval actually
/// surfaced: well-scored fragments count as knowledge-base support, their
/// absence as model-internal knowledge.
fn effective_sources(synthesis: &Synthesis, bundle: &ContextBundle) -> Vec<SourceKind> {
    let mut sources: BTreeSet<SourceKind> = synthesis.sources_used.clone();
    if bundle.has_support(SUPPORT_FLOOR) {
        sources.insert(SourceKind::KnowledgeBase);
    } else {
        sources.insert(SourceKind::LlmKnowledge);
    }
    sources.into_iter().collect()
}

/// Split the synthesis into append-only deltas of roughly [`TOKEN_CHUNK`]
/// bytes, breaking at whitespace where possible. Concatenating the deltas
/// yields the synthesis exactly.
fn chunk_deltas(text: &str) -> Vec<String> {
    let mut deltas = Vec::new();
    let mut current = String::new();
    for piece in text.split_inclusive(|c: char| c.is_whitespace()) {
        if !current.is_empty() && current.len() + piece.len() > TOKEN_CHUNK {
            deltas.push(std::mem::take(&mut current));
        }
        current.push_str(piece);
    }
    if !current.is_empty() {
        deltas.push(current);
    }
    deltas
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_reassemble_exactly() {
        let text = "## Market Analyst\n\nA long analysis paragraph with several words \
                    that will be split across multiple deltas for streaming.";
        let deltas = chunk_deltas(text);
        assert!(deltas.len() > 1);
        assert_eq!(deltas.concat(), text);
    }

    #[test]
    fn single_long_word_still_emits() {
        let word = "a".repeat(200);
        let deltas = chunk_deltas(&word);
        assert_eq!(deltas.concat(), word);
    }

    #[test]
    fn empty_text_has_no_deltas() {
        assert!(chunk_deltas("").is_empty());
    }

    #[test]
    fn effective_sources_defaults_to_llm_knowledge() {
        let synthesis = Synthesis {
            text: String::new(),
            confidence: 0.0,
            sources_used: BTreeSet::new(),
            mixed_signals: false,
        };
        let sources = effective_sources(&synthesis, &ContextBundle::empty());
        assert_eq!(sources, vec![SourceKind::LlmKnowledge]);
    }
}
