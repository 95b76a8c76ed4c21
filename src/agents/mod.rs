//! The specialised-agent catalogue, dependency planning, and invocation.

pub mod catalog;
pub mod output;
pub mod planner;
pub mod runner;

pub use catalog::{AgentRegistry, AgentSpec, AgentType, RegistryError};
pub use output::{AgentOutput, AgentResult, SourceKind};
pub use planner::{ExecutionPlan, PlanError, build_stages, resolve_selection};
pub use runner::AgentRunner;
