//! # Orchestrator Routing
//!
//! Turns a natural-language request into an agent response:
//! - [`CapabilityOracle`] ranks agents for a query (keyword scorer or LLM)
//! - [`RoutingDecisionMaker`] applies the confidence floor, preferences and
//!   the load-aware tie-break
//! - [`RoutingEngine`] executes the decision through circuit breakers and
//!   retries, walking the fallback chain until an agent answers

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod decision;
pub mod engine;
pub mod keyword;
pub mod llm;
pub mod load;
pub mod oracle;

// Re-export main types
pub use decision::{DecisionConfig, RoutingDecisionMaker};
pub use engine::{EngineConfig, EngineStats, RoutingEngine};
pub use keyword::KeywordOracle;
pub use llm::{LlmOracle, LlmOracleConfig, LlmProvider};
pub use load::{LoadGuard, LoadTracker};
pub use oracle::{AgentProfile, CapabilityOracle, CapabilityProfile, OracleRanking, RankedCandidate};
