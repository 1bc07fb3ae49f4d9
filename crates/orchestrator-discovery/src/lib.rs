//! # Orchestrator Discovery
//!
//! Keeps a live, health-annotated view of the agents the orchestrator can
//! route to:
//! - [`DiscoveryStrategy`] turns an endpoint into an [`Agent`](orchestrator_core::Agent),
//!   degrading to a label-based record when the agent cannot be probed
//! - [`AgentRegistry`] stores agents behind an atomically swapped snapshot
//! - [`DiscoveryScheduler`] re-probes every configured endpoint on an interval

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod registry;
pub mod scheduler;
pub mod strategy;

// Re-export main types
pub use registry::{AgentRegistry, RegistryConfig, RegistrySnapshot, RegistryStats, ReplaceOutcome};
pub use scheduler::{CycleReport, DiscoveryConfig, DiscoveryScheduler, SchedulerState};
pub use strategy::{ClientDiscoveryStrategy, DiscoveryStrategy, StrategySet};
