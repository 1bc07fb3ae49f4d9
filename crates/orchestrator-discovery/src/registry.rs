//! In-memory agent registry.
//!
//! The registry is an immutable [`RegistrySnapshot`] behind an `ArcSwap`.
//! Readers load the current snapshot without locking and always see one
//! complete refresh cycle. Writers build the next snapshot off to the side
//! and publish it with a single atomic store; a mutex serializes writers so
//! that no cycle is lost.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use orchestrator_core::{Agent, AgentStatus, ProtocolType};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Registry configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Consecutive refreshes an agent must miss before it may be evicted
    pub eviction_cycles: u32,
    /// Minimum time since an agent was last seen before it may be evicted
    pub eviction_window: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            eviction_cycles: 3,
            eviction_window: Duration::from_secs(3600),
        }
    }
}

impl RegistryConfig {
    /// Set the number of missed cycles before eviction
    #[must_use]
    pub fn with_eviction_cycles(mut self, cycles: u32) -> Self {
        self.eviction_cycles = cycles.max(1);
        self
    }

    /// Set the eviction window
    #[must_use]
    pub fn with_eviction_window(mut self, window: Duration) -> Self {
        self.eviction_window = window;
        self
    }
}

#[derive(Debug, Clone)]
struct RegistryEntry {
    agent: Agent,
    last_seen: Instant,
    missed_cycles: u32,
}

/// One immutable view of the registry
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    generation: u64,
    refreshed_at: Option<DateTime<Utc>>,
    entries: BTreeMap<String, RegistryEntry>,
}

impl RegistrySnapshot {
    fn empty() -> Self {
        Self {
            generation: 0,
            refreshed_at: None,
            entries: BTreeMap::new(),
        }
    }

    /// Refresh cycle that produced this snapshot; zero before the first one
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// When this snapshot was published
    #[must_use]
    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    /// All agents, ordered by identifier
    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.entries.values().map(|e| &e.agent)
    }

    /// Agent by identifier
    #[must_use]
    pub fn get(&self, agent_id: &str) -> Option<&Agent> {
        self.entries.get(agent_id).map(|e| &e.agent)
    }

    /// Number of agents
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot holds no agents
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cloned agents, ordered by identifier
    #[must_use]
    pub fn agents(&self) -> Vec<Agent> {
        self.iter().cloned().collect()
    }

    /// Agents with status `HEALTHY`
    #[must_use]
    pub fn healthy(&self) -> Vec<Agent> {
        self.iter().filter(|a| a.is_healthy()).cloned().collect()
    }
}

/// Summary of a `replace` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplaceOutcome {
    /// Generation published
    pub generation: u64,
    /// Agents seen for the first time
    pub added: usize,
    /// Agents seen again
    pub updated: usize,
    /// Absent agents kept, marked unhealthy
    pub retained: usize,
    /// Absent agents dropped
    pub evicted: Vec<String>,
}

/// Registry statistics
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    /// Total agents
    pub total_agents: usize,
    /// Agents with status `HEALTHY`
    pub healthy_agents: usize,
    /// Counts by status
    pub by_status: BTreeMap<String, usize>,
    /// Counts by protocol
    pub by_protocol: BTreeMap<String, usize>,
    /// Current generation
    pub generation: u64,
    /// Last publication time
    pub last_refresh: Option<DateTime<Utc>>,
}

/// Agent registry with atomic replace-on-refresh
#[derive(Debug)]
pub struct AgentRegistry {
    config: RegistryConfig,
    current: ArcSwap<RegistrySnapshot>,
    write_lock: Mutex<()>,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl AgentRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            current: ArcSwap::from_pointee(RegistrySnapshot::empty()),
            write_lock: Mutex::new(()),
        }
    }

    /// Current snapshot; cheap, lock-free and immutable
    #[must_use]
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.load_full()
    }

    /// Agent by identifier
    #[must_use]
    pub fn get(&self, agent_id: &str) -> Option<Agent> {
        self.current.load().get(agent_id).cloned()
    }

    /// Agents with status `HEALTHY`
    #[must_use]
    pub fn healthy(&self) -> Vec<Agent> {
        self.current.load().healthy()
    }

    /// Agents speaking a protocol
    #[must_use]
    pub fn by_protocol(&self, protocol: ProtocolType) -> Vec<Agent> {
        self.current
            .load()
            .iter()
            .filter(|a| a.protocol == protocol)
            .cloned()
            .collect()
    }

    /// Agents advertising a capability, matched case-insensitively
    #[must_use]
    pub fn by_capability(&self, capability: &str) -> Vec<Agent> {
        self.current
            .load()
            .iter()
            .filter(|a| a.has_capability(capability))
            .cloned()
            .collect()
    }

    /// Agents in a status
    #[must_use]
    pub fn by_status(&self, status: AgentStatus) -> Vec<Agent> {
        self.current
            .load()
            .iter()
            .filter(|a| a.status == status)
            .cloned()
            .collect()
    }

    /// Capability name to the agents advertising it
    #[must_use]
    pub fn capability_index(&self) -> BTreeMap<String, Vec<String>> {
        let mut index: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for agent in self.current.load().iter() {
            for name in agent.capability_names() {
                index
                    .entry(name.to_string())
                    .or_default()
                    .push(agent.agent_id.clone());
            }
        }
        index
    }

    /// Replace the registry contents with one refresh cycle's results.
    ///
    /// Agents in `discovered` replace their previous records wholesale.
    /// Previously known agents that are absent are kept, marked unhealthy,
    /// until they have been absent for `eviction_cycles` refreshes *and*
    /// were last seen longer than `eviction_window` ago.
    pub fn replace(&self, discovered: Vec<Agent>) -> ReplaceOutcome {
        let _guard = self.write_lock.lock();
        let previous = self.current.load_full();
        let now = Instant::now();

        let mut outcome = ReplaceOutcome {
            generation: previous.generation + 1,
            ..ReplaceOutcome::default()
        };
        let mut entries = BTreeMap::new();

        for mut agent in discovered {
            if entries.contains_key(&agent.agent_id) {
                warn!(agent_id = %agent.agent_id, "Duplicate agent id in refresh, keeping first");
                continue;
            }
            match previous.entries.get(&agent.agent_id) {
                Some(prev) => {
                    agent.discovered_at = prev.agent.discovered_at;
                    outcome.updated += 1;
                }
                None => {
                    info!(agent_id = %agent.agent_id, protocol = %agent.protocol, "New agent registered");
                    outcome.added += 1;
                }
            }
            entries.insert(
                agent.agent_id.clone(),
                RegistryEntry {
                    agent,
                    last_seen: now,
                    missed_cycles: 0,
                },
            );
        }

        for (id, prev) in &previous.entries {
            if entries.contains_key(id) {
                continue;
            }
            let missed_cycles = prev.missed_cycles + 1;
            let unseen_for = now.saturating_duration_since(prev.last_seen);
            if missed_cycles >= self.config.eviction_cycles
                && unseen_for >= self.config.eviction_window
            {
                info!(agent_id = %id, missed_cycles, "Evicting agent");
                outcome.evicted.push(id.clone());
                continue;
            }

            let mut agent = prev.agent.clone();
            agent.status = AgentStatus::Unhealthy;
            debug!(agent_id = %id, missed_cycles, "Agent absent from refresh, retained");
            outcome.retained += 1;
            entries.insert(
                id.clone(),
                RegistryEntry {
                    agent,
                    last_seen: prev.last_seen,
                    missed_cycles,
                },
            );
        }

        self.current.store(Arc::new(RegistrySnapshot {
            generation: outcome.generation,
            refreshed_at: Some(Utc::now()),
            entries,
        }));
        outcome
    }

    /// Registry statistics
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let snapshot = self.current.load();
        let mut by_status = BTreeMap::new();
        let mut by_protocol = BTreeMap::new();
        for agent in snapshot.iter() {
            *by_status.entry(agent.status.to_string()).or_insert(0) += 1;
            *by_protocol.entry(agent.protocol.to_string()).or_insert(0) += 1;
        }
        RegistryStats {
            total_agents: snapshot.len(),
            healthy_agents: by_status.get("healthy").copied().unwrap_or(0),
            by_status,
            by_protocol,
            generation: snapshot.generation,
            last_refresh: snapshot.refreshed_at,
        }
    }
}
