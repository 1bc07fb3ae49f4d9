//! In-flight request tracking per agent.
//!
//! Used as the tie-break between equally confident candidates: the agent
//! with fewer outstanding calls wins.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Outstanding calls per agent
#[derive(Debug, Default)]
pub struct LoadTracker {
    in_flight: DashMap<String, Arc<AtomicUsize>>,
}

impl LoadTracker {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a call against `agent_id` until the guard is dropped
    pub fn acquire(&self, agent_id: &str) -> LoadGuard {
        let counter = self
            .in_flight
            .entry(agent_id.to_string())
            .or_insert_with(|| Arc::new(AtomicUsize::new(0)))
            .clone();
        let current = counter.fetch_add(1, Ordering::AcqRel) + 1;
        trace!(agent_id = %agent_id, in_flight = current, "Agent call started");
        LoadGuard {
            agent_id: agent_id.to_string(),
            counter,
        }
    }

    /// Calls currently outstanding against `agent_id`
    pub fn in_flight(&self, agent_id: &str) -> usize {
        self.in_flight
            .get(agent_id)
            .map_or(0, |c| c.load(Ordering::Acquire))
    }

    /// Non-zero counts, keyed by agent
    pub fn snapshot(&self) -> BTreeMap<String, usize> {
        self.in_flight
            .iter()
            .filter_map(|entry| {
                let count = entry.value().load(Ordering::Acquire);
                (count > 0).then(|| (entry.key().clone(), count))
            })
            .collect()
    }

    /// Forget agents with nothing outstanding that are not in `keep`
    pub fn retain<F>(&self, keep: F)
    where
        F: Fn(&str) -> bool,
    {
        self.in_flight
            .retain(|id, counter| keep(id) || counter.load(Ordering::Acquire) > 0);
    }
}

/// Releases one in-flight slot when dropped
#[derive(Debug)]
pub struct LoadGuard {
    agent_id: String,
    counter: Arc<AtomicUsize>,
}

impl LoadGuard {
    /// Agent this guard counts against
    #[must_use]
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        let remaining = self.counter.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        trace!(agent_id = %self.agent_id, in_flight = remaining, "Agent call finished");
    }
}
