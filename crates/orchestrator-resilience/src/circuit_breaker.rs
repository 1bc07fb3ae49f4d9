//! Circuit breaker pattern implementation.
//!
//! The circuit breaker stops calling an agent that keeps failing and gives
//! it time to recover. There is one breaker per (protocol, agent) pair, so a
//! failing agent never trips the breaker of a healthy sibling.
//!
//! ```text
//! CLOSED --(failures >= threshold)--> OPEN --(open_timeout elapsed)--> HALF_OPEN
//!    ^                                  ^                                  |
//!    |                                  +----------(probe fails)-----------+
//!    +------------------------------(probe succeeds)-----------------------+
//! ```

use dashmap::DashMap;
use orchestrator_core::{OrchestratorError, OrchestratorResult, ProtocolType};
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum CircuitState {
    /// Circuit is closed, calls flow normally
    Closed = 0,
    /// Circuit is open, calls are rejected
    Open = 1,
    /// Circuit is half-open, a single probe call is allowed
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Open,
            2 => Self::HalfOpen,
            _ => Self::Closed,
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Time to stay open before allowing a probe
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    /// Set the failure threshold
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Set the open timeout
    #[must_use]
    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }
}

/// Circuit breaker for a single agent
pub struct CircuitBreaker {
    /// Agent identifier
    agent_id: String,
    /// Agent protocol
    protocol: ProtocolType,
    /// Configuration
    config: CircuitBreakerConfig,
    /// Current state (atomic for lock-free reads)
    state: AtomicU8,
    /// Consecutive failures while closed
    failure_count: AtomicU32,
    /// Whether the half-open probe is currently out
    probe_in_flight: AtomicBool,
    /// Reference point for the millisecond timestamps below
    epoch: Instant,
    /// When the circuit opened, millis since `epoch` plus one; zero when not open
    opened_at: AtomicU64,
    /// When the last failure happened, millis since `epoch` plus one; zero if never
    last_failure_at: AtomicU64,
    /// Lifetime counters
    total_successes: AtomicU64,
    total_failures: AtomicU64,
    rejections: AtomicU64,
    /// Lock for state transitions
    transition_lock: Mutex<()>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    #[must_use]
    pub fn new(
        protocol: ProtocolType,
        agent_id: impl Into<String>,
        config: CircuitBreakerConfig,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            protocol,
            config,
            state: AtomicU8::new(CircuitState::Closed as u8),
            failure_count: AtomicU32::new(0),
            probe_in_flight: AtomicBool::new(false),
            epoch: Instant::now(),
            opened_at: AtomicU64::new(0),
            last_failure_at: AtomicU64::new(0),
            total_successes: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
            transition_lock: Mutex::new(()),
        }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults(protocol: ProtocolType, agent_id: impl Into<String>) -> Self {
        Self::new(protocol, agent_id, CircuitBreakerConfig::default())
    }

    /// Get the agent ID
    #[must_use]
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Get the protocol
    #[must_use]
    pub fn protocol(&self) -> ProtocolType {
        self.protocol
    }

    /// Get the current state
    #[must_use]
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Check if the circuit allows a call.
    ///
    /// When the open timeout has elapsed, exactly one caller is let through
    /// as the half-open probe; everyone else keeps failing fast until the
    /// probe reports back.
    ///
    /// # Errors
    /// Returns `OrchestratorError::CircuitOpen` if the call must not proceed
    pub fn check(&self) -> OrchestratorResult<()> {
        match self.state() {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                if self.open_timeout_elapsed() && self.try_transition_to_half_open() {
                    Ok(())
                } else {
                    self.reject()
                }
            }
            CircuitState::HalfOpen => {
                if self
                    .probe_in_flight
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    Ok(())
                } else {
                    self.reject()
                }
            }
        }
    }

    /// Run `operation` through the breaker.
    ///
    /// The outcome is recorded automatically. Errors that say nothing about
    /// the agent's health (see [`OrchestratorError::counts_as_failure`]) only
    /// release the probe slot. If the returned future is dropped mid-call the
    /// probe slot is released as well.
    ///
    /// # Errors
    /// Returns `CircuitOpen` without invoking `operation` when the circuit is
    /// open, otherwise whatever `operation` returns
    pub async fn call<F, Fut, T>(&self, operation: F) -> OrchestratorResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = OrchestratorResult<T>>,
    {
        self.check()?;
        let guard = ProbeGuard::new(self);
        let result = operation().await;
        guard.disarm();

        match &result {
            Ok(_) => self.record_success(),
            Err(e) if e.counts_as_failure() => self.record_failure(),
            Err(_) => self.release_probe(),
        }
        result
    }

    /// Record a successful call
    pub fn record_success(&self) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);

        match self.state() {
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::Relaxed);
            }
            CircuitState::HalfOpen => {
                debug!(
                    agent_id = %self.agent_id,
                    protocol = %self.protocol,
                    "Circuit breaker probe succeeded"
                );
                self.transition_to_closed();
            }
            CircuitState::Open => {
                // A call admitted before the circuit opened; stay open.
            }
        }
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        self.last_failure_at.store(self.now_millis(), Ordering::Release);

        match self.state() {
            CircuitState::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.config.failure_threshold {
                    debug!(
                        agent_id = %self.agent_id,
                        failures = failures,
                        threshold = self.config.failure_threshold,
                        "Circuit breaker failure threshold reached"
                    );
                    self.transition_to_open();
                }
            }
            CircuitState::HalfOpen => {
                debug!(
                    agent_id = %self.agent_id,
                    "Circuit breaker probe failed, reopening"
                );
                self.transition_to_open();
            }
            CircuitState::Open => {}
        }
    }

    /// Give up the half-open probe slot without reporting an outcome
    pub fn release_probe(&self) {
        self.probe_in_flight.store(false, Ordering::Release);
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        self.transition_to_closed();
    }

    /// Force the circuit open (for testing or manual intervention)
    pub fn force_open(&self) {
        self.transition_to_open();
    }

    /// Get current statistics
    #[must_use]
    pub fn stats(&self) -> CircuitBreakerStats {
        let last_failure_at = self.last_failure_at.load(Ordering::Acquire);
        CircuitBreakerStats {
            agent_id: self.agent_id.clone(),
            protocol: self.protocol,
            state: self.state(),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            total_successes: self.total_successes.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            last_failure_ms_ago: (last_failure_at > 0)
                .then(|| self.now_millis().saturating_sub(last_failure_at)),
        }
    }

    fn reject(&self) -> OrchestratorResult<()> {
        self.rejections.fetch_add(1, Ordering::Relaxed);
        Err(OrchestratorError::circuit_open(&self.agent_id))
    }

    fn now_millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64 + 1
    }

    /// Check if the open timeout has elapsed
    fn open_timeout_elapsed(&self) -> bool {
        let opened_at = self.opened_at.load(Ordering::Acquire);
        if opened_at == 0 {
            return false;
        }
        let elapsed = self.now_millis().saturating_sub(opened_at);
        elapsed >= self.config.open_timeout.as_millis() as u64
    }

    /// Transition to open state with a fresh timer
    fn transition_to_open(&self) {
        let _guard = self.transition_lock.lock();

        let prev_state = self.state.swap(CircuitState::Open as u8, Ordering::AcqRel);
        self.opened_at.store(self.now_millis(), Ordering::Release);
        self.probe_in_flight.store(false, Ordering::Release);

        if prev_state != CircuitState::Open as u8 {
            warn!(
                agent_id = %self.agent_id,
                protocol = %self.protocol,
                open_timeout_ms = self.config.open_timeout.as_millis() as u64,
                "Circuit breaker opened"
            );
        }
    }

    /// Move from open to half-open; only one caller wins and becomes the probe
    fn try_transition_to_half_open(&self) -> bool {
        let _guard = self.transition_lock.lock();

        let won = self
            .state
            .compare_exchange(
                CircuitState::Open as u8,
                CircuitState::HalfOpen as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if won {
            self.probe_in_flight.store(true, Ordering::Release);
            info!(
                agent_id = %self.agent_id,
                protocol = %self.protocol,
                "Circuit breaker half-open, probing"
            );
        }
        won
    }

    /// Transition to closed state
    fn transition_to_closed(&self) {
        let _guard = self.transition_lock.lock();

        let prev_state = self.state.swap(CircuitState::Closed as u8, Ordering::AcqRel);
        self.failure_count.store(0, Ordering::Relaxed);
        self.probe_in_flight.store(false, Ordering::Release);
        self.opened_at.store(0, Ordering::Release);

        if prev_state != CircuitState::Closed as u8 {
            info!(
                agent_id = %self.agent_id,
                protocol = %self.protocol,
                "Circuit breaker closed"
            );
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("agent_id", &self.agent_id)
            .field("protocol", &self.protocol)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Releases the probe slot if a call is abandoned before it reports back
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl<'a> ProbeGuard<'a> {
    fn new(breaker: &'a CircuitBreaker) -> Self {
        Self {
            breaker,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.release_probe();
        }
    }
}

/// Circuit breaker statistics
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    /// Agent identifier
    pub agent_id: String,
    /// Agent protocol
    pub protocol: ProtocolType,
    /// Current state
    pub state: CircuitState,
    /// Consecutive failures
    pub failure_count: u32,
    /// Lifetime successes
    pub total_successes: u64,
    /// Lifetime failures
    pub total_failures: u64,
    /// Calls rejected without reaching the agent
    pub rejections: u64,
    /// Milliseconds since the last failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_ms_ago: Option<u64>,
}

impl CircuitBreakerStats {
    /// Calculate failure rate
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        let total = self.total_successes + self.total_failures;
        if total == 0 {
            0.0
        } else {
            self.total_failures as f64 / total as f64
        }
    }
}

/// Key identifying one downstream target
pub type BreakerKey = (ProtocolType, String);

/// Lazily created breakers, one per (protocol, agent) pair
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<BreakerKey, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    /// Create a registry whose breakers share `config`
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// Breaker for an agent, created on first use
    pub fn get_or_create(&self, protocol: ProtocolType, agent_id: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(&(protocol, agent_id.to_string())) {
            return Arc::clone(existing.value());
        }
        let entry = self
            .breakers
            .entry((protocol, agent_id.to_string()))
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(protocol, agent_id, self.config.clone()))
            });
        Arc::clone(entry.value())
    }

    /// Breaker for an agent, if one exists
    pub fn get(&self, protocol: ProtocolType, agent_id: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .get(&(protocol, agent_id.to_string()))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Drop breakers whose key fails the predicate
    pub fn retain(&self, mut keep: impl FnMut(&BreakerKey) -> bool) {
        self.breakers.retain(|key, _| keep(key));
    }

    /// Stats for every breaker, sorted by agent
    pub fn stats(&self) -> Vec<CircuitBreakerStats> {
        let mut stats: Vec<_> = self.breakers.iter().map(|e| e.value().stats()).collect();
        stats.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        stats
    }

    /// Number of breakers
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Whether no breaker has been created yet
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
