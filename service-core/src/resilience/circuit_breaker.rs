//! Count-based circuit breaker.
//!
//! States:
//! - Closed: calls pass; outcomes fill a sliding window of the last `window_size` calls.
//!   Once `minimum_calls` outcomes are recorded and the failure rate reaches the
//!   threshold, the circuit opens.
//! - Open: calls are rejected without running until `open_duration` has elapsed.
//! - HalfOpen: up to `half_open_max_calls` trial calls are let through. When all of
//!   them have reported, the trial failure rate decides between Closed and Open.
//!
//! Every transition starts a new epoch. Permits remember the epoch they were issued
//! in, and results reported after a transition are dropped.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    pub window_size: usize,
    /// Percentage in `(0, 100]`.
    pub failure_rate_threshold: f64,
    pub minimum_calls: usize,
    pub open_duration: Duration,
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            failure_rate_threshold: 50.0,
            minimum_calls: 5,
            open_duration: Duration::from_secs(30),
            half_open_max_calls: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        };
        f.write_str(s)
    }
}

/// How a finished call should count against the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Failure,
    /// Neither success nor failure (e.g. a 404): the slot is released, nothing is recorded.
    Ignored,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("circuit '{name}' is open")]
pub struct CircuitOpenError {
    pub name: String,
    /// Remaining cool-down when known.
    pub retry_after: Option<Duration>,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    /// `true` marks a failure.
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    half_open_issued: u32,
    half_open_results: Vec<bool>,
    epoch: u64,
}

impl Inner {
    fn transition(&mut self, state: CircuitState) {
        self.state = state;
        self.epoch = self.epoch.wrapping_add(1);
        self.window.clear();
        self.half_open_issued = 0;
        self.half_open_results.clear();
    }

    fn failure_rate(outcomes: impl ExactSizeIterator<Item = bool>) -> f64 {
        let total = outcomes.len();
        if total == 0 {
            return 0.0;
        }
        let failures = outcomes.filter(|failed| *failed).count();
        failures as f64 * 100.0 / total as f64
    }
}

pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                window: VecDeque::with_capacity(config.window_size),
                opened_at: None,
                half_open_issued: 0,
                half_open_results: Vec::new(),
                epoch: 0,
            }),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state, with an expired cool-down reported as `HalfOpen`.
    pub fn state(&self) -> CircuitState {
        let inner = self.lock();
        match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(opened_at))
                if opened_at.elapsed() >= self.config.open_duration =>
            {
                CircuitState::HalfOpen
            }
            (state, _) => state,
        }
    }

    /// Ask for permission to run one call.
    pub fn try_acquire(self: &Arc<Self>) -> Result<CallPermit, CircuitOpenError> {
        let now = Instant::now();
        let mut inner = self.lock();

        if inner.state == CircuitState::Open {
            let opened_at = inner.opened_at.unwrap_or(now);
            let ready_at = opened_at + self.config.open_duration;
            if now < ready_at {
                return Err(CircuitOpenError {
                    name: self.name.clone(),
                    retry_after: Some(ready_at - now),
                });
            }
            inner.transition(CircuitState::HalfOpen);
            tracing::info!(circuit = %self.name, "Circuit breaker transitioning to half-open");
        }

        if inner.state == CircuitState::HalfOpen {
            if inner.half_open_issued >= self.config.half_open_max_calls {
                return Err(CircuitOpenError {
                    name: self.name.clone(),
                    retry_after: None,
                });
            }
            inner.half_open_issued += 1;
        }

        Ok(CallPermit {
            breaker: Arc::clone(self),
            epoch: inner.epoch,
            recorded: false,
        })
    }

    fn record(&self, epoch: u64, outcome: CallOutcome) {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            return;
        }

        match inner.state {
            CircuitState::Closed => {
                let failed = match outcome {
                    CallOutcome::Success => false,
                    CallOutcome::Failure => true,
                    CallOutcome::Ignored => return,
                };
                inner.window.push_back(failed);
                while inner.window.len() > self.config.window_size {
                    inner.window.pop_front();
                }

                if inner.window.len() >= self.config.minimum_calls {
                    let rate = Inner::failure_rate(inner.window.iter().copied());
                    if rate >= self.config.failure_rate_threshold {
                        self.open(&mut inner);
                        tracing::warn!(
                            circuit = %self.name,
                            failure_rate = rate,
                            threshold = self.config.failure_rate_threshold,
                            "Circuit breaker opened due to failures"
                        );
                    }
                }
            }
            CircuitState::HalfOpen => {
                let failed = match outcome {
                    CallOutcome::Success => false,
                    CallOutcome::Failure => true,
                    CallOutcome::Ignored => {
                        inner.half_open_issued = inner.half_open_issued.saturating_sub(1);
                        return;
                    }
                };
                inner.half_open_results.push(failed);

                if inner.half_open_results.len() as u32 >= self.config.half_open_max_calls {
                    let rate = Inner::failure_rate(inner.half_open_results.iter().copied());
                    if rate >= self.config.failure_rate_threshold {
                        self.open(&mut inner);
                        tracing::warn!(
                            circuit = %self.name,
                            failure_rate = rate,
                            "Circuit breaker reopened after failed trial calls"
                        );
                    } else {
                        inner.transition(CircuitState::Closed);
                        inner.opened_at = None;
                        tracing::info!(circuit = %self.name, "Circuit breaker closed after successful recovery");
                    }
                }
            }
            CircuitState::Open => {}
        }
    }

    fn open(&self, inner: &mut Inner) {
        inner.transition(CircuitState::Open);
        inner.opened_at = Some(Instant::now());
    }
}

/// Admission ticket for one call. Dropping it unrecorded releases the slot.
#[derive(Debug)]
#[must_use = "record the call outcome on the permit"]
pub struct CallPermit {
    breaker: Arc<CircuitBreaker>,
    epoch: u64,
    recorded: bool,
}

impl CallPermit {
    pub fn record(mut self, outcome: CallOutcome) {
        self.recorded = true;
        self.breaker.record(self.epoch, outcome);
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if !self.recorded {
            self.breaker.record(self.epoch, CallOutcome::Ignored);
        }
    }
}

/// One breaker per downstream target, created on first use.
#[derive(Clone, Debug)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: Arc<DashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: Arc::new(DashMap::new()),
        }
    }

    pub fn get(&self, target: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(target) {
            return existing.value().clone();
        }
        self.breakers
            .entry(target.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(target, self.config.clone())))
            .value()
            .clone()
    }

    /// `(target, state)` for every breaker created so far.
    pub fn states(&self) -> Vec<(String, CircuitState)> {
        let mut states: Vec<_> = self
            .breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }
}
