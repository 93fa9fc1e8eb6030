//! Generic resilience primitives shared by the batch core and its
//! vector-store specialization: exponential backoff retry and a circuit
//! breaker for calls to external collaborators.

use rand::Rng;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Retry configuration: exponential backoff with a configurable multiplier and cap.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first failure.
    pub max_retries: usize,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Delay ceiling; backoff never grows past this.
    pub max_delay: Duration,
    /// Backoff multiplier applied after each attempt.
    pub multiplier: f64,
    /// Maximum random jitter added to each delay.
    pub jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: Duration::from_millis(100),
        }
    }
}

/// Execute `f` with exponential backoff retry, sleeping between attempts and
/// stopping early if `should_retry` returns `false` for the latest error.
///
/// Returns the last error if every attempt (including retries) fails.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    should_retry: impl Fn(&E) -> bool,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0usize;
    let mut delay = config.initial_delay;

    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt >= config.max_retries || !should_retry(&e) {
                    warn!("giving up after {} attempt(s): {}", attempt + 1, e);
                    return Err(e);
                }

                let jitter = if config.jitter.is_zero() {
                    Duration::ZERO
                } else {
                    Duration::from_millis(rand::thread_rng().gen_range(0..=config.jitter.as_millis() as u64))
                };
                let sleep_for = delay + jitter;
                warn!(
                    "attempt {} failed: {}. retrying in {:?}",
                    attempt + 1,
                    e,
                    sleep_for
                );
                tokio::time::sleep(sleep_for).await;

                attempt += 1;
                delay = Duration::from_millis(
                    ((delay.as_millis() as f64) * config.multiplier)
                        .min(config.max_delay.as_millis() as f64) as u64,
                );
            }
        }
    }
}

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Requests fail fast without calling the collaborator.
    Open,
    /// A single trial call is allowed to test recovery.
    HalfOpen,
}

/// Circuit breaker guarding calls to an external collaborator (e.g. the vector store RPC).
pub struct CircuitBreaker {
    state: Arc<RwLock<CircuitState>>,
    failure_threshold: usize,
    success_threshold: usize,
    timeout: Duration,
    failure_count: Arc<RwLock<usize>>,
    success_count: Arc<RwLock<usize>>,
    last_failure_time: Arc<RwLock<Option<Instant>>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    pub fn new(failure_threshold: usize, success_threshold: usize, timeout: Duration) -> Self {
        Self {
            state: Arc::new(RwLock::new(CircuitState::Closed)),
            failure_threshold,
            success_threshold,
            timeout,
            failure_count: Arc::new(RwLock::new(0)),
            success_count: Arc::new(RwLock::new(0)),
            last_failure_time: Arc::new(RwLock::new(None)),
        }
    }

    /// Execute `f` through the circuit breaker; returns `Err(None)` if the
    /// circuit is open and the call was skipped, `Err(Some(e))` if the call
    /// ran and failed.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, Option<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        {
            let state = *self.state.read().unwrap();
            if state == CircuitState::Open {
                let elapsed = self
                    .last_failure_time
                    .read()
                    .unwrap()
                    .map(|t| t.elapsed() >= self.timeout)
                    .unwrap_or(false);
                if elapsed {
                    *self.state.write().unwrap() = CircuitState::HalfOpen;
                    *self.success_count.write().unwrap() = 0;
                    debug!("circuit breaker transitioning to half-open");
                } else {
                    return Err(None);
                }
            }
        }

        match f().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                self.on_failure();
                Err(Some(e))
            }
        }
    }

    fn on_success(&self) {
        let state = *self.state.read().unwrap();
        match state {
            CircuitState::HalfOpen => {
                let mut success_count = self.success_count.write().unwrap();
                *success_count += 1;
                if *success_count >= self.success_threshold {
                    *self.state.write().unwrap() = CircuitState::Closed;
                    *self.failure_count.write().unwrap() = 0;
                    debug!("circuit breaker closed");
                }
            }
            CircuitState::Closed => {
                *self.failure_count.write().unwrap() = 0;
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let state = *self.state.read().unwrap();
        match state {
            CircuitState::Closed | CircuitState::HalfOpen => {
                let mut failure_count = self.failure_count.write().unwrap();
                *failure_count += 1;
                if *failure_count >= self.failure_threshold {
                    *self.state.write().unwrap() = CircuitState::Open;
                    *self.last_failure_time.write().unwrap() = Some(Instant::now());
                    warn!("circuit breaker opened after {} failures", failure_count);
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Current circuit state.
    pub fn state(&self) -> CircuitState {
        *self.state.read().unwrap()
    }

    /// Force the breaker back to `Closed`.
    pub fn reset(&self) {
        *self.state.write().unwrap() = CircuitState::Closed;
        *self.failure_count.write().unwrap() = 0;
        *self.success_count.write().unwrap() = 0;
        *self.last_failure_time.write().unwrap() = None;
    }
}
