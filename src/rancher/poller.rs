//! Completion poller
//!
//! Waits for a submitted upgrade to reach the `upgraded` state. Polling is a
//! small state machine: it starts `Pending` and ends in exactly one of
//! `Upgraded`, `TimedOut` or `QueryFailed`. The first query is issued
//! immediately, every later one after a fixed sleep. There is no backoff and
//! no cancellation hook; elapsed time is measured on the runtime clock.

use crate::error::AppError;
use crate::rancher::api_client::ServiceStateSource;
use crate::rancher::constants::{DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT, STATE_UPGRADED};
use crate::rancher::types::Service;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info};

/// Poller state
#[derive(Debug)]
pub enum PollState {
    /// Still waiting for the orchestrator
    Pending,
    /// The service reported `upgraded`
    Upgraded(Box<Service>),
    /// The ceiling elapsed first
    TimedOut {
        /// Time spent polling
        elapsed: Duration,
    },
    /// A state query failed
    QueryFailed(AppError),
}

/// Fixed-interval poller with an elapsed-time ceiling
#[derive(Debug, Clone, Copy)]
pub struct CompletionPoller {
    interval: Duration,
    timeout: Duration,
}

impl Default for CompletionPoller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT)
    }
}

impl CompletionPoller {
    /// Create a poller sleeping `interval` between queries, giving up after `timeout`
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Next state given the latest query result and the time spent so far
    ///
    /// `upgraded` wins over the ceiling when both hold on the same query.
    pub fn transition(
        &self,
        observed: Result<Service, AppError>,
        elapsed: Duration,
    ) -> PollState {
        match observed {
            Err(e) => PollState::QueryFailed(e),
            Ok(service) if service.state == STATE_UPGRADED => {
                PollState::Upgraded(Box::new(service))
            }
            Ok(_) if elapsed >= self.timeout => PollState::TimedOut { elapsed },
            Ok(_) => PollState::Pending,
        }
    }

    /// Poll `service_id` until it is upgraded
    ///
    /// # Returns
    /// * `Ok(Service)` - Snapshot that reported `upgraded`
    /// * `Err(AppError::Timeout)` - The ceiling elapsed first
    /// * `Err(AppError::QueryFailure)` - A state query failed
    pub async fn await_completion<S>(&self, source: &S, service_id: &str) -> Result<Service, AppError>
    where
        S: ServiceStateSource + ?Sized,
    {
        let started = Instant::now();
        let mut attempts: u32 = 0;

        info!(
            service_id = %service_id,
            interval_secs = self.interval.as_secs_f64(),
            timeout_secs = self.timeout.as_secs(),
            "Waiting for upgrade to complete"
        );

        loop {
            if attempts > 0 {
                sleep(self.interval).await;
            }
            attempts += 1;

            let observed = source.fetch_service(service_id).await;
            if let Ok(service) = &observed {
                debug!(
                    service_id = %service_id,
                    attempt = attempts,
                    state = %service.state,
                    "Polled service state"
                );
            }

            let elapsed = started.elapsed();
            match self.transition(observed, elapsed) {
                PollState::Pending => continue,
                PollState::Upgraded(service) => {
                    info!(
                        service_id = %service_id,
                        attempts = attempts,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Service reported upgraded"
                    );
                    return Ok(*service);
                }
                PollState::TimedOut { elapsed } => {
                    error!(
                        service_id = %service_id,
                        attempts = attempts,
                        elapsed_secs = elapsed.as_secs(),
                        "Upgrade did not complete in time"
                    );
                    return Err(AppError::Timeout {
                        service_id: service_id.to_string(),
                        waited_secs: elapsed.as_secs(),
                    });
                }
                PollState::QueryFailed(e) => {
                    error!(
                        service_id = %service_id,
                        attempts = attempts,
                        error = %e,
                        "Failed to query service state"
                    );
                    return Err(AppError::QueryFailure {
                        service_id: service_id.to_string(),
                        source: Box::new(e),
                    });
                }
            }
        }
    }
}
