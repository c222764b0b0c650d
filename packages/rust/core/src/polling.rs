//! Polling client for providers that run long upstream jobs.
//!
//! A call whose response reports pending work is re-issued with the
//! provider's retry token after a fixed interval, until the upstream reaches
//! a terminal state or the attempt limit is hit. Every session moves through
//! the same states:
//!
//! ```text
//! Pending --terminal response----------------> Terminal(Completed | Failed)
//! Pending --no retry token-------------------> Terminal(Failed)
//! Pending --attempt limit reached------------> Terminal(TimedOut)
//! Pending --> Waiting --> Retrying --> Pending
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use prospector_shared::{
    EngineConfig, PollOutcome, PollSummary, Provider, ProviderCall, Result, ValidationResult,
};

use crate::clock::Clock;

/// State of one polling session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// A response arrived and has not been classified yet.
    Pending,
    /// Sleeping before the next attempt.
    Waiting,
    /// Re-issuing the call with the retry token.
    Retrying,
    Terminal(PollOutcome),
}

/// Ephemeral state for one in-flight polled call.
#[derive(Debug)]
pub struct PollSession {
    pub state: PollState,
    pub retry_token: Option<String>,
    /// Re-issued calls after the initial one.
    pub attempts_made: u32,
    pub started_at: Instant,
    pub last_response: ValidationResult,
}

/// Drives pending provider calls to a terminal state.
#[derive(Debug, Clone)]
pub struct PollingClient {
    interval: Duration,
    max_attempts: u32,
    clock: Arc<dyn Clock>,
}

impl PollingClient {
    pub fn new(interval: Duration, max_attempts: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            interval,
            max_attempts,
            clock,
        }
    }

    pub fn from_config(config: &EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(config.poll_interval, config.max_poll_attempts, clock)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Issue `call` and keep polling while the provider reports pending work.
    ///
    /// The returned result carries a [`PollSummary`]. Attempt-limit
    /// exhaustion is reported as a result with `success = false` and outcome
    /// [`PollOutcome::TimedOut`], never as an error. Transport errors from
    /// any attempt are propagated.
    pub async fn run(
        &self,
        provider: &dyn Provider,
        call: ProviderCall<'_>,
    ) -> Result<ValidationResult> {
        let started_at = self.clock.now();
        let first = provider.validate(call).await?;

        let mut session = PollSession {
            state: PollState::Pending,
            retry_token: None,
            attempts_made: 0,
            started_at,
            last_response: first,
        };

        let outcome = loop {
            session.state = match session.state {
                PollState::Pending => self.classify(provider, &mut session),
                PollState::Waiting => {
                    self.clock.sleep(self.interval).await;
                    PollState::Retrying
                }
                PollState::Retrying => {
                    session.attempts_made += 1;
                    let token = session.retry_token.as_deref().unwrap_or_default();
                    debug!(
                        provider = provider.name(),
                        attempt = session.attempts_made,
                        "re-issuing pending call"
                    );
                    session.last_response = provider.validate(call.with_retry_token(token)).await?;
                    PollState::Pending
                }
                PollState::Terminal(outcome) => break outcome,
            };
        };

        Ok(self.finish(provider, session, outcome))
    }

    fn classify(&self, provider: &dyn Provider, session: &mut PollSession) -> PollState {
        if !provider.is_pending(&session.last_response) {
            return PollState::Terminal(if session.last_response.success {
                PollOutcome::Completed
            } else {
                PollOutcome::Failed
            });
        }

        let Some(token) = provider.retry_token(&session.last_response) else {
            debug!(provider = provider.name(), "pending without retry token");
            return PollState::Terminal(PollOutcome::Failed);
        };
        session.retry_token = Some(token);

        if session.attempts_made >= self.max_attempts {
            return PollState::Terminal(PollOutcome::TimedOut);
        }
        PollState::Waiting
    }

    fn finish(
        &self,
        provider: &dyn Provider,
        session: PollSession,
        outcome: PollOutcome,
    ) -> ValidationResult {
        let elapsed = self.clock.now().saturating_duration_since(session.started_at);
        let mut result = session.last_response;

        if outcome == PollOutcome::TimedOut {
            warn!(
                provider = provider.name(),
                attempts = session.attempts_made,
                "polling timed out while upstream still pending"
            );
            result.success = false;
            result.error_message = Some(format!(
                "still pending after {} poll attempts",
                session.attempts_made
            ));
        }

        result.poll = Some(PollSummary {
            attempts: session.attempts_made,
            elapsed_ms: elapsed.as_millis() as u64,
            outcome,
        });
        result
    }
}
