//! Retry Policy
//!
//! Retries transient downstream failures with fixed, linear or exponential
//! backoff, optional jitter and a per-attempt timeout.

use crate::domain::errors::PortError;
use crate::infrastructure::admission::AdmissionGate;
use rand::Rng;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffKind {
    Fixed,
    Linear,
    Exponential,
}

impl FromStr for BackoffKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "linear" => Ok(Self::Linear),
            "exponential" => Ok(Self::Exponential),
            other => Err(format!("unknown backoff type: {}", other)),
        }
    }
}

impl std::fmt::Display for BackoffKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackoffKind::Fixed => write!(f, "fixed"),
            BackoffKind::Linear => write!(f, "linear"),
            BackoffKind::Exponential => write!(f, "exponential"),
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay unit for the backoff curve
    pub base_delay: Duration,
    /// Cap applied after the backoff curve
    pub max_delay: Duration,
    /// Backoff curve
    pub backoff: BackoffKind,
    /// Randomize each delay within [delay/2, delay]
    pub jitter: bool,
    /// Deadline for a single attempt
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            backoff: BackoffKind::Exponential,
            jitter: true,
            call_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based), before jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let delay = match self.backoff {
            BackoffKind::Fixed => self.base_delay,
            BackoffKind::Linear => self.base_delay.saturating_mul(attempt),
            BackoffKind::Exponential => self
                .base_delay
                .saturating_mul(2u32.saturating_pow(attempt - 1)),
        };
        delay.min(self.max_delay)
    }

    /// Delay to actually sleep after the given failed attempt.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay_for(attempt);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let ms = delay.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(ms / 2..=ms))
    }

    /// Run one attempt: wait for admission, then bound the call by `call_timeout`.
    ///
    /// The permit is held only while the call is in flight.
    pub async fn attempt<T, Fut>(&self, gate: &AdmissionGate, call: Fut) -> Result<T, PortError>
    where
        Fut: Future<Output = Result<T, PortError>>,
    {
        let _permit = gate.admit().await?;
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(PortError::Timeout),
        }
    }

    /// Run `call` until it succeeds, fails non-transiently, or attempts run out.
    pub async fn run<T, F, Fut>(
        &self,
        gate: &AdmissionGate,
        operation: &str,
        mut call: F,
    ) -> Result<T, PortError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PortError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.attempt(gate, call()).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!("{} succeeded on attempt {}", operation, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.backoff_delay(attempt);
                    tracing::debug!(
                        "{} attempt {}/{} failed: {}; retrying in {:?}",
                        operation,
                        attempt,
                        max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        tracing::warn!(
                            "{} failed after {} attempts: {}",
                            operation,
                            attempt,
                            e
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}
