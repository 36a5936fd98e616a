// Snapshot delivery to the remote collector with bounded retry.

mod backoff;
mod http;

pub use backoff::BackoffPolicy;
pub use http::HttpTransport;

use crate::models::Snapshot;
use bytes::Bytes;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Why one attempt failed. Every variant is retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttemptError {
    #[error("attempt timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("collector answered {0}")]
    Status(u16),
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("delivery failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: AttemptError },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub attempts: u32,
    pub status: u16,
}

/// Sends one encoded body and reports the response status.
pub trait Transport: Send + Sync {
    fn post(&self, body: Bytes) -> impl Future<Output = Result<u16, AttemptError>> + Send;
}

/// Waits between attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}

pub struct DeliveryClient<T = HttpTransport, S = TokioSleeper> {
    transport: T,
    sleeper: S,
    policy: BackoffPolicy,
    timeout: Duration,
}

impl<T: Transport> DeliveryClient<T, TokioSleeper> {
    pub fn new(transport: T, policy: BackoffPolicy, timeout: Duration) -> Self {
        Self::with_sleeper(transport, TokioSleeper, policy, timeout)
    }
}

impl<T: Transport, S: Sleeper> DeliveryClient<T, S> {
    pub fn with_sleeper(transport: T, sleeper: S, policy: BackoffPolicy, timeout: Duration) -> Self {
        Self {
            transport,
            sleeper,
            policy,
            timeout,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Encode once, then try up to `max_retries + 1` times. Returns on the
    /// first 2xx; otherwise reports the last attempt's failure.
    #[instrument(skip(self, snapshot), fields(operation = "deliver"))]
    pub async fn send(&self, snapshot: &Snapshot) -> Result<DeliveryReport, DeliveryError> {
        let body = Bytes::from(serde_json::to_vec(snapshot)?);
        let total = self.policy.total_attempts();
        let mut attempt = 0;

        loop {
            if let Some(delay) = self.policy.delay(attempt) {
                debug!(attempt, delay_ms = delay.as_millis() as u64, "backing off");
                self.sleeper.sleep(delay).await;
            }

            let outcome = match tokio::time::timeout(self.timeout, self.transport.post(body.clone())).await {
                Ok(Ok(status)) if (200..300).contains(&status) => {
                    debug!(attempt, status, "snapshot delivered");
                    return Ok(DeliveryReport {
                        attempts: attempt + 1,
                        status,
                    });
                }
                Ok(Ok(status)) => AttemptError::Status(status),
                Ok(Err(e)) => e,
                Err(_) => AttemptError::Timeout,
            };

            warn!(attempt, max_retries = self.policy.max_retries(), error = %outcome, "delivery attempt failed");
            attempt += 1;
            if attempt >= total {
                return Err(DeliveryError::Exhausted {
                    attempts: attempt,
                    last: outcome,
                });
            }
        }
    }
}
