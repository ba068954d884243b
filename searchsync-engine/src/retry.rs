//! Retry executor: the single network boundary of the engine.
//!
//! Connection resets and broken pipes are retried with a linear backoff
//! plus random jitter, so concurrent retries spread out instead of hitting
//! the search node in lockstep. Everything else fails immediately.

use crate::config::RetryPolicy;
use crate::error::{IndexError, IndexResult};
use crate::transport::{HttpRequest, Transport};
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A reply whose body parsed as JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReply {
    /// HTTP status code.
    pub status: u16,
    /// Parsed body.
    pub body: Value,
    /// Attempts it took to get this reply.
    pub attempts: u32,
}

impl ParsedReply {
    /// True if the body carries an explicit success acknowledgment
    /// (`ok: true` on legacy engines, `acknowledged: true` on current ones).
    pub fn is_acknowledged(&self) -> bool {
        let flag = |key: &str| self.body.get(key).and_then(Value::as_bool) == Some(true);
        flag("ok") || flag("acknowledged")
    }

    /// The `error` member of the body, if any.
    pub fn error(&self) -> Option<&Value> {
        self.body.get("error").filter(|e| !e.is_null())
    }

    /// True for 4xx/5xx replies or replies carrying an `error` member.
    pub fn is_error(&self) -> bool {
        self.status >= 400 || self.error().is_some()
    }
}

/// Executes requests with bounded retry.
#[derive(Clone)]
pub struct RetryExecutor {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Creates an executor over `transport`.
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// The retry policy in effect.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Sends `request`, retrying transient failures, and parses the reply.
    pub async fn execute(&self, request: HttpRequest) -> IndexResult<ParsedReply> {
        let mut attempts = 0;

        let raw = loop {
            attempts += 1;
            match self.transport.send(&request).await {
                Ok(raw) => break raw,
                Err(err) if err.is_transient() && attempts < self.policy.max_attempts => {
                    let delay = self.backoff(attempts);
                    warn!(
                        "{} failed ({}), retrying in {}ms (attempt {}/{})",
                        request,
                        err,
                        delay.as_millis(),
                        attempts,
                        self.policy.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    return Err(IndexError::Transport {
                        attempts,
                        request: Box::new(request),
                        source: err,
                    });
                }
            }
        };

        debug!("{} -> {} after {} attempt(s)", request, raw.status, attempts);

        match serde_json::from_str(&raw.body) {
            Ok(body) => Ok(ParsedReply {
                status: raw.status,
                body,
                attempts,
            }),
            Err(source) => Err(IndexError::InvalidReply {
                request: Box::new(request),
                body: raw.body,
                source,
            }),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.0..1.0);
        self.policy.delay_for(attempt, jitter)
    }
}
