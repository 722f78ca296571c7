//! Bounded-retry send pipeline.
//!
//! Every failed attempt is followed by a backoff sleep, so a budget of three
//! attempts produces exactly three sleeps (1s, 2s, 4s) before the caller gets
//! the terminal result. Rate-limited responses replace the exponential delay
//! with the provider's own retry hint when one is present and another attempt
//! remains; the hint spaces out the next attempt, and with none left the
//! caller must not wait out the provider.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info, warn};

use replyflow_core::domain::send::{SendContext, SendResult};

use crate::send::{SendRequest, SendTransport};

const BASE_BACKOFF_MS: u64 = 1000;
const HTTP_TOO_MANY_REQUESTS: u16 = 429;

/// Seam for backoff waits so tests can record delays instead of serving them.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Drives a send through up to `max_attempts` provider round trips.
///
/// Never returns an error: the terminal outcome is always a [`SendResult`],
/// with status `0` standing in for a transport failure on the final attempt.
pub async fn send_with_retry(
    transport: &dyn SendTransport,
    sleeper: &dyn Sleeper,
    request: &SendRequest,
    context: &SendContext,
    max_attempts: u32,
) -> SendResult {
    let max_attempts = max_attempts.max(1);
    let mut last_status: u16 = 0;
    let mut last_body: Option<Value> = None;

    for attempt in 1..=max_attempts {
        match transport.send(request).await {
            Ok(outcome) if outcome.is_success() => {
                if attempt > 1 {
                    info!(
                        event_name = "send.succeeded_after_retry",
                        action = %context.action,
                        owner_id = %context.owner_id,
                        thread_id = %context.thread_id,
                        correlation_id = %context.correlation_id,
                        attempts = attempt,
                        "send recovered on retry"
                    );
                }
                return SendResult { status: outcome.status, data: outcome.body, attempts: attempt };
            }
            Ok(outcome) => {
                let delay = if outcome.status == HTTP_TOO_MANY_REQUESTS {
                    let hinted = parse_retry_after(outcome.body.as_ref());
                    warn!(
                        event_name = "send.rate_limited",
                        action = %context.action,
                        owner_id = %context.owner_id,
                        thread_id = %context.thread_id,
                        correlation_id = %context.correlation_id,
                        attempt,
                        retry_after_secs = hinted,
                        "provider rate limited the send"
                    );
                    hinted
                        .filter(|_| attempt < max_attempts)
                        .map(Duration::from_secs)
                        .unwrap_or_else(|| exponential_backoff(attempt))
                } else {
                    warn!(
                        event_name = "send.retrying",
                        action = %context.action,
                        owner_id = %context.owner_id,
                        thread_id = %context.thread_id,
                        correlation_id = %context.correlation_id,
                        attempt,
                        status = outcome.status,
                        "send attempt failed"
                    );
                    exponential_backoff(attempt)
                };

                last_status = outcome.status;
                last_body = outcome.body;
                sleeper.sleep(delay).await;
            }
            Err(transport_error) => {
                warn!(
                    event_name = "send.transport_error",
                    action = %context.action,
                    owner_id = %context.owner_id,
                    thread_id = %context.thread_id,
                    correlation_id = %context.correlation_id,
                    attempt,
                    error = %transport_error,
                    "send attempt never reached the provider"
                );
                last_status = 0;
                last_body = None;
                sleeper.sleep(exponential_backoff(attempt)).await;
            }
        }
    }

    error!(
        event_name = "send.exhausted",
        action = %context.action,
        owner_id = %context.owner_id,
        thread_id = %context.thread_id,
        correlation_id = %context.correlation_id,
        attempts = max_attempts,
        status = last_status,
        "send attempts exhausted"
    );

    SendResult { status: last_status, data: last_body, attempts: max_attempts }
}

fn exponential_backoff(attempt: u32) -> Duration {
    Duration::from_millis(BASE_BACKOFF_MS << (attempt.saturating_sub(1)).min(16))
}

/// Retry hint from a 429 body. Accepts the snake_case and header-style key
/// spellings, as a number or a numeric string.
fn parse_retry_after(body: Option<&Value>) -> Option<u64> {
    let body = body?;
    for key in ["retry_after", "Retry-After", "retry-after"] {
        let Some(value) = body.get(key) else {
            continue;
        };
        if let Some(seconds) = value.as_u64() {
            return Some(seconds);
        }
        if let Some(seconds) = value.as_str().and_then(|raw| raw.trim().parse::<u64>().ok()) {
            return Some(seconds);
        }
    }
    None
}
