//! Bounded polling with exponential backoff.
//!
//! Propagation between instances is asynchronous. Instead of sleeping for a
//! fixed time, scenarios poll the destination until the expected state
//! shows up, doubling the delay between polls up to a ceiling.

use crate::error::{VerifyError, VerifyResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Delays and bound of a settle poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlePolicy {
    pub initial_delay_ms: u64,
    pub backoff_factor: u32,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            backoff_factor: 2,
            max_delay_ms: 8_000,
            max_attempts: 12,
        }
    }
}

impl SettlePolicy {
    /// Delay before poll number `attempt + 1` (the first poll is immediate).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.backoff_factor.max(1));
        let mut delay = self.initial_delay_ms;
        for _ in 1..attempt {
            delay = delay.saturating_mul(factor);
            if delay >= self.max_delay_ms {
                break;
            }
        }
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// Calls `poll` until it yields a value or the policy is exhausted.
///
/// Errors from `poll` end the wait immediately. `what` names the awaited
/// state in logs and in [`VerifyError::SettleTimeout`].
pub async fn settle<T, F, Fut>(policy: &SettlePolicy, what: &str, mut poll: F) -> VerifyResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = VerifyResult<Option<T>>>,
{
    for attempt in 1..=policy.max_attempts {
        if let Some(value) = poll().await? {
            debug!("{} settled after {} polls", what, attempt);
            return Ok(value);
        }
        if attempt < policy.max_attempts {
            let delay = policy.delay_after(attempt);
            debug!("Waiting {:?} for {}", delay, what);
            tokio::time::sleep(delay).await;
        }
    }
    Err(VerifyError::SettleTimeout {
        what: what.to_string(),
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delays_double_up_to_ceiling() {
        let policy = SettlePolicy {
            initial_delay_ms: 100,
            backoff_factor: 2,
            max_delay_ms: 500,
            max_attempts: 10,
        };
        let delays: Vec<u64> = (1..=5)
            .map(|a| policy.delay_after(a).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
    }

    #[tokio::test(start_paused = true)]
    async fn settles_once_value_appears() {
        let polls = &AtomicU32::new(0);
        let value = settle(&SettlePolicy::default(), "counter", move || async move {
            let n = polls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok::<_, VerifyError>((n >= 3).then_some(n))
        })
        .await
        .unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_max_attempts() {
        let polls = &AtomicU32::new(0);
        let policy = SettlePolicy {
            max_attempts: 4,
            ..SettlePolicy::default()
        };
        let err = settle(&policy, "nothing", move || async move {
            polls.fetch_add(1, Ordering::SeqCst);
            Ok::<Option<()>, VerifyError>(None)
        })
        .await
        .unwrap_err();
        assert!(matches!(err, VerifyError::SettleTimeout { attempts: 4, .. }));
        assert_eq!(polls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn poll_errors_end_the_wait() {
        let err = settle(&SettlePolicy::default(), "broken", || async {
            Err::<Option<()>, _>(VerifyError::Assertion("boom".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, VerifyError::Assertion(_)));
    }

    #[test]
    fn partial_policy_uses_defaults() {
        let policy: SettlePolicy = toml::from_str("max_attempts = 3").unwrap();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff_factor, 2);
    }
}
