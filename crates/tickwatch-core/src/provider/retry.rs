//! Policy-driven retry driver shared by both provider clients.

use std::future::Future;
use std::pin::Pin;

use tracing::debug;

use crate::provider::policy::ProviderPolicy;
use crate::provider::{MarketError, MarketErrorKind};

/// Run `call` up to `policy.max_attempts` times.
///
/// Attempts are 1-based. Non-retryable classifications surface immediately.
/// Rate-limited responses obey `policy.retry_on_rate_limit`: when `false`
/// the first 429 is returned as-is (quota preservation), when `true` it
/// joins the normal backoff schedule.
pub async fn run_with_retry<'a, T>(
    policy: &ProviderPolicy,
    mut call: impl FnMut(u32) -> Pin<Box<dyn Future<Output = Result<T, MarketError>> + Send + 'a>>,
) -> Result<T, MarketError> {
    let mut attempt: u32 = 1;
    loop {
        let error = match call(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if error.kind() == MarketErrorKind::ApiRateLimit && !policy.retry_on_rate_limit {
            return Err(error);
        }
        if !error.retryable() {
            return Err(error);
        }
        if attempt >= policy.max_attempts {
            return Err(error);
        }

        let delay = policy.backoff.delay(attempt);
        debug!(attempt, delay_ms = delay.as_millis() as u64, %error, "retrying provider call");
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::provider::policy::Backoff;

    fn fast_policy(max_attempts: u32, retry_on_rate_limit: bool) -> ProviderPolicy {
        ProviderPolicy {
            max_attempts,
            backoff: Backoff::Linear {
                base: Duration::from_millis(1),
            },
            retry_on_rate_limit,
            timeout: Duration::from_secs(1),
            min_request_spacing: None,
        }
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let calls = AtomicU32::new(0);
        let result = run_with_retry(&fast_policy(3, false), |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if n < 2 {
                    Err(MarketError::network("connection reset"))
                } else {
                    Ok(n)
                }
            })
        })
        .await;

        assert_eq!(result.expect("third attempt succeeds"), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_attempts_and_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), MarketError> = run_with_retry(&fast_policy(3, false), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(MarketError::network("still down")) })
        })
        .await;

        let error = result.expect_err("must exhaust");
        assert_eq!(error.kind(), MarketErrorKind::NetworkError);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn rate_limit_short_circuits_when_policy_says_so() {
        let calls = AtomicU32::new(0);
        let result: Result<(), MarketError> = run_with_retry(&fast_policy(3, false), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(MarketError::rate_limited("quota spent")) })
        })
        .await;

        assert_eq!(
            result.expect_err("must surface").kind(),
            MarketErrorKind::ApiRateLimit
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1, "no retry after 429");
    }

    #[tokio::test]
    async fn rate_limit_retries_through_when_policy_allows() {
        let calls = AtomicU32::new(0);
        let result: Result<(), MarketError> = run_with_retry(&fast_policy(3, true), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(MarketError::rate_limited("quota spent")) })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3, "429s join the schedule");
    }

    #[tokio::test]
    async fn non_retryable_errors_surface_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), MarketError> = run_with_retry(&fast_policy(3, true), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(MarketError::asset_not_found("no such coin")) })
        })
        .await;

        assert_eq!(
            result.expect_err("must surface").kind(),
            MarketErrorKind::AssetNotFound
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
