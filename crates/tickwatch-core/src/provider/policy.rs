use std::time::Duration;

/// Backoff strategy between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Delay grows linearly: `base × attempt`.
    Linear {
        /// The first-attempt delay.
        base: Duration,
    },
    /// Delay doubles (or scales by `factor`): `base × factor^(attempt-1)`.
    Exponential {
        /// The first-attempt delay.
        base: Duration,
        /// Multiplicative factor per subsequent attempt.
        factor: f64,
        /// Cap on any single delay.
        max: Duration,
    },
}

impl Backoff {
    /// Delay before retrying after failed attempt number `attempt` (1-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Linear { base } => base.saturating_mul(attempt.max(1)),
            Self::Exponential { base, factor, max } => {
                let scale = factor.powi(attempt.saturating_sub(1) as i32);
                let seconds = base.as_secs_f64() * scale;
                Duration::from_secs_f64(seconds.min(max.as_secs_f64()))
            }
        }
    }
}

/// Per-provider call protocol: timeout, retry, and pacing parameters.
///
/// The providers differ in economics, not in code: the equities provider's
/// quota is too small to spend on retrying a rate-limited call, while the
/// crypto provider recovers within its normal backoff schedule. That
/// asymmetry lives in `retry_on_rate_limit`, consulted by the retry driver.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPolicy {
    /// Maximum attempts per logical call (first try included).
    pub max_attempts: u32,
    /// Backoff between attempts.
    pub backoff: Backoff,
    /// Whether rate-limited responses are retried or surfaced immediately.
    pub retry_on_rate_limit: bool,
    /// Bound on each individual network call.
    pub timeout: Duration,
    /// Minimum spacing between outbound calls, when the provider enforces a
    /// requests-per-minute ceiling.
    pub min_request_spacing: Option<Duration>,
}

impl ProviderPolicy {
    /// Equities provider: small quota, linear backoff, never retry 429s.
    pub fn equities_default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Linear {
                base: Duration::from_millis(500),
            },
            retry_on_rate_limit: false,
            timeout: Duration::from_secs(10),
            min_request_spacing: None,
        }
    }

    /// Crypto provider: exponential backoff, retries through 429s, and a
    /// pacing floor to stay under the requests-per-minute ceiling.
    pub fn crypto_default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Exponential {
                base: Duration::from_secs(1),
                factor: 2.0,
                max: Duration::from_secs(30),
            },
            retry_on_rate_limit: true,
            timeout: Duration::from_secs(10),
            min_request_spacing: Some(Duration::from_millis(1_500)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_backoff_scales_with_attempt() {
        let backoff = Backoff::Linear {
            base: Duration::from_millis(500),
        };

        assert_eq!(backoff.delay(1), Duration::from_millis(500));
        assert_eq!(backoff.delay(2), Duration::from_millis(1_000));
        assert_eq!(backoff.delay(3), Duration::from_millis(1_500));
    }

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let backoff = Backoff::Exponential {
            base: Duration::from_secs(1),
            factor: 2.0,
            max: Duration::from_secs(4),
        };

        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.delay(2), Duration::from_secs(2));
        assert_eq!(backoff.delay(3), Duration::from_secs(4));
        assert_eq!(backoff.delay(4), Duration::from_secs(4));
    }

    #[test]
    fn rate_limit_retry_asymmetry_is_policy_data() {
        assert!(!ProviderPolicy::equities_default().retry_on_rate_limit);
        assert!(ProviderPolicy::crypto_default().retry_on_rate_limit);
    }

    #[test]
    fn only_crypto_carries_a_pacing_floor() {
        assert!(ProviderPolicy::equities_default()
            .min_request_spacing
            .is_none());
        assert_eq!(
            ProviderPolicy::crypto_default().min_request_spacing,
            Some(Duration::from_millis(1_500))
        );
    }
}
