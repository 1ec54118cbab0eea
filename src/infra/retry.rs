//! Backoff policy for transient language server failures

use std::future::Future;
use std::time::Duration;

use crate::error::LspError;
use crate::models::symbol::Language;

/// How often, and how patiently, a failing LSP call is repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total calls including the first one
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub const STANDARD: Self = Self {
        attempts: 3,
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(5),
    };

    /// Servers that index before answering (jdtls, pyright, ...) often time out on the first calls.
    pub const PATIENT: Self = Self {
        attempts: 5,
        base_delay: Duration::from_millis(50),
        max_delay: Duration::from_secs(10),
    };

    pub const ONCE: Self = Self {
        attempts: 1,
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
    };

    pub fn for_language(language: Language) -> Self {
        if crate::config::timeout_multiplier(language) >= 2.5 {
            Self::PATIENT
        } else {
            Self::STANDARD
        }
    }

    /// Sleep before retry number `retry` (1-based): base, 2x base, 4x base, ... capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Call `op` until it succeeds, fails with a non-recoverable error, or the policy is spent.
///
/// The last error is returned unchanged.
pub async fn with_retry<F, T, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, LspError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LspError>>,
{
    let attempts = policy.attempts.max(1);
    let mut retry = 0;

    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        retry += 1;
        if retry >= attempts || !err.is_recoverable() {
            return Err(err);
        }

        let delay = policy.backoff(retry);
        tracing::warn!("LSP call failed ({}/{}), retrying in {:?}: {}", retry, attempts, delay, err);
        tokio::time::sleep(delay).await;
    }
}
