//! Retry policy for relay submission
//!
//! Exponential backoff for submission errors that may clear on their own.
//! Reverted transactions and other permanent failures are never retried.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::ledger::LedgerError;

/// Submission retry configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 disables retrying)
    pub max_retries: u32,
    /// Backoff before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for any single backoff
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential growth
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// No retries at all
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Calculate backoff duration for a given retry (0-indexed)
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let backoff_secs =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = backoff_secs.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Check if we should retry based on retries already spent
    pub fn should_retry(&self, retries: u32) -> bool {
        retries < self.max_retries
    }
}

/// Classifies errors for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// RPC timeout, connection reset, rate limiting
    Transient,
    /// Fee too low for the mempool
    Underpriced,
    /// Nonce raced with another transaction from the same account
    NonceConflict,
    /// Will fail again: reverted, insufficient funds, bad parameters
    Permanent,
    /// Anything else; retried with backoff
    Unknown,
}

impl ErrorClass {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorClass::Permanent)
    }
}

/// Classify an error message for retry decisions
pub fn classify_error(error: &str) -> ErrorClass {
    let error_lower = error.to_lowercase();

    if error_lower.contains("reverted")
        || error_lower.contains("insufficient funds")
        || error_lower.contains("out of gas")
        || error_lower.contains("invalid parameters")
        || error_lower.contains("invalid signature")
    {
        return ErrorClass::Permanent;
    }

    if error_lower.contains("underpriced")
        || error_lower.contains("replacement transaction")
        || error_lower.contains("gas price too low")
        || error_lower.contains("max fee per gas less than")
    {
        return ErrorClass::Underpriced;
    }

    if error_lower.contains("nonce too low")
        || error_lower.contains("nonce too high")
        || error_lower.contains("already known")
    {
        return ErrorClass::NonceConflict;
    }

    if error_lower.contains("timeout")
        || error_lower.contains("timed out")
        || error_lower.contains("connection")
        || error_lower.contains("network")
        || error_lower.contains("rate limit")
        || error_lower.contains("too many requests")
        || error_lower.contains("503")
        || error_lower.contains("502")
        || error_lower.contains("temporarily unavailable")
    {
        return ErrorClass::Transient;
    }

    ErrorClass::Unknown
}

/// Classify a ledger error
pub fn classify(error: &LedgerError) -> ErrorClass {
    match error {
        LedgerError::Transport(_) => ErrorClass::Transient,
        LedgerError::Rpc(message) => classify_error(message),
        LedgerError::InvalidResponse(_) | LedgerError::MissingReceipt(_) => ErrorClass::Unknown,
    }
}

/// Run `operation` until it succeeds, fails permanently, or retries run out.
///
/// The operation receives the 0-indexed attempt number. On failure the last
/// error is returned together with the number of attempts made.
pub async fn with_retry<F, T, Fut>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, (LedgerError, u32)>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    let mut attempt = 0;

    loop {
        match operation(attempt).await {
            Ok(result) => return Ok(result),
            Err(error) => {
                let class = classify(&error);
                if !class.is_retryable() {
                    debug!(error = %error, ?class, "Permanent error, not retrying");
                    return Err((error, attempt + 1));
                }
                if !config.should_retry(attempt) {
                    warn!(
                        attempts = attempt + 1,
                        error = %error,
                        "Retries exhausted"
                    );
                    return Err((error, attempt + 1));
                }

                let backoff = config.backoff_for_attempt(attempt);
                warn!(
                    attempt = attempt + 1,
                    max = config.max_retries,
                    ?backoff,
                    ?class,
                    error = %error,
                    "Retrying after backoff"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}
