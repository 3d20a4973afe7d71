// Transient retry with exponential backoff
//
// Only transient generation failures are retried here, each call bounded by a
// timeout. This budget is separate from the quality-attempt budget.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};

use crate::config::GeneratorConfig;
use crate::errors::{GateError, GateResult, GenerationError};

#[derive(Debug, Clone, Copy)]
pub struct TransientRetryPolicy {
    /// Retries after the first call
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Bound on each individual call
    pub call_timeout: Duration,
}

impl TransientRetryPolicy {
    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self {
            max_retries: config.transient_retries,
            base_delay: config.retry_base_delay(),
            call_timeout: config.timeout(),
        }
    }

    fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }
}

/// Run `f` until it succeeds, fails fatally, or runs out of transient retries.
pub async fn with_transient_retry<F, Fut, T>(policy: &TransientRetryPolicy, mut f: F) -> GateResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GenerationError>>,
{
    let mut retry = 0;

    loop {
        let result = match timeout(policy.call_timeout, f()).await {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout(policy.call_timeout)),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(GateError::Generation(e)),
            Err(e) if retry >= policy.max_retries => {
                return Err(GateError::TransientRetriesExhausted {
                    attempts: retry + 1,
                    last_error: e,
                });
            }
            Err(e) => {
                let delay = policy.delay_for(retry);
                tracing::warn!(
                    "Generation failed transiently (retry {}/{}), retrying in {:?}: {}",
                    retry + 1,
                    policy.max_retries,
                    delay,
                    e
                );
                sleep(delay).await;
                retry += 1;
            }
        }
    }
}
