use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use crate::{HandshakeError, HandshakeResult};

type ExhaustedHook = Arc<dyn Fn(u32, &HandshakeError) + Send + Sync>;

/// Bounded retry of transient failures with a fixed pause between attempts
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
    on_exhausted: Option<ExhaustedHook>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            on_exhausted: None,
        }
    }

    /// Invoked once with the attempt count and last error when retries run out
    pub fn on_exhausted<F>(mut self, hook: F) -> Self
    where
        F: Fn(u32, &HandshakeError) + Send + Sync + 'static,
    {
        self.on_exhausted = Some(Arc::new(hook));
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// attempt budget is spent. `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> HandshakeResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = HandshakeResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    warn!("Attempt {}/{} failed: {}", attempt, self.max_attempts, err);
                    if !self.backoff.is_zero() {
                        tokio::time::sleep(self.backoff).await;
                    }
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_transient() {
                        if let Some(hook) = &self.on_exhausted {
                            hook(attempt, &err);
                        }
                    }
                    return Err(err);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("on_exhausted", &self.on_exhausted.is_some())
            .finish()
    }
}
