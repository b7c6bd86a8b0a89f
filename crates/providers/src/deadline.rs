//! Wall-clock deadline around any inference gateway.
//!
//! Expiry of the deadline drops the caller's wait, not necessarily the
//! upstream request: a provider may still complete (and bill) the call.

use async_trait::async_trait;
use lexchamber_core::error::InferenceError;
use lexchamber_core::inference::InferenceGateway;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// A gateway that fails with [`InferenceError::Timeout`] once `deadline` elapses.
pub struct DeadlineGateway {
    inner: Arc<dyn InferenceGateway>,
    deadline: Duration,
}

impl DeadlineGateway {
    pub fn new(inner: Arc<dyn InferenceGateway>, deadline: Duration) -> Self {
        Self { inner, deadline }
    }
}

#[async_trait]
impl InferenceGateway for DeadlineGateway {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn invoke(&self, instruction: &str) -> Result<String, InferenceError> {
        match tokio::time::timeout(self.deadline, self.inner.invoke(instruction)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    provider = %self.inner.name(),
                    timeout_secs = self.deadline.as_secs(),
                    "Inference deadline exceeded"
                );
                Err(InferenceError::Timeout {
                    after_secs: self.deadline.as_secs(),
                })
            }
        }
    }

    async fn health_check(&self) -> Result<bool, InferenceError> {
        tokio::time::timeout(self.deadline, self.inner.health_check())
            .await
            .unwrap_or(Err(InferenceError::Timeout {
                after_secs: self.deadline.as_secs(),
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowGateway {
        delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InferenceGateway for SlowGateway {
        fn name(&self) -> &str {
            "slow"
        }

        async fn invoke(&self, _instruction: &str) -> Result<String, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok("late answer".into())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_yields_timeout() {
        let slow = Arc::new(SlowGateway {
            delay: Duration::from_secs(90),
            calls: AtomicUsize::new(0),
        });
        let gateway = DeadlineGateway::new(slow.clone(), Duration::from_secs(60));

        let err = gateway.invoke("q").await.unwrap_err();
        assert_eq!(err, InferenceError::Timeout { after_secs: 60 });
        assert_eq!(slow.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fast_reply_passes_through() {
        let fast = Arc::new(SlowGateway {
            delay: Duration::from_secs(1),
            calls: AtomicUsize::new(0),
        });
        let gateway = DeadlineGateway::new(fast, Duration::from_secs(60));

        assert_eq!(gateway.invoke("q").await.unwrap(), "late answer");
        assert_eq!(gateway.name(), "slow");
    }
}
