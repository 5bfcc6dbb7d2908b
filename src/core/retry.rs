//! Bounded, retrying access to model services.
//!
//! Every external call goes through an `Invoker`: it resolves the capability in
//! the registry, waits for an in-flight permit, applies the per-call timeout and
//! retries transient failures with exponential backoff.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::adapters::{ServiceRegistry, ServiceRequest, ServiceResponse};
use crate::error::ServiceError;

/// Retry policy for transient service failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including first try)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay between retries in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Backoff multiplier (delay *= multiplier after each retry)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    30000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Calculate delay for a specific attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::from_millis(self.initial_delay_ms);
        }

        let delay = self.initial_delay_ms as f64
            * self.backoff_multiplier.powi((attempt - 1) as i32);

        let capped = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(capped)
    }

    /// Check if we should retry based on attempt count
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// A successful call and how many attempts it took
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub response: ServiceResponse,
    pub attempts: u32,
}

/// A call that gave up, with the attempts spent on it
#[derive(Debug, Clone)]
pub struct CallFailure {
    pub error: ServiceError,
    pub attempts: u32,
}

/// Shared handle for calling model services under the run's concurrency cap
#[derive(Debug, Clone)]
pub struct Invoker {
    registry: Arc<ServiceRegistry>,
    permits: Arc<Semaphore>,
    retry: RetryPolicy,
    call_timeout: Duration,
    calls: Arc<AtomicU64>,
}

impl Invoker {
    pub fn new(
        registry: ServiceRegistry,
        max_in_flight: usize,
        retry: RetryPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            retry,
            call_timeout,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of backend calls attempted so far
    pub fn calls_made(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Call the backend bound to the request's capability, retrying transient errors
    pub async fn call(&self, request: &ServiceRequest) -> Result<CallOutcome, CallFailure> {
        let capability = request.capability();
        let service = self
            .registry
            .resolve(capability)
            .map_err(|error| CallFailure { error, attempts: 0 })?;

        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let result = {
                // Held only for the call itself, never across the backoff sleep
                let _permit = self.permits.acquire().await.map_err(|_| CallFailure {
                    error: ServiceError::transient(capability, "service pool closed"),
                    attempts: attempt,
                })?;
                self.calls.fetch_add(1, Ordering::Relaxed);
                debug!(%capability, backend = service.name(), attempt, "Calling model service");

                match tokio::time::timeout(self.call_timeout, service.call(request)).await {
                    Ok(result) => result,
                    Err(_) => Err(ServiceError::Timeout {
                        capability,
                        after: self.call_timeout,
                    }),
                }
            };

            match result {
                Ok(response) => {
                    return Ok(CallOutcome {
                        response,
                        attempts: attempt,
                    })
                }
                Err(error) if error.is_transient() && self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        %capability,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Service call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    return Err(CallFailure {
                        error,
                        attempts: attempt,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{Capability, ModelService, ScoreRequest};
    use crate::domain::ImageArtifact;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    struct Flaky {
        failures: u32,
        permanent: bool,
        seen: AtomicU32,
    }

    #[async_trait]
    impl ModelService for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn supports(&self, capability: Capability) -> bool {
            capability == Capability::AestheticScore
        }

        async fn call(&self, _request: &ServiceRequest) -> Result<ServiceResponse, ServiceError> {
            let n = self.seen.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                if self.permanent {
                    return Err(ServiceError::permanent(Capability::AestheticScore, "bad request"));
                }
                return Err(ServiceError::transient(Capability::AestheticScore, "busy"));
            }
            Ok(ServiceResponse::Score(0.9))
        }
    }

    struct Slow;

    #[async_trait]
    impl ModelService for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        fn supports(&self, _capability: Capability) -> bool {
            true
        }

        async fn call(&self, _request: &ServiceRequest) -> Result<ServiceResponse, ServiceError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ServiceResponse::Score(1.0))
        }
    }

    fn score_request() -> ServiceRequest {
        ServiceRequest::Score(ScoreRequest {
            image: ImageArtifact::new("image/svg+xml", 1, 1, b"<svg/>".to_vec()),
            keywords: vec![],
        })
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
        }
    }

    fn invoker(service: Arc<dyn ModelService>, policy: RetryPolicy, timeout: Duration) -> Invoker {
        let registry = ServiceRegistry::new().bind_all(service);
        Invoker::new(registry, 2, policy, timeout)
    }

    #[test]
    fn test_retry_policy_delays() {
        let policy = RetryPolicy {
            initial_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_delay_ms: 10000,
            ..Default::default()
        };

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(8000));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(10000)); // Capped
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let service = Arc::new(Flaky {
            failures: 2,
            permanent: false,
            seen: AtomicU32::new(0),
        });
        let invoker = invoker(service, fast_policy(3), Duration::from_secs(1));

        let outcome = invoker.call(&score_request()).await.unwrap();
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.response, ServiceResponse::Score(0.9));
        assert_eq!(invoker.calls_made(), 3);
    }

    #[tokio::test]
    async fn test_retry_budget_is_bounded() {
        let service = Arc::new(Flaky {
            failures: 10,
            permanent: false,
            seen: AtomicU32::new(0),
        });
        let invoker = invoker(service, fast_policy(3), Duration::from_secs(1));

        let failure = invoker.call(&score_request()).await.unwrap_err();
        assert_eq!(failure.attempts, 3);
        assert!(failure.error.is_transient());
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let service = Arc::new(Flaky {
            failures: 1,
            permanent: true,
            seen: AtomicU32::new(0),
        });
        let invoker = invoker(service, fast_policy(3), Duration::from_secs(1));

        let failure = invoker.call(&score_request()).await.unwrap_err();
        assert_eq!(failure.attempts, 1);
        assert!(!failure.error.is_transient());
    }

    #[tokio::test]
    async fn test_call_timeout_is_transient() {
        let invoker = invoker(Arc::new(Slow), fast_policy(2), Duration::from_millis(20));

        let failure = invoker.call(&score_request()).await.unwrap_err();
        assert_eq!(failure.attempts, 2);
        assert!(matches!(failure.error, ServiceError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_unbound_capability_makes_no_call() {
        let invoker = Invoker::new(
            ServiceRegistry::new(),
            1,
            fast_policy(3),
            Duration::from_secs(1),
        );

        let failure = invoker.call(&score_request()).await.unwrap_err();
        assert_eq!(failure.attempts, 0);
        assert_eq!(failure.error, ServiceError::Unbound(Capability::AestheticScore));
        assert_eq!(invoker.calls_made(), 0);
    }
}
