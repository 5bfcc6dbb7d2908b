//! Brand Grounding Integration Tests
//!
//! Tests that the run style comes from brand material when it is supplied,
//! falls back to the keyword style on rejection, and is stable across runs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use posterloom::adapters::{Capability, LocalStudio, ModelService, ServiceRegistry, ServiceRequest, ServiceResponse};
use posterloom::agents::BrandGroundingAgent;
use posterloom::core::{Invoker, RetryPolicy};
use posterloom::domain::BrandInput;
use posterloom::ServiceError;
use tempfile::TempDir;

/// Brand analysis backend that always fails the same way
struct RejectingAnalyst {
    transient: bool,
}

#[async_trait]
impl ModelService for RejectingAnalyst {
    fn name(&self) -> &str {
        "rejecting-analyst"
    }

    fn supports(&self, capability: Capability) -> bool {
        capability == Capability::BrandAnalysis
    }

    async fn call(&self, _request: &ServiceRequest) -> Result<ServiceResponse, ServiceError> {
        if self.transient {
            Err(ServiceError::transient(Capability::BrandAnalysis, "overloaded"))
        } else {
            Err(ServiceError::permanent(Capability::BrandAnalysis, "unsupported logo"))
        }
    }
}

fn invoker(registry: ServiceRegistry) -> Invoker {
    let retry = RetryPolicy {
        max_attempts: 2,
        initial_delay_ms: 1,
        ..RetryPolicy::default()
    };
    Invoker::new(registry, 2, retry, Duration::from_secs(5))
}

fn local() -> Invoker {
    invoker(ServiceRegistry::new().bind_all(Arc::new(LocalStudio::new())))
}

fn keywords() -> Vec<String> {
    vec!["Italian".to_string(), "Restaurant".to_string()]
}

fn write_logo(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

#[tokio::test]
async fn test_no_brand_uses_keyword_style_without_calls() {
    let invoker = local();
    let agent = BrandGroundingAgent::new();

    let style = agent
        .ground(&invoker, &keywords(), &BrandInput::default())
        .await
        .unwrap();

    assert_eq!(style, agent.default_style(&keywords()));
    assert_eq!(invoker.calls_made(), 0);
}

#[tokio::test]
async fn test_same_logo_grounds_same_style() {
    let temp = TempDir::new().unwrap();
    let logo = write_logo(&temp, "logo.png", b"trattoria-logo");
    let brand = BrandInput {
        logo: Some(logo),
        marketing: Vec::new(),
    };
    let agent = BrandGroundingAgent::new();

    let first = agent.ground(&local(), &keywords(), &brand).await.unwrap();
    let second = agent.ground(&local(), &keywords(), &brand).await.unwrap();
    assert_eq!(first, second);

    let other = BrandInput {
        logo: Some(write_logo(&temp, "other.png", b"pizzeria-logo")),
        marketing: Vec::new(),
    };
    let third = agent.ground(&local(), &keywords(), &other).await.unwrap();
    assert_ne!(first.palette, third.palette);
}

#[tokio::test]
async fn test_marketing_material_changes_style() {
    let temp = TempDir::new().unwrap();
    let logo = write_logo(&temp, "logo.png", b"trattoria-logo");
    let flyer = write_logo(&temp, "flyer.pdf", b"summer menu flyer");
    let agent = BrandGroundingAgent::new();

    let logo_only = BrandInput {
        logo: Some(logo.clone()),
        marketing: Vec::new(),
    };
    let with_flyer = BrandInput {
        logo: Some(logo),
        marketing: vec![flyer],
    };

    let a = agent.ground(&local(), &keywords(), &logo_only).await.unwrap();
    let b = agent.ground(&local(), &keywords(), &with_flyer).await.unwrap();
    assert_ne!(a.palette, b.palette);
}

#[tokio::test]
async fn test_rejected_brand_falls_back_to_default_style() {
    let temp = TempDir::new().unwrap();
    let brand = BrandInput {
        logo: Some(write_logo(&temp, "logo.png", b"logo")),
        marketing: Vec::new(),
    };
    let registry = ServiceRegistry::new().bind(
        Capability::BrandAnalysis,
        Arc::new(RejectingAnalyst { transient: false }),
    );
    let invoker = invoker(registry);
    let agent = BrandGroundingAgent::new();

    let style = agent.ground(&invoker, &keywords(), &brand).await.unwrap();

    assert_eq!(style, agent.default_style(&keywords()));
    assert_eq!(invoker.calls_made(), 1);
}

#[tokio::test]
async fn test_transient_brand_failure_propagates() {
    let temp = TempDir::new().unwrap();
    let brand = BrandInput {
        logo: Some(write_logo(&temp, "logo.png", b"logo")),
        marketing: Vec::new(),
    };
    let registry = ServiceRegistry::new().bind(
        Capability::BrandAnalysis,
        Arc::new(RejectingAnalyst { transient: true }),
    );
    let invoker = invoker(registry);

    let failure = BrandGroundingAgent::new()
        .ground(&invoker, &keywords(), &brand)
        .await
        .unwrap_err();

    assert!(failure.error.is_transient());
    assert_eq!(failure.attempts, 2);
    assert_eq!(invoker.calls_made(), 2);
}
