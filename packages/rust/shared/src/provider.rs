//! The provider capability every data source implements.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Cents, Entity, SearchParams, ValidationResult};

/// Arguments for one provider call.
#[derive(Debug, Clone, Copy)]
pub struct ProviderCall<'a> {
    pub entity: &'a Entity,
    pub params: &'a SearchParams,
    /// Set when re-issuing a call for a pending upstream job.
    pub retry_token: Option<&'a str>,
}

impl<'a> ProviderCall<'a> {
    pub fn new(entity: &'a Entity, params: &'a SearchParams) -> Self {
        Self {
            entity,
            params,
            retry_token: None,
        }
    }

    pub fn with_retry_token(self, token: &'a str) -> Self {
        Self {
            retry_token: Some(token),
            ..self
        }
    }
}

/// A pluggable validation/enrichment source.
///
/// Providers are stateless across calls. `validate` returns `Ok` for
/// ordinary negative outcomes (not found, low confidence) and `Err` only for
/// transport or protocol failures, which the orchestrator records against
/// the provider without aborting sibling providers.
#[async_trait]
pub trait Provider: Send + Sync + std::fmt::Debug {
    /// Unique registry key.
    fn name(&self) -> &str;

    /// Estimated cost of one fresh call, reserved before the call is issued.
    fn cost(&self) -> Cents {
        Cents::ZERO
    }

    /// Whether this provider applies to the entity in this search context.
    /// Must be pure.
    fn is_relevant(&self, entity: &Entity, params: &SearchParams) -> bool;

    /// Perform the external call.
    async fn validate(&self, call: ProviderCall<'_>) -> Result<ValidationResult>;

    /// Whether `validate` can return a pending result that must be polled.
    fn supports_polling(&self) -> bool {
        false
    }

    /// Whether `result` reports server-side work still in progress.
    fn is_pending(&self, _result: &ValidationResult) -> bool {
        false
    }

    /// Token to pass back when re-issuing a pending call.
    fn retry_token(&self, _result: &ValidationResult) -> Option<String> {
        None
    }

    /// Entity values beyond name, state and address that this provider's
    /// result depends on. They are hashed into the provider's cache key.
    ///
    /// Defaults to the email and website domain.
    fn cache_identity(&self, entity: &Entity, _params: &SearchParams) -> Vec<String> {
        vec![
            entity.email().map(str::to_lowercase).unwrap_or_default(),
            entity.domain().unwrap_or_default(),
        ]
    }
}
