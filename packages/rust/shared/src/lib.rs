//! Shared types, error model, provider trait, and configuration for Prospector.
//!
//! This crate is the foundation depended on by all other Prospector crates.
//! It provides:
//! - [`ProspectorError`]: the unified error type
//! - Domain types ([`Entity`], [`SearchParams`], [`ValidationResult`], [`Cents`])
//! - The [`Provider`] trait implemented by every data source
//! - Configuration ([`AppConfig`], [`EngineConfig`], config loading)

pub mod config;
pub mod error;
pub mod provider;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BudgetConfig, BudgetScope, EngineConfig, EngineSection, HttpConfig, PollingConfig,
    ProviderConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    validate_api_key,
};
pub use error::{ProspectorError, Result};
pub use provider::{Provider, ProviderCall};
pub use types::{
    Cents, Entity, EntityField, EntityId, PLACEHOLDER_DOMAINS, PollOutcome, PollSummary,
    SearchParams, ValidationResult, is_placeholder_domain,
};
