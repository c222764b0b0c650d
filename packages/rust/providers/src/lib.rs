//! Reference data providers and the HTTP plumbing they share.
//!
//! This crate provides:
//! - [`http`]: client builder, JSON GET with transient-failure retries, SSRF guard
//! - [`state_registry`]: Secretary-of-State registry search (polling-capable)
//! - [`nonprofit`], [`email_discovery`], [`email_verification`], [`website_check`]
//! - [`ProviderFactory`]: builds the enabled providers from configuration

pub mod email_discovery;
pub mod email_verification;
pub mod factory;
pub mod http;
pub mod nonprofit;
pub mod similarity;
pub mod state_registry;
pub mod website_check;

pub use email_discovery::EmailDiscoveryProvider;
pub use email_verification::EmailVerificationProvider;
pub use factory::{KNOWN_PROVIDERS, ProviderFactory};
pub use http::{ApiKey, HttpOptions};
pub use nonprofit::NonprofitProvider;
pub use state_registry::{StateRegistryProvider, normalize_state};
pub use website_check::WebsiteCheckProvider;
