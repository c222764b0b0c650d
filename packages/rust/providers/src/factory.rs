//! Build the configured providers.

use std::sync::Arc;

use tracing::{debug, warn};

use prospector_shared::{
    AppConfig, Cents, ProspectorError, Provider, ProviderConfig, Result, validate_api_key,
};

use crate::email_discovery::{self, EmailDiscoveryProvider};
use crate::email_verification::{self, EmailVerificationProvider};
use crate::http::{ApiKey, HttpOptions};
use crate::nonprofit::{self, NonprofitProvider};
use crate::state_registry::{self, StateRegistryProvider};
use crate::website_check::{self, WebsiteCheckProvider};

/// Names of every provider this crate can build.
pub const KNOWN_PROVIDERS: &[&str] = &[
    state_registry::NAME,
    nonprofit::NAME,
    email_discovery::NAME,
    email_verification::NAME,
    website_check::NAME,
];

/// Builds providers from `[providers.<name>]` configuration entries.
pub struct ProviderFactory;

impl ProviderFactory {
    /// Build every enabled provider, ordered by name.
    ///
    /// Providers whose API key env var is unset are skipped with a warning,
    /// as are entries naming an unknown provider.
    pub fn from_config(config: &AppConfig) -> Result<Vec<Arc<dyn Provider>>> {
        let opts = HttpOptions::from(&config.http);
        let mut providers: Vec<Arc<dyn Provider>> = Vec::new();

        for (name, entry) in &config.providers {
            if !entry.enabled {
                debug!(provider = %name, "provider disabled");
                continue;
            }
            if !KNOWN_PROVIDERS.contains(&name.as_str()) {
                warn!(provider = %name, "unknown provider in config, skipping");
                continue;
            }

            let key = match validate_api_key(config, name) {
                Ok(key) => key.map(ApiKey::new),
                Err(e) => {
                    warn!(provider = %name, error = %e, "skipping provider");
                    continue;
                }
            };

            providers.push(build(name, entry, key, opts.clone())?);
        }

        Ok(providers)
    }
}

fn build(
    name: &str,
    entry: &ProviderConfig,
    key: Option<ApiKey>,
    opts: HttpOptions,
) -> Result<Arc<dyn Provider>> {
    let cost = Cents(entry.cost_cents);
    let base_url = entry.base_url.clone().unwrap_or_default();
    let key = key.unwrap_or_else(|| ApiKey::new(""));

    let provider: Arc<dyn Provider> = match name {
        state_registry::NAME => Arc::new(StateRegistryProvider::new(base_url, key, cost, opts)?),
        email_discovery::NAME => Arc::new(EmailDiscoveryProvider::new(base_url, key, cost, opts)?),
        email_verification::NAME => {
            Arc::new(EmailVerificationProvider::new(base_url, key, cost, opts)?)
        }
        nonprofit::NAME => Arc::new(NonprofitProvider::new(base_url, opts)?),
        website_check::NAME => Arc::new(WebsiteCheckProvider::new(opts)?),
        other => {
            return Err(ProspectorError::config(format!(
                "no builder for provider '{other}'"
            )));
        }
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_keyless_providers_and_skips_missing_keys() {
        let mut config = AppConfig::default();
        for entry in config.providers.values_mut() {
            if entry.api_key_env.is_some() {
                entry.api_key_env = Some("PROSPECTOR_TEST_UNSET_KEY_98765".into());
            }
        }

        let providers = ProviderFactory::from_config(&config).unwrap();
        let names: Vec<&str> = providers.iter().map(|p| p.name()).collect();

        assert_eq!(names, vec!["nonprofit-registry", "website-check"]);
    }

    #[test]
    fn disabled_and_unknown_entries_are_skipped() {
        let mut config = AppConfig::default();
        config.providers.retain(|name, _| name == "website-check" || name == "nonprofit-registry");
        if let Some(entry) = config.providers.get_mut("nonprofit-registry") {
            entry.enabled = false;
        }
        config.providers.insert(
            "mystery-source".into(),
            ProviderConfig {
                enabled: true,
                api_key_env: None,
                base_url: None,
                cost_cents: 0,
            },
        );

        let providers = ProviderFactory::from_config(&config).unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].name(), "website-check");
    }

    #[test]
    fn build_rejects_names_without_a_builder() {
        let entry = ProviderConfig {
            enabled: true,
            api_key_env: None,
            base_url: None,
            cost_cents: 0,
        };

        let err = build("mystery-source", &entry, None, HttpOptions::default()).unwrap_err();
        assert!(err.to_string().contains("no builder for provider 'mystery-source'"));

        let website = build(website_check::NAME, &entry, None, HttpOptions::default()).unwrap();
        assert_eq!(website.name(), website_check::NAME);
    }

    #[test]
    fn configured_cost_is_applied() {
        let mut config = AppConfig::default();
        config.providers.retain(|name, _| name == "state-registry");
        if let Some(entry) = config.providers.get_mut("state-registry") {
            entry.api_key_env = Some("PATH".into());
            entry.cost_cents = 75;
        }

        let providers = ProviderFactory::from_config(&config).unwrap();
        assert_eq!(providers[0].cost(), Cents(75));
        assert!(providers[0].supports_polling());
    }
}
