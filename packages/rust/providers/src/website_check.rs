//! Homepage reachability check with `mailto:` scraping.

use std::collections::BTreeSet;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};
use url::Url;

use prospector_shared::{
    Entity, EntityField, Provider, ProviderCall, Result, SearchParams, ValidationResult,
};

use crate::http::{HttpOptions, build_client, is_ssrf_target};

pub const NAME: &str = "website-check";

/// Free provider that fetches the entity's homepage.
#[derive(Debug)]
pub struct WebsiteCheckProvider {
    client: Client,
    /// Allow localhost/private IPs (for tests against mock servers).
    allow_private_hosts: bool,
}

impl WebsiteCheckProvider {
    pub fn new(opts: HttpOptions) -> Result<Self> {
        Ok(Self {
            client: build_client(&opts)?,
            allow_private_hosts: false,
        })
    }

    /// Disable SSRF protection.
    pub fn allow_private_hosts(mut self) -> Self {
        self.allow_private_hosts = true;
        self
    }
}

/// Parse a website field into an absolute http(s) URL.
pub fn homepage_url(website: &str) -> Option<Url> {
    let website = website.trim();
    let candidate = if website.contains("://") {
        website.to_string()
    } else {
        format!("https://{website}")
    };
    Url::parse(&candidate).ok().filter(|u| u.host_str().is_some())
}

/// Collect `mailto:` addresses from an HTML document, lower-cased.
fn extract_emails(html: &str) -> BTreeSet<String> {
    let doc = Html::parse_document(html);
    let Ok(selector) = Selector::parse(r#"a[href^="mailto:"]"#) else {
        return BTreeSet::new();
    };

    doc.select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| href.strip_prefix("mailto:"))
        .map(|addr| addr.split('?').next().unwrap_or_default().trim().to_lowercase())
        .filter(|addr| addr.contains('@'))
        .collect()
}

#[async_trait]
impl Provider for WebsiteCheckProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn is_relevant(&self, entity: &Entity, _params: &SearchParams) -> bool {
        entity.has_real_website()
    }

    #[instrument(skip_all, fields(provider = NAME, entity = %call.entity.id))]
    async fn validate(&self, call: ProviderCall<'_>) -> Result<ValidationResult> {
        let Some(url) = call.entity.website().and_then(homepage_url) else {
            return Ok(ValidationResult::failure(NAME, "malformed website", Value::Null));
        };

        if !self.allow_private_hosts && is_ssrf_target(&url) {
            warn!(%url, "SSRF protection: blocked");
            return Ok(ValidationResult::failure(
                NAME,
                "website points at a private address",
                json!({ "url": url.as_str() }),
            ));
        }

        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(%url, error = %e, "website unreachable");
                return Ok(ValidationResult::failure(
                    NAME,
                    "website unreachable",
                    json!({ "url": url.as_str(), "reachable": false }),
                ));
            }
        };

        let status = response.status();
        let final_url = response.url().to_string();
        if !(status.is_success() || status.is_redirection()) {
            return Ok(ValidationResult::failure(
                NAME,
                format!("website returned HTTP {}", status.as_u16()),
                json!({ "url": url.as_str(), "reachable": false, "httpStatus": status.as_u16() }),
            ));
        }

        let html = response.text().await.unwrap_or_default();
        let emails = extract_emails(&html);
        let known_email = call.entity.email().map(str::to_lowercase);
        let email_on_page = known_email.is_some_and(|e| emails.contains(&e));

        let payload = json!({
            "url": url.as_str(),
            "finalUrl": final_url,
            "reachable": true,
            "httpStatus": status.as_u16(),
            "emails": emails,
        });

        let result = ValidationResult::success(NAME, payload).verified(EntityField::Website);
        Ok(if email_on_page {
            result.verified(EntityField::Email)
        } else {
            result
        })
    }
}
