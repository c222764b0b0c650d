//! Contact email discovery by company domain.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::instrument;

use prospector_shared::{
    Cents, Entity, EntityField, Provider, ProviderCall, Result, SearchParams, ValidationResult,
};

use crate::http::{ApiKey, HttpOptions, JsonRequest, build_client, get_json};

pub const NAME: &str = "email-discovery";

/// Results requested per domain search.
const SEARCH_LIMIT: &str = "10";

/// Mailbox prefixes that reach a shared inbox rather than a person.
const GENERIC_PREFIXES: &[&str] = &[
    "info",
    "contact",
    "support",
    "admin",
    "sales",
    "marketing",
    "hello",
    "mail",
];

/// Discovered address kept after filtering.
fn is_useful_email(email: &Value) -> bool {
    let Some(value) = email.get("value").and_then(Value::as_str) else {
        return false;
    };
    let local = value.split('@').next().unwrap_or_default().to_lowercase();
    if GENERIC_PREFIXES.contains(&local.as_str()) {
        return false;
    }

    let personal = email.get("type").and_then(Value::as_str) == Some("personal");
    let confident = email
        .get("confidence")
        .and_then(Value::as_u64)
        .is_some_and(|c| c > 50);
    personal || confident
}

/// Paid domain-search provider.
#[derive(Debug)]
pub struct EmailDiscoveryProvider {
    client: Client,
    opts: HttpOptions,
    base_url: String,
    api_key: ApiKey,
    cost: Cents,
}

impl EmailDiscoveryProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: ApiKey,
        cost: Cents,
        opts: HttpOptions,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(&opts)?,
            opts,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            cost,
        })
    }
}

#[async_trait]
impl Provider for EmailDiscoveryProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn cost(&self) -> Cents {
        self.cost
    }

    fn is_relevant(&self, entity: &Entity, _params: &SearchParams) -> bool {
        entity.has_real_website()
    }

    #[instrument(skip_all, fields(provider = NAME, entity = %call.entity.id))]
    async fn validate(&self, call: ProviderCall<'_>) -> Result<ValidationResult> {
        let Some(domain) = call.entity.domain() else {
            return Ok(ValidationResult::failure(NAME, "entity has no website domain", Value::Null));
        };

        let request = JsonRequest::get(format!("{}/domain-search", self.base_url))
            .query("domain", domain.as_str())
            .query("api_key", self.api_key.expose())
            .query("limit", SEARCH_LIMIT);
        let response = get_json(&self.client, &self.opts, NAME, &request).await?;

        let data = response.body.get("data").cloned().unwrap_or(Value::Null);
        let emails: Vec<Value> = data
            .get("emails")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter(|e| is_useful_email(e)).cloned().collect())
            .unwrap_or_default();

        let confidence = emails
            .iter()
            .map(|e| e.get("confidence").and_then(Value::as_u64).unwrap_or(50))
            .max()
            .unwrap_or(0);

        let known_email = call.entity.email().map(str::to_lowercase);
        let matches_known = known_email.as_deref().is_some_and(|known| {
            emails
                .iter()
                .filter_map(|e| e.get("value").and_then(Value::as_str))
                .any(|v| v.eq_ignore_ascii_case(known))
        });

        let found = !emails.is_empty();
        let payload = json!({
            "domain": domain,
            "emails": emails,
            "pattern": data.get("pattern").cloned().unwrap_or(Value::Null),
            "organization": data.get("organization").cloned().unwrap_or(Value::Null),
            "confidence": confidence,
        });

        if !found {
            return Ok(ValidationResult::failure(NAME, "no contact emails found", payload));
        }

        let result = ValidationResult::success(NAME, payload);
        Ok(if matches_known {
            result.verified(EntityField::Email)
        } else {
            result
        })
    }
}
