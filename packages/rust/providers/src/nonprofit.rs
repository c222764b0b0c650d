//! Nonprofit registry lookup by organisation name.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::instrument;

use prospector_shared::{
    Entity, EntityField, Provider, ProviderCall, Result, SearchParams, ValidationResult,
};

use crate::http::{HttpOptions, JsonRequest, build_client, get_json};
use crate::similarity::best_match;

pub const NAME: &str = "nonprofit-registry";

/// Confidence at or above which the registry corroborates the name.
const NAME_MATCH_THRESHOLD: u8 = 80;

/// Words in a name or category that suggest a nonprofit.
const NONPROFIT_INDICATORS: &[&str] = &[
    "foundation",
    "nonprofit",
    "non-profit",
    "charity",
    "charitable",
    "association",
    "society",
    "institute",
    "center",
    "council",
    "organization",
    "trust",
    "fund",
    "relief",
    "aid",
    "support",
    "community",
    "education",
    "research",
    "religious",
    "church",
];

/// Whether the entity's name or category carries a nonprofit indicator word.
pub fn looks_nonprofit(entity: &Entity) -> bool {
    let text = format!(
        "{} {}",
        entity.name().unwrap_or_default(),
        entity.category.as_deref().unwrap_or_default()
    )
    .to_lowercase();

    text.split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .any(|word| NONPROFIT_INDICATORS.contains(&word))
}

/// Free nonprofit registry provider.
#[derive(Debug)]
pub struct NonprofitProvider {
    client: Client,
    opts: HttpOptions,
    base_url: String,
}

impl NonprofitProvider {
    pub fn new(base_url: impl Into<String>, opts: HttpOptions) -> Result<Self> {
        Ok(Self {
            client: build_client(&opts)?,
            opts,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Provider for NonprofitProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn is_relevant(&self, entity: &Entity, _params: &SearchParams) -> bool {
        entity.name().is_some() && looks_nonprofit(entity)
    }

    /// The lookup is by name only.
    fn cache_identity(&self, _entity: &Entity, _params: &SearchParams) -> Vec<String> {
        Vec::new()
    }

    #[instrument(skip_all, fields(provider = NAME, entity = %call.entity.id))]
    async fn validate(&self, call: ProviderCall<'_>) -> Result<ValidationResult> {
        let Some(name) = call.entity.name() else {
            return Ok(ValidationResult::failure(NAME, "no business name provided", Value::Null));
        };

        let request = JsonRequest::get(format!("{}/search.json", self.base_url))
            .query("q", name)
            .allow(&[404]);
        let response = get_json(&self.client, &self.opts, NAME, &request).await?;

        let organizations = response
            .body
            .get("organizations")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        if organizations.is_empty() {
            return Ok(ValidationResult::failure(
                NAME,
                "no matching nonprofit",
                json!({ "found": false, "confidence": 0 }),
            ));
        }

        let confidence = best_match(
            name,
            organizations
                .iter()
                .filter_map(|o| o.get("name").and_then(Value::as_str)),
        );
        let top = &organizations[0];
        let payload = json!({
            "found": true,
            "confidence": confidence,
            "ein": top.get("ein").cloned().unwrap_or(Value::Null),
            "city": top.get("city").cloned().unwrap_or(Value::Null),
            "state": top.get("state").cloned().unwrap_or(Value::Null),
            "classification": top.get("ntee_code").cloned().unwrap_or(Value::Null),
            "results": organizations,
        });

        let result = ValidationResult::success(NAME, payload);
        Ok(if confidence >= NAME_MATCH_THRESHOLD {
            result.verified(EntityField::Name)
        } else {
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn provider(base_url: &str) -> NonprofitProvider {
        let opts = HttpOptions {
            timeout: Duration::from_secs(5),
            network_retries: 0,
            backoff_base: Duration::from_millis(1),
        };
        NonprofitProvider::new(base_url, opts).unwrap()
    }

    #[test]
    fn indicators_match_whole_words() {
        assert!(looks_nonprofit(&Entity::named("Bay Area Food Relief")));
        assert!(looks_nonprofit(&Entity::named("First Baptist Church")));

        let mut entity = Entity::named("Sunrise Dental");
        entity.category = Some("Non-Profit clinic".into());
        assert!(looks_nonprofit(&entity));

        assert!(!looks_nonprofit(&Entity::named("Maid Brigade")));
        assert!(!looks_nonprofit(&Entity::named("Acme Plumbing")));
    }

    #[tokio::test]
    async fn match_corroborates_name() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::path("/search.json"))
            .and(wiremock::matchers::query_param("q", "Habitat for Humanity Foundation"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
                "organizations": [
                    {
                        "ein": 123456789,
                        "name": "HABITAT FOR HUMANITY FOUNDATION",
                        "city": "Atlanta",
                        "state": "GA"
                    }
                ]
            })))
            .mount(&server)
            .await;

        let p = provider(&server.uri());
        let entity = Entity::named("Habitat for Humanity Foundation");
        let params = SearchParams::default();
        let result = p.validate(ProviderCall::new(&entity, &params)).await.unwrap();

        assert!(result.success);
        assert_eq!(result.payload["confidence"], 100);
        assert_eq!(result.payload["city"], "Atlanta");
        assert!(result.verified_fields.contains(&EntityField::Name));
    }

    #[tokio::test]
    async fn not_found_is_a_negative_result() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::path("/search.json"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let p = provider(&server.uri());
        let entity = Entity::named("Tiny Community Fund");
        let params = SearchParams::default();
        let result = p.validate(ProviderCall::new(&entity, &params)).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.error_message.as_deref(), Some("no matching nonprofit"));
    }
}
