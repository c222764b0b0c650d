//! Single-address email deliverability check.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::instrument;

use prospector_shared::{
    Cents, Entity, EntityField, ProspectorError, Provider, ProviderCall, Result, SearchParams,
    ValidationResult,
};

use crate::http::{ApiKey, HttpOptions, JsonRequest, build_client, get_json};

pub const NAME: &str = "email-verification";

/// Confidence at or above which a `valid` address counts as deliverable.
const DELIVERABLE_THRESHOLD: i64 = 80;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));

/// Whether `email` is syntactically plausible.
pub fn is_plausible_email(email: &str) -> bool {
    EMAIL_RE.is_match(email.trim())
}

/// Confidence 0-100 for a verification verdict and its flags.
pub fn verdict_confidence(result: &str, flags: &[&str]) -> i64 {
    let base = match result {
        "valid" => 95,
        "catchall" => 75,
        "unknown" => 50,
        "disposable" => 10,
        "invalid" => 5,
        _ => 0,
    };
    let adjusted = flags.iter().fold(base, |acc, flag| {
        acc + match *flag {
            "has_dns" | "has_dns_mx" => 5,
            "smtp_connectable" => 10,
            "role_account" => -10,
            "free_email_host" => -5,
            _ => 0,
        }
    });
    adjusted.clamp(0, 100)
}

/// Paid email verification provider.
#[derive(Debug)]
pub struct EmailVerificationProvider {
    client: Client,
    opts: HttpOptions,
    base_url: String,
    api_key: ApiKey,
    cost: Cents,
}

impl EmailVerificationProvider {
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
impl Provider for EmailVerificationProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn cost(&self) -> Cents {
        self.cost
    }

    fn is_relevant(&self, entity: &Entity, _params: &SearchParams) -> bool {
        entity.email().is_some_and(is_plausible_email)
    }

    #[instrument(skip_all, fields(provider = NAME, entity = %call.entity.id))]
    async fn validate(&self, call: ProviderCall<'_>) -> Result<ValidationResult> {
        let Some(email) = call.entity.email() else {
            return Ok(ValidationResult::failure(NAME, "entity has no email", Value::Null));
        };

        let request = JsonRequest::get(format!("{}/single/check", self.base_url))
            .query("key", self.api_key.expose())
            .query("email", email);
        let response = get_json(&self.client, &self.opts, NAME, &request).await?;
        let body = &response.body;

        if body.get("status").and_then(Value::as_str) != Some("success") {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("verification request rejected");
            return Err(ProspectorError::provider(NAME, message));
        }

        let verdict = body.get("result").and_then(Value::as_str).unwrap_or("unknown");
        let flags: Vec<&str> = body
            .get("flags")
            .and_then(Value::as_array)
            .map(|f| f.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        let confidence = verdict_confidence(verdict, &flags);
        let deliverable = verdict == "valid" && confidence >= DELIVERABLE_THRESHOLD;

        let payload = json!({
            "email": email,
            "result": verdict,
            "flags": flags,
            "confidence": confidence,
            "deliverable": deliverable,
            "suggestedCorrection": body.get("suggested_correction").cloned().unwrap_or(Value::Null),
        });

        Ok(if deliverable {
            ValidationResult::success(NAME, payload).verified(EntityField::Email)
        } else {
            ValidationResult::failure(NAME, format!("email is {verdict}"), payload)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn provider(base_url: &str) -> EmailVerificationProvider {
        let opts = HttpOptions {
            timeout: Duration::from_secs(5),
            network_retries: 0,
            backoff_base: Duration::from_millis(1),
        };
        EmailVerificationProvider::new(base_url, ApiKey::new("nb-key"), Cents(1), opts).unwrap()
    }

    fn entity(email: &str) -> Entity {
        let mut entity = Entity::named("Acme Tools");
        entity.email = Some(email.into());
        entity
    }

    #[test]
    fn plausible_email_syntax() {
        assert!(is_plausible_email("jane@acmetools.io"));
        assert!(!is_plausible_email("jane@localhost"));
        assert!(!is_plausible_email("not an email"));
    }

    #[test]
    fn confidence_applies_flags_and_clamps() {
        assert_eq!(verdict_confidence("valid", &[]), 95);
        assert_eq!(verdict_confidence("valid", &["has_dns", "smtp_connectable"]), 100);
        assert_eq!(verdict_confidence("valid", &["role_account"]), 85);
        assert_eq!(verdict_confidence("invalid", &["role_account"]), 0);
        assert_eq!(verdict_confidence("mystery", &[]), 0);
    }

    #[tokio::test]
    async fn valid_address_is_verified() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::path("/single/check"))
            .and(wiremock::matchers::query_param("email", "jane@acmetools.io"))
            .and(wiremock::matchers::query_param("key", "nb-key"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "result": "valid",
                "flags": ["has_dns", "has_dns_mx"]
            })))
            .mount(&server)
            .await;

        let p = provider(&server.uri());
        let entity = entity("jane@acmetools.io");
        let params = SearchParams::default();
        let result = p.validate(ProviderCall::new(&entity, &params)).await.unwrap();

        assert!(result.success);
        assert_eq!(result.payload["confidence"], 100);
        assert!(result.verified_fields.contains(&EntityField::Email));
    }

    #[tokio::test]
    async fn invalid_address_is_a_negative_result() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::path("/single/check"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "result": "invalid"
            })))
            .mount(&server)
            .await;

        let p = provider(&server.uri());
        let entity = entity("nobody@acmetools.io");
        let params = SearchParams::default();
        let result = p.validate(ProviderCall::new(&entity, &params)).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.error_message.as_deref(), Some("email is invalid"));
    }

    #[tokio::test]
    async fn rejected_request_is_an_error() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::path("/single/check"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
                "status": "auth_failure",
                "message": "Invalid API key"
            })))
            .mount(&server)
            .await;

        let p = provider(&server.uri());
        let entity = entity("jane@acmetools.io");
        let params = SearchParams::default();
        let err = p.validate(ProviderCall::new(&entity, &params)).await.unwrap_err();

        assert!(err.to_string().contains("Invalid API key"));
    }
}
