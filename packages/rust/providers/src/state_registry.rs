//! Secretary-of-State business registry search.
//!
//! Upstream searches may run as long-lived jobs: the first call answers with
//! a `retryId` and a pending status, and the caller re-issues the search with
//! that id until it completes. The engine's polling client drives that loop;
//! this provider only classifies each response.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use prospector_shared::{
    Cents, Entity, EntityField, Provider, ProviderCall, Result, SearchParams, ValidationResult,
};

use crate::http::{ApiKey, HttpOptions, JsonRequest, build_client, get_json};
use crate::similarity::best_match;

pub const NAME: &str = "state-registry";

/// Name similarity at or above which the registry corroborates the name.
const NAME_MATCH_THRESHOLD: u8 = 80;

const PENDING_STATUSES: &[&str] = &["pending", "retry", "processing", "queued", "in-progress"];
const FAILED_STATUSES: &[&str] = &[
    "failed",
    "error",
    "notfound",
    "badrequest",
    "cancelled",
    "timeout",
];
const COMPLETED_STATUSES: &[&str] = &["complete", "completed", "success", "succeeded", "ok"];

const STATE_NAMES: &[(&str, &str)] = &[
    ("alabama", "al"),
    ("alaska", "ak"),
    ("arizona", "az"),
    ("arkansas", "ar"),
    ("california", "ca"),
    ("colorado", "co"),
    ("connecticut", "ct"),
    ("district of columbia", "dc"),
    ("washington dc", "dc"),
    ("delaware", "de"),
    ("florida", "fl"),
    ("georgia", "ga"),
    ("hawaii", "hi"),
    ("idaho", "id"),
    ("illinois", "il"),
    ("indiana", "in"),
    ("iowa", "ia"),
    ("kansas", "ks"),
    ("kentucky", "ky"),
    ("louisiana", "la"),
    ("maine", "me"),
    ("maryland", "md"),
    ("massachusetts", "ma"),
    ("michigan", "mi"),
    ("minnesota", "mn"),
    ("mississippi", "ms"),
    ("missouri", "mo"),
    ("montana", "mt"),
    ("nebraska", "ne"),
    ("nevada", "nv"),
    ("new hampshire", "nh"),
    ("new jersey", "nj"),
    ("new mexico", "nm"),
    ("new york", "ny"),
    ("north carolina", "nc"),
    ("north dakota", "nd"),
    ("ohio", "oh"),
    ("oklahoma", "ok"),
    ("oregon", "or"),
    ("pennsylvania", "pa"),
    ("rhode island", "ri"),
    ("south carolina", "sc"),
    ("south dakota", "sd"),
    ("tennessee", "tn"),
    ("texas", "tx"),
    ("utah", "ut"),
    ("vermont", "vt"),
    ("virginia", "va"),
    ("washington", "wa"),
    ("west virginia", "wv"),
    ("wisconsin", "wi"),
    ("wyoming", "wy"),
];

/// Normalise a US state name or code to its lower-case two-letter code.
pub fn normalize_state(value: &str) -> Option<&'static str> {
    let lower = value.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }

    let cleaned = lower
        .chars()
        .map(|c| if c.is_ascii_lowercase() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    STATE_NAMES
        .iter()
        .find(|(name, code)| *code == lower || *name == lower || *name == cleaned)
        .map(|(_, code)| *code)
}

/// Status classification of one registry response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCategory {
    Completed,
    Pending,
    Failed,
}

impl StatusCategory {
    fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Pending => "pending",
            Self::Failed => "failed",
        }
    }
}

/// Classify a registry response by HTTP status and body.
pub fn classify(http_status: u16, body: &Value) -> StatusCategory {
    if http_status == 202 {
        return StatusCategory::Pending;
    }
    if http_status >= 400 {
        return StatusCategory::Failed;
    }

    let body_code = match body.get("statusCode") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    if body_code.is_some_and(|code| code >= 400) {
        return StatusCategory::Failed;
    }

    let status = body
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_lowercase();

    if PENDING_STATUSES.contains(&status.as_str()) {
        return StatusCategory::Pending;
    }
    if FAILED_STATUSES.contains(&status.as_str()) {
        return StatusCategory::Failed;
    }
    if COMPLETED_STATUSES.contains(&status.as_str()) {
        return StatusCategory::Completed;
    }

    let has_retry_id = body.get("retryId").is_some_and(|v| !v.is_null());
    let has_results = body
        .get("results")
        .and_then(Value::as_array)
        .is_some_and(|r| !r.is_empty());
    if has_retry_id && !has_results {
        return StatusCategory::Pending;
    }

    StatusCategory::Completed
}

/// Upstream statuses that mean the search itself failed, reported as a
/// negative result rather than an error.
const DEFINITIVE_FAILURE_STATUSES: &[u16] = &[400, 404, 422];

/// Paid, polling-capable registry provider.
#[derive(Debug)]
pub struct StateRegistryProvider {
    client: Client,
    opts: HttpOptions,
    base_url: String,
    api_key: ApiKey,
    cost: Cents,
}

impl StateRegistryProvider {
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

    fn build_request(
        &self,
        entity: &Entity,
        state: &str,
        params: &SearchParams,
        retry_token: Option<&str>,
    ) -> JsonRequest {
        let live = if params.live_data { "true" } else { "false" };
        let request = JsonRequest::get(format!("{}/search", self.base_url))
            .allow(DEFINITIVE_FAILURE_STATUSES)
            .header("x-api-key", self.api_key.expose())
            .query("state", state)
            .query("liveData", live);

        match retry_token {
            Some(token) => request.query("retryId", token),
            None => request.query("searchQuery", entity.name().unwrap_or_default()),
        }
    }

    fn interpret(
        &self,
        entity: &Entity,
        state: &str,
        status: u16,
        body: &Value,
    ) -> ValidationResult {
        let category = classify(status, body);
        let results = body
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let titles: Vec<&str> = results
            .iter()
            .filter_map(|r| {
                r.get("title")
                    .or_else(|| r.get("searchResultTitle"))
                    .and_then(Value::as_str)
            })
            .collect();
        let confidence = best_match(entity.name().unwrap_or_default(), titles.iter().copied());
        let address_match = results
            .first()
            .and_then(|r| r.get("addressMatch"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let payload = json!({
            "statusCategory": category.as_str(),
            "status": body.get("status").cloned().unwrap_or(Value::Null),
            "retryId": body.get("retryId").cloned().unwrap_or(Value::Null),
            "state": state,
            "httpStatus": status,
            "confidence": confidence,
            "nameAvailable": body.get("nameAvailable").cloned().unwrap_or(Value::Null),
            "results": results,
            "possibleAlternatives": body.get("possibleAlternatives").cloned().unwrap_or(json!([])),
        });

        match category {
            StatusCategory::Pending => {
                ValidationResult::failure(NAME, "registry search pending", payload)
            }
            StatusCategory::Failed => {
                let message = body
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("registry search failed");
                ValidationResult::failure(NAME, message, payload)
            }
            StatusCategory::Completed if results.is_empty() => {
                ValidationResult::failure(NAME, "no matching registry record", payload)
            }
            StatusCategory::Completed => {
                let mut result = ValidationResult::success(NAME, payload);
                if confidence >= NAME_MATCH_THRESHOLD {
                    result = result.verified(EntityField::Name);
                }
                if address_match {
                    result = result.verified(EntityField::Address);
                }
                result
            }
        }
    }
}

#[async_trait]
impl Provider for StateRegistryProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn cost(&self) -> Cents {
        self.cost
    }

    fn is_relevant(&self, entity: &Entity, params: &SearchParams) -> bool {
        entity.name().is_some()
            && entity
                .state_or(params)
                .and_then(normalize_state)
                .is_some()
    }

    #[instrument(
        skip_all,
        fields(provider = NAME, entity = %call.entity.id, retry = call.retry_token.is_some())
    )]
    async fn validate(&self, call: ProviderCall<'_>) -> Result<ValidationResult> {
        let Some(state) = call.entity.state_or(call.params).and_then(normalize_state) else {
            return Ok(ValidationResult::failure(
                NAME,
                "US state is required for registry lookup",
                Value::Null,
            ));
        };

        let request = self.build_request(call.entity, state, call.params, call.retry_token);
        let response = get_json(&self.client, &self.opts, NAME, &request).await?;
        let result = self.interpret(call.entity, state, response.status, &response.body);

        debug!(
            status = response.status,
            category = result.payload["statusCategory"].as_str().unwrap_or(""),
            "registry response classified"
        );
        Ok(result)
    }

    fn supports_polling(&self) -> bool {
        true
    }

    fn is_pending(&self, result: &ValidationResult) -> bool {
        result.payload.get("statusCategory").and_then(Value::as_str) == Some("pending")
    }

    fn cache_identity(&self, _entity: &Entity, params: &SearchParams) -> Vec<String> {
        vec![params.live_data.to_string()]
    }

    fn retry_token(&self, result: &ValidationResult) -> Option<String> {
        result
            .payload
            .get("retryId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(String::from)
    }
}
