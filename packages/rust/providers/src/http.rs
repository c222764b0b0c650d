//! HTTP plumbing shared by providers.
//!
//! One client per provider, a JSON GET helper that retries rate limits,
//! server errors and timeouts with exponential backoff, and a redacting
//! wrapper for API keys.

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use url::Url;

use prospector_shared::{HttpConfig, ProspectorError, Result};

/// User-Agent string for provider requests.
pub const USER_AGENT: &str = concat!("Prospector/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Runtime HTTP options for providers.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retries for 429 / 5xx / timeouts.
    pub network_retries: u32,
    /// First backoff delay; doubled on every retry.
    pub backoff_base: Duration,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self::from(&HttpConfig::default())
    }
}

impl From<&HttpConfig> for HttpOptions {
    fn from(config: &HttpConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            network_retries: config.network_retries,
            backoff_base: Duration::from_secs(1),
        }
    }
}

/// API key that never shows up in `Debug` output or logs.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Build a reqwest client with appropriate settings.
pub fn build_client(opts: &HttpOptions) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(opts.timeout)
        .build()
        .map_err(|e| ProspectorError::Network(format!("failed to build HTTP client: {e}")))
}

// ---------------------------------------------------------------------------
// JSON GET
// ---------------------------------------------------------------------------

/// A GET request for a JSON API.
#[derive(Debug, Clone)]
pub struct JsonRequest {
    pub url: String,
    pub query: Vec<(&'static str, String)>,
    pub headers: Vec<(&'static str, String)>,
    /// Non-2xx statuses to hand back to the caller instead of failing.
    pub allow_statuses: &'static [u16],
}

impl JsonRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            allow_statuses: &[],
        }
    }

    pub fn query(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.query.push((key, value.into()));
        self
    }

    pub fn header(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((key, value.into()));
        self
    }

    pub fn allow(mut self, statuses: &'static [u16]) -> Self {
        self.allow_statuses = statuses;
        self
    }
}

/// A decoded JSON response.
#[derive(Debug, Clone)]
pub struct JsonResponse {
    pub status: u16,
    /// Parsed body; `Null` when empty, `{"rawBody": ..}` when not JSON.
    pub body: serde_json::Value,
}

/// Issue `request`, retrying 429 / 5xx / timeouts with exponential backoff.
///
/// 2xx and explicitly allowed statuses are returned; anything else becomes a
/// [`ProspectorError::Provider`] carrying the upstream `message` when present.
pub async fn get_json(
    client: &Client,
    opts: &HttpOptions,
    provider: &str,
    request: &JsonRequest,
) -> Result<JsonResponse> {
    let mut attempt: u32 = 0;

    loop {
        let mut builder = client
            .get(&request.url)
            .query(&request.query)
            .header(reqwest::header::ACCEPT, "application/json");
        for (key, value) in &request.headers {
            builder = builder.header(*key, value);
        }

        match builder.send().await {
            Ok(response) => {
                let status = response.status();
                let text = response.text().await.map_err(|e| {
                    ProspectorError::Network(format!("{}: body read failed: {e}", request.url))
                })?;
                let body = parse_body(&text);

                if status.is_success() || request.allow_statuses.contains(&status.as_u16()) {
                    debug!(provider, status = status.as_u16(), "upstream responded");
                    return Ok(JsonResponse {
                        status: status.as_u16(),
                        body,
                    });
                }

                if is_transient(status) && attempt < opts.network_retries {
                    backoff(provider, opts, attempt, &status.to_string()).await;
                    attempt += 1;
                    continue;
                }

                let message = body
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(String::from)
                    .unwrap_or_else(|| format!("HTTP {status}"));
                return Err(ProspectorError::provider(provider, message));
            }
            Err(e) if e.is_timeout() => {
                if attempt < opts.network_retries {
                    backoff(provider, opts, attempt, "timeout").await;
                    attempt += 1;
                    continue;
                }
                return Err(ProspectorError::provider(provider, "request timed out"));
            }
            Err(e) => {
                return Err(ProspectorError::Network(format!("{}: {e}", request.url)));
            }
        }
    }
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

async fn backoff(provider: &str, opts: &HttpOptions, attempt: u32, cause: &str) {
    let delay = opts.backoff_base * 2u32.saturating_pow(attempt);
    warn!(
        provider,
        attempt = attempt + 1,
        delay_ms = delay.as_millis() as u64,
        cause,
        "retrying upstream request"
    );
    tokio::time::sleep(delay).await;
}

fn parse_body(text: &str) -> serde_json::Value {
    if text.trim().is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| serde_json::json!({ "rawBody": text }))
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
pub fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    if let Some(host) = url.host_str() {
        let bare = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = bare.parse::<IpAddr>() {
            return is_private_ip(&ip);
        }
        if host == "localhost" || host.ends_with(".local") || host.ends_with(".internal") {
            return true;
        }
    }

    false
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_opts() -> HttpOptions {
        HttpOptions {
            timeout: Duration::from_secs(5),
            network_retries: 2,
            backoff_base: Duration::from_millis(1),
        }
    }

    #[test]
    fn api_key_debug_is_redacted() {
        let key = ApiKey::new("sk-secret");
        assert_eq!(format!("{key:?}"), "ApiKey(***)");
        assert_eq!(key.expose(), "sk-secret");
    }

    #[test]
    fn parse_body_variants() {
        assert!(parse_body("").is_null());
        assert_eq!(parse_body(r#"{"a":1}"#)["a"], 1);
        assert_eq!(parse_body("<html>")["rawBody"], "<html>");
    }

    #[test]
    fn ssrf_blocks_private_targets() {
        assert!(is_ssrf_target(&Url::parse("file:///etc/passwd").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://192.168.1.1/admin").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://127.0.0.1:8080/").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://localhost:3000/").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://[::1]/").unwrap()));
        assert!(!is_ssrf_target(&Url::parse("https://bluebottlecoffee.com/").unwrap()));
    }

    #[tokio::test]
    async fn get_json_retries_server_errors() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::path("/flaky"))
            .respond_with(wiremock::ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;

        wiremock::Mock::given(wiremock::matchers::path("/flaky"))
            .respond_with(
                wiremock::ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#),
            )
            .mount(&server)
            .await;

        let opts = fast_opts();
        let client = build_client(&opts).unwrap();
        let request = JsonRequest::get(format!("{}/flaky", server.uri()));
        let response = get_json(&client, &opts, "test", &request).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body["ok"], true);
    }

    #[tokio::test]
    async fn get_json_surfaces_upstream_message() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::path("/denied"))
            .respond_with(
                wiremock::ResponseTemplate::new(401)
                    .set_body_string(r#"{"message":"invalid api key"}"#),
            )
            .mount(&server)
            .await;

        let opts = fast_opts();
        let client = build_client(&opts).unwrap();
        let request = JsonRequest::get(format!("{}/denied", server.uri()));
        let err = get_json(&client, &opts, "test", &request).await.unwrap_err();

        assert_eq!(err.to_string(), "provider test failed: invalid api key");
    }

    #[tokio::test]
    async fn get_json_allows_listed_statuses() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::path("/missing"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let opts = fast_opts();
        let client = build_client(&opts).unwrap();
        let request = JsonRequest::get(format!("{}/missing", server.uri())).allow(&[404]);
        let response = get_json(&client, &opts, "test", &request).await.unwrap();

        assert_eq!(response.status, 404);
        assert!(response.body.is_null());
    }
}
