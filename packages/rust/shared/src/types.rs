//! Core domain types: entities, search parameters, money, and provider results.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Cents
// ---------------------------------------------------------------------------

/// An amount of money in integer minor currency units (US cents).
///
/// Budgets and provider costs are tracked in cents so repeated reservations
/// never drift. Convert to dollars only for display.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Cents(pub u64);

impl Cents {
    /// Zero cost.
    pub const ZERO: Cents = Cents(0);

    /// Convert a dollar amount to cents, rounding to the nearest cent.
    /// Negative or non-finite inputs become zero.
    pub fn from_dollars(dollars: f64) -> Self {
        if !dollars.is_finite() || dollars <= 0.0 {
            return Self::ZERO;
        }
        Self((dollars * 100.0).round() as u64)
    }

    /// Dollar value for display.
    pub fn as_dollars(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Raw cent count.
    pub fn get(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Add for Cents {
    type Output = Cents;

    fn add(self, rhs: Cents) -> Cents {
        Cents(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Cents {
    fn add_assign(&mut self, rhs: Cents) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sum for Cents {
    fn sum<I: Iterator<Item = Cents>>(iter: I) -> Self {
        iter.fold(Cents::ZERO, Add::add)
    }
}

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// Stable identifier for an entity. Caller-supplied ids are kept verbatim;
/// a UUID v7 is generated when none is given.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new time-sortable identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A business record being validated and enriched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Entity {
    #[serde(default)]
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Single-line postal address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// US state (code or full name) when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Business category or place types, free text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Provider-specific extra fields.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl Entity {
    /// Create an entity with just a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Name for logs and error records.
    pub fn display_name(&self) -> &str {
        non_empty(&self.name).unwrap_or("Unknown")
    }

    /// Trimmed, non-empty name.
    pub fn name(&self) -> Option<&str> {
        non_empty(&self.name)
    }

    /// Trimmed, non-empty address.
    pub fn address(&self) -> Option<&str> {
        non_empty(&self.address)
    }

    /// Trimmed, non-empty phone.
    pub fn phone(&self) -> Option<&str> {
        non_empty(&self.phone)
    }

    /// Trimmed, non-empty website.
    pub fn website(&self) -> Option<&str> {
        non_empty(&self.website)
    }

    /// Trimmed, non-empty email.
    pub fn email(&self) -> Option<&str> {
        non_empty(&self.email)
    }

    /// Bare domain of the website (scheme, `www.` and path stripped).
    pub fn domain(&self) -> Option<String> {
        let website = self.website()?.to_lowercase();
        let without_scheme = website
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        let host = without_scheme
            .split(['/', '?', '#'])
            .next()
            .unwrap_or("")
            .trim_start_matches("www.");
        if host.is_empty() {
            None
        } else {
            Some(host.to_string())
        }
    }

    /// Website present and not on a known placeholder domain.
    pub fn has_real_website(&self) -> bool {
        self.domain().is_some_and(|d| !is_placeholder_domain(&d))
    }

    /// The entity's own state, falling back to the search context.
    pub fn state_or<'a>(&'a self, params: &'a SearchParams) -> Option<&'a str> {
        non_empty(&self.state).or_else(|| non_empty(&params.state))
    }
}

/// Domains that show up as placeholders in test or fabricated listings.
pub const PLACEHOLDER_DOMAINS: &[&str] = &[
    "example.com",
    "example.org",
    "example.net",
    "test.com",
    "demo.com",
    "sample.com",
    "placeholder.com",
    "tempsite.com",
    "artisanbistro.com",
    "downtowncaf.net",
    "gourmetrestaurant.org",
];

/// Whether `domain` (bare host, `www.` optional) is a known placeholder.
pub fn is_placeholder_domain(domain: &str) -> bool {
    let host = domain.trim().to_lowercase();
    PLACEHOLDER_DOMAINS.contains(&host.trim_start_matches("www."))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// SearchParams
// ---------------------------------------------------------------------------

/// Search context shared by every entity in one orchestration call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchParams {
    /// State the search was scoped to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Overrides the configured budget ceiling for this call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_cents: Option<Cents>,
    /// Ask registries for live (uncached upstream) data.
    #[serde(default)]
    pub live_data: bool,
    /// Free-form context for specific providers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl SearchParams {
    pub fn for_state(state: impl Into<String>) -> Self {
        Self {
            state: Some(state.into()),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Validation results
// ---------------------------------------------------------------------------

/// Entity field a provider can corroborate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityField {
    Name,
    Address,
    Phone,
    Website,
    Email,
}

/// How a polled provider call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollOutcome {
    Completed,
    Failed,
    /// Attempt limit reached while the upstream still reported pending.
    TimedOut,
}

/// Polling metadata attached to results of polling-capable providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSummary {
    /// Number of re-issued calls after the initial one.
    pub attempts: u32,
    /// Wall time from the initial call to the terminal response.
    pub elapsed_ms: u64,
    pub outcome: PollOutcome,
}

/// One provider's outcome for one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub provider: String,
    pub success: bool,
    /// Provider-specific payload, opaque to the engine.
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub cost_incurred: Cents,
    /// Entity fields this provider corroborated.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub verified_fields: BTreeSet<EntityField>,
    /// Served from the engine cache.
    #[serde(default)]
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll: Option<PollSummary>,
    pub timestamp: DateTime<Utc>,
}

impl ValidationResult {
    /// A positive outcome.
    pub fn success(provider: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            provider: provider.into(),
            success: true,
            payload,
            error_message: None,
            cost_incurred: Cents::ZERO,
            verified_fields: BTreeSet::new(),
            cached: false,
            poll: None,
            timestamp: Utc::now(),
        }
    }

    /// An ordinary negative outcome (not found, low confidence, upstream
    /// reported failure). Not an error.
    pub fn failure(
        provider: impl Into<String>,
        message: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
            ..Self::success(provider, payload)
        }
    }

    /// Mark a field as corroborated by this provider.
    pub fn verified(mut self, field: EntityField) -> Self {
        self.verified_fields.insert(field);
        self
    }

    /// Whether this result timed out while polling.
    pub fn timed_out(&self) -> bool {
        matches!(
            self.poll,
            Some(PollSummary {
                outcome: PollOutcome::TimedOut,
                ..
            })
        )
    }
}
