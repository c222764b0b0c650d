//! Rule-based confidence scoring for enriched entities.
//!
//! Each component (name, address, phone, website, source) gets a 0-100
//! sub-score. Disqualification rules run first: a component whose value
//! matches a placeholder pattern scores exactly 0. Otherwise the component
//! is scored on completeness. The total is the weighted sum of sub-scores.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use prospector_shared::{Entity, EntityField, PLACEHOLDER_DOMAINS, ValidationResult};

/// Score at or above which an entity counts as qualified.
pub const QUALIFIED_THRESHOLD: u8 = 60;

// ---------------------------------------------------------------------------
// Components and weights
// ---------------------------------------------------------------------------

/// A scored aspect of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Name,
    Address,
    Phone,
    Website,
    Source,
}

impl Component {
    pub const ALL: [Component; 5] = [
        Component::Name,
        Component::Address,
        Component::Phone,
        Component::Website,
        Component::Source,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Address => "address",
            Self::Phone => "phone",
            Self::Website => "website",
            Self::Source => "source",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Share of the total each component contributes. Sums to 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Weights {
    pub name: u8,
    pub address: u8,
    pub phone: u8,
    pub website: u8,
    pub source: u8,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            name: 25,
            address: 25,
            phone: 20,
            website: 15,
            source: 15,
        }
    }
}

impl Weights {
    fn of(&self, component: Component) -> u8 {
        match component {
            Component::Name => self.name,
            Component::Address => self.address,
            Component::Phone => self.phone,
            Component::Website => self.website,
            Component::Source => self.source,
        }
    }
}

// ---------------------------------------------------------------------------
// Disqualification rules
// ---------------------------------------------------------------------------

/// A placeholder signature that zeroes one component.
///
/// Name and address rules see the trimmed value, phone rules see the bare
/// 10-digit number, website rules see the bare domain.
#[derive(Debug, Clone)]
pub struct DisqualificationRule {
    pub component: Component,
    pub pattern: Regex,
    pub reason: &'static str,
}

impl DisqualificationRule {
    /// Build a rule from a pattern literal.
    ///
    /// # Panics
    /// If `pattern` is not a valid regex.
    pub fn new(component: Component, pattern: &str, reason: &'static str) -> Self {
        Self {
            component,
            pattern: Regex::new(pattern).expect("valid regex"),
            reason,
        }
    }
}

const RULE_TABLE: &[(Component, &str, &str)] = &[
    (
        Component::Name,
        r"(?i)^(test|demo|sample|example|business|company)\s*(llc|inc\.?|co\.?|ltd\.?)$",
        "generic name with legal suffix",
    ),
    (
        Component::Name,
        concat!(
            r"(?i)^(artisan|downtown|gourmet|premium|quality)",
            r"\s*(bistro|café|cafe|restaurant|shop|store)$",
        ),
        "template business name",
    ),
    (Component::Name, r"(?i)^business\s*\d+$", "numbered placeholder name"),
    (Component::Name, r"(?i)^company\s*(name|here)$", "placeholder name"),
    (
        Component::Name,
        r"(?i)^(generic|placeholder|fake|test|sample)\s+(business|company|store|shop)\b",
        "generic name",
    ),
    (
        Component::Address,
        r"(?i)^\d+\s+main\s+(st|street)\b",
        "sequential Main St address",
    ),
    (Component::Phone, r"^555\d{7}$", "555 phone number"),
    (Component::Phone, r"^000\d{7}$", "000 phone number"),
    (Component::Phone, r"^111\d{7}$", "111 phone number"),
    (Component::Phone, r"^123456789\d?$", "sequential phone number"),
    (
        Component::Phone,
        r"^(0{10}|1{10}|2{10}|3{10}|4{10}|5{10}|6{10}|7{10}|8{10}|9{10})$",
        "repeated-digit phone number",
    ),
];

/// The built-in rule set.
pub fn default_rules() -> Vec<DisqualificationRule> {
    let mut rules: Vec<DisqualificationRule> = RULE_TABLE
        .iter()
        .map(|(component, pattern, reason)| DisqualificationRule::new(*component, pattern, *reason))
        .collect();

    let domains = PLACEHOLDER_DOMAINS
        .iter()
        .map(|d| regex::escape(d))
        .collect::<Vec<_>>()
        .join("|");
    rules.push(DisqualificationRule::new(
        Component::Website,
        &format!("^({domains})$"),
        "placeholder domain",
    ));
    rules
}

// ---------------------------------------------------------------------------
// Completeness patterns
// ---------------------------------------------------------------------------

static LEADING_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+").expect("valid regex"));

static STREET_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)\b(st|street|ave|avenue|rd|road|blvd|boulevard",
        r"|ln|lane|dr|drive|way|ct|court)\b",
    ))
        .expect("valid regex")
});

static CITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*[A-Za-z\s]+").expect("valid regex"));

static STATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z]{2}\b").expect("valid regex"));

static ZIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{5}(-\d{4})?").expect("valid regex"));

static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z0-9]([a-z0-9-]*[a-z0-9])?\.)+[a-z]{2,}(:\d+)?$").expect("valid regex")
});

// ---------------------------------------------------------------------------
// Breakdown
// ---------------------------------------------------------------------------

/// Quality band of a total score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Excellent,
    High,
    Good,
    Acceptable,
    Poor,
    VeryPoor,
}

impl QualityTier {
    pub fn from_score(score: u8) -> Self {
        match score {
            90.. => Self::Excellent,
            80..=89 => Self::High,
            70..=79 => Self::Good,
            60..=69 => Self::Acceptable,
            40..=59 => Self::Poor,
            _ => Self::VeryPoor,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::High => "high",
            Self::Good => "good",
            Self::Acceptable => "acceptable",
            Self::Poor => "poor",
            Self::VeryPoor => "very poor",
        }
    }
}

/// A rule that fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disqualification {
    pub component: Component,
    pub reason: String,
}

/// Per-component sub-scores and the weighted total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub name: u8,
    pub address: u8,
    pub phone: u8,
    pub website: u8,
    pub source: u8,
    pub disqualifications: Vec<Disqualification>,
    /// Weighted total in `[0, 100]`.
    pub total: u8,
    pub tier: QualityTier,
    pub qualified: bool,
}

impl ScoreBreakdown {
    pub fn sub_score(&self, component: Component) -> u8 {
        match component {
            Component::Name => self.name,
            Component::Address => self.address,
            Component::Phone => self.phone,
            Component::Website => self.website,
            Component::Source => self.source,
        }
    }
}

// ---------------------------------------------------------------------------
// Scorer
// ---------------------------------------------------------------------------

/// Computes [`ScoreBreakdown`]s from an entity and its provider results.
#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    weights: Weights,
    rules: Vec<DisqualificationRule>,
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfidenceScorer {
    pub fn new() -> Self {
        Self {
            weights: Weights::default(),
            rules: default_rules(),
        }
    }

    pub fn with_weights(mut self, weights: Weights) -> Self {
        self.weights = weights;
        self
    }

    /// Append a disqualification rule.
    pub fn with_rule(mut self, rule: DisqualificationRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[DisqualificationRule] {
        &self.rules
    }

    /// Score `entity` given the results its providers returned.
    ///
    /// `results` should hold terminal results only; provider errors are
    /// not results.
    pub fn score<'a>(
        &self,
        entity: &Entity,
        results: impl IntoIterator<Item = &'a ValidationResult>,
    ) -> ScoreBreakdown {
        let results: Vec<&ValidationResult> = results.into_iter().collect();
        let mut disqualifications = Vec::new();

        let name = self.score_name(entity.name(), &mut disqualifications);
        let address = self.score_address(entity.address(), &mut disqualifications);
        let phone = self.score_phone(entity.phone(), &mut disqualifications);
        let website = self.score_website(entity, &results, &mut disqualifications);
        let source = score_source(&results);

        let weighted: f64 = [
            (Component::Name, name),
            (Component::Address, address),
            (Component::Phone, phone),
            (Component::Website, website),
            (Component::Source, source),
        ]
        .iter()
        .map(|(component, sub)| f64::from(self.weights.of(*component)) * f64::from(*sub) / 100.0)
        .sum();
        let total = weighted.clamp(0.0, 100.0).round() as u8;

        ScoreBreakdown {
            name,
            address,
            phone,
            website,
            source,
            disqualifications,
            total,
            tier: QualityTier::from_score(total),
            qualified: total >= QUALIFIED_THRESHOLD,
        }
    }

    /// First rule for `component` that matches `value`.
    fn disqualify(
        &self,
        component: Component,
        value: &str,
        found: &mut Vec<Disqualification>,
    ) -> bool {
        let Some(rule) = self
            .rules
            .iter()
            .find(|r| r.component == component && r.pattern.is_match(value))
        else {
            return false;
        };
        found.push(Disqualification {
            component,
            reason: rule.reason.to_string(),
        });
        true
    }

    fn score_name(&self, name: Option<&str>, found: &mut Vec<Disqualification>) -> u8 {
        let Some(name) = name.filter(|n| n.chars().count() >= 2) else {
            return 0;
        };
        if self.disqualify(Component::Name, name, found) {
            return 0;
        }
        match name.chars().count() {
            15.. => 100,
            8..=14 => 85,
            _ => 70,
        }
    }

    fn score_address(&self, address: Option<&str>, found: &mut Vec<Disqualification>) -> u8 {
        let Some(address) = address.filter(|a| a.chars().count() >= 10) else {
            return 0;
        };
        if self.disqualify(Component::Address, address, found) {
            return 0;
        }

        let present = [
            LEADING_NUMBER_RE.is_match(address),
            STREET_TYPE_RE.is_match(address),
            CITY_RE.is_match(address),
            STATE_RE.is_match(address),
            ZIP_RE.is_match(address),
        ]
        .into_iter()
        .filter(|found| *found)
        .count() as u8;
        present * 20
    }

    fn score_phone(&self, phone: Option<&str>, found: &mut Vec<Disqualification>) -> u8 {
        let Some(phone) = phone else {
            return 0;
        };
        let digits = phone_digits(phone);
        if self.disqualify(Component::Phone, &digits, found) {
            return 0;
        }
        match digits.len() {
            10 => 100,
            7..=9 => 40,
            _ => 20,
        }
    }

    fn score_website(
        &self,
        entity: &Entity,
        results: &[&ValidationResult],
        found: &mut Vec<Disqualification>,
    ) -> u8 {
        let Some(domain) = entity.domain() else {
            return 50;
        };
        let bare = domain.trim_start_matches("www.");
        if self.disqualify(Component::Website, bare, found) {
            return 0;
        }
        if !DOMAIN_RE.is_match(bare) {
            return 20;
        }
        let corroborated = results
            .iter()
            .any(|r| r.success && r.verified_fields.contains(&EntityField::Website));
        if corroborated { 100 } else { 80 }
    }
}

/// Digits only, with a leading US country code dropped from 11-digit numbers.
pub fn phone_digits(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.len() == 11 && digits.starts_with('1') {
        digits[1..].to_string()
    } else {
        digits
    }
}

fn score_source(results: &[&ValidationResult]) -> u8 {
    if results.is_empty() {
        return 50;
    }
    let successes = results.iter().filter(|r| r.success).count();
    let share = (successes * 100 / results.len()) as u32;
    let corroborated = results
        .iter()
        .any(|r| r.success && !r.verified_fields.is_empty());
    let bonus = if corroborated { 10 } else { 0 };
    (share + bonus).min(100) as u8
}
