//! Engine-wide counters for provider outcomes and cache effectiveness.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How many recent errors a snapshot keeps.
pub const RECENT_ERRORS: usize = 5;

/// Per-provider outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStats {
    /// Calls that returned a result (fresh or cached).
    pub success: u64,
    /// Calls that failed with an error.
    pub error: u64,
    /// Times the provider was not run: not relevant, over budget, or not
    /// needed because free results were sufficient.
    pub skipped: u64,
    /// Polled calls that hit the attempt limit.
    pub timed_out: u64,
}

/// One recorded provider failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub provider: String,
    pub entity: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Serializable view of the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Entities that ran at least one provider.
    pub validations_run: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// `hits / (hits + misses) * 100`, one decimal place.
    pub cache_hit_rate: f64,
    pub providers: BTreeMap<String, ProviderStats>,
    /// Total errors since the last reset.
    pub errors: u64,
    /// Most recent errors, oldest first.
    pub recent_errors: Vec<ErrorRecord>,
}

#[derive(Debug, Default)]
struct Counters {
    validations_run: u64,
    cache_hits: u64,
    cache_misses: u64,
    providers: BTreeMap<String, ProviderStats>,
    errors: u64,
    recent_errors: VecDeque<ErrorRecord>,
}

/// Thread-safe stats collector shared by every branch of the engine.
#[derive(Debug, Default)]
pub struct StatsCollector {
    inner: Mutex<Counters>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a zeroed row for `provider`.
    pub fn register_provider(&self, provider: &str) {
        self.lock().providers.entry(provider.to_string()).or_default();
    }

    pub fn record_validation_run(&self) {
        self.lock().validations_run += 1;
    }

    pub fn record_cache_hit(&self) {
        self.lock().cache_hits += 1;
    }

    pub fn record_cache_miss(&self) {
        self.lock().cache_misses += 1;
    }

    pub fn record_success(&self, provider: &str) {
        self.provider(provider, |p| p.success += 1);
    }

    pub fn record_skipped(&self, provider: &str) {
        self.provider(provider, |p| p.skipped += 1);
    }

    pub fn record_timed_out(&self, provider: &str) {
        self.provider(provider, |p| p.timed_out += 1);
    }

    pub fn record_error(&self, provider: &str, entity: &str, message: &str) {
        let mut counters = self.lock();
        counters.providers.entry(provider.to_string()).or_default().error += 1;
        counters.errors += 1;
        if counters.recent_errors.len() == RECENT_ERRORS {
            counters.recent_errors.pop_front();
        }
        counters.recent_errors.push_back(ErrorRecord {
            provider: provider.to_string(),
            entity: entity.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn snapshot(&self) -> EngineStats {
        let counters = self.lock();
        let lookups = counters.cache_hits + counters.cache_misses;
        let cache_hit_rate = if lookups == 0 {
            0.0
        } else {
            (counters.cache_hits as f64 / lookups as f64 * 1000.0).round() / 10.0
        };

        EngineStats {
            validations_run: counters.validations_run,
            cache_hits: counters.cache_hits,
            cache_misses: counters.cache_misses,
            cache_hit_rate,
            providers: counters.providers.clone(),
            errors: counters.errors,
            recent_errors: counters.recent_errors.iter().cloned().collect(),
        }
    }

    /// Reset every counter. Registered provider rows stay, zeroed.
    pub fn clear(&self) {
        let mut counters = self.lock();
        let providers = counters
            .providers
            .keys()
            .map(|name| (name.clone(), ProviderStats::default()))
            .collect();
        *counters = Counters {
            providers,
            ..Counters::default()
        };
    }

    fn provider(&self, provider: &str, update: impl FnOnce(&mut ProviderStats)) {
        update(self.lock().providers.entry(provider.to_string()).or_default());
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
