//! Per-entity and batch enrichment.
//!
//! For every entity the orchestrator selects the relevant providers, then
//! runs one branch per provider: cache lookup, budget reservation, a
//! scheduled call (through the polling client when the provider needs it),
//! cache write and stats update. Branches fan in before scoring, and a
//! failing branch never aborts its siblings.
//!
//! With cost tiering on, zero-cost providers fan out first. Paid providers
//! only run when the free results leave the partial confidence score below
//! the configured sufficiency threshold.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::StreamExt;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use prospector_shared::{
    BudgetScope, Cents, EngineConfig, Entity, Provider, ProviderCall, ProspectorError, Result,
    SearchParams, ValidationResult,
};

use crate::budget::BudgetLedger;
use crate::cache::{TtlCache, cache_key};
use crate::clock::{Clock, TokioClock};
use crate::polling::PollingClient;
use crate::scheduler::ConcurrencyScheduler;
use crate::scoring::{ConfidenceScorer, ScoreBreakdown};
use crate::stats::{EngineStats, StatsCollector};

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Why a relevant or registered provider was not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The budget ledger could not cover the call.
    Budget,
    NotRelevant,
    /// Free results already scored the entity above the sufficiency threshold.
    Sufficient,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedProvider {
    pub provider: String,
    pub reason: SkipReason,
}

/// A provider call that failed with an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub message: String,
}

/// Overall outcome for one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    /// At least one provider returned a result.
    Validated,
    /// No provider ran: none was relevant, or the budget covered none.
    Skipped,
    /// Every provider that ran failed with an error.
    Errored,
}

/// Everything learned about one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub entity: Entity,
    /// Results keyed by provider name, including timed-out polls.
    pub results: BTreeMap<String, ValidationResult>,
    /// Providers that produced a result, in registration order.
    pub providers_used: Vec<String>,
    pub providers_skipped: Vec<SkippedProvider>,
    pub errors: Vec<ProviderFailure>,
    /// Polling providers that hit the attempt limit.
    pub timed_out: Vec<String>,
    pub score: ScoreBreakdown,
    pub confidence_score: u8,
    pub total_cost: Cents,
    pub status: EntityStatus,
    pub processing_ms: u64,
}

impl EnrichmentResult {
    pub fn skipped(&self) -> bool {
        self.status == EntityStatus::Skipped
    }
}

/// Aggregate counts for one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub validated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_cost: Cents,
    pub elapsed_ms: u64,
}

/// Progress callbacks for batch runs.
pub trait BatchProgress: Send + Sync {
    /// Called once before any entity starts.
    fn started(&self, total: usize);
    /// Called as each entity finishes, in completion order.
    fn entity_done(&self, done: usize, total: usize, result: &EnrichmentResult);
    /// Called once with the final summary.
    fn finished(&self, summary: &BatchSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl BatchProgress for SilentProgress {
    fn started(&self, _total: usize) {}
    fn entity_done(&self, _done: usize, _total: usize, _result: &EnrichmentResult) {}
    fn finished(&self, _summary: &BatchSummary) {}
}

/// Outcome of one provider branch.
enum Branch {
    Completed(ValidationResult),
    Skipped(SkipReason),
    Failed(String),
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// The enrichment engine.
///
/// Cache, stats and scheduler are owned by the instance, so independent
/// orchestrators never share state unless the caller injects it.
#[derive(Debug)]
pub struct Orchestrator {
    config: EngineConfig,
    providers: Vec<Arc<dyn Provider>>,
    cache: Arc<TtlCache<ValidationResult>>,
    stats: Arc<StatsCollector>,
    scheduler: ConcurrencyScheduler,
    polling: PollingClient,
    scorer: ConfidenceScorer,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    /// An engine running on real time.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_clock(config, Arc::new(TokioClock))
    }

    /// An engine whose cache expiry and polling waits use `clock`.
    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache: Arc::new(TtlCache::new(config.cache_ttl, Arc::clone(&clock))),
            stats: Arc::new(StatsCollector::new()),
            scheduler: ConcurrencyScheduler::new(config.concurrency),
            polling: PollingClient::from_config(&config, Arc::clone(&clock)),
            scorer: ConfidenceScorer::new(),
            providers: Vec::new(),
            config,
            clock,
        }
    }

    /// Share a cache with other engines.
    pub fn with_cache(mut self, cache: Arc<TtlCache<ValidationResult>>) -> Self {
        self.cache = cache;
        self
    }

    /// Share a stats collector with other engines.
    pub fn with_stats(mut self, stats: Arc<StatsCollector>) -> Self {
        for provider in &self.providers {
            stats.register_provider(provider.name());
        }
        self.stats = stats;
        self
    }

    pub fn with_scorer(mut self, scorer: ConfidenceScorer) -> Self {
        self.scorer = scorer;
        self
    }

    /// Add a provider. Fails when its name is empty or already taken.
    pub fn register(&mut self, provider: Arc<dyn Provider>) -> Result<()> {
        let name = provider.name();
        if name.trim().is_empty() {
            return Err(ProspectorError::config("provider name must not be empty"));
        }
        if self.providers.iter().any(|p| p.name() == name) {
            return Err(ProspectorError::config(format!(
                "provider {name} is already registered"
            )));
        }

        debug!(
            provider = name,
            cost_cents = provider.cost().get(),
            polling = provider.supports_polling(),
            "registered provider"
        );
        self.stats.register_provider(name);
        self.providers.push(provider);
        Ok(())
    }

    /// Register every provider, stopping at the first invalid one.
    pub fn register_all(
        &mut self,
        providers: impl IntoIterator<Item = Arc<dyn Provider>>,
    ) -> Result<()> {
        providers
            .into_iter()
            .try_for_each(|provider| self.register(provider))
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<TtlCache<ValidationResult>> {
        &self.cache
    }

    pub fn scheduler(&self) -> &ConcurrencyScheduler {
        &self.scheduler
    }

    pub fn scorer(&self) -> &ConfidenceScorer {
        &self.scorer
    }

    pub fn get_stats(&self) -> EngineStats {
        self.stats.snapshot()
    }

    pub fn clear_stats(&self) {
        self.stats.clear();
    }

    /// Enrich one entity with a fresh per-entity budget.
    ///
    /// The ceiling is `params.budget_cents` when set, else the configured
    /// per-entity maximum.
    pub async fn validate_entity(
        &self,
        entity: &Entity,
        params: &SearchParams,
    ) -> EnrichmentResult {
        let ledger = BudgetLedger::new(
            params
                .budget_cents
                .unwrap_or(self.config.max_cost_per_entity),
        );
        self.validate_entity_with_budget(entity, params, &ledger).await
    }

    /// Enrich one entity, reserving paid calls against `ledger`.
    ///
    /// Paid providers are skipped with [`SkipReason::Sufficient`] when cost
    /// tiering is on and the zero-cost results already reach
    /// `sufficient_score`.
    #[instrument(skip_all, fields(entity = %entity.id, name = entity.display_name()))]
    pub async fn validate_entity_with_budget(
        &self,
        entity: &Entity,
        params: &SearchParams,
        ledger: &BudgetLedger,
    ) -> EnrichmentResult {
        let started = self.clock.now();
        let mut providers_skipped = Vec::new();

        let mut relevant = Vec::with_capacity(self.providers.len());
        for (index, provider) in self.providers.iter().enumerate() {
            if provider.is_relevant(entity, params) {
                relevant.push((index, provider));
            } else {
                debug!(provider = provider.name(), "not relevant");
                self.stats.record_skipped(provider.name());
                providers_skipped.push(SkippedProvider {
                    provider: provider.name().to_string(),
                    reason: SkipReason::NotRelevant,
                });
            }
        }

        let mut branches = Vec::with_capacity(relevant.len());
        if relevant.is_empty() {
            debug!("no relevant providers");
        } else if self.config.cost_tiering {
            self.stats.record_validation_run();
            let (free, paid): (Vec<_>, Vec<_>) = relevant
                .into_iter()
                .partition(|(_, provider)| provider.cost().is_zero());

            branches.extend(self.run_tier(free, entity, params, ledger).await);
            if !paid.is_empty() && self.free_tier_suffices(entity, &branches) {
                debug!(paid = paid.len(), "free results sufficient, skipping paid tier");
                for (index, provider) in paid {
                    self.stats.record_skipped(provider.name());
                    branches.push((index, provider, Branch::Skipped(SkipReason::Sufficient)));
                }
            } else {
                branches.extend(self.run_tier(paid, entity, params, ledger).await);
            }
            branches.sort_by_key(|(index, _, _)| *index);
        } else {
            self.stats.record_validation_run();
            branches.extend(self.run_tier(relevant, entity, params, ledger).await);
        }

        let mut results = BTreeMap::new();
        let mut providers_used = Vec::new();
        let mut errors = Vec::new();
        let mut timed_out = Vec::new();

        for (_, provider, branch) in branches {
            let name = provider.name().to_string();
            match branch {
                Branch::Completed(result) => {
                    if result.timed_out() {
                        timed_out.push(name.clone());
                    }
                    providers_used.push(name.clone());
                    results.insert(name, result);
                }
                Branch::Skipped(reason) => providers_skipped.push(SkippedProvider {
                    provider: name,
                    reason,
                }),
                Branch::Failed(message) => errors.push(ProviderFailure {
                    provider: name,
                    message,
                }),
            }
        }

        let score = self
            .scorer
            .score(entity, results.values().filter(|r| !r.timed_out()));
        let total_cost: Cents = results.values().map(|r| r.cost_incurred).sum();
        let status = if !results.is_empty() {
            EntityStatus::Validated
        } else if !errors.is_empty() {
            EntityStatus::Errored
        } else {
            EntityStatus::Skipped
        };
        let processing_ms = self.clock.now().saturating_duration_since(started).as_millis() as u64;

        debug!(
            status = ?status,
            confidence = score.total,
            total_cost = %total_cost,
            used = providers_used.len(),
            failed = errors.len(),
            "entity enriched"
        );

        EnrichmentResult {
            entity: entity.clone(),
            results,
            providers_used,
            providers_skipped,
            errors,
            timed_out,
            confidence_score: score.total,
            score,
            total_cost,
            status,
            processing_ms,
        }
    }

    /// Enrich every entity. Results come back in input order.
    pub async fn validate_batch(
        &self,
        entities: &[Entity],
        params: &SearchParams,
    ) -> Vec<EnrichmentResult> {
        self.validate_batch_with_summary(entities, params, &SilentProgress)
            .await
            .0
    }

    /// Enrich every entity and summarise the run.
    ///
    /// Up to `batch_concurrency` entities are in progress at once; their
    /// provider calls all share the engine-wide scheduler. With
    /// [`BudgetScope::PerBatch`] one ledger covers the whole batch.
    #[instrument(skip_all, fields(entities = entities.len()))]
    pub async fn validate_batch_with_summary(
        &self,
        entities: &[Entity],
        params: &SearchParams,
        progress: &dyn BatchProgress,
    ) -> (Vec<EnrichmentResult>, BatchSummary) {
        let started = self.clock.now();
        let total = entities.len();
        info!(total, scope = ?self.config.budget_scope, "starting batch");
        progress.started(total);

        let shared_ledger = match self.config.budget_scope {
            BudgetScope::PerBatch => Some(BudgetLedger::new(
                params.budget_cents.unwrap_or(self.config.max_cost_per_batch),
            )),
            BudgetScope::PerEntity => None,
        };
        let done = AtomicUsize::new(0);

        let results: Vec<EnrichmentResult> = futures::stream::iter(entities)
            .map(|entity| {
                let ledger = shared_ledger.as_ref();
                let done = &done;
                async move {
                    let result = match ledger {
                        Some(ledger) => {
                            self.validate_entity_with_budget(entity, params, ledger)
                                .await
                        }
                        None => self.validate_entity(entity, params).await,
                    };
                    let finished = done.fetch_add(1, Ordering::AcqRel) + 1;
                    progress.entity_done(finished, total, &result);
                    result
                }
            })
            .buffered(self.config.batch_concurrency.max(1))
            .collect()
            .await;

        let mut summary = BatchSummary {
            total,
            ..BatchSummary::default()
        };
        for result in &results {
            match result.status {
                EntityStatus::Validated => summary.validated += 1,
                EntityStatus::Skipped => summary.skipped += 1,
                EntityStatus::Errored => summary.failed += 1,
            }
            summary.total_cost += result.total_cost;
        }
        summary.elapsed_ms = self.clock.now().saturating_duration_since(started).as_millis() as u64;

        info!(
            validated = summary.validated,
            skipped = summary.skipped,
            failed = summary.failed,
            total_cost = %summary.total_cost,
            "batch complete"
        );
        progress.finished(&summary);

        (results, summary)
    }

    /// Fan out one tier of providers and pair each branch with its provider.
    async fn run_tier<'p>(
        &self,
        tier: Vec<(usize, &'p Arc<dyn Provider>)>,
        entity: &Entity,
        params: &SearchParams,
        ledger: &BudgetLedger,
    ) -> Vec<(usize, &'p Arc<dyn Provider>, Branch)> {
        let branches = join_all(
            tier.iter()
                .map(|(_, provider)| self.run_provider(provider, entity, params, ledger)),
        )
        .await;
        tier.into_iter()
            .zip(branches)
            .map(|((index, provider), branch)| (index, provider, branch))
            .collect()
    }

    /// Whether the free tier produced a success and scores the entity at or
    /// above `sufficient_score` on its own.
    fn free_tier_suffices(
        &self,
        entity: &Entity,
        branches: &[(usize, &Arc<dyn Provider>, Branch)],
    ) -> bool {
        let results: Vec<&ValidationResult> = branches
            .iter()
            .filter_map(|(_, _, branch)| match branch {
                Branch::Completed(result) if !result.timed_out() => Some(result),
                _ => None,
            })
            .collect();
        if !results.iter().any(|r| r.success) {
            return false;
        }
        let partial = self.scorer.score(entity, results.iter().copied());
        partial.total >= self.config.sufficient_score
    }

    async fn run_provider(
        &self,
        provider: &Arc<dyn Provider>,
        entity: &Entity,
        params: &SearchParams,
        ledger: &BudgetLedger,
    ) -> Branch {
        let name = provider.name();
        let key = cache_key(
            name,
            entity,
            params,
            &provider.cache_identity(entity, params),
        );

        if self.config.cache_enabled {
            if let Some(mut hit) = self.cache.get(&key) {
                debug!(provider = name, "cache hit");
                self.stats.record_cache_hit();
                self.stats.record_success(name);
                hit.cached = true;
                hit.cost_incurred = Cents::ZERO;
                return Branch::Completed(hit);
            }
            self.stats.record_cache_miss();
        }

        let cost = provider.cost();
        if !ledger.try_reserve(cost) {
            debug!(
                provider = name,
                cost_cents = cost.get(),
                remaining_cents = ledger.remaining().get(),
                "budget denied"
            );
            self.stats.record_skipped(name);
            return Branch::Skipped(SkipReason::Budget);
        }

        let call = ProviderCall::new(entity, params);
        let outcome = self
            .scheduler
            .schedule(async {
                if provider.supports_polling() {
                    self.polling.run(provider.as_ref(), call).await
                } else {
                    provider.validate(call).await
                }
            })
            .await;

        match outcome {
            Ok(mut result) => {
                result.cost_incurred = cost;
                if result.timed_out() {
                    self.stats.record_timed_out(name);
                } else {
                    self.stats.record_success(name);
                    if self.config.cache_enabled && !provider.is_pending(&result) {
                        self.cache.insert(key, result.clone());
                    }
                }
                Branch::Completed(result)
            }
            Err(err) => {
                let message = err.provider_message();
                warn!(provider = name, error = %message, "provider call failed");
                self.stats
                    .record_error(name, entity.display_name(), &message);
                Branch::Failed(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    use async_trait::async_trait;
    use prospector_shared::EntityField;
    use serde_json::json;

    use crate::clock::ManualClock;

    #[derive(Debug, Clone, Copy)]
    enum Behaviour {
        Succeed,
        Fail,
        AlwaysPending,
    }

    #[derive(Debug)]
    struct Fake {
        name: &'static str,
        cost: Cents,
        relevant: bool,
        behaviour: Behaviour,
        verifies: Option<EntityField>,
        calls: AtomicU32,
        delay: Option<Duration>,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl Fake {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                cost: Cents::ZERO,
                relevant: true,
                behaviour: Behaviour::Succeed,
                verifies: None,
                calls: AtomicU32::new(0),
                delay: None,
                active: Arc::default(),
                peak: Arc::default(),
            }
        }

        fn paid(mut self, cents: u64) -> Self {
            self.cost = Cents(cents);
            self
        }

        fn irrelevant(mut self) -> Self {
            self.relevant = false;
            self
        }

        fn behaving(mut self, behaviour: Behaviour) -> Self {
            self.behaviour = behaviour;
            self
        }

        fn verifying(mut self, field: EntityField) -> Self {
            self.verifies = Some(field);
            self
        }

        fn instrumented(
            mut self,
            delay: Duration,
            active: &Arc<AtomicUsize>,
            peak: &Arc<AtomicUsize>,
        ) -> Self {
            self.delay = Some(delay);
            self.active = Arc::clone(active);
            self.peak = Arc::clone(peak);
            self
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Provider for Fake {
        fn name(&self) -> &str {
            self.name
        }

        fn cost(&self) -> Cents {
            self.cost
        }

        fn is_relevant(&self, _: &Entity, _: &SearchParams) -> bool {
            self.relevant
        }

        async fn validate(&self, _call: ProviderCall<'_>) -> Result<ValidationResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                self.active.fetch_sub(1, Ordering::SeqCst);
            }

            match self.behaviour {
                Behaviour::Succeed => {
                    let result = ValidationResult::success(self.name, json!({"ok": true}));
                    Ok(match self.verifies {
                        Some(field) => result.verified(field),
                        None => result,
                    })
                }
                Behaviour::Fail => Err(ProspectorError::provider(self.name, "upstream exploded")),
                Behaviour::AlwaysPending => Ok(ValidationResult::failure(
                    self.name,
                    "pending",
                    json!({"pending": true, "token": "job-7"}),
                )),
            }
        }

        fn supports_polling(&self) -> bool {
            matches!(self.behaviour, Behaviour::AlwaysPending)
        }

        fn is_pending(&self, result: &ValidationResult) -> bool {
            result.payload["pending"] == true
        }

        fn retry_token(&self, result: &ValidationResult) -> Option<String> {
            result.payload["token"].as_str().map(String::from)
        }
    }

    fn engine(config: EngineConfig, providers: Vec<Arc<Fake>>) -> Orchestrator {
        let mut engine = Orchestrator::with_clock(config, Arc::new(ManualClock::new()));
        for provider in providers {
            engine.register(provider).unwrap();
        }
        engine
    }

    fn acme() -> Entity {
        Entity::named("Acme Industrial Supply")
    }

    fn well_formed() -> Entity {
        Entity {
            name: Some("Blue Bottle Coffee Roasters".into()),
            address: Some("315 Linden Street, San Francisco, CA 94102".into()),
            phone: Some("(415) 653-3394".into()),
            website: Some("https://bluebottlecoffee.com".into()),
            ..Default::default()
        }
    }

    /// Reports back the email it was asked about.
    #[derive(Debug, Default)]
    struct EmailEcho {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Provider for EmailEcho {
        fn name(&self) -> &str {
            "email-echo"
        }

        fn is_relevant(&self, entity: &Entity, _: &SearchParams) -> bool {
            entity.email().is_some()
        }

        async fn validate(&self, call: ProviderCall<'_>) -> Result<ValidationResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ValidationResult::success(
                "email-echo",
                json!({"email": call.entity.email()}),
            ))
        }
    }

    #[test]
    fn register_rejects_empty_and_duplicate_names() {
        let mut engine = Orchestrator::new(EngineConfig::default());
        engine.register(Arc::new(Fake::new("registry"))).unwrap();

        let duplicate = engine.register(Arc::new(Fake::new("registry"))).unwrap_err();
        assert!(duplicate.to_string().contains("already registered"));

        let empty = engine.register(Arc::new(Fake::new(" "))).unwrap_err();
        assert!(matches!(empty, ProspectorError::Config { .. }));

        assert_eq!(engine.provider_names(), vec!["registry"]);
    }

    #[tokio::test]
    async fn no_relevant_providers_is_skipped_not_error() {
        let fake = Arc::new(Fake::new("registry").irrelevant());
        let engine = engine(EngineConfig::default(), vec![fake.clone()]);

        let result = engine.validate_entity(&acme(), &SearchParams::default()).await;

        assert_eq!(result.status, EntityStatus::Skipped);
        assert!(result.results.is_empty());
        assert_eq!(
            result.providers_skipped,
            vec![SkippedProvider {
                provider: "registry".into(),
                reason: SkipReason::NotRelevant,
            }]
        );
        assert_eq!(fake.calls(), 0);

        let stats = engine.get_stats();
        assert_eq!(stats.validations_run, 0);
        assert_eq!(stats.providers["registry"].skipped, 1);
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let registry = Arc::new(Fake::new("registry").paid(50));
        let website = Arc::new(Fake::new("website"));
        let engine = engine(
            EngineConfig::default(),
            vec![registry.clone(), website.clone()],
        );
        let params = SearchParams::for_state("CA");

        let first = engine.validate_entity(&acme(), &params).await;
        let second = engine.validate_entity(&acme(), &params).await;

        assert_eq!(first.providers_used, second.providers_used);
        assert_eq!(first.total_cost, Cents(50));
        assert_eq!(second.total_cost, Cents::ZERO);
        assert!(second.results.values().all(|r| r.cached));
        assert_eq!(registry.calls(), 1);
        assert_eq!(website.calls(), 1);

        let stats = engine.get_stats();
        assert_eq!(stats.cache_hits, 2);
        assert_eq!(stats.cache_misses, 2);
        assert_eq!(stats.cache_hit_rate, 50.0);
        assert_eq!(stats.validations_run, 2);
        assert_eq!(stats.providers["registry"].success, 2);
    }

    #[tokio::test]
    async fn disabled_cache_always_calls() {
        let fake = Arc::new(Fake::new("registry"));
        let config = EngineConfig {
            cache_enabled: false,
            ..EngineConfig::default()
        };
        let engine = engine(config, vec![fake.clone()]);

        engine.validate_entity(&acme(), &SearchParams::default()).await;
        engine.validate_entity(&acme(), &SearchParams::default()).await;

        assert_eq!(fake.calls(), 2);
        assert_eq!(engine.get_stats().cache_misses, 0);
    }

    #[tokio::test]
    async fn budget_for_one_call_runs_exactly_one_paid_provider() {
        let a = Arc::new(Fake::new("registry-a").paid(100));
        let b = Arc::new(Fake::new("registry-b").paid(100));
        let free = Arc::new(Fake::new("website"));
        let engine = engine(
            EngineConfig::default(),
            vec![a.clone(), b.clone(), free.clone()],
        );
        let params = SearchParams {
            budget_cents: Some(Cents(100)),
            ..SearchParams::default()
        };

        let result = engine.validate_entity(&acme(), &params).await;

        assert_eq!(a.calls() + b.calls(), 1);
        assert_eq!(free.calls(), 1);
        assert_eq!(result.total_cost, Cents(100));
        let budget_skips: Vec<_> = result
            .providers_skipped
            .iter()
            .filter(|s| s.reason == SkipReason::Budget)
            .collect();
        assert_eq!(budget_skips.len(), 1);
        assert_eq!(result.providers_used.len(), 2);
    }

    #[tokio::test]
    async fn failing_provider_does_not_abort_siblings() {
        let broken = Arc::new(Fake::new("broken").behaving(Behaviour::Fail));
        let healthy = Arc::new(Fake::new("healthy"));
        let engine = engine(EngineConfig::default(), vec![broken, healthy]);
        let entity = acme();

        let result = engine.validate_entity(&entity, &SearchParams::default()).await;

        assert_eq!(result.status, EntityStatus::Validated);
        assert_eq!(result.providers_used, vec!["healthy"]);
        assert_eq!(
            result.errors,
            vec![ProviderFailure {
                provider: "broken".into(),
                message: "upstream exploded".into(),
            }]
        );

        let stats = engine.get_stats();
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.providers["broken"].error, 1);
        assert_eq!(stats.recent_errors[0].entity, "Acme Industrial Supply");
    }

    #[tokio::test]
    async fn every_provider_failing_marks_entity_errored() {
        let broken = Arc::new(Fake::new("broken").behaving(Behaviour::Fail));
        let engine = engine(EngineConfig::default(), vec![broken]);

        let result = engine.validate_entity(&acme(), &SearchParams::default()).await;

        assert_eq!(result.status, EntityStatus::Errored);
        assert!(result.results.is_empty());
    }

    #[tokio::test]
    async fn always_pending_provider_times_out_and_is_not_cached() {
        let slow = Arc::new(Fake::new("slow-registry").behaving(Behaviour::AlwaysPending));
        let config = EngineConfig {
            max_poll_attempts: 2,
            ..EngineConfig::default()
        };
        let engine = engine(config, vec![slow.clone()]);

        let result = engine.validate_entity(&acme(), &SearchParams::default()).await;

        assert_eq!(slow.calls(), 3);
        assert_eq!(result.timed_out, vec!["slow-registry"]);
        assert_eq!(result.status, EntityStatus::Validated);
        assert!(!result.results["slow-registry"].success);
        assert_eq!(engine.get_stats().providers["slow-registry"].timed_out, 1);

        engine.validate_entity(&acme(), &SearchParams::default()).await;
        assert_eq!(slow.calls(), 6);
    }

    #[tokio::test]
    async fn provider_calls_respect_concurrency_limit() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let names = ["p1", "p2", "p3", "p4", "p5", "p6"];
        let providers: Vec<_> = names
            .into_iter()
            .map(|name| {
                Arc::new(Fake::new(name).instrumented(Duration::from_millis(5), &active, &peak))
            })
            .collect();
        let config = EngineConfig {
            concurrency: 2,
            batch_concurrency: 4,
            cache_enabled: false,
            ..EngineConfig::default()
        };
        let engine = engine(config, providers);
        let entities: Vec<_> = (0..4).map(|i| Entity::named(format!("Entity {i}"))).collect();

        engine
            .validate_batch(&entities, &SearchParams::default())
            .await;

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(engine.scheduler().in_flight(), 0);
    }

    #[tokio::test]
    async fn batch_preserves_order_and_shares_batch_budget() {
        let paid = Arc::new(Fake::new("registry").paid(100));
        let config = EngineConfig {
            budget_scope: BudgetScope::PerBatch,
            batch_concurrency: 1,
            cache_enabled: false,
            ..EngineConfig::default()
        };
        let engine = engine(config, vec![paid.clone()]);
        let entities: Vec<_> = ["Alpha Logistics", "Bravo Logistics", "Charlie Logistics"]
            .into_iter()
            .map(Entity::named)
            .collect();
        let params = SearchParams {
            budget_cents: Some(Cents(200)),
            ..SearchParams::default()
        };

        let (results, summary) = engine
            .validate_batch_with_summary(&entities, &params, &SilentProgress)
            .await;

        let names: Vec<_> = results.iter().map(|r| r.entity.display_name()).collect();
        assert_eq!(names, ["Alpha Logistics", "Bravo Logistics", "Charlie Logistics"]);
        assert_eq!(paid.calls(), 2);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.validated, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.total_cost, Cents(200));
        assert!(results[2].skipped());
    }

    #[tokio::test]
    async fn per_entity_budget_resets_for_each_entity() {
        let paid = Arc::new(Fake::new("registry").paid(150));
        let config = EngineConfig {
            cache_enabled: false,
            ..EngineConfig::default()
        };
        let engine = engine(config, vec![paid.clone()]);
        let entities = vec![Entity::named("Alpha Logistics"), Entity::named("Bravo Logistics")];

        let results = engine
            .validate_batch(&entities, &SearchParams::default())
            .await;

        assert_eq!(paid.calls(), 2);
        assert!(results.iter().all(|r| r.status == EntityStatus::Validated));
    }

    #[tokio::test]
    async fn clear_stats_resets_counters() {
        let engine = engine(EngineConfig::default(), vec![Arc::new(Fake::new("registry"))]);
        engine.validate_entity(&acme(), &SearchParams::default()).await;

        engine.clear_stats();
        let stats = engine.get_stats();

        assert_eq!(stats.validations_run, 0);
        assert_eq!(stats.cache_misses, 0);
        assert_eq!(stats.providers["registry"].success, 0);
    }

    #[tokio::test]
    async fn confidence_score_is_bounded() {
        let engine = engine(EngineConfig::default(), vec![Arc::new(Fake::new("registry"))]);
        let mut entity = Entity::named("Generic Business LLC");
        entity.address = Some("100 Main St, Anytown, CA 90210".into());
        entity.phone = Some("5551234567".into());

        let result = engine.validate_entity(&entity, &SearchParams::default()).await;

        assert!(result.confidence_score <= 100);
        assert_eq!(result.score.name, 0);
        assert_eq!(result.score.address, 0);
        assert_eq!(result.score.phone, 0);
        assert_eq!(result.confidence_score, result.score.total);
    }

    #[tokio::test]
    async fn entities_differing_only_by_email_get_their_own_results() {
        let echo = Arc::new(EmailEcho::default());
        let mut engine =
            Orchestrator::with_clock(EngineConfig::default(), Arc::new(ManualClock::new()));
        engine.register(echo.clone()).unwrap();
        let alice = Entity {
            email: Some("alice@acme.io".into()),
            ..Default::default()
        };
        let bob = Entity {
            email: Some("bob@other.org".into()),
            ..Default::default()
        };

        let first = engine.validate_entity(&alice, &SearchParams::default()).await;
        let second = engine.validate_entity(&bob, &SearchParams::default()).await;

        assert_eq!(first.results["email-echo"].payload["email"], "alice@acme.io");
        assert_eq!(second.results["email-echo"].payload["email"], "bob@other.org");
        assert!(!second.results["email-echo"].cached);
        assert_eq!(echo.calls.load(Ordering::SeqCst), 2);

        let again = engine.validate_entity(&alice, &SearchParams::default()).await;
        assert!(again.results["email-echo"].cached);
        assert_eq!(echo.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn sufficient_free_results_skip_the_paid_tier() {
        let registry = Arc::new(Fake::new("registry").paid(50));
        let website = Arc::new(Fake::new("website").verifying(EntityField::Website));
        let engine = engine(
            EngineConfig::default(),
            vec![registry.clone(), website.clone()],
        );

        let result = engine
            .validate_entity(&well_formed(), &SearchParams::default())
            .await;

        assert_eq!(website.calls(), 1);
        assert_eq!(registry.calls(), 0);
        assert_eq!(result.status, EntityStatus::Validated);
        assert_eq!(result.confidence_score, 100);
        assert_eq!(result.total_cost, Cents::ZERO);
        assert_eq!(result.providers_used, vec!["website"]);
        assert_eq!(
            result.providers_skipped,
            vec![SkippedProvider {
                provider: "registry".into(),
                reason: SkipReason::Sufficient,
            }]
        );
        assert_eq!(engine.get_stats().providers["registry"].skipped, 1);
    }

    #[tokio::test]
    async fn weak_free_results_escalate_to_the_paid_tier() {
        let registry = Arc::new(Fake::new("registry").paid(50));
        let website = Arc::new(Fake::new("website").verifying(EntityField::Website));
        let engine = engine(
            EngineConfig::default(),
            vec![registry.clone(), website.clone()],
        );

        let result = engine.validate_entity(&acme(), &SearchParams::default()).await;

        assert_eq!(registry.calls(), 1);
        assert_eq!(result.total_cost, Cents(50));
        assert_eq!(result.providers_used, vec!["registry", "website"]);
        assert!(result.providers_skipped.is_empty());
    }

    #[tokio::test]
    async fn tiering_disabled_runs_paid_providers_regardless() {
        let registry = Arc::new(Fake::new("registry").paid(50));
        let website = Arc::new(Fake::new("website").verifying(EntityField::Website));
        let config = EngineConfig {
            cost_tiering: false,
            ..EngineConfig::default()
        };
        let engine = engine(config, vec![registry.clone(), website.clone()]);

        let result = engine
            .validate_entity(&well_formed(), &SearchParams::default())
            .await;

        assert_eq!(registry.calls(), 1);
        assert_eq!(result.total_cost, Cents(50));
    }

    #[tokio::test]
    async fn paid_tier_runs_when_no_free_provider_succeeds() {
        let registry = Arc::new(Fake::new("registry").paid(50));
        let engine = engine(EngineConfig::default(), vec![registry.clone()]);

        let result = engine
            .validate_entity(&well_formed(), &SearchParams::default())
            .await;

        assert_eq!(registry.calls(), 1);
        assert_eq!(result.providers_used, vec!["registry"]);
    }
}
