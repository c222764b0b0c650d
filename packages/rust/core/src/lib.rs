//! The Prospector enrichment engine.
//!
//! This crate ties providers together into per-entity and batch enrichment
//! runs: relevance selection, result caching, budget gating, bounded
//! concurrency, polling of long-running upstream jobs, and confidence
//! scoring (see [`Orchestrator`]).

pub mod budget;
pub mod cache;
pub mod clock;
pub mod orchestrator;
pub mod polling;
pub mod scheduler;
pub mod scoring;
pub mod stats;

pub use budget::BudgetLedger;
pub use cache::{TtlCache, cache_key, normalize_address, normalize_name};
pub use clock::{Clock, ManualClock, TokioClock};
pub use orchestrator::{
    BatchProgress, BatchSummary, EnrichmentResult, EntityStatus, Orchestrator, ProviderFailure,
    SilentProgress, SkipReason, SkippedProvider,
};
pub use polling::{PollSession, PollState, PollingClient};
pub use scheduler::ConcurrencyScheduler;
pub use scoring::{
    Component, ConfidenceScorer, Disqualification, DisqualificationRule, QUALIFIED_THRESHOLD,
    QualityTier, ScoreBreakdown, Weights, default_rules,
};
pub use stats::{EngineStats, ErrorRecord, ProviderStats, StatsCollector};
