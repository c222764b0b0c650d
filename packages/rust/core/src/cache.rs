//! TTL cache for provider results.
//!
//! Entries are keyed by provider name plus a normalised entity identity, so
//! two spellings of the same business ("Acme, Inc." and "ACME") share an
//! entry while different providers never collide.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::debug;

use prospector_shared::{Entity, SearchParams};

use crate::clock::Clock;

/// Name tokens dropped before keying.
const LEGAL_SUFFIXES: &[&str] = &["inc", "llc", "corp", "ltd", "company", "co"];

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

/// Lower-case, strip punctuation and legal-suffix tokens, collapse whitespace.
pub fn normalize_name(name: &str) -> String {
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '_')
        .collect();

    cleaned
        .split_whitespace()
        .filter(|token| !LEGAL_SUFFIXES.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lower-case, turn punctuation into spaces, collapse whitespace.
pub fn normalize_address(address: &str) -> String {
    let spaced: String = address
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { ' ' })
        .collect();

    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Deterministic cache key for one provider and entity.
///
/// The key is `<provider>:<sha256 of normalised fields>`. `identity` holds
/// the extra values the provider queries (see `Provider::cache_identity`).
pub fn cache_key(
    provider: &str,
    entity: &Entity,
    params: &SearchParams,
    identity: &[String],
) -> String {
    let name = normalize_name(entity.name().unwrap_or_default());
    let state = entity.state_or(params).unwrap_or_default().to_lowercase();
    let address = normalize_address(entity.address().unwrap_or_default());

    let mut hasher = Sha256::new();
    hasher.update(provider.as_bytes());
    hasher.update(b"\0");
    hasher.update(name.as_bytes());
    hasher.update(b"\0");
    hasher.update(state.trim().as_bytes());
    hasher.update(b"\0");
    hasher.update(address.as_bytes());
    for part in identity {
        hasher.update(b"\0");
        hasher.update(part.trim().as_bytes());
    }
    let digest = hasher.finalize();

    let mut key = String::with_capacity(provider.len() + 1 + digest.len() * 2);
    key.push_str(provider);
    key.push(':');
    for byte in digest {
        let _ = write!(key, "{byte:02x}");
    }
    key
}

// ---------------------------------------------------------------------------
// TtlCache
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Concurrent key/value store whose entries expire after a TTL.
///
/// Expired entries are never returned; they are dropped lazily on lookup and
/// by [`TtlCache::purge_expired`].
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
            clock,
        }
    }

    /// Fetch a live entry.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();

        if self
            .entries
            .remove_if(key, |_, entry| entry.expires_at <= now)
            .is_some()
        {
            debug!(key, "cache entry expired");
            return None;
        }

        self.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Store `value` for `ttl`.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let expires_at = self.clock.now() + ttl;
        self.entries.insert(key.into(), CacheEntry { value, expires_at });
    }

    /// Store `value` for the default TTL.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.set(key, value, self.default_ttl);
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}
