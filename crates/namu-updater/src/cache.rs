//! TTL-bounded cache of source results.
//!
//! Each source has its own async lock, held across the fetch, so lookups
//! and refreshes for one source are serialized without blocking the others.
//! A failed refresh falls back to the last payload even after it expired.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::candidate::{SourceName, UpdateCandidate};
use crate::clock::{Clock, SystemClock};
use crate::error::FetchError;

/// Default freshness window (10 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

/// A cached fetch result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub source: SourceName,
    pub payload: UpdateCandidate,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Slot {
    entry: Option<CacheEntry>,
    /// Set by `expire`; cleared by the next successful fetch
    expired: bool,
}

type SharedSlot = Arc<AsyncMutex<Slot>>;

/// Cache of the latest candidate per source.
pub struct ResultCache {
    ttl: ChronoDuration,
    clock: Arc<dyn Clock>,
    slots: Mutex<HashMap<SourceName, SharedSlot>>,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl: ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::days(365 * 100)),
            clock,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, source: SourceName) -> SharedSlot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(source).or_default().clone()
    }

    fn is_fresh(&self, slot: &Slot, now: DateTime<Utc>) -> bool {
        match &slot.entry {
            Some(entry) => !slot.expired && now - entry.fetched_at <= self.ttl,
            None => false,
        }
    }

    /// Return the cached candidate for `source` while fresh, otherwise
    /// refresh it with `fetch_fn`.
    ///
    /// When the refresh fails and any earlier payload exists, that payload
    /// is returned instead of the error.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        source: SourceName,
        fetch_fn: F,
    ) -> Result<UpdateCandidate, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<UpdateCandidate, FetchError>>,
    {
        let slot = self.slot(source);
        let mut slot = slot.lock().await;

        if self.is_fresh(&slot, self.clock.now()) {
            if let Some(entry) = &slot.entry {
                debug!("Cache hit for {} (fetched at {})", source, entry.fetched_at);
                return Ok(entry.payload.clone());
            }
        }

        match fetch_fn().await {
            Ok(candidate) => {
                slot.entry = Some(CacheEntry {
                    source,
                    payload: candidate.clone(),
                    fetched_at: self.clock.now(),
                });
                slot.expired = false;
                Ok(candidate)
            }
            Err(err) => match &slot.entry {
                Some(entry) => {
                    warn!(
                        "Refreshing {} failed ({}), serving result from {}",
                        source, err, entry.fetched_at
                    );
                    Ok(entry.payload.clone())
                }
                None => Err(err),
            },
        }
    }

    /// Current entry for `source`, fresh or not.
    pub async fn peek(&self, source: SourceName) -> Option<CacheEntry> {
        let slot = self.slot(source);
        let slot = slot.lock().await;
        slot.entry.clone()
    }

    /// Force the next lookup for `source` to refetch, keeping the payload
    /// as a fallback.
    pub async fn expire(&self, source: SourceName) {
        let slot = self.slot(source);
        let mut slot = slot.lock().await;
        if slot.entry.is_some() {
            debug!("Expiring cached result for {}", source);
            slot.expired = true;
        }
    }

    /// Drop every entry, fallbacks included.
    pub fn clear(&self) {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
