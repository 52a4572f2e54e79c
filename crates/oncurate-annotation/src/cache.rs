//! Session-wide annotation cache.
//!
//! `fetch` claims a slot for every unseen query id before it awaits the
//! remote call, so overlapping callers find the slot taken and wait for the
//! batch that claimed it instead of sending the id again. A failed batch
//! records its error and leaves the claimed slots unresolved; they are not
//! re-requested until they expire. A `fetch` dropped mid-batch releases its
//! claims instead, so dropping a caller never strands a slot.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use crate::client::{AlterationAnnotator, AnnotationResult};
use crate::config::AnnotationConfig;
use crate::error::{AnnotationError, Result};
use crate::query::{expand, AnnotateAlterationBody, MutationQuery};

type CacheKey = (String, String);

struct CacheEntry {
    query: AnnotateAlterationBody,
    result: Option<AnnotationResult>,
    claimed_at: Instant,
    /// Completion signal of the batch that claimed this slot.
    in_flight: Option<watch::Receiver<bool>>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    error: Option<String>,
    batches_in_flight: usize,
}

pub struct AnnotationCache {
    annotator: Arc<dyn AlterationAnnotator>,
    config: AnnotationConfig,
    state: Mutex<CacheState>,
}

impl AnnotationCache {
    pub fn new(annotator: Arc<dyn AlterationAnnotator>, config: AnnotationConfig) -> Self {
        Self { annotator, config, state: Mutex::new(CacheState::default()) }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn leaf_queries(&self, hugo: &str, mutations: &[MutationQuery]) -> Vec<AnnotateAlterationBody> {
        mutations
            .iter()
            .flat_map(|m| expand(hugo, m, &self.config.reference_genome))
            .collect()
    }

    /// Resolve every leaf query of `mutations`, sending unseen ones in a
    /// single remote batch. Returns the resolved results in query order;
    /// unresolved queries are left out.
    #[instrument(skip_all, fields(hugo = %hugo))]
    pub async fn fetch(&self, hugo: &str, mutations: &[MutationQuery]) -> Vec<AnnotationResult> {
        let queries = self.leaf_queries(hugo, mutations);

        let (unseen, waits, sender) = {
            let mut state = self.lock();
            self.evict_expired(&mut state);
            let (tx, rx) = watch::channel(false);
            let mut unseen = Vec::new();
            let mut waits = Vec::new();
            let mut claimed = HashSet::new();
            for query in &queries {
                let key = (hugo.to_string(), query.query_id.clone());
                if let Some(entry) = state.entries.get(&key) {
                    if let Some(pending) = entry.in_flight.as_ref().filter(|_| !claimed.contains(&key)) {
                        waits.push(pending.clone());
                    }
                    continue;
                }
                state.entries.insert(
                    key.clone(),
                    CacheEntry {
                        query: query.clone(),
                        result: None,
                        claimed_at: Instant::now(),
                        in_flight: Some(rx.clone()),
                    },
                );
                claimed.insert(key);
                unseen.push(query.clone());
            }
            if !unseen.is_empty() {
                state.batches_in_flight += 1;
            }
            (unseen, waits, tx)
        };

        if !unseen.is_empty() {
            debug!(n_unseen = unseen.len(), n_waiting = waits.len(), "Annotating unseen queries");
            let mut claim = Claim { cache: self, hugo, batch: &unseen, sender, settled: false };
            let outcome = self.annotate_with_retry(&unseen).await;
            self.settle(hugo, &unseen, outcome);
            claim.settled = true;
        }
        for mut pending in waits {
            // Signalled once the claiming batch settles or is released.
            let _ = pending.wait_for(|done| *done).await;
        }

        self.get(hugo, mutations)
    }

    /// Already resolved results for `mutations`, in query order. Never
    /// contacts the annotator.
    pub fn get(&self, hugo: &str, mutations: &[MutationQuery]) -> Vec<AnnotationResult> {
        let queries = self.leaf_queries(hugo, mutations);
        let state = self.lock();
        let ttl = self.config.cache_ttl();
        queries
            .iter()
            .filter_map(|q| state.entries.get(&(hugo.to_string(), q.query_id.clone())))
            .filter(|entry| ttl.is_none_or(|ttl| entry.claimed_at.elapsed() < ttl))
            .filter_map(|entry| entry.result.clone())
            .collect()
    }

    /// Error of the most recent failed batch.
    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().batches_in_flight > 0
    }

    /// Number of claimed slots, resolved or not.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The query a slot was claimed with.
    pub fn query(&self, hugo: &str, query_id: &str) -> Option<AnnotateAlterationBody> {
        self.lock().entries.get(&(hugo.to_string(), query_id.to_string())).map(|e| e.query.clone())
    }

    fn evict_expired(&self, state: &mut CacheState) {
        let Some(ttl) = self.config.cache_ttl() else {
            return;
        };
        let before = state.entries.len();
        state
            .entries
            .retain(|_, entry| entry.in_flight.is_some() || entry.claimed_at.elapsed() < ttl);
        let evicted = before - state.entries.len();
        if evicted > 0 {
            debug!(evicted, "Evicted expired annotations");
        }
    }

    async fn annotate_with_retry(&self, queries: &[AnnotateAlterationBody]) -> Result<Vec<AnnotationResult>> {
        let attempts = self.config.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.annotator.annotate(queries).await {
                Ok(results) => return Ok(results),
                Err(e) if attempt < attempts => {
                    warn!(attempt, error = %e, "Annotation batch failed, retrying");
                    tokio::time::sleep(self.config.retry.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Drop the unresolved slots of a batch whose `fetch` went away before
    /// the annotator answered, so the next caller requests them again.
    fn release(&self, hugo: &str, batch: &[AnnotateAlterationBody]) {
        let mut state = self.lock();
        state.batches_in_flight = state.batches_in_flight.saturating_sub(1);
        for query in batch {
            let key = (hugo.to_string(), query.query_id.clone());
            if state.entries.get(&key).is_some_and(|e| e.result.is_none()) {
                state.entries.remove(&key);
            }
        }
        debug!(hugo = %hugo, n_queries = batch.len(), "Released slots of a cancelled batch");
    }

    fn settle(&self, hugo: &str, batch: &[AnnotateAlterationBody], outcome: Result<Vec<AnnotationResult>>) {
        let mut state = self.lock();
        state.batches_in_flight = state.batches_in_flight.saturating_sub(1);
        for query in batch {
            if let Some(entry) = state.entries.get_mut(&(hugo.to_string(), query.query_id.clone())) {
                entry.in_flight = None;
                entry.claimed_at = Instant::now();
            }
        }

        let results = match outcome {
            Ok(results) => results,
            Err(e) => {
                warn!(hugo = %hugo, n_queries = batch.len(), error = %e, "Annotation batch failed");
                state.error = Some(e.to_string());
                return;
            }
        };
        for result in results {
            let Some(query_id) = result.query_id.clone() else {
                warn!(hugo = %hugo, "Annotation result without queryId");
                state.error = Some(AnnotationError::MissingQueryId.to_string());
                continue;
            };
            match state.entries.get_mut(&(hugo.to_string(), query_id.clone())) {
                Some(entry) => entry.result = Some(result),
                None => warn!(hugo = %hugo, query_id = %query_id, "Annotation result for an unknown query"),
            }
        }
    }
}

/// Slots claimed by one batch. Dropping it wakes the waiters; if the batch
/// never settled, the slots are released first.
struct Claim<'a> {
    cache: &'a AnnotationCache,
    hugo: &'a str,
    batch: &'a [AnnotateAlterationBody],
    sender: watch::Sender<bool>,
    settled: bool,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.cache.release(self.hugo, self.batch);
        }
        self.sender.send_replace(true);
    }
}
