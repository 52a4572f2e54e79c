//! In-process annotator that records every batch it receives.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::client::{AlterationAnnotator, AnnotatedAlteration, AnnotationResult};
use crate::error::{AnnotationError, Result};
use crate::query::AnnotateAlterationBody;

/// Answers every query with a canned or echoed result.
#[derive(Default)]
pub struct MockAnnotator {
    canned: HashMap<String, AnnotationResult>,
    delay: Option<Duration>,
    failures_left: AtomicUsize,
    calls: AtomicUsize,
    batches: Mutex<Vec<Vec<String>>>,
}

impl MockAnnotator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canned result for one query id.
    pub fn with(mut self, query_id: &str, result: AnnotationResult) -> Self {
        self.canned.insert(query_id.to_string(), result);
        self
    }

    /// Hold each batch for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the next `n` batches.
    pub fn failing(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Query ids of every batch received, in call order.
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl AlterationAnnotator for MockAnnotator {
    async fn annotate(&self, queries: &[AnnotateAlterationBody]) -> Result<Vec<AnnotationResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(queries.iter().map(|q| q.query_id.clone()).collect());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AnnotationError::Unavailable("mock failure".to_string()));
        }

        Ok(queries
            .iter()
            .map(|q| {
                let mut result = self.canned.get(&q.query_id).cloned().unwrap_or_else(|| AnnotationResult {
                    entity: Some(AnnotatedAlteration {
                        alteration: q.alteration.alteration.trim().to_string(),
                        name: q.alteration.alteration.trim().to_string(),
                        genes: q.alteration.genes.clone(),
                        ..Default::default()
                    }),
                    ..Default::default()
                });
                result.query_id = Some(q.query_id.clone());
                result
            })
            .collect())
    }
}
