//! Annotator endpoint, retry and cache lifetime settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_reference_genome")]
    pub reference_genome: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Unset keeps resolved entries for the whole session.
    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,
}

fn default_base_url()         -> String { "http://localhost:8080".to_string() }
fn default_reference_genome() -> String { "GRCh37".to_string() }
fn default_timeout_secs()     -> u64 { 30 }

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            reference_genome: default_reference_genome(),
            timeout_secs: default_timeout_secs(),
            retry: RetryPolicy::default(),
            cache_ttl_secs: None,
        }
    }
}

impl AnnotationConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, backoff_ms: u64) -> Self {
        self.retry = RetryPolicy { max_attempts, backoff_ms };
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_secs = Some(ttl.as_secs());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(Duration::from_secs)
    }
}

/// Attempts per remote batch; one attempt means no retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_max_attempts() -> u32 { 1 }
fn default_backoff_ms()   -> u64 { 500 }

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: default_max_attempts(), backoff_ms: default_backoff_ms() }
    }
}

impl RetryPolicy {
    /// Linear backoff before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(attempt as u64))
    }
}
