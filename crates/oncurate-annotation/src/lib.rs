//! oncurate-annotation — alteration annotation with a deduplicating session cache.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod mock;
pub mod query;

pub use cache::AnnotationCache;
pub use client::{AlterationAnnotator, AnnotatedAlteration, AnnotationResult, AnnotationStatus, HttpAnnotator};
pub use config::{AnnotationConfig, RetryPolicy};
pub use error::{AnnotationError, Result};
pub use mock::MockAnnotator;
pub use query::{expand, query_id, AnnotateAlterationBody, MutationQuery};
