//! oncurate-common — Shared curation document model, reference-data lookups and errors used across all oncurate crates.

pub mod error;
pub mod model;
pub mod names;
pub mod reference;
pub mod time;

// Re-export commonly used types
pub use error::{CurationError, NodeIssue, Result};
pub use model::{
    Alteration, AlterationGene, CancerType, Comment, Decoded, Field, GeneDocument, GeneticType,
    GenomicIndicator, History, HistoryOperation, HistoryRecord, Implication, Meta, MetaReview,
    Mutation, MutationEffect, MutationSpecific, Review, TherapeuticImplication, TiType, Treatment,
    Tumor, Vus, VusTime, VusTimeBy,
};
pub use reference::{Drug, NoReferenceData, ReferenceData, StaticReferenceData};
