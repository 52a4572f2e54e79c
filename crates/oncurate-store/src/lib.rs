//! oncurate-store — Document path model, the realtime document store seam, an in-memory store and the meta-record service.
//!
//! Every path the rest of the workspace touches is produced by [`path`]; no
//! other module concatenates store keys.

pub mod error;
pub mod memory;
pub mod meta;
pub mod path;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use meta::MetaService;
pub use store::{DocumentStore, SnapshotCallback, Subscription};
