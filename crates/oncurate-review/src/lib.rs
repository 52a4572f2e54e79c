//! oncurate-review — mutation ordering, review level trees and the review lock.

pub mod error;
pub mod lock;
pub mod ordering;
pub mod tree;

pub use error::{Result, ReviewError};
pub use lock::{lock_state, needs_review, EnterReview, LockState, ReviewSession};
pub use ordering::{compare_mutation_names, compare_mutations, compare_mutations_for_curation};
pub use tree::{
    build_review_tree, compact, load_review_tree, prune_to_pending, EditorReviewMap, ReviewAction,
    ReviewLevel, ReviewLevelType, ReviewTree, ReviewTreeBuilder,
};
