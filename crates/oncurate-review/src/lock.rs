//! Review lock protocol.
//!
//! One curator at a time reviews a (gene, genetic type) pair. The lock is
//! the meta record's `review/currentReviewer` field, written last-write-wins
//! with no compare-and-swap: two curators entering at the same moment both
//! believe they hold it until their next snapshot arrives. Entering over
//! another holder therefore needs explicit confirmation, and nothing here
//! blocks document writes.

use std::sync::Arc;

use oncurate_common::{GeneticType, MetaReview};
use oncurate_store::{path, DocumentStore, MetaService, Subscription};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::tree::ReviewLevel;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "holder", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockState {
    Unlocked,
    LockedBySelf,
    LockedByOther(String),
}

impl LockState {
    /// Whether `user` should treat the gene as read-only.
    pub fn is_read_only(&self) -> bool {
        matches!(self, LockState::LockedByOther(_))
    }
}

/// Lock state of a meta `review` object as seen by `user`.
pub fn lock_state(review: &MetaReview, user: &str) -> LockState {
    let holder = review.current_reviewer.trim();
    if holder.is_empty() {
        LockState::Unlocked
    } else if holder == user.trim() {
        LockState::LockedBySelf
    } else {
        LockState::LockedByOther(holder.to_string())
    }
}

/// True when some level below the root is flagged and actionable.
///
/// Bookkeeping keys of the meta review map never become levels, so they
/// cannot count here.
pub fn needs_review(root: &ReviewLevel) -> bool {
    root.iter().skip(1).any(|level| level.is_reviewable() && level.is_actionable())
}

/// Outcome of trying to enter review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnterReview {
    Entered,
    /// Someone else holds the lock; call again with `confirm_override` to take it.
    NeedsConfirmation { holder: String },
}

/// Review lock operations for one gene on behalf of one curator.
#[derive(Clone)]
pub struct ReviewSession {
    meta: MetaService,
    hugo: String,
    genetic_type: GeneticType,
}

impl ReviewSession {
    pub fn new(store: Arc<dyn DocumentStore>, user: impl Into<String>, hugo: impl Into<String>, genetic_type: GeneticType) -> Self {
        Self { meta: MetaService::new(store, user), hugo: hugo.into(), genetic_type }
    }

    pub fn user(&self) -> &str {
        self.meta.user()
    }

    pub fn hugo(&self) -> &str {
        &self.hugo
    }

    pub async fn state(&self) -> Result<LockState> {
        let meta = self.meta.load_meta(&self.hugo, self.genetic_type).await?;
        Ok(lock_state(&meta.review, self.user()))
    }

    #[instrument(skip(self), fields(hugo = %self.hugo, user = %self.user()))]
    pub async fn enter_review(&self, confirm_override: bool) -> Result<EnterReview> {
        if let LockState::LockedByOther(holder) = self.state().await? {
            if !confirm_override {
                info!(holder = %holder, "Review held by another curator, confirmation required");
                return Ok(EnterReview::NeedsConfirmation { holder });
            }
            warn!(holder = %holder, "Taking over review lock");
        }
        self.meta.set_current_reviewer(&self.hugo, self.genetic_type, true).await?;
        Ok(EnterReview::Entered)
    }

    /// Release the lock ("Review Complete").
    #[instrument(skip(self), fields(hugo = %self.hugo, user = %self.user()))]
    pub async fn complete_review(&self) -> Result<()> {
        self.meta.set_current_reviewer(&self.hugo, self.genetic_type, false).await?;
        Ok(())
    }

    /// Clear the review flag of an accepted or rejected level.
    pub async fn clear_flag(&self, level: &ReviewLevel) -> Result<()> {
        let Some(uuid) = level.uuid.as_deref() else {
            return Ok(());
        };
        self.meta.update_meta(&self.hugo, self.genetic_type, uuid, false).await?;
        Ok(())
    }

    /// Call `on_change` with the lock state now and after every change to
    /// the meta review object. Drop the returned handle to stop.
    pub fn watch(&self, on_change: impl Fn(LockState) + Send + Sync + 'static) -> Result<Subscription> {
        let user = self.user().to_string();
        let review_path = path::meta_review_path(&self.hugo, self.genetic_type);
        let subscription = self.meta.store().subscribe(
            &review_path,
            Arc::new(move |snapshot: Option<&Value>| {
                let review = match snapshot {
                    Some(value) => serde_json::from_value::<MetaReview>(value.clone()).unwrap_or_else(|e| {
                        warn!(error = %e, "Unreadable meta review snapshot, treating as unlocked");
                        MetaReview::default()
                    }),
                    None => MetaReview::default(),
                };
                on_change(lock_state(&review, &user));
            }),
        )?;
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::ReviewLevelType;

    fn review(holder: &str) -> MetaReview {
        MetaReview { current_reviewer: holder.to_string(), ..Default::default() }
    }

    #[test]
    fn test_lock_state_transitions() {
        assert_eq!(lock_state(&review(""), "Ada"), LockState::Unlocked);
        assert_eq!(lock_state(&review("Ada"), "Ada"), LockState::LockedBySelf);
        assert_eq!(lock_state(&review("Grace"), "Ada"), LockState::LockedByOther("Grace".into()));
        assert!(lock_state(&review("Grace"), "Ada").is_read_only());
    }

    #[test]
    fn test_needs_review_ignores_root_and_nested() {
        let mut root = ReviewLevel::meta("BRAF", "BRAF", vec![]);
        root.needs_review = true;
        assert!(!needs_review(&root));

        let mut nested = ReviewLevel::meta("BRAF/summary", "Summary", vec![]);
        nested.level_type = ReviewLevelType::Gene;
        nested.uuid = Some("u".into());
        nested.needs_review = true;
        nested.nested_under_create_or_delete = true;
        root.children.push(nested.clone());
        assert!(!needs_review(&root));

        nested.nested_under_create_or_delete = false;
        root.children.push(nested);
        assert!(needs_review(&root));
    }
}
