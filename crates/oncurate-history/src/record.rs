//! Turning accepted reviews into history batches.

use oncurate_common::{GeneticType, History, HistoryOperation, HistoryRecord};
use oncurate_review::{ReviewAction, ReviewLevel};
use oncurate_store::{path, DocumentStore};
use tracing::{info, instrument};

use crate::error::Result;

fn record_from_review(level: &ReviewLevel) -> Option<HistoryRecord> {
    let action = level.review_action?;
    let operation = action.history_operation();
    let uuids: Vec<&str> = match action {
        ReviewAction::Create | ReviewAction::PromoteVus => level.iter().flat_map(ReviewLevel::uuids).collect(),
        ReviewAction::Delete | ReviewAction::DemoteMutation => Vec::new(),
        ReviewAction::Update | ReviewAction::NameChange => level.uuids(),
    };
    let keeps_old = !matches!(operation, HistoryOperation::Add | HistoryOperation::PromoteVus);
    Some(HistoryRecord {
        last_edit_by: level.editor().unwrap_or_default().to_string(),
        location: level.history_location.clone(),
        new: level.history_data.new_state.clone(),
        old: level.history_data.old_state.clone().filter(|_| keeps_old),
        operation,
        uuids: (!uuids.is_empty()).then(|| uuids.join(",")),
    })
}

/// One history batch for the reviews `reviewer` accepted at `time_stamp`.
/// Levels without a pending action are skipped.
pub fn build_history_from_reviews(reviewer: &str, levels: &[&ReviewLevel], time_stamp: i64) -> History {
    History {
        admin: reviewer.to_string(),
        time_stamp,
        records: levels.iter().filter_map(|level| record_from_review(level)).collect(),
    }
}

/// Append a batch to the gene's history log; returns the new push key.
#[instrument(skip(store, history), fields(n_records = history.records.len()))]
pub async fn append_history(
    store: &dyn DocumentStore,
    hugo: &str,
    genetic_type: GeneticType,
    history: &History,
) -> Result<String> {
    let key = store.push(&path::history_path(hugo, genetic_type), serde_json::to_value(history)?).await?;
    info!(hugo = %hugo, key = %key, "Appended history batch");
    Ok(key)
}
