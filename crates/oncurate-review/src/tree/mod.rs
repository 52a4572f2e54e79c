//! Review level tree: building, projections and grouping.

pub mod builder;
pub mod level;

use std::collections::BTreeMap;

use oncurate_common::{GeneticType, Meta, NoReferenceData, ReferenceData};
use oncurate_store::{path, DocumentStore};
use serde_json::{json, Value};
use tracing::instrument;

pub use builder::{ReviewTree, ReviewTreeBuilder};
pub use level::{HistoryData, ReviewAction, ReviewLevel, ReviewLevelType};

use crate::error::Result;

/// Build a review tree with no reference data; titles fall back to raw ids.
pub fn build_review_tree(document: &Value, meta: &Meta, is_germline: bool) -> ReviewTree {
    ReviewTreeBuilder::new(&NoReferenceData).build(document, meta, is_germline)
}

/// Fetch the gene document and its meta record and build the tree. A gene
/// missing from the store yields a tree with only the root level.
#[instrument(skip(store, reference))]
pub async fn load_review_tree(
    store: &dyn DocumentStore,
    reference: &dyn ReferenceData,
    hugo: &str,
    genetic_type: GeneticType,
) -> Result<ReviewTree> {
    let document = store
        .get(&path::gene_path(hugo, genetic_type))
        .await?
        .unwrap_or_else(|| json!({ "name": hugo }));
    let meta = Meta::from_snapshot(store.get(&path::meta_path(hugo, genetic_type)).await?.as_ref())?;
    Ok(ReviewTreeBuilder::new(reference).build(&document, &meta, genetic_type.is_germline()))
}

/// Keep only levels awaiting review plus their ancestors. A pending create
/// or delete keeps its whole subtree, since its children are reviewed with it.
/// Returns `None` when nothing is pending.
pub fn prune_to_pending(level: &ReviewLevel) -> Option<ReviewLevel> {
    if level.is_actionable() && level.is_create_or_delete() {
        return Some(level.clone());
    }
    let children: Vec<ReviewLevel> = level.children.iter().filter_map(prune_to_pending).collect();
    if children.is_empty() && !level.is_actionable() {
        return None;
    }
    let mut pruned = level.clone();
    pruned.children = children;
    Some(pruned)
}

/// Collapse chains of grouping levels that have a single child into one
/// level titled `parent / child`. The root keeps its own title.
pub fn compact(mut root: ReviewLevel) -> ReviewLevel {
    root.children = root.children.into_iter().map(compact_level).collect();
    root
}

fn compact_level(mut level: ReviewLevel) -> ReviewLevel {
    level.children = level.children.into_iter().map(compact_level).collect();
    let collapsible = !level.is_reviewable()
        && level.children.len() == 1
        && !level.children[0].nested_under_create_or_delete;
    if !collapsible {
        return level;
    }
    let Some(mut child) = level.children.pop() else {
        return level;
    };
    child.title = format!("{} / {}", level.title, child.title);
    child
}

/// Sort sibling levels by their pending action: name changes, updates,
/// creations, deletions, then promotions and demotions. Levels without an
/// action keep their relative order after those.
pub fn sort_by_review_action(levels: &mut [ReviewLevel]) {
    levels.sort_by_key(|l| l.review_action.map(ReviewAction::priority).unwrap_or(usize::MAX));
}

/// Actionable levels of a tree in display order.
pub fn pending_levels(root: &ReviewLevel) -> Vec<&ReviewLevel> {
    root.iter().filter(|l| l.is_actionable() && l.is_reviewable()).collect()
}

/// Pending reviewable levels grouped by the curator who last edited them.
#[derive(Debug, Default)]
pub struct EditorReviewMap<'a> {
    by_editor: BTreeMap<String, Vec<&'a ReviewLevel>>,
}

impl<'a> EditorReviewMap<'a> {
    pub const UNKNOWN_EDITOR: &'static str = "Unknown";

    pub fn from_tree(root: &'a ReviewLevel) -> Self {
        let mut by_editor: BTreeMap<String, Vec<&'a ReviewLevel>> = BTreeMap::new();
        for level in pending_levels(root) {
            let editor = level.editor().unwrap_or(Self::UNKNOWN_EDITOR).to_string();
            by_editor.entry(editor).or_default().push(level);
        }
        Self { by_editor }
    }

    pub fn editors(&self) -> impl Iterator<Item = &str> {
        self.by_editor.keys().map(String::as_str)
    }

    pub fn reviews_for(&self, editor: &str) -> &[&'a ReviewLevel] {
        self.by_editor.get(editor).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_editor.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_editor.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oncurate_common::Review;

    fn pending(id: &str, action: ReviewAction, editor: &str) -> ReviewLevel {
        let mut level = ReviewLevel::meta(id, id, vec![id.to_string()]);
        level.level_type = ReviewLevelType::Gene;
        level.uuid = Some(format!("{id}-uuid"));
        level.needs_review = true;
        level.review_action = Some(action);
        level.review = Some(Review { updated_by: editor.to_string(), ..Default::default() });
        level
    }

    #[test]
    fn test_prune_keeps_ancestors_of_pending() {
        let mut root = ReviewLevel::meta("BRAF", "BRAF", vec![]);
        let mut group = ReviewLevel::meta("BRAF/mutations", "Mutations", vec![]);
        group.children.push(pending("BRAF/mutations/m1", ReviewAction::Update, "Ada"));
        group.children.push(ReviewLevel::meta("BRAF/mutations/m2", "quiet", vec![]));
        root.children.push(group);
        root.children.push(ReviewLevel::meta("BRAF/summary", "Summary", vec![]));

        let pruned = prune_to_pending(&root).unwrap();
        assert_eq!(pruned.ids(), vec!["BRAF", "BRAF/mutations", "BRAF/mutations/m1"]);
    }

    #[test]
    fn test_prune_nothing_pending() {
        let root = ReviewLevel::meta("BRAF", "BRAF", vec![]);
        assert!(prune_to_pending(&root).is_none());
    }

    #[test]
    fn test_compact_collapses_grouping_chain() {
        let mut root = ReviewLevel::meta("BRAF", "BRAF", vec![]);
        let mut group = ReviewLevel::meta("BRAF/mutations", "Mutations", vec![]);
        group.children.push(pending("BRAF/mutations/m1", ReviewAction::Update, "Ada"));
        root.children.push(group);

        let compacted = compact(root);
        assert_eq!(compacted.children.len(), 1);
        assert_eq!(compacted.children[0].title, "Mutations / BRAF/mutations/m1");
        assert_eq!(compacted.children[0].id, "BRAF/mutations/m1");
    }

    #[test]
    fn test_sort_by_review_action() {
        let mut levels = vec![
            pending("d", ReviewAction::Delete, "a"),
            pending("c", ReviewAction::Create, "a"),
            pending("n", ReviewAction::NameChange, "a"),
            pending("u", ReviewAction::Update, "a"),
        ];
        sort_by_review_action(&mut levels);
        let ids: Vec<_> = levels.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["n", "u", "c", "d"]);
    }

    #[test]
    fn test_editor_review_map() {
        let mut root = ReviewLevel::meta("BRAF", "BRAF", vec![]);
        root.children.push(pending("a", ReviewAction::Update, "Ada"));
        root.children.push(pending("b", ReviewAction::Update, "Grace"));
        root.children.push(pending("c", ReviewAction::Create, "Ada"));
        root.children.push(pending("d", ReviewAction::Update, ""));

        let map = EditorReviewMap::from_tree(&root);
        assert_eq!(map.editors().collect::<Vec<_>>(), vec!["Ada", "Grace", "Unknown"]);
        assert_eq!(map.reviews_for("Ada").len(), 2);
        assert_eq!(map.len(), 4);
        assert!(map.reviews_for("nobody").is_empty());
    }
}
