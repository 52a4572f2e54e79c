//! Review level nodes.

use oncurate_common::{HistoryOperation, Review};
use serde::Serialize;
use serde_json::Value;

/// Kind of document element a review level belongs to. `Meta` levels only
/// group other levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewLevelType {
    Meta,
    Gene,
    Mutation,
    Tumor,
    Treatment,
    GenomicIndicator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewAction {
    Create,
    Delete,
    Update,
    NameChange,
    PromoteVus,
    DemoteMutation,
}

impl ReviewAction {
    /// Derive the pending action from a review and the store path it lives at.
    pub fn from_review(review: &Review, review_path: &str) -> Self {
        if review.added {
            return if review.promoted_to_mutation { ReviewAction::PromoteVus } else { ReviewAction::Create };
        }
        if review.removed {
            return if review.demoted_to_vus { ReviewAction::DemoteMutation } else { ReviewAction::Delete };
        }
        if review_path.ends_with("name_review") || review_path.ends_with("cancerTypes_review") {
            return ReviewAction::NameChange;
        }
        ReviewAction::Update
    }

    /// Actions that create or remove a whole element.
    pub fn is_create_or_delete(self) -> bool {
        matches!(
            self,
            ReviewAction::Create | ReviewAction::Delete | ReviewAction::PromoteVus | ReviewAction::DemoteMutation
        )
    }

    pub fn history_operation(self) -> HistoryOperation {
        match self {
            ReviewAction::Create => HistoryOperation::Add,
            ReviewAction::Delete => HistoryOperation::Delete,
            ReviewAction::Update => HistoryOperation::Update,
            ReviewAction::NameChange => HistoryOperation::NameChange,
            ReviewAction::PromoteVus => HistoryOperation::PromoteVus,
            ReviewAction::DemoteMutation => HistoryOperation::DemoteMutation,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ReviewAction::Create => "Created",
            ReviewAction::Delete => "Deleted",
            ReviewAction::Update | ReviewAction::NameChange => "Updated",
            ReviewAction::PromoteVus => "Promoted",
            ReviewAction::DemoteMutation => "Demoted",
        }
    }

    /// Display priority among sibling reviews.
    pub fn priority(self) -> usize {
        match self {
            ReviewAction::NameChange => 0,
            ReviewAction::Update => 1,
            ReviewAction::Create => 2,
            ReviewAction::Delete => 3,
            ReviewAction::PromoteVus => 4,
            ReviewAction::DemoteMutation => 5,
        }
    }
}

/// State written to the history log when a review is accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_state: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_state: Option<Value>,
}

/// One node of the derived review tree.
///
/// `id` is built from stable identifiers (field keys, `name_uuid`s, tumor
/// signatures) and survives reordering; `value_path` carries array indexes
/// and is only meant for writing back to the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewLevel {
    pub id: String,
    pub level_type: ReviewLevelType,
    pub title: String,
    pub title_parts: Vec<String>,
    /// Store path of the backing field, relative to the gene document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<Review>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_action: Option<ReviewAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
    pub history_location: String,
    #[serde(skip)]
    pub history_data: HistoryData,
    pub needs_review: bool,
    pub nested_under_create_or_delete: bool,
    pub children: Vec<ReviewLevel>,
}

impl ReviewLevel {
    /// A grouping level with no backing field.
    pub fn meta(id: impl Into<String>, title: impl Into<String>, title_parts: Vec<String>) -> Self {
        Self {
            id: id.into(),
            level_type: ReviewLevelType::Meta,
            title: title.into(),
            title_parts,
            value_path: None,
            uuid: None,
            review: None,
            review_action: None,
            current_value: None,
            old_value: None,
            history_location: String::new(),
            history_data: HistoryData::default(),
            needs_review: false,
            nested_under_create_or_delete: false,
            children: Vec::new(),
        }
    }

    /// Levels backed by a field with a uuid can be reviewed.
    pub fn is_reviewable(&self) -> bool {
        self.uuid.is_some()
    }

    pub fn is_create_or_delete(&self) -> bool {
        self.review_action.is_some_and(ReviewAction::is_create_or_delete)
    }

    /// A pending review the reviewer can act on.
    pub fn is_actionable(&self) -> bool {
        self.needs_review && !self.nested_under_create_or_delete
    }

    pub fn editor(&self) -> Option<&str> {
        self.review.as_ref().map(|r| r.updated_by.as_str()).filter(|e| !e.is_empty())
    }

    pub fn updated_at(&self) -> Option<i64> {
        self.review.as_ref().and_then(|r| r.update_time)
    }

    /// Store path of the review record next to the backing field.
    pub fn review_path(&self) -> Option<String> {
        self.value_path.as_ref().map(|p| format!("{p}_review"))
    }

    /// Uuids the review covers; tumor levels may cover two.
    pub fn uuids(&self) -> Vec<&str> {
        self.uuid
            .as_deref()
            .map(|u| u.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Pre-order traversal including `self`.
    pub fn iter(&self) -> impl Iterator<Item = &ReviewLevel> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }

    pub fn node_count(&self) -> usize {
        self.iter().count()
    }

    pub fn find(&self, id: &str) -> Option<&ReviewLevel> {
        self.iter().find(|node| node.id == id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.iter().map(|node| node.id.as_str()).collect()
    }

    /// Render as an indented outline, one level per line.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        self.write_outline(0, &mut out);
        out
    }

    fn write_outline(&self, depth: usize, out: &mut String) {
        out.push_str(&"  ".repeat(depth));
        out.push_str(&self.title);
        if let Some(action) = self.review_action.filter(|_| self.needs_review) {
            out.push_str(&format!(" [{}", action.label()));
            if let Some(editor) = self.editor() {
                out.push_str(&format!(" by {editor}"));
            }
            out.push(']');
        }
        if let Some(value) = self.current_value.as_deref().filter(|v| !v.is_empty() && self.children.is_empty()) {
            out.push_str(": ");
            out.push_str(&truncate(value, 80));
        }
        out.push('\n');
        for child in &self.children {
            child.write_outline(depth + 1, out);
        }
    }
}

fn truncate(value: &str, max: usize) -> String {
    let single_line = value.replace('\n', " ");
    if single_line.chars().count() <= max {
        return single_line;
    }
    let cut: String = single_line.chars().take(max).collect();
    format!("{cut}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_action_from_review() {
        let added = Review { added: true, ..Default::default() };
        assert_eq!(ReviewAction::from_review(&added, "mutations/0/name_review"), ReviewAction::Create);

        let promoted = Review { added: true, promoted_to_mutation: true, ..Default::default() };
        assert_eq!(ReviewAction::from_review(&promoted, "mutations/0/name_review"), ReviewAction::PromoteVus);

        let demoted = Review { removed: true, demoted_to_vus: true, ..Default::default() };
        assert_eq!(ReviewAction::from_review(&demoted, "x"), ReviewAction::DemoteMutation);

        let plain = Review::default();
        assert_eq!(ReviewAction::from_review(&plain, "mutations/0/tumors/1/cancerTypes_review"), ReviewAction::NameChange);
        assert_eq!(ReviewAction::from_review(&plain, "summary_review"), ReviewAction::Update);
    }

    #[test]
    fn test_preorder_iteration() {
        let mut root = ReviewLevel::meta("a", "A", vec!["A".into()]);
        let mut b = ReviewLevel::meta("a/b", "B", vec![]);
        b.children.push(ReviewLevel::meta("a/b/c", "C", vec![]));
        root.children.push(b);
        root.children.push(ReviewLevel::meta("a/d", "D", vec![]));
        assert_eq!(root.ids(), vec!["a", "a/b", "a/b/c", "a/d"]);
        assert_eq!(root.node_count(), 4);
        assert!(root.find("a/b/c").is_some());
    }
}
