//! Document path model.
//!
//! Pure functions from (gene, genetic type, element coordinates) to store
//! paths. Collection roots differ per genetic type:
//!
//! | kind    | somatic           | germline                   |
//! |---------|-------------------|----------------------------|
//! | gene    | `Genes/:hugo`     | `Germline_Genes/:hugo`     |
//! | meta    | `Meta/:hugo`      | `Germline_Meta/:hugo`      |
//! | history | `History/:hugo/api` | `Germline_History/:hugo/api` |
//! | vus     | `VUS/:hugo`       | `Germline_VUS/:hugo`       |

use oncurate_common::GeneticType;

use crate::error::{Result, StoreError};

pub const SEPARATOR: char = '/';

const FORBIDDEN_KEY_CHARS: [char; 5] = ['.', '#', '$', '[', ']'];

fn collection(somatic: &'static str, germline: &'static str, genetic_type: GeneticType) -> &'static str {
    match genetic_type {
        GeneticType::Somatic => somatic,
        GeneticType::Germline => germline,
    }
}

pub fn genes_root(genetic_type: GeneticType) -> &'static str {
    collection("Genes", "Germline_Genes", genetic_type)
}

pub fn meta_root(genetic_type: GeneticType) -> &'static str {
    collection("Meta", "Germline_Meta", genetic_type)
}

pub fn gene_path(hugo: &str, genetic_type: GeneticType) -> String {
    join(genes_root(genetic_type), hugo)
}

pub fn meta_path(hugo: &str, genetic_type: GeneticType) -> String {
    join(meta_root(genetic_type), hugo)
}

pub fn meta_review_path(hugo: &str, genetic_type: GeneticType) -> String {
    join(&meta_path(hugo, genetic_type), "review")
}

pub fn meta_review_flag_path(hugo: &str, genetic_type: GeneticType, uuid: &str) -> String {
    join(&meta_review_path(hugo, genetic_type), uuid)
}

pub fn current_reviewer_path(hugo: &str, genetic_type: GeneticType) -> String {
    join(&meta_review_path(hugo, genetic_type), oncurate_common::model::CURRENT_REVIEWER_KEY)
}

pub fn history_path(hugo: &str, genetic_type: GeneticType) -> String {
    let root = collection("History", "Germline_History", genetic_type);
    format!("{root}/{hugo}/api")
}

pub fn vus_path(hugo: &str, genetic_type: GeneticType) -> String {
    join(collection("VUS", "Germline_VUS", genetic_type), hugo)
}

/// Collaborator records are shared by both genetic types.
pub fn collaborators_path() -> &'static str {
    "Meta/collaborators"
}

pub fn collaborator_path(name: &str) -> String {
    join(collaborators_path(), &name.trim().to_lowercase())
}

pub fn drugs_path() -> &'static str {
    "Drugs"
}

// ---- Element paths, relative to a gene document ----

pub fn mutation_path(mutation: usize) -> String {
    format!("mutations/{mutation}")
}

pub fn tumor_path(mutation: usize, tumor: usize) -> String {
    format!("{}/tumors/{tumor}", mutation_path(mutation))
}

pub fn therapeutic_implication_path(mutation: usize, tumor: usize, ti: usize) -> String {
    format!("{}/TIs/{ti}", tumor_path(mutation, tumor))
}

pub fn treatment_path(mutation: usize, tumor: usize, ti: usize, treatment: usize) -> String {
    format!("{}/treatments/{treatment}", therapeutic_implication_path(mutation, tumor, ti))
}

pub fn genomic_indicator_path(indicator: usize) -> String {
    format!("genomic_indicators/{indicator}")
}

/// Path of a field inside an element. An empty `base` means the gene root.
pub fn field_path(base: &str, field: &str) -> String {
    join(base, field)
}

pub fn review_key(field: &str) -> String {
    format!("{field}_review")
}

pub fn uuid_key(field: &str) -> String {
    format!("{field}_uuid")
}

pub fn comments_key(field: &str) -> String {
    format!("{field}_comments")
}

// ---- Generic path helpers ----

/// Join two paths, ignoring empty sides and duplicate separators.
pub fn join(base: &str, child: &str) -> String {
    let base = base.trim_end_matches(SEPARATOR);
    let child = child.trim_start_matches(SEPARATOR);
    match (base.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{base}{SEPARATOR}{child}"),
    }
}

/// Split a path into validated segments. Leading and trailing separators are
/// ignored; the empty path is the root and has no segments.
pub fn segments(path: &str) -> Result<Vec<&str>> {
    let trimmed = path.trim_matches(SEPARATOR);
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    trimmed
        .split(SEPARATOR)
        .map(|segment| validate_key(segment).map(|_| segment))
        .collect()
}

pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey { key: key.to_string(), reason: "empty segment" });
    }
    if key.contains(FORBIDDEN_KEY_CHARS) {
        return Err(StoreError::InvalidKey {
            key: key.to_string(),
            reason: "contains one of . # $ [ ]",
        });
    }
    Ok(())
}

pub fn parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_matches(SEPARATOR);
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.rsplit_once(SEPARATOR).map(|(parent, _)| parent).unwrap_or(""))
}

pub fn last_segment(path: &str) -> &str {
    let trimmed = path.trim_matches(SEPARATOR);
    trimmed.rsplit_once(SEPARATOR).map(|(_, last)| last).unwrap_or(trimmed)
}

/// `path` with the `ancestor` prefix removed, or `None` when `ancestor` is
/// not an ancestor-or-self of `path`.
pub fn relative_to<'a>(path: &'a str, ancestor: &str) -> Option<&'a str> {
    let path = path.trim_matches(SEPARATOR);
    let ancestor = ancestor.trim_matches(SEPARATOR);
    if ancestor.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(ancestor)?;
    if rest.is_empty() {
        Some("")
    } else {
        rest.strip_prefix(SEPARATOR)
    }
}

/// True when one path is an ancestor-or-self of the other.
pub fn overlaps(a: &str, b: &str) -> bool {
    relative_to(a, b).is_some() || relative_to(b, a).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_paths_per_genetic_type() {
        assert_eq!(gene_path("BRAF", GeneticType::Somatic), "Genes/BRAF");
        assert_eq!(gene_path("BRCA1", GeneticType::Germline), "Germline_Genes/BRCA1");
        assert_eq!(meta_review_path("BRAF", GeneticType::Germline), "Germline_Meta/BRAF/review");
        assert_eq!(
            current_reviewer_path("BRAF", GeneticType::Somatic),
            "Meta/BRAF/review/currentReviewer"
        );
        assert_eq!(history_path("BRAF", GeneticType::Germline), "Germline_History/BRAF/api");
        assert_eq!(vus_path("BRAF", GeneticType::Somatic), "VUS/BRAF");
        assert_eq!(collaborator_path(" Ada Lovelace "), "Meta/collaborators/ada lovelace");
    }

    #[test]
    fn test_element_paths() {
        assert_eq!(treatment_path(1, 0, 2, 3), "mutations/1/tumors/0/TIs/2/treatments/3");
        assert_eq!(field_path(&tumor_path(0, 1), &review_key("summary")), "mutations/0/tumors/1/summary_review");
        assert_eq!(field_path("", "background"), "background");
    }

    #[test]
    fn test_segments_reject_forbidden_keys() {
        assert_eq!(segments("/Genes/BRAF/").unwrap(), vec!["Genes", "BRAF"]);
        assert!(segments("").unwrap().is_empty());
        assert!(segments("Genes//BRAF").is_err());
        assert!(segments("Genes/BR.AF").is_err());
        assert!(segments("Genes/$x").is_err());
    }

    #[test]
    fn test_relative_and_overlap() {
        assert_eq!(relative_to("Meta/BRAF/review/u1", "Meta/BRAF"), Some("review/u1"));
        assert_eq!(relative_to("Meta/BRAF", "Meta/BRAF"), Some(""));
        assert_eq!(relative_to("Meta/BRAFX", "Meta/BRAF"), None);
        assert!(overlaps("Meta/BRAF", "Meta/BRAF/review"));
        assert!(overlaps("Meta/BRAF/review", "Meta"));
        assert!(!overlaps("Meta/BRAF", "Meta/KRAS"));
        assert_eq!(parent("Meta/BRAF/review"), Some("Meta/BRAF"));
        assert_eq!(parent("Meta"), Some(""));
        assert_eq!(last_segment("Meta/BRAF/review"), "review");
    }
}
