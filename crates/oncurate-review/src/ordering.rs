//! Mutation ordering.
//!
//! Every comparator here is derived from a sort key, so the orders are total,
//! antisymmetric and transitive by construction. The core order is:
//!
//! 1. categorical alterations (`Oncogenic Mutations`, `Fusions`, …) by table rank
//! 2. single alterations with a protein position, by position
//! 3. other single alterations
//! 4. compound mutations (`V600E, V600K`)
//! 5. mutations without a name
//!
//! with case-insensitive display name, then exact name, as the tie-break.

use std::cmp::Ordering;
use std::sync::OnceLock;

use oncurate_common::names::mutation_name;
use oncurate_common::{Alteration, Mutation, TiType, Tumor};
use regex::Regex;

/// Categorical alterations in display priority.
pub const CATEGORICAL_ALTERATIONS: &[&str] = &[
    "Oncogenic Mutations",
    "Gain-of-function Mutations",
    "Loss-of-function Mutations",
    "Switch-of-function Mutations",
    "Truncating Mutations",
    "Fusions",
    "Amplification",
    "Deletion",
    "Overexpression",
    "Promoter Mutations",
    "Promoter Hypermethylation",
    "Kinase Domain Duplication",
    "Wildtype",
];

/// Therapeutic levels, highest first.
pub const TX_LEVEL_ORDER: &[&str] = &["1", "R1", "2", "3A", "3B", "4", "R2"];

fn position_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // V600E, p.V600E, p.Val600Glu, E746_A750del, R248*
    RE.get_or_init(|| Regex::new(r"^(?:p\.)?[A-Z][a-z]{0,2}(\d+)").unwrap())
}

/// Rank of a categorical alteration name, matched case-insensitively.
/// Named fusions (`EML4-ALK Fusion`) rank with `Fusions`.
pub fn categorical_rank(name: &str) -> Option<usize> {
    let name = name.trim();
    if let Some(rank) = CATEGORICAL_ALTERATIONS.iter().position(|c| c.eq_ignore_ascii_case(name)) {
        return Some(rank);
    }
    let lower = name.to_lowercase();
    if lower.ends_with(" fusion") && !lower.contains(',') {
        return CATEGORICAL_ALTERATIONS.iter().position(|c| *c == "Fusions");
    }
    None
}

/// Leading residue position of a single protein change, e.g. `600` for `V600E`.
pub fn protein_position(protein_change: &str) -> Option<u32> {
    position_regex()
        .captures(protein_change.trim())
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortClass {
    Categorical(usize),
    Positional(u32),
    NonPositional,
    Compound,
    Unnamed,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MutationSortKey {
    pub class: SortClass,
    folded: String,
    name: String,
}

impl MutationSortKey {
    pub fn new(name: &str, alterations: &[Alteration]) -> Self {
        let named: Vec<&Alteration> = alterations
            .iter()
            .filter(|a| !a.alteration.trim().is_empty() || !a.name.trim().is_empty())
            .collect();
        let display = if named.is_empty() && name.trim().is_empty() {
            String::new()
        } else {
            mutation_name(name, alterations)
        };

        let class = if display.is_empty() {
            SortClass::Unnamed
        } else if named.len() > 1 || (named.is_empty() && display.contains(',')) {
            SortClass::Compound
        } else {
            single_class(&display, named.first().copied())
        };

        Self { class, folded: display.to_lowercase(), name: display }
    }

    pub fn for_mutation(mutation: &Mutation) -> Self {
        Self::new(&mutation.name.value, &mutation.alterations.value)
    }
}

fn single_class(display: &str, alteration: Option<&Alteration>) -> SortClass {
    let text = alteration
        .map(|a| if a.alteration.trim().is_empty() { a.name.as_str() } else { a.alteration.as_str() })
        .unwrap_or(display);
    if let Some(rank) = categorical_rank(text).or_else(|| categorical_rank(display)) {
        return SortClass::Categorical(rank);
    }
    let position = alteration
        .and_then(|a| a.protein_start.and_then(|p| u32::try_from(p).ok()))
        .or_else(|| alteration.and_then(|a| protein_position(&a.protein_change)))
        .or_else(|| protein_position(text));
    match position {
        Some(position) => SortClass::Positional(position),
        None => SortClass::NonPositional,
    }
}

/// Core mutation order.
pub fn compare_mutations(a: &Mutation, b: &Mutation) -> Ordering {
    MutationSortKey::for_mutation(a).cmp(&MutationSortKey::for_mutation(b))
}

/// Core order over bare names, for history grouping and name-only records.
pub fn compare_mutation_names(a: &str, b: &str) -> Ordering {
    MutationSortKey::new(a, &[]).cmp(&MutationSortKey::new(b, &[]))
}

/// Curation list order: pending deletions last, then categorical alterations,
/// then by therapeutic evidence, Dx/Px presence and oncogenicity, finally the
/// core order.
pub fn compare_mutations_for_curation(a: &Mutation, b: &Mutation) -> Ordering {
    CurationSortKey::new(a).cmp(&CurationSortKey::new(b))
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct CurationSortKey {
    deleted: bool,
    not_categorical: bool,
    tx_levels: Vec<usize>,
    lacks_dx_or_px: bool,
    oncogenicity: usize,
    core: MutationSortKey,
}

impl CurationSortKey {
    fn new(mutation: &Mutation) -> Self {
        let core = MutationSortKey::for_mutation(mutation);
        Self {
            deleted: mutation.is_pending_delete(),
            not_categorical: !matches!(core.class, SortClass::Categorical(_)),
            tx_levels: tx_level_key(&mutation.tumors),
            lacks_dx_or_px: !mutation.tumors.iter().any(Tumor::has_dx_or_px),
            oncogenicity: oncogenicity_rank(&mutation.mutation_effect.oncogenic.value),
            core,
        }
    }
}

/// Distinct therapeutic levels by rank plus a terminator, so a mutation whose
/// levels run out sorts after one that continues.
fn tx_level_key(tumors: &[Tumor]) -> Vec<usize> {
    let mut ranks: Vec<usize> = tumors
        .iter()
        .flat_map(|t| t.therapeutic_implications.iter())
        .flat_map(|ti| ti.treatments.iter())
        .filter_map(|tx| tx_level_rank(&tx.level.value))
        .collect();
    ranks.sort_unstable();
    ranks.dedup();
    ranks.push(usize::MAX);
    ranks
}

pub fn tx_level_rank(level: &str) -> Option<usize> {
    TX_LEVEL_ORDER.iter().position(|l| *l == level.trim())
}

pub fn oncogenicity_rank(oncogenic: &str) -> usize {
    match oncogenic.trim() {
        "Yes" | "Likely" | "Resistance" => 0,
        "Likely Neutral" => 1,
        "Inconclusive" => 2,
        "Unknown" => 3,
        "" => 5,
        _ => 4,
    }
}

pub fn ti_type_rank(ti_type: Option<TiType>) -> usize {
    match ti_type {
        Some(t) => TiType::all().iter().position(|x| *x == t).unwrap_or(usize::MAX),
        None => usize::MAX,
    }
}

/// Sort `items` by the position of their key in `reference`; keys missing
/// from `reference` go last in their original order.
pub fn sort_by_index<T, K: PartialEq>(items: &mut [T], reference: &[K], key: impl Fn(&T) -> K) {
    items.sort_by_cached_key(|item| {
        let k = key(item);
        reference.iter().position(|r| *r == k).unwrap_or(usize::MAX)
    });
}
