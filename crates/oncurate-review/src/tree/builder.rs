//! Builds the review tree from a gene document snapshot and its meta record.
//!
//! The walk is synchronous over already-fetched snapshots and never fails:
//! elements that cannot be decoded are dropped and reported as issues.

use std::collections::HashMap;

use oncurate_common::names::cancer_types_name_with_exclusion;
use oncurate_common::{
    CancerType, Field, GeneDocument, GenomicIndicator, Meta, MetaReview, Mutation, NodeIssue,
    ReferenceData, Review, TherapeuticImplication, Treatment, Tumor,
};
use oncurate_store::path;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::level::{HistoryData, ReviewAction, ReviewLevel, ReviewLevelType};
use crate::ordering::{compare_mutations, ti_type_rank};

/// A built review tree plus the document problems met while building it.
#[derive(Debug, Clone)]
pub struct ReviewTree {
    pub root: ReviewLevel,
    pub issues: Vec<NodeIssue>,
}

pub struct ReviewTreeBuilder<'a> {
    reference: &'a dyn ReferenceData,
}

impl<'a> ReviewTreeBuilder<'a> {
    pub fn new(reference: &'a dyn ReferenceData) -> Self {
        Self { reference }
    }

    pub fn build(&self, document: &Value, meta: &Meta, is_germline: bool) -> ReviewTree {
        let decoded = match GeneDocument::from_snapshot(document) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(error = %e, "Gene document could not be decoded");
                let issue = NodeIssue::new("", e.to_string());
                return ReviewTree { root: ReviewLevel::meta("", "", Vec::new()), issues: vec![issue] };
            }
        };

        let walker = Walker { reference: self.reference, flags: &meta.review, document, is_germline };
        let root = walker.gene(&decoded.value);
        debug!(gene = %root.title, n_nodes = root.node_count(), n_issues = decoded.issues.len(), "Built review tree");
        ReviewTree { root, issues: decoded.issues }
    }
}

/// One field to turn into a leaf level.
struct FieldSpec<'f> {
    key: &'f str,
    title: &'f str,
    /// Field name used when the history payload is keyed by field.
    history_key: Option<&'f str>,
}

impl<'f> FieldSpec<'f> {
    fn keyed(key: &'f str, title: &'f str, history_key: &'f str) -> Self {
        Self { key, title, history_key: Some(history_key) }
    }

    fn plain(key: &'f str, title: &'f str) -> Self {
        Self { key, title, history_key: None }
    }
}

struct Walker<'w> {
    reference: &'w dyn ReferenceData,
    flags: &'w MetaReview,
    document: &'w Value,
    is_germline: bool,
}

impl<'w> Walker<'w> {
    fn gene(&self, gene: &GeneDocument) -> ReviewLevel {
        let hugo = if gene.name.trim().is_empty() { "Gene".to_string() } else { gene.name.clone() };
        let mut root = ReviewLevel::meta(hugo.clone(), hugo.clone(), vec![hugo]);

        let mut fields: Vec<(FieldSpec<'_>, &Field<String>, &str)> = vec![
            (FieldSpec::plain("summary", "Summary"), &gene.summary, "Gene Summary"),
            (FieldSpec::plain("background", "Background"), &gene.background, "Gene Background"),
            (FieldSpec::plain("type/ocg", "Gene Type / Oncogene"), &gene.oncogene, "Gene Type"),
            (FieldSpec::plain("type/tsg", "Gene Type / Tumor Suppressor"), &gene.tumor_suppressor, "Gene Type"),
        ];
        if self.is_germline {
            fields.push((FieldSpec::plain("penetrance", "Penetrance"), &gene.penetrance, "Penetrance"));
            fields.push((
                FieldSpec::plain("inheritanceMechanism", "Mechanism of Inheritance"),
                &gene.inheritance_mechanism,
                "Mechanism of Inheritance",
            ));
        }
        for (spec, field, location) in fields {
            if let Some(mut level) = self.field_level(&root, ReviewLevelType::Gene, "", &spec, field) {
                level.history_location = location.to_string();
                root.children.push(level);
            }
        }

        if !gene.mutations.is_empty() {
            let mut collection = self.collection(&root, "mutations", "Mutations");
            let mut mutations: Vec<&Mutation> = gene.mutations.iter().collect();
            mutations.sort_by(|a, b| compare_mutations(a, b));
            let mut keys = KeyDeduper::default();
            for mutation in mutations {
                let key = keys.unique(mutation.name_uuid());
                let level = self.mutation(&root, &collection, &key, mutation);
                collection.children.push(level);
            }
            root.children.push(collection);
        }

        if self.is_germline && !gene.genomic_indicators.is_empty() {
            let mut collection = self.collection(&root, "genomic_indicators", "Genomic Indicators");
            let mut indicators: Vec<&GenomicIndicator> = gene.genomic_indicators.iter().collect();
            indicators.sort_by_cached_key(|gi| (gi.name.value.to_lowercase(), gi.index));
            let mut keys = KeyDeduper::default();
            for indicator in indicators {
                let key = keys.unique(indicator.name_uuid());
                collection.children.push(self.genomic_indicator(&root, &collection, &key, indicator));
            }
            root.children.push(collection);
        }

        root
    }

    fn mutation(&self, owner: &ReviewLevel, collection: &ReviewLevel, key: &str, mutation: &Mutation) -> ReviewLevel {
        let base = path::mutation_path(mutation.index);
        let title = mutation.display_name();
        let mut level = self.element_level(
            owner,
            collection,
            key,
            ReviewLevelType::Mutation,
            title.clone(),
            &base,
            "name",
            mutation.name.uuid.clone(),
            mutation.name.review.as_ref(),
        );
        level.current_value = Some(title.clone());
        level.history_location = join_location(&collection.history_location, &title);
        level.history_data = self.element_history(&level, &base, Value::String(mutation.name.value.clone()));

        let mut effect_fields = Vec::new();
        if !self.is_germline {
            effect_fields.push((FieldSpec::keyed("mutation_effect/oncogenic", "Oncogenic", "oncogenic"), &mutation.mutation_effect.oncogenic));
        }
        effect_fields.push((FieldSpec::keyed("mutation_effect/effect", "Mutation Effect", "effect"), &mutation.mutation_effect.effect));
        if self.is_germline {
            effect_fields.push((FieldSpec::keyed("mutation_effect/pathogenic", "Pathogenic", "pathogenic"), &mutation.mutation_effect.pathogenic));
        }
        effect_fields.push((FieldSpec::keyed("mutation_effect/description", "Description", "description"), &mutation.mutation_effect.description));
        let effect_location = join_location(&level.history_location, "Mutation Effect");
        for (spec, field) in effect_fields {
            if let Some(mut child) = self.field_level(&level, ReviewLevelType::Mutation, &base, &spec, field) {
                child.history_location = effect_location.clone();
                level.children.push(child);
            }
        }

        if self.is_germline {
            let specific = [
                (
                    "mutation_specific_penetrance",
                    "Mutation Specific Penetrance",
                    "penetrance",
                    &mutation.penetrance,
                ),
                (
                    "mutation_specific_inheritance_mechanism",
                    "Mutation Specific Inheritance Mechanism",
                    "inheritanceMechanism",
                    &mutation.inheritance_mechanism,
                ),
            ];
            for (object_key, title, value_key, fields) in specific {
                let location = join_location(&level.history_location, title);
                let value_path = path::join(object_key, value_key);
                let description_path = path::join(object_key, "description");
                let description_title = format!("{title} Description");
                let specs = [
                    (FieldSpec::keyed(&value_path, title, value_key), &fields.value),
                    (FieldSpec::keyed(&description_path, &description_title, "description"), &fields.description),
                ];
                for (spec, field) in specs {
                    if let Some(mut child) = self.field_level(&level, ReviewLevelType::Mutation, &base, &spec, field) {
                        child.history_location = location.clone();
                        level.children.push(child);
                    }
                }
            }
        }

        if !mutation.tumors.is_empty() {
            let mut tumors_level = self.collection(&level, "tumors", "Tumors");
            let mut tumors: Vec<(String, &Tumor)> =
                mutation.tumors.iter().map(|t| (self.tumor_title(t), t)).collect();
            tumors.sort_by_cached_key(|(title, t)| (title.to_lowercase(), t.signature(), t.index));
            let mut keys = KeyDeduper::default();
            for (title, tumor) in tumors {
                let key = keys.unique(&tumor.signature());
                let child = self.tumor(&level, &tumors_level, &key, mutation.index, title, tumor);
                tumors_level.children.push(child);
            }
            level.children.push(tumors_level);
        }

        level
    }

    fn tumor(
        &self,
        owner: &ReviewLevel,
        collection: &ReviewLevel,
        key: &str,
        mutation_index: usize,
        title: String,
        tumor: &Tumor,
    ) -> ReviewLevel {
        let base = path::tumor_path(mutation_index, tumor.index);
        let uuid = match (&tumor.cancer_types.uuid, &tumor.excluded_cancer_types.uuid) {
            (Some(included), Some(excluded)) => Some(format!("{included},{excluded}")),
            (Some(included), None) => Some(included.clone()),
            _ => None,
        };
        let review = tumor.cancer_types.review.as_ref().or(tumor.excluded_cancer_types.review.as_ref());
        let mut level = self.element_level(
            owner,
            collection,
            key,
            ReviewLevelType::Tumor,
            title.clone(),
            &base,
            "cancerTypes",
            uuid,
            review,
        );
        level.current_value = Some(title.clone());
        level.history_location = join_location(&owner.history_location, &title);
        level.history_data = self.element_history(&level, &base, Value::String(title));

        let summary_location = level.history_location.clone();
        let dx_location = join_location(&level.history_location, "Diagnostic");
        let px_location = join_location(&level.history_location, "Prognostic");
        let fields = [
            (FieldSpec::keyed("summary", "Tumor Type Summary", "summary"), &tumor.summary, &summary_location),
            (FieldSpec::keyed("diagnosticSummary", "Diagnostic Summary", "diagnosticSummary"), &tumor.diagnostic_summary, &summary_location),
            (FieldSpec::keyed("prognosticSummary", "Prognostic Summary", "prognosticSummary"), &tumor.prognostic_summary, &summary_location),
            (FieldSpec::keyed("diagnostic/level", "Diagnostic Level", "level"), &tumor.diagnostic.level, &dx_location),
            (FieldSpec::keyed("diagnostic/description", "Diagnostic Description", "description"), &tumor.diagnostic.description, &dx_location),
            (FieldSpec::keyed("prognostic/level", "Prognostic Level", "level"), &tumor.prognostic.level, &px_location),
            (FieldSpec::keyed("prognostic/description", "Prognostic Description", "description"), &tumor.prognostic.description, &px_location),
        ];
        for (spec, field, location) in fields {
            if let Some(mut child) = self.field_level(&level, ReviewLevelType::Tumor, &base, &spec, field) {
                child.history_location = location.clone();
                level.children.push(child);
            }
        }

        let mut implications: Vec<&TherapeuticImplication> =
            tumor.therapeutic_implications.iter().filter(|ti| !ti.treatments.is_empty()).collect();
        implications.sort_by_key(|ti| (ti_type_rank(ti.ti_type), ti.index));
        let mut keys = KeyDeduper::default();
        for ti in implications {
            let (ti_key, ti_title, ti_history) = match ti.ti_type {
                Some(t) => (format!("{t:?}"), t.label().to_string(), t.history_string().to_string()),
                None => (ti.index.to_string(), "Therapeutic Implications".to_string(), String::new()),
            };
            let mut group = ReviewLevel::meta(
                path::join(&level.id, &format!("TIs/{}", keys.unique(&ti_key))),
                ti_title.clone(),
                child_parts(&level.title_parts, &ti_title),
            );
            group.history_location = join_location(&level.history_location, &ti_history);
            group.nested_under_create_or_delete = nested_under(&level);

            let mut treatments: Vec<(String, &Treatment)> = ti
                .treatments
                .iter()
                .map(|tx| (self.reference.treatment_name(&tx.name.value), tx))
                .collect();
            treatments.sort_by_cached_key(|(title, tx)| (title.to_lowercase(), tx.index));
            let mut tx_keys = KeyDeduper::default();
            for (title, treatment) in treatments {
                let key = tx_keys.unique(treatment.name_uuid());
                let tx_base = path::treatment_path(mutation_index, tumor.index, ti.index, treatment.index);
                group.children.push(self.treatment(&level, &group, &key, &tx_base, title, treatment));
            }
            level.children.push(group);
        }

        level
    }

    fn treatment(
        &self,
        owner: &ReviewLevel,
        group: &ReviewLevel,
        key: &str,
        base: &str,
        title: String,
        treatment: &Treatment,
    ) -> ReviewLevel {
        let mut level = self.element_level(
            owner,
            group,
            &format!("treatments/{key}"),
            ReviewLevelType::Treatment,
            title.clone(),
            base,
            "name",
            treatment.name.uuid.clone(),
            treatment.name.review.as_ref(),
        );
        level.current_value = Some(title);
        if let Some(old) = level.old_value.take() {
            level.old_value = Some(self.reference.treatment_name(&old));
        }
        level.history_location = join_location(&group.history_location, &treatment.name.value);
        level.history_data = self.element_history(&level, base, Value::String(treatment.name.value.clone()));

        let fields = [
            (FieldSpec::keyed("description", "Description", "description"), &treatment.description),
            (FieldSpec::keyed("level", "Level", "level"), &treatment.level),
            (FieldSpec::keyed("fdaLevel", "FDA Level", "fdaLevel"), &treatment.fda_level),
            (FieldSpec::keyed("propagation", "Propagation", "propagation"), &treatment.propagation),
            (FieldSpec::keyed("indication", "Indication", "indication"), &treatment.indication),
        ];
        for (spec, field) in fields {
            if let Some(mut child) = self.field_level(&level, ReviewLevelType::Treatment, base, &spec, field) {
                child.history_location = level.history_location.clone();
                level.children.push(child);
            }
        }
        level
    }

    fn genomic_indicator(
        &self,
        owner: &ReviewLevel,
        collection: &ReviewLevel,
        key: &str,
        indicator: &GenomicIndicator,
    ) -> ReviewLevel {
        let base = path::genomic_indicator_path(indicator.index);
        let title = indicator.name.value.clone();
        let mut level = self.element_level(
            owner,
            collection,
            key,
            ReviewLevelType::GenomicIndicator,
            title.clone(),
            &base,
            "name",
            indicator.name.uuid.clone(),
            indicator.name.review.as_ref(),
        );
        level.current_value = Some(title.clone());
        level.history_location = join_location("Genomic Indicators", &title);
        level.history_data = self.element_history(&level, &base, Value::String(title));

        let spec = FieldSpec::keyed("description", "Description", "description");
        if let Some(mut child) =
            self.field_level(&level, ReviewLevelType::GenomicIndicator, &base, &spec, &indicator.description)
        {
            child.history_location = level.history_location.clone();
            level.children.push(child);
        }
        level
    }

    // ---- level construction ----

    fn collection(&self, owner: &ReviewLevel, key: &str, title: &str) -> ReviewLevel {
        let mut level = ReviewLevel::meta(path::join(&owner.id, key), title, child_parts(&owner.title_parts, title));
        level.history_location = owner.history_location.clone();
        level.nested_under_create_or_delete = nested_under(owner);
        level
    }

    /// Level for a collection element. Its title joins the owner's breadcrumb,
    /// not the collection's, and its review is the review of its name field.
    #[allow(clippy::too_many_arguments)]
    fn element_level(
        &self,
        owner: &ReviewLevel,
        collection: &ReviewLevel,
        key: &str,
        level_type: ReviewLevelType,
        title: String,
        base: &str,
        name_key: &str,
        uuid: Option<String>,
        review: Option<&Review>,
    ) -> ReviewLevel {
        let mut level = ReviewLevel::meta(
            path::join(&collection.id, key),
            title.clone(),
            child_parts(&owner.title_parts, &title),
        );
        level.level_type = level_type;
        level.nested_under_create_or_delete = nested_under(collection) || nested_under(owner);
        if uuid.is_some() {
            let value_path = path::field_path(base, name_key);
            self.attach_review(&mut level, value_path, uuid, review.cloned());
        }
        level
    }

    fn field_level(
        &self,
        owner: &ReviewLevel,
        level_type: ReviewLevelType,
        base: &str,
        spec: &FieldSpec<'_>,
        field: &Field<String>,
    ) -> Option<ReviewLevel> {
        field.uuid.as_ref()?;
        let mut level = ReviewLevel::meta(
            path::join(&owner.id, spec.key),
            spec.title,
            child_parts(&owner.title_parts, spec.title),
        );
        level.level_type = level_type;
        level.nested_under_create_or_delete = nested_under(owner);
        level.current_value = Some(field.value.clone());
        self.attach_review(&mut level, path::field_path(base, spec.key), field.uuid.clone(), field.review.clone());

        let old = level.review.as_ref().and_then(|r| r.last_reviewed.clone());
        level.history_data = match spec.history_key {
            Some(key) => HistoryData {
                new_state: Some(json!({ key: field.value })),
                old_state: old.map(|o| json!({ key: o })),
            },
            None => HistoryData { new_state: Some(Value::String(field.value.clone())), old_state: old },
        };
        Some(level)
    }

    fn attach_review(&self, level: &mut ReviewLevel, value_path: String, uuid: Option<String>, review: Option<Review>) {
        let review_path = format!("{value_path}_review");
        level.value_path = Some(value_path);
        level.uuid = uuid;
        level.needs_review = level.uuids().iter().any(|u| self.flags.is_flagged(u));
        level.review_action = review.as_ref().map(|r| ReviewAction::from_review(r, &review_path));
        level.old_value = review.as_ref().and_then(Review::last_reviewed_text);
        level.review = review;
    }

    /// History payload of an element-backed level: the whole element for
    /// creations and deletions, the name for renames.
    fn element_history(&self, level: &ReviewLevel, base: &str, name: Value) -> HistoryData {
        let raw = || self.document.pointer(&format!("/{base}")).cloned();
        match level.review_action {
            Some(ReviewAction::Create | ReviewAction::PromoteVus) => HistoryData { new_state: raw(), old_state: None },
            Some(ReviewAction::Delete | ReviewAction::DemoteMutation) => HistoryData { new_state: None, old_state: raw() },
            _ => HistoryData {
                new_state: Some(name),
                old_state: level.old_value.clone().map(Value::String),
            },
        }
    }

    fn tumor_title(&self, tumor: &Tumor) -> String {
        let resolve = |cancer_types: &[CancerType]| -> Vec<CancerType> {
            cancer_types.iter().map(|ct| self.resolve_cancer_type(ct)).collect()
        };
        cancer_types_name_with_exclusion(
            &resolve(&tumor.cancer_types.value),
            &resolve(&tumor.excluded_cancer_types.value),
            true,
        )
    }

    /// Cancer types stored with only a code get their name from reference
    /// data, or fall back to the code itself.
    fn resolve_cancer_type(&self, cancer_type: &CancerType) -> CancerType {
        let has_name = [&cancer_type.main_type, &cancer_type.subtype]
            .iter()
            .any(|n| n.as_deref().is_some_and(|s| !s.trim().is_empty()));
        if has_name {
            return cancer_type.clone();
        }
        let code = cancer_type.code.clone().unwrap_or_default();
        CancerType {
            main_type: Some(self.reference.cancer_type_name(&code).unwrap_or(code.clone())),
            subtype: None,
            code: Some(code),
        }
    }
}

fn nested_under(parent: &ReviewLevel) -> bool {
    parent.is_create_or_delete() || parent.nested_under_create_or_delete
}

fn child_parts(parent: &[String], title: &str) -> Vec<String> {
    let mut parts = parent.to_vec();
    parts.push(title.to_string());
    parts
}

fn join_location(parent: &str, current: &str) -> String {
    match (parent.is_empty(), current.is_empty()) {
        (true, _) => current.to_string(),
        (_, true) => parent.to_string(),
        _ => format!("{parent}, {current}"),
    }
}

/// Keeps sibling ids unique when two elements share an identity.
#[derive(Default)]
struct KeyDeduper {
    seen: HashMap<String, usize>,
}

impl KeyDeduper {
    fn unique(&mut self, key: &str) -> String {
        let count = self.seen.entry(key.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            key.to_string()
        } else {
            format!("{key}~{count}")
        }
    }
}
