//! Curation document model.
//!
//! Gene documents live in the store as schema-less JSON trees. Every editable
//! scalar `<field>` sits next to `<field>_uuid` (the field's stable identity),
//! an optional `<field>_review` and optional `<field>_comments`.
//!
//! The typed structs below are decoded from snapshots. Decoding never fails
//! for a single element: a malformed field is left empty and a malformed
//! element (a mutation without `name_uuid`, a tumor whose cancer types are not
//! a list, …) is dropped. Both are reported as [`NodeIssue`]s next to the
//! decoded value.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{CurationError, NodeIssue, Result};
use crate::names;

// ---- Genetic type ----

/// Curation context. Each gene has an independent document/meta pair per type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneticType {
    #[default]
    Somatic,
    Germline,
}

impl GeneticType {
    pub fn from_germline_flag(is_germline: bool) -> Self {
        if is_germline { GeneticType::Germline } else { GeneticType::Somatic }
    }

    pub fn is_germline(self) -> bool {
        matches!(self, GeneticType::Germline)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "somatic" => Some(GeneticType::Somatic),
            "germline" => Some(GeneticType::Germline),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GeneticType::Somatic => "somatic",
            GeneticType::Germline => "germline",
        }
    }
}

// ---- Review ----

/// Pending-change record attached to a field as `<field>_review`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    #[serde(default, deserialize_with = "lenient_string")]
    pub updated_by: String,
    #[serde(default, deserialize_with = "lenient_opt_millis")]
    pub update_time: Option<i64>,
    /// Value of the field when it was last accepted. A string for scalar
    /// fields, a list of cancer types for tumor names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reviewed: Option<Value>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub added: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub removed: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub initial_update: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub demoted_to_vus: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub promoted_to_mutation: bool,
}

impl Review {
    /// Pending creation or deletion of the whole element this review sits on.
    pub fn is_create_or_delete(&self) -> bool {
        self.added || self.removed
    }

    /// `lastReviewed` rendered as display text.
    pub fn last_reviewed_text(&self) -> Option<String> {
        match self.last_reviewed.as_ref()? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Array(_) => {
                let cancer_types: Vec<CancerType> =
                    serde_json::from_value(self.last_reviewed.clone()?).ok()?;
                Some(names::cancer_types_name(&cancer_types, true, ", "))
            }
            other => Some(other.to_string()),
        }
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

// ---- Field ----

/// One editable field together with its identity and review bookkeeping.
///
/// `uuid` is `None` when the document carries no `<field>_uuid`; such a field
/// cannot be flagged for review and is not treated as editable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Field<T> {
    pub value: T,
    pub uuid: Option<String>,
    pub review: Option<Review>,
    pub comments: Vec<Comment>,
}

impl<T> Field<T> {
    pub fn is_editable(&self) -> bool {
        self.uuid.is_some()
    }

    pub fn is_create_or_delete(&self) -> bool {
        self.review.as_ref().is_some_and(Review::is_create_or_delete)
    }

    pub fn is_removed(&self) -> bool {
        self.review.as_ref().is_some_and(|r| r.removed)
    }
}

// ---- Reference shapes stored inline ----

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CancerType {
    pub code: Option<String>,
    pub main_type: Option<String>,
    pub subtype: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AlterationGene {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hugo_symbol: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Alteration {
    #[serde(rename = "type")]
    pub alteration_type: String,
    pub alteration: String,
    pub name: String,
    pub protein_change: String,
    pub protein_start: Option<i64>,
    pub protein_end: Option<i64>,
    pub ref_residues: String,
    pub var_residues: String,
    pub consequence: String,
    pub comment: String,
    pub excluding: Vec<Alteration>,
    pub genes: Vec<AlterationGene>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Comment {
    #[serde(deserialize_with = "lenient_string")]
    pub date: String,
    pub user_name: String,
    pub email: String,
    pub content: String,
}

impl Comment {
    pub fn date_millis(&self) -> Option<i64> {
        self.date.trim().parse().ok()
    }
}

// ---- Gene document ----

/// Decoded value plus the per-element problems met while decoding it.
#[derive(Debug, Clone)]
pub struct Decoded<T> {
    pub value: T,
    pub issues: Vec<NodeIssue>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneDocument {
    pub name: String,
    pub summary: Field<String>,
    pub background: Field<String>,
    pub penetrance: Field<String>,
    pub inheritance_mechanism: Field<String>,
    /// `type/ocg`
    pub oncogene: Field<String>,
    /// `type/tsg`
    pub tumor_suppressor: Field<String>,
    pub mutations: Vec<Mutation>,
    pub genomic_indicators: Vec<GenomicIndicator>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mutation {
    /// Position in the stored array. Used for write paths only, never identity.
    pub index: usize,
    pub name: Field<String>,
    pub alterations: Field<Vec<Alteration>>,
    pub mutation_effect: MutationEffect,
    pub penetrance: MutationSpecific,
    pub inheritance_mechanism: MutationSpecific,
    pub tumors: Vec<Tumor>,
}

impl Mutation {
    /// Immutable identity assigned at creation.
    pub fn name_uuid(&self) -> &str {
        self.name.uuid.as_deref().unwrap_or_default()
    }

    pub fn display_name(&self) -> String {
        names::mutation_name(&self.name.value, &self.alterations.value)
    }

    pub fn is_pending_delete(&self) -> bool {
        self.name.is_removed()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationEffect {
    pub description: Field<String>,
    pub effect: Field<String>,
    pub oncogenic: Field<String>,
    pub pathogenic: Field<String>,
}

/// Germline `mutation_specific_penetrance` / `mutation_specific_inheritance_mechanism`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationSpecific {
    pub value: Field<String>,
    pub description: Field<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tumor {
    pub index: usize,
    pub cancer_types: Field<Vec<CancerType>>,
    pub excluded_cancer_types: Field<Vec<CancerType>>,
    pub summary: Field<String>,
    pub diagnostic_summary: Field<String>,
    pub prognostic_summary: Field<String>,
    pub diagnostic: Implication,
    pub prognostic: Implication,
    pub therapeutic_implications: Vec<TherapeuticImplication>,
}

impl Tumor {
    /// Order-independent identity of the cancer-type set, e.g. `mel+nsclc!luad`.
    pub fn signature(&self) -> String {
        fn keys(cancer_types: &[CancerType]) -> Vec<String> {
            let mut keys: Vec<String> = cancer_types
                .iter()
                .map(|ct| {
                    ct.code
                        .as_deref()
                        .filter(|c| !c.is_empty())
                        .or(ct.main_type.as_deref())
                        .unwrap_or("?")
                        .to_lowercase()
                        .replace(['/', ' '], "_")
                })
                .collect();
            keys.sort();
            keys.dedup();
            keys
        }

        let included = keys(&self.cancer_types.value);
        let mut signature = if included.is_empty() { "none".to_string() } else { included.join("+") };
        let excluded = keys(&self.excluded_cancer_types.value);
        if !excluded.is_empty() {
            signature.push('!');
            signature.push_str(&excluded.join("+"));
        }
        signature
    }

    pub fn display_name(&self) -> String {
        names::cancer_types_name_with_exclusion(
            &self.cancer_types.value,
            &self.excluded_cancer_types.value,
            true,
        )
    }

    pub fn has_dx_or_px(&self) -> bool {
        !self.diagnostic.level.value.is_empty() || !self.prognostic.level.value.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Implication {
    pub description: Field<String>,
    pub level: Field<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TiType {
    SS,
    SR,
    IS,
    IR,
}

impl TiType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SS" => Some(TiType::SS),
            "SR" => Some(TiType::SR),
            "IS" => Some(TiType::IS),
            "IR" => Some(TiType::IR),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TiType::SS => "Standard implications for sensitivity to therapy",
            TiType::SR => "Standard implications for resistance to therapy",
            TiType::IS => "Investigational implications for sensitivity to therapy",
            TiType::IR => "Investigational implications for resistance to therapy",
        }
    }

    /// Marker used inside history locations. Dropped when locations are made readable.
    pub fn history_string(&self) -> &'static str {
        match self {
            TiType::SS => "STANDARD_THERAPEUTIC_IMPLICATIONS_FOR_DRUG_SENSITIVITY",
            TiType::SR => "STANDARD_THERAPEUTIC_IMPLICATIONS_FOR_DRUG_RESISTANCE",
            TiType::IS => "INVESTIGATIONAL_THERAPEUTIC_IMPLICATIONS_DRUG_SENSITIVITY",
            TiType::IR => "INVESTIGATIONAL_THERAPEUTIC_IMPLICATIONS_DRUG_RESISTANCE",
        }
    }

    pub fn all() -> [TiType; 4] {
        [TiType::SS, TiType::SR, TiType::IS, TiType::IR]
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TherapeuticImplication {
    pub index: usize,
    pub ti_type: Option<TiType>,
    pub treatments: Vec<Treatment>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Treatment {
    pub index: usize,
    /// Drug uuids; `+` joins a combination, `,` separates alternatives.
    pub name: Field<String>,
    pub description: Field<String>,
    pub level: Field<String>,
    pub fda_level: Field<String>,
    pub propagation: Field<String>,
    pub indication: Field<String>,
}

impl Treatment {
    pub fn name_uuid(&self) -> &str {
        self.name.uuid.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenomicIndicator {
    pub index: usize,
    pub name: Field<String>,
    pub description: Field<String>,
}

impl GenomicIndicator {
    pub fn name_uuid(&self) -> &str {
        self.name.uuid.as_deref().unwrap_or_default()
    }
}

impl GeneDocument {
    /// Decode a gene document snapshot.
    ///
    /// Only a root that is not an object is an error; everything below it
    /// degrades to [`NodeIssue`]s.
    pub fn from_snapshot(snapshot: &Value) -> Result<Decoded<GeneDocument>> {
        let Some(obj) = snapshot.as_object() else {
            return Err(CurationError::MalformedNode(NodeIssue::new(
                "",
                "gene document is not an object",
            )));
        };
        let root = ObjectReader::new(obj, String::new());
        let mut issues = Vec::new();

        let (oncogene, tumor_suppressor) = match root.object("type", &mut issues) {
            Some(gene_type) => (gene_type.text("ocg", &mut issues), gene_type.text("tsg", &mut issues)),
            None => (Field::default(), Field::default()),
        };

        let mutations = root
            .elements("mutations", &mut issues)
            .into_iter()
            .filter_map(|(index, reader)| keep(decode_mutation(&reader, index, &mut issues), &mut issues))
            .collect();

        let genomic_indicators = root
            .elements("genomic_indicators", &mut issues)
            .into_iter()
            .filter_map(|(index, reader)| {
                keep(decode_genomic_indicator(&reader, index, &mut issues), &mut issues)
            })
            .collect();

        let gene = GeneDocument {
            name: root.text("name", &mut issues).value,
            summary: root.text("summary", &mut issues),
            background: root.text("background", &mut issues),
            penetrance: root.text("penetrance", &mut issues),
            inheritance_mechanism: root.text("inheritanceMechanism", &mut issues),
            oncogene,
            tumor_suppressor,
            mutations,
            genomic_indicators,
        };
        Ok(Decoded { value: gene, issues })
    }
}

fn keep<T>(decoded: std::result::Result<T, NodeIssue>, issues: &mut Vec<NodeIssue>) -> Option<T> {
    match decoded {
        Ok(value) => Some(value),
        Err(issue) => {
            warn!(path = %issue.path, reason = %issue.reason, "Dropping malformed document node");
            issues.push(issue);
            None
        }
    }
}

fn decode_mutation(
    reader: &ObjectReader<'_>,
    index: usize,
    issues: &mut Vec<NodeIssue>,
) -> std::result::Result<Mutation, NodeIssue> {
    let name = reader.text("name", issues);
    if name.uuid.is_none() {
        return Err(reader.issue("name_uuid", "mutation has no name_uuid"));
    }

    let mutation_effect = match reader.object("mutation_effect", issues) {
        Some(me) => MutationEffect {
            description: me.text("description", issues),
            effect: me.text("effect", issues),
            oncogenic: me.text("oncogenic", issues),
            pathogenic: me.text("pathogenic", issues),
        },
        None => MutationEffect::default(),
    };

    let penetrance = reader
        .object("mutation_specific_penetrance", issues)
        .map(|o| MutationSpecific {
            value: o.text("penetrance", issues),
            description: o.text("description", issues),
        })
        .unwrap_or_default();
    let inheritance_mechanism = reader
        .object("mutation_specific_inheritance_mechanism", issues)
        .map(|o| MutationSpecific {
            value: o.text("inheritanceMechanism", issues),
            description: o.text("description", issues),
        })
        .unwrap_or_default();

    let tumors = reader
        .elements("tumors", issues)
        .into_iter()
        .filter_map(|(i, tumor)| keep(decode_tumor(&tumor, i, issues), issues))
        .collect();

    Ok(Mutation {
        index,
        name,
        alterations: reader.list("alterations", issues).unwrap_or_default(),
        mutation_effect,
        penetrance,
        inheritance_mechanism,
        tumors,
    })
}

fn decode_tumor(
    reader: &ObjectReader<'_>,
    index: usize,
    issues: &mut Vec<NodeIssue>,
) -> std::result::Result<Tumor, NodeIssue> {
    let Some(cancer_types) = reader.list::<CancerType>("cancerTypes", issues) else {
        return Err(reader.issue("cancerTypes", "cancer types are not a list of cancer types"));
    };

    let implication = |key: &str, issues: &mut Vec<NodeIssue>| match reader.object(key, issues) {
        Some(o) => Implication {
            description: o.text("description", issues),
            level: o.text("level", issues),
        },
        None => Implication::default(),
    };
    let diagnostic = implication("diagnostic", issues);
    let prognostic = implication("prognostic", issues);

    let therapeutic_implications = reader
        .elements("TIs", issues)
        .into_iter()
        .map(|(ti_index, ti)| TherapeuticImplication {
            index: ti_index,
            ti_type: ti.obj.get("type").and_then(Value::as_str).and_then(TiType::parse),
            treatments: ti
                .elements("treatments", issues)
                .into_iter()
                .filter_map(|(tx_index, tx)| keep(decode_treatment(&tx, tx_index, issues), issues))
                .collect(),
        })
        .collect();

    Ok(Tumor {
        index,
        cancer_types,
        excluded_cancer_types: reader.list("excludedCancerTypes", issues).unwrap_or_default(),
        summary: reader.text("summary", issues),
        diagnostic_summary: reader.text("diagnosticSummary", issues),
        prognostic_summary: reader.text("prognosticSummary", issues),
        diagnostic,
        prognostic,
        therapeutic_implications,
    })
}

fn decode_treatment(
    reader: &ObjectReader<'_>,
    index: usize,
    issues: &mut Vec<NodeIssue>,
) -> std::result::Result<Treatment, NodeIssue> {
    let name = reader.text("name", issues);
    if name.uuid.is_none() {
        return Err(reader.issue("name_uuid", "treatment has no name_uuid"));
    }
    Ok(Treatment {
        index,
        name,
        description: reader.text("description", issues),
        level: reader.text("level", issues),
        fda_level: reader.text("fdaLevel", issues),
        propagation: reader.text("propagation", issues),
        indication: reader.text("indication", issues),
    })
}

fn decode_genomic_indicator(
    reader: &ObjectReader<'_>,
    index: usize,
    issues: &mut Vec<NodeIssue>,
) -> std::result::Result<GenomicIndicator, NodeIssue> {
    let name = reader.text("name", issues);
    if name.uuid.is_none() {
        return Err(reader.issue("name_uuid", "genomic indicator has no name_uuid"));
    }
    Ok(GenomicIndicator { index, name, description: reader.text("description", issues) })
}

/// Borrowed view over one JSON object of the document, tracking its path.
struct ObjectReader<'a> {
    obj: &'a Map<String, Value>,
    path: String,
}

impl<'a> ObjectReader<'a> {
    fn new(obj: &'a Map<String, Value>, path: String) -> Self {
        Self { obj, path }
    }

    fn child_path(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.path, key)
        }
    }

    fn issue(&self, key: &str, reason: impl Into<String>) -> NodeIssue {
        NodeIssue::new(self.child_path(key), reason)
    }

    fn text(&self, key: &str, issues: &mut Vec<NodeIssue>) -> Field<String> {
        let value = match self.obj.get(key) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(v @ (Value::Number(_) | Value::Bool(_))) => v.to_string(),
            Some(_) => {
                issues.push(self.issue(key, "expected a scalar value"));
                return Field::default();
            }
        };
        self.field(key, value, issues)
    }

    /// A list-valued field. `None` (with an issue recorded) when the stored
    /// value is not a list of `T`.
    fn list<T: DeserializeOwned>(&self, key: &str, issues: &mut Vec<NodeIssue>) -> Option<Field<Vec<T>>> {
        let value = match self.obj.get(key) {
            None | Some(Value::Null) => Vec::new(),
            Some(raw) => match serde_json::from_value::<Vec<T>>(raw.clone()) {
                Ok(items) => items,
                Err(e) => {
                    issues.push(self.issue(key, e.to_string()));
                    return None;
                }
            },
        };
        Some(self.field(key, value, issues))
    }

    fn field<T>(&self, key: &str, value: T, issues: &mut Vec<NodeIssue>) -> Field<T> {
        Field {
            value,
            uuid: self
                .obj
                .get(&format!("{key}_uuid"))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            review: self.decode_optional(&format!("{key}_review"), issues),
            comments: self.decode_optional(&format!("{key}_comments"), issues).unwrap_or_default(),
        }
    }

    fn decode_optional<T: DeserializeOwned>(&self, key: &str, issues: &mut Vec<NodeIssue>) -> Option<T> {
        let raw = self.obj.get(key).filter(|v| !v.is_null())?;
        match serde_json::from_value(raw.clone()) {
            Ok(v) => Some(v),
            Err(e) => {
                issues.push(self.issue(key, e.to_string()));
                None
            }
        }
    }

    fn object(&self, key: &str, issues: &mut Vec<NodeIssue>) -> Option<ObjectReader<'a>> {
        match self.obj.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::Object(obj)) => Some(ObjectReader::new(obj, self.child_path(key))),
            Some(_) => {
                issues.push(self.issue(key, "expected an object"));
                None
            }
        }
    }

    /// Elements of a stored collection, with their array positions.
    ///
    /// The store may hand back sparse arrays as objects keyed by index; those
    /// are accepted too. Null slots are skipped silently.
    fn elements(&self, key: &str, issues: &mut Vec<NodeIssue>) -> Vec<(usize, ObjectReader<'a>)> {
        let base = self.child_path(key);
        let slots: Vec<(usize, &'a Value)> = match self.obj.get(key) {
            None | Some(Value::Null) => return Vec::new(),
            Some(Value::Array(items)) => items.iter().enumerate().collect(),
            Some(Value::Object(map)) => {
                let mut slots = Vec::with_capacity(map.len());
                for (k, v) in map {
                    match k.parse::<usize>() {
                        Ok(i) => slots.push((i, v)),
                        Err(_) => issues.push(NodeIssue::new(format!("{base}/{k}"), "non-numeric collection key")),
                    }
                }
                slots.sort_by_key(|(i, _)| *i);
                slots
            }
            Some(_) => {
                issues.push(self.issue(key, "expected a collection"));
                return Vec::new();
            }
        };

        let mut out = Vec::with_capacity(slots.len());
        for (i, v) in slots {
            match v {
                Value::Null => {}
                Value::Object(obj) => out.push((i, ObjectReader::new(obj, format!("{base}/{i}")))),
                _ => {
                    let issue = NodeIssue::new(format!("{base}/{i}"), "collection element is not an object");
                    warn!(path = %issue.path, "Dropping malformed document node");
                    issues.push(issue);
                }
            }
        }
        out
    }
}

// ---- Meta ----

pub const CURRENT_REVIEWER_KEY: &str = "currentReviewer";
pub const LAST_ACTIVE_REVIEW_KEY: &str = "lastActiveReview";

/// Keys of the meta `review` object that are bookkeeping, not per-node flags.
pub fn is_review_bookkeeping_key(key: &str) -> bool {
    key == CURRENT_REVIEWER_KEY || key == LAST_ACTIVE_REVIEW_KEY
}

/// Side record for one (gene, genetic type) pair.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    #[serde(default, deserialize_with = "lenient_string")]
    pub last_modified_by: String,
    #[serde(default, deserialize_with = "lenient_opt_millis")]
    pub last_modified_at: Option<i64>,
    #[serde(default)]
    pub review: MetaReview,
}

impl Meta {
    /// Decode a meta snapshot. An absent node is an empty meta record.
    pub fn from_snapshot(snapshot: Option<&Value>) -> Result<Meta> {
        match snapshot {
            None | Some(Value::Null) => Ok(Meta::default()),
            Some(value) => Ok(serde_json::from_value(value.clone())?),
        }
    }
}

/// `review` object of a meta record: the review lock holder plus one
/// `uuid -> true` flag per field awaiting review.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaReview {
    #[serde(default, deserialize_with = "lenient_string")]
    pub current_reviewer: String,
    #[serde(default)]
    pub last_active_review: Option<Value>,
    #[serde(flatten)]
    pub flags: BTreeMap<String, Value>,
}

impl MetaReview {
    pub fn is_flagged(&self, uuid: &str) -> bool {
        !is_review_bookkeeping_key(uuid) && self.flags.get(uuid).is_some_and(is_truthy)
    }

    pub fn flagged_uuids(&self) -> impl Iterator<Item = &str> {
        self.flags
            .iter()
            .filter(|(k, v)| !is_review_bookkeeping_key(k) && is_truthy(v))
            .map(|(k, _)| k.as_str())
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// ---- VUS ----

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vus {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub time: VusTime,
    #[serde(default)]
    pub name_comments: Vec<Comment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VusTime {
    #[serde(default, deserialize_with = "lenient_millis")]
    pub value: i64,
    #[serde(default)]
    pub by: VusTimeBy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VusTimeBy {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

impl Vus {
    pub fn latest_comment(&self) -> Option<&Comment> {
        self.name_comments
            .iter()
            .enumerate()
            .max_by_key(|(i, c)| (c.date_millis().unwrap_or(i64::MIN), *i))
            .map(|(_, c)| c)
    }
}

// ---- History ----

/// One accepted review batch, appended under the gene's history path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct History {
    #[serde(default)]
    pub admin: String,
    #[serde(deserialize_with = "strict_millis")]
    pub time_stamp: i64,
    #[serde(default)]
    pub records: Vec<HistoryRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    #[serde(default)]
    pub last_edit_by: String,
    #[serde(default)]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    #[serde(default)]
    pub operation: HistoryOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuids: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HistoryOperation {
    #[serde(rename = "add")]
    Add,
    #[serde(rename = "delete")]
    Delete,
    #[serde(rename = "update")]
    Update,
    #[serde(rename = "name change")]
    NameChange,
    #[serde(rename = "demote")]
    DemoteMutation,
    #[serde(rename = "promote")]
    PromoteVus,
    #[default]
    #[serde(rename = "", other)]
    Unknown,
}

impl HistoryOperation {
    pub fn past_tense(&self) -> &'static str {
        match self {
            HistoryOperation::Add => "Added",
            HistoryOperation::Delete => "Deleted",
            HistoryOperation::Update => "Updated",
            HistoryOperation::NameChange => "Name Changed",
            HistoryOperation::DemoteMutation => "Demoted",
            HistoryOperation::PromoteVus => "Promoted",
            HistoryOperation::Unknown => "Changed",
        }
    }
}

// ---- Lenient scalar decoding ----

fn millis_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

fn lenient_opt_millis<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<i64>, D::Error> {
    Ok(millis_from_value(&Value::deserialize(d)?))
}

fn lenient_millis<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<i64, D::Error> {
    Ok(millis_from_value(&Value::deserialize(d)?).unwrap_or_default())
}

fn strict_millis<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<i64, D::Error> {
    let raw = Value::deserialize(d)?;
    millis_from_value(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unparsable timestamp: {raw}")))
}
