//! Raw history log decoding and per-record expansion.
//!
//! A stored batch holds records whose payloads are either plain strings or
//! whole objects (an added mutation, a set of updated treatment fields).
//! Parsing flattens every record into one line-sized [`ParsedRecord`] per
//! changed value and rewrites stored locations into readable ones.

use std::sync::OnceLock;

use oncurate_common::names::{cancer_types_name_with_exclusion, mutation_name};
use oncurate_common::{
    Alteration, CancerType, History, HistoryOperation, HistoryRecord, NodeIssue, ReferenceData, TiType,
};
use regex::Regex;
use serde::ser::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

/// One readable change line, flattened out of a stored history record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedRecord {
    pub admin: String,
    pub time_stamp: i64,
    pub last_edit_by: String,
    pub location: String,
    pub operation: HistoryOperation,
    pub new: Option<String>,
    pub old: Option<String>,
    /// Element added or removed by the record.
    pub element: Option<Value>,
}

/// History batches decoded from a stored log, oldest first.
#[derive(Debug, Clone, Default)]
pub struct HistoryLog {
    pub batches: Vec<History>,
    pub issues: Vec<NodeIssue>,
}

impl HistoryLog {
    /// Decode a log snapshot keyed by push key. Batches that fail to decode
    /// (a missing or unparsable `timeStamp`, say) are skipped and reported.
    pub fn from_snapshot(snapshot: Option<&Value>) -> Self {
        let mut log = HistoryLog::default();
        let entries: Vec<(String, &Value)> = match snapshot {
            None | Some(Value::Null) => return log,
            Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
            Some(Value::Array(items)) => items.iter().enumerate().map(|(i, v)| (i.to_string(), v)).collect(),
            Some(_) => {
                log.issues.push(NodeIssue::new("", "history log is not a collection"));
                return log;
            }
        };
        for (key, raw) in entries {
            if raw.is_null() {
                continue;
            }
            match serde_json::from_value::<History>(raw.clone()) {
                Ok(batch) => log.batches.push(batch),
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping malformed history batch");
                    log.issues.push(NodeIssue::new(key, e.to_string()));
                }
            }
        }
        log.batches.sort_by_key(|b| b.time_stamp);
        log
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

fn uuid_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w{8}-\w{4}-\w{4}-\w{4}-\w{12}").unwrap())
}

pub fn is_uuid(text: &str) -> bool {
    uuid_regex().is_match(text)
}

/// Readable name of a stored document key, if it has one.
pub fn readable_key(key: &str) -> Option<&'static str> {
    Some(match key {
        "effect" => "Effect",
        "mutation_effect" => "Mutation Effect",
        "name" | "cancerTypes" => "Name",
        "inheritanceMechanism" => "Mechanism of Inheritance",
        "description" => "Description",
        "summary" => "Summary",
        "diagnosticSummary" => "Diagnostic Summary",
        "prognosticSummary" => "Prognostic Summary",
        "pathogenic" => "Pathogenic",
        "penetrance" => "Penetrance",
        "oncogenic" => "Oncogenic",
        "short" => "Additional Information",
        "level" => "Level",
        "fdaLevel" => "FDA Level",
        "indication" => "Indication",
        "propagation" => "Propagation",
        _ => return None,
    })
}

fn is_ti_marker(part: &str) -> bool {
    TiType::all().iter().any(|t| t.history_string() == part)
}

/// Make location parts readable: therapeutic implication markers are
/// dropped, drug uuids become drug names, legacy gene and tumor summary
/// labels are shortened and document keys get their readable names.
pub fn readable_location(parts: &[String], reference: &dyn ReferenceData) -> Vec<String> {
    let mut readable = Vec::with_capacity(parts.len());
    for part in parts {
        if is_ti_marker(part) {
            continue;
        }
        let mut therapy = part.clone();
        for drug in part.split('+').map(str::trim).filter(|s| is_uuid(s)) {
            if let Some(name) = reference.drug_name(drug) {
                therapy = therapy.replace(drug, &name);
            }
        }
        if therapy != *part {
            readable.push(therapy);
            continue;
        }
        let part = match part.as_str() {
            "Gene Summary" | "Tumor Type Summary" => "Summary",
            "Gene Background" => "Background",
            other => readable_key(other).unwrap_or(other),
        };
        readable.push(part.to_string());
    }
    readable
}

fn split_location(location: &str) -> Vec<String> {
    location.split(',').map(|p| p.trim().to_string()).collect()
}

fn readable_joined(parts: &[String], reference: &dyn ReferenceData) -> String {
    readable_location(parts, reference).join(", ")
}

/// Display text of a payload value; `None` for null.
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(_) => true,
    }
}

fn pretty_json(value: &Value) -> String {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    match value.serialize(&mut serializer) {
        Ok(()) => String::from_utf8(out).unwrap_or_else(|_| value.to_string()),
        Err(_) => value.to_string(),
    }
}

fn line(record: &HistoryRecord, location: String) -> ParsedRecord {
    ParsedRecord {
        last_edit_by: record.last_edit_by.clone(),
        location,
        operation: record.operation,
        new: record.new.as_ref().and_then(value_text),
        old: record.old.as_ref().and_then(value_text),
        ..Default::default()
    }
}

/// Expand an add or promote record. An object payload yields the element
/// line plus, with `nested_updates`, one update line per field listed in
/// `uuids`.
pub fn parse_add_record(record: &HistoryRecord, reference: &dyn ReferenceData, nested_updates: bool) -> Vec<ParsedRecord> {
    match &record.new {
        Some(Value::String(_)) => vec![line(record, record.location.clone())],
        Some(element @ Value::Object(_)) => {
            let location = readable_joined(&split_location(&record.location), reference);
            let mut lines = vec![ParsedRecord {
                new: Some(pretty_json(element)),
                old: None,
                element: Some(element.clone()),
                ..line(record, location.clone())
            }];
            if nested_updates {
                let uuids: Vec<&str> = record
                    .uuids
                    .as_deref()
                    .map(|u| u.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
                    .unwrap_or_default();
                let entries = find_entries_by_uuids(element, &uuids, reference);
                for (field, value) in entries.into_iter().flatten().filter(|(field, _)| field != "Name") {
                    lines.push(ParsedRecord {
                        last_edit_by: record.last_edit_by.clone(),
                        location: format!("{location}, {field}"),
                        operation: HistoryOperation::Update,
                        new: value_text(&value),
                        ..Default::default()
                    });
                }
            }
            lines
        }
        _ => Vec::new(),
    }
}

/// Delete and demote records keep the removed element as compact JSON.
pub fn parse_delete_record(record: &HistoryRecord, reference: &dyn ReferenceData) -> Vec<ParsedRecord> {
    let location = readable_joined(&split_location(&record.location), reference);
    vec![ParsedRecord {
        old: record.old.as_ref().filter(|v| !v.is_null()).map(Value::to_string),
        element: record.old.clone().filter(Value::is_object),
        ..line(record, location)
    }]
}

/// Update records with object payloads yield one line per key of `new`,
/// plus one line per key of `old` that `new` no longer carries.
pub fn parse_update_record(record: &HistoryRecord, reference: &dyn ReferenceData) -> Vec<ParsedRecord> {
    match &record.new {
        Some(Value::String(_)) => {
            vec![line(record, readable_joined(&split_location(&record.location), reference))]
        }
        Some(Value::Object(new)) => {
            let parts = split_location(&record.location);
            let empty = Map::new();
            let old = record.old.as_ref().and_then(Value::as_object).unwrap_or(&empty);
            let keyed_location = |key: &str| {
                let mut keyed = parts.clone();
                keyed.push(key.to_string());
                readable_joined(&keyed, reference)
            };

            let mut lines = Vec::new();
            for (key, value) in new {
                lines.push(ParsedRecord {
                    last_edit_by: record.last_edit_by.clone(),
                    location: keyed_location(key),
                    operation: HistoryOperation::Update,
                    new: value_text(value),
                    old: old.get(key).and_then(value_text),
                    ..Default::default()
                });
            }
            for (key, value) in old {
                if !is_truthy(new.get(key)) {
                    lines.push(ParsedRecord {
                        last_edit_by: record.last_edit_by.clone(),
                        location: keyed_location(key),
                        operation: HistoryOperation::Update,
                        old: value_text(value),
                        ..Default::default()
                    });
                }
            }
            lines
        }
        _ => Vec::new(),
    }
}

pub fn parse_name_change_record(record: &HistoryRecord, reference: &dyn ReferenceData) -> Vec<ParsedRecord> {
    vec![line(record, readable_joined(&split_location(&record.location), reference))]
}

pub fn parse_record(record: &HistoryRecord, reference: &dyn ReferenceData) -> Vec<ParsedRecord> {
    match record.operation {
        HistoryOperation::Add | HistoryOperation::PromoteVus => parse_add_record(record, reference, true),
        HistoryOperation::Delete | HistoryOperation::DemoteMutation => parse_delete_record(record, reference),
        HistoryOperation::Update => parse_update_record(record, reference),
        HistoryOperation::NameChange => parse_name_change_record(record, reference),
        HistoryOperation::Unknown => Vec::new(),
    }
}

/// Flatten every batch of a log into readable lines stamped with the batch
/// admin and time.
pub fn parse_history(log: &HistoryLog, reference: &dyn ReferenceData) -> Vec<ParsedRecord> {
    log.batches
        .iter()
        .flat_map(|batch| {
            batch.records.iter().flat_map(move |record| {
                parse_record(record, reference).into_iter().map(move |parsed| ParsedRecord {
                    admin: batch.admin.clone(),
                    time_stamp: batch.time_stamp,
                    ..parsed
                })
            })
        })
        .collect()
}

/// Locate fields by uuid inside an element object.
///
/// Returns one slot per uuid, in the order given, holding the readable path
/// of the field and its value. The search is breadth first; nested mutations,
/// tumors and treatments contribute their display names to the path.
pub fn find_entries_by_uuids(
    element: &Value,
    uuids: &[&str],
    reference: &dyn ReferenceData,
) -> Vec<Option<(String, Value)>> {
    let mut found: Vec<Option<(String, Value)>> = vec![None; uuids.len()];
    let mut remaining = uuids.len();
    let Some(root) = element.as_object() else {
        return found;
    };

    let mut level: Vec<(&Map<String, Value>, Vec<String>)> = vec![(root, Vec::new())];
    while !level.is_empty() && remaining > 0 {
        let mut next = Vec::new();
        for (object, location) in level {
            for (key, value) in object {
                if let (Some(field), Some(uuid)) = (key.strip_suffix("_uuid"), value.as_str()) {
                    if let Some(slot) = uuids.iter().position(|u| *u == uuid) {
                        if found[slot].is_none() {
                            let mut parts = location.clone();
                            parts.push(field.to_string());
                            let value = object.get(field).cloned().unwrap_or(Value::Null);
                            found[slot] = Some((readable_joined(&parts, reference), value));
                            remaining -= 1;
                        }
                        continue;
                    }
                }
                let children: Vec<&Map<String, Value>> = match value {
                    Value::Object(map) => vec![map],
                    Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
                    _ => continue,
                };
                for child in children {
                    let mut parts = location.clone();
                    match key.as_str() {
                        "mutations" => parts.push(element_mutation_name(child)),
                        "tumors" => parts.push(element_tumor_name(child)),
                        "TIs" => {}
                        "treatments" => {
                            parts.push(child.get("name").and_then(Value::as_str).unwrap_or_default().to_string())
                        }
                        other => parts.push(other.to_string()),
                    }
                    next.push((child, parts));
                }
            }
        }
        level = next;
    }
    found
}

fn element_mutation_name(mutation: &Map<String, Value>) -> String {
    let name = mutation.get("name").and_then(Value::as_str).unwrap_or_default();
    let alterations: Vec<Alteration> = mutation
        .get("alterations")
        .and_then(|a| serde_json::from_value(a.clone()).ok())
        .unwrap_or_default();
    mutation_name(name, &alterations)
}

fn element_tumor_name(tumor: &Map<String, Value>) -> String {
    let cancer_types = |key: &str| -> Vec<CancerType> {
        tumor.get(key).and_then(|c| serde_json::from_value(c.clone()).ok()).unwrap_or_default()
    };
    cancer_types_name_with_exclusion(&cancer_types("cancerTypes"), &cancer_types("excludedCancerTypes"), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oncurate_common::{NoReferenceData, StaticReferenceData};
    use serde_json::json;

    fn added_mutation() -> Value {
        json!({
            "mutation_effect": {
                "description": "V600E description",
                "description_uuid": "73fd71c5-4191-4192-b28a-e6a9b2eb4e83",
                "effect": "Likely Gain-of-function",
                "effect_uuid": "0c967537-b34b-4d6d-8c95-fb5e69f5575f",
                "oncogenic": "No",
                "oncogenic_uuid": "10b17d3f-da30-4fae-aa27-d776ea894e8d",
            },
            "name": "V600E",
            "name_uuid": "3fa31d79-c683-40ca-8285-41b10262ccb5",
            "mutations": [{
                "name": "Mutation",
                "name_uuid": "123",
                "tumors": [{
                    "cancerTypes": [{ "code": "MEL", "mainType": "Melanoma", "subtype": "Melanoma" }],
                    "cancerTypes_uuid": "456",
                    "TIs": [{ "treatments": [{ "name": "Treatment", "name_uuid": "789" }] }]
                }]
            }]
        })
    }

    #[test]
    fn test_find_entries_by_uuids() {
        let uuids = [
            "10b17d3f-da30-4fae-aa27-d776ea894e8d",
            "0c967537-b34b-4d6d-8c95-fb5e69f5575f",
            "123",
            "456",
            "789",
            "missing",
        ];
        let entries = find_entries_by_uuids(&added_mutation(), &uuids, &NoReferenceData);
        assert_eq!(entries[0], Some(("Mutation Effect, Oncogenic".to_string(), json!("No"))));
        assert_eq!(entries[1], Some(("Mutation Effect, Effect".to_string(), json!("Likely Gain-of-function"))));
        assert_eq!(entries[2], Some(("Mutation, Name".to_string(), json!("Mutation"))));
        assert_eq!(entries[3].as_ref().map(|e| e.0.as_str()), Some("Mutation, Melanoma, Name"));
        assert_eq!(entries[4], Some(("Mutation, Melanoma, Treatment, Name".to_string(), json!("Treatment"))));
        assert_eq!(entries[5], None);
    }

    #[test]
    fn test_parse_add_record_expands_listed_fields() {
        let record = HistoryRecord {
            last_edit_by: "User".into(),
            location: "V600E".into(),
            new: Some(added_mutation()),
            operation: HistoryOperation::Add,
            uuids: Some("10b17d3f-da30-4fae-aa27-d776ea894e8d,0c967537-b34b-4d6d-8c95-fb5e69f5575f".into()),
            ..Default::default()
        };
        let only_element = parse_add_record(&record, &NoReferenceData, false);
        assert_eq!(only_element.len(), 1);
        assert!(only_element[0].new.as_deref().unwrap().starts_with("{\n    \""));

        let lines = parse_add_record(&record, &NoReferenceData, true);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].location, "V600E, Mutation Effect, Oncogenic");
        assert_eq!(lines[1].new.as_deref(), Some("No"));
        assert_eq!(lines[1].operation, HistoryOperation::Update);
        assert_eq!(lines[2].location, "V600E, Mutation Effect, Effect");
    }

    #[test]
    fn test_parse_update_record_object_payload() {
        let record = HistoryRecord {
            last_edit_by: "User".into(),
            location: "Mutation, Cancer Type, STANDARD_THERAPEUTIC_IMPLICATIONS_FOR_DRUG_SENSITIVITY, 12a3".into(),
            new: Some(json!({ "description": "New Description", "propagation": "New Propagation" })),
            old: Some(json!({ "description": "Old Description", "indication": "Old Indication" })),
            operation: HistoryOperation::Update,
            ..Default::default()
        };
        let lines = parse_update_record(&record, &NoReferenceData);
        let summary: Vec<_> = lines
            .iter()
            .map(|l| (l.location.as_str(), l.new.as_deref(), l.old.as_deref()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Mutation, Cancer Type, 12a3, Description", Some("New Description"), Some("Old Description")),
                ("Mutation, Cancer Type, 12a3, Propagation", Some("New Propagation"), None),
                ("Mutation, Cancer Type, 12a3, Indication", None, Some("Old Indication")),
            ]
        );
    }

    #[test]
    fn test_parse_update_record_string_payload() {
        let record = HistoryRecord {
            location: "Mutation, Cancer Type, STANDARD_THERAPEUTIC_IMPLICATIONS_FOR_DRUG_SENSITIVITY, 12a3".into(),
            new: Some(json!("New")),
            old: Some(json!("Old")),
            operation: HistoryOperation::Update,
            ..Default::default()
        };
        let lines = parse_update_record(&record, &NoReferenceData);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].location, "Mutation, Cancer Type, 12a3");
        assert_eq!(lines[0].old.as_deref(), Some("Old"));
    }

    #[test]
    fn test_readable_location() {
        let d1 = "11111111-2222-3333-4444-555555555555";
        let d2 = "66666666-7777-8888-9999-000000000000";
        let reference = StaticReferenceData::new().with_drug(d1, "Drug1").with_drug(d2, "Drug2");
        let combination = format!("{d1} + {d2}");
        let parts: Vec<String> = [
            "Gene Summary",
            "Tumor Type Summary",
            "Gene Background",
            combination.as_str(),
            "Not a real uuid",
            "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(
            readable_location(&parts, &reference),
            vec![
                "Summary",
                "Summary",
                "Background",
                "Drug1 + Drug2",
                "Not a real uuid",
                "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee"
            ]
        );
    }

    #[test]
    fn test_log_skips_malformed_batches() {
        let snapshot = json!({
            "-a": { "admin": "Ada", "timeStamp": 20, "records": [] },
            "-b": { "admin": "Ada", "records": [] },
            "-c": { "admin": "Grace", "timeStamp": "10", "records": [] },
        });
        let log = HistoryLog::from_snapshot(Some(&snapshot));
        assert_eq!(log.batches.len(), 2);
        assert_eq!(log.batches[0].admin, "Grace");
        assert_eq!(log.issues.len(), 1);
        assert_eq!(log.issues[0].path, "-b");
        assert!(HistoryLog::from_snapshot(None).is_empty());
    }
}
