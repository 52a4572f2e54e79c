//! Tab-separated VUS export.

use oncurate_common::time::{millis_to_rfc3339, parse_millis};
use oncurate_common::{NodeIssue, Vus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::Result;

/// One exported VUS line. Field order is the column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VusRow {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "LastEditedBy")]
    pub last_edited_by: String,
    #[serde(rename = "LastEditedAt")]
    pub last_edited_at: String,
    #[serde(rename = "LatestComment")]
    pub latest_comment: String,
}

impl VusRow {
    pub fn from_vus(vus: &Vus) -> Self {
        Self {
            name: vus.name.clone(),
            last_edited_by: vus.time.by.name.clone(),
            last_edited_at: millis_to_rfc3339(vus.time.value),
            latest_comment: vus.latest_comment().map(|c| c.content.clone()).unwrap_or_default(),
        }
    }

    /// `LastEditedAt` back as epoch millis.
    pub fn last_edited_millis(&self) -> Option<i64> {
        parse_millis(&self.last_edited_at).ok()
    }
}

/// Decode a VUS list snapshot keyed by push key. Entries that do not
/// decode are skipped and reported.
pub fn decode_vus_list(snapshot: Option<&Value>) -> (Vec<Vus>, Vec<NodeIssue>) {
    let mut list = Vec::new();
    let mut issues = Vec::new();
    let entries: Vec<(String, &Value)> = match snapshot {
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Some(Value::Array(items)) => items.iter().enumerate().map(|(i, v)| (i.to_string(), v)).collect(),
        _ => return (list, issues),
    };
    for (key, raw) in entries.into_iter().filter(|(_, v)| !v.is_null()) {
        match serde_json::from_value::<Vus>(raw.clone()) {
            Ok(vus) => list.push(vus),
            Err(e) => {
                warn!(key = %key, error = %e, "Skipping malformed VUS entry");
                issues.push(NodeIssue::new(key, e.to_string()));
            }
        }
    }
    (list, issues)
}

/// Rows in name order.
pub fn vus_rows(list: &[Vus]) -> Vec<VusRow> {
    let mut rows: Vec<VusRow> = list.iter().map(VusRow::from_vus).collect();
    rows.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()).then_with(|| a.name.cmp(&b.name)));
    rows
}

/// Header line plus one tab-separated line per row.
pub fn write_vus_tsv(rows: &[VusRow]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_writer(Vec::new());
    if rows.is_empty() {
        writer.write_record(["Name", "LastEditedBy", "LastEditedAt", "LatestComment"])?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

/// Parse an export back into rows. Lines that do not decode are skipped and
/// reported by line number.
pub fn parse_vus_tsv(text: &str) -> Result<(Vec<VusRow>, Vec<NodeIssue>)> {
    let mut reader = csv::ReaderBuilder::new().delimiter(b'\t').from_reader(text.as_bytes());
    let mut rows = Vec::new();
    let mut issues = Vec::new();
    for (i, record) in reader.deserialize::<VusRow>().enumerate() {
        match record {
            Ok(row) => rows.push(row),
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(i as u64 + 2);
                warn!(line, error = %e, "Skipping unparsable VUS row");
                issues.push(NodeIssue::new(format!("line {line}"), e.to_string()));
            }
        }
    }
    Ok((rows, issues))
}
