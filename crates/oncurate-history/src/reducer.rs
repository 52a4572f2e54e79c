//! Date-range history grouping and the downloadable text export.

use std::collections::{BTreeMap, HashSet};

use oncurate_common::{HistoryOperation, ReferenceData};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::diff::{diff, render, DiffMethod, DiffView};
use crate::parse::{parse_history, HistoryLog, ParsedRecord};

const GENE_FIELDS: [&str; 5] = ["Gene Type", "Summary", "Background", "Penetrance", "Mechanism of Inheritance"];
const ALTERATION_FIELDS: [&str; 3] =
    ["Mutation Effect", "Mutation Specific Inheritance Mechanism", "Mutation Specific Penetrance"];
const VALUE_FIELDS: [&str; 3] = ["Oncogenic", "Effect", "Level"];
const FREE_TEXT_FIELDS: [&str; 4] = ["Summary", "Background", "Description", "Additional Information"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryGroup {
    Gene,
    Alteration,
    Evidence,
}

impl HistoryGroup {
    pub fn header(self) -> &'static str {
        match self {
            HistoryGroup::Gene => "### Gene",
            HistoryGroup::Alteration => "### Alteration",
            HistoryGroup::Evidence => "### Evidence",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadableHistoryEntry {
    pub location: String,
    pub operation: HistoryOperation,
    pub time_stamp: i64,
    pub hugo_symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl DownloadableHistoryEntry {
    fn headline(&self) -> String {
        format!("{} {} {}", self.hugo_symbol, self.location, self.operation.past_tense())
    }

    fn is_free_text(&self) -> bool {
        FREE_TEXT_FIELDS.iter().any(|field| self.location.ends_with(field))
    }

    /// One export line; `None` when the entry changed nothing.
    pub fn to_text(&self, view: Option<DiffView>) -> Option<String> {
        let new = self.new.as_deref().filter(|s| !s.is_empty());
        let old = self.old.as_deref().filter(|s| !s.is_empty());
        match (new, old) {
            (None, None) => {
                let level = self.level.as_deref().map(|l| format!(" {l}")).unwrap_or_default();
                Some(format!("{} {}{level} {}", self.hugo_symbol, self.location, self.operation.past_tense()))
            }
            (new, old) if new == old => None,
            (new, old) => match view.filter(|_| self.is_free_text()) {
                Some(view) => {
                    let spans = diff(old.unwrap_or_default(), new.unwrap_or_default(), DiffMethod::Words);
                    Some(format!("{}\n{}", self.headline(), indent(&render(&spans, view))))
                }
                None => Some(format!(
                    "{}\n\t New: {}\n\t Old: {}",
                    self.headline(),
                    new.unwrap_or_default(),
                    old.unwrap_or_default()
                )),
            },
        }
    }
}

fn indent(text: &str) -> String {
    text.lines().map(|l| format!("\t {l}")).collect::<Vec<_>>().join("\n")
}

/// History entries split by the level they touched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupedHistory {
    pub gene: Vec<DownloadableHistoryEntry>,
    pub alteration: Vec<DownloadableHistoryEntry>,
    pub evidence: Vec<DownloadableHistoryEntry>,
}

impl GroupedHistory {
    pub fn is_empty(&self) -> bool {
        self.gene.is_empty() && self.alteration.is_empty() && self.evidence.is_empty()
    }

    pub fn len(&self) -> usize {
        self.gene.len() + self.alteration.len() + self.evidence.len()
    }

    pub fn group(&self, group: HistoryGroup) -> &[DownloadableHistoryEntry] {
        match group {
            HistoryGroup::Gene => &self.gene,
            HistoryGroup::Alteration => &self.alteration,
            HistoryGroup::Evidence => &self.evidence,
        }
    }

    fn group_mut(&mut self, group: HistoryGroup) -> &mut Vec<DownloadableHistoryEntry> {
        match group {
            HistoryGroup::Gene => &mut self.gene,
            HistoryGroup::Alteration => &mut self.alteration,
            HistoryGroup::Evidence => &mut self.evidence,
        }
    }

    pub fn extend(&mut self, other: GroupedHistory) {
        self.gene.extend(other.gene);
        self.alteration.extend(other.alteration);
        self.evidence.extend(other.evidence);
    }

    /// Downloadable document: one `### <Group>` section per non-empty group.
    pub fn to_download_text(&self, view: Option<DiffView>) -> String {
        let mut sections = Vec::new();
        for group in [HistoryGroup::Gene, HistoryGroup::Alteration, HistoryGroup::Evidence] {
            let lines = render_entries(self.group(group), view);
            if lines.is_empty() {
                continue;
            }
            sections.push(format!("{}\n{}", group.header(), lines.join("\n")));
        }
        sections.join("\n\n")
    }
}

/// Optional inclusive bounds in epoch millis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl DateRange {
    pub fn new(start: Option<i64>, end: Option<i64>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, millis: i64) -> bool {
        self.start.is_none_or(|s| millis >= s) && self.end.is_none_or(|e| millis <= e)
    }

    /// An end before the start matches nothing.
    pub fn is_inverted(&self) -> bool {
        matches!((self.start, self.end), (Some(s), Some(e)) if e < s)
    }
}

/// Group the changes one gene's log recorded inside `range`.
pub fn get_history_for_range(
    hugo: &str,
    log: &HistoryLog,
    reference: &dyn ReferenceData,
    range: DateRange,
) -> GroupedHistory {
    let mut result = GroupedHistory::default();
    if range.is_inverted() {
        return result;
    }

    let window = HistoryLog {
        batches: log.batches.iter().filter(|b| range.contains(b.time_stamp)).cloned().collect(),
        issues: Vec::new(),
    };
    for record in parse_history(&window, reference) {
        if record.location.is_empty() {
            continue;
        }
        let (group, entry) = classify(hugo, record);
        result.group_mut(group).push(entry);
    }
    debug!(hugo = %hugo, n_entries = result.len(), "Grouped gene history");
    result
}

/// Group the history of every gene in a collection snapshot keyed by hugo
/// symbol, each holding its raw log. Genes whose log cannot be read add
/// nothing.
pub fn get_all_gene_history_for_date_range(
    collection: Option<&Value>,
    reference: &dyn ReferenceData,
    range: DateRange,
) -> GroupedHistory {
    let mut result = GroupedHistory::default();
    let Some(genes) = collection.and_then(Value::as_object) else {
        return result;
    };
    let genes: BTreeMap<&String, &Value> = genes.iter().collect();
    for (hugo, history) in genes {
        let log = HistoryLog::from_snapshot(history.get("api"));
        for issue in &log.issues {
            warn!(hugo = %hugo, issue = %issue, "Skipped history batch");
        }
        result.extend(get_history_for_range(hugo, &log, reference, range));
    }
    result
}

fn classify(hugo: &str, record: ParsedRecord) -> (HistoryGroup, DownloadableHistoryEntry) {
    let mut entry = DownloadableHistoryEntry {
        location: record.location.clone(),
        operation: record.operation,
        time_stamp: record.time_stamp,
        hugo_symbol: hugo.to_string(),
        ..Default::default()
    };
    if matches!(record.operation, HistoryOperation::NameChange | HistoryOperation::Update)
        || VALUE_FIELDS.iter().any(|field| record.location.ends_with(field))
    {
        entry.new = record.new.clone();
        entry.old = record.old.clone();
    }

    let carries_effect = |element: &Option<Value>| {
        element.as_ref().is_some_and(|e| e.get("mutation_effect").is_some_and(|v| !v.is_null()))
    };
    let is_alteration = match record.operation {
        HistoryOperation::Add | HistoryOperation::Delete => {
            entry.level = record
                .element
                .as_ref()
                .and_then(|e| e.get("level"))
                .and_then(Value::as_str)
                .filter(|l| !l.is_empty())
                .map(str::to_string);
            carries_effect(&record.element)
        }
        HistoryOperation::NameChange if record.new.as_deref() == Some(record.location.as_str()) => true,
        HistoryOperation::PromoteVus | HistoryOperation::DemoteMutation => true,
        _ => false,
    } || ALTERATION_FIELDS.iter().any(|field| record.location.contains(field));

    let group = if GENE_FIELDS.contains(&record.location.as_str()) {
        HistoryGroup::Gene
    } else if is_alteration {
        HistoryGroup::Alteration
    } else {
        HistoryGroup::Evidence
    };
    (group, entry)
}

fn render_entries(entries: &[DownloadableHistoryEntry], view: Option<DiffView>) -> Vec<String> {
    let mut sorted: Vec<&DownloadableHistoryEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.hugo_symbol.cmp(&b.hugo_symbol).then(a.time_stamp.cmp(&b.time_stamp)));

    let mut seen = HashSet::new();
    sorted
        .into_iter()
        .filter_map(|entry| entry.to_text(view))
        .filter(|line| seen.insert(line.clone()))
        .collect()
}

/// Export lines sorted by gene then time, with duplicates removed.
pub fn history_entry_strings(entries: &[DownloadableHistoryEntry]) -> Vec<String> {
    render_entries(entries, None)
}
