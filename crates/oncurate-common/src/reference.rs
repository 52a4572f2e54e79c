//! Read-only reference data used to make ids readable: drugs, cancer types
//! and alteration flags.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Drug {
    pub uuid: String,
    pub drug_name: String,
    #[serde(default)]
    pub ncit_code: Option<String>,
}

/// Lookup seam for reference data. Every lookup is optional; callers fall
/// back to the raw id.
pub trait ReferenceData: Send + Sync {
    fn drug_name(&self, uuid: &str) -> Option<String>;

    fn cancer_type_name(&self, code: &str) -> Option<String>;

    fn flag_name(&self, flag_type: &str, flag: &str) -> Option<String>;

    /// Render a stored treatment such as `d1+d2, d3` as `Drug A + Drug B, Drug C`.
    fn treatment_name(&self, raw: &str) -> String {
        raw.split(',')
            .map(|alternative| {
                alternative
                    .split('+')
                    .map(str::trim)
                    .filter(|uuid| !uuid.is_empty())
                    .map(|uuid| self.drug_name(uuid).unwrap_or_else(|| uuid.to_string()))
                    .collect::<Vec<_>>()
                    .join(" + ")
            })
            .filter(|alternative| !alternative.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Reference data that knows nothing; every lookup misses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReferenceData;

impl ReferenceData for NoReferenceData {
    fn drug_name(&self, _uuid: &str) -> Option<String> {
        None
    }

    fn cancer_type_name(&self, _code: &str) -> Option<String> {
        None
    }

    fn flag_name(&self, _flag_type: &str, _flag: &str) -> Option<String> {
        None
    }
}

/// In-memory reference tables.
#[derive(Debug, Clone, Default)]
pub struct StaticReferenceData {
    drugs: HashMap<String, Drug>,
    cancer_types: HashMap<String, String>,
    flags: HashMap<(String, String), String>,
}

impl StaticReferenceData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_drug(mut self, uuid: impl Into<String>, name: impl Into<String>) -> Self {
        let uuid = uuid.into();
        self.drugs.insert(
            uuid.clone(),
            Drug { uuid, drug_name: name.into(), ncit_code: None },
        );
        self
    }

    pub fn with_drugs(mut self, drugs: impl IntoIterator<Item = Drug>) -> Self {
        self.drugs.extend(drugs.into_iter().map(|d| (d.uuid.clone(), d)));
        self
    }

    pub fn with_cancer_type(mut self, code: impl Into<String>, name: impl Into<String>) -> Self {
        self.cancer_types.insert(code.into(), name.into());
        self
    }

    pub fn with_flag(
        mut self,
        flag_type: impl Into<String>,
        flag: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        self.flags.insert((flag_type.into(), flag.into()), name.into());
        self
    }

    pub fn drugs(&self) -> impl Iterator<Item = &Drug> {
        self.drugs.values()
    }
}

impl ReferenceData for StaticReferenceData {
    fn drug_name(&self, uuid: &str) -> Option<String> {
        self.drugs.get(uuid).map(|d| d.drug_name.clone())
    }

    fn cancer_type_name(&self, code: &str) -> Option<String> {
        self.cancer_types.get(code).cloned()
    }

    fn flag_name(&self, flag_type: &str, flag: &str) -> Option<String> {
        self.flags.get(&(flag_type.to_string(), flag.to_string())).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_treatment_name_resolves_combinations() {
        let reference = StaticReferenceData::new()
            .with_drug("d-1", "Dabrafenib")
            .with_drug("d-2", "Trametinib")
            .with_drug("d-3", "Vemurafenib");
        assert_eq!(
            reference.treatment_name("d-1 + d-2, d-3"),
            "Dabrafenib + Trametinib, Vemurafenib"
        );
    }

    #[test]
    fn test_unknown_drug_falls_back_to_id() {
        assert_eq!(NoReferenceData.treatment_name("d-9+d-8"), "d-9 + d-8");
    }

    #[test]
    fn test_flag_lookup() {
        let reference = StaticReferenceData::new().with_flag("TRANSCRIPT", "NOT_CANONICAL", "Non-canonical");
        assert_eq!(reference.flag_name("TRANSCRIPT", "NOT_CANONICAL").as_deref(), Some("Non-canonical"));
        assert_eq!(reference.flag_name("TRANSCRIPT", "OTHER"), None);
    }
}
