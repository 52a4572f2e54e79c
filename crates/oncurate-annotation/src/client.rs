//! Remote alteration annotator.

use async_trait::async_trait;
use oncurate_common::AlterationGene;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::AnnotationConfig;
use crate::error::{AnnotationError, Result};
use crate::query::AnnotateAlterationBody;

// ── Response ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AnnotationStatus {
    #[default]
    Ok,
    Warning,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Consequence {
    pub term: String,
    pub name: String,
}

/// Alteration as resolved by the annotator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnnotatedAlteration {
    #[serde(rename = "type")]
    pub alteration_type: Option<String>,
    pub alteration: String,
    pub name: String,
    pub protein_change: String,
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub ref_residues: String,
    pub variant_residues: String,
    pub consequence: Option<Consequence>,
    pub genes: Vec<AlterationGene>,
}

/// Per-query outcome returned by the annotator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnnotationResult {
    pub query_id: Option<String>,
    pub entity: Option<AnnotatedAlteration>,
    #[serde(rename = "type")]
    pub status: AnnotationStatus,
    pub message: String,
    pub warning: bool,
    pub error: bool,
}

impl AnnotationResult {
    pub fn warning_message(&self) -> Option<&str> {
        (self.warning || self.status == AnnotationStatus::Warning).then_some(self.message.as_str())
    }

    pub fn error_message(&self) -> Option<&str> {
        (self.error || self.status == AnnotationStatus::Error).then_some(self.message.as_str())
    }
}

// ── Trait ─────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait AlterationAnnotator: Send + Sync {
    /// Annotate one batch; results carry the `queryId` they answer.
    async fn annotate(&self, queries: &[AnnotateAlterationBody]) -> Result<Vec<AnnotationResult>>;
}

// ── HTTP ──────────────────────────────────────────────────────────────────────

pub struct HttpAnnotator {
    base_url: String,
    client: Client,
}

impl HttpAnnotator {
    pub fn new(config: &AnnotationConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client: Client::builder().timeout(config.timeout()).build()?,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/alterations/annotate", self.base_url)
    }
}

#[async_trait]
impl AlterationAnnotator for HttpAnnotator {
    #[instrument(skip(self, queries), fields(n_queries = queries.len()))]
    async fn annotate(&self, queries: &[AnnotateAlterationBody]) -> Result<Vec<AnnotationResult>> {
        let resp = self.client.post(self.endpoint()).json(queries).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await?;
            return Err(AnnotationError::Api { status: status.as_u16(), message });
        }

        let results: Vec<AnnotationResult> = resp.json().await?;
        debug!(n_results = results.len(), "Annotator responded");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_result() {
        let result: AnnotationResult = serde_json::from_value(json!({
            "queryId": "V600E",
            "type": "WARNING",
            "warning": true,
            "message": "Reference residue mismatch",
            "entity": {
                "alteration": "V600E",
                "proteinChange": "V600E",
                "start": 600,
                "end": 600,
                "refResidues": "V",
                "variantResidues": "E",
                "consequence": { "term": "MISSENSE_VARIANT" },
                "genes": [{ "id": 673, "hugoSymbol": "BRAF" }]
            }
        }))
        .unwrap();
        assert_eq!(result.query_id.as_deref(), Some("V600E"));
        assert_eq!(result.warning_message(), Some("Reference residue mismatch"));
        assert_eq!(result.error_message(), None);
        let entity = result.entity.unwrap();
        assert_eq!(entity.start, Some(600));
        assert_eq!(entity.consequence.unwrap().term, "MISSENSE_VARIANT");
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let annotator = HttpAnnotator::new(&AnnotationConfig::default().with_base_url("http://curation.local/")).unwrap();
        assert_eq!(annotator.endpoint(), "http://curation.local/api/alterations/annotate");
    }
}
