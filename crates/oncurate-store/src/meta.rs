//! Meta-record service.
//!
//! Meta records sit beside gene documents and carry the modification stamp,
//! the per-field review flags and the review lock field. All writes are plain
//! last-write-wins updates.

use std::sync::Arc;

use oncurate_common::model::CURRENT_REVIEWER_KEY;
use oncurate_common::time::now_millis;
use oncurate_common::{GeneticType, Meta};
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::path;
use crate::store::DocumentStore;

/// Writes meta records on behalf of one acting curator.
#[derive(Clone)]
pub struct MetaService {
    store: Arc<dyn DocumentStore>,
    user: String,
}

impl MetaService {
    pub fn new(store: Arc<dyn DocumentStore>, user: impl Into<String>) -> Self {
        Self { store, user: user.into() }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Stamp the meta record and set (`add`) or clear the review flag of
    /// each uuid. Comma-joined uuids, as used for a tumor's included and
    /// excluded cancer types, flag every part.
    #[instrument(skip(self))]
    pub async fn update_meta(
        &self,
        hugo: &str,
        genetic_type: GeneticType,
        uuids: &str,
        add: bool,
    ) -> Result<()> {
        let mut values = self.stamp();
        for uuid in uuids.split(',').map(str::trim).filter(|u| !u.is_empty()) {
            path::validate_key(uuid)?;
            let flag = if add { Value::Bool(true) } else { Value::Null };
            values.insert(path::join("review", uuid), flag);
        }
        self.store.update(&path::meta_path(hugo, genetic_type), values).await
    }

    /// Take (`entering`) or release the review lock of a gene.
    #[instrument(skip(self))]
    pub async fn set_current_reviewer(
        &self,
        hugo: &str,
        genetic_type: GeneticType,
        entering: bool,
    ) -> Result<()> {
        let reviewer = if entering { self.user.as_str() } else { "" };
        info!(hugo, reviewer, "Setting current reviewer");
        self.store
            .write(&path::current_reviewer_path(hugo, genetic_type), Value::String(reviewer.to_string()))
            .await
    }

    /// Fresh meta record for a newly created gene.
    pub async fn create_meta(&self, hugo: &str, genetic_type: GeneticType) -> Result<()> {
        let mut record = self.stamp();
        record.insert("review".into(), json!({ CURRENT_REVIEWER_KEY: "" }));
        self.store.write(&path::meta_path(hugo, genetic_type), Value::Object(record)).await
    }

    pub async fn delete_meta(&self, hugo: &str, genetic_type: GeneticType) -> Result<()> {
        self.store.delete(&path::meta_path(hugo, genetic_type)).await
    }

    pub async fn load_meta(&self, hugo: &str, genetic_type: GeneticType) -> Result<Meta> {
        let snapshot = self.store.get(&path::meta_path(hugo, genetic_type)).await?;
        Ok(Meta::from_snapshot(snapshot.as_ref())?)
    }

    /// Genes the named collaborator works on.
    pub async fn collaborator_genes(&self, name: &str) -> Result<Vec<String>> {
        let snapshot = self.store.get(&path::collaborator_path(name)).await?;
        Ok(match snapshot {
            Some(value) => serde_json::from_value(value)?,
            None => Vec::new(),
        })
    }

    pub async fn add_collaborator(&self, name: &str, hugo: &str) -> Result<()> {
        let mut genes = self.collaborator_genes(name).await?;
        if genes.iter().any(|g| g == hugo) {
            return Ok(());
        }
        genes.push(hugo.to_string());
        debug!(name, hugo, "Adding collaborator gene");
        self.store.write(&path::collaborator_path(name), json!(genes)).await
    }

    pub async fn remove_collaborator(&self, name: &str, hugo: &str) -> Result<()> {
        let mut genes = self.collaborator_genes(name).await?;
        let before = genes.len();
        genes.retain(|g| g != hugo);
        if genes.len() == before {
            return Ok(());
        }
        self.store.write(&path::collaborator_path(name), json!(genes)).await
    }

    fn stamp(&self) -> Map<String, Value> {
        let mut values = Map::new();
        values.insert("lastModifiedBy".into(), Value::String(self.user.clone()));
        values.insert("lastModifiedAt".into(), Value::String(now_millis().to_string()));
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;

    fn service(store: &InMemoryStore) -> MetaService {
        MetaService::new(Arc::new(store.clone()), "Ada Lovelace")
    }

    #[tokio::test]
    async fn test_update_meta_sets_and_clears_flags() {
        let store = InMemoryStore::new();
        let meta = service(&store);
        meta.update_meta("BRAF", GeneticType::Somatic, "ct-1, ect-1", true).await.unwrap();

        let loaded = meta.load_meta("BRAF", GeneticType::Somatic).await.unwrap();
        assert_eq!(loaded.last_modified_by, "Ada Lovelace");
        assert!(loaded.last_modified_at.is_some());
        assert!(loaded.review.is_flagged("ct-1"));
        assert!(loaded.review.is_flagged("ect-1"));

        meta.update_meta("BRAF", GeneticType::Somatic, "ct-1", false).await.unwrap();
        let loaded = meta.load_meta("BRAF", GeneticType::Somatic).await.unwrap();
        assert!(!loaded.review.is_flagged("ct-1"));
        assert!(loaded.review.is_flagged("ect-1"));
    }

    #[tokio::test]
    async fn test_germline_meta_is_separate() {
        let store = InMemoryStore::new();
        let meta = service(&store);
        meta.update_meta("BRCA1", GeneticType::Germline, "u-1", true).await.unwrap();
        assert!(store.get("Germline_Meta/BRCA1/review/u-1").await.unwrap().is_some());
        assert!(store.get("Meta/BRCA1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_current_reviewer_round_trip() {
        let store = InMemoryStore::new();
        let meta = service(&store);
        meta.create_meta("BRAF", GeneticType::Somatic).await.unwrap();
        meta.set_current_reviewer("BRAF", GeneticType::Somatic, true).await.unwrap();
        let loaded = meta.load_meta("BRAF", GeneticType::Somatic).await.unwrap();
        assert_eq!(loaded.review.current_reviewer, "Ada Lovelace");

        meta.set_current_reviewer("BRAF", GeneticType::Somatic, false).await.unwrap();
        let loaded = meta.load_meta("BRAF", GeneticType::Somatic).await.unwrap();
        assert_eq!(loaded.review.current_reviewer, "");
    }

    #[tokio::test]
    async fn test_collaborators() {
        let store = InMemoryStore::new();
        let meta = service(&store);
        meta.add_collaborator("Ada Lovelace", "BRAF").await.unwrap();
        meta.add_collaborator("ada lovelace", "KRAS").await.unwrap();
        meta.add_collaborator("Ada Lovelace", "BRAF").await.unwrap();
        assert_eq!(meta.collaborator_genes("ADA LOVELACE").await.unwrap(), vec!["BRAF", "KRAS"]);

        meta.remove_collaborator("Ada Lovelace", "BRAF").await.unwrap();
        meta.remove_collaborator("Ada Lovelace", "KRAS").await.unwrap();
        assert!(meta.collaborator_genes("Ada Lovelace").await.unwrap().is_empty());
        assert!(store.get("Meta/collaborators").await.unwrap().is_none());
    }
}
