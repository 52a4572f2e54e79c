//! Annotation queries and the single place query ids are derived.

use oncurate_common::{Alteration, AlterationGene};
use serde::{Deserialize, Serialize};

/// What a caller asks to annotate: a mutation's structured alterations when
/// it has them, otherwise its comma-separated name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationQuery {
    pub name: String,
    pub alterations: Option<Vec<Alteration>>,
}

impl MutationQuery {
    pub fn from_name(name: impl Into<String>) -> Self {
        Self { name: name.into(), alterations: None }
    }

    pub fn from_alterations(alterations: Vec<Alteration>) -> Self {
        Self { name: String::new(), alterations: Some(alterations) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlterationQuery {
    pub genes: Vec<AlterationGene>,
    pub alteration: String,
}

/// One leaf query as sent to the annotator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotateAlterationBody {
    pub query_id: String,
    pub reference_genome: String,
    pub alteration: AlterationQuery,
}

/// Cache identity of a leaf query.
pub fn query_id(alteration: &str) -> String {
    alteration.trim().to_string()
}

/// Expand a mutation into leaf queries. Structured alterations keep their
/// own genes; name segments are annotated against `hugo`. Segments that
/// trim to nothing are dropped.
pub fn expand(hugo: &str, mutation: &MutationQuery, reference_genome: &str) -> Vec<AnnotateAlterationBody> {
    let hugo_gene = || vec![AlterationGene { id: None, hugo_symbol: Some(hugo.to_string()) }];
    let leaf = |alteration: &str, genes: Vec<AlterationGene>| AnnotateAlterationBody {
        query_id: query_id(alteration),
        reference_genome: reference_genome.to_string(),
        alteration: AlterationQuery { genes, alteration: alteration.to_string() },
    };

    let leaves: Vec<AnnotateAlterationBody> = match &mutation.alterations {
        Some(alterations) => alterations
            .iter()
            .map(|alt| {
                let genes = if alt.genes.is_empty() {
                    hugo_gene()
                } else {
                    alt.genes.iter().map(|g| AlterationGene { id: g.id, hugo_symbol: None }).collect()
                };
                leaf(&alt.alteration, genes)
            })
            .collect(),
        None => mutation.name.split(',').map(|segment| leaf(segment, hugo_gene())).collect(),
    };
    leaves.into_iter().filter(|q| !q.query_id.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_splits_into_leaf_queries() {
        let queries = expand("BRAF", &MutationQuery::from_name("V600E, L597Q"), "GRCh37");
        let ids: Vec<_> = queries.iter().map(|q| q.query_id.as_str()).collect();
        assert_eq!(ids, vec!["V600E", "L597Q"]);
        assert_eq!(queries[1].alteration.alteration, " L597Q");
        assert_eq!(queries[0].alteration.genes[0].hugo_symbol.as_deref(), Some("BRAF"));
        assert_eq!(queries[0].reference_genome, "GRCh37");
    }

    #[test]
    fn test_structured_alterations_use_their_own_key() {
        let alteration = Alteration {
            alteration: "V600E".into(),
            name: "V600E (p.V600E)".into(),
            genes: vec![AlterationGene { id: Some(673), hugo_symbol: Some("BRAF".into()) }],
            ..Default::default()
        };
        let queries = expand("KRAS", &MutationQuery::from_alterations(vec![alteration]), "GRCh37");
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].query_id, "V600E");
        assert_eq!(queries[0].alteration.genes, vec![AlterationGene { id: Some(673), hugo_symbol: None }]);
    }

    #[test]
    fn test_blank_segments_are_dropped() {
        assert!(expand("BRAF", &MutationQuery::from_name(" , "), "GRCh37").is_empty());
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let query = &expand("BRAF", &MutationQuery::from_name("V600E"), "GRCh37")[0];
        let json = serde_json::to_value(query).unwrap();
        assert_eq!(json["queryId"], "V600E");
        assert_eq!(json["referenceGenome"], "GRCh37");
        assert_eq!(json["alteration"]["genes"][0]["hugoSymbol"], "BRAF");
    }
}
