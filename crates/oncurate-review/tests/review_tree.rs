use oncurate_common::{Meta, StaticReferenceData};
use oncurate_review::{
    build_review_tree, needs_review, prune_to_pending, ReviewAction, ReviewLevelType, ReviewTreeBuilder,
};
use serde_json::{json, Value};

fn braf() -> Value {
    json!({
        "name": "BRAF",
        "summary": "BRAF is a serine/threonine kinase.", "summary_uuid": "s-uuid",
        "background": "Background text.", "background_uuid": "bg-uuid",
        "type": { "ocg": "Oncogene", "ocg_uuid": "ocg-uuid", "tsg": "", "tsg_uuid": "tsg-uuid" },
        "mutations": [
            {
                "name": "V600E", "name_uuid": "m1",
                "mutation_effect": {
                    "oncogenic": "Yes", "oncogenic_uuid": "onc1",
                    "effect": "Gain-of-function", "effect_uuid": "eff1",
                    "description": "Activating.", "description_uuid": "desc1"
                },
                "tumors": [{
                    "cancerTypes": [{ "code": "MEL", "mainType": "Melanoma", "subtype": "Melanoma" }],
                    "cancerTypes_uuid": "ct1",
                    "excludedCancerTypes_uuid": "ect1",
                    "summary": "Tumor summary.", "summary_uuid": "tsum1",
                    "TIs": [{
                        "type": "SS",
                        "treatments": [{
                            "name": "drug-1", "name_uuid": "tx1",
                            "level": "1", "level_uuid": "lvl1",
                            "level_review": { "updatedBy": "Ada Lovelace", "lastReviewed": "2" }
                        }]
                    }]
                }]
            },
            {
                "name": "Amplification", "name_uuid": "m2",
                "name_review": { "updatedBy": "Grace Hopper", "added": true },
                "mutation_effect": { "oncogenic": "Likely", "oncogenic_uuid": "onc2" }
            }
        ]
    })
}

fn meta(flags: Value) -> Meta {
    Meta::from_snapshot(Some(&json!({ "review": flags }))).unwrap()
}

#[test]
fn test_tree_shape_and_ids() {
    let reference = StaticReferenceData::new().with_drug("drug-1", "Vemurafenib");
    let tree = ReviewTreeBuilder::new(&reference).build(&braf(), &meta(json!({})), false);
    assert!(tree.issues.is_empty());

    let root = &tree.root;
    assert_eq!(root.id, "BRAF");
    assert_eq!(root.node_count(), 18);
    assert_eq!(root.iter().filter(|l| l.is_reviewable()).count(), 14);

    let mutations = root.find("BRAF/mutations").unwrap();
    let order: Vec<_> = mutations.children.iter().map(|m| m.title.as_str()).collect();
    assert_eq!(order, vec!["Amplification", "V600E"]);

    let treatment = root.find("BRAF/mutations/m1/tumors/mel/TIs/SS/treatments/tx1").unwrap();
    assert_eq!(treatment.level_type, ReviewLevelType::Treatment);
    assert_eq!(treatment.title, "Vemurafenib");
    assert_eq!(treatment.title_parts, vec!["BRAF", "V600E", "Melanoma", "Vemurafenib"]);
    assert_eq!(
        treatment.history_location,
        "V600E, Melanoma, STANDARD_THERAPEUTIC_IMPLICATIONS_FOR_DRUG_SENSITIVITY, drug-1"
    );

    let tumor = root.find("BRAF/mutations/m1/tumors/mel").unwrap();
    assert_eq!(tumor.uuid.as_deref(), Some("ct1,ect1"));
    assert_eq!(tumor.uuids(), vec!["ct1", "ect1"]);

    let level = root.find("BRAF/mutations/m1/tumors/mel/TIs/SS/treatments/tx1/level").unwrap();
    assert_eq!(level.current_value.as_deref(), Some("1"));
    assert_eq!(level.old_value.as_deref(), Some("2"));
    assert_eq!(level.editor(), Some("Ada Lovelace"));
    assert_eq!(level.review_action, Some(ReviewAction::Update));
    assert_eq!(level.history_data.new_state, Some(json!({ "level": "1" })));
    assert_eq!(level.history_data.old_state, Some(json!({ "level": "2" })));
}

#[test]
fn test_missing_drug_name_falls_back_to_raw_id() {
    let tree = build_review_tree(&braf(), &meta(json!({})), false);
    let treatment = tree.root.find("BRAF/mutations/m1/tumors/mel/TIs/SS/treatments/tx1").unwrap();
    assert_eq!(treatment.title, "drug-1");
}

#[test]
fn test_ids_are_stable_across_rebuilds_and_reordering() {
    let first = build_review_tree(&braf(), &meta(json!({})), false);
    let again = build_review_tree(&braf(), &meta(json!({})), false);
    assert_eq!(first.root.ids(), again.root.ids());

    let mut reordered = braf();
    reordered["mutations"].as_array_mut().unwrap().reverse();
    let swapped = build_review_tree(&reordered, &meta(json!({})), false);
    assert_eq!(first.root.ids(), swapped.root.ids());

    let value_path = |tree: &oncurate_review::ReviewTree| {
        tree.root.find("BRAF/mutations/m2").and_then(|l| l.value_path.clone())
    };
    assert_eq!(value_path(&first).as_deref(), Some("mutations/1/name"));
    assert_eq!(value_path(&swapped).as_deref(), Some("mutations/0/name"));
}

#[test]
fn test_nested_under_create_is_not_actionable() {
    let flags = json!({ "m2": true, "onc2": true, "currentReviewer": "Ada Lovelace" });
    let tree = build_review_tree(&braf(), &meta(flags), false);

    let created = tree.root.find("BRAF/mutations/m2").unwrap();
    assert_eq!(created.review_action, Some(ReviewAction::Create));
    assert!(created.is_actionable());
    assert_eq!(created.history_data.new_state.as_ref().and_then(|v| v.get("name_uuid")), Some(&json!("m2")));

    let nested = tree.root.find("BRAF/mutations/m2/mutation_effect/oncogenic").unwrap();
    assert!(nested.needs_review);
    assert!(nested.nested_under_create_or_delete);
    assert!(!nested.is_actionable());
    assert!(needs_review(&tree.root));

    let pending = prune_to_pending(&tree.root).unwrap();
    assert_eq!(
        pending.ids(),
        vec!["BRAF", "BRAF/mutations", "BRAF/mutations/m2", "BRAF/mutations/m2/mutation_effect/oncogenic"]
    );
}

#[test]
fn test_only_nested_flags_do_not_need_review() {
    let tree = build_review_tree(&braf(), &meta(json!({ "onc2": true })), false);
    assert!(!needs_review(&tree.root));
}

#[test]
fn test_malformed_mutation_is_dropped_and_reported() {
    let mut document = braf();
    document["mutations"].as_array_mut().unwrap().push(json!({ "name": "G469A" }));
    document["mutations"].as_array_mut().unwrap().push(json!("not an object"));

    let tree = build_review_tree(&document, &meta(json!({})), false);
    assert_eq!(tree.issues.len(), 2);
    let paths: Vec<_> = tree.issues.iter().map(|i| i.path.as_str()).collect();
    assert!(paths.contains(&"mutations/2/name_uuid"));
    assert!(paths.contains(&"mutations/3"));
    assert_eq!(tree.root.find("BRAF/mutations").unwrap().children.len(), 2);
}

#[test]
fn test_empty_gene_and_mutation_without_tumors() {
    let tree = build_review_tree(&json!({ "name": "KRAS" }), &Meta::default(), false);
    assert!(tree.issues.is_empty());
    assert_eq!(tree.root.node_count(), 1);
    assert!(!needs_review(&tree.root));

    let document = json!({ "name": "KRAS", "mutations": [{ "name": "G12D", "name_uuid": "k1" }] });
    let tree = build_review_tree(&document, &Meta::default(), false);
    let mutation = tree.root.find("KRAS/mutations/k1").unwrap();
    assert!(mutation.children.is_empty());
}

#[test]
fn test_non_object_document_yields_issue() {
    let tree = build_review_tree(&json!([1, 2]), &Meta::default(), false);
    assert_eq!(tree.root.node_count(), 1);
    assert_eq!(tree.issues.len(), 1);
}

#[test]
fn test_germline_fields() {
    let document = json!({
        "name": "BRCA1",
        "penetrance": "High", "penetrance_uuid": "pen",
        "inheritanceMechanism": "Autosomal Dominant", "inheritanceMechanism_uuid": "im",
        "mutations": [{
            "name": "C61G", "name_uuid": "g1",
            "mutation_effect": { "pathogenic": "Pathogenic", "pathogenic_uuid": "path1", "oncogenic": "Yes", "oncogenic_uuid": "onc" },
            "mutation_specific_penetrance": { "penetrance": "High", "penetrance_uuid": "msp" }
        }],
        "genomic_indicators": [{ "name": "Biallelic", "name_uuid": "gi1", "description": "d", "description_uuid": "gid" }]
    });
    let tree = build_review_tree(&document, &Meta::default(), true);
    let root = &tree.root;
    assert!(root.find("BRCA1/penetrance").is_some());
    assert!(root.find("BRCA1/inheritanceMechanism").is_some());
    assert!(root.find("BRCA1/mutations/g1/mutation_effect/pathogenic").is_some());
    assert!(root.find("BRCA1/mutations/g1/mutation_effect/oncogenic").is_none());
    let specific = root.find("BRCA1/mutations/g1/mutation_specific_penetrance/penetrance").unwrap();
    assert_eq!(specific.history_location, "C61G, Mutation Specific Penetrance");
    let indicator = root.find("BRCA1/genomic_indicators/gi1").unwrap();
    assert_eq!(indicator.level_type, ReviewLevelType::GenomicIndicator);
    assert_eq!(indicator.history_location, "Genomic Indicators, Biallelic");

    let somatic = build_review_tree(&document, &Meta::default(), false);
    assert!(somatic.root.find("BRCA1/penetrance").is_none());
    assert!(somatic.root.find("BRCA1/genomic_indicators").is_none());
}
