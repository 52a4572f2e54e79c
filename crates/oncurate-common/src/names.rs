//! Display names for cancer types, alterations and mutations.

use crate::model::{Alteration, CancerType};

/// `Subtype (CODE)` for a subtype, otherwise the main type.
pub fn cancer_type_name(cancer_type: &CancerType, omit_code: bool) -> String {
    let subtype = cancer_type.subtype.as_deref().unwrap_or_default().trim();
    if subtype.is_empty() {
        return cancer_type.main_type.as_deref().unwrap_or_default().trim().to_string();
    }
    match cancer_type.code.as_deref().map(str::trim) {
        Some(code) if !omit_code && !code.is_empty() => format!("{subtype} ({code})"),
        _ => subtype.to_string(),
    }
}

pub fn cancer_types_name(cancer_types: &[CancerType], omit_code: bool, separator: &str) -> String {
    cancer_types
        .iter()
        .map(|ct| cancer_type_name(ct, omit_code))
        .filter(|name| !name.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

/// `Included (excluding Excluded)`, or just the included names.
pub fn cancer_types_name_with_exclusion(
    included: &[CancerType],
    excluded: &[CancerType],
    omit_code: bool,
) -> String {
    let name = cancer_types_name(included, omit_code, ", ");
    if excluded.is_empty() {
        return name;
    }
    format!("{name} (excluding {})", cancer_types_name(excluded, omit_code, ", "))
}

/// Name of one structured alteration, e.g. `V600E` or `Exon 19 deletion (p.E746_A750del)`.
pub fn alteration_name(alteration: &Alteration) -> String {
    let name = alteration.name.trim();
    let protein_change = alteration.protein_change.trim();
    if name.is_empty() {
        return if protein_change.is_empty() {
            alteration.alteration.trim().to_string()
        } else {
            protein_change.to_string()
        };
    }
    if !protein_change.is_empty() && protein_change != alteration.alteration.trim() && protein_change != name {
        format!("{name} (p.{protein_change})")
    } else {
        name.to_string()
    }
}

/// Display name of a mutation: its alterations when present, else the stored name.
pub fn mutation_name(name: &str, alterations: &[Alteration]) -> String {
    let from_alterations: Vec<String> = alterations
        .iter()
        .map(alteration_name)
        .filter(|n| !n.is_empty())
        .collect();
    if !from_alterations.is_empty() {
        return from_alterations.join(", ");
    }
    let name = name.trim();
    if name.is_empty() { "(No Name)".to_string() } else { name.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ct(code: &str, main: &str, sub: &str) -> CancerType {
        let opt = |s: &str| if s.is_empty() { None } else { Some(s.to_string()) };
        CancerType { code: opt(code), main_type: opt(main), subtype: opt(sub) }
    }

    #[test]
    fn test_cancer_type_name() {
        let mel = ct("MEL", "Melanoma", "Cutaneous Melanoma");
        assert_eq!(cancer_type_name(&mel, false), "Cutaneous Melanoma (MEL)");
        assert_eq!(cancer_type_name(&mel, true), "Cutaneous Melanoma");
        assert_eq!(cancer_type_name(&ct("", "All Solid Tumors", ""), false), "All Solid Tumors");
    }

    #[test]
    fn test_cancer_types_with_exclusion() {
        let included = [ct("", "All Solid Tumors", "")];
        let excluded = [ct("THYROID", "Thyroid Cancer", ""), ct("MEL", "Melanoma", "Melanoma")];
        assert_eq!(
            cancer_types_name_with_exclusion(&included, &excluded, true),
            "All Solid Tumors (excluding Thyroid Cancer, Melanoma)"
        );
        assert_eq!(cancer_types_name_with_exclusion(&included, &[], true), "All Solid Tumors");
    }

    #[test]
    fn test_alteration_name_appends_protein_change() {
        let alt = Alteration {
            alteration: "c.2573T>G".into(),
            name: "c.2573T>G".into(),
            protein_change: "L858R".into(),
            ..Default::default()
        };
        assert_eq!(alteration_name(&alt), "c.2573T>G (p.L858R)");

        let plain = Alteration { alteration: "V600E".into(), name: "V600E".into(), protein_change: "V600E".into(), ..Default::default() };
        assert_eq!(alteration_name(&plain), "V600E");
    }

    #[test]
    fn test_mutation_name_fallbacks() {
        let alts = vec![
            Alteration { name: "V600E".into(), ..Default::default() },
            Alteration { name: "V600K".into(), ..Default::default() },
        ];
        assert_eq!(mutation_name("ignored", &alts), "V600E, V600K");
        assert_eq!(mutation_name(" G12D ", &[]), "G12D");
        assert_eq!(mutation_name("", &[]), "(No Name)");
    }
}
