#[cfg(test)]
mod tests {
    use super::super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.annotation.reference_genome, "GRCh37");
        assert_eq!(config.annotation.retry.max_attempts, 1);
        assert_eq!(config.annotation.cache_ttl_secs, None);
        assert_eq!(config.review.genetic_type, GeneticType::Somatic);
        assert_eq!(config.history.diff_view, DiffView::Merged);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_sections_parse() {
        let config = Config::from_toml_str(
            r#"
            [annotation]
            base_url = "https://curation.example.org"
            timeout_secs = 5
            cache_ttl_secs = 600

            [annotation.retry]
            max_attempts = 3
            backoff_ms = 250

            [review]
            current_user = "Ada Lovelace"
            genetic_type = "germline"

            [history]
            diff_view = "side_by_side"
            "#,
        )
        .unwrap();
        assert_eq!(config.annotation.base_url, "https://curation.example.org");
        assert_eq!(config.annotation.retry.max_attempts, 3);
        assert_eq!(config.annotation.cache_ttl_secs, Some(600));
        assert_eq!(config.annotation.reference_genome, "GRCh37");
        assert_eq!(config.review.current_user, "Ada Lovelace");
        assert_eq!(config.review.genetic_type, GeneticType::Germline);
        assert_eq!(config.history.diff_view, DiffView::SideBySide);
    }

    #[test]
    fn test_annotator_url_override() {
        let mut config = Config::default();
        config.apply_overrides(|key| (key == ANNOTATOR_URL_ENV).then(|| "http://annotator:9000".to_string()));
        assert_eq!(config.annotation.base_url, "http://annotator:9000");

        let mut untouched = Config::default();
        untouched.apply_overrides(|_| Some("  ".to_string()));
        assert_eq!(untouched.annotation.base_url, AnnotationConfig::default().base_url);
    }

    #[test]
    fn test_invalid_diff_view_is_rejected() {
        assert!(Config::from_toml_str("[history]\ndiff_view = \"sideways\"").is_err());
    }
}
