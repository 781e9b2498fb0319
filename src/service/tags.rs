use super::error::FileError;

const MAX_TAG_LEN: usize = 30;

/// Validate and normalize a tag list: lowercase + trim each tag, enforce the
/// per-file count limit and the allowed alphabet, drop duplicates while
/// preserving order.
pub fn validate_and_normalize_tags(
    tags: &[String],
    max_tags: usize,
) -> Result<Vec<String>, FileError> {
    if tags.is_empty() {
        return Ok(Vec::new());
    }

    if tags.len() > max_tags {
        return Err(FileError::InvalidArgument(format!(
            "maximum {max_tags} tags allowed"
        )));
    }

    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if tag.is_empty() {
            return Err(FileError::InvalidArgument(
                "tag cannot be empty after trimming".to_string(),
            ));
        }
        if tag.len() > MAX_TAG_LEN
            || !tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(FileError::InvalidArgument(format!(
                "tag '{tag}' must contain only alphanumeric characters, underscore, or dash \
                 and be 1-{MAX_TAG_LEN} characters long"
            )));
        }
        if !normalized.contains(&tag) {
            normalized.push(tag);
        }
    }

    Ok(normalized)
}

/// Normalize an optional tag filter from a query string. Blank filters are
/// treated as absent.
pub fn normalize_tag_filter(tag: Option<&str>) -> Option<String> {
    tag.map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_whitespace_and_duplicates() {
        let tags = vec![
            "  Rust ".to_string(),
            "rust".to_string(),
            "Backend".to_string(),
        ];
        let normalized = validate_and_normalize_tags(&tags, 5).unwrap();
        assert_eq!(normalized, vec!["rust", "backend"]);
    }

    #[test]
    fn rejects_too_many_tags() {
        let tags: Vec<String> = (0..6).map(|i| format!("tag{i}")).collect();
        assert!(matches!(
            validate_and_normalize_tags(&tags, 5),
            Err(FileError::InvalidArgument(_))
        ));
    }

    #[test]
    fn rejects_empty_and_malformed_tags() {
        assert!(validate_and_normalize_tags(&["   ".to_string()], 5).is_err());
        assert!(validate_and_normalize_tags(&["has space".to_string()], 5).is_err());
        assert!(validate_and_normalize_tags(&["x".repeat(31)], 5).is_err());
        assert!(validate_and_normalize_tags(&["ok_tag-1".to_string()], 5).is_ok());
    }

    #[test]
    fn empty_list_is_valid() {
        assert!(validate_and_normalize_tags(&[], 5).unwrap().is_empty());
    }

    #[test]
    fn blank_filter_is_absent() {
        assert_eq!(normalize_tag_filter(Some("  ")), None);
        assert_eq!(normalize_tag_filter(Some(" Docs ")), Some("docs".to_string()));
        assert_eq!(normalize_tag_filter(None), None);
    }
}
