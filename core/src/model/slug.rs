//! Slug normalization shared by workspaces and sandboxes.
//!
//! Grounded on the teacher's `workspace::model::slugify`/`normalize_slug`
//! pair; extended with the length bound spec.md §3 requires (3-63 chars).

/// Lossy slugify: always returns a usable slug, falling back to `fallback`
/// when the input collapses to nothing.
pub fn slugify(input: &str, fallback: &str) -> String {
    normalize_slug(input).unwrap_or_else(|| fallback.to_string())
}

/// Strict normalize: `None` if the input collapses to nothing once
/// lowercased and non-alphanumeric runs are folded to single dashes.
pub fn normalize_slug(input: &str) -> Option<String> {
    let mut slug = String::with_capacity(input.len());
    let mut last_was_dash = false;

    for ch in input.chars().flat_map(|c| c.to_lowercase()) {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_was_dash = false;
        } else if !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }

    let trimmed = slug.trim_matches('-');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_whitespace_and_case() {
        assert_eq!(normalize_slug(" Acme Corp "), Some("acme-corp".to_string()));
    }

    #[test]
    fn collapses_repeated_separators() {
        assert_eq!(normalize_slug("ACME___CORP"), Some("acme-corp".to_string()));
    }

    #[test]
    fn empty_input_yields_none() {
        assert_eq!(normalize_slug("---"), None);
        assert_eq!(normalize_slug(""), None);
    }

    #[test]
    fn slugify_falls_back() {
        assert_eq!(slugify("", "workspace"), "workspace");
        assert_eq!(slugify("Acme", "workspace"), "acme");
    }
}
