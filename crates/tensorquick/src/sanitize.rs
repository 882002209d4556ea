//! Helpers for turning user input into safe file names and log fields.
//!
//! Prompts end up in output file names, endpoint URLs end up in logs. These
//! functions keep both predictable.

/// Maximum length of a prompt-derived file name stem.
const MAX_SLUG_LENGTH: usize = 48;

/// Lowercases and collapses every run of non-alphanumeric characters into a
/// single `-`, trimmed to a bounded length.
///
/// - `"A plum, on a table!"` → `"a-plum-on-a-table"`
/// - `"   "` → `"image"`
pub fn slugify(value: &str) -> String {
    let slug = value
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    let slug: String = slug.chars().take(MAX_SLUG_LENGTH).collect();
    let slug = slug.trim_end_matches('-').to_string();

    if slug.is_empty() {
        "image".to_string()
    } else {
        slug
    }
}

/// Strips userinfo and query strings from an endpoint URL.
///
/// - `https://key@x.modal.run/predict?token=abc` → `https://****@x.modal.run/predict`
/// - `https://x.modal.run/predict` → `https://x.modal.run/predict` (no change)
pub fn redact_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);

    if let Some(scheme_end) = without_query.find("://") {
        let after_scheme = &without_query[scheme_end + 3..];
        let authority_end = after_scheme.find('/').unwrap_or(after_scheme.len());
        if let Some(at_pos) = after_scheme[..authority_end].find('@') {
            let scheme = &without_query[..scheme_end + 3];
            let after_at = &after_scheme[at_pos + 1..];
            return format!("{}****@{}", scheme, after_at);
        }
    }

    without_query.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_prompt() {
        assert_eq!(slugify("A plum, on a table!"), "a-plum-on-a-table");
        assert_eq!(slugify("  Multiple   Spaces  "), "multiple-spaces");
        assert_eq!(slugify("Already-slugified"), "already-slugified");
    }

    #[test]
    fn test_slugify_empty_falls_back() {
        assert_eq!(slugify(""), "image");
        assert_eq!(slugify("!!!"), "image");
    }

    #[test]
    fn test_slugify_is_bounded() {
        let long = "word ".repeat(40);
        let slug = slugify(&long);
        assert!(slug.chars().count() <= MAX_SLUG_LENGTH);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn test_redact_url_with_userinfo() {
        assert_eq!(
            redact_url("https://key@x.modal.run/predict"),
            "https://****@x.modal.run/predict"
        );
    }

    #[test]
    fn test_redact_url_strips_query() {
        assert_eq!(
            redact_url("https://x.modal.run/predict?token=abc"),
            "https://x.modal.run/predict"
        );
    }

    #[test]
    fn test_redact_url_plain() {
        assert_eq!(
            redact_url("https://x.modal.run/predict"),
            "https://x.modal.run/predict"
        );
    }
}
