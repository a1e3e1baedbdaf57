//! Domain ID generation
//!
//! All IDs use the format: `{8-char-hex}-{type}-{slug}`
//! Example: `3f9a01c2-plan-reschedule-sarah-johnson`

use tracing::debug;

/// Maximum slug length kept in an ID
const MAX_SLUG_LEN: usize = 40;

/// Generate a domain ID from type and title
///
/// The hex prefix comes from the random tail of a v7 UUID so that two IDs
/// generated in the same millisecond for the same title still differ.
pub fn generate_id(domain_type: &str, title: &str) -> String {
    let uuid = uuid::Uuid::now_v7().simple().to_string();
    let hex_prefix = &uuid[uuid.len() - 8..];
    let slug = slugify(title);
    debug!(%domain_type, %slug, "generate_id: called");
    if slug.is_empty() {
        format!("{}-{}", hex_prefix, domain_type)
    } else {
        format!("{}-{}-{}", hex_prefix, domain_type, slug)
    }
}

/// Slugify a title for use in IDs
pub fn slugify(title: &str) -> String {
    let slug = title
        .to_lowercase()
        .chars()
        // Strip apostrophes entirely, replace other non-alphanumeric with hyphens
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c)
            } else if c == '\'' || c == '\u{2019}' || c == '\u{2018}' {
                None
            } else {
                Some('-')
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    let truncated: String = slug.chars().take(MAX_SLUG_LEN).collect();
    truncated.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_format() {
        let id = generate_id("plan", "Reschedule Sarah");
        let parts: Vec<&str> = id.splitn(3, '-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 8);
        assert_eq!(parts[1], "plan");
        assert_eq!(parts[2], "reschedule-sarah");
    }

    #[test]
    fn test_generate_id_unique_for_same_title() {
        let a = generate_id("step", "Notify patient");
        let b = generate_id("step", "Notify patient");
        assert_ne!(a, b);
    }

    #[test]
    fn test_generate_id_empty_title() {
        let id = generate_id("msg", "!!!");
        assert!(id.ends_with("-msg"));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Move Sarah's visit"), "move-sarahs-visit");
        assert_eq!(slugify("  Thu 2:30pm  "), "thu-2-30pm");
        assert!(slugify(&"word ".repeat(30)).len() <= MAX_SLUG_LEN);
        assert!(!slugify(&"ab ".repeat(30)).ends_with('-'));
    }
}
