//! Candidate term expansion for literature lookups.

/// Generate naive singular/plural variants of a term.
///
/// The term itself always comes first so the user's spelling is tried
/// before any derived form. Variants are deduplicated and never empty.
pub fn term_variants(term: &str) -> Vec<String> {
    let mut variants = vec![term.to_string()];

    if let Some(stem) = term.strip_suffix("ies") {
        // berries -> berry
        variants.push(format!("{}y", stem));
    } else if let Some(stem) = term.strip_suffix('s') {
        variants.push(stem.to_string());
    } else if let Some(stem) = term.strip_suffix('y') {
        // berry -> berries
        variants.push(format!("{}ies", stem));
    } else {
        variants.push(format!("{}s", term));
    }

    variants.retain(|v| !v.is_empty());
    variants.dedup();
    variants
}
