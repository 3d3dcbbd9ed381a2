//! Name normalization for session names, branches and batch ids.

/// Maximum length of a generated slug
pub const MAX_SLUG_LEN: usize = 50;

/// Lowercase, replace every non-alphanumeric run with one hyphen, trim the
/// edges and cap the length. Applying it twice yields the same string.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for c in input.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    slug.truncate(MAX_SLUG_LEN);
    slug.trim_end_matches('-').to_string()
}

/// Slug of `input`, or `fallback` when nothing alphanumeric survives
pub fn slug_or(input: &str, fallback: &str) -> String {
    let slug = slugify(input);
    if slug.is_empty() {
        fallback.to_string()
    } else {
        slug
    }
}

/// Restrict an identifier to `[A-Za-z0-9-]`, preserving case.
///
/// Batch ids and workspace ids use this alphabet so that `_` stays free to
/// act as the multiplexer name separator.
pub fn sanitize_id(input: &str) -> String {
    let mut id = String::with_capacity(input.len());
    let mut pending_dash = false;

    for c in input.trim().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !id.is_empty() {
                id.push('-');
            }
            pending_dash = false;
            id.push(c);
        } else {
            pending_dash = true;
        }
    }

    id
}

/// True if `id` already belongs to the workspace-id alphabet
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && sanitize_id(id) == id
}
