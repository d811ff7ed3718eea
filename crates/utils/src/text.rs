//! Small string helpers shared by storage and API layers.

use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]").expect("static regex is valid"));

/// Replace every character outside `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_filename(name: &str) -> String {
    let trimmed = name.trim();
    let base = trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed);
    let sanitized = UNSAFE_FILENAME_CHARS.replace_all(base, "_").into_owned();
    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        "file".to_string()
    } else {
        sanitized
    }
}

/// Short random token used to keep blob keys unique.
pub fn random_token() -> String {
    let mut token = Uuid::new_v4().simple().to_string();
    token.truncate(12);
    token
}

/// Count characters rather than bytes so accented titles are measured correctly.
pub fn char_len(value: &str) -> usize {
    value.chars().count()
}
