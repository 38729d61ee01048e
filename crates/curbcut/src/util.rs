use std::path::Path;

/// Format a millisecond duration as a short human-readable string, e.g. `742ms`, `3.4s`,
/// `2m 05s`, `1h 02m`.
pub fn format_duration(ms: u64) -> String {
    if ms < 1_000 {
        format!("{ms}ms")
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else if ms < 3_600_000 {
        format!("{}m {:02}s", ms / 60_000, (ms % 60_000) / 1000)
    } else {
        format!("{}h {:02}m", ms / 3_600_000, (ms % 3_600_000) / 60_000)
    }
}

/// Collapse every run of non-alphanumeric characters into a single hyphen, trim leading and
/// trailing hyphens, and lowercase the result. May return an empty string.
pub fn sanitize_slug(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_hyphen = false;
    for ch in input.chars() {
        if ch.is_alphanumeric() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    out
}

/// Sanitize a page key into an output file stem: strip any protocol prefix, then slugify.
///
/// The result may be empty (e.g. an all-punctuation key); callers are responsible for the
/// generic fallback name in that case.
pub fn sanitize_page_key(page_key: &str) -> String {
    let without_protocol = page_key
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(page_key);
    sanitize_slug(without_protocol)
}

/// Derive a test's group key: its source path relative to the run root, with forward slashes.
pub fn relative_group_key(root: &Path, file: &Path) -> String {
    file.strip_prefix(root)
        .unwrap_or(file)
        .to_string_lossy()
        .replace('\\', "/")
}
