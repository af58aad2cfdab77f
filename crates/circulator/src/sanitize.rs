//! Helpers for sanitizing data before it enters tracing span attributes.
//!
//! Logs end up in shared aggregation, so student addresses, upload paths and
//! database credentials are reduced before they are recorded.

use std::path::Path;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Strips userinfo (user and password) from a connection URL.
///
/// - `postgres://admin:secret@db:5432/univ` → `postgres://****@db:5432/univ`
/// - `sqlite::memory:` → unchanged
pub fn redact_url(url: &str) -> String {
    if let Some(scheme_end) = url.find("://") {
        let after_scheme = &url[scheme_end + 3..];
        let authority_end = after_scheme.find('/').unwrap_or(after_scheme.len());
        if let Some(at_pos) = after_scheme[..authority_end].rfind('@') {
            let scheme = &url[..scheme_end + 3];
            let after_at = &after_scheme[at_pos + 1..];
            return format!("{}****@{}", scheme, after_at);
        }
    }

    url.to_string()
}

/// Masks the local part of an email address, keeping its first character.
///
/// `alice@univ.edu` → `a****@univ.edu`
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let first = local.chars().next().map(String::from).unwrap_or_default();
            format!("{}****@{}", first, domain)
        }
        None => "****".to_string(),
    }
}
