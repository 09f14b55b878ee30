//! Query normalization and exact-match key derivation

use sha2::{Digest, Sha256};

use crate::domain::DomainError;

const MAX_QUERY_TYPE_LEN: usize = 64;
const KEY_SEPARATOR: char = '\u{1f}';

/// Normalize query text for hashing
///
/// Trims, collapses whitespace runs and lowercases. The stored query text is
/// never rewritten, only the hash input.
pub fn normalize_query(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Stable hex-encoded SHA-256 of `(query_type, normalize(query_text))`
pub fn query_hash(query_type: &str, query_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query_type.as_bytes());
    hasher.update(KEY_SEPARATOR.to_string().as_bytes());
    hasher.update(normalize_query(query_text).as_bytes());

    hex::encode(hasher.finalize())
}

/// Validate a query type tag
///
/// Query types partition the cache namespace, so they must be short, stable
/// identifiers: lowercase ASCII alphanumerics plus `_`, `-` and `.`.
pub fn validate_query_type(query_type: &str) -> Result<(), DomainError> {
    if query_type.is_empty() {
        return Err(DomainError::validation("Query type cannot be empty"));
    }

    if query_type.len() > MAX_QUERY_TYPE_LEN {
        return Err(DomainError::validation(format!(
            "Query type cannot exceed {} characters",
            MAX_QUERY_TYPE_LEN
        )));
    }

    let valid = query_type
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-' | '.'));

    if !valid {
        return Err(DomainError::validation(format!(
            "Query type '{}' may only contain lowercase letters, digits, '_', '-' and '.'",
            query_type
        )));
    }

    Ok(())
}
