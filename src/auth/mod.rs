//! Subject identity supplied by the upstream identity provider.
//!
//! credvault does not authenticate users. A fronting proxy authenticates the
//! caller and forwards the stable subject identifier in
//! [`SUBJECT_HEADER`]; the proxy must strip any client-supplied copy of it.
//! Role claims the proxy may forward are ignored here.

use axum::http::HeaderMap;

#[cfg(test)]
mod tests;

/// Header carrying the authenticated subject identifier
pub const SUBJECT_HEADER: &str = "x-authenticated-subject";

/// Longest subject identifier accepted
pub const MAX_SUBJECT_LEN: usize = 256;

/// Extract the subject identifier from request headers
pub fn extract_subject(headers: &HeaderMap) -> Result<String, SubjectError> {
    let value = headers
        .get(SUBJECT_HEADER)
        .ok_or(SubjectError::Missing)?
        .to_str()
        .map_err(|_| SubjectError::InvalidFormat)?;

    parse_subject(value)
}

/// Validate a raw subject value
fn parse_subject(value: &str) -> Result<String, SubjectError> {
    let subject = value.trim();

    if subject.is_empty() {
        return Err(SubjectError::Empty);
    }
    if subject.len() > MAX_SUBJECT_LEN {
        return Err(SubjectError::TooLong);
    }
    if subject.chars().any(|c| c.is_control()) {
        return Err(SubjectError::InvalidFormat);
    }

    Ok(subject.to_string())
}

/// Subject extraction errors
#[derive(Debug, PartialEq, Clone)]
pub enum SubjectError {
    /// Subject header not present
    Missing,
    /// Not visible ASCII / contains control characters
    InvalidFormat,
    /// Header present but blank
    Empty,
    /// Longer than `MAX_SUBJECT_LEN`
    TooLong,
}

impl std::fmt::Display for SubjectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubjectError::Missing => write!(f, "Authenticated subject not provided"),
            SubjectError::InvalidFormat => write!(f, "Invalid subject identifier format"),
            SubjectError::Empty => write!(f, "Subject identifier is empty"),
            SubjectError::TooLong => write!(f, "Subject identifier exceeds {} bytes", MAX_SUBJECT_LEN),
        }
    }
}

impl std::error::Error for SubjectError {}
