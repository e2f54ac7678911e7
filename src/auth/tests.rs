use super::*;
use axum::http::HeaderMap;

fn headers_with(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(SUBJECT_HEADER, value.parse().unwrap());
    headers
}

#[test]
fn valid_subject() {
    let result = extract_subject(&headers_with("google-oauth2|1098765"));
    assert_eq!(result, Ok("google-oauth2|1098765".to_string()));
}

#[test]
fn surrounding_whitespace_trimmed() {
    let result = extract_subject(&headers_with("  alice@example.com "));
    assert_eq!(result, Ok("alice@example.com".to_string()));
}

#[test]
fn missing_header() {
    let headers = HeaderMap::new();
    assert_eq!(extract_subject(&headers), Err(SubjectError::Missing));
}

#[test]
fn empty_header() {
    assert_eq!(extract_subject(&headers_with("")), Err(SubjectError::Empty));
    assert_eq!(extract_subject(&headers_with("   ")), Err(SubjectError::Empty));
}

#[test]
fn oversized_subject() {
    let long = "a".repeat(MAX_SUBJECT_LEN + 1);
    assert_eq!(extract_subject(&headers_with(&long)), Err(SubjectError::TooLong));

    let max = "a".repeat(MAX_SUBJECT_LEN);
    assert!(extract_subject(&headers_with(&max)).is_ok());
}

#[test]
fn control_characters_rejected() {
    assert_eq!(parse_subject("ali\tce"), Err(SubjectError::InvalidFormat));
}

#[test]
fn role_claims_ignored() {
    let mut headers = headers_with("bob");
    headers.insert("x-authenticated-roles", "staff,admin".parse().unwrap());
    assert_eq!(extract_subject(&headers), Ok("bob".to_string()));
}

#[test]
fn error_messages() {
    assert_eq!(
        SubjectError::Missing.to_string(),
        "Authenticated subject not provided"
    );
    assert!(SubjectError::TooLong.to_string().contains("256"));
}
