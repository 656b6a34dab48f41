//! Request extractors
//!
//! Identifiers travel as 11-character base64url strings. A path segment
//! that does not decode cannot name anything that exists, so it is
//! rejected as not found.

use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;
use serde::Deserialize;
use std::time::Duration;

use crate::errors::{AppError, ErrorKind};
use crate::utils::ids;

/// Album id from the `{album}` path segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlbumId(pub u64);

impl<S> FromRequestParts<S> for AlbumId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::new(ErrorKind::AlbumNotFound, e.body_text()))?;
        ids::decode(&raw)
            .map(AlbumId)
            .ok_or_else(|| AppError::new(ErrorKind::AlbumNotFound, format!("malformed album id {raw}")))
    }
}

/// Token from the `{token}` path segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token(pub u64);

impl<S> FromRequestParts<S> for Token
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::new(ErrorKind::TokenNotFound, e.body_text()))?;
        decode_token(&raw).map(Token)
    }
}

pub fn decode_token(raw: &str) -> Result<u64, AppError> {
    ids::decode(raw)
        .ok_or_else(|| AppError::new(ErrorKind::TokenNotFound, format!("malformed token {raw}")))
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteToken {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteImages {
    pub img_from: VoteToken,
    pub img_to: VoteToken,
}

/// `{"album":{"imgFrom":{"token":…},"imgTo":{"token":…}}}`
#[derive(Debug, Clone, Deserialize)]
pub struct VoteRequest {
    pub album: VoteImages,
}

/// Album lifetime from the upload form. `"0"` disables expiry.
pub fn parse_lifetime(raw: Option<&str>) -> Result<Duration, AppError> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty());
    let Some(raw) = raw else {
        return Err(ErrorKind::DurationNotSet.into());
    };
    if raw == "0" {
        return Ok(Duration::ZERO);
    }
    humantime::parse_duration(raw)
        .map_err(|e| AppError::new(ErrorKind::DurationInvalid, format!("{raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1h", Duration::from_secs(3600))]
    #[case(" 90s ", Duration::from_secs(90))]
    #[case("1h 30m", Duration::from_secs(5400))]
    #[case("0", Duration::ZERO)]
    fn test_parse_lifetime(#[case] raw: &str, #[case] expected: Duration) {
        assert_eq!(parse_lifetime(Some(raw)).unwrap(), expected);
    }

    #[rstest]
    #[case(None, ErrorKind::DurationNotSet)]
    #[case(Some(""), ErrorKind::DurationNotSet)]
    #[case(Some("forever"), ErrorKind::DurationInvalid)]
    #[case(Some("-5m"), ErrorKind::DurationInvalid)]
    fn test_parse_lifetime_rejects(#[case] raw: Option<&str>, #[case] kind: ErrorKind) {
        assert!(parse_lifetime(raw).unwrap_err().is(kind));
    }

    #[test]
    fn test_vote_request_shape() {
        let body = r#"{"album":{"imgFrom":{"token":"AQAAAAAAAAA"},"imgTo":{"token":"AgAAAAAAAAA"}}}"#;
        let request: VoteRequest = serde_json::from_str(body).unwrap();
        assert_eq!(decode_token(&request.album.img_from.token).unwrap(), 1);
        assert_eq!(decode_token(&request.album.img_to.token).unwrap(), 2);
        assert!(decode_token("nope").unwrap_err().is(ErrorKind::TokenNotFound));
    }
}
