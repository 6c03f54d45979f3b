//! Reading the expiry of an access token.
//!
//! Tokens are JWTs issued by the platform. The client never verifies their
//! signature; it only looks at `exp` to estimate freshness. The server stays
//! the authority on whether a token is accepted.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClaimsError {
    #[error("Token is empty")]
    Empty,

    #[error("Token has {0} segments, expected 3")]
    Segments(usize),

    #[error("Token payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Token payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Claims the client cares about.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AccessClaims {
    /// Expiry, seconds since the Unix epoch.
    #[serde(default, deserialize_with = "deserialize_numeric_date")]
    pub exp: Option<i64>,
}

/// `exp` is a JSON number; accept integers and floats, ignore anything else.
fn deserialize_numeric_date<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        _ => None,
    }))
}

impl AccessClaims {
    /// Decode the payload segment of `token` without checking its signature.
    pub fn decode_unverified(token: &str) -> Result<Self, ClaimsError> {
        if token.is_empty() {
            return Err(ClaimsError::Empty);
        }
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(ClaimsError::Segments(parts.len()));
        }
        // Some issuers pad their segments
        let payload = URL_SAFE_NO_PAD.decode(parts[1].trim_end_matches('='))?;
        Ok(serde_json::from_slice(&payload)?)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }

    /// Whether the token expires at or before `now + margin`.
    ///
    /// A token without an `exp` claim returns `None`.
    pub fn expires_within(&self, margin: Duration, now: DateTime<Utc>) -> Option<bool> {
        self.exp.map(|exp| exp <= (now + margin).timestamp())
    }
}
