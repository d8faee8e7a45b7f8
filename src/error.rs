//! The error taxonomy surfaced by session and executor operations

use serde::{Deserialize, Serialize};
use std::{error, fmt};
use thiserror::Error;

/// A boxed error source
pub type BoxError = Box<dyn error::Error + Send + Sync + 'static>;

/// An OAuth2-shaped error document, as returned by the authorization
/// server or by a resource server alongside a 401
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthApiError {
    /// The error code, e.g. `invalid_token` or `invalid_grant`
    pub error: String,

    /// Human-readable detail accompanying the code, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl OAuthApiError {
    /// Constructs an error document bearing only a code
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            error_description: None,
        }
    }

    /// Whether this error indicates the underlying grant is dead
    ///
    /// A dead grant means the refresh token itself has been rejected, so
    /// no amount of refreshing will recover the session.
    pub fn invalidates_grant(&self) -> bool {
        self.error == "invalid_grant"
    }
}

impl fmt::Display for OAuthApiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.error)?;
        if let Some(description) = &self.error_description {
            write!(f, ": {}", description)?;
        }
        Ok(())
    }
}

impl error::Error for OAuthApiError {}

/// A failure of a session or authenticated-request operation
///
/// Every failure is surfaced as a typed result; none of these are fatal
/// to the process. Enough context (status code, raw body, source chain)
/// is preserved for callers to render each variant distinctly.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No session is held, or the held session cannot satisfy the request
    #[error("not authenticated")]
    NotAuthenticated,

    /// The provider rejected the token presented with the request
    #[error("authorization rejected: {0}")]
    Authorization(OAuthApiError),

    /// No response was received at all
    #[error("transport failure")]
    Transport(#[source] BoxError),

    /// A response arrived with an unexpected status
    #[error("unexpected HTTP status {status}")]
    Http {
        /// The response status code
        status: u16,
        /// The raw response body
        body: String,
    },

    /// A success response carried a body that could not be decoded
    #[error("malformed response body")]
    MalformedResponse(#[source] serde_json::Error),

    /// The provider's metadata could not be retrieved
    #[error("provider discovery failed")]
    Discovery(#[source] BoxError),

    /// The authorization flow itself failed or was canceled by the user
    #[error("authorization flow failed")]
    Provider(#[source] BoxError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_grant_invalidates() {
        assert!(OAuthApiError::new("invalid_grant").invalidates_grant());
        assert!(!OAuthApiError::new("invalid_token").invalidates_grant());
    }

    #[test]
    fn display_includes_description_when_present() {
        let bare = OAuthApiError::new("invalid_token");
        assert_eq!(bare.to_string(), "invalid_token");

        let described = OAuthApiError {
            error: "invalid_token".to_owned(),
            error_description: Some("expired".to_owned()),
        };
        assert_eq!(described.to_string(), "invalid_token: expired");
    }

    #[test]
    fn error_body_round_trips() {
        let doc: OAuthApiError = serde_json::from_str(r#"{"error":"invalid_token"}"#).unwrap();
        assert_eq!(doc, OAuthApiError::new("invalid_token"));
        let json = serde_json::to_string(&doc).unwrap();
        assert_eq!(json, r#"{"error":"invalid_token"}"#);
    }
}
