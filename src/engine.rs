//! The seam to the external OIDC protocol engine
//!
//! The session manager drives everything protocol-shaped through
//! [`OidcEngine`]: provider discovery, the interactive authorization-code
//! flow, and the refresh-token exchange. The [`http`] module provides a
//! production implementation of the non-interactive operations; tests
//! substitute stubs.

use aliri_clock::DurationSecs;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::config::Configuration;
use crate::error::{BoxError, OAuthApiError};
use crate::{AccessToken, IdToken, RefreshToken, RefreshTokenRef};

#[cfg(feature = "http")]
mod dto;
#[cfg(feature = "http")]
pub mod http;

/// Provider metadata obtained from the discovery document
///
/// Only the endpoints this crate consumes are retained; the discovery
/// document itself carries far more.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// The provider's issuer identifier
    pub issuer: Url,

    /// Where the interactive authorization request is sent
    pub authorization_endpoint: Url,

    /// Where codes and refresh tokens are exchanged for tokens
    pub token_endpoint: Url,

    /// Where user claims can be fetched, if the provider declares it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<Url>,

    /// Where tokens can be revoked, if the provider declares it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint: Option<Url>,
}

/// The tokens issued by a single authorization or refresh grant
#[derive(Clone, Debug)]
pub struct TokenGrant {
    /// The issued access token
    pub access_token: AccessToken,

    /// The issued identity assertion, if any
    pub id_token: Option<IdToken>,

    /// The issued refresh token, if any
    pub refresh_token: Option<RefreshToken>,

    /// The access token's lifetime, if reported
    pub expires_in: Option<DurationSecs>,
}

/// An error while interacting with the authority
#[derive(Debug, Error)]
pub enum EngineError {
    /// The user abandoned the interactive flow
    #[error("authorization flow was canceled")]
    Canceled,

    /// The authority answered with an OAuth2 error document
    #[error("authority rejected the request: {0}")]
    Rejected(OAuthApiError),

    /// The request could not be delivered at all
    #[error("error sending request to authority")]
    Transport(#[source] BoxError),

    /// The authority's response could not be decoded
    #[error("error decoding authority response")]
    Decode(#[from] serde_json::Error),

    /// The authority answered with an unexpected status and a body that
    /// was not an OAuth2 error document
    #[error("unexpected status {status} from authority")]
    Status {
        /// The response status code
        status: u16,
        /// The raw response body
        body: String,
    },
}

/// An asynchronous OIDC protocol engine
///
/// Implementations own all wire-level protocol work; the session manager
/// only sequences calls and owns the resulting state.
#[async_trait]
pub trait OidcEngine: Send + Sync {
    /// Retrieves the provider's metadata for the given issuer
    async fn discover(&self, issuer: &Url) -> Result<ProviderConfig, EngineError>;

    /// Runs the authorization-code flow, collecting user credentials
    /// through whatever user-facing machinery the implementation wires in
    async fn authorize(
        &self,
        provider: &ProviderConfig,
        config: &Configuration,
    ) -> Result<TokenGrant, EngineError>;

    /// Exchanges a refresh token for a fresh set of tokens
    async fn exchange_refresh_token(
        &self,
        provider: &ProviderConfig,
        refresh_token: &RefreshTokenRef,
    ) -> Result<TokenGrant, EngineError>;
}
