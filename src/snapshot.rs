use aliri_clock::{DurationSecs, UnixTime};
use serde::{Deserialize, Serialize};

use crate::engine::TokenGrant;
use crate::error::OAuthApiError;
use crate::{AccessToken, AccessTokenRef, IdToken, IdTokenRef, RefreshToken, RefreshTokenRef};

/// The authorization state at a point in time
///
/// Snapshots are immutable; every state change replaces the whole value.
/// A snapshot with no access token is unauthenticated. The refresh token,
/// when present, was issued by the same grant as the access token; tokens
/// from different grants are never mixed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSnapshot {
    access_token: Option<AccessToken>,
    refresh_token: Option<RefreshToken>,
    id_token: Option<IdToken>,
    expiry: Option<UnixTime>,
    last_error: Option<OAuthApiError>,
    needs_refresh: bool,
}

/// A token's lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenStatus {
    /// The access token may be presented as-is
    Fresh,
    /// The access token must be refreshed before use
    Stale,
}

impl TokenSnapshot {
    /// Builds a snapshot from a newly issued grant
    pub fn from_grant(grant: TokenGrant, issued: UnixTime) -> Self {
        Self {
            expiry: grant.expires_in.map(|lifetime| issued + lifetime),
            access_token: Some(grant.access_token),
            refresh_token: grant.refresh_token,
            id_token: grant.id_token,
            last_error: None,
            needs_refresh: false,
        }
    }

    /// Builds the successor snapshot after a refresh exchange
    ///
    /// Adopts a rotated refresh token when the authority issued one,
    /// otherwise carries the prior refresh token forward; both belong to
    /// the same grant. Clears any recorded error and the forced-refresh
    /// flag.
    pub fn refreshed_with(&self, grant: TokenGrant, issued: UnixTime) -> Self {
        Self {
            expiry: grant.expires_in.map(|lifetime| issued + lifetime),
            access_token: Some(grant.access_token),
            refresh_token: grant.refresh_token.or_else(|| self.refresh_token.clone()),
            id_token: grant.id_token.or_else(|| self.id_token.clone()),
            last_error: None,
            needs_refresh: false,
        }
    }

    /// A copy with the forced-refresh flag set
    ///
    /// The refresh token is left untouched; the next authenticated call
    /// performs the actual exchange.
    pub fn needing_refresh(&self) -> Self {
        Self {
            needs_refresh: true,
            ..self.clone()
        }
    }

    /// A copy recording an authorization-level error
    pub fn with_error(&self, error: OAuthApiError) -> Self {
        Self {
            last_error: Some(error),
            ..self.clone()
        }
    }

    /// The terminal snapshot for a dead grant
    ///
    /// Drops all token material, keeping only the error that killed the
    /// grant for later inspection.
    pub fn invalidated(error: OAuthApiError) -> Self {
        Self {
            access_token: None,
            refresh_token: None,
            id_token: None,
            expiry: None,
            last_error: Some(error),
            needs_refresh: false,
        }
    }

    /// Gets the current access token, if any
    #[inline]
    pub fn access_token(&self) -> Option<&AccessTokenRef> {
        self.access_token.as_deref()
    }

    /// Gets the current refresh token, if any
    #[inline]
    pub fn refresh_token(&self) -> Option<&RefreshTokenRef> {
        self.refresh_token.as_deref()
    }

    /// Gets the current ID token, if any
    #[inline]
    pub fn id_token(&self) -> Option<&IdTokenRef> {
        self.id_token.as_deref()
    }

    /// Gets the time after which the access token is stale, if known
    #[inline]
    pub fn expiry(&self) -> Option<UnixTime> {
        self.expiry
    }

    /// Gets the last authorization-level error observed, if any
    #[inline]
    pub fn last_error(&self) -> Option<&OAuthApiError> {
        self.last_error.as_ref()
    }

    /// Whether the next authenticated call must refresh regardless of
    /// expiry
    #[inline]
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh
    }

    /// Whether the snapshot holds an access token
    ///
    /// Does not consider expiry; a stale-but-held token still counts.
    #[inline]
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    /// Gets the token's lifecycle status as of the provided time
    ///
    /// A snapshot with no recorded expiry is considered fresh; staleness
    /// cannot be determined for it, and the authority will reject the
    /// token if it has in fact lapsed.
    pub fn status_at(&self, time: UnixTime, policy: &ExpiryPolicy) -> TokenStatus {
        if self.needs_refresh {
            return TokenStatus::Stale;
        }
        match self.expiry {
            Some(expiry) if time + policy.refresh_leeway >= expiry => TokenStatus::Stale,
            _ => TokenStatus::Fresh,
        }
    }
}

/// Configuration for when an access token is considered stale
///
/// A token is treated as stale slightly before its recorded expiry so
/// that in-flight requests do not present a token that lapses mid-call.
#[derive(Clone, Debug)]
pub struct ExpiryPolicy {
    refresh_leeway: DurationSecs,
}

impl Default for ExpiryPolicy {
    /// Default policy
    ///
    /// Uses a refresh leeway of 60 seconds.
    fn default() -> Self {
        Self {
            refresh_leeway: DurationSecs(60),
        }
    }
}

impl ExpiryPolicy {
    /// Constructs a policy with the given refresh leeway
    pub fn new(refresh_leeway: DurationSecs) -> Self {
        Self { refresh_leeway }
    }
}
