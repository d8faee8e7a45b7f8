//! Wire DTOs for the token endpoint

use aliri_clock::DurationSecs;
use serde::{Deserialize, Serialize};

use crate::{AccessToken, ClientIdRef, IdToken, RefreshToken, RefreshTokenRef};

#[derive(Debug, Serialize)]
pub(super) struct RefreshGrantForm<'a> {
    pub grant_type: &'static str,
    pub client_id: &'a ClientIdRef,
    pub refresh_token: &'a RefreshTokenRef,
}

#[derive(Debug, Deserialize)]
pub(super) struct TokenResponse {
    pub access_token: AccessToken,
    #[serde(default)]
    pub id_token: Option<IdToken>,
    #[serde(default)]
    pub refresh_token: Option<RefreshToken>,
    #[serde(default)]
    pub expires_in: Option<DurationSecs>,
}
