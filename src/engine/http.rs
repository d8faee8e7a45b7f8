//! A `reqwest`-backed engine for the non-interactive protocol operations
//!
//! Discovery and the refresh-token exchange are plain HTTP; the
//! interactive authorization step needs a user agent and is delegated to
//! a pluggable [`AuthorizationFlow`].

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use super::dto;
use super::{EngineError, OidcEngine, ProviderConfig, TokenGrant};
use crate::config::Configuration;
use crate::error::OAuthApiError;
use crate::{ClientId, RefreshTokenRef};

/// The user-facing half of the authorization-code flow
///
/// Implementations open a browser or web view, collect credentials, and
/// complete the code exchange. Headless deployments and tests plug in
/// [`NullAuthorizationFlow`] or a stub.
#[async_trait]
pub trait AuthorizationFlow: Send + Sync {
    /// Drives the interactive flow to completion
    async fn authorize(
        &self,
        provider: &ProviderConfig,
        config: &Configuration,
    ) -> Result<TokenGrant, EngineError>;
}

/// An authorization flow for deployments with no user agent
///
/// Always reports cancellation; sessions must be established elsewhere
/// and restored from persisted state.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullAuthorizationFlow;

#[async_trait]
impl AuthorizationFlow for NullAuthorizationFlow {
    async fn authorize(
        &self,
        _provider: &ProviderConfig,
        _config: &Configuration,
    ) -> Result<TokenGrant, EngineError> {
        Err(EngineError::Canceled)
    }
}

#[derive(Debug, Error)]
#[error("issuer URL cannot serve as a base for the discovery document")]
struct IssuerNotABase;

/// An OIDC engine that talks to the provider over HTTP
#[derive(Debug)]
pub struct HttpOidcEngine<F = NullAuthorizationFlow> {
    client: reqwest::Client,
    client_id: ClientId,
    flow: F,
}

impl<F> HttpOidcEngine<F> {
    /// Constructs an engine from an existing HTTP client
    ///
    /// The caller is responsible for configuring a request timeout on
    /// the client.
    pub fn new(client: reqwest::Client, client_id: ClientId, flow: F) -> Self {
        Self {
            client,
            client_id,
            flow,
        }
    }
}

fn transport(error: reqwest::Error) -> EngineError {
    EngineError::Transport(Box::new(error))
}

fn discovery_url(issuer: &Url) -> Result<Url, EngineError> {
    let mut url = issuer.clone();
    url.path_segments_mut()
        .map_err(|_| EngineError::Transport(Box::new(IssuerNotABase)))?
        .pop_if_empty()
        .extend(&[".well-known", "openid-configuration"]);
    Ok(url)
}

#[async_trait]
impl<F: AuthorizationFlow> OidcEngine for HttpOidcEngine<F> {
    #[tracing::instrument(skip_all, fields(issuer = %issuer))]
    async fn discover(&self, issuer: &Url) -> Result<ProviderConfig, EngineError> {
        let url = discovery_url(issuer)?;
        tracing::trace!(url = %url, "requesting discovery document");

        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();

        tracing::debug!(
            response.status = status.as_u16(),
            "received discovery response"
        );

        let body = response.bytes().await.map_err(transport)?;
        if !status.is_success() {
            return Err(EngineError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let provider: ProviderConfig = serde_json::from_slice(&body)?;
        tracing::info!(issuer = %provider.issuer, "retrieved provider configuration");
        Ok(provider)
    }

    async fn authorize(
        &self,
        provider: &ProviderConfig,
        config: &Configuration,
    ) -> Result<TokenGrant, EngineError> {
        self.flow.authorize(provider, config).await
    }

    #[tracing::instrument(
        skip_all,
        fields(
            token_url = %provider.token_endpoint,
            grant_type = "refresh_token",
            client_id = %self.client_id,
        ),
    )]
    async fn exchange_refresh_token(
        &self,
        provider: &ProviderConfig,
        refresh_token: &RefreshTokenRef,
    ) -> Result<TokenGrant, EngineError> {
        tracing::trace!("requesting token from authority");

        let form = dto::RefreshGrantForm {
            grant_type: "refresh_token",
            client_id: &self.client_id,
            refresh_token,
        };

        let response = self
            .client
            .post(provider.token_endpoint.clone())
            .form(&form)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();

        tracing::debug!(
            response.status = status.as_u16(),
            "received token response from issuing authority"
        );

        let body = response.bytes().await.map_err(transport)?;
        if !status.is_success() {
            return Err(match serde_json::from_slice::<OAuthApiError>(&body) {
                Ok(document) => EngineError::Rejected(document),
                Err(_) => EngineError::Status {
                    status: status.as_u16(),
                    body: String::from_utf8_lossy(&body).into_owned(),
                },
            });
        }

        let response: dto::TokenResponse = serde_json::from_slice(&body)?;

        tracing::info!(
            has_id_token = response.id_token.is_some(),
            has_refresh_token = response.refresh_token.is_some(),
            "received new tokens"
        );

        Ok(TokenGrant {
            access_token: response.access_token,
            id_token: response.id_token,
            refresh_token: response.refresh_token,
            expires_in: response.expires_in,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn engine() -> HttpOidcEngine {
        HttpOidcEngine::new(
            reqwest::Client::new(),
            ClientId::from_static("demo-client"),
            NullAuthorizationFlow,
        )
    }

    fn provider_for(base: &Url) -> ProviderConfig {
        ProviderConfig {
            issuer: base.clone(),
            authorization_endpoint: base.join("authorize").unwrap(),
            token_endpoint: base.join("token").unwrap(),
            userinfo_endpoint: None,
            revocation_endpoint: None,
        }
    }

    #[test]
    fn discovery_url_appends_well_known_suffix() {
        let url = discovery_url(&Url::parse("https://id.example.com").unwrap()).unwrap();
        assert_eq!(
            url.as_str(),
            "https://id.example.com/.well-known/openid-configuration"
        );

        let with_path = discovery_url(&Url::parse("https://id.example.com/oauth2/org1").unwrap())
            .unwrap();
        assert_eq!(
            with_path.as_str(),
            "https://id.example.com/oauth2/org1/.well-known/openid-configuration"
        );
    }

    #[tokio::test]
    async fn discover_parses_provider_metadata() {
        let server = MockServer::start().await;
        let base = Url::parse(&server.uri()).unwrap();

        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": base.as_str(),
                "authorization_endpoint": base.join("authorize").unwrap().as_str(),
                "token_endpoint": base.join("token").unwrap().as_str(),
                "userinfo_endpoint": base.join("userinfo").unwrap().as_str(),
                "revocation_endpoint": base.join("revoke").unwrap().as_str(),
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = engine().discover(&base).await.unwrap();
        assert_eq!(provider.token_endpoint, base.join("token").unwrap());
        assert_eq!(provider.userinfo_endpoint, Some(base.join("userinfo").unwrap()));
    }

    #[tokio::test]
    async fn discover_reports_unexpected_status() {
        let server = MockServer::start().await;
        let base = Url::parse(&server.uri()).unwrap();

        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let error = engine().discover(&base).await.unwrap_err();
        assert!(matches!(
            error,
            EngineError::Status { status: 503, ref body } if body == "maintenance"
        ));
    }

    #[tokio::test]
    async fn exchange_posts_refresh_grant_form() {
        let server = MockServer::start().await;
        let base = Url::parse(&server.uri()).unwrap();

        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("client_id=demo-client"))
            .and(body_string_contains("refresh_token=r1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "a2",
                "refresh_token": "r2",
                "expires_in": 3600,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let grant = engine()
            .exchange_refresh_token(&provider_for(&base), &crate::RefreshToken::from_static("r1"))
            .await
            .unwrap();
        assert_eq!(grant.access_token.as_str(), "a2");
        assert_eq!(grant.refresh_token.unwrap().as_str(), "r2");
        assert_eq!(grant.expires_in, Some(aliri_clock::DurationSecs(3600)));
    }

    #[tokio::test]
    async fn exchange_surfaces_oauth_error_document() {
        let server = MockServer::start().await;
        let base = Url::parse(&server.uri()).unwrap();

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"error": "invalid_grant"})),
            )
            .mount(&server)
            .await;

        let error = engine()
            .exchange_refresh_token(&provider_for(&base), &crate::RefreshToken::from_static("r1"))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            EngineError::Rejected(ref document) if document.error == "invalid_grant"
        ));
    }

    #[tokio::test]
    async fn null_flow_always_cancels() {
        let base = Url::parse("https://id.example.com").unwrap();
        let config = Configuration::new(
            base.clone(),
            ClientId::from_static("demo-client"),
            Url::parse("com.example:/callback").unwrap(),
            "com.example.session",
            Url::parse("https://api.example.com").unwrap(),
        );
        let error = engine()
            .authorize(&provider_for(&base), &config)
            .await
            .unwrap_err();
        assert!(matches!(error, EngineError::Canceled));
    }
}
