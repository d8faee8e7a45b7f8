//! The authenticated request executor
//!
//! Every call to the demo API surface goes through
//! [`ApiClient::call_authenticated`]: a pre-flight authentication check,
//! the fresh-token guarantee from the session manager, a bearer header,
//! and uniform classification of the response. The typed operations
//! (userinfo, revocation, demo media) differ only in URL, method, and
//! how they interpret the decoded body.

use aliri_clock::Clock;
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::OidcEngine;
use crate::error::{OAuthApiError, SessionError};
use crate::session::SessionManager;
use crate::storage::SessionStore;

/// The bound applied to every outbound call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The demo endpoint's successful payload: a user's name and avatar
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DemoMedia {
    /// The user's display name
    pub name: String,

    /// The fetched avatar image bytes
    pub image: Vec<u8>,
}

/// The application-level outcome of the demo media call
///
/// The demo server reports "no media for this user" inside a 200
/// response; that is a reportable outcome, not a session failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DemoOutcome {
    /// The server returned a name and a fetchable image
    Media(DemoMedia),

    /// The server answered with an application-level error message
    Rejected(String),
}

#[derive(Debug, Deserialize)]
struct DemoApiBody {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    image: Option<Url>,
    #[serde(default, rename = "Error")]
    error: Option<String>,
}

/// An HTTP client that routes every request through the session
/// manager's fresh-token guarantee
pub struct ApiClient<E, S, C> {
    session: Arc<SessionManager<E, S, C>>,
    http: reqwest::Client,
}

impl<E, S, C> ApiClient<E, S, C> {
    /// Constructs a client with a default-configured HTTP stack
    pub fn new(session: Arc<SessionManager<E, S, C>>) -> Result<Self, SessionError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("oidc-session/", env!("CARGO_PKG_VERSION")))
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|error| SessionError::Transport(Box::new(error)))?;
        Ok(Self::with_client(session, http))
    }

    /// Constructs a client from an existing HTTP client
    ///
    /// The caller is responsible for configuring a request timeout.
    pub fn with_client(session: Arc<SessionManager<E, S, C>>, http: reqwest::Client) -> Self {
        Self { session, http }
    }

    /// The session manager this client routes through
    pub fn session(&self) -> &Arc<SessionManager<E, S, C>> {
        &self.session
    }
}

fn transport(error: reqwest::Error) -> SessionError {
    SessionError::Transport(Box::new(error))
}

impl<E, S, C> ApiClient<E, S, C>
where
    E: OidcEngine,
    S: SessionStore,
    C: Clock + Send + Sync,
{
    /// Performs an authenticated JSON request
    ///
    /// Rejects immediately when no session is held, without touching the
    /// network. Otherwise obtains a guaranteed-fresh access token,
    /// attaches it as a bearer credential, and classifies the response:
    /// a 200 body is decoded as JSON, a 401 updates the session's
    /// recorded error before being surfaced, and anything else is an
    /// HTTP error. Beyond the token refresh itself, nothing is retried.
    #[tracing::instrument(skip_all, fields(http.method = %method, http.url = %url))]
    pub async fn call_authenticated(
        &self,
        method: Method,
        url: Url,
        form: Option<Vec<(String, String)>>,
    ) -> Result<serde_json::Value, SessionError> {
        if !self.session.is_authenticated() {
            return Err(SessionError::NotAuthenticated);
        }

        let session = Arc::clone(&self.session);
        let http = self.http.clone();
        self.session
            .with_fresh_token(move |access_token, _id_token| async move {
                let mut request = http
                    .request(method, url)
                    .bearer_auth(access_token.as_str());
                if let Some(form) = &form {
                    request = request.form(form);
                }

                let response = request.send().await.map_err(transport)?;
                let status = response.status();
                tracing::debug!(response.status = status.as_u16(), "received API response");

                let body = response.bytes().await.map_err(transport)?;
                if status == StatusCode::UNAUTHORIZED {
                    return Err(unauthorized(&session, &body).await);
                }
                if status != StatusCode::OK {
                    return Err(SessionError::Http {
                        status: status.as_u16(),
                        body: String::from_utf8_lossy(&body).into_owned(),
                    });
                }

                serde_json::from_slice(&body).map_err(SessionError::MalformedResponse)
            })
            .await
    }

    /// Fetches the user's claims from the provider's userinfo endpoint
    pub async fn userinfo(&self) -> Result<serde_json::Value, SessionError> {
        let provider = match self.session.provider() {
            Some(provider) => provider,
            None => return Err(SessionError::NotAuthenticated),
        };
        let endpoint = provider.userinfo_endpoint.ok_or_else(|| {
            SessionError::Discovery("userinfo endpoint not declared in discovery document".into())
        })?;
        self.call_authenticated(Method::GET, endpoint, None).await
    }

    /// Revokes the current access token at the provider
    ///
    /// A fresh access token is obtained first, then surrendered to the
    /// provider's revocation endpoint. On success the token is flagged
    /// for refresh but the refresh token is deliberately left in place;
    /// if the provider killed the whole grant, the next refresh attempt
    /// surfaces that and unauthenticates the session.
    #[tracing::instrument(skip_all)]
    pub async fn revoke(&self) -> Result<(), SessionError> {
        if !self.session.is_authenticated() {
            return Err(SessionError::NotAuthenticated);
        }
        let provider = match self.session.provider() {
            Some(provider) => provider,
            None => return Err(SessionError::NotAuthenticated),
        };
        let endpoint = provider.revocation_endpoint.ok_or_else(|| {
            SessionError::Discovery("revocation endpoint not declared in discovery document".into())
        })?;

        let session = Arc::clone(&self.session);
        let http = self.http.clone();
        let client_id = self.session.config().client_id().clone();
        self.session
            .with_fresh_token(move |access_token, _id_token| async move {
                let form = vec![
                    ("token".to_owned(), access_token.as_str().to_owned()),
                    ("client_id".to_owned(), client_id.as_str().to_owned()),
                ];
                let response = http
                    .post(endpoint)
                    .form(&form)
                    .send()
                    .await
                    .map_err(transport)?;
                let status = response.status();
                tracing::debug!(response.status = status.as_u16(), "received revoke response");

                if status == StatusCode::OK || status == StatusCode::NO_CONTENT {
                    return Ok(());
                }

                let body = response.bytes().await.map_err(transport)?;
                if status == StatusCode::UNAUTHORIZED {
                    return Err(unauthorized(&session, &body).await);
                }
                Err(SessionError::Http {
                    status: status.as_u16(),
                    body: String::from_utf8_lossy(&body).into_owned(),
                })
            })
            .await?;

        self.session.mark_needs_refresh().await;
        tracing::info!("access token revoked, next authenticated call refreshes");
        Ok(())
    }

    /// Calls the demo API and resolves the media it points at
    ///
    /// The demo endpoint answers with a user's name and an image URL;
    /// the image itself is then fetched without credentials. An `Error`
    /// field in the body is an application-level rejection, reported as
    /// an outcome rather than a failure.
    pub async fn fetch_demo_media(&self) -> Result<DemoOutcome, SessionError> {
        let url = self.session.config().api_endpoint().clone();
        let body = self.call_authenticated(Method::POST, url, None).await?;
        let body: DemoApiBody =
            serde_json::from_value(body).map_err(SessionError::MalformedResponse)?;

        match body {
            DemoApiBody {
                name: Some(name),
                image: Some(image),
                ..
            } => {
                let image = self.fetch_image(image).await?;
                Ok(DemoOutcome::Media(DemoMedia { name, image }))
            }
            DemoApiBody {
                error: Some(message),
                ..
            } => {
                tracing::debug!(message = %message, "demo API reported an application error");
                Ok(DemoOutcome::Rejected(message))
            }
            _ => {
                use serde::de::Error;
                Err(SessionError::MalformedResponse(serde_json::Error::custom(
                    "response carried neither media fields nor an error message",
                )))
            }
        }
    }

    async fn fetch_image(&self, url: Url) -> Result<Vec<u8>, SessionError> {
        let response = self.http.get(url).send().await.map_err(transport)?;
        let status = response.status();
        let body = response.bytes().await.map_err(transport)?;
        if status != StatusCode::OK {
            return Err(SessionError::Http {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(body.to_vec())
    }
}

/// Classifies a 401 body, recording any OAuth-shaped error document with
/// the session before surfacing the authorization failure
async fn unauthorized<E, S, C>(
    session: &SessionManager<E, S, C>,
    body: &[u8],
) -> SessionError
where
    E: OidcEngine,
    S: SessionStore,
    C: Clock + Send + Sync,
{
    match serde_json::from_slice::<OAuthApiError>(body) {
        Ok(document) => {
            session.record_authorization_error(document.clone()).await;
            SessionError::Authorization(document)
        }
        Err(_) => SessionError::Authorization(OAuthApiError::new("unauthorized")),
    }
}

impl<E, S, C> fmt::Debug for ApiClient<E, S, C>
where
    E: fmt::Debug,
    S: fmt::Debug,
    C: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("session", &self.session)
            .field("http", &self.http)
            .finish()
    }
}
