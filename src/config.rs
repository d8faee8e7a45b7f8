//! Static client configuration

use url::Url;

use crate::{ClientId, Scope};

/// The scopes requested during authorization when none are configured
/// explicitly
pub const DEFAULT_SCOPES: &[&str] = &[
    "openid",
    "profile",
    "email",
    "phone",
    "address",
    "groups",
    "offline_access",
];

/// Immutable settings describing the identity provider and the demo
/// resource server
///
/// Constructed once at startup and shared by reference; nothing in here
/// changes for the lifetime of the process.
#[derive(Clone, Debug)]
pub struct Configuration {
    issuer: Url,
    client_id: ClientId,
    redirect_uri: Url,
    persistence_key: String,
    api_endpoint: Url,
    scopes: Vec<Scope>,
}

impl Configuration {
    /// Constructs a configuration with the default scope set
    pub fn new(
        issuer: Url,
        client_id: ClientId,
        redirect_uri: Url,
        persistence_key: impl Into<String>,
        api_endpoint: Url,
    ) -> Self {
        Self {
            issuer,
            client_id,
            redirect_uri,
            persistence_key: persistence_key.into(),
            api_endpoint,
            scopes: DEFAULT_SCOPES.iter().map(|s| Scope::from_static(s)).collect(),
        }
    }

    /// Replaces the requested scope set
    pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = Scope>) -> Self {
        self.scopes = scopes.into_iter().collect();
        self
    }

    /// The identity provider's issuer URL
    #[inline]
    pub fn issuer(&self) -> &Url {
        &self.issuer
    }

    /// The client identifier registered with the provider
    #[inline]
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// The URI the provider redirects back to after login
    #[inline]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    /// The key under which session state is persisted
    #[inline]
    pub fn persistence_key(&self) -> &str {
        &self.persistence_key
    }

    /// The base URL of the demo resource server
    #[inline]
    pub fn api_endpoint(&self) -> &Url {
        &self.api_endpoint
    }

    /// The scopes requested during authorization
    #[inline]
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    /// The scope set rendered as a space-delimited request parameter
    pub fn scope_param(&self) -> String {
        let scopes: Vec<&str> = self.scopes.iter().map(|s| s.as_str()).collect();
        scopes.join(" ")
    }
}
