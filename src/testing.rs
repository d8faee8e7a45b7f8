//! Shared stubs for the crate's tests

use aliri_clock::{Clock, DurationSecs, UnixTime};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

use crate::config::Configuration;
use crate::engine::{EngineError, OidcEngine, ProviderConfig, TokenGrant};
use crate::{AccessToken, ClientId, IdToken, RefreshToken, RefreshTokenRef};

pub(crate) fn test_config() -> Configuration {
    test_config_with_api(Url::parse("https://api.example.com/demo").unwrap())
}

pub(crate) fn test_config_with_api(api_endpoint: Url) -> Configuration {
    Configuration::new(
        Url::parse("https://id.example.com").unwrap(),
        ClientId::from_static("demo-client"),
        Url::parse("com.example:/callback").unwrap(),
        "com.example.session",
        api_endpoint,
    )
}

pub(crate) fn test_provider() -> ProviderConfig {
    let issuer = Url::parse("https://id.example.com").unwrap();
    ProviderConfig {
        authorization_endpoint: issuer.join("/authorize").unwrap(),
        token_endpoint: issuer.join("/token").unwrap(),
        userinfo_endpoint: Some(issuer.join("/userinfo").unwrap()),
        revocation_endpoint: Some(issuer.join("/revoke").unwrap()),
        issuer,
    }
}

pub(crate) fn grant(
    access: &'static str,
    refresh: Option<&'static str>,
    expires_in: u64,
) -> TokenGrant {
    TokenGrant {
        access_token: AccessToken::from_static(access),
        id_token: Some(IdToken::from_static("id-1")),
        refresh_token: refresh.map(RefreshToken::from_static),
        expires_in: Some(DurationSecs(expires_in)),
    }
}

/// A scripted engine: queued responses, counted calls
pub(crate) struct StubEngine {
    provider: ProviderConfig,
    authorize_responses: Mutex<VecDeque<Result<TokenGrant, EngineError>>>,
    exchange_responses: Mutex<VecDeque<Result<TokenGrant, EngineError>>>,
    exchange_calls: AtomicUsize,
}

impl StubEngine {
    pub fn new() -> Self {
        Self::with_provider(test_provider())
    }

    pub fn with_provider(provider: ProviderConfig) -> Self {
        Self {
            provider,
            authorize_responses: Mutex::new(VecDeque::new()),
            exchange_responses: Mutex::new(VecDeque::new()),
            exchange_calls: AtomicUsize::new(0),
        }
    }

    pub fn push_authorize(&self, response: Result<TokenGrant, EngineError>) {
        self.authorize_responses.lock().unwrap().push_back(response);
    }

    pub fn push_exchange(&self, response: Result<TokenGrant, EngineError>) {
        self.exchange_responses.lock().unwrap().push_back(response);
    }

    pub fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OidcEngine for StubEngine {
    async fn discover(&self, _issuer: &Url) -> Result<ProviderConfig, EngineError> {
        Ok(self.provider.clone())
    }

    async fn authorize(
        &self,
        _provider: &ProviderConfig,
        _config: &Configuration,
    ) -> Result<TokenGrant, EngineError> {
        self.authorize_responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted authorize response")
    }

    async fn exchange_refresh_token(
        &self,
        _provider: &ProviderConfig,
        _refresh_token: &RefreshTokenRef,
    ) -> Result<TokenGrant, EngineError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        self.exchange_responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted exchange response")
    }
}

/// A clock whose time can be advanced after the manager takes ownership
#[derive(Clone, Debug)]
pub(crate) struct SharedClock(Arc<AtomicU64>);

impl SharedClock {
    pub fn at(time: u64) -> Self {
        Self(Arc::new(AtomicU64::new(time)))
    }

    pub fn advance(&self, seconds: u64) {
        self.0.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for SharedClock {
    fn now(&self) -> UnixTime {
        UnixTime(self.0.load(Ordering::SeqCst))
    }
}
