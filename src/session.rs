//! The session manager owning the authorization state

use aliri_clock::{Clock, System};
use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};
use std::{error, fmt};
use tokio::sync::Mutex;

use crate::config::Configuration;
use crate::engine::{EngineError, OidcEngine, ProviderConfig};
use crate::error::{OAuthApiError, SessionError};
use crate::snapshot::{ExpiryPolicy, TokenSnapshot, TokenStatus};
use crate::storage::SessionStore;
use crate::{AccessToken, IdToken};

/// The unit of persisted session state
///
/// The provider metadata rides along with the tokens so that refresh,
/// revocation, and userinfo calls survive a restart without a second
/// round of discovery.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// The provider configuration the grant was issued under
    pub provider: ProviderConfig,

    /// The token state itself
    pub tokens: TokenSnapshot,
}

type StateListener = Box<dyn Fn(Option<&TokenSnapshot>) + Send + Sync + 'static>;

/// The owner of the process's single logical session
///
/// Holds the current [`TokenSnapshot`], persists every change through its
/// [`SessionStore`], and funnels all protocol work through its
/// [`OidcEngine`]. Reads are lock-free; mutating operations serialize on
/// an internal guard so that at most one authenticate, refresh, revoke,
/// or clear is in flight, and so that concurrent callers of
/// [`with_fresh_token`](SessionManager::with_fresh_token) share a single
/// refresh exchange.
pub struct SessionManager<E, S, C = System> {
    config: Configuration,
    engine: E,
    store: S,
    clock: C,
    policy: ExpiryPolicy,
    current: ArcSwapOption<SessionRecord>,
    ops: Mutex<()>,
    listeners: StdMutex<Vec<StateListener>>,
}

impl<E, S> SessionManager<E, S> {
    /// Constructs a manager with no session held
    ///
    /// Call [`load_state`](SessionManager::load_state) to restore a
    /// persisted session, or [`authenticate`](SessionManager::authenticate)
    /// to establish a new one.
    pub fn new(config: Configuration, engine: E, store: S) -> Self {
        Self {
            config,
            engine,
            store,
            clock: System,
            policy: ExpiryPolicy::default(),
            current: ArcSwapOption::const_empty(),
            ops: Mutex::new(()),
            listeners: StdMutex::new(Vec::new()),
        }
    }
}

impl<E, S, C> SessionManager<E, S, C> {
    /// Replaces the staleness policy
    pub fn with_expiry_policy(mut self, policy: ExpiryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets a custom clock to be used
    ///
    /// Useful for testing purposes
    pub fn with_clock<D>(self, clock: D) -> SessionManager<E, S, D> {
        SessionManager {
            config: self.config,
            engine: self.engine,
            store: self.store,
            clock,
            policy: self.policy,
            current: self.current,
            ops: self.ops,
            listeners: self.listeners,
        }
    }

    /// The configuration this manager was constructed with
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// The protocol engine this manager drives
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Whether a session holding an access token is present
    ///
    /// Does not consider expiry; a held-but-stale token still counts.
    pub fn is_authenticated(&self) -> bool {
        self.current
            .load()
            .as_ref()
            .map_or(false, |record| record.tokens.is_authenticated())
    }

    /// The current token snapshot, if a session is held
    pub fn current_snapshot(&self) -> Option<TokenSnapshot> {
        self.current.load().as_ref().map(|record| record.tokens.clone())
    }

    /// The provider metadata of the current session, if one is held
    pub fn provider(&self) -> Option<ProviderConfig> {
        self.current
            .load()
            .as_ref()
            .map(|record| record.provider.clone())
    }

    /// Registers a listener invoked after every state change
    ///
    /// Listeners run synchronously, after the change has been persisted
    /// and published, and receive the new snapshot (or `None` when the
    /// session was dropped).
    pub fn on_state_changed(
        &self,
        listener: impl Fn(Option<&TokenSnapshot>) + Send + Sync + 'static,
    ) {
        self.listeners_mut().push(Box::new(listener));
    }

    fn listeners_mut(&self) -> std::sync::MutexGuard<'_, Vec<StateListener>> {
        match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn notify(&self) {
        let current = self.current.load();
        let snapshot = current.as_ref().map(|record| &record.tokens);
        for listener in self.listeners_mut().iter() {
            listener(snapshot);
        }
    }
}

impl<E, S, C> SessionManager<E, S, C>
where
    E: OidcEngine,
    S: SessionStore,
    C: Clock + Send + Sync,
{
    /// Restores the persisted session, if any
    ///
    /// A missing, unreadable, or undecodable record is treated as "no
    /// session"; this never fails.
    pub async fn load_state(&self) {
        let _guard = self.ops.lock().await;
        let record = match self.store.load(self.config.persistence_key()).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<Option<SessionRecord>>(&bytes) {
                Ok(record) => record,
                Err(error) => {
                    tracing::warn!(
                        error = (&error as &dyn error::Error),
                        "persisted session state is undecodable, treating as no session"
                    );
                    None
                }
            },
            Ok(None) => None,
            Err(error) => {
                tracing::warn!(
                    error = (&*error as &dyn error::Error),
                    "unable to read persisted session state, treating as no session"
                );
                None
            }
        };

        self.current.store(record.map(Arc::new));
        self.notify();
    }

    /// Runs discovery and the authorization-code flow, establishing a
    /// new session
    ///
    /// On success the snapshot is replaced wholesale with the tokens of
    /// the new grant. On any failure, including user cancellation, the
    /// held session is dropped and the failure is returned.
    #[tracing::instrument(skip_all, fields(issuer = %self.config.issuer(), client_id = %self.config.client_id()))]
    pub async fn authenticate(&self) -> Result<(), SessionError> {
        let _guard = self.ops.lock().await;

        let provider = match self.engine.discover(self.config.issuer()).await {
            Ok(provider) => provider,
            Err(error) => {
                tracing::warn!(
                    error = (&error as &dyn error::Error),
                    "error retrieving discovery document"
                );
                self.install(None).await;
                return Err(SessionError::Discovery(Box::new(error)));
            }
        };

        match self.engine.authorize(&provider, &self.config).await {
            Ok(grant) => {
                let tokens = TokenSnapshot::from_grant(grant, self.clock.now());
                tracing::info!(
                    has_id_token = tokens.id_token().is_some(),
                    has_refresh_token = tokens.refresh_token().is_some(),
                    "authorization grant established"
                );
                self.install(Some(SessionRecord { provider, tokens })).await;
                Ok(())
            }
            Err(error) => {
                tracing::warn!(
                    error = (&error as &dyn error::Error),
                    "authorization flow failed"
                );
                self.install(None).await;
                Err(SessionError::Provider(Box::new(error)))
            }
        }
    }

    /// Ensures a fresh access token, then runs `action` with it
    ///
    /// When the held token is stale, or a refresh has been forced, a
    /// single refresh exchange replaces the snapshot before `action`
    /// runs; concurrent callers serialize on that decision, so
    /// simultaneous stale callers share one exchange. Failures of
    /// `action` are returned to the caller untouched.
    pub async fn with_fresh_token<F, Fut, T>(&self, action: F) -> Result<T, SessionError>
    where
        F: FnOnce(AccessToken, Option<IdToken>) -> Fut,
        Fut: Future<Output = Result<T, SessionError>>,
    {
        let (access_token, id_token) = self.fresh_tokens().await?;
        action(access_token, id_token).await
    }

    /// Forces a refresh of the access token
    pub async fn refresh(&self) -> Result<(), SessionError> {
        if !self.is_authenticated() {
            return Err(SessionError::NotAuthenticated);
        }
        self.mark_needs_refresh().await;
        self.with_fresh_token(|_access_token, _id_token| async { Ok(()) })
            .await
    }

    /// Flags the held access token as needing a refresh
    ///
    /// The refresh token is left in place; the next authenticated call
    /// performs the exchange. Revocation relies on this: the revoked
    /// access token is flagged here, and the provider's rejection of the
    /// grant surfaces on that later refresh.
    pub async fn mark_needs_refresh(&self) {
        let _guard = self.ops.lock().await;
        if let Some(record) = self.current.load_full() {
            self.install(Some(SessionRecord {
                provider: record.provider.clone(),
                tokens: record.tokens.needing_refresh(),
            }))
            .await;
        }
    }

    /// Records an authorization error reported by a downstream call
    ///
    /// Updates the snapshot's last-error field. When the error names a
    /// dead grant, the token material is dropped and the session becomes
    /// unauthenticated; it is never silently retried.
    pub async fn record_authorization_error(&self, error: OAuthApiError) {
        let _guard = self.ops.lock().await;
        let record = match self.current.load_full() {
            Some(record) => record,
            None => return,
        };

        tracing::warn!(
            auth_error = %error,
            grant_invalidated = error.invalidates_grant(),
            "authorization error recorded"
        );

        let tokens = if error.invalidates_grant() {
            TokenSnapshot::invalidated(error)
        } else {
            record.tokens.with_error(error)
        };
        self.install(Some(SessionRecord {
            provider: record.provider.clone(),
            tokens,
        }))
        .await;
    }

    /// Drops the session and erases all persisted state in the store's
    /// namespace
    ///
    /// Succeeds from any prior state, including when no session is held.
    pub async fn clear(&self) {
        let _guard = self.ops.lock().await;
        self.current.store(None);
        if let Err(error) = self.store.delete_all().await {
            tracing::warn!(
                error = (&*error as &dyn error::Error),
                "unable to erase persisted session state"
            );
        }
        self.notify();
        tracing::info!("session cleared");
    }

    async fn fresh_tokens(&self) -> Result<(AccessToken, Option<IdToken>), SessionError> {
        let _guard = self.ops.lock().await;

        let record = match self.current.load_full() {
            Some(record) => record,
            None => return Err(SessionError::NotAuthenticated),
        };
        let access_token = match record.tokens.access_token() {
            Some(token) => token,
            None => return Err(SessionError::NotAuthenticated),
        };

        if record.tokens.status_at(self.clock.now(), &self.policy) == TokenStatus::Fresh {
            return Ok((
                access_token.to_owned(),
                record.tokens.id_token().map(ToOwned::to_owned),
            ));
        }

        let refresh_token = match record.tokens.refresh_token() {
            Some(token) => token,
            None => {
                tracing::debug!("token is stale and no refresh token is held");
                return Err(SessionError::NotAuthenticated);
            }
        };

        tracing::debug!("token is stale, refreshing before use");
        match self
            .engine
            .exchange_refresh_token(&record.provider, refresh_token)
            .await
        {
            Ok(grant) => {
                let access_token = grant.access_token.clone();
                let id_token = grant.id_token.clone();
                let tokens = record.tokens.refreshed_with(grant, self.clock.now());
                tracing::debug!(expiry = tokens.expiry().map(|t| t.0), "tokens refreshed");
                self.install(Some(SessionRecord {
                    provider: record.provider.clone(),
                    tokens,
                }))
                .await;
                Ok((access_token, id_token))
            }
            Err(EngineError::Rejected(document)) => {
                let tokens = if document.invalidates_grant() {
                    tracing::warn!(auth_error = %document, "refresh token rejected, dropping session");
                    TokenSnapshot::invalidated(document.clone())
                } else {
                    tracing::warn!(auth_error = %document, "refresh exchange rejected");
                    record.tokens.with_error(document.clone())
                };
                self.install(Some(SessionRecord {
                    provider: record.provider.clone(),
                    tokens,
                }))
                .await;
                Err(SessionError::Authorization(document))
            }
            Err(error) => Err(refresh_failure(error)),
        }
    }

    /// Persists the record, publishes it, and notifies listeners
    ///
    /// Persistence happens first so a change is never observable before
    /// it is durable; a store failure is logged and does not fail the
    /// mutating operation.
    async fn install(&self, record: Option<SessionRecord>) {
        match serde_json::to_vec(&record) {
            Ok(bytes) => {
                if let Err(error) = self.store.save(self.config.persistence_key(), &bytes).await {
                    tracing::warn!(
                        error = (&*error as &dyn error::Error),
                        "unable to persist session state"
                    );
                }
            }
            Err(error) => {
                tracing::warn!(
                    error = (&error as &dyn error::Error),
                    "unable to encode session state"
                );
            }
        }

        self.current.store(record.map(Arc::new));
        self.notify();
    }
}

fn refresh_failure(error: EngineError) -> SessionError {
    match error {
        EngineError::Rejected(document) => SessionError::Authorization(document),
        EngineError::Transport(source) => SessionError::Transport(source),
        EngineError::Decode(source) => SessionError::MalformedResponse(source),
        EngineError::Status { status, body } => SessionError::Http { status, body },
        EngineError::Canceled => SessionError::Provider(Box::new(EngineError::Canceled)),
    }
}

impl<E, S, C> fmt::Debug for SessionManager<E, S, C>
where
    E: fmt::Debug,
    S: fmt::Debug,
    C: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .field("engine", &self.engine)
            .field("store", &self.store)
            .field("clock", &self.clock)
            .field("policy", &self.policy)
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}
