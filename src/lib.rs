//! Session lifecycle management for OAuth2/OIDC authorization-code clients
//!
//! This library owns the authentication state of a client application:
//! it holds the current token snapshot, persists and restores it, reacts
//! to authorization and refresh failures, and mediates every outbound
//! authenticated request through a single "ensure fresh token, then
//! call" contract.
//!
//! The protocol work itself (discovery, the interactive
//! authorization-code flow, the refresh-token exchange) sits behind the
//! [`engine::OidcEngine`] trait. An HTTP implementation of the
//! non-interactive operations ships in [`engine::http`]; the interactive
//! step is delegated to whatever user-facing machinery the embedding
//! application wires in.
//!
//! # General flow
//!
//! On start-up, construct a [`SessionManager`] from a [`Configuration`],
//! an engine, and a [`SessionStore`][storage::SessionStore], then
//! restore any persisted session:
//!
//! ```no_run
//! use oidc_session::engine::http::{HttpOidcEngine, NullAuthorizationFlow};
//! use oidc_session::storage::FileSessionStore;
//! use oidc_session::{ApiClient, ClientId, Configuration, SessionManager};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), oidc_session::SessionError> {
//! let config = Configuration::new(
//!     "https://id.example.com".parse().unwrap(),
//!     ClientId::from_static("my-client"),
//!     "com.example:/callback".parse().unwrap(),
//!     "com.example.session",
//!     "https://api.example.com/demo".parse().unwrap(),
//! );
//!
//! let engine = HttpOidcEngine::new(
//!     reqwest::Client::new(),
//!     config.client_id().clone(),
//!     NullAuthorizationFlow,
//! );
//! let store = FileSessionStore::new(".session");
//!
//! let session = Arc::new(SessionManager::new(config, engine, store));
//! session.load_state().await;
//!
//! let client = ApiClient::new(Arc::clone(&session))?;
//! if session.is_authenticated() {
//!     let claims = client.userinfo().await?;
//!     println!("signed in as {}", claims["name"]);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Every mutation of the session (a new grant, a refresh, a recorded
//! authorization error, revocation, clearing) replaces the snapshot
//! wholesale, persists it before returning, and notifies registered
//! listeners, so observers never see a state the store does not.
//!
//! # Features
//!
//! The following features are supported by this crate, all of which are
//! enabled by default:
//!
//! * `http`: Provides the `reqwest`-backed engine and the authenticated
//!   request executor.
//! * `file`: Provides a session store backed by the local filesystem.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod braids;
mod config;
pub mod engine;
mod error;
#[cfg(feature = "http")]
mod executor;
mod session;
mod snapshot;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use braids::*;
pub use config::{Configuration, DEFAULT_SCOPES};
pub use error::{BoxError, OAuthApiError, SessionError};
#[cfg(feature = "http")]
#[cfg_attr(docsrs, doc(cfg(feature = "http")))]
pub use executor::{ApiClient, DemoMedia, DemoOutcome, DEFAULT_TIMEOUT};
pub use session::{SessionManager, SessionRecord};
pub use snapshot::{ExpiryPolicy, TokenSnapshot, TokenStatus};
