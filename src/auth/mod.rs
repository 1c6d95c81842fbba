//! Authenticated request layer.
//!
//! [`AuthSession`] wires the pieces together: a [`CredentialStore`] over an
//! injected [`CredentialBackend`], a [`RequestDispatcher`] that attaches the
//! bearer token and retries once after expiry, a [`RefreshCoordinator`] that
//! keeps at most one refresh in flight, and a [`SessionTerminator`] that ends
//! the session when refresh is impossible.

pub mod backend;
pub mod dispatcher;
pub mod error;
pub mod login;
pub mod refresh;
mod response;
pub mod store;
pub mod terminator;

pub use backend::{CredentialBackend, FileBackend, KeyringBackend, MemoryBackend};
pub use dispatcher::{RequestBody, RequestDescriptor, RequestDispatcher};
pub use error::{ApiError, RefreshError, RefreshFailure, StoreError};
pub use refresh::{HttpTokenRefresher, RefreshCoordinator, TokenRefresher};
pub use response::{extract_error_message, parse_body};
pub use store::{CredentialPair, CredentialStore};
pub use terminator::{SessionState, SessionTerminator};

use crate::utils::url::normalize_base_url;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Transport settings for an [`AuthSession`].
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub base_url: String,
    pub timeout: Option<Duration>,
}

impl SessionSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: None,
        }
    }

    pub fn build_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder.build()
    }
}

pub struct AuthSession {
    client: reqwest::Client,
    base_url: String,
    store: Arc<CredentialStore>,
    terminator: Arc<SessionTerminator>,
    dispatcher: RequestDispatcher,
}

impl AuthSession {
    pub fn new(
        settings: &SessionSettings,
        backend: Box<dyn CredentialBackend>,
    ) -> Result<Self, ApiError> {
        let client = settings.build_client()?;
        Ok(Self::from_parts(client, &settings.base_url, backend))
    }

    /// Builds a session that refreshes through `<base_url>/refresh`.
    pub fn from_parts(
        client: reqwest::Client,
        base_url: &str,
        backend: Box<dyn CredentialBackend>,
    ) -> Self {
        let refresher = Arc::new(HttpTokenRefresher::new(client.clone(), base_url));
        Self::with_refresher(client, base_url, backend, refresher)
    }

    pub fn with_refresher(
        client: reqwest::Client,
        base_url: &str,
        backend: Box<dyn CredentialBackend>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        let base_url = normalize_base_url(base_url);
        let store = Arc::new(CredentialStore::new(backend));
        let terminator = Arc::new(SessionTerminator::new(Arc::clone(&store)));
        let coordinator = Arc::new(RefreshCoordinator::new(Arc::clone(&store), refresher));
        let dispatcher = RequestDispatcher::new(
            client.clone(),
            base_url.clone(),
            Arc::clone(&store),
            coordinator,
            Arc::clone(&terminator),
        );

        Self {
            client,
            base_url,
            store,
            terminator,
            dispatcher,
        }
    }

    /// Signs in and stores the returned credential pair.
    pub async fn login(&self, username: &str, password_encrypted: &str) -> Result<(), ApiError> {
        let pair =
            login::request_credentials(&self.client, &self.base_url, username, password_encrypted)
                .await?;
        self.store.set(&pair)?;
        self.terminator.mark_signed_in();
        info!(%username, "signed in");
        Ok(())
    }

    /// Ends the session locally. Returns false if it had already ended.
    pub fn logout(&self) -> bool {
        self.terminator.terminate()
    }

    pub async fn send(&self, descriptor: &RequestDescriptor) -> Result<Value, ApiError> {
        self.dispatcher.send(descriptor).await
    }

    pub fn credentials(&self) -> Result<CredentialPair, StoreError> {
        self.store.get()
    }

    pub fn state(&self) -> SessionState {
        self.terminator.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.terminator.subscribe()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn dispatcher(&self) -> &RequestDispatcher {
        &self.dispatcher
    }
}
