//! Single-flight access token refresh.
//!
//! However many requests observe an expired access token at once, only one
//! refresh call goes out. The first caller publishes a shared future in the
//! coordinator's slot before the call is issued; later callers clone it and
//! await the same outcome. The slot is emptied as the future settles, ahead of
//! any waiter resuming, so the next expiry always starts a new refresh.

use crate::auth::error::{RefreshError, RefreshFailure};
use crate::auth::store::{CredentialPair, CredentialStore};
use crate::utils::url::construct_api_url;
use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

pub const REFRESH_ENDPOINT: &str = "refresh";

/// Body of a successful `/refresh` response. Either field may be absent.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct RefreshedTokens {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Exchanges a refresh token for new tokens.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, RefreshFailure>;
}

/// Posts the refresh token to `<api root>/refresh`.
#[derive(Debug, Clone)]
pub struct HttpTokenRefresher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTokenRefresher {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: construct_api_url(base_url, REFRESH_ENDPOINT),
        }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, RefreshFailure> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RefreshFailure::Rejected { status, body });
        }

        Ok(response.json::<RefreshedTokens>().await?)
    }
}

type RefreshOutcome = Shared<BoxFuture<'static, Result<String, RefreshError>>>;

pub struct RefreshCoordinator {
    store: Arc<CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    in_flight: Arc<Mutex<Option<RefreshOutcome>>>,
}

impl RefreshCoordinator {
    pub fn new(store: Arc<CredentialStore>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            store,
            refresher,
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns a new access token, starting a refresh or joining the one in
    /// flight.
    pub async fn refresh(&self) -> Result<String, RefreshError> {
        let outcome = {
            let mut slot = lock_slot(&self.in_flight);
            match slot.as_ref() {
                Some(existing) => {
                    debug!("joining in-flight token refresh");
                    existing.clone()
                }
                None => {
                    let outcome = self.start_refresh().shared();
                    *slot = Some(outcome.clone());
                    outcome
                }
            }
        };
        outcome.await
    }

    pub fn is_refreshing(&self) -> bool {
        lock_slot(&self.in_flight).is_some()
    }

    /// Number of callers currently awaiting the in-flight refresh.
    pub fn waiters(&self) -> usize {
        lock_slot(&self.in_flight)
            .as_ref()
            .and_then(|outcome| outcome.strong_count())
            // The slot holds one handle of its own.
            .map_or(0, |handles| handles.saturating_sub(1))
    }

    // The returned future is lazy: nothing is sent until the first waiter polls
    // it, which happens only after it has been published in the slot.
    fn start_refresh(&self) -> BoxFuture<'static, Result<String, RefreshError>> {
        let store = Arc::clone(&self.store);
        let refresher = Arc::clone(&self.refresher);
        let slot = Arc::clone(&self.in_flight);
        async move {
            debug!("starting token refresh");
            let result = exchange_tokens(&store, refresher.as_ref()).await;
            lock_slot(&slot).take();
            match result {
                Ok(access_token) => {
                    info!("access token refreshed");
                    Ok(access_token)
                }
                Err(failure) => {
                    warn!(error = %failure, "token refresh failed");
                    Err(RefreshError::new(failure))
                }
            }
        }
        .boxed()
    }
}

async fn exchange_tokens(
    store: &CredentialStore,
    refresher: &dyn TokenRefresher,
) -> Result<String, RefreshFailure> {
    let (current, generation) = store.snapshot().map_err(RefreshFailure::Storage)?;
    if current.is_empty() {
        return Err(RefreshFailure::SessionEnded);
    }
    let tokens = refresher.refresh(&current.refresh_token).await?;

    let access_token = tokens
        .access_token
        .filter(|token| !token.is_empty())
        .ok_or(RefreshFailure::MissingAccessToken)?;
    // Servers that do not rotate refresh tokens omit the field.
    let refresh_token = tokens
        .refresh_token
        .filter(|token| !token.is_empty())
        .unwrap_or(current.refresh_token);

    let written = store
        .set_if_generation(
            &CredentialPair::new(access_token.clone(), refresh_token),
            generation,
        )
        .map_err(RefreshFailure::Storage)?;
    if !written {
        debug!("credentials changed during refresh, discarding refreshed tokens");
        return Err(RefreshFailure::SessionEnded);
    }
    Ok(access_token)
}

fn lock_slot(slot: &Mutex<Option<RefreshOutcome>>) -> MutexGuard<'_, Option<RefreshOutcome>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
