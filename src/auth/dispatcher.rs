use crate::auth::error::{ApiError, RefreshFailure};
use crate::auth::refresh::RefreshCoordinator;
use crate::auth::response::read_response;
use crate::auth::store::CredentialStore;
use crate::auth::terminator::SessionTerminator;
use crate::utils::url::construct_api_url;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Payload of an outbound call.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(Value),
    /// Sent as-is; the content type is left to the caller's headers.
    Binary(Vec<u8>),
}

/// One logical call against the API root.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub path: String,
    pub method: Method,
    pub body: Option<RequestBody>,
    pub extra_headers: HeaderMap,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            body: None,
            extra_headers: HeaderMap::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn binary(mut self, bytes: Vec<u8>) -> Self {
        self.body = Some(RequestBody::Binary(bytes));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.extra_headers.insert(name, value);
        self
    }

    pub fn is_binary_body(&self) -> bool {
        matches!(self.body, Some(RequestBody::Binary(_)))
    }
}

/// Builds the headers for one attempt: JSON content type unless the body is
/// binary, then the caller's headers, then the bearer token, which always wins.
pub fn compose_headers(
    descriptor: &RequestDescriptor,
    access_token: &str,
) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    if !descriptor.is_binary_body() {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }

    for name in descriptor.extra_headers.keys() {
        headers.remove(name);
    }
    for (name, value) in &descriptor.extra_headers {
        if name == AUTHORIZATION {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    let mut authorization = HeaderValue::from_str(&format!("Bearer {access_token}"))?;
    authorization.set_sensitive(true);
    headers.insert(AUTHORIZATION, authorization);
    Ok(headers)
}

/// Issues authenticated calls and recovers from access token expiry with a
/// single retry.
pub struct RequestDispatcher {
    client: reqwest::Client,
    base_url: String,
    store: Arc<CredentialStore>,
    coordinator: Arc<RefreshCoordinator>,
    terminator: Arc<SessionTerminator>,
}

impl RequestDispatcher {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        store: Arc<CredentialStore>,
        coordinator: Arc<RefreshCoordinator>,
        terminator: Arc<SessionTerminator>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            store,
            coordinator,
            terminator,
        }
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Sends `descriptor`, making at most two physical calls: the original and,
    /// after a successful refresh, one retry.
    pub async fn send(&self, descriptor: &RequestDescriptor) -> Result<Value, ApiError> {
        let credentials = self.store.get()?;
        let response = self.issue(descriptor, &credentials.access_token).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return read_response(response).await;
        }

        debug!(path = %descriptor.path, "access token rejected, refreshing");
        let access_token = match self.coordinator.refresh().await {
            Ok(token) => token,
            Err(err) => {
                // Whoever ended the session already cleared it; a sign-in
                // since then must survive.
                if !matches!(err.failure(), RefreshFailure::SessionEnded) {
                    self.terminator.terminate();
                }
                return Err(ApiError::RefreshFailed(err));
            }
        };

        let retried = self.issue(descriptor, &access_token).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            warn!(path = %descriptor.path, "request still unauthorized after refresh");
            self.terminator.terminate();
            return Err(ApiError::Unauthorized);
        }

        read_response(retried).await
    }

    async fn issue(
        &self,
        descriptor: &RequestDescriptor,
        access_token: &str,
    ) -> Result<reqwest::Response, ApiError> {
        let url = construct_api_url(&self.base_url, &descriptor.path);
        let headers = compose_headers(descriptor, access_token)?;
        debug!(method = %descriptor.method, %url, "sending request");

        let mut request = self
            .client
            .request(descriptor.method.clone(), &url)
            .headers(headers);
        request = match &descriptor.body {
            Some(RequestBody::Json(body)) => request.json(body),
            Some(RequestBody::Binary(bytes)) => request.body(bytes.clone()),
            None => request,
        };

        Ok(request.send().await?)
    }
}
