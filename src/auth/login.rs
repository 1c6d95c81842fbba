use crate::auth::error::ApiError;
use crate::auth::response::{extract_error_message, generic_failure_message};
use crate::auth::store::CredentialPair;
use crate::utils::url::construct_api_url;
use serde::{Deserialize, Serialize};

pub const LOGIN_ENDPOINT: &str = "login";

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password_encrypted: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Exchanges a username and an already encrypted password for a credential
/// pair. No authorization header is sent.
pub(crate) async fn request_credentials(
    client: &reqwest::Client,
    base_url: &str,
    username: &str,
    password_encrypted: &str,
) -> Result<CredentialPair, ApiError> {
    let response = client
        .post(construct_api_url(base_url, LOGIN_ENDPOINT))
        .json(&LoginRequest {
            username,
            password_encrypted,
        })
        .send()
        .await?;

    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        let message =
            extract_error_message(&text).unwrap_or_else(|| generic_failure_message(status));
        return Err(ApiError::RequestFailed { status, message });
    }

    let body: LoginResponse = if text.trim().is_empty() {
        LoginResponse::default()
    } else {
        serde_json::from_str(&text).map_err(|err| ApiError::RequestFailed {
            status,
            message: format!("login response was not valid JSON: {err}"),
        })?
    };

    credentials_from(body).ok_or_else(|| ApiError::RequestFailed {
        status,
        message: "login response did not include both access_token and refresh_token"
            .to_string(),
    })
}

fn credentials_from(body: LoginResponse) -> Option<CredentialPair> {
    let access_token = body.access_token.filter(|token| !token.is_empty())?;
    let refresh_token = body.refresh_token.filter(|token| !token.is_empty())?;
    Some(CredentialPair::new(access_token, refresh_token))
}
