use crate::core::keyring::KeyringAccessError;
use reqwest::StatusCode;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Failures raised by a credential backend.
#[derive(Debug)]
pub enum StoreError {
    Keyring(KeyringAccessError),
    Io(std::io::Error),
    Encoding(serde_json::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Keyring(err) => write!(f, "credential keyring error: {err}"),
            StoreError::Io(err) => write!(f, "credential file error: {err}"),
            StoreError::Encoding(err) => write!(f, "credential file is malformed: {err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreError::Keyring(err) => Some(err),
            StoreError::Io(err) => Some(err),
            StoreError::Encoding(err) => Some(err),
        }
    }
}

impl From<KeyringAccessError> for StoreError {
    fn from(err: KeyringAccessError) -> Self {
        StoreError::Keyring(err)
    }
}

impl From<keyring::Error> for StoreError {
    fn from(err: keyring::Error) -> Self {
        StoreError::Keyring(KeyringAccessError::from(err))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Encoding(err)
    }
}

/// Why a token refresh did not produce a new access token.
#[derive(Debug)]
pub enum RefreshFailure {
    /// The refresh call never produced a usable response.
    Transport(reqwest::Error),
    /// The server answered the refresh call with a non-success status.
    Rejected { status: StatusCode, body: String },
    /// The refresh response did not carry an access token.
    MissingAccessToken,
    /// The credential store could not be read or written.
    Storage(StoreError),
    /// The session was ended or replaced while the refresh was in flight, so
    /// its tokens were discarded.
    SessionEnded,
}

impl fmt::Display for RefreshFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshFailure::Transport(err) => write!(f, "token refresh request failed: {err}"),
            RefreshFailure::Rejected { status, .. } => {
                write!(f, "token refresh rejected ({status})")
            }
            RefreshFailure::MissingAccessToken => {
                write!(f, "token refresh response did not include an access token")
            }
            RefreshFailure::Storage(err) => write!(f, "token refresh could not persist: {err}"),
            RefreshFailure::SessionEnded => {
                write!(f, "session ended before the token refresh completed")
            }
        }
    }
}

impl Error for RefreshFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RefreshFailure::Transport(err) => Some(err),
            RefreshFailure::Storage(err) => Some(err),
            RefreshFailure::Rejected { .. }
            | RefreshFailure::MissingAccessToken
            | RefreshFailure::SessionEnded => None,
        }
    }
}

impl From<reqwest::Error> for RefreshFailure {
    fn from(err: reqwest::Error) -> Self {
        RefreshFailure::Transport(err)
    }
}

/// A refresh failure shared by every caller that joined the same refresh.
#[derive(Clone, Debug)]
pub struct RefreshError(Arc<RefreshFailure>);

impl RefreshError {
    pub fn new(failure: RefreshFailure) -> Self {
        Self(Arc::new(failure))
    }

    pub fn failure(&self) -> &RefreshFailure {
        &self.0
    }

    /// True when both handles came out of the same refresh attempt.
    pub fn same_attempt(&self, other: &RefreshError) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl Error for RefreshError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&*self.0)
    }
}

/// Errors surfaced by authenticated calls.
#[derive(Debug)]
pub enum ApiError {
    /// The call was still unauthorized after a successful refresh.
    Unauthorized,
    /// The access token could not be refreshed.
    RefreshFailed(RefreshError),
    /// Any other non-success response.
    RequestFailed { status: StatusCode, message: String },
    /// The call could not be completed at the transport level.
    Transport(reqwest::Error),
    /// A token or caller-supplied header could not be encoded.
    InvalidHeader(reqwest::header::InvalidHeaderValue),
    Storage(StoreError),
}

impl ApiError {
    /// True when the error ended the session and the user must sign in again.
    pub fn ends_session(&self) -> bool {
        matches!(self, ApiError::Unauthorized | ApiError::RefreshFailed(_))
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Unauthorized => Some(StatusCode::UNAUTHORIZED),
            ApiError::RequestFailed { status, .. } => Some(*status),
            ApiError::RefreshFailed(err) => match err.failure() {
                RefreshFailure::Rejected { status, .. } => Some(*status),
                _ => None,
            },
            ApiError::Transport(err) => err.status(),
            ApiError::InvalidHeader(_) | ApiError::Storage(_) => None,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Unauthorized => write!(f, "request is not authorized"),
            ApiError::RefreshFailed(err) => write!(f, "{err}"),
            ApiError::RequestFailed { message, .. } => write!(f, "{message}"),
            ApiError::Transport(err) => write!(f, "request failed: {err}"),
            ApiError::InvalidHeader(err) => write!(f, "invalid header value: {err}"),
            ApiError::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ApiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ApiError::RefreshFailed(err) => Some(err),
            ApiError::Transport(err) => Some(err),
            ApiError::InvalidHeader(err) => Some(err),
            ApiError::Storage(err) => Some(err),
            ApiError::Unauthorized | ApiError::RequestFailed { .. } => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Transport(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Storage(err)
    }
}

impl From<reqwest::header::InvalidHeaderValue> for ApiError {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        ApiError::InvalidHeader(err)
    }
}
