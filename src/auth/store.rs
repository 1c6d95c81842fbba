use crate::auth::backend::CredentialBackend;
use crate::auth::error::StoreError;
use std::fmt;
use std::sync::Mutex;
use tracing::warn;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// An access token and the refresh token issued alongside it.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_empty() && self.refresh_token.is_empty()
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(token: &str) -> &'static str {
            if token.is_empty() {
                "<empty>"
            } else {
                "<redacted>"
            }
        }
        f.debug_struct("CredentialPair")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .finish()
    }
}

/// Durable holder of the current credential pair.
///
/// Reads and writes are serialized so no reader observes an access token from
/// one issuance next to a refresh token from another. Every unconditional
/// write or clear starts a new generation; [`CredentialStore::set_if_generation`]
/// only writes while the generation it was given is still current.
pub struct CredentialStore {
    backend: Box<dyn CredentialBackend>,
    generation: Mutex<u64>,
}

impl CredentialStore {
    pub fn new(backend: Box<dyn CredentialBackend>) -> Self {
        Self {
            backend,
            generation: Mutex::new(0),
        }
    }

    /// Returns the stored pair; missing fields read as empty strings.
    pub fn get(&self) -> Result<CredentialPair, StoreError> {
        let _generation = self.lock();
        self.read_pair()
    }

    /// Returns the stored pair together with the generation it belongs to.
    pub fn snapshot(&self) -> Result<(CredentialPair, u64), StoreError> {
        let generation = self.lock();
        Ok((self.read_pair()?, *generation))
    }

    /// Replaces both tokens. If the backend fails part way the pair is
    /// removed rather than left half-written.
    pub fn set(&self, pair: &CredentialPair) -> Result<(), StoreError> {
        let mut generation = self.lock();
        *generation += 1;
        self.write_pair(pair)
    }

    /// Replaces both tokens only if nothing has set or cleared the store since
    /// `expected` was read. Returns false, writing nothing, when it is stale.
    pub fn set_if_generation(
        &self,
        pair: &CredentialPair,
        expected: u64,
    ) -> Result<bool, StoreError> {
        let generation = self.lock();
        if *generation != expected {
            return Ok(false);
        }
        self.write_pair(pair)?;
        Ok(true)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        let mut generation = self.lock();
        *generation += 1;
        self.backend
            .remove_many(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY])
    }

    fn read_pair(&self) -> Result<CredentialPair, StoreError> {
        let access_token = self.backend.read(ACCESS_TOKEN_KEY)?.unwrap_or_default();
        let refresh_token = self.backend.read(REFRESH_TOKEN_KEY)?.unwrap_or_default();
        Ok(CredentialPair {
            access_token,
            refresh_token,
        })
    }

    fn write_pair(&self, pair: &CredentialPair) -> Result<(), StoreError> {
        let result = self.backend.write_many(&[
            (ACCESS_TOKEN_KEY, pair.access_token.as_str()),
            (REFRESH_TOKEN_KEY, pair.refresh_token.as_str()),
        ]);
        if let Err(err) = result {
            if let Err(cleanup) = self.backend.remove_many(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY]) {
                warn!(error = %cleanup, "failed to discard partially written credentials");
            }
            return Err(err);
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, u64> {
        self.generation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore").finish_non_exhaustive()
    }
}
