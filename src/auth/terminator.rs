use crate::auth::store::CredentialStore;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Whether the host should present authenticated or unauthenticated UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    SignedIn,
    SignedOut,
}

/// Ends the session: clears stored credentials and tells subscribers the user
/// has to sign in again.
pub struct SessionTerminator {
    store: Arc<CredentialStore>,
    state: watch::Sender<SessionState>,
}

impl SessionTerminator {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        let initial = match store.get() {
            Ok(pair) if !pair.is_empty() => SessionState::SignedIn,
            Ok(_) => SessionState::SignedOut,
            Err(err) => {
                warn!(error = %err, "could not read stored credentials");
                SessionState::SignedOut
            }
        };
        let (state, _) = watch::channel(initial);
        Self { store, state }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub(crate) fn mark_signed_in(&self) {
        self.state.send_if_modified(|state| {
            let changed = *state != SessionState::SignedIn;
            *state = SessionState::SignedIn;
            changed
        });
    }

    /// Clears credentials and signals sign-out. Returns false when the session
    /// had already ended, in which case subscribers are not notified again.
    pub fn terminate(&self) -> bool {
        if let Err(err) = self.store.clear() {
            warn!(error = %err, "failed to clear stored credentials");
        }

        let ended = self.state.send_if_modified(|state| {
            if *state == SessionState::SignedOut {
                return false;
            }
            *state = SessionState::SignedOut;
            true
        });
        if ended {
            info!("session terminated, sign-in required");
        }
        ended
    }
}
