//! Current-user identity collaborator.
//!
//! The auth flow itself lives outside this crate. The core only needs to ask
//! "who is signed in right now?" and, for UI layers, observe sign-in state
//! changes. Absence of a user is never an error here; callers decide whether
//! to fail open (reads) or closed (writes).

use tokio::sync::watch;
use tracing::debug;

/// Read-only view of the signed-in user.
pub trait IdentityProvider: Send + Sync {
    /// Opaque external user id, or None when nobody is signed in.
    fn current_user_id(&self) -> Option<String>;
}

/// In-process identity state backed by a watch channel.
///
/// The watch channel doubles as the onChange subscription: UI layers call
/// [`SessionIdentity::subscribe`] and react to sign-in/sign-out transitions.
pub struct SessionIdentity {
    tx: watch::Sender<Option<String>>,
}

impl SessionIdentity {
    /// Start signed out.
    pub fn anonymous() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Start with a signed-in user.
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(Some(user_id.into()));
        Self { tx }
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        debug!("identity: signed in as {}", user_id);
        // send_replace stores the value even with no live receivers;
        // plain send() would drop the update once all receivers are gone.
        self.tx.send_replace(Some(user_id));
    }

    pub fn sign_out(&self) {
        debug!("identity: signed out");
        self.tx.send_replace(None);
    }

    /// Subscribe to sign-in state changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.tx.subscribe()
    }
}

impl Default for SessionIdentity {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl IdentityProvider for SessionIdentity {
    fn current_user_id(&self) -> Option<String> {
        self.tx.borrow().clone()
    }
}
