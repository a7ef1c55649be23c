//! Collaborator seams: identity provider, profile store and navigator.
//!
//! DESIGN
//! ======
//! The coordinator only talks to these traits. `supabase` holds the HTTP
//! implementation used in production; tests substitute in-memory mocks.

pub mod supabase;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::AuthError;
use crate::types::{AuthChange, Profile, Session, SignUpOutcome, SignUpRequest};

// =============================================================================
// TRAITS
// =============================================================================

/// External identity provider: issues sessions and reports transitions.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Register for auth-state notifications.
    ///
    /// Implementations deliver an [`crate::types::AuthEvent::InitialSession`]
    /// change first, then every later transition, until the returned
    /// subscription is unsubscribed or dropped.
    fn subscribe(&self) -> Subscription;

    /// Exchange email and password for a session.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] carrying the backend's message on bad
    /// credentials or transport failure.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    /// Create an account with the given metadata.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] if the backend rejects the request.
    async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpOutcome, AuthError>;

    /// End the current session.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] if the backend call fails.
    async fn sign_out(&self) -> Result<(), AuthError>;
}

/// Store holding one [`Profile`] row per user id.
#[async_trait::async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch the single profile row for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] if the row is missing or the lookup fails.
    async fn fetch_profile(&self, user_id: Uuid, access_token: &str) -> Result<Profile, AuthError>;
}

/// Client-side navigation.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

// =============================================================================
// SUBSCRIPTION
// =============================================================================

type UnsubscribeFn = Box<dyn FnOnce() + Send>;

/// Live registration with an [`IdentityProvider`].
///
/// The unsubscribe callback runs exactly once: on [`Subscription::unsubscribe`]
/// or on drop, whichever comes first.
pub struct Subscription {
    events: mpsc::UnboundedReceiver<AuthChange>,
    unsubscribe: Option<UnsubscribeFn>,
}

impl Subscription {
    pub fn new<F>(events: mpsc::UnboundedReceiver<AuthChange>, unsubscribe: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self { events, unsubscribe: Some(Box::new(unsubscribe)) }
    }

    /// Next notification, or `None` once the provider side is gone.
    pub async fn recv(&mut self) -> Option<AuthChange> {
        self.events.recv().await
    }

    pub fn unsubscribe(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
        self.events.close();
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.unsubscribe.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
