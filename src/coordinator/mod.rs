//! Session coordinator: the single source of truth for who is signed in.
//!
//! ARCHITECTURE
//! ============
//! One driver task owns the [`AuthSnapshot`] and publishes it through a
//! `watch` channel. It reacts to provider notifications and to completed
//! profile lookups; lookups run concurrently and are polled by the driver.
//! Consumers hold an [`AuthHandle`] and never mutate state directly.
//!
//! ORDERING
//! ========
//! Every notification bumps a generation counter. Each lookup carries the
//! generation and user id it was issued for; a result whose tag no longer
//! matches the snapshot is discarded, so a slow lookup for a superseded
//! session can never overwrite a newer one.
//!
//! ERROR HANDLING
//! ==============
//! Lookup failures are logged and recorded as [`ProfileState::Unavailable`].
//! Nothing inside the driver returns an error to the provider.

pub mod state;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;
use crate::error::{AuthError, ErrorCode};
use crate::provider::{IdentityProvider, Navigator, ProfileStore, Subscription};
use crate::types::{AuthChange, Profile, Session, SignUpOutcome, SignUpRequest};
pub use state::{AuthSnapshot, ProfileState};
use state::{FetchOutcome, FetchTicket};

type ProfileFetch = Pin<Box<dyn Future<Output = (FetchTicket, Result<Profile, AuthError>)> + Send>>;

// =============================================================================
// COORDINATOR
// =============================================================================

/// Owns the driver task. Dropping it (or calling [`SessionCoordinator::shutdown`])
/// releases the provider subscription.
pub struct SessionCoordinator {
    handle: AuthHandle,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SessionCoordinator {
    /// Subscribe to `identity` and spawn the driver task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
        navigator: Arc<dyn Navigator>,
        config: CoordinatorConfig,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(AuthSnapshot::default());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let subscription = identity.subscribe();
        let driver = Driver { state: state_tx, profiles, in_flight: FuturesUnordered::new() };
        let task = tokio::spawn(driver.run(subscription, shutdown_rx));

        info!(login_path = %config.login_path, "session coordinator started");

        let handle = AuthHandle { state: state_rx, identity, navigator, login_path: config.login_path.into() };
        Self { handle, shutdown: Some(shutdown_tx), task: Some(task) }
    }

    /// A read handle for consumers. Cheap to clone.
    #[must_use]
    pub fn handle(&self) -> AuthHandle {
        self.handle.clone()
    }

    /// Stop the driver and wait until the subscription has been released.
    pub async fn shutdown(mut self) {
        self.signal_stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "session coordinator task ended abnormally");
            }
        }
    }

    fn signal_stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        self.signal_stop();
    }
}

// =============================================================================
// READ HANDLE
// =============================================================================

/// Read-only view of auth state plus the user-initiated auth actions.
#[derive(Clone)]
pub struct AuthHandle {
    state: watch::Receiver<AuthSnapshot>,
    identity: Arc<dyn IdentityProvider>,
    navigator: Arc<dyn Navigator>,
    login_path: Arc<str>,
}

impl AuthHandle {
    #[must_use]
    pub fn current_state(&self) -> AuthSnapshot {
        self.state.borrow().clone()
    }

    /// Wait for the next published snapshot. `None` once the coordinator is gone.
    pub async fn changed(&mut self) -> Option<AuthSnapshot> {
        self.state.changed().await.ok()?;
        Some(self.state.borrow_and_update().clone())
    }

    /// Wait until a snapshot satisfies `predicate` (checked against the current one first).
    pub async fn wait_for<F>(&mut self, predicate: F) -> Option<AuthSnapshot>
    where
        F: FnMut(&AuthSnapshot) -> bool,
    {
        self.state
            .wait_for(predicate)
            .await
            .ok()
            .map(|snapshot| snapshot.clone())
    }

    /// Sign out with the provider, then navigate to the login path.
    ///
    /// Navigation happens whether or not the provider call succeeded. State is
    /// cleared by the provider's resulting `SIGNED_OUT` notification.
    ///
    /// # Errors
    ///
    /// Returns the provider's error after navigating; callers may ignore it.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let result = self.identity.sign_out().await;
        if let Err(e) = &result {
            warn!(error = %e, code = e.error_code(), "sign-out failed");
        }
        self.navigator.navigate(&self.login_path);
        result
    }

    /// # Errors
    ///
    /// Returns the provider's error for the calling form to render.
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        self.identity
            .sign_in_with_password(email, password)
            .await
            .inspect_err(|e| warn!(error = %e, code = e.error_code(), "sign-in failed"))
    }

    /// # Errors
    ///
    /// Returns the provider's error for the calling form to render.
    pub async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpOutcome, AuthError> {
        self.identity
            .sign_up(request)
            .await
            .inspect_err(|e| warn!(error = %e, code = e.error_code(), "sign-up failed"))
    }

    #[must_use]
    pub fn login_path(&self) -> &str {
        &self.login_path
    }
}

// =============================================================================
// DRIVER
// =============================================================================

struct Driver {
    state: watch::Sender<AuthSnapshot>,
    profiles: Arc<dyn ProfileStore>,
    in_flight: FuturesUnordered<ProfileFetch>,
}

impl Driver {
    async fn run(mut self, mut subscription: Subscription, mut shutdown: oneshot::Receiver<()>) {
        let mut provider_closed = false;
        loop {
            if provider_closed && self.in_flight.is_empty() {
                break;
            }
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                Some((ticket, result)) = self.in_flight.next(), if !self.in_flight.is_empty() => {
                    self.on_profile(&ticket, result);
                }
                change = subscription.recv(), if !provider_closed => {
                    if let Some(change) = change {
                        self.on_change(change);
                    } else {
                        warn!("identity provider closed the subscription");
                        provider_closed = true;
                    }
                }
            }
        }

        subscription.unsubscribe();
        info!(abandoned_lookups = self.in_flight.len(), "session coordinator stopped");
    }

    fn on_change(&mut self, change: AuthChange) {
        let event = change.event;
        let mut ticket = None;
        self.state
            .send_modify(|snapshot| ticket = snapshot.apply_change(change));

        let Some(ticket) = ticket else {
            info!(?event, "auth state cleared");
            return;
        };
        info!(?event, user_id = %ticket.user_id, generation = ticket.generation, "auth state changed");
        self.in_flight
            .push(fetch_profile(Arc::clone(&self.profiles), ticket));
    }

    fn on_profile(&mut self, ticket: &FetchTicket, result: Result<Profile, AuthError>) {
        if let Err(e) = &result {
            warn!(user_id = %ticket.user_id, error = %e, code = e.error_code(), "profile lookup failed");
        }

        let mut outcome = FetchOutcome::Stale;
        self.state.send_if_modified(|snapshot| {
            let was_loading = snapshot.is_loading();
            outcome = snapshot.apply_profile(ticket, result);
            outcome == FetchOutcome::Applied || was_loading
        });

        match outcome {
            FetchOutcome::Applied => {
                let role = self.state.borrow().role();
                debug!(user_id = %ticket.user_id, ?role, "profile applied");
            }
            FetchOutcome::Stale => {
                debug!(user_id = %ticket.user_id, generation = ticket.generation, "discarded stale profile lookup");
            }
        }
    }
}

fn fetch_profile(profiles: Arc<dyn ProfileStore>, ticket: FetchTicket) -> ProfileFetch {
    Box::pin(async move {
        let result = profiles
            .fetch_profile(ticket.user_id, &ticket.access_token)
            .await;
        (ticket, result)
    })
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
