//! Shared fixtures and port mocks for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::error::AuthError;
use crate::provider::{IdentityProvider, Navigator, ProfileStore, Subscription};
use crate::types::{
    AuthChange, AuthEvent, Profile, Role, Session, SignUpOutcome, SignUpRequest, User,
};

// =============================================================================
// FIXTURES
// =============================================================================

pub(crate) fn user_id(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

pub(crate) fn session_for(id: Uuid, token: &str) -> Session {
    Session {
        access_token: token.to_owned(),
        refresh_token: format!("refresh-{token}"),
        token_type: "bearer".to_owned(),
        expires_in: 3600,
        expires_at: None,
        user: User { id, email: Some(format!("{id}@maison.example")), user_metadata: serde_json::Value::Null },
    }
}

pub(crate) fn signed_in(id: Uuid, token: &str) -> AuthChange {
    AuthChange::new(AuthEvent::SignedIn, Some(session_for(id, token)))
}

pub(crate) fn profile(role: Role, company: &str) -> Profile {
    Profile { role, company_name: Some(company.to_owned()), full_name: None }
}

// =============================================================================
// IDENTITY PROVIDER
// =============================================================================

/// Provider whose notifications are pushed by the test via [`MockIdentity::emit`].
#[derive(Default)]
pub(crate) struct MockIdentity {
    senders: Mutex<Vec<mpsc::UnboundedSender<AuthChange>>>,
    pub(crate) unsubscribed: Arc<AtomicUsize>,
    pub(crate) sign_out_calls: AtomicUsize,
    fail_sign_out: bool,
    sign_in_error: Option<AuthError>,
}

impl MockIdentity {
    pub(crate) fn failing_sign_out() -> Self {
        Self { fail_sign_out: true, ..Self::default() }
    }

    pub(crate) fn rejecting_sign_in(err: AuthError) -> Self {
        Self { sign_in_error: Some(err), ..Self::default() }
    }

    /// Deliver a change to every live subscriber. Returns how many received it.
    pub(crate) fn emit(&self, change: AuthChange) -> usize {
        let mut senders = self.senders.lock().unwrap();
        senders.retain(|tx| tx.send(change.clone()).is_ok());
        senders.len()
    }
}

#[async_trait::async_trait]
impl IdentityProvider for MockIdentity {
    fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().unwrap().push(tx);
        let unsubscribed = Arc::clone(&self.unsubscribed);
        Subscription::new(rx, move || {
            unsubscribed.fetch_add(1, Ordering::SeqCst);
        })
    }

    async fn sign_in_with_password(&self, email: &str, _password: &str) -> Result<Session, AuthError> {
        if let Some(err) = &self.sign_in_error {
            return Err(err.clone());
        }
        let mut session = session_for(user_id(99), "signed-in");
        session.user.email = Some(email.to_owned());
        Ok(session)
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpOutcome, AuthError> {
        let user = User {
            id: user_id(100),
            email: Some(request.email.clone()),
            user_metadata: serde_json::to_value(&request.metadata).unwrap(),
        };
        Ok(SignUpOutcome { user, session: None })
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_sign_out {
            return Err(AuthError::Request("connection reset".into()));
        }
        Ok(())
    }
}

// =============================================================================
// PROFILE STORE
// =============================================================================

type ProfileResult = Result<Profile, AuthError>;

/// Profile store whose lookups block until the test releases them.
///
/// Lookups for a user with a queued gate wait on that gate; lookups without
/// one answer immediately from `fixed` (or fail when absent).
#[derive(Default)]
pub(crate) struct GatedProfiles {
    gates: Mutex<HashMap<Uuid, VecDeque<oneshot::Receiver<ProfileResult>>>>,
    fixed: Mutex<HashMap<Uuid, ProfileResult>>,
    pub(crate) calls: Mutex<Vec<(Uuid, String)>>,
}

impl GatedProfiles {
    /// Queue a gate for the next lookup of `id`; send on the returned sender to release it.
    pub(crate) fn gate(&self, id: Uuid) -> oneshot::Sender<ProfileResult> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().entry(id).or_default().push_back(rx);
        tx
    }

    pub(crate) fn answer(&self, id: Uuid, result: ProfileResult) {
        self.fixed.lock().unwrap().insert(id, result);
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl ProfileStore for GatedProfiles {
    async fn fetch_profile(&self, user_id: Uuid, access_token: &str) -> Result<Profile, AuthError> {
        self.calls
            .lock()
            .unwrap()
            .push((user_id, access_token.to_owned()));
        let gate = self
            .gates
            .lock()
            .unwrap()
            .get_mut(&user_id)
            .and_then(VecDeque::pop_front);
        if let Some(gate) = gate {
            return gate
                .await
                .unwrap_or_else(|_| Err(AuthError::Request("gate dropped".into())));
        }
        self.fixed
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| Err(AuthError::Response { status: 406, message: "no rows returned".into() }))
    }
}

// =============================================================================
// NAVIGATOR
// =============================================================================

#[derive(Default)]
pub(crate) struct RecordingNavigator {
    pub(crate) visits: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub(crate) fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, path: &str) {
        self.visits.lock().unwrap().push(path.to_owned());
    }
}
