//! HTTP adapter for a Supabase-compatible backend (`GoTrue` auth + `PostgREST`).
//!
//! ARCHITECTURE
//! ============
//! `SupabaseAuth` talks to `/auth/v1` and keeps the current session locally.
//! Every session change is fanned out to subscribers through unbounded
//! channels; a new subscriber is sent `INITIAL_SESSION` immediately.
//! `SupabaseProfiles` reads single profile rows from `/rest/v1/{table}`.
//! Response decoding lives in pure functions for testability.
//!
//! TOKEN REFRESH
//! =============
//! [`spawn_refresh_task`] keeps the held session alive: it sleeps until
//! `REFRESH_MARGIN_SECS` before `expires_at`, exchanges the refresh token and
//! publishes `TOKEN_REFRESHED`. Retryable failures are retried after
//! `REFRESH_RETRY_SECS`; a rejected refresh token clears the session and
//! publishes `SIGNED_OUT`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{IdentityProvider, ProfileStore, Subscription};
use crate::config::{HttpTimeouts, SupabaseConfig};
use crate::error::{AuthError, ErrorCode};
use crate::types::{AuthChange, AuthEvent, Profile, Session, SignUpOutcome, SignUpRequest, User};

const PROFILE_COLUMNS: &str = "role,company_name,full_name";
const SINGLE_OBJECT_ACCEPT: &str = "application/vnd.pgrst.object+json";
const REFRESH_MARGIN_SECS: i64 = 60;
const REFRESH_RETRY_SECS: u64 = 10;

fn build_http(timeouts: HttpTimeouts) -> Result<reqwest::Client, AuthError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeouts.request_secs))
        .connect_timeout(Duration::from_secs(timeouts.connect_secs))
        .build()
        .map_err(|e| AuthError::HttpClientBuild(e.to_string()))
}

// =============================================================================
// NOTIFICATION HUB
// =============================================================================

#[derive(Default)]
struct HubInner {
    session: Option<Session>,
    subscribers: HashMap<u64, mpsc::UnboundedSender<AuthChange>>,
    next_id: u64,
}

/// Current session plus the set of live subscribers.
#[derive(Default)]
struct NotificationHub {
    inner: Mutex<HubInner>,
}

impl NotificationHub {
    fn subscribe(self: &Arc<Self>) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let id = inner.next_id;
            inner.next_id += 1;
            let _ = tx.send(AuthChange::new(AuthEvent::InitialSession, inner.session.clone()));
            inner.subscribers.insert(id, tx);
            id
        };
        debug!(subscriber = id, "auth subscriber registered");

        let hub = Arc::clone(self);
        Subscription::new(rx, move || hub.remove(id))
    }

    fn remove(&self, id: u64) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.subscribers.remove(&id).is_some() {
            debug!(subscriber = id, "auth subscriber removed");
        }
    }

    fn publish(&self, event: AuthEvent, session: Option<Session>) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Self::publish_locked(&mut inner, event, session);
    }

    fn publish_locked(inner: &mut HubInner, event: AuthEvent, session: Option<Session>) {
        inner.session = session;
        let change = AuthChange::new(event, inner.session.clone());
        inner
            .subscribers
            .retain(|_, tx| tx.send(change.clone()).is_ok());
        debug!(?event, subscribers = inner.subscribers.len(), "auth change published");
    }

    /// Publish only while the held session still carries `refresh_token`.
    fn replace_if_held(&self, refresh_token: &str, event: AuthEvent, session: Option<Session>) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let held = inner
            .session
            .as_ref()
            .is_some_and(|s| s.refresh_token == refresh_token);
        if held {
            Self::publish_locked(&mut inner, event, session);
        }
        held
    }

    fn session(&self) -> Option<Session> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .session
            .clone()
    }

    fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribers
            .len()
    }
}

// =============================================================================
// AUTH CLIENT
// =============================================================================

/// Identity provider backed by the `GoTrue` REST API.
pub struct SupabaseAuth {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    hub: Arc<NotificationHub>,
}

impl SupabaseAuth {
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &SupabaseConfig) -> Result<Self, AuthError> {
        Ok(Self {
            http: build_http(config.timeouts)?,
            base_url: config.url.clone(),
            anon_key: config.anon_key.clone(),
            hub: Arc::new(NotificationHub::default()),
        })
    }

    /// Session currently held by the client, if any.
    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        self.hub.session()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    /// Exchange the held refresh token for a new session.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NoSession`] when nothing is held, or the backend error.
    pub async fn refresh_session(&self) -> Result<Session, AuthError> {
        let Some(current) = self.hub.session() else {
            return Err(AuthError::NoSession);
        };
        let body = serde_json::json!({ "refresh_token": current.refresh_token });
        let text = self
            .post(&auth_endpoint(&self.base_url, "token?grant_type=refresh_token"), &body, None)
            .await?;
        let session = parse_session(&text, unix_now())?;
        if !self
            .hub
            .replace_if_held(&current.refresh_token, AuthEvent::TokenRefreshed, Some(session.clone()))
        {
            debug!(user_id = %session.user.id, "session changed during refresh; result dropped");
            return Err(AuthError::NoSession);
        }
        info!(user_id = %session.user.id, "session refreshed");
        Ok(session)
    }

    /// Decode a token-endpoint body, hold the session and notify subscribers.
    fn accept_token_response(&self, json: &str, event: AuthEvent) -> Result<Session, AuthError> {
        let session = parse_session(json, unix_now())?;
        self.hub.publish(event, Some(session.clone()));
        Ok(session)
    }

    /// Drop the held session after the backend rejected its refresh token.
    fn expire_session(&self, error: &AuthError) {
        let Some(current) = self.hub.session() else {
            return;
        };
        info!(user_id = %current.user.id, reason = %error.user_message(), "session expired");
        self.hub
            .replace_if_held(&current.refresh_token, AuthEvent::SignedOut, None);
    }

    async fn post(&self, url: &str, body: &serde_json::Value, bearer: Option<&str>) -> Result<String, AuthError> {
        let mut request = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(response_error(status, &text));
        }
        Ok(text)
    }
}

#[async_trait::async_trait]
impl IdentityProvider for SupabaseAuth {
    fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let body = serde_json::json!({ "email": email, "password": password });
        let text = self
            .post(&auth_endpoint(&self.base_url, "token?grant_type=password"), &body, None)
            .await?;
        let session = self.accept_token_response(&text, AuthEvent::SignedIn)?;
        info!(user_id = %session.user.id, "signed in with password");
        Ok(session)
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpOutcome, AuthError> {
        let body = serde_json::json!({
            "email": request.email,
            "password": request.password,
            "data": request.metadata,
        });
        let text = self
            .post(&auth_endpoint(&self.base_url, "signup"), &body, None)
            .await?;
        let outcome = parse_sign_up(&text, unix_now())?;
        info!(
            user_id = %outcome.user.id,
            confirmed = outcome.session.is_some(),
            role = %request.metadata.role,
            "account created"
        );
        if let Some(session) = &outcome.session {
            self.hub
                .publish(AuthEvent::SignedIn, Some(session.clone()));
        }
        Ok(outcome)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let result = match self.hub.session() {
            Some(session) => self
                .post(&auth_endpoint(&self.base_url, "logout"), &serde_json::json!({}), Some(&session.access_token))
                .await
                .map(|_| ()),
            None => Ok(()),
        };
        if let Err(e) = &result {
            warn!(error = %e, "remote sign-out failed; clearing local session anyway");
        }
        self.hub.publish(AuthEvent::SignedOut, None);
        result
    }
}

// =============================================================================
// REFRESH TASK
// =============================================================================

/// Spawn the background token refresher. Returns a handle for shutdown;
/// aborting it releases the task's subscription.
pub fn spawn_refresh_task(auth: Arc<SupabaseAuth>) -> JoinHandle<()> {
    info!(margin_secs = REFRESH_MARGIN_SECS, "token refresh configured");
    let mut changes = auth.subscribe();
    tokio::spawn(async move {
        let mut deadline: Option<Instant> = None;
        loop {
            tokio::select! {
                change = changes.recv() => {
                    let Some(change) = change else { break };
                    deadline = change
                        .session
                        .as_ref()
                        .map(|s| Instant::now() + refresh_delay(s, unix_now()));
                }
                () = sleep_until(deadline) => {
                    deadline = None;
                    match auth.refresh_session().await {
                        Ok(_) | Err(AuthError::NoSession) => {}
                        Err(e) => match retry_after(&e) {
                            Some(wait) => {
                                warn!(error = %e, retry_secs = wait.as_secs(), "token refresh failed; will retry");
                                deadline = Some(Instant::now() + wait);
                            }
                            None => {
                                warn!(error = %e, code = e.error_code(), "token refresh rejected; signing out");
                                auth.expire_session(&e);
                            }
                        },
                    }
                }
            }
        }
        debug!("token refresh task stopped");
    })
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Time left until `session` should be refreshed; zero once inside the margin.
fn refresh_delay(session: &Session, now_secs: i64) -> Duration {
    let expires_at = session
        .expires_at
        .unwrap_or(now_secs + session.expires_in);
    let secs = expires_at - REFRESH_MARGIN_SECS - now_secs;
    Duration::from_secs(u64::try_from(secs).unwrap_or(0))
}

/// Backoff for a failed refresh, or `None` when the session cannot be renewed.
fn retry_after(error: &AuthError) -> Option<Duration> {
    error
        .retryable()
        .then(|| Duration::from_secs(REFRESH_RETRY_SECS))
}

fn unix_now() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_secs()).unwrap_or(i64::MAX)
}

// =============================================================================
// PROFILE STORE
// =============================================================================

/// Profile lookups against a `PostgREST` table.
pub struct SupabaseProfiles {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    table: String,
}

impl SupabaseProfiles {
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &SupabaseConfig) -> Result<Self, AuthError> {
        Ok(Self {
            http: build_http(config.timeouts)?,
            base_url: config.url.clone(),
            anon_key: config.anon_key.clone(),
            table: config.profile_table.clone(),
        })
    }
}

#[async_trait::async_trait]
impl ProfileStore for SupabaseProfiles {
    async fn fetch_profile(&self, user_id: Uuid, access_token: &str) -> Result<Profile, AuthError> {
        let response = self
            .http
            .get(rest_endpoint(&self.base_url, &self.table))
            .query(&profile_query(user_id))
            .header("apikey", &self.anon_key)
            .header("Accept", SINGLE_OBJECT_ACCEPT)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        if status != 200 {
            return Err(response_error(status, &text));
        }
        serde_json::from_str(&text).map_err(|e| AuthError::Parse(e.to_string()))
    }
}

// =============================================================================
// PURE HELPERS
// =============================================================================

fn auth_endpoint(base_url: &str, path: &str) -> String {
    format!("{base_url}/auth/v1/{path}")
}

fn rest_endpoint(base_url: &str, table: &str) -> String {
    format!("{base_url}/rest/v1/{table}")
}

fn profile_query(user_id: Uuid) -> [(&'static str, String); 2] {
    [("select", PROFILE_COLUMNS.to_owned()), ("id", format!("eq.{user_id}"))]
}

/// Decode a session, stamping `expires_at` from `expires_in` when absent.
fn parse_session(json: &str, now_secs: i64) -> Result<Session, AuthError> {
    let mut session: Session = serde_json::from_str(json).map_err(|e| AuthError::Parse(e.to_string()))?;
    if session.expires_at.is_none() {
        session.expires_at = Some(now_secs + session.expires_in);
    }
    Ok(session)
}

/// Sign-up answers with a full session when confirmation is disabled and with
/// the bare user otherwise.
fn parse_sign_up(json: &str, now_secs: i64) -> Result<SignUpOutcome, AuthError> {
    if let Ok(session) = parse_session(json, now_secs) {
        return Ok(SignUpOutcome { user: session.user.clone(), session: Some(session) });
    }
    let user: User = serde_json::from_str(json).map_err(|e| AuthError::Parse(e.to_string()))?;
    Ok(SignUpOutcome { user, session: None })
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

/// Reduce a backend error body to a single human-readable message.
fn response_error(status: u16, body: &str) -> AuthError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = [parsed.error_description, parsed.msg, parsed.message, parsed.error]
        .into_iter()
        .flatten()
        .find(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("request failed with status {status}"));
    AuthError::Response { status, message }
}

#[cfg(test)]
#[path = "supabase_test.rs"]
mod tests;
