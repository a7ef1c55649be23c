//! Auth-session snapshot and the pure transitions applied by the driver.
//!
//! SYSTEM CONTEXT
//! ==============
//! Consumed by route guards and role-aware components through
//! [`super::AuthHandle`]. Only the coordinator's driver task mutates it.

use uuid::Uuid;

use crate::error::AuthError;
use crate::types::{AuthChange, Profile, Role, Session, User};

// =============================================================================
// PROFILE STATE
// =============================================================================

/// Where the current user's profile lookup stands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ProfileState {
    /// No user is signed in.
    #[default]
    Absent,
    /// First lookup for this user is in flight.
    Loading,
    Loaded(Profile),
    /// Lookup failed: the user is authenticated but the role is unknown.
    Unavailable { reason: String },
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Read-only view of the coordinator's state.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSnapshot {
    session: Option<Session>,
    profile: ProfileState,
    loading: bool,
    generation: u64,
}

impl Default for AuthSnapshot {
    fn default() -> Self {
        Self { session: None, profile: ProfileState::Absent, loading: true, generation: 0 }
    }
}

impl AuthSnapshot {
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.session.as_ref().map(|s| &s.user)
    }

    /// The loaded profile, or `None` while absent, loading, or unavailable.
    #[must_use]
    pub fn profile(&self) -> Option<&Profile> {
        match &self.profile {
            ProfileState::Loaded(profile) => Some(profile),
            _ => None,
        }
    }

    #[must_use]
    pub fn profile_state(&self) -> &ProfileState {
        &self.profile
    }

    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.profile().map(|p| p.role)
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    /// True until the first notification has been processed.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Number of session changes processed so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replace the session and decide whether a profile lookup is needed.
    pub(crate) fn apply_change(&mut self, change: AuthChange) -> Option<FetchTicket> {
        let previous_user = self.user().map(|u| u.id);
        self.generation += 1;
        self.session = change.session;

        let Some(session) = &self.session else {
            self.profile = ProfileState::Absent;
            self.loading = false;
            return None;
        };

        if previous_user != Some(session.user.id) {
            self.profile = ProfileState::Loading;
        }
        Some(FetchTicket {
            generation: self.generation,
            user_id: session.user.id,
            access_token: session.access_token.clone(),
        })
    }

    /// Settle a profile lookup. Results for a superseded generation or user
    /// leave the profile untouched.
    pub(crate) fn apply_profile(&mut self, ticket: &FetchTicket, result: Result<Profile, AuthError>) -> FetchOutcome {
        self.loading = false;

        let current_user = self.user().map(|u| u.id);
        if ticket.generation != self.generation || current_user != Some(ticket.user_id) {
            return FetchOutcome::Stale;
        }

        self.profile = match result {
            Ok(profile) => ProfileState::Loaded(profile),
            Err(e) => ProfileState::Unavailable { reason: e.user_message() },
        };
        FetchOutcome::Applied
    }
}

// =============================================================================
// FETCH TAGGING
// =============================================================================

/// Identifies the session change a profile lookup was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FetchTicket {
    pub(crate) generation: u64,
    pub(crate) user_id: Uuid,
    pub(crate) access_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchOutcome {
    Applied,
    Stale,
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
