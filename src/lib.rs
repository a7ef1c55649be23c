//! Client-side auth session coordinator for the Delogi dashboard.
//!
//! DESIGN
//! ======
//! [`SessionCoordinator`] owns the signed-in session and the user's profile,
//! reacting to notifications from an [`IdentityProvider`]. Consumers read it
//! through an [`AuthHandle`]; route components use the helpers in [`guard`].
//! The `provider::supabase` module implements the ports over HTTP.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod guard;
pub mod provider;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use config::{CoordinatorConfig, SupabaseConfig};
pub use coordinator::{AuthHandle, AuthSnapshot, ProfileState, SessionCoordinator};
pub use error::{AuthError, ErrorCode};
pub use provider::{IdentityProvider, Navigator, ProfileStore, Subscription};
pub use types::{AuthChange, AuthEvent, Profile, Role, Session, SignUpMetadata, SignUpRequest, User};
