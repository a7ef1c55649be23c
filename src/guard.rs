//! Shared route-guard decisions.
//!
//! SYSTEM CONTEXT
//! ==============
//! Protected pages and the login page must apply identical redirect rules,
//! and neither may act while the coordinator is still loading.

use crate::coordinator::AuthSnapshot;
use crate::provider::Navigator;

/// What a protected route should do with the current auth state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteGate {
    /// First notification not processed yet; render a placeholder.
    Wait,
    RedirectToLogin,
    Render,
}

#[must_use]
pub fn route_gate(state: &AuthSnapshot) -> RouteGate {
    if state.is_loading() {
        RouteGate::Wait
    } else if state.is_authenticated() {
        RouteGate::Render
    } else {
        RouteGate::RedirectToLogin
    }
}

/// True once auth has loaded and no user is present.
#[must_use]
pub fn should_redirect_unauth(state: &AuthSnapshot) -> bool {
    route_gate(state) == RouteGate::RedirectToLogin
}

/// True once auth has loaded and a user is present; the login page moves on.
#[must_use]
pub fn should_leave_login(state: &AuthSnapshot) -> bool {
    !state.is_loading() && state.is_authenticated()
}

/// Navigate to `login_path` when [`should_redirect_unauth`] holds. Returns
/// whether a redirect was issued.
pub fn redirect_if_unauth(state: &AuthSnapshot, navigator: &dyn Navigator, login_path: &str) -> bool {
    if should_redirect_unauth(state) {
        navigator.navigate(login_path);
        return true;
    }
    false
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;
