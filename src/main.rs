//! Headless session watcher: logs every auth state change.
//!
//! CONFIGURATION
//! =============
//! Backend and coordinator settings come from [`SupabaseConfig::from_env`]
//! and [`CoordinatorConfig::from_env`]; a `.env` file is loaded first.
//! The watcher itself reads:
//! - `DELOGI_EMAIL`, `DELOGI_PASSWORD`: when both are set, sign in with them
//!   at startup
//! - `DELOGI_SIGN_OUT_ON_EXIT`: when set, sign out on Ctrl-C before stopping

use std::sync::Arc;

use delogi_session::guard::{RouteGate, route_gate};
use delogi_session::provider::supabase::{SupabaseAuth, SupabaseProfiles, spawn_refresh_task};
use delogi_session::{AuthSnapshot, CoordinatorConfig, Navigator, SessionCoordinator, SupabaseConfig};

/// Navigator for a headless process: records the route in the log.
struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, path: &str) {
        tracing::info!(%path, "navigate");
    }
}

fn log_snapshot(snapshot: &AuthSnapshot) {
    let gate = route_gate(snapshot);
    match (snapshot.user(), snapshot.profile()) {
        (Some(user), Some(profile)) => tracing::info!(
            user_id = %user.id,
            email = user.email.as_deref().unwrap_or(""),
            role = %profile.role,
            company = profile.company_name.as_deref().unwrap_or(""),
            ?gate,
            "signed in"
        ),
        (Some(user), None) => tracing::info!(
            user_id = %user.id,
            profile = ?snapshot.profile_state(),
            ?gate,
            "signed in, role unknown"
        ),
        (None, _) if gate == RouteGate::Wait => tracing::info!("waiting for first auth notification"),
        (None, _) => tracing::info!(?gate, "signed out"),
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let config = SupabaseConfig::from_env().expect("backend config required");
    let auth = Arc::new(SupabaseAuth::new(&config).expect("auth client init failed"));
    let profiles = Arc::new(SupabaseProfiles::new(&config).expect("profile client init failed"));
    let refresh = spawn_refresh_task(Arc::clone(&auth));

    let coordinator =
        SessionCoordinator::start(auth.clone(), profiles, Arc::new(LogNavigator), CoordinatorConfig::from_env());
    let mut handle = coordinator.handle();

    // Optional non-interactive sign-in for smoke testing against a project.
    if let (Ok(email), Ok(password)) = (std::env::var("DELOGI_EMAIL"), std::env::var("DELOGI_PASSWORD")) {
        if let Err(e) = handle.sign_in_with_password(&email, &password).await {
            tracing::error!(error = %e.user_message(), "sign-in failed");
        }
    }

    log_snapshot(&handle.current_state());
    loop {
        tokio::select! {
            snapshot = handle.changed() => {
                let Some(snapshot) = snapshot else { break };
                log_snapshot(&snapshot);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                if auth.current_session().is_some() && std::env::var("DELOGI_SIGN_OUT_ON_EXIT").is_ok() {
                    let _ = handle.sign_out().await;
                }
                break;
            }
        }
    }

    refresh.abort();
    coordinator.shutdown().await;
}
