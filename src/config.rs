//! Configuration parsed from environment variables.

use crate::error::AuthError;

pub const DEFAULT_PROFILE_TABLE: &str = "users";
pub const DEFAULT_LOGIN_PATH: &str = "/login";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

/// Connection settings for the hosted auth/database backend.
#[derive(Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    /// Project base URL without trailing slash (e.g. `https://abc.supabase.co`).
    pub url: String,
    /// Public anon key sent as `apikey` on every request.
    pub anon_key: String,
    /// Table holding one profile row per user id.
    pub profile_table: String,
    pub timeouts: HttpTimeouts,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("anon_key", &"<redacted>")
            .field("profile_table", &self.profile_table)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl SupabaseConfig {
    /// Build typed backend config from environment variables.
    ///
    /// Required:
    /// - `SUPABASE_URL`
    /// - `SUPABASE_ANON_KEY`
    ///
    /// Optional:
    /// - `PROFILE_TABLE`: default `users`
    /// - `AUTH_REQUEST_TIMEOUT_SECS`: default 30
    /// - `AUTH_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// The `delogi-session` binary additionally reads `DELOGI_EMAIL`,
    /// `DELOGI_PASSWORD` (startup sign-in) and `DELOGI_SIGN_OUT_ON_EXIT`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingConfig`] when a required variable is unset
    /// and [`AuthError::ConfigParse`] when the URL is not http(s).
    pub fn from_env() -> Result<Self, AuthError> {
        let url = required_var("SUPABASE_URL")?;
        let anon_key = required_var("SUPABASE_ANON_KEY")?;
        let profile_table = std::env::var("PROFILE_TABLE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PROFILE_TABLE.to_string());
        let timeouts = HttpTimeouts {
            request_secs: env_parse("AUTH_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse("AUTH_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        Ok(Self { url: normalize_base_url(&url)?, anon_key, profile_table, timeouts })
    }
}

/// Settings for the session coordinator itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Path navigated to after sign-out.
    pub login_path: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self { login_path: DEFAULT_LOGIN_PATH.to_string() }
    }
}

impl CoordinatorConfig {
    /// Load from `AUTH_LOGIN_PATH` (default `/login`).
    #[must_use]
    pub fn from_env() -> Self {
        let login_path = std::env::var("AUTH_LOGIN_PATH")
            .ok()
            .filter(|v| v.starts_with('/'))
            .unwrap_or_else(|| DEFAULT_LOGIN_PATH.to_string());
        Self { login_path }
    }
}

fn required_var(key: &str) -> Result<String, AuthError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AuthError::MissingConfig { var: key.into() })
}

pub(crate) fn normalize_base_url(raw: &str) -> Result<String, AuthError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !(trimmed.starts_with("https://") || trimmed.starts_with("http://")) {
        return Err(AuthError::ConfigParse(format!("SUPABASE_URL must be http(s): {trimmed}")));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
