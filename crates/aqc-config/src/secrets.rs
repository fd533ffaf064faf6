//! Live venue credential resolution.
//!
//! # Contract
//! - Config YAML stores only env var NAMES (`venue.keys_env.*`).
//! - Binaries resolve once at startup and pass [`VenueSecrets`] into the
//!   venue adapter constructor; nothing else reads these env vars.
//! - `Debug` redacts values; errors name the variable, never its value.

use crate::{ConfigError, VenueSettings};

/// Resolved live venue credentials. **Values are redacted in `Debug` output.**
#[derive(Clone, Default)]
pub struct VenueSecrets {
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
}

impl std::fmt::Debug for VenueSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VenueSecrets")
            .field("api_key", &self.api_key.as_ref().map(|_| "<REDACTED>"))
            .field("api_secret", &self.api_secret.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

impl VenueSecrets {
    pub fn is_complete(&self) -> bool {
        self.api_key.is_some() && self.api_secret.is_some()
    }
}

/// Resolve a named environment variable. Unset or blank is `None`.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve venue credentials.
///
/// With `required = true` (any pool or strategy routed to the A-Book), a
/// missing key or secret is an error naming the env var.
pub fn resolve_venue_secrets(
    venue: &VenueSettings,
    required: bool,
) -> Result<VenueSecrets, ConfigError> {
    let secrets = VenueSecrets {
        api_key: resolve_env(&venue.keys_env.api_key),
        api_secret: resolve_env(&venue.keys_env.api_secret),
    };
    if required {
        if secrets.api_key.is_none() {
            return Err(ConfigError::SecretMissing {
                var: venue.keys_env.api_key.clone(),
                what: "venue api_key",
            });
        }
        if secrets.api_secret.is_none() {
            return Err(ConfigError::SecretMissing {
                var: venue.keys_env.api_secret.clone(),
                what: "venue api_secret",
            });
        }
    }
    Ok(secrets)
}
