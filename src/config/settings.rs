//! Process settings read from the environment (after `dotenvy` has loaded any `.env`).

use crate::registry::DEFAULT_SITE_NAME;
use std::path::PathBuf;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_MOUNT_PATH: &str = "/api";
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// `DATABASE_URL`. Without it the in-memory store is used.
    pub database_url: Option<String>,
    /// `CONFIG_PATH`: directory holding `models.json` and `resources.json`.
    pub config_path: Option<PathBuf>,
    /// `BIND_ADDR`
    pub bind_addr: String,
    /// `SITE_NAME`
    pub site_name: String,
    /// `MOUNT_PATH`
    pub mount_path: String,
    /// `BASE_URL`, prefixed to `Location` headers when set.
    pub base_url: Option<String>,
    /// `MAX_BODY_BYTES`
    pub max_body_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_url: None,
            config_path: None,
            bind_addr: DEFAULT_BIND_ADDR.into(),
            site_name: DEFAULT_SITE_NAME.into(),
            mount_path: DEFAULT_MOUNT_PATH.into(),
            base_url: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup. Empty values count as unset; an unparsable
    /// `MAX_BODY_BYTES` falls back to the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Settings::default();
        let max_body_bytes = match get("MAX_BODY_BYTES").map(|v| v.parse::<usize>()) {
            Some(Ok(n)) => n,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "invalid MAX_BODY_BYTES, using default");
                defaults.max_body_bytes
            }
            None => defaults.max_body_bytes,
        };
        Settings {
            database_url: get("DATABASE_URL"),
            config_path: get("CONFIG_PATH").map(PathBuf::from),
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            site_name: get("SITE_NAME").unwrap_or(defaults.site_name),
            mount_path: get("MOUNT_PATH").unwrap_or(defaults.mount_path),
            base_url: get("BASE_URL"),
            max_body_bytes,
        }
    }
}
