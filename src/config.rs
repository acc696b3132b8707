//! Configuration loader for the email dispatcher.
//!
//! Values come from an optional YAML file and are then overridden by the
//! environment. Missing credentials are not an error here: they default to
//! empty strings and the call that needs them fails at run time.
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub app: App,
    pub supabase: Supabase,
    pub email: Email,
}

/// Process-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct App {
    pub bind: String,
    /// When set, notifications are read from and written to this SQLite
    /// database instead of Supabase.
    pub database_url: Option<String>,
    /// Applies to both outbound clients (Supabase and the mailer).
    pub connect_timeout_secs: u64,
    /// Whole-request deadline for outbound calls, body included.
    pub request_timeout_secs: u64,
}

impl Default for App {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".into(),
            database_url: None,
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
        }
    }
}

/// Deadlines handed to the outbound HTTP clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        App::default().http_timeouts()
    }
}

impl App {
    pub fn http_timeouts(&self) -> HttpTimeouts {
        HttpTimeouts {
            connect: Duration::from_secs(self.connect_timeout_secs),
            request: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

/// Supabase project holding the notifications.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Supabase {
    pub url: String,
    pub service_role_key: String,
}

/// Batch mailer endpoint and basic-auth credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Email {
    pub sending_url: String,
    pub username: String,
    pub password: String,
}

impl Config {
    /// Override file values with any of the recognized environment variables.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |target: &mut String, key: &str| {
            if let Some(value) = lookup(key) {
                *target = value;
            }
        };
        set(&mut self.supabase.url, "SUPABASE_URL");
        set(&mut self.supabase.service_role_key, "SUPABASE_SERVICE_ROLE_KEY");
        set(&mut self.email.sending_url, "EMAIL_SENDING_URL");
        set(&mut self.email.username, "EMAIL_SENDING_USERNAME");
        set(&mut self.email.password, "EMAIL_SENDING_PASSWORD");
        set(&mut self.app.bind, "BIND_ADDR");
        if let Some(url) = lookup("DATABASE_URL").filter(|u| !u.trim().is_empty()) {
            self.app.database_url = Some(url);
        }
        let secs = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        if let Some(v) = secs("HTTP_CONNECT_TIMEOUT_SECS") {
            self.app.connect_timeout_secs = v;
        }
        if let Some(v) = secs("HTTP_REQUEST_TIMEOUT_SECS") {
            self.app.request_timeout_secs = v;
        }
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.app
            .bind
            .parse()
            .map_err(|_| ConfigError::Invalid("app.bind must be a socket address"))
    }

    /// Names of credentials that are empty and will make their call fail.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.app.database_url.is_none() {
            if self.supabase.url.trim().is_empty() {
                missing.push("SUPABASE_URL");
            }
            if self.supabase.service_role_key.trim().is_empty() {
                missing.push("SUPABASE_SERVICE_ROLE_KEY");
            }
        }
        if self.email.sending_url.trim().is_empty() {
            missing.push("EMAIL_SENDING_URL");
        }
        if self.email.username.trim().is_empty() {
            missing.push("EMAIL_SENDING_USERNAME");
        }
        if self.email.password.is_empty() {
            missing.push("EMAIL_SENDING_PASSWORD");
        }
        missing
    }
}

/// Load configuration from an optional YAML file, then apply the process
/// environment (including a `.env` file if present).
/// - A `path` that does not exist falls back to defaults.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    dotenvy::dotenv().ok();
    let mut cfg = match path {
        Some(p) if p.exists() => {
            let content = fs::read_to_string(p)?;
            serde_yaml::from_str(&content)?
        }
        _ => Config::default(),
    };
    cfg.apply_env(|key| std::env::var(key).ok());
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance. Only server settings are fatal.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.bind.trim().is_empty() {
        return Err(ConfigError::Invalid("app.bind must be non-empty"));
    }
    cfg.bind_addr()?;
    if cfg.app.connect_timeout_secs == 0 || cfg.app.request_timeout_secs == 0 {
        return Err(ConfigError::Invalid("app timeouts must be at least one second"));
    }

    for name in cfg.missing_credentials() {
        warn!(setting = name, "not configured; the call using it will fail");
    }
    Ok(())
}

/// Example configuration file.
pub fn example() -> &'static str {
    r#"app:
  bind: "0.0.0.0:8000"
  # database_url: "sqlite://./data/notifications.db"
  connect_timeout_secs: 10
  request_timeout_secs: 30

supabase:
  url: "https://YOUR_PROJECT.supabase.co"
  service_role_key: "YOUR_SERVICE_ROLE_KEY"

email:
  sending_url: "https://mailer.example.com/send"
  username: "mailer-user"
  password: "mailer-password"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.email.username, "mailer-user");
        assert!(cfg.app.database_url.is_none());
        assert!(cfg.missing_credentials().is_empty());
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let cfg: Config = serde_yaml::from_str("app:\n  bind: \"127.0.0.1:9000\"\n").unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.supabase.url, "");
        assert_eq!(cfg.email.password, "");
        assert_eq!(
            cfg.missing_credentials(),
            vec![
                "SUPABASE_URL",
                "SUPABASE_SERVICE_ROLE_KEY",
                "EMAIL_SENDING_URL",
                "EMAIL_SENDING_USERNAME",
                "EMAIL_SENDING_PASSWORD",
            ]
        );
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        let env: HashMap<&str, &str> = [
            ("SUPABASE_URL", "http://127.0.0.1:54321"),
            ("EMAIL_SENDING_PASSWORD", "s3cret"),
            ("DATABASE_URL", "sqlite::memory:"),
        ]
        .into_iter()
        .collect();
        cfg.apply_env(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(cfg.supabase.url, "http://127.0.0.1:54321");
        assert_eq!(cfg.supabase.service_role_key, "YOUR_SERVICE_ROLE_KEY");
        assert_eq!(cfg.email.password, "s3cret");
        assert_eq!(cfg.app.database_url.as_deref(), Some("sqlite::memory:"));
    }

    #[test]
    fn timeouts_default_and_override() {
        let cfg: Config = serde_yaml::from_str("app:\n  request_timeout_secs: 5\n").unwrap();
        validate(&cfg).unwrap();
        assert_eq!(
            cfg.app.http_timeouts(),
            HttpTimeouts {
                connect: Duration::from_secs(10),
                request: Duration::from_secs(5),
            }
        );

        let mut cfg = cfg;
        let env: HashMap<&str, &str> = [
            ("HTTP_CONNECT_TIMEOUT_SECS", "3"),
            ("HTTP_REQUEST_TIMEOUT_SECS", "soon"),
        ]
        .into_iter()
        .collect();
        cfg.apply_env(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(cfg.app.connect_timeout_secs, 3);
        assert_eq!(cfg.app.request_timeout_secs, 5);
    }

    #[test]
    fn zero_timeout_is_invalid() {
        let mut cfg = Config::default();
        cfg.app.request_timeout_secs = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_bind_address() {
        let mut cfg = Config::default();
        cfg.app.bind = "".into();
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("app.bind")), _ => panic!("wrong error") }

        cfg.app.bind = "not-an-address".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert!(cfg.bind_addr().is_ok());
    }

    #[test]
    fn load_without_file_uses_defaults() {
        let td = tempdir().unwrap();
        let cfg = load(Some(&td.path().join("absent.yaml"))).unwrap();
        assert_eq!(cfg.app.bind, "0.0.0.0:8000");
    }
}
