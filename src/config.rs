//! YAML settings and seed data.
//!
//! One file drives the whole server: listener/urls, store tuning, and the
//! static users/personas the directory is built from. Durations are humane
//! strings (`500ms`, `30s`, `8h`, `14d`).

use crate::directory::SeedUser;
use crate::store::token::TokenOptions;
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_ROOT_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub core: CoreSettings,
    #[serde(default)]
    pub token: TokenSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub skin_domains: Vec<String>,
    /// Free-form metadata surfaced verbatim on `GET /`.
    #[serde(default)]
    pub meta: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub users: Vec<SeedUser>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ServerSettings {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public base URL; texture URLs are derived from it.
    #[serde(default = "default_root_url")]
    pub root_url: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            root_url: DEFAULT_ROOT_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CoreSettings {
    /// Allow authenticating with a persona name in place of the email.
    #[serde(default)]
    pub login_with_character_name: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TokenSettings {
    #[serde(default = "default_fully_expired", deserialize_with = "humane_duration")]
    pub time_to_fully_expired: Duration,
    #[serde(default)]
    pub enable_time_to_partially_expired: bool,
    #[serde(
        default = "default_partially_expired",
        deserialize_with = "humane_duration"
    )]
    pub time_to_partially_expired: Duration,
    #[serde(default)]
    pub only_last_session_available: bool,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            time_to_fully_expired: default_fully_expired(),
            enable_time_to_partially_expired: false,
            time_to_partially_expired: default_partially_expired(),
            only_last_session_available: false,
        }
    }
}

impl TokenSettings {
    #[must_use]
    pub fn options(&self) -> TokenOptions {
        TokenOptions {
            time_to_fully_expired: self.time_to_fully_expired,
            enable_time_to_partially_expired: self.enable_time_to_partially_expired,
            time_to_partially_expired: self.time_to_partially_expired,
            only_last_session_available: self.only_last_session_available,
            ..TokenOptions::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SessionSettings {
    #[serde(default = "default_auth_expire", deserialize_with = "humane_duration")]
    pub auth_expire_time: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            auth_expire_time: default_auth_expire(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RateLimitSettings {
    #[serde(default = "default_limit_duration", deserialize_with = "humane_duration")]
    pub limit_duration: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            limit_duration: default_limit_duration(),
        }
    }
}

impl Settings {
    /// Load and parse the settings file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read configuration {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("invalid configuration {}", path.display()))
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_root_url() -> String {
    DEFAULT_ROOT_URL.to_string()
}

fn default_fully_expired() -> Duration {
    Duration::from_secs(14 * 24 * 60 * 60)
}

fn default_partially_expired() -> Duration {
    Duration::from_secs(8 * 60 * 60)
}

fn default_auth_expire() -> Duration {
    Duration::from_secs(30)
}

fn default_limit_duration() -> Duration {
    Duration::from_secs(1)
}

/// Parse `500ms` / `30s` / `5m` / `8h` / `14d`. A bare number is seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration: {s:?}"))?;
    let scaled = |unit_secs: u64| {
        value
            .checked_mul(unit_secs)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration out of range: {s:?}"))
    };
    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "" | "s" => Ok(Duration::from_secs(value)),
        "m" => scaled(60),
        "h" => scaled(60 * 60),
        "d" => scaled(24 * 60 * 60),
        _ => Err(format!("invalid duration unit in {s:?}")),
    }
}

fn humane_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(raw) => parse_duration(&raw).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_parse() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("8h").unwrap(), Duration::from_secs(28_800));
        assert_eq!(
            parse_duration("14d").unwrap(),
            Duration::from_secs(1_209_600)
        );
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert!(parse_duration("eleventy").is_err());
        assert!(parse_duration("10fortnights").is_err());
        // Scaling must reject what it cannot represent instead of wrapping.
        assert!(parse_duration("99999999999999999d").is_err());
        assert!(parse_duration(&format!("{}h", u64::MAX)).is_err());
    }

    #[test]
    fn empty_document_yields_defaults() {
        let settings: Settings = serde_yaml::from_str("{}").unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.root_url, "http://localhost:8080");
        assert!(!settings.core.login_with_character_name);
        assert_eq!(
            settings.token.time_to_fully_expired,
            Duration::from_secs(14 * 24 * 60 * 60)
        );
        assert_eq!(settings.session.auth_expire_time, Duration::from_secs(30));
        assert_eq!(settings.rate_limit.limit_duration, Duration::from_secs(1));
        assert!(settings.users.is_empty());
    }

    #[test]
    fn full_document_parses() {
        let settings: Settings = serde_yaml::from_str(
            r"
server:
  port: 9000
  root-url: https://id.example.com
core:
  login-with-character-name: true
token:
  time-to-fully-expired: 3d
  enable-time-to-partially-expired: true
  time-to-partially-expired: 8h
  only-last-session-available: true
session:
  auth-expire-time: 15s
rate-limit:
  limit-duration: 200ms
skin-domains:
  - localhost
  - .example.com
meta:
  serverName: mock
  implementationVersion: 0.1.0
users:
  - email: a@example.com
    password: secret
    characters:
      - name: Steve
        model: alex
        uploadable-textures: [skin]
",
        )
        .unwrap();

        assert_eq!(settings.server.port, 9000);
        assert!(settings.core.login_with_character_name);
        let options = settings.token.options();
        assert!(options.enable_time_to_partially_expired);
        assert!(options.only_last_session_available);
        assert_eq!(
            options.time_to_fully_expired,
            Duration::from_secs(3 * 24 * 60 * 60)
        );
        assert_eq!(
            settings.rate_limit.limit_duration,
            Duration::from_millis(200)
        );
        assert_eq!(settings.skin_domains.len(), 2);
        assert_eq!(
            settings.meta.get("serverName"),
            Some(&serde_json::json!("mock"))
        );
        assert_eq!(settings.users.len(), 1);
        assert_eq!(settings.users[0].characters[0].name.as_deref(), Some("Steve"));
    }

    #[test]
    fn bare_numeric_durations_are_seconds() {
        let settings: Settings =
            serde_yaml::from_str("session: { auth-expire-time: 45 }").unwrap();
        assert_eq!(settings.session.auth_expire_time, Duration::from_secs(45));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(serde_yaml::from_str::<Settings>("bogus: 1").is_err());
        assert!(serde_yaml::from_str::<Settings>("server: { prot: 8080 }").is_err());
    }

    #[test]
    fn missing_file_error_names_the_path() {
        let err = Settings::load(Path::new("/nonexistent/masquerade.yaml")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/masquerade.yaml"));
    }
}
