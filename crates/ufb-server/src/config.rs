use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, bail};

use ufb_api::ApiConfig;

const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
    pub session_upstream_url: String,
    pub secure_cookies: bool,
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {}='{}': {}", key, raw, e)),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup` so tests don't touch the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = lookup("UFB_JWT_SECRET").unwrap_or_default();
        if jwt_secret.trim().is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("UFB_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let host = lookup("UFB_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = parse_or(&lookup, "UFB_PORT", 4000)?;
        let db_path = lookup("UFB_DB_PATH").unwrap_or_else(|| "ufb.db".into()).into();

        let access_token_minutes: i64 = parse_or(&lookup, "UFB_ACCESS_TOKEN_MINUTES", 60)?;
        let refresh_token_days: i64 = parse_or(&lookup, "UFB_REFRESH_TOKEN_DAYS", 30)?;
        if access_token_minutes <= 0 || refresh_token_days <= 0 {
            bail!("token lifetimes must be positive");
        }

        let session_upstream_url = lookup("UFB_SESSION_UPSTREAM_URL")
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", port));
        let secure_cookies = parse_or(&lookup, "UFB_SECURE_COOKIES", false)
            .context("UFB_SECURE_COOKIES must be true or false")?;

        Ok(Self {
            host,
            port,
            db_path,
            jwt_secret,
            access_token_minutes,
            refresh_token_days,
            session_upstream_url,
            secure_cookies,
        })
    }

    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            jwt_secret: self.jwt_secret.clone(),
            access_token_ttl: chrono::Duration::minutes(self.access_token_minutes),
            refresh_token_ttl: chrono::Duration::days(self.refresh_token_days),
            session_upstream_url: self.session_upstream_url.clone(),
            secure_cookies: self.secure_cookies,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::from_lookup(lookup(&[("UFB_JWT_SECRET", "a-real-secret")])).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 4000);
        assert_eq!(config.db_path, PathBuf::from("ufb.db"));
        assert_eq!(config.access_token_minutes, 60);
        assert_eq!(config.refresh_token_days, 30);
        assert_eq!(config.session_upstream_url, "http://127.0.0.1:4000");
        assert!(!config.secure_cookies);
        assert_eq!(config.api_config().access_token_ttl, chrono::Duration::minutes(60));
    }

    #[test]
    fn rejects_missing_or_placeholder_secret() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("UFB_JWT_SECRET", "dev-secret-change-me")])).is_err());
        assert!(Config::from_lookup(lookup(&[("UFB_JWT_SECRET", "   ")])).is_err());
    }

    #[test]
    fn overrides_and_bad_values() {
        let config = Config::from_lookup(lookup(&[
            ("UFB_JWT_SECRET", "a-real-secret"),
            ("UFB_PORT", "8080"),
            ("UFB_SECURE_COOKIES", "true"),
            ("UFB_SESSION_UPSTREAM_URL", "http://api.internal:3000"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert!(config.secure_cookies);
        assert_eq!(config.session_upstream_url, "http://api.internal:3000");

        assert!(
            Config::from_lookup(lookup(&[("UFB_JWT_SECRET", "a-real-secret"), ("UFB_PORT", "http")])).is_err()
        );
        assert!(
            Config::from_lookup(lookup(&[
                ("UFB_JWT_SECRET", "a-real-secret"),
                ("UFB_ACCESS_TOKEN_MINUTES", "0"),
            ]))
            .is_err()
        );
    }
}
