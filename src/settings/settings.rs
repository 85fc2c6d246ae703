use anyhow::{Result, anyhow, ensure};
use config::{Config, File};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub auth: Auth,
    pub store: Store,
    pub principal: Principal,
    pub http: Http,
    pub log: Log,
}

#[derive(Deserialize)]
pub struct Auth {
    pub max_sessions: usize,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    pub issuer: String,
    pub audience: String,
    /// Falls back to the `JWT_SIGNING_KEY` environment variable.
    pub signing_key: Option<String>,
}

impl Auth {
    pub fn access_ttl(&self) -> Duration {
        Duration::from_secs(self.access_ttl_secs)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_ttl_secs)
    }

    pub fn signing_key(&self) -> Result<Vec<u8>> {
        let key = match &self.signing_key {
            Some(key) => key.clone(),
            None => std::env::var("JWT_SIGNING_KEY")
                .map_err(|_| anyhow!("no auth.signing_key and JWT_SIGNING_KEY is unset"))?,
        };
        ensure!(!key.is_empty(), "signing key is empty");
        Ok(key.into_bytes())
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auth")
            .field("max_sessions", &self.max_sessions)
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("signing_key", &self.signing_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Deserialize)]
pub struct Store {
    pub backend: String, // "memory", "mysql" or "redis"
    pub mysql_dsn: Option<String>,
    pub redis_dsn: Option<String>,
    #[serde(default = "default_redis_prefix")]
    pub redis_prefix: String,
}

fn default_redis_prefix() -> String {
    "rotor".to_string()
}

#[derive(Debug, Deserialize)]
pub struct Principal {
    pub backend: String, // "memory" or "mysql"
    #[serde(default)]
    pub seed: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub address: String,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Http {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn tls(&self) -> Option<(&str, &str)> {
        match (&self.cert_path, &self.key_path) {
            (Some(cert), Some(key)) => Some((cert.as_str(), key.as_str())),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.auth.max_sessions >= 1, "auth.max_sessions must be at least 1");
        ensure!(self.auth.access_ttl_secs > 0, "auth.access_ttl_secs must be positive");
        ensure!(self.auth.refresh_ttl_secs > 0, "auth.refresh_ttl_secs must be positive");
        ensure!(
            self.http.request_timeout_secs > 0,
            "http.request_timeout_secs must be positive"
        );
        ensure!(
            self.http.cert_path.is_some() == self.http.key_path.is_some(),
            "http.cert_path and http.key_path go together"
        );
        Ok(())
    }
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    settings.validate()?;
    Ok(settings)
}
