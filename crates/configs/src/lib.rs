//! # configs
//!
//! Layered service settings. Sources, lowest precedence first: built-in
//! defaults, `config/default.toml`, `config/local.toml`, then `FORUM__*`
//! environment variables (`FORUM__DATABASE__URL`, `FORUM__MEDIA__S3__BUCKET`).

use std::path::PathBuf;

use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub media: MediaSettings,
    pub identity: IdentitySettings,
    pub log: LogSettings,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Deadline applied to every storage call made on behalf of a request.
    pub request_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { host: "0.0.0.0".into(), port: 8000, request_timeout_secs: 5 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self { url: "sqlite://forum.db?mode=rwc".into(), max_connections: 5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaBackend {
    #[default]
    Local,
    S3,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MediaSettings {
    pub backend: MediaBackend,
    pub max_upload_bytes: usize,
    pub local: LocalMediaSettings,
    pub s3: S3MediaSettings,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            backend: MediaBackend::Local,
            max_upload_bytes: 10 * 1024 * 1024,
            local: LocalMediaSettings::default(),
            s3: S3MediaSettings::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LocalMediaSettings {
    pub root: PathBuf,
    pub public_base_url: String,
    /// Empty means the binary generates a key per process, which
    /// invalidates outstanding links on restart.
    pub signing_key: SecretString,
}

impl Default for LocalMediaSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data/media"),
            public_base_url: "http://localhost:8000/api/v1/media".into(),
            signing_key: SecretString::from(String::new()),
        }
    }
}

impl LocalMediaSettings {
    pub fn has_signing_key(&self) -> bool {
        !self.signing_key.expose_secret().is_empty()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct S3MediaSettings {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key: SecretString,
    pub secret_key: SecretString,
}

impl Default for S3MediaSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".into(),
            region: "us-east-1".into(),
            bucket: "bucket".into(),
            access_key: SecretString::from("minioadmin".to_string()),
            secret_key: SecretString::from("minioadmin".to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IdentitySettings {
    /// Mixed into submitter hashes. Empty keeps tokens stable across
    /// deployments.
    pub salt: SecretString,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self { salt: SecretString::from(String::new()) }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive, overridden by `RUST_LOG` when set.
    pub level: String,
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self { level: "info".into(), json: false }
    }
}

impl Settings {
    /// Reads `.env`, the optional TOML files, and the environment.
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        let builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("FORUM")
                    .separator("__")
                    .try_parsing(true),
            );
        Self::build(builder)
    }

    /// Settings from a single TOML document layered over the defaults.
    pub fn from_toml(source: &str) -> Result<Self> {
        Self::build(Config::builder().add_source(File::from_str(source, FileFormat::Toml)))
    }

    fn build(builder: ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.server.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("server.request_timeout_secs must be positive".into()));
        }
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Invalid("database.url must be set".into()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid("database.max_connections must be positive".into()));
        }
        if self.media.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid("media.max_upload_bytes must be positive".into()));
        }
        if self.media.backend == MediaBackend::S3 && self.media.s3.bucket.trim().is_empty() {
            return Err(ConfigError::Invalid("media.s3.bucket must be set".into()));
        }
        Ok(())
    }
}

impl ServerSettings {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let s = Settings::from_toml("").unwrap();
        assert_eq!(s.server.bind_address(), "0.0.0.0:8000");
        assert_eq!(s.server.request_timeout_secs, 5);
        assert_eq!(s.database.url, "sqlite://forum.db?mode=rwc");
        assert_eq!(s.media.backend, MediaBackend::Local);
        assert_eq!(s.media.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(s.media.s3.bucket, "bucket");
        assert_eq!(s.media.s3.secret_key.expose_secret(), "minioadmin");
        assert!(!s.media.local.has_signing_key());
        assert!(!s.log.json);
    }

    #[test]
    fn nested_sections_override_defaults() {
        let s = Settings::from_toml(
            r#"
            [server]
            port = 9100

            [media]
            backend = "s3"

            [media.s3]
            bucket = "uploads"

            [identity]
            salt = "pepper"
            "#,
        )
        .unwrap();
        assert_eq!(s.server.port, 9100);
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.media.backend, MediaBackend::S3);
        assert_eq!(s.media.s3.bucket, "uploads");
        assert_eq!(s.media.s3.region, "us-east-1");
        assert_eq!(s.identity.salt.expose_secret(), "pepper");
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let err = Settings::from_toml("[media]\nbackend = \"ftp\"").unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = Settings::from_toml("[server]\nrequest_timeout_secs = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn secrets_are_redacted_in_debug_output() {
        let s = Settings::from_toml("[media.local]\nsigning_key = \"hunter2\"").unwrap();
        assert!(s.media.local.has_signing_key());
        assert!(!format!("{s:?}").contains("hunter2"));
    }
}
