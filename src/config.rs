// src/config.rs
//! Startup configuration.
//!
//! Sources, later ones winning:
//! 1. `.env` (loaded into the process environment by `dotenv`)
//! 2. `snapapi.toml`, or the file named by `SNAP_CONFIG` (optional)
//! 3. `SNAP_*` environment variables, `__` separating nested keys
//!    (`SNAP_PARTNER__CLIENT_ID`, `SNAP_CACHE__BACKEND`, ...)
//!
//! Only the binary calls into this module; the library core never reads
//! files or the environment.

use crate::keys::credential::{Credential, CredentialError, KeyMaterial};
use crate::models::token::DEFAULT_EXPIRES_IN;
use crate::services::pipeline::PartnerPolicy;
use crate::storage::idempotency::CacheBackend;
use crate::utils::canonical::BodyOrdering;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "snapapi.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Source(#[from] config::ConfigError),

    #[error("failed to read key file {path}: {source}")]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Credential(#[from] CredentialError),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Prefix of every idempotency key.
    pub namespace: String,
    /// Bearer token lifetime in seconds.
    pub token_expire: u64,
    /// Idempotency backend timeout in seconds.
    pub timeout: u64,
    pub server: ServerSettings,
    pub cache: CacheSettings,
    pub partner: PartnerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            namespace: "snapapi".to_string(),
            token_expire: DEFAULT_EXPIRES_IN,
            timeout: 9,
            server: ServerSettings::default(),
            cache: CacheSettings::default(),
            partner: PartnerSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: SocketAddr,
    /// Origins allowed by CORS. Empty allows none.
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub backend: CacheBackend,
    pub redis_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PartnerSettings {
    pub client_id: String,
    pub client_secret: String,
    pub token_passphrase: String,
    /// DER `RSAPublicKey` of the partner, used to verify token requests.
    pub public_key_path: Option<PathBuf>,
    /// DER private key (PKCS#8 or PKCS#1), when acting as the partner.
    pub private_key_path: Option<PathBuf>,
    pub signature_fallback_header: Option<String>,
    pub body_ordering: BodyOrdering,
}

impl PartnerSettings {
    pub fn policy(&self) -> PartnerPolicy {
        PartnerPolicy {
            signature_fallback_header: self
                .signature_fallback_header
                .as_ref()
                .map(|name| name.to_ascii_lowercase()),
            body_ordering: self.body_ordering,
        }
    }
}

impl Settings {
    /// Loads settings from the default sources.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let file = std::env::var("SNAP_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&file)
    }

    /// Loads settings from `file` (optional) and the environment.
    pub fn load_from(file: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(file).required(false))
            .add_source(
                config::Environment::with_prefix("SNAP")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// Builds the partner credential, reading whichever key file is configured.
/// A private key wins over a public key when both are set.
pub fn load_credential(partner: &PartnerSettings) -> Result<Credential, ConfigError> {
    let key = match (&partner.private_key_path, &partner.public_key_path) {
        (Some(path), _) => Some(KeyMaterial::private_from_file_bytes(&read_key(path)?)?),
        (None, Some(path)) => Some(KeyMaterial::public_from_file_bytes(&read_key(path)?)?),
        (None, None) => {
            log::warn!("no partner key configured; token requests cannot be verified");
            None
        }
    };
    let credential = Credential::new(
        partner.client_id.clone(),
        partner.client_secret.clone(),
        partner.token_passphrase.clone(),
        key,
    )?;
    Ok(credential)
}

fn read_key(path: &Path) -> Result<Vec<u8>, ConfigError> {
    std::fs::read(path).map_err(|source| ConfigError::KeyFile {
        path: path.to_path_buf(),
        source,
    })
}
