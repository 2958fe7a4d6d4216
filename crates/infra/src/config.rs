//! Process configuration.
//!
//! Defaults live in code; environment variables prefixed `PASSPORT` override
//! them, with `__` separating nesting levels (`PASSPORT__TOKENS__SECRET`,
//! `PASSPORT__STORE__COMMIT_TIMEOUT_MS`, ...). Settings are read once at
//! startup and never reloaded.

use std::time::Duration;

use config::{Config, Environment};
use serde::Deserialize;
use thiserror::Error;

use passport_auth::{CredentialError, CredentialHasher, IssuerConfig};
use passport_observability::LogSettings;

const MIN_SECRET_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid hashing parameters: {0}")]
    Hashing(#[from] CredentialError),
}

#[derive(Clone, Deserialize)]
pub struct TokenSettings {
    /// HMAC signing secret for access tokens.
    pub secret: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
}

impl core::fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenSettings")
            .field("secret", &"<redacted>")
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .finish()
    }
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct HashingSettings {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    pub commit_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub tokens: TokenSettings,
    pub hashing: HashingSettings,
    pub store: StoreSettings,
    pub log: LogSettings,
}

impl Settings {
    /// Load from defaults plus the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Environment::with_prefix("PASSPORT"))
    }

    /// Load from defaults plus the given environment source.
    pub fn load_from(environment: Environment) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("tokens.secret", "")?
            .set_default("tokens.access_ttl_secs", 900)? // 15 minutes
            .set_default("tokens.refresh_ttl_secs", 604_800)? // 7 days
            .set_default("hashing.memory_kib", 19_456)?
            .set_default("hashing.iterations", 2)?
            .set_default("hashing.parallelism", 1)?
            .set_default("store.commit_timeout_ms", 5_000)?
            .set_default("log.level", "info")?
            .set_default("log.json", true)?
            .add_source(environment.separator("__").try_parsing(true))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tokens.secret.len() < MIN_SECRET_BYTES {
            return Err(ConfigError::Invalid(format!(
                "token secret must be at least {MIN_SECRET_BYTES} bytes"
            )));
        }

        if self.tokens.access_ttl_secs <= 0 || self.tokens.refresh_ttl_secs <= 0 {
            return Err(ConfigError::Invalid("token lifetimes must be positive".to_string()));
        }

        if self.tokens.access_ttl_secs >= self.tokens.refresh_ttl_secs {
            return Err(ConfigError::Invalid(
                "access token lifetime must be shorter than refresh token lifetime".to_string(),
            ));
        }

        if self.store.commit_timeout_ms == 0 {
            return Err(ConfigError::Invalid("commit timeout must be greater than 0".to_string()));
        }

        Ok(())
    }

    pub fn issuer_config(&self) -> IssuerConfig {
        IssuerConfig::new(
            self.tokens.secret.as_bytes().to_vec(),
            chrono::Duration::seconds(self.tokens.access_ttl_secs),
            chrono::Duration::seconds(self.tokens.refresh_ttl_secs),
        )
    }

    pub fn hasher(&self) -> Result<CredentialHasher, ConfigError> {
        Ok(CredentialHasher::with_params(
            self.hashing.memory_kib,
            self.hashing.iterations,
            self.hashing.parallelism,
        )?)
    }

    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.store.commit_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn env(vars: &[(&str, &str)]) -> Environment {
        let mut source = config::Map::new();
        for (key, value) in vars {
            source.insert(key.to_string(), value.to_string());
        }
        Environment::with_prefix("PASSPORT").source(Some(source))
    }

    #[test]
    fn defaults_apply_without_environment() {
        let settings = Settings::load_from(env(&[])).unwrap();
        assert_eq!(settings.tokens.access_ttl_secs, 900);
        assert_eq!(settings.tokens.refresh_ttl_secs, 604_800);
        assert_eq!(settings.store.commit_timeout_ms, 5_000);
        assert_eq!(settings.log.level, "info");
        assert!(settings.log.json);
        // No secret configured.
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn environment_overrides_nested_keys() {
        let settings = Settings::load_from(env(&[
            ("PASSPORT__TOKENS__SECRET", SECRET),
            ("PASSPORT__TOKENS__ACCESS_TTL_SECS", "60"),
            ("PASSPORT__STORE__COMMIT_TIMEOUT_MS", "250"),
            ("PASSPORT__LOG__JSON", "false"),
        ]))
        .unwrap();

        assert_eq!(settings.tokens.secret, SECRET);
        assert_eq!(settings.tokens.access_ttl_secs, 60);
        assert_eq!(settings.commit_timeout(), Duration::from_millis(250));
        assert!(!settings.log.json);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn rejects_access_ttl_not_below_refresh_ttl() {
        let settings = Settings::load_from(env(&[
            ("PASSPORT__TOKENS__SECRET", SECRET),
            ("PASSPORT__TOKENS__ACCESS_TTL_SECS", "3600"),
            ("PASSPORT__TOKENS__REFRESH_TTL_SECS", "3600"),
        ]))
        .unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_zero_commit_timeout() {
        let mut settings =
            Settings::load_from(env(&[("PASSPORT__TOKENS__SECRET", SECRET)])).unwrap();
        settings.store.commit_timeout_ms = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn builds_runtime_components() {
        let settings = Settings::load_from(env(&[("PASSPORT__TOKENS__SECRET", SECRET)])).unwrap();
        let issuer = settings.issuer_config();
        assert_eq!(issuer.access_token_ttl(), chrono::Duration::minutes(15));
        assert!(settings.hasher().is_ok());
        assert!(!format!("{settings:?}").contains(SECRET));
    }
}
