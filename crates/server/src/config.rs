//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `FARMLINK_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! ## Optional
//! - `FARMLINK_HOST` - Bind address (default: 127.0.0.1)
//! - `FARMLINK_PORT` - Listen port (default: 3000)
//! - `SHIPPING_FEE_HOME` - Tax-inclusive home delivery fee in yen (default: 400)
//! - `SHIPPING_FEE_PICKUP` - Tax-inclusive pickup fee in yen (default: 0)
//! - `SHIPPING_FEE_RESTAURANT` - Tax-inclusive restaurant route fee in yen (default: 0)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`
//!
//! ## Optional (LINE - enables order notifications)
//! - `LINE_BUYER_CHANNEL_ID` / `LINE_BUYER_CHANNEL_SECRET` - Channel messaging buyers
//! - `LINE_PRODUCER_CHANNEL_ID` / `LINE_PRODUCER_CHANNEL_SECRET` - Channel messaging farmers
//! - `LINE_API_BASE` - API base URL (default: <https://api.line.me>)
//! - `LINE_SEND_TIMEOUT_SECS` - Per-request timeout (default: 10)
//! - `LINE_TEST_USER_ID` - Recipient used for buyers without a linked LINE account
//!
//! ## Optional (TLS)
//! - `FARMLINK_TLS_CERT` - PEM-encoded certificate chain
//! - `FARMLINK_TLS_KEY` - PEM-encoded private key

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use farmlink_core::pricing::ShippingFeeTable;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use crate::line::ChannelCredentials;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_LINE_API_BASE: &str = "https://api.line.me";
const DEFAULT_LINE_TIMEOUT_SECS: u64 = 10;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Flat shipping fees per delivery kind
    pub shipping_fees: ShippingFeeTable,
    /// LINE messaging (optional - notifications are disabled without it)
    pub line: Option<LineConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "staging", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
    /// TLS configuration for HTTPS (optional)
    pub tls: Option<TlsConfig>,
}

/// LINE Messaging API configuration.
///
/// Buyers and farmers are reached through separate channels, each with its
/// own credentials.
#[derive(Debug, Clone)]
pub struct LineConfig {
    pub api_base: Url,
    pub send_timeout: Duration,
    pub buyer_channel: ChannelCredentials,
    pub producer_channel: ChannelCredentials,
    /// Fallback recipient for buyers without a linked account.
    pub test_user_id: Option<String>,
}

impl LineConfig {
    /// Load LINE configuration from environment.
    ///
    /// Returns `None` when none of the channel variables are set.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let vars = [
            get_optional_env("LINE_BUYER_CHANNEL_ID"),
            get_optional_env("LINE_BUYER_CHANNEL_SECRET"),
            get_optional_env("LINE_PRODUCER_CHANNEL_ID"),
            get_optional_env("LINE_PRODUCER_CHANNEL_SECRET"),
        ];

        if vars.iter().all(Option::is_none) {
            return Ok(None);
        }

        let [
            Some(buyer_id),
            Some(buyer_secret),
            Some(producer_id),
            Some(producer_secret),
        ] = vars
        else {
            return Err(ConfigError::InvalidEnvVar(
                "LINE_*_CHANNEL_*".to_string(),
                "All of LINE_BUYER_CHANNEL_ID, LINE_BUYER_CHANNEL_SECRET, \
                 LINE_PRODUCER_CHANNEL_ID and LINE_PRODUCER_CHANNEL_SECRET must be set together"
                    .to_string(),
            ));
        };

        // Validate secrets if present
        for (secret, var_name) in [
            (&buyer_secret, "LINE_BUYER_CHANNEL_SECRET"),
            (&producer_secret, "LINE_PRODUCER_CHANNEL_SECRET"),
        ] {
            if let Err(e) = validate_secret_strength(secret, var_name) {
                tracing::warn!("{var_name} validation warning: {e}");
            }
        }

        let api_base = Url::parse(&get_env_or_default("LINE_API_BASE", DEFAULT_LINE_API_BASE))
            .map_err(|e| ConfigError::InvalidEnvVar("LINE_API_BASE".to_string(), e.to_string()))?;
        let timeout_secs = parse_env_or_default("LINE_SEND_TIMEOUT_SECS", DEFAULT_LINE_TIMEOUT_SECS)?;

        Ok(Some(Self {
            api_base,
            send_timeout: Duration::from_secs(timeout_secs),
            buyer_channel: ChannelCredentials::new(buyer_id, SecretString::from(buyer_secret)),
            producer_channel: ChannelCredentials::new(
                producer_id,
                SecretString::from(producer_secret),
            ),
            test_user_id: get_optional_env("LINE_TEST_USER_ID").filter(|s| !s.is_empty()),
        }))
    }
}

/// TLS configuration for HTTPS.
#[derive(Clone)]
pub struct TlsConfig {
    /// PEM-encoded certificate chain
    pub cert_pem: String,
    /// PEM-encoded private key
    pub key_pem: SecretString,
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("cert_pem", &"[CERTIFICATE]")
            .field("key_pem", &"[REDACTED]")
            .finish()
    }
}

impl TlsConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let cert_pem = get_optional_env("FARMLINK_TLS_CERT");
        let key_pem = get_optional_env("FARMLINK_TLS_KEY");

        match (cert_pem, key_pem) {
            (Some(cert), Some(key)) => Ok(Some(Self {
                cert_pem: cert,
                key_pem: SecretString::from(key),
            })),
            (None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "FARMLINK_TLS_*".to_string(),
                "Both FARMLINK_TLS_CERT and FARMLINK_TLS_KEY must be set together".to_string(),
            )),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid, or
    /// if a variable group is only partially set.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("FARMLINK_DATABASE_URL")?;
        let host = get_env_or_default("FARMLINK_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("FARMLINK_HOST".to_string(), e.to_string()))?;
        let port = parse_env_or_default("FARMLINK_PORT", 3000_u16)?;

        let defaults = ShippingFeeTable::default();
        let shipping_fees = ShippingFeeTable {
            home: parse_env_or_default("SHIPPING_FEE_HOME", defaults.home)?,
            pickup: parse_env_or_default("SHIPPING_FEE_PICKUP", defaults.pickup)?,
            route: parse_env_or_default("SHIPPING_FEE_RESTAURANT", defaults.route)?,
        };

        let line = LineConfig::from_env()?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.1);
        let tls = TlsConfig::from_env()?;

        Ok(Self {
            database_url,
            host,
            port,
            shipping_fees,
            line,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
            tls,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Returns the LINE configuration, if notifications are enabled.
    #[must_use]
    pub const fn line(&self) -> Option<&LineConfig> {
        self.line.as_ref()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get database URL with fallback to generic `DATABASE_URL` (used by Fly.io postgres attach).
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an optional environment variable, falling back to `default` when unset.
fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |raw| parse_value(key, &raw))
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the secret issued by the LINE console."
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_edges() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("ab") - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_placeholder_channel_secret_is_flagged() {
        let err = validate_secret_strength("your-channel-secret", "LINE_BUYER_CHANNEL_SECRET")
            .expect_err("placeholder");
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_channel_secret_shaped_value_passes() {
        assert!(
            validate_secret_strength("8f2c1e9a7b3d4065ac1f92e8d7b6a5c4", "LINE_BUYER_CHANNEL_SECRET")
                .is_ok()
        );
    }

    #[test]
    fn test_parse_value_reports_variable() {
        let err = parse_value::<u64>("SHIPPING_FEE_HOME", "four hundred").expect_err("not a number");
        match err {
            ConfigError::InvalidEnvVar(key, _) => assert_eq!(key, "SHIPPING_FEE_HOME"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(parse_value::<u64>("SHIPPING_FEE_HOME", " 500 ").ok(), Some(500));
    }

    #[test]
    fn test_socket_addr() {
        let config = ServerConfig {
            database_url: SecretString::from("postgres://localhost/farmlink"),
            host: "127.0.0.1".parse().expect("valid ip"),
            port: 3000,
            shipping_fees: ShippingFeeTable::default(),
            line: None,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.1,
            tls: None,
        };

        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
        assert!(config.line().is_none());
    }

    #[test]
    fn test_tls_config_debug_redacts_key() {
        let config = TlsConfig {
            cert_pem: "-----BEGIN CERTIFICATE-----".to_string(),
            key_pem: SecretString::from("super_private_key_material"),
        };

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_private_key_material"));
    }
}
