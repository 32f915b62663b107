//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `CARTSYNC_ORIGIN` - Site origin for order confirmation, history and the
//!   push channel (network features are disabled without it)
//! - `CARTSYNC_API_TOKEN` - Bearer token for the backend (min 16 chars, high entropy)
//! - `CARTSYNC_STORAGE_DIR` - Directory of the durable store (default: .cartsync)
//! - `CARTSYNC_SHIPPING_FEE` - Flat shipping fee (default: free shipping)
//! - `CARTSYNC_FREE_SHIPPING_OVER` - Subtotal from which the flat fee is waived
//! - `CARTSYNC_RECONNECT_DELAY_SECS` - Push channel reconnect delay (default: 3)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;

use crate::cart::ShippingPolicy;
use crate::origin::Origin;

const MIN_TOKEN_LENGTH: usize = 16;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.0;
const DEFAULT_STORAGE_DIR: &str = ".cartsync";
const DEFAULT_RECONNECT_DELAY_SECS: &str = "3";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "token",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure token in {0}: {1}")]
    InsecureToken(String, String),
}

/// Client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    pub origin: Option<Origin>,
    pub api_token: Option<SecretString>,
    pub storage_dir: PathBuf,
    pub shipping: ShippingPolicy,
    pub reconnect_delay: Duration,
    pub sentry_dsn: Option<String>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("origin", &self.origin.as_ref().map(ToString::to_string))
            .field(
                "api_token",
                &self.api_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("storage_dir", &self.storage_dir)
            .field("shipping", &self.shipping)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("sentry_dsn", &self.sentry_dsn.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is invalid or the token fails
    /// validation (length, placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::load(&|key| std::env::var(key).ok())
    }

    fn load(env: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| env(key).filter(|value| !value.trim().is_empty());

        let origin = get("CARTSYNC_ORIGIN")
            .map(|raw| {
                Origin::parse(&raw).map_err(|e| {
                    ConfigError::InvalidEnvVar("CARTSYNC_ORIGIN".to_string(), e.to_string())
                })
            })
            .transpose()?;

        let api_token = get("CARTSYNC_API_TOKEN")
            .map(|token| {
                validate_token(&token, "CARTSYNC_API_TOKEN")?;
                Ok::<_, ConfigError>(SecretString::from(token))
            })
            .transpose()?;

        let storage_dir = PathBuf::from(
            get("CARTSYNC_STORAGE_DIR").unwrap_or_else(|| DEFAULT_STORAGE_DIR.to_string()),
        );

        let fee = parse_decimal("CARTSYNC_SHIPPING_FEE", get("CARTSYNC_SHIPPING_FEE"))?;
        let free_over = parse_decimal(
            "CARTSYNC_FREE_SHIPPING_OVER",
            get("CARTSYNC_FREE_SHIPPING_OVER"),
        )?;
        let shipping = match fee {
            Some(fee) if fee > Decimal::ZERO => ShippingPolicy::Flat { fee, free_over },
            _ => ShippingPolicy::Free,
        };

        let reconnect_secs = get("CARTSYNC_RECONNECT_DELAY_SECS")
            .unwrap_or_else(|| DEFAULT_RECONNECT_DELAY_SECS.to_string())
            .trim()
            .parse::<u64>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar(
                    "CARTSYNC_RECONNECT_DELAY_SECS".to_string(),
                    e.to_string(),
                )
            })?;

        Ok(Self {
            origin,
            api_token,
            storage_dir,
            shipping,
            reconnect_delay: Duration::from_secs(reconnect_secs),
            sentry_dsn: get("SENTRY_DSN"),
        })
    }

    /// The origin, required by network features.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if no origin is configured.
    pub fn require_origin(&self) -> Result<&Origin, ConfigError> {
        self.origin
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnvVar("CARTSYNC_ORIGIN".to_string()))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_decimal(key: &str, raw: Option<String>) -> Result<Option<Decimal>, ConfigError> {
    raw.map(|raw| {
        let value = Decimal::from_str(raw.trim())
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
        if value.is_sign_negative() {
            return Err(ConfigError::InvalidEnvVar(
                key.to_string(),
                "must not be negative".to_string(),
            ));
        }
        Ok(value)
    })
    .transpose()
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

    #[allow(clippy::cast_precision_loss)] // Token length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Reject short, placeholder-looking or low-entropy tokens.
fn validate_token(token: &str, var_name: &str) -> Result<(), ConfigError> {
    if token.len() < MIN_TOKEN_LENGTH {
        return Err(ConfigError::InsecureToken(
            var_name.to_string(),
            format!(
                "must be at least {MIN_TOKEN_LENGTH} characters (got {})",
                token.len()
            ),
        ));
    }

    let lower = token.to_lowercase();
    if let Some(pattern) = PLACEHOLDER_PATTERNS
        .iter()
        .find(|pattern| lower.contains(*pattern))
    {
        return Err(ConfigError::InsecureToken(
            var_name.to_string(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }

    let entropy = shannon_entropy(token);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureToken(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    const GOOD_TOKEN: &str = "k7Q2mZ9xR4vB8nL1";

    fn load(vars: &[(&str, &str)]) -> Result<ClientConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ClientConfig::load(&|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert!(config.origin.is_none());
        assert!(config.api_token.is_none());
        assert_eq!(config.storage_dir, PathBuf::from(".cartsync"));
        assert_eq!(config.shipping, ShippingPolicy::Free);
        assert_eq!(config.reconnect_delay, Duration::from_secs(3));
        assert!(config.require_origin().is_err());
    }

    #[test]
    fn test_full_config() {
        let config = load(&[
            ("CARTSYNC_ORIGIN", "https://shop.example.com"),
            ("CARTSYNC_API_TOKEN", GOOD_TOKEN),
            ("CARTSYNC_SHIPPING_FEE", "4.99"),
            ("CARTSYNC_FREE_SHIPPING_OVER", "50"),
            ("CARTSYNC_RECONNECT_DELAY_SECS", "10"),
        ])
        .unwrap();
        assert_eq!(
            config.require_origin().unwrap().as_url().as_str(),
            "https://shop.example.com/"
        );
        assert_eq!(
            config.api_token.as_ref().unwrap().expose_secret(),
            GOOD_TOKEN
        );
        assert_eq!(
            config.shipping,
            ShippingPolicy::Flat {
                fee: Decimal::new(499, 2),
                free_over: Some(Decimal::from(50)),
            }
        );
        assert_eq!(config.reconnect_delay, Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            load(&[("CARTSYNC_ORIGIN", "ftp://shop")]),
            Err(ConfigError::InvalidEnvVar(..))
        ));
        assert!(matches!(
            load(&[("CARTSYNC_SHIPPING_FEE", "-1")]),
            Err(ConfigError::InvalidEnvVar(..))
        ));
        assert!(matches!(
            load(&[("CARTSYNC_RECONNECT_DELAY_SECS", "soon")]),
            Err(ConfigError::InvalidEnvVar(..))
        ));
    }

    #[test]
    fn test_token_validation() {
        assert!(validate_token("short", "T").is_err());
        assert!(validate_token("your-api-token-goes-here", "T").is_err());
        assert!(validate_token("aaaaaaaaaaaaaaaaaaaa", "T").is_err());
        assert!(validate_token(GOOD_TOKEN, "T").is_ok());
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = load(&[("CARTSYNC_API_TOKEN", GOOD_TOKEN)]).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains(GOOD_TOKEN));
        assert!(debug.contains("[REDACTED]"));
    }
}
