//! Webhook configuration
//!
//! Settings are read from environment variables; the signing secret is never
//! hardcoded and never printed.
//!
//! - `UNIVAPAY_WEBHOOK_SECRET`: signing secret (required unless verification is skipped)
//! - `UNIVAPAY_WEBHOOK_TOLERANCE`: freshness window in seconds (default: 300, `0` disables)
//! - `UNIVAPAY_WEBHOOK_HEADER`: force a single signature header name
//! - `UNIVAPAY_WEBHOOK_SKIP_VERIFICATION`: `true` to bypass verification (development only)
//! - `UNIVAPAY_WEBHOOK_PATH`: receiver route (default: `/webhooks/univapay`)
//! - `UNIVAPAY_WEBHOOK_DEDUP_CAPACITY`: remembered event ids (default: 1000)

use std::env;
use std::fmt;

use tracing::warn;

use crate::error::ConfigError;
use crate::webhook::signature::{SignatureVerifier, DEFAULT_TOLERANCE_SECS};

/// Default receiver route
pub const DEFAULT_WEBHOOK_PATH: &str = "/webhooks/univapay";

/// Default number of event ids remembered for deduplication
pub const DEFAULT_DEDUP_CAPACITY: usize = 1000;

const ENV_SECRET: &str = "UNIVAPAY_WEBHOOK_SECRET";
const ENV_TOLERANCE: &str = "UNIVAPAY_WEBHOOK_TOLERANCE";
const ENV_HEADER: &str = "UNIVAPAY_WEBHOOK_HEADER";
const ENV_SKIP: &str = "UNIVAPAY_WEBHOOK_SKIP_VERIFICATION";
const ENV_PATH: &str = "UNIVAPAY_WEBHOOK_PATH";
const ENV_DEDUP_CAPACITY: &str = "UNIVAPAY_WEBHOOK_DEDUP_CAPACITY";

/// Verification and receiver settings
#[derive(Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    /// Signing secret shared with the provider
    pub secret: Option<String>,
    /// Freshness window for timestamped signatures; `<= 0` disables the check
    pub tolerance_s: i64,
    /// Only consult this header instead of probing the known names
    pub header_name: Option<String>,
    /// Bypass signature verification entirely.
    ///
    /// Only for local development or transports that already authenticate
    /// the sender (e.g. mutual TLS). Never enable in production otherwise.
    pub skip_verification: bool,
    /// Route served by the HTTP receiver
    pub path: String,
    /// Event ids remembered by the receiver for duplicate detection
    pub dedup_capacity: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: None,
            tolerance_s: DEFAULT_TOLERANCE_SECS,
            header_name: None,
            skip_verification: false,
            path: DEFAULT_WEBHOOK_PATH.to_string(),
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
        }
    }
}

impl fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("secret", &mask(self.secret.as_deref()))
            .field("tolerance_s", &self.tolerance_s)
            .field("header_name", &self.header_name)
            .field("skip_verification", &self.skip_verification)
            .field("path", &self.path)
            .field("dedup_capacity", &self.dedup_capacity)
            .finish()
    }
}

fn mask(secret: Option<&str>) -> String {
    match secret {
        None | Some("") => "(empty)".to_string(),
        Some(s) => format!("{}***", s.chars().take(2).collect::<String>()),
    }
}

impl WebhookConfig {
    /// Create a configuration with a signing secret and defaults elsewhere
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Some(secret.into()),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a variable is present but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let tolerance_s = match non_empty(ENV_TOLERANCE) {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|e| ConfigError::InvalidTolerance(format!("{raw}: {e}")))?,
            None => DEFAULT_TOLERANCE_SECS,
        };

        let skip_verification = match non_empty(ENV_SKIP) {
            Some(raw) => parse_flag(ENV_SKIP, &raw)?,
            None => false,
        };

        let dedup_capacity = match non_empty(ENV_DEDUP_CAPACITY) {
            Some(raw) => match raw.parse::<usize>() {
                Ok(0) => return Err(ConfigError::InvalidCapacity("capacity cannot be 0".to_string())),
                Ok(n) => n,
                Err(e) => return Err(ConfigError::InvalidCapacity(format!("{raw}: {e}"))),
            },
            None => DEFAULT_DEDUP_CAPACITY,
        };

        let config = Self {
            secret: non_empty(ENV_SECRET),
            tolerance_s,
            header_name: non_empty(ENV_HEADER),
            skip_verification,
            path: non_empty(ENV_PATH).unwrap_or_else(|| DEFAULT_WEBHOOK_PATH.to_string()),
            dedup_capacity,
        };

        if config.skip_verification {
            warn!("SECURITY: {ENV_SKIP}=true, webhook signatures will NOT be verified");
        } else if config.secret.is_none() {
            warn!("{ENV_SECRET} not set, every signed webhook will be rejected");
        }
        if config.tolerance_s <= 0 {
            warn!("SECURITY: webhook timestamp freshness check disabled (tolerance {})", config.tolerance_s);
        }

        Ok(config)
    }

    /// Create a test configuration (for testing only)
    #[cfg(test)]
    pub fn test_config() -> Self {
        Self::new("whsec_test")
    }

    /// Set the freshness window in seconds
    pub fn with_tolerance(mut self, tolerance_s: i64) -> Self {
        self.tolerance_s = tolerance_s;
        self
    }

    /// Force a single signature header name
    pub fn with_header_name(mut self, name: impl Into<String>) -> Self {
        self.header_name = Some(name.into());
        self
    }

    /// Bypass verification (development only)
    pub fn with_skip_verification(mut self, skip: bool) -> Self {
        self.skip_verification = skip;
        self
    }

    /// Set the receiver route
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set how many event ids the receiver remembers
    pub fn with_dedup_capacity(mut self, capacity: usize) -> Self {
        self.dedup_capacity = capacity.max(1);
        self
    }

    /// Verifier for the configured secret; `None` when no secret is set
    pub fn verifier(&self) -> Option<SignatureVerifier> {
        let secret = self.secret.as_deref().filter(|s| !s.is_empty())?;
        let mut verifier = SignatureVerifier::new(secret).with_tolerance(self.tolerance_s);
        if let Some(name) = &self.header_name {
            verifier = verifier.with_header_name(name.clone());
        }
        Some(verifier)
    }
}

fn parse_flag(name: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            name: name.to_string(),
            value: raw.to_string(),
        }),
    }
}
