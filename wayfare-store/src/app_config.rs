use serde::Deserialize;
use std::env;
use std::time::Duration;
use wayfare_core::UnitDescriptor;
use crate::memory::MemoryConfig;
use crate::StoreError;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub remote: RemoteConfig,
    pub handshake: HandshakeSettings,
    pub sandbox: SandboxConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 { 10_000 }

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Client-side timing rules for one reservation attempt
#[derive(Debug, Deserialize, Clone)]
pub struct HandshakeSettings {
    pub poll_interval_ms: u64,
    pub poll_ceiling_secs: u64,
    pub expiry_tolerance_secs: i64,
    #[serde(default = "default_retry_attempts")]
    pub payment_retry_attempts: u32,
    #[serde(default)]
    pub payment_retry_backoff_ms: u64,
}

fn default_retry_attempts() -> u32 { 3 }

impl HandshakeSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_ceiling(&self) -> Duration {
        Duration::from_secs(self.poll_ceiling_secs)
    }

    pub fn expiry_tolerance(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.expiry_tolerance_secs)
    }

    pub fn payment_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.payment_retry_backoff_ms)
    }
}

/// Behaviour of the in-memory booking service behind the sandbox server
#[derive(Debug, Deserialize, Clone)]
pub struct SandboxConfig {
    pub hold_ttl_secs: i64,
    pub payment_ttl_secs: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_checkout_base")]
    pub checkout_base_url: String,
    #[serde(default)]
    pub units: Vec<UnitDescriptor>,
}

fn default_currency() -> String { "VND".to_string() }

fn default_checkout_base() -> String { MemoryConfig::default().checkout_base_url }

impl SandboxConfig {
    pub fn memory_config(&self) -> MemoryConfig {
        MemoryConfig {
            hold_ttl: chrono::Duration::seconds(self.hold_ttl_secs),
            payment_ttl: chrono::Duration::seconds(self.payment_ttl_secs),
            currency: self.currency.clone(),
            checkout_base_url: self.checkout_base_url.clone(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, StoreError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(environment())
            .build()?;

        Ok(s.try_deserialize()?)
    }

    /// Parse a configuration from a TOML string, without files or environment
    pub fn from_toml(source: &str) -> Result<Self, StoreError> {
        let s = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;
        Ok(s.try_deserialize()?)
    }
}

/// `WAYFARE__SECTION__KEY`, e.g. `WAYFARE__SERVER__PORT=9090`
fn environment() -> config::Environment {
    config::Environment::with_prefix("WAYFARE").separator("__")
}
