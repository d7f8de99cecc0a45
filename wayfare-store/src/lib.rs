pub mod app_config;
pub mod memory;
pub mod wire;
pub mod http;

pub use memory::{MemoryBookingService, MemoryConfig, Operation};
pub use http::HttpBookingClient;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid remote URL: {0}")]
    InvalidUrl(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
