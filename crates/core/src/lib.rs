pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, Secrets, ServiceEndpoints};
pub use error::{ConfigError, TransportError};
pub use types::*;
