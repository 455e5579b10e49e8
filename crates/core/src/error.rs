use thiserror::Error;

/// Failure of a single HTTP exchange, as reported by a transport adapter.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("could not read response body from {url}: {message}")]
    Body { url: String, message: String },

    #[error("timeout after {0}s")]
    Timeout(u64),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Parse(String),

    #[error("invalid configuration value for {key}: {message}")]
    Invalid { key: String, message: String },

    #[error("missing required environment variable: {0}")]
    MissingSecret(String),
}
