use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Entity not found: {entity_id}")]
    EntityNotFound { entity_id: String },

    #[error("Upstream fetch from {url} failed: {details}")]
    UpstreamFetch { url: String, details: String },

    #[error("Invalid device configuration for {device}: {details}")]
    Configuration { device: String, details: String },

    #[error("Stream server error: {0}")]
    Stream(#[from] StreamError),

    #[error("System error: {message}")]
    System { message: String },
}

/// Errors raised while bringing the HTTP relay up
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Failed to bind {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server startup failed: {details}")]
    StartupFailed { details: String },
}

impl RelayError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn not_found<S: Into<String>>(entity_id: S) -> Self {
        Self::EntityNotFound {
            entity_id: entity_id.into(),
        }
    }

    pub fn upstream<S: Into<String>, D: ToString>(url: S, details: D) -> Self {
        Self::UpstreamFetch {
            url: url.into(),
            details: details.to_string(),
        }
    }

    pub fn configuration<S: Into<String>, D: ToString>(device: S, details: D) -> Self {
        Self::Configuration {
            device: device.into(),
            details: details.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
