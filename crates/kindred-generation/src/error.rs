use thiserror::Error;

/// Shown to users when a provider returned nothing usable.
pub const OUT_OF_CREDITS_MESSAGE: &str = "Either there was an error or I'm out of API credits.";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("request to generation provider failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("generation provider returned {status}: {message}")]
    Upstream { status: u16, message: String },

    /// The provider answered successfully but without usable content.
    #[error("{}", OUT_OF_CREDITS_MESSAGE)]
    Empty,

    /// The provider's content could not be interpreted.
    #[error("malformed generation output: {0}")]
    Malformed(String),

    #[error("generation provider is not configured: {0}")]
    Config(String),
}

impl GenerationError {
    /// HTTP status to propagate to our own caller, if the provider gave one.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
