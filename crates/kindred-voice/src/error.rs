use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("request to speech provider failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("speech provider returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Response was generated but no audio stream was returned")]
    EmptyAudio,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("unknown voice: {0}")]
    UnknownVoice(String),
}

impl SpeechError {
    /// HTTP status to propagate to our own caller, if the provider gave one.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
