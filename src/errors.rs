use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid macro document: {0}")]
    InvalidDocument(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Provider call failed: {0}")]
    Provider(String),

    #[error("Window restore failed: {0}")]
    RestoreFailed(String),

    #[error("Screen geometry error: {0}")]
    Geometry(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Playback cancelled")]
    Cancelled,
}

impl ReplayError {
    /// Errors that mean a collaborator is missing altogether rather than
    /// misbehaving on this one call.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ReplayError::ProviderUnavailable(_))
    }
}

impl From<image::ImageError> for ReplayError {
    fn from(e: image::ImageError) -> Self {
        ReplayError::Image(e.to_string())
    }
}

impl serde::Serialize for ReplayError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type ReplayResult<T> = Result<T, ReplayError>;
