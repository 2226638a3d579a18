use thiserror::Error;

/// Everything that can go wrong while cloning a site.
///
/// Resource-level variants (`FetchUnavailable`, `MalformedContent`) are normally
/// absorbed where they happen; only the error of the last attempted path reaches
/// the caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CloneError {
    #[error("fetch of {url} unavailable: {reason}")]
    FetchUnavailable { url: String, reason: String },

    #[error("malformed content: {0}")]
    MalformedContent(String),

    #[error("generator returned an empty document")]
    EmptyGeneration,

    #[error("generator returned an invalid document: {0}")]
    InvalidGeneration(String),

    #[error("generator rate limited: {0}")]
    RateLimited(String),

    #[error("generator request failed: {0}")]
    GenerationFailed(String),

    #[error("render of {url} timed out during {stage}")]
    RenderTimeout { url: String, stage: String },

    #[error("render failed: {0}")]
    RenderFailure(String),

    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl CloneError {
    /// Short stable name used in logs and attempt records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FetchUnavailable { .. } => "fetch_unavailable",
            Self::MalformedContent(_) => "malformed_content",
            Self::EmptyGeneration => "empty_generation",
            Self::InvalidGeneration(_) => "invalid_generation",
            Self::RateLimited(_) => "rate_limited",
            Self::GenerationFailed(_) => "generation_failed",
            Self::RenderTimeout { .. } => "render_timeout",
            Self::RenderFailure(_) => "render_failure",
            Self::ArtifactNotFound(_) => "artifact_not_found",
            Self::InvalidUrl(_) => "invalid_url",
            Self::Config(_) => "config",
        }
    }

    /// Whether a failure of the heavy path may be retried on the light path.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InvalidUrl(_) | Self::Config(_))
    }
}

impl From<url::ParseError> for CloneError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<serde_json::Error> for CloneError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<std::io::Error> for CloneError {
    fn from(err: std::io::Error) -> Self {
        Self::Config(err.to_string())
    }
}
