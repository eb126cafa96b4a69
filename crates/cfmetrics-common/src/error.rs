use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ExporterError {
    #[error("resolve failed: {0}")]
    ResolveFailed(String),
    #[error("fetch failed for instance {instance}: {cause}")]
    FetchFailed { instance: u32, cause: String },
    #[error("parse failed for instance {instance}: {cause}")]
    ParseFailed { instance: u32, cause: String },
    #[error("collection cycle failed: {reason}")]
    CycleFailed { reason: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ExporterError {
    pub fn instance(&self) -> Option<u32> {
        match self {
            Self::FetchFailed { instance, .. } | Self::ParseFailed { instance, .. } => {
                Some(*instance)
            }
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ResolveFailed(_) => "resolve",
            Self::FetchFailed { .. } => "fetch",
            Self::ParseFailed { .. } => "parse",
            Self::CycleFailed { .. } => "cycle",
            Self::InvalidConfig(_) => "config",
        }
    }
}

pub type Result<T> = std::result::Result<T, ExporterError>;
