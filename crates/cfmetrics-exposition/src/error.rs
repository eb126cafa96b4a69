use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpositionError {
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("metrics text is not valid utf-8")]
    InvalidUtf8,
}

impl ExpositionError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExpositionError>;
