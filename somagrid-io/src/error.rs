//! Error types for I/O operations

use thiserror::Error;

/// Errors that can occur while reading or writing somagrid files
#[derive(Error, Debug)]
pub enum IoError {
    #[error("Invalid file format: {format}")]
    InvalidFormat { format: String },

    #[error("Parse error: {message}")]
    ParseError { message: String },

    #[error("Write error: {message}")]
    WriteError { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<IoError> for somagrid_core::Error {
    fn from(err: IoError) -> Self {
        match err {
            IoError::Io(e) => somagrid_core::Error::Io(e),
            IoError::InvalidFormat { format } => somagrid_core::Error::UnsupportedFormat(format),
            IoError::ParseError { message } => somagrid_core::Error::InvalidData(message),
            IoError::WriteError { message } => somagrid_core::Error::InvalidData(message),
        }
    }
}

impl From<serde_json::Error> for IoError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            IoError::Io(err.into())
        } else {
            IoError::ParseError {
                message: err.to_string(),
            }
        }
    }
}
