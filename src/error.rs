use std::fmt::{self, Debug, Display};
use std::io;

use crate::agents::AgentId;

/// Provides `GeospreadError` and maps other errors to
/// convert to a `GeospreadError`
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum GeospreadError {
    IoError(io::Error),
    JsonError(serde_json::Error),
    CsvError(csv::Error),
    /// A coordinate that is NaN, infinite, or outside of the valid latitude/longitude range.
    InvalidPosition {
        latitude: f64,
        longitude: f64,
    },
    InvalidSpeed(f64),
    ConfigurationError(String),
    DuplicateAgent(AgentId),
    UnknownAgent(AgentId),
    ReportError(String),
    /// A malformed row in an input file.
    InvalidRecord {
        line: u64,
        message: String,
    },
}

impl From<io::Error> for GeospreadError {
    fn from(error: io::Error) -> Self {
        GeospreadError::IoError(error)
    }
}

impl From<serde_json::Error> for GeospreadError {
    fn from(error: serde_json::Error) -> Self {
        GeospreadError::JsonError(error)
    }
}

impl From<csv::Error> for GeospreadError {
    fn from(error: csv::Error) -> Self {
        GeospreadError::CsvError(error)
    }
}

impl std::error::Error for GeospreadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GeospreadError::IoError(error) => Some(error),
            GeospreadError::JsonError(error) => Some(error),
            GeospreadError::CsvError(error) => Some(error),
            _ => None,
        }
    }
}

impl Display for GeospreadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GeospreadError::IoError(error) => write!(f, "I/O error: {error}"),
            GeospreadError::JsonError(error) => write!(f, "JSON error: {error}"),
            GeospreadError::CsvError(error) => write!(f, "CSV error: {error}"),
            GeospreadError::InvalidPosition {
                latitude,
                longitude,
            } => write!(f, "invalid position ({latitude}, {longitude})"),
            GeospreadError::InvalidSpeed(speed) => write!(f, "invalid speed {speed}"),
            GeospreadError::ConfigurationError(msg) => write!(f, "configuration error: {msg}"),
            GeospreadError::DuplicateAgent(id) => write!(f, "agent {id} already exists"),
            GeospreadError::UnknownAgent(id) => write!(f, "agent {id} does not exist"),
            GeospreadError::ReportError(msg) => write!(f, "report error: {msg}"),
            GeospreadError::InvalidRecord { line, message } => {
                write!(f, "invalid record on line {line}: {message}")
            }
        }
    }
}
