use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    InvalidInput,
    InvalidConfig,
    NotFound,
    ExternalTool,
    Io,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProberError {
    pub code: ErrorCode,
    pub message: String,
}

impl ProberError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfig, message)
    }

    pub fn external_tool(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExternalTool, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }
}

impl fmt::Display for ProberError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl Error for ProberError {}

impl From<std::io::Error> for ProberError {
    fn from(err: std::io::Error) -> Self {
        ProberError::new(ErrorCode::Io, err.to_string())
    }
}

impl From<serde_json::Error> for ProberError {
    fn from(err: serde_json::Error) -> Self {
        ProberError::new(ErrorCode::InvalidInput, format!("Malformed JSON: {err}"))
    }
}

impl From<csv::Error> for ProberError {
    fn from(err: csv::Error) -> Self {
        ProberError::new(ErrorCode::InvalidInput, format!("Malformed table: {err}"))
    }
}

impl From<anyhow::Error> for ProberError {
    fn from(err: anyhow::Error) -> Self {
        ProberError::new(ErrorCode::Io, format!("{err:#}"))
    }
}

pub type Result<T, E = ProberError> = std::result::Result<T, E>;
