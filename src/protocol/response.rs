//! Response definitions
//!
//! Represents responses to clients.

use crate::error::BlockError;

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Error,
    NotFound,
    ArgumentError,
    AllocationFailure,
    IoFailure,
    Corruption,
    UnknownCommand,
}

impl Status {
    /// Name written after `STATUS:`
    pub fn name(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Error => "ERROR",
            Status::NotFound => "NOT_FOUND",
            Status::ArgumentError => "ARGUMENT_ERROR",
            Status::AllocationFailure => "ALLOCATION_FAILURE",
            Status::IoFailure => "IO_FAILURE",
            Status::Corruption => "CORRUPTION",
            Status::UnknownCommand => "UNKNOWN_COMMAND",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "OK" => Some(Status::Ok),
            "ERROR" => Some(Status::Error),
            "NOT_FOUND" => Some(Status::NotFound),
            "ARGUMENT_ERROR" => Some(Status::ArgumentError),
            "ALLOCATION_FAILURE" => Some(Status::AllocationFailure),
            "IO_FAILURE" => Some(Status::IoFailure),
            "CORRUPTION" => Some(Status::Corruption),
            "UNKNOWN_COMMAND" => Some(Status::UnknownCommand),
            _ => None,
        }
    }
}

/// A response to send to client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code
    pub status: Status,

    /// Free-text message (value, key list, or error description)
    pub message: String,
}

impl Response {
    /// Create an OK response
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            message: message.into(),
        }
    }

    /// Create a NOT_FOUND response
    pub fn not_found() -> Self {
        Self {
            status: Status::NotFound,
            message: "Key not found.".to_string(),
        }
    }

    /// Create an ERROR response
    pub fn error(message: &str) -> Self {
        Self {
            status: Status::Error,
            message: message.to_string(),
        }
    }

    /// Map an engine or protocol error to its status
    pub fn from_error(error: &BlockError) -> Self {
        let status = match error {
            BlockError::NotFound => return Self::not_found(),
            BlockError::Argument(_) => Status::ArgumentError,
            BlockError::AllocationFailure { .. } => Status::AllocationFailure,
            BlockError::Io(_) => Status::IoFailure,
            BlockError::Corruption(_) => Status::Corruption,
            BlockError::UnknownCommand => Status::UnknownCommand,
            BlockError::Protocol(_)
            | BlockError::Serialization(_)
            | BlockError::Config(_) => Status::Error,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}
