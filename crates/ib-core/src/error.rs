use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TERMINATED_MESSAGE: &str = "ExecutionTerminated: script execution has been terminated";

/// Script-level failure recovered at the engine boundary.
///
/// `location` reads `origin:line:column` with a 1-based column.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct ScriptError {
    pub message: String,
    pub location: Option<String>,
    pub stack: Option<String>,
}

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
            stack: None,
        }
    }

    pub fn terminated() -> Self {
        Self::new(TERMINATED_MESSAGE)
    }

    pub fn is_terminated(&self) -> bool {
        self.message == TERMINATED_MESSAGE && self.location.is_none() && self.stack.is_none()
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error("Engine platform is not initialized.")]
    NotInitialized,
    #[error("Engine platform is already initialized.")]
    AlreadyInitialized,
    #[error("Engine flags cannot change after initialization.")]
    FlagsAfterInitialize,
    #[error("Invalid engine flag \"{0}\".")]
    InvalidFlag(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Handle {0} is released or belongs to a destroyed context.")]
    InvalidHandle(String),
    #[error("Context {0} is not registered.")]
    UnknownContext(u32),
    #[error("Template {0} is not registered.")]
    UnknownTemplate(u32),
    #[error("Callback token {0} is not registered.")]
    UnknownCallback(u32),
    #[error("Value belongs to isolate {found}, expected isolate {expected}.")]
    WrongIsolate { expected: u32, found: u32 },
    #[error("Type mismatch: expected {expected}, got {found}.")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },
    #[error("Conversion failed: {0}")]
    Conversion(String),
    #[error("Isolate is already entered on this thread.")]
    Reentrant,
    #[error("Host callback failed: {0}")]
    Callback(String),
}

impl BridgeError {
    pub fn script_error(&self) -> Option<&ScriptError> {
        match self {
            Self::Script(error) => Some(error),
            _ => None,
        }
    }
}
