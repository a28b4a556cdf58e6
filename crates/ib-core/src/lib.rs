pub mod config;
pub mod error;
pub mod types;

pub use config::{EngineConfig, HeapLimits};
pub use error::{BridgeError, ScriptError, TERMINATED_MESSAGE};
pub use types::*;
