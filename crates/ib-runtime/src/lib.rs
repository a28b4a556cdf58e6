mod bridge;
pub mod platform;

pub use bridge::{
    EngineScope, FunctionCall, Handle, HostCallback, Isolate, IsolateOptions, TemplateValue,
    TerminationHandle,
};
pub use ib_core::{
    BigIntWords, BridgeError, CallbackToken, ContextId, EngineConfig, HeapStatistics, IsolateId,
    PromiseState, PropertyAttributes, ScriptError, TemplateId, ValueKind,
};
pub use platform::{initialize, is_initialized, set_flags, version};
