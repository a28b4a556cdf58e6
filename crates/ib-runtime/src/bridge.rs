use std::sync::atomic::{AtomicU32, Ordering};

use ib_core::{ContextId, IsolateId};

mod context;
mod dispatch;
mod exception;
mod isolate;
mod promise;
mod registry;
mod scope;
mod state;
mod template;
mod value;

pub use dispatch::{FunctionCall, HostCallback};
pub use isolate::{Isolate, IsolateOptions, TerminationHandle};
pub use registry::Handle;
pub use scope::EngineScope;
pub use template::TemplateValue;

/// Embedder data slot carrying the context id. Slot 0 is left to debuggers.
pub(crate) const CONTEXT_ID_SLOT: i32 = 1;

static NEXT_ISOLATE_ID: AtomicU32 = AtomicU32::new(1);
static NEXT_CONTEXT_ID: AtomicU32 = AtomicU32::new(1);

pub(crate) fn next_isolate_id() -> IsolateId {
    IsolateId(NEXT_ISOLATE_ID.fetch_add(1, Ordering::Relaxed))
}

pub(crate) fn next_context_id() -> ContextId {
    ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
}
