use ib_core::{BridgeError, ContextId, HeapStatistics, IsolateId};

use super::registry::Handle;
use super::state::SharedState;

/// Entered, exclusive access to one isolate.
///
/// Every bridge operation hangs off this type. It is obtained from
/// [`Isolate::enter`](super::Isolate::enter), or handed to a host callback
/// while script code is calling into the host. Engine values created by an
/// operation live in a handle scope that closes when the operation returns;
/// only tracked [`Handle`]s survive.
pub struct EngineScope<'s> {
    pub(super) scope: v8::HandleScope<'s, ()>,
    pub(super) state: SharedState,
    nested: bool,
}

/// Engine scope with a context entered and an exception trap installed.
pub(super) type TrapScope<'a, 'b> = v8::TryCatch<'a, v8::HandleScope<'b>>;

impl<'s> EngineScope<'s> {
    pub(super) fn new(scope: v8::HandleScope<'s, ()>, state: SharedState) -> Self {
        Self {
            scope,
            state,
            nested: false,
        }
    }

    /// Scope handed to a host callback while script frames are on the stack.
    pub(super) fn nested(scope: v8::HandleScope<'s, ()>, state: SharedState) -> Self {
        Self {
            scope,
            state,
            nested: true,
        }
    }

    pub fn isolate_id(&self) -> IsolateId {
        self.state.borrow().isolate()
    }

    pub fn implicit_context(&self) -> ContextId {
        self.state.borrow().implicit_context()
    }

    /// Drops the engine reference behind `handle`. Returns `false` when it
    /// was already released or its context is gone.
    pub fn release(&mut self, handle: Handle) -> bool {
        self.state.borrow_mut().release(handle)
    }

    pub fn is_valid(&self, handle: Handle) -> bool {
        self.state.borrow().is_valid(handle)
    }

    /// Number of handles ever tracked under `context`, released ones included.
    pub fn tracked_handles(&self, context: ContextId) -> Result<usize, BridgeError> {
        self.state
            .borrow()
            .tracked_counts(context)
            .map(|(tracked, _)| tracked)
    }

    pub fn live_handles(&self, context: ContextId) -> Result<usize, BridgeError> {
        self.state.borrow().tracked_counts(context).map(|(_, live)| live)
    }

    pub fn perform_microtask_checkpoint(&mut self) {
        self.scope.perform_microtask_checkpoint();
    }

    pub fn is_terminating(&self) -> bool {
        self.scope.is_execution_terminating()
    }

    pub fn heap_statistics(&mut self) -> HeapStatistics {
        let mut stats = v8::HeapStatistics::default();
        self.scope.get_heap_statistics(&mut stats);
        HeapStatistics {
            total_heap_size: stats.total_heap_size() as u64,
            total_heap_size_executable: stats.total_heap_size_executable() as u64,
            total_physical_size: stats.total_physical_size() as u64,
            total_available_size: stats.total_available_size() as u64,
            used_heap_size: stats.used_heap_size() as u64,
            heap_size_limit: stats.heap_size_limit() as u64,
            malloced_memory: stats.malloced_memory() as u64,
            external_memory: stats.external_memory() as u64,
            peak_malloced_memory: stats.peak_malloced_memory() as u64,
            number_of_native_contexts: stats.number_of_native_contexts() as u64,
            number_of_detached_contexts: stats.number_of_detached_contexts() as u64,
        }
    }

    /// Enters `context`, installs an exception trap and runs `f`.
    ///
    /// `f` must not hold a borrow of the shared state across a call that can
    /// run script code: script code may call back into the host.
    pub(super) fn with_context<R>(
        &mut self,
        context: ContextId,
        f: impl FnOnce(&mut TrapScope<'_, '_>, &SharedState) -> Result<R, BridgeError>,
    ) -> Result<R, BridgeError> {
        let state = self.state.clone();
        let outcome = {
            let scope = &mut v8::HandleScope::new(&mut self.scope);
            let local = state.borrow().context_local(scope, context)?;
            let scope = &mut v8::ContextScope::new(scope, local);
            let scope = &mut v8::TryCatch::new(scope);
            f(scope, &state)
        };
        // Termination only unwinds script frames; once the outermost operation
        // has returned the isolate must accept new work.
        if !self.nested {
            if self.scope.is_execution_terminating() {
                self.scope.cancel_terminate_execution();
            }
            self.state.borrow_mut().forget_exception();
        }
        outcome
    }

    /// Like [`with_context`](Self::with_context), entering the context that
    /// produced `handle` after checking the handle is still live.
    pub(super) fn with_handle_context<R>(
        &mut self,
        handle: Handle,
        f: impl FnOnce(&mut TrapScope<'_, '_>, &SharedState) -> Result<R, BridgeError>,
    ) -> Result<R, BridgeError> {
        self.state.borrow().check_handle(handle)?;
        self.with_context(handle.context(), f)
    }

    pub(super) fn with_implicit_context<R>(
        &mut self,
        f: impl FnOnce(&mut TrapScope<'_, '_>, &SharedState) -> Result<R, BridgeError>,
    ) -> Result<R, BridgeError> {
        let context = self.implicit_context();
        self.with_context(context, f)
    }
}
