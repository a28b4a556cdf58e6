use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ib_core::{BridgeError, ContextId, EngineConfig, HeapStatistics, TemplateId};
use ib_runtime::{EngineScope, Handle, Isolate, TerminationHandle};
use tracing::debug;

pub use ib_core;
pub use ib_runtime;

struct RuntimeInner {
    isolate: RefCell<Isolate>,
    deferred: RefCell<Vec<Handle>>,
}

/// Shared owner of one isolate.
///
/// Cloning shares the isolate. Access goes through [`Runtime::with_scope`];
/// trying to enter again from inside that closure is reported as
/// [`BridgeError::Reentrant`].
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("deferred", &self.inner.deferred.borrow().len())
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn new(config: &EngineConfig) -> Result<Self, BridgeError> {
        config.validate()?;
        match ib_runtime::initialize(config) {
            Ok(()) => {}
            Err(BridgeError::AlreadyInitialized) if config.flags.is_empty() => {}
            Err(BridgeError::AlreadyInitialized) => return Err(BridgeError::FlagsAfterInitialize),
            Err(error) => return Err(error),
        }
        let isolate = Isolate::from_config(config)?;
        Ok(Self {
            inner: Rc::new(RuntimeInner {
                isolate: RefCell::new(isolate),
                deferred: RefCell::new(Vec::new()),
            }),
        })
    }

    pub fn from_json_config(raw: &str) -> Result<Self, BridgeError> {
        Self::new(&EngineConfig::from_json_str(raw)?)
    }

    pub fn with_scope<R>(
        &self,
        f: impl FnOnce(&mut EngineScope<'_>) -> Result<R, BridgeError>,
    ) -> Result<R, BridgeError> {
        let mut isolate = self
            .inner
            .isolate
            .try_borrow_mut()
            .map_err(|_| BridgeError::Reentrant)?;
        let mut scope = isolate.enter();
        let outcome = f(&mut scope);
        let deferred = std::mem::take(&mut *self.inner.deferred.borrow_mut());
        if !deferred.is_empty() {
            debug!(count = deferred.len(), "releasing deferred handles");
            for handle in deferred {
                scope.release(handle);
            }
        }
        outcome
    }

    pub fn own(&self, handle: Handle) -> OwnedValue {
        OwnedValue {
            handle,
            runtime: Some(Rc::downgrade(&self.inner)),
        }
    }

    pub fn create_context(&self, template: Option<TemplateId>) -> Result<ContextId, BridgeError> {
        self.with_scope(|scope| scope.create_context(template))
    }

    pub fn destroy_context(&self, context: ContextId) -> Result<usize, BridgeError> {
        self.with_scope(|scope| scope.destroy_context(context))
    }

    pub fn run_script(&self, context: ContextId, source: &str, origin: &str) -> Result<OwnedValue, BridgeError> {
        let handle = self.with_scope(|scope| scope.run_script(context, source, origin))?;
        Ok(self.own(handle))
    }

    pub fn parse_json(&self, context: ContextId, text: &str) -> Result<OwnedValue, BridgeError> {
        let handle = self.with_scope(|scope| scope.parse_json(context, text))?;
        Ok(self.own(handle))
    }

    pub fn global(&self, context: ContextId) -> Result<OwnedValue, BridgeError> {
        let handle = self.with_scope(|scope| scope.global(context))?;
        Ok(self.own(handle))
    }

    pub fn perform_microtask_checkpoint(&self) -> Result<(), BridgeError> {
        self.with_scope(|scope| {
            scope.perform_microtask_checkpoint();
            Ok(())
        })
    }

    pub fn heap_statistics(&self) -> Result<HeapStatistics, BridgeError> {
        self.with_scope(|scope| Ok(scope.heap_statistics()))
    }

    pub fn termination_handle(&self) -> Result<TerminationHandle, BridgeError> {
        let isolate = self
            .inner
            .isolate
            .try_borrow()
            .map_err(|_| BridgeError::Reentrant)?;
        Ok(isolate.termination_handle())
    }
}

/// Exactly-once owner of a [`Handle`].
///
/// Dropping the value releases the handle. When the runtime is busy at that
/// point the release is queued and performed when the running
/// [`Runtime::with_scope`] call finishes. Handles outliving their runtime or
/// context need no release.
pub struct OwnedValue {
    handle: Handle,
    runtime: Option<Weak<RuntimeInner>>,
}

impl fmt::Debug for OwnedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OwnedValue").field(&self.handle).finish()
    }
}

impl OwnedValue {
    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn context(&self) -> ContextId {
        self.handle.context()
    }

    /// Gives up ownership without releasing. The caller becomes responsible
    /// for the handle.
    pub fn into_handle(mut self) -> Handle {
        self.runtime = None;
        self.handle
    }

    /// Releases now. Returns `false` when the runtime is gone or the handle
    /// was already invalid. While the runtime is busy the release is queued
    /// and reported as `true`; validity is only known once the queue drains.
    pub fn release(mut self) -> bool {
        self.release_now()
    }

    fn release_now(&mut self) -> bool {
        let Some(inner) = self.runtime.take().and_then(|runtime| runtime.upgrade()) else {
            return false;
        };
        match inner.isolate.try_borrow_mut() {
            Ok(mut isolate) => {
                let released = isolate.enter().release(self.handle);
                released
            }
            Err(_) => {
                inner.deferred.borrow_mut().push(self.handle);
                true
            }
        }
    }
}

impl Drop for OwnedValue {
    fn drop(&mut self) {
        self.release_now();
    }
}
