use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use ib_core::{BridgeError, CallbackToken, ContextId, IsolateId, ScriptError, TemplateId};

use super::dispatch::HostCallback;
use super::registry::{Handle, HandleArena, TrackedValue};

pub(crate) type SharedState = Rc<RefCell<BridgeState>>;

pub(crate) struct ContextRecord {
    context: Option<v8::Global<v8::Context>>,
    handles: HandleArena<TrackedValue>,
}

impl ContextRecord {
    fn new(context: v8::Global<v8::Context>) -> Self {
        Self {
            context: Some(context),
            handles: HandleArena::default(),
        }
    }

    /// Releases the context reference first, then every value it tracked.
    fn teardown(mut self) -> usize {
        drop(self.context.take());
        self.handles.clear()
    }
}

pub(crate) enum TemplateRecord {
    Object(v8::Global<v8::ObjectTemplate>),
    Function {
        template: v8::Global<v8::FunctionTemplate>,
        token: CallbackToken,
    },
}

impl TemplateRecord {
    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Self::Object(_) => "object template",
            Self::Function { .. } => "function template",
        }
    }
}

/// Per-isolate bookkeeping, stored in an isolate slot so the callback
/// trampoline can reach it from a bare engine scope.
pub(crate) struct BridgeState {
    isolate: IsolateId,
    implicit_context: ContextId,
    contexts: HashMap<ContextId, ContextRecord>,
    templates: HashMap<TemplateId, TemplateRecord>,
    callbacks: HashMap<CallbackToken, HostCallback>,
    caught: Option<(ScriptError, v8::Global<v8::Value>)>,
    next_template: u32,
    next_callback: u32,
}

impl BridgeState {
    pub(crate) fn new(isolate: IsolateId, implicit_context: ContextId) -> Self {
        Self {
            isolate,
            implicit_context,
            contexts: HashMap::new(),
            templates: HashMap::new(),
            callbacks: HashMap::new(),
            caught: None,
            next_template: 1,
            next_callback: 1,
        }
    }

    pub(crate) fn shared(self) -> SharedState {
        Rc::new(RefCell::new(self))
    }

    pub(crate) fn isolate(&self) -> IsolateId {
        self.isolate
    }

    pub(crate) fn implicit_context(&self) -> ContextId {
        self.implicit_context
    }

    pub(crate) fn insert_context(&mut self, id: ContextId, context: v8::Global<v8::Context>) {
        self.contexts.insert(id, ContextRecord::new(context));
    }

    pub(crate) fn has_context(&self, id: ContextId) -> bool {
        self.contexts.contains_key(&id)
    }

    pub(crate) fn context_ids(&self) -> Vec<ContextId> {
        let mut ids = self
            .contexts
            .keys()
            .copied()
            .filter(|id| *id != self.implicit_context)
            .collect::<Vec<_>>();
        ids.sort();
        ids
    }

    /// Removes the record and tears it down. `None` when the id is unknown.
    pub(crate) fn destroy_context(&mut self, id: ContextId) -> Option<usize> {
        self.contexts.remove(&id).map(ContextRecord::teardown)
    }

    pub(crate) fn context_local<'s>(
        &self,
        scope: &mut v8::HandleScope<'s, ()>,
        id: ContextId,
    ) -> Result<v8::Local<'s, v8::Context>, BridgeError> {
        let context = self
            .contexts
            .get(&id)
            .and_then(|record| record.context.as_ref())
            .ok_or(BridgeError::UnknownContext(id.get()))?;
        Ok(v8::Local::new(scope, context))
    }

    /// Picks the first registered context among the explicit one, the one the
    /// value was produced in, and the isolate's implicit context.
    pub(crate) fn resolve_context(&self, explicit: Option<ContextId>, handle: Handle) -> ContextId {
        explicit
            .into_iter()
            .chain(Some(handle.context()))
            .find(|id| self.has_context(*id))
            .unwrap_or(self.implicit_context)
    }

    pub(crate) fn tracked_counts(&self, id: ContextId) -> Result<(usize, usize), BridgeError> {
        let record = self
            .contexts
            .get(&id)
            .ok_or(BridgeError::UnknownContext(id.get()))?;
        Ok((record.handles.tracked(), record.handles.live()))
    }

    pub(crate) fn track(
        &mut self,
        isolate: &mut v8::Isolate,
        context: ContextId,
        value: v8::Local<v8::Value>,
    ) -> Result<Handle, BridgeError> {
        let value = v8::Global::new(isolate, value);
        self.track_entry(context, TrackedValue::value(value))
    }

    pub(crate) fn track_resolver(
        &mut self,
        isolate: &mut v8::Isolate,
        context: ContextId,
        resolver: v8::Local<v8::PromiseResolver>,
    ) -> Result<Handle, BridgeError> {
        let as_value: v8::Local<v8::Value> = resolver.into();
        let mut entry = TrackedValue::value(v8::Global::new(isolate, as_value));
        entry.resolver = Some(v8::Global::new(isolate, resolver));
        self.track_entry(context, entry)
    }

    fn track_entry(&mut self, context: ContextId, entry: TrackedValue) -> Result<Handle, BridgeError> {
        let record = self
            .contexts
            .get_mut(&context)
            .ok_or(BridgeError::UnknownContext(context.get()))?;
        let slot = record.handles.push(entry);
        Ok(Handle::new(self.isolate, context, slot))
    }

    fn entry(&self, handle: Handle) -> Result<&TrackedValue, BridgeError> {
        self.check_isolate(handle)?;
        self.contexts
            .get(&handle.context())
            .and_then(|record| record.handles.get(handle.slot()))
            .ok_or_else(|| BridgeError::InvalidHandle(handle.to_string()))
    }

    pub(crate) fn entry_mut(&mut self, handle: Handle) -> Result<&mut TrackedValue, BridgeError> {
        self.check_isolate(handle)?;
        self.contexts
            .get_mut(&handle.context())
            .and_then(|record| record.handles.get_mut(handle.slot()))
            .ok_or_else(|| BridgeError::InvalidHandle(handle.to_string()))
    }

    fn check_isolate(&self, handle: Handle) -> Result<(), BridgeError> {
        if handle.isolate() != self.isolate {
            return Err(BridgeError::WrongIsolate {
                expected: self.isolate.get(),
                found: handle.isolate().get(),
            });
        }
        Ok(())
    }

    pub(crate) fn value_local<'s>(
        &self,
        scope: &mut v8::HandleScope<'s, ()>,
        handle: Handle,
    ) -> Result<v8::Local<'s, v8::Value>, BridgeError> {
        let entry = self.entry(handle)?;
        Ok(v8::Local::new(scope, &entry.value))
    }

    pub(crate) fn resolver_local<'s>(
        &self,
        scope: &mut v8::HandleScope<'s, ()>,
        handle: Handle,
    ) -> Result<Option<v8::Local<'s, v8::PromiseResolver>>, BridgeError> {
        let entry = self.entry(handle)?;
        Ok(entry
            .resolver
            .as_ref()
            .map(|resolver| v8::Local::new(scope, resolver)))
    }

    pub(crate) fn release(&mut self, handle: Handle) -> bool {
        if handle.isolate() != self.isolate {
            return false;
        }
        self.contexts
            .get_mut(&handle.context())
            .is_some_and(|record| record.handles.release(handle.slot()))
    }

    pub(crate) fn is_valid(&self, handle: Handle) -> bool {
        self.entry(handle).is_ok()
    }

    pub(crate) fn entry_settled(&self, handle: Handle) -> Result<bool, BridgeError> {
        self.entry(handle).map(|entry| entry.settled)
    }

    pub(crate) fn check_handle(&self, handle: Handle) -> Result<(), BridgeError> {
        self.entry(handle).map(|_| ())
    }

    pub(crate) fn insert_template(&mut self, record: TemplateRecord) -> TemplateId {
        let id = TemplateId(self.next_template);
        self.next_template += 1;
        self.templates.insert(id, record);
        id
    }

    pub(crate) fn template(&self, id: TemplateId) -> Result<&TemplateRecord, BridgeError> {
        self.templates
            .get(&id)
            .ok_or(BridgeError::UnknownTemplate(id.get()))
    }

    pub(crate) fn remove_template(&mut self, id: TemplateId) -> bool {
        self.templates.remove(&id).is_some()
    }

    pub(crate) fn register_callback(&mut self, callback: HostCallback) -> CallbackToken {
        let token = CallbackToken(self.next_callback);
        self.next_callback += 1;
        self.callbacks.insert(token, callback);
        token
    }

    pub(crate) fn callback(&self, token: CallbackToken) -> Option<HostCallback> {
        self.callbacks.get(&token).cloned()
    }

    pub(crate) fn has_callback(&self, token: CallbackToken) -> bool {
        self.callbacks.contains_key(&token)
    }

    pub(crate) fn unregister_callback(&mut self, token: CallbackToken) -> bool {
        self.callbacks.remove(&token).is_some()
    }

    /// Keeps the most recently translated exception so a host callback that
    /// propagates it can rethrow the original value.
    pub(crate) fn remember_exception(&mut self, error: ScriptError, exception: v8::Global<v8::Value>) {
        self.caught = Some((error, exception));
    }

    /// The remembered exception, if it is the one `error` was built from.
    pub(crate) fn take_exception(&mut self, error: &ScriptError) -> Option<v8::Global<v8::Value>> {
        match self.caught.take() {
            Some((remembered, exception)) if remembered == *error => Some(exception),
            _ => None,
        }
    }

    pub(crate) fn forget_exception(&mut self) {
        self.caught = None;
    }

    /// Releases every engine reference held on behalf of the host. Host
    /// contexts go first, the implicit context last.
    pub(crate) fn dispose(&mut self) -> usize {
        self.caught = None;
        let mut released = 0;
        for id in self.context_ids() {
            released += self.destroy_context(id).unwrap_or(0);
        }
        released += self.destroy_context(self.implicit_context).unwrap_or(0);
        self.templates.clear();
        self.callbacks.clear();
        released
    }
}
