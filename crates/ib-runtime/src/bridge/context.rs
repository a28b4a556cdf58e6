use ib_core::{BridgeError, ContextId, TemplateId};
use tracing::debug;

use super::exception::script_failure;
use super::registry::Handle;
use super::scope::EngineScope;
use super::state::TemplateRecord;
use super::value::{new_string_local, type_mismatch};
use super::{next_context_id, CONTEXT_ID_SLOT};

impl EngineScope<'_> {
    /// Creates a context. When `template` is given it must be an object
    /// template, and it shapes the global object.
    pub fn create_context(&mut self, template: Option<TemplateId>) -> Result<ContextId, BridgeError> {
        let id = next_context_id();
        self.install_context(id, template)?;
        debug!(isolate = %self.isolate_id(), context = %id, ?template, "context created");
        Ok(id)
    }

    pub(super) fn install_context(
        &mut self,
        id: ContextId,
        template: Option<TemplateId>,
    ) -> Result<(), BridgeError> {
        let scope = &mut v8::HandleScope::new(&mut self.scope);
        let global_template = match template {
            Some(template_id) => match self.state.borrow().template(template_id)? {
                TemplateRecord::Object(template) => Some(v8::Local::new(scope, template)),
                other => {
                    return Err(BridgeError::TypeMismatch {
                        expected: "object template",
                        found: other.kind_name().to_string(),
                    })
                }
            },
            None => None,
        };
        let context = v8::Context::new(
            scope,
            v8::ContextOptions {
                global_template,
                ..Default::default()
            },
        );
        let marker = v8::Integer::new_from_unsigned(scope, id.get());
        context.set_embedder_data(CONTEXT_ID_SLOT, marker.into());
        let context = v8::Global::new(scope, context);
        self.state.borrow_mut().insert_context(id, context);
        Ok(())
    }

    /// Tears down `context` and every handle tracked under it. Returns how
    /// many live handles were released.
    pub fn destroy_context(&mut self, context: ContextId) -> Result<usize, BridgeError> {
        if context == self.implicit_context() {
            return Err(BridgeError::UnknownContext(context.get()));
        }
        let released = self
            .state
            .borrow_mut()
            .destroy_context(context)
            .ok_or(BridgeError::UnknownContext(context.get()))?;
        debug!(isolate = %self.isolate_id(), %context, released, "context destroyed");
        Ok(released)
    }

    pub fn contexts(&self) -> Vec<ContextId> {
        self.state.borrow().context_ids()
    }

    pub fn global(&mut self, context: ContextId) -> Result<Handle, BridgeError> {
        self.with_context(context, |scope, state| {
            let current = scope.get_current_context();
            let global = current.global(scope);
            state.borrow_mut().track(scope, context, global.into())
        })
    }

    pub fn run_script(&mut self, context: ContextId, source: &str, origin: &str) -> Result<Handle, BridgeError> {
        self.with_context(context, |scope, state| {
            let source = new_string_local(scope, source)?;
            let name = new_string_local(scope, origin)?;
            let origin = v8::ScriptOrigin::new(
                scope,
                name.into(),
                0,
                0,
                false,
                0,
                None,
                false,
                false,
                false,
                None,
            );
            let Some(script) = v8::Script::compile(scope, source, Some(&origin)) else {
                return Err(script_failure(scope));
            };
            let Some(result) = script.run(scope) else {
                return Err(script_failure(scope));
            };
            state.borrow_mut().track(scope, context, result)
        })
    }

    pub fn parse_json(&mut self, context: ContextId, text: &str) -> Result<Handle, BridgeError> {
        self.with_context(context, |scope, state| {
            let text = new_string_local(scope, text)?;
            let Some(value) = v8::json::parse(scope, text) else {
                return Err(script_failure(scope));
            };
            state.borrow_mut().track(scope, context, value)
        })
    }

    /// Serializes `value` as JSON. The context used is `context` when it is
    /// registered, else the value's own context, else the implicit one.
    pub fn stringify_json(&mut self, context: Option<ContextId>, value: Handle) -> Result<String, BridgeError> {
        let resolved = {
            let state = self.state.borrow();
            state.check_handle(value)?;
            state.resolve_context(context, value)
        };
        self.with_context(resolved, |scope, state| {
            let local = state.borrow().value_local(scope, value)?;
            if local.is_undefined() || local.is_function() || local.is_symbol() {
                return Err(type_mismatch("JSON-serializable value", local));
            }
            match v8::json::stringify(scope, local) {
                Some(text) => Ok(text.to_rust_string_lossy(scope)),
                None => Err(script_failure(scope)),
            }
        })
    }
}
