use std::rc::Rc;

use ib_core::{BridgeError, CallbackToken, ContextId};
use tracing::{trace, warn};

use super::registry::Handle;
use super::scope::EngineScope;
use super::state::SharedState;
use super::CONTEXT_ID_SLOT;

/// One script-initiated call into the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCall {
    pub context: ContextId,
    pub token: CallbackToken,
    pub args: Vec<Handle>,
}

/// Host logic bound to a function template or promise continuation.
///
/// Returning `Ok(None)` makes the call evaluate to `undefined`; returning an
/// error throws a script `Error` carrying the error's message.
pub type HostCallback =
    Rc<dyn Fn(&mut EngineScope<'_>, &FunctionCall) -> Result<Option<Handle>, BridgeError>>;

impl EngineScope<'_> {
    pub fn register_callback<F>(&mut self, callback: F) -> CallbackToken
    where
        F: Fn(&mut EngineScope<'_>, &FunctionCall) -> Result<Option<Handle>, BridgeError> + 'static,
    {
        self.state.borrow_mut().register_callback(Rc::new(callback))
    }

    /// Functions already bound to `token` throw once it is unregistered.
    pub fn unregister_callback(&mut self, token: CallbackToken) -> bool {
        self.state.borrow_mut().unregister_callback(token)
    }
}

fn throw_error(scope: &mut v8::HandleScope, message: &str) {
    match v8::String::new(scope, message) {
        Some(message) => {
            let exception = v8::Exception::error(scope, message);
            scope.throw_exception(exception);
        }
        None => {
            let exception = v8::undefined(scope).into();
            scope.throw_exception(exception);
        }
    }
}

fn calling_context(scope: &mut v8::HandleScope, state: &SharedState) -> ContextId {
    let context = scope.get_current_context();
    let marker = context
        .get_embedder_data(scope, CONTEXT_ID_SLOT)
        .and_then(|data| data.uint32_value(scope))
        .map(ContextId);
    let state = state.borrow();
    match marker {
        Some(id) if state.has_context(id) => id,
        _ => state.implicit_context(),
    }
}

/// Native entry point for every host-bound function.
pub(super) fn dispatch_trampoline(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let Some(state) = scope.get_slot::<SharedState>().cloned() else {
        throw_error(scope, "isolate has no bridge state");
        return;
    };
    let context = calling_context(scope, &state);
    let Some(token) = args.data().uint32_value(scope).map(CallbackToken) else {
        throw_error(scope, "function is missing its callback token");
        return;
    };

    let callback = match state.try_borrow() {
        Ok(state) => state.callback(token),
        Err(_) => {
            throw_error(scope, &BridgeError::Reentrant.to_string());
            return;
        }
    };
    let Some(callback) = callback else {
        throw_error(scope, &BridgeError::UnknownCallback(token.get()).to_string());
        return;
    };

    let mut call = FunctionCall {
        context,
        token,
        args: Vec::with_capacity(args.length().max(0) as usize),
    };
    for index in 0..args.length() {
        match state.borrow_mut().track(scope, context, args.get(index)) {
            Ok(handle) => call.args.push(handle),
            Err(error) => {
                throw_error(scope, &error.to_string());
                return;
            }
        }
    }
    trace!(%context, %token, argc = call.args.len(), "dispatching host callback");

    let outcome = {
        let unit_scope: &mut v8::HandleScope<()> = scope;
        let mut engine = EngineScope::nested(v8::HandleScope::new(unit_scope), state.clone());
        callback(&mut engine, &call)
    };

    match outcome {
        Ok(Some(handle)) => {
            let value = state.borrow().value_local(scope, handle);
            match value {
                Ok(value) => rv.set(value),
                Err(error) => throw_error(scope, &error.to_string()),
            }
        }
        Ok(None) => rv.set_undefined(),
        Err(_) if scope.is_execution_terminating() => {}
        Err(error) => {
            warn!(%context, %token, %error, "host callback failed");
            let Some(script_error) = error.script_error() else {
                throw_error(scope, &error.to_string());
                return;
            };
            let original = state.borrow_mut().take_exception(script_error);
            match original {
                Some(exception) => {
                    let exception = v8::Local::new(scope, exception);
                    scope.throw_exception(exception);
                }
                None => throw_error(scope, &script_error.message),
            }
        }
    }
}
