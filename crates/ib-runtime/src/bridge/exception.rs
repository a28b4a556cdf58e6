use ib_core::{BridgeError, ScriptError};
use tracing::{debug, warn};

use super::registry::Handle;
use super::scope::{EngineScope, TrapScope};
use super::state::SharedState;
use super::value::new_string_local;

/// Builds the host-side error for whatever the trap caught.
pub(super) fn translate_exception(scope: &mut TrapScope<'_, '_>) -> ScriptError {
    if scope.has_terminated() {
        warn!("script execution terminated");
        return ScriptError::terminated();
    }

    let exception = scope.exception();
    let message = match exception {
        Some(exception) => exception.to_rust_string_lossy(scope),
        None => "Error: unknown script failure".to_string(),
    };
    let mut error = ScriptError::new(message);

    if let Some(details) = scope.message() {
        let origin = details
            .get_script_resource_name(scope)
            .map(|name| name.to_rust_string_lossy(scope))
            .unwrap_or_default();
        let line = details.get_line_number(scope).unwrap_or(0);
        let column = details.get_start_column() + 1;
        error = error.with_location(format!("{origin}:{line}:{column}"));
    }

    if let Some(stack) = scope.stack_trace() {
        if stack.is_string() {
            error = error.with_stack(stack.to_rust_string_lossy(scope));
        }
    }

    if let Some(exception) = exception {
        let exception = v8::Global::new(scope, exception);
        if let Some(state) = scope.get_slot::<SharedState>().cloned() {
            if let Ok(mut state) = state.try_borrow_mut() {
                state.remember_exception(error.clone(), exception);
            }
        }
    }

    debug!(message = %error.message, location = ?error.location, "script error");
    error
}

pub(super) fn script_failure(scope: &mut TrapScope<'_, '_>) -> BridgeError {
    BridgeError::Script(translate_exception(scope))
}

#[derive(Clone, Copy)]
enum ErrorKind {
    Error,
    Range,
    Reference,
    Syntax,
    Type,
}

impl EngineScope<'_> {
    pub fn new_error(&mut self, message: &str) -> Result<Handle, BridgeError> {
        self.new_exception(ErrorKind::Error, message)
    }

    pub fn new_range_error(&mut self, message: &str) -> Result<Handle, BridgeError> {
        self.new_exception(ErrorKind::Range, message)
    }

    pub fn new_reference_error(&mut self, message: &str) -> Result<Handle, BridgeError> {
        self.new_exception(ErrorKind::Reference, message)
    }

    pub fn new_syntax_error(&mut self, message: &str) -> Result<Handle, BridgeError> {
        self.new_exception(ErrorKind::Syntax, message)
    }

    pub fn new_type_error(&mut self, message: &str) -> Result<Handle, BridgeError> {
        self.new_exception(ErrorKind::Type, message)
    }

    fn new_exception(&mut self, kind: ErrorKind, message: &str) -> Result<Handle, BridgeError> {
        self.with_implicit_context(|scope, state| {
            let message = new_string_local(scope, message)?;
            let exception = match kind {
                ErrorKind::Error => v8::Exception::error(scope, message),
                ErrorKind::Range => v8::Exception::range_error(scope, message),
                ErrorKind::Reference => v8::Exception::reference_error(scope, message),
                ErrorKind::Syntax => v8::Exception::syntax_error(scope, message),
                ErrorKind::Type => v8::Exception::type_error(scope, message),
            };
            let context = state.borrow().implicit_context();
            state.borrow_mut().track(scope, context, exception)
        })
    }
}
