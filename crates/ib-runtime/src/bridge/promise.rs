use ib_core::{BridgeError, CallbackToken, ContextId, PromiseState};

use super::dispatch::dispatch_trampoline;
use super::exception::script_failure;
use super::registry::Handle;
use super::scope::{EngineScope, TrapScope};
use super::state::SharedState;
use super::value::type_mismatch;

/// Promise behind `handle`, which may name a promise or a resolver.
fn promise_local<'s>(
    scope: &mut v8::HandleScope<'s>,
    state: &SharedState,
    handle: Handle,
) -> Result<v8::Local<'s, v8::Promise>, BridgeError> {
    if let Some(resolver) = state.borrow().resolver_local(scope, handle)? {
        return Ok(resolver.get_promise(scope));
    }
    let value = state.borrow().value_local(scope, handle)?;
    v8::Local::<v8::Promise>::try_from(value).map_err(|_| type_mismatch("promise", value))
}

fn continuation<'s>(
    scope: &mut TrapScope<'_, 's>,
    state: &SharedState,
    token: CallbackToken,
) -> Result<v8::Local<'s, v8::Function>, BridgeError> {
    if !state.borrow().has_callback(token) {
        return Err(BridgeError::UnknownCallback(token.get()));
    }
    let data = v8::Integer::new_from_unsigned(scope, token.get());
    match v8::Function::builder(dispatch_trampoline)
        .data(data.into())
        .build(scope)
    {
        Some(function) => Ok(function),
        None => Err(script_failure(scope)),
    }
}

#[derive(Clone, Copy)]
enum Settle {
    Resolve,
    Reject,
}

impl EngineScope<'_> {
    /// Creates a pending promise together with its resolver. The returned
    /// handle names the resolver; [`promise_of`](Self::promise_of) yields the
    /// promise itself.
    pub fn new_resolver(&mut self, context: ContextId) -> Result<Handle, BridgeError> {
        self.with_context(context, |scope, state| match v8::PromiseResolver::new(scope) {
            Some(resolver) => state.borrow_mut().track_resolver(scope, context, resolver),
            None => Err(script_failure(scope)),
        })
    }

    pub fn promise_of(&mut self, resolver: Handle) -> Result<Handle, BridgeError> {
        self.with_handle_context(resolver, |scope, state| {
            let Some(local) = state.borrow().resolver_local(scope, resolver)? else {
                return Err(BridgeError::TypeMismatch {
                    expected: "promise resolver",
                    found: "promise or plain value".to_string(),
                });
            };
            let promise = local.get_promise(scope);
            state
                .borrow_mut()
                .track(scope, resolver.context(), promise.into())
        })
    }

    /// Fulfills the resolver's promise. `false` when it was already settled.
    pub fn resolve(&mut self, resolver: Handle, value: Handle) -> Result<bool, BridgeError> {
        self.settle(resolver, value, Settle::Resolve)
    }

    /// Rejects the resolver's promise. `false` when it was already settled.
    pub fn reject(&mut self, resolver: Handle, reason: Handle) -> Result<bool, BridgeError> {
        self.settle(resolver, reason, Settle::Reject)
    }

    fn settle(&mut self, resolver: Handle, value: Handle, settle: Settle) -> Result<bool, BridgeError> {
        self.with_handle_context(resolver, |scope, state| {
            if state.borrow().entry_settled(resolver)? {
                return Ok(false);
            }
            let Some(local) = state.borrow().resolver_local(scope, resolver)? else {
                return Err(BridgeError::TypeMismatch {
                    expected: "promise resolver",
                    found: "promise or plain value".to_string(),
                });
            };
            if !matches!(local.get_promise(scope).state(), v8::PromiseState::Pending) {
                return Ok(false);
            }
            let value = state.borrow().value_local(scope, value)?;
            let settled = match settle {
                Settle::Resolve => local.resolve(scope, value),
                Settle::Reject => local.reject(scope, value),
            }
            .unwrap_or(false);
            if settled {
                state.borrow_mut().entry_mut(resolver)?.settled = true;
            }
            Ok(settled)
        })
    }

    pub fn promise_state(&mut self, promise: Handle) -> Result<PromiseState, BridgeError> {
        self.with_handle_context(promise, |scope, state| {
            let local = promise_local(scope, state, promise)?;
            Ok(match local.state() {
                v8::PromiseState::Pending => PromiseState::Pending,
                v8::PromiseState::Fulfilled => PromiseState::Fulfilled,
                v8::PromiseState::Rejected => PromiseState::Rejected,
            })
        })
    }

    /// Fulfillment value or rejection reason. A pending promise has none and
    /// is reported as a type mismatch.
    pub fn promise_result(&mut self, promise: Handle) -> Result<Handle, BridgeError> {
        self.with_handle_context(promise, |scope, state| {
            let local = promise_local(scope, state, promise)?;
            if matches!(local.state(), v8::PromiseState::Pending) {
                return Err(BridgeError::TypeMismatch {
                    expected: "settled promise",
                    found: "pending promise".to_string(),
                });
            }
            let result = local.result(scope);
            state.borrow_mut().track(scope, promise.context(), result)
        })
    }

    /// Runs the callback bound to `on_fulfilled` when the promise fulfills.
    /// Returns the chained promise.
    pub fn promise_then(&mut self, promise: Handle, on_fulfilled: CallbackToken) -> Result<Handle, BridgeError> {
        self.chain(promise, |scope, state, local| {
            let handler = continuation(scope, state, on_fulfilled)?;
            Ok(local.then(scope, handler))
        })
    }

    pub fn promise_then2(
        &mut self,
        promise: Handle,
        on_fulfilled: CallbackToken,
        on_rejected: CallbackToken,
    ) -> Result<Handle, BridgeError> {
        self.chain(promise, |scope, state, local| {
            let fulfilled = continuation(scope, state, on_fulfilled)?;
            let rejected = continuation(scope, state, on_rejected)?;
            Ok(local.then2(scope, fulfilled, rejected))
        })
    }

    pub fn promise_catch(&mut self, promise: Handle, on_rejected: CallbackToken) -> Result<Handle, BridgeError> {
        self.chain(promise, |scope, state, local| {
            let handler = continuation(scope, state, on_rejected)?;
            Ok(local.catch(scope, handler))
        })
    }

    fn chain(
        &mut self,
        promise: Handle,
        attach: impl for<'a, 's> FnOnce(
            &mut TrapScope<'a, 's>,
            &SharedState,
            v8::Local<'s, v8::Promise>,
        ) -> Result<Option<v8::Local<'s, v8::Promise>>, BridgeError>,
    ) -> Result<Handle, BridgeError> {
        self.with_handle_context(promise, |scope, state| {
            let local = promise_local(scope, state, promise)?;
            match attach(scope, state, local)? {
                Some(chained) => state
                    .borrow_mut()
                    .track(scope, promise.context(), chained.into()),
                None => Err(script_failure(scope)),
            }
        })
    }
}
