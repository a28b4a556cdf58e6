use ib_core::{BigIntWords, BridgeError, ValueKind};

use super::exception::translate_exception;
use super::registry::Handle;
use super::scope::{EngineScope, TrapScope};
use super::state::SharedState;

pub(super) fn new_string_local<'s>(
    scope: &mut v8::HandleScope<'s, ()>,
    text: &str,
) -> Result<v8::Local<'s, v8::String>, BridgeError> {
    v8::String::new(scope, text).ok_or_else(|| {
        BridgeError::Conversion(format!(
            "string of {} bytes exceeds the engine limit",
            text.len()
        ))
    })
}

pub(super) fn kind_of(value: v8::Local<v8::Value>) -> ValueKind {
    if value.is_undefined() {
        ValueKind::Undefined
    } else if value.is_null() {
        ValueKind::Null
    } else if value.is_boolean() {
        ValueKind::Boolean
    } else if value.is_number() {
        ValueKind::Number
    } else if value.is_big_int() {
        ValueKind::BigInt
    } else if value.is_string() {
        ValueKind::String
    } else if value.is_symbol() {
        ValueKind::Symbol
    } else if value.is_function() {
        ValueKind::Function
    } else if value.is_array() {
        ValueKind::Array
    } else if value.is_promise() {
        ValueKind::Promise
    } else {
        ValueKind::Object
    }
}

pub(super) fn type_mismatch(expected: &'static str, value: v8::Local<v8::Value>) -> BridgeError {
    BridgeError::TypeMismatch {
        expected,
        found: kind_of(value).to_string(),
    }
}

/// A conversion that ran script code and threw (or was terminated) reports
/// the script error; anything else is a plain conversion failure.
fn conversion_failure(scope: &mut TrapScope<'_, '_>, target: &str) -> BridgeError {
    if scope.has_caught() || scope.has_terminated() {
        return BridgeError::Script(translate_exception(scope));
    }
    BridgeError::Conversion(format!("cannot convert to {target}"))
}

fn object_local<'s>(
    scope: &mut v8::HandleScope<'s, ()>,
    state: &SharedState,
    handle: Handle,
) -> Result<v8::Local<'s, v8::Object>, BridgeError> {
    let value = state.borrow().value_local(scope, handle)?;
    v8::Local::<v8::Object>::try_from(value).map_err(|_| type_mismatch("object", value))
}

fn track_in(
    scope: &mut TrapScope<'_, '_>,
    state: &SharedState,
    context: ib_core::ContextId,
    value: v8::Local<v8::Value>,
) -> Result<Handle, BridgeError> {
    state.borrow_mut().track(scope, context, value)
}

macro_rules! constructors {
    ($($(#[$meta:meta])* $name:ident($arg:ident: $ty:ty) => |$scope:ident| $build:expr;)*) => {
        impl EngineScope<'_> {
            $(
                $(#[$meta])*
                pub fn $name(&mut self, $arg: $ty) -> Result<Handle, BridgeError> {
                    self.with_implicit_context(|$scope, state| {
                        let value: v8::Local<v8::Value> = $build;
                        let context = state.borrow().implicit_context();
                        track_in($scope, state, context, value)
                    })
                }
            )*
        }
    };
}

constructors! {
    new_integer(value: i32) => |scope| v8::Integer::new(scope, value).into();
    new_unsigned_integer(value: u32) => |scope| v8::Integer::new_from_unsigned(scope, value).into();
    new_number(value: f64) => |scope| v8::Number::new(scope, value).into();
    new_boolean(value: bool) => |scope| v8::Boolean::new(scope, value).into();
    new_string(value: &str) => |scope| new_string_local(scope, value)?.into();
    new_big_int_from_i64(value: i64) => |scope| v8::BigInt::new_from_i64(scope, value).into();
    new_big_int_from_u64(value: u64) => |scope| v8::BigInt::new_from_u64(scope, value).into();
    /// Words are little-endian; an empty list is zero.
    new_big_int_from_words(value: &BigIntWords) => |scope| {
        v8::BigInt::new_from_words(scope, value.sign_bit, &value.words)
            .ok_or_else(|| {
                BridgeError::Conversion(format!(
                    "bigint of {} words is out of range",
                    value.word_count()
                ))
            })?
            .into()
    };
}

impl EngineScope<'_> {
    pub fn undefined(&mut self) -> Result<Handle, BridgeError> {
        self.with_implicit_context(|scope, state| {
            let value = v8::undefined(scope).into();
            let context = state.borrow().implicit_context();
            track_in(scope, state, context, value)
        })
    }

    pub fn null(&mut self) -> Result<Handle, BridgeError> {
        self.with_implicit_context(|scope, state| {
            let value = v8::null(scope).into();
            let context = state.borrow().implicit_context();
            track_in(scope, state, context, value)
        })
    }

    pub fn value_kind(&mut self, handle: Handle) -> Result<ValueKind, BridgeError> {
        let scope = &mut v8::HandleScope::new(&mut self.scope);
        let value = self.state.borrow().value_local(scope, handle)?;
        Ok(kind_of(value))
    }

    pub fn to_bool(&mut self, handle: Handle) -> Result<bool, BridgeError> {
        self.with_handle_context(handle, |scope, state| {
            let value = state.borrow().value_local(scope, handle)?;
            Ok(value.boolean_value(scope))
        })
    }

    pub fn to_i32(&mut self, handle: Handle) -> Result<i32, BridgeError> {
        self.with_handle_context(handle, |scope, state| {
            let value = state.borrow().value_local(scope, handle)?;
            match value.int32_value(scope) {
                Some(number) => Ok(number),
                None => Err(conversion_failure(scope, "int32")),
            }
        })
    }

    pub fn to_u32(&mut self, handle: Handle) -> Result<u32, BridgeError> {
        self.with_handle_context(handle, |scope, state| {
            let value = state.borrow().value_local(scope, handle)?;
            match value.uint32_value(scope) {
                Some(number) => Ok(number),
                None => Err(conversion_failure(scope, "uint32")),
            }
        })
    }

    /// Integer value, truncating toward zero.
    pub fn to_i64(&mut self, handle: Handle) -> Result<i64, BridgeError> {
        self.with_handle_context(handle, |scope, state| {
            let value = state.borrow().value_local(scope, handle)?;
            if let Ok(bigint) = v8::Local::<v8::BigInt>::try_from(value) {
                let (number, lossless) = bigint.i64_value();
                if !lossless {
                    return Err(BridgeError::Conversion(
                        "bigint does not fit in a signed 64-bit integer".to_string(),
                    ));
                }
                return Ok(number);
            }
            match value.integer_value(scope) {
                Some(number) => Ok(number),
                None => Err(conversion_failure(scope, "integer")),
            }
        })
    }

    pub fn to_f64(&mut self, handle: Handle) -> Result<f64, BridgeError> {
        self.with_handle_context(handle, |scope, state| {
            let value = state.borrow().value_local(scope, handle)?;
            match value.number_value(scope) {
                Some(number) => Ok(number),
                None => Err(conversion_failure(scope, "number")),
            }
        })
    }

    pub fn to_string(&mut self, handle: Handle) -> Result<String, BridgeError> {
        self.with_handle_context(handle, |scope, state| {
            let value = state.borrow().value_local(scope, handle)?;
            if value.is_symbol() {
                return Err(type_mismatch("value with a string form", value));
            }
            match value.to_string(scope) {
                Some(text) => Ok(text.to_rust_string_lossy(scope)),
                None => Err(conversion_failure(scope, "string")),
            }
        })
    }

    /// Descriptive string form; works for symbols and objects whose
    /// `toString` throws.
    pub fn to_detail_string(&mut self, handle: Handle) -> Result<String, BridgeError> {
        self.with_handle_context(handle, |scope, state| {
            let value = state.borrow().value_local(scope, handle)?;
            match value.to_detail_string(scope) {
                Some(text) => Ok(text.to_rust_string_lossy(scope)),
                None => Err(conversion_failure(scope, "detail string")),
            }
        })
    }

    pub fn to_array_index(&mut self, handle: Handle) -> Result<Option<u32>, BridgeError> {
        self.with_handle_context(handle, |scope, state| {
            let value = state.borrow().value_local(scope, handle)?;
            let index = value.to_array_index(scope).map(|index| index.value());
            if index.is_none() && (scope.has_caught() || scope.has_terminated()) {
                return Err(conversion_failure(scope, "array index"));
            }
            Ok(index)
        })
    }

    pub fn to_big_int_words(&mut self, handle: Handle) -> Result<BigIntWords, BridgeError> {
        let scope = &mut v8::HandleScope::new(&mut self.scope);
        let value = self.state.borrow().value_local(scope, handle)?;
        let bigint =
            v8::Local::<v8::BigInt>::try_from(value).map_err(|_| type_mismatch("bigint", value))?;
        let mut words = vec![0u64; bigint.word_count()];
        let (sign_bit, _) = bigint.to_words_array(&mut words);
        Ok(BigIntWords::new(sign_bit, words))
    }

    /// Object coercion. Primitives are wrapped; the result is tracked in the
    /// value's context.
    pub fn to_object(&mut self, handle: Handle) -> Result<Handle, BridgeError> {
        self.with_handle_context(handle, |scope, state| {
            let value = state.borrow().value_local(scope, handle)?;
            match value.to_object(scope) {
                Some(object) => track_in(scope, state, handle.context(), object.into()),
                None => Err(conversion_failure(scope, "object")),
            }
        })
    }

    pub fn object_set(&mut self, object: Handle, key: &str, value: Handle) -> Result<(), BridgeError> {
        self.with_handle_context(object, |scope, state| {
            let target = object_local(scope, state, object)?;
            let value = state.borrow().value_local(scope, value)?;
            let key = new_string_local(scope, key)?;
            match target.set(scope, key.into(), value) {
                Some(_) => Ok(()),
                None => Err(translate_exception(scope).into()),
            }
        })
    }

    pub fn object_set_index(&mut self, object: Handle, index: u32, value: Handle) -> Result<(), BridgeError> {
        self.with_handle_context(object, |scope, state| {
            let target = object_local(scope, state, object)?;
            let value = state.borrow().value_local(scope, value)?;
            match target.set_index(scope, index, value) {
                Some(_) => Ok(()),
                None => Err(translate_exception(scope).into()),
            }
        })
    }

    pub fn object_get(&mut self, object: Handle, key: &str) -> Result<Handle, BridgeError> {
        self.with_handle_context(object, |scope, state| {
            let target = object_local(scope, state, object)?;
            let key = new_string_local(scope, key)?;
            match target.get(scope, key.into()) {
                Some(value) => track_in(scope, state, object.context(), value),
                None => Err(translate_exception(scope).into()),
            }
        })
    }

    pub fn object_get_index(&mut self, object: Handle, index: u32) -> Result<Handle, BridgeError> {
        self.with_handle_context(object, |scope, state| {
            let target = object_local(scope, state, object)?;
            match target.get_index(scope, index) {
                Some(value) => track_in(scope, state, object.context(), value),
                None => Err(translate_exception(scope).into()),
            }
        })
    }

    pub fn object_has(&mut self, object: Handle, key: &str) -> Result<bool, BridgeError> {
        self.with_handle_context(object, |scope, state| {
            let target = object_local(scope, state, object)?;
            let key = new_string_local(scope, key)?;
            target
                .has(scope, key.into())
                .ok_or_else(|| translate_exception(scope).into())
        })
    }

    pub fn object_has_index(&mut self, object: Handle, index: u32) -> Result<bool, BridgeError> {
        self.with_handle_context(object, |scope, state| {
            let target = object_local(scope, state, object)?;
            target
                .has_index(scope, index)
                .ok_or_else(|| translate_exception(scope).into())
        })
    }

    pub fn object_delete(&mut self, object: Handle, key: &str) -> Result<bool, BridgeError> {
        self.with_handle_context(object, |scope, state| {
            let target = object_local(scope, state, object)?;
            let key = new_string_local(scope, key)?;
            target
                .delete(scope, key.into())
                .ok_or_else(|| translate_exception(scope).into())
        })
    }

    pub fn object_delete_index(&mut self, object: Handle, index: u32) -> Result<bool, BridgeError> {
        self.with_handle_context(object, |scope, state| {
            let target = object_local(scope, state, object)?;
            target
                .delete_index(scope, index)
                .ok_or_else(|| translate_exception(scope).into())
        })
    }

    /// Calls `function` with an `undefined` receiver. The result is tracked in
    /// the function's context.
    pub fn function_call(&mut self, function: Handle, args: &[Handle]) -> Result<Handle, BridgeError> {
        self.with_handle_context(function, |scope, state| {
            let value = state.borrow().value_local(scope, function)?;
            let callee = v8::Local::<v8::Function>::try_from(value)
                .map_err(|_| type_mismatch("function", value))?;
            let mut argv = Vec::with_capacity(args.len());
            for arg in args {
                argv.push(state.borrow().value_local(scope, *arg)?);
            }
            let receiver = v8::undefined(scope).into();
            match callee.call(scope, receiver, &argv) {
                Some(result) => track_in(scope, state, function.context(), result),
                None => Err(translate_exception(scope).into()),
            }
        })
    }
}

macro_rules! predicates {
    ($($name:ident),* $(,)?) => {
        impl EngineScope<'_> {
            $(
                pub fn $name(&mut self, handle: Handle) -> Result<bool, BridgeError> {
                    let scope = &mut v8::HandleScope::new(&mut self.scope);
                    let value = self.state.borrow().value_local(scope, handle)?;
                    Ok(value.$name())
                }
            )*
        }
    };
}

predicates!(
    is_undefined,
    is_null,
    is_null_or_undefined,
    is_true,
    is_false,
    is_name,
    is_string,
    is_symbol,
    is_function,
    is_object,
    is_big_int,
    is_boolean,
    is_number,
    is_external,
    is_int32,
    is_uint32,
    is_date,
    is_arguments_object,
    is_big_int_object,
    is_number_object,
    is_string_object,
    is_symbol_object,
    is_native_error,
    is_reg_exp,
    is_async_function,
    is_generator_function,
    is_generator_object,
    is_promise,
    is_map,
    is_set,
    is_map_iterator,
    is_set_iterator,
    is_weak_map,
    is_weak_set,
    is_array,
    is_array_buffer,
    is_array_buffer_view,
    is_typed_array,
    is_uint8_array,
    is_uint8_clamped_array,
    is_int8_array,
    is_uint16_array,
    is_int16_array,
    is_uint32_array,
    is_int32_array,
    is_float32_array,
    is_float64_array,
    is_big_int64_array,
    is_big_uint64_array,
    is_data_view,
    is_shared_array_buffer,
    is_proxy,
    is_wasm_module_object,
    is_module_namespace_object,
);

#[cfg(test)]
mod value_tests {
    use crate::bridge::runtime_test_support::*;
    use ib_core::{BigIntWords, BridgeError, ValueKind};

    #[test]
    fn primitive_constructors_match_predicates() {
        let mut isolate = new_isolate();
        let mut scope = isolate.enter();
        let int = scope.new_integer(-3).expect("integer should build");
        let uint = scope.new_unsigned_integer(u32::MAX).expect("unsigned should build");
        let text = scope.new_string("hi").expect("string should build");
        let flag = scope.new_boolean(false).expect("boolean should build");
        let undefined = scope.undefined().expect("undefined should build");
        let null = scope.null().expect("null should build");

        assert!(scope.is_int32(int).expect("predicate should run"));
        assert!(!scope.is_int32(uint).expect("predicate should run"));
        assert!(scope.is_uint32(uint).expect("predicate should run"));
        assert!(scope.is_string(text).expect("predicate should run"));
        assert!(scope.is_name(text).expect("predicate should run"));
        assert!(scope.is_false(flag).expect("predicate should run"));
        assert!(scope.is_null_or_undefined(undefined).expect("predicate should run"));
        assert!(scope.is_null(null).expect("predicate should run"));
        assert_eq!(scope.value_kind(text).expect("kind should resolve"), ValueKind::String);
        assert_eq!(scope.to_u32(uint).expect("conversion should pass"), u32::MAX);
        assert_eq!(scope.to_i32(int).expect("conversion should pass"), -3);
    }

    #[test]
    fn script_values_satisfy_object_predicates() {
        let mut isolate = new_isolate();
        let mut scope = isolate.enter();
        let context = scope.create_context(None).expect("context should build");
        let cases = [
            ("new Map()", "map"),
            ("new Set()", "set"),
            ("new Uint8Array(2)", "uint8"),
            ("new DataView(new ArrayBuffer(4))", "dataview"),
            ("/a+/g", "regexp"),
            ("new Date(0)", "date"),
            ("(async () => 1)", "async"),
            ("(function* () {})", "generator"),
            ("new Proxy({}, {})", "proxy"),
            ("Promise.resolve(1)", "promise"),
            ("Symbol('s')", "symbol"),
        ];
        for (source, label) in cases {
            let value = scope
                .run_script(context, source, "predicates.js")
                .expect("script should run");
            let matched = match label {
                "map" => scope.is_map(value),
                "set" => scope.is_set(value),
                "uint8" => scope.is_uint8_array(value),
                "dataview" => scope.is_data_view(value),
                "regexp" => scope.is_reg_exp(value),
                "date" => scope.is_date(value),
                "async" => scope.is_async_function(value),
                "generator" => scope.is_generator_function(value),
                "proxy" => scope.is_proxy(value),
                "promise" => scope.is_promise(value),
                _ => scope.is_symbol(value),
            }
            .expect("predicate should run");
            assert!(matched, "{source} should satisfy {label}");
        }
    }

    #[test]
    fn integer_conversion_of_symbol_is_a_script_type_error() {
        let mut isolate = new_isolate();
        let mut scope = isolate.enter();
        let context = scope.create_context(None).expect("context should build");
        let symbol = scope
            .run_script(context, "Symbol('x')", "symbol.js")
            .expect("script should run");
        let error = scope.to_i32(symbol).expect_err("symbol should not convert");
        assert!(error
            .script_error()
            .is_some_and(|inner| inner.message.starts_with("TypeError")));
        assert_eq!(
            scope.to_detail_string(symbol).expect("detail string should build"),
            "Symbol(x)"
        );
        assert!(matches!(
            scope.to_string(symbol),
            Err(BridgeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn numeric_conversions_follow_script_coercion() {
        let mut isolate = new_isolate();
        let mut scope = isolate.enter();
        let number = scope.new_number(-7.9).expect("number should build");
        assert_eq!(scope.to_i64(number).expect("conversion should pass"), -7);
        assert_eq!(scope.to_f64(number).expect("conversion should pass"), -7.9);
        assert!(scope.to_bool(number).expect("conversion should pass"));
        let text = scope.new_string("12").expect("string should build");
        assert_eq!(scope.to_i32(text).expect("conversion should pass"), 12);
        assert_eq!(scope.to_array_index(text).expect("conversion should pass"), Some(12));
        let negative = scope.new_string("-1").expect("string should build");
        assert_eq!(scope.to_array_index(negative).expect("conversion should pass"), None);
    }

    #[test]
    fn bigint_words_survive_the_boundary() {
        let mut isolate = new_isolate();
        let mut scope = isolate.enter();
        let words = BigIntWords::from_i128(-((1i128 << 70) + 9));
        let value = scope
            .new_big_int_from_words(&words)
            .expect("bigint should build");
        assert!(scope.is_big_int(value).expect("predicate should run"));
        assert_eq!(scope.to_big_int_words(value).expect("words should decompose"), words);

        let small = scope.new_big_int_from_u64(u64::MAX).expect("bigint should build");
        assert_eq!(
            scope.to_big_int_words(small).expect("words should decompose"),
            BigIntWords::new(false, vec![u64::MAX])
        );
        let signed = scope.new_big_int_from_i64(-5).expect("bigint should build");
        assert_eq!(scope.to_i64(signed).expect("conversion should pass"), -5);

        let number = scope.new_integer(1).expect("integer should build");
        assert!(matches!(
            scope.to_big_int_words(number),
            Err(BridgeError::TypeMismatch { expected: "bigint", .. })
        ));
    }

    #[test]
    fn object_properties_round_trip_by_key_and_index() {
        let mut isolate = new_isolate();
        let mut scope = isolate.enter();
        let context = scope.create_context(None).expect("context should build");
        let object = scope
            .run_script(context, "({ list: [] })", "object.js")
            .expect("script should run");
        let value = scope.new_integer(5).expect("integer should build");

        scope.object_set(object, "count", value).expect("set should pass");
        assert!(scope.object_has(object, "count").expect("has should pass"));
        let count = scope.object_get(object, "count").expect("get should pass");
        assert_eq!(count.context(), context);
        assert_eq!(scope.to_i32(count).expect("conversion should pass"), 5);
        assert!(scope.object_delete(object, "count").expect("delete should pass"));
        assert!(!scope.object_has(object, "count").expect("has should pass"));

        let list = scope.object_get(object, "list").expect("get should pass");
        scope.object_set_index(list, 2, value).expect("set should pass");
        assert!(scope.object_has_index(list, 2).expect("has should pass"));
        assert!(!scope.object_has_index(list, 0).expect("has should pass"));
        let item = scope.object_get_index(list, 2).expect("get should pass");
        assert_eq!(scope.to_i32(item).expect("conversion should pass"), 5);
        assert!(scope.object_delete_index(list, 2).expect("delete should pass"));

        let primitive = scope.new_integer(1).expect("integer should build");
        assert!(matches!(
            scope.object_get(primitive, "x"),
            Err(BridgeError::TypeMismatch { expected: "object", .. })
        ));
    }

    #[test]
    fn throwing_getter_surfaces_script_error() {
        let mut isolate = new_isolate();
        let mut scope = isolate.enter();
        let context = scope.create_context(None).expect("context should build");
        let object = scope
            .run_script(
                context,
                "({ get bad() { throw new RangeError('nope'); } })",
                "getter.js",
            )
            .expect("script should run");
        let error = scope.object_get(object, "bad").expect_err("getter should throw");
        assert_eq!(
            error.script_error().map(|inner| inner.message.as_str()),
            Some("RangeError: nope")
        );
    }

    #[test]
    fn function_call_passes_arguments_and_tracks_result() {
        let mut isolate = new_isolate();
        let mut scope = isolate.enter();
        let context = scope.create_context(None).expect("context should build");
        let add = scope
            .run_script(context, "(a, b) => a + b", "call.js")
            .expect("script should run");
        let left = scope.new_integer(2).expect("integer should build");
        let right = scope.new_integer(40).expect("integer should build");
        let sum = scope.function_call(add, &[left, right]).expect("call should pass");
        assert_eq!(sum.context(), context);
        assert_eq!(scope.to_i32(sum).expect("conversion should pass"), 42);

        let thrower = scope
            .run_script(context, "() => { throw new Error('inside'); }", "call.js")
            .expect("script should run");
        let error = scope.function_call(thrower, &[]).expect_err("call should fail");
        assert_eq!(
            error.script_error().map(|inner| inner.message.as_str()),
            Some("Error: inside")
        );
        assert!(matches!(
            scope.function_call(left, &[]),
            Err(BridgeError::TypeMismatch { expected: "function", .. })
        ));
    }

    #[test]
    fn to_object_wraps_primitives() {
        let mut isolate = new_isolate();
        let mut scope = isolate.enter();
        let text = scope.new_string("abc").expect("string should build");
        let wrapped = scope.to_object(text).expect("coercion should pass");
        assert!(scope.is_string_object(wrapped).expect("predicate should run"));
        let undefined = scope.undefined().expect("undefined should build");
        let error = scope.to_object(undefined).expect_err("undefined should not coerce");
        assert!(error
            .script_error()
            .is_some_and(|inner| inner.message.starts_with("TypeError")));
    }

    #[test]
    fn throwing_value_of_keeps_script_error_details() {
        let mut isolate = new_isolate();
        let mut scope = isolate.enter();
        let context = scope.create_context(None).expect("context should build");
        let object = scope
            .run_script(
                context,
                "({ valueOf() { throw new RangeError('no number'); } })",
                "value-of.js",
            )
            .expect("script should run");
        let error = scope.to_f64(object).expect_err("valueOf should throw");
        let script_error = error.script_error().expect("failure should be a script error");
        assert_eq!(script_error.message, "RangeError: no number");
        assert!(script_error
            .location
            .as_deref()
            .is_some_and(|location| location.starts_with("value-of.js:1:")));
        assert!(script_error.stack.is_some());
    }

    #[test]
    fn terminated_conversion_reports_termination() {
        let mut isolate = new_isolate();
        let handle = isolate.termination_handle();
        let mut scope = isolate.enter();
        let context = scope.create_context(None).expect("context should build");
        let object = scope
            .run_script(context, "({ valueOf() { for (;;) {} } })", "spin.js")
            .expect("script should run");
        let killer = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(100));
            handle.terminate()
        });
        let error = scope.to_i32(object).expect_err("conversion should be terminated");
        assert!(killer.join().expect("terminator thread should finish"));
        assert!(error
            .script_error()
            .is_some_and(|inner| inner.is_terminated()));
        let after = scope.new_integer(3).expect("isolate should stay usable");
        assert_eq!(scope.to_i32(after).expect("conversion should pass"), 3);
    }

    #[test]
    fn out_of_range_bigint_does_not_convert_to_i64() {
        let mut isolate = new_isolate();
        let mut scope = isolate.enter();
        let context = scope.create_context(None).expect("context should build");
        let huge = scope
            .run_script(context, "2n ** 70n", "huge.js")
            .expect("script should run");
        assert!(matches!(scope.to_i64(huge), Err(BridgeError::Conversion(_))));
        let edge = scope
            .run_script(context, "-(2n ** 63n)", "edge.js")
            .expect("script should run");
        assert_eq!(scope.to_i64(edge).expect("conversion should pass"), i64::MIN);
    }
}
