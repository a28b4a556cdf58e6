use ib_core::{BridgeError, CallbackToken, ContextId, PropertyAttributes, TemplateId};

use super::dispatch::dispatch_trampoline;
use super::registry::Handle;
use super::scope::EngineScope;
use super::state::TemplateRecord;
use super::value::{kind_of, new_string_local};

/// What a template property is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateValue {
    /// A primitive value. Objects cannot be shared across instances.
    Value(Handle),
    Template(TemplateId),
}

fn property_attribute(attributes: PropertyAttributes) -> v8::PropertyAttribute {
    let mut attribute = v8::PropertyAttribute::NONE;
    if attributes.contains(PropertyAttributes::READ_ONLY) {
        attribute = attribute | v8::PropertyAttribute::READ_ONLY;
    }
    if attributes.contains(PropertyAttributes::DONT_ENUM) {
        attribute = attribute | v8::PropertyAttribute::DONT_ENUM;
    }
    if attributes.contains(PropertyAttributes::DONT_DELETE) {
        attribute = attribute | v8::PropertyAttribute::DONT_DELETE;
    }
    attribute
}

impl EngineScope<'_> {
    pub fn new_object_template(&mut self) -> TemplateId {
        let scope = &mut v8::HandleScope::new(&mut self.scope);
        let template = v8::ObjectTemplate::new(scope);
        let template = v8::Global::new(scope, template);
        self.state
            .borrow_mut()
            .insert_template(TemplateRecord::Object(template))
    }

    /// Function template whose instances dispatch to the host callback
    /// registered under `token`.
    pub fn new_function_template(&mut self, token: CallbackToken) -> Result<TemplateId, BridgeError> {
        if !self.state.borrow().has_callback(token) {
            return Err(BridgeError::UnknownCallback(token.get()));
        }
        let scope = &mut v8::HandleScope::new(&mut self.scope);
        let data = v8::Integer::new_from_unsigned(scope, token.get());
        let template = v8::FunctionTemplate::builder(dispatch_trampoline)
            .data(data.into())
            .build(scope);
        let template = v8::Global::new(scope, template);
        Ok(self
            .state
            .borrow_mut()
            .insert_template(TemplateRecord::Function { template, token }))
    }

    pub fn template_set(
        &mut self,
        template: TemplateId,
        name: &str,
        value: TemplateValue,
        attributes: PropertyAttributes,
    ) -> Result<(), BridgeError> {
        let scope = &mut v8::HandleScope::new(&mut self.scope);
        let state = self.state.borrow();
        let data: v8::Local<v8::Data> = match value {
            TemplateValue::Value(handle) => {
                let local = state.value_local(scope, handle)?;
                if !kind_of(local).is_primitive() {
                    return Err(BridgeError::TypeMismatch {
                        expected: "primitive value",
                        found: kind_of(local).to_string(),
                    });
                }
                local.into()
            }
            TemplateValue::Template(id) => match state.template(id)? {
                TemplateRecord::Object(inner) => v8::Local::new(scope, inner).into(),
                TemplateRecord::Function { template: inner, .. } => {
                    v8::Local::new(scope, inner).into()
                }
            },
        };
        let key = new_string_local(scope, name)?;
        let attribute = property_attribute(attributes);
        match state.template(template)? {
            TemplateRecord::Object(target) => {
                v8::Local::new(scope, target).set_with_attr(key.into(), data, attribute)
            }
            TemplateRecord::Function { template: target, .. } => {
                v8::Local::new(scope, target).set_with_attr(key.into(), data, attribute)
            }
        }
        Ok(())
    }

    /// Object templates yield a fresh object, function templates a callable
    /// function, tracked under `context`.
    pub fn instantiate_template(&mut self, template: TemplateId, context: ContextId) -> Result<Handle, BridgeError> {
        self.with_context(context, |scope, state| {
            let instance: Option<v8::Local<v8::Value>> = match state.borrow().template(template)? {
                TemplateRecord::Object(inner) => v8::Local::new(scope, inner)
                    .new_instance(scope)
                    .map(Into::into),
                TemplateRecord::Function { template: inner, .. } => v8::Local::new(scope, inner)
                    .get_function(scope)
                    .map(Into::into),
            };
            match instance {
                Some(value) => state.borrow_mut().track(scope, context, value),
                None => Err(super::exception::script_failure(scope)),
            }
        })
    }

    pub fn delete_template(&mut self, template: TemplateId) -> bool {
        self.state.borrow_mut().remove_template(template)
    }
}

#[cfg(test)]
mod template_tests {
    use crate::bridge::runtime_test_support::*;
    use ib_core::{BridgeError, CallbackToken, PropertyAttributes, TemplateId};

    use super::TemplateValue;

    #[test]
    fn object_template_properties_reach_instances() {
        let mut isolate = new_isolate();
        let mut scope = isolate.enter();
        let context = scope.create_context(None).expect("context should build");
        let template = scope.new_object_template();
        let version = scope.new_string("1.0").expect("string should build");
        scope
            .template_set(
                template,
                "version",
                TemplateValue::Value(version),
                PropertyAttributes::READ_ONLY,
            )
            .expect("set should pass");
        let instance = scope
            .instantiate_template(template, context)
            .expect("instance should build");
        assert_eq!(instance.context(), context);
        let read = scope.object_get(instance, "version").expect("get should pass");
        assert_eq!(scope.to_string(read).expect("string should build"), "1.0");
    }

    #[test]
    fn global_template_shapes_context_global() {
        let mut isolate = new_isolate();
        let mut scope = isolate.enter();
        let global = scope.new_object_template();
        let nested = scope.new_object_template();
        let answer = scope.new_integer(42).expect("integer should build");
        scope
            .template_set(nested, "answer", TemplateValue::Value(answer), PropertyAttributes::empty())
            .expect("set should pass");
        scope
            .template_set(
                global,
                "config",
                TemplateValue::Template(nested),
                PropertyAttributes::DONT_ENUM | PropertyAttributes::DONT_DELETE,
            )
            .expect("set should pass");
        let context = scope.create_context(Some(global)).expect("context should build");
        let value = scope
            .run_script(
                context,
                "delete config; [config.answer, Object.keys(globalThis).includes('config')].join()",
                "global.js",
            )
            .expect("script should run");
        assert_eq!(scope.to_string(value).expect("string should build"), "42,false");
    }

    #[test]
    fn read_only_property_ignores_writes() {
        let mut isolate = new_isolate();
        let mut scope = isolate.enter();
        let global = scope.new_object_template();
        let fixed = scope.new_integer(1).expect("integer should build");
        scope
            .template_set(global, "fixed", TemplateValue::Value(fixed), PropertyAttributes::READ_ONLY)
            .expect("set should pass");
        let context = scope.create_context(Some(global)).expect("context should build");
        let value = scope
            .run_script(context, "fixed = 9; fixed", "ro.js")
            .expect("script should run");
        assert_eq!(scope.to_i32(value).expect("conversion should pass"), 1);
    }

    #[test]
    fn template_rejects_object_values() {
        let mut isolate = new_isolate();
        let mut scope = isolate.enter();
        let context = scope.create_context(None).expect("context should build");
        let template = scope.new_object_template();
        let object = scope
            .run_script(context, "({})", "obj.js")
            .expect("script should run");
        assert!(matches!(
            scope.template_set(template, "o", TemplateValue::Value(object), PropertyAttributes::empty()),
            Err(BridgeError::TypeMismatch { expected: "primitive value", .. })
        ));
    }

    #[test]
    fn function_template_requires_registered_callback() {
        let mut isolate = new_isolate();
        let mut scope = isolate.enter();
        assert_eq!(
            scope.new_function_template(CallbackToken(999)),
            Err(BridgeError::UnknownCallback(999))
        );
    }

    #[test]
    fn function_template_cannot_shape_a_global() {
        let mut isolate = new_isolate();
        let mut scope = isolate.enter();
        let token = scope.register_callback(|_, _| Ok(None));
        let template = scope.new_function_template(token).expect("template should build");
        assert!(matches!(
            scope.create_context(Some(template)),
            Err(BridgeError::TypeMismatch { expected: "object template", .. })
        ));
    }

    #[test]
    fn deleted_template_is_unknown() {
        let mut isolate = new_isolate();
        let mut scope = isolate.enter();
        let context = scope.create_context(None).expect("context should build");
        let template = scope.new_object_template();
        assert!(scope.delete_template(template));
        assert!(!scope.delete_template(template));
        assert_eq!(
            scope.instantiate_template(template, context),
            Err(BridgeError::UnknownTemplate(template.get()))
        );
        assert_eq!(
            scope.instantiate_template(TemplateId(404), context),
            Err(BridgeError::UnknownTemplate(404))
        );
    }
}
