//! Helper library resolution
//!
//! Strategies never invent helper references: every helper type and method
//! they emit a call to is looked up here first. The library is either the
//! built-in catalog or the type table of a helper module, so a weave against
//! an outdated helper module fails with the name of what is missing instead
//! of producing calls to nothing.

use rustc_hash::{FxHashMap, FxHashSet};
use stitch_bytecode::{FieldRef, MethodRef, Module};
use stitch_sdk::helpers::{self, HelperType, CTOR, NATIVE_DELEGATE_FIELD, NATIVE_OBJECT_FIELD};

use crate::config::WeaveConfig;
use crate::error::{WeaveError, WeaveResult};

/// Helper types and methods available to woven code
#[derive(Debug, Clone)]
pub struct HelperLibrary {
    namespace: String,
    core_object: String,
    /// Qualified type name -> (method name, arity)
    methods: FxHashMap<String, FxHashSet<(String, u16)>>,
}

impl HelperLibrary {
    /// The built-in catalog
    pub fn standard(config: &WeaveConfig) -> Self {
        let mut methods: FxHashMap<String, FxHashSet<(String, u16)>> = FxHashMap::default();
        for ty in HelperType::ALL {
            let entry = methods.entry(ty.qualified(&config.helper_namespace)).or_default();
            for m in ty.methods() {
                entry.insert((m.name, m.arity));
            }
        }
        methods.insert(
            config.core_object.clone(),
            [(CTOR.to_string(), 0), (CTOR.to_string(), 1)]
                .into_iter()
                .collect(),
        );
        Self {
            namespace: config.helper_namespace.clone(),
            core_object: config.core_object.clone(),
            methods,
        }
    }

    /// The types a helper module declares under the configured namespace,
    /// plus its core object type
    pub fn from_module(module: &Module, config: &WeaveConfig) -> Self {
        let prefix = format!("{}.", config.helper_namespace);
        let methods = module
            .types
            .iter()
            .filter(|ty| ty.name.starts_with(&prefix) || ty.name == config.core_object)
            .map(|ty| {
                let set = ty
                    .methods
                    .iter()
                    .map(|m| (m.name.clone(), m.arity()))
                    .collect();
                (ty.name.clone(), set)
            })
            .collect();
        Self {
            namespace: config.helper_namespace.clone(),
            core_object: config.core_object.clone(),
            methods,
        }
    }

    /// Helper namespace
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Managed root of native-backed classes
    pub fn core_object(&self) -> &str {
        &self.core_object
    }

    /// Whether `name` is a helper type or the core object
    pub fn contains_type(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Qualified name of a helper type
    pub fn type_name(&self, ty: HelperType) -> WeaveResult<String> {
        let name = ty.qualified(&self.namespace);
        if self.methods.contains_key(&name) {
            Ok(name)
        } else {
            Err(WeaveError::metadata(&name, "helper type is missing from the helper library"))
        }
    }

    fn lookup(&self, owner: &str, name: &str, arity: u16) -> WeaveResult<MethodRef> {
        let methods = self.methods.get(owner).ok_or_else(|| {
            WeaveError::metadata(owner, "helper type is missing from the helper library")
        })?;
        if methods.contains(&(name.to_string(), arity)) {
            Ok(MethodRef::new(owner, name, arity))
        } else {
            Err(WeaveError::metadata(
                owner,
                format!("helper method {}/{} is missing", name, arity),
            ))
        }
    }

    /// Resolve a helper method
    pub fn method(&self, ty: HelperType, name: &str, arity: u16) -> WeaveResult<MethodRef> {
        self.lookup(&ty.qualified(&self.namespace), name, arity)
    }

    /// Resolve a generic helper method instantiated for `type_arg`
    pub fn generic_method(
        &self,
        ty: HelperType,
        name: &str,
        arity: u16,
        type_arg: &str,
    ) -> WeaveResult<MethodRef> {
        Ok(self.method(ty, name, arity)?.with_type_arg(type_arg))
    }

    /// Constructor of the core object taking `arity` arguments
    pub fn core_ctor(&self, arity: u16) -> WeaveResult<MethodRef> {
        self.lookup(&self.core_object, CTOR, arity)
    }

    /// The core object's native pointer field
    pub fn native_object(&self) -> FieldRef {
        FieldRef::new(&self.core_object, NATIVE_OBJECT_FIELD)
    }

    /// `DelegateBase` type name
    pub fn delegate_base(&self) -> WeaveResult<String> {
        self.type_name(HelperType::DelegateBase)
    }

    /// `DelegateBase`'s native storage field
    pub fn native_delegate(&self) -> WeaveResult<FieldRef> {
        Ok(FieldRef::new(self.delegate_base()?, NATIVE_DELEGATE_FIELD))
    }

    /// `TypeRegistry` method
    pub fn type_registry(&self, name: &str, arity: u16) -> WeaveResult<MethodRef> {
        self.method(HelperType::TypeRegistry, name, arity)
    }

    /// `PropertyRegistry` method
    pub fn property_registry(&self, name: &str, arity: u16) -> WeaveResult<MethodRef> {
        self.method(HelperType::PropertyRegistry, name, arity)
    }

    /// `FunctionRegistry` method
    pub fn function_registry(&self, name: &str, arity: u16) -> WeaveResult<MethodRef> {
        self.method(HelperType::FunctionRegistry, name, arity)
    }

    /// `FunctionInvoker` method
    pub fn invoker(&self, name: &str) -> WeaveResult<MethodRef> {
        self.method(HelperType::FunctionInvoker, name, 3)
    }

    /// `DelegateInvoker` method
    pub fn delegate_invoker(&self, multicast: bool) -> WeaveResult<MethodRef> {
        let name = if multicast {
            helpers::PROCESS_MULTICAST_DELEGATE
        } else {
            helpers::PROCESS_DELEGATE
        };
        self.method(HelperType::DelegateInvoker, name, 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stitch_bytecode::{MethodDef, TypeDef, TypeKind, TypeSig};

    #[test]
    fn test_standard_library_resolves_catalog() {
        let lib = HelperLibrary::standard(&WeaveConfig::default());
        let m = lib
            .method(HelperType::ArrayMarshaller, CTOR, 3)
            .unwrap();
        assert_eq!(m.owner, "Host.Interop.ArrayMarshaller");
        assert!(lib.core_ctor(0).is_ok());
        assert_eq!(lib.native_object().to_string(), "Host.CoreObject::NativeObject");
        assert_eq!(
            lib.delegate_invoker(true).unwrap().name,
            helpers::PROCESS_MULTICAST_DELEGATE
        );
    }

    #[test]
    fn test_missing_method_is_metadata_error() {
        let lib = HelperLibrary::standard(&WeaveConfig::default());
        let err = lib.method(HelperType::ArrayMarshaller, CTOR, 9).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.message.contains(".ctor/9"));
    }

    #[test]
    fn test_from_module() {
        let config = WeaveConfig::default();
        let mut helpers = Module::new("helpers");
        let mut strings = TypeDef::new("Host.Interop.StringMarshaller", TypeKind::Class);
        strings
            .methods
            .push(MethodDef::new("FromNative", vec![], TypeSig::String));
        helpers.types.push(strings);
        helpers
            .types
            .push(TypeDef::new("Other.Thing", TypeKind::Class));

        let lib = HelperLibrary::from_module(&helpers, &config);
        assert!(lib.contains_type("Host.Interop.StringMarshaller"));
        assert!(!lib.contains_type("Other.Thing"));
        assert!(lib.method(HelperType::StringMarshaller, "FromNative", 0).is_ok());

        let err = lib.type_name(HelperType::ArrayMarshaller).unwrap_err();
        assert_eq!(err.type_name, "Host.Interop.ArrayMarshaller");
        assert!(lib.core_ctor(0).is_err());
    }
}
