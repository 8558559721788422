//! Test harness for weave-then-run scenarios
//!
//! Builds managed modules the way a compiler would emit them, weaves them
//! against a native descriptor table and loads the result into an
//! interpreter backed by a fresh native host.

use stitch_bytecode::{
    Attribute, FieldDef, FieldRef, Instr, MethodBody, MethodDef, MethodRef, Module, ParamDef, PropertyDef, TypeDef,
    TypeKind, TypeSig,
};
use stitch_runtime::{Interpreter, NativeHost, Object, Value};
use stitch_sdk::helpers::CTOR;
use stitch_sdk::{NativeMetadata, NativeTypeDesc};
use stitch_weaver::helpers::HelperLibrary;
use stitch_weaver::{markers, naming, WeaveConfig, Weaver};

pub const CORE_OBJECT: &str = "Host.CoreObject";

// ============================================================================
// Managed declarations
// ============================================================================

/// Class deriving from the core object, marked for weaving
pub fn exposed_class(name: &str) -> TypeDef {
    let mut ty = TypeDef::new(name, TypeKind::Class);
    ty.base = Some(CORE_OBJECT.into());
    ty.attributes.push(Attribute::new(markers::EXPOSED_CLASS));
    ty
}

/// Auto property with a compiler-generated backing field
pub fn auto_property(ty: &mut TypeDef, name: &str, sig: TypeSig) {
    let backing = FieldRef::new(ty.name.as_str(), naming::backing_field(name));
    let mut field = FieldDef::new(backing.name.as_str(), sig.clone());
    field.is_private = true;
    ty.fields.push(field);

    let mut property = PropertyDef::new(name, sig.clone());
    property.attributes.push(Attribute::new(markers::EXPOSED_PROPERTY));
    ty.properties.push(property);

    ty.methods.push(MethodDef::new(naming::getter(name), vec![], sig.clone()).with_body(MethodBody::new(vec![
        Instr::LoadArg(0),
        Instr::LoadField(backing.clone()),
        Instr::Ret,
    ])));
    ty.methods.push(
        MethodDef::new(naming::setter(name), vec![ParamDef::new("value", sig)], TypeSig::Void).with_body(
            MethodBody::new(vec![Instr::LoadArg(0), Instr::LoadArg(1), Instr::StoreField(backing), Instr::Ret]),
        ),
    );
}

/// Packed boolean property
pub fn bitfield_property(ty: &mut TypeDef, name: &str) {
    auto_property(ty, name, TypeSig::Bool);
    if let Some(property) = ty.properties.iter_mut().find(|p| p.name == name) {
        property.attributes.push(Attribute::new(markers::NATIVE_BITFIELD));
    }
}

/// Constructor running `initializers` before the base call, the way field
/// initializers are compiled
pub fn constructor(ty: &mut TypeDef, initializers: Vec<Instr>) {
    let mut instrs = initializers;
    instrs.extend([
        Instr::LoadArg(0),
        Instr::Call(MethodRef::new(CORE_OBJECT, CTOR, 0)),
        Instr::Ret,
    ]);
    ty.methods
        .push(MethodDef::new(CTOR, vec![], TypeSig::Void).with_body(MethodBody::new(instrs)));
}

/// `this.<backing of property> = <value>` as a constructor initializer
pub fn initializer(ty: &TypeDef, property: &str, value: Instr) -> Vec<Instr> {
    vec![
        Instr::LoadArg(0),
        value,
        Instr::StoreField(FieldRef::new(ty.name.as_str(), naming::backing_field(property))),
    ]
}

/// Exposed function; `options` are marker arguments such as `Event`
pub fn exposed_function(name: &str, params: Vec<ParamDef>, ret: TypeSig, options: &[&str]) -> MethodDef {
    let mut marker = Attribute::new(markers::EXPOSED_FUNCTION);
    for option in options {
        marker = marker.with_str(*option);
    }
    let mut method = MethodDef::new(name, params, ret);
    method.attributes.push(marker);
    method
}

/// Exposed record
pub fn record(name: &str, fields: &[(&str, TypeSig)]) -> TypeDef {
    let mut ty = TypeDef::new(name, TypeKind::Struct);
    ty.attributes.push(Attribute::new(markers::EXPOSED_STRUCT));
    for (field, sig) in fields {
        ty.fields.push(FieldDef::new(*field, sig.clone()));
    }
    ty
}

/// Exposed callable type with a single `Invoke`
pub fn callable(name: &str, params: Vec<ParamDef>, multicast: bool) -> TypeDef {
    let mut ty = TypeDef::new(name, TypeKind::Delegate);
    ty.attributes.push(Attribute::new(if multicast {
        markers::EXPOSED_MULTICAST_DELEGATE
    } else {
        markers::EXPOSED_DELEGATE
    }));
    let mut invoke = MethodDef::new(naming::INVOKE, params, TypeSig::Void);
    invoke.is_virtual = true;
    ty.methods.push(invoke);
    ty
}

/// Exposed interface declaring `methods`
pub fn interface(name: &str, methods: Vec<MethodDef>) -> TypeDef {
    let mut ty = TypeDef::new(name, TypeKind::Interface);
    ty.attributes.push(Attribute::new(markers::EXPOSED_INTERFACE));
    for mut method in methods {
        method.is_abstract = true;
        method.is_virtual = true;
        ty.methods.push(method);
    }
    ty
}

// ============================================================================
// Weave and load
// ============================================================================

/// Weave `module` against `types` and load it into a fresh host
pub fn load(mut module: Module, types: Vec<NativeTypeDesc>) -> Interpreter {
    let metadata = NativeMetadata::from_types(types).expect("native types are consistent");
    let config = WeaveConfig {
        jobs: 1,
        ..WeaveConfig::default()
    };
    let helpers = HelperLibrary::standard(&config);
    let weaver = Weaver::new(config, helpers, metadata.clone());
    if let Err(errors) = weaver.weave(&mut module) {
        panic!("weave failed:\n{}", errors);
    }
    Interpreter::new(module, NativeHost::new(metadata))
}

/// Single-type module
pub fn module_of(types: Vec<TypeDef>) -> Module {
    let mut module = Module::new("game");
    module.types.extend(types);
    module
}

// ============================================================================
// Values
// ============================================================================

/// Managed record value
pub fn record_value(class: &str, fields: Vec<(&str, Value)>) -> Value {
    Value::object(Object {
        class: class.to_string(),
        is_record: true,
        fields: fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
    })
}

/// Field of a managed object
pub fn field(value: &Value, name: &str) -> Value {
    value.as_object().expect("object value").borrow().get(name)
}

pub fn ints(values: &[i64]) -> Value {
    Value::list(values.iter().map(|v| Value::Int(*v)).collect())
}
