//! Property rewriter
//!
//! Exposed properties of native-backed classes read and write the native
//! object directly. For each one the rewriter allocates the member's slots,
//! queues their lookups in the static initializer, replaces stub or
//! auto-implemented accessor bodies, and eliminates the compiler's backing
//! field (moving constructor initializers behind the base call).
//!
//! Properties with a hand-written accessor keep their bodies and backing
//! field; only their slots are allocated.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use stitch_bytecode::{
    FieldRef, Instr, MethodBody, MethodDef, ParamDef, PropertyDef, TypeDef, TypeSig,
};
use tracing::debug;

use crate::context::Unit;
use crate::emit::Emitter;
use crate::error::WeaveResult;
use crate::infra::body::{auto_getter_field, auto_setter_field};
use crate::infra::{ctor, fields, is_stub, Accessors, Redirects, StaticInit};
use crate::markers;
use crate::naming;
use crate::strategy::{MarshalKind, MemberSlots, Strategy, Usage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccessorState {
    /// The property declares no such accessor
    Absent,
    /// Declared but not compiled
    Missing,
    /// Stub or auto-implemented on the backing field
    Replace,
    /// Hand-written
    Custom,
}

struct Plan {
    ty: TypeSig,
    strategy: Arc<Strategy>,
    slots: MemberSlots,
    cache: Option<FieldRef>,
}

fn accessor_state(
    ty: &TypeDef,
    name: Option<&str>,
    backing: &str,
    auto: for<'m> fn(&'m MethodDef, &str) -> Option<&'m str>,
) -> AccessorState {
    let Some(name) = name else {
        return AccessorState::Absent;
    };
    match ty.methods.iter().find(|m| m.name == name && !m.is_static) {
        None => AccessorState::Missing,
        Some(m) if is_stub(m) || auto(m, &ty.name) == Some(backing) => AccessorState::Replace,
        Some(_) => AccessorState::Custom,
    }
}

/// Rewrite every exposed property of `ty`
///
/// Errors are collected per property; the remaining properties are still
/// rewritten.
pub fn rewrite_properties(unit: &mut Unit<'_>, ty: &mut TypeDef, init: &mut StaticInit, class_ptr: &FieldRef) {
    let exposed: Vec<PropertyDef> = ty
        .properties
        .iter()
        .filter(|p| p.has_attribute(markers::EXPOSED_PROPERTY))
        .cloned()
        .collect();
    if exposed.is_empty() {
        return;
    }

    let owner = ty.name.clone();
    let mut redirects = Redirects::new(owner.as_str());
    let mut plans = FxHashMap::default();

    for property in &exposed {
        match rewrite_property(unit, ty, init, class_ptr, property, &mut redirects) {
            Ok(Some(plan)) => {
                unit.mark_rewritten(&owner, &property.name);
                plans.insert(property.name.clone(), plan);
            }
            Ok(None) => {}
            Err(e) => unit.errors.push(e.at(&owner, &property.name)),
        }
    }

    if redirects.is_empty() {
        return;
    }
    let base = ty.base.clone();
    for method in &mut ty.methods {
        if method.is_constructor() {
            if let Err(e) = ctor::relocate(method, base.as_deref(), &mut redirects) {
                unit.errors.push(e);
            }
        } else if let Some(body) = method.body.as_mut() {
            redirects.apply(&mut body.instrs);
        }
    }

    // Writes to a read-only property's backing field need a setter
    let mut written: Vec<String> = redirects.written().iter().cloned().collect();
    written.sort();
    for property in written {
        let setter = naming::setter(&property);
        if ty.methods.iter().any(|m| m.name == setter && !m.is_static) {
            continue;
        }
        let Some(plan) = plans.get(&property) else {
            continue;
        };
        let native_object = unit.ctx.native_object();
        match setter_body(unit, plan, &native_object) {
            Ok(body) => {
                debug!(type_name = %owner, property = %property, "synthesized private setter");
                install(ty, &setter, vec![ParamDef::new("value", plan.ty.clone())], TypeSig::Void, body, true);
                if let Some(p) = ty.properties.iter_mut().find(|p| p.name == property) {
                    p.setter = Some(setter);
                }
            }
            Err(e) => unit.errors.push(e.at(&owner, &property)),
        }
    }

    ty.fields
        .retain(|f| naming::parse_backing_field(&f.name).map_or(true, |p| !plans.contains_key(p)));
}

fn rewrite_property(
    unit: &mut Unit<'_>,
    ty: &mut TypeDef,
    init: &mut StaticInit,
    class_ptr: &FieldRef,
    property: &PropertyDef,
    redirects: &mut Redirects,
) -> WeaveResult<Option<Plan>> {
    let ctx = unit.ctx;
    let bitfield = property.has_attribute(markers::NATIVE_BITFIELD);
    let strategy = ctx.resolver().resolve(&property.ty, Usage::Instance, bitfield)?;
    let slots = fields::allocate_member(ty, &property.name, &strategy)?;
    let native_name = markers::member_native_name(&property.attributes, &property.name);
    init.member(&mut unit.strings, ctx.helpers, class_ptr, &native_name, &slots)?;

    let backing = naming::backing_field(&property.name);
    let getter = accessor_state(ty, property.getter.as_deref(), &backing, auto_getter_field);
    let setter = accessor_state(ty, property.setter.as_deref(), &backing, auto_setter_field);
    if getter == AccessorState::Custom || setter == AccessorState::Custom {
        debug!(type_name = %ty.name, property = %property.name, "hand-written accessor left in place");
        return Ok(None);
    }

    let cache = matches!(strategy.kind, MarshalKind::MulticastDelegate(_)).then(|| {
        fields::ensure_instance(ty, &naming::delegate_cache(&property.name), property.ty.clone())
    });
    let plan = Plan {
        ty: property.ty.clone(),
        strategy,
        slots,
        cache,
    };
    let native_object = ctx.native_object();

    if let Some(name) = &property.getter {
        let body = getter_body(unit, &plan, &native_object)?;
        install(ty, name, Vec::new(), property.ty.clone(), body, false);
    }
    if let Some(name) = &property.setter {
        let body = setter_body(unit, &plan, &native_object)?;
        let params = vec![ParamDef::new("value", property.ty.clone())];
        install(ty, name, params, TypeSig::Void, body, false);
    }

    if ty.field(&backing).is_some() {
        redirects.insert(backing, Accessors::new(&ty.name, &property.name));
    }
    Ok(Some(plan))
}

fn native_buffer(native_object: &FieldRef) -> impl Fn(&mut Emitter<'_>) + '_ {
    move |em: &mut Emitter<'_>| {
        em.emit(Instr::LoadArg(0));
        em.emit(Instr::LoadField(native_object.clone()));
    }
}

fn getter_body(unit: &mut Unit<'_>, plan: &Plan, native_object: &FieldRef) -> WeaveResult<MethodBody> {
    let buffer = native_buffer(native_object);
    let mut em = Emitter::new(&mut unit.strings);
    match &plan.cache {
        // Multi-cast wrappers are cached per object
        Some(cache) => {
            let ready = em.label();
            em.emit(Instr::LoadArg(0));
            em.emit(Instr::LoadField(cache.clone()));
            em.emit(Instr::BrTrue(ready));
            em.emit(Instr::LoadArg(0));
            plan.strategy.emit_load(&mut em, &plan.slots, &buffer)?;
            em.emit(Instr::StoreField(cache.clone()));
            em.mark(ready);
            em.emit(Instr::LoadArg(0));
            em.emit(Instr::LoadField(cache.clone()));
            em.emit(Instr::Ret);
        }
        None => plan.strategy.emit_getter(&mut em, &plan.slots, &buffer)?,
    }
    Ok(em.finish())
}

fn setter_body(unit: &mut Unit<'_>, plan: &Plan, native_object: &FieldRef) -> WeaveResult<MethodBody> {
    let buffer = native_buffer(native_object);
    let mut em = Emitter::new(&mut unit.strings);
    match &plan.cache {
        Some(cache) => {
            plan.strategy.emit_store(&mut em, &plan.slots, &buffer, &|em: &mut Emitter<'_>| {
                em.emit(Instr::LoadArg(1));
            })?;
            em.emit(Instr::LoadArg(0));
            em.emit(Instr::ConstNull);
            em.emit(Instr::StoreField(cache.clone()));
            em.emit(Instr::Ret);
        }
        None => plan.strategy.emit_setter(&mut em, &plan.slots, &buffer)?,
    }
    Ok(em.finish())
}

/// Replace the body of accessor `name`, creating the method if missing
fn install(ty: &mut TypeDef, name: &str, params: Vec<ParamDef>, ret: TypeSig, body: MethodBody, private: bool) {
    let arity = params.len() as u16;
    match ty
        .methods
        .iter_mut()
        .find(|m| m.name == name && !m.is_static && m.arity() == arity)
    {
        Some(method) => method.body = Some(body),
        None => {
            let mut method = MethodDef::new(name, params, ret).with_body(body);
            method.is_private = private;
            ty.methods.push(method);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WeaveConfig;
    use crate::context::{Registry, WeaveContext};
    use crate::helpers::HelperLibrary;
    use crate::index::TypeIndex;
    use crate::strategy::StrategyCache;
    use stitch_bytecode::{Attribute, ConstantPool, MethodRef, Module, TypeKind};
    use stitch_sdk::helpers::CTOR;
    use stitch_sdk::NativeMetadata;

    fn actor() -> TypeDef {
        let mut ty = TypeDef::new("Game.Actor", TypeKind::Class);
        ty.base = Some("Host.CoreObject".into());
        ty.attributes.push(Attribute::new(markers::EXPOSED_CLASS));

        let backing = FieldRef::new("Game.Actor", naming::backing_field("Tags"));
        let mut field = stitch_bytecode::FieldDef::new(backing.name.clone(), TypeSig::Array(Box::new(TypeSig::Name)));
        field.is_private = true;
        ty.fields.push(field);

        let mut tags = PropertyDef::new("Tags", TypeSig::Array(Box::new(TypeSig::Name)));
        tags.setter = None;
        tags.attributes.push(Attribute::new(markers::EXPOSED_PROPERTY));
        ty.properties.push(tags);
        ty.methods.push(
            MethodDef::new("get_Tags", vec![], TypeSig::Array(Box::new(TypeSig::Name))).with_body(MethodBody::new(
                vec![Instr::LoadArg(0), Instr::LoadField(backing.clone()), Instr::Ret],
            )),
        );

        let mut health = PropertyDef::new("Health", TypeSig::F32);
        health.attributes.push(Attribute::new(markers::EXPOSED_PROPERTY));
        ty.properties.push(health);
        ty.methods.push(MethodDef::new("get_Health", vec![], TypeSig::F32));
        ty.methods.push(MethodDef::new("set_Health", vec![ParamDef::new("value", TypeSig::F32)], TypeSig::Void));

        // Tags = new[] {} compiled as a constant placeholder, then the base call
        ty.methods.push(MethodDef::new(CTOR, vec![], TypeSig::Void).with_body(MethodBody::new(vec![
            Instr::LoadArg(0),
            Instr::ConstNull,
            Instr::StoreField(backing),
            Instr::LoadArg(0),
            Instr::Call(MethodRef::new("Host.CoreObject", CTOR, 0)),
            Instr::Ret,
        ])));
        ty
    }

    fn weave(ty: &mut TypeDef) -> (usize, Vec<String>) {
        let config = WeaveConfig::default();
        let helpers = HelperLibrary::standard(&config);
        let mut module = Module::new("m");
        module.types.push(ty.clone());
        let index = TypeIndex::build(&module, &helpers).unwrap();
        let metadata = NativeMetadata::new();
        let strategies = StrategyCache::new();
        let registry = Registry::new();
        let ctx = WeaveContext {
            config: &config,
            helpers: &helpers,
            index: &index,
            metadata: &metadata,
            strategies: &strategies,
            registry: &registry,
        };
        let mut unit = Unit::new(&ctx, &ConstantPool::new());
        let mut init = StaticInit::new(ty.name.clone());
        let class_ptr = init.native_class(&mut unit.strings, &helpers, "Actor").unwrap();
        rewrite_properties(&mut unit, ty, &mut init, &class_ptr);
        assert!(unit.errors.is_empty(), "{}", unit.errors);
        (init.instrs().len(), unit.rewritten)
    }

    #[test]
    fn test_properties_are_rewritten_and_backing_removed() {
        let mut ty = actor();
        let (_, rewritten) = weave(&mut ty);
        assert_eq!(rewritten, ["Game.Actor::Tags", "Game.Actor::Health"]);

        assert!(ty.field(&naming::backing_field("Tags")).is_none());
        assert!(ty.field("Tags_Offset").is_some());
        assert!(ty.field("Tags_NativeProperty").is_some());
        assert!(ty.field("Tags_Marshaller").is_some());
        assert!(ty.field("Health_Offset").is_some());

        let getter = ty.method("get_Health").unwrap().body.as_ref().unwrap();
        assert!(getter.instrs.contains(&Instr::LoadNative(stitch_sdk::NativeKind::F32)));
    }

    #[test]
    fn test_null_initializer_needs_no_setter() {
        let mut ty = actor();
        weave(&mut ty);
        assert!(ty.method("set_Tags").is_none());
        let ctor = ty.method(CTOR).unwrap().body.as_ref().unwrap();
        assert_eq!(ctor.instrs.len(), 3);
    }

    #[test]
    fn test_custom_accessor_is_left_alone() {
        let mut ty = actor();
        let custom = MethodBody::new(vec![Instr::ConstI32(3), Instr::Ret]);
        ty.method_mut("get_Health").unwrap().body = Some(custom.clone());
        weave(&mut ty);
        assert_eq!(ty.method("get_Health").unwrap().body.as_ref(), Some(&custom));
        assert!(ty.field("Health_Offset").is_some());
    }
}
