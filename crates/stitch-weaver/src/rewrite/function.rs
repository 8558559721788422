//! Function rewriter
//!
//! An exposed function's body becomes a native call:
//!
//! 1. stack-allocate the parameter buffer (`<func>_ParamsSize` bytes)
//! 2. marshal in and by-ref parameters into it
//! 3. invoke the native function through the invoker matching its shape
//! 4. marshal out/by-ref parameters and the return value back
//! 5. release native storage of parameters and return value, in
//!    declaration order
//!
//! A function without parameters and return value passes a null buffer.
//! Managed logic found in the body moves to `<func>_Implementation`, which
//! the skeleton calls afterwards: conditionally for events (when the native
//! side has no override), unconditionally otherwise.

use std::sync::Arc;

use stitch_bytecode::{
    FieldRef, Instr, MethodDef, MethodRef, ParamDirection, TypeDef, TypeSig,
};
use stitch_sdk::helpers::{
    GET_NATIVE_FUNCTION_FROM_INSTANCE_AND_NAME, INVOKE_NATIVE_FUNCTION, INVOKE_NATIVE_FUNCTION_OUT_PARMS,
    INVOKE_NATIVE_NET_FUNCTION, INVOKE_NATIVE_STATIC_FUNCTION, IS_NATIVE_OVERRIDE,
};
use stitch_sdk::metadata::RETURN_VALUE;
use tracing::debug;

use crate::context::Unit;
use crate::emit::Emitter;
use crate::error::{WeaveError, WeaveResult};
use crate::infra::{fields, is_stub, StaticInit};
use crate::markers;
use crate::naming;
use crate::strategy::{MemberSlots, Strategy, Usage};

/// One marshaled parameter
#[derive(Debug, Clone)]
pub struct ParamPlan {
    /// Parameter name
    pub name: String,
    /// Argument slot
    pub arg: u16,
    /// Direction
    pub direction: ParamDirection,
    /// Strategy (static usage)
    pub strategy: Arc<Strategy>,
    /// Slots
    pub slots: MemberSlots,
}

impl ParamPlan {
    fn passes_in(&self) -> bool {
        self.direction != ParamDirection::Out
    }

    fn passes_out(&self) -> bool {
        self.direction != ParamDirection::In
    }
}

/// Marshaling plan of one native call
#[derive(Debug, Clone)]
pub struct CallPlan {
    /// Buffer size slot
    pub params_size: FieldRef,
    /// Parameters in declaration order
    pub params: Vec<ParamPlan>,
    /// Return type, strategy and slots
    pub ret: Option<(TypeSig, Arc<Strategy>, MemberSlots)>,
}

/// Invocation emitted between marshal-in and marshal-out; receives the
/// buffer local (`None` when the call needs no buffer)
pub type Invoke<'a> = &'a dyn Fn(&mut Emitter<'_>, Option<u16>);

impl CallPlan {
    /// Resolve strategies and allocate slots for `method`'s parameters and
    /// return value
    ///
    /// `function` prefixes every slot; `root` is the native function (or
    /// signature) descriptor the offsets are looked up on.
    pub fn prepare(
        unit: &mut Unit<'_>,
        ty: &mut TypeDef,
        init: &mut StaticInit,
        method: &MethodDef,
        function: &str,
        root: &FieldRef,
        params_size: FieldRef,
    ) -> WeaveResult<Self> {
        let ctx = unit.ctx;
        let resolver = ctx.resolver();
        let mut params = Vec::with_capacity(method.params.len());

        for (i, param) in method.params.iter().enumerate() {
            let prefix = naming::function_member(function, &param.name);
            let strategy = resolver
                .resolve(&param.ty, Usage::Static, false)
                .map_err(|e| e.at(&ty.name, &prefix))?;
            let slots = fields::allocate_member(ty, &prefix, &strategy)?;
            init.member(&mut unit.strings, ctx.helpers, root, &param.name, &slots)?;
            params.push(ParamPlan {
                name: param.name.clone(),
                arg: method.arg_index(i),
                direction: param.direction,
                strategy,
                slots,
            });
        }

        let ret = if method.ret.is_void() {
            None
        } else {
            let prefix = naming::return_value(function);
            let strategy = resolver
                .resolve(&method.ret, Usage::Static, false)
                .map_err(|e| e.at(&ty.name, &prefix))?;
            let slots = fields::allocate_member(ty, &prefix, &strategy)?;
            init.member(&mut unit.strings, ctx.helpers, root, RETURN_VALUE, &slots)?;
            Some((method.ret.clone(), strategy, slots))
        };

        Ok(Self {
            params_size,
            params,
            ret,
        })
    }

    /// Whether a parameter buffer is needed
    pub fn has_buffer(&self) -> bool {
        !self.params.is_empty() || self.ret.is_some()
    }

    /// Whether any parameter is written back
    pub fn has_out_params(&self) -> bool {
        self.params.iter().any(ParamPlan::passes_out)
    }

    /// Emit the skeleton; returns the local holding the return value
    pub fn emit(&self, em: &mut Emitter<'_>, invoke: Invoke<'_>) -> WeaveResult<Option<u16>> {
        if !self.has_buffer() {
            invoke(em, None);
            return Ok(None);
        }

        let buf = em.local(TypeSig::IntPtr);
        em.load_static(&self.params_size);
        em.emit(Instr::StackAlloc);
        em.emit(Instr::StoreLocal(buf));
        let buffer = move |em: &mut Emitter<'_>| {
            em.emit(Instr::LoadLocal(buf));
        };

        for param in self.params.iter().filter(|p| p.passes_in()) {
            let arg = param.arg;
            let by_ref = param.direction == ParamDirection::Ref;
            param.strategy.emit_store(em, &param.slots, &buffer, &move |em: &mut Emitter<'_>| {
                em.emit(Instr::LoadArg(arg));
                if by_ref {
                    em.emit(Instr::LoadIndirect);
                }
            })?;
        }

        invoke(em, Some(buf));

        for param in self.params.iter().filter(|p| p.passes_out()) {
            em.emit(Instr::LoadArg(param.arg));
            param.strategy.emit_load(em, &param.slots, &buffer)?;
            em.emit(Instr::StoreIndirect);
        }

        let result = match &self.ret {
            Some((sig, strategy, slots)) => {
                let local = em.local(sig.clone());
                strategy.emit_load(em, slots, &buffer)?;
                em.emit(Instr::StoreLocal(local));
                Some(local)
            }
            None => None,
        };

        for param in self.params.iter().filter(|p| p.strategy.needs_cleanup()) {
            param.strategy.emit_cleanup(em, &param.slots, &buffer)?;
        }
        if let Some((_, strategy, slots)) = &self.ret {
            if strategy.needs_cleanup() {
                strategy.emit_cleanup(em, slots, &buffer)?;
            }
        }
        Ok(result)
    }
}

/// Push `buf` or null
pub fn push_buffer(em: &mut Emitter<'_>, buf: Option<u16>) {
    match buf {
        Some(local) => em.emit(Instr::LoadLocal(local)),
        None => em.emit(Instr::ConstNull),
    };
}

/// Push every argument of `method`, `this` included
fn push_args(em: &mut Emitter<'_>, method: &MethodDef) {
    for arg in 0..method.arg_count() {
        em.emit(Instr::LoadArg(arg as u16));
    }
}

/// Rewrite the exposed function at `index` of a native-backed class
pub fn rewrite_function(
    unit: &mut Unit<'_>,
    ty: &mut TypeDef,
    init: &mut StaticInit,
    class_ptr: &FieldRef,
    index: usize,
) -> WeaveResult<()> {
    let ctx = unit.ctx;
    let helpers = ctx.helpers;
    let method = ty.methods[index].clone();
    let function = method.name.clone();
    let native_name = markers::member_native_name(&method.attributes, &function);
    let marker = method
        .attribute(markers::EXPOSED_FUNCTION)
        .ok_or_else(|| WeaveError::invariant(&ty.name, "function is not exposed").with_member(&function))?;
    let is_event = marker.has_str_arg(markers::FUNCTION_EVENT);
    let is_net = markers::FUNCTION_NET.iter().any(|n| marker.has_str_arg(n));

    if method.is_constructor() || method.is_static_initializer() {
        return Err(WeaveError::unsupported(&ty.name, "constructors cannot be exposed functions")
            .with_member(&function));
    }

    fields::function_slots(ty, &function);
    let (native_fn, params_size) =
        init.native_function(&mut unit.strings, helpers, class_ptr, &function, &native_name)?;
    let plan = CallPlan::prepare(unit, ty, init, &method, &function, &native_fn, params_size)?;

    // Virtual functions resolve against the receiver's native class
    let instance_fn = (!method.is_static && method.is_virtual).then(|| {
        fields::ensure_instance(ty, &naming::instance_function(&function), TypeSig::IntPtr)
    });

    let implementation = if is_stub(&method) {
        None
    } else {
        let mut moved = method.clone();
        moved.name = naming::implementation(&function);
        moved.attributes.clear();
        let target = MethodRef::new(ty.name.as_str(), moved.name.as_str(), moved.arity());
        debug!(type_name = %ty.name, function = %function, "managed logic moved to implementation");
        ty.methods.push(moved);
        Some(target)
    };

    let invoker = helpers.invoker(if method.is_static {
        INVOKE_NATIVE_STATIC_FUNCTION
    } else if is_net {
        INVOKE_NATIVE_NET_FUNCTION
    } else if plan.has_out_params() {
        INVOKE_NATIVE_FUNCTION_OUT_PARMS
    } else {
        INVOKE_NATIVE_FUNCTION
    })?;
    let native_object = ctx.native_object();
    let by_instance = if instance_fn.is_some() {
        Some(helpers.function_registry(GET_NATIVE_FUNCTION_FROM_INSTANCE_AND_NAME, 2)?)
    } else {
        None
    };
    let is_override = if is_event {
        Some(helpers.function_registry(IS_NATIVE_OVERRIDE, 2)?)
    } else {
        None
    };

    let is_static = method.is_static;
    let target = |em: &mut Emitter<'_>| {
        if is_static {
            em.load_static(class_ptr);
        } else {
            em.emit(Instr::LoadArg(0));
            em.emit(Instr::LoadField(native_object.clone()));
        }
    };

    let mut em = Emitter::new(&mut unit.strings);

    if let (Some(cache), Some(lookup)) = (&instance_fn, &by_instance) {
        let ready = em.label();
        em.emit(Instr::LoadArg(0));
        em.emit(Instr::LoadField(cache.clone()));
        em.emit(Instr::BrTrue(ready));
        em.emit(Instr::LoadArg(0));
        target(&mut em);
        em.string(&native_name);
        em.call(lookup.clone());
        em.emit(Instr::StoreField(cache.clone()));
        em.mark(ready);
    }

    let result = plan.emit(&mut em, &|em: &mut Emitter<'_>, buf| {
        target(em);
        match &instance_fn {
            Some(cache) => {
                em.emit(Instr::LoadArg(0));
                em.emit(Instr::LoadField(cache.clone()));
            }
            None => {
                em.load_static(&native_fn);
            }
        }
        push_buffer(em, buf);
        em.call(invoker.clone());
    })?;

    if let Some(implementation) = implementation {
        let done = em.label();
        if let Some(check) = &is_override {
            target(&mut em);
            em.string(&native_name);
            em.call(check.clone());
            em.emit(Instr::BrTrue(done));
        }
        push_args(&mut em, &method);
        em.call(implementation);
        // The implementation's result wins over the native one
        if let Some(local) = result {
            em.emit(Instr::StoreLocal(local));
        }
        em.mark(done);
    }

    if let Some(local) = result {
        em.emit(Instr::LoadLocal(local));
    }
    em.emit(Instr::Ret);

    let body = em.finish();
    let rewritten = &mut ty.methods[index];
    rewritten.body = Some(body);
    rewritten.is_abstract = false;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WeaveConfig;
    use crate::context::{Registry, WeaveContext};
    use crate::helpers::HelperLibrary;
    use crate::index::TypeIndex;
    use crate::strategy::StrategyCache;
    use stitch_bytecode::{Attribute, ConstantPool, MethodBody, Module, ParamDef, TypeKind};
    use stitch_sdk::NativeMetadata;

    fn with_unit(ty: &mut TypeDef, f: impl FnOnce(&mut Unit<'_>, &mut TypeDef, &mut StaticInit, &FieldRef)) {
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
        f(&mut unit, ty, &mut init, &class_ptr);
    }

    fn exposed(method: MethodDef, args: &[&str]) -> MethodDef {
        let mut marker = Attribute::new(markers::EXPOSED_FUNCTION);
        for arg in args {
            marker = marker.with_str(*arg);
        }
        let mut method = method;
        method.attributes.push(marker);
        method
    }

    fn calls(body: &stitch_bytecode::MethodBody) -> Vec<String> {
        body.instrs
            .iter()
            .filter_map(|i| match i {
                Instr::Call(m) => Some(m.name.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_parameterless_call_passes_null_buffer() {
        let mut ty = TypeDef::new("Game.Actor", TypeKind::Class);
        ty.methods.push(exposed(MethodDef::new("Jump", vec![], TypeSig::Void), &[]));
        with_unit(&mut ty, |unit, ty, init, class_ptr| {
            rewrite_function(unit, ty, init, class_ptr, 0).unwrap();
        });
        let body = ty.method("Jump").unwrap().body.as_ref().unwrap();
        assert!(!body.instrs.contains(&Instr::StackAlloc));
        assert!(body.instrs.contains(&Instr::ConstNull));
        assert_eq!(calls(body), [INVOKE_NATIVE_FUNCTION]);
        assert!(ty.field("Jump_NativeFunction").is_some());
        assert!(ty.field("Jump_ParamsSize").is_some());
    }

    #[test]
    fn test_string_parameter_is_cleaned_up_after_call() {
        let mut ty = TypeDef::new("Game.Actor", TypeKind::Class);
        let method = MethodDef::new("Say", vec![ParamDef::new("text", TypeSig::String)], TypeSig::I32);
        ty.methods.push(exposed(method, &[]));
        with_unit(&mut ty, |unit, ty, init, class_ptr| {
            rewrite_function(unit, ty, init, class_ptr, 0).unwrap();
        });
        let body = ty.method("Say").unwrap().body.as_ref().unwrap();
        assert_eq!(calls(body), ["ToNative", INVOKE_NATIVE_FUNCTION, "DestructInstance"]);
        assert!(ty.field("Say_text_Offset").is_some());
        assert!(ty.field("Say_ReturnValue_Offset").is_some());
    }

    #[test]
    fn test_out_parameters_select_out_invoker() {
        let mut ty = TypeDef::new("Game.Actor", TypeKind::Class);
        let method = MethodDef::new("Trace", vec![ParamDef::out("hit", TypeSig::Bool)], TypeSig::Void);
        ty.methods.push(exposed(method, &[]));
        with_unit(&mut ty, |unit, ty, init, class_ptr| {
            rewrite_function(unit, ty, init, class_ptr, 0).unwrap();
        });
        let body = ty.method("Trace").unwrap().body.as_ref().unwrap();
        assert!(calls(body).contains(&INVOKE_NATIVE_FUNCTION_OUT_PARMS.to_string()));
        assert!(body.instrs.contains(&Instr::StoreIndirect));
    }

    #[test]
    fn test_event_keeps_implementation_behind_override_check() {
        let mut ty = TypeDef::new("Game.Actor", TypeKind::Class);
        let method = MethodDef::new("OnHit", vec![], TypeSig::Void).with_body(MethodBody::new(vec![
            Instr::LoadArg(0),
            Instr::Pop,
            Instr::Ret,
        ]));
        ty.methods.push(exposed(method, &[markers::FUNCTION_EVENT]));
        with_unit(&mut ty, |unit, ty, init, class_ptr| {
            rewrite_function(unit, ty, init, class_ptr, 0).unwrap();
        });
        assert!(ty.method("OnHit_Implementation").is_some());
        let body = ty.method("OnHit").unwrap().body.as_ref().unwrap();
        assert_eq!(
            calls(body),
            [INVOKE_NATIVE_FUNCTION, IS_NATIVE_OVERRIDE, "OnHit_Implementation"]
        );
    }

    #[test]
    fn test_constant_returning_event_keeps_its_logic() {
        let mut ty = TypeDef::new("Game.Actor", TypeKind::Class);
        let logic = MethodBody::new(vec![Instr::ConstI32(42), Instr::Ret]);
        let method = MethodDef::new("Score", vec![], TypeSig::I32).with_body(logic.clone());
        ty.methods.push(exposed(method, &[markers::FUNCTION_EVENT]));
        with_unit(&mut ty, |unit, ty, init, class_ptr| {
            rewrite_function(unit, ty, init, class_ptr, 0).unwrap();
        });
        let implementation = ty.method("Score_Implementation").unwrap();
        assert_eq!(implementation.body.as_ref(), Some(&logic));
        let body = ty.method("Score").unwrap().body.as_ref().unwrap();
        assert_eq!(
            calls(body),
            [INVOKE_NATIVE_FUNCTION, IS_NATIVE_OVERRIDE, "Score_Implementation"]
        );
    }

    #[test]
    fn test_static_and_net_invokers() {
        let mut ty = TypeDef::new("Game.Actor", TypeKind::Class);
        let mut spawn = MethodDef::new("Spawn", vec![], TypeSig::Void);
        spawn.is_static = true;
        ty.methods.push(exposed(spawn, &[]));
        ty.methods.push(exposed(MethodDef::new("Sync", vec![], TypeSig::Void), &["Server"]));
        with_unit(&mut ty, |unit, ty, init, class_ptr| {
            rewrite_function(unit, ty, init, class_ptr, 0).unwrap();
            rewrite_function(unit, ty, init, class_ptr, 1).unwrap();
        });
        let spawn = ty.method("Spawn").unwrap().body.as_ref().unwrap();
        assert_eq!(calls(spawn), [INVOKE_NATIVE_STATIC_FUNCTION]);
        let sync = ty.method("Sync").unwrap().body.as_ref().unwrap();
        assert_eq!(calls(sync), [INVOKE_NATIVE_NET_FUNCTION]);
    }
}
