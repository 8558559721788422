//! Interface proxies
//!
//! For every exposed interface the weaver synthesizes `<I>Proxy`, a core
//! object implementing the interface by forwarding each method to the
//! native function of the same name on the wrapped handle. A method the
//! native type does not provide throws when called.

use stitch_bytecode::{Instr, MethodBody, MethodDef, ParamDef, TypeDef, TypeKind, TypeSig};
use stitch_sdk::helpers::{CTOR, INVOKE_NATIVE_FUNCTION, INVOKE_NATIVE_FUNCTION_OUT_PARMS};
use tracing::debug;

use crate::context::Unit;
use crate::emit::Emitter;
use crate::error::{WeaveError, WeaveResult};
use crate::index::TypeIndex;
use crate::infra::{fields, StaticInit};
use crate::markers;
use crate::naming;
use crate::rewrite::{push_buffer, CallPlan};

/// Synthesize the proxy of an exposed interface into the unit
pub fn weave_interface(unit: &mut Unit<'_>, ty: &TypeDef) -> WeaveResult<()> {
    let ctx = unit.ctx;
    let helpers = ctx.helpers;
    let native_name = markers::type_native_name(ty);

    let mut proxy = TypeDef::new(naming::proxy(&ty.name), TypeKind::Class);
    proxy.base = Some(helpers.core_object().to_string());
    proxy.interfaces.push(ty.name.clone());

    let core_ctor = helpers.core_ctor(1)?;
    proxy.methods.push(
        MethodDef::new(CTOR, vec![ParamDef::new("native", TypeSig::IntPtr)], TypeSig::Void).with_body(
            MethodBody::new(vec![
                Instr::LoadArg(0),
                Instr::LoadArg(1),
                Instr::Call(core_ctor),
                Instr::Ret,
            ]),
        ),
    );

    let class_ptr = fields::native_class_ptr(&mut proxy);
    let mut init = StaticInit::new(proxy.name.as_str());
    init.native_class(&mut unit.strings, helpers, &native_name)?;
    let native_object = ctx.native_object();

    for method in ty.methods.iter().filter(|m| !m.is_static) {
        let function = method.name.clone();
        let native = markers::member_native_name(&method.attributes, &function);
        fields::function_slots(&mut proxy, &function);
        let (native_fn, params_size) =
            init.native_function(&mut unit.strings, helpers, &class_ptr, &function, &native)?;
        let plan = CallPlan::prepare(unit, &mut proxy, &mut init, method, &function, &native_fn, params_size)
            .map_err(|e| e.at(&ty.name, &function))?;
        let invoker = helpers.invoker(if plan.has_out_params() {
            INVOKE_NATIVE_FUNCTION_OUT_PARMS
        } else {
            INVOKE_NATIVE_FUNCTION
        })?;

        let mut em = Emitter::new(&mut unit.strings);
        let available = em.label();
        em.load_static(&native_fn);
        em.emit(Instr::BrTrue(available));
        em.string(&format!("{} is not available on the native object", native));
        em.emit(Instr::Throw);
        em.mark(available);

        let result = plan.emit(&mut em, &|em: &mut Emitter<'_>, buf| {
            em.emit(Instr::LoadArg(0));
            em.emit(Instr::LoadField(native_object.clone()));
            em.load_static(&native_fn);
            push_buffer(em, buf);
            em.call(invoker.clone());
        })?;
        if let Some(local) = result {
            em.emit(Instr::LoadLocal(local));
        }
        em.emit(Instr::Ret);

        let mut forwarded = MethodDef::new(function.as_str(), method.params.clone(), method.ret.clone())
            .with_body(em.finish());
        forwarded.is_virtual = true;
        proxy.methods.push(forwarded);
        unit.mark_rewritten(&proxy.name, &function);
    }

    init.install(&mut proxy);
    ctx.registry.export(&ty.name);
    debug!(type_name = %ty.name, proxy = %proxy.name, "synthesized interface proxy");
    unit.synthesized.push(proxy);
    Ok(())
}

/// Structural rules of an exposed interface
pub fn check_interface(ty: &TypeDef, index: &TypeIndex) -> Vec<WeaveError> {
    let mut errors = Vec::new();
    if let Some(base) = &ty.base {
        errors.push(WeaveError::invariant(
            &ty.name,
            format!("exposed interface has non-interface base {}", base),
        ));
    }
    for parent in &ty.interfaces {
        if !index.is_interface(parent) {
            errors.push(WeaveError::invariant(
                &ty.name,
                format!("exposed interface extends non-interface {}", parent),
            ));
        }
    }
    errors
}
