//! Callable signature rewriter
//!
//! An exposed delegate type is rebased onto `DelegateBase`, which carries
//! the native callable it is bound to. Its `Invoke` marshals arguments
//! against the native signature descriptor and dispatches through the
//! single- or multi-cast delegate invoker.

use stitch_bytecode::{Instr, MethodBody, MethodDef, MethodRef, TypeDef, TypeSig};
use stitch_sdk::helpers::{HelperType, CTOR};
use tracing::debug;

use super::function::{push_buffer, CallPlan};
use crate::context::Unit;
use crate::emit::Emitter;
use crate::error::{WeaveError, WeaveResult};
use crate::infra::{fields, StaticInit};
use crate::markers;
use crate::naming;

/// Rewrite an exposed delegate type
pub fn rewrite_delegate(unit: &mut Unit<'_>, ty: &mut TypeDef) -> WeaveResult<()> {
    let ctx = unit.ctx;
    let helpers = ctx.helpers;
    let multicast = ty.has_attribute(markers::EXPOSED_MULTICAST_DELEGATE);
    let delegate_base = helpers.delegate_base()?;
    let base_ctor = helpers.method(HelperType::DelegateBase, CTOR, 0)?;
    let native_delegate = helpers.native_delegate()?;
    let dispatch = helpers.delegate_invoker(multicast)?;

    let old_base = ty.base.replace(delegate_base.clone());
    rebase_constructors(ty, old_base.as_deref(), &delegate_base, &base_ctor);

    let index = ty
        .methods
        .iter()
        .position(|m| m.name == naming::INVOKE && !m.is_static)
        .ok_or_else(|| WeaveError::metadata(&ty.name, "delegate type has no Invoke method"))?;
    let invoke = ty.methods[index].clone();

    let mut init = StaticInit::new(ty.name.as_str());
    fields::function_slots(ty, naming::INVOKE);
    let native_name = markers::type_native_name(ty);
    let (signature, params_size) = init.delegate_signature(&mut unit.strings, helpers, &native_name)?;
    let plan = CallPlan::prepare(unit, ty, &mut init, &invoke, naming::INVOKE, &signature, params_size)?;

    let mut em = Emitter::new(&mut unit.strings);
    let result = plan.emit(&mut em, &|em: &mut Emitter<'_>, buf| {
        em.emit(Instr::LoadArg(0));
        em.emit(Instr::LoadField(native_delegate.clone()));
        push_buffer(em, buf);
        em.call(dispatch.clone());
    })?;
    if let Some(local) = result {
        em.emit(Instr::LoadLocal(local));
    }
    em.emit(Instr::Ret);
    let body = em.finish();

    let method = &mut ty.methods[index];
    method.body = Some(body);
    method.is_abstract = false;

    init.install(ty);
    debug!(type_name = %ty.name, multicast, "rewrote callable signature");
    unit.mark_rewritten(&ty.name.clone(), naming::INVOKE);
    Ok(())
}

/// Point constructor base calls at `DelegateBase::.ctor()`, dropping the
/// old base constructor's arguments; synthesize a constructor if none
fn rebase_constructors(ty: &mut TypeDef, old_base: Option<&str>, delegate_base: &str, base_ctor: &MethodRef) {
    let mut found = false;
    for method in ty.methods.iter_mut().filter(|m| m.is_constructor()) {
        found = true;
        let Some(body) = method.body.as_mut() else {
            continue;
        };
        let mut instrs = Vec::with_capacity(body.instrs.len());
        for instr in body.instrs.drain(..) {
            match &instr {
                Instr::Call(m)
                    if m.name == CTOR
                        && (Some(m.owner.as_str()) == old_base || m.owner == delegate_base) =>
                {
                    for _ in 0..m.arity {
                        instrs.push(Instr::Pop);
                    }
                    instrs.push(Instr::Call(base_ctor.clone()));
                }
                _ => instrs.push(instr),
            }
        }
        body.instrs = instrs;
    }

    if !found {
        let ctor = MethodDef::new(CTOR, Vec::new(), TypeSig::Void).with_body(MethodBody::new(vec![
            Instr::LoadArg(0),
            Instr::Call(base_ctor.clone()),
            Instr::Ret,
        ]));
        ty.methods.push(ctor);
    }
}
