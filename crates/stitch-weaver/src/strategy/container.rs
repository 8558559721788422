//! Arrays, maps, sets, optionals and fixed arrays
//!
//! Container members own a marshaller object built on first use from the
//! member's native property and the static converter pair of each element.
//! Instance members cache it per object and alias native storage; static
//! contexts cache it per member and copy.

use stitch_bytecode::{Instr, MethodRef};
use stitch_sdk::helpers::{HelperType, CTOR, DESTRUCT_INSTANCE, FROM_NATIVE, TO_NATIVE};

use super::{MarshalKind, MemberSlots, Strategy, Usage};
use crate::emit::Emitter;
use crate::error::{WeaveError, WeaveResult};
use crate::helpers::HelperLibrary;

/// Instance methods of a container marshaller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerOps {
    /// Qualified marshaller type
    pub marshaller_type: String,
    /// Constructor
    pub ctor: MethodRef,
    /// `FromNative(addr)`
    pub from_native: MethodRef,
    /// `ToNative(addr, value)`
    pub to_native: MethodRef,
    /// `DestructInstance(addr)`
    pub destruct: MethodRef,
}

fn helper_type(kind: &MarshalKind, usage: Usage) -> Option<HelperType> {
    let aliasing = usage == Usage::Instance;
    Some(match kind {
        MarshalKind::FixedArray(_) => HelperType::FixedArrayMarshaller,
        MarshalKind::Array if aliasing => HelperType::ArrayMarshaller,
        MarshalKind::Array => HelperType::ArrayCopyMarshaller,
        MarshalKind::Map if aliasing => HelperType::MapMarshaller,
        MarshalKind::Map => HelperType::MapCopyMarshaller,
        MarshalKind::Set if aliasing => HelperType::SetMarshaller,
        MarshalKind::Set => HelperType::SetCopyMarshaller,
        MarshalKind::Optional if aliasing => HelperType::OptionalMarshaller,
        MarshalKind::Optional => HelperType::OptionalCopyMarshaller,
        _ => return None,
    })
}

fn ctor_arity(kind: &MarshalKind) -> u16 {
    match kind {
        MarshalKind::Map => 5,
        MarshalKind::FixedArray(_) => 4,
        _ => 3,
    }
}

pub(super) fn ops(helpers: &HelperLibrary, kind: &MarshalKind, usage: Usage) -> WeaveResult<ContainerOps> {
    let ty = helper_type(kind, usage)
        .ok_or_else(|| WeaveError::invariant(&kind.to_string(), "not a container kind"))?;
    Ok(ContainerOps {
        marshaller_type: helpers.type_name(ty)?,
        ctor: helpers.method(ty, CTOR, ctor_arity(kind))?,
        from_native: helpers.method(ty, FROM_NATIVE, 1)?,
        to_native: helpers.method(ty, TO_NATIVE, 2)?,
        destruct: helpers.method(ty, DESTRUCT_INSTANCE, 1)?,
    })
}

/// Push the member's marshaller, constructing it on first use
pub(super) fn push_marshaller(em: &mut Emitter<'_>, strategy: &Strategy, slots: &MemberSlots) -> WeaveResult<()> {
    let ops = strategy.container_ops()?;
    let field = slots.require(&slots.marshaller, "marshaller")?;
    let property = slots.require(&slots.native_property, "native property")?;
    let per_instance = strategy.usage == Usage::Instance;

    let load = |em: &mut Emitter<'_>| {
        if per_instance {
            em.emit(Instr::LoadArg(0));
            em.emit(Instr::LoadField(field.clone()));
        } else {
            em.load_static(field);
        }
    };

    let ready = em.label();
    load(em);
    em.emit(Instr::BrTrue(ready));
    if per_instance {
        em.emit(Instr::LoadArg(0));
    }
    em.load_static(property);
    if let MarshalKind::FixedArray(len) = strategy.kind {
        em.emit(Instr::ConstI32(len as i32));
    }
    for element in &strategy.elements {
        let conv = element.element_converter().ok_or_else(|| {
            WeaveError::invariant(&element.sig.to_string(), "element has no converter pair")
        })?;
        em.emit(Instr::LoadFunction(conv.to_native.clone()));
        em.emit(Instr::LoadFunction(conv.from_native.clone()));
    }
    em.emit(Instr::NewObj(ops.ctor.clone()));
    if per_instance {
        em.emit(Instr::StoreField(field.clone()));
    } else {
        em.store_static(field);
    }
    em.mark(ready);
    load(em);
    Ok(())
}
