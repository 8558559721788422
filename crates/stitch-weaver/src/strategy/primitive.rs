//! Primitives, enums and booleans

use stitch_bytecode::{FieldRef, Instr};
use stitch_sdk::helpers::{blittable_from_native, blittable_to_native, HelperType, FROM_NATIVE, TO_NATIVE};
use stitch_sdk::NativeKind;

use super::Converter;
use crate::emit::{Emitter, Push};
use crate::error::WeaveResult;
use crate::helpers::HelperLibrary;

pub(super) fn load(em: &mut Emitter<'_>, kind: NativeKind, addr: Push<'_>) {
    addr(em);
    em.emit(Instr::LoadNative(kind));
}

pub(super) fn store(em: &mut Emitter<'_>, kind: NativeKind, addr: Push<'_>, value: Push<'_>) {
    addr(em);
    value(em);
    em.emit(Instr::StoreNative(kind));
}

/// `addr; ldsfld mask; call FromNative`
pub(super) fn bitfield_load(em: &mut Emitter<'_>, conv: &Converter, mask: &FieldRef, addr: Push<'_>) {
    addr(em);
    em.load_static(mask);
    em.call(conv.from_native.clone());
}

/// `addr; ldsfld mask; value; call ToNative`
pub(super) fn bitfield_store(
    em: &mut Emitter<'_>,
    conv: &Converter,
    mask: &FieldRef,
    addr: Push<'_>,
    value: Push<'_>,
) {
    addr(em);
    em.load_static(mask);
    value(em);
    em.call(conv.to_native.clone());
}

pub(super) fn bitfield_converter(helpers: &HelperLibrary) -> WeaveResult<Converter> {
    Ok(Converter {
        from_native: helpers.method(HelperType::BitfieldBoolMarshaller, FROM_NATIVE, 2)?,
        to_native: helpers.method(HelperType::BitfieldBoolMarshaller, TO_NATIVE, 3)?,
        destruct: None,
    })
}

pub(super) fn element_converter(helpers: &HelperLibrary, kind: NativeKind) -> WeaveResult<Converter> {
    Ok(Converter {
        from_native: helpers.method(HelperType::BlittableMarshaller, &blittable_from_native(kind), 1)?,
        to_native: helpers.method(HelperType::BlittableMarshaller, &blittable_to_native(kind), 2)?,
        destruct: None,
    })
}

pub(super) fn bool_converter(helpers: &HelperLibrary) -> WeaveResult<Converter> {
    Ok(Converter {
        from_native: helpers.method(HelperType::BoolMarshaller, FROM_NATIVE, 1)?,
        to_native: helpers.method(HelperType::BoolMarshaller, TO_NATIVE, 2)?,
        destruct: None,
    })
}
