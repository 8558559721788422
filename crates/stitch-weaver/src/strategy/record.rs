//! Records and opaque records
//!
//! Exposed records are marshaled by the members the record pass generates on
//! the record itself: `.ctor(IntPtr)` reads a value, `ToNative(IntPtr)`
//! writes one. Opaque records are raw byte copies sized by their native
//! property.

use stitch_bytecode::{FieldRef, Instr, MethodRef};
use stitch_sdk::helpers::{HelperType, CTOR, FROM_NATIVE, TO_NATIVE};

use super::Converter;
use crate::emit::{Emitter, Push};
use crate::error::WeaveResult;
use crate::helpers::HelperLibrary;
use crate::naming;

/// `addr; newobj R::.ctor(IntPtr)`
pub(super) fn construct(em: &mut Emitter<'_>, record: &str, addr: Push<'_>) {
    addr(em);
    em.emit(Instr::NewObj(MethodRef::new(record, CTOR, 1)));
}

/// `value; addr; call R::ToNative(IntPtr)`
pub(super) fn copy_out(em: &mut Emitter<'_>, record: &str, addr: Push<'_>, value: Push<'_>) {
    value(em);
    addr(em);
    em.call(MethodRef::new(record, TO_NATIVE, 1));
}

pub(super) fn opaque_load(em: &mut Emitter<'_>, conv: &Converter, property: &FieldRef, addr: Push<'_>) {
    addr(em);
    em.load_static(property);
    em.call(conv.from_native.clone());
}

pub(super) fn opaque_store(
    em: &mut Emitter<'_>,
    conv: &Converter,
    property: &FieldRef,
    addr: Push<'_>,
    value: Push<'_>,
) {
    addr(em);
    em.load_static(property);
    value(em);
    em.call(conv.to_native.clone());
}

pub(super) fn opaque_converter(helpers: &HelperLibrary) -> WeaveResult<Converter> {
    Ok(Converter {
        from_native: helpers.method(HelperType::OpaqueMarshaller, FROM_NATIVE, 2)?,
        to_native: helpers.method(HelperType::OpaqueMarshaller, TO_NATIVE, 3)?,
        destruct: None,
    })
}

pub(super) fn blittable_element_converter(helpers: &HelperLibrary, record: &str) -> WeaveResult<Converter> {
    Ok(Converter {
        from_native: helpers.generic_method(HelperType::BlittableStructMarshaller, FROM_NATIVE, 1, record)?,
        to_native: helpers.generic_method(HelperType::BlittableStructMarshaller, TO_NATIVE, 2, record)?,
        destruct: None,
    })
}

/// The record's generated `<R>Marshaller`
pub(super) fn mirror_element_converter(record: &str) -> Converter {
    let owner = naming::record_marshaller(record);
    Converter {
        from_native: MethodRef::new(owner.as_str(), FROM_NATIVE, 1),
        to_native: MethodRef::new(owner, TO_NATIVE, 2),
        destruct: None,
    }
}
