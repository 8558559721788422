//! Object, class and interface references
//!
//! Every reference kind goes through a generic converter instantiated for the
//! referenced type, so the helper can wrap the native handle in the right
//! managed class (or interface proxy).

use stitch_sdk::helpers::{HelperType, FROM_NATIVE, TO_NATIVE};

use super::{Converter, MarshalKind};
use crate::error::{WeaveError, WeaveResult};
use crate::helpers::HelperLibrary;

pub(super) fn converter(helpers: &HelperLibrary, kind: &MarshalKind) -> WeaveResult<Converter> {
    let (ty, target) = match kind {
        MarshalKind::Object(t) => (HelperType::ObjectMarshaller, t),
        MarshalKind::StrongObject(t) => (HelperType::StrongObjectMarshaller, t),
        MarshalKind::WeakObject(t) => (HelperType::WeakObjectMarshaller, t),
        MarshalKind::SoftObject(t) => (HelperType::SoftObjectMarshaller, t),
        MarshalKind::ClassRef(t) => (HelperType::SubclassOfMarshaller, t),
        MarshalKind::SoftClassRef(t) => (HelperType::SoftClassMarshaller, t),
        MarshalKind::Interface(t) => (HelperType::ScriptInterfaceMarshaller, t),
        other => return Err(WeaveError::invariant(&other.to_string(), "not a reference kind")),
    };
    Ok(Converter {
        from_native: helpers.generic_method(ty, FROM_NATIVE, 1, target)?,
        to_native: helpers.generic_method(ty, TO_NATIVE, 2, target)?,
        destruct: None,
    })
}
