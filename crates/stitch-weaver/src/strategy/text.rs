//! Strings, localized text and names

use stitch_sdk::helpers::{HelperType, DESTRUCT_INSTANCE, FROM_NATIVE, TO_NATIVE};

use super::{Converter, MarshalKind};
use crate::error::{WeaveError, WeaveResult};
use crate::helpers::HelperLibrary;

pub(super) fn converter(helpers: &HelperLibrary, kind: &MarshalKind) -> WeaveResult<Converter> {
    let (ty, allocates) = match kind {
        MarshalKind::String => (HelperType::StringMarshaller, true),
        MarshalKind::Text => (HelperType::TextMarshaller, true),
        MarshalKind::Name => (HelperType::NameMarshaller, false),
        other => {
            return Err(WeaveError::invariant(
                &other.to_string(),
                "not a text kind",
            ))
        }
    };
    Ok(Converter {
        from_native: helpers.method(ty, FROM_NATIVE, 1)?,
        to_native: helpers.method(ty, TO_NATIVE, 2)?,
        destruct: if allocates {
            Some(helpers.method(ty, DESTRUCT_INSTANCE, 1)?)
        } else {
            None
        },
    })
}
