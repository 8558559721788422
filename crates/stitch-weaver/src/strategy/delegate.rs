//! Callable references

use stitch_sdk::helpers::{HelperType, FROM_NATIVE, TO_NATIVE};

use super::Converter;
use crate::error::WeaveResult;
use crate::helpers::HelperLibrary;

pub(super) fn converter(helpers: &HelperLibrary, multicast: bool, target: &str) -> WeaveResult<Converter> {
    let ty = if multicast {
        HelperType::MulticastDelegateMarshaller
    } else {
        HelperType::SingleDelegateMarshaller
    };
    Ok(Converter {
        from_native: helpers.generic_method(ty, FROM_NATIVE, 1, target)?,
        to_native: helpers.generic_method(ty, TO_NATIVE, 2, target)?,
        destruct: None,
    })
}
