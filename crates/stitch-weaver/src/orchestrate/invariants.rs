//! Structural rules of exposed types, checked before anything is rewritten

use stitch_bytecode::{TypeDef, TypeKind};

use super::interface::check_interface;
use crate::error::WeaveError;
use crate::helpers::HelperLibrary;
use crate::index::TypeIndex;
use crate::markers;

/// Every rule `ty` breaks
pub fn check_type(ty: &TypeDef, index: &TypeIndex, helpers: &HelperLibrary) -> Vec<WeaveError> {
    let mut errors = Vec::new();

    for (marker, kind) in markers::TYPE_MARKERS {
        if ty.has_attribute(marker) && ty.kind != kind {
            errors.push(WeaveError::invariant(
                &ty.name,
                format!("{} marker on a {}", marker, ty.kind.keyword()),
            ));
        }
    }

    let exposed = markers::is_exposed(ty);
    match ty.kind {
        TypeKind::Class if exposed => {
            let core = helpers.core_object();
            match index.derives_from(&ty.name, core) {
                Ok(true) => {}
                Ok(false) => errors.push(WeaveError::invariant(
                    &ty.name,
                    format!("exposed class does not derive from {}", core),
                )),
                Err(e) => errors.push(e),
            }
        }
        TypeKind::Class => {
            let member = ty
                .properties
                .iter()
                .filter(|p| p.has_attribute(markers::EXPOSED_PROPERTY))
                .map(|p| p.name.as_str())
                .chain(
                    ty.fields
                        .iter()
                        .filter(|f| f.has_attribute(markers::EXPOSED_PROPERTY))
                        .map(|f| f.name.as_str()),
                )
                .chain(
                    ty.methods
                        .iter()
                        .filter(|m| m.has_attribute(markers::EXPOSED_FUNCTION))
                        .map(|m| m.name.as_str()),
                )
                .next();
            if let Some(member) = member {
                errors.push(
                    WeaveError::invariant(&ty.name, "exposed member on a class that is not exposed")
                        .with_member(member),
                );
            }
        }
        TypeKind::Interface if exposed => errors.extend(check_interface(ty, index)),
        _ => {}
    }
    errors
}
