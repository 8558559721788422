//! Exposed plain fields
//!
//! A field marked `ExposedProperty` becomes an auto-implemented property
//! before any class is rewritten: the field is renamed to the property's
//! backing field, `get_`/`set_` accessors over it are added, and accesses
//! from other types are redirected to the accessors. Accesses from the
//! owning type keep targeting the backing field, which the property
//! rewriter then eliminates like any other.

use stitch_bytecode::{
    FieldRef, Instr, MethodBody, MethodDef, Module, ParamDef, PropertyDef, TypeDef, TypeKind, TypeSig,
};
use tracing::debug;

use crate::error::{WeaveError, WeaveErrors};
use crate::infra::body::rename_field;
use crate::infra::{Accessors, Redirects};
use crate::markers;
use crate::naming;

/// Promote every exposed field of the module's exposed classes
///
/// Returns the number of promoted fields.
pub fn promote_exposed_fields(module: &mut Module, errors: &mut WeaveErrors) -> usize {
    let mut redirects = Vec::new();
    let mut promoted = 0;

    for ty in module
        .types
        .iter_mut()
        .filter(|t| t.kind == TypeKind::Class && markers::is_exposed(t))
    {
        let mut owned = Redirects::new(ty.name.as_str());
        let exposed: Vec<usize> = ty
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.has_attribute(markers::EXPOSED_PROPERTY))
            .map(|(i, _)| i)
            .collect();
        for i in exposed {
            if ty.fields[i].is_static {
                errors.push(
                    WeaveError::unsupported(&ty.name, "static fields cannot be exposed")
                        .with_member(ty.fields[i].name.as_str()),
                );
                continue;
            }
            let name = ty.fields[i].name.clone();
            promote(ty, i);
            promoted += 1;
            owned.insert(name.as_str(), Accessors::new(&ty.name, &name));
        }
        if !owned.is_empty() {
            redirects.push(owned);
        }
    }

    for mut owned in redirects {
        let owner = owned.owner().to_string();
        for ty in module.types.iter_mut().filter(|t| t.name != owner) {
            for body in ty.methods.iter_mut().filter_map(|m| m.body.as_mut()) {
                owned.apply(&mut body.instrs);
            }
        }
    }
    promoted
}

/// Turn field `i` of `ty` into an auto-implemented property
fn promote(ty: &mut TypeDef, i: usize) {
    let field = &mut ty.fields[i];
    let name = field.name.clone();
    let sig = field.ty.clone();
    let readonly = field.is_readonly;
    let attributes = std::mem::take(&mut field.attributes);
    field.name = naming::backing_field(&name);
    field.is_private = true;

    let original = FieldRef::new(ty.name.as_str(), name.as_str());
    let backing = FieldRef::new(ty.name.as_str(), naming::backing_field(&name));
    for body in ty.methods.iter_mut().filter_map(|m| m.body.as_mut()) {
        rename_field(&mut body.instrs, &original, &backing);
    }

    let mut property = PropertyDef::new(name.as_str(), sig.clone());
    property.attributes = attributes;
    if readonly {
        property.setter = None;
    }

    ty.methods.push(
        MethodDef::new(naming::getter(&name), Vec::new(), sig.clone()).with_body(MethodBody::new(vec![
            Instr::LoadArg(0),
            Instr::LoadField(backing.clone()),
            Instr::Ret,
        ])),
    );
    if !readonly {
        ty.methods.push(
            MethodDef::new(naming::setter(&name), vec![ParamDef::new("value", sig)], TypeSig::Void)
                .with_body(MethodBody::new(vec![
                    Instr::LoadArg(0),
                    Instr::LoadArg(1),
                    Instr::StoreField(backing),
                    Instr::Ret,
                ])),
        );
    }
    ty.properties.push(property);
    debug!(type_name = %ty.name, field = %name, "promoted exposed field to property");
}
