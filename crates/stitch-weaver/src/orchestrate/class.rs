//! Native-backed class orchestration

use stitch_bytecode::TypeDef;
use tracing::debug;

use crate::context::Unit;
use crate::infra::{fields, StaticInit};
use crate::markers;
use crate::rewrite::{rewrite_function, rewrite_properties};

/// Package an extension method is registered under: the first namespace
/// segment of its declaring type
pub fn package_of(type_name: &str) -> &str {
    type_name.split('.').next().unwrap_or(type_name)
}

/// Weave one exposed class
///
/// Properties are rewritten first, then functions in declaration order; the
/// collected lookups become the prologue of the class's static initializer.
/// Member errors are collected on the unit.
pub fn weave_class(unit: &mut Unit<'_>, ty: &mut TypeDef) {
    let ctx = unit.ctx;
    let owner = ty.name.clone();
    let class_ptr = fields::native_class_ptr(ty);
    let mut init = StaticInit::new(owner.as_str());
    let native_name = markers::type_native_name(ty);
    if let Err(e) = init.native_class(&mut unit.strings, ctx.helpers, &native_name) {
        unit.errors.push(e);
        return;
    }

    rewrite_properties(unit, ty, &mut init, &class_ptr);

    // Rewriting appends `_Implementation` methods; only the original ones
    // are candidates
    let functions: Vec<usize> = ty
        .methods
        .iter()
        .enumerate()
        .filter(|(_, m)| m.has_attribute(markers::EXPOSED_FUNCTION))
        .map(|(i, _)| i)
        .collect();
    for i in functions {
        let name = ty.methods[i].name.clone();
        match rewrite_function(unit, ty, &mut init, &class_ptr, i) {
            Ok(()) => unit.mark_rewritten(&owner, &name),
            Err(e) => {
                let e = if e.member.is_some() { e } else { e.with_member(name) };
                unit.errors.push(e);
            }
        }
    }

    for method in ty
        .methods
        .iter()
        .filter(|m| m.is_static && m.has_attribute(markers::EXTENSION_METHOD))
    {
        ctx.registry
            .extension(package_of(&owner), format!("{}::{}", owner, method.name));
    }

    init.install(ty);
    ctx.registry.export(&owner);
    debug!(type_name = %owner, "wove class");
}
