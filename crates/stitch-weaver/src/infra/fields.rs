//! Field and offset allocation
//!
//! Every generated slot is a private field of the member's owning type. An
//! offset slot is allocated exactly once per member: finding one already
//! present means the member was woven before, which is an invariant
//! violation rather than something to reuse.

use stitch_bytecode::{FieldDef, FieldRef, TypeDef, TypeSig};

use crate::error::{WeaveError, WeaveResult};
use crate::naming;
use crate::strategy::{MemberSlots, Strategy, Usage};

/// Add a private static field unless one of that name exists
pub fn ensure_static(ty: &mut TypeDef, name: &str, sig: TypeSig) -> FieldRef {
    if ty.field(name).is_none() {
        ty.fields.push(FieldDef::private_static(name, sig));
    }
    FieldRef::new(ty.name.as_str(), name)
}

/// Add a private instance field unless one of that name exists
pub fn ensure_instance(ty: &mut TypeDef, name: &str, sig: TypeSig) -> FieldRef {
    if ty.field(name).is_none() {
        let mut field = FieldDef::new(name, sig);
        field.is_private = true;
        ty.fields.push(field);
    }
    FieldRef::new(ty.name.as_str(), name)
}

/// `NativeClassPtr`
pub fn native_class_ptr(ty: &mut TypeDef) -> FieldRef {
    ensure_static(ty, naming::NATIVE_CLASS_PTR, TypeSig::IntPtr)
}

/// `NativeDataSize`
pub fn native_data_size(ty: &mut TypeDef) -> FieldRef {
    ensure_static(ty, naming::NATIVE_DATA_SIZE, TypeSig::I32)
}

/// `<func>_NativeFunction` and `<func>_ParamsSize`
pub fn function_slots(ty: &mut TypeDef, function: &str) -> (FieldRef, FieldRef) {
    (
        ensure_static(ty, &naming::native_function(function), TypeSig::IntPtr),
        ensure_static(ty, &naming::params_size(function), TypeSig::I32),
    )
}

/// Allocate the slots of one member
///
/// `prefix` is the member's name for properties and record fields, and
/// `<func>_<param>` for function parameters. Instance-usage containers get
/// a per-object marshaller field; every other slot is static.
pub fn allocate_member(ty: &mut TypeDef, prefix: &str, strategy: &Strategy) -> WeaveResult<MemberSlots> {
    let offset_name = naming::offset(prefix);
    if ty.field(&offset_name).is_some() {
        return Err(WeaveError::invariant(&ty.name, "offset slot already allocated").with_member(prefix));
    }
    let offset = ensure_static(ty, &offset_name, TypeSig::I32);

    let native_property = strategy
        .needs_native_property()
        .then(|| ensure_static(ty, &naming::native_property(prefix), TypeSig::IntPtr));
    let field_mask = strategy
        .is_bitfield()
        .then(|| ensure_static(ty, &naming::field_mask(prefix), TypeSig::U8));
    let marshaller = strategy.marshaller_type().map(|marshaller_type| {
        let name = naming::marshaller(prefix);
        let sig = TypeSig::Object(marshaller_type.to_string());
        if strategy.usage == Usage::Instance {
            ensure_instance(ty, &name, sig)
        } else {
            ensure_static(ty, &name, sig)
        }
    });

    Ok(MemberSlots {
        member: prefix.to_string(),
        offset,
        native_property,
        field_mask,
        marshaller,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WeaveConfig;
    use crate::helpers::HelperLibrary;
    use crate::index::TypeIndex;
    use crate::strategy::{Resolver, StrategyCache};
    use stitch_bytecode::{Module, TypeKind};

    #[test]
    fn test_offsets_unique_and_in_declaration_order() {
        let helpers = HelperLibrary::standard(&WeaveConfig::default());
        let index = TypeIndex::build(&Module::new("m"), &helpers).unwrap();
        let cache = StrategyCache::new();
        let resolver = Resolver::new(&index, &helpers, &cache);
        let int = resolver.resolve(&TypeSig::I32, Usage::Instance, false).unwrap();

        let mut ty = TypeDef::new("Game.Actor", TypeKind::Class);
        for name in ["A", "B", "C"] {
            allocate_member(&mut ty, name, &int).unwrap();
        }
        let offsets: Vec<_> = ty
            .fields
            .iter()
            .filter_map(|f| naming::parse_offset(&f.name))
            .collect();
        assert_eq!(offsets, ["A", "B", "C"]);

        let err = allocate_member(&mut ty, "B", &int).unwrap_err();
        assert_eq!(err.member.as_deref(), Some("B"));
    }

    #[test]
    fn test_container_slots_follow_usage() {
        let helpers = HelperLibrary::standard(&WeaveConfig::default());
        let index = TypeIndex::build(&Module::new("m"), &helpers).unwrap();
        let cache = StrategyCache::new();
        let resolver = Resolver::new(&index, &helpers, &cache);
        let sig = TypeSig::Set(Box::new(TypeSig::Name));

        let mut ty = TypeDef::new("Game.Actor", TypeKind::Class);
        let instance = resolver.resolve(&sig, Usage::Instance, false).unwrap();
        let slots = allocate_member(&mut ty, "Tags", &instance).unwrap();
        assert!(slots.native_property.is_some());
        assert!(!ty.field("Tags_Marshaller").unwrap().is_static);

        let copy = resolver.resolve(&sig, Usage::Static, false).unwrap();
        allocate_member(&mut ty, "Jump_tags", &copy).unwrap();
        assert!(ty.field("Jump_tags_Marshaller").unwrap().is_static);
    }
}
