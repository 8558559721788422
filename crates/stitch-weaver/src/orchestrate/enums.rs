//! Exposed enumerations
//!
//! Enums need no rewriting; their values are stored in native memory as
//! their underlying integer. The pass checks that this is representable.

use stitch_bytecode::TypeDef;
use stitch_sdk::NativeKind;

use crate::error::WeaveError;

/// Inclusive value range of an integral kind
fn range(kind: NativeKind) -> (i128, i128) {
    let bits = kind.size() * 8;
    let signed = matches!(kind, NativeKind::I8 | NativeKind::I16 | NativeKind::I32 | NativeKind::I64);
    if signed {
        (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
    } else {
        (0, (1i128 << bits) - 1)
    }
}

/// Check an exposed enum: integral underlying type, every constant in range
pub fn check_enum(ty: &TypeDef) -> Vec<WeaveError> {
    let kind = match ty.underlying.as_ref().and_then(|sig| sig.native_kind()) {
        Some(kind) if kind.is_integral() && kind != NativeKind::Ptr => kind,
        Some(_) => return vec![WeaveError::invariant(&ty.name, "enum underlying type is not an integer")],
        None => return vec![WeaveError::metadata(&ty.name, "enum has no underlying type")],
    };
    let (min, max) = range(kind);

    ty.fields
        .iter()
        .filter(|f| f.is_static)
        .filter_map(|f| {
            let raw = f.constant?;
            // Constants are stored as i64; u64 values above i64::MAX wrap
            let value = match kind {
                NativeKind::U64 => i128::from(raw as u64),
                _ => i128::from(raw),
            };
            (value < min || value > max).then(|| {
                WeaveError::invariant(&ty.name, format!("value {} does not fit {}", value, kind))
                    .with_member(f.name.as_str())
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use stitch_bytecode::{FieldDef, TypeKind, TypeSig};

    fn color(underlying: Option<TypeSig>, values: &[i64]) -> TypeDef {
        let mut ty = TypeDef::new("Game.Color", TypeKind::Enum);
        ty.underlying = underlying;
        for (i, v) in values.iter().enumerate() {
            let mut field = FieldDef::new(format!("V{}", i), TypeSig::Enum("Game.Color".into()));
            field.is_static = true;
            field.constant = Some(*v);
            ty.fields.push(field);
        }
        ty
    }

    #[test]
    fn test_values_in_range() {
        assert!(check_enum(&color(Some(TypeSig::U8), &[0, 255])).is_empty());
        assert!(check_enum(&color(Some(TypeSig::I8), &[-128, 127])).is_empty());
    }

    #[test]
    fn test_value_out_of_range() {
        let errors = check_enum(&color(Some(TypeSig::U8), &[0, 256, -1]));
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].member.as_deref(), Some("V1"));
    }

    #[test]
    fn test_u64_values_above_i64_max() {
        assert!(check_enum(&color(Some(TypeSig::U64), &[0, i64::MAX, u64::MAX as i64])).is_empty());
        let errors = check_enum(&color(Some(TypeSig::I8), &[-1, -129]));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].member.as_deref(), Some("V1"));
    }

    #[test]
    fn test_underlying_type_rules() {
        assert!(check_enum(&color(None, &[]))[0].is_fatal());
        assert!(!check_enum(&color(Some(TypeSig::F32), &[]))[0].is_fatal());
    }
}
