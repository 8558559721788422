//! Type orchestrators
//!
//! Per declared type, decide what gets rewritten and drive the member
//! rewriters. Records and enums are handled in sequential passes; classes,
//! interfaces and callable signatures are independent units the pipeline
//! may run in parallel.

pub mod class;
pub mod enums;
pub mod interface;
pub mod invariants;
pub mod promote;
pub mod record;

pub use class::weave_class;
pub use enums::check_enum;
pub use interface::weave_interface;
pub use invariants::check_type;
pub use promote::promote_exposed_fields;
pub use record::{is_woven_record, plan_records, rewrite_record};

use stitch_bytecode::{TypeDef, TypeKind};

use crate::context::Unit;
use crate::markers;
use crate::rewrite::rewrite_delegate;

/// Work of one independent unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// Native-backed class
    Class,
    /// Interface proxy
    Interface,
    /// Callable signature
    Delegate,
}

impl UnitKind {
    /// Unit a declared type belongs to, if any
    pub fn of(ty: &TypeDef) -> Option<Self> {
        if !markers::is_exposed(ty) {
            return None;
        }
        match ty.kind {
            TypeKind::Class => Some(Self::Class),
            TypeKind::Interface => Some(Self::Interface),
            TypeKind::Delegate => Some(Self::Delegate),
            TypeKind::Struct | TypeKind::Enum => None,
        }
    }
}

/// Run one unit over `ty`, collecting errors on the unit
pub fn weave_unit(unit: &mut Unit<'_>, ty: &mut TypeDef, kind: UnitKind) {
    let result = match kind {
        UnitKind::Class => {
            weave_class(unit, ty);
            Ok(())
        }
        UnitKind::Interface => weave_interface(unit, ty),
        UnitKind::Delegate => rewrite_delegate(unit, ty),
    };
    if let Err(e) = result {
        unit.errors.push(e);
    }
}
