//! Structured-record orchestration
//!
//! Records are ordered dependency-first, then rewritten one at a time so a
//! record's layout decision is final before any record embedding it is
//! looked at. Each rewritten record gets:
//!
//! - a `.ctor(IntPtr)` reading the record from native memory
//! - an instance `ToNative(IntPtr)` writing it back
//! - for mirror-copy records, a `<R>Marshaller` with static
//!   `FromNative(IntPtr)` / `ToNative(IntPtr, R)` for use as a container
//!   element
//!
//! Blittable records are copied as one block of `NativeDataSize` bytes;
//! mirror-copy records field by field, in declaration order.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use stitch_bytecode::{
    FieldRef, Instr, MethodBody, MethodDef, MethodRef, Module, ParamDef, TypeDef, TypeKind, TypeSig,
};
use stitch_sdk::helpers::{CTOR, FROM_NATIVE, TO_NATIVE};
use stitch_sdk::LayoutBuilder;
use tracing::{debug, warn};

use crate::context::Unit;
use crate::emit::Emitter;
use crate::error::{WeaveError, WeaveResult};
use crate::index::{RecordLayout, TypeIndex};
use crate::infra::{fields, is_stub, StaticInit};
use crate::markers;
use crate::naming;
use crate::strategy::{MarshalKind, MemberSlots, Strategy, Usage};

// ============================================================================
// Ordering
// ============================================================================

/// Processing state of a record during ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// On the traversal stack
    Discovered,
    /// Placed in the order
    Ordered,
}

/// Whether `ty` takes part in the record pass
pub fn is_woven_record(ty: &TypeDef) -> bool {
    ty.kind == TypeKind::Struct && markers::is_exposed(ty) && !ty.has_attribute(markers::NATIVE_OPAQUE)
}

/// Records of this module embedded by value in `ty`'s instance fields
fn embedded_records<'m>(ty: &'m TypeDef, index: &TypeIndex) -> Vec<&'m str> {
    let mut out: Vec<&str> = Vec::new();
    for field in ty.fields.iter().filter(|f| !f.is_static) {
        for name in field.ty.referenced_types() {
            let local = index
                .get(name)
                .is_some_and(|t| t.kind == TypeKind::Struct && !t.imported && t.exposed && !t.opaque);
            if local && !out.contains(&name) {
                out.push(name);
            }
        }
    }
    out
}

/// Dependency-first order of the module's exposed records
///
/// Leaves come before the records that embed them; otherwise declaration
/// order is kept. A record declared twice or a reference cycle is a
/// metadata error.
pub fn plan_records(module: &Module, index: &TypeIndex) -> WeaveResult<Vec<String>> {
    let mut records: FxHashMap<&str, &TypeDef> = FxHashMap::default();
    let mut declared = Vec::new();
    for ty in module.types.iter().filter(|t| is_woven_record(t)) {
        if records.insert(ty.name.as_str(), ty).is_some() {
            return Err(WeaveError::metadata(&ty.name, "duplicate metadata for record"));
        }
        declared.push(ty.name.as_str());
    }

    let mut states: FxHashMap<&str, State> = FxHashMap::default();
    let mut order = Vec::with_capacity(declared.len());

    for root in declared {
        if states.contains_key(root) {
            continue;
        }
        // Explicit stack of (record, its embedded records, next to visit)
        let mut stack: Vec<(&str, Vec<&str>, usize)> = Vec::new();
        states.insert(root, State::Discovered);
        stack.push((root, embedded_records(records[root], index), 0));

        while let Some((name, deps, next)) = stack.last_mut() {
            let Some(&dep) = deps.get(*next) else {
                let name = *name;
                stack.pop();
                states.insert(name, State::Ordered);
                order.push(name.to_string());
                continue;
            };
            *next += 1;

            match states.get(dep) {
                Some(State::Ordered) => {}
                Some(State::Discovered) => {
                    let mut path: Vec<&str> = stack
                        .iter()
                        .map(|(n, _, _)| *n)
                        .skip_while(|n| *n != dep)
                        .collect();
                    path.push(dep);
                    return Err(WeaveError::metadata(
                        dep,
                        format!("records embed each other: {}", path.join(" -> ")),
                    ));
                }
                None => {
                    // Only declared exposed records are in the table
                    let Some(def) = records.get(dep) else {
                        continue;
                    };
                    states.insert(dep, State::Discovered);
                    let deps = embedded_records(def, index);
                    stack.push((dep, deps, 0));
                }
            }
        }
    }
    Ok(order)
}

// ============================================================================
// Rewriting
// ============================================================================

struct FieldPlan {
    field: FieldRef,
    strategy: Arc<Strategy>,
    slots: MemberSlots,
}

/// Natural layout of the record when every field is blittable
fn blittable_layout(plans: &[FieldPlan], index: &TypeIndex) -> Option<(RecordLayout, Vec<u32>)> {
    let mut builder = LayoutBuilder::new();
    let mut offsets = Vec::with_capacity(plans.len());
    for plan in plans {
        let (size, align) = match &plan.strategy.kind {
            MarshalKind::Blittable(k) | MarshalKind::Enum(k) => (k.size(), k.align()),
            MarshalKind::BlittableRecord(name) => {
                let layout = index.get(name)?.layout?;
                (layout.size, layout.align)
            }
            _ => return None,
        };
        offsets.push(builder.push(size, align));
    }
    let layout = RecordLayout {
        size: builder.finish(),
        align: builder.align(),
    };
    Some((layout, offsets))
}

/// Check a computed layout against the native descriptor table
///
/// A record the table does not describe is trusted as computed.
fn layout_matches(
    unit: &Unit<'_>,
    ty: &TypeDef,
    native_name: &str,
    layout: &RecordLayout,
    offsets: &[u32],
    plans: &[FieldPlan],
) -> bool {
    let Some(desc) = unit.ctx.metadata.find(native_name) else {
        return true;
    };
    if desc.size != layout.size {
        warn!(
            type_name = %ty.name,
            managed = layout.size,
            native = desc.size,
            "record size differs from native, copying field by field"
        );
        return false;
    }
    for (plan, offset) in plans.iter().zip(offsets) {
        let attributes = ty
            .field(&plan.field.name)
            .map(|f| f.attributes.as_slice())
            .unwrap_or_default();
        let native = markers::member_native_name(attributes, &plan.field.name);
        match desc.property(&native) {
            Some(p) if p.offset == *offset => {}
            found => {
                warn!(
                    type_name = %ty.name,
                    field = %plan.field.name,
                    managed = offset,
                    native = ?found.map(|p| p.offset),
                    "record field offset differs from native, copying field by field"
                );
                return false;
            }
        }
    }
    true
}

/// Rewrite one record; returns its layout when it is blittable
///
/// Member errors are collected on the unit and leave the record
/// unrewritten.
pub fn rewrite_record(unit: &mut Unit<'_>, ty: &mut TypeDef) -> WeaveResult<Option<RecordLayout>> {
    let ctx = unit.ctx;
    let resolver = ctx.resolver();
    let owner = ty.name.clone();
    let native_name = markers::type_native_name(ty);

    let instance: Vec<(String, TypeSig, bool)> = ty
        .fields
        .iter()
        .filter(|f| !f.is_static)
        .map(|f| (f.name.clone(), f.ty.clone(), f.has_attribute(markers::NATIVE_BITFIELD)))
        .collect();

    let mut plans = Vec::with_capacity(instance.len());
    let mut failed = false;
    for (name, sig, bitfield) in &instance {
        let planned = resolver
            .resolve(sig, Usage::Static, *bitfield)
            .and_then(|strategy| {
                let slots = fields::allocate_member(ty, name, &strategy)?;
                Ok(FieldPlan {
                    field: FieldRef::new(owner.as_str(), name.as_str()),
                    strategy,
                    slots,
                })
            });
        match planned {
            Ok(plan) => plans.push(plan),
            Err(e) => {
                unit.errors.push(e.at(&owner, name));
                failed = true;
            }
        }
    }
    if failed {
        return Ok(None);
    }

    let layout = blittable_layout(&plans, ctx.index)
        .filter(|(layout, offsets)| layout_matches(unit, ty, &native_name, layout, offsets, &plans))
        .map(|(layout, _)| layout);

    let class_ptr = fields::native_class_ptr(ty);
    let data_size = fields::native_data_size(ty);
    let mut init = StaticInit::new(owner.as_str());
    init.native_class(&mut unit.strings, ctx.helpers, &native_name)?;
    init.record_size(ctx.helpers, &class_ptr)?;
    for plan in &plans {
        let attributes = ty
            .field(&plan.field.name)
            .map(|f| f.attributes.clone())
            .unwrap_or_default();
        let native = markers::member_native_name(&attributes, &plan.field.name);
        init.member(&mut unit.strings, ctx.helpers, &class_ptr, &native, &plan.slots)?;
    }

    let (from_native, to_native) = match layout {
        Some(_) => block_copies(&data_size),
        None => (mirror_ctor(unit, &plans)?, mirror_to_native(unit, &plans)?),
    };
    install(ty, CTOR, vec![ParamDef::new("native", TypeSig::IntPtr)], TypeSig::Void, from_native)?;
    install(ty, TO_NATIVE, vec![ParamDef::new("native", TypeSig::IntPtr)], TypeSig::Void, to_native)?;
    init.install(ty);

    if layout.is_none() {
        unit.synthesized.push(record_marshaller(&owner));
    }
    for plan in &plans {
        unit.mark_rewritten(&owner, &plan.field.name);
    }
    debug!(type_name = %owner, blittable = layout.is_some(), "rewrote record");
    Ok(layout)
}

/// `.ctor(IntPtr)` and `ToNative(IntPtr)` bodies of a blittable record
fn block_copies(data_size: &FieldRef) -> (MethodBody, MethodBody) {
    let copy = |dst: u16, src: u16| {
        MethodBody::new(vec![
            Instr::LoadArg(dst),
            Instr::LoadArg(src),
            Instr::LoadStatic(data_size.clone()),
            Instr::BlockCopy,
            Instr::Ret,
        ])
    };
    (copy(0, 1), copy(1, 0))
}

fn native_arg(em: &mut Emitter<'_>) {
    em.emit(Instr::LoadArg(1));
}

fn mirror_ctor(unit: &mut Unit<'_>, plans: &[FieldPlan]) -> WeaveResult<MethodBody> {
    let mut em = Emitter::new(&mut unit.strings);
    for plan in plans {
        let value = em.local(plan.strategy.sig.clone());
        plan.strategy.emit_load(&mut em, &plan.slots, &native_arg)?;
        em.emit(Instr::StoreLocal(value));
        em.emit(Instr::LoadArg(0));
        em.emit(Instr::LoadLocal(value));
        em.emit(Instr::StoreField(plan.field.clone()));
    }
    em.emit(Instr::Ret);
    Ok(em.finish())
}

fn mirror_to_native(unit: &mut Unit<'_>, plans: &[FieldPlan]) -> WeaveResult<MethodBody> {
    let mut em = Emitter::new(&mut unit.strings);
    for plan in plans {
        let field = plan.field.clone();
        plan.strategy.emit_store(&mut em, &plan.slots, &native_arg, &move |em: &mut Emitter<'_>| {
            em.emit(Instr::LoadArg(0));
            em.emit(Instr::LoadField(field.clone()));
        })?;
    }
    em.emit(Instr::Ret);
    Ok(em.finish())
}

/// Give `ty` an instance method with `body`, filling a generated stub if
/// one is declared
fn install(ty: &mut TypeDef, name: &str, params: Vec<ParamDef>, ret: TypeSig, body: MethodBody) -> WeaveResult<()> {
    let arity = params.len() as u16;
    match ty
        .methods
        .iter_mut()
        .find(|m| m.name == name && !m.is_static && m.arity() == arity)
    {
        Some(existing) if is_stub(existing) => existing.body = Some(body),
        Some(_) => {
            return Err(WeaveError::invariant(&ty.name, "record already defines a native conversion")
                .with_member(name));
        }
        None => ty.methods.push(MethodDef::new(name, params, ret).with_body(body)),
    }
    Ok(())
}

/// `<R>Marshaller`: element converter of a mirror-copy record
fn record_marshaller(record: &str) -> TypeDef {
    let mut marshaller = TypeDef::new(naming::record_marshaller(record), TypeKind::Class);

    let mut from = MethodDef::new(
        FROM_NATIVE,
        vec![ParamDef::new("native", TypeSig::IntPtr)],
        TypeSig::Struct(record.to_string()),
    )
    .with_body(MethodBody::new(vec![
        Instr::LoadArg(0),
        Instr::NewObj(MethodRef::new(record, CTOR, 1)),
        Instr::Ret,
    ]));
    from.is_static = true;

    let mut to = MethodDef::new(
        TO_NATIVE,
        vec![
            ParamDef::new("native", TypeSig::IntPtr),
            ParamDef::new("value", TypeSig::Struct(record.to_string())),
        ],
        TypeSig::Void,
    )
    .with_body(MethodBody::new(vec![
        Instr::LoadArg(1),
        Instr::LoadArg(0),
        Instr::Call(MethodRef::new(record, TO_NATIVE, 1)),
        Instr::Ret,
    ]));
    to.is_static = true;

    marshaller.methods.push(from);
    marshaller.methods.push(to);
    marshaller
}
