//! Constructor relocation
//!
//! Compiled field initializers run before the base constructor call, but a
//! native-backed setter needs the native handle the base constructor
//! creates. Initializers of eliminated backing fields are therefore moved
//! to just after the base call, as setter calls. A `null` initializer is
//! dropped instead of replayed.
//!
//! Only the plain `ldarg.0; <constant>; stfld <backing>` shape is moved. Any
//! other access to a backing field before the base call is rejected.

use stitch_bytecode::{Instr, MethodDef};
use stitch_sdk::helpers::CTOR;

use super::body::Redirects;
use crate::error::{WeaveError, WeaveResult};

/// Index of the base (or chained) constructor call
pub fn base_call_index(method: &MethodDef, owner: &str, base: Option<&str>) -> Option<usize> {
    let body = method.body.as_ref()?;
    body.instrs.iter().position(|instr| match instr {
        Instr::Call(m) => m.name == CTOR && (m.owner == owner || Some(m.owner.as_str()) == base),
        _ => false,
    })
}

/// Relocate backing-field initializers of `ctor` and redirect the remaining
/// accesses through the accessors
///
/// A constructor without a base call has every access redirected in place.
pub fn relocate(ctor: &mut MethodDef, base: Option<&str>, redirects: &mut Redirects) -> WeaveResult<()> {
    let owner = redirects.owner().to_string();
    let Some(split) = base_call_index(ctor, &owner, base) else {
        if let Some(body) = ctor.body.as_mut() {
            redirects.apply(&mut body.instrs);
        }
        return Ok(());
    };
    let Some(body) = ctor.body.as_mut() else {
        return Ok(());
    };

    let mut tail = body.instrs.split_off(split);
    let base_call = tail.remove(0);
    let head = std::mem::take(&mut body.instrs);

    // Non-marker positions of the head, for pattern matching across
    // sequence points
    let positions: Vec<usize> = head
        .iter()
        .enumerate()
        .filter(|(_, i)| !i.is_marker())
        .map(|(n, _)| n)
        .collect();

    let mut kept = Vec::with_capacity(head.len());
    let mut deferred = Vec::new();
    let mut skip_until = None;

    for (k, &n) in positions.iter().enumerate() {
        if skip_until.is_some_and(|end| n <= end) {
            continue;
        }
        // Markers between the previous kept instruction and this one
        let from = if k == 0 { 0 } else { positions[k - 1] + 1 };
        for marker in &head[from..n] {
            kept.push(marker.clone());
        }

        let window = (
            &head[n],
            positions.get(k + 1).map(|&i| &head[i]),
            positions.get(k + 2).map(|&i| (i, &head[i])),
        );
        if let (Instr::LoadArg(0), Some(value), Some((end, Instr::StoreField(field)))) = window {
            if let Some(accessors) = redirects.get(field) {
                if !value.is_constant() {
                    return Err(WeaveError::unsupported(
                        &owner,
                        "backing field initializer is not a constant",
                    )
                    .with_member(accessors.property.clone()));
                }
                if *value != Instr::ConstNull {
                    let property = accessors.property.clone();
                    deferred.push(Instr::LoadArg(0));
                    deferred.push(value.clone());
                    deferred.push(Instr::Call(accessors.setter.clone()));
                    redirects.mark_written(&property);
                }
                skip_until = Some(end);
                continue;
            }
        }

        if let Instr::LoadField(field) | Instr::StoreField(field) = &head[n] {
            if let Some(accessors) = redirects.get(field) {
                return Err(WeaveError::unsupported(
                    &owner,
                    "backing field accessed before the base constructor call",
                )
                .with_member(accessors.property.clone()));
            }
        }
        kept.push(head[n].clone());
    }
    // Trailing markers
    let last = positions.last().map_or(0, |&n| n + 1);
    kept.extend(head[last..].iter().cloned());

    redirects.apply(&mut tail);

    kept.push(base_call);
    kept.append(&mut deferred);
    kept.append(&mut tail);
    body.instrs = kept;
    Ok(())
}
