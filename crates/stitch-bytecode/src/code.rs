//! Code stream encoding
//!
//! Converts an editable instruction list into its binary form and back.
//! Labels become relative branch displacements on the way out (measured from
//! the end of the branch instruction) and are re-materialized on the way in.
//! Sequence points never enter the code stream; they are returned separately
//! so they can be stored in the companion debug map.

use rustc_hash::FxHashMap;
use stitch_sdk::NativeKind;

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use crate::instr::{FieldRef, Instr, Label, MethodRef};
use crate::opcode::Opcode;

/// A sequence point stripped from a code stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinePosition {
    /// Byte offset of the instruction the point annotates
    pub offset: u32,
    /// Source line
    pub line: u32,
    /// Source column
    pub column: u32,
}

/// A label referenced by a branch but never placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("branch to undefined label {0}")]
pub struct UndefinedLabel(pub Label);

/// Encoded size of a real instruction in bytes; markers take no space
pub fn encoded_size(instr: &Instr) -> usize {
    let method = |m: &MethodRef| {
        4 + m.owner.len() + 4 + m.name.len() + 2 + 1 + m.type_arg.as_ref().map_or(0, |t| 4 + t.len())
    };
    let field = |f: &FieldRef| 4 + f.owner.len() + 4 + f.name.len();
    match instr {
        Instr::Label(_) | Instr::SequencePoint { .. } => 0,
        Instr::ConstI32(_) | Instr::ConstStr(_) => 5,
        Instr::ConstI64(_) | Instr::ConstF64(_) => 9,
        Instr::LoadArg(_) | Instr::StoreArg(_) | Instr::LoadLocal(_) | Instr::StoreLocal(_) => 3,
        Instr::Br(_) | Instr::BrTrue(_) | Instr::BrFalse(_) => 5,
        Instr::Call(m) | Instr::CallVirt(m) | Instr::NewObj(m) | Instr::LoadFunction(m) => {
            1 + method(m)
        }
        Instr::LoadField(f) | Instr::StoreField(f) | Instr::LoadStatic(f) | Instr::StoreStatic(f) => {
            1 + field(f)
        }
        Instr::LoadNative(_) | Instr::StoreNative(_) => 2,
        _ => 1,
    }
}

/// Byte offset of every entry of `instrs`; markers get the offset of the next
/// real instruction
pub fn instruction_offsets(instrs: &[Instr]) -> Vec<u32> {
    let mut offset = 0u32;
    instrs
        .iter()
        .map(|instr| {
            let at = offset;
            offset += encoded_size(instr) as u32;
            at
        })
        .collect()
}

/// Encode an instruction list, patching branch displacements
///
/// Returns the sequence points found in the list.
pub fn encode_code(
    instrs: &[Instr],
    writer: &mut BytecodeWriter,
) -> Result<Vec<LinePosition>, UndefinedLabel> {
    let base = writer.offset();
    let mut label_positions: FxHashMap<Label, usize> = FxHashMap::default();
    // (slot offset, end of instruction, target)
    let mut pending_jumps: Vec<(usize, usize, Label)> = Vec::new();
    let mut lines = Vec::new();

    for instr in instrs {
        let at = writer.offset();
        match instr {
            Instr::Label(label) => {
                label_positions.insert(*label, at);
                continue;
            }
            Instr::SequencePoint { line, column } => {
                lines.push(LinePosition {
                    offset: (at - base) as u32,
                    line: *line,
                    column: *column,
                });
                continue;
            }
            _ => {}
        }

        let Some(op) = instr.opcode() else { continue };
        writer.emit_u8(op.to_u8());
        match instr {
            Instr::ConstI32(v) => writer.emit_i32(*v),
            Instr::ConstI64(v) => writer.emit_i64(*v),
            Instr::ConstF64(v) => writer.emit_f64(*v),
            Instr::ConstStr(i) => writer.emit_u32(*i),
            Instr::LoadArg(i) | Instr::StoreArg(i) | Instr::LoadLocal(i) | Instr::StoreLocal(i) => {
                writer.emit_u16(*i)
            }
            Instr::Br(l) | Instr::BrTrue(l) | Instr::BrFalse(l) => {
                let slot = writer.reserve_i32();
                pending_jumps.push((slot, writer.offset(), *l));
            }
            Instr::Call(m) | Instr::CallVirt(m) | Instr::NewObj(m) | Instr::LoadFunction(m) => {
                encode_method_ref(m, writer)
            }
            Instr::LoadField(f) | Instr::StoreField(f) | Instr::LoadStatic(f) | Instr::StoreStatic(f) => {
                encode_field_ref(f, writer)
            }
            Instr::LoadNative(k) | Instr::StoreNative(k) => writer.emit_u8(k.tag()),
            _ => {}
        }
    }

    for (slot, end, label) in pending_jumps {
        let target = *label_positions.get(&label).ok_or(UndefinedLabel(label))?;
        writer.patch_i32(slot, target as i32 - end as i32);
    }

    Ok(lines)
}

/// Decode a code stream, turning branch displacements back into labels
///
/// Labels are numbered in order of their position in the stream.
pub fn decode_code(code: &[u8]) -> Result<Vec<Instr>, DecodeError> {
    struct Raw {
        offset: usize,
        instr: Instr,
        // absolute branch target, resolved to a label afterwards
        target: Option<usize>,
    }

    let mut reader = BytecodeReader::new(code);
    let mut raw = Vec::new();

    while reader.has_more() {
        let offset = reader.position();
        let byte = reader.read_u8()?;
        let op = Opcode::from_u8(byte).ok_or(DecodeError::InvalidOpcode(byte, offset))?;
        let mut target = None;
        let placeholder = Label(0);
        let instr = match op {
            Opcode::Nop => Instr::Nop,
            Opcode::Pop => Instr::Pop,
            Opcode::Dup => Instr::Dup,
            Opcode::ConstNull => Instr::ConstNull,
            Opcode::ConstTrue => Instr::ConstTrue,
            Opcode::ConstFalse => Instr::ConstFalse,
            Opcode::ConstI32 => Instr::ConstI32(reader.read_i32()?),
            Opcode::ConstI64 => Instr::ConstI64(reader.read_i64()?),
            Opcode::ConstF64 => Instr::ConstF64(reader.read_f64()?),
            Opcode::ConstStr => Instr::ConstStr(reader.read_u32()?),
            Opcode::LoadArg => Instr::LoadArg(reader.read_u16()?),
            Opcode::StoreArg => Instr::StoreArg(reader.read_u16()?),
            Opcode::LoadLocal => Instr::LoadLocal(reader.read_u16()?),
            Opcode::StoreLocal => Instr::StoreLocal(reader.read_u16()?),
            Opcode::Add => Instr::Add,
            Opcode::Sub => Instr::Sub,
            Opcode::Mul => Instr::Mul,
            Opcode::And => Instr::And,
            Opcode::Or => Instr::Or,
            Opcode::Xor => Instr::Xor,
            Opcode::Not => Instr::Not,
            Opcode::Ceq => Instr::Ceq,
            Opcode::Br | Opcode::BrTrue | Opcode::BrFalse => {
                let displacement = reader.read_i32()? as i64;
                let absolute = reader.position() as i64 + displacement;
                if absolute < 0 || absolute > code.len() as i64 {
                    return Err(DecodeError::BadBranchTarget {
                        offset,
                        target: absolute,
                    });
                }
                target = Some(absolute as usize);
                match op {
                    Opcode::Br => Instr::Br(placeholder),
                    Opcode::BrTrue => Instr::BrTrue(placeholder),
                    _ => Instr::BrFalse(placeholder),
                }
            }
            Opcode::Call => Instr::Call(decode_method_ref(&mut reader)?),
            Opcode::CallVirt => Instr::CallVirt(decode_method_ref(&mut reader)?),
            Opcode::NewObj => Instr::NewObj(decode_method_ref(&mut reader)?),
            Opcode::LoadFunction => Instr::LoadFunction(decode_method_ref(&mut reader)?),
            Opcode::Ret => Instr::Ret,
            Opcode::LoadField => Instr::LoadField(decode_field_ref(&mut reader)?),
            Opcode::StoreField => Instr::StoreField(decode_field_ref(&mut reader)?),
            Opcode::LoadStatic => Instr::LoadStatic(decode_field_ref(&mut reader)?),
            Opcode::StoreStatic => Instr::StoreStatic(decode_field_ref(&mut reader)?),
            Opcode::PtrAdd => Instr::PtrAdd,
            Opcode::LoadNative => Instr::LoadNative(decode_kind(&mut reader)?),
            Opcode::StoreNative => Instr::StoreNative(decode_kind(&mut reader)?),
            Opcode::StackAlloc => Instr::StackAlloc,
            Opcode::BlockCopy => Instr::BlockCopy,
            Opcode::LoadIndirect => Instr::LoadIndirect,
            Opcode::StoreIndirect => Instr::StoreIndirect,
            Opcode::Throw => Instr::Throw,
        };
        raw.push(Raw {
            offset,
            instr,
            target,
        });
    }

    // Every target must sit on an instruction boundary (or the very end).
    let mut targets: Vec<usize> = raw.iter().filter_map(|r| r.target).collect();
    targets.sort_unstable();
    targets.dedup();
    let labels: FxHashMap<usize, Label> = targets
        .iter()
        .enumerate()
        .map(|(i, &t)| (t, Label(i as u32)))
        .collect();
    for r in &raw {
        if let Some(t) = r.target {
            let on_boundary = t == code.len() || raw.binary_search_by_key(&t, |x| x.offset).is_ok();
            if !on_boundary {
                return Err(DecodeError::BadBranchTarget {
                    offset: r.offset,
                    target: t as i64,
                });
            }
        }
    }

    let mut out = Vec::with_capacity(raw.len() + labels.len());
    for r in raw {
        if let Some(label) = labels.get(&r.offset) {
            out.push(Instr::Label(*label));
        }
        let instr = match (r.instr, r.target.and_then(|t| labels.get(&t).copied())) {
            (Instr::Br(_), Some(l)) => Instr::Br(l),
            (Instr::BrTrue(_), Some(l)) => Instr::BrTrue(l),
            (Instr::BrFalse(_), Some(l)) => Instr::BrFalse(l),
            (other, _) => other,
        };
        out.push(instr);
    }
    if let Some(label) = labels.get(&code.len()) {
        out.push(Instr::Label(*label));
    }
    Ok(out)
}

/// Insert sequence points recorded at byte offsets back into a decoded list
pub fn insert_line_positions(instrs: &mut Vec<Instr>, lines: &[LinePosition]) {
    if lines.is_empty() {
        return;
    }
    let offsets = instruction_offsets(instrs);
    let mut out = Vec::with_capacity(instrs.len() + lines.len());
    let mut pending = lines.iter().peekable();
    for (instr, offset) in instrs.drain(..).zip(offsets) {
        if !instr.is_marker() {
            while let Some(lp) = pending.next_if(|lp| lp.offset <= offset) {
                out.push(Instr::SequencePoint {
                    line: lp.line,
                    column: lp.column,
                });
            }
        }
        out.push(instr);
    }
    *instrs = out;
}

fn encode_method_ref(m: &MethodRef, writer: &mut BytecodeWriter) {
    writer.emit_string(&m.owner);
    writer.emit_string(&m.name);
    writer.emit_u16(m.arity);
    writer.emit_opt_string(m.type_arg.as_deref());
}

fn decode_method_ref(reader: &mut BytecodeReader<'_>) -> Result<MethodRef, DecodeError> {
    Ok(MethodRef {
        owner: reader.read_string()?,
        name: reader.read_string()?,
        arity: reader.read_u16()?,
        type_arg: reader.read_opt_string()?,
    })
}

fn encode_field_ref(f: &FieldRef, writer: &mut BytecodeWriter) {
    writer.emit_string(&f.owner);
    writer.emit_string(&f.name);
}

fn decode_field_ref(reader: &mut BytecodeReader<'_>) -> Result<FieldRef, DecodeError> {
    Ok(FieldRef {
        owner: reader.read_string()?,
        name: reader.read_string()?,
    })
}

fn decode_kind(reader: &mut BytecodeReader<'_>) -> Result<NativeKind, DecodeError> {
    let offset = reader.position();
    let tag = reader.read_u8()?;
    NativeKind::from_tag(tag).ok_or(DecodeError::InvalidTag {
        what: "native kind",
        tag,
        offset,
    })
}
