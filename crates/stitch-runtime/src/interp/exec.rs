//! Instruction execution
//!
//! One activation per call: arguments, locals and an evaluation stack.
//! Every activation opens a native stack frame, so `StackAlloc` buffers are
//! released when the method returns, normally or with an error.

use std::rc::Rc;

use rustc_hash::FxHashMap;
use stitch_bytecode::{FieldRef, Instr, TypeDef};

use super::{Interpreter, MAX_DEPTH};
use crate::error::{RuntimeError, RuntimeResult};
use crate::value::Value;

struct Frame {
    name: String,
    args: Vec<Value>,
    locals: Vec<Value>,
    stack: Vec<Value>,
}

impl Frame {
    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> RuntimeResult<Value> {
        self.stack
            .pop()
            .ok_or_else(|| RuntimeError::StackUnderflow(self.name.clone()))
    }

    fn pop_n(&mut self, n: usize) -> RuntimeResult<Vec<Value>> {
        if self.stack.len() < n {
            return Err(RuntimeError::StackUnderflow(self.name.clone()));
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }
}

fn arith(a: Value, b: Value, int: fn(i64, i64) -> i64, float: fn(f64, f64) -> f64) -> RuntimeResult<Value> {
    Ok(match (a, b) {
        (Value::Float(x), y) => Value::Float(float(x, y.as_f64()?)),
        (x, Value::Float(y)) => Value::Float(float(x.as_f64()?, y)),
        (Value::Ptr(p), y) => Value::Ptr(int(p as i64, y.as_i64()?) as u64),
        (x, Value::Ptr(p)) => Value::Ptr(int(x.as_i64()?, p as i64) as u64),
        (x, y) => Value::Int(int(x.as_i64()?, y.as_i64()?)),
    })
}

fn bitwise(a: Value, b: Value, op: fn(i64, i64) -> i64) -> RuntimeResult<Value> {
    Ok(match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => Value::Bool(op(i64::from(x), i64::from(y)) != 0),
        (x, y) => Value::Int(op(x.as_i64()?, y.as_i64()?)),
    })
}

impl Interpreter {
    /// Run method `index` of `ty` with `args`; the returned value is `Null`
    /// for void methods
    pub(super) fn execute(&mut self, ty: &Rc<TypeDef>, index: usize, mut args: Vec<Value>) -> RuntimeResult<Value> {
        let method = &ty.methods[index];
        let name = format!("{}::{}", ty.name, method.name);
        let body = method
            .body
            .as_ref()
            .ok_or_else(|| RuntimeError::NoBody(name.clone()))?;

        if self.depth >= MAX_DEPTH {
            return Err(RuntimeError::CallDepth(name));
        }
        args.resize(method.arg_count().max(args.len()), Value::Null);
        let mut locals = Vec::with_capacity(body.locals.len());
        for sig in &body.locals {
            locals.push(self.default_value(sig)?);
        }
        let mut frame = Frame {
            name,
            args,
            locals,
            stack: Vec::new(),
        };

        self.depth += 1;
        self.host.memory_mut().push_frame();
        let result = self.run(&mut frame, &body.instrs);
        self.host.memory_mut().pop_frame();
        self.depth -= 1;
        result
    }

    fn run(&mut self, frame: &mut Frame, instrs: &[Instr]) -> RuntimeResult<Value> {
        let labels: FxHashMap<u32, usize> = instrs
            .iter()
            .enumerate()
            .filter_map(|(pc, instr)| match instr {
                Instr::Label(label) => Some((label.0, pc)),
                _ => None,
            })
            .collect();
        let jump = |frame: &Frame, label: u32| {
            labels.get(&label).copied().ok_or_else(|| RuntimeError::UndefinedLabel {
                method: frame.name.clone(),
                label,
            })
        };

        let mut pc = 0;
        while let Some(instr) = instrs.get(pc) {
            pc += 1;
            match instr {
                Instr::Label(_) | Instr::SequencePoint { .. } | Instr::Nop => {}

                // ===== Stack & constants =====
                Instr::Pop => {
                    frame.pop()?;
                }
                Instr::Dup => {
                    let top = frame.pop()?;
                    frame.push(top.clone());
                    frame.push(top);
                }
                Instr::ConstNull => frame.push(Value::Null),
                Instr::ConstTrue => frame.push(Value::Bool(true)),
                Instr::ConstFalse => frame.push(Value::Bool(false)),
                Instr::ConstI32(v) => frame.push(Value::Int(i64::from(*v))),
                Instr::ConstI64(v) => frame.push(Value::Int(*v)),
                Instr::ConstF64(v) => frame.push(Value::Float(*v)),
                Instr::ConstStr(index) => {
                    let s = self.string(*index)?;
                    frame.push(s);
                }

                // ===== Arguments & locals =====
                Instr::LoadArg(i) => {
                    let value = frame.args.get(*i as usize).cloned().unwrap_or_default();
                    frame.push(value);
                }
                Instr::StoreArg(i) => {
                    let value = frame.pop()?.copy_record();
                    let i = *i as usize;
                    if i >= frame.args.len() {
                        frame.args.resize(i + 1, Value::Null);
                    }
                    frame.args[i] = value;
                }
                Instr::LoadLocal(i) => {
                    let value = frame.locals.get(*i as usize).cloned().unwrap_or_default();
                    frame.push(value);
                }
                Instr::StoreLocal(i) => {
                    let value = frame.pop()?.copy_record();
                    let i = *i as usize;
                    if i >= frame.locals.len() {
                        frame.locals.resize(i + 1, Value::Null);
                    }
                    frame.locals[i] = value;
                }

                // ===== Arithmetic =====
                Instr::Add | Instr::Sub | Instr::Mul => {
                    let b = frame.pop()?;
                    let a = frame.pop()?;
                    let result = match instr {
                        Instr::Add => arith(a, b, i64::wrapping_add, |x, y| x + y)?,
                        Instr::Sub => arith(a, b, i64::wrapping_sub, |x, y| x - y)?,
                        _ => arith(a, b, i64::wrapping_mul, |x, y| x * y)?,
                    };
                    frame.push(result);
                }
                Instr::And | Instr::Or | Instr::Xor => {
                    let b = frame.pop()?;
                    let a = frame.pop()?;
                    let result = match instr {
                        Instr::And => bitwise(a, b, |x, y| x & y)?,
                        Instr::Or => bitwise(a, b, |x, y| x | y)?,
                        _ => bitwise(a, b, |x, y| x ^ y)?,
                    };
                    frame.push(result);
                }
                Instr::Not => {
                    let value = match frame.pop()? {
                        Value::Bool(b) => Value::Bool(!b),
                        other => Value::Int(!other.as_i64()?),
                    };
                    frame.push(value);
                }
                Instr::Ceq => {
                    let b = frame.pop()?;
                    let a = frame.pop()?;
                    frame.push(Value::Bool(a == b));
                }

                // ===== Control flow =====
                Instr::Br(label) => pc = jump(frame, label.0)?,
                Instr::BrTrue(label) => {
                    if frame.pop()?.is_truthy() {
                        pc = jump(frame, label.0)?;
                    }
                }
                Instr::BrFalse(label) => {
                    if !frame.pop()?.is_truthy() {
                        pc = jump(frame, label.0)?;
                    }
                }

                // ===== Calls =====
                Instr::Call(method) | Instr::CallVirt(method) => {
                    let count = self.arg_count(method)?;
                    let args = frame.pop_n(count)?;
                    let virtual_call = matches!(instr, Instr::CallVirt(_));
                    if let Some(result) = self.call(method, args, virtual_call)? {
                        frame.push(result);
                    }
                }
                Instr::NewObj(ctor) => {
                    let args = frame.pop_n(ctor.arity as usize)?;
                    let object = self.new_object(ctor, args)?;
                    frame.push(object);
                }
                Instr::LoadFunction(method) => frame.push(Value::Function(method.clone())),
                Instr::Ret => return Ok(frame.stack.pop().unwrap_or_default()),

                // ===== Fields =====
                Instr::LoadField(field) => {
                    let target = frame.pop()?;
                    let value = target.as_object()?.borrow().get(&field.name);
                    frame.push(value);
                }
                Instr::StoreField(field) => {
                    let value = frame.pop()?.copy_record();
                    let target = frame.pop()?;
                    target
                        .as_object()?
                        .borrow_mut()
                        .fields
                        .insert(field.name.clone(), value);
                }
                Instr::LoadStatic(field) => {
                    let owner = self.static_owner(field)?;
                    let value = self.static_value(&owner, &field.name);
                    frame.push(value);
                }
                Instr::StoreStatic(field) => {
                    let value = frame.pop()?.copy_record();
                    let owner = self.static_owner(field)?;
                    self.set_static(&owner, &field.name, value);
                }

                // ===== Native memory & references =====
                Instr::PtrAdd => {
                    let offset = frame.pop()?.as_i64()?;
                    let base = frame.pop()?.as_ptr()?;
                    frame.push(Value::Ptr(base.wrapping_add(offset as u64)));
                }
                Instr::LoadNative(kind) => {
                    let addr = frame.pop()?.as_ptr()?;
                    let scalar = self.host.memory().read_kind(addr, *kind)?;
                    frame.push(Value::from_scalar(scalar));
                }
                Instr::StoreNative(kind) => {
                    let value = frame.pop()?.to_scalar()?;
                    let addr = frame.pop()?.as_ptr()?;
                    self.host.memory_mut().write_kind(addr, *kind, value)?;
                }
                Instr::StackAlloc => {
                    let size = frame.pop()?.as_i64()?.max(0) as usize;
                    let addr = self.host.memory_mut().stack_alloc(size);
                    frame.push(Value::Ptr(addr));
                }
                Instr::BlockCopy => {
                    let len = frame.pop()?.as_i64()?.max(0) as usize;
                    let src = frame.pop()?;
                    let dst = frame.pop()?;
                    self.block_copy(dst, src, len)?;
                }
                Instr::LoadIndirect => {
                    let value = match frame.pop()? {
                        Value::Ref(cell) => cell.borrow().clone(),
                        other => other,
                    };
                    frame.push(value);
                }
                Instr::StoreIndirect => {
                    let value = frame.pop()?.copy_record();
                    match frame.pop()? {
                        Value::Ref(cell) => *cell.borrow_mut() = value,
                        other => return Err(RuntimeError::mismatch("reference", other)),
                    }
                }

                Instr::Throw => {
                    let message = match frame.pop()? {
                        Value::Str(s) => s.to_string(),
                        other => format!("{:?}", other),
                    };
                    return Err(RuntimeError::Thrown(message));
                }
            }
        }
        Ok(Value::Null)
    }

    /// Type declaring static `field`, searching up from its owner; runs the
    /// declaring type's initializer
    fn static_owner(&mut self, field: &FieldRef) -> RuntimeResult<String> {
        let owner = self
            .lineage(&field.owner)
            .into_iter()
            .find(|ty| ty.field(&field.name).is_some())
            .map(|ty| ty.name.clone())
            .unwrap_or_else(|| field.owner.clone());
        self.ensure_init(&owner)?;
        Ok(owner)
    }
}
