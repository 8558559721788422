//! Block copies of blittable records
//!
//! A blittable record's managed fields are laid out exactly like its native
//! counterpart, so `BlockCopy` between a record object and native memory is
//! a field-by-field transfer at the natural-layout offsets.

use stitch_bytecode::TypeSig;
use stitch_sdk::{LayoutBuilder, NativeKind};

use super::Interpreter;
use crate::error::{RuntimeError, RuntimeResult};
use crate::value::{ObjRef, Value};

enum Slot {
    Scalar(NativeKind),
    Record(String),
}

struct Layout {
    size: u32,
    align: u32,
    fields: Vec<(String, Slot, u32)>,
}

impl Interpreter {
    fn record_layout(&self, name: &str) -> RuntimeResult<Layout> {
        let ty = self
            .types
            .get(name)
            .ok_or_else(|| RuntimeError::UnknownType(name.to_string()))?
            .clone();
        let mut builder = LayoutBuilder::new();
        let mut fields = Vec::new();
        for field in ty.fields.iter().filter(|f| !f.is_static) {
            let (slot, size, align) = match &field.ty {
                TypeSig::Struct(inner) => {
                    let layout = self.record_layout(inner)?;
                    (Slot::Record(inner.clone()), layout.size, layout.align)
                }
                TypeSig::Enum(e) => {
                    let kind = self.enum_kind(e)?;
                    (Slot::Scalar(kind), kind.size(), kind.align())
                }
                sig => {
                    let kind = sig
                        .native_kind()
                        .ok_or_else(|| RuntimeError::mismatch("blittable field", sig))?;
                    (Slot::Scalar(kind), kind.size(), kind.align())
                }
            };
            let offset = builder.push(size, align);
            fields.push((field.name.clone(), slot, offset));
        }
        Ok(Layout {
            size: builder.finish(),
            align: builder.align(),
            fields,
        })
    }

    fn enum_kind(&self, name: &str) -> RuntimeResult<NativeKind> {
        self.types
            .get(name)
            .and_then(|ty| ty.underlying.as_ref())
            .and_then(TypeSig::native_kind)
            .ok_or_else(|| RuntimeError::UnknownType(name.to_string()))
    }

    /// Write `record` to `addr`
    fn store_record(&mut self, addr: u64, record: &ObjRef) -> RuntimeResult<()> {
        let class = record.borrow().class.clone();
        for (name, slot, offset) in self.record_layout(&class)?.fields {
            let value = record.borrow().get(&name);
            let at = addr + offset as u64;
            match slot {
                Slot::Scalar(kind) => {
                    let scalar = value.to_scalar()?;
                    self.host.memory_mut().write_kind(at, kind, scalar)?;
                }
                Slot::Record(inner) => match value {
                    Value::Object(nested) => self.store_record(at, &nested)?,
                    _ => {
                        let size = self.record_layout(&inner)?.size;
                        self.host.memory_mut().zero(at, size as usize)?;
                    }
                },
            }
        }
        Ok(())
    }

    /// Overwrite the fields of `record` from `addr`
    fn load_record(&mut self, addr: u64, record: &ObjRef) -> RuntimeResult<()> {
        let class = record.borrow().class.clone();
        for (name, slot, offset) in self.record_layout(&class)?.fields {
            let at = addr + offset as u64;
            let value = match slot {
                Slot::Scalar(kind) => Value::from_scalar(self.host.memory().read_kind(at, kind)?),
                Slot::Record(inner) => {
                    let nested = self.instantiate(&inner)?;
                    self.load_record(at, &nested)?;
                    Value::Object(nested)
                }
            };
            record.borrow_mut().fields.insert(name, value);
        }
        Ok(())
    }

    /// `BlockCopy` of `len` bytes; either side may be a record object
    pub(crate) fn block_copy(&mut self, dst: Value, src: Value, len: usize) -> RuntimeResult<()> {
        match (dst, src) {
            (Value::Object(record), src) => self.load_record(src.as_ptr()?, &record),
            (dst, Value::Object(record)) => self.store_record(dst.as_ptr()?, &record),
            (dst, src) => self.host.memory_mut().copy(dst.as_ptr()?, src.as_ptr()?, len),
        }
    }
}
