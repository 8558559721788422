//! Container marshallers
//!
//! A marshaller is created by woven code with the container's property
//! descriptor and one converter pair per element type, then cached.
//! Reading a container always materializes a managed copy; writing
//! replaces the native contents, releasing what was there before.

use std::rc::Rc;

use stitch_bytecode::{simple_name, MethodRef};
use stitch_sdk::helpers::{HelperType, DESTRUCT_INSTANCE};
use stitch_sdk::{NativeKind, NativePropertyDesc};

use super::Interpreter;
use crate::error::{RuntimeError, RuntimeResult};
use crate::host::layout::map_stride;
use crate::memory::Scalar;
use crate::value::Value;

/// Container category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// Dynamic array
    Array,
    /// Set
    Set,
    /// Map
    Map,
    /// Optional value
    Optional,
    /// Inline fixed-size array
    FixedArray,
}

impl ContainerKind {
    /// Kind and copying flag of a container helper type
    pub fn of(ty: HelperType) -> Option<(Self, bool)> {
        Some(match ty {
            HelperType::ArrayMarshaller => (Self::Array, false),
            HelperType::ArrayCopyMarshaller => (Self::Array, true),
            HelperType::SetMarshaller => (Self::Set, false),
            HelperType::SetCopyMarshaller => (Self::Set, true),
            HelperType::MapMarshaller => (Self::Map, false),
            HelperType::MapCopyMarshaller => (Self::Map, true),
            HelperType::OptionalMarshaller => (Self::Optional, false),
            HelperType::OptionalCopyMarshaller => (Self::Optional, true),
            HelperType::FixedArrayMarshaller => (Self::FixedArray, false),
            _ => return None,
        })
    }

    fn element_count(self) -> usize {
        if self == Self::Map {
            2
        } else {
            1
        }
    }
}

/// Converter pair of one element type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Converters {
    /// Managed to native
    pub to_native: MethodRef,
    /// Native to managed
    pub from_native: MethodRef,
}

impl Converters {
    /// Cleanup of elements that own native storage
    fn destruct(&self) -> Option<MethodRef> {
        let ty = HelperType::from_simple_name(simple_name(&self.to_native.owner))?;
        matches!(ty, HelperType::StringMarshaller | HelperType::TextMarshaller)
            .then(|| MethodRef::new(self.to_native.owner.as_str(), DESTRUCT_INSTANCE, 1))
    }
}

/// A container marshaller instance
#[derive(Debug, Clone)]
pub struct Marshaller {
    /// Category
    pub kind: ContainerKind,
    /// Whether it was created for a stack-scoped buffer
    pub copying: bool,
    /// Container property descriptor
    pub property: NativePropertyDesc,
    /// Element count of a fixed array
    pub len: u32,
    /// Element converters in descriptor order
    pub elements: Vec<Converters>,
}

impl Marshaller {
    /// Build from constructor arguments: property descriptor, fixed length
    /// (fixed arrays only), then one (to, from) function pair per element
    pub fn new(
        kind: ContainerKind,
        copying: bool,
        property: NativePropertyDesc,
        args: &[Value],
    ) -> RuntimeResult<Self> {
        let (len, rest) = if kind == ContainerKind::FixedArray {
            let (len, rest) = args
                .split_first()
                .ok_or_else(|| RuntimeError::mismatch("fixed array length", args))?;
            (len.as_i64()?.max(0) as u32, rest)
        } else {
            (0, args)
        };
        if rest.len() != kind.element_count() * 2 || property.inner.len() < kind.element_count() {
            return Err(RuntimeError::mismatch("element converters", rest));
        }
        let function = |value: &Value| match value {
            Value::Function(m) => Ok(m.clone()),
            other => Err(RuntimeError::mismatch("function", other)),
        };
        let elements = rest
            .chunks(2)
            .map(|pair| {
                Ok(Converters {
                    to_native: function(&pair[0])?,
                    from_native: function(&pair[1])?,
                })
            })
            .collect::<RuntimeResult<Vec<_>>>()?;
        Ok(Self {
            kind,
            copying,
            property,
            len,
            elements,
        })
    }

    /// Short name for diagnostics
    pub fn kind_name(&self) -> &'static str {
        match (self.kind, self.copying) {
            (ContainerKind::Array, false) => "array",
            (ContainerKind::Array, true) => "array copy",
            (ContainerKind::Set, false) => "set",
            (ContainerKind::Set, true) => "set copy",
            (ContainerKind::Map, false) => "map",
            (ContainerKind::Map, true) => "map copy",
            (ContainerKind::Optional, false) => "optional",
            (ContainerKind::Optional, true) => "optional copy",
            (ContainerKind::FixedArray, _) => "fixed array",
        }
    }

    fn element(&self, i: usize) -> (&NativePropertyDesc, &Converters) {
        (&self.property.inner[i], &self.elements[i])
    }

    fn stride(&self) -> u32 {
        match self.kind {
            ContainerKind::Map => map_stride(&self.property.inner[0], &self.property.inner[1]),
            _ => self.property.inner[0].size,
        }
    }
}

fn items(value: &Value, dedupe: bool) -> RuntimeResult<Vec<Value>> {
    let all = match value {
        Value::Null => Vec::new(),
        Value::List(list) => list.borrow().clone(),
        other => return Err(RuntimeError::mismatch("list", other)),
    };
    if !dedupe {
        return Ok(all);
    }
    let mut unique: Vec<Value> = Vec::with_capacity(all.len());
    for item in all {
        if !unique.contains(&item) {
            unique.push(item);
        }
    }
    Ok(unique)
}

fn entries(value: &Value) -> RuntimeResult<Vec<(Value, Value)>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Map(map) => Ok(map.borrow().clone()),
        other => Err(RuntimeError::mismatch("map", other)),
    }
}

impl Interpreter {
    fn element_from(&mut self, conv: &Converters, addr: u64) -> RuntimeResult<Value> {
        Ok(self
            .call(&conv.from_native, vec![Value::Ptr(addr)], false)?
            .unwrap_or_default())
    }

    fn element_to(&mut self, conv: &Converters, addr: u64, value: Value) -> RuntimeResult<()> {
        self.call(&conv.to_native, vec![Value::Ptr(addr), value], false)?;
        Ok(())
    }

    fn element_destruct(&mut self, conv: &Converters, addr: u64) -> RuntimeResult<()> {
        if let Some(destruct) = conv.destruct() {
            self.call(&destruct, vec![Value::Ptr(addr)], false)?;
        }
        Ok(())
    }

    /// Managed copy of the container at `addr`
    pub(crate) fn container_from_native(&mut self, m: &Rc<Marshaller>, addr: u64) -> RuntimeResult<Value> {
        let stride = m.stride();
        match m.kind {
            ContainerKind::Array | ContainerKind::Set => {
                let (_, conv) = m.element(0);
                let mut out = Vec::new();
                for element in self.host.array_elements(addr, stride)? {
                    out.push(self.element_from(conv, element)?);
                }
                Ok(Value::list(out))
            }
            ContainerKind::Map => {
                let (_, key) = m.element(0);
                let (value_desc, value) = m.element(1);
                let mut out = Vec::new();
                for entry in self.host.array_elements(addr, stride)? {
                    let k = self.element_from(key, entry)?;
                    let v = self.element_from(value, entry + value_desc.offset as u64)?;
                    out.push((k, v));
                }
                Ok(Value::map(out))
            }
            ContainerKind::Optional => {
                let (desc, conv) = m.element(0);
                let flag = self.host.memory().read_kind(addr + desc.size as u64, NativeKind::U8)?;
                if flag.as_i64() == 0 {
                    Ok(Value::Null)
                } else {
                    self.element_from(conv, addr)
                }
            }
            ContainerKind::FixedArray => {
                let (_, conv) = m.element(0);
                let mut out = Vec::with_capacity(m.len as usize);
                for i in 0..m.len {
                    out.push(self.element_from(conv, addr + (i * stride) as u64)?);
                }
                Ok(Value::list(out))
            }
        }
    }

    /// Replace the container at `addr` with `value`
    pub(crate) fn container_to_native(&mut self, m: &Rc<Marshaller>, addr: u64, value: &Value) -> RuntimeResult<()> {
        let stride = m.stride();
        match m.kind {
            ContainerKind::Array | ContainerKind::Set => {
                let values = items(value, m.kind == ContainerKind::Set)?;
                self.container_destruct(m, addr)?;
                let data = self.host.resize_array(addr, values.len() as u32, stride)?;
                let (_, conv) = m.element(0);
                for (i, item) in values.into_iter().enumerate() {
                    self.element_to(conv, data + (i as u64) * stride as u64, item)?;
                }
            }
            ContainerKind::Map => {
                let values = entries(value)?;
                self.container_destruct(m, addr)?;
                let data = self.host.resize_array(addr, values.len() as u32, stride)?;
                let (_, key) = m.element(0);
                let (value_desc, val) = m.element(1);
                for (i, (k, v)) in values.into_iter().enumerate() {
                    let entry = data + (i as u64) * stride as u64;
                    self.element_to(key, entry, k)?;
                    self.element_to(val, entry + value_desc.offset as u64, v)?;
                }
            }
            ContainerKind::Optional => {
                self.container_destruct(m, addr)?;
                let (desc, conv) = m.element(0);
                if *value != Value::Null {
                    self.element_to(conv, addr, value.clone())?;
                    self.host
                        .memory_mut()
                        .write_kind(addr + desc.size as u64, NativeKind::U8, Scalar::Int(1))?;
                }
            }
            ContainerKind::FixedArray => {
                let values = items(value, false)?;
                let (desc, conv) = m.element(0);
                for i in 0..m.len {
                    let at = addr + (i * stride) as u64;
                    match values.get(i as usize) {
                        Some(item) => self.element_to(conv, at, item.clone())?,
                        None => {
                            self.element_destruct(conv, at)?;
                            self.host.memory_mut().zero(at, desc.size as usize)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Release the native storage of the container at `addr`
    pub(crate) fn container_destruct(&mut self, m: &Rc<Marshaller>, addr: u64) -> RuntimeResult<()> {
        let stride = m.stride();
        match m.kind {
            ContainerKind::Array | ContainerKind::Set => {
                let (_, conv) = m.element(0);
                for element in self.host.array_elements(addr, stride)? {
                    self.element_destruct(conv, element)?;
                }
                self.host.free_array(addr)
            }
            ContainerKind::Map => {
                let (_, key) = m.element(0);
                let (value_desc, val) = m.element(1);
                for entry in self.host.array_elements(addr, stride)? {
                    self.element_destruct(key, entry)?;
                    self.element_destruct(val, entry + value_desc.offset as u64)?;
                }
                self.host.free_array(addr)
            }
            ContainerKind::Optional => {
                let (desc, conv) = m.element(0);
                let flag = addr + desc.size as u64;
                if self.host.memory().read_kind(flag, NativeKind::U8)?.as_i64() != 0 {
                    self.element_destruct(conv, addr)?;
                }
                self.host.memory_mut().zero(addr, desc.size as usize + 1)
            }
            ContainerKind::FixedArray => {
                let (_, conv) = m.element(0);
                for i in 0..m.len {
                    self.element_destruct(conv, addr + (i * stride) as u64)?;
                }
                Ok(())
            }
        }
    }
}
