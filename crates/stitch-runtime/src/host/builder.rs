//! Descriptor builders
//!
//! Lays native types and function parameter buffers out the way the host
//! would: members in declaration order at their natural alignment,
//! consecutive packed booleans sharing one byte, the return value last.

use stitch_sdk::metadata::RETURN_VALUE;
use stitch_sdk::{
    LayoutBuilder, NativeFunctionDesc, NativeKind, NativePropertyDesc, NativeTypeDesc, NativeTypeKind,
};

use super::layout::{map_stride, map_value_offset, natural_align, BINDING_SIZE, HEADER_SIZE, NAME_SIZE, POINTER_SIZE};

/// Native shape of a property or parameter
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Primitive
    Scalar(NativeKind),
    /// String header
    String,
    /// Text header
    Text,
    /// Interned name
    Name,
    /// Object, interface or class reference
    Object,
    /// Single-cast delegate binding
    Delegate,
    /// Multi-cast delegate binding list
    MulticastDelegate,
    /// Inline record
    Record {
        /// Native type name
        name: String,
        /// Size in bytes
        size: u32,
        /// Alignment
        align: u32,
    },
    /// Dynamic array
    Array(Box<Shape>),
    /// Set
    Set(Box<Shape>),
    /// Map
    Map(Box<Shape>, Box<Shape>),
    /// Optional value
    Optional(Box<Shape>),
    /// Inline fixed-size array
    FixedArray(Box<Shape>, u32),
}

impl Shape {
    /// Inline record described by `desc`
    pub fn record(desc: &NativeTypeDesc) -> Self {
        let align = desc
            .properties
            .iter()
            .map(|p| natural_align(p.size))
            .max()
            .unwrap_or(1);
        Self::Record {
            name: desc.name.clone(),
            size: desc.size,
            align,
        }
    }

    /// Dynamic array of `element`
    pub fn array(element: Shape) -> Self {
        Self::Array(Box::new(element))
    }

    /// Set of `element`
    pub fn set(element: Shape) -> Self {
        Self::Set(Box::new(element))
    }

    /// Map from `key` to `value`
    pub fn map(key: Shape, value: Shape) -> Self {
        Self::Map(Box::new(key), Box::new(value))
    }

    /// Optional `inner`
    pub fn optional(inner: Shape) -> Self {
        Self::Optional(Box::new(inner))
    }

    /// `len` inline `element`s
    pub fn fixed_array(element: Shape, len: u32) -> Self {
        Self::FixedArray(Box::new(element), len)
    }

    /// Size in bytes
    pub fn size(&self) -> u32 {
        match self {
            Self::Scalar(kind) => kind.size(),
            Self::String | Self::Text | Self::Array(_) | Self::Set(_) | Self::Map(..) => HEADER_SIZE,
            Self::MulticastDelegate => HEADER_SIZE,
            Self::Name => NAME_SIZE,
            Self::Object => POINTER_SIZE,
            Self::Delegate => BINDING_SIZE,
            Self::Record { size, .. } => *size,
            Self::Optional(inner) => stitch_sdk::align_up(inner.size() + 1, inner.align()),
            Self::FixedArray(element, len) => element.size() * len,
        }
    }

    /// Alignment
    pub fn align(&self) -> u32 {
        match self {
            Self::Scalar(kind) => kind.align(),
            Self::Record { align, .. } => *align,
            Self::Optional(inner) | Self::FixedArray(inner, _) => inner.align(),
            _ => 8,
        }
    }

    fn type_name(&self) -> String {
        match self {
            Self::Scalar(kind) => kind.to_string(),
            Self::String => "string".into(),
            Self::Text => "text".into(),
            Self::Name => "name".into(),
            Self::Object => "object".into(),
            Self::Delegate => "delegate".into(),
            Self::MulticastDelegate => "multicast delegate".into(),
            Self::Record { name, .. } => name.clone(),
            Self::Array(e) => format!("array<{}>", e.type_name()),
            Self::Set(e) => format!("set<{}>", e.type_name()),
            Self::Map(k, v) => format!("map<{}, {}>", k.type_name(), v.type_name()),
            Self::Optional(e) => format!("optional<{}>", e.type_name()),
            Self::FixedArray(e, n) => format!("{}[{}]", e.type_name(), n),
        }
    }

    /// Descriptor of a member of this shape placed at `offset`
    pub fn describe(&self, name: &str, offset: u32) -> NativePropertyDesc {
        let mut desc = NativePropertyDesc::new(name, offset, self.size());
        desc.type_name = self.type_name();
        desc.inner = match self {
            Self::Array(e) | Self::Set(e) | Self::Optional(e) | Self::FixedArray(e, _) => {
                vec![e.describe("Element", 0)]
            }
            Self::Map(k, v) => {
                let key = k.describe("Key", 0);
                let value = v.describe("Value", map_value_offset(k.size(), v.size()));
                vec![key, value]
            }
            _ => Vec::new(),
        };
        desc
    }
}

/// Stride of a map's entries as laid out by [`Shape::describe`]
pub fn entry_stride(map: &NativePropertyDesc) -> Option<u32> {
    match map.inner.as_slice() {
        [key, value] => Some(map_stride(key, value)),
        _ => None,
    }
}

// ============================================================================
// Types
// ============================================================================

/// Builds one native type descriptor
#[derive(Debug, Clone)]
pub struct NativeTypeBuilder {
    desc: NativeTypeDesc,
    layout: LayoutBuilder,
    /// Offset and next free bit of the open bitfield byte
    bits: Option<(u32, u8)>,
}

impl NativeTypeBuilder {
    /// Start a type of `kind`
    pub fn new(name: impl Into<String>, kind: NativeTypeKind) -> Self {
        Self {
            desc: NativeTypeDesc {
                name: name.into(),
                kind,
                super_name: None,
                size: 0,
                properties: Vec::new(),
                functions: Vec::new(),
            },
            layout: LayoutBuilder::new(),
            bits: None,
        }
    }

    /// Start a class
    pub fn class(name: impl Into<String>) -> Self {
        Self::new(name, NativeTypeKind::Class)
    }

    /// Start a record
    pub fn structure(name: impl Into<String>) -> Self {
        Self::new(name, NativeTypeKind::Struct)
    }

    /// Start an interface
    pub fn interface(name: impl Into<String>) -> Self {
        Self::new(name, NativeTypeKind::Interface)
    }

    /// A callable signature; `signature` describes its parameter buffer
    pub fn delegate(name: impl Into<String>, signature: NativeFunctionDesc) -> NativeTypeDesc {
        let mut builder = Self::new(name, NativeTypeKind::Delegate);
        builder.desc.functions.push(signature);
        builder.build()
    }

    /// Derive from `parent`; own properties start after the parent's
    pub fn extends(mut self, parent: &NativeTypeDesc) -> Self {
        self.desc.super_name = Some(parent.name.clone());
        self.layout.push(parent.size, natural_align(parent.size));
        self
    }

    /// Add a property
    pub fn property(mut self, name: &str, shape: Shape) -> Self {
        self.bits = None;
        let offset = self.layout.push(shape.size(), shape.align());
        self.desc.properties.push(shape.describe(name, offset));
        self
    }

    /// Add a packed boolean, sharing the previous one's byte while bits
    /// remain
    pub fn bitfield(mut self, name: &str) -> Self {
        let (offset, bit) = match self.bits {
            Some((offset, bit)) if bit < 8 => (offset, bit),
            _ => (self.layout.push(1, 1), 0),
        };
        self.bits = Some((offset, bit + 1));
        let mut desc = NativePropertyDesc::new(name, offset, 1);
        desc.type_name = "bool:1".into();
        desc.bit_mask = Some(1u8 << bit);
        self.desc.properties.push(desc);
        self
    }

    /// Add a function
    pub fn function(mut self, function: NativeFunctionDesc) -> Self {
        self.desc.functions.push(function);
        self
    }

    /// Finish the descriptor
    pub fn build(mut self) -> NativeTypeDesc {
        self.desc.size = self.layout.finish();
        self.desc
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Builds one native function descriptor
#[derive(Debug, Clone)]
pub struct FunctionBuilder {
    desc: NativeFunctionDesc,
    layout: LayoutBuilder,
    ret: Option<Shape>,
}

impl FunctionBuilder {
    /// Start a function
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            desc: NativeFunctionDesc {
                name: name.into(),
                params_size: 0,
                params: Vec::new(),
                flags: 0,
            },
            layout: LayoutBuilder::new(),
            ret: None,
        }
    }

    /// Add a parameter
    pub fn param(mut self, name: &str, shape: Shape) -> Self {
        let offset = self.layout.push(shape.size(), shape.align());
        self.desc.params.push(shape.describe(name, offset));
        self
    }

    /// Set the return value
    pub fn returns(mut self, shape: Shape) -> Self {
        self.ret = Some(shape);
        self
    }

    /// Add `FUNC_*` flags
    pub fn flags(mut self, flags: u32) -> Self {
        self.desc.flags |= flags;
        self
    }

    /// Finish the descriptor
    pub fn build(mut self) -> NativeFunctionDesc {
        if let Some(shape) = self.ret.take() {
            let offset = self.layout.push(shape.size(), shape.align());
            self.desc.params.push(shape.describe(RETURN_VALUE, offset));
        }
        self.desc.params_size = self.layout.finish();
        self.desc
    }
}
