//! Managed type signatures

use std::fmt;

use stitch_sdk::NativeKind;

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};

/// The declared managed type of a field, property, parameter or return value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSig {
    /// No value
    Void,
    /// Boolean
    Bool,
    /// Signed 8-bit integer
    I8,
    /// Unsigned 8-bit integer
    U8,
    /// Signed 16-bit integer
    I16,
    /// Unsigned 16-bit integer
    U16,
    /// Signed 32-bit integer
    I32,
    /// Unsigned 32-bit integer
    U32,
    /// Signed 64-bit integer
    I64,
    /// Unsigned 64-bit integer
    U64,
    /// 32-bit float
    F32,
    /// 64-bit float
    F64,
    /// Native pointer
    IntPtr,
    /// String
    String,
    /// Localized text
    Text,
    /// Interned name
    Name,
    /// Class instance
    Object(String),
    /// Value record
    Struct(String),
    /// Enumeration
    Enum(String),
    /// Interface reference
    Interface(String),
    /// Callable reference
    Delegate(String),
    /// Owning object reference
    StrongRef(String),
    /// Weak object reference
    WeakRef(String),
    /// Soft object reference
    SoftRef(String),
    /// Class reference
    ClassRef(String),
    /// Soft class reference
    SoftClassRef(String),
    /// Dynamic array
    Array(Box<TypeSig>),
    /// Inline fixed-size array
    FixedArray(Box<TypeSig>, u32),
    /// Map
    Map(Box<TypeSig>, Box<TypeSig>),
    /// Set
    Set(Box<TypeSig>),
    /// Optional value
    Optional(Box<TypeSig>),
}

mod tag {
    pub const VOID: u8 = 0x00;
    pub const BOOL: u8 = 0x01;
    pub const I8: u8 = 0x02;
    pub const U8: u8 = 0x03;
    pub const I16: u8 = 0x04;
    pub const U16: u8 = 0x05;
    pub const I32: u8 = 0x06;
    pub const U32: u8 = 0x07;
    pub const I64: u8 = 0x08;
    pub const U64: u8 = 0x09;
    pub const F32: u8 = 0x0A;
    pub const F64: u8 = 0x0B;
    pub const INTPTR: u8 = 0x0C;
    pub const STRING: u8 = 0x10;
    pub const TEXT: u8 = 0x11;
    pub const NAME: u8 = 0x12;
    pub const OBJECT: u8 = 0x20;
    pub const STRUCT: u8 = 0x21;
    pub const ENUM: u8 = 0x22;
    pub const INTERFACE: u8 = 0x23;
    pub const DELEGATE: u8 = 0x24;
    pub const STRONG_REF: u8 = 0x25;
    pub const WEAK_REF: u8 = 0x26;
    pub const SOFT_REF: u8 = 0x27;
    pub const CLASS_REF: u8 = 0x28;
    pub const SOFT_CLASS_REF: u8 = 0x29;
    pub const ARRAY: u8 = 0x30;
    pub const FIXED_ARRAY: u8 = 0x31;
    pub const MAP: u8 = 0x32;
    pub const SET: u8 = 0x33;
    pub const OPTIONAL: u8 = 0x34;
}

impl TypeSig {
    /// Native kind of a primitive signature
    pub fn native_kind(&self) -> Option<NativeKind> {
        Some(match self {
            Self::Bool => NativeKind::Bool,
            Self::I8 => NativeKind::I8,
            Self::U8 => NativeKind::U8,
            Self::I16 => NativeKind::I16,
            Self::U16 => NativeKind::U16,
            Self::I32 => NativeKind::I32,
            Self::U32 => NativeKind::U32,
            Self::I64 => NativeKind::I64,
            Self::U64 => NativeKind::U64,
            Self::F32 => NativeKind::F32,
            Self::F64 => NativeKind::F64,
            Self::IntPtr => NativeKind::Ptr,
            _ => return None,
        })
    }

    /// Signature of a primitive native kind
    pub fn from_native_kind(kind: NativeKind) -> Self {
        match kind {
            NativeKind::Bool => Self::Bool,
            NativeKind::I8 => Self::I8,
            NativeKind::U8 => Self::U8,
            NativeKind::I16 => Self::I16,
            NativeKind::U16 => Self::U16,
            NativeKind::I32 => Self::I32,
            NativeKind::U32 => Self::U32,
            NativeKind::I64 => Self::I64,
            NativeKind::U64 => Self::U64,
            NativeKind::F32 => Self::F32,
            NativeKind::F64 => Self::F64,
            NativeKind::Ptr => Self::IntPtr,
        }
    }

    /// Whether this is `Void`
    pub fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }

    /// Name of the declared type this signature refers to, if any
    pub fn type_name(&self) -> Option<&str> {
        match self {
            Self::Object(n)
            | Self::Struct(n)
            | Self::Enum(n)
            | Self::Interface(n)
            | Self::Delegate(n)
            | Self::StrongRef(n)
            | Self::WeakRef(n)
            | Self::SoftRef(n)
            | Self::ClassRef(n)
            | Self::SoftClassRef(n) => Some(n),
            _ => None,
        }
    }

    /// Element signatures of a container
    pub fn elements(&self) -> Vec<&TypeSig> {
        match self {
            Self::Array(e) | Self::Set(e) | Self::Optional(e) | Self::FixedArray(e, _) => {
                vec![e.as_ref()]
            }
            Self::Map(k, v) => vec![k.as_ref(), v.as_ref()],
            _ => Vec::new(),
        }
    }

    /// Every declared type referenced by this signature, containers included
    pub fn referenced_types(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_types(&mut out);
        out
    }

    fn collect_types<'a>(&'a self, out: &mut Vec<&'a str>) {
        if let Some(name) = self.type_name() {
            out.push(name);
        }
        for element in self.elements() {
            element.collect_types(out);
        }
    }

    /// Encode to binary
    pub fn encode(&self, writer: &mut BytecodeWriter) {
        let named = |writer: &mut BytecodeWriter, t: u8, name: &str| {
            writer.emit_u8(t);
            writer.emit_string(name);
        };
        match self {
            Self::Void => writer.emit_u8(tag::VOID),
            Self::Bool => writer.emit_u8(tag::BOOL),
            Self::I8 => writer.emit_u8(tag::I8),
            Self::U8 => writer.emit_u8(tag::U8),
            Self::I16 => writer.emit_u8(tag::I16),
            Self::U16 => writer.emit_u8(tag::U16),
            Self::I32 => writer.emit_u8(tag::I32),
            Self::U32 => writer.emit_u8(tag::U32),
            Self::I64 => writer.emit_u8(tag::I64),
            Self::U64 => writer.emit_u8(tag::U64),
            Self::F32 => writer.emit_u8(tag::F32),
            Self::F64 => writer.emit_u8(tag::F64),
            Self::IntPtr => writer.emit_u8(tag::INTPTR),
            Self::String => writer.emit_u8(tag::STRING),
            Self::Text => writer.emit_u8(tag::TEXT),
            Self::Name => writer.emit_u8(tag::NAME),
            Self::Object(n) => named(writer, tag::OBJECT, n),
            Self::Struct(n) => named(writer, tag::STRUCT, n),
            Self::Enum(n) => named(writer, tag::ENUM, n),
            Self::Interface(n) => named(writer, tag::INTERFACE, n),
            Self::Delegate(n) => named(writer, tag::DELEGATE, n),
            Self::StrongRef(n) => named(writer, tag::STRONG_REF, n),
            Self::WeakRef(n) => named(writer, tag::WEAK_REF, n),
            Self::SoftRef(n) => named(writer, tag::SOFT_REF, n),
            Self::ClassRef(n) => named(writer, tag::CLASS_REF, n),
            Self::SoftClassRef(n) => named(writer, tag::SOFT_CLASS_REF, n),
            Self::Array(e) => {
                writer.emit_u8(tag::ARRAY);
                e.encode(writer);
            }
            Self::FixedArray(e, n) => {
                writer.emit_u8(tag::FIXED_ARRAY);
                e.encode(writer);
                writer.emit_u32(*n);
            }
            Self::Map(k, v) => {
                writer.emit_u8(tag::MAP);
                k.encode(writer);
                v.encode(writer);
            }
            Self::Set(e) => {
                writer.emit_u8(tag::SET);
                e.encode(writer);
            }
            Self::Optional(e) => {
                writer.emit_u8(tag::OPTIONAL);
                e.encode(writer);
            }
        }
    }

    /// Decode from binary
    pub fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let offset = reader.position();
        let t = reader.read_u8()?;
        let boxed = |reader: &mut BytecodeReader<'_>| Self::decode(reader).map(Box::new);
        Ok(match t {
            tag::VOID => Self::Void,
            tag::BOOL => Self::Bool,
            tag::I8 => Self::I8,
            tag::U8 => Self::U8,
            tag::I16 => Self::I16,
            tag::U16 => Self::U16,
            tag::I32 => Self::I32,
            tag::U32 => Self::U32,
            tag::I64 => Self::I64,
            tag::U64 => Self::U64,
            tag::F32 => Self::F32,
            tag::F64 => Self::F64,
            tag::INTPTR => Self::IntPtr,
            tag::STRING => Self::String,
            tag::TEXT => Self::Text,
            tag::NAME => Self::Name,
            tag::OBJECT => Self::Object(reader.read_string()?),
            tag::STRUCT => Self::Struct(reader.read_string()?),
            tag::ENUM => Self::Enum(reader.read_string()?),
            tag::INTERFACE => Self::Interface(reader.read_string()?),
            tag::DELEGATE => Self::Delegate(reader.read_string()?),
            tag::STRONG_REF => Self::StrongRef(reader.read_string()?),
            tag::WEAK_REF => Self::WeakRef(reader.read_string()?),
            tag::SOFT_REF => Self::SoftRef(reader.read_string()?),
            tag::CLASS_REF => Self::ClassRef(reader.read_string()?),
            tag::SOFT_CLASS_REF => Self::SoftClassRef(reader.read_string()?),
            tag::ARRAY => Self::Array(boxed(reader)?),
            tag::FIXED_ARRAY => {
                let element = boxed(reader)?;
                Self::FixedArray(element, reader.read_u32()?)
            }
            tag::MAP => {
                let key = boxed(reader)?;
                Self::Map(key, boxed(reader)?)
            }
            tag::SET => Self::Set(boxed(reader)?),
            tag::OPTIONAL => Self::Optional(boxed(reader)?),
            other => {
                return Err(DecodeError::InvalidTag {
                    what: "type signature",
                    tag: other,
                    offset,
                })
            }
        })
    }
}

impl fmt::Display for TypeSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => f.write_str("void"),
            Self::Bool => f.write_str("bool"),
            Self::I8 => f.write_str("i8"),
            Self::U8 => f.write_str("u8"),
            Self::I16 => f.write_str("i16"),
            Self::U16 => f.write_str("u16"),
            Self::I32 => f.write_str("i32"),
            Self::U32 => f.write_str("u32"),
            Self::I64 => f.write_str("i64"),
            Self::U64 => f.write_str("u64"),
            Self::F32 => f.write_str("f32"),
            Self::F64 => f.write_str("f64"),
            Self::IntPtr => f.write_str("intptr"),
            Self::String => f.write_str("string"),
            Self::Text => f.write_str("text"),
            Self::Name => f.write_str("name"),
            Self::Object(n) => write!(f, "{}", n),
            Self::Struct(n) => write!(f, "struct {}", n),
            Self::Enum(n) => write!(f, "enum {}", n),
            Self::Interface(n) => write!(f, "interface {}", n),
            Self::Delegate(n) => write!(f, "delegate {}", n),
            Self::StrongRef(n) => write!(f, "strong<{}>", n),
            Self::WeakRef(n) => write!(f, "weak<{}>", n),
            Self::SoftRef(n) => write!(f, "soft<{}>", n),
            Self::ClassRef(n) => write!(f, "class<{}>", n),
            Self::SoftClassRef(n) => write!(f, "softclass<{}>", n),
            Self::Array(e) => write!(f, "array<{}>", e),
            Self::FixedArray(e, n) => write!(f, "{}[{}]", e, n),
            Self::Map(k, v) => write!(f, "map<{}, {}>", k, v),
            Self::Set(e) => write!(f, "set<{}>", e),
            Self::Optional(e) => write!(f, "optional<{}>", e),
        }
    }
}
