//! Compiled module format
//!
//! A module is a set of declared types (classes, records, enums, interfaces,
//! callable signatures) with their fields, properties and methods, plus
//! descriptors of types it imports from already-processed modules.

use stitch_sdk::helpers::{CCTOR, CTOR};
use thiserror::Error;

use crate::code::{self, UndefinedLabel};
use crate::constants::ConstantPool;
use crate::debug::{DebugMap, DebugRow};
use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use crate::instr::{Instr, Label};
use crate::sig::TypeSig;

/// Magic number for stitch modules: "STCH"
pub const MAGIC: [u8; 4] = *b"STCH";

/// Current module format version
pub const VERSION: u32 = 1;

/// Size of the fixed header: magic, version, flags, checksum
pub const HEADER_SIZE: usize = 16;

/// Module encoding/decoding errors
#[derive(Debug, Error)]
pub enum ModuleError {
    /// Decode error
    #[error("Decode error: {0}")]
    DecodeError(#[from] DecodeError),

    /// Invalid magic number
    #[error("Invalid magic number: expected STCH, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported version
    #[error("Unsupported version: {0} (current: {VERSION})")]
    UnsupportedVersion(u32),

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Stored checksum
        expected: u32,
        /// Checksum of the payload as read
        actual: u32,
    },

    /// A method branches to a label it never places
    #[error("Method {method} branches to undefined label {label}")]
    UndefinedLabel {
        /// `Type::method`
        method: String,
        /// The missing label
        label: Label,
    },
}

/// Module flags
pub mod flags {
    /// The module has been processed by the weaver
    pub const WOVEN: u32 = 1 << 0;
    /// A companion debug map was produced for this module
    pub const HAS_DEBUG_MAP: u32 = 1 << 1;
}

// ============================================================================
// Attributes
// ============================================================================

/// Argument of a custom marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeArg {
    /// Integer argument
    Int(i64),
    /// String argument
    Str(String),
    /// Boolean argument
    Bool(bool),
}

/// A custom marker attached to a type or member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Marker name
    pub name: String,
    /// Positional arguments
    pub args: Vec<AttributeArg>,
}

impl Attribute {
    /// Marker without arguments
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Append a string argument
    pub fn with_str(mut self, value: impl Into<String>) -> Self {
        self.args.push(AttributeArg::Str(value.into()));
        self
    }

    /// Whether one of the arguments is the string `value`
    pub fn has_str_arg(&self, value: &str) -> bool {
        self.args
            .iter()
            .any(|a| matches!(a, AttributeArg::Str(s) if s == value))
    }

    /// First string argument
    pub fn first_str(&self) -> Option<&str> {
        self.args.iter().find_map(|a| match a {
            AttributeArg::Str(s) => Some(s.as_str()),
            _ => None,
        })
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.name);
        writer.emit_u32(self.args.len() as u32);
        for arg in &self.args {
            match arg {
                AttributeArg::Int(v) => {
                    writer.emit_u8(0);
                    writer.emit_i64(*v);
                }
                AttributeArg::Str(s) => {
                    writer.emit_u8(1);
                    writer.emit_string(s);
                }
                AttributeArg::Bool(b) => {
                    writer.emit_u8(2);
                    writer.emit_bool(*b);
                }
            }
        }
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let name = reader.read_string()?;
        let count = reader.read_u32()? as usize;
        let mut args = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            let offset = reader.position();
            args.push(match reader.read_u8()? {
                0 => AttributeArg::Int(reader.read_i64()?),
                1 => AttributeArg::Str(reader.read_string()?),
                2 => AttributeArg::Bool(reader.read_bool()?),
                tag => {
                    return Err(DecodeError::InvalidTag {
                        what: "attribute argument",
                        tag,
                        offset,
                    })
                }
            });
        }
        Ok(Self { name, args })
    }
}

/// Find a marker by name
pub fn find_attribute<'a>(attributes: &'a [Attribute], name: &str) -> Option<&'a Attribute> {
    attributes.iter().find(|a| a.name == name)
}

fn encode_attributes(attributes: &[Attribute], writer: &mut BytecodeWriter) {
    writer.emit_u32(attributes.len() as u32);
    for a in attributes {
        a.encode(writer);
    }
}

fn decode_attributes(reader: &mut BytecodeReader<'_>) -> Result<Vec<Attribute>, DecodeError> {
    let count = reader.read_u32()? as usize;
    (0..count).map(|_| Attribute::decode(reader)).collect()
}

// ============================================================================
// Members
// ============================================================================

/// Field definition
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Declared type
    pub ty: TypeSig,
    /// Type-level storage
    pub is_static: bool,
    /// Assignable only during construction
    pub is_readonly: bool,
    /// Not visible outside the declaring type
    pub is_private: bool,
    /// Custom markers
    pub attributes: Vec<Attribute>,
    /// Literal value (enum members)
    pub constant: Option<i64>,
}

impl FieldDef {
    /// Public instance field
    pub fn new(name: impl Into<String>, ty: TypeSig) -> Self {
        Self {
            name: name.into(),
            ty,
            is_static: false,
            is_readonly: false,
            is_private: false,
            attributes: Vec::new(),
            constant: None,
        }
    }

    /// Private static field
    pub fn private_static(name: impl Into<String>, ty: TypeSig) -> Self {
        Self {
            is_static: true,
            is_private: true,
            ..Self::new(name, ty)
        }
    }

    /// Whether the field carries the marker `name`
    pub fn has_attribute(&self, name: &str) -> bool {
        find_attribute(&self.attributes, name).is_some()
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.name);
        self.ty.encode(writer);
        let flags = self.is_static as u8 | (self.is_readonly as u8) << 1 | (self.is_private as u8) << 2;
        writer.emit_u8(flags);
        encode_attributes(&self.attributes, writer);
        match self.constant {
            Some(v) => {
                writer.emit_u8(1);
                writer.emit_i64(v);
            }
            None => writer.emit_u8(0),
        }
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let name = reader.read_string()?;
        let ty = TypeSig::decode(reader)?;
        let flags = reader.read_u8()?;
        let attributes = decode_attributes(reader)?;
        let constant = if reader.read_bool()? {
            Some(reader.read_i64()?)
        } else {
            None
        };
        Ok(Self {
            name,
            ty,
            is_static: flags & 1 != 0,
            is_readonly: flags & 2 != 0,
            is_private: flags & 4 != 0,
            attributes,
            constant,
        })
    }
}

/// Property definition; accessors are methods of the same type
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDef {
    /// Property name
    pub name: String,
    /// Declared type
    pub ty: TypeSig,
    /// Getter method name
    pub getter: Option<String>,
    /// Setter method name
    pub setter: Option<String>,
    /// Custom markers
    pub attributes: Vec<Attribute>,
}

impl PropertyDef {
    /// Property with conventional `get_`/`set_` accessors
    pub fn new(name: impl Into<String>, ty: TypeSig) -> Self {
        let name = name.into();
        Self {
            getter: Some(format!("get_{}", name)),
            setter: Some(format!("set_{}", name)),
            name,
            ty,
            attributes: Vec::new(),
        }
    }

    /// Whether the property carries the marker `name`
    pub fn has_attribute(&self, name: &str) -> bool {
        find_attribute(&self.attributes, name).is_some()
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.name);
        self.ty.encode(writer);
        writer.emit_opt_string(self.getter.as_deref());
        writer.emit_opt_string(self.setter.as_deref());
        encode_attributes(&self.attributes, writer);
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            name: reader.read_string()?,
            ty: TypeSig::decode(reader)?,
            getter: reader.read_opt_string()?,
            setter: reader.read_opt_string()?,
            attributes: decode_attributes(reader)?,
        })
    }
}

/// How a parameter is passed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamDirection {
    /// By value
    In,
    /// By reference, written by the callee only
    Out,
    /// By reference, read and written
    Ref,
}

/// Parameter definition
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDef {
    /// Parameter name
    pub name: String,
    /// Declared type
    pub ty: TypeSig,
    /// Passing mode
    pub direction: ParamDirection,
}

impl ParamDef {
    /// By-value parameter
    pub fn new(name: impl Into<String>, ty: TypeSig) -> Self {
        Self {
            name: name.into(),
            ty,
            direction: ParamDirection::In,
        }
    }

    /// Output parameter
    pub fn out(name: impl Into<String>, ty: TypeSig) -> Self {
        Self {
            direction: ParamDirection::Out,
            ..Self::new(name, ty)
        }
    }

    /// By-reference parameter
    pub fn by_ref(name: impl Into<String>, ty: TypeSig) -> Self {
        Self {
            direction: ParamDirection::Ref,
            ..Self::new(name, ty)
        }
    }
}

/// Method body: local slots and instructions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodBody {
    /// Local variable types
    pub locals: Vec<TypeSig>,
    /// Instruction list
    pub instrs: Vec<Instr>,
}

impl MethodBody {
    /// Body without locals
    pub fn new(instrs: Vec<Instr>) -> Self {
        Self {
            locals: Vec::new(),
            instrs,
        }
    }

    /// Allocate a local slot
    pub fn add_local(&mut self, ty: TypeSig) -> u16 {
        self.locals.push(ty);
        (self.locals.len() - 1) as u16
    }

    /// Smallest label id not used in the body
    pub fn next_label(&self) -> u32 {
        self.instrs
            .iter()
            .filter_map(|i| match i {
                Instr::Label(l) => Some(l.0),
                other => other.branch_target().map(|l| l.0),
            })
            .max()
            .map_or(0, |m| m + 1)
    }

    /// Instructions without markers
    pub fn executable(&self) -> impl Iterator<Item = &Instr> {
        self.instrs.iter().filter(|i| !i.is_marker())
    }
}

/// Method definition
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    /// Method name
    pub name: String,
    /// Parameters, `this` excluded
    pub params: Vec<ParamDef>,
    /// Return type
    pub ret: TypeSig,
    /// No `this` argument
    pub is_static: bool,
    /// Dispatched through the receiver's type
    pub is_virtual: bool,
    /// No implementation in this type
    pub is_abstract: bool,
    /// Not visible outside the declaring type
    pub is_private: bool,
    /// Custom markers
    pub attributes: Vec<Attribute>,
    /// Body; `None` for native stubs and abstract methods
    pub body: Option<MethodBody>,
}

impl MethodDef {
    /// Public instance method without body
    pub fn new(name: impl Into<String>, params: Vec<ParamDef>, ret: TypeSig) -> Self {
        Self {
            name: name.into(),
            params,
            ret,
            is_static: false,
            is_virtual: false,
            is_abstract: false,
            is_private: false,
            attributes: Vec::new(),
            body: None,
        }
    }

    /// Attach a body
    pub fn with_body(mut self, body: MethodBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Parameter count, `this` excluded
    pub fn arity(&self) -> u16 {
        self.params.len() as u16
    }

    /// Argument slots, `this` included
    pub fn arg_count(&self) -> usize {
        self.params.len() + usize::from(!self.is_static)
    }

    /// Argument index of parameter `i`
    pub fn arg_index(&self, i: usize) -> u16 {
        (i + usize::from(!self.is_static)) as u16
    }

    /// Whether this is an instance constructor
    pub fn is_constructor(&self) -> bool {
        self.name == CTOR && !self.is_static
    }

    /// Whether this is the static initializer
    pub fn is_static_initializer(&self) -> bool {
        self.name == CCTOR && self.is_static
    }

    /// Whether the method carries the marker `name`
    pub fn has_attribute(&self, name: &str) -> bool {
        find_attribute(&self.attributes, name).is_some()
    }

    /// Marker by name
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        find_attribute(&self.attributes, name)
    }

    fn encode(&self, owner: &str, writer: &mut BytecodeWriter) -> Result<(), ModuleError> {
        writer.emit_string(&self.name);
        writer.emit_u32(self.params.len() as u32);
        for p in &self.params {
            writer.emit_string(&p.name);
            p.ty.encode(writer);
            writer.emit_u8(match p.direction {
                ParamDirection::In => 0,
                ParamDirection::Out => 1,
                ParamDirection::Ref => 2,
            });
        }
        self.ret.encode(writer);
        let flags = self.is_static as u8
            | (self.is_virtual as u8) << 1
            | (self.is_abstract as u8) << 2
            | (self.is_private as u8) << 3;
        writer.emit_u8(flags);
        encode_attributes(&self.attributes, writer);

        match &self.body {
            None => writer.emit_u8(0),
            Some(body) => {
                writer.emit_u8(1);
                writer.emit_u32(body.locals.len() as u32);
                for l in &body.locals {
                    l.encode(writer);
                }
                let mut code = BytecodeWriter::new();
                code::encode_code(&body.instrs, &mut code).map_err(|UndefinedLabel(label)| {
                    ModuleError::UndefinedLabel {
                        method: format!("{}::{}", owner, self.name),
                        label,
                    }
                })?;
                writer.emit_u32(code.offset() as u32);
                writer.emit_bytes(code.buffer());
            }
        }
        Ok(())
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let name = reader.read_string()?;
        let param_count = reader.read_u32()? as usize;
        let mut params = Vec::with_capacity(param_count.min(256));
        for _ in 0..param_count {
            let name = reader.read_string()?;
            let ty = TypeSig::decode(reader)?;
            let offset = reader.position();
            let direction = match reader.read_u8()? {
                0 => ParamDirection::In,
                1 => ParamDirection::Out,
                2 => ParamDirection::Ref,
                tag => {
                    return Err(DecodeError::InvalidTag {
                        what: "parameter direction",
                        tag,
                        offset,
                    })
                }
            };
            params.push(ParamDef {
                name,
                ty,
                direction,
            });
        }
        let ret = TypeSig::decode(reader)?;
        let flags = reader.read_u8()?;
        let attributes = decode_attributes(reader)?;
        let body = if reader.read_bool()? {
            let local_count = reader.read_u32()? as usize;
            let locals = (0..local_count)
                .map(|_| TypeSig::decode(reader))
                .collect::<Result<Vec<_>, _>>()?;
            let code_len = reader.read_u32()? as usize;
            let code = reader.read_bytes(code_len)?;
            Some(MethodBody {
                locals,
                instrs: code::decode_code(&code)?,
            })
        } else {
            None
        };
        Ok(Self {
            name,
            params,
            ret,
            is_static: flags & 1 != 0,
            is_virtual: flags & 2 != 0,
            is_abstract: flags & 4 != 0,
            is_private: flags & 8 != 0,
            attributes,
            body,
        })
    }
}

// ============================================================================
// Types
// ============================================================================

/// Declared type category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Reference type
    Class,
    /// Value record
    Struct,
    /// Enumeration
    Enum,
    /// Interface
    Interface,
    /// Callable signature
    Delegate,
}

impl TypeKind {
    fn tag(self) -> u8 {
        match self {
            Self::Class => 0,
            Self::Struct => 1,
            Self::Enum => 2,
            Self::Interface => 3,
            Self::Delegate => 4,
        }
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let offset = reader.position();
        Ok(match reader.read_u8()? {
            0 => Self::Class,
            1 => Self::Struct,
            2 => Self::Enum,
            3 => Self::Interface,
            4 => Self::Delegate,
            tag => {
                return Err(DecodeError::InvalidTag {
                    what: "type kind",
                    tag,
                    offset,
                })
            }
        })
    }

    /// Lowercase keyword
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Struct => "struct",
            Self::Enum => "enum",
            Self::Interface => "interface",
            Self::Delegate => "delegate",
        }
    }
}

/// Declared type definition
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    /// Qualified name
    pub name: String,
    /// Category
    pub kind: TypeKind,
    /// Base type
    pub base: Option<String>,
    /// Implemented (or, for interfaces, inherited) interfaces
    pub interfaces: Vec<String>,
    /// Custom markers
    pub attributes: Vec<Attribute>,
    /// Fields in declaration order
    pub fields: Vec<FieldDef>,
    /// Properties in declaration order
    pub properties: Vec<PropertyDef>,
    /// Methods in declaration order
    pub methods: Vec<MethodDef>,
    /// Underlying integer type of an enum
    pub underlying: Option<TypeSig>,
}

impl TypeDef {
    /// Empty type
    pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            base: None,
            interfaces: Vec::new(),
            attributes: Vec::new(),
            fields: Vec::new(),
            properties: Vec::new(),
            methods: Vec::new(),
            underlying: None,
        }
    }

    /// Unqualified name (after the last `.`)
    pub fn simple_name(&self) -> &str {
        simple_name(&self.name)
    }

    /// Whether the type carries the marker `name`
    pub fn has_attribute(&self, name: &str) -> bool {
        find_attribute(&self.attributes, name).is_some()
    }

    /// Marker by name
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        find_attribute(&self.attributes, name)
    }

    /// Find a field
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Find a field mutably
    pub fn field_mut(&mut self, name: &str) -> Option<&mut FieldDef> {
        self.fields.iter_mut().find(|f| f.name == name)
    }

    /// Find a property
    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Find a method by name
    pub fn method(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Find a method by name mutably
    pub fn method_mut(&mut self, name: &str) -> Option<&mut MethodDef> {
        self.methods.iter_mut().find(|m| m.name == name)
    }

    /// Find a method by name and parameter count
    pub fn method_with_arity(&self, name: &str, arity: u16) -> Option<&MethodDef> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.arity() == arity)
    }

    /// The static initializer, if present
    pub fn static_initializer(&self) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.is_static_initializer())
    }

    fn encode(&self, writer: &mut BytecodeWriter) -> Result<(), ModuleError> {
        writer.emit_string(&self.name);
        writer.emit_u8(self.kind.tag());
        writer.emit_opt_string(self.base.as_deref());
        writer.emit_u32(self.interfaces.len() as u32);
        for i in &self.interfaces {
            writer.emit_string(i);
        }
        encode_attributes(&self.attributes, writer);
        writer.emit_u32(self.fields.len() as u32);
        for f in &self.fields {
            f.encode(writer);
        }
        writer.emit_u32(self.properties.len() as u32);
        for p in &self.properties {
            p.encode(writer);
        }
        writer.emit_u32(self.methods.len() as u32);
        for m in &self.methods {
            m.encode(&self.name, writer)?;
        }
        match &self.underlying {
            Some(sig) => {
                writer.emit_u8(1);
                sig.encode(writer);
            }
            None => writer.emit_u8(0),
        }
        Ok(())
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let name = reader.read_string()?;
        let kind = TypeKind::decode(reader)?;
        let base = reader.read_opt_string()?;
        let interface_count = reader.read_u32()? as usize;
        let interfaces = (0..interface_count)
            .map(|_| reader.read_string())
            .collect::<Result<Vec<_>, _>>()?;
        let attributes = decode_attributes(reader)?;
        let field_count = reader.read_u32()? as usize;
        let fields = (0..field_count)
            .map(|_| FieldDef::decode(reader))
            .collect::<Result<Vec<_>, _>>()?;
        let property_count = reader.read_u32()? as usize;
        let properties = (0..property_count)
            .map(|_| PropertyDef::decode(reader))
            .collect::<Result<Vec<_>, _>>()?;
        let method_count = reader.read_u32()? as usize;
        let methods = (0..method_count)
            .map(|_| MethodDef::decode(reader))
            .collect::<Result<Vec<_>, _>>()?;
        let underlying = if reader.read_bool()? {
            Some(TypeSig::decode(reader)?)
        } else {
            None
        };
        Ok(Self {
            name,
            kind,
            base,
            interfaces,
            attributes,
            fields,
            properties,
            methods,
            underlying,
        })
    }
}

/// Descriptor of a type owned by another, already-processed module
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedType {
    /// Qualified name
    pub name: String,
    /// Category
    pub kind: TypeKind,
    /// Base type
    pub base: Option<String>,
    /// Underlying integer type of an enum
    pub underlying: Option<TypeSig>,
    /// Whether a record is bit-for-bit compatible with its native layout
    pub blittable: bool,
    /// Whether a delegate is multi-cast
    pub multicast: bool,
}

impl ImportedType {
    /// Import without base or flags
    pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            base: None,
            underlying: None,
            blittable: false,
            multicast: false,
        }
    }

    /// Set the base type
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.name);
        writer.emit_u8(self.kind.tag());
        writer.emit_opt_string(self.base.as_deref());
        match &self.underlying {
            Some(sig) => {
                writer.emit_u8(1);
                sig.encode(writer);
            }
            None => writer.emit_u8(0),
        }
        writer.emit_u8(self.blittable as u8 | (self.multicast as u8) << 1);
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let name = reader.read_string()?;
        let kind = TypeKind::decode(reader)?;
        let base = reader.read_opt_string()?;
        let underlying = if reader.read_bool()? {
            Some(TypeSig::decode(reader)?)
        } else {
            None
        };
        let flags = reader.read_u8()?;
        Ok(Self {
            name,
            kind,
            base,
            underlying,
            blittable: flags & 1 != 0,
            multicast: flags & 2 != 0,
        })
    }
}

/// Unqualified part of a qualified name
pub fn simple_name(qualified: &str) -> &str {
    qualified.rsplit('.').next().unwrap_or(qualified)
}

// ============================================================================
// Module
// ============================================================================

/// Module metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Module name
    pub name: String,
    /// Source file path
    pub source_file: Option<String>,
}

impl Metadata {
    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.name);
        writer.emit_opt_string(self.source_file.as_deref());
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            name: reader.read_string()?,
            source_file: reader.read_opt_string()?,
        })
    }
}

/// A compiled module
#[derive(Debug, Clone)]
pub struct Module {
    /// Magic number (must be "STCH")
    pub magic: [u8; 4],
    /// Format version
    pub version: u32,
    /// Module flags
    pub flags: u32,
    /// Constant pool
    pub constants: ConstantPool,
    /// Types owned by other modules
    pub imports: Vec<ImportedType>,
    /// Declared types
    pub types: Vec<TypeDef>,
    /// Module metadata
    pub metadata: Metadata,
}

impl Module {
    /// Create a new empty module
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            flags: 0,
            constants: ConstantPool::new(),
            imports: Vec::new(),
            types: Vec::new(),
            metadata: Metadata {
                name: name.into(),
                source_file: None,
            },
        }
    }

    /// Find a declared type
    pub fn find_type(&self, name: &str) -> Option<&TypeDef> {
        self.types.iter().find(|t| t.name == name)
    }

    /// Find a declared type mutably
    pub fn find_type_mut(&mut self, name: &str) -> Option<&mut TypeDef> {
        self.types.iter_mut().find(|t| t.name == name)
    }

    /// Find an imported type
    pub fn find_import(&self, name: &str) -> Option<&ImportedType> {
        self.imports.iter().find(|t| t.name == name)
    }

    /// Pool a string constant
    pub fn intern_string(&mut self, value: &str) -> u32 {
        self.constants.intern_string(value)
    }

    /// Encode the module to binary format
    ///
    /// Format:
    /// - Header: magic (4 bytes) + version (u32) + flags (u32) + checksum (u32)
    /// - Constant pool
    /// - Import table
    /// - Type table (members and code inline)
    /// - Metadata
    pub fn encode(&self) -> Result<Vec<u8>, ModuleError> {
        let mut writer = BytecodeWriter::new();

        writer.emit_bytes(&self.magic);
        writer.emit_u32(self.version);
        writer.emit_u32(self.flags);
        let checksum_offset = writer.reserve_i32();

        self.constants.encode(&mut writer);

        writer.emit_u32(self.imports.len() as u32);
        for import in &self.imports {
            import.encode(&mut writer);
        }

        writer.emit_u32(self.types.len() as u32);
        for ty in &self.types {
            ty.encode(&mut writer)?;
        }

        self.metadata.encode(&mut writer);

        // CRC32 of everything after the header
        let checksum = crc32fast::hash(&writer.buffer()[HEADER_SIZE..]);
        writer.patch_u32(checksum_offset, checksum);

        Ok(writer.into_bytes())
    }

    /// Decode a module from binary format
    pub fn decode(data: &[u8]) -> Result<Self, ModuleError> {
        let mut reader = BytecodeReader::new(data);

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&reader.read_bytes(4)?);
        if magic != MAGIC {
            return Err(ModuleError::InvalidMagic(magic));
        }

        let version = reader.read_u32()?;
        if version != VERSION {
            return Err(ModuleError::UnsupportedVersion(version));
        }

        let flags = reader.read_u32()?;
        let stored_checksum = reader.read_u32()?;

        let calculated_checksum = crc32fast::hash(&data[HEADER_SIZE..]);
        if stored_checksum != calculated_checksum {
            return Err(ModuleError::ChecksumMismatch {
                expected: stored_checksum,
                actual: calculated_checksum,
            });
        }

        let constants = ConstantPool::decode(&mut reader)?;

        let import_count = reader.read_u32()? as usize;
        let imports = (0..import_count)
            .map(|_| ImportedType::decode(&mut reader))
            .collect::<Result<Vec<_>, _>>()?;

        let type_count = reader.read_u32()? as usize;
        let types = (0..type_count)
            .map(|_| TypeDef::decode(&mut reader))
            .collect::<Result<Vec<_>, _>>()?;

        let metadata = Metadata::decode(&mut reader)?;

        Ok(Self {
            magic,
            version,
            flags,
            constants,
            imports,
            types,
            metadata,
        })
    }

    /// Collect every sequence point into a companion debug map
    pub fn debug_map(&self) -> Result<DebugMap, ModuleError> {
        let mut map = DebugMap::new(self.metadata.source_file.clone());
        for ty in &self.types {
            for method in &ty.methods {
                let Some(body) = &method.body else { continue };
                let mut scratch = BytecodeWriter::new();
                let lines = code::encode_code(&body.instrs, &mut scratch).map_err(|UndefinedLabel(label)| {
                    ModuleError::UndefinedLabel {
                        method: format!("{}::{}", ty.name, method.name),
                        label,
                    }
                })?;
                map.rows.extend(lines.into_iter().map(|lp| DebugRow {
                    type_name: ty.name.clone(),
                    method: method.name.clone(),
                    arity: method.arity(),
                    offset: lp.offset,
                    line: lp.line,
                    column: lp.column,
                }));
            }
        }
        Ok(map)
    }

    /// Re-attach sequence points from a debug map to decoded method bodies
    ///
    /// Rows naming methods that no longer exist are ignored. Bodies that
    /// already carry sequence points are left alone.
    pub fn apply_debug_map(&mut self, map: &DebugMap) {
        for ty in &mut self.types {
            for method in &mut ty.methods {
                let arity = method.arity();
                let Some(body) = &mut method.body else { continue };
                if body
                    .instrs
                    .iter()
                    .any(|i| matches!(i, Instr::SequencePoint { .. }))
                {
                    continue;
                }
                let lines = map.lines_for(&ty.name, &method.name, arity);
                code::insert_line_positions(&mut body.instrs, &lines);
            }
        }
    }
}
