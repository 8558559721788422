//! Editable instruction lists
//!
//! Method bodies are kept as ordered lists of [`Instr`]. Control flow targets
//! are [`Label`] markers placed in the list, so instructions can be inserted
//! or removed anywhere without recomputing offsets. Concrete branch
//! displacements only exist in the encoded form (see [`crate::code`]).

use std::fmt;

use stitch_sdk::NativeKind;

use crate::opcode::Opcode;

/// A branch target marker, unique within one method body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// A method named by owner type, name and parameter count
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// Qualified owner type name
    pub owner: String,
    /// Method name
    pub name: String,
    /// Parameter count, `this` excluded
    pub arity: u16,
    /// Generic argument for generic helper methods
    pub type_arg: Option<String>,
}

impl MethodRef {
    /// Create a non-generic method reference
    pub fn new(owner: impl Into<String>, name: impl Into<String>, arity: u16) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            arity,
            type_arg: None,
        }
    }

    /// Attach a generic argument
    pub fn with_type_arg(mut self, type_arg: impl Into<String>) -> Self {
        self.type_arg = Some(type_arg.into());
        self
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.owner, self.name)?;
        if let Some(arg) = &self.type_arg {
            write!(f, "<{}>", arg)?;
        }
        write!(f, "/{}", self.arity)
    }
}

/// A field named by owner type and name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// Qualified owner type name
    pub owner: String,
    /// Field name
    pub name: String,
}

impl FieldRef {
    /// Create a field reference
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.owner, self.name)
    }
}

/// One instruction or marker of a method body
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    /// Branch target marker
    Label(Label),
    /// Source position of the following instructions
    SequencePoint {
        /// 1-based source line
        line: u32,
        /// 1-based source column
        column: u32,
    },

    // ===== Stack & constants =====
    /// No operation
    Nop,
    /// Discard top of stack
    Pop,
    /// Duplicate top of stack
    Dup,
    /// Push null
    ConstNull,
    /// Push true
    ConstTrue,
    /// Push false
    ConstFalse,
    /// Push a 32-bit integer
    ConstI32(i32),
    /// Push a 64-bit integer
    ConstI64(i64),
    /// Push a 64-bit float
    ConstF64(f64),
    /// Push a string from the constant pool
    ConstStr(u32),

    // ===== Arguments & locals =====
    /// Push an argument
    LoadArg(u16),
    /// Pop into an argument
    StoreArg(u16),
    /// Push a local
    LoadLocal(u16),
    /// Pop into a local
    StoreLocal(u16),

    // ===== Arithmetic =====
    /// Integer addition
    Add,
    /// Integer subtraction
    Sub,
    /// Integer multiplication
    Mul,
    /// Bitwise and
    And,
    /// Bitwise or
    Or,
    /// Bitwise xor
    Xor,
    /// Bitwise complement
    Not,
    /// Equality
    Ceq,

    // ===== Control flow =====
    /// Unconditional branch
    Br(Label),
    /// Branch if true, non-zero or non-null
    BrTrue(Label),
    /// Branch if false, zero or null
    BrFalse(Label),

    // ===== Calls =====
    /// Direct call
    Call(MethodRef),
    /// Virtual call
    CallVirt(MethodRef),
    /// Allocate and construct
    NewObj(MethodRef),
    /// Push a method reference
    LoadFunction(MethodRef),
    /// Return
    Ret,

    // ===== Fields =====
    /// Instance field load
    LoadField(FieldRef),
    /// Instance field store
    StoreField(FieldRef),
    /// Static field load
    LoadStatic(FieldRef),
    /// Static field store
    StoreStatic(FieldRef),

    // ===== Native memory & references =====
    /// Pointer plus byte offset
    PtrAdd,
    /// Typed native read
    LoadNative(NativeKind),
    /// Typed native write
    StoreNative(NativeKind),
    /// Zeroed scratch buffer freed when the method returns
    StackAlloc,
    /// Raw byte copy
    BlockCopy,
    /// Read through a by-reference argument
    LoadIndirect,
    /// Write through a by-reference argument
    StoreIndirect,

    // ===== Exceptions =====
    /// Abort with the message on top of the stack
    Throw,
}

impl Instr {
    /// Opcode of a real instruction; `None` for markers
    pub fn opcode(&self) -> Option<Opcode> {
        Some(match self {
            Self::Label(_) | Self::SequencePoint { .. } => return None,
            Self::Nop => Opcode::Nop,
            Self::Pop => Opcode::Pop,
            Self::Dup => Opcode::Dup,
            Self::ConstNull => Opcode::ConstNull,
            Self::ConstTrue => Opcode::ConstTrue,
            Self::ConstFalse => Opcode::ConstFalse,
            Self::ConstI32(_) => Opcode::ConstI32,
            Self::ConstI64(_) => Opcode::ConstI64,
            Self::ConstF64(_) => Opcode::ConstF64,
            Self::ConstStr(_) => Opcode::ConstStr,
            Self::LoadArg(_) => Opcode::LoadArg,
            Self::StoreArg(_) => Opcode::StoreArg,
            Self::LoadLocal(_) => Opcode::LoadLocal,
            Self::StoreLocal(_) => Opcode::StoreLocal,
            Self::Add => Opcode::Add,
            Self::Sub => Opcode::Sub,
            Self::Mul => Opcode::Mul,
            Self::And => Opcode::And,
            Self::Or => Opcode::Or,
            Self::Xor => Opcode::Xor,
            Self::Not => Opcode::Not,
            Self::Ceq => Opcode::Ceq,
            Self::Br(_) => Opcode::Br,
            Self::BrTrue(_) => Opcode::BrTrue,
            Self::BrFalse(_) => Opcode::BrFalse,
            Self::Call(_) => Opcode::Call,
            Self::CallVirt(_) => Opcode::CallVirt,
            Self::NewObj(_) => Opcode::NewObj,
            Self::LoadFunction(_) => Opcode::LoadFunction,
            Self::Ret => Opcode::Ret,
            Self::LoadField(_) => Opcode::LoadField,
            Self::StoreField(_) => Opcode::StoreField,
            Self::LoadStatic(_) => Opcode::LoadStatic,
            Self::StoreStatic(_) => Opcode::StoreStatic,
            Self::PtrAdd => Opcode::PtrAdd,
            Self::LoadNative(_) => Opcode::LoadNative,
            Self::StoreNative(_) => Opcode::StoreNative,
            Self::StackAlloc => Opcode::StackAlloc,
            Self::BlockCopy => Opcode::BlockCopy,
            Self::LoadIndirect => Opcode::LoadIndirect,
            Self::StoreIndirect => Opcode::StoreIndirect,
            Self::Throw => Opcode::Throw,
        })
    }

    /// Whether this is a marker rather than an executable instruction
    pub fn is_marker(&self) -> bool {
        matches!(self, Self::Label(_) | Self::SequencePoint { .. })
    }

    /// Branch target, if this is a branch
    pub fn branch_target(&self) -> Option<Label> {
        match self {
            Self::Br(l) | Self::BrTrue(l) | Self::BrFalse(l) => Some(*l),
            _ => None,
        }
    }

    /// Called or referenced method, if any
    pub fn method_ref(&self) -> Option<&MethodRef> {
        match self {
            Self::Call(m) | Self::CallVirt(m) | Self::NewObj(m) | Self::LoadFunction(m) => Some(m),
            _ => None,
        }
    }

    /// Accessed field, if any
    pub fn field_ref(&self) -> Option<&FieldRef> {
        match self {
            Self::LoadField(f) | Self::StoreField(f) | Self::LoadStatic(f) | Self::StoreStatic(f) => {
                Some(f)
            }
            _ => None,
        }
    }

    /// Whether the instruction pushes a compile-time constant
    pub fn is_constant(&self) -> bool {
        matches!(
            self,
            Self::ConstNull
                | Self::ConstTrue
                | Self::ConstFalse
                | Self::ConstI32(_)
                | Self::ConstI64(_)
                | Self::ConstF64(_)
                | Self::ConstStr(_)
        )
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.opcode() {
            Some(op) => op,
            None => {
                return match self {
                    Self::Label(l) => write!(f, "{}:", l),
                    Self::SequencePoint { line, column } => write!(f, ".line {}:{}", line, column),
                    _ => Ok(()),
                }
            }
        };
        f.write_str(op.name())?;
        match self {
            Self::ConstI32(v) => write!(f, " {}", v),
            Self::ConstI64(v) => write!(f, " {}", v),
            Self::ConstF64(v) => write!(f, " {}", v),
            Self::ConstStr(i) => write!(f, " #{}", i),
            Self::LoadArg(i) | Self::StoreArg(i) | Self::LoadLocal(i) | Self::StoreLocal(i) => {
                write!(f, " {}", i)
            }
            Self::Br(l) | Self::BrTrue(l) | Self::BrFalse(l) => write!(f, " {}", l),
            Self::Call(m) | Self::CallVirt(m) | Self::NewObj(m) | Self::LoadFunction(m) => {
                write!(f, " {}", m)
            }
            Self::LoadField(r) | Self::StoreField(r) | Self::LoadStatic(r) | Self::StoreStatic(r) => {
                write!(f, " {}", r)
            }
            Self::LoadNative(k) | Self::StoreNative(k) => write!(f, ".{}", k),
            _ => Ok(()),
        }
    }
}
