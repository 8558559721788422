//! Opcodes of the managed instruction set
//!
//! Every opcode is a single byte, optionally followed by operands.
//! Opcodes are organized into categories:
//! - 0x00-0x0F: Stack manipulation & constants
//! - 0x10-0x1F: Arguments and locals
//! - 0x20-0x2F: Integer arithmetic, bitwise and comparison
//! - 0x30-0x3F: Control flow
//! - 0x40-0x4F: Calls
//! - 0x50-0x5F: Fields
//! - 0x60-0x6F: Native memory and references
//! - 0x70-0x7F: Exceptions

/// Bytecode opcode enumeration
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== Stack Manipulation & Constants (0x00-0x0F) =====
    /// No operation
    Nop = 0x00,
    /// Pop top value from stack
    Pop = 0x01,
    /// Duplicate top stack value
    Dup = 0x02,
    /// Push null
    ConstNull = 0x04,
    /// Push true
    ConstTrue = 0x05,
    /// Push false
    ConstFalse = 0x06,
    /// Push 32-bit integer (operand: i32)
    ConstI32 = 0x07,
    /// Push 64-bit integer (operand: i64)
    ConstI64 = 0x08,
    /// Push 64-bit float (operand: f64)
    ConstF64 = 0x09,
    /// Push string from the constant pool (operand: u32 index)
    ConstStr = 0x0A,

    // ===== Arguments & Locals (0x10-0x1F) =====
    /// Load argument (operand: u16 index; instance methods have `this` at 0)
    LoadArg = 0x10,
    /// Store to argument (operand: u16 index)
    StoreArg = 0x11,
    /// Load local variable (operand: u16 index)
    LoadLocal = 0x12,
    /// Store to local variable (operand: u16 index)
    StoreLocal = 0x13,

    // ===== Integer Arithmetic & Bitwise (0x20-0x2F) =====
    /// pop b, pop a, push a + b
    Add = 0x20,
    /// pop b, pop a, push a - b
    Sub = 0x21,
    /// pop b, pop a, push a * b
    Mul = 0x22,
    /// pop b, pop a, push a & b
    And = 0x23,
    /// pop b, pop a, push a | b
    Or = 0x24,
    /// pop b, pop a, push a ^ b
    Xor = 0x25,
    /// pop a, push !a (bitwise complement)
    Not = 0x26,
    /// pop b, pop a, push a == b
    Ceq = 0x27,

    // ===== Control Flow (0x30-0x3F) =====
    /// Unconditional branch (operand: i32 displacement)
    Br = 0x30,
    /// Branch if top of stack is true, non-zero or non-null (operand: i32)
    BrTrue = 0x31,
    /// Branch if top of stack is false, zero or null (operand: i32)
    BrFalse = 0x32,

    // ===== Calls (0x40-0x4F) =====
    /// Call a method non-virtually (operand: method reference)
    Call = 0x40,
    /// Call a method through the receiver's most derived override
    CallVirt = 0x41,
    /// Allocate an object and run the referenced constructor
    NewObj = 0x42,
    /// Push a reference to a method, used as a converter callback
    LoadFunction = 0x43,
    /// Return from the current method
    Ret = 0x44,

    // ===== Fields (0x50-0x5F) =====
    /// pop object, push object.field (operand: field reference)
    LoadField = 0x50,
    /// pop value, pop object, object.field = value
    StoreField = 0x51,
    /// Push a static field
    LoadStatic = 0x52,
    /// Pop into a static field
    StoreStatic = 0x53,

    // ===== Native Memory & References (0x60-0x6F) =====
    /// pop offset, pop pointer, push pointer + offset
    PtrAdd = 0x60,
    /// pop pointer, push the value of the given native kind stored there (operand: u8 kind)
    LoadNative = 0x61,
    /// pop value, pop pointer, write value as the given native kind (operand: u8 kind)
    StoreNative = 0x62,
    /// pop size, push a pointer to a zeroed scratch buffer freed on return
    StackAlloc = 0x63,
    /// pop size, pop source, pop destination, copy bytes
    BlockCopy = 0x64,
    /// pop reference, push the referenced value
    LoadIndirect = 0x65,
    /// pop value, pop reference, store value through the reference
    StoreIndirect = 0x66,

    // ===== Exceptions (0x70-0x7F) =====
    /// pop a message and abort the current invocation
    Throw = 0x70,
}

impl Opcode {
    /// Decode an opcode byte
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Nop),
            0x01 => Some(Self::Pop),
            0x02 => Some(Self::Dup),
            0x04 => Some(Self::ConstNull),
            0x05 => Some(Self::ConstTrue),
            0x06 => Some(Self::ConstFalse),
            0x07 => Some(Self::ConstI32),
            0x08 => Some(Self::ConstI64),
            0x09 => Some(Self::ConstF64),
            0x0A => Some(Self::ConstStr),

            0x10 => Some(Self::LoadArg),
            0x11 => Some(Self::StoreArg),
            0x12 => Some(Self::LoadLocal),
            0x13 => Some(Self::StoreLocal),

            0x20 => Some(Self::Add),
            0x21 => Some(Self::Sub),
            0x22 => Some(Self::Mul),
            0x23 => Some(Self::And),
            0x24 => Some(Self::Or),
            0x25 => Some(Self::Xor),
            0x26 => Some(Self::Not),
            0x27 => Some(Self::Ceq),

            0x30 => Some(Self::Br),
            0x31 => Some(Self::BrTrue),
            0x32 => Some(Self::BrFalse),

            0x40 => Some(Self::Call),
            0x41 => Some(Self::CallVirt),
            0x42 => Some(Self::NewObj),
            0x43 => Some(Self::LoadFunction),
            0x44 => Some(Self::Ret),

            0x50 => Some(Self::LoadField),
            0x51 => Some(Self::StoreField),
            0x52 => Some(Self::LoadStatic),
            0x53 => Some(Self::StoreStatic),

            0x60 => Some(Self::PtrAdd),
            0x61 => Some(Self::LoadNative),
            0x62 => Some(Self::StoreNative),
            0x63 => Some(Self::StackAlloc),
            0x64 => Some(Self::BlockCopy),
            0x65 => Some(Self::LoadIndirect),
            0x66 => Some(Self::StoreIndirect),

            0x70 => Some(Self::Throw),

            _ => None,
        }
    }

    /// Encode as a byte
    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Whether execution never falls through to the next instruction
    pub fn is_terminator(self) -> bool {
        matches!(self, Self::Ret | Self::Br | Self::Throw)
    }

    /// Whether the opcode carries a branch displacement
    pub fn is_branch(self) -> bool {
        matches!(self, Self::Br | Self::BrTrue | Self::BrFalse)
    }

    /// Mnemonic used by the disassembler
    pub fn name(self) -> &'static str {
        match self {
            Self::Nop => "nop",
            Self::Pop => "pop",
            Self::Dup => "dup",
            Self::ConstNull => "ldnull",
            Self::ConstTrue => "ldtrue",
            Self::ConstFalse => "ldfalse",
            Self::ConstI32 => "ldc.i4",
            Self::ConstI64 => "ldc.i8",
            Self::ConstF64 => "ldc.r8",
            Self::ConstStr => "ldstr",
            Self::LoadArg => "ldarg",
            Self::StoreArg => "starg",
            Self::LoadLocal => "ldloc",
            Self::StoreLocal => "stloc",
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Not => "not",
            Self::Ceq => "ceq",
            Self::Br => "br",
            Self::BrTrue => "brtrue",
            Self::BrFalse => "brfalse",
            Self::Call => "call",
            Self::CallVirt => "callvirt",
            Self::NewObj => "newobj",
            Self::LoadFunction => "ldftn",
            Self::Ret => "ret",
            Self::LoadField => "ldfld",
            Self::StoreField => "stfld",
            Self::LoadStatic => "ldsfld",
            Self::StoreStatic => "stsfld",
            Self::PtrAdd => "ptradd",
            Self::LoadNative => "ldnative",
            Self::StoreNative => "stnative",
            Self::StackAlloc => "stackalloc",
            Self::BlockCopy => "cpblk",
            Self::LoadIndirect => "ldind",
            Self::StoreIndirect => "stind",
            Self::Throw => "throw",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_byte_roundtrip() {
        for byte in 0..=u8::MAX {
            if let Some(op) = Opcode::from_u8(byte) {
                assert_eq!(op.to_u8(), byte, "{}", op.name());
            }
        }
    }

    #[test]
    fn test_terminators() {
        assert!(Opcode::Ret.is_terminator());
        assert!(Opcode::Throw.is_terminator());
        assert!(Opcode::Br.is_terminator());
        assert!(!Opcode::BrTrue.is_terminator());
        assert!(Opcode::BrFalse.is_branch());
        assert!(!Opcode::Call.is_branch());
    }

    #[test]
    fn test_invalid_opcode() {
        assert_eq!(Opcode::from_u8(0x03), None);
        assert_eq!(Opcode::from_u8(0xFF), None);
    }
}
