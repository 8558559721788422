//! Stitch compiled module format
//!
//! This crate provides the managed instruction set, the compiled module
//! format the weaver reads and writes, its binary codec and companion debug
//! map, and a structural verifier.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod code;
pub mod constants;
pub mod debug;
pub mod encoder;
pub mod instr;
pub mod module;
pub mod opcode;
pub mod sig;
pub mod verify;

pub use constants::ConstantPool;
pub use debug::{DebugMap, DebugRow};
pub use encoder::{BytecodeReader, BytecodeWriter, DecodeError};
pub use instr::{FieldRef, Instr, Label, MethodRef};
pub use module::{
    find_attribute, flags, simple_name, Attribute, AttributeArg, FieldDef, ImportedType,
    Metadata, MethodBody, MethodDef, Module, ModuleError, ParamDef, ParamDirection, PropertyDef,
    TypeDef, TypeKind,
};
pub use opcode::Opcode;
pub use sig::TypeSig;
pub use stitch_sdk::NativeKind;
pub use verify::{verify_method, verify_module, VerifyError};
