//! Stitch runtime - simulated native host for woven modules
//!
//! Woven code is only meaningful against a native side that hands out type,
//! property and function descriptors and owns object memory. This crate
//! provides one:
//!
//! - [`NativeHost`]: native address space, descriptor table, native objects
//!   and native function implementations
//! - [`Interpreter`]: executes a woven module's methods and serves the
//!   helper library calls it makes
//!
//! ```text
//! let host = NativeHost::new(metadata);
//! let mut vm = Interpreter::new(woven, host);
//! let actor = vm.construct("Game.Actor", vec![])?;
//! vm.set(&actor, "Health", Value::Int(10))?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod error;
pub mod host;
pub mod interp;
pub mod memory;
pub mod value;

pub use error::{RuntimeError, RuntimeResult};
pub use host::builder::{FunctionBuilder, NativeTypeBuilder, Shape};
pub use host::{NativeCall, NativeFn, NativeHost};
pub use interp::Interpreter;
pub use memory::{NativeMemory, Scalar};
pub use value::{ObjRef, Object, Value};
