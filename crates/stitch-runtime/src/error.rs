//! Runtime error types

use thiserror::Error;

/// Errors raised by the simulated host or the interpreter
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// Access outside every allocated block
    #[error("Invalid native access at {addr:#x} ({len} bytes)")]
    InvalidAccess {
        /// Address
        addr: u64,
        /// Access length
        len: usize,
    },

    /// `free` of an address that is not a block start
    #[error("Invalid free of {0:#x}")]
    InvalidFree(u64),

    /// Native type not in the descriptor table
    #[error("Unknown native type '{0}'")]
    UnknownNativeType(String),

    /// Native property not found on its owner
    #[error("Unknown native property '{owner}.{name}'")]
    UnknownProperty {
        /// Owner descriptor name
        owner: String,
        /// Property name
        name: String,
    },

    /// A value used as a descriptor handle is not one
    #[error("Invalid {expected} handle {handle:#x}")]
    InvalidHandle {
        /// Handle value
        handle: u64,
        /// Expected handle kind
        expected: &'static str,
    },

    /// Address is not a live native object
    #[error("No native object at {0:#x}")]
    UnknownObject(u64),

    /// Managed type not loaded
    #[error("Unknown type '{0}'")]
    UnknownType(String),

    /// Method not found on its owner or any base
    #[error("Unknown method '{owner}::{name}/{arity}'")]
    UnknownMethod {
        /// Owner type
        owner: String,
        /// Method name
        name: String,
        /// Parameter count
        arity: u16,
    },

    /// Method has no body to execute
    #[error("Method '{0}' has no body")]
    NoBody(String),

    /// Operand of the wrong type
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// What the operation needed
        expected: &'static str,
        /// What it got
        found: String,
    },

    /// Pop from an empty evaluation stack
    #[error("Evaluation stack underflow in '{0}'")]
    StackUnderflow(String),

    /// Branch to a label the body does not define
    #[error("Undefined label {label} in '{method}'")]
    UndefinedLabel {
        /// Method
        method: String,
        /// Label id
        label: u32,
    },

    /// Calls nested deeper than the interpreter allows
    #[error("Call depth exceeded in '{0}'")]
    CallDepth(String),

    /// Managed `throw`
    #[error("Thrown: {0}")]
    Thrown(String),

    /// Native function implementation failure
    #[error("Native function '{function}' failed: {message}")]
    NativeFunction {
        /// Function name
        function: String,
        /// Failure
        message: String,
    },
}

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;

impl RuntimeError {
    /// Type mismatch against a found value description
    pub fn mismatch(expected: &'static str, found: impl std::fmt::Debug) -> Self {
        Self::TypeMismatch {
            expected,
            found: format!("{:?}", found),
        }
    }
}
