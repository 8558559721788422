//! Shared rewrite infrastructure
//!
//! Slot allocation, the static initializer builder, body analysis and
//! constructor relocation. Every orchestrator and member rewriter goes
//! through these.

pub mod body;
pub mod ctor;
pub mod fields;
pub mod static_init;

pub use body::{is_stub, Accessors, Redirects};
pub use static_init::StaticInit;
