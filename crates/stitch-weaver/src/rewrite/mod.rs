//! Member rewriters
//!
//! Each rewriter replaces the bodies of one kind of member using the
//! strategies resolved for its types.

pub mod delegate;
pub mod function;
pub mod property;

pub use delegate::rewrite_delegate;
pub use function::{push_buffer, rewrite_function, CallPlan, ParamPlan};
pub use property::rewrite_properties;
