//! Stitch SDK - shared vocabulary of the managed/native bridge
//!
//! The weaver and the native host agree on three things:
//!
//! - [`NativeKind`]: the primitive cells native buffers are made of
//! - [`NativeMetadata`]: the host's reflection descriptor table
//! - [`helpers`]: the names of every helper type and method woven code calls
//!
//! Record layouts on both sides follow [`LayoutBuilder`].

#![warn(missing_docs)]

pub mod error;
pub mod helpers;
pub mod kind;
pub mod layout;
pub mod metadata;

pub use error::MetadataError;
pub use helpers::{HelperMethod, HelperType};
pub use kind::NativeKind;
pub use layout::{align_up, LayoutBuilder};
pub use metadata::{
    NativeFunctionDesc, NativeMetadata, NativeParamDesc, NativePropertyDesc, NativeTypeDesc,
    NativeTypeKind,
};
