//! Stitch weaver
//!
//! Reads a compiled module, finds the types and members marked for
//! exposure to the native host, and rewrites them so that their state lives
//! in native memory:
//!
//! - properties become accessors over a native buffer at a looked-up offset
//! - functions marshal their arguments into a parameter buffer and invoke
//!   the native function
//! - records gain conversions to and from their native layout
//! - interfaces gain a proxy forwarding to the native object
//! - callable signatures gain invokers
//!
//! Entry point is [`Weaver::weave`].

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod context;
pub mod emit;
pub mod error;
pub mod helpers;
pub mod index;
pub mod infra;
pub mod markers;
pub mod naming;
pub mod orchestrate;
pub mod pipeline;
pub mod report;
pub mod rewrite;
pub mod strategy;

pub use config::{ConfigError, WeaveConfig};
pub use error::{ErrorCategory, WeaveError, WeaveErrors, WeaveResult};
pub use helpers::HelperLibrary;
pub use pipeline::Weaver;
pub use report::WeaveReport;
