//! End-to-end tests: weave a module, then run it against the simulated host
//!
//! Each scenario declares managed types the way a compiler emits them and
//! the matching native descriptor table, weaves the module and checks what
//! the woven code does to native memory.

mod harness;

mod callables;
mod containers;
mod functions;
mod properties;
mod records;
