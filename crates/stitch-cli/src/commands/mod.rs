//! Subcommands

pub mod inspect;
pub mod weave;

use std::path::Path;

use anyhow::Context;
use stitch_bytecode::Module;

/// Read and decode a module file
pub fn read_module(path: &Path) -> anyhow::Result<Module> {
    let bytes = std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    Module::decode(&bytes).with_context(|| format!("cannot decode {}", path.display()))
}
