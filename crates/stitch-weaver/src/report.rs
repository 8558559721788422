//! Weave report handed back to the build tool

use std::collections::BTreeMap;

use serde::Serialize;
use sha2::{Digest, Sha256};
use stitch_bytecode::{Module, ModuleError};

/// What a successful weave did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WeaveReport {
    /// Module name
    pub module: String,
    /// Exported types, sorted
    pub exported_types: Vec<String>,
    /// Extension methods by package
    pub extension_methods: BTreeMap<String, Vec<String>>,
    /// Records in the order they were rewritten
    pub records_in_order: Vec<String>,
    /// `Type::member` of every rewritten member, in declaration order
    pub rewritten_members: Vec<String>,
    /// Types the weave added
    pub synthesized_types: Vec<String>,
    /// Distinct strategies resolved
    pub strategies: usize,
    /// SHA-256 of the encoded woven module
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl WeaveReport {
    /// Attach the digest of the encoded `module`
    pub fn with_digest(mut self, module: &Module) -> Result<Self, ModuleError> {
        let bytes = module.encode()?;
        self.digest = Some(hex::encode(Sha256::digest(&bytes)));
        Ok(self)
    }

    /// Pretty JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
