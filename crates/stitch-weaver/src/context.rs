//! Weave-wide shared state and per-unit working state

use std::collections::BTreeMap;

use parking_lot::Mutex;
use stitch_bytecode::{ConstantPool, FieldRef, TypeDef};
use stitch_sdk::NativeMetadata;
use tracing::debug;

use crate::config::WeaveConfig;
use crate::emit::StringTable;
use crate::error::WeaveErrors;
use crate::helpers::HelperLibrary;
use crate::index::TypeIndex;
use crate::strategy::{Resolver, StrategyCache};

/// Append-only registries shared by parallel units
#[derive(Debug, Default)]
pub struct Registry {
    exported: Mutex<Vec<String>>,
    extensions: Mutex<BTreeMap<String, Vec<String>>>,
}

impl Registry {
    /// Empty registries
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an exported type
    pub fn export(&self, type_name: &str) {
        self.exported.lock().push(type_name.to_string());
    }

    /// Record an extension method under its package
    pub fn extension(&self, package: &str, method: String) {
        self.extensions
            .lock()
            .entry(package.to_string())
            .or_default()
            .push(method);
    }

    /// Exported types, sorted
    pub fn exported(&self) -> Vec<String> {
        let mut exported = self.exported.lock().clone();
        exported.sort();
        exported
    }

    /// Extension methods by package, each list sorted
    pub fn extensions(&self) -> BTreeMap<String, Vec<String>> {
        let mut extensions = self.extensions.lock().clone();
        for methods in extensions.values_mut() {
            methods.sort();
        }
        extensions
    }
}

/// Read-only state every unit sees
pub struct WeaveContext<'a> {
    /// Configuration
    pub config: &'a WeaveConfig,
    /// Helper library
    pub helpers: &'a HelperLibrary,
    /// Type index
    pub index: &'a TypeIndex,
    /// Native descriptor table
    pub metadata: &'a NativeMetadata,
    /// Shared strategies
    pub strategies: &'a StrategyCache,
    /// Shared registries
    pub registry: &'a Registry,
}

impl<'a> WeaveContext<'a> {
    /// Strategy resolver
    pub fn resolver(&self) -> Resolver<'a> {
        Resolver::new(self.index, self.helpers, self.strategies)
    }

    /// The core object's native pointer field
    pub fn native_object(&self) -> FieldRef {
        self.helpers.native_object()
    }
}

/// Working state of one weave unit
pub struct Unit<'c> {
    /// Shared state
    pub ctx: &'c WeaveContext<'c>,
    /// Strings introduced by the unit
    pub strings: StringTable,
    /// Errors raised by the unit
    pub errors: WeaveErrors,
    /// `Type::member` of every rewritten member
    pub rewritten: Vec<String>,
    /// Types the unit created
    pub synthesized: Vec<TypeDef>,
}

impl<'c> Unit<'c> {
    /// Fresh unit over a snapshot of the module's constant pool
    pub fn new(ctx: &'c WeaveContext<'c>, pool: &ConstantPool) -> Self {
        Self {
            ctx,
            strings: StringTable::new(pool),
            errors: WeaveErrors::new(),
            rewritten: Vec::new(),
            synthesized: Vec::new(),
        }
    }

    /// Record a rewritten member
    pub fn mark_rewritten(&mut self, type_name: &str, member: &str) {
        debug!(type_name, member, "rewrote member");
        self.rewritten.push(format!("{}::{}", type_name, member));
    }
}
