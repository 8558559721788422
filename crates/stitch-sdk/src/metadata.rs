//! Native reflection descriptor table
//!
//! The host describes its types, properties and functions with these
//! descriptors. The weaver only consults them to validate layout assumptions;
//! the simulated host builds its registry from them.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::MetadataError;

/// Function flag: callable without an instance
pub const FUNC_STATIC: u32 = 1 << 0;
/// Function flag: replicated over the network
pub const FUNC_NET: u32 = 1 << 1;
/// Function flag: event that may be overridden on the native side
pub const FUNC_EVENT: u32 = 1 << 2;
/// Function flag: has output parameters
pub const FUNC_HAS_OUT_PARMS: u32 = 1 << 3;

/// Name under which a function's return value is stored in its parameter buffer
pub const RETURN_VALUE: &str = "ReturnValue";

/// Category of a native type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NativeTypeKind {
    /// Reference type with identity
    Class,
    /// Value aggregate
    Struct,
    /// Interface
    Interface,
    /// Enumeration
    Enum,
    /// Callable signature
    Delegate,
}

/// A property (field) of a native type, or a function parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativePropertyDesc {
    /// Property name
    pub name: String,
    /// Native type name, informational
    #[serde(default)]
    pub type_name: String,
    /// Byte offset within the owning layout
    pub offset: u32,
    /// Size in bytes
    pub size: u32,
    /// Bit mask for packed booleans
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_mask: Option<u8>,
    /// Inner element descriptors: `[element]` for arrays, sets, optionals and
    /// fixed arrays, `[key, value]` for maps
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inner: Vec<NativePropertyDesc>,
}

/// Function parameters are described exactly like properties
pub type NativeParamDesc = NativePropertyDesc;

impl NativePropertyDesc {
    /// Create a plain property descriptor
    pub fn new(name: impl Into<String>, offset: u32, size: u32) -> Self {
        Self {
            name: name.into(),
            type_name: String::new(),
            offset,
            size,
            bit_mask: None,
            inner: Vec::new(),
        }
    }
}

/// A native function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeFunctionDesc {
    /// Function name
    pub name: String,
    /// Total size of the parameter buffer, return value included
    pub params_size: u32,
    /// Parameters in declaration order; the return value is named `ReturnValue`
    #[serde(default)]
    pub params: Vec<NativeParamDesc>,
    /// `FUNC_*` flags
    #[serde(default)]
    pub flags: u32,
}

impl NativeFunctionDesc {
    /// Find a parameter by name
    pub fn param(&self, name: &str) -> Option<&NativeParamDesc> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Check a flag
    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }
}

/// A native type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeTypeDesc {
    /// Qualified native name
    pub name: String,
    /// Type category
    pub kind: NativeTypeKind,
    /// Native super type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub super_name: Option<String>,
    /// Instance size in bytes
    #[serde(default)]
    pub size: u32,
    /// Properties in declaration order
    #[serde(default)]
    pub properties: Vec<NativePropertyDesc>,
    /// Functions
    #[serde(default)]
    pub functions: Vec<NativeFunctionDesc>,
}

impl NativeTypeDesc {
    /// Find a property by name
    pub fn property(&self, name: &str) -> Option<&NativePropertyDesc> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Find a function by name
    pub fn function(&self, name: &str) -> Option<&NativeFunctionDesc> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// The whole descriptor table, queryable by qualified name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NativeMetadata {
    /// Every described type
    pub types: Vec<NativeTypeDesc>,
    #[serde(skip)]
    index: FxHashMap<String, usize>,
}

impl NativeMetadata {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from descriptors, rejecting duplicate names
    pub fn from_types(types: Vec<NativeTypeDesc>) -> Result<Self, MetadataError> {
        let mut metadata = Self {
            types,
            index: FxHashMap::default(),
        };
        metadata.reindex()?;
        Ok(metadata)
    }

    /// Parse a JSON descriptor table
    pub fn from_json(json: &str) -> Result<Self, MetadataError> {
        let mut metadata: NativeMetadata = serde_json::from_str(json)?;
        metadata.reindex()?;
        Ok(metadata)
    }

    /// Load a JSON descriptor table from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MetadataError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| MetadataError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Serialize as pretty JSON
    pub fn to_json(&self) -> Result<String, MetadataError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Add a type descriptor
    pub fn insert(&mut self, desc: NativeTypeDesc) -> Result<(), MetadataError> {
        if self.index.contains_key(&desc.name) {
            return Err(MetadataError::DuplicateType(desc.name));
        }
        self.index.insert(desc.name.clone(), self.types.len());
        self.types.push(desc);
        Ok(())
    }

    /// Look a type up by qualified name
    pub fn find(&self, name: &str) -> Option<&NativeTypeDesc> {
        self.index.get(name).map(|&i| &self.types[i])
    }

    /// Number of described types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    fn reindex(&mut self) -> Result<(), MetadataError> {
        self.index.clear();
        for (i, ty) in self.types.iter().enumerate() {
            if self.index.insert(ty.name.clone(), i).is_some() {
                return Err(MetadataError::DuplicateType(ty.name.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"{
        "types": [
            {
                "name": "Vec2",
                "kind": "struct",
                "size": 8,
                "properties": [
                    { "name": "X", "offset": 0, "size": 4 },
                    { "name": "Y", "offset": 4, "size": 4 }
                ]
            },
            {
                "name": "Actor",
                "kind": "class",
                "super_name": "Object",
                "size": 32,
                "functions": [
                    { "name": "Jump", "params_size": 8, "flags": 4,
                      "params": [{ "name": "Height", "offset": 0, "size": 4 }] }
                ]
            }
        ]
    }"#;

    #[test]
    fn test_parse_and_query() {
        let metadata = NativeMetadata::from_json(SAMPLE).unwrap();
        assert_eq!(metadata.len(), 2);

        let vec2 = metadata.find("Vec2").unwrap();
        assert_eq!(vec2.kind, NativeTypeKind::Struct);
        assert_eq!(vec2.property("Y").unwrap().offset, 4);

        let jump = metadata.find("Actor").unwrap().function("Jump").unwrap();
        assert!(jump.has_flag(FUNC_EVENT));
        assert!(!jump.has_flag(FUNC_STATIC));
        assert_eq!(jump.param("Height").unwrap().size, 4);
        assert!(metadata.find("Missing").is_none());
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let json = r#"{ "types": [
            { "name": "A", "kind": "class" },
            { "name": "A", "kind": "struct" }
        ] }"#;
        assert!(matches!(
            NativeMetadata::from_json(json),
            Err(MetadataError::DuplicateType(name)) if name == "A"
        ));
    }

    #[test]
    fn test_json_roundtrip_keeps_index() {
        let metadata = NativeMetadata::from_json(SAMPLE).unwrap();
        let json = metadata.to_json().unwrap();
        let again = NativeMetadata::from_json(&json).unwrap();
        assert_eq!(again.types, metadata.types);
        assert!(again.find("Actor").is_some());
    }
}
