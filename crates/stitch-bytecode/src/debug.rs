//! Companion debug map
//!
//! Sequence points are not part of the encoded code stream. They are written
//! to a separate artifact so source-level debugging still resolves after the
//! weaver has inserted and moved instructions.

use crate::code::LinePosition;
use crate::encoder::{BytecodeReader, BytecodeWriter};
use crate::module::ModuleError;

/// Magic number for debug maps: "STDB"
pub const DEBUG_MAGIC: [u8; 4] = *b"STDB";

/// Current debug map version
pub const DEBUG_VERSION: u32 = 1;

/// One sequence point of one method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugRow {
    /// Owning type
    pub type_name: String,
    /// Method name
    pub method: String,
    /// Method parameter count, to tell overloads apart
    pub arity: u16,
    /// Byte offset within the method's code stream
    pub offset: u32,
    /// Source line
    pub line: u32,
    /// Source column
    pub column: u32,
}

/// Sequence points of a whole module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugMap {
    /// Source file the lines refer to
    pub source_file: Option<String>,
    /// Rows grouped by method, offsets ascending within a method
    pub rows: Vec<DebugRow>,
}

impl DebugMap {
    /// Create an empty map
    pub fn new(source_file: Option<String>) -> Self {
        Self {
            source_file,
            rows: Vec::new(),
        }
    }

    /// Line positions recorded for one method
    pub fn lines_for(&self, type_name: &str, method: &str, arity: u16) -> Vec<LinePosition> {
        self.rows
            .iter()
            .filter(|r| r.type_name == type_name && r.method == method && r.arity == arity)
            .map(|r| LinePosition {
                offset: r.offset,
                line: r.line,
                column: r.column,
            })
            .collect()
    }

    /// Encode to binary
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = BytecodeWriter::new();
        writer.emit_bytes(&DEBUG_MAGIC);
        writer.emit_u32(DEBUG_VERSION);
        writer.emit_opt_string(self.source_file.as_deref());
        writer.emit_u32(self.rows.len() as u32);
        for row in &self.rows {
            writer.emit_string(&row.type_name);
            writer.emit_string(&row.method);
            writer.emit_u16(row.arity);
            writer.emit_u32(row.offset);
            writer.emit_u32(row.line);
            writer.emit_u32(row.column);
        }
        writer.into_bytes()
    }

    /// Decode from binary
    pub fn decode(data: &[u8]) -> Result<Self, ModuleError> {
        let mut reader = BytecodeReader::new(data);
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&reader.read_bytes(4)?);
        if magic != DEBUG_MAGIC {
            return Err(ModuleError::InvalidMagic(magic));
        }
        let version = reader.read_u32()?;
        if version != DEBUG_VERSION {
            return Err(ModuleError::UnsupportedVersion(version));
        }
        let source_file = reader.read_opt_string()?;
        let count = reader.read_u32()? as usize;
        let mut rows = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            rows.push(DebugRow {
                type_name: reader.read_string()?,
                method: reader.read_string()?,
                arity: reader.read_u16()?,
                offset: reader.read_u32()?,
                line: reader.read_u32()?,
                column: reader.read_u32()?,
            });
        }
        Ok(Self { source_file, rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_map_encoding() {
        let mut map = DebugMap::new(Some("Actor.cs".into()));
        map.rows.push(DebugRow {
            type_name: "Game.Actor".into(),
            method: "Jump".into(),
            arity: 1,
            offset: 12,
            line: 40,
            column: 9,
        });
        let decoded = DebugMap::decode(&map.encode()).unwrap();
        assert_eq!(decoded, map);
        assert_eq!(decoded.lines_for("Game.Actor", "Jump", 1).len(), 1);
        assert!(decoded.lines_for("Game.Actor", "Jump", 2).is_empty());
    }

    #[test]
    fn test_rejects_module_bytes() {
        assert!(matches!(
            DebugMap::decode(b"STCH\x01\0\0\0"),
            Err(ModuleError::InvalidMagic(_))
        ));
    }
}
