//! Module constant pool

use rustc_hash::FxHashMap;

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};

/// String constants referenced by `ConstStr` instructions
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    /// Strings in index order
    pub strings: Vec<String>,
    lookup: FxHashMap<String, u32>,
}

impl ConstantPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the index of `value`, adding it if it is not pooled yet
    pub fn intern_string(&mut self, value: &str) -> u32 {
        if let Some(&index) = self.lookup.get(value) {
            return index;
        }
        let index = self.strings.len() as u32;
        self.strings.push(value.to_string());
        self.lookup.insert(value.to_string(), index);
        index
    }

    /// Get a string by index
    pub fn get_string(&self, index: u32) -> Option<&str> {
        self.strings.get(index as usize).map(String::as_str)
    }

    /// Number of pooled strings
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Encode to binary
    pub fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u32(self.strings.len() as u32);
        for s in &self.strings {
            writer.emit_string(s);
        }
    }

    /// Decode from binary
    pub fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let count = reader.read_u32()? as usize;
        let mut pool = Self::new();
        for _ in 0..count {
            let s = reader.read_string()?;
            // Decoded pools may legitimately hold duplicates; keep every slot.
            pool.lookup.entry(s.clone()).or_insert(pool.strings.len() as u32);
            pool.strings.push(s);
        }
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_deduplicates() {
        let mut pool = ConstantPool::new();
        let a = pool.intern_string("Health");
        let b = pool.intern_string("Armor");
        let c = pool.intern_string("Health");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get_string(b), Some("Armor"));
        assert_eq!(pool.get_string(7), None);
    }

    #[test]
    fn test_decode_rebuilds_lookup() {
        let mut pool = ConstantPool::new();
        pool.intern_string("x");
        pool.intern_string("y");
        let mut writer = BytecodeWriter::new();
        pool.encode(&mut writer);

        let mut decoded = ConstantPool::decode(&mut BytecodeReader::new(writer.buffer())).unwrap();
        assert_eq!(decoded.intern_string("y"), 1);
        assert_eq!(decoded.len(), 2);
    }
}
