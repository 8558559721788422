//! Native storage of composite values
//!
//! Strings, texts, arrays, sets and maps share one 16-byte header: data
//! pointer, element count (`i32`) and capacity (`i32`). String data is UTF-8
//! without a terminator. Names are 8-byte indices into the host's name
//! table. A single-cast delegate is an (object pointer, function handle)
//! binding; a multi-cast delegate is an array of bindings. An optional
//! stores its value followed by a one-byte presence flag.

use stitch_sdk::{align_up, NativeKind, NativePropertyDesc};

use super::NativeHost;
use crate::error::{RuntimeError, RuntimeResult};
use crate::memory::Scalar;

/// Size of the string/array/set/map header
pub const HEADER_SIZE: u32 = 16;
/// Size of an interned name
pub const NAME_SIZE: u32 = 8;
/// Size of an object or class reference
pub const POINTER_SIZE: u32 = 8;
/// Size of one delegate binding
pub const BINDING_SIZE: u32 = 16;

/// Largest power of two (up to 8) dividing `size`
pub fn natural_align(size: u32) -> u32 {
    if size == 0 {
        1
    } else {
        (1u32 << size.trailing_zeros()).min(8)
    }
}

/// Offset of the value within a map entry
pub fn map_value_offset(key_size: u32, value_size: u32) -> u32 {
    align_up(key_size, natural_align(value_size))
}

/// Distance between consecutive map entries
pub fn map_stride(key: &NativePropertyDesc, value: &NativePropertyDesc) -> u32 {
    let align = natural_align(key.size).max(natural_align(value.size));
    align_up(value.offset + value.size, align)
}

/// A dynamic array header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayHeader {
    /// Element storage, 0 when empty
    pub data: u64,
    /// Element count
    pub count: u32,
}

impl NativeHost {
    // ========================================================================
    // Arrays
    // ========================================================================

    /// Read the header at `addr`
    pub fn array_header(&self, addr: u64) -> RuntimeResult<ArrayHeader> {
        let data = self.memory.read_ptr(addr)?;
        let count = self.memory.read_kind(addr + 8, NativeKind::I32)?.as_i64();
        Ok(ArrayHeader {
            data,
            count: count.max(0) as u32,
        })
    }

    /// Replace the storage at `addr` with `count` zeroed elements of
    /// `stride` bytes; returns the element storage
    pub fn resize_array(&mut self, addr: u64, count: u32, stride: u32) -> RuntimeResult<u64> {
        self.free_array(addr)?;
        if count == 0 {
            return Ok(0);
        }
        let data = self.memory.alloc((count * stride) as usize);
        self.memory.write_ptr(addr, data)?;
        self.memory.write_kind(addr + 8, NativeKind::I32, Scalar::Int(count as i64))?;
        self.memory.write_kind(addr + 12, NativeKind::I32, Scalar::Int(count as i64))?;
        Ok(data)
    }

    /// Release the element storage at `addr` and clear the header
    pub fn free_array(&mut self, addr: u64) -> RuntimeResult<()> {
        let header = self.array_header(addr)?;
        if header.data != 0 && self.memory.is_block(header.data) {
            self.memory.free(header.data)?;
        }
        self.memory.zero(addr, HEADER_SIZE as usize)
    }

    /// Addresses of every element of the array at `addr`
    pub fn array_elements(&self, addr: u64, stride: u32) -> RuntimeResult<Vec<u64>> {
        let header = self.array_header(addr)?;
        Ok((0..header.count)
            .map(|i| header.data + (i * stride) as u64)
            .collect())
    }

    /// Primitive elements of the array at `addr`
    pub fn read_array(&self, addr: u64, kind: NativeKind) -> RuntimeResult<Vec<Scalar>> {
        self.array_elements(addr, kind.size())?
            .into_iter()
            .map(|element| self.memory.read_kind(element, kind))
            .collect()
    }

    /// Replace the array at `addr` with primitive `values`
    pub fn write_array(&mut self, addr: u64, kind: NativeKind, values: &[Scalar]) -> RuntimeResult<()> {
        let data = self.resize_array(addr, values.len() as u32, kind.size())?;
        for (i, value) in values.iter().enumerate() {
            self.memory.write_kind(data + (i as u64) * kind.size() as u64, kind, *value)?;
        }
        Ok(())
    }

    // ========================================================================
    // Strings
    // ========================================================================

    /// Decode the string at `addr`
    pub fn read_string(&self, addr: u64) -> RuntimeResult<String> {
        let header = self.array_header(addr)?;
        if header.data == 0 || header.count == 0 {
            return Ok(String::new());
        }
        let bytes = self.memory.read(header.data, header.count as usize)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| RuntimeError::mismatch("utf-8 string", e))
    }

    /// Store `value` at `addr`, releasing the previous contents
    pub fn write_string(&mut self, addr: u64, value: &str) -> RuntimeResult<()> {
        let data = self.resize_array(addr, value.len() as u32, 1)?;
        if data != 0 {
            self.memory.write(data, value.as_bytes())?;
        }
        Ok(())
    }

    // ========================================================================
    // Names
    // ========================================================================

    /// Index of `name`, interning it on first use
    pub fn name_id(&mut self, name: &str) -> u64 {
        if let Some(&id) = self.name_ids.get(name) {
            return id;
        }
        let id = self.names.len() as u64;
        self.names.push(name.to_string());
        self.name_ids.insert(name.to_string(), id);
        id
    }

    /// Name with index `id`
    pub fn name(&self, id: u64) -> RuntimeResult<&str> {
        self.names
            .get(id as usize)
            .map(String::as_str)
            .ok_or(RuntimeError::InvalidHandle { handle: id, expected: "name" })
    }

    // ========================================================================
    // Delegates
    // ========================================================================

    /// Bind the single-cast delegate at `addr` to `function` of `object`
    pub fn bind_delegate(&mut self, addr: u64, object: u64, function: &str) -> RuntimeResult<()> {
        let handle = self.function_of_instance(object, function)?;
        self.memory.write_ptr(addr, object)?;
        self.memory.write_ptr(addr + 8, handle)
    }

    /// Append a binding to the multi-cast delegate at `addr`
    pub fn add_binding(&mut self, addr: u64, object: u64, function: &str) -> RuntimeResult<()> {
        let handle = self.function_of_instance(object, function)?;
        let mut bindings = self.bindings(addr)?;
        bindings.push((object, handle));
        self.write_bindings(addr, &bindings)
    }

    /// Bindings of the multi-cast delegate at `addr`
    pub fn bindings(&self, addr: u64) -> RuntimeResult<Vec<(u64, u64)>> {
        self.array_elements(addr, BINDING_SIZE)?
            .into_iter()
            .map(|binding| Ok((self.memory.read_ptr(binding)?, self.memory.read_ptr(binding + 8)?)))
            .collect()
    }

    /// Replace the bindings of the multi-cast delegate at `addr`
    pub fn write_bindings(&mut self, addr: u64, bindings: &[(u64, u64)]) -> RuntimeResult<()> {
        let data = self.resize_array(addr, bindings.len() as u32, BINDING_SIZE)?;
        for (i, (object, function)) in bindings.iter().enumerate() {
            let at = data + (i as u64) * BINDING_SIZE as u64;
            self.memory.write_ptr(at, *object)?;
            self.memory.write_ptr(at + 8, *function)?;
        }
        Ok(())
    }

    /// Call the function bound at `addr`; an unbound delegate does nothing
    pub fn process_delegate(&mut self, addr: u64, params: u64) -> RuntimeResult<()> {
        let object = self.memory.read_ptr(addr)?;
        let function = self.memory.read_ptr(addr + 8)?;
        if function == 0 {
            return Ok(());
        }
        self.invoke(object, function, params)
    }

    /// Call every function bound at `addr`, in binding order
    pub fn process_multicast(&mut self, addr: u64, params: u64) -> RuntimeResult<()> {
        for (object, function) in self.bindings(addr)? {
            self.invoke(object, function, params)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stitch_sdk::NativeMetadata;

    #[test]
    fn test_natural_alignment() {
        assert_eq!(natural_align(1), 1);
        assert_eq!(natural_align(12), 4);
        assert_eq!(natural_align(24), 8);
        assert_eq!(natural_align(0), 1);
        assert_eq!(map_value_offset(8, 4), 8);
        assert_eq!(map_value_offset(1, 8), 8);
    }

    #[test]
    fn test_string_round_trip_releases_old_storage() {
        let mut host = NativeHost::new(NativeMetadata::new());
        let addr = host.memory.alloc(HEADER_SIZE as usize);
        host.write_string(addr, "hello").unwrap();
        let first = host.array_header(addr).unwrap().data;
        host.write_string(addr, "héllo wörld").unwrap();
        assert!(!host.memory.is_block(first));
        assert_eq!(host.read_string(addr).unwrap(), "héllo wörld");

        host.write_string(addr, "").unwrap();
        assert_eq!(host.array_header(addr).unwrap(), ArrayHeader { data: 0, count: 0 });
        assert_eq!(host.read_string(addr).unwrap(), "");
    }

    #[test]
    fn test_names_are_interned() {
        let mut host = NativeHost::new(NativeMetadata::new());
        let a = host.name_id("Idle");
        assert_eq!(host.name_id("Idle"), a);
        assert_ne!(host.name_id("Run"), a);
        assert_eq!(host.name(a).unwrap(), "Idle");
        assert_eq!(host.name(0).unwrap(), "None");
    }
}
