//! Simulated native address space
//!
//! Blocks are zero-initialized byte vectors placed at increasing, 16-byte
//! aligned addresses. Address 0 is never handed out, so it stays usable as
//! the null pointer. Stack allocations belong to the innermost frame and
//! are released when it is popped.

use std::collections::BTreeMap;

use stitch_sdk::{align_up, NativeKind};

use crate::error::{RuntimeError, RuntimeResult};

const FIRST_ADDRESS: u64 = 0x1_0000;
const BLOCK_ALIGN: u64 = 16;

/// A primitive value read from or written to native memory
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    /// Boolean
    Bool(bool),
    /// Any integer kind, sign- or zero-extended
    Int(i64),
    /// Any float kind
    Float(f64),
    /// Pointer
    Ptr(u64),
}

impl Scalar {
    /// Integer view; booleans are 0/1 and pointers their address
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Bool(b) => i64::from(b),
            Self::Int(i) => i,
            Self::Float(f) => f as i64,
            Self::Ptr(p) => p as i64,
        }
    }

    /// Float view
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Float(f) => f,
            other => other.as_i64() as f64,
        }
    }
}

/// Native heap and stack
#[derive(Debug)]
pub struct NativeMemory {
    blocks: BTreeMap<u64, Vec<u8>>,
    next: u64,
    frames: Vec<Vec<u64>>,
}

impl Default for NativeMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeMemory {
    /// Empty address space
    pub fn new() -> Self {
        Self {
            blocks: BTreeMap::new(),
            next: FIRST_ADDRESS,
            frames: Vec::new(),
        }
    }

    /// Allocate `size` zeroed bytes
    pub fn alloc(&mut self, size: usize) -> u64 {
        let addr = self.next;
        // Keep a gap so off-by-one accesses never land in the next block
        let span = align_up(size.max(1) as u32, BLOCK_ALIGN as u32) as u64 + BLOCK_ALIGN;
        self.next += span;
        self.blocks.insert(addr, vec![0; size]);
        addr
    }

    /// Release a block by its start address
    pub fn free(&mut self, addr: u64) -> RuntimeResult<()> {
        self.blocks.remove(&addr).map(|_| ()).ok_or(RuntimeError::InvalidFree(addr))
    }

    /// Whether `addr` is the start of a live block
    pub fn is_block(&self, addr: u64) -> bool {
        self.blocks.contains_key(&addr)
    }

    /// Number of live blocks
    pub fn live_blocks(&self) -> usize {
        self.blocks.len()
    }

    fn locate(&self, addr: u64, len: usize) -> RuntimeResult<(u64, usize)> {
        let invalid = RuntimeError::InvalidAccess { addr, len };
        let (&base, block) = self.blocks.range(..=addr).next_back().ok_or(invalid.clone())?;
        let start = (addr - base) as usize;
        if start + len > block.len() {
            return Err(invalid);
        }
        Ok((base, start))
    }

    /// Borrow `len` bytes at `addr`
    pub fn read(&self, addr: u64, len: usize) -> RuntimeResult<&[u8]> {
        let (base, start) = self.locate(addr, len)?;
        Ok(&self.blocks[&base][start..start + len])
    }

    /// Overwrite bytes at `addr`
    pub fn write(&mut self, addr: u64, bytes: &[u8]) -> RuntimeResult<()> {
        let (base, start) = self.locate(addr, bytes.len())?;
        let block = self
            .blocks
            .get_mut(&base)
            .ok_or(RuntimeError::InvalidAccess { addr, len: bytes.len() })?;
        block[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Copy `len` bytes between two native ranges
    pub fn copy(&mut self, dst: u64, src: u64, len: usize) -> RuntimeResult<()> {
        let bytes = self.read(src, len)?.to_vec();
        self.write(dst, &bytes)
    }

    /// Zero `len` bytes at `addr`
    pub fn zero(&mut self, addr: u64, len: usize) -> RuntimeResult<()> {
        self.write(addr, &vec![0; len])
    }

    /// Read one primitive
    pub fn read_kind(&self, addr: u64, kind: NativeKind) -> RuntimeResult<Scalar> {
        let bytes = self.read(addr, kind.size() as usize)?;
        let mut raw = [0u8; 8];
        raw[..bytes.len()].copy_from_slice(bytes);
        let bits = u64::from_le_bytes(raw);
        Ok(match kind {
            NativeKind::Bool => Scalar::Bool(bits != 0),
            NativeKind::I8 => Scalar::Int(bits as u8 as i8 as i64),
            NativeKind::U8 => Scalar::Int(bits as u8 as i64),
            NativeKind::I16 => Scalar::Int(bits as u16 as i16 as i64),
            NativeKind::U16 => Scalar::Int(bits as u16 as i64),
            NativeKind::I32 => Scalar::Int(bits as u32 as i32 as i64),
            NativeKind::U32 => Scalar::Int(bits as u32 as i64),
            NativeKind::I64 | NativeKind::U64 => Scalar::Int(bits as i64),
            NativeKind::F32 => Scalar::Float(f32::from_bits(bits as u32) as f64),
            NativeKind::F64 => Scalar::Float(f64::from_bits(bits)),
            NativeKind::Ptr => Scalar::Ptr(bits),
        })
    }

    /// Write one primitive, truncating integers to the kind's width
    pub fn write_kind(&mut self, addr: u64, kind: NativeKind, value: Scalar) -> RuntimeResult<()> {
        let bits = match kind {
            NativeKind::F32 => (value.as_f64() as f32).to_bits() as u64,
            NativeKind::F64 => value.as_f64().to_bits(),
            NativeKind::Bool => u64::from(value.as_i64() != 0),
            _ => value.as_i64() as u64,
        };
        let size = kind.size() as usize;
        self.write(addr, &bits.to_le_bytes()[..size])
    }

    /// Read a pointer
    pub fn read_ptr(&self, addr: u64) -> RuntimeResult<u64> {
        Ok(self.read_kind(addr, NativeKind::Ptr)?.as_i64() as u64)
    }

    /// Write a pointer
    pub fn write_ptr(&mut self, addr: u64, value: u64) -> RuntimeResult<()> {
        self.write_kind(addr, NativeKind::Ptr, Scalar::Ptr(value))
    }

    // ========================================================================
    // Stack frames
    // ========================================================================

    /// Open a frame for stack allocations
    pub fn push_frame(&mut self) {
        self.frames.push(Vec::new());
    }

    /// Close the innermost frame, releasing its allocations
    pub fn pop_frame(&mut self) {
        if let Some(frame) = self.frames.pop() {
            for addr in frame {
                self.blocks.remove(&addr);
            }
        }
    }

    /// Allocate in the innermost frame; heap-allocates with no open frame
    pub fn stack_alloc(&mut self, size: usize) -> u64 {
        let addr = self.alloc(size);
        if let Some(frame) = self.frames.last_mut() {
            frame.push(addr);
        }
        addr
    }
}
