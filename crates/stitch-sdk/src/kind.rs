//! Native value kinds
//!
//! The primitive cells a native buffer is made of. Every blittable managed
//! type, enum underlying type and pointer maps onto exactly one kind.

use serde::{Deserialize, Serialize};

/// A primitive native value kind
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NativeKind {
    /// One-byte boolean
    Bool = 0,
    /// Signed 8-bit integer
    I8 = 1,
    /// Unsigned 8-bit integer
    U8 = 2,
    /// Signed 16-bit integer
    I16 = 3,
    /// Unsigned 16-bit integer
    U16 = 4,
    /// Signed 32-bit integer
    I32 = 5,
    /// Unsigned 32-bit integer
    U32 = 6,
    /// Signed 64-bit integer
    I64 = 7,
    /// Unsigned 64-bit integer
    U64 = 8,
    /// 32-bit float
    F32 = 9,
    /// 64-bit float
    F64 = 10,
    /// Pointer-sized handle
    Ptr = 11,
}

impl NativeKind {
    /// Every kind, in tag order
    pub const ALL: [NativeKind; 12] = [
        NativeKind::Bool,
        NativeKind::I8,
        NativeKind::U8,
        NativeKind::I16,
        NativeKind::U16,
        NativeKind::I32,
        NativeKind::U32,
        NativeKind::I64,
        NativeKind::U64,
        NativeKind::F32,
        NativeKind::F64,
        NativeKind::Ptr,
    ];

    /// Size in bytes
    pub fn size(self) -> u32 {
        match self {
            Self::Bool | Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 | Self::Ptr => 8,
        }
    }

    /// Natural alignment in bytes
    #[inline]
    pub fn align(self) -> u32 {
        self.size()
    }

    /// Stable byte tag used in encoded instruction streams
    #[inline]
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Decode a byte tag
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }

    /// Suffix of the blittable helper methods for this kind (`ToNativeI32`, ...)
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Bool => "Bool",
            Self::I8 => "I8",
            Self::U8 => "U8",
            Self::I16 => "I16",
            Self::U16 => "U16",
            Self::I32 => "I32",
            Self::U32 => "U32",
            Self::I64 => "I64",
            Self::U64 => "U64",
            Self::F32 => "F32",
            Self::F64 => "F64",
            Self::Ptr => "Ptr",
        }
    }

    /// Whether the kind is an integer (including pointers)
    pub fn is_integral(self) -> bool {
        !matches!(self, Self::Bool | Self::F32 | Self::F64)
    }

    /// Whether the kind is a float
    pub fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }
}

impl std::fmt::Display for NativeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_stable() {
        for kind in NativeKind::ALL {
            assert_eq!(NativeKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(NativeKind::from_tag(12), None);
    }

    #[test]
    fn test_sizes() {
        assert_eq!(NativeKind::Bool.size(), 1);
        assert_eq!(NativeKind::U16.size(), 2);
        assert_eq!(NativeKind::F32.size(), 4);
        assert_eq!(NativeKind::Ptr.size(), 8);
        assert!(NativeKind::Ptr.is_integral());
        assert!(!NativeKind::F64.is_integral());
    }
}
