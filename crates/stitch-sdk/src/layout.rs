//! Natural-alignment layout
//!
//! Both sides of the bridge lay records out the same way: members in
//! declaration order, each aligned to its own alignment, no tail padding
//! beyond the largest member alignment.

/// Incremental record layout
#[derive(Debug, Clone, Default)]
pub struct LayoutBuilder {
    size: u32,
    align: u32,
}

impl LayoutBuilder {
    /// Start an empty layout
    pub fn new() -> Self {
        Self { size: 0, align: 1 }
    }

    /// Place a member and return its offset
    pub fn push(&mut self, size: u32, align: u32) -> u32 {
        let align = align.max(1);
        let offset = align_up(self.size, align);
        self.size = offset + size;
        self.align = self.align.max(align);
        offset
    }

    /// Total size, rounded up to the record alignment
    pub fn finish(&self) -> u32 {
        align_up(self.size, self.align)
    }

    /// Largest member alignment seen so far
    pub fn align(&self) -> u32 {
        self.align
    }
}

/// Round `value` up to a multiple of `align`
#[inline]
pub fn align_up(value: u32, align: u32) -> u32 {
    let align = align.max(1);
    value.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_alignment() {
        let mut layout = LayoutBuilder::new();
        assert_eq!(layout.push(1, 1), 0);
        assert_eq!(layout.push(4, 4), 4);
        assert_eq!(layout.push(8, 8), 8);
        assert_eq!(layout.finish(), 16);
    }

    #[test]
    fn test_no_padding_for_packed_members() {
        let mut layout = LayoutBuilder::new();
        assert_eq!(layout.push(8, 8), 0);
        assert_eq!(layout.push(16, 8), 8);
        assert_eq!(layout.finish(), 24);
    }

    #[test]
    fn test_empty_layout() {
        assert_eq!(LayoutBuilder::new().finish(), 0);
    }
}
