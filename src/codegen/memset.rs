//! Memset kernel generation
//!
//! A fill of `[offset, end)` is done with the widest store the region allows:
//! 16, 8 or 4 bytes when both the length and the byte offset are multiples
//! of it, single bytes otherwise. Byte stores need the device's
//! byte-addressable-store extension.

use crate::config::KernelFlags;
use crate::error::{GpuError, Result};

/// Entry point of every generated memset kernel.
pub const MEMSET_KERNEL_NAME: &str = "kmemset";

/// Store granularity of a memset kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemsetWidth {
    Bytes16,
    Bytes8,
    Bytes4,
    Bytes1,
}

impl MemsetWidth {
    pub fn bytes(self) -> usize {
        match self {
            MemsetWidth::Bytes16 => 16,
            MemsetWidth::Bytes8 => 8,
            MemsetWidth::Bytes4 => 4,
            MemsetWidth::Bytes1 => 1,
        }
    }

    /// Widest granularity naturally aligned for the region.
    pub fn for_region(offset: usize, len: usize) -> Self {
        [MemsetWidth::Bytes16, MemsetWidth::Bytes8, MemsetWidth::Bytes4]
            .into_iter()
            .find(|w| len % w.bytes() == 0 && offset % w.bytes() == 0)
            .unwrap_or(MemsetWidth::Bytes1)
    }

    fn element_type(self) -> &'static str {
        match self {
            MemsetWidth::Bytes16 => "uint4",
            MemsetWidth::Bytes8 => "uint2",
            MemsetWidth::Bytes4 => "unsigned int",
            MemsetWidth::Bytes1 => "unsigned char",
        }
    }
}

/// Generated memset kernel for one region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemsetKernel {
    pub width: MemsetWidth,
    /// Number of stores (the launch work size and the kernel's `n` argument)
    pub count: u32,
    pub source: String,
}

impl MemsetKernel {
    /// Build the kernel filling `len` bytes at `offset` with `value`.
    ///
    /// Returns `None` for an empty region.
    pub fn new(offset: usize, len: usize, value: u8) -> Result<Option<Self>> {
        if len == 0 {
            return Ok(None);
        }

        let width = MemsetWidth::for_region(offset, len);
        let count = u32::try_from(len / width.bytes()).map_err(|_| {
            GpuError::invalid(format!(
                "memset of {} bytes exceeds the kernel's 32-bit element count",
                len
            ))
        })?;

        Ok(Some(Self {
            width,
            count,
            source: render(width, offset, value),
        }))
    }

    /// Flags the kernel must be compiled with.
    pub fn flags(&self) -> KernelFlags {
        match self.width {
            MemsetWidth::Bytes1 => KernelFlags::SMALL,
            _ => KernelFlags::NONE,
        }
    }
}

/// The byte replicated into every byte of a 32-bit word.
pub fn fill_pattern(value: u8) -> u32 {
    u32::from_ne_bytes([value; 4])
}

fn render(width: MemsetWidth, offset: usize, value: u8) -> String {
    let ty = width.element_type();
    let pattern = fill_pattern(value);
    let store = match width {
        MemsetWidth::Bytes16 => format!("(uint4)({p}u, {p}u, {p}u, {p}u)", p = pattern),
        MemsetWidth::Bytes8 => format!("(uint2)({p}u, {p}u)", p = pattern),
        MemsetWidth::Bytes4 => format!("{}u", pattern),
        MemsetWidth::Bytes1 => format!("{}", value),
    };

    let mut src = String::with_capacity(320);
    src.push_str(&format!(
        "__kernel void {}(unsigned int n, __global {} *mem) {{\n",
        MEMSET_KERNEL_NAME, ty
    ));
    src.push_str("  unsigned int i;\n");
    if width == MemsetWidth::Bytes1 {
        src.push_str(&format!("  mem += {};\n", offset));
    } else {
        src.push_str("  __global char *tmp = (__global char *)mem;\n");
        src.push_str(&format!("  tmp += {}; mem = (__global {} *)tmp;\n", offset, ty));
    }
    src.push_str("  for (i = get_global_id(0); i < n; i += get_global_size(0)) {\n");
    src.push_str(&format!("    mem[i] = {};\n", store));
    src.push_str("  }\n}\n");
    src
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 64, MemsetWidth::Bytes16)]
    #[case(0, 24, MemsetWidth::Bytes8)]
    #[case(0, 12, MemsetWidth::Bytes4)]
    #[case(0, 7, MemsetWidth::Bytes1)]
    #[case(8, 32, MemsetWidth::Bytes8)]
    #[case(4, 32, MemsetWidth::Bytes4)]
    #[case(3, 4093, MemsetWidth::Bytes1)]
    #[case(2, 16, MemsetWidth::Bytes1)]
    fn test_width_selection(
        #[case] offset: usize,
        #[case] len: usize,
        #[case] expected: MemsetWidth,
    ) {
        assert_eq!(MemsetWidth::for_region(offset, len), expected);
    }

    #[test]
    fn test_pattern_replicates_byte() {
        assert_eq!(fill_pattern(0xAB), 0xABAB_ABAB);
        assert_eq!(fill_pattern(0), 0);
        assert_eq!(fill_pattern(1), 0x0101_0101);
    }

    #[test]
    fn test_empty_region() {
        assert!(MemsetKernel::new(16, 0, 0xFF).unwrap().is_none());
    }

    #[test]
    fn test_vector_kernel() {
        let k = MemsetKernel::new(32, 4096 - 32, 0xAB).unwrap().unwrap();
        assert_eq!(k.width, MemsetWidth::Bytes16);
        assert_eq!(k.count, (4096 - 32) / 16);
        assert_eq!(k.flags(), KernelFlags::NONE);
        assert!(k.source.contains("__kernel void kmemset(unsigned int n, __global uint4 *mem)"));
        assert!(k.source.contains("tmp += 32;"));
        let p = fill_pattern(0xAB);
        assert!(k.source.contains(&format!("(uint4)({p}u, {p}u, {p}u, {p}u)")));
        assert!(k.source.contains("i += get_global_size(0)"));
    }

    #[test]
    fn test_byte_kernel_needs_small_stores() {
        let k = MemsetKernel::new(1, 7, 0xAB).unwrap().unwrap();
        assert_eq!(k.width, MemsetWidth::Bytes1);
        assert_eq!(k.count, 7);
        assert_eq!(k.flags(), KernelFlags::SMALL);
        assert!(k.source.contains("__global unsigned char *mem"));
        assert!(k.source.contains("mem += 1;"));
        assert!(k.source.contains("mem[i] = 171;"));
    }

    #[test]
    fn test_source_grows_with_large_offsets() {
        let k = MemsetKernel::new(usize::MAX - 15, 16, 0xFF).unwrap().unwrap();
        assert!(k.source.contains(&(usize::MAX - 15).to_string()));
        assert!(k.source.ends_with("}\n}\n"));
    }
}
