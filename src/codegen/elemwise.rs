//! Strided type-converting copy kernel
//!
//! Every work-item walks the flat element range with a grid stride. Input
//! and output byte pointers are advanced per axis by the fragments from
//! [`emit_perdim`], then one element is loaded, converted with a C cast and
//! stored.

use super::perdim::{Layout, emit_perdim};
use crate::config::KernelFlags;
use crate::dtype::DType;
use crate::error::{GpuError, Result};

/// Entry point of the generated copy kernel.
pub const ELEM_KERNEL_NAME: &str = "elemk";

/// One side of a strided copy
#[derive(Debug, Clone, Copy)]
pub struct CopyOperand<'a> {
    /// Byte offset of element zero inside the buffer
    pub offset: usize,
    pub dtype: DType,
    pub layout: Layout<'a>,
}

impl<'a> CopyOperand<'a> {
    pub fn new(offset: usize, dtype: DType, layout: Layout<'a>) -> Self {
        Self {
            offset,
            dtype,
            layout,
        }
    }

    /// `InvalidArgument` unless every element addressed lies inside `[0, buffer_len)`.
    pub fn check_bounds(&self, buffer_len: usize, what: &str) -> Result<()> {
        let Some((min, max)) = self.layout.byte_extent(self.dtype.size())? else {
            return Ok(());
        };
        let offset = isize::try_from(self.offset)
            .map_err(|_| GpuError::invalid(format!("{} offset {} out of range", what, self.offset)))?;
        let low = offset.checked_add(min);
        let high = offset.checked_add(max);
        match (low, high) {
            (Some(low), Some(high)) if low >= 0 && high as usize <= buffer_len => Ok(()),
            _ => Err(GpuError::invalid(format!(
                "{} reaches bytes [{} + {}, {} + {}) of a {} byte buffer",
                what, self.offset, min, self.offset, max, buffer_len
            ))),
        }
    }
}

/// Generated source of one strided copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElemCopy {
    /// Header, input axes, output axes, footer
    pub fragments: Vec<String>,
    pub flags: KernelFlags,
    /// Elements copied, also the requested launch size
    pub count: usize,
}

impl ElemCopy {
    /// Generate the copy from `input` to `output`.
    ///
    /// Returns `None` when there is nothing to copy.
    pub fn new(input: &CopyOperand<'_>, output: &CopyOperand<'_>) -> Result<Option<Self>> {
        let count = output.layout.count()?;
        let input_count = input.layout.count()?;
        if input_count != count {
            return Err(GpuError::invalid(format!(
                "copy from {} elements into {} elements",
                input_count, count
            )));
        }
        let flags = copy_flags(input.dtype, output.dtype)?;
        if count == 0 {
            return Ok(None);
        }

        let mut fragments = Vec::with_capacity(2 + input.layout.ndim() + output.layout.ndim());
        fragments.push(header(input, output, count));
        fragments.extend(emit_perdim(input.layout.dims(), input.layout.strides(), "a_p")?);
        fragments.extend(emit_perdim(output.layout.dims(), output.layout.strides(), "b_p")?);
        fragments.push(FOOTER.to_string());

        Ok(Some(Self {
            fragments,
            flags,
            count,
        }))
    }
}

/// Compile flags needed to move `input` elements into `output` elements.
///
/// Sub-word stores are requested from the element sizes alone; strides are
/// not inspected.
pub fn copy_flags(input: DType, output: DType) -> Result<KernelFlags> {
    if input.is_complex() || output.is_complex() {
        return Err(GpuError::unsupported("complex numbers"));
    }

    let mut flags = KernelFlags::CLUDA;
    if input.is_double() || output.is_double() {
        flags |= KernelFlags::DOUBLE;
    }
    if input.is_half() || output.is_half() {
        flags |= KernelFlags::HALF;
    }
    if input.size() < 4 || output.size() < 4 {
        flags |= KernelFlags::SMALL;
    }
    Ok(flags)
}

const FOOTER: &str = "\
    __global const DTYPEA *a = (__global const DTYPEA *)a_p;
    __global DTYPEB *b = (__global DTYPEB *)b_p;
    b[0] = (DTYPEB)a[0];
  }
}
";

fn header(input: &CopyOperand<'_>, output: &CopyOperand<'_>, count: usize) -> String {
    let mut src = String::with_capacity(640);
    src.push_str(&format!("#define DTYPEA {}\n", input.dtype.device_name()));
    src.push_str(&format!("#define DTYPEB {}\n", output.dtype.device_name()));
    src.push_str(&format!(
        "__kernel void {}(__global const DTYPEA *a_data, __global DTYPEB *b_data) {{\n",
        ELEM_KERNEL_NAME
    ));
    src.push_str("  const ulong idx = get_global_id(0);\n");
    src.push_str("  const ulong numThreads = get_global_size(0);\n");
    src.push_str("  __global char *tmp;\n");
    src.push_str(&format!(
        "  tmp = (__global char *)a_data; tmp += {}UL; a_data = (__global const DTYPEA *)tmp;\n",
        input.offset
    ));
    src.push_str(&format!(
        "  tmp = (__global char *)b_data; tmp += {}UL; b_data = (__global DTYPEB *)tmp;\n",
        output.offset
    ));
    src.push_str(&format!(
        "  for (ulong i = idx; i < {}UL; i += numThreads) {{\n",
        count
    ));
    src.push_str("    __global const char *a_p = (__global const char *)a_data;\n");
    src.push_str("    __global char *b_p = (__global char *)b_data;\n");
    src
}
