//! Kernel source generation
//!
//! Builds OpenCL C text for the preamble selected by [`KernelFlags`], the
//! alignment-specialized memset kernels and the strided type-converting
//! copy kernel.
//!
//! [`KernelFlags`]: crate::config::KernelFlags

pub mod elemwise;
pub mod memset;
pub mod perdim;
pub mod preamble;

pub use elemwise::{CopyOperand, ELEM_KERNEL_NAME, ElemCopy};
pub use memset::{MEMSET_KERNEL_NAME, MemsetKernel, MemsetWidth};
pub use perdim::{Layout, byte_extent, contiguous_strides, emit_perdim, strided_byte_offset};
pub use preamble::{CLUDA_PREAMBLE, assemble_source, select_preamble};
