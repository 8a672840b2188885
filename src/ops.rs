//! Backend operation table
//!
//! [`BufferOps`] is the fixed contract every device backend exposes. The
//! array runtime drives buffers and kernels only through it, so a backend
//! for another compute API can be swapped in without touching callers.
//!
//! Ordering: operations touching the same buffer run in the order they were
//! issued. Blocking host transfers return after completion; device copies
//! and launches return once enqueued.

use crate::codegen::CopyOperand;
use crate::config::{DeviceSelector, KernelFlags};
use crate::dtype::ArgType;
use crate::error::{GpuError, Result};

pub use crate::codegen::Layout;

pub trait BufferOps {
    /// Caller-owned handle to a selected device
    type Context;
    /// Device allocation with its hazard slot
    type Buffer;
    /// Compiled entry point with its buffer reference table
    type Kernel;

    /// Open a context on the device picked by `selector`.
    fn init(&self, selector: DeviceSelector) -> Result<Self::Context>;

    /// Allocate `size` bytes of device memory.
    fn alloc(&self, context: &Self::Context, size: usize) -> Result<Self::Buffer>;

    /// Release the allocation and any outstanding event.
    fn free(&self, buffer: Self::Buffer) {
        drop(buffer);
    }

    /// Whether both handles refer to the same underlying allocation.
    fn aliases(&self, a: &Self::Buffer, b: &Self::Buffer) -> Result<bool>;

    /// Device-to-device copy of `size` bytes.
    fn copy(
        &self,
        dst: &Self::Buffer,
        dst_offset: usize,
        src: &Self::Buffer,
        src_offset: usize,
        size: usize,
    ) -> Result<()>;

    /// Blocking read of `dst.len()` bytes starting at `src_offset`.
    fn read(&self, dst: &mut [u8], src: &Self::Buffer, src_offset: usize) -> Result<()>;

    /// Blocking write of `src` at `dst_offset`.
    fn write(&self, dst: &Self::Buffer, dst_offset: usize, src: &[u8]) -> Result<()>;

    /// Set every byte from `offset` to the end of the buffer to `value`.
    fn fill(&self, dst: &Self::Buffer, offset: usize, value: u8) -> Result<()>;

    /// Compile `fragments` and extract the entry point `name`.
    fn compile<S: AsRef<str>>(
        &self,
        context: &Self::Context,
        fragments: &[S],
        name: &str,
        flags: KernelFlags,
    ) -> Result<Self::Kernel>;

    fn release_kernel(&self, kernel: Self::Kernel) {
        drop(kernel);
    }

    /// Bind a value argument. `value` holds at least `ty.size()` bytes.
    fn bind_scalar(
        &self,
        kernel: &mut Self::Kernel,
        index: usize,
        ty: ArgType,
        value: &[u8],
    ) -> Result<()>;

    /// Bind a buffer argument and track it for hazards at launch.
    fn bind_buffer(
        &self,
        kernel: &mut Self::Kernel,
        index: usize,
        buffer: &Self::Buffer,
    ) -> Result<()>;

    /// Dispatch a single work-group of at most `work_size` items.
    fn launch(&self, kernel: &Self::Kernel, work_size: usize) -> Result<()>;

    /// Strided type-converting copy from `input` into `output`.
    fn extcopy(
        &self,
        input: &Self::Buffer,
        input_desc: &CopyOperand<'_>,
        output: &Self::Buffer,
        output_desc: &CopyOperand<'_>,
    ) -> Result<()>;

    /// Message describing the most recent failure.
    fn last_error(&self) -> String;
}

/// `InvalidArgument` unless `[offset, offset + size)` fits in `len` bytes.
pub fn check_range(what: &str, offset: usize, size: usize, len: usize) -> Result<()> {
    match offset.checked_add(size) {
        Some(end) if end <= len => Ok(()),
        _ => Err(GpuError::invalid(format!(
            "{} range {}..+{} exceeds buffer of {} bytes",
            what, offset, size, len
        ))),
    }
}

/// `InvalidArgument` unless `value` can hold an argument of type `ty`.
pub fn check_scalar(ty: ArgType, value: &[u8]) -> Result<()> {
    if value.len() < ty.size() {
        return Err(GpuError::invalid(format!(
            "{:?} argument needs {} bytes, got {}",
            ty,
            ty.size(),
            value.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0, 0, true)]
    #[case(0, 16, 16, true)]
    #[case(8, 8, 16, true)]
    #[case(8, 9, 16, false)]
    #[case(17, 0, 16, false)]
    #[case(usize::MAX, 2, 16, false)]
    fn test_check_range(
        #[case] offset: usize,
        #[case] size: usize,
        #[case] len: usize,
        #[case] ok: bool,
    ) {
        assert_eq!(check_range("read", offset, size, len).is_ok(), ok);
    }

    #[test]
    fn test_check_scalar() {
        assert!(check_scalar(ArgType::Scalar(DType::UInt), &7u32.to_ne_bytes()).is_ok());
        assert!(check_scalar(ArgType::Scalar(DType::Double), &7u32.to_ne_bytes()).is_err());
        assert!(check_scalar(ArgType::Handle, &[0u8; 2]).is_err());
    }
}
