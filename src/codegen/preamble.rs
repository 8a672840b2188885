//! Automatic source preamble
//!
//! Fragments prepended ahead of caller source, selected by [`KernelFlags`].

use crate::capability::{Capabilities, Extension};
use crate::config::KernelFlags;
use crate::error::{GpuError, Result};

/// Portability macros shared by kernels written for several compute APIs.
pub const CLUDA_PREAMBLE: &str = "\
#define local_barrier() barrier(CLK_LOCAL_MEM_FENCE)
#define WHITHIN_KERNEL /* empty */
#define KERNEL __kernel
#define GLOBAL_MEM __global
#define LOCAL_MEM __local
#define LOCAL_MEM_ARG __local
#define REQD_WG_SIZE(x, y, z) __attribute__((reqd_work_group_size(x, y, z)))
#define LID_0 get_local_id(0)
#define LID_1 get_local_id(1)
#define LID_2 get_local_id(2)
#define LDIM_0 get_local_size(0)
#define LDIM_1 get_local_size(1)
#define LDIM_2 get_local_size(2)
#define GID_0 get_group_id(0)
#define GID_1 get_group_id(1)
#define GID_2 get_group_id(2)
#define GDIM_0 get_num_groups(0)
#define GDIM_1 get_num_groups(1)
#define GDIM_2 get_num_groups(2)
#define ga_bool uchar
#define ga_byte char
#define ga_ubyte uchar
#define ga_short short
#define ga_ushort ushort
#define ga_int int
#define ga_uint uint
#define ga_long long
#define ga_ulong ulong
#define ga_float float
#define ga_double double
#define ga_half half
";

/// Preamble fragments for `flags`, in include order.
///
/// `capabilities` is only called when a flag needs a device extension, so
/// requests that need none never query the device. Complex numbers and the
/// alternate IR target are always rejected.
pub fn select_preamble<C: AsRef<Capabilities>>(
    flags: KernelFlags,
    capabilities: impl FnOnce() -> Result<C>,
) -> Result<Vec<&'static str>> {
    if flags.contains(KernelFlags::COMPLEX) {
        return Err(GpuError::unsupported("complex numbers"));
    }
    if flags.contains(KernelFlags::PTX) {
        return Err(GpuError::unsupported("PTX kernels"));
    }

    let mut preamble = Vec::with_capacity(4);
    if flags.contains(KernelFlags::CLUDA) {
        preamble.push(CLUDA_PREAMBLE);
    }

    let gated = [
        (KernelFlags::SMALL, Extension::ByteAddressableStore),
        (KernelFlags::DOUBLE, Extension::Fp64),
        (KernelFlags::HALF, Extension::Fp16),
    ];
    if gated.iter().any(|(flag, _)| flags.contains(*flag)) {
        let caps = capabilities()?;
        for (flag, ext) in gated {
            if flags.contains(flag) {
                caps.as_ref().require(ext)?;
                preamble.push(ext.pragma());
            }
        }
    }

    Ok(preamble)
}

/// Concatenate preamble and caller fragments into one program source.
pub fn assemble_source<S: AsRef<str>>(preamble: &[&str], fragments: &[S]) -> String {
    let len = preamble.iter().map(|s| s.len()).sum::<usize>()
        + fragments.iter().map(|s| s.as_ref().len()).sum::<usize>();
    let mut source = String::with_capacity(len);
    for fragment in preamble {
        source.push_str(fragment);
    }
    for fragment in fragments {
        source.push_str(fragment.as_ref());
    }
    source
}
