//! Device optional-feature detection
//!
//! Parses the device extension string once per context and answers which
//! optional kernel features can be enabled.

use std::collections::BTreeSet;

use crate::error::{GpuError, Result};

/// Optional device feature a kernel may require
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extension {
    /// Byte and short addressable stores
    ByteAddressableStore,
    /// Double precision floating point
    Fp64,
    /// Half precision floating point
    Fp16,
}

impl Extension {
    pub fn name(self) -> &'static str {
        match self {
            Extension::ByteAddressableStore => "cl_khr_byte_addressable_store",
            Extension::Fp64 => "cl_khr_fp64",
            Extension::Fp16 => "cl_khr_fp16",
        }
    }

    /// Pragma enabling the extension in kernel source.
    pub fn pragma(self) -> &'static str {
        match self {
            Extension::ByteAddressableStore => {
                "#pragma OPENCL EXTENSION cl_khr_byte_addressable_store : enable\n"
            }
            Extension::Fp64 => "#pragma OPENCL EXTENSION cl_khr_fp64 : enable\n",
            Extension::Fp16 => "#pragma OPENCL EXTENSION cl_khr_fp16 : enable\n",
        }
    }
}

/// Extension set reported by a device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    extensions: BTreeSet<String>,
}

impl Capabilities {
    /// Parse a space-separated extension string.
    pub fn from_extensions(raw: &str) -> Self {
        Self {
            extensions: raw.split_whitespace().map(str::to_string).collect(),
        }
    }

    pub fn supports(&self, ext: Extension) -> bool {
        self.extensions.contains(ext.name())
    }

    /// `DeviceUnsupported` unless the device has `ext`.
    pub fn require(&self, ext: Extension) -> Result<()> {
        if self.supports(ext) {
            Ok(())
        } else {
            Err(GpuError::unsupported(ext.name()))
        }
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

impl AsRef<Capabilities> for Capabilities {
    fn as_ref(&self) -> &Capabilities {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_parse_extensions() {
        let caps = Capabilities::from_extensions(
            "cl_khr_global_int32_base_atomics cl_khr_fp64  cl_khr_byte_addressable_store ",
        );
        assert_eq!(caps.len(), 3);
        assert!(caps.supports(Extension::Fp64));
        assert!(caps.supports(Extension::ByteAddressableStore));
        assert!(!caps.supports(Extension::Fp16));
    }

    #[test]
    fn test_names_match_whole_tokens() {
        // a prefix of another extension name must not count
        let caps = Capabilities::from_extensions("cl_khr_fp64_extended");
        assert!(!caps.supports(Extension::Fp64));
    }

    #[test]
    fn test_require() {
        let caps = Capabilities::from_extensions("cl_khr_fp16");
        assert!(caps.require(Extension::Fp16).is_ok());
        let err = caps.require(Extension::Fp64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceUnsupported);
        assert!(err.to_string().contains("cl_khr_fp64"));
    }
}
