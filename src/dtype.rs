//! Element type registry
//!
//! Maps element type codes to their byte size and the device-side type name
//! defined by the portability preamble.

use std::fmt;

use crate::error::{GpuError, Result};

/// Array element type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// Boolean stored as one byte (0 = false, non-zero = true)
    Bool,
    Byte,
    UByte,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    /// 16-bit floating point
    Half,
    Float,
    Double,
    /// Complex of two `Float`
    CFloat,
    /// Complex of two `Double`
    CDouble,
}

impl DType {
    pub const ALL: [DType; 14] = [
        DType::Bool,
        DType::Byte,
        DType::UByte,
        DType::Short,
        DType::UShort,
        DType::Int,
        DType::UInt,
        DType::Long,
        DType::ULong,
        DType::Half,
        DType::Float,
        DType::Double,
        DType::CFloat,
        DType::CDouble,
    ];

    /// Stable numeric type code.
    pub fn code(self) -> i32 {
        match self {
            DType::Bool => 0,
            DType::Byte => 1,
            DType::UByte => 2,
            DType::Short => 3,
            DType::UShort => 4,
            DType::Int => 5,
            DType::UInt => 6,
            DType::Long => 7,
            DType::ULong => 8,
            DType::Float => 11,
            DType::Double => 12,
            DType::CFloat => 14,
            DType::CDouble => 15,
            DType::Half => 23,
        }
    }

    pub fn from_code(code: i32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.code() == code)
            .ok_or_else(|| GpuError::invalid(format!("unknown type code {}", code)))
    }

    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            DType::Bool | DType::Byte | DType::UByte => 1,
            DType::Short | DType::UShort | DType::Half => 2,
            DType::Int | DType::UInt | DType::Float => 4,
            DType::Long | DType::ULong | DType::Double | DType::CFloat => 8,
            DType::CDouble => 16,
        }
    }

    /// Type name usable in kernel source once the portability preamble is included.
    pub fn device_name(self) -> &'static str {
        match self {
            DType::Bool => "ga_bool",
            DType::Byte => "ga_byte",
            DType::UByte => "ga_ubyte",
            DType::Short => "ga_short",
            DType::UShort => "ga_ushort",
            DType::Int => "ga_int",
            DType::UInt => "ga_uint",
            DType::Long => "ga_long",
            DType::ULong => "ga_ulong",
            DType::Half => "ga_half",
            DType::Float => "ga_float",
            DType::Double => "ga_double",
            DType::CFloat => "ga_cfloat",
            DType::CDouble => "ga_cdouble",
        }
    }

    pub fn is_complex(self) -> bool {
        matches!(self, DType::CFloat | DType::CDouble)
    }

    pub fn is_half(self) -> bool {
        matches!(self, DType::Half)
    }

    /// True for types whose device representation needs double precision.
    pub fn is_double(self) -> bool {
        matches!(self, DType::Double | DType::CDouble)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.device_name())
    }
}

/// Type of a scalar kernel argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Scalar(DType),
    /// Opaque handle the size of a device memory object
    Handle,
}

impl ArgType {
    pub fn size(self) -> usize {
        match self {
            ArgType::Scalar(dtype) => dtype.size(),
            ArgType::Handle => std::mem::size_of::<*mut std::ffi::c_void>(),
        }
    }
}

impl From<DType> for ArgType {
    fn from(dtype: DType) -> Self {
        ArgType::Scalar(dtype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(DType::Bool, 1, "ga_bool")]
    #[case(DType::UShort, 2, "ga_ushort")]
    #[case(DType::Half, 2, "ga_half")]
    #[case(DType::Float, 4, "ga_float")]
    #[case(DType::ULong, 8, "ga_ulong")]
    #[case(DType::Double, 8, "ga_double")]
    #[case(DType::CDouble, 16, "ga_cdouble")]
    fn test_size_and_name(#[case] dtype: DType, #[case] size: usize, #[case] name: &str) {
        assert_eq!(dtype.size(), size);
        assert_eq!(dtype.device_name(), name);
    }

    #[test]
    fn test_code_lookup() {
        for dtype in DType::ALL {
            assert_eq!(DType::from_code(dtype.code()).unwrap(), dtype);
        }
        assert!(DType::from_code(9999).is_err());
    }

    #[test]
    fn test_type_classes() {
        assert!(DType::CFloat.is_complex());
        assert!(!DType::Double.is_complex());
        assert!(DType::CDouble.is_double());
        assert!(DType::Half.is_half());
        assert!(!DType::Float.is_double());
    }

    #[test]
    fn test_arg_type_size() {
        assert_eq!(ArgType::from(DType::UInt).size(), 4);
        assert_eq!(ArgType::Handle.size(), std::mem::size_of::<usize>());
    }
}
