//! Error types for backend operations
//!
//! Every entry point of the operation table fails with exactly one of the
//! kinds below. Device API failures carry the step that failed and, when the
//! API reported one, its numeric status code.

use thiserror::Error;

/// Plain error discriminant, for callers that only branch on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad index, empty source list, out-of-range selector, out-of-bounds region
    InvalidArgument,
    /// Host or device memory exhausted
    OutOfMemory,
    /// Unexpected host failure
    System,
    /// The device API reported a fault
    Implementation,
    /// A requested optional capability is unavailable on the device
    DeviceUnsupported,
}

/// Error returned by backend operations
#[derive(Debug, Clone, Error)]
pub enum GpuError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("system error: {0}")]
    System(String),

    #[error("{context} failed: {message}")]
    Implementation {
        /// Name of the device API step that failed
        context: &'static str,
        /// Status code reported by the device API, if any
        status: Option<i32>,
        message: String,
    },

    #[error("device does not support {0}")]
    DeviceUnsupported(String),
}

impl GpuError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::DeviceUnsupported(msg.into())
    }

    /// Build an implementation error from a device status code.
    pub fn from_status(context: &'static str, status: i32) -> Self {
        Self::Implementation {
            context,
            status: Some(status),
            message: describe_status(status).to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::OutOfMemory(_) => ErrorKind::OutOfMemory,
            Self::System(_) => ErrorKind::System,
            Self::Implementation { .. } => ErrorKind::Implementation,
            Self::DeviceUnsupported(_) => ErrorKind::DeviceUnsupported,
        }
    }

    /// Device status code, for implementation errors that carry one.
    pub fn status(&self) -> Option<i32> {
        match self {
            Self::Implementation { status, .. } => *status,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GpuError>;

/// Status code for host memory exhaustion (`CL_OUT_OF_HOST_MEMORY`).
pub const STATUS_OUT_OF_HOST_MEMORY: i32 = -6;

/// Human-readable message for an OpenCL status code.
pub fn describe_status(status: i32) -> &'static str {
    match status {
        0 => "Success!",
        -1 => "Device not found.",
        -2 => "Device not available",
        -3 => "Compiler not available",
        -4 => "Memory object allocation failure",
        -5 => "Out of resources",
        -6 => "Out of host memory",
        -7 => "Profiling information not available",
        -8 => "Memory copy overlap",
        -9 => "Image format mismatch",
        -10 => "Image format not supported",
        -11 => "Program build failure",
        -12 => "Map failure",
        -13 => "Buffer offset improperly aligned",
        -14 => "Event in wait list has an error status",
        -30 => "Invalid value",
        -31 => "Invalid device type",
        -32 => "Invalid platform",
        -33 => "Invalid device",
        -34 => "Invalid context",
        -35 => "Invalid queue properties",
        -36 => "Invalid command queue",
        -37 => "Invalid host pointer",
        -38 => "Invalid memory object",
        -39 => "Invalid image format descriptor",
        -40 => "Invalid image size",
        -41 => "Invalid sampler",
        -42 => "Invalid binary",
        -43 => "Invalid build options",
        -44 => "Invalid program",
        -45 => "Invalid program executable",
        -46 => "Invalid kernel name",
        -47 => "Invalid kernel definition",
        -48 => "Invalid kernel",
        -49 => "Invalid argument index",
        -50 => "Invalid argument value",
        -51 => "Invalid argument size",
        -52 => "Invalid kernel arguments",
        -53 => "Invalid work dimension",
        -54 => "Invalid work group size",
        -55 => "Invalid work item size",
        -56 => "Invalid global offset",
        -57 => "Invalid event wait list",
        -58 => "Invalid event",
        -59 => "Invalid operation",
        -60 => "Invalid OpenGL object",
        -61 => "Invalid buffer size",
        -62 => "Invalid mip-map level",
        -63 => "Invalid global work size",
        -64 => "Invalid property",
        _ => "Unknown error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, "Success!")]
    #[case(-4, "Memory object allocation failure")]
    #[case(-11, "Program build failure")]
    #[case(-46, "Invalid kernel name")]
    #[case(-63, "Invalid global work size")]
    #[case(-1000, "Unknown error")]
    fn test_describe_status(#[case] status: i32, #[case] expected: &str) {
        assert_eq!(describe_status(status), expected);
    }

    #[test]
    fn test_kind_and_status() {
        let err = GpuError::from_status("clBuildProgram", -11);
        assert_eq!(err.kind(), ErrorKind::Implementation);
        assert_eq!(err.status(), Some(-11));
        assert_eq!(err.to_string(), "clBuildProgram failed: Program build failure");

        let err = GpuError::invalid("no source fragments");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.status(), None);
        assert_eq!(GpuError::unsupported("cl_khr_fp64").kind(), ErrorKind::DeviceUnsupported);
    }
}
