//! gpuarray-cl: OpenCL device backend for an array runtime
//!
//! Provides the operation table an array library drives to run on an
//! OpenCL device: buffer allocation and transfers, fills, kernel
//! compilation and dispatch, and a strided type-converting copy.
//!
//! # Architecture
//!
//! - **ops**: the [`BufferOps`] operation table every backend implements
//! - **codegen**: kernel source generation (preamble, memset, strided copy)
//! - **hazard**: per-buffer completion events ordering work on one buffer
//! - **cache**: per-context caches for command queues and capabilities
//! - **opencl**: the OpenCL implementation (feature: opencl)
//!
//! # Feature Flags
//!
//! - `opencl`: Enable the OpenCL backend

// ============================================================================
// Core Modules
// ============================================================================

pub mod cache;
pub mod capability;
pub mod codegen;
pub mod config;
pub mod dtype;
pub mod error;
pub mod hazard;
pub mod ops;

#[cfg(feature = "opencl")]
pub mod opencl;

// ============================================================================
// Re-exports
// ============================================================================

pub use codegen::{CopyOperand, Layout};
pub use config::{BackendConfig, DeviceSelector, KernelFlags};
pub use dtype::{ArgType, DType};
pub use error::{ErrorKind, GpuError, Result};
pub use ops::BufferOps;

#[cfg(feature = "opencl")]
pub use opencl::{ClBuffer, ClContext, ClKernel, OpenClBackend};
