//! Shared helpers for OpenCL integration tests

#![allow(dead_code)]

use gpuarray_cl::{BackendConfig, BufferOps, ClContext, DeviceSelector, OpenClBackend};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Backend and a context on the first device, or `None` when no device is present.
pub fn setup() -> Option<(OpenClBackend, ClContext)> {
    init_logger();
    if !OpenClBackend::is_available() {
        eprintln!("OpenCL not available, skipping test");
        return None;
    }
    let backend = OpenClBackend::new(BackendConfig::default());
    match backend.init(DeviceSelector::new(0, 0)) {
        Ok(context) => Some((backend, context)),
        Err(e) => {
            eprintln!("OpenCL device not available: {}", e);
            None
        }
    }
}

/// Deterministic non-constant bytes.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

pub fn f32_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_ne_bytes()).collect()
}

pub fn i32_bytes(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_ne_bytes()).collect()
}

pub fn bytes_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

pub fn bytes_f64(bytes: &[u8]) -> Vec<f64> {
    bytes
        .chunks_exact(8)
        .map(|c| f64::from_ne_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect()
}

pub fn bytes_u32(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
