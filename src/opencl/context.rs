//! OpenCL context selection

use std::ffi::{CStr, c_char, c_void};

use ocl::core::{
    self, Context, ContextInfo, ContextInfoResult, ContextProperties, DeviceId, DeviceInfo,
    DeviceInfoResult, DeviceType,
};

use super::cl_error;
use crate::config::DeviceSelector;
use crate::error::{GpuError, Result};

/// Context bound to one device
///
/// Cloning retains the underlying context.
#[derive(Clone)]
pub struct ClContext {
    pub(crate) context: Context,
    pub(crate) device: DeviceId,
}

impl ClContext {
    /// Create a context on the device picked by `selector`.
    ///
    /// Devices of every type are enumerated; indices past the end of the
    /// platform or device list are `InvalidArgument`.
    pub fn new(selector: DeviceSelector) -> Result<Self> {
        let platforms = core::get_platform_ids().map_err(|e| cl_error("clGetPlatformIDs", e))?;
        let platform = *platforms.get(selector.platform()).ok_or_else(|| {
            GpuError::invalid(format!(
                "platform index {} out of range (available: {})",
                selector.platform(),
                platforms.len()
            ))
        })?;

        let devices = core::get_device_ids(platform, Some(DeviceType::ALL), None)
            .map_err(|e| cl_error("clGetDeviceIDs", e))?;
        let device = *devices.get(selector.device()).ok_or_else(|| {
            GpuError::invalid(format!(
                "device index {} out of range (available: {})",
                selector.device(),
                devices.len()
            ))
        })?;

        let properties = ContextProperties::new().platform(platform);
        let context = core::create_context(
            Some(&properties),
            &[device],
            Some(context_error_notify),
            None,
        )
        .map_err(|e| cl_error("clCreateContext", e))?;

        let context = Self { context, device };
        log::debug!(
            "Created OpenCL context on platform {} device {} ({})",
            selector.platform(),
            selector.device(),
            context.device_name()
        );
        Ok(context)
    }

    /// Adopt an existing context, using its first device.
    pub fn from_context(context: Context) -> Result<Self> {
        let devices = match core::get_context_info(&context, ContextInfo::Devices)
            .map_err(|e| cl_error("clGetContextInfo", e))?
        {
            ContextInfoResult::Devices(devices) => devices,
            _ => Vec::new(),
        };
        let device = *devices
            .first()
            .ok_or_else(|| GpuError::invalid("context has no devices"))?;
        Ok(Self { context, device })
    }

    pub fn as_core(&self) -> &Context {
        &self.context
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Identity of the underlying context handle.
    pub fn key(&self) -> usize {
        self.context.as_ptr() as usize
    }

    /// Space-separated extension string of the device.
    pub fn device_extensions(&self) -> Result<String> {
        match core::get_device_info(self.device, DeviceInfo::Extensions)
            .map_err(|e| cl_error("clGetDeviceInfo", e))?
        {
            DeviceInfoResult::Extensions(raw) => Ok(raw),
            _ => Ok(String::new()),
        }
    }

    pub fn device_name(&self) -> String {
        match core::get_device_info(self.device, DeviceInfo::Name) {
            Ok(DeviceInfoResult::Name(name)) => name,
            _ => "Unknown".to_string(),
        }
    }
}

impl std::fmt::Debug for ClContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClContext")
            .field("key", &format_args!("{:#x}", self.key()))
            .finish()
    }
}

/// Asynchronous error reports from the OpenCL runtime.
extern "C" fn context_error_notify(
    errinfo: *const c_char,
    _private_info: *const c_void,
    _cb: usize,
    _user_data: *mut c_void,
) {
    if errinfo.is_null() {
        return;
    }
    // SAFETY: the runtime passes a NUL-terminated string valid for the call
    let message = unsafe { CStr::from_ptr(errinfo) };
    log::error!("OpenCL context error: {}", message.to_string_lossy());
}
