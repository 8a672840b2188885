//! OpenCL kernel compilation and dispatch

use std::ffi::CString;

use ocl::core::{
    self, ArgVal, CommandQueue, Event, Kernel, KernelInfo, KernelInfoResult, KernelWorkGroupInfo,
    KernelWorkGroupInfoResult, ProgramBuildInfo, ProgramBuildInfoResult,
};

use super::buffer::{ClBuffer, wait_list};
use super::cl_error;
use super::context::ClContext;
use crate::dtype::ArgType;
use crate::error::{GpuError, Result};
use crate::hazard::BufferTable;
use crate::ops::check_scalar;

/// Compiled entry point and the buffers bound to its parameters
pub struct ClKernel {
    kernel: Kernel,
    context: ClContext,
    name: String,
    table: BufferTable<Event>,
}

impl ClKernel {
    /// Build `source` for the context's device and extract `name`.
    ///
    /// The program handle is released on every path; only the kernel keeps
    /// it alive.
    pub(crate) fn build(context: &ClContext, source: &str, name: &str, options: &str) -> Result<Self> {
        let source = CString::new(source)
            .map_err(|_| GpuError::invalid("kernel source contains a NUL byte"))?;
        let options = CString::new(options)
            .map_err(|_| GpuError::invalid("build options contain a NUL byte"))?;

        let program = core::create_program_with_source(&context.context, &[source])
            .map_err(|e| cl_error("clCreateProgramWithSource", e))?;

        let devices = std::slice::from_ref(&context.device);
        if let Err(e) = core::build_program(&program, Some(devices), &options, None, None) {
            let log = match core::get_program_build_info(
                &program,
                context.device,
                ProgramBuildInfo::BuildLog,
            ) {
                Ok(ProgramBuildInfoResult::BuildLog(log)) => log,
                _ => String::new(),
            };
            log::debug!("Build of {} failed:\n{}", name, log);
            let mut err = cl_error("clBuildProgram", e);
            if let GpuError::Implementation { message, .. } = &mut err
                && !log.trim().is_empty()
            {
                message.push('\n');
                message.push_str(log.trim());
            }
            return Err(err);
        }

        let kernel = core::create_kernel(&program, name).map_err(|e| cl_error("clCreateKernel", e))?;
        let num_args = match core::get_kernel_info(&kernel, KernelInfo::NumArgs)
            .map_err(|e| cl_error("clGetKernelInfo", e))?
        {
            KernelInfoResult::NumArgs(n) => n as usize,
            _ => 0,
        };

        log::debug!("Built kernel {} with {} arguments", name, num_args);
        Ok(Self {
            kernel,
            context: context.clone(),
            name: name.to_string(),
            table: BufferTable::new(num_args),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &ClContext {
        &self.context
    }

    /// Declared parameter count.
    pub fn num_args(&self) -> usize {
        self.table.len()
    }

    pub(crate) fn bind_scalar(&mut self, index: usize, ty: ArgType, value: &[u8]) -> Result<()> {
        self.table.check_index(index)?;
        check_scalar(ty, value)?;
        // SAFETY: `value` holds at least `ty.size()` bytes and is copied by the runtime
        let arg = unsafe { ArgVal::from_raw(ty.size(), value.as_ptr().cast(), false) };
        core::set_kernel_arg(&self.kernel, index as u32, arg)
            .map_err(|e| cl_error("clSetKernelArg", e))?;
        // a value argument replaces any buffer bound at this index
        self.table.unbind(index)
    }

    pub(crate) fn bind_buffer(&mut self, index: usize, buffer: &ClBuffer) -> Result<()> {
        self.table.bind(index, &buffer.hazard)?;
        core::set_kernel_arg(&self.kernel, index as u32, ArgVal::mem(&buffer.mem))
            .map_err(|e| cl_error("clSetKernelArg", e))
    }

    /// Largest work-group the device accepts for this kernel.
    pub fn max_work_group_size(&self) -> Result<usize> {
        match core::get_kernel_work_group_info(
            &self.kernel,
            self.context.device,
            KernelWorkGroupInfo::WorkGroupSize,
        )
        .map_err(|e| cl_error("clGetKernelWorkGroupInfo", e))?
        {
            KernelWorkGroupInfoResult::WorkGroupSize(n) => Ok(n.max(1)),
            _ => Ok(1),
        }
    }

    /// Enqueue one work-group of at most `work_size` items.
    pub(crate) fn launch(&self, queue: &CommandQueue, work_size: usize) -> Result<()> {
        self.enqueue(queue, work_size, log::Level::Warn)
    }

    /// Launch a generated kernel that loops over its range with a grid
    /// stride, so clamping the work size is expected.
    pub(crate) fn launch_looping(&self, queue: &CommandQueue, work_size: usize) -> Result<()> {
        self.enqueue(queue, work_size, log::Level::Debug)
    }

    fn enqueue(&self, queue: &CommandQueue, work_size: usize, clamp_level: log::Level) -> Result<()> {
        if work_size == 0 {
            return Ok(());
        }

        let max = self.max_work_group_size()?;
        let global = if work_size > max {
            log::log!(
                clamp_level,
                "Clamping {} launch from {} to {} work-items",
                self.name,
                work_size,
                max
            );
            max
        } else {
            work_size
        };

        let pending = self.table.acquire();
        let wait = pending.wait_list();
        let mut event = Event::null();
        // SAFETY: every argument was bound through set_kernel_arg
        let enqueued = unsafe {
            core::enqueue_kernel(
                queue,
                &self.kernel,
                1,
                None,
                &[global, 1, 1],
                None,
                wait_list(&wait),
                Some(&mut event),
            )
        };

        match enqueued {
            Ok(()) => {
                log::debug!(
                    "Dispatched {} with {} work-items over {} buffers",
                    self.name,
                    global,
                    pending.num_buffers()
                );
                pending.commit(event);
                Ok(())
            }
            Err(e) => {
                pending.abort();
                Err(cl_error("clEnqueueNDRangeKernel", e))
            }
        }
    }
}
