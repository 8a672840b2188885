//! OpenCL backend
//!
//! Implements [`BufferOps`] on top of the raw OpenCL API.
//!
//! The backend caches one command queue and one parsed extension string per
//! context, in bounded LRU caches keyed by the context handle. Each cache
//! entry retains its context, so a cached key is never recycled by the
//! driver while the entry lives.

mod buffer;
mod context;
mod kernel;

pub use buffer::ClBuffer;
pub use context::ClContext;
pub use kernel::ClKernel;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ocl::core::{self, CommandQueue, CommandQueueProperties, Context, DeviceInfo, DeviceInfoResult};

use crate::cache::ResourceCache;
use crate::capability::Capabilities;
use crate::codegen::{
    CopyOperand, ELEM_KERNEL_NAME, ElemCopy, MEMSET_KERNEL_NAME, MemsetKernel, assemble_source,
    select_preamble,
};
use crate::config::{BackendConfig, DeviceSelector, KernelFlags};
use crate::dtype::{ArgType, DType};
use crate::error::{GpuError, Result, STATUS_OUT_OF_HOST_MEMORY, describe_status};
use crate::ops::BufferOps;

/// Map an OpenCL failure at step `context` onto the error taxonomy.
pub(crate) fn cl_error(context: &'static str, err: core::Error) -> GpuError {
    let status = err.api_status().map(|s| s as i32);
    if status == Some(STATUS_OUT_OF_HOST_MEMORY) {
        return GpuError::OutOfMemory(format!(
            "{}: {}",
            context,
            describe_status(STATUS_OUT_OF_HOST_MEMORY)
        ));
    }
    GpuError::Implementation {
        context,
        status,
        message: err.to_string(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
struct QueueEntry {
    _context: Context,
    queue: CommandQueue,
}

#[derive(Clone)]
struct CapabilityEntry {
    _context: Context,
    capabilities: Arc<Capabilities>,
}

/// OpenCL implementation of the operation table
pub struct OpenClBackend {
    config: BackendConfig,
    queues: Mutex<ResourceCache<usize, QueueEntry>>,
    capabilities: Mutex<ResourceCache<usize, CapabilityEntry>>,
    last_error: Mutex<Option<GpuError>>,
}

impl Default for OpenClBackend {
    fn default() -> Self {
        Self::new(BackendConfig::from_env())
    }
}

impl OpenClBackend {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            queues: Mutex::new(ResourceCache::new("queue", config.cache_capacity)),
            capabilities: Mutex::new(ResourceCache::new("capability", config.cache_capacity)),
            config,
            last_error: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Whether any OpenCL device is reachable.
    pub fn is_available() -> bool {
        core::get_platform_ids()
            .map(|platforms| !platforms.is_empty())
            .unwrap_or(false)
    }

    /// Command queue for `context`, created on first use.
    pub fn queue_for(&self, context: &ClContext) -> Result<CommandQueue> {
        let entry = lock(&self.queues).get_or_try_insert_with(context.key(), || {
            let supported = match core::get_device_info(context.device, DeviceInfo::QueueProperties)
                .map_err(|e| cl_error("clGetDeviceInfo", e))?
            {
                DeviceInfoResult::QueueProperties(props) => props,
                _ => CommandQueueProperties::empty(),
            };
            let properties = if self.config.prefer_out_of_order {
                supported & CommandQueueProperties::OUT_OF_ORDER_EXEC_MODE_ENABLE
            } else {
                CommandQueueProperties::empty()
            };
            let queue = core::create_command_queue(&context.context, context.device, Some(properties))
                .map_err(|e| cl_error("clCreateCommandQueue", e))?;
            log::debug!(
                "Created command queue for {:?} (out of order: {})",
                context,
                !properties.is_empty()
            );
            Ok::<_, GpuError>(QueueEntry {
                _context: context.context.clone(),
                queue,
            })
        })?;
        Ok(entry.queue)
    }

    /// Parsed extension set of the context's device.
    pub fn capabilities_for(&self, context: &ClContext) -> Result<Arc<Capabilities>> {
        let entry = lock(&self.capabilities).get_or_try_insert_with(context.key(), || {
            let capabilities = Capabilities::from_extensions(&context.device_extensions()?);
            log::debug!(
                "Device behind {:?} reports {} extensions",
                context,
                capabilities.len()
            );
            Ok::<_, GpuError>(CapabilityEntry {
                _context: context.context.clone(),
                capabilities: Arc::new(capabilities),
            })
        })?;
        Ok(entry.capabilities)
    }

    /// Drop every cached queue and capability entry.
    pub fn clear_caches(&self) {
        lock(&self.queues).clear();
        lock(&self.capabilities).clear();
    }

    fn record<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            *lock(&self.last_error) = Some(err.clone());
        }
        result
    }

    fn compile_kernel<S: AsRef<str>>(
        &self,
        context: &ClContext,
        fragments: &[S],
        name: &str,
        flags: KernelFlags,
    ) -> Result<ClKernel> {
        if fragments.is_empty() {
            return Err(GpuError::invalid("no source fragments"));
        }
        let preamble = select_preamble(flags, || self.capabilities_for(context))?;
        let source = assemble_source(&preamble, fragments);
        ClKernel::build(context, &source, name, &self.config.build_options)
    }

    fn fill_region(&self, dst: &ClBuffer, offset: usize, value: u8) -> Result<()> {
        if offset > dst.len() {
            return Err(GpuError::invalid(format!(
                "fill offset {} past end of {} byte buffer",
                offset,
                dst.len()
            )));
        }
        let Some(memset) = MemsetKernel::new(offset, dst.len() - offset, value)? else {
            return Ok(());
        };

        let mut kernel =
            self.compile_kernel(dst.context(), &[&memset.source], MEMSET_KERNEL_NAME, memset.flags())?;
        kernel.bind_scalar(0, ArgType::Scalar(DType::UInt), &memset.count.to_ne_bytes())?;
        kernel.bind_buffer(1, dst)?;
        let queue = self.queue_for(dst.context())?;
        kernel.launch_looping(&queue, memset.count as usize)
    }

    fn strided_copy(
        &self,
        input: &ClBuffer,
        input_desc: &CopyOperand<'_>,
        output: &ClBuffer,
        output_desc: &CopyOperand<'_>,
    ) -> Result<()> {
        let Some(copy) = ElemCopy::new(input_desc, output_desc)? else {
            return Ok(());
        };
        input_desc.check_bounds(input.len(), "copy input")?;
        output_desc.check_bounds(output.len(), "copy output")?;

        let mut kernel =
            self.compile_kernel(input.context(), copy.fragments.as_slice(), ELEM_KERNEL_NAME, copy.flags)?;
        kernel.bind_buffer(0, input)?;
        kernel.bind_buffer(1, output)?;
        let queue = self.queue_for(input.context())?;
        kernel.launch_looping(&queue, copy.count)
    }
}

impl BufferOps for OpenClBackend {
    type Context = ClContext;
    type Buffer = ClBuffer;
    type Kernel = ClKernel;

    fn init(&self, selector: DeviceSelector) -> Result<ClContext> {
        self.record(ClContext::new(selector))
    }

    fn alloc(&self, context: &ClContext, size: usize) -> Result<ClBuffer> {
        self.record(ClBuffer::alloc(context, size))
    }

    fn aliases(&self, a: &ClBuffer, b: &ClBuffer) -> Result<bool> {
        self.record(a.aliases(b))
    }

    fn copy(
        &self,
        dst: &ClBuffer,
        dst_offset: usize,
        src: &ClBuffer,
        src_offset: usize,
        size: usize,
    ) -> Result<()> {
        let result = if size == 0 {
            Ok(())
        } else {
            self.queue_for(dst.context())
                .and_then(|queue| dst.copy_from(&queue, dst_offset, src, src_offset, size))
        };
        self.record(result)
    }

    fn read(&self, dst: &mut [u8], src: &ClBuffer, src_offset: usize) -> Result<()> {
        let result = if dst.is_empty() {
            Ok(())
        } else {
            self.queue_for(src.context())
                .and_then(|queue| src.read_into(&queue, dst, src_offset))
        };
        self.record(result)
    }

    fn write(&self, dst: &ClBuffer, dst_offset: usize, src: &[u8]) -> Result<()> {
        let result = if src.is_empty() {
            Ok(())
        } else {
            self.queue_for(dst.context())
                .and_then(|queue| dst.write_from(&queue, dst_offset, src))
        };
        self.record(result)
    }

    fn fill(&self, dst: &ClBuffer, offset: usize, value: u8) -> Result<()> {
        self.record(self.fill_region(dst, offset, value))
    }

    fn compile<S: AsRef<str>>(
        &self,
        context: &ClContext,
        fragments: &[S],
        name: &str,
        flags: KernelFlags,
    ) -> Result<ClKernel> {
        self.record(self.compile_kernel(context, fragments, name, flags))
    }

    fn bind_scalar(
        &self,
        kernel: &mut ClKernel,
        index: usize,
        ty: ArgType,
        value: &[u8],
    ) -> Result<()> {
        self.record(kernel.bind_scalar(index, ty, value))
    }

    fn bind_buffer(&self, kernel: &mut ClKernel, index: usize, buffer: &ClBuffer) -> Result<()> {
        self.record(kernel.bind_buffer(index, buffer))
    }

    fn launch(&self, kernel: &ClKernel, work_size: usize) -> Result<()> {
        let result = if work_size == 0 {
            Ok(())
        } else {
            self.queue_for(kernel.context())
                .and_then(|queue| kernel.launch(&queue, work_size))
        };
        self.record(result)
    }

    fn extcopy(
        &self,
        input: &ClBuffer,
        input_desc: &CopyOperand<'_>,
        output: &ClBuffer,
        output_desc: &CopyOperand<'_>,
    ) -> Result<()> {
        self.record(self.strided_copy(input, input_desc, output, output_desc))
    }

    fn last_error(&self) -> String {
        match &*lock(&self.last_error) {
            Some(err) => err.to_string(),
            None => describe_status(0).to_string(),
        }
    }
}
