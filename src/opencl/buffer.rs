//! OpenCL device buffers
//!
//! A buffer owns one `cl_mem` and the hazard slot holding the completion
//! event of the last operation enqueued on it.

use ocl::core::{self, BufferRegion, CommandQueue, Event, Mem, MemFlags, MemInfo, MemInfoResult};

use super::cl_error;
use super::context::ClContext;
use crate::error::{GpuError, Result};
use crate::hazard::Hazard;
use crate::ops::check_range;

pub struct ClBuffer {
    pub(crate) mem: Mem,
    pub(crate) context: ClContext,
    len: usize,
    pub(crate) hazard: Hazard<Event>,
}

impl ClBuffer {
    /// Allocate `size` bytes. Zero-sized requests get a one byte allocation.
    pub fn alloc(context: &ClContext, size: usize) -> Result<Self> {
        // SAFETY: no host pointer is passed, the runtime owns the storage
        let mem = unsafe {
            core::create_buffer::<_, u8>(&context.context, MemFlags::READ_WRITE, size.max(1), None)
        }
        .map_err(|e| cl_error("clCreateBuffer", e))?;

        log::trace!("Allocated {} byte buffer", size);
        Ok(Self {
            mem,
            context: context.clone(),
            len: size,
            hazard: Hazard::new(),
        })
    }

    /// Adopt an existing allocation, retaining it. The hazard slot starts empty.
    ///
    /// The new buffer is ordered independently of any other `ClBuffer` over
    /// the same memory. Use [`ClBuffer::wrap_in`] or [`ClBuffer::sub_buffer`]
    /// for handles that must follow the host order of an existing buffer.
    pub fn wrap(context: &ClContext, mem: &Mem) -> Result<Self> {
        let len = match core::get_mem_object_info(mem, MemInfo::Size)
            .map_err(|e| cl_error("clGetMemObjectInfo", e))?
        {
            MemInfoResult::Size(len) => len,
            _ => 0,
        };
        Ok(Self {
            mem: mem.clone(),
            context: context.clone(),
            len,
            hazard: Hazard::new(),
        })
    }

    /// Adopt `mem`, which must be `parent` itself or one of its sub-buffers.
    /// Both buffers share one hazard slot.
    pub fn wrap_in(parent: &ClBuffer, mem: &Mem) -> Result<Self> {
        let mut buffer = Self::wrap(&parent.context, mem)?;
        if !parent.aliases(&buffer)? {
            return Err(GpuError::invalid("memory object is not part of the parent buffer"));
        }
        buffer.hazard = parent.hazard.share();
        Ok(buffer)
    }

    /// Sub-buffer over `[offset, offset + size)`, sharing this buffer's hazard slot.
    ///
    /// `offset` must satisfy the device's base address alignment.
    pub fn sub_buffer(&self, offset: usize, size: usize) -> Result<Self> {
        check_range("sub-buffer", offset, size, self.len)?;
        if size == 0 {
            return Err(GpuError::invalid("sub-buffer of zero bytes"));
        }
        let region = BufferRegion::<u8>::new(offset, size);
        let mem = core::create_sub_buffer(&self.mem, MemFlags::READ_WRITE, &region)
            .map_err(|e| cl_error("clCreateSubBuffer", e))?;
        log::trace!("Created {} byte sub-buffer at offset {}", size, offset);
        Ok(Self {
            mem,
            context: self.context.clone(),
            len: size,
            hazard: self.hazard.share(),
        })
    }

    pub fn as_mem(&self) -> &Mem {
        &self.mem
    }

    pub fn context(&self) -> &ClContext {
        &self.context
    }

    /// Logical size in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether an enqueued operation on this buffer may still be running.
    pub fn has_pending(&self) -> bool {
        self.hazard.is_held()
    }

    /// Identity of the allocation this buffer lives in: the parent of a
    /// sub-buffer, the buffer itself otherwise.
    fn root_key(&self) -> Result<usize> {
        let parent = match core::get_mem_object_info(&self.mem, MemInfo::AssociatedMemobject)
            .map_err(|e| cl_error("clGetMemObjectInfo", e))?
        {
            MemInfoResult::AssociatedMemobject(parent) => parent,
            _ => None,
        };
        Ok(match parent {
            Some(parent) => parent.as_ptr() as usize,
            None => self.mem.as_ptr() as usize,
        })
    }

    pub fn aliases(&self, other: &ClBuffer) -> Result<bool> {
        if self.mem.as_ptr() == other.mem.as_ptr() {
            return Ok(true);
        }
        Ok(self.root_key()? == other.root_key()?)
    }

    /// Enqueue a copy from `src` into `self`. Both buffers end up holding the
    /// copy's event.
    pub(crate) fn copy_from(
        &self,
        queue: &CommandQueue,
        dst_offset: usize,
        src: &ClBuffer,
        src_offset: usize,
        size: usize,
    ) -> Result<()> {
        check_range("copy destination", dst_offset, size, self.len)?;
        check_range("copy source", src_offset, size, src.len)?;
        if size == 0 {
            return Ok(());
        }

        let wait: Vec<Event> = [src.hazard.current(), self.hazard.current()]
            .into_iter()
            .flatten()
            .collect();
        let mut event = Event::null();
        core::enqueue_copy_buffer::<u8, _, _, _>(
            queue,
            &src.mem,
            &self.mem,
            src_offset,
            dst_offset,
            size,
            wait_list(&wait),
            Some(&mut event),
        )
        .map_err(|e| cl_error("clEnqueueCopyBuffer", e))?;

        src.hazard.install(event.clone());
        self.hazard.install(event);
        log::trace!("Enqueued {} byte device copy", size);
        Ok(())
    }

    /// Blocking read into `dst`.
    pub(crate) fn read_into(
        &self,
        queue: &CommandQueue,
        dst: &mut [u8],
        src_offset: usize,
    ) -> Result<()> {
        check_range("read", src_offset, dst.len(), self.len)?;
        if dst.is_empty() {
            return Ok(());
        }

        let wait: Vec<Event> = self.hazard.current().into_iter().collect();
        // SAFETY: blocking transfer, `dst` outlives it
        unsafe {
            core::enqueue_read_buffer(
                queue,
                &self.mem,
                true,
                src_offset,
                dst,
                wait_list(&wait),
                None::<&mut Event>,
            )
        }
        .map_err(|e| cl_error("clEnqueueReadBuffer", e))?;

        self.hazard.clear();
        Ok(())
    }

    /// Blocking write of `src`.
    pub(crate) fn write_from(&self, queue: &CommandQueue, dst_offset: usize, src: &[u8]) -> Result<()> {
        check_range("write", dst_offset, src.len(), self.len)?;
        if src.is_empty() {
            return Ok(());
        }

        let wait: Vec<Event> = self.hazard.current().into_iter().collect();
        // SAFETY: blocking transfer, `src` outlives it
        unsafe {
            core::enqueue_write_buffer(
                queue,
                &self.mem,
                true,
                dst_offset,
                src,
                wait_list(&wait),
                None::<&mut Event>,
            )
        }
        .map_err(|e| cl_error("clEnqueueWriteBuffer", e))?;

        self.hazard.clear();
        Ok(())
    }
}

pub(crate) fn wait_list(events: &[Event]) -> Option<&[Event]> {
    if events.is_empty() { None } else { Some(events) }
}
