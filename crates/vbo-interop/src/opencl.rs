//! OpenCL-Backend über `opencl3` mit `cl_khr_gl_sharing`.
#![cfg(feature = "opencl")]

use std::ffi::c_void;
use std::ptr;

use bytemuck::cast_slice_mut;
use opencl3::{
    command_queue::CommandQueue,
    context::Context,
    device::{Device, CL_DEVICE_TYPE_CPU, CL_DEVICE_TYPE_GPU},
    kernel::Kernel,
    memory::{Buffer, ClMem, CL_MEM_READ_WRITE},
    platform::{get_platforms, Platform},
    program::Program,
    types::{cl_context_properties, cl_device_id, cl_device_type, CL_BLOCKING},
};

use crate::compute::{ComputeBackend, DeviceKind};
use crate::graphics::{GlBufferId, SurfaceHandles};
use crate::{Float4, InteropError, Result};

// Kontext-Properties (cl.h / cl_gl.h)
const CL_CONTEXT_PLATFORM: cl_context_properties = 0x1084;
const CL_GL_CONTEXT_KHR: cl_context_properties = 0x2008;
const CL_EGL_DISPLAY_KHR: cl_context_properties = 0x2009;
const CL_GLX_DISPLAY_KHR: cl_context_properties = 0x200A;
const CL_WGL_HDC_KHR: cl_context_properties = 0x200B;
const CL_CGL_SHAREGROUP_KHR: cl_context_properties = 0x200C;

const CL_DEVICE_NOT_FOUND: i32 = -1;
const CL_PLATFORM_NOT_FOUND_KHR: i32 = -1001;

/// Property-Liste für `clCreateContext`: Plattform plus die nativen Handles
/// des aktuellen GL-Kontexts, nullterminiert.
pub fn context_properties(platform: &Platform, surface: &SurfaceHandles) -> Vec<cl_context_properties> {
    let mut props = vec![CL_CONTEXT_PLATFORM, platform.id() as cl_context_properties];
    match *surface {
        SurfaceHandles::Glx { context, display } => props.extend([
            CL_GL_CONTEXT_KHR,
            context as cl_context_properties,
            CL_GLX_DISPLAY_KHR,
            display as cl_context_properties,
        ]),
        SurfaceHandles::Wgl { context, hdc } => props.extend([
            CL_GL_CONTEXT_KHR,
            context as cl_context_properties,
            CL_WGL_HDC_KHR,
            hdc as cl_context_properties,
        ]),
        SurfaceHandles::Egl { context, display } => props.extend([
            CL_GL_CONTEXT_KHR,
            context as cl_context_properties,
            CL_EGL_DISPLAY_KHR,
            display as cl_context_properties,
        ]),
        SurfaceHandles::Cgl { share_group } => {
            props.extend([CL_CGL_SHAREGROUP_KHR, share_group as cl_context_properties])
        }
    }
    props.push(0);
    props
}

fn device_type(kind: DeviceKind) -> cl_device_type {
    match kind {
        DeviceKind::Gpu => CL_DEVICE_TYPE_GPU,
        DeviceKind::Cpu => CL_DEVICE_TYPE_CPU,
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct OpenClBackend;

impl ComputeBackend for OpenClBackend {
    type Platform = Platform;
    type Device = cl_device_id;
    type Context = Context;
    type Queue = CommandQueue;
    type Program = Program;
    type Kernel = Kernel;
    type Memory = Buffer<u8>;

    fn platforms(&self) -> Result<Vec<Platform>> {
        match get_platforms() {
            Ok(platforms) => Ok(platforms),
            Err(e) if e.0 == CL_PLATFORM_NOT_FOUND_KHR => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn platform_name(&self, platform: &Platform) -> String {
        platform.name().unwrap_or_default()
    }

    fn devices(&self, platform: &Platform, kind: DeviceKind) -> Result<Vec<cl_device_id>> {
        match platform.get_devices(device_type(kind)) {
            Ok(devices) => Ok(devices),
            Err(e) if e.0 == CL_DEVICE_NOT_FOUND => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn device_name(&self, device: cl_device_id) -> String {
        Device::new(device).name().unwrap_or_default()
    }

    fn create_context(
        &self,
        platform: &Platform,
        device: cl_device_id,
        kind: DeviceKind,
        surface: &SurfaceHandles,
    ) -> Result<Context> {
        let props = context_properties(platform, surface);
        Context::from_devices(&[device], &props, None, ptr::null_mut())
            .map_err(|e| InteropError::ContextCreation { device: kind, code: e.0 })
    }

    fn create_queue(&self, context: &Context) -> Result<CommandQueue> {
        let device = *context.devices().first().ok_or(InteropError::QueueCreation(CL_DEVICE_NOT_FOUND))?;
        #[allow(deprecated)]
        CommandQueue::create(context, device, 0).map_err(|e| InteropError::QueueCreation(e.0))
    }

    fn build_program(&self, context: &Context, source: &str) -> Result<Program> {
        Program::create_and_build_from_source(context, source, "")
            .map_err(|log| InteropError::ProgramBuild { log })
    }

    fn create_kernel(&self, program: &Program, entry: &str) -> Result<Kernel> {
        Kernel::create(program, entry)
            .map_err(|e| InteropError::KernelCreation { entry: entry.to_string(), code: e.0 })
    }

    fn wrap_gl_buffer(&self, context: &Context, buffer: GlBufferId) -> Result<Buffer<u8>> {
        unsafe { Buffer::<u8>::create_from_gl_buffer(context, CL_MEM_READ_WRITE, buffer.0) }
            .map_err(|e| InteropError::MemoryWrap(e.0))
    }

    fn set_memory_arg(&self, kernel: &Kernel, index: u32, memory: &Buffer<u8>) -> Result<()> {
        let mem = memory.get();
        unsafe { kernel.set_arg(index, &mem) }
            .map_err(|e| InteropError::ArgumentBind { index, code: e.0 })
    }

    fn enqueue_acquire(&self, queue: &CommandQueue, memory: &Buffer<u8>) -> Result<()> {
        let objects = [memory.get() as *const c_void];
        unsafe { queue.enqueue_acquire_gl_objects(&objects, &[]) }
            .map(drop)
            .map_err(|e| InteropError::DispatchSubmission { command: "acquire", launch: None, code: e.0 })
    }

    fn enqueue_launch(&self, queue: &CommandQueue, kernel: &Kernel, global: usize, local: usize) -> Result<()> {
        let global = [global];
        let local = [local];
        unsafe {
            queue.enqueue_nd_range_kernel(
                kernel.get(),
                1,
                ptr::null(),
                global.as_ptr(),
                local.as_ptr(),
                &[],
            )
        }
        .map(drop)
        .map_err(|e| InteropError::DispatchSubmission { command: "kernel", launch: None, code: e.0 })
    }

    fn enqueue_release(&self, queue: &CommandQueue, memory: &Buffer<u8>) -> Result<()> {
        let objects = [memory.get() as *const c_void];
        unsafe { queue.enqueue_release_gl_objects(&objects, &[]) }
            .map(drop)
            .map_err(|e| InteropError::DispatchSubmission { command: "release", launch: None, code: e.0 })
    }

    fn finish(&self, queue: &CommandQueue) -> Result<()> {
        queue
            .finish()
            .map_err(|e| InteropError::DispatchSubmission { command: "finish", launch: None, code: e.0 })
    }

    fn read_memory(&self, queue: &CommandQueue, memory: &Buffer<u8>, out: &mut [Float4]) -> Result<()> {
        let bytes: &mut [u8] = cast_slice_mut(out);
        unsafe { queue.enqueue_read_buffer(memory, CL_BLOCKING, 0, bytes, &[]) }?;
        Ok(())
    }
}
