//! Kopfloses GL/CL-Gerätepaar.
//!
//! [`SimDevice`] hält den gemeinsamen Gerätezustand; [`SimGraphics`] spielt
//! die GL-Seite, [`SimCompute`] die Compute-Seite. Befehle auf der Queue
//! werden erst bei `finish` (oder einem blockierenden Lesen) ausgeführt.
//! Jeder eingereichte Befehl und jede Freigabe landet im Journal.
//!
//! Fehler lassen sich über [`SimConfig`] einspeisen.

mod compiler;

pub use compiler::{compile, CompiledKernel};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

use crate::compute::{ComputeBackend, DeviceKind};
use crate::graphics::{BufferUsage, GlBufferId, GraphicsDevice, SurfaceHandles};
use crate::{Float4, InteropError, Result};

// GL-Fehlercodes
const GL_INVALID_VALUE: u32 = 0x0501;
const GL_INVALID_OPERATION: u32 = 0x0502;

// CL-Fehlercodes
const CL_DEVICE_NOT_AVAILABLE: i32 = -2;
const CL_OUT_OF_RESOURCES: i32 = -5;
const CL_INVALID_MEM_OBJECT: i32 = -38;
const CL_INVALID_KERNEL_NAME: i32 = -46;
const CL_INVALID_ARG_INDEX: i32 = -49;
const CL_INVALID_KERNEL_ARGS: i32 = -52;
const CL_INVALID_WORK_GROUP_SIZE: i32 = -54;
const CL_INVALID_GL_OBJECT: i32 = -60;
const CL_INVALID_GL_SHAREGROUP_REFERENCE_KHR: i32 = -1000;

#[derive(Clone, Debug)]
pub struct SimPlatform {
    pub name: String,
    pub devices: Vec<DeviceKind>,
}

impl SimPlatform {
    pub fn new(name: &str, devices: &[DeviceKind]) -> Self {
        Self { name: name.to_string(), devices: devices.to_vec() }
    }
}

#[derive(Clone, Debug)]
pub struct SimConfig {
    pub platforms: Vec<SimPlatform>,
    /// Treiber kürzt jede Allokation auf höchstens so viele Bytes
    pub truncate_buffers_to: Option<usize>,
    /// Kontexte auf GPU-Geräten schlagen fehl
    pub fail_gpu_context: bool,
    /// der n-te Versuch eines Kernel-Starts (ab 0, über die ganze Laufzeit) schlägt fehl
    pub fail_launch_at: Option<u64>,
    pub gl_context: usize,
    pub gl_display: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            platforms: vec![SimPlatform::new("Headless", &[DeviceKind::Gpu, DeviceKind::Cpu])],
            truncate_buffers_to: None,
            fail_gpu_context: false,
            fail_launch_at: None,
            gl_context: 0x1,
            gl_display: 0x2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Resource {
    Queue,
    Kernel,
    Program,
    Context,
    Memory,
    Buffer,
}

/// Journal-Eintrag. Acquire, Launch und Release werden beim Einreichen
/// protokolliert, nicht bei der Ausführung.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Entry {
    BufferAllocated { id: u32, bytes: usize },
    GraphicsFinish,
    Acquire { memory: u64 },
    Launch { kernel: u64, memory: u64, global: usize, local: usize },
    Release { memory: u64 },
    QueueFinish,
    Released(Resource),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Graphics,
    Compute,
}

struct GlStorage {
    bytes: usize,
    data: Vec<Float4>,
    owner: Side,
}

struct MemState {
    gl: u32,
    /// Besitz aus Sicht der eingereichten Befehle
    acquired: bool,
}

struct KernelState {
    fill: Float4,
    arg: Option<u64>,
}

enum Pending {
    Acquire(u64),
    Launch { fill: Float4, memory: u64, global: usize },
    Release(u64),
}

struct SimState {
    config: SimConfig,
    next_gl: u32,
    bound: Option<u32>,
    gl_error: Option<u32>,
    gl_dirty: bool,
    buffers: HashMap<u32, GlStorage>,
    next_object: u64,
    live_objects: usize,
    programs: HashMap<u64, Vec<CompiledKernel>>,
    kernels: HashMap<u64, KernelState>,
    memories: HashMap<u64, MemState>,
    pending: Vec<Pending>,
    launch_attempts: u64,
    launches: u64,
    journal: Vec<Entry>,
}

impl SimState {
    fn new(config: SimConfig) -> Self {
        Self {
            config,
            next_gl: 1,
            bound: None,
            gl_error: None,
            gl_dirty: false,
            buffers: HashMap::new(),
            next_object: 1,
            live_objects: 0,
            programs: HashMap::new(),
            kernels: HashMap::new(),
            memories: HashMap::new(),
            pending: Vec::new(),
            launch_attempts: 0,
            launches: 0,
            journal: Vec::new(),
        }
    }

    fn set_gl_error(&mut self, code: u32) {
        // wie glGetError: der erste Fehler bleibt stehen
        self.gl_error.get_or_insert(code);
    }

    fn gl_buffer_acquired(&self, gl: u32) -> bool {
        self.memories.values().any(|m| m.gl == gl && m.acquired)
    }

    fn new_object(&mut self) -> u64 {
        let id = self.next_object;
        self.next_object += 1;
        self.live_objects += 1;
        id
    }

    fn release_object(&mut self, id: u64, kind: Resource) {
        self.live_objects = self.live_objects.saturating_sub(1);
        match kind {
            Resource::Program => {
                self.programs.remove(&id);
            }
            Resource::Kernel => {
                self.kernels.remove(&id);
            }
            Resource::Memory => {
                self.memories.remove(&id);
            }
            _ => {}
        }
        self.journal.push(Entry::Released(kind));
    }

    /// Führt alle eingereihten Befehle in Einreichungsreihenfolge aus.
    fn flush(&mut self) {
        for cmd in std::mem::take(&mut self.pending) {
            match cmd {
                Pending::Acquire(mem) => self.set_owner(mem, Side::Compute),
                Pending::Release(mem) => self.set_owner(mem, Side::Graphics),
                Pending::Launch { fill, memory, global } => {
                    let Some(gl) = self.memories.get(&memory).map(|m| m.gl) else { continue };
                    if let Some(storage) = self.buffers.get_mut(&gl) {
                        debug_assert_eq!(storage.owner, Side::Compute);
                        for v in storage.data.iter_mut().take(global) {
                            *v = fill;
                        }
                    }
                }
            }
        }
    }

    fn set_owner(&mut self, mem: u64, side: Side) {
        if let Some(gl) = self.memories.get(&mem).map(|m| m.gl) {
            if let Some(storage) = self.buffers.get_mut(&gl) {
                storage.owner = side;
            }
        }
    }
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ─── Gerät ───────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct SimDevice {
    state: Arc<Mutex<SimState>>,
}

impl SimDevice {
    pub fn new(config: SimConfig) -> Self {
        Self { state: Arc::new(Mutex::new(SimState::new(config))) }
    }

    pub fn graphics(&self) -> SimGraphics {
        SimGraphics { state: Arc::clone(&self.state) }
    }

    pub fn compute(&self) -> SimCompute {
        SimCompute { state: Arc::clone(&self.state) }
    }

    pub fn journal(&self) -> Vec<Entry> {
        lock(&self.state).journal.clone()
    }

    /// Freigaben in der Reihenfolge, in der sie passiert sind
    pub fn releases(&self) -> Vec<Resource> {
        self.journal()
            .into_iter()
            .filter_map(|e| match e {
                Entry::Released(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn buffer_bytes(&self, id: GlBufferId) -> Option<usize> {
        lock(&self.state).buffers.get(&id.0).map(|b| b.bytes)
    }

    /// Sicht der GL-Seite auf den Buffer-Inhalt
    pub fn buffer_contents(&self, id: GlBufferId) -> Option<Vec<Float4>> {
        lock(&self.state).buffers.get(&id.0).map(|b| b.data.clone())
    }

    pub fn live_buffers(&self) -> usize {
        lock(&self.state).buffers.len()
    }

    pub fn live_objects(&self) -> usize {
        lock(&self.state).live_objects
    }

    /// Anzahl erfolgreich eingereihter Kernel-Starts; abgewiesene zählen nicht
    pub fn launches(&self) -> u64 {
        lock(&self.state).launches
    }
}

// ─── GL‑Seite ────────────────────────────────────────────────────────

pub struct SimGraphics {
    state: Arc<Mutex<SimState>>,
}

impl GraphicsDevice for SimGraphics {
    fn surface(&self) -> SurfaceHandles {
        let s = lock(&self.state);
        SurfaceHandles::Glx { context: s.config.gl_context, display: s.config.gl_display }
    }

    fn gen_buffer(&self) -> GlBufferId {
        let mut s = lock(&self.state);
        let id = s.next_gl;
        s.next_gl += 1;
        s.buffers.insert(id, GlStorage { bytes: 0, data: Vec::new(), owner: Side::Graphics });
        GlBufferId(id)
    }

    fn bind_array_buffer(&self, id: Option<GlBufferId>) {
        let mut s = lock(&self.state);
        match id {
            None => s.bound = None,
            Some(id) if s.buffers.contains_key(&id.0) => s.bound = Some(id.0),
            Some(_) => s.set_gl_error(GL_INVALID_OPERATION),
        }
    }

    fn buffer_data(&self, bytes: usize, usage: BufferUsage) {
        let mut s = lock(&self.state);
        let Some(id) = s.bound else {
            s.set_gl_error(GL_INVALID_OPERATION);
            return;
        };
        if s.gl_buffer_acquired(id) {
            s.set_gl_error(GL_INVALID_OPERATION);
            return;
        }
        let actual = s.config.truncate_buffers_to.map_or(bytes, |max| max.min(bytes));
        // undefinierter Anfangsinhalt: ein erkennbares Muster statt Nullen
        let data = (0..actual / Float4::BYTES).map(|i| Float4([i as f32, 1.0, 2.0, 3.0])).collect();
        if let Some(storage) = s.buffers.get_mut(&id) {
            storage.bytes = actual;
            storage.data = data;
        }
        s.gl_dirty = true;
        s.journal.push(Entry::BufferAllocated { id, bytes: actual });
        trace!(id, bytes = actual, ?usage, "glBufferData");
    }

    fn buffer_size(&self) -> usize {
        let mut s = lock(&self.state);
        let bytes = s.bound.and_then(|id| s.buffers.get(&id).map(|b| b.bytes));
        match bytes {
            Some(bytes) => bytes,
            None => {
                s.set_gl_error(GL_INVALID_OPERATION);
                0
            }
        }
    }

    fn take_error(&self) -> Option<u32> {
        lock(&self.state).gl_error.take()
    }

    fn finish(&self) {
        let mut s = lock(&self.state);
        s.gl_dirty = false;
        s.journal.push(Entry::GraphicsFinish);
    }

    fn delete_buffer(&self, id: GlBufferId) {
        let mut s = lock(&self.state);
        if id.is_null() {
            return;
        }
        if s.buffers.remove(&id.0).is_some() {
            if s.bound == Some(id.0) {
                s.bound = None;
            }
            s.journal.push(Entry::Released(Resource::Buffer));
        } else {
            s.set_gl_error(GL_INVALID_VALUE);
        }
    }
}

// ─── Compute‑Seite ───────────────────────────────────────────────────

/// Handle auf ein simuliertes CL-Objekt; gibt es beim Drop frei.
pub struct SimHandle {
    id: u64,
    kind: Resource,
    state: Arc<Mutex<SimState>>,
}

impl SimHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for SimHandle {
    fn drop(&mut self) {
        lock(&self.state).release_object(self.id, self.kind);
    }
}

pub struct SimContext(SimHandle);
pub struct SimQueue(SimHandle);

impl SimContext {
    pub fn id(&self) -> u64 {
        self.0.id
    }
}

impl SimQueue {
    pub fn id(&self) -> u64 {
        self.0.id
    }
}
pub struct SimProgram(SimHandle);
pub struct SimKernel(SimHandle);
pub struct SimMemory(SimHandle);

impl SimMemory {
    pub fn id(&self) -> u64 {
        self.0.id
    }
}

impl SimKernel {
    pub fn id(&self) -> u64 {
        self.0.id
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimDeviceId {
    pub platform: usize,
    pub index: usize,
    pub kind: DeviceKind,
}

pub struct SimCompute {
    state: Arc<Mutex<SimState>>,
}

impl SimCompute {
    fn handle(&self, s: &mut SimState, kind: Resource) -> SimHandle {
        SimHandle { id: s.new_object(), kind, state: Arc::clone(&self.state) }
    }
}

impl ComputeBackend for SimCompute {
    type Platform = usize;
    type Device = SimDeviceId;
    type Context = SimContext;
    type Queue = SimQueue;
    type Program = SimProgram;
    type Kernel = SimKernel;
    type Memory = SimMemory;

    fn platforms(&self) -> Result<Vec<usize>> {
        Ok((0..lock(&self.state).config.platforms.len()).collect())
    }

    fn platform_name(&self, platform: &usize) -> String {
        lock(&self.state).config.platforms.get(*platform).map(|p| p.name.clone()).unwrap_or_default()
    }

    fn devices(&self, platform: &usize, kind: DeviceKind) -> Result<Vec<SimDeviceId>> {
        let s = lock(&self.state);
        let platform_cfg = s.config.platforms.get(*platform).ok_or(InteropError::NoPlatform)?;
        Ok(platform_cfg
            .devices
            .iter()
            .enumerate()
            .filter(|(_, k)| **k == kind)
            .map(|(index, k)| SimDeviceId { platform: *platform, index, kind: *k })
            .collect())
    }

    fn device_name(&self, device: SimDeviceId) -> String {
        format!("headless {} #{}", device.kind, device.index)
    }

    fn create_context(
        &self,
        _platform: &usize,
        device: SimDeviceId,
        kind: DeviceKind,
        surface: &SurfaceHandles,
    ) -> Result<SimContext> {
        let mut s = lock(&self.state);
        if kind == DeviceKind::Gpu && s.config.fail_gpu_context {
            return Err(InteropError::ContextCreation { device: kind, code: CL_DEVICE_NOT_AVAILABLE });
        }
        let own = SurfaceHandles::Glx { context: s.config.gl_context, display: s.config.gl_display };
        if *surface != own {
            return Err(InteropError::ContextCreation {
                device: device.kind,
                code: CL_INVALID_GL_SHAREGROUP_REFERENCE_KHR,
            });
        }
        Ok(SimContext(self.handle(&mut s, Resource::Context)))
    }

    fn create_queue(&self, _context: &SimContext) -> Result<SimQueue> {
        let mut s = lock(&self.state);
        Ok(SimQueue(self.handle(&mut s, Resource::Queue)))
    }

    fn build_program(&self, _context: &SimContext, source: &str) -> Result<SimProgram> {
        let kernels = compile(source).map_err(|log| InteropError::ProgramBuild { log })?;
        let mut s = lock(&self.state);
        let handle = self.handle(&mut s, Resource::Program);
        s.programs.insert(handle.id, kernels);
        Ok(SimProgram(handle))
    }

    fn create_kernel(&self, program: &SimProgram, entry: &str) -> Result<SimKernel> {
        let mut s = lock(&self.state);
        let fill = s
            .programs
            .get(&program.0.id)
            .and_then(|ks| ks.iter().find(|k| k.entry == entry))
            .map(|k| k.fill)
            .ok_or_else(|| InteropError::KernelCreation {
                entry: entry.to_string(),
                code: CL_INVALID_KERNEL_NAME,
            })?;
        let handle = self.handle(&mut s, Resource::Kernel);
        s.kernels.insert(handle.id, KernelState { fill, arg: None });
        Ok(SimKernel(handle))
    }

    fn wrap_gl_buffer(&self, _context: &SimContext, buffer: GlBufferId) -> Result<SimMemory> {
        let mut s = lock(&self.state);
        match s.buffers.get(&buffer.0) {
            Some(storage) if storage.bytes > 0 => {}
            _ => return Err(InteropError::MemoryWrap(CL_INVALID_GL_OBJECT)),
        }
        let handle = self.handle(&mut s, Resource::Memory);
        s.memories.insert(handle.id, MemState { gl: buffer.0, acquired: false });
        Ok(SimMemory(handle))
    }

    fn set_memory_arg(&self, kernel: &SimKernel, index: u32, memory: &SimMemory) -> Result<()> {
        let mut s = lock(&self.state);
        if index != 0 {
            return Err(InteropError::ArgumentBind { index, code: CL_INVALID_ARG_INDEX });
        }
        if !s.memories.contains_key(&memory.0.id) {
            return Err(InteropError::ArgumentBind { index, code: CL_INVALID_MEM_OBJECT });
        }
        match s.kernels.get_mut(&kernel.0.id) {
            Some(k) => {
                k.arg = Some(memory.0.id);
                Ok(())
            }
            None => Err(InteropError::ArgumentBind { index, code: CL_INVALID_KERNEL_ARGS }),
        }
    }

    fn enqueue_acquire(&self, _queue: &SimQueue, memory: &SimMemory) -> Result<()> {
        let mut s = lock(&self.state);
        if s.gl_dirty {
            return Err(InteropError::Ownership("GL commands pending; glFinish required before acquire"));
        }
        let mem = s.memories.get_mut(&memory.0.id).ok_or(InteropError::Api(CL_INVALID_MEM_OBJECT))?;
        if mem.acquired {
            return Err(InteropError::Ownership("memory object already acquired"));
        }
        mem.acquired = true;
        s.pending.push(Pending::Acquire(memory.0.id));
        s.journal.push(Entry::Acquire { memory: memory.0.id });
        Ok(())
    }

    fn enqueue_launch(&self, _queue: &SimQueue, kernel: &SimKernel, global: usize, local: usize) -> Result<()> {
        let mut s = lock(&self.state);
        let attempt = s.launch_attempts;
        s.launch_attempts += 1;
        if s.config.fail_launch_at == Some(attempt) {
            return Err(InteropError::DispatchSubmission { command: "kernel", launch: None, code: CL_OUT_OF_RESOURCES });
        }
        if local == 0 || global % local != 0 {
            return Err(InteropError::DispatchSubmission { command: "kernel", launch: None, code: CL_INVALID_WORK_GROUP_SIZE });
        }
        let k = s.kernels.get(&kernel.0.id).ok_or(InteropError::Api(CL_INVALID_KERNEL_ARGS))?;
        let (fill, Some(memory)) = (k.fill, k.arg) else {
            return Err(InteropError::DispatchSubmission { command: "kernel", launch: None, code: CL_INVALID_KERNEL_ARGS });
        };
        let Some(mem) = s.memories.get(&memory) else {
            return Err(InteropError::DispatchSubmission { command: "kernel", launch: None, code: CL_INVALID_MEM_OBJECT });
        };
        if !mem.acquired {
            return Err(InteropError::Ownership("kernel launched outside acquire/release"));
        }
        let capacity = s.buffers.get(&mem.gl).map_or(0, |b| b.data.len());
        if global > capacity {
            return Err(InteropError::DispatchSubmission { command: "kernel", launch: None, code: CL_OUT_OF_RESOURCES });
        }
        s.pending.push(Pending::Launch { fill, memory, global });
        s.launches += 1;
        s.journal.push(Entry::Launch { kernel: kernel.0.id, memory, global, local });
        Ok(())
    }

    fn enqueue_release(&self, _queue: &SimQueue, memory: &SimMemory) -> Result<()> {
        let mut s = lock(&self.state);
        let mem = s.memories.get_mut(&memory.0.id).ok_or(InteropError::Api(CL_INVALID_MEM_OBJECT))?;
        if !mem.acquired {
            return Err(InteropError::Ownership("release without matching acquire"));
        }
        mem.acquired = false;
        s.pending.push(Pending::Release(memory.0.id));
        s.journal.push(Entry::Release { memory: memory.0.id });
        Ok(())
    }

    fn finish(&self, _queue: &SimQueue) -> Result<()> {
        let mut s = lock(&self.state);
        s.flush();
        s.journal.push(Entry::QueueFinish);
        Ok(())
    }

    fn read_memory(&self, _queue: &SimQueue, memory: &SimMemory, out: &mut [Float4]) -> Result<()> {
        let mut s = lock(&self.state);
        let gl = match s.memories.get(&memory.0.id) {
            Some(m) if m.acquired => m.gl,
            Some(_) => return Err(InteropError::Ownership("read outside acquire/release")),
            None => return Err(InteropError::Api(CL_INVALID_MEM_OBJECT)),
        };
        // blockierendes Lesen: alles davor Eingereihte ist fertig
        s.flush();
        let data = s.buffers.get(&gl).map(|b| b.data.as_slice()).unwrap_or(&[]);
        for (dst, src) in out.iter_mut().zip(data) {
            *dst = *src;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::create_vertex_buffer;

    fn setup() -> (SimDevice, SimGraphics, SimCompute, SimContext, SimQueue, GlBufferId) {
        let dev = SimDevice::new(SimConfig::default());
        let gl = dev.graphics();
        let cl = dev.compute();
        let buf = create_vertex_buffer(&gl, 64).unwrap();
        let dev_id = cl.devices(&0, DeviceKind::Gpu).unwrap()[0];
        let ctx = cl.create_context(&0, dev_id, DeviceKind::Gpu, &gl.surface()).unwrap();
        let queue = cl.create_queue(&ctx).unwrap();
        (dev, gl, cl, ctx, queue, buf.id())
    }

    #[test]
    fn launch_outside_bracket_is_refused() {
        let (_dev, gl, cl, ctx, queue, buf) = setup();
        let program = cl.build_program(&ctx, crate::dispatch::INIT_VBO_SOURCE).unwrap();
        let kernel = cl.create_kernel(&program, "init_vbo_kernel").unwrap();
        let mem = cl.wrap_gl_buffer(&ctx, buf).unwrap();
        cl.set_memory_arg(&kernel, 0, &mem).unwrap();
        gl.finish();
        assert!(matches!(cl.enqueue_launch(&queue, &kernel, 64, 32), Err(InteropError::Ownership(_))));
    }

    #[test]
    fn refused_launches_are_not_counted() {
        let (dev, gl, cl, ctx, queue, buf) = setup();
        let program = cl.build_program(&ctx, crate::dispatch::INIT_VBO_SOURCE).unwrap();
        let kernel = cl.create_kernel(&program, "init_vbo_kernel").unwrap();
        let mem = cl.wrap_gl_buffer(&ctx, buf).unwrap();
        cl.set_memory_arg(&kernel, 0, &mem).unwrap();
        gl.finish();
        assert!(cl.enqueue_launch(&queue, &kernel, 64, 32).is_err());
        assert_eq!(dev.launches(), 0);

        cl.enqueue_acquire(&queue, &mem).unwrap();
        assert!(cl.enqueue_launch(&queue, &kernel, 64, 24).is_err());
        cl.enqueue_launch(&queue, &kernel, 64, 32).unwrap();
        assert_eq!(dev.launches(), 1);
        cl.enqueue_release(&queue, &mem).unwrap();
    }

    #[test]
    fn acquire_requires_gl_finish() {
        let (_dev, gl, cl, ctx, queue, buf) = setup();
        let mem = cl.wrap_gl_buffer(&ctx, buf).unwrap();
        assert!(matches!(cl.enqueue_acquire(&queue, &mem), Err(InteropError::Ownership(_))));
        gl.finish();
        cl.enqueue_acquire(&queue, &mem).unwrap();
        assert!(matches!(cl.enqueue_acquire(&queue, &mem), Err(InteropError::Ownership(_))));
    }

    #[test]
    fn commands_run_on_finish_only() {
        let (dev, gl, cl, ctx, queue, buf) = setup();
        let program = cl.build_program(&ctx, crate::dispatch::INIT_VBO_SOURCE).unwrap();
        let kernel = cl.create_kernel(&program, "init_vbo_kernel").unwrap();
        let mem = cl.wrap_gl_buffer(&ctx, buf).unwrap();
        cl.set_memory_arg(&kernel, 0, &mem).unwrap();
        gl.finish();
        cl.enqueue_acquire(&queue, &mem).unwrap();
        cl.enqueue_launch(&queue, &kernel, 64, 32).unwrap();
        cl.enqueue_release(&queue, &mem).unwrap();
        assert_ne!(dev.buffer_contents(buf).unwrap()[5], Float4::ZERO);
        cl.finish(&queue).unwrap();
        assert!(dev.buffer_contents(buf).unwrap().iter().all(|v| *v == Float4::ZERO));
    }

    #[test]
    fn gl_cannot_reallocate_while_acquired() {
        let (_dev, gl, cl, ctx, queue, buf) = setup();
        let mem = cl.wrap_gl_buffer(&ctx, buf).unwrap();
        gl.finish();
        cl.enqueue_acquire(&queue, &mem).unwrap();
        gl.bind_array_buffer(Some(buf));
        gl.buffer_data(16, BufferUsage::StreamDraw);
        assert_eq!(gl.take_error(), Some(GL_INVALID_OPERATION));
    }

    #[test]
    fn unknown_entry_point() {
        let (_dev, _gl, cl, ctx, _queue, _buf) = setup();
        let program = cl.build_program(&ctx, crate::dispatch::INIT_VBO_SOURCE).unwrap();
        assert!(matches!(
            cl.create_kernel(&program, "main"),
            Err(InteropError::KernelCreation { code: CL_INVALID_KERNEL_NAME, .. })
        ));
    }

    #[test]
    fn handles_release_on_drop() {
        let (dev, _gl, cl, ctx, queue, _buf) = setup();
        assert_eq!(dev.live_objects(), 2);
        assert_ne!(ctx.id(), queue.id());
        drop(queue);
        drop(ctx);
        drop(cl);
        assert_eq!(dev.live_objects(), 0);
        assert_eq!(dev.releases(), vec![Resource::Queue, Resource::Context]);
    }
}
