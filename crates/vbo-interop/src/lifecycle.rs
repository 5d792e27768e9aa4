//! Lebenszyklus: Aufbau, Ereignisschleife, Abbau.
//!
//! ```text
//! Uninit → SurfaceReady → BufferReady → ComputeReady → Running → Terminating → Exited
//! ```
//!
//! Alle Handles liegen in einem einzigen [`Resources`]-Aggregat. Abgebaut wird
//! immer in der Reihenfolge Queue → Kernel → Programm → Kontext →
//! Speicherobjekt → Vertex-Buffer, und zwar nur das, was bereits existiert.

use tracing::{debug, error, info, warn};

use crate::compute::{create_context, ComputeBackend, SelectedDevice};
use crate::config::{InteropConfig, RunMode};
use crate::dispatch::{Dispatcher, KernelSource};
use crate::graphics::{create_vertex_buffer, destroy_buffer, GraphicsBuffer, GraphicsDevice, SurfaceHandles};
use crate::shared::{GraphicsOwned, SharedBuffer};
use crate::{Float4, InteropError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Failure,
}

impl From<ExitStatus> for std::process::ExitCode {
    fn from(status: ExitStatus) -> Self {
        match status {
            ExitStatus::Success => std::process::ExitCode::SUCCESS,
            ExitStatus::Failure => std::process::ExitCode::FAILURE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Uninit,
    SurfaceReady,
    BufferReady,
    ComputeReady,
    Running,
    Terminating,
    Exited(ExitStatus),
}

/// Ereignisse des Fenstersystems. Redraw und Idle werden gleich behandelt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceEvent {
    Redraw,
    Idle,
    CloseRequested,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit(ExitStatus),
}

#[derive(Debug)]
pub struct Outcome {
    pub status: ExitStatus,
    pub frames: u64,
    pub device: Option<SelectedDevice>,
    pub error: Option<InteropError>,
}

enum SharedSlot<C: ComputeBackend> {
    Idle(SharedBuffer<C, GraphicsOwned>),
    /// nach einem gescheiterten Übergang, nur noch für den Abbau
    Stranded(C::Memory),
}

struct Resources<C: ComputeBackend> {
    buffer: Option<GraphicsBuffer>,
    shared: Option<SharedSlot<C>>,
    context: Option<C::Context>,
    program: Option<C::Program>,
    kernel: Option<C::Kernel>,
    queue: Option<C::Queue>,
}

impl<C: ComputeBackend> Default for Resources<C> {
    fn default() -> Self {
        Self { buffer: None, shared: None, context: None, program: None, kernel: None, queue: None }
    }
}

pub struct Lifecycle<G: GraphicsDevice, C: ComputeBackend> {
    config: InteropConfig,
    graphics: G,
    backend: C,
    dispatcher: Dispatcher,
    source: KernelSource,
    phase: Phase,
    res: Resources<C>,
    device: Option<SelectedDevice>,
    frames: u64,
    error: Option<InteropError>,
}

impl<G: GraphicsDevice, C: ComputeBackend> Lifecycle<G, C> {
    /// Prüft die Konfiguration und lädt die Kernel-Quelle; noch kein Gerätezugriff.
    pub fn new(config: InteropConfig, graphics: G, backend: C) -> Result<Self> {
        config.validate()?;
        let dispatcher =
            Dispatcher::new(config.element_count, config.work_group_size, config.iterations)?;
        let source = match &config.kernel_source {
            Some(path) => KernelSource::from_file(path)?,
            None => KernelSource::embedded(),
        };
        Ok(Self {
            config,
            graphics,
            backend,
            dispatcher,
            source,
            phase: Phase::Uninit,
            res: Resources::default(),
            device: None,
            frames: 0,
            error: None,
        })
    }

    pub fn with_kernel_source(mut self, source: KernelSource) -> Self {
        self.source = source;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn device(&self) -> Option<&SelectedDevice> {
        self.device.as_ref()
    }

    pub fn error(&self) -> Option<&InteropError> {
        self.error.as_ref()
    }

    pub fn graphics(&self) -> &G {
        &self.graphics
    }

    pub fn backend(&self) -> &C {
        &self.backend
    }

    /// Baut alles bis `ComputeReady` auf. Bei einem Fehler wird sofort
    /// abgebaut und der Zustand ist `Exited(Failure)`.
    pub fn initialize(&mut self) -> Result<()> {
        if self.phase != Phase::Uninit {
            return Err(InteropError::Config(format!("cannot initialize in phase {:?}", self.phase)));
        }

        let surface = self.graphics.surface();
        self.phase = Phase::SurfaceReady;
        debug!(?surface, "graphics surface ready");

        match create_vertex_buffer(&self.graphics, self.config.element_count) {
            Ok(buffer) => self.res.buffer = Some(buffer),
            Err(e) => {
                self.fail(e.clone());
                return Err(e);
            }
        }
        self.phase = Phase::BufferReady;

        if let Err(e) = self.init_compute(&surface) {
            self.fail(e.clone());
            return Err(e);
        }
        self.phase = Phase::ComputeReady;
        info!(
            elements = self.config.element_count,
            iterations = self.config.iterations,
            mode = %self.config.run_mode,
            "compute ready"
        );
        Ok(())
    }

    fn init_compute(&mut self, surface: &SurfaceHandles) -> Result<()> {
        let (context, device) = create_context(&self.backend, surface, self.config.device_policy)?;
        self.device = Some(device);
        let context = &*self.res.context.insert(context);

        self.res.queue = Some(self.backend.create_queue(context)?);

        debug!(origin = self.source.origin(), "building program");
        let program = &*self.res.program.insert(self.backend.build_program(context, self.source.text())?);
        self.res.kernel = Some(self.backend.create_kernel(program, &self.config.kernel_entry)?);

        let buffer = self
            .res
            .buffer
            .as_ref()
            .ok_or(InteropError::Ownership("vertex buffer missing"))?;
        let shared = SharedBuffer::wrap(&self.backend, context, buffer)?;
        self.res.shared = Some(SharedSlot::Idle(shared));
        Ok(())
    }

    /// Ein Ereignis des Fenstersystems verarbeiten.
    pub fn handle(&mut self, event: SurfaceEvent) -> Flow {
        match self.phase {
            Phase::Exited(status) => return Flow::Exit(status),
            Phase::Uninit => {
                if self.initialize().is_err() {
                    return Flow::Exit(ExitStatus::Failure);
                }
                self.enter_loop();
            }
            Phase::ComputeReady => self.enter_loop(),
            Phase::Running => {}
            Phase::SurfaceReady | Phase::BufferReady | Phase::Terminating => {
                warn!(phase = ?self.phase, "event in transient phase");
                return Flow::Exit(self.shutdown());
            }
        }

        match event {
            SurfaceEvent::CloseRequested => {
                info!("close requested");
                Flow::Exit(self.shutdown())
            }
            SurfaceEvent::Redraw | SurfaceEvent::Idle => self.tick(),
        }
    }

    fn enter_loop(&mut self) {
        self.phase = Phase::Running;
        debug!("entering event loop");
    }

    fn tick(&mut self) -> Flow {
        let shared = match self.res.shared.take() {
            Some(SharedSlot::Idle(shared)) => shared,
            other => {
                self.res.shared = other;
                let status = self.fail(InteropError::Ownership("shared buffer not available"));
                return Flow::Exit(status);
            }
        };
        let (Some(queue), Some(kernel)) = (self.res.queue.as_ref(), self.res.kernel.as_ref()) else {
            self.res.shared = Some(SharedSlot::Idle(shared));
            let status = self.fail(InteropError::Ownership("compute queue not ready"));
            return Flow::Exit(status);
        };

        match self.dispatcher.dispatch(&self.backend, &self.graphics, queue, kernel, shared) {
            Ok((shared, report)) => {
                self.res.shared = Some(SharedSlot::Idle(shared));
                self.frames += 1;
                debug!(
                    frame = self.frames,
                    launches = report.launches,
                    groups = report.work_groups,
                    elapsed_us = report.elapsed.as_micros() as u64,
                    "dispatch complete"
                );
                if self.should_stop() {
                    Flow::Exit(self.shutdown())
                } else {
                    Flow::Continue
                }
            }
            Err(stranded) => {
                self.res.shared = Some(SharedSlot::Stranded(stranded.memory));
                Flow::Exit(self.fail(stranded.error))
            }
        }
    }

    fn should_stop(&self) -> bool {
        match self.config.run_mode {
            RunMode::Once => true,
            RunMode::Continuous => self.config.max_frames.is_some_and(|max| self.frames >= max),
        }
    }

    /// Liest den Buffer über die Compute-Seite zurück (eigene
    /// Acquire/Release-Klammer). Nur in `ComputeReady` oder `Running`.
    pub fn read_back(&mut self) -> Result<Vec<Float4>> {
        if !matches!(self.phase, Phase::ComputeReady | Phase::Running) {
            return Err(InteropError::Config(format!("cannot read back in phase {:?}", self.phase)));
        }
        let shared = match self.res.shared.take() {
            Some(SharedSlot::Idle(shared)) => shared,
            other => {
                self.res.shared = other;
                return Err(InteropError::Ownership("shared buffer not available"));
            }
        };
        let Some(queue) = self.res.queue.as_ref() else {
            self.res.shared = Some(SharedSlot::Idle(shared));
            return Err(InteropError::Ownership("compute queue not ready"));
        };

        let result = shared.acquire(&self.graphics, &self.backend, queue).and_then(|acquired| {
            match acquired.read(&self.backend, queue) {
                Ok(data) => acquired.release(&self.backend, queue).map(|s| (s, data)),
                Err(e) => Err(acquired.abandon(&self.backend, queue, e)),
            }
        });

        match result {
            Ok((shared, data)) => {
                self.res.shared = Some(SharedSlot::Idle(shared));
                if let Err(e) = self.backend.finish(queue) {
                    self.fail(e.clone());
                    return Err(e);
                }
                Ok(data)
            }
            Err(stranded) => {
                self.res.shared = Some(SharedSlot::Stranded(stranded.memory));
                let e = stranded.error;
                self.fail(e.clone());
                Err(e)
            }
        }
    }

    fn fail(&mut self, e: InteropError) -> ExitStatus {
        error!(step = e.step(), "{e}");
        self.error = Some(e);
        self.shutdown()
    }

    /// Baut alles ab und liefert den Endstatus. Mehrfacher Aufruf ist harmlos.
    pub fn shutdown(&mut self) -> ExitStatus {
        if let Phase::Exited(status) = self.phase {
            return status;
        }
        self.teardown();
        let status = if self.error.is_some() { ExitStatus::Failure } else { ExitStatus::Success };
        self.phase = Phase::Exited(status);
        if status == ExitStatus::Success {
            info!(frames = self.frames, "executed program successfully");
        }
        status
    }

    fn teardown(&mut self) {
        self.phase = Phase::Terminating;

        if let Some(queue) = self.res.queue.take() {
            debug!("releasing command queue");
            drop(queue);
        }
        if let Some(kernel) = self.res.kernel.take() {
            debug!("releasing kernel");
            drop(kernel);
        }
        if let Some(program) = self.res.program.take() {
            debug!("releasing program");
            drop(program);
        }
        if let Some(context) = self.res.context.take() {
            info!("before releasing context");
            drop(context);
            info!("after releasing context");
        }
        if let Some(shared) = self.res.shared.take() {
            if matches!(shared, SharedSlot::Stranded(_)) {
                warn!("releasing memory object in unknown ownership state");
            }
            info!("before releasing memory object");
            drop(shared);
            info!("after releasing memory object");
        }
        if let Some(mut buffer) = self.res.buffer.take() {
            destroy_buffer(&self.graphics, &mut buffer);
        }
    }

    /// Initialisiert, verarbeitet `events` bis zum Ende und baut ab.
    pub fn run<I: IntoIterator<Item = SurfaceEvent>>(mut self, events: I) -> Outcome {
        if self.phase == Phase::Uninit && self.initialize().is_ok() {
            for event in events {
                if let Flow::Exit(_) = self.handle(event) {
                    break;
                }
            }
        }
        let status = self.shutdown();
        Outcome {
            status,
            frames: self.frames,
            device: self.device.take(),
            error: self.error.take(),
        }
    }
}

impl<G: GraphicsDevice, C: ComputeBackend> Drop for Lifecycle<G, C> {
    fn drop(&mut self) {
        if !matches!(self.phase, Phase::Exited(_)) {
            self.teardown();
        }
    }
}
