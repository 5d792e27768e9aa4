//! Geteiltes Speicherobjekt über dem Vertex-Buffer.
//!
//! Der Besitzer steckt im Typ: [`GraphicsOwned`] nach dem Wrap und nach jedem
//! Release, [`ComputeOwned`] zwischen Acquire und Release. Kernel-Starts und
//! Lesezugriffe gibt es nur auf `SharedBuffer<_, ComputeOwned>`, damit liegt
//! jeder Start innerhalb einer Acquire/Release-Klammer.

use std::marker::PhantomData;

#[cfg(feature = "metrics")]
use std::sync::atomic::Ordering;
#[cfg(feature = "metrics")]
use std::time::Instant;

use tracing::debug;

use crate::compute::ComputeBackend;
use crate::graphics::{GlBufferId, GraphicsBuffer, GraphicsDevice};
use crate::{Float4, InteropError, Result};

#[cfg(feature = "metrics")]
use crate::metrics::{record, ACQUIRES, LAUNCHES, RELEASES};

// ─── Typ‑State‑Marker ────────────────────────────────────────────────
mod sealed {
    pub trait Sealed {}
}

pub trait Owner: sealed::Sealed {
    const NAME: &'static str;
}

/// GL darf den Buffer benutzen
pub struct GraphicsOwned;
impl sealed::Sealed for GraphicsOwned {}
impl Owner for GraphicsOwned {
    const NAME: &'static str = "graphics";
}

/// Compute hat den Buffer übernommen
pub struct ComputeOwned;
impl sealed::Sealed for ComputeOwned {}
impl Owner for ComputeOwned {
    const NAME: &'static str = "compute";
}

// ─── Wrapper ─────────────────────────────────────────────────────────
pub struct SharedBuffer<C: ComputeBackend, O: Owner> {
    memory: C::Memory,
    gl: GlBufferId,
    element_count: usize,
    _owner: PhantomData<O>,
}

/// Ein Übergang ist gescheitert; der Besitzstand ist unklar. Das
/// Speicherobjekt bleibt für den geordneten Abbau erhalten.
pub struct Stranded<C: ComputeBackend> {
    pub memory: C::Memory,
    pub error: InteropError,
}

impl<C: ComputeBackend> std::fmt::Debug for Stranded<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stranded").field("error", &self.error).finish_non_exhaustive()
    }
}

impl<C: ComputeBackend, O: Owner> std::fmt::Debug for SharedBuffer<C, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("gl", &self.gl)
            .field("element_count", &self.element_count)
            .field("owner", &O::NAME)
            .finish()
    }
}

impl<C: ComputeBackend, O: Owner> SharedBuffer<C, O> {
    pub fn memory(&self) -> &C::Memory {
        &self.memory
    }

    pub fn gl_buffer(&self) -> GlBufferId {
        self.gl
    }

    pub fn element_count(&self) -> usize {
        self.element_count
    }

    pub fn owner(&self) -> &'static str {
        O::NAME
    }

    /// gibt das Speicherobjekt ohne Besitzstand zurück (für den Abbau)
    pub fn into_memory(self) -> C::Memory {
        self.memory
    }

    fn strand(self, error: InteropError) -> Stranded<C> {
        Stranded { memory: self.memory, error }
    }

    fn retag<P: Owner>(self) -> SharedBuffer<C, P> {
        SharedBuffer {
            memory: self.memory,
            gl: self.gl,
            element_count: self.element_count,
            _owner: PhantomData,
        }
    }
}

// ── GraphicsOwned ────────────────────────────────────────────────────
impl<C: ComputeBackend> SharedBuffer<C, GraphicsOwned> {
    /// Einmaliges Wrap des GL-Buffers als read-write Speicherobjekt.
    pub fn wrap(backend: &C, context: &C::Context, buffer: &GraphicsBuffer) -> Result<Self> {
        if buffer.is_released() {
            return Err(InteropError::Ownership("cannot wrap a released vertex buffer"));
        }
        let memory = backend.wrap_gl_buffer(context, buffer.id())?;
        debug!(gl = buffer.id().0, "GL buffer wrapped as compute memory");
        Ok(Self {
            memory,
            gl: buffer.id(),
            element_count: buffer.element_count(),
            _owner: PhantomData,
        })
    }

    /// Wartet per `glFinish` auf ausstehende GL-Befehle und reiht dann das
    /// Acquire ein. Blockiert nicht auf der Compute-Seite.
    pub fn acquire<G: GraphicsDevice + ?Sized>(
        self,
        gl: &G,
        backend: &C,
        queue: &C::Queue,
    ) -> std::result::Result<SharedBuffer<C, ComputeOwned>, Stranded<C>> {
        #[cfg(feature = "metrics")]
        let t = Instant::now();

        gl.finish();
        if let Err(e) = backend.enqueue_acquire(queue, &self.memory) {
            return Err(self.strand(e));
        }

        #[cfg(feature = "metrics")]
        {
            ACQUIRES.fetch_add(1, Ordering::Relaxed);
            record("acquire", t);
        }

        Ok(self.retag())
    }
}

// ── ComputeOwned ─────────────────────────────────────────────────────
impl<C: ComputeBackend> SharedBuffer<C, ComputeOwned> {
    /// Reiht einen Kernel-Start über `global` Work-Items ein.
    pub fn launch(
        &self,
        backend: &C,
        queue: &C::Queue,
        kernel: &C::Kernel,
        global: usize,
        local: usize,
    ) -> Result<()> {
        backend.enqueue_launch(queue, kernel, global, local)?;

        #[cfg(feature = "metrics")]
        LAUNCHES.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }

    /// Blockierendes Zurücklesen über die Compute-Seite.
    pub fn read(&self, backend: &C, queue: &C::Queue) -> Result<Vec<Float4>> {
        let mut out = vec![Float4::ZERO; self.element_count];
        backend.read_memory(queue, &self.memory, &mut out)?;
        Ok(out)
    }

    /// Reiht das Release ein; danach gehört der Buffer wieder GL, sobald die
    /// Queue abgearbeitet ist.
    pub fn release(
        self,
        backend: &C,
        queue: &C::Queue,
    ) -> std::result::Result<SharedBuffer<C, GraphicsOwned>, Stranded<C>> {
        #[cfg(feature = "metrics")]
        let t = Instant::now();

        if let Err(e) = backend.enqueue_release(queue, &self.memory) {
            return Err(self.strand(e));
        }

        #[cfg(feature = "metrics")]
        {
            RELEASES.fetch_add(1, Ordering::Relaxed);
            record("release", t);
        }

        Ok(self.retag())
    }

    /// Release nach einem Fehler innerhalb der Klammer: schließt die Klammer
    /// so gut es geht und meldet den ursprünglichen Fehler.
    pub fn abandon(self, backend: &C, queue: &C::Queue, error: InteropError) -> Stranded<C> {
        match self.release(backend, queue) {
            Ok(released) => {
                let _ = backend.finish(queue);
                released.strand(error)
            }
            Err(stranded) => Stranded { memory: stranded.memory, error },
        }
    }
}
