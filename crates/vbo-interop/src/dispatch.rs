//! Kernel-Quelle und Dispatch.

use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, error};

use crate::compute::ComputeBackend;
use crate::graphics::GraphicsDevice;
use crate::shared::{GraphicsOwned, SharedBuffer, Stranded};
use crate::{InteropError, Result};

/// Eingebetteter Kernel: schreibt pro Work-Item einen Null-Vektor.
pub const INIT_VBO_SOURCE: &str = include_str!("../kernels/init_vbo.cl");

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KernelSource {
    text: String,
    origin: String,
}

impl KernelSource {
    pub fn embedded() -> Self {
        Self { text: INIT_VBO_SOURCE.to_string(), origin: "init_vbo.cl (embedded)".into() }
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self { text: text.into(), origin: "<inline>".into() }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| InteropError::Config(format!("{}: {e}", path.display())))?;
        Ok(Self { text, origin: path.display().to_string() })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }
}

/// Ergebnis eines erfolgreichen Dispatch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchReport {
    pub launches: u32,
    pub work_groups: usize,
    pub elapsed: Duration,
}

/// Feste Launch-Geometrie: `global = element_count`, `local = work_group_size`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dispatcher {
    element_count: usize,
    work_group_size: usize,
    iterations: u32,
}

impl Dispatcher {
    pub fn new(element_count: usize, work_group_size: usize, iterations: u32) -> Result<Self> {
        if work_group_size == 0 || element_count % work_group_size != 0 {
            return Err(InteropError::InvalidWorkSize {
                global: element_count,
                local: work_group_size,
            });
        }
        if iterations == 0 {
            return Err(InteropError::Config("iterations must be at least 1".into()));
        }
        Ok(Self { element_count, work_group_size, iterations })
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn work_groups(&self) -> usize {
        self.element_count / self.work_group_size
    }

    /// Bindet den Buffer als Argument 0, übernimmt ihn, reiht `iterations`
    /// Starts ein, gibt ihn zurück und wartet auf die Queue.
    ///
    /// Ein Fehler beim Einreihen bricht die restlichen Starts ab; bereits
    /// eingereihte laufen weiter. Das Release wird trotzdem versucht.
    pub fn dispatch<C, G>(
        &self,
        backend: &C,
        gl: &G,
        queue: &C::Queue,
        kernel: &C::Kernel,
        shared: SharedBuffer<C, GraphicsOwned>,
    ) -> std::result::Result<(SharedBuffer<C, GraphicsOwned>, DispatchReport), Stranded<C>>
    where
        C: ComputeBackend,
        G: GraphicsDevice + ?Sized,
    {
        let started = Instant::now();

        if shared.element_count() != self.element_count {
            let error = InteropError::Config(format!(
                "shared buffer holds {} elements, dispatcher expects {}",
                shared.element_count(),
                self.element_count
            ));
            return Err(Stranded { memory: shared.into_memory(), error });
        }

        if let Err(e) = backend.set_memory_arg(kernel, 0, shared.memory()) {
            error!("{e}");
            return Err(Stranded { memory: shared.into_memory(), error: e });
        }

        let acquired = shared.acquire(gl, backend, queue)?;

        for i in 0..self.iterations {
            if let Err(e) =
                acquired.launch(backend, queue, kernel, self.element_count, self.work_group_size)
            {
                let e = e.at_launch(i);
                error!(launch = i, "{e}");
                return Err(acquired.abandon(backend, queue, e));
            }
        }
        debug!(
            launches = self.iterations,
            global = self.element_count,
            local = self.work_group_size,
            "kernel launches queued"
        );

        let released = acquired.release(backend, queue)?;
        if let Err(e) = backend.finish(queue) {
            error!("{e}");
            return Err(Stranded { memory: released.into_memory(), error: e });
        }

        #[cfg(feature = "metrics")]
        crate::metrics::record("dispatch", started);

        Ok((
            released,
            DispatchReport {
                launches: self.iterations,
                work_groups: self.work_groups(),
                elapsed: started.elapsed(),
            },
        ))
    }
}
