//! GL/CL-Interop: ein Vertex-Buffer der Grafikseite wird als geteiltes
//! Speicherobjekt an die Compute-Seite übergeben, per Kernel genullt und
//! wieder zurückgegeben.

// ─── Feature‑Module ───────────────────────────────────────────────────
#[cfg(feature = "metrics")]
pub mod metrics;
#[cfg(feature = "metrics")]
pub use metrics::{summary, ACQUIRES, LAUNCHES, RELEASES};

#[cfg(feature = "opencl")]
pub mod opencl;

// ─── Kern ─────────────────────────────────────────────────────────────
pub mod compute;
pub mod config;
pub mod dispatch;
pub mod graphics;
pub mod lifecycle;
pub mod shared;
pub mod sim;

pub use compute::{ComputeBackend, DeviceKind, SelectedDevice};
pub use config::{DevicePolicy, InteropConfig, RunMode};
pub use dispatch::{DispatchReport, Dispatcher, KernelSource};
pub use graphics::{BufferUsage, GlBufferId, GraphicsBuffer, GraphicsDevice, SurfaceHandles};
pub use lifecycle::{ExitStatus, Flow, Lifecycle, Outcome, Phase, SurfaceEvent};
pub use shared::{ComputeOwned, GraphicsOwned, SharedBuffer, Stranded};

// ─── Fehler‑Typ ───────────────────────────────────────────────────────
#[derive(thiserror::Error, Debug, Clone)]
pub enum InteropError {
    #[error("failed to find any compute platform")]
    NoPlatform,
    #[error("no compatible compute device (policy {policy})")]
    NoDevice { policy: DevicePolicy },
    #[error("failed to create a {device} compute context (code {code})")]
    ContextCreation { device: DeviceKind, code: i32 },
    #[error("failed to create command queue for device 0 (code {0})")]
    QueueCreation(i32),
    #[error("error in kernel:\n{log}")]
    ProgramBuild { log: String },
    #[error("failed to create kernel `{entry}` (code {code})")]
    KernelCreation { entry: String, code: i32 },
    #[error("failed creating memory from GL buffer (code {0})")]
    MemoryWrap(i32),
    #[error("error setting kernel argument {index} (code {code})")]
    ArgumentBind { index: u32, code: i32 },
    #[error("error queuing {command} for execution (code {code}){}", launch_suffix(.launch))]
    DispatchSubmission { command: &'static str, launch: Option<u32>, code: i32 },
    #[error("could not {step} vertex buffer (GL error 0x{code:04x})")]
    BufferCreation { step: &'static str, code: u32 },
    #[error("vertex buffer object ({id}) has incorrect size ({actual}), expected {expected}")]
    BufferSize { id: u32, expected: usize, actual: usize },
    #[error("global work size {global} is not a multiple of work-group size {local}")]
    InvalidWorkSize { global: usize, local: usize },
    #[error("shared memory ownership violated: {0}")]
    Ownership(&'static str),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("compute API error code {0}")]
    Api(i32),
}

impl InteropError {
    /// Name des Lebenszyklus-Schritts, in dem der Fehler auftrat (für Logs).
    pub fn step(&self) -> &'static str {
        match self {
            Self::NoPlatform => "platform discovery",
            Self::NoDevice { .. } => "device enumeration",
            Self::ContextCreation { .. } => "context creation",
            Self::QueueCreation(_) => "queue creation",
            Self::ProgramBuild { .. } => "program build",
            Self::KernelCreation { .. } => "kernel creation",
            Self::MemoryWrap(_) => "memory wrap",
            Self::ArgumentBind { .. } => "argument bind",
            Self::DispatchSubmission { .. } | Self::InvalidWorkSize { .. } => "dispatch",
            Self::BufferCreation { .. } | Self::BufferSize { .. } => "buffer creation",
            Self::Ownership(_) => "ownership handoff",
            Self::Config(_) => "configuration",
            Self::Api(_) => "compute api",
        }
    }
}

impl InteropError {
    /// Hängt bei einem gescheiterten Kernel-Start dessen Index an.
    pub fn at_launch(self, index: u32) -> Self {
        match self {
            Self::DispatchSubmission { command, code, .. } => {
                Self::DispatchSubmission { command, launch: Some(index), code }
            }
            other => other,
        }
    }
}

fn launch_suffix(launch: &Option<u32>) -> String {
    launch.map(|i| format!(" at launch {i}")).unwrap_or_default()
}

#[cfg(feature = "opencl")]
impl From<opencl3::error_codes::ClError> for InteropError {
    #[inline]
    fn from(err: opencl3::error_codes::ClError) -> Self {
        InteropError::Api(err.0)
    }
}

pub type Result<T, E = InteropError> = std::result::Result<T, E>;

// ─── Element‑Layout ───────────────────────────────────────────────────

/// Ein Vertex: vier f32-Komponenten, 16 Byte, wie `float4` im Kernel.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Float4(pub [f32; 4]);

impl Float4 {
    pub const ZERO: Float4 = Float4([0.0; 4]);

    /// Größe eines Elements in Bytes
    pub const BYTES: usize = std::mem::size_of::<Float4>();

    pub const fn splat(v: f32) -> Self {
        Float4([v; 4])
    }
}
