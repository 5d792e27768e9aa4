//! Compute-Seite: Backend-Schnittstelle und Kontext-Aufbau.

use std::fmt;

use tracing::{debug, info, warn};

use crate::config::DevicePolicy;
use crate::graphics::{GlBufferId, SurfaceHandles};
use crate::{Float4, InteropError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Gpu,
    Cpu,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceKind::Gpu => "GPU",
            DeviceKind::Cpu => "CPU",
        })
    }
}

/// Schnittstelle zur Compute-API.
///
/// Alle Handles geben ihre Ressource beim Drop frei. Befehle auf einer Queue
/// werden in Einreichungsreihenfolge ausgeführt; `enqueue_*` blockiert nicht,
/// nur `finish` und `read_memory` warten.
pub trait ComputeBackend {
    type Platform;
    type Device: Copy;
    type Context;
    type Queue;
    type Program;
    type Kernel;
    type Memory;

    fn platforms(&self) -> Result<Vec<Self::Platform>>;

    fn platform_name(&self, platform: &Self::Platform) -> String;

    /// Geräte des Typs `kind`; leer, wenn es keine gibt
    fn devices(&self, platform: &Self::Platform, kind: DeviceKind) -> Result<Vec<Self::Device>>;

    fn device_name(&self, device: Self::Device) -> String;

    /// Kontext auf `device`, verknüpft mit Plattform und GL-Kontext
    fn create_context(
        &self,
        platform: &Self::Platform,
        device: Self::Device,
        kind: DeviceKind,
        surface: &SurfaceHandles,
    ) -> Result<Self::Context>;

    /// In-Order-Queue auf dem ersten Gerät des Kontexts
    fn create_queue(&self, context: &Self::Context) -> Result<Self::Queue>;

    /// Baut das Programm; bei Fehlern kommt das Build-Log unverändert zurück
    fn build_program(&self, context: &Self::Context, source: &str) -> Result<Self::Program>;

    fn create_kernel(&self, program: &Self::Program, entry: &str) -> Result<Self::Kernel>;

    /// Speicherobjekt (read-write) über dem Speicher des GL-Buffers
    fn wrap_gl_buffer(&self, context: &Self::Context, buffer: GlBufferId) -> Result<Self::Memory>;

    fn set_memory_arg(&self, kernel: &Self::Kernel, index: u32, memory: &Self::Memory) -> Result<()>;

    fn enqueue_acquire(&self, queue: &Self::Queue, memory: &Self::Memory) -> Result<()>;

    fn enqueue_launch(
        &self,
        queue: &Self::Queue,
        kernel: &Self::Kernel,
        global: usize,
        local: usize,
    ) -> Result<()>;

    fn enqueue_release(&self, queue: &Self::Queue, memory: &Self::Memory) -> Result<()>;

    /// Blockiert, bis die Queue leer ist
    fn finish(&self, queue: &Self::Queue) -> Result<()>;

    /// Blockierendes Lesen; `memory` muss auf Compute-Seite liegen
    fn read_memory(&self, queue: &Self::Queue, memory: &Self::Memory, out: &mut [Float4]) -> Result<()>;
}

/// Das Gerät, auf dem der Kontext angelegt wurde.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectedDevice {
    pub platform: String,
    pub device: String,
    pub kind: DeviceKind,
}

/// Sucht Plattform und Gerät gemäß `policy` und legt den geteilten Kontext an.
///
/// Pro Gerätetyp wird die erste Plattform genommen, die mindestens ein Gerät
/// dieses Typs meldet. Schlägt der Kontext fehl, geht es nur bei
/// [`DevicePolicy::GpuThenCpu`] mit CPU-Geräten weiter.
pub fn create_context<C: ComputeBackend>(
    backend: &C,
    surface: &SurfaceHandles,
    policy: DevicePolicy,
) -> Result<(C::Context, SelectedDevice)> {
    let platforms = backend.platforms()?;
    if platforms.is_empty() {
        return Err(InteropError::NoPlatform);
    }
    debug!(count = platforms.len(), "compute platforms found");

    let mut last_err = None;
    for &kind in policy.candidates() {
        let found = platforms.iter().find_map(|p| match backend.devices(p, kind) {
            Ok(devices) if !devices.is_empty() => Some((p, devices[0])),
            Ok(_) => None,
            Err(e) => {
                debug!(error = %e, "device query failed");
                None
            }
        });

        let Some((platform, device)) = found else {
            debug!(%kind, "no device of this kind");
            continue;
        };

        match backend.create_context(platform, device, kind, surface) {
            Ok(context) => {
                let selected = SelectedDevice {
                    platform: backend.platform_name(platform),
                    device: backend.device_name(device),
                    kind,
                };
                info!(
                    platform = %selected.platform,
                    device = %selected.device,
                    %kind,
                    "compute context created"
                );
                return Ok((context, selected));
            }
            Err(e) => {
                warn!(%kind, error = %e, "context creation failed");
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or(InteropError::NoDevice { policy }))
}
