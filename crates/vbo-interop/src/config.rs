//! Laufzeit-Konfiguration.

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::compute::DeviceKind;
use crate::graphics::{buffer_bytes_for, MAX_BUFFER_BYTES};
use crate::{InteropError, Result};

/// Geräteauswahl beim Anlegen des Compute-Kontexts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DevicePolicy {
    /// nur GPU-Geräte
    #[default]
    GpuOnly,
    /// GPU bevorzugt, sonst CPU
    GpuThenCpu,
}

impl DevicePolicy {
    /// Gerätetypen in Versuchsreihenfolge
    pub fn candidates(self) -> &'static [DeviceKind] {
        match self {
            DevicePolicy::GpuOnly => &[DeviceKind::Gpu],
            DevicePolicy::GpuThenCpu => &[DeviceKind::Gpu, DeviceKind::Cpu],
        }
    }
}

impl fmt::Display for DevicePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DevicePolicy::GpuOnly => "gpu-only",
            DevicePolicy::GpuThenCpu => "gpu-then-cpu",
        })
    }
}

impl FromStr for DevicePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "gpu-only" | "gpu" => Ok(DevicePolicy::GpuOnly),
            "gpu-then-cpu" | "fallback" => Ok(DevicePolicy::GpuThenCpu),
            other => Err(format!("unknown device policy `{other}`")),
        }
    }
}

/// Verhalten der Ereignisschleife nach dem ersten Dispatch
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// nach dem ersten erfolgreichen Dispatch abbauen
    #[default]
    Once,
    /// bis `max_frames` oder CloseRequested weiterlaufen
    Continuous,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunMode::Once => "once",
            RunMode::Continuous => "continuous",
        })
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "once" => Ok(RunMode::Once),
            "continuous" => Ok(RunMode::Continuous),
            other => Err(format!("unknown run mode `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InteropConfig {
    /// Anzahl der float4-Elemente im Vertex-Buffer
    #[serde(default = "default_element_count")]
    pub element_count: usize,

    /// feste lokale Work-Group-Größe
    #[serde(default = "default_work_group_size")]
    pub work_group_size: usize,

    /// Kernel-Starts pro Dispatch
    #[serde(default = "default_iterations")]
    pub iterations: u32,

    #[serde(default)]
    pub device_policy: DevicePolicy,

    #[serde(default)]
    pub run_mode: RunMode,

    /// Obergrenze für Frames im Modus `continuous`
    #[serde(default)]
    pub max_frames: Option<u64>,

    #[serde(default = "default_kernel_entry")]
    pub kernel_entry: String,

    /// externe Kernel-Quelle statt der eingebetteten
    #[serde(default)]
    pub kernel_source: Option<PathBuf>,
}

impl Default for InteropConfig {
    fn default() -> Self {
        Self {
            element_count: default_element_count(),
            work_group_size: default_work_group_size(),
            iterations: default_iterations(),
            device_policy: DevicePolicy::default(),
            run_mode: RunMode::default(),
            max_frames: None,
            kernel_entry: default_kernel_entry(),
            kernel_source: None,
        }
    }
}

impl InteropConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| InteropError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| InteropError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Prüft alles, was vor dem ersten Gerätezugriff feststehen muss.
    pub fn validate(&self) -> Result<()> {
        if self.element_count == 0 {
            return Err(InteropError::Config("element_count must be positive".into()));
        }
        if self.work_group_size == 0 {
            return Err(InteropError::Config("work_group_size must be positive".into()));
        }
        if self.iterations == 0 {
            return Err(InteropError::Config("iterations must be at least 1".into()));
        }
        if self.buffer_bytes().is_none() {
            return Err(InteropError::Config(format!(
                "element_count {} exceeds the maximum buffer size of {MAX_BUFFER_BYTES} bytes",
                self.element_count
            )));
        }
        if self.element_count % self.work_group_size != 0 {
            return Err(InteropError::InvalidWorkSize {
                global: self.element_count,
                local: self.work_group_size,
            });
        }
        if self.kernel_entry.trim().is_empty() {
            return Err(InteropError::Config("kernel_entry must not be empty".into()));
        }
        if self.max_frames == Some(0) {
            return Err(InteropError::Config("max_frames must be at least 1".into()));
        }
        Ok(())
    }

    /// Soll-Größe des Vertex-Buffers in Bytes, `None` wenn sie nicht darstellbar ist
    pub fn buffer_bytes(&self) -> Option<usize> {
        buffer_bytes_for(self.element_count)
    }
}

fn default_element_count() -> usize {
    256
}

fn default_work_group_size() -> usize {
    32
}

fn default_iterations() -> u32 {
    8000
}

fn default_kernel_entry() -> String {
    "init_vbo_kernel".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_sample_constants() {
        let cfg = InteropConfig::default();
        assert_eq!(cfg.element_count, 256);
        assert_eq!(cfg.work_group_size, 32);
        assert_eq!(cfg.iterations, 8000);
        assert_eq!(cfg.buffer_bytes(), Some(4096));
        assert_eq!(cfg.device_policy, DevicePolicy::GpuOnly);
        assert_eq!(cfg.run_mode, RunMode::Once);
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = InteropConfig::from_toml_str(
            r#"
            iterations = 4
            device_policy = "gpu-then-cpu"
            run_mode = "continuous"
            max_frames = 3
            "#,
        )
        .unwrap();
        assert_eq!(cfg.iterations, 4);
        assert_eq!(cfg.element_count, 256);
        assert_eq!(cfg.device_policy, DevicePolicy::GpuThenCpu);
        assert_eq!(cfg.run_mode, RunMode::Continuous);
        assert_eq!(cfg.max_frames, Some(3));
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = InteropConfig::from_toml_str("elements = 3").unwrap_err();
        assert!(matches!(err, InteropError::Config(_)));
    }

    #[test]
    fn indivisible_work_size_is_rejected() {
        let cfg = InteropConfig { element_count: 250, ..Default::default() };
        assert!(matches!(
            cfg.validate(),
            Err(InteropError::InvalidWorkSize { global: 250, local: 32 })
        ));
    }

    #[test]
    fn overflowing_element_count_is_rejected() {
        // teilbar durch 32, aber 16 Byte pro Element laufen über
        let cfg = InteropConfig { element_count: 1usize << 60, ..Default::default() };
        assert_eq!(cfg.buffer_bytes(), None);
        assert!(matches!(cfg.validate(), Err(InteropError::Config(_))));

        // knapp über GLint::MAX
        let cfg = InteropConfig { element_count: 1usize << 27, ..Default::default() };
        assert!(matches!(cfg.validate(), Err(InteropError::Config(_))));
    }

    #[test]
    fn zero_iterations_is_rejected() {
        let cfg = InteropConfig { iterations: 0, ..Default::default() };
        assert!(matches!(cfg.validate(), Err(InteropError::Config(_))));
    }

    #[test]
    fn policy_parses_from_cli_spelling() {
        assert_eq!("gpu-then-cpu".parse::<DevicePolicy>(), Ok(DevicePolicy::GpuThenCpu));
        assert!("tpu".parse::<DevicePolicy>().is_err());
        assert_eq!(DevicePolicy::GpuThenCpu.candidates(), &[DeviceKind::Gpu, DeviceKind::Cpu]);
    }
}
