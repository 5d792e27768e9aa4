//! vbo-interop: Vertex-Buffer per Compute-Kernel nullen, auf dem kopflosen
//! GL/CL-Gerätepaar.
//!
//! ```bash
//! # Standard: 256 Elemente, 8000 Starts, ein Frame
//! vbo-interop
//!
//! # mehrere Frames, mit CPU-Fallback
//! vbo-interop --run-mode continuous --max-frames 10 --device-policy gpu-then-cpu
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use vbo_interop::sim::{SimConfig, SimDevice, SimPlatform};
use vbo_interop::{DeviceKind, DevicePolicy, InteropConfig, Lifecycle, RunMode, SurfaceEvent};

#[derive(Parser, Debug)]
#[command(name = "vbo-interop")]
#[command(version)]
#[command(about = "Zero a shared GL vertex buffer from a compute kernel", long_about = None)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of float4 elements in the vertex buffer
    #[arg(long)]
    elements: Option<usize>,

    /// Kernel launches per dispatch
    #[arg(long)]
    iterations: Option<u32>,

    /// Local work-group size
    #[arg(long)]
    work_group_size: Option<usize>,

    /// Device selection (gpu-only, gpu-then-cpu)
    #[arg(long)]
    device_policy: Option<DevicePolicy>,

    /// Run mode (once, continuous)
    #[arg(long)]
    run_mode: Option<RunMode>,

    /// Stop after this many frames in continuous mode
    #[arg(long)]
    max_frames: Option<u64>,

    /// Kernel source file instead of the embedded one
    #[arg(long)]
    kernel: Option<PathBuf>,

    /// Headless device: expose only CPU devices
    #[arg(long)]
    cpu_only: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> Result<InteropConfig, vbo_interop::InteropError> {
        let mut cfg = match &self.config {
            Some(path) => InteropConfig::load(path)?,
            None => InteropConfig::default(),
        };
        if let Some(n) = self.elements {
            cfg.element_count = n;
        }
        if let Some(n) = self.iterations {
            cfg.iterations = n;
        }
        if let Some(n) = self.work_group_size {
            cfg.work_group_size = n;
        }
        if let Some(p) = self.device_policy {
            cfg.device_policy = p;
        }
        if let Some(m) = self.run_mode {
            cfg.run_mode = m;
        }
        if self.max_frames.is_some() {
            cfg.max_frames = self.max_frames;
        }
        if self.kernel.is_some() {
            cfg.kernel_source = self.kernel;
        }
        Ok(cfg)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).with_target(true).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to set tracing subscriber: {e}");
    }

    let sim = if args.cpu_only {
        SimConfig {
            platforms: vec![SimPlatform::new("Headless", &[DeviceKind::Cpu])],
            ..Default::default()
        }
    } else {
        SimConfig::default()
    };

    let config = match args.into_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let device = SimDevice::new(sim);
    let lifecycle = match Lifecycle::new(config, device.graphics(), device.compute()) {
        Ok(lc) => lc,
        Err(e) => {
            error!(step = e.step(), "{e}");
            return ExitCode::FAILURE;
        }
    };

    // der erste Frame kommt als Redraw, danach nur noch Idle
    let events = std::iter::once(SurfaceEvent::Redraw).chain(std::iter::repeat(SurfaceEvent::Idle));
    let outcome = lifecycle.run(events);

    if let Some(dev) = &outcome.device {
        info!(platform = %dev.platform, device = %dev.device, frames = outcome.frames, "done");
    }

    #[cfg(feature = "metrics")]
    vbo_interop::summary();

    outcome.status.into()
}
