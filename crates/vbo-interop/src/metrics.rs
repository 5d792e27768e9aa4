//! Zähler und Latenzen für Acquire, Release und Kernel-Starts.
#![cfg(feature = "metrics")]

use once_cell::sync::Lazy;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Instant,
};

use tracing::info;

/* ───────────── Roh‑Latenzen ─────────────────────────── */

static TIMES: Lazy<Mutex<Vec<(&'static str, u128)>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Im Wrapper aufrufen: `record("acquire", t)`
pub fn record(name: &'static str, start: Instant) {
    let dur = start.elapsed().as_micros();
    TIMES.lock().unwrap_or_else(|p| p.into_inner()).push((name, dur));
}

/* ───────────── Übergaben & Starts ────────────────────── */

pub static ACQUIRES: AtomicUsize = AtomicUsize::new(0);
pub static RELEASES: AtomicUsize = AtomicUsize::new(0);
pub static LAUNCHES: AtomicUsize = AtomicUsize::new(0);

/* ───────────── Zusammenfassung ausgeben ─────────────── */

/// Am Programmende aufrufen, z. B. in `main()`
pub fn summary() {
    let mut map: HashMap<&str, Vec<u128>> = HashMap::new();
    {
        let mut times = TIMES.lock().unwrap_or_else(|p| p.into_inner());
        for (name, us) in times.drain(..) {
            map.entry(name).or_default().push(us);
        }
    }

    info!("── metrics summary ──");
    for (name, mut v) in map {
        v.sort_unstable();
        let mean = v.iter().sum::<u128>() / v.len() as u128;
        let p95 = v[((v.len() * 95) / 100).saturating_sub(1)];
        info!("{:<10} n={:<6} mean={:>6} µs   p95={:>6} µs", name, v.len(), mean, p95);
    }

    let acquires = ACQUIRES.load(Ordering::Relaxed);
    let releases = RELEASES.load(Ordering::Relaxed);
    let launches = LAUNCHES.load(Ordering::Relaxed);
    info!("acquires: {acquires}   releases: {releases}   kernel launches: {launches}");
    if acquires != releases {
        tracing::warn!("unbalanced acquire/release: {acquires} vs {releases}");
    }
}
