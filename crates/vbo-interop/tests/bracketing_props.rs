//! Eigenschaften des Befehlsjournals auf dem kopflosen Gerät:
//!
//! - jeder Kernel-Start liegt in einer Acquire/Release-Klammer für sein
//!   Speicherobjekt, Klammern sind nie geschachtelt, vor jedem Acquire steht
//!   ein glFinish
//! - beliebig viele Starts hinterlassen denselben Inhalt wie einer
use proptest::prelude::*;
use std::collections::HashSet;

use vbo_interop::sim::{Entry, SimConfig, SimDevice};
use vbo_interop::{ExitStatus, Flow, Float4, InteropConfig, Lifecycle, RunMode, SurfaceEvent};

fn check_brackets(journal: &[Entry]) -> Result<(), String> {
    let mut held: HashSet<u64> = HashSet::new();
    let mut gl_finished = false;
    for (i, e) in journal.iter().enumerate() {
        match e {
            Entry::GraphicsFinish => gl_finished = true,
            Entry::BufferAllocated { .. } => gl_finished = false,
            Entry::Acquire { memory } => {
                if !gl_finished {
                    return Err(format!("#{i}: acquire without preceding glFinish"));
                }
                if !held.insert(*memory) {
                    return Err(format!("#{i}: nested acquire of {memory}"));
                }
                gl_finished = false;
            }
            Entry::Launch { memory, .. } => {
                if !held.contains(memory) {
                    return Err(format!("#{i}: launch outside bracket for {memory}"));
                }
            }
            Entry::Release { memory } => {
                if !held.remove(memory) {
                    return Err(format!("#{i}: release without acquire of {memory}"));
                }
            }
            Entry::QueueFinish | Entry::Released(_) => {}
        }
    }
    if held.is_empty() {
        Ok(())
    } else {
        Err(format!("unreleased memory objects: {held:?}"))
    }
}

fn event_strategy() -> impl Strategy<Value = SurfaceEvent> {
    prop_oneof![
        4 => Just(SurfaceEvent::Idle),
        2 => Just(SurfaceEvent::Redraw),
        1 => Just(SurfaceEvent::CloseRequested),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    #[test]
    fn prop_launches_stay_inside_brackets(
        iterations in 1u32..40,
        groups in 1usize..16,
        events in prop::collection::vec(event_strategy(), 1..12),
        fail_at in prop::option::of(0u64..200),
        read_backs in prop::collection::vec(any::<bool>(), 12),
    ) {
        let dev = SimDevice::new(SimConfig { fail_launch_at: fail_at, ..Default::default() });
        let cfg = InteropConfig {
            element_count: groups * 32,
            iterations,
            run_mode: RunMode::Continuous,
            ..Default::default()
        };
        let mut lc = Lifecycle::new(cfg, dev.graphics(), dev.compute()).unwrap();
        lc.initialize().unwrap();

        for (event, read) in events.into_iter().zip(read_backs) {
            match lc.handle(event) {
                Flow::Continue => {
                    if read {
                        let data = lc.read_back().unwrap();
                        prop_assert!(data.iter().all(|v| *v == Float4::ZERO));
                    }
                }
                Flow::Exit(_) => break,
            }
        }
        let status = lc.shutdown();
        if fail_at.is_none() {
            prop_assert_eq!(status, ExitStatus::Success);
        }

        let journal = dev.journal();
        if let Err(msg) = check_brackets(&journal) {
            return Err(TestCaseError::fail(msg));
        }
        prop_assert_eq!(dev.live_objects(), 0);
        prop_assert_eq!(dev.live_buffers(), 0);
    }

    #[test]
    fn prop_iterations_are_idempotent(iterations in 1u32..200, groups in 1usize..8) {
        let run = |iterations: u32| {
            let dev = SimDevice::new(SimConfig::default());
            let cfg = InteropConfig {
                element_count: groups * 32,
                iterations,
                run_mode: RunMode::Continuous,
                ..Default::default()
            };
            let mut lc = Lifecycle::new(cfg, dev.graphics(), dev.compute()).unwrap();
            lc.initialize().unwrap();
            lc.handle(SurfaceEvent::Idle);
            lc.read_back().unwrap()
        };
        let one = run(1);
        prop_assert_eq!(&one, &run(iterations));
        prop_assert!(one.iter().all(|v| *v == Float4::ZERO));
    }
}

#[test]
fn bracket_checker_flags_launch_outside_bracket() {
    let journal = vec![
        Entry::GraphicsFinish,
        Entry::Acquire { memory: 1 },
        Entry::Release { memory: 1 },
        Entry::Launch { kernel: 2, memory: 1, global: 256, local: 32 },
    ];
    assert!(check_brackets(&journal).is_err());
}
