//! Fuzz target for the domain partitioner.
//!
//! Checks that every accepted request yields contiguous, disjoint ranges
//! covering the interior with exactly one pulse owner.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use seismic_core::partition::{partition, PartitionMode, PartitionRequest};

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    width: u16,
    height: u16,
    threads: u8,
    vector_width: u8,
    pulse_x: u16,
    pulse_y: u16,
    inner: bool,
}

fuzz_target!(|input: FuzzInput| {
    let req = PartitionRequest {
        width: input.width as usize,
        height: input.height as usize,
        threads: input.threads as usize,
        vector_width: input.vector_width as usize,
        pulse_x: input.pulse_x as usize,
        pulse_y: input.pulse_y as usize,
        mode: if input.inner {
            PartitionMode::Inner
        } else {
            PartitionMode::Outer
        },
    };

    let tasks = match partition(&req) {
        Ok(tasks) => tasks,
        Err(_) => return,
    };
    assert_eq!(tasks.len(), req.threads);

    let (all, pulse) = match req.mode {
        PartitionMode::Outer => (2..req.width - 2, req.pulse_x),
        PartitionMode::Inner => (2..req.height - 2, req.pulse_y),
    };

    let mut cursor = all.start;
    for task in &tasks {
        let range = match req.mode {
            PartitionMode::Outer => &task.outer,
            PartitionMode::Inner => &task.inner,
        };
        assert_eq!(range.start, cursor, "gap or overlap at task {}", task.id);
        assert!(range.end >= range.start);
        assert!(range.end <= all.end);
        cursor = range.end;
    }
    assert_eq!(cursor, all.end);

    let owners = tasks.iter().filter(|t| t.owns_pulse).count();
    assert_eq!(owners, usize::from(all.contains(&pulse)));
});
