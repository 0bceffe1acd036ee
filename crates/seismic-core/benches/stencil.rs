//! Stencil kernel and engine throughput.
//!
//! Run with: cargo bench -p seismic-core --bench stencil

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

use seismic_core::kernel::RowSweep;
use seismic_core::memory::AlignedGrid;
use seismic_core::prelude::*;

const WIDTH: usize = 260;
const HEIGHT: usize = 132;

fn filled(len: usize, alignment: usize, value: f32) -> AlignedGrid {
    let mut grid = AlignedGrid::new(len, alignment).expect("allocation");
    for (i, v) in grid.as_mut_slice().iter_mut().enumerate() {
        *v = value * ((i % 17) as f32 - 8.0);
    }
    grid
}

// =============================================================================
// Single sweep over the interior, per kernel
// =============================================================================

fn bench_kernel_sweep(c: &mut Criterion) {
    let caps = Capabilities::detect();
    let registry = KernelRegistry::builtin();
    let interior = ((WIDTH - 4) * (HEIGHT - 4)) as u64;

    let mut group = c.benchmark_group("kernel_sweep");
    group.throughput(Throughput::Elements(interior));
    group.measurement_time(Duration::from_secs(3));

    for variant in registry.list_available(caps) {
        let len = WIDTH * HEIGHT;
        let current = filled(len, variant.alignment, 0.01);
        let velocity = filled(len, variant.alignment, 0.0001);
        let mut next = filled(len, variant.alignment, 0.02);

        group.bench_with_input(BenchmarkId::from_parameter(variant.name), variant, |b, variant| {
            b.iter(|| {
                let next = next.as_mut_slice();
                for i in 2..WIDTH - 2 {
                    let base = i * HEIGHT + 2;
                    let window = &mut next[base..base + HEIGHT - 4];
                    variant.kernel.sweep_row(RowSweep::new(
                        current.as_slice(),
                        velocity.as_slice(),
                        window,
                        base,
                        HEIGHT,
                    ));
                }
                black_box(next[WIDTH * HEIGHT / 2]);
            });
        });
    }

    group.finish();
}

// =============================================================================
// Full runs across thread counts
// =============================================================================

fn bench_engine_threads(c: &mut Criterion) {
    let caps = Capabilities::detect();
    let registry = KernelRegistry::builtin();
    let medium = Medium::default();
    let steps = 20;

    let mut group = c.benchmark_group("engine_threads");
    group.sample_size(20);

    for threads in [1usize, 2, 4] {
        let config = SimulationConfig::new(WIDTH, HEIGHT)
            .with_timesteps(steps)
            .with_kernel("plain_opt")
            .with_threads(threads);
        let sim = Simulation::new(config, &registry, caps).expect("valid configuration");

        group.bench_with_input(BenchmarkId::from_parameter(threads), &sim, |b, sim| {
            b.iter(|| {
                let mut field = sim.allocate(&medium).expect("allocation");
                let report = sim.run(&mut field).expect("run");
                black_box(report.final_index);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_kernel_sweep, bench_engine_threads);
criterion_main!(benches);
