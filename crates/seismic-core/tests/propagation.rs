//! End-to-end properties of the time-stepping engine.

use seismic_core::kernel::{RowSweep, StencilKernel};
use seismic_core::prelude::*;
use seismic_core::render;

fn run_with(
    config: SimulationConfig,
    registry: &KernelRegistry,
    medium: &Medium,
    pulse: Option<PulseSeries>,
) -> Result<(Wavefield, RunReport)> {
    let sim = Simulation::new(config, registry, Capabilities::detect())?;
    let mut field = sim.allocate(medium)?;
    if let Some(pulse) = pulse {
        field.set_pulse(pulse)?;
    }
    let report = sim.run(&mut field)?;
    Ok((field, report))
}

fn run(config: SimulationConfig, medium: &Medium) -> (Wavefield, RunReport) {
    run_with(config, &KernelRegistry::builtin(), medium, None).unwrap()
}

fn chebyshev(cell: usize, height: usize, x: usize, y: usize) -> usize {
    let (i, j) = (cell / height, cell % height);
    i.abs_diff(x).max(j.abs_diff(y))
}

/// Straightforward 2-D array simulation used as an independent check.
fn scalar_reference(
    width: usize,
    height: usize,
    steps: usize,
    velocity: f32,
    pulse: &PulseSeries,
    (px, py): (usize, usize),
) -> Vec<Vec<Vec<f32>>> {
    let mut cur = vec![vec![0.0f32; height]; width];
    let mut old = vec![vec![0.0f32; height]; width];
    cur[px][py] += pulse.get(0);

    let mut history = Vec::with_capacity(steps);
    for t in 0..steps {
        let mut new = old.clone();
        for i in 2..width - 2 {
            for j in 2..height - 2 {
                let c = cur[i][j];
                let near = cur[i][j - 1] + cur[i][j + 1] + cur[i - 1][j] + cur[i + 1][j];
                let far = cur[i][j - 2] + cur[i][j + 2] + cur[i - 2][j] + cur[i + 2][j];
                new[i][j] = 2.0 * c - old[i][j] + velocity * (16.0 * near - far - 60.0 * c);
            }
        }
        new[px][py] += pulse.get(t + 1);
        old = cur;
        cur = new;
        history.push(cur.clone());
    }
    history
}

#[test]
fn test_determinism_across_thread_counts() {
    let medium = Medium::uniform(0.01);
    let base = SimulationConfig::new(36, 36).with_timesteps(12).with_pulse(13, 20);
    let (reference, _) = run(base.clone(), &medium);

    for threads in [2usize, 4, 8] {
        let (field, report) = run(base.clone().with_threads(threads), &medium);
        assert_eq!(report.threads, threads);
        assert_eq!(report.mode, ExecutionMode::Parallel);
        assert_eq!(field.current(), reference.current(), "{} threads", threads);
    }
}

#[test]
fn test_kernels_agree_with_reference() {
    let medium = Medium::uniform(0.01);
    let registry = KernelRegistry::builtin();
    let caps = Capabilities::detect();
    let base = SimulationConfig::new(36, 36).with_timesteps(10);
    let (reference, _) = run(base.clone(), &medium);

    let fma = Capabilities::from_bits(Capabilities::FMA);
    for variant in registry.list_available(caps) {
        for threads in [1usize, 4] {
            let config = base.clone().with_kernel(variant.name).with_threads(threads);
            let (field, _) = run_with(config, &registry, &medium, None).unwrap();
            if variant.requires.contains(fma) {
                for (a, b) in field.current().iter().zip(reference.current()) {
                    assert!((a - b).abs() <= 1e-5 * (1.0 + b.abs()), "{}", variant.name);
                }
            } else {
                assert_eq!(field.current(), reference.current(), "{} x {}", variant.name, threads);
            }
        }
    }
}

#[test]
fn test_swap_parity() {
    let medium = Medium::uniform(0.01);
    for steps in [0usize, 1, 2, 3, 8] {
        let (field, report) = run(SimulationConfig::new(16, 16).with_timesteps(steps), &medium);
        assert_eq!(report.final_index, steps % 2);
        let expected = field.buffer(steps % 2);
        assert_eq!(render::final_pressure(&field).as_ptr(), expected.as_ptr());
    }
}

#[test]
fn test_pulse_injected_exactly_once_per_step() {
    // Integer amplitudes keep every sum exact in f32.
    let amplitudes = [1.0f32, 3.0, -2.0, 5.0, 0.0, -4.0, 2.0, 1.0];
    let steps = amplitudes.len() - 1;
    let (px, py) = (9, 7);
    let medium = Medium::uniform(0.0);

    for threads in [1usize, 2] {
        // p[t] is the field one step before the end of a run of t + 1 steps.
        let mut p = Vec::with_capacity(steps + 1);
        for len in 1..=steps + 1 {
            let config = SimulationConfig::new(20, 12)
                .with_timesteps(len)
                .with_pulse(px, py)
                .with_threads(threads);
            let pulse = PulseSeries::from_amplitudes(&amplitudes[..len]);
            let (field, report) = run_with(config, &KernelRegistry::builtin(), &medium, Some(pulse)).unwrap();

            let previous = field.buffer(report.final_index ^ 1);
            p.push(previous[px * 12 + py]);
            for (cell, &value) in previous.iter().enumerate() {
                if cell != px * 12 + py {
                    assert_eq!(value, 0.0, "cell {} touched", cell);
                }
            }
        }

        assert_eq!(p[0], amplitudes[0]);
        for t in 0..steps {
            let before = if t == 0 { 0.0 } else { p[t - 1] };
            assert_eq!(p[t + 1] - 2.0 * p[t] + before, amplitudes[t + 1], "step {}", t);
        }
    }
}

#[test]
fn test_light_cone() {
    let medium = Medium::uniform(0.01);
    let (width, height, px, py) = (40, 40, 20, 20);
    for steps in 1..=6 {
        let config = SimulationConfig::new(width, height)
            .with_timesteps(steps)
            .with_pulse(px, py)
            .with_threads(4);
        let (field, _) = run(config, &medium);
        for (cell, &value) in field.current().iter().enumerate() {
            if chebyshev(cell, height, px, py) > 2 * steps {
                assert_eq!(value, 0.0, "cell {} after {} steps", cell, steps);
            }
        }
    }
}

#[test]
fn test_validation_before_allocation() {
    let registry = KernelRegistry::builtin();
    let caps = Capabilities::detect();

    // 18 interior rows cannot be split over 4 threads; a grid this wide
    // would also fail allocation, so a geometry error proves the order.
    let config = SimulationConfig::new(1 << 40, 22).with_threads(4);
    let err = Simulation::new(config, &registry, caps).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigValidation);
    assert!(matches!(err, SeismicError::InvalidGeometry(_)));

    let err = Simulation::new(SimulationConfig::new(20, 20).with_kernel("nope"), &registry, caps).unwrap_err();
    assert!(matches!(err, SeismicError::UnsupportedVariant { .. }));

    let err = Simulation::new(SimulationConfig::new(20, 20), &registry, Capabilities::none());
    assert!(err.is_ok());
}

#[test]
fn test_small_grid_scenario() {
    let (width, height, steps, velocity) = (20, 20, 3, 0.01);
    let (px, py) = (10, 10);
    let medium = Medium::uniform(velocity);
    let registry = KernelRegistry::builtin();

    let mut fields = Vec::new();
    for t in 1..=steps {
        let config = SimulationConfig::new(width, height)
            .with_timesteps(t)
            .with_pulse(px, py)
            .with_kernel("plain_naive");
        // Same source for every run: the first `t` amplitudes of the full series.
        let full = PulseSeries::ricker(steps, medium.peak_frequency());
        let pulse = PulseSeries::from_amplitudes(&full.as_slice()[..t]);
        let (field, _) = run_with(config, &registry, &medium, Some(pulse)).unwrap();
        fields.push(field);
    }

    let full = PulseSeries::ricker(steps, medium.peak_frequency());
    let expected = scalar_reference(width, height, steps, velocity, &full, (px, py));

    // After the first step only the stencil footprint is nonzero.
    for (cell, &value) in fields[0].current().iter().enumerate() {
        if value != 0.0 {
            assert!(chebyshev(cell, height, px, py) <= 2);
        }
    }

    // After three steps the nonzero region reaches exactly radius 6.
    let radius = fields[2]
        .current()
        .iter()
        .enumerate()
        .filter(|&(_, &v)| v != 0.0)
        .map(|(cell, _)| chebyshev(cell, height, px, py))
        .max()
        .unwrap();
    assert_eq!(radius, 6);

    // Intermediate steps see the sentinel instead of the next amplitude, so
    // compare them away from the pulse cell; the last step is exact.
    for (t, field) in fields.iter().enumerate() {
        let grid = field.current();
        let mut sum = 0.0f64;
        let mut expected_sum = 0.0f64;
        for i in 0..width {
            for j in 0..height {
                if t + 1 < steps && (i, j) == (px, py) {
                    continue;
                }
                sum += f64::from(grid[i * height + j]);
                expected_sum += f64::from(expected[t][i][j]);
                if t + 1 == steps {
                    assert_eq!(grid[i * height + j], expected[t][i][j], "({}, {})", i, j);
                }
            }
        }
        assert!((sum - expected_sum).abs() <= 1e-9, "step {}: {} vs {}", t + 1, sum, expected_sum);
    }
}

#[test]
fn test_inner_partition_matches_outer() {
    let medium = Medium::uniform(0.01);
    let base = SimulationConfig::new(30, 36).with_timesteps(9).with_pulse(11, 25);
    let (outer, _) = run(base.clone().with_threads(4), &medium);
    let (inner, _) = run(
        base.with_threads(4).with_partition(PartitionMode::Inner),
        &medium,
    );
    assert_eq!(inner.current(), outer.current());
}

#[test]
fn test_write_final_field() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("output.bin");
    let (field, _) = run(SimulationConfig::new(16, 12).with_timesteps(5), &Medium::default());

    render::write_raw(&path, render::final_pressure(&field)).unwrap();
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 16 * 12 * 4);
    let back: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    assert_eq!(back.as_slice(), field.current());
}

/// Panics when asked to update outer index `column`.
struct FaultyKernel {
    column: usize,
}

impl StencilKernel for FaultyKernel {
    fn sweep_row(&self, row: RowSweep<'_>) {
        if row.offset() / row.stride() == self.column {
            panic!("injected kernel failure");
        }
        seismic_core::kernel::PlainNaive.sweep_row(row);
    }
}

#[test]
fn test_worker_panic_is_lifecycle_error() {
    // 16 interior columns over 4 threads: column 14 belongs to worker 3,
    // column 3 to worker 0 on the calling thread.
    for column in [14usize, 3] {
        let mut registry = KernelRegistry::new();
        registry
            .register(KernelVariant::new("faulty", 0, 0, 1, FaultyKernel { column }))
            .unwrap();
        let config = SimulationConfig::new(20, 20)
            .with_timesteps(4)
            .with_threads(4)
            .with_kernel("faulty");

        let err = run_with(config, &registry, &Medium::default(), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ThreadLifecycle, "column {}", column);
        assert!(!matches!(err, SeismicError::BarrierAborted));
    }
}
