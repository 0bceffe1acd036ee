//! Barrier-synchronized time stepping.
//!
//! A run spawns one worker per [`ThreadTask`]; task 0 executes on the calling
//! thread. Each worker sweeps its own part of the grid, injects the pulse if
//! it owns the pulse cell, flips its local role index and meets its peers at
//! the step barrier. The two pressure grids are never moved or swapped; only
//! the index naming the current one changes.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use crate::barrier::StepBarrier;
use crate::capability::Capabilities;
use crate::config::SimulationConfig;
use crate::error::{Result, SeismicError};
use crate::kernel::{RowSweep, StencilKernel};
use crate::medium::Medium;
use crate::memory::{validate_alignment, Wavefield};
use crate::partition::{partition, PartitionRequest, ThreadTask};
use crate::pulse::{inject, PulseSeries};
use crate::registry::{KernelRegistry, KernelVariant};

/// How the kernel is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One worker on the calling thread.
    Sequential,
    /// One worker per task on separate OS threads.
    Parallel,
}

/// Timing and throughput of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Kernel variant used.
    pub kernel: &'static str,
    /// Worker count.
    pub threads: usize,
    /// Steps executed.
    pub timesteps: usize,
    /// How the kernel was driven.
    pub mode: ExecutionMode,
    /// Wall time of the whole run, thread start-up included.
    pub outer_elapsed: Duration,
    /// Wall time of worker 0's step loop.
    pub inner_elapsed: Duration,
    /// Work in the units of [`SimulationConfig::gflop`].
    pub gflop: f64,
    /// Grid index holding the final field.
    pub final_index: usize,
}

impl RunReport {
    /// Throughput over the outer wall time.
    pub fn gflops_outer(&self) -> f64 {
        gflops(self.gflop, self.outer_elapsed)
    }

    /// Throughput over the step loop only.
    pub fn gflops_inner(&self) -> f64 {
        gflops(self.gflop, self.inner_elapsed)
    }
}

fn gflops(gflop: f64, elapsed: Duration) -> f64 {
    let ms = elapsed.as_secs_f64() * 1000.0;
    if ms > 0.0 {
        gflop / ms
    } else {
        0.0
    }
}

/// A validated run: configuration, selected kernel and work split.
#[derive(Debug)]
pub struct Simulation<'r> {
    config: SimulationConfig,
    variant: &'r KernelVariant,
    tasks: Vec<ThreadTask>,
}

impl<'r> Simulation<'r> {
    /// Select the kernel and validate the configuration.
    ///
    /// Every check happens here, before anything is allocated or spawned.
    pub fn new(config: SimulationConfig, registry: &'r KernelRegistry, caps: Capabilities) -> Result<Self> {
        let variant = registry.select(&config.kernel, caps)?;
        config.validate(variant.vector_width)?;
        validate_alignment(variant.alignment)?;

        let tasks = partition(&PartitionRequest {
            width: config.width,
            height: config.height,
            threads: config.threads,
            vector_width: variant.vector_width,
            pulse_x: config.pulse_x,
            pulse_y: config.pulse_y,
            mode: config.partition,
        })?;

        let owners = tasks.iter().filter(|t| t.owns_pulse).count();
        if owners != 1 {
            return Err(SeismicError::geometry(format!(
                "pulse cell ({}, {}) owned by {} workers",
                config.pulse_x, config.pulse_y, owners
            )));
        }

        tracing::info!(
            kernel = variant.name,
            width = config.width,
            height = config.height,
            timesteps = config.timesteps,
            threads = config.threads,
            partition = %config.partition,
            "simulation configured"
        );

        Ok(Self {
            config,
            variant,
            tasks,
        })
    }

    /// Run configuration.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Selected kernel variant.
    pub fn variant(&self) -> &KernelVariant {
        self.variant
    }

    /// Per-worker work split.
    pub fn tasks(&self) -> &[ThreadTask] {
        &self.tasks
    }

    /// Execution mode implied by the thread count.
    pub fn mode(&self) -> ExecutionMode {
        if self.tasks.len() == 1 {
            ExecutionMode::Sequential
        } else {
            ExecutionMode::Parallel
        }
    }

    /// Allocate and initialize buffers aligned for the selected kernel.
    pub fn allocate(&self, medium: &Medium) -> Result<Wavefield> {
        let mut field = Wavefield::allocate(
            self.config.width,
            self.config.height,
            self.config.timesteps,
            self.variant.alignment,
        )?;
        field.initialize(medium);
        Ok(field)
    }

    /// Advance `field` by the configured number of steps.
    ///
    /// The pulse owner first adds `pulse[0]` to the current grid; step `t`
    /// then adds `pulse[t + 1]` to the grid it writes.
    pub fn run(&self, field: &mut Wavefield) -> Result<RunReport> {
        let config = &self.config;
        if field.width() != config.width || field.height() != config.height {
            return Err(SeismicError::geometry(format!(
                "wavefield is {}x{}, simulation expects {}x{}",
                field.width(),
                field.height(),
                config.width,
                config.height
            )));
        }
        if field.timesteps() < config.timesteps {
            return Err(SeismicError::geometry(format!(
                "pulse series covers {} steps, run needs {}",
                field.timesteps(),
                config.timesteps
            )));
        }

        let start_index = field.current_index();
        let outer_start = Instant::now();

        let (final_index, inner_elapsed) = {
            let (grids, velocity, pulse) = field.split_mut();
            let [first, second] = grids;
            let pressure = SharedPressure {
                grids: [first.as_mut_ptr(), second.as_mut_ptr()],
                len: velocity.len(),
            };
            let barrier = StepBarrier::new(self.tasks.len())?;
            let ctx = WorkerContext {
                pressure,
                velocity: velocity.as_slice(),
                pulse,
                kernel: self.variant.kernel.as_ref(),
                barrier: &barrier,
                height: config.height,
                timesteps: config.timesteps,
                pulse_cell: config.pulse_cell(),
                start_index,
            };
            self.run_workers(&ctx)?
        };

        let outer_elapsed = outer_start.elapsed();
        field.set_current_index(final_index);

        let report = RunReport {
            kernel: self.variant.name,
            threads: self.tasks.len(),
            timesteps: config.timesteps,
            mode: self.mode(),
            outer_elapsed,
            inner_elapsed,
            gflop: config.gflop(),
            final_index,
        };
        tracing::info!(
            outer_ms = report.outer_elapsed.as_secs_f64() * 1000.0,
            inner_ms = report.inner_elapsed.as_secs_f64() * 1000.0,
            gflops = report.gflops_inner(),
            "run complete"
        );
        Ok(report)
    }

    fn run_workers(&self, ctx: &WorkerContext<'_>) -> Result<(usize, Duration)> {
        let (lead, rest) = match self.tasks.split_first() {
            Some(split) => split,
            None => return Err(SeismicError::lifecycle("no worker tasks")),
        };

        let outcomes: Vec<Result<WorkerOutcome>> = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(rest.len());
            let mut spawn_error = None;

            for task in rest {
                let spawned = thread::Builder::new()
                    .name(format!("seismic-worker-{}", task.id))
                    .spawn_scoped(scope, move || run_worker(task, ctx));
                match spawned {
                    Ok(handle) => handles.push((task.id, handle)),
                    Err(err) => {
                        ctx.barrier.abort();
                        spawn_error = Some(SeismicError::lifecycle(format!(
                            "failed to spawn worker {}: {}",
                            task.id, err
                        )));
                        break;
                    }
                }
            }

            let mut outcomes = Vec::with_capacity(self.tasks.len());
            match spawn_error {
                Some(err) => outcomes.push(Err(err)),
                None => {
                    let lead_outcome = catch_unwind(AssertUnwindSafe(|| run_worker(lead, ctx)))
                        .unwrap_or_else(|_| {
                            ctx.barrier.abort();
                            Err(SeismicError::lifecycle("worker 0 panicked"))
                        });
                    outcomes.push(lead_outcome);
                }
            }

            for (id, handle) in handles {
                let outcome = handle
                    .join()
                    .unwrap_or_else(|_| Err(SeismicError::lifecycle(format!("worker {} panicked", id))));
                outcomes.push(outcome);
            }
            outcomes
        });

        let mut first_error = None;
        let mut finished = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                Ok(done) => finished.push(done),
                // A peer's abort is a consequence; keep the root cause.
                Err(SeismicError::BarrierAborted) if first_error.is_some() => {}
                Err(err) => {
                    if first_error.is_none() || matches!(first_error, Some(SeismicError::BarrierAborted)) {
                        first_error = Some(err);
                    }
                }
            }
        }
        if let Some(err) = first_error {
            tracing::error!(error = %err, "run failed");
            return Err(err);
        }

        let lead_outcome = finished
            .first()
            .ok_or_else(|| SeismicError::lifecycle("worker 0 produced no result"))?;
        if let Some(diverged) = finished.iter().find(|o| o.final_index != lead_outcome.final_index) {
            return Err(SeismicError::lifecycle(format!(
                "worker {} finished on grid {}, worker 0 on grid {}",
                diverged.id, diverged.final_index, lead_outcome.final_index
            )));
        }
        Ok((lead_outcome.final_index, lead_outcome.inner_elapsed))
    }
}

/// Raw handles to both pressure grids, shared by all workers.
#[derive(Clone, Copy)]
struct SharedPressure {
    grids: [*mut f32; 2],
    len: usize,
}

// SAFETY: workers only touch the grids through `read`/`write`, whose
// contracts are upheld by the step barrier and the disjoint partition.
unsafe impl Send for SharedPressure {}
unsafe impl Sync for SharedPressure {}

impl SharedPressure {
    /// Whole grid `index`, read-only.
    ///
    /// # Safety
    ///
    /// No thread may write grid `index` while the returned slice lives.
    unsafe fn read<'a>(&self, index: usize) -> &'a [f32] {
        std::slice::from_raw_parts(self.grids[index], self.len)
    }

    /// Cells `start..start + len` of grid `index`, writable.
    ///
    /// # Safety
    ///
    /// No other reference to these cells may exist while the returned slice
    /// lives.
    unsafe fn write<'a>(&self, index: usize, start: usize, len: usize) -> &'a mut [f32] {
        debug_assert!(start + len <= self.len);
        std::slice::from_raw_parts_mut(self.grids[index].add(start), len)
    }
}

struct WorkerContext<'a> {
    pressure: SharedPressure,
    velocity: &'a [f32],
    pulse: &'a PulseSeries,
    kernel: &'a dyn StencilKernel,
    barrier: &'a StepBarrier,
    height: usize,
    timesteps: usize,
    pulse_cell: usize,
    start_index: usize,
}

struct WorkerOutcome {
    id: usize,
    final_index: usize,
    inner_elapsed: Duration,
}

fn run_worker(task: &ThreadTask, ctx: &WorkerContext<'_>) -> Result<WorkerOutcome> {
    let _guard = ctx.barrier.abort_on_unwind();
    let result = step_loop(task, ctx);
    if let Err(err) = &result {
        if !matches!(err, SeismicError::BarrierAborted) {
            tracing::error!(worker = task.id, error = %err, "worker failed");
        }
        ctx.barrier.abort();
    }
    result
}

fn step_loop(task: &ThreadTask, ctx: &WorkerContext<'_>) -> Result<WorkerOutcome> {
    let pressure = ctx.pressure;
    let rows = task.inner.len();
    let mut current = ctx.start_index;

    if task.owns_pulse {
        // SAFETY: nobody reads before the startup barrier; the pulse cell
        // belongs to this worker.
        let cell = unsafe { pressure.write(current, ctx.pulse_cell, 1) };
        inject(cell, 0, ctx.pulse.get(0))?;
    }
    ctx.barrier.wait()?;

    let started = Instant::now();
    let progress_every = (ctx.timesteps / 10).max(1);

    for t in 0..ctx.timesteps {
        let next = current ^ 1;
        {
            // SAFETY: between two barriers grid `current` is only read, and
            // each worker writes a disjoint set of cells of grid `next`.
            let read = unsafe { pressure.read(current) };
            for column in task.outer.clone() {
                let base = column * ctx.height + task.inner.start;
                // SAFETY: see above; the window lies inside this task.
                let window = unsafe { pressure.write(next, base, rows) };
                ctx.kernel
                    .sweep_row(RowSweep::new(read, ctx.velocity, window, base, ctx.height));
            }

            if task.owns_pulse {
                // SAFETY: the pulse cell lies inside this task and the row
                // windows above are no longer live.
                let cell = unsafe { pressure.write(next, ctx.pulse_cell, 1) };
                inject(cell, 0, ctx.pulse.get(t + 1))?;
            }
        }
        current = next;
        ctx.barrier.wait()?;

        if task.id == 0 && (t + 1) % progress_every == 0 {
            tracing::info!(
                step = t + 1,
                of = ctx.timesteps,
                percent = (t + 1) * 100 / ctx.timesteps,
                "progress"
            );
        }
    }

    Ok(WorkerOutcome {
        id: task.id,
        final_index: current,
        inner_elapsed: started.elapsed(),
    })
}
