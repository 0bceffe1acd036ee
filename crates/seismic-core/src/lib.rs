//! # Seismic Core
//!
//! Barrier-synchronized 2-D acoustic wave propagation.
//!
//! The engine advances a pressure field with a 4th-order-in-space,
//! 2nd-order-in-time finite-difference stencil. The grid is split across a
//! fixed set of OS threads that meet at a barrier after every step. The
//! stencil itself is provided by interchangeable kernels (scalar, SSE, AVX,
//! FMA, NEON) gated on the capabilities the processor reports.
//!
//! ## Example
//!
//! ```no_run
//! use seismic_core::prelude::*;
//!
//! let caps = Capabilities::detect();
//! let registry = KernelRegistry::builtin();
//! let config = SimulationConfig::new(260, 132).with_timesteps(50).with_threads(4);
//!
//! let sim = Simulation::new(config, &registry, caps)?;
//! let mut field = sim.allocate(&Medium::default())?;
//! let report = sim.run(&mut field)?;
//! println!("{:.2} GFLOPS", report.gflops_inner());
//! # Ok::<(), seismic_core::SeismicError>(())
//! ```

#![warn(missing_docs)]

pub mod barrier;
pub mod capability;
pub mod config;
pub mod engine;
pub mod error;
pub mod kernel;
pub mod medium;
pub mod memory;
pub mod partition;
pub mod pulse;
pub mod registry;
pub mod render;

pub use error::{ErrorKind, Result, SeismicError};

/// Commonly used types.
pub mod prelude {
    pub use crate::capability::Capabilities;
    pub use crate::config::SimulationConfig;
    pub use crate::engine::{ExecutionMode, RunReport, Simulation};
    pub use crate::error::{ErrorKind, Result, SeismicError};
    pub use crate::medium::Medium;
    pub use crate::memory::Wavefield;
    pub use crate::partition::PartitionMode;
    pub use crate::pulse::PulseSeries;
    pub use crate::registry::{KernelRegistry, KernelVariant};
}
