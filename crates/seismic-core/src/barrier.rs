//! Reusable counting barrier with abort support.
//!
//! Workers meet here once per time step. Unlike `std::sync::Barrier`, a
//! failing worker can tear the barrier down so that peers blocked in
//! [`StepBarrier::wait`] return an error instead of waiting forever.

use parking_lot::{Condvar, Mutex};

use crate::error::{Result, SeismicError};

#[derive(Debug)]
struct BarrierState {
    arrived: usize,
    generation: u64,
    aborted: bool,
}

/// Generation-counting rendezvous for a fixed number of parties.
#[derive(Debug)]
pub struct StepBarrier {
    parties: usize,
    state: Mutex<BarrierState>,
    cvar: Condvar,
}

impl StepBarrier {
    /// Create a barrier for `parties` threads.
    pub fn new(parties: usize) -> Result<Self> {
        if parties == 0 {
            return Err(SeismicError::lifecycle("barrier needs at least one party"));
        }
        Ok(Self {
            parties,
            state: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
                aborted: false,
            }),
            cvar: Condvar::new(),
        })
    }

    /// Number of participating threads.
    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Block until every party has arrived.
    ///
    /// Returns `Ok(true)` for exactly one caller per generation (the last to
    /// arrive). Returns [`SeismicError::BarrierAborted`] if the barrier was
    /// aborted before or while waiting.
    pub fn wait(&self) -> Result<bool> {
        let mut state = self.state.lock();
        if state.aborted {
            return Err(SeismicError::BarrierAborted);
        }
        if self.parties == 1 {
            state.generation += 1;
            return Ok(true);
        }

        state.arrived += 1;
        if state.arrived == self.parties {
            state.arrived = 0;
            state.generation += 1;
            self.cvar.notify_all();
            return Ok(true);
        }

        let generation = state.generation;
        while state.generation == generation && !state.aborted {
            self.cvar.wait(&mut state);
        }
        if state.generation == generation {
            return Err(SeismicError::BarrierAborted);
        }
        Ok(false)
    }

    /// Tear the barrier down, waking every waiter with an error.
    pub fn abort(&self) {
        let mut state = self.state.lock();
        if !state.aborted {
            state.aborted = true;
            tracing::warn!(generation = state.generation, "step barrier aborted");
        }
        self.cvar.notify_all();
    }

    /// Check if the barrier has been aborted.
    pub fn is_aborted(&self) -> bool {
        self.state.lock().aborted
    }

    /// Number of completed rendezvous.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Guard that aborts the barrier if dropped during a panic.
    pub fn abort_on_unwind(&self) -> AbortOnUnwind<'_> {
        AbortOnUnwind { barrier: self }
    }
}

/// Returned by [`StepBarrier::abort_on_unwind`].
pub struct AbortOnUnwind<'a> {
    barrier: &'a StepBarrier,
}

impl Drop for AbortOnUnwind<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.barrier.abort();
        }
    }
}
