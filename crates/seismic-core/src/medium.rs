//! Physical medium and discretization constants.

/// Homogeneous medium description.
///
/// The defaults describe the benchmark setup: a velocity range of
/// `[0.002, 2000]` m/s on a 2 m grid, with the time step chosen so the
/// Courant number stays at 0.606.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Medium {
    /// Maximum wave speed (m/s).
    pub c_max: f32,
    /// Minimum wave speed (m/s).
    pub c_min: f32,
    /// Grid spacing (m).
    pub spacing: f32,
    /// Overrides the derived velocity coefficient when set.
    coefficient: Option<f32>,
}

impl Default for Medium {
    fn default() -> Self {
        Self {
            c_max: 2000.0,
            c_min: 0.002,
            spacing: 2.0,
            coefficient: None,
        }
    }
}

impl Medium {
    /// Stability factor used to derive the time step.
    pub const CFL: f32 = 0.606;

    /// Medium whose velocity grid holds `coefficient` in every cell.
    pub fn uniform(coefficient: f32) -> Self {
        Self {
            coefficient: Some(coefficient),
            ..Self::default()
        }
    }

    /// Time step (s).
    pub fn dt(&self) -> f32 {
        Self::CFL * self.spacing / self.c_max
    }

    /// Mean of the velocity range.
    pub fn c_avg(&self) -> f32 {
        (self.c_max - self.c_min) / 2.0 + self.c_min
    }

    /// Peak frequency of the source wavelet.
    pub fn peak_frequency(&self) -> f32 {
        5.0 * self.spacing * self.c_min
    }

    /// Courant number `c_max·dt/h`.
    pub fn courant_number(&self) -> f32 {
        self.c_max * self.dt() / self.spacing
    }

    /// Value stored in every velocity cell: `c²·dt²/(h²·12)`.
    ///
    /// The factor 12 is the denominator of the 4th-order Laplacian weights.
    pub fn velocity_coefficient(&self) -> f32 {
        if let Some(coefficient) = self.coefficient {
            return coefficient;
        }
        let c = self.c_avg();
        let dt = self.dt();
        c * c * dt * dt / (self.spacing * self.spacing * 12.0)
    }
}
