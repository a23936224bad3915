//! Solver configuration.
//!
//! The surrounding toolkit flows a validated parameter dictionary into this
//! core; dictionary normalisation itself is out of scope here (see the
//! crate-level docs). What crosses the boundary is a single explicit struct,
//! not a loose key-value map, so that every recognised option is visible at
//! the type level.

use serde::{Deserialize, Serialize};

/// Which of the two electron-source exponents to use.
///
/// The source term is built as `(rho/m_chi)^mode_exp`: annihilation goes as
/// the square of the dark-matter density, decay goes linearly in it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum ModeExp {
    /// Decay: source `\propto rho`.
    Decay,
    /// Annihilation: source `\propto rho^2`.
    Annihilation,
}

impl ModeExp {
    /// The numeric exponent `m_exp` used in the source term and in
    /// loss-only factorisation checks.
    #[must_use]
    pub const fn exponent(self) -> i32 {
        match self {
            Self::Decay => 1,
            Self::Annihilation => 2,
        }
    }
}

/// Discretisation used for the energy-loss advection term.
///
/// The reference scheme is a one-sided (upwind) first-order derivative in
/// log-E; see the crate-level documentation for the accuracy trade-off this
/// implies. [`EnergyStencil::CentralDifference`] is recognised by
/// [`SolverConfig`] but not yet implemented; [`crate::solve_electrons`]
/// rejects it with [`crate::SolveError::InvalidInput`] rather than silently
/// falling back to upwinding.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum EnergyStencil {
    /// First-order upwind derivative toward higher energy (`alpha1_E == 0`).
    Upwind,
    /// Second-order central derivative. Not yet implemented.
    CentralDifference,
}

impl Default for EnergyStencil {
    fn default() -> Self {
        Self::Upwind
    }
}

/// Top-level solver configuration, equivalent to the `adi_*` keys of the
/// external configuration dictionary (`electron_mode = "adi-python"`).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SolverConfig {
    /// Dark-matter particle mass, GeV.
    pub m_chi: f64,
    /// Redshift of the halo.
    pub z: f64,
    /// Radial scale used for the log transform, Mpc.
    pub r_scale: f64,
    /// Energy scale used for the log transform, GeV.
    pub e_scale: f64,
    /// Reference length for the diffusion normalisation, Mpc (usually 1 kpc).
    pub d0: f64,
    /// Diffusion power-law index `delta`, must lie in `(0, 2)`.
    pub delta: f64,
    /// Diffusion normalisation `D0`, cm^2/s.
    pub diff0: f64,
    /// Forces `D = 0` and disables the radial half-step.
    pub loss_only: bool,
    /// Annihilation vs. decay exponent.
    pub mode_exp: ModeExp,
    /// Smallest time step reached before an accelerated-mode solve may
    /// converge, in years.
    pub dt_min_yr: f64,
    /// Initial time step, in years (accelerated mode) or an upper bound on
    /// the timescale-derived step (constant-`dt` mode is independent of
    /// this value, see [`crate::timestep`]).
    pub dt_initial_yr: f64,
    /// Number of outer iterations allowed at a fixed `dt` before it is
    /// reduced, in accelerated mode.
    pub max_inner_iters: u32,
    /// Factor by which `dt` is multiplied when reduced.
    pub dt_reduction_factor: f64,
    /// Use the stricter benchmark convergence condition (`dpsi/dt == 0`
    /// exactly) and force a constant time step.
    pub benchmark: bool,
    /// Use a constant time step derived from the smallest relevant
    /// timescale instead of the adaptive schedule.
    pub constant_dt: bool,
    /// Record a snapshot of the interior state after every outer iteration.
    pub animation: bool,
    /// Hard ceiling on the number of outer iterations.
    pub max_outer_iters: u32,
    /// Energy-loss stencil variant.
    pub energy_stencil: EnergyStencil,
}

impl Default for SolverConfig {
    /// Defaults matching the reference `adi-python` implementation.
    fn default() -> Self {
        Self {
            m_chi: 100.0,
            z: 0.0,
            r_scale: 1.0,
            e_scale: 1.0,
            d0: 1.0,
            delta: 1.0 / 3.0,
            diff0: 3.1e28,
            loss_only: false,
            mode_exp: ModeExp::Annihilation,
            dt_min_yr: 1.0e1,
            dt_initial_yr: 1.0e9,
            max_inner_iters: 100,
            dt_reduction_factor: 0.5,
            benchmark: false,
            constant_dt: false,
            animation: false,
            max_outer_iters: 10_000,
            energy_stencil: EnergyStencil::Upwind,
        }
    }
}
