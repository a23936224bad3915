//! A Crank-Nicolson finite-difference solver for the steady-state transport
//! equation governing relativistic electrons/positrons injected by
//! dark-matter annihilation or decay inside a spherically symmetric halo.
//!
//! The solver integrates
//!
//! ```text
//! d(psi)/dt = L_r psi + L_E psi + Q
//! ```
//!
//! on a log-spaced `(radius, energy)` grid, operator-split into an
//! energy-loss half-step and a spatial-diffusion half-step, each an
//! implicit Crank-Nicolson update solved as a block of independent
//! tridiagonal systems (see [`stencil`]). An adaptive time-step schedule
//! ([`timestep`]) drives the iteration to steady state.
//!
//! The only public entry point is [`solve_electrons`]; everything upstream
//! of it (parameter validation against an external configuration
//! dictionary, halo-profile sampling, particle-physics spectra) is the
//! caller's responsibility.
//!
//! Logging uses the standard [`log`] facade at the usual levels: `debug`
//! for grid/coefficient construction, `info` for iteration milestones,
//! `warn` for non-convergence and benchmark failure.

pub mod coefficients;
pub mod config;
pub mod convert;
pub mod diagnostics;
pub mod error;
pub mod grid;
pub mod source;
pub mod solver;
pub mod stencil;
pub mod timestep;

pub use config::{EnergyStencil, ModeExp, SolverConfig};
pub use error::{Result, SolveError};
pub use solver::{SolveOutcome, SolveStatus};

use ndarray::Array2;

use coefficients::CoefficientField;
use grid::Grid;

/// Runs the full CN transport solve described in the crate docs.
///
/// `r_sample`/`e_sample` (Mpc/GeV) define the log-spaced grid; `rho_sample`
/// (Msun/Mpc^3) and `q_sample` (GeV^-1) define the dark-matter source;
/// `b_field_sample` (uG), `d_bdr_sample` (1/Mpc), and `n_e_sample` (cm^-3)
/// parametrise the diffusion and loss coefficients. `config` carries every
/// other tunable (see [`SolverConfig`]).
///
/// Returns the steady-state (or best-available, on non-convergence)
/// electron distribution shaped `[E_bins, r_bins]` -- transposed relative
/// to the solver's internal `(r_bins, e_bins)` layout, matching the
/// external API convention -- alongside the termination status, iteration
/// count, and any recorded snapshots.
///
/// # Errors
///
/// Returns [`SolveError::InvalidInput`] if the grids are malformed, `delta`
/// is outside `(0, 2)`, `m_chi <= 0`, `rho_sample` contains a negative
/// entry, or `config.energy_stencil` selects the unimplemented
/// [`EnergyStencil::CentralDifference`] variant. Returns
/// [`SolveError::NonFinite`] if any coefficient, source, or intermediate
/// state entry is non-finite, and [`SolveError::SingularSystem`] if a
/// half-step's tridiagonal block is singular.
///
/// Non-convergence and benchmark failure are not errors: they are reported
/// through [`SolveOutcome::status`].
#[allow(clippy::too_many_arguments)]
pub fn solve_electrons(
    r_sample: &[f64],
    e_sample: &[f64],
    rho_sample: &[f64],
    q_sample: &[f64],
    b_field_sample: &[f64],
    d_bdr_sample: &[f64],
    n_e_sample: &[f64],
    config: &SolverConfig,
) -> Result<SolveOutcome> {
    if config.energy_stencil == EnergyStencil::CentralDifference {
        return Err(SolveError::InvalidInput(
            "EnergyStencil::CentralDifference is not yet implemented".to_string(),
        ));
    }

    log::debug!("building grid: {} radial nodes, {} energy nodes", r_sample.len(), e_sample.len());
    let grid = Grid::build(r_sample, e_sample, config.r_scale, config.e_scale)?;

    let d_bdr_per_cm: Vec<f64> = d_bdr_sample.iter().map(|&x| convert::inv_mpc_to_inv_cm(x)).collect();
    let d0_kpc = convert::mpc_to_kpc(config.d0);

    log::debug!("building coefficient field (delta = {}, D0 = {})", config.delta, config.diff0);
    let coeff = CoefficientField::build(&grid, b_field_sample, &d_bdr_per_cm, n_e_sample, config.z, config.delta, config.diff0, d0_kpc)?;

    let q = source::build_source(&grid, rho_sample, q_sample, config.m_chi, config.mode_exp)?;

    let psi0 = q.clone();
    let outcome = solver::run(&grid, &coeff, &q, psi0, config)?;

    match outcome.status {
        SolveStatus::Converged => log::info!("converged after {} iterations", outcome.iterations),
        SolveStatus::IterationCeiling { rel_diff } => {
            log::warn!("iteration ceiling reached without convergence, rel_diff = {rel_diff}");
        }
        SolveStatus::BenchmarkFailed => log::warn!("benchmark mode: dpsi/dt never reached machine zero"),
    }

    Ok(SolveOutcome { psi: transpose(&outcome.psi), ..outcome })
}

fn transpose(psi: &Array2<f64>) -> Array2<f64> {
    psi.t().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_space(start: f64, stop: f64, n: usize) -> Vec<f64> {
        let log_start = start.log10();
        let log_stop = stop.log10();
        (0..n)
            .map(|i| {
                let frac = i as f64 / (n - 1) as f64;
                10f64.powf(log_start + frac * (log_stop - log_start))
            })
            .collect()
    }

    #[test]
    fn returns_transposed_psi_with_zeroed_outer_boundary() {
        let r = log_space(1e-3, 1e1, 10);
        let e = log_space(1e-1, 1e3, 12);
        let rho = vec![1e6; r.len()];
        let q_spec = vec![1e-4; e.len()];
        let b_field = vec![1.0; r.len()];
        let d_bdr = vec![0.0; r.len()];
        let n_e = vec![1e-2; r.len()];

        let mut config = SolverConfig::default();
        config.constant_dt = true;
        config.max_outer_iters = 20;

        let outcome = solve_electrons(&r, &e, &rho, &q_spec, &b_field, &d_bdr, &n_e, &config).unwrap();

        assert_eq!(outcome.psi.nrows(), e.len());
        assert_eq!(outcome.psi.ncols(), r.len());
        for &v in outcome.psi.column(r.len() - 1).iter() {
            assert_eq!(v, 0.0);
        }
    }

    #[test]
    fn rejects_central_difference_stencil() {
        let r = log_space(1e-3, 1e1, 10);
        let e = log_space(1e-1, 1e3, 12);
        let rho = vec![1e6; r.len()];
        let q_spec = vec![1e-4; e.len()];
        let b_field = vec![1.0; r.len()];
        let d_bdr = vec![0.0; r.len()];
        let n_e = vec![1e-2; r.len()];

        let mut config = SolverConfig::default();
        config.energy_stencil = EnergyStencil::CentralDifference;

        assert!(solve_electrons(&r, &e, &rho, &q_spec, &b_field, &d_bdr, &n_e, &config).is_err());
    }

    #[test]
    fn lossless_diffusionless_benchmark_reports_numerical_breakdown() {
        let r = log_space(1e-3, 1e1, 8);
        let e = log_space(1e-1, 1e3, 8);
        let rho = vec![1e8; r.len()];
        let q_spec = vec![1.0; e.len()];
        let b_field = vec![0.0; r.len()];
        let d_bdr = vec![0.0; r.len()];
        let n_e = vec![0.0; r.len()];

        let mut config = SolverConfig::default();
        config.benchmark = true;
        config.diff0 = 0.0;
        config.max_outer_iters = 50;

        let result = solve_electrons(&r, &e, &rho, &q_spec, &b_field, &d_bdr, &n_e, &config);
        assert!(result.is_err());
    }
}
