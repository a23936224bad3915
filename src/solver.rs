//! Ties the grid, coefficients, source, stencils and time-step controller
//! together into the outer Crank-Nicolson iteration.

use ndarray::Array2;

use crate::coefficients::CoefficientField;
use crate::config::SolverConfig;
use crate::diagnostics::{Snapshot, SnapshotLog};
use crate::error::{Result, SolveError};
use crate::grid::Grid;
use crate::stencil::{apply_block_tridiagonal, build_energy_stencils, build_radial_stencils, solve_blocks, HalfStepStencils};
use crate::timestep::{Effect, StepDecision, TimestepController};

/// How a solve ended.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SolveStatus {
    /// All active convergence criteria were satisfied.
    Converged,
    /// `max_outer_iters` was reached without convergence.
    IterationCeiling {
        /// The last interior relative difference observed.
        rel_diff: f64,
    },
    /// Benchmark mode reached `max_outer_iters` without `dpsi/dt`
    /// vanishing exactly on every interior cell.
    BenchmarkFailed,
}

/// The result of a complete solve.
#[derive(Clone, Debug)]
pub struct SolveOutcome {
    /// Final electron phase-space density, shaped `(r_bins, e_bins)`.
    pub psi: Array2<f64>,
    /// How the solve terminated.
    pub status: SolveStatus,
    /// Number of outer iterations performed.
    pub iterations: u32,
    /// Per-iteration snapshots, populated only if `config.animation` was set.
    pub snapshots: Vec<Snapshot>,
}

/// Runs the operator-split Crank-Nicolson integration to convergence (or
/// until the outer iteration ceiling is hit).
///
/// `psi0` is the initial interior electron density, `(r_bins, e_bins)`,
/// `q` is the pre-built source term of the same shape.
///
/// # Errors
///
/// Propagates [`crate::error::SolveError::SingularSystem`] from either
/// half-step's block solve.
pub fn run(grid: &Grid, coeff: &CoefficientField, q: &Array2<f64>, psi0: Array2<f64>, config: &SolverConfig) -> Result<SolveOutcome> {
    let effect = if config.loss_only { Effect::Loss } else { Effect::All };
    let mut controller = TimestepController::new(grid, coeff, effect, config);
    let mut dt = controller.dt();

    let mut energy_stencils = build_energy_stencils(grid, coeff, dt);
    let mut radial_stencils = if effect.includes_diffusion() { Some(build_radial_stencils(grid, coeff, dt)) } else { None };

    let mut psi = psi0;
    let r_bins0 = psi.nrows();
    psi.row_mut(r_bins0 - 1).fill(0.0);

    let mut snapshots = SnapshotLog::new(config.animation);
    let mut outer_iter: u32 = 0;
    let mut completed: u32 = 0;

    let status = loop {
        if outer_iter >= config.max_outer_iters {
            break if config.benchmark {
                SolveStatus::BenchmarkFailed
            } else {
                SolveStatus::IterationCeiling { rel_diff: controller.last_rel_diff() }
            };
        }

        let psi_prev = psi.clone();

        if effect.includes_loss() {
            psi = energy_half_step(&energy_stencils, q, dt, &psi)?;
        }
        if let Some(ref stencils) = radial_stencils {
            psi = radial_half_step(stencils, q, dt, &psi)?;
        }

        // The outer spatial boundary is pinned unconditionally after every
        // outer iteration, regardless of which half-steps ran.
        let r_bins = psi.nrows();
        psi.row_mut(r_bins - 1).fill(0.0);

        check_finite(&psi)?;
        snapshots.record(outer_iter, dt, &psi);
        completed += 1;

        match controller.evaluate(&psi, &psi_prev, outer_iter) {
            StepDecision::Continue => {}
            StepDecision::TimestepReduced => {
                dt = controller.dt();
                energy_stencils = build_energy_stencils(grid, coeff, dt);
                if radial_stencils.is_some() {
                    radial_stencils = Some(build_radial_stencils(grid, coeff, dt));
                }
            }
            StepDecision::Converged => break SolveStatus::Converged,
        }

        outer_iter += 1;
    };

    Ok(SolveOutcome {
        psi,
        status,
        iterations: completed,
        snapshots: snapshots.into_snapshots(),
    })
}

/// Rejects a state containing a non-finite entry, matching the reference
/// behaviour that an unbounded (e.g. lossless, diffusionless) system is
/// reported as numerical breakdown rather than silently returned.
fn check_finite(psi: &Array2<f64>) -> Result<()> {
    for ((i, j), &v) in psi.indexed_iter() {
        if !v.is_finite() {
            return Err(SolveError::NonFinite { field: "psi", i, j });
        }
    }
    Ok(())
}

/// One energy-loss half-step: `A_E psi_new = B_E psi + dt Q`.
fn energy_half_step(stencils: &HalfStepStencils, q: &Array2<f64>, dt: f64, psi: &Array2<f64>) -> Result<Array2<f64>> {
    let mut rhs = apply_block_tridiagonal(&stencils.b, psi);
    rhs += &(q * dt);
    let mut out = Array2::zeros(psi.raw_dim());
    solve_blocks(&stencils.a, &rhs, &mut out, "energy")?;
    Ok(out)
}

/// One spatial-diffusion half-step: `A_r psi_new = B_r psi + dt Q`, in the
/// radial sweep's transposed `(e_bins, r_bins)` block layout.
fn radial_half_step(stencils: &HalfStepStencils, q: &Array2<f64>, dt: f64, psi: &Array2<f64>) -> Result<Array2<f64>> {
    let psi_t = psi.t().to_owned();
    let q_t = q.t().to_owned();

    let mut rhs = apply_block_tridiagonal(&stencils.b, &psi_t);
    rhs += &(&q_t * dt);

    let mut out_t = Array2::zeros(psi_t.raw_dim());
    solve_blocks(&stencils.a, &rhs, &mut out_t, "radial")?;

    Ok(out_t.t().to_owned())
}
