//! Builds the Crank-Nicolson tridiagonal systems for the energy-loss and
//! spatial-diffusion half-steps, and solves them with the Thomas algorithm.
//!
//! Each half-step is block-diagonal: the energy sweep is `N_r` independent
//! `N_E`-sized tridiagonal systems (one per radius), the radial sweep is
//! `N_E` independent `N_r`-sized systems (one per energy). Neither sweep
//! ever needs a full sparse matrix; the three diagonals are stored directly
//! per block, shaped `(num_blocks, block_size)`.

use ndarray::Array2;
use rayon::prelude::*;
use std::f64::consts::LN_10;

use crate::coefficients::CoefficientField;
use crate::error::{Result, SolveError};
use crate::grid::Grid;

/// Relative tolerance below which a tridiagonal pivot is considered singular.
const SINGULAR_PIVOT_TOL: f64 = 1e-12;

/// The three diagonals of a block-tridiagonal matrix, one row per
/// independent block.
///
/// `sub[.., 0]` and `sup[.., block_size - 1]` are always zero: they would
/// couple a block's first row to a nonexistent row `-1`, or its last row to
/// a nonexistent row `block_size`.
#[derive(Clone, Debug)]
pub struct BlockTridiagonal {
    sub: Array2<f64>,
    main: Array2<f64>,
    sup: Array2<f64>,
}

impl BlockTridiagonal {
    fn zeros(num_blocks: usize, block_size: usize) -> Self {
        Self {
            sub: Array2::zeros((num_blocks, block_size)),
            main: Array2::zeros((num_blocks, block_size)),
            sup: Array2::zeros((num_blocks, block_size)),
        }
    }
}

/// The `(A, B)` matrix pair for one CN half-step: `A` is implicit
/// (main diagonal `1 + alpha2/2`), `B` is explicit (`1 - alpha2/2`).
#[derive(Clone, Debug)]
pub struct HalfStepStencils {
    pub(crate) a: BlockTridiagonal,
    pub(crate) b: BlockTridiagonal,
}

/// Builds the energy half-step stencils `(A_E, B_E)`.
///
/// Blocks are rows of fixed radius `i`, each of size `N_E`. The lower
/// coefficient `alpha1_E` is identically zero (first-order upwind scheme),
/// reproduced faithfully including the reference implementation's reuse of
/// the un-shifted loss rate at the second-to-last energy row instead of the
/// upwind-shifted one (see `DESIGN.md`).
#[must_use]
pub fn build_energy_stencils(grid: &Grid, coeff: &CoefficientField, dt: f64) -> HalfStepStencils {
    let r_bins = grid.r_bins();
    let e_bins = grid.e_bins();
    let mut a = BlockTridiagonal::zeros(r_bins, e_bins);
    let mut b = BlockTridiagonal::zeros(r_bins, e_bins);

    for i in 0..r_bins {
        for j in 0..e_bins {
            // alpha1_E(i, j) == 0 always: purely upwind in energy.
            let alpha2 = dt * grid.e_prefactor(j) * coeff.b()[[i, j]] / grid.delta_eps();

            a.main[[i, j]] = 1.0 + alpha2 / 2.0;
            b.main[[i, j]] = 1.0 - alpha2 / 2.0;

            if j + 1 < e_bins {
                // super-diagonal entry coupling row j to row j+1.
                let alpha3 = if j + 2 == e_bins {
                    // Reproduces the reference's boundary quirk: the last
                    // populated super-diagonal slot reuses b at its own
                    // index instead of the upwind-shifted one.
                    dt * grid.e_prefactor(j) * coeff.b()[[i, j]] / grid.delta_eps()
                } else {
                    dt * grid.e_prefactor(j + 1) * coeff.b()[[i, j + 1]] / grid.delta_eps()
                };
                a.sup[[i, j]] = -alpha3 / 2.0;
                b.sup[[i, j]] = alpha3 / 2.0;
            }
            // sub-diagonal stays zero: alpha1_E == 0 everywhere.
        }
    }

    HalfStepStencils { a, b }
}

/// Builds the radial half-step stencils `(A_r, B_r)`.
///
/// Blocks are columns of fixed energy `j`, each of size `N_r`. The inner
/// boundary `i = 0` is reflective: the diffusive coupling to `i = 1` is
/// doubled and absorbed into the main diagonal and super-diagonal, and the
/// general sub-diagonal formula at `i = 0` is never referenced by the
/// matrix (it would couple to the nonexistent node `i = -1`).
#[must_use]
pub fn build_radial_stencils(grid: &Grid, coeff: &CoefficientField, dt: f64) -> HalfStepStencils {
    let r_bins = grid.r_bins();
    let e_bins = grid.e_bins();
    let delta_rho = grid.delta_rho();
    let mut a = BlockTridiagonal::zeros(e_bins, r_bins);
    let mut b = BlockTridiagonal::zeros(e_bins, r_bins);

    for j in 0..e_bins {
        for i in 0..r_bins {
            let xi = grid.r_prefactor(i);
            let d_ij = coeff.d()[[i, j]];

            let alpha2 = if i == 0 {
                dt * xi * xi * 4.0 * d_ij / (delta_rho * delta_rho)
            } else {
                dt * xi * xi * 2.0 * d_ij / (delta_rho * delta_rho)
            };
            a.main[[j, i]] = 1.0 + alpha2 / 2.0;
            b.main[[j, i]] = 1.0 - alpha2 / 2.0;

            if i + 1 < r_bins {
                let alpha3 = if i == 0 {
                    dt * xi * xi * 4.0 * d_ij / (delta_rho * delta_rho)
                } else {
                    let d_dr_ij = coeff.d_dr()[[i, j]];
                    dt * xi * xi * ((LN_10 * d_ij + d_dr_ij) / (2.0 * delta_rho) + d_ij / (delta_rho * delta_rho))
                };
                a.sup[[j, i]] = -alpha3 / 2.0;
                b.sup[[j, i]] = alpha3 / 2.0;
            }

            if i >= 1 {
                let d_dr_ij = coeff.d_dr()[[i, j]];
                let alpha1 = dt * xi * xi * (-(LN_10 * d_ij + d_dr_ij) / (2.0 * delta_rho) + d_ij / (delta_rho * delta_rho));
                a.sub[[j, i]] = -alpha1 / 2.0;
                b.sub[[j, i]] = alpha1 / 2.0;
            }
        }
    }

    HalfStepStencils { a, b }
}

/// Applies a block-tridiagonal matrix to `x`, both shaped
/// `(num_blocks, block_size)` in the same block layout (energy sweep:
/// `(r_bins, e_bins)`; radial sweep: `(e_bins, r_bins)`).
#[must_use]
pub fn apply_block_tridiagonal(t: &BlockTridiagonal, x: &Array2<f64>) -> Array2<f64> {
    let num_blocks = t.main.nrows();
    let block_size = t.main.ncols();
    let mut out = Array2::zeros((num_blocks, block_size));
    for block in 0..num_blocks {
        for s in 0..block_size {
            let mut value = t.main[[block, s]] * x[[block, s]];
            if s > 0 {
                value += t.sub[[block, s]] * x[[block, s - 1]];
            }
            if s + 1 < block_size {
                value += t.sup[[block, s]] * x[[block, s + 1]];
            }
            out[[block, s]] = value;
        }
    }
    out
}

/// Solves `A x = rhs` for every block independently using the Thomas
/// algorithm, writing the result into `out`. `rhs` and `out` are shaped
/// `(num_blocks, block_size)`, matching `a`.
///
/// # Errors
///
/// Returns [`SolveError::SingularSystem`] if any block's matrix has a pivot
/// smaller in magnitude than `1e-12` times the sum of its neighbouring
/// off-diagonal magnitudes.
pub fn solve_blocks(a: &BlockTridiagonal, rhs: &Array2<f64>, out: &mut Array2<f64>, sweep: &'static str) -> Result<()> {
    let num_blocks = a.main.nrows();

    let results: Vec<Result<Vec<f64>>> = (0..num_blocks)
        .into_par_iter()
        .map(|block| {
            let sub = a.sub.row(block);
            let main = a.main.row(block);
            let sup = a.sup.row(block);
            let r = rhs.row(block);
            thomas_solve(sub.as_slice().unwrap(), main.as_slice().unwrap(), sup.as_slice().unwrap(), r.as_slice().unwrap(), sweep, block)
        })
        .collect();

    for (block, result) in results.into_iter().enumerate() {
        let solution = result?;
        for (s, value) in solution.into_iter().enumerate() {
            out[[block, s]] = value;
        }
    }
    Ok(())
}

/// Thomas algorithm for a single tridiagonal system of size `n`.
fn thomas_solve(sub: &[f64], main: &[f64], sup: &[f64], rhs: &[f64], sweep: &'static str, block: usize) -> Result<Vec<f64>> {
    let n = main.len();
    let mut c_prime = vec![0.0; n];
    let mut d_prime = vec![0.0; n];

    let pivot_ok = |pivot: f64, row: usize| -> Result<()> {
        let off = sub.get(row).copied().unwrap_or(0.0).abs() + sup.get(row).copied().unwrap_or(0.0).abs();
        if pivot == 0.0 || pivot.abs() < SINGULAR_PIVOT_TOL * off {
            Err(SolveError::SingularSystem { sweep, block, row })
        } else {
            Ok(())
        }
    };

    pivot_ok(main[0], 0)?;
    c_prime[0] = sup[0] / main[0];
    d_prime[0] = rhs[0] / main[0];

    for row in 1..n {
        let denom = main[row] - sub[row] * c_prime[row - 1];
        pivot_ok(denom, row)?;
        c_prime[row] = sup[row] / denom;
        d_prime[row] = (rhs[row] - sub[row] * d_prime[row - 1]) / denom;
    }

    let mut out = vec![0.0; n];
    out[n - 1] = d_prime[n - 1];
    for row in (0..n - 1).rev() {
        out[row] = d_prime[row] - c_prime[row] * out[row + 1];
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn thomas_solve_matches_known_solution() {
        // [[2,-1,0],[-1,2,-1],[0,-1,2]] x = [1,0,1] => x = [1,1,1]
        let sub = vec![0.0, -1.0, -1.0];
        let main = vec![2.0, 2.0, 2.0];
        let sup = vec![-1.0, -1.0, 0.0];
        let rhs = vec![1.0, 0.0, 1.0];
        let x = thomas_solve(&sub, &main, &sup, &rhs, "test", 0).unwrap();
        for v in x {
            assert!((v - 1.0).abs() < 1e-10);
        }
    }

    #[test]
    fn solve_blocks_handles_multiple_independent_blocks() {
        let a = BlockTridiagonal {
            sub: array![[0.0, -1.0], [0.0, -1.0]],
            main: array![[2.0, 2.0], [2.0, 2.0]],
            sup: array![[-1.0, 0.0], [-1.0, 0.0]],
        };
        let rhs = array![[1.0, 1.0], [2.0, 2.0]];
        let mut out = Array2::zeros((2, 2));
        solve_blocks(&a, &rhs, &mut out, "test").unwrap();
        assert!((out[[0, 0]] - out[[0, 1]]).abs() < 1e-10);
        assert!(out[[1, 0]] > out[[0, 0]]);
    }

    #[test]
    fn apply_block_tridiagonal_matches_manual_multiply() {
        let t = BlockTridiagonal {
            sub: array![[0.0, -1.0, -1.0]],
            main: array![[2.0, 2.0, 2.0]],
            sup: array![[-1.0, -1.0, 0.0]],
        };
        let x = array![[1.0, 2.0, 3.0]];
        let y = apply_block_tridiagonal(&t, &x);
        assert!((y[[0, 0]] - (2.0 * 1.0 - 1.0 * 2.0)).abs() < 1e-12);
        assert!((y[[0, 1]] - (-1.0 * 1.0 + 2.0 * 2.0 - 1.0 * 3.0)).abs() < 1e-12);
        assert!((y[[0, 2]] - (-1.0 * 2.0 + 2.0 * 3.0)).abs() < 1e-12);
    }

    #[test]
    fn singular_block_is_reported() {
        let a = BlockTridiagonal {
            sub: array![[0.0, 0.0]],
            main: array![[0.0, 1.0]],
            sup: array![[0.0, 0.0]],
        };
        let rhs = array![[1.0, 1.0]];
        let mut out = Array2::zeros((1, 2));
        assert!(solve_blocks(&a, &rhs, &mut out, "energy").is_err());
    }
}
