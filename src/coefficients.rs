//! Evaluates the diffusion coefficient, its radial derivative, and the
//! energy-loss rate on the grid.

use ndarray::Array2;

use crate::error::{Result, SolveError};
use crate::grid::Grid;

/// Redshift-dependent and fixed constants entering the energy-loss rate
/// `b(E, B, n_e)`, in GeV/s when `E` is in GeV, `n_e` in cm^-3, `B` in uG.
struct LossConstants {
    ic: f64,
    sync: f64,
    coul: f64,
    brem: f64,
}

impl LossConstants {
    fn at_redshift(z: f64) -> Self {
        Self {
            ic: 6.08e-16 + 0.25e-16 * (1.0 + z).powi(4),
            sync: 0.0254e-16,
            coul: 6.13e-16,
            brem: 4.7e-16,
        }
    }
}

/// Electron rest mass, GeV/c^2.
const M_E_GEV: f64 = 0.511e-3;

/// `D` is capped at `1e32 * E^alpha` to suppress unphysical blow-up at small `B`.
const DIFFUSION_CEILING_SCALE: f64 = 1e32;

/// Diffusion coefficient, its (pre-transformed) radial derivative, and the
/// total energy-loss rate, each sampled on the full `(N_r, N_E)` grid.
///
/// Immutable once built: every entry is finite and non-negative (`D`, `b`),
/// checked at construction time.
pub struct CoefficientField {
    d: Array2<f64>,
    d_dr: Array2<f64>,
    b: Array2<f64>,
}

impl CoefficientField {
    /// Builds the coefficient field from per-radius field samples.
    ///
    /// `b_field` is in uG, `d_bdr` in 1/cm (already converted from the
    /// caller's 1/Mpc), `n_e` in cm^-3. `delta` is the diffusion power-law
    /// index and must lie in `(0, 2)`; `diff0` is `D0` in cm^2/s and `d0`
    /// is the reference length in kpc.
    ///
    /// # Errors
    ///
    /// Returns [`SolveError::InvalidInput`] if `delta` is outside `(0, 2)`
    /// or any sample array has the wrong length, and
    /// [`SolveError::NonFinite`] if any resulting entry of `D`, `dD/dr`, or
    /// `b` is not finite.
    pub fn build(grid: &Grid, b_field: &[f64], d_bdr: &[f64], n_e: &[f64], z: f64, delta: f64, diff0: f64, d0_kpc: f64) -> Result<Self> {
        let r_bins = grid.r_bins();
        let e_bins = grid.e_bins();

        if !(0.0..2.0).contains(&delta) {
            return Err(SolveError::InvalidInput(format!(
                "diffusion index delta = {delta} must lie in (0, 2)"
            )));
        }
        for (name, len) in [("b_field", b_field.len()), ("dBdr", d_bdr.len()), ("n_e", n_e.len())] {
            if len != r_bins {
                return Err(SolveError::InvalidInput(format!(
                    "{name} has {len} entries, expected {r_bins} (r_bins)"
                )));
            }
        }

        let alpha = 2.0 - delta;
        let loss = LossConstants::at_redshift(z);

        let mut d = Array2::<f64>::zeros((r_bins, e_bins));
        let mut d_dr = Array2::<f64>::zeros((r_bins, e_bins));
        let mut b = Array2::<f64>::zeros((r_bins, e_bins));

        for i in 0..r_bins {
            let b_i = b_field[i];
            let d_bdr_i = d_bdr[i];
            let n_e_i = n_e[i];
            let xi = grid.r_prefactor(i);

            for j in 0..e_bins {
                let e_j = grid.e()[j];

                let d_raw = diff0 * d0_kpc.powf(1.0 - alpha) * b_i.powf(-alpha) * e_j.powf(alpha);
                let ceiling = DIFFUSION_CEILING_SCALE * e_j.powf(alpha);
                let d_ij = d_raw.min(ceiling);

                let d_dr_ij = -(1.0 / xi) * diff0 * alpha * d0_kpc.powf(1.0 - alpha) * b_i.powf(-alpha - 1.0) * d_bdr_i * e_j.powf(alpha);

                let b_ij = loss.ic * e_j * e_j
                    + loss.sync * e_j * e_j * b_i * b_i
                    + loss.coul * n_e_i * (1.0 + (e_j / (M_E_GEV * n_e_i)).ln() / 75.0)
                    + loss.brem * n_e_i * e_j;

                check_finite(d_ij, "D", i, j)?;
                check_finite(d_dr_ij, "dDdr", i, j)?;
                check_finite(b_ij, "b", i, j)?;

                if d_ij < 0.0 {
                    return Err(SolveError::InvalidInput(format!("D[{i},{j}] = {d_ij} is negative")));
                }
                if b_ij < 0.0 {
                    return Err(SolveError::InvalidInput(format!("b[{i},{j}] = {b_ij} is negative")));
                }

                d[[i, j]] = d_ij;
                d_dr[[i, j]] = d_dr_ij;
                b[[i, j]] = b_ij;
            }
        }

        Ok(Self { d, d_dr, b })
    }

    /// Diffusion coefficient, cm^2/s.
    #[must_use]
    pub fn d(&self) -> &Array2<f64> {
        &self.d
    }

    /// Radial derivative of `D`, pre-divided by the log-transform prefactor.
    #[must_use]
    pub fn d_dr(&self) -> &Array2<f64> {
        &self.d_dr
    }

    /// Total energy-loss rate, GeV/s.
    #[must_use]
    pub fn b(&self) -> &Array2<f64> {
        &self.b
    }
}

fn check_finite(value: f64, field: &'static str, i: usize, j: usize) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SolveError::NonFinite { field, i, j })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_grid() -> Grid {
        let r: Vec<f64> = (0..8).map(|i| 1e-3 * 10f64.powf(i as f64 * 0.5)).collect();
        let e: Vec<f64> = (0..10).map(|j| 1e-1 * 10f64.powf(j as f64 * 0.3)).collect();
        Grid::build(&r, &e, 1.0, 1.0).unwrap()
    }

    #[test]
    fn coefficients_are_nonnegative_and_finite() {
        let grid = toy_grid();
        let b_field = vec![1.0; grid.r_bins()];
        let d_bdr = vec![0.01; grid.r_bins()];
        let n_e = vec![1e-2; grid.r_bins()];

        let field = CoefficientField::build(&grid, &b_field, &d_bdr, &n_e, 0.0, 1.0 / 3.0, 3.1e28, 1.0).unwrap();

        for &v in field.d().iter() {
            assert!(v.is_finite() && v >= 0.0);
        }
        for &v in field.b().iter() {
            assert!(v.is_finite() && v >= 0.0);
        }
        for &v in field.d_dr().iter() {
            assert!(v.is_finite());
        }
    }

    #[test]
    fn diffusion_ceiling_caps_blow_up_at_small_field() {
        let grid = toy_grid();
        let b_field = vec![1e-12; grid.r_bins()];
        let d_bdr = vec![0.0; grid.r_bins()];
        let n_e = vec![1e-2; grid.r_bins()];

        let field = CoefficientField::build(&grid, &b_field, &d_bdr, &n_e, 0.0, 1.0 / 3.0, 3.1e28, 1.0).unwrap();
        let alpha = 2.0 - 1.0 / 3.0;
        for (idx, &v) in field.d().indexed_iter() {
            let e_j = grid.e()[idx.1];
            assert!(v <= DIFFUSION_CEILING_SCALE * e_j.powf(alpha) * (1.0 + 1e-9));
        }
    }

    #[test]
    fn rejects_out_of_range_delta() {
        let grid = toy_grid();
        let b_field = vec![1.0; grid.r_bins()];
        let d_bdr = vec![0.0; grid.r_bins()];
        let n_e = vec![1e-2; grid.r_bins()];
        assert!(CoefficientField::build(&grid, &b_field, &d_bdr, &n_e, 0.0, 2.5, 3.1e28, 1.0).is_err());
    }
}
