//! Builds the dark-matter source term `Q(r, E)`.

use ndarray::Array2;

use crate::config::ModeExp;
use crate::convert::msun_per_mpc3_to_gev_per_cm3;
use crate::error::{Result, SolveError};
use crate::grid::Grid;

/// Builds `Q(r,E) = (1/m_exp) * (rho_DM(r)/m_chi)^m_exp * q(E)` as an outer
/// product over the grid.
///
/// `rho_sample` arrives in Msun/Mpc^3 and is converted to GeV/cm^3 via
/// `c^2` before the ratio with `m_chi` is taken. `q_sample` is the
/// pre-evaluated particle spectrum at the grid energies, GeV^-1.
///
/// # Errors
///
/// Returns [`SolveError::InvalidInput`] if `m_chi <= 0`, either sample has
/// the wrong length, or `rho_sample` contains a negative entry, and
/// [`SolveError::NonFinite`] if any resulting entry of `Q` is not finite.
pub fn build_source(grid: &Grid, rho_sample: &[f64], q_sample: &[f64], m_chi: f64, mode_exp: ModeExp) -> Result<Array2<f64>> {
    let r_bins = grid.r_bins();
    let e_bins = grid.e_bins();

    if m_chi <= 0.0 {
        return Err(SolveError::InvalidInput(format!("m_chi = {m_chi} must be positive")));
    }
    if rho_sample.len() != r_bins {
        return Err(SolveError::InvalidInput(format!(
            "rho_sample has {} entries, expected {r_bins} (r_bins)",
            rho_sample.len()
        )));
    }
    if q_sample.len() != e_bins {
        return Err(SolveError::InvalidInput(format!(
            "q_sample has {} entries, expected {e_bins} (e_bins)",
            q_sample.len()
        )));
    }
    if rho_sample.iter().any(|&rho| rho < 0.0) {
        return Err(SolveError::InvalidInput("rho_sample must be non-negative".to_string()));
    }

    let m_exp = f64::from(mode_exp.exponent());
    let mut q = Array2::<f64>::zeros((r_bins, e_bins));

    for i in 0..r_bins {
        let rho_gev_cm3 = msun_per_mpc3_to_gev_per_cm3(rho_sample[i]);
        let density_term = (rho_gev_cm3 / m_chi).powf(m_exp) / m_exp;

        for j in 0..e_bins {
            let value = density_term * q_sample[j];
            if !value.is_finite() {
                return Err(SolveError::NonFinite { field: "Q", i, j });
            }
            q[[i, j]] = value;
        }
    }

    Ok(q)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;

    fn toy_grid() -> Grid {
        let r: Vec<f64> = (0..8).map(|i| 1e-3 * 10f64.powf(i as f64 * 0.5)).collect();
        let e: Vec<f64> = (0..10).map(|j| 1e-1 * 10f64.powf(j as f64 * 0.3)).collect();
        Grid::build(&r, &e, 1.0, 1.0).unwrap()
    }

    #[test]
    fn source_is_outer_product_and_nonnegative() {
        let grid = toy_grid();
        let rho = vec![1e7; grid.r_bins()];
        let q_spec = vec![1.0; grid.e_bins()];

        let q = build_source(&grid, &rho, &q_spec, 100.0, ModeExp::Annihilation).unwrap();
        for &v in q.iter() {
            assert!(v.is_finite() && v >= 0.0);
        }

        // uniform density => every row should be identical
        for i in 1..grid.r_bins() {
            for j in 0..grid.e_bins() {
                assert!((q[[i, j]] - q[[0, j]]).abs() / q[[0, j]] < 1e-12);
            }
        }
    }

    #[test]
    fn doubling_mode_exp_input_density_quadruples_annihilation_source() {
        let grid = toy_grid();
        let rho = vec![1e7; grid.r_bins()];
        let q_spec = vec![1.0; grid.e_bins()];

        let q1 = build_source(&grid, &rho, &q_spec, 100.0, ModeExp::Annihilation).unwrap();
        let rho2: Vec<f64> = rho.iter().map(|&r| r * 2.0).collect();
        let q2 = build_source(&grid, &rho2, &q_spec, 100.0, ModeExp::Annihilation).unwrap();

        assert!((q2[[0, 0]] / q1[[0, 0]] - 4.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_negative_density() {
        let grid = toy_grid();
        let mut rho = vec![1e7; grid.r_bins()];
        rho[2] = -1.0;
        let q_spec = vec![1.0; grid.e_bins()];
        assert!(build_source(&grid, &rho, &q_spec, 100.0, ModeExp::Annihilation).is_err());
    }

    #[test]
    fn rejects_nonpositive_mass() {
        let grid = toy_grid();
        let rho = vec![1e7; grid.r_bins()];
        let q_spec = vec![1.0; grid.e_bins()];
        assert!(build_source(&grid, &rho, &q_spec, 0.0, ModeExp::Annihilation).is_err());
    }
}
