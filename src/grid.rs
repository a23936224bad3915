//! Log-spaced radial and energy grids.

use crate::convert::mpc_to_cm;
use crate::error::{Result, SolveError};

/// Relative tolerance to which the log-transformed step sizes must be
/// uniform across their axis.
const STEP_UNIFORMITY_TOL: f64 = 1e-10;

/// The immutable radius/energy grid the transport equation is discretised
/// on.
///
/// `r` and `E` are the physical node positions (cm, GeV); `rho`/`eps` are
/// their log-transform against the scale values `r0`/`E0`, i.e.
/// `rho_i = log10(r_i / r0)`, `eps_j = log10(E_j / E0)`. Both are uniformly
/// spaced by construction (checked in [`Grid::build`]).
#[derive(Clone, Debug)]
pub struct Grid {
    r: Vec<f64>,
    e: Vec<f64>,
    r0: f64,
    e0: f64,
    rho: Vec<f64>,
    eps: Vec<f64>,
    delta_rho: f64,
    delta_eps: f64,
}

impl Grid {
    /// Builds a grid from radial samples (Mpc) and energy samples (GeV),
    /// both required to be strictly increasing and log-spaced.
    ///
    /// # Errors
    ///
    /// Returns [`SolveError::InvalidInput`] if either sample array has
    /// fewer than 3 nodes, is not strictly increasing, or is not uniformly
    /// log-spaced to within `1e-10` relative tolerance.
    pub fn build(r_sample_mpc: &[f64], e_sample_gev: &[f64], r_scale_mpc: f64, e_scale_gev: f64) -> Result<Self> {
        if r_sample_mpc.len() < 3 {
            return Err(SolveError::InvalidInput(format!(
                "radial grid needs at least 3 nodes, got {}",
                r_sample_mpc.len()
            )));
        }
        if e_sample_gev.len() < 3 {
            return Err(SolveError::InvalidInput(format!(
                "energy grid needs at least 3 nodes, got {}",
                e_sample_gev.len()
            )));
        }

        let r0 = mpc_to_cm(r_scale_mpc);
        let e0 = e_scale_gev;
        let r: Vec<f64> = r_sample_mpc.iter().map(|&rm| mpc_to_cm(rm)).collect();
        let e: Vec<f64> = e_sample_gev.to_vec();

        let rho = log_transform(&r, r0, "radial")?;
        let eps = log_transform(&e, e0, "energy")?;

        let delta_rho = uniform_step(&rho, "radial")?;
        let delta_eps = uniform_step(&eps, "energy")?;

        Ok(Self {
            r,
            e,
            r0,
            e0,
            rho,
            eps,
            delta_rho,
            delta_eps,
        })
    }

    /// Number of radial bins, `N_r`.
    #[must_use]
    pub fn r_bins(&self) -> usize {
        self.r.len()
    }

    /// Number of energy bins, `N_E`.
    #[must_use]
    pub fn e_bins(&self) -> usize {
        self.e.len()
    }

    /// Physical radial nodes, cm.
    #[must_use]
    pub fn r(&self) -> &[f64] {
        &self.r
    }

    /// Physical energy nodes, GeV.
    #[must_use]
    pub fn e(&self) -> &[f64] {
        &self.e
    }

    /// Radial scale value, cm.
    #[must_use]
    pub fn r0(&self) -> f64 {
        self.r0
    }

    /// Energy scale value, GeV.
    #[must_use]
    pub fn e0(&self) -> f64 {
        self.e0
    }

    /// Log-transformed radial coordinates, `rho_i = log10(r_i / r0)`.
    #[must_use]
    pub fn rho(&self) -> &[f64] {
        &self.rho
    }

    /// Log-transformed energy coordinates, `eps_j = log10(E_j / E0)`.
    #[must_use]
    pub fn eps(&self) -> &[f64] {
        &self.eps
    }

    /// Uniform step in `rho`.
    #[must_use]
    pub fn delta_rho(&self) -> f64 {
        self.delta_rho
    }

    /// Uniform step in `eps`.
    #[must_use]
    pub fn delta_eps(&self) -> f64 {
        self.delta_eps
    }

    /// Spacing of the first two physical radial nodes, used as the
    /// reference length scale for the diffusion timescale `tau_diff`.
    #[must_use]
    pub fn inner_delta_r(&self) -> f64 {
        self.r[1] - self.r[0]
    }

    /// The log-transform prefactor for the radial axis at node `i`,
    /// `xi_i = 1 / (10^rho_i * ln(10) * r0)`.
    #[must_use]
    pub fn r_prefactor(&self, i: usize) -> f64 {
        1.0 / (10f64.powf(self.rho[i]) * std::f64::consts::LN_10 * self.r0)
    }

    /// The log-transform prefactor for the energy axis at node `j`,
    /// `eta_j = 1 / (10^eps_j * ln(10) * E0)`.
    #[must_use]
    pub fn e_prefactor(&self, j: usize) -> f64 {
        1.0 / (10f64.powf(self.eps[j]) * std::f64::consts::LN_10 * self.e0)
    }
}

fn log_transform(nodes: &[f64], scale: f64, axis: &'static str) -> Result<Vec<f64>> {
    if nodes.windows(2).any(|w| w[1] <= w[0]) {
        return Err(SolveError::InvalidInput(format!(
            "{axis} grid is not strictly increasing"
        )));
    }
    Ok(nodes.iter().map(|&x| (x / scale).log10()).collect())
}

fn uniform_step(transformed: &[f64], axis: &'static str) -> Result<f64> {
    let delta = transformed[1] - transformed[0];
    for w in transformed.windows(2) {
        let step = w[1] - w[0];
        if (step - delta).abs() > STEP_UNIFORMITY_TOL * delta.abs() {
            return Err(SolveError::InvalidInput(format!(
                "{axis} grid is not uniformly log-spaced: step {step} deviates from {delta}"
            )));
        }
    }
    Ok(delta)
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
    fn builds_from_log_spaced_samples() {
        let r = log_space(1e-3, 1e2, 16);
        let e = log_space(1e-1, 1e4, 20);
        let grid = Grid::build(&r, &e, 1.0, 1.0).unwrap();

        assert_eq!(grid.r_bins(), 16);
        assert_eq!(grid.e_bins(), 20);
        assert!((grid.delta_rho() - (grid.rho()[1] - grid.rho()[0])).abs() < 1e-15);
        assert!((grid.delta_eps() - (grid.eps()[1] - grid.eps()[0])).abs() < 1e-15);
    }

    #[test]
    fn rejects_too_few_nodes() {
        let r = vec![1.0, 2.0];
        let e = log_space(0.1, 10.0, 5);
        assert!(Grid::build(&r, &e, 1.0, 1.0).is_err());
    }

    #[test]
    fn rejects_non_monotonic_samples() {
        let mut r = log_space(1e-3, 1e2, 10);
        r[3] = r[2];
        let e = log_space(0.1, 10.0, 5);
        assert!(Grid::build(&r, &e, 1.0, 1.0).is_err());
    }

    #[test]
    fn rejects_non_uniform_log_spacing() {
        let mut r = log_space(1e-3, 1e2, 10);
        r[5] *= 1.2;
        let e = log_space(0.1, 10.0, 5);
        assert!(Grid::build(&r, &e, 1.0, 1.0).is_err());
    }
}
