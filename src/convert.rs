//! Unit conversions used at the boundary of the solver.
//!
//! The transport equation itself is dimensionless once evaluated on the
//! log-transformed grid; everything that crosses the public API, however,
//! arrives in the "natural" astrophysical units used by the rest of the
//! toolkit (Mpc, yr, Msun/Mpc^3, uG). Converting once at entry keeps the
//! core free of unit-tagged types, matching the rest of the numerical core.

/// 1 Mpc in cm.
pub const MPC_TO_CM: f64 = 3.085_677_581_491_367_3e24;

/// 1 kpc in cm (used only to go from Mpc to kpc below).
const MPC_TO_KPC: f64 = 1.0e3;

/// 1 year in seconds (Julian year, 365.25 days).
pub const YR_TO_S: f64 = 365.25 * 24.0 * 3600.0;

/// Speed of light squared, in (cm/s)^2, for the Msun/Mpc^3 -> GeV/cm^3 rest-energy conversion.
const C_CM_PER_S: f64 = 2.997_924_58e10;

/// Solar mass in grams.
const MSUN_TO_G: f64 = 1.988_47e33;

/// 1 GeV in erg (used to convert rest-mass energy density into GeV/cm^3).
const GEV_TO_ERG: f64 = 1.602_176_634e-3;

/// Converts a length in Mpc to cm.
#[must_use]
pub fn mpc_to_cm(mpc: f64) -> f64 {
    mpc * MPC_TO_CM
}

/// Converts a length in Mpc to kpc.
#[must_use]
pub fn mpc_to_kpc(mpc: f64) -> f64 {
    mpc * MPC_TO_KPC
}

/// Converts an inverse length in 1/Mpc to 1/cm.
#[must_use]
pub fn inv_mpc_to_inv_cm(inv_mpc: f64) -> f64 {
    inv_mpc / MPC_TO_CM
}

/// Converts a duration in years to seconds.
#[must_use]
pub fn yr_to_s(yr: f64) -> f64 {
    yr * YR_TO_S
}

/// Converts a mass density in Msun/Mpc^3 to a rest-energy density in GeV/cm^3 via `E = m c^2`.
#[must_use]
pub fn msun_per_mpc3_to_gev_per_cm3(rho: f64) -> f64 {
    let g_per_cm3 = rho * MSUN_TO_G / MPC_TO_CM.powi(3);
    let erg_per_cm3 = g_per_cm3 * C_CM_PER_S * C_CM_PER_S;
    erg_per_cm3 / GEV_TO_ERG
}
