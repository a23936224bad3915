//! Error types for the transport solver.

use thiserror::Error;

/// Errors that can be returned by [`crate::solve_electrons`].
///
/// Non-convergence and benchmark failure are *not* represented here: both are
/// recoverable outcomes of an otherwise successful solve and are reported
/// through [`crate::SolveOutcome::status`] instead.
#[derive(Debug, Error)]
pub enum SolveError {
    /// A precondition on the input grids or physical parameters was violated.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A coefficient array (`D`, `dD/dr`, `b`) or the source `Q` contains a
    /// non-finite entry after construction.
    #[error("non-finite value in {field} at (r={i}, E={j})")]
    NonFinite {
        /// Which field the offending entry was found in.
        field: &'static str,
        /// Radial index of the offending cell.
        i: usize,
        /// Energy index of the offending cell.
        j: usize,
    },

    /// A tridiagonal system built for one of the CN half-steps was singular,
    /// i.e. its main diagonal was smaller in magnitude than the sum of its
    /// off-diagonals times a small tolerance.
    #[error("singular tridiagonal system in {sweep} sweep at block {block}, row {row}")]
    SingularSystem {
        /// Which half-step produced the singular system.
        sweep: &'static str,
        /// Index of the independent block (row `i` for the energy sweep,
        /// column `j` for the radial sweep).
        block: usize,
        /// Row within the block at which the pivot underflowed.
        row: usize,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SolveError>;
