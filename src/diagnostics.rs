//! Optional per-iteration snapshots of the interior electron density,
//! enabled by [`crate::config::SolverConfig::animation`].

use ndarray::Array2;

/// One recorded outer iteration.
#[derive(Clone, Debug)]
pub struct Snapshot {
    /// Outer iteration index this snapshot was taken after.
    pub iteration: u32,
    /// Time step in force during this iteration, seconds.
    pub dt: f64,
    /// Electron phase-space density `psi(r, E)` at the end of the
    /// iteration, restricted to the interior rows (`i < r_bins - 1`); the
    /// pinned outer boundary row is not stored.
    pub psi: Array2<f64>,
}

/// Growable snapshot log. Stays empty, and never allocates, when animation
/// recording is disabled.
#[derive(Clone, Debug, Default)]
pub struct SnapshotLog {
    enabled: bool,
    snapshots: Vec<Snapshot>,
}

impl SnapshotLog {
    /// Creates a log that records (`enabled = true`) or silently discards
    /// (`enabled = false`) every call to [`SnapshotLog::record`].
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self { enabled, snapshots: Vec::new() }
    }

    /// Appends a snapshot of the interior rows (`i < r_bins - 1`) if
    /// recording is enabled; otherwise a no-op.
    pub fn record(&mut self, iteration: u32, dt: f64, psi: &Array2<f64>) {
        if self.enabled {
            let interior = psi.slice(ndarray::s![..psi.nrows() - 1, ..]).to_owned();
            self.snapshots.push(Snapshot { iteration, dt, psi: interior });
        }
    }

    /// The recorded snapshots, in iteration order. Empty if recording was
    /// disabled.
    #[must_use]
    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    /// Consumes the log, returning the recorded snapshots.
    #[must_use]
    pub fn into_snapshots(self) -> Vec<Snapshot> {
        self.snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_log_never_records() {
        let mut log = SnapshotLog::new(false);
        log.record(0, 1.0, &Array2::zeros((2, 2)));
        log.record(1, 1.0, &Array2::zeros((2, 2)));
        assert!(log.snapshots().is_empty());
    }

    #[test]
    fn enabled_log_records_every_call() {
        let mut log = SnapshotLog::new(true);
        log.record(0, 1.0, &Array2::zeros((2, 2)));
        log.record(1, 2.0, &Array2::zeros((2, 2)));
        assert_eq!(log.snapshots().len(), 2);
        assert_eq!(log.snapshots()[1].iteration, 1);
    }
}
