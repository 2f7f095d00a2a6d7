use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::types::PositionFix;

/// Whether a fix is trustworthy enough to feed distance, speed and timers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockState {
    /// No usable fix yet, or the last fix was too coarse ("Acquiring GPS...")
    Acquiring,
    Locked,
}

impl LockState {
    pub fn is_locked(self) -> bool {
        self == LockState::Locked
    }
}

/// Lock gate: accuracy below the ceiling, or enough satellites in view.
///
/// Most browsers never report satellites, so accuracy is the usual signal.
pub fn evaluate_lock(fix: &PositionFix, config: &EngineConfig) -> LockState {
    let good_accuracy = fix
        .accuracy
        .map(|acc| acc.is_finite() && acc < config.max_horizontal_accuracy_m)
        .unwrap_or(false);
    let enough_satellites = fix.satellites.unwrap_or(0) >= config.min_satellites;

    if good_accuracy || enough_satellites {
        LockState::Locked
    } else {
        LockState::Acquiring
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    #[test]
    fn test_good_accuracy_locks() {
        let fix = PositionFix::new(0.0, 10.0, 10.0).with_accuracy(5.0);
        assert_eq!(evaluate_lock(&fix, &config()), LockState::Locked);
    }

    #[test]
    fn test_accuracy_at_ceiling_does_not_lock() {
        let fix = PositionFix::new(0.0, 10.0, 10.0).with_accuracy(20.0);
        assert_eq!(evaluate_lock(&fix, &config()), LockState::Acquiring);
    }

    #[test]
    fn test_satellites_lock_despite_poor_accuracy() {
        let fix = PositionFix::new(0.0, 10.0, 10.0)
            .with_accuracy(80.0)
            .with_satellites(4);
        assert!(evaluate_lock(&fix, &config()).is_locked());

        let fix = PositionFix::new(0.0, 10.0, 10.0).with_satellites(3);
        assert!(!evaluate_lock(&fix, &config()).is_locked());
    }

    #[test]
    fn test_missing_metrics_stay_acquiring() {
        let fix = PositionFix::new(0.0, 10.0, 10.0);
        assert_eq!(evaluate_lock(&fix, &config()), LockState::Acquiring);
    }

    #[test]
    fn test_nan_accuracy_does_not_lock() {
        let fix = PositionFix::new(0.0, 10.0, 10.0).with_accuracy(f64::NAN);
        assert_eq!(evaluate_lock(&fix, &config()), LockState::Acquiring);
    }
}
