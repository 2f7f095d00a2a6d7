use crate::config::EngineConfig;
use crate::geo::haversine_km;
use crate::types::{PositionFix, SpeedSample};

/// What the estimator made of one locked fix
#[derive(Debug, Clone, PartialEq)]
pub enum SpeedUpdate {
    /// Nothing to difference against yet
    FirstFix,
    /// Movement or interval below the jitter floors
    Jitter { distance_km: f64, interval_secs: f64 },
    /// Faster than any ground vehicle; treated as a glitch
    Implausible { speed_kmh: f64 },
    Accepted {
        speed_kmh: f64,
        distance_km: f64,
        interval_secs: f64,
    },
}

/// Differences consecutive fixes into km/h.
///
/// The position/time cursor advances on every fix handed in, rejected or not,
/// so a burst of jitter never accumulates into one large step later.
#[derive(Debug, Clone)]
pub struct SpeedEstimator {
    previous: Option<PositionFix>,
    last_speed_kmh: f64,
    current: Option<SpeedSample>,
    jitter_distance_km: f64,
    jitter_interval_secs: f64,
    max_plausible_kmh: f64,
}

impl SpeedEstimator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            previous: None,
            last_speed_kmh: 0.0,
            current: None,
            jitter_distance_km: config.jitter_distance_km,
            jitter_interval_secs: config.jitter_interval_secs,
            max_plausible_kmh: config.max_plausible_speed_kmh,
        }
    }

    pub fn process(&mut self, fix: &PositionFix) -> SpeedUpdate {
        let Some(prev) = self.previous.replace(fix.clone()) else {
            return SpeedUpdate::FirstFix;
        };

        let distance_km = haversine_km(prev.latitude, prev.longitude, fix.latitude, fix.longitude);
        let interval_secs = fix.timestamp - prev.timestamp;

        // Also catches NaN and out-of-order timestamps
        if !(distance_km >= self.jitter_distance_km && interval_secs >= self.jitter_interval_secs) {
            return SpeedUpdate::Jitter {
                distance_km,
                interval_secs,
            };
        }

        let speed_kmh = distance_km / interval_secs * 3600.0;
        if !(speed_kmh <= self.max_plausible_kmh) {
            log::debug!("discarding implausible speed {:.1} km/h", speed_kmh);
            // Settle the display pair on the speed being kept
            self.last_speed_kmh = self.current_speed_kmh();
            return SpeedUpdate::Implausible { speed_kmh };
        }

        self.last_speed_kmh = self.current_speed_kmh();
        self.current = Some(SpeedSample {
            value: speed_kmh,
            timestamp: fix.timestamp,
            source_fix: fix.clone(),
        });

        SpeedUpdate::Accepted {
            speed_kmh,
            distance_km,
            interval_secs,
        }
    }

    /// Latest accepted speed (km/h), 0 before the first acceptance
    pub fn current_speed_kmh(&self) -> f64 {
        self.current.as_ref().map(|s| s.value).unwrap_or(0.0)
    }

    /// Speed that was current before the latest acceptance
    pub fn last_speed_kmh(&self) -> f64 {
        self.last_speed_kmh
    }

    pub fn current_sample(&self) -> Option<&SpeedSample> {
        self.current.as_ref()
    }

    pub fn previous_fix(&self) -> Option<&PositionFix> {
        self.previous.as_ref()
    }

    pub fn previous_position(&self) -> Option<(f64, f64)> {
        self.previous.as_ref().map(|f| (f.latitude, f.longitude))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::EARTH_RADIUS_KM;
    use approx::assert_abs_diff_eq;

    fn lat_for_km(km: f64) -> f64 {
        (km / EARTH_RADIUS_KM).to_degrees()
    }

    fn estimator() -> SpeedEstimator {
        SpeedEstimator::new(&EngineConfig::default())
    }

    #[test]
    fn test_first_fix() {
        let mut est = estimator();
        assert_eq!(est.process(&PositionFix::new(0.0, 0.0, 0.0)), SpeedUpdate::FirstFix);
        assert_eq!(est.current_speed_kmh(), 0.0);
        assert!(est.previous_fix().is_some());
    }

    #[test]
    fn test_accepts_100_kmh() {
        let mut est = estimator();
        est.process(&PositionFix::new(0.0, 0.0, 0.0));
        let update = est.process(&PositionFix::new(1.0, lat_for_km(0.0278), 0.0));
        match update {
            SpeedUpdate::Accepted { speed_kmh, .. } => {
                assert_abs_diff_eq!(speed_kmh, 100.08, epsilon = 1e-6)
            }
            other => panic!("expected acceptance, got {other:?}"),
        }
        assert_abs_diff_eq!(est.current_speed_kmh(), 100.08, epsilon = 1e-6);
        assert_eq!(est.last_speed_kmh(), 0.0);
    }

    #[test]
    fn test_jitter_rejected_but_cursor_advances() {
        let mut est = estimator();
        est.process(&PositionFix::new(0.0, 0.0, 0.0));
        let small = PositionFix::new(1.0, lat_for_km(0.0005), 0.0);
        assert!(matches!(est.process(&small), SpeedUpdate::Jitter { .. }));
        assert_eq!(est.previous_fix(), Some(&small));
        assert_eq!(est.current_speed_kmh(), 0.0);
    }

    #[test]
    fn test_short_interval_rejected() {
        let mut est = estimator();
        est.process(&PositionFix::new(0.0, 0.0, 0.0));
        let quick = PositionFix::new(0.3, lat_for_km(0.01), 0.0);
        assert!(matches!(est.process(&quick), SpeedUpdate::Jitter { .. }));
        assert_eq!(est.current_speed_kmh(), 0.0);
    }

    #[test]
    fn test_implausible_speed_rejected() {
        let mut est = estimator();
        est.process(&PositionFix::new(0.0, 0.0, 0.0));
        est.process(&PositionFix::new(1.0, lat_for_km(0.02), 0.0));
        let before = est.current_speed_kmh();

        // 1 km in one second is 3600 km/h
        let glitch = PositionFix::new(2.0, lat_for_km(1.02), 0.0);
        assert!(matches!(est.process(&glitch), SpeedUpdate::Implausible { .. }));
        assert_eq!(est.current_speed_kmh(), before);
        assert_eq!(est.last_speed_kmh(), before);
        assert_eq!(est.previous_fix(), Some(&glitch));
    }

    #[test]
    fn test_last_speed_tracks_previous_acceptance() {
        let mut est = estimator();
        est.process(&PositionFix::new(0.0, 0.0, 0.0));
        est.process(&PositionFix::new(1.0, lat_for_km(0.01), 0.0));
        let first = est.current_speed_kmh();
        est.process(&PositionFix::new(2.0, lat_for_km(0.03), 0.0));
        assert_abs_diff_eq!(est.last_speed_kmh(), first, epsilon = 1e-9);
        assert_abs_diff_eq!(est.current_speed_kmh(), 72.0, epsilon = 1e-6);

        let sample = est.current_sample().unwrap();
        assert_eq!(sample.timestamp, 2.0);
        assert_eq!(sample.source_fix.timestamp, 2.0);
    }

    #[test]
    fn test_backwards_timestamp_is_jitter() {
        let mut est = estimator();
        est.process(&PositionFix::new(10.0, 0.0, 0.0));
        let stale = PositionFix::new(9.0, lat_for_km(0.05), 0.0);
        assert!(matches!(est.process(&stale), SpeedUpdate::Jitter { .. }));
    }
}
