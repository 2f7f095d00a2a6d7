use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::geo::haversine_km;

/// Slope angle in degrees for an altitude change (m) over a horizontal distance (km).
///
/// Baselines shorter than `min_baseline_km` return 0: the vertical GPS error
/// would dominate the ratio.
pub fn incline_degrees(altitude_change_m: f64, horizontal_km: f64, min_baseline_km: f64) -> f64 {
    if !(horizontal_km >= min_baseline_km) {
        return 0.0;
    }
    let distance_m = horizontal_km * 1000.0;
    (altitude_change_m / distance_m).atan().to_degrees()
}

/// Moving-average altitude smoother feeding a downhill detector
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InclineEstimator {
    altitude_history: VecDeque<f64>,
    window_size: usize,
    previous_smoothed: Option<f64>,
    current_angle_deg: f64,
    on_downhill: bool,
    threshold_deg: f64,
    min_baseline_km: f64,
}

impl InclineEstimator {
    pub fn new(window_size: usize, threshold_deg: f64, min_baseline_km: f64) -> Self {
        let window_size = window_size.max(1);
        Self {
            altitude_history: VecDeque::with_capacity(window_size + 1),
            window_size,
            previous_smoothed: None,
            current_angle_deg: 0.0,
            on_downhill: false,
            threshold_deg,
            min_baseline_km,
        }
    }

    /// Push a raw altitude and return the window mean
    pub fn smooth(&mut self, altitude_m: f64) -> f64 {
        self.altitude_history.push_back(altitude_m);
        while self.altitude_history.len() > self.window_size {
            self.altitude_history.pop_front();
        }
        self.altitude_history.iter().sum::<f64>() / self.altitude_history.len() as f64
    }

    /// Feed one usable altitude taken at `position`, with `previous_position` the
    /// prior fix's coordinates.
    ///
    /// Returns the new angle when the baseline was long enough to re-evaluate it;
    /// otherwise the previous angle and downhill flag are kept.
    pub fn update(
        &mut self,
        altitude_m: f64,
        position: (f64, f64),
        previous_position: Option<(f64, f64)>,
    ) -> Option<f64> {
        let smoothed = self.smooth(altitude_m);
        let mut updated = None;

        if let (Some(prev_alt), Some((prev_lat, prev_lon))) =
            (self.previous_smoothed, previous_position)
        {
            let horizontal_km = haversine_km(prev_lat, prev_lon, position.0, position.1);
            if horizontal_km >= self.min_baseline_km {
                let angle =
                    incline_degrees(smoothed - prev_alt, horizontal_km, self.min_baseline_km);
                self.current_angle_deg = angle;
                self.on_downhill = angle <= -self.threshold_deg;
                if self.on_downhill {
                    log::debug!("downhill detected: {:.2} deg", angle);
                }
                updated = Some(angle);
            }
        }

        self.previous_smoothed = Some(smoothed);
        updated
    }

    pub fn current_angle_deg(&self) -> f64 {
        self.current_angle_deg
    }

    pub fn on_downhill(&self) -> bool {
        self.on_downhill
    }

    pub fn history_len(&self) -> usize {
        self.altitude_history.len()
    }
}
