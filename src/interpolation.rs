//! Display smoothing between GPS fixes.
//!
//! Fixes arrive at roughly 1 Hz while the display refreshes at 10 Hz. Rising
//! speed is ramped linearly; falling speed follows an exponential decay fitted
//! so it lands on the new speed after one expected fix interval, which matches
//! the shape of drag-dominated coasting better than a straight line.

/// Below this target (km/h) the log-ratio in the decay fit is unstable
pub const DECAY_FLOOR_KMH: f64 = 0.1;

/// Display speed `elapsed_secs` after the fix that moved the speed from `v0` to `v1`.
///
/// `t = elapsed / expected_interval` is deliberately not clamped: a late fix
/// lets the estimate keep extrapolating. The result is always finite.
pub fn interpolate(v0: f64, v1: f64, elapsed_secs: f64, expected_interval_secs: f64) -> f64 {
    if expected_interval_secs == 0.0 || !expected_interval_secs.is_finite() {
        return v0;
    }
    if !elapsed_secs.is_finite() || !v0.is_finite() || !v1.is_finite() {
        return v0;
    }

    let t = elapsed_secs / expected_interval_secs;

    if v1 >= v0 {
        return v0 + (v1 - v0) * t;
    }

    if v1 < DECAY_FLOOR_KMH {
        return (v0 * (1.0 - t)).max(0.0);
    }

    // v0 > v1 >= floor, so the ratio is in (0, 1) and ln is finite
    let k = -(v1 / v0).ln() / expected_interval_secs;
    v0 * (-k * elapsed_secs).exp()
}

/// Interpolation anchor: the two most recent authoritative speeds and when the
/// newer one took effect.
#[derive(Debug, Clone, Default)]
pub struct Interpolator {
    from_kmh: f64,
    to_kmh: f64,
    anchor_time: Option<f64>,
    expected_interval_secs: f64,
    latest_kmh: f64,
}

impl Interpolator {
    pub fn new(expected_interval_secs: f64) -> Self {
        Self {
            expected_interval_secs,
            ..Self::default()
        }
    }

    /// Re-anchor on a new authoritative speed pair
    pub fn set_target(&mut self, from_kmh: f64, to_kmh: f64, at: f64) {
        self.from_kmh = from_kmh;
        self.to_kmh = to_kmh;
        self.anchor_time = Some(at);
        self.latest_kmh = to_kmh;
    }

    /// Pin the display to `speed_kmh` from `at` on (fix seen, nothing new learned)
    pub fn hold(&mut self, speed_kmh: f64, at: f64) {
        self.set_target(speed_kmh, speed_kmh, at);
    }

    /// Advance the display estimate to `now`; `None` until the first fix anchors it
    pub fn tick(&mut self, now: f64) -> Option<f64> {
        let anchor = self.anchor_time?;
        let elapsed = (now - anchor).max(0.0);
        self.latest_kmh = interpolate(
            self.from_kmh,
            self.to_kmh,
            elapsed,
            self.expected_interval_secs,
        );
        Some(self.latest_kmh)
    }

    /// Most recent value produced by `tick` or `set_target`
    pub fn latest_kmh(&self) -> f64 {
        self.latest_kmh
    }

    pub fn is_anchored(&self) -> bool {
        self.anchor_time.is_some()
    }
}
