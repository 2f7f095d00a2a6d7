use serde::{Deserialize, Serialize};

/// One geolocation reading as delivered by the platform location API.
///
/// `timestamp` is in seconds (Unix epoch for live fixes, any monotonic origin for
/// replays). Optional fields mirror what browsers and phones may leave out.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub timestamp: f64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub altitude_accuracy: Option<f64>,
    /// Horizontal accuracy radius in meters
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub satellites: Option<u32>,
}

impl PositionFix {
    pub fn new(timestamp: f64, latitude: f64, longitude: f64) -> Self {
        Self {
            timestamp,
            latitude,
            longitude,
            altitude: None,
            altitude_accuracy: None,
            accuracy: None,
            satellites: None,
        }
    }

    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy = Some(accuracy_m);
        self
    }

    pub fn with_satellites(mut self, count: u32) -> Self {
        self.satellites = Some(count);
        self
    }

    pub fn with_altitude(mut self, altitude_m: f64, altitude_accuracy_m: f64) -> Self {
        self.altitude = Some(altitude_m);
        self.altitude_accuracy = Some(altitude_accuracy_m);
        self
    }

    /// Altitude only when the receiver reported an accuracy below `ceiling_m`
    pub fn usable_altitude(&self, ceiling_m: f64) -> Option<f64> {
        match (self.altitude, self.altitude_accuracy) {
            (Some(alt), Some(acc)) if acc < ceiling_m && alt.is_finite() => Some(alt),
            _ => None,
        }
    }
}

/// Speed derived from a pair of accepted fixes (km/h)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeedSample {
    pub value: f64,
    pub timestamp: f64,
    pub source_fix: PositionFix,
}
