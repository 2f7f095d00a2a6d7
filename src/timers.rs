//! Acceleration and drag-strip timers.
//!
//! A run starts on the first accepted speed at or above the moving threshold and
//! ends when the vehicle is seen stopped with at least one milestone recorded.
//! Each milestone is recorded once per run, the first time it is crossed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::units::mph_to_kmh;

/// Reach `target_kmh`, timed from the run start
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeedMilestone {
    pub name: String,
    pub target_kmh: f64,
}

impl SpeedMilestone {
    pub fn new(name: &str, target_kmh: f64) -> Self {
        Self {
            name: name.to_string(),
            target_kmh,
        }
    }

    pub fn from_mph(name: &str, target_mph: f64) -> Self {
        Self::new(name, mph_to_kmh(target_mph))
    }
}

/// Cover `distance_km` of run distance, timed from the run start
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DistanceMilestone {
    pub name: String,
    pub distance_km: f64,
}

impl DistanceMilestone {
    pub fn new(name: &str, distance_km: f64) -> Self {
        Self {
            name: name.to_string(),
            distance_km,
        }
    }
}

pub fn default_speed_milestones() -> Vec<SpeedMilestone> {
    let mph = [
        ("0-60", 60.0),
        ("0-100", 100.0),
        ("0-150", 150.0),
        ("0-200", 200.0),
        ("30-60", 60.0),
        ("60-120", 120.0),
        ("60-130", 130.0),
        ("100-150", 150.0),
    ];
    let kmh = [
        ("0-100kmh", 100.0),
        ("0-160kmh", 160.0),
        ("0-250kmh", 250.0),
        ("0-320kmh", 320.0),
        ("100-200kmh", 200.0),
        ("160-240kmh", 240.0),
    ];

    mph.iter()
        .map(|(name, target)| SpeedMilestone::from_mph(name, *target))
        .chain(kmh.iter().map(|(name, target)| SpeedMilestone::new(name, *target)))
        .collect()
}

pub fn default_distance_milestones() -> Vec<DistanceMilestone> {
    vec![
        DistanceMilestone::new("1/8 mile", 0.201168),
        DistanceMilestone::new("1/4 mile", 0.402336),
        DistanceMilestone::new("1/2 mile", 0.804672),
        DistanceMilestone::new("standing mile", 1.609344),
    ]
}

/// One recorded milestone
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerEntry {
    pub elapsed_seconds: f64,
    /// Speed when a distance milestone was crossed (km/h)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_at_mark: Option<f64>,
    /// Achieved while descending past the incline threshold
    #[serde(default)]
    pub invalid: bool,
}

impl TimerEntry {
    /// "4.21s", or "12.80s @ 168.3 km/h" for distance milestones
    pub fn display_time(&self) -> String {
        match self.speed_at_mark {
            Some(speed) => format!("{:.2}s @ {:.1} km/h", self.elapsed_seconds, speed),
            None => format!("{:.2}s", self.elapsed_seconds),
        }
    }
}

/// Milestone name to result; ordered by name for display
pub type TimerMap = BTreeMap<String, TimerEntry>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    Running { since: f64 },
}

/// Result of feeding one accepted speed sample
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimerUpdate {
    /// A run began with this sample
    pub started: bool,
    /// Stop detected; timers were cleared and run distance must be zeroed
    pub auto_reset: bool,
    pub recorded: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TimerEngine {
    speed_milestones: Vec<SpeedMilestone>,
    distance_milestones: Vec<DistanceMilestone>,
    moving_speed_kmh: f64,
    state: RunState,
    timers: TimerMap,
}

impl TimerEngine {
    pub fn new(
        speed_milestones: Vec<SpeedMilestone>,
        distance_milestones: Vec<DistanceMilestone>,
        moving_speed_kmh: f64,
    ) -> Self {
        Self {
            speed_milestones,
            distance_milestones,
            moving_speed_kmh,
            state: RunState::Idle,
            timers: TimerMap::new(),
        }
    }

    /// Advance the run with an accepted speed sample taken at `now` (seconds)
    pub fn update(
        &mut self,
        speed_kmh: f64,
        run_distance_km: f64,
        now: f64,
        on_downhill: bool,
    ) -> TimerUpdate {
        let mut update = TimerUpdate::default();

        if speed_kmh < self.moving_speed_kmh {
            if !self.timers.is_empty() {
                log::info!("vehicle stopped, clearing {} timer(s)", self.timers.len());
                self.timers.clear();
                self.state = RunState::Idle;
                update.auto_reset = true;
            }
            return update;
        }

        let since = match self.state {
            RunState::Running { since } => since,
            RunState::Idle => {
                self.state = RunState::Running { since: now };
                update.started = true;
                now
            }
        };
        let elapsed = (now - since).max(0.0);

        for milestone in &self.speed_milestones {
            if speed_kmh >= milestone.target_kmh && !self.timers.contains_key(&milestone.name) {
                self.timers.insert(
                    milestone.name.clone(),
                    TimerEntry {
                        elapsed_seconds: elapsed,
                        speed_at_mark: None,
                        invalid: on_downhill,
                    },
                );
                update.recorded.push(milestone.name.clone());
            }
        }

        for milestone in &self.distance_milestones {
            if run_distance_km >= milestone.distance_km
                && !self.timers.contains_key(&milestone.name)
            {
                self.timers.insert(
                    milestone.name.clone(),
                    TimerEntry {
                        elapsed_seconds: elapsed,
                        speed_at_mark: Some(speed_kmh),
                        invalid: on_downhill,
                    },
                );
                update.recorded.push(milestone.name.clone());
            }
        }

        for name in &update.recorded {
            log::debug!("milestone {} at {:.2}s (downhill: {})", name, elapsed, on_downhill);
        }

        update
    }

    /// Back to idle with no timers
    pub fn reset(&mut self) {
        self.timers.clear();
        self.state = RunState::Idle;
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn timers(&self) -> &TimerMap {
        &self.timers
    }

    pub fn any_invalid(&self) -> bool {
        self.timers.values().any(|t| t.invalid)
    }
}
