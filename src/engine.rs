//! Single-owner speedometer engine.
//!
//! All mutable state (cursors, interpolation anchor, incline, timers, session)
//! lives in one `SpeedSessionEngine`. Callers feed it fixes in arrival order via
//! `handle_fix`, drive the display with `tick`, and end a session with `reset`.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::gps_lock::{evaluate_lock, LockState};
use crate::incline::InclineEstimator;
use crate::interpolation::Interpolator;
use crate::session::{timestamp_to_utc, SessionRecord, SessionState};
use crate::sink::{SessionSink, SpeedLogEntry};
use crate::speed::{SpeedEstimator, SpeedUpdate};
use crate::timers::{RunState, TimerEngine, TimerMap};
use crate::types::PositionFix;

/// Engine state as shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EngineState {
    /// Waiting for a fix that passes the lock gate
    Acquiring,
    Idle,
    Running { since: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    Jitter,
    Implausible,
}

/// What happened to one fix
#[derive(Debug, Clone, PartialEq)]
pub enum FixOutcome {
    Unlocked,
    FirstFix,
    Rejected(RejectReason),
    Accepted {
        speed_kmh: f64,
        recorded: Vec<String>,
        auto_reset: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DisplayReading {
    Acquiring {
        vmax_kmh: f64,
        distance_km: f64,
    },
    Live {
        speed_kmh: f64,
        vmax_kmh: f64,
        distance_km: f64,
        incline_deg: f64,
        on_downhill: bool,
    },
}

/// Random version 4 UUID in the usual 8-4-4-4-12 hex form
pub fn generate_device_id() -> String {
    let mut bytes: [u8; 16] = rand::random();
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

pub struct SpeedSessionEngine<S: SessionSink> {
    config: EngineConfig,
    device_id: String,
    lock: LockState,
    incline: InclineEstimator,
    speed: SpeedEstimator,
    interpolator: Interpolator,
    timers: TimerEngine,
    session: SessionState,
    last_speed_log: Option<f64>,
    sink: S,
}

impl<S: SessionSink> SpeedSessionEngine<S> {
    pub fn new(config: EngineConfig, device_id: impl Into<String>, sink: S) -> Self {
        let incline = InclineEstimator::new(
            config.altitude_window,
            config.incline_threshold_deg,
            config.incline_min_baseline_km,
        );
        let speed = SpeedEstimator::new(&config);
        let interpolator = Interpolator::new(config.expected_fix_interval_secs);
        let timers = TimerEngine::new(
            config.speed_milestones.clone(),
            config.distance_milestones.clone(),
            config.moving_speed_kmh,
        );

        Self {
            config,
            device_id: device_id.into(),
            lock: LockState::Acquiring,
            incline,
            speed,
            interpolator,
            timers,
            session: SessionState::new(),
            last_speed_log: None,
            sink,
        }
    }

    /// Process one fix; `fix.timestamp` is taken as the current time.
    pub fn handle_fix(&mut self, fix: &PositionFix) -> FixOutcome {
        self.lock = evaluate_lock(fix, &self.config);
        if !self.lock.is_locked() {
            log::debug!(
                "fix at {:.3} below lock gate (accuracy {:?}, satellites {:?})",
                fix.timestamp,
                fix.accuracy,
                fix.satellites
            );
            return FixOutcome::Unlocked;
        }

        // Incline compares against the cursor before the speed estimator moves it
        if let Some(altitude) = fix.usable_altitude(self.config.max_altitude_accuracy_m) {
            self.incline.update(
                altitude,
                (fix.latitude, fix.longitude),
                self.speed.previous_position(),
            );
        }

        let outcome = match self.speed.process(fix) {
            SpeedUpdate::FirstFix => {
                self.interpolator
                    .hold(self.speed.current_speed_kmh(), fix.timestamp);
                FixOutcome::FirstFix
            }
            SpeedUpdate::Jitter {
                distance_km,
                interval_secs,
            } => {
                log::debug!(
                    "jitter: {:.4} km over {:.2}s, speed unchanged",
                    distance_km,
                    interval_secs
                );
                // The time cursor moved, so the display re-ramps from this fix
                self.interpolator.set_target(
                    self.speed.last_speed_kmh(),
                    self.speed.current_speed_kmh(),
                    fix.timestamp,
                );
                FixOutcome::Rejected(RejectReason::Jitter)
            }
            SpeedUpdate::Implausible { .. } => {
                self.interpolator
                    .hold(self.speed.current_speed_kmh(), fix.timestamp);
                FixOutcome::Rejected(RejectReason::Implausible)
            }
            SpeedUpdate::Accepted {
                speed_kmh,
                distance_km,
                ..
            } => self.accept(speed_kmh, distance_km, fix.timestamp),
        };

        if outcome != FixOutcome::Rejected(RejectReason::Jitter) {
            self.maybe_log_speed(fix.timestamp);
        }
        outcome
    }

    fn accept(&mut self, speed_kmh: f64, distance_km: f64, now: f64) -> FixOutcome {
        self.interpolator
            .set_target(self.speed.last_speed_kmh(), speed_kmh, now);
        self.session.record_sample(speed_kmh, distance_km);

        let on_downhill = self.incline.on_downhill();
        let update = self
            .timers
            .update(speed_kmh, self.session.run_distance_km, now, on_downhill);

        if update.started {
            self.session.begin(now);
        }
        if update.auto_reset {
            self.session.end_run();
        }
        if on_downhill && !update.recorded.is_empty() {
            self.session.flag_incline();
        }

        FixOutcome::Accepted {
            speed_kmh,
            recorded: update.recorded,
            auto_reset: update.auto_reset,
        }
    }

    fn maybe_log_speed(&mut self, now: f64) {
        let due = self
            .last_speed_log
            .map_or(true, |last| now - last >= self.config.speed_log_interval_secs);
        if !due {
            return;
        }
        self.last_speed_log = Some(now);

        let entry = SpeedLogEntry {
            device_id: self.device_id.clone(),
            speed: self.speed.current_speed_kmh(),
            timestamp: timestamp_to_utc(now),
        };
        if let Err(e) = self.sink.log_speed(&entry) {
            log::warn!("speed log failed: {:#}", e);
        }
    }

    /// Advance the display estimate to `now` (display cadence, no state effects)
    pub fn tick(&mut self, now: f64) -> DisplayReading {
        self.interpolator.tick(now);
        self.display()
    }

    pub fn display(&self) -> DisplayReading {
        if !self.lock.is_locked() {
            return DisplayReading::Acquiring {
                vmax_kmh: self.session.vmax_kmh,
                distance_km: self.session.run_distance_km,
            };
        }

        let interpolated = self.interpolator.latest_kmh();
        let speed_kmh = if interpolated != 0.0 {
            interpolated
        } else {
            self.speed.current_speed_kmh()
        };

        DisplayReading::Live {
            speed_kmh,
            vmax_kmh: self.session.vmax_kmh,
            distance_km: self.session.run_distance_km,
            incline_deg: self.incline.current_angle_deg(),
            on_downhill: self.incline.on_downhill(),
        }
    }

    /// Explicit user reset: persist the session if it is worth keeping, then
    /// clear every session-scoped field either way.
    pub fn reset(&mut self, now: f64) -> Option<SessionRecord> {
        let record = SessionRecord::assemble(
            &self.device_id,
            &self.session,
            self.timers.timers(),
            self.incline.on_downhill(),
            now,
            self.config.min_session_vmax_kmh,
            self.config.min_session_distance_km,
        );

        match &record {
            Some(record) => {
                log::info!(
                    "saving session: vmax {:.1} km/h, {:.3} km, {}s, {} timer(s)",
                    record.v_max,
                    record.distance,
                    record.duration,
                    record.timers.len()
                );
                if let Err(e) = self.sink.save_session(record) {
                    log::warn!("session save failed: {:#}", e);
                }
            }
            None => log::info!(
                "discarding session (vmax {:.1} km/h, {:.3} km)",
                self.session.vmax_kmh,
                self.session.session_distance_km
            ),
        }

        self.timers.reset();
        self.session.clear();
        record
    }

    pub fn state(&self) -> EngineState {
        if !self.lock.is_locked() {
            return EngineState::Acquiring;
        }
        match self.timers.state() {
            RunState::Idle => EngineState::Idle,
            RunState::Running { since } => EngineState::Running { since },
        }
    }

    pub fn lock_state(&self) -> LockState {
        self.lock
    }

    pub fn current_speed_kmh(&self) -> f64 {
        self.speed.current_speed_kmh()
    }

    pub fn last_speed_kmh(&self) -> f64 {
        self.speed.last_speed_kmh()
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn timers(&self) -> &TimerMap {
        self.timers.timers()
    }

    pub fn incline_deg(&self) -> f64 {
        self.incline.current_angle_deg()
    }

    pub fn on_downhill(&self) -> bool {
        self.incline.on_downhill()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}
