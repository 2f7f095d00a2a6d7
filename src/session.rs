use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::timers::{TimerEntry, TimerMap};

/// Session-scoped accumulators.
///
/// `run_distance_km` belongs to the current timed run and is zeroed whenever the
/// timers auto-reset; `session_distance_km` keeps counting until an explicit
/// reset and is what gates persistence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub start: Option<f64>,
    pub vmax_kmh: f64,
    pub run_distance_km: f64,
    pub session_distance_km: f64,
    /// Sticky: set once any milestone of this session was recorded on a downhill
    pub incline_flagged: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the session start if none is set yet
    pub fn begin(&mut self, now: f64) {
        if self.start.is_none() {
            log::info!("session started at {:.3}", now);
            self.start = Some(now);
        }
    }

    /// Account for one accepted speed sample
    pub fn record_sample(&mut self, speed_kmh: f64, distance_km: f64) {
        self.vmax_kmh = self.vmax_kmh.max(speed_kmh);
        self.run_distance_km += distance_km;
        self.session_distance_km += distance_km;
    }

    pub fn end_run(&mut self) {
        self.run_distance_km = 0.0;
    }

    pub fn flag_incline(&mut self) {
        self.incline_flagged = true;
    }

    pub fn is_active(&self) -> bool {
        self.start.is_some()
    }

    /// Whether the session holds enough movement to be worth keeping
    pub fn qualifies(&self, min_vmax_kmh: f64, min_distance_km: f64) -> bool {
        self.start.is_some()
            && self.vmax_kmh > min_vmax_kmh
            && self.session_distance_km > min_distance_km
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Finished session handed to the persistence collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub device_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub v_max: f64,
    /// Kilometers across every run since the last explicit reset
    pub distance: f64,
    /// Whole seconds from session start to end
    pub duration: u64,
    pub timers: TimerMap,
    pub on_incline: bool,
}

impl SessionRecord {
    /// Build a record from `state`, or `None` when the session falls below the
    /// persistence gates.
    pub fn assemble(
        device_id: &str,
        state: &SessionState,
        timers: &TimerMap,
        on_downhill: bool,
        now: f64,
        min_vmax_kmh: f64,
        min_distance_km: f64,
    ) -> Option<Self> {
        if !state.qualifies(min_vmax_kmh, min_distance_km) {
            return None;
        }
        let start = state.start?;
        let on_incline = state.incline_flagged || timers.values().any(|t| t.invalid) || on_downhill;

        Some(Self {
            device_id: device_id.to_string(),
            start_time: timestamp_to_utc(start),
            end_time: timestamp_to_utc(now),
            v_max: state.vmax_kmh,
            distance: state.session_distance_km,
            duration: (now - start).max(0.0).floor() as u64,
            timers: timers.clone(),
            on_incline,
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Read back one stored session line
    pub fn from_json(raw: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(raw.trim())?)
    }
}

/// Seconds since the Unix epoch to a UTC timestamp (epoch on overflow)
pub fn timestamp_to_utc(secs: f64) -> DateTime<Utc> {
    if !secs.is_finite() {
        return DateTime::<Utc>::default();
    }
    DateTime::<Utc>::from_timestamp_millis((secs * 1000.0).round() as i64).unwrap_or_default()
}

/// Timer values as they may come back from storage, newest shape first
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredTimer {
    Entry(TimerEntry),
    Legacy {
        time: String,
        #[serde(default)]
        invalid: bool,
    },
    Text(String),
}

impl StoredTimer {
    fn into_entry(self) -> Option<TimerEntry> {
        match self {
            StoredTimer::Entry(entry) => Some(entry),
            StoredTimer::Legacy { time, invalid } => parse_time_text(&time, invalid),
            StoredTimer::Text(time) => parse_time_text(&time, false),
        }
    }
}

/// Parse "4.21s" or "12.80s @ 168.3 km/h"
fn parse_time_text(text: &str, invalid: bool) -> Option<TimerEntry> {
    let (time_part, speed_part) = match text.split_once('@') {
        Some((time, speed)) => (time, Some(speed)),
        None => (text, None),
    };
    let elapsed_seconds = leading_number(time_part)?;
    let speed_at_mark = speed_part.and_then(leading_number);

    Some(TimerEntry {
        elapsed_seconds,
        speed_at_mark,
        invalid,
    })
}

fn leading_number(text: &str) -> Option<f64> {
    let trimmed = text.trim_start();
    let end = trimmed
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && (*c == '-' || *c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    trimmed[..end].parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Read back a stored timer map.
///
/// Storage may hold any past shape of the map, or garbage. Unparsable input
/// yields an empty map and unparsable entries are dropped.
pub fn parse_stored_timers(raw: &str) -> TimerMap {
    let values: BTreeMap<String, Value> = match serde_json::from_str::<Option<_>>(raw) {
        Ok(Some(values)) => values,
        Ok(None) => return TimerMap::new(),
        Err(e) => {
            log::warn!("ignoring malformed stored timers: {}", e);
            return TimerMap::new();
        }
    };

    values
        .into_iter()
        .filter_map(|(name, value)| {
            let entry = serde_json::from_value::<StoredTimer>(value)
                .ok()
                .and_then(StoredTimer::into_entry);
            if entry.is_none() {
                log::debug!("skipping unreadable timer '{}'", name);
            }
            entry.map(|e| (name, e))
        })
        .collect()
}

/// Best (lowest) time per milestone across stored sessions
pub fn best_times<'a, I>(stored: I) -> BTreeMap<String, f64>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: BTreeMap<String, f64> = BTreeMap::new();
    for raw in stored {
        for (name, entry) in parse_stored_timers(raw) {
            best.entry(name)
                .and_modify(|t| *t = t.min(entry.elapsed_seconds))
                .or_insert(entry.elapsed_seconds);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn state(vmax: f64, distance: f64) -> SessionState {
        SessionState {
            start: Some(1_700_000_000.0),
            vmax_kmh: vmax,
            run_distance_km: distance,
            session_distance_km: distance,
            incline_flagged: false,
        }
    }

    /// Assemble with the default gates (vMax > 5 km/h, distance > 0.1 km)
    fn assemble(
        s: &SessionState,
        timers: &TimerMap,
        on_downhill: bool,
        now: f64,
    ) -> Option<SessionRecord> {
        SessionRecord::assemble("dev", s, timers, on_downhill, now, 5.0, 0.1)
    }

    fn entry(secs: f64, invalid: bool) -> TimerEntry {
        TimerEntry {
            elapsed_seconds: secs,
            speed_at_mark: None,
            invalid,
        }
    }

    #[test]
    fn test_below_thresholds_not_assembled() {
        let s = state(4.0, 0.05);
        assert!(assemble(&s, &TimerMap::new(), false, 1_700_000_060.0).is_none());

        // Each gate is strict
        let s = state(5.0, 0.5);
        assert!(!s.qualifies(5.0, 0.1));
        let s = state(50.0, 0.1);
        assert!(!s.qualifies(5.0, 0.1));
    }

    #[test]
    fn test_no_start_not_assembled() {
        let mut s = state(120.0, 2.0);
        s.start = None;
        assert!(!s.is_active());
        assert!(assemble(&s, &TimerMap::new(), false, 10.0).is_none());
    }

    #[test]
    fn test_invalid_timer_sets_on_incline() {
        let s = state(120.0, 0.5);
        let mut timers = TimerMap::new();
        timers.insert("0-100kmh".to_string(), entry(6.1, true));
        timers.insert("1/8 mile".to_string(), entry(9.0, false));

        let record = assemble(&s, &timers, false, 1_700_000_095.7).unwrap();
        assert!(record.on_incline);
        assert_eq!(record.duration, 95);
        assert_eq!(record.v_max, 120.0);
        assert_eq!(record.distance, 0.5);
        assert_eq!(record.timers.len(), 2);
    }

    #[test]
    fn test_on_incline_from_current_downhill_or_sticky_flag() {
        let mut s = state(120.0, 0.5);
        let record = assemble(&s, &TimerMap::new(), true, 1_700_000_010.0).unwrap();
        assert!(record.on_incline);

        s.flag_incline();
        let record = assemble(&s, &TimerMap::new(), false, 1_700_000_010.0).unwrap();
        assert!(record.on_incline);
    }

    #[test]
    fn test_record_json_shape() {
        let s = state(88.0, 1.2);
        let record = assemble(&s, &TimerMap::new(), false, 1_700_000_030.0).unwrap();
        let json: Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();
        assert_eq!(json["deviceId"], "dev");
        assert_eq!(json["vMax"], 88.0);
        assert_eq!(json["duration"], 30);
        assert_eq!(json["onIncline"], false);
        assert!(json["startTime"].as_str().unwrap().starts_with("2023-11-14T22:13:20"));
    }

    #[test]
    fn test_record_read_back() {
        let s = state(88.0, 1.2);
        let record = assemble(&s, &TimerMap::new(), true, 1_700_000_030.0).unwrap();
        let line = format!("{}\n", record.to_json().unwrap());

        let restored = SessionRecord::from_json(&line).unwrap();
        assert_eq!(restored.device_id, "dev");
        assert_eq!(restored.duration, 30);
        assert!(restored.on_incline);

        let err = SessionRecord::from_json("{\"deviceId\": 3}").unwrap_err();
        assert!(matches!(err, crate::error::SpeedoError::Parse(_)));
    }

    #[test]
    fn test_gate_uses_session_distance() {
        let mut s = state(60.0, 0.2);
        s.end_run();
        s.record_sample(30.0, 0.04);
        assert!(s.is_active());
        assert!(s.run_distance_km < 0.1);
        assert!(s.qualifies(5.0, 0.1));

        let record = assemble(&s, &TimerMap::new(), false, 1_700_000_040.0).unwrap();
        assert_abs_diff_eq!(record.distance, 0.24, epsilon = 1e-12);
    }

    #[test]
    fn test_run_and_session_distance_diverge() {
        let mut s = SessionState::new();
        s.begin(0.0);
        s.record_sample(50.0, 0.3);
        s.end_run();
        s.record_sample(40.0, 0.2);
        assert_abs_diff_eq!(s.run_distance_km, 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(s.session_distance_km, 0.5, epsilon = 1e-12);
        assert_eq!(s.vmax_kmh, 50.0);

        s.begin(99.0);
        assert_eq!(s.start, Some(0.0));
    }

    #[test]
    fn test_parse_current_and_legacy_timers() {
        let raw = r#"{
            "0-60": {"elapsedSeconds": 4.2, "invalid": true},
            "1/4 mile": {"time": "12.80s @ 168.3 km/h", "invalid": false},
            "0-100kmh": "5.10s",
            "broken": {"time": "n/a"},
            "weird": 42
        }"#;
        let timers = parse_stored_timers(raw);
        assert_eq!(timers.len(), 3);
        assert!(timers["0-60"].invalid);
        assert_eq!(timers["1/4 mile"].elapsed_seconds, 12.8);
        assert_eq!(timers["1/4 mile"].speed_at_mark, Some(168.3));
        assert_eq!(timers["0-100kmh"].elapsed_seconds, 5.1);
    }

    #[test]
    fn test_malformed_timers_yield_empty() {
        assert!(parse_stored_timers("{not json").is_empty());
        assert!(parse_stored_timers("null").is_empty());
        assert!(parse_stored_timers("[1, 2]").is_empty());
        assert!(parse_stored_timers("").is_empty());
    }

    #[test]
    fn test_best_times_skip_bad_sessions() {
        let sessions = [
            r#"{"0-60": {"elapsedSeconds": 4.8}}"#,
            "garbage",
            r#"{"0-60": {"time": "4.35s"}, "1/4 mile": "13.10s @ 160.0 km/h"}"#,
        ];
        let best = best_times(sessions.iter().copied());
        assert_eq!(best["0-60"], 4.35);
        assert_eq!(best["1/4 mile"], 13.1);
    }
}
