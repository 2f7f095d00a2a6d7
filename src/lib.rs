//! GPS speedometer and performance-timer core.
//!
//! Turns irregular, noisy position fixes into a plausible speed signal, smooths
//! it for a 10 Hz display, times acceleration and drag-strip milestones, and
//! flags runs recorded on a downhill slope.

pub mod config;
pub mod engine;
pub mod error;
pub mod geo;
pub mod gps_lock;
pub mod incline;
pub mod interpolation;
pub mod runtime;
pub mod session;
pub mod sink;
pub mod speed;
pub mod timers;
pub mod types;
pub mod units;

pub use config::EngineConfig;
pub use engine::{DisplayReading, EngineState, FixOutcome, RejectReason, SpeedSessionEngine};
pub use error::{Result, SpeedoError};
pub use session::{SessionRecord, SessionState};
pub use sink::{JsonLinesSink, RecordingSink, SessionSink, SpeedLogEntry};
pub use timers::{TimerEntry, TimerMap};
pub use types::{PositionFix, SpeedSample};
