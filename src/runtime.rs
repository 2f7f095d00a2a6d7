use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};

use crate::engine::{DisplayReading, SpeedSessionEngine};
use crate::sink::SessionSink;
use crate::types::PositionFix;

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Own `engine` until the fix stream closes or shutdown is signalled.
///
/// Fixes are handled one at a time in arrival order; between them the display
/// ticks at the configured period using the wall clock. Every fix and tick
/// publishes the latest reading on `display`. Dropping the shutdown sender
/// counts as a shutdown.
pub async fn drive<S: SessionSink>(
    engine: SpeedSessionEngine<S>,
    fixes: mpsc::Receiver<PositionFix>,
    display: watch::Sender<DisplayReading>,
    shutdown: watch::Receiver<bool>,
) -> SpeedSessionEngine<S> {
    drive_with_clock(engine, fixes, display, shutdown, current_timestamp).await
}

/// `drive` with an injectable clock for the display ticks
pub async fn drive_with_clock<S, C>(
    mut engine: SpeedSessionEngine<S>,
    mut fixes: mpsc::Receiver<PositionFix>,
    display: watch::Sender<DisplayReading>,
    mut shutdown: watch::Receiver<bool>,
    mut clock: C,
) -> SpeedSessionEngine<S>
where
    S: SessionSink,
    C: FnMut() -> f64,
{
    let mut ticker = interval(engine.config().tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut fix_count = 0u64;
    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    log::info!("shutdown requested after {} fixes", fix_count);
                    break;
                }
            }
            fix = fixes.recv() => match fix {
                Some(fix) => {
                    fix_count += 1;
                    let outcome = engine.handle_fix(&fix);
                    log::trace!("fix {} -> {:?}", fix_count, outcome);
                    display.send_replace(engine.display());
                }
                None => {
                    log::info!("position watch closed after {} fixes", fix_count);
                    break;
                }
            },
            _ = ticker.tick() => {
                display.send_replace(engine.tick(clock()));
            }
        }
    }

    engine
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::geo::EARTH_RADIUS_KM;
    use crate::sink::RecordingSink;
    use approx::assert_abs_diff_eq;

    fn fix(t: f64, north_km: f64) -> PositionFix {
        let lat = (north_km / EARTH_RADIUS_KM).to_degrees();
        PositionFix::new(t, lat, 0.0).with_accuracy(4.0)
    }

    fn channels() -> (
        watch::Sender<DisplayReading>,
        watch::Receiver<DisplayReading>,
    ) {
        watch::channel(DisplayReading::Acquiring {
            vmax_kmh: 0.0,
            distance_km: 0.0,
        })
    }

    #[tokio::test]
    async fn test_drive_handles_fixes_in_order() {
        let engine = SpeedSessionEngine::new(EngineConfig::default(), "rt", RecordingSink::new());
        let (fix_tx, fix_rx) = mpsc::channel(16);
        let (display_tx, display_rx) = channels();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        for (i, km) in [0.0, 0.02, 0.04, 0.05].iter().enumerate() {
            fix_tx.send(fix(i as f64, *km)).await.unwrap();
        }
        drop(fix_tx);

        let engine = drive_with_clock(engine, fix_rx, display_tx, shutdown_rx, || 3.0).await;

        assert_abs_diff_eq!(engine.session().vmax_kmh, 72.0, epsilon = 1e-6);
        assert_abs_diff_eq!(engine.current_speed_kmh(), 36.0, epsilon = 1e-6);
        assert!(matches!(*display_rx.borrow(), DisplayReading::Live { .. }));

        // Four fixes a second apart: the first one is logged, the rest are throttled
        let sink = engine.into_sink();
        assert_eq!(sink.speed_logs.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_driver() {
        let engine = SpeedSessionEngine::new(EngineConfig::default(), "rt", RecordingSink::new());
        let (_fix_tx, fix_rx) = mpsc::channel::<PositionFix>(4);
        let (display_tx, _display_rx) = channels();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(drive(engine, fix_rx, display_tx, shutdown_rx));
        shutdown_tx.send(true).unwrap();

        let engine = handle.await.unwrap();
        assert_eq!(engine.session().vmax_kmh, 0.0);
    }
}
