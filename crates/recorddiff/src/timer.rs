//! Elapsed-time instrumentation for pairs and runs.

use std::time::{Duration, Instant};

use tracing::info;

const ONE_MINUTE: u64 = 60;
const ONE_HOUR: u64 = ONE_MINUTE * 60;
const ONE_DAY: u64 = ONE_HOUR * 24;

/// A simple timer with the ability to measure a "lap" per table pair.
///
/// ```
/// use recorddiff::timer::LapTimer;
///
/// let mut timer = LapTimer::start();
/// for _ in 0..3 {
///     timer.start_lap();
///     // process one pair
///     timer.end_lap();
/// }
/// timer.end();
/// ```
#[derive(Debug)]
pub struct LapTimer {
    start: Instant,
    lap_start: Option<Instant>,
}

impl LapTimer {
    /// Start the overall timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            lap_start: None,
        }
    }

    /// Begin recording a new lap.
    pub fn start_lap(&mut self) {
        self.lap_start = Some(Instant::now());
    }

    /// End the most recent lap, logging and returning its elapsed time.
    ///
    /// Falls back to the overall start when no lap was started.
    pub fn end_lap(&mut self) -> Duration {
        let lap_start = self.lap_start.take().unwrap_or(self.start);
        let elapsed = lap_start.elapsed();
        info!("Lap elapsed time: {}", format_elapsed(elapsed));
        elapsed
    }

    /// End the timer, logging and returning the total elapsed time.
    pub fn end(&self) -> Duration {
        let elapsed = self.start.elapsed();
        info!("Timer elapsed time: {}", format_elapsed(elapsed));
        elapsed
    }
}

/// Format a duration as days/hours/minutes/seconds, largest nonzero unit
/// first.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let days = total / ONE_DAY;
    let hours = (total % ONE_DAY) / ONE_HOUR;
    let minutes = (total % ONE_HOUR) / ONE_MINUTE;
    let seconds = total % ONE_MINUTE;

    if days > 0 {
        format!(
            "{} day(s), {} hour(s), {} minute(s) and {} second(s)",
            days, hours, minutes, seconds
        )
    } else if hours > 0 {
        format!(
            "{} hour(s), {} minute(s) and {} second(s)",
            hours, minutes, seconds
        )
    } else if minutes > 0 {
        format!("{} minute(s) and {} second(s)", minutes, seconds)
    } else {
        format!("{} second(s)", seconds)
    }
}
