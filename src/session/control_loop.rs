use std::thread;
use std::time::{Duration, Instant};

use chrono::Local;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::controller::{CollectorError, InputProcessor, InputSource};
use crate::dispatch::CommandDispatcher;
use crate::notify::{ControllerStatus, Notification, Notifier};
use crate::state::AxisTable;

// Stats are logged at this cadence
const STATS_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("No controller found: {0}")]
    NoController(#[source] CollectorError),

    #[error("Input failed: {0}")]
    Input(#[from] CollectorError),
}

/// Counters reported when the loop ends
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ControlStats {
    pub ticks: u64,
    pub lines_written: u64,
    pub overruns: u64,
}

/// Fixed-interval tick loop: poll input, resolve intent, dispatch commands
pub struct ControlLoop<I: InputSource> {
    input: I,
    processor: InputProcessor,
    table: AxisTable,
    dispatcher: CommandDispatcher,
    interval: Duration,
    cancel: CancellationToken,
    stats: ControlStats,
}

impl<I: InputSource> ControlLoop<I> {
    pub fn new(
        input: I,
        processor: InputProcessor,
        table: AxisTable,
        dispatcher: CommandDispatcher,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            input,
            processor,
            table,
            dispatcher,
            interval,
            cancel,
            stats: ControlStats::default(),
        }
    }

    pub fn stats(&self) -> ControlStats {
        self.stats
    }

    /// One control cycle at time `now`, returns the lines written
    pub fn tick(&mut self, now: Instant) -> Result<usize, ControlError> {
        let frame = self.input.poll()?;
        let intent = self.processor.process(&frame, now, &mut self.table);
        let written = self.dispatcher.dispatch(&mut self.table, &intent, now);

        self.stats.ticks += 1;
        self.stats.lines_written += written as u64;
        Ok(written)
    }

    /// Ticks until cancelled, then stops every moving axis
    pub fn run(mut self) -> Result<ControlStats, ControlError> {
        info!(
            "Control loop started for {} at {}ms interval",
            self.input.name(),
            self.interval.as_millis()
        );
        let mut next_tick = Instant::now();
        let mut last_stats = Instant::now();

        while !self.cancel.is_cancelled() {
            let now = Instant::now();
            if let Err(e) = self.tick(now) {
                error!("Control loop stopped: {}", e);
                self.dispatcher.park();
                return Err(e);
            }

            if now.duration_since(last_stats) >= STATS_INTERVAL {
                info!(
                    "Control stats at {}: {} ticks, {} lines written, {} overruns",
                    Local::now().format("%H:%M:%S"),
                    self.stats.ticks,
                    self.stats.lines_written,
                    self.stats.overruns
                );
                last_stats = now;
            }

            next_tick += self.interval;
            let after = Instant::now();
            if next_tick > after {
                thread::sleep(next_tick - after);
            } else {
                // Fell behind, restart the schedule instead of bursting
                self.stats.overruns += 1;
                debug!("Control tick overran by {:?}", after - next_tick);
                next_tick = after;
            }
        }

        self.dispatcher.park();
        info!("Control loop stopped after {} ticks", self.stats.ticks);
        Ok(self.stats)
    }
}

/// Builds the input source inside the control thread and runs the loop
///
/// A missing controller is reported once and ends the control flow; the
/// telemetry flow is unaffected.
pub fn run_control_flow<I, F>(
    make_input: F,
    build: impl FnOnce(I) -> ControlLoop<I>,
    notifier: &Notifier,
) -> Result<ControlStats, ControlError>
where
    I: InputSource,
    F: FnOnce() -> Result<I, CollectorError>,
{
    let input = match make_input() {
        Ok(input) => input,
        Err(e) => {
            error!("No controller available: {}", e);
            notifier.send(Notification::ControllerStatus(ControllerStatus::NotFound));
            notifier.error(format!("No controller found: {}", e));
            return Err(ControlError::NoController(e));
        }
    };

    let name = input.name();
    info!("Controller ready: {}", name);
    notifier.send(Notification::ControllerStatus(ControllerStatus::Connected {
        name,
    }));

    build(input).run()
}
