//! Periodic metrics flush

use crate::{metrics::MetricsAggregator, transport::TelemetrySink, Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

struct RunningTimer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    period: Duration,
}

impl RunningTimer {
    fn cancel(self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

/// Re-armable timer driving [`MetricsAggregator::flush_and_report`].
///
/// At most one timer is armed at a time; `start` on a running scheduler cancels the
/// previous timer before arming the new one.
pub struct MetricsScheduler {
    aggregator: Arc<MetricsAggregator>,
    sink: Arc<dyn TelemetrySink>,
    running: Mutex<Option<RunningTimer>>,
}

impl MetricsScheduler {
    pub fn new(aggregator: Arc<MetricsAggregator>, sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            aggregator,
            sink,
            running: Mutex::new(None),
        }
    }

    /// Arm the timer; the first flush happens one full `period` from now
    pub fn start(&self, period: Duration) -> Result<()> {
        if period.is_zero() {
            return Err(Error::Config {
                message: "Flush period must be greater than zero".to_string(),
            });
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| Error::System {
            message: format!("Metrics scheduler needs a Tokio runtime: {}", e),
        })?;

        let mut running = self.running.lock();
        if let Some(previous) = running.take() {
            debug!(
                telemetry.event = "scheduler_rearmed",
                previous_period_ms = previous.period.as_millis() as u64,
                "Cancelling previous flush timer"
            );
            previous.cancel();
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let aggregator = Arc::clone(&self.aggregator);
        let sink = Arc::clone(&self.sink);

        let handle = runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => aggregator.flush_and_report(sink.as_ref()),
                }
            }
        });

        *running = Some(RunningTimer {
            cancel,
            handle,
            period,
        });

        info!(
            telemetry.event = "scheduler_started",
            period_ms = period.as_millis() as u64,
            "Metrics flush scheduled"
        );

        Ok(())
    }

    /// Disarm the timer; a no-op when not running
    pub fn stop(&self) {
        if let Some(timer) = self.running.lock().take() {
            timer.cancel();
            info!(telemetry.event = "scheduler_stopped", "Metrics flush stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .map(|timer| !timer.handle.is_finished())
            .unwrap_or(false)
    }

    pub fn period(&self) -> Option<Duration> {
        self.running.lock().as_ref().map(|timer| timer.period)
    }
}

impl Drop for MetricsScheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.running.get_mut().take() {
            timer.cancel();
        }
    }
}
