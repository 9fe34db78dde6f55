use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use super::cycle::IngestionCycle;
use crate::config::ConfigError;

/// Totals for one scheduler run. A tick cancelled by shutdown is not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerSummary {
    pub ticks: u64,
    pub failed_ticks: u64,
    pub inserted: u64,
}

/// Drives an [`IngestionCycle`] at a fixed period until told to stop.
pub struct Scheduler {
    interval: Duration,
    cycle: IngestionCycle,
}

impl Scheduler {
    pub fn new(interval: Duration, cycle: IngestionCycle) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::InvalidInterval(
                "interval must be greater than zero".to_string(),
            ));
        }
        Ok(Self { interval, cycle })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run ticks until `shutdown` becomes `true` or its sender is dropped.
    ///
    /// The first tick fires immediately. At most one tick is in flight; when a
    /// tick overruns the interval the next one starts right after it and the
    /// missed periods are not replayed. Stopping mid-tick drops the tick
    /// future, abandoning its pending HTTP and database work.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> SchedulerSummary {
        tracing::info!(interval = ?self.interval, "Collecting feeds");

        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut summary = SchedulerSummary::default();
        let mut failure_streak: u32 = 0;

        loop {
            tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => break,
                _ = timer.tick() => {}
            }

            let outcome = tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => {
                    tracing::info!("Shutdown requested, abandoning in-flight tick");
                    break;
                }
                outcome = self.cycle.run_once(Utc::now()) => outcome,
            };

            summary.ticks += 1;
            match outcome {
                Ok(report) => {
                    if failure_streak > 0 {
                        tracing::info!(failed_ticks = failure_streak, "Ingestion recovered");
                    }
                    failure_streak = 0;
                    summary.inserted += report.inserted as u64;
                }
                Err(e) => {
                    failure_streak += 1;
                    summary.failed_ticks += 1;
                    if failure_streak > 1 {
                        tracing::error!(
                            error = %e,
                            consecutive = failure_streak,
                            "Ingestion tick failed repeatedly"
                        );
                    } else {
                        tracing::warn!(error = %e, "Ingestion tick failed");
                    }
                }
            }
        }

        tracing::info!(
            ticks = summary.ticks,
            failed_ticks = summary.failed_ticks,
            inserted = summary.inserted,
            "Scheduler stopped"
        );
        summary
    }
}

/// Resolves once a stop is requested. A dropped sender counts as a stop.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
