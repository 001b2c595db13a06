//! Periodic ingestion trigger.
//!
//! Spawns a background thread that invokes the batch entry point every
//! `schedule_interval_secs`, counting from the persisted last-run marker so a
//! restart does not trigger an early run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;

use crate::config::IngestConfig;
use crate::pipeline::ingest::{run_batch, IngestError};
use crate::store::{LabRecordStore, SqliteLabStore};

/// Sleep granularity for shutdown responsiveness.
const SLEEP_GRANULARITY: Duration = Duration::from_millis(500);

/// Handle for the scheduler thread. Dropping it stops the thread after the
/// current run (if any) completes.
pub struct SchedulerHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Request shutdown. No new run starts after this.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Block until the scheduler thread exits.
    pub fn join(mut self) {
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

/// Start the periodic trigger on its own thread with its own store connection.
pub fn start_scheduler(config: IngestConfig) -> SchedulerHandle {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();

    let handle = std::thread::spawn(move || {
        tracing::info!(
            interval_secs = config.schedule_interval_secs,
            "Ingestion scheduler started"
        );
        match SqliteLabStore::open(&config.database_path) {
            Ok(store) => scheduler_loop(&store, &config, &flag),
            Err(e) => tracing::error!(error = %e, "Scheduler could not open the record store"),
        }
        tracing::info!("Ingestion scheduler shutting down");
    });

    SchedulerHandle {
        shutdown,
        handle: Some(handle),
    }
}

fn scheduler_loop(store: &dyn LabRecordStore, config: &IngestConfig, shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::Relaxed) {
        let last_run = store.last_run().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Could not read last-run marker");
            None
        });
        let delay = next_run_delay(
            last_run,
            chrono::Local::now().naive_local(),
            config.schedule_interval_secs,
        );

        if !sleep_unless_shutdown(delay, shutdown) {
            return;
        }

        match run_batch(store, config) {
            Ok(summary) => tracing::debug!(found = summary.found, "Scheduled run complete"),
            Err(IngestError::RunInProgress) => {
                tracing::info!("Scheduled run skipped: another run is in progress");
                // Wait a full interval before retrying.
                if !sleep_unless_shutdown(interval(config.schedule_interval_secs), shutdown) {
                    return;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Scheduled run failed");
                if !sleep_unless_shutdown(interval(config.schedule_interval_secs), shutdown) {
                    return;
                }
            }
        }
    }
}

fn interval(secs: u64) -> Duration {
    Duration::from_secs(secs)
}

/// Sleep in small increments. Returns false if shutdown was requested.
fn sleep_unless_shutdown(total: Duration, shutdown: &AtomicBool) -> bool {
    let mut remaining = total;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        if remaining.is_zero() {
            return true;
        }
        let step = remaining.min(SLEEP_GRANULARITY);
        std::thread::sleep(step);
        remaining -= step;
    }
}

/// Time left until the next periodic run. Zero when no run happened yet or one is overdue.
pub fn next_run_delay(
    last_run: Option<NaiveDateTime>,
    now: NaiveDateTime,
    interval_secs: u64,
) -> Duration {
    let Some(last) = last_run else {
        return Duration::ZERO;
    };
    let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
    interval(interval_secs).saturating_sub(elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn first_run_is_immediate() {
        let now = chrono::Local::now().naive_local();
        assert_eq!(next_run_delay(None, now, 3600), Duration::ZERO);
    }

    #[test]
    fn delay_counts_down_from_last_run() {
        let now = chrono::Local::now().naive_local();
        let delay = next_run_delay(Some(now - chrono::Duration::seconds(600)), now, 3600);
        assert_eq!(delay.as_secs(), 3000);
    }

    #[test]
    fn overdue_run_is_immediate() {
        let now = chrono::Local::now().naive_local();
        let delay = next_run_delay(Some(now - chrono::Duration::seconds(7200)), now, 3600);
        assert_eq!(delay, Duration::ZERO);
    }

    #[test]
    fn clock_skew_waits_full_interval() {
        let now = chrono::Local::now().naive_local();
        let delay = next_run_delay(Some(now + chrono::Duration::seconds(60)), now, 3600);
        assert_eq!(delay.as_secs(), 3600);
    }

    #[test]
    fn sleep_stops_on_shutdown() {
        let flag = AtomicBool::new(true);
        assert!(!sleep_unless_shutdown(Duration::from_secs(60), &flag));
    }

    #[test]
    fn scheduler_runs_then_shuts_down() {
        let root = tempfile::tempdir().unwrap();
        let config = IngestConfig::with_root(root.path());
        std::fs::create_dir_all(&config.watch_dir).unwrap();
        std::fs::write(config.watch_dir.join("a.json"), br#"{"valores": {"h2_1": 3}}"#).unwrap();

        let handle = start_scheduler(config.clone());

        let deadline = Instant::now() + Duration::from_secs(10);
        while !config.processed_dir().join("a.json").exists() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
        }
        assert!(config.processed_dir().join("a.json").exists());

        let started = Instant::now();
        drop(handle);
        assert!(started.elapsed() < Duration::from_secs(5));

        let store = SqliteLabStore::open(&config.database_path).unwrap();
        assert!(store.last_run().unwrap().is_some());
    }
}
