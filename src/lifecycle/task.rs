//! Periodic background tasks.
//!
//! # Responsibilities
//! - Run one tick function on a fixed interval
//! - Guarantee at most one running instance per owner
//! - Stop on an explicit stop call or on the process-wide shutdown signal
//! - Make `stop` wait until the task has exited
//!
//! # Design Decisions
//! - The first tick fires immediately after start
//! - A tick in progress finishes before the stop signal is observed
//! - Missed ticks are delayed, never burst
//! - A zero period is clamped to [`MIN_PERIOD`] instead of killing the loop

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// Shortest period a task runs at; shorter requests are raised to it.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

struct Running {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Owner of one periodic background task.
pub struct PeriodicTask {
    name: &'static str,
    running: Mutex<Option<Running>>,
}

impl PeriodicTask {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            running: Mutex::new(None),
        }
    }

    /// Spawn the loop. Returns `false` if it is already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<F, Fut>(
        &self,
        period: Duration,
        mut shutdown: broadcast::Receiver<()>,
        mut tick: F,
    ) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut running = self.running.lock().expect("task slot lock poisoned");
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            tracing::debug!(task = self.name, "Already running, start ignored");
            return false;
        }

        let period = if period < MIN_PERIOD {
            tracing::warn!(task = self.name, period_ms = period.as_millis() as u64, "Period below minimum, clamped");
            MIN_PERIOD
        } else {
            period
        };

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let name = self.name;
        let handle = tokio::spawn(async move {
            tracing::info!(task = name, period_ms = period.as_millis() as u64, "Background task starting");
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => tick().await,
                    _ = &mut stop_rx => {
                        tracing::info!(task = name, "Background task received stop signal, exiting loop");
                        break;
                    }
                    _ = shutdown.recv() => {
                        tracing::info!(task = name, "Background task received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        });

        *running = Some(Running { stop_tx, handle });
        true
    }

    /// Signal the loop and wait for it to exit. No-op when not running.
    pub async fn stop(&self) {
        let running = self.running.lock().expect("task slot lock poisoned").take();
        let Some(Running { stop_tx, handle }) = running else {
            return;
        };

        let _ = stop_tx.send(());
        if let Err(e) = handle.await {
            tracing::error!(task = self.name, error = %e, "Background task ended abnormally");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .expect("task slot lock poisoned")
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        if let Ok(slot) = self.running.get_mut() {
            if let Some(running) = slot.take() {
                running.handle.abort();
            }
        }
    }
}

/// Run a notification off the caller's path.
///
/// Uses the blocking pool of the current Tokio runtime when there is one,
/// a plain thread otherwise, so synchronous callers can notify too.
pub fn notify_detached<F>(f: F)
where
    F: FnOnce() + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(f);
        }
        Err(_) => {
            std::thread::spawn(f);
        }
    }
}
