//! Fixed-interval background loop shared by the runner and the command
//! scheduler.
//!
//! Each [`Scheduler`] owns one named thread. The thread runs its tick
//! closure, then waits for the remainder of the interval on a stop
//! channel, so [`Scheduler::shutdown`] wakes it immediately instead of
//! waiting out the sleep. A tick closure returning `Err` is fatal: the
//! loop logs it, raises the `halted` flag, and exits.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender};

use crate::config::ConfigError;

/// What a stopped scheduler did while it ran.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    /// Completed ticks.
    pub ticks: u64,
    /// Whether the thread was joined cleanly.
    pub joined: bool,
    /// Whether a fatal error stopped the loop before shutdown.
    pub halted: bool,
}

/// A running periodic loop.
pub struct Scheduler {
    name: &'static str,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    ticks: Arc<AtomicU64>,
    halted: Arc<AtomicBool>,
}

impl Scheduler {
    /// Spawn a thread called `name` that calls `tick` every `interval`.
    pub fn spawn<F, E>(
        name: &'static str,
        interval: Duration,
        mut tick: F,
    ) -> Result<Self, ConfigError>
    where
        F: FnMut() -> Result<(), E> + Send + 'static,
        E: fmt::Display,
    {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let ticks = Arc::new(AtomicU64::new(0));
        let halted = Arc::new(AtomicBool::new(false));

        let thread_ticks = Arc::clone(&ticks);
        let thread_halted = Arc::clone(&halted);
        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                tracing::info!(
                    scheduler = name,
                    interval_ms = interval.as_millis() as u64,
                    "scheduler started"
                );
                loop {
                    let started = Instant::now();
                    if let Err(e) = tick() {
                        tracing::error!(
                            scheduler = name,
                            error = %e,
                            "fatal tick error; scheduler halted"
                        );
                        thread_halted.store(true, Ordering::Release);
                        break;
                    }
                    let n = thread_ticks.fetch_add(1, Ordering::AcqRel) + 1;
                    tracing::trace!(
                        scheduler = name,
                        tick = n,
                        elapsed_us = started.elapsed().as_micros() as u64,
                        "tick complete"
                    );

                    let remaining = interval.saturating_sub(started.elapsed());
                    match stop_rx.recv_timeout(remaining) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::info!(
                    scheduler = name,
                    ticks = thread_ticks.load(Ordering::Acquire),
                    "scheduler stopped"
                );
            })
            .map_err(|e| ConfigError::ThreadSpawnFailed {
                reason: format!("{name}: {e}"),
            })?;

        Ok(Self {
            name,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
            ticks,
            halted,
        })
    }

    /// Thread name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Ticks completed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// True if a fatal error stopped the loop.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Signal the loop to stop and join it. An in-progress tick runs to
    /// completion first. Calling this twice is harmless.
    pub fn shutdown(&mut self) -> SchedulerReport {
        if let Some(tx) = self.stop_tx.take() {
            // The loop may already have exited after a fatal error.
            let _ = tx.try_send(());
        }
        let joined = match self.handle.take() {
            Some(handle) => handle.join().is_ok(),
            None => true,
        };
        SchedulerReport {
            ticks: self.ticks(),
            joined,
            halted: self.is_halted(),
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("name", &self.name)
            .field("ticks", &self.ticks())
            .field("halted", &self.is_halted())
            .finish()
    }
}
