//! Fixed-interval driver for the refresh coordinator.
//!
//! Cycles start on the grid `start + k * interval`. The first one runs
//! immediately; a tick that passes while a cycle is still running is
//! skipped, never queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crate::error::PipelineError;
use crate::refresh::{CycleOutcome, RefreshCoordinator};

const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Next tick to wait for after a cycle that ended `elapsed` after start.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickPlan {
    pub index: u64,
    pub skipped: u64,
}

/// Pick the next grid tick strictly after `current_tick` that has not yet
/// passed at `elapsed`. Ticks passed over are reported as skipped.
pub fn plan_next_tick(current_tick: u64, elapsed: Duration, interval: Duration) -> TickPlan {
    let interval_nanos = interval.as_nanos().max(1);
    let elapsed_nanos = elapsed.as_nanos();
    let earliest = elapsed_nanos.div_ceil(interval_nanos) as u64;
    let index = earliest.max(current_tick + 1);
    TickPlan {
        index,
        skipped: index - current_tick - 1,
    }
}

pub struct Scheduler {
    coordinator: Arc<RefreshCoordinator>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
}

pub struct SchedulerHandle {
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Request shutdown and wait for the scheduler thread.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("scheduler thread panicked"))?;
        }
        Ok(())
    }
}

impl Scheduler {
    /// `shutdown` should be the same flag the coordinator was built with, so
    /// that stopping also abandons an in-flight cycle.
    pub fn new(
        coordinator: Arc<RefreshCoordinator>,
        interval: Duration,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            coordinator,
            interval,
            shutdown,
        }
    }

    pub fn spawn(self) -> Result<SchedulerHandle> {
        if self.interval.is_zero() {
            return Err(anyhow!("refresh interval must be greater than zero"));
        }
        let shutdown = self.shutdown.clone();
        let join = std::thread::Builder::new()
            .name("refresh-scheduler".to_string())
            .spawn(move || self.run())?;
        Ok(SchedulerHandle {
            shutdown,
            join: Some(join),
        })
    }

    fn run(self) {
        let start = Instant::now();
        let mut tick = 0u64;
        log::info!("scheduler started; refreshing every {:?}", self.interval);
        while !self.stopping() {
            match self.coordinator.run_cycle() {
                Ok(CycleOutcome::Published(_)) => {}
                Ok(CycleOutcome::AlreadyRunning) => {
                    log::warn!("tick {}: a refresh is already running", tick);
                }
                Err(PipelineError::Cancelled) => break,
                Err(err) => {
                    log::warn!(
                        "tick {}: cycle aborted, previous snapshot stays current: {}",
                        tick,
                        err
                    );
                }
            }

            let plan = plan_next_tick(tick, start.elapsed(), self.interval);
            if plan.skipped > 0 {
                log::warn!(
                    "refresh overran its interval; skipping {} tick(s)",
                    plan.skipped
                );
            }
            tick = plan.index;
            let offset = self
                .interval
                .saturating_mul(u32::try_from(tick).unwrap_or(u32::MAX));
            let Some(deadline) = start.checked_add(offset) else {
                log::error!("tick {} is beyond the representable clock range", tick);
                break;
            };
            if !self.sleep_until(deadline) {
                break;
            }
        }
        log::info!("scheduler stopped");
    }

    fn stopping(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Returns false when shutdown was requested while waiting.
    fn sleep_until(&self, deadline: Instant) -> bool {
        loop {
            if self.stopping() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}
