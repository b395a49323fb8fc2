//! ---
//! evc_section: "01-core-functionality"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Runtime helpers pacing the control loop."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Async rate limiter giving the control loop a fixed tick period.
///
/// Missed ticks are delayed rather than bursted, so a step that blocks for
/// the finish-startup indication does not cause a catch-up storm.
#[derive(Debug)]
pub struct RateLimiter {
    interval: tokio::time::Interval,
    period: Duration,
}

impl RateLimiter {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval, period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub async fn tick(&mut self) -> Instant {
        self.interval.tick().await
    }
}

/// Why [`drive_blocking`] returned without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveExit {
    /// A shutdown signal arrived (or every sender was dropped).
    Shutdown,
    /// The configured tick budget was used up.
    TickLimit,
}

/// Run `step` once per `limiter` tick until shutdown, the tick budget or an error.
///
/// `step` may block the thread, so it runs inside
/// [`tokio::task::block_in_place`]; a multi-threaded runtime is required.
/// The first error from `step` ends the loop and is returned unchanged.
pub async fn drive_blocking<F, E>(
    mut limiter: RateLimiter,
    mut shutdown: broadcast::Receiver<()>,
    max_ticks: Option<u64>,
    mut step: F,
) -> Result<(DriveExit, u64), E>
where
    F: FnMut(u64) -> Result<(), E>,
{
    let mut ticks: u64 = 0;
    loop {
        if max_ticks.is_some_and(|limit| ticks >= limit) {
            debug!(ticks, "tick budget exhausted");
            return Ok((DriveExit::TickLimit, ticks));
        }
        tokio::select! {
            biased;
            _ = shutdown.recv() => {
                debug!(ticks, "driver shutdown signal received");
                return Ok((DriveExit::Shutdown, ticks));
            }
            _ = limiter.tick() => {
                ticks += 1;
                tokio::task::block_in_place(|| step(ticks))?;
            }
        }
    }
}
