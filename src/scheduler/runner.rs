//! Drives the scheduler from a tokio interval.
//!
//! Each interval tick runs exactly one [`Scheduler::tick`]; the tick itself
//! never awaits.

use std::time::Duration;

use chrono::Local;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

use super::{Phase, Scheduler};
use crate::error::Result;

/// Tick `scheduler` every `poll_interval` until it terminates
///
/// # Errors
///
/// Returns the first fatal error raised by a tick (log file cannot be
/// created at startup, no source could be opened).
pub async fn run(mut scheduler: Scheduler, poll_interval: Duration) -> Result<()> {
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut ticks: u64 = 0;
    loop {
        ticker.tick().await;
        ticks += 1;
        if scheduler.tick(Local::now())? == Phase::Terminated {
            break;
        }
    }

    info!("Capture stopped after {} ticks", ticks);
    Ok(())
}
