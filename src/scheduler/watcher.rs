//! Per-target probe loop.

use std::sync::Arc;
use std::time::Instant;
use tokio::time::MissedTickBehavior;

use super::signal::StopSignal;
use crate::probe::HttpProber;
use crate::store::{Sample, Store, Target};

/// Why a watcher loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchExit {
    Cancelled,
    DurationReached,
}

/// Probe `target` on its interval until stopped or its duration cap is hit.
///
/// The caller clears the target's history before spawning this loop.
pub async fn run_watch_loop(
    target: Arc<Target>,
    prober: HttpProber,
    store: Arc<Store>,
    mut stop: StopSignal,
) -> WatchExit {
    let started = Instant::now();
    let mut sequence: u64 = 0;

    let mut interval = tokio::time::interval(target.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if stop.is_stopped() {
            return WatchExit::Cancelled;
        }
        if cap_reached(&target, started) {
            return WatchExit::DurationReached;
        }

        tokio::select! {
            _ = stop.stopped() => return WatchExit::Cancelled,
            _ = interval.tick() => {}
        }

        // Re-check after waiting: the cap may expire mid-interval.
        if cap_reached(&target, started) {
            return WatchExit::DurationReached;
        }

        let outcome = prober.probe(&target.url).await;

        if stop.is_stopped() {
            tracing::debug!("Discarding late result for {} after stop", target.id);
            return WatchExit::Cancelled;
        }

        sequence += 1;
        let sample = Sample::from_outcome(sequence, &outcome, started.elapsed());
        store.append(&target.id, sample);
    }
}

fn cap_reached(target: &Target, started: Instant) -> bool {
    target
        .duration
        .is_some_and(|cap| started.elapsed() >= cap)
}
