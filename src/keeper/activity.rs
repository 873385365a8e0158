//! Detection of real user pointer movement.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::state::{MotionMarker, Shared};
use super::Cause;
use crate::pointer::{Pointer, Position};

/// Result of one monitor tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// A simulated move was in flight; the reading was not used.
    Suppressed,
    /// The pointer could not be read this tick.
    ReadFailed,
    /// No change beyond the tolerance.
    Quiet,
    /// Real input; `paused_now` is set when this tick stopped the simulation.
    UserActivity { dx: u32, dy: u32, paused_now: bool },
}

/// Polls the pointer and forces paused mode on real input.
pub struct ActivityMonitor {
    shared: Arc<Shared>,
    pointer: Arc<dyn Pointer>,
    tolerance: u32,
}

impl ActivityMonitor {
    pub fn new(shared: Arc<Shared>, pointer: Arc<dyn Pointer>, tolerance: u32) -> Self {
        Self {
            shared,
            pointer,
            tolerance,
        }
    }

    /// Poll until `shutdown` fires.
    pub async fn run(self: Arc<Self>, poll: Duration, shutdown: CancellationToken) {
        let mut ticker = interval(poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        debug!("Activity monitor polling every {:?}", poll);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick();
                }
            }
        }

        debug!("Activity monitor exiting");
    }

    /// Run one detection pass.
    pub fn tick(&self) -> Observation {
        let marker = self.shared.marker();
        if marker.moving {
            trace!("Simulated move in flight, skipping activity check");
            return Observation::Suppressed;
        }

        match self.pointer.position() {
            Ok(current) => self.observe(marker, current),
            Err(e) => {
                debug!("Pointer read failed, retrying next tick: {}", e);
                Observation::ReadFailed
            }
        }
    }

    /// Classify a reading taken after `marker` was captured.
    ///
    /// The reading is discarded if a simulated move started or finished in
    /// between, since it may show the pointer partway along that move.
    pub(super) fn observe(&self, marker: MotionMarker, current: Position) -> Observation {
        let mut inner = self.shared.lock();
        if inner.moving || inner.generation != marker.generation {
            trace!("Simulated move overlapped pointer read, discarding");
            return Observation::Suppressed;
        }

        let (dx, dy) = current.delta(inner.position);
        if dx <= self.tolerance && dy <= self.tolerance {
            return Observation::Quiet;
        }

        inner.position = current;
        inner.stamp();
        let paused_now = self.shared.transition(&mut inner, true, Cause::UserActivity);
        drop(inner);

        if paused_now {
            info!("User activity detected (moved {},{} pixels)", dx, dy);
        } else {
            debug!("User activity while paused (moved {},{} pixels)", dx, dy);
        }

        Observation::UserActivity { dx, dy, paused_now }
    }
}
