//! Idle timeout detection and the simulated movement cadence.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::simulator::{MoveOutcome, MovementSimulator};
use super::state::Shared;
use super::Cause;

/// Flips to running after the idle timeout and paces simulated moves.
pub struct Scheduler {
    shared: Arc<Shared>,
    simulator: Arc<MovementSimulator>,
    backoff_min: Duration,
    backoff_max: Duration,
}

impl Scheduler {
    pub fn new(
        shared: Arc<Shared>,
        simulator: Arc<MovementSimulator>,
        backoff_min: Duration,
        backoff_max: Duration,
    ) -> Self {
        Self {
            shared,
            simulator,
            backoff_min,
            backoff_max,
        }
    }

    /// Tick until `shutdown` fires.
    pub async fn run(self: Arc<Self>, tick: Duration, shutdown: CancellationToken) {
        let mut ticker = interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!("Scheduler ticking every {:?}", tick);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            self.check_idle();
            if self.shared.paused() {
                continue;
            }

            let simulator = self.simulator.clone();
            let outcome =
                tokio::task::spawn_blocking(move || simulator.simulate(&mut rand::thread_rng())).await;
            match outcome {
                Ok(MoveOutcome::Skipped) => debug!("No move this cycle"),
                Ok(_) => {}
                Err(e) => warn!("Simulated move task failed: {}", e),
            }

            let backoff = {
                let mut rng = rand::thread_rng();
                self.backoff(&mut rng)
            };
            debug!("Next movement in at least {:?}", backoff);

            // A pause arriving now is picked up on the next tick
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = sleep(backoff) => {}
            }
        }

        debug!("Scheduler exiting");
    }

    /// Leave paused mode once nothing has moved for the idle timeout.
    ///
    /// Returns whether this call started the simulation.
    pub fn check_idle(&self) -> bool {
        let mut inner = self.shared.lock();
        if !inner.paused {
            return false;
        }

        let idle_for = inner.idle_for();
        if idle_for < inner.idle_timeout {
            return false;
        }

        debug!("No pointer movement for {:?}, starting simulation", idle_for);
        self.shared.transition(&mut inner, false, Cause::IdleTimeout)
    }

    /// Randomized pause between two simulated moves.
    pub fn backoff<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let min = self.backoff_min.as_millis() as u64;
        let max = self.backoff_max.as_millis() as u64;
        Duration::from_millis(rng.gen_range(min..=max.max(min)))
    }
}
