//! One bounded, randomized, smoothly animated pointer displacement.

use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::state::Shared;
use super::KeeperEvent;
use crate::pointer::{Pointer, Position, ScreenSize};

/// What a simulation attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Nothing attempted: paused, already moving, or screen unknown.
    Skipped,
    /// The platform refused the move; state was still settled.
    Failed,
    /// The pointer moved; `to` is where the platform reports it.
    Moved { from: Position, to: Position },
}

/// Pick a target within `range` of `start` on both axes, kept on screen.
pub fn compute_target<R: Rng + ?Sized>(
    start: Position,
    range: i32,
    screen: ScreenSize,
    rng: &mut R,
) -> Position {
    let range = range.max(0);
    let dx = rng.gen_range(-range..=range);
    let dy = rng.gen_range(-range..=range);

    Position::new(
        start.x.saturating_add(dx).clamp(0, (screen.width - 1).max(0)),
        start.y.saturating_add(dy).clamp(0, (screen.height - 1).max(0)),
    )
}

/// Drives the pointer while marking the shared state busy.
pub struct MovementSimulator {
    shared: Arc<Shared>,
    pointer: Arc<dyn Pointer>,
}

impl MovementSimulator {
    pub fn new(shared: Arc<Shared>, pointer: Arc<dyn Pointer>) -> Self {
        Self { shared, pointer }
    }

    /// Perform one simulated move. Blocks for the length of the animation.
    pub fn simulate<R: Rng + ?Sized>(&self, rng: &mut R) -> MoveOutcome {
        let screen = match self.pointer.screen_size() {
            Ok(screen) => screen,
            Err(e) => {
                debug!("Screen size unavailable, skipping move: {}", e);
                return MoveOutcome::Skipped;
            }
        };

        // Released on every path below, including a panicking backend
        let Some(guard) = self.shared.begin_move() else {
            debug!("Move not started: paused or already moving");
            return MoveOutcome::Skipped;
        };

        let from = guard.start();
        let target = compute_target(from, guard.offset_range(), screen, rng);
        debug!("Starting pointer movement to ({}, {})", target.x, target.y);

        let moved = self.pointer.move_smoothly(target);
        if let Err(e) = &moved {
            warn!("Pointer movement failed: {}", e);
        }

        let settled = match self.pointer.position() {
            Ok(position) => position,
            Err(e) => {
                warn!("Could not read pointer after movement, keeping last known position: {}", e);
                from
            }
        };
        guard.finish(settled);

        if moved.is_err() {
            return MoveOutcome::Failed;
        }

        info!(
            "Moved pointer ({}, {}) -> ({}, {})",
            from.x, from.y, settled.x, settled.y
        );
        self.shared.publish(KeeperEvent::Moved { from, to: settled });
        MoveOutcome::Moved { from, to: settled }
    }
}
