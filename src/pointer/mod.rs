//! Pointer control with platform-specific implementations.

#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "windows")]
mod win32;

#[cfg(test)]
pub mod mock;

use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Absolute pointer coordinates in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Per-axis absolute distance to another position.
    pub fn delta(&self, other: Position) -> (u32, u32) {
        (self.x.abs_diff(other.x), self.y.abs_diff(other.y))
    }
}

/// Dimensions of the main display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenSize {
    pub width: i32,
    pub height: i32,
}

impl ScreenSize {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

/// Failures reported by a pointer backend.
#[derive(Debug, Error)]
pub enum PointerError {
    #[error("pointer backend unavailable: {0}")]
    Unavailable(String),
    #[error("failed to query pointer state: {0}")]
    Query(String),
    #[error("failed to move pointer: {0}")]
    Move(String),
}

pub type Result<T> = std::result::Result<T, PointerError>;

/// Platform primitives for reading and driving the pointer.
///
/// All calls are synchronous. `move_smoothly` blocks for the duration of
/// the animation and should be run off the async executor.
pub trait Pointer: Send + Sync {
    /// Current pointer position.
    fn position(&self) -> Result<Position>;

    /// Animate the pointer from where it is now to `target`.
    fn move_smoothly(&self, target: Position) -> Result<()>;

    /// Size of the main display.
    fn screen_size(&self) -> Result<ScreenSize>;
}

/// Interval between two warps of a smoothed motion (~60 Hz).
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Upper bound on the number of warps in one motion.
const MAX_STEPS: u32 = 240;

/// Number of intermediate warps used to cover `duration`.
pub fn steps_for(duration: Duration) -> u32 {
    let frames = duration.as_millis() / FRAME_INTERVAL.as_millis();
    (frames as u32).clamp(1, MAX_STEPS)
}

/// Points along an ease-in-out curve from `from` to `to`.
///
/// The returned path has `steps` points, excludes `from` and always ends
/// exactly on `to`.
pub fn smooth_path(from: Position, to: Position, steps: u32) -> Vec<Position> {
    let steps = steps.max(1);
    let dx = f64::from(to.x - from.x);
    let dy = f64::from(to.y - from.y);

    (1..=steps)
        .map(|i| {
            if i == steps {
                return to;
            }
            let t = f64::from(i) / f64::from(steps);
            // smoothstep: slow start, slow finish
            let eased = t * t * (3.0 - 2.0 * t);
            Position::new(
                from.x + (dx * eased).round() as i32,
                from.y + (dy * eased).round() as i32,
            )
        })
        .collect()
}

/// Walk the pointer along a smoothed path using an absolute warp primitive.
pub(crate) fn glide<F>(from: Position, to: Position, duration: Duration, mut warp: F) -> Result<()>
where
    F: FnMut(Position) -> Result<()>,
{
    let steps = steps_for(duration);
    let pause = duration / steps;

    for point in smooth_path(from, to, steps) {
        warp(point)?;
        thread::sleep(pause);
    }

    Ok(())
}

#[cfg(target_os = "macos")]
pub use macos::SystemPointer;
#[cfg(target_os = "linux")]
pub use linux::SystemPointer;
#[cfg(target_os = "windows")]
pub use win32::SystemPointer;
