//! Configuration and motion state shared by the monitor loops.

use parking_lot::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info};

use super::{Cause, KeeperEvent};
use crate::pointer::Position;

/// Everything behind the guard.
pub(super) struct Inner {
    /// True while the keeper defers to the user.
    pub(super) paused: bool,
    pub(super) idle_timeout: Duration,
    pub(super) offset_range: i32,
    /// Last known pointer position, observed or moved to.
    pub(super) position: Position,
    /// Last real or simulated movement; the idle reference point.
    pub(super) last_move_at: Instant,
    /// Asserted strictly for the duration of a simulated move.
    pub(super) moving: bool,
    /// Bumped when a simulated move begins and when it ends.
    pub(super) generation: u64,
    /// Ticket of the resume waiting out its grace delay, if any.
    pub(super) pending_resume: Option<u64>,
    /// Last resume ticket handed out.
    pub(super) resume_epoch: u64,
}

impl Inner {
    /// Record movement now without ever moving the reference backwards.
    pub(super) fn stamp(&mut self) {
        let now = Instant::now();
        if now > self.last_move_at {
            self.last_move_at = now;
        }
    }

    pub(super) fn idle_for(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_move_at)
    }
}

/// Snapshot taken before the activity monitor reads the live pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionMarker {
    pub moving: bool,
    pub generation: u64,
}

/// Guarded state store plus the transition notifier.
pub struct Shared {
    inner: Mutex<Inner>,
    events: broadcast::Sender<KeeperEvent>,
}

impl Shared {
    pub fn new(idle_timeout: Duration, offset_range: i32, position: Position) -> Self {
        let (events, _) = broadcast::channel(64);

        Self {
            inner: Mutex::new(Inner {
                paused: true,
                idle_timeout,
                offset_range,
                position,
                last_move_at: Instant::now(),
                moving: false,
                generation: 0,
                pending_resume: None,
                resume_epoch: 0,
            }),
            events,
        }
    }

    pub(super) fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KeeperEvent> {
        self.events.subscribe()
    }

    /// Send an event to every subscriber. Having none is fine.
    pub(super) fn publish(&self, event: KeeperEvent) {
        let _ = self.events.send(event);
    }

    pub fn paused(&self) -> bool {
        self.inner.lock().paused
    }

    /// Switch mode, notifying only when the mode actually changed.
    pub fn set_paused(&self, paused: bool, cause: Cause) -> bool {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, paused, cause)
    }

    /// Apply a mode change while the caller holds the guard.
    ///
    /// Publishing under the guard keeps notifications in transition order.
    pub(super) fn transition(&self, inner: &mut Inner, paused: bool, cause: Cause) -> bool {
        if inner.paused == paused {
            return false;
        }
        inner.paused = paused;
        if paused {
            info!("Simulation paused ({})", cause);
        } else {
            info!(
                "Simulation running ({}), moving after {:?} of inactivity",
                cause, inner.idle_timeout
            );
        }
        self.publish(KeeperEvent::ModeChanged { paused, cause });
        true
    }

    pub fn idle_timeout(&self) -> Duration {
        self.inner.lock().idle_timeout
    }

    pub fn set_idle_timeout(&self, timeout: Duration) {
        self.inner.lock().idle_timeout = timeout;
    }

    pub fn offset_range(&self) -> i32 {
        self.inner.lock().offset_range
    }

    pub fn position(&self) -> Position {
        self.inner.lock().position
    }

    pub fn last_move_at(&self) -> Instant {
        self.inner.lock().last_move_at
    }

    pub fn marker(&self) -> MotionMarker {
        let inner = self.inner.lock();
        MotionMarker {
            moving: inner.moving,
            generation: inner.generation,
        }
    }

    /// Stop simulating on request, also cancelling a resume still in its
    /// grace delay. Returns whether anything changed.
    pub fn pause(&self, cause: Cause) -> bool {
        let mut inner = self.inner.lock();
        let cancelled = inner.pending_resume.take().is_some();
        if cancelled {
            info!("Pending resume cancelled");
        }
        self.transition(&mut inner, true, cause) || cancelled
    }

    /// Register a resume that will complete after the grace delay.
    ///
    /// Returns `None` when already running. A newer request or a pause
    /// invalidates the returned ticket.
    pub fn request_resume(&self) -> Option<u64> {
        let mut inner = self.inner.lock();
        if !inner.paused {
            return None;
        }
        inner.resume_epoch = inner.resume_epoch.wrapping_add(1);
        inner.pending_resume = Some(inner.resume_epoch);
        Some(inner.resume_epoch)
    }

    pub fn resume_pending(&self) -> bool {
        self.inner.lock().pending_resume.is_some()
    }

    /// Complete the resume holding `ticket`: reseed position and idle
    /// reference, then leave paused mode.
    ///
    /// Does nothing if the ticket was superseded or cancelled, or if the
    /// keeper already left paused mode on its own.
    pub fn reseed_and_run(&self, ticket: u64, position: Option<Position>, cause: Cause) -> bool {
        let mut inner = self.inner.lock();
        if inner.pending_resume != Some(ticket) {
            debug!("Resume superseded or cancelled during grace delay");
            return false;
        }
        inner.pending_resume = None;

        if !inner.paused || inner.moving {
            debug!("Already running, resume leaves motion state alone");
            return false;
        }

        if let Some(position) = position {
            inner.position = position;
        }
        inner.stamp();
        self.transition(&mut inner, false, cause)
    }

    /// Claim the busy flag for one simulated move.
    ///
    /// Refused while paused or while another move holds the flag. The
    /// paused check and the flag assertion happen under one guard.
    pub fn begin_move(&self) -> Option<MoveGuard<'_>> {
        let mut inner = self.inner.lock();
        if inner.paused || inner.moving {
            return None;
        }
        inner.moving = true;
        inner.generation = inner.generation.wrapping_add(1);

        Some(MoveGuard {
            shared: self,
            start: inner.position,
            offset_range: inner.offset_range,
            finished: false,
        })
    }
}

/// Holds the busy flag; releasing it is guaranteed on every exit path.
pub struct MoveGuard<'a> {
    shared: &'a Shared,
    start: Position,
    offset_range: i32,
    finished: bool,
}

impl MoveGuard<'_> {
    pub fn start(&self) -> Position {
        self.start
    }

    pub fn offset_range(&self) -> i32 {
        self.offset_range
    }

    /// Record where the pointer settled and release the flag in one step.
    pub fn finish(mut self, settled: Position) {
        let mut inner = self.shared.lock();
        inner.position = settled;
        Self::release(&mut inner);
        self.finished = true;
    }

    fn release(inner: &mut Inner) {
        inner.stamp();
        inner.moving = false;
        inner.generation = inner.generation.wrapping_add(1);
    }
}

impl Drop for MoveGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            Self::release(&mut self.shared.lock());
        }
    }
}
