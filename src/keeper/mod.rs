//! Activity detection and movement simulation.
//!
//! Two independent loops share one guarded [`Shared`] store: the
//! [`ActivityMonitor`] watches for real pointer input and forces paused
//! mode, the [`Scheduler`] flips to running once the idle timeout elapses
//! and drives the [`MovementSimulator`] while running.

mod activity;
mod scheduler;
mod simulator;
mod state;

use activity::ActivityMonitor;
use scheduler::Scheduler;
use simulator::MovementSimulator;
use state::Shared;

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pointer::{Pointer, Position};

/// Why the mode changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cause {
    /// Real pointer movement was detected.
    UserActivity,
    /// No movement for the configured idle timeout.
    IdleTimeout,
    /// Pause or resume requested by a collaborator.
    Explicit,
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cause::UserActivity => write!(f, "user activity"),
            Cause::IdleTimeout => write!(f, "idle timeout"),
            Cause::Explicit => write!(f, "requested"),
        }
    }
}

/// Notifications broadcast to collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum KeeperEvent {
    /// Paused/running switch, sent only on an actual change.
    ModeChanged { paused: bool, cause: Cause },
    /// A simulated move completed; `to` is where the platform reports the pointer.
    Moved { from: Position, to: Position },
}

#[derive(Debug, Error)]
pub enum KeeperError {
    #[error("idle timeout must be greater than zero (got {0:?})")]
    InvalidIdleTimeout(Duration),
    #[error("offset range must be greater than zero (got {0})")]
    InvalidOffsetRange(i32),
    #[error("invalid keeper settings: {0}")]
    InvalidSettings(String),
}

/// Tuning for the core loops.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub idle_timeout: Duration,
    /// Half-width of the square a simulated target is picked from.
    pub offset_range: i32,
    pub activity_poll: Duration,
    /// Per-axis pixel change tolerated before input counts as activity.
    pub activity_tolerance: u32,
    pub scheduler_tick: Duration,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    /// Delay before a resume takes effect.
    pub resume_grace: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(5),
            offset_range: 100,
            activity_poll: Duration::from_millis(100),
            activity_tolerance: 5,
            scheduler_tick: Duration::from_secs(1),
            backoff_min: Duration::from_secs(1),
            backoff_max: Duration::from_secs(5),
            resume_grace: Duration::from_secs(1),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), KeeperError> {
        if self.idle_timeout.is_zero() {
            return Err(KeeperError::InvalidIdleTimeout(self.idle_timeout));
        }
        if self.offset_range <= 0 {
            return Err(KeeperError::InvalidOffsetRange(self.offset_range));
        }
        if self.activity_poll.is_zero() || self.scheduler_tick.is_zero() {
            return Err(KeeperError::InvalidSettings(
                "poll intervals must be greater than zero".to_string(),
            ));
        }
        if self.backoff_min > self.backoff_max {
            return Err(KeeperError::InvalidSettings(format!(
                "backoff minimum {:?} exceeds maximum {:?}",
                self.backoff_min, self.backoff_max
            )));
        }
        Ok(())
    }
}

/// Handles of the two running loops.
pub struct KeeperTasks {
    monitor: JoinHandle<()>,
    scheduler: JoinHandle<()>,
}

impl KeeperTasks {
    /// Wait for both loops to exit after the shutdown token fired.
    pub async fn join(self) {
        if let Err(e) = self.monitor.await {
            warn!("Activity monitor task failed: {}", e);
        }
        if let Err(e) = self.scheduler.await {
            warn!("Scheduler task failed: {}", e);
        }
    }
}

/// The core, as seen by UI and service collaborators.
pub struct Keeper {
    shared: Arc<Shared>,
    pointer: Arc<dyn Pointer>,
    settings: Settings,
    monitor: Arc<ActivityMonitor>,
    scheduler: Arc<Scheduler>,
}

impl Keeper {
    /// Build the state store, seeding the position from one real read.
    pub fn new(settings: Settings, pointer: Arc<dyn Pointer>) -> Result<Self, KeeperError> {
        settings.validate()?;

        let position = match pointer.position() {
            Ok(position) => position,
            Err(e) => {
                warn!("Could not read initial pointer position: {}", e);
                Position::default()
            }
        };

        let shared = Arc::new(Shared::new(
            settings.idle_timeout,
            settings.offset_range,
            position,
        ));
        let monitor = Arc::new(ActivityMonitor::new(
            shared.clone(),
            pointer.clone(),
            settings.activity_tolerance,
        ));
        let simulator = Arc::new(MovementSimulator::new(shared.clone(), pointer.clone()));
        let scheduler = Arc::new(Scheduler::new(
            shared.clone(),
            simulator,
            settings.backoff_min,
            settings.backoff_max,
        ));

        debug!("Keeper initialised at ({}, {})", position.x, position.y);

        Ok(Self {
            shared,
            pointer,
            settings,
            monitor,
            scheduler,
        })
    }

    /// Spawn both loops; they run until `shutdown` is cancelled.
    pub fn start(&self, shutdown: CancellationToken) -> KeeperTasks {
        info!(
            "Starting keeper: idle timeout {:?}, offset range {}px",
            self.idle_timeout(),
            self.shared.offset_range()
        );

        let monitor = tokio::spawn(
            self.monitor
                .clone()
                .run(self.settings.activity_poll, shutdown.clone()),
        );
        let scheduler = tokio::spawn(
            self.scheduler
                .clone()
                .run(self.settings.scheduler_tick, shutdown),
        );

        KeeperTasks { monitor, scheduler }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KeeperEvent> {
        self.shared.subscribe()
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused()
    }

    /// Stop simulating, cancelling any resume still in its grace delay.
    ///
    /// Returns whether the mode changed or a pending resume was dropped.
    pub fn pause(&self) -> bool {
        self.shared.pause(Cause::Explicit)
    }

    /// Whether a resume is waiting out its grace delay.
    pub fn resume_pending(&self) -> bool {
        self.shared.resume_pending()
    }

    /// Start simulating after the grace delay.
    ///
    /// The grace delay lets the pointer settle after whatever click asked
    /// for the resume; position and idle reference are reseeded afterwards
    /// so that settling is neither detected as activity nor counted as idle.
    /// A pause landing during the delay wins over the resume.
    pub async fn resume(&self) -> bool {
        let Some(ticket) = self.shared.request_resume() else {
            debug!("Resume requested while already running");
            return false;
        };

        tokio::time::sleep(self.settings.resume_grace).await;

        let position = match self.pointer.position() {
            Ok(position) => Some(position),
            Err(e) => {
                warn!("Could not reseed pointer position on resume: {}", e);
                None
            }
        };
        self.shared.reseed_and_run(ticket, position, Cause::Explicit)
    }

    pub fn idle_timeout(&self) -> Duration {
        self.shared.idle_timeout()
    }

    /// Replace the idle timeout; takes effect on the next scheduler tick.
    pub fn set_idle_timeout(&self, timeout: Duration) -> Result<(), KeeperError> {
        if timeout.is_zero() {
            warn!("Rejected idle timeout {:?}, keeping {:?}", timeout, self.idle_timeout());
            return Err(KeeperError::InvalidIdleTimeout(timeout));
        }
        self.shared.set_idle_timeout(timeout);
        info!("Idle timeout set to {:?}", timeout);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::activity::Observation;
    use super::*;
    use crate::pointer::mock::MockPointer;
    use crate::pointer::ScreenSize;
    use tokio_test::{assert_err, assert_ok};

    fn keeper_with(settings: Settings) -> (Keeper, Arc<MockPointer>) {
        let pointer = Arc::new(MockPointer::new(
            Position::new(500, 500),
            ScreenSize::new(1920, 1080),
        ));
        let keeper = Keeper::new(settings, pointer.clone()).unwrap();
        (keeper, pointer)
    }

    #[test]
    fn test_default_settings_are_valid() {
        assert_ok!(Settings::default().validate());
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let settings = Settings {
            offset_range: 0,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(KeeperError::InvalidOffsetRange(0))
        ));

        let settings = Settings {
            backoff_min: Duration::from_secs(6),
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(KeeperError::InvalidSettings(_))
        ));

        let pointer = Arc::new(MockPointer::new(Position::default(), ScreenSize::new(10, 10)));
        let settings = Settings {
            idle_timeout: Duration::ZERO,
            ..Settings::default()
        };
        assert!(Keeper::new(settings, pointer).is_err());
    }

    #[test]
    fn test_new_seeds_position_from_pointer() {
        let (keeper, _) = keeper_with(Settings::default());
        assert!(keeper.is_paused());
        assert_eq!(keeper.shared.position(), Position::new(500, 500));
    }

    #[test]
    fn test_new_survives_failed_initial_read() {
        let pointer = Arc::new(MockPointer::new(Position::new(3, 3), ScreenSize::new(10, 10)));
        pointer.fail_reads(true);
        let keeper = Keeper::new(Settings::default(), pointer).unwrap();
        assert_eq!(keeper.shared.position(), Position::default());
    }

    #[test]
    fn test_pause_is_idempotent() {
        let (keeper, _) = keeper_with(Settings::default());
        let mut events = keeper.subscribe();

        assert!(!keeper.pause());
        assert!(keeper.is_paused());
        assert!(events.try_recv().is_err());

        keeper.shared.set_paused(false, Cause::IdleTimeout);
        assert!(keeper.pause());
        assert!(!keeper.pause());

        assert_eq!(
            events.try_recv().unwrap(),
            KeeperEvent::ModeChanged { paused: false, cause: Cause::IdleTimeout }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            KeeperEvent::ModeChanged { paused: true, cause: Cause::Explicit }
        );
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_set_idle_timeout_rejects_zero() {
        let (keeper, _) = keeper_with(Settings::default());

        assert_ok!(keeper.set_idle_timeout(Duration::from_secs(60)));
        assert_eq!(keeper.idle_timeout(), Duration::from_secs(60));

        assert_err!(keeper.set_idle_timeout(Duration::ZERO));
        assert_eq!(keeper.idle_timeout(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_waits_for_grace_then_reseeds() {
        let (keeper, pointer) = keeper_with(Settings::default());
        let mut events = keeper.subscribe();
        let started = tokio::time::Instant::now();

        // The click that asked for the resume nudges the pointer
        pointer.set_position(Position::new(530, 505));

        assert!(keeper.resume().await);
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert!(!keeper.is_paused());
        assert_eq!(keeper.shared.position(), Position::new(530, 505));
        assert!(keeper.shared.last_move_at() >= started + Duration::from_secs(1));
        assert_eq!(
            events.try_recv().unwrap(),
            KeeperEvent::ModeChanged { paused: false, cause: Cause::Explicit }
        );

        // Pointer still where the resume left it: nothing to detect
        assert_eq!(keeper.monitor.tick(), Observation::Quiet);
        assert!(!keeper.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_not_undone_by_monitor_during_grace() {
        let (keeper, _pointer) = keeper_with(Settings::default());

        let resume = keeper.resume();
        let ticks = async {
            for _ in 0..5 {
                tokio::time::sleep(Duration::from_millis(150)).await;
                assert_eq!(keeper.monitor.tick(), Observation::Quiet);
            }
        };
        let (resumed, _) = tokio::join!(resume, ticks);

        assert!(resumed);
        assert!(!keeper.is_paused());
        assert_eq!(keeper.monitor.tick(), Observation::Quiet);
        assert!(!keeper.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_during_grace_wins_over_resume() {
        let (keeper, _) = keeper_with(Settings::default());
        let mut events = keeper.subscribe();

        let resume = keeper.resume();
        let pause = async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            assert!(keeper.resume_pending());
            keeper.pause()
        };
        let (resumed, paused) = tokio::join!(resume, pause);

        assert!(paused);
        assert!(!resumed);
        assert!(keeper.is_paused());
        assert!(!keeper.resume_pending());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_while_running_is_noop() {
        let (keeper, _) = keeper_with(Settings::default());
        keeper.shared.set_paused(false, Cause::IdleTimeout);
        let mut events = keeper.subscribe();

        assert!(!keeper.resume().await);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_starts_simulation() {
        let (keeper, pointer) = keeper_with(Settings::default());
        let mut events = keeper.subscribe();
        let shutdown = CancellationToken::new();
        let tasks = keeper.start(shutdown.clone());

        tokio::time::sleep(Duration::from_millis(4500)).await;
        assert!(keeper.is_paused());
        assert!(pointer.moves().is_empty());

        tokio::time::sleep(Duration::from_millis(1600)).await;
        assert!(!keeper.is_paused());
        assert!(!pointer.moves().is_empty());
        assert_eq!(
            events.try_recv().unwrap(),
            KeeperEvent::ModeChanged { paused: false, cause: Cause::IdleTimeout }
        );
        assert!(matches!(events.try_recv().unwrap(), KeeperEvent::Moved { .. }));

        shutdown.cancel();
        tasks.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_activity_stops_running_loops() {
        let (keeper, pointer) = keeper_with(Settings::default());
        let shutdown = CancellationToken::new();
        let tasks = keeper.start(shutdown.clone());

        tokio::time::sleep(Duration::from_millis(5500)).await;
        assert!(!keeper.is_paused());

        let moves = pointer.moves().len();
        let current = pointer.current();
        pointer.set_position(Position::new(current.x + 40, current.y));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(keeper.is_paused());

        // The user keeps wiggling for a while: no simulated moves
        for step in 0..20 {
            pointer.set_position(Position::new(current.x + 40 + (step % 2) * 20, current.y));
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        assert!(keeper.is_paused());
        assert_eq!(pointer.moves().len(), moves);

        shutdown.cancel();
        tasks.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_loops() {
        let (keeper, _) = keeper_with(Settings {
            backoff_min: Duration::from_secs(60),
            backoff_max: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(1),
            ..Settings::default()
        });
        let shutdown = CancellationToken::new();
        let tasks = keeper.start(shutdown.clone());

        // Scheduler is now inside its long backoff
        tokio::time::sleep(Duration::from_secs(3)).await;
        shutdown.cancel();

        let joined = tokio::time::timeout(Duration::from_millis(50), tasks.join()).await;
        assert!(joined.is_ok());
    }
}
