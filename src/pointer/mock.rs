//! Scripted in-memory pointer for tests.

use parking_lot::Mutex;
use std::sync::Arc;

use super::{Pointer, PointerError, Position, Result, ScreenSize};

type MoveHook = Arc<dyn Fn(Position) + Send + Sync>;

struct MockState {
    position: Position,
    screen: ScreenSize,
    fail_reads: bool,
    fail_moves: bool,
    landing: Option<Position>,
    moves: Vec<Position>,
    screen_queries: usize,
}

/// Pointer double that records every move and can inject failures.
pub struct MockPointer {
    state: Mutex<MockState>,
    on_move: Mutex<Option<MoveHook>>,
}

impl MockPointer {
    pub fn new(position: Position, screen: ScreenSize) -> Self {
        Self {
            state: Mutex::new(MockState {
                position,
                screen,
                fail_reads: false,
                fail_moves: false,
                landing: None,
                moves: Vec::new(),
                screen_queries: 0,
            }),
            on_move: Mutex::new(None),
        }
    }

    /// Simulate the user moving the pointer.
    pub fn set_position(&self, position: Position) {
        self.state.lock().position = position;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().fail_reads = fail;
    }

    pub fn fail_moves(&self, fail: bool) {
        self.state.lock().fail_moves = fail;
    }

    /// Make the next moves end somewhere other than the requested target.
    pub fn land_at(&self, landing: Option<Position>) {
        self.state.lock().landing = landing;
    }

    /// Run `hook` while a move is in flight, after the pointer has left its start.
    pub fn on_move<F>(&self, hook: F)
    where
        F: Fn(Position) + Send + Sync + 'static,
    {
        *self.on_move.lock() = Some(Arc::new(hook));
    }

    /// Targets requested so far.
    pub fn moves(&self) -> Vec<Position> {
        self.state.lock().moves.clone()
    }

    /// Number of `screen_size` calls so far.
    pub fn screen_queries(&self) -> usize {
        self.state.lock().screen_queries
    }

    pub fn current(&self) -> Position {
        self.state.lock().position
    }
}

impl Pointer for MockPointer {
    fn position(&self) -> Result<Position> {
        let state = self.state.lock();
        if state.fail_reads {
            return Err(PointerError::Query("mock read failure".to_string()));
        }
        Ok(state.position)
    }

    fn move_smoothly(&self, target: Position) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.moves.push(target);
            if state.fail_moves {
                return Err(PointerError::Move("mock move failure".to_string()));
            }
            state.position = state.landing.unwrap_or(target);
        }

        // Hook runs without the lock so it may read the pointer itself
        let hook = self.on_move.lock().clone();
        if let Some(hook) = hook {
            hook(target);
        }
        Ok(())
    }

    fn screen_size(&self) -> Result<ScreenSize> {
        let mut state = self.state.lock();
        state.screen_queries += 1;
        if state.fail_reads {
            return Err(PointerError::Query("mock screen failure".to_string()));
        }
        Ok(state.screen)
    }
}
