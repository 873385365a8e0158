//! Pointer control for Windows using the Win32 cursor API.

use std::time::Duration;
use windows::Win32::Foundation::POINT;
use windows::Win32::UI::WindowsAndMessaging::{
    GetCursorPos, GetSystemMetrics, SetCursorPos, SM_CXSCREEN, SM_CYSCREEN,
};

use super::{glide, Pointer, PointerError, Position, Result, ScreenSize};

/// Pointer backend using GetCursorPos / SetCursorPos.
pub struct SystemPointer {
    move_duration: Duration,
}

impl SystemPointer {
    pub fn new(move_duration: Duration) -> Result<Self> {
        Ok(Self { move_duration })
    }

    fn warp(&self, target: Position) -> Result<()> {
        unsafe { SetCursorPos(target.x, target.y) }.map_err(|e| PointerError::Move(e.to_string()))
    }
}

impl Pointer for SystemPointer {
    fn position(&self) -> Result<Position> {
        let mut point = POINT::default();
        unsafe { GetCursorPos(&mut point) }.map_err(|e| PointerError::Query(e.to_string()))?;
        Ok(Position::new(point.x, point.y))
    }

    fn move_smoothly(&self, target: Position) -> Result<()> {
        let from = self.position()?;
        glide(from, target, self.move_duration, |point| self.warp(point))
    }

    fn screen_size(&self) -> Result<ScreenSize> {
        let (width, height) = unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) };
        if width <= 0 || height <= 0 {
            return Err(PointerError::Query("GetSystemMetrics returned no screen size".to_string()));
        }
        Ok(ScreenSize::new(width, height))
    }
}
