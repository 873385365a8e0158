//! Pointer control for macOS using CoreGraphics events.

use core_graphics::display::CGDisplay;
use core_graphics::event::{CGEvent, CGEventTapLocation, CGEventType, CGMouseButton};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use core_graphics::geometry::CGPoint;
use std::time::Duration;

use super::{glide, Pointer, PointerError, Position, Result, ScreenSize};

/// Pointer backend posting synthetic HID events.
///
/// Requires the Accessibility permission for the hosting process.
pub struct SystemPointer {
    move_duration: Duration,
}

impl SystemPointer {
    pub fn new(move_duration: Duration) -> Result<Self> {
        // Fail early when no event source can be created at all
        event_source()?;
        Ok(Self { move_duration })
    }

    fn warp(&self, target: Position) -> Result<()> {
        let source = event_source()?;
        let event = CGEvent::new_mouse_event(
            source,
            CGEventType::MouseMoved,
            CGPoint::new(f64::from(target.x), f64::from(target.y)),
            CGMouseButton::Left,
        )
        .map_err(|_| PointerError::Move("failed to create mouse event".to_string()))?;
        event.post(CGEventTapLocation::HID);
        Ok(())
    }
}

impl Pointer for SystemPointer {
    fn position(&self) -> Result<Position> {
        let event = CGEvent::new(event_source()?)
            .map_err(|_| PointerError::Query("failed to create event".to_string()))?;
        let location = event.location();
        Ok(Position::new(location.x.round() as i32, location.y.round() as i32))
    }

    fn move_smoothly(&self, target: Position) -> Result<()> {
        let from = self.position()?;
        glide(from, target, self.move_duration, |point| self.warp(point))
    }

    fn screen_size(&self) -> Result<ScreenSize> {
        // Event coordinates are in points, so use the bounds rather than pixels
        let bounds = CGDisplay::main().bounds();
        if bounds.size.width < 1.0 || bounds.size.height < 1.0 {
            return Err(PointerError::Query("main display reports empty bounds".to_string()));
        }
        Ok(ScreenSize::new(
            bounds.size.width as i32,
            bounds.size.height as i32,
        ))
    }
}

fn event_source() -> Result<CGEventSource> {
    CGEventSource::new(CGEventSourceStateID::HIDSystemState)
        .map_err(|_| PointerError::Unavailable("failed to create HID event source".to_string()))
}
