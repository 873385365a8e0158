//! Pointer control for Linux using X11 (XCB).

use std::time::Duration;
use tracing::debug;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ConnectionExt, Window};
use x11rb::rust_connection::RustConnection;

use super::{glide, Pointer, PointerError, Position, Result, ScreenSize};

/// Pointer backend driving the X11 root window.
pub struct SystemPointer {
    conn: RustConnection,
    root: Window,
    move_duration: Duration,
}

impl SystemPointer {
    /// Connect to the X11 display named by `DISPLAY`.
    pub fn new(move_duration: Duration) -> Result<Self> {
        let (conn, screen_num) = RustConnection::connect(None).map_err(|e| {
            PointerError::Unavailable(format!("failed to connect to X11 display, is DISPLAY set? {}", e))
        })?;

        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .map(|screen| screen.root)
            .ok_or_else(|| PointerError::Unavailable(format!("X11 screen {} not found", screen_num)))?;

        debug!("Connected to X11 screen {}", screen_num);

        Ok(Self {
            conn,
            root,
            move_duration,
        })
    }

    fn warp(&self, target: Position) -> Result<()> {
        self.conn
            .warp_pointer(
                x11rb::NONE,
                self.root,
                0,
                0,
                0,
                0,
                clamp_coord(target.x),
                clamp_coord(target.y),
            )
            .map_err(|e| PointerError::Move(e.to_string()))?;
        self.conn
            .flush()
            .map_err(|e| PointerError::Move(e.to_string()))?;
        Ok(())
    }
}

impl Pointer for SystemPointer {
    fn position(&self) -> Result<Position> {
        let reply = self
            .conn
            .query_pointer(self.root)
            .map_err(|e| PointerError::Query(e.to_string()))?
            .reply()
            .map_err(|e| PointerError::Query(e.to_string()))?;

        Ok(Position::new(reply.root_x.into(), reply.root_y.into()))
    }

    fn move_smoothly(&self, target: Position) -> Result<()> {
        let from = self.position()?;
        glide(from, target, self.move_duration, |point| self.warp(point))
    }

    fn screen_size(&self) -> Result<ScreenSize> {
        // Ask the server each time so resolution changes are picked up
        let geometry = self
            .conn
            .get_geometry(self.root)
            .map_err(|e| PointerError::Query(e.to_string()))?
            .reply()
            .map_err(|e| PointerError::Query(e.to_string()))?;

        Ok(ScreenSize::new(geometry.width.into(), geometry.height.into()))
    }
}

/// X11 coordinates are 16-bit.
fn clamp_coord(value: i32) -> i16 {
    value.clamp(i16::MIN.into(), i16::MAX.into()) as i16
}
