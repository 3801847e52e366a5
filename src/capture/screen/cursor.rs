//! Cursor overlay
//!
//! Screen grabs do not include the pointer, so each frame gets the current
//! cursor icon blended on top before it reaches the encoder.

use crate::recorder::channel::CapturedFrame;
use parking_lot::Mutex as ParkingMutex;
use std::sync::Arc;

/// Cursor image in straight-alpha BGRA, top-down rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorIcon {
    pub width: u32,
    pub height: u32,
    pub hotspot_x: i32,
    pub hotspot_y: i32,
    pub pixels: Vec<u8>,
}

/// Cursor state sampled at frame time, in screen coordinates
#[derive(Debug, Clone)]
pub struct CursorState {
    pub x: i32,
    pub y: i32,
    pub visible: bool,
    pub icon: Option<Arc<CursorIcon>>,
}

/// Reads the current cursor. `None` means the state could not be read; the
/// frame is then encoded without an overlay.
pub trait CursorSource: Send {
    fn read(&mut self) -> Option<CursorState>;
}

/// One cursor source handed to the correlator of every recording
#[derive(Clone)]
pub struct SharedCursor(Arc<ParkingMutex<Box<dyn CursorSource>>>);

impl SharedCursor {
    pub fn new(source: Box<dyn CursorSource>) -> Self {
        Self(Arc::new(ParkingMutex::new(source)))
    }
}

impl CursorSource for SharedCursor {
    fn read(&mut self) -> Option<CursorState> {
        self.0.lock().read()
    }
}

/// Cursor source for drivers that already include the pointer
#[derive(Debug, Default)]
pub struct NoCursor;

impl CursorSource for NoCursor {
    fn read(&mut self) -> Option<CursorState> {
        None
    }
}

/// Blend `cursor` onto `frame`. Returns false when nothing was drawn.
pub fn composite(frame: &mut CapturedFrame, cursor: &CursorState) -> bool {
    if !cursor.visible {
        return false;
    }
    let Some(icon) = cursor.icon.as_deref() else {
        return false;
    };
    if icon.pixels.len() < (icon.width * icon.height * 4) as usize {
        return false;
    }

    let origin_x = cursor.x - icon.hotspot_x;
    let origin_y = cursor.y - icon.hotspot_y;
    let stride = frame.bytes_per_row as usize;
    let mut drawn = false;

    for iy in 0..icon.height as i32 {
        let fy = origin_y + iy;
        if fy < 0 || fy >= frame.height as i32 {
            continue;
        }
        for ix in 0..icon.width as i32 {
            let fx = origin_x + ix;
            if fx < 0 || fx >= frame.width as i32 {
                continue;
            }

            let src = ((iy as u32 * icon.width + ix as u32) * 4) as usize;
            let alpha = u32::from(icon.pixels[src + 3]);
            if alpha == 0 {
                continue;
            }

            let dst = fy as usize * stride + fx as usize * 4;
            let Some(out) = frame.data.get_mut(dst..dst + 4) else {
                continue;
            };
            for c in 0..3 {
                let s = u32::from(icon.pixels[src + c]);
                let d = u32::from(out[c]);
                out[c] = ((s * alpha + d * (255 - alpha)) / 255) as u8;
            }
            out[3] = 255;
            drawn = true;
        }
    }

    drawn
}
