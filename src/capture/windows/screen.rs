//! GDI screen and cursor capture for the primary display

use crate::capture::screen::cursor::{CursorIcon, CursorSource, CursorState};
use crate::capture::screen::driver::ScreenSource;
use crate::recorder::channel::{CapturedFrame, RecordingError, RecordingResult};
use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::Arc;
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Gdi::{
    BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC, GetDIBits,
    GetObjectW, ReleaseDC, SelectObject, BITMAP, BITMAPINFO, BITMAPINFOHEADER, BI_RGB,
    DIB_RGB_COLORS, HBITMAP, HDC, SRCCOPY,
};
use windows::Win32::UI::WindowsAndMessaging::{
    GetCursorInfo, GetIconInfo, GetSystemMetrics, CURSORINFO, CURSOR_SHOWING, HICON, ICONINFO,
    SM_CXSCREEN, SM_CYSCREEN,
};

/// Read a bitmap as top-down 32-bit BGRA
fn read_bgra(dc: HDC, bitmap: HBITMAP, width: i32, height: i32) -> Option<Vec<u8>> {
    let mut info = BITMAPINFO {
        bmiHeader: BITMAPINFOHEADER {
            biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
            biWidth: width,
            biHeight: -height,
            biPlanes: 1,
            biBitCount: 32,
            biCompression: BI_RGB.0,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut pixels = vec![0u8; (width * height * 4) as usize];
    let lines = unsafe {
        GetDIBits(
            dc,
            bitmap,
            0,
            height as u32,
            Some(pixels.as_mut_ptr() as *mut c_void),
            &mut info,
            DIB_RGB_COLORS,
        )
    };
    (lines != 0).then_some(pixels)
}

/// Primary display grabbed through GDI
pub struct GdiScreenSource {
    screen_dc: HDC,
    memory_dc: HDC,
    bitmap: HBITMAP,
    width: i32,
    height: i32,
}

// GDI handles are only touched from the capture thread after `open`.
unsafe impl Send for GdiScreenSource {}

impl GdiScreenSource {
    pub fn new() -> Self {
        Self {
            screen_dc: HDC::default(),
            memory_dc: HDC::default(),
            bitmap: HBITMAP::default(),
            width: 0,
            height: 0,
        }
    }
}

impl Default for GdiScreenSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ScreenSource for GdiScreenSource {
    fn open(&mut self) -> RecordingResult<(u32, u32)> {
        self.close();
        unsafe {
            self.width = GetSystemMetrics(SM_CXSCREEN);
            self.height = GetSystemMetrics(SM_CYSCREEN);
            if self.width <= 0 || self.height <= 0 {
                return Err(RecordingError::CaptureError(
                    "Primary display has no size".to_string(),
                ));
            }

            self.screen_dc = GetDC(HWND::default());
            if self.screen_dc.is_invalid() {
                return Err(RecordingError::CaptureError("GetDC failed".to_string()));
            }
            self.memory_dc = CreateCompatibleDC(self.screen_dc);
            if self.memory_dc.is_invalid() {
                return Err(RecordingError::CaptureError(
                    "CreateCompatibleDC failed".to_string(),
                ));
            }
            self.bitmap = CreateCompatibleBitmap(self.screen_dc, self.width, self.height);
            if self.bitmap.is_invalid() {
                return Err(RecordingError::CaptureError(
                    "CreateCompatibleBitmap failed".to_string(),
                ));
            }
        }

        Ok((self.width as u32, self.height as u32))
    }

    fn grab(&mut self) -> RecordingResult<CapturedFrame> {
        unsafe {
            let previous = SelectObject(self.memory_dc, self.bitmap);
            let copied = BitBlt(
                self.memory_dc,
                0,
                0,
                self.width,
                self.height,
                self.screen_dc,
                0,
                0,
                SRCCOPY,
            );
            SelectObject(self.memory_dc, previous);
            copied.map_err(|e| RecordingError::CaptureError(format!("BitBlt: {}", e)))?;
        }

        let data = read_bgra(self.memory_dc, self.bitmap, self.width, self.height)
            .ok_or_else(|| RecordingError::CaptureError("GetDIBits failed".to_string()))?;

        Ok(CapturedFrame {
            data,
            width: self.width as u32,
            height: self.height as u32,
            bytes_per_row: self.width as u32 * 4,
            capture_ms: 0,
        })
    }

    fn close(&mut self) {
        unsafe {
            if !self.bitmap.is_invalid() {
                let _ = DeleteObject(self.bitmap);
            }
            if !self.memory_dc.is_invalid() {
                let _ = DeleteDC(self.memory_dc);
            }
            if !self.screen_dc.is_invalid() {
                ReleaseDC(HWND::default(), self.screen_dc);
            }
        }
        self.bitmap = HBITMAP::default();
        self.memory_dc = HDC::default();
        self.screen_dc = HDC::default();
    }
}

impl Drop for GdiScreenSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Cursor position and shape from `GetCursorInfo`
///
/// Icons are converted once per cursor handle and cached.
#[derive(Default)]
pub struct WindowsCursorSource {
    icons: HashMap<isize, Option<Arc<CursorIcon>>>,
}

impl WindowsCursorSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn load_icon(icon: HICON) -> Option<CursorIcon> {
        let mut info = ICONINFO::default();
        unsafe { GetIconInfo(icon, &mut info) }.ok()?;

        let converted = Self::convert(&info);

        unsafe {
            if !info.hbmColor.is_invalid() {
                let _ = DeleteObject(info.hbmColor);
            }
            if !info.hbmMask.is_invalid() {
                let _ = DeleteObject(info.hbmMask);
            }
        }
        converted
    }

    fn bitmap_size(bitmap: HBITMAP) -> Option<(i32, i32)> {
        let mut header = BITMAP::default();
        let read = unsafe {
            GetObjectW(
                bitmap,
                std::mem::size_of::<BITMAP>() as i32,
                Some(&mut header as *mut BITMAP as *mut c_void),
            )
        };
        (read != 0).then_some((header.bmWidth, header.bmHeight))
    }

    fn convert(info: &ICONINFO) -> Option<CursorIcon> {
        let dc = unsafe { GetDC(HWND::default()) };
        if dc.is_invalid() {
            return None;
        }

        let icon = if !info.hbmColor.is_invalid() {
            Self::convert_color(dc, info)
        } else {
            Self::convert_monochrome(dc, info)
        };

        unsafe { ReleaseDC(HWND::default(), dc) };
        icon
    }

    fn convert_color(dc: HDC, info: &ICONINFO) -> Option<CursorIcon> {
        let (width, height) = Self::bitmap_size(info.hbmColor)?;
        let mut pixels = read_bgra(dc, info.hbmColor, width, height)?;

        // Icons without an alpha channel take their transparency from the mask.
        if pixels.chunks_exact(4).all(|p| p[3] == 0) {
            let mask = read_bgra(dc, info.hbmMask, width, height)?;
            for (pixel, m) in pixels.chunks_exact_mut(4).zip(mask.chunks_exact(4)) {
                pixel[3] = if m[0] == 0 { 255 } else { 0 };
            }
        }

        Some(CursorIcon {
            width: width as u32,
            height: height as u32,
            hotspot_x: info.xHotspot as i32,
            hotspot_y: info.yHotspot as i32,
            pixels,
        })
    }

    /// Monochrome cursors stack the AND mask over the XOR mask.
    fn convert_monochrome(dc: HDC, info: &ICONINFO) -> Option<CursorIcon> {
        let (width, double_height) = Self::bitmap_size(info.hbmMask)?;
        let height = double_height / 2;
        let mask = read_bgra(dc, info.hbmMask, width, double_height)?;
        let (and_plane, xor_plane) = mask.split_at((width * height * 4) as usize);

        let mut pixels = Vec::with_capacity(and_plane.len());
        for (a, x) in and_plane.chunks_exact(4).zip(xor_plane.chunks_exact(4)) {
            let value = x[0];
            let alpha = if a[0] == 0 || value != 0 { 255 } else { 0 };
            pixels.extend_from_slice(&[value, value, value, alpha]);
        }

        Some(CursorIcon {
            width: width as u32,
            height: height as u32,
            hotspot_x: info.xHotspot as i32,
            hotspot_y: info.yHotspot as i32,
            pixels,
        })
    }
}

impl CursorSource for WindowsCursorSource {
    fn read(&mut self) -> Option<CursorState> {
        let mut info = CURSORINFO {
            cbSize: std::mem::size_of::<CURSORINFO>() as u32,
            ..Default::default()
        };
        unsafe { GetCursorInfo(&mut info) }.ok()?;

        let visible = info.flags.0 & CURSOR_SHOWING.0 != 0;
        if !visible || info.hCursor.is_invalid() {
            return Some(CursorState {
                x: info.ptScreenPos.x,
                y: info.ptScreenPos.y,
                visible: false,
                icon: None,
            });
        }

        let key = info.hCursor.0 as isize;
        let icon = self
            .icons
            .entry(key)
            .or_insert_with(|| Self::load_icon(HICON(info.hCursor.0)).map(Arc::new))
            .clone();

        Some(CursorState {
            x: info.ptScreenPos.x,
            y: info.ptScreenPos.y,
            visible: true,
            icon,
        })
    }
}
