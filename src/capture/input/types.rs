use crate::recorder::clock::SessionTime;
use crate::storage::CsvRecord;
use serde::{Deserialize, Serialize};

// Win32 message codes delivered to low-level hooks. Decoding is kept portable
// so the classification logic is testable everywhere.
pub const WM_KEYDOWN: u32 = 0x0100;
pub const WM_KEYUP: u32 = 0x0101;
pub const WM_SYSKEYDOWN: u32 = 0x0104;
pub const WM_SYSKEYUP: u32 = 0x0105;
pub const WM_MOUSEMOVE: u32 = 0x0200;
pub const WM_LBUTTONDOWN: u32 = 0x0201;
pub const WM_LBUTTONUP: u32 = 0x0202;
pub const WM_LBUTTONDBLCLK: u32 = 0x0203;
pub const WM_RBUTTONDOWN: u32 = 0x0204;
pub const WM_RBUTTONUP: u32 = 0x0205;
pub const WM_RBUTTONDBLCLK: u32 = 0x0206;
pub const WM_MBUTTONDOWN: u32 = 0x0207;
pub const WM_MBUTTONUP: u32 = 0x0208;
pub const WM_MBUTTONDBLCLK: u32 = 0x0209;
pub const WM_MOUSEWHEEL: u32 = 0x020A;
pub const WM_XBUTTONDOWN: u32 = 0x020B;
pub const WM_XBUTTONUP: u32 = 0x020C;
pub const WM_XBUTTONDBLCLK: u32 = 0x020D;
pub const WM_MOUSEHWHEEL: u32 = 0x020E;

pub const XBUTTON1: u16 = 0x0001;
pub const XBUTTON2: u16 = 0x0002;

pub const VK_RBUTTON: u32 = 0x02;
pub const VK_CONTROL: u32 = 0x11;
pub const VK_SPACE: u32 = 0x20;

/// Logical mouse button, independent of the message that reported it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    X1,
    X2,
}

/// Whether a button/key went down or up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ButtonPhase {
    Press,
    Release,
}

/// Decoded low-level mouse message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseMessage {
    Move,
    Button(MouseButton, ButtonPhase),
    Wheel,
}

/// Classify a keyboard hook message
pub fn decode_keyboard_message(message: u32) -> Option<ButtonPhase> {
    match message {
        WM_KEYDOWN | WM_SYSKEYDOWN => Some(ButtonPhase::Press),
        WM_KEYUP | WM_SYSKEYUP => Some(ButtonPhase::Release),
        _ => None,
    }
}

/// Classify a mouse hook message into (button, phase).
///
/// Press and release arrive under different codes; both map onto the same
/// `MouseButton` so they pair up in the matcher. Double-click messages count
/// as presses. `mouse_data` carries the X button identity in its high word.
pub fn decode_mouse_message(message: u32, mouse_data: u32) -> Option<MouseMessage> {
    use ButtonPhase::*;
    use MouseButton::*;

    let xbutton = || match (mouse_data >> 16) as u16 {
        XBUTTON1 => Some(X1),
        XBUTTON2 => Some(X2),
        _ => None,
    };

    let decoded = match message {
        WM_MOUSEMOVE => MouseMessage::Move,
        WM_MOUSEWHEEL | WM_MOUSEHWHEEL => MouseMessage::Wheel,
        WM_LBUTTONDOWN | WM_LBUTTONDBLCLK => MouseMessage::Button(Left, Press),
        WM_LBUTTONUP => MouseMessage::Button(Left, Release),
        WM_RBUTTONDOWN | WM_RBUTTONDBLCLK => MouseMessage::Button(Right, Press),
        WM_RBUTTONUP => MouseMessage::Button(Right, Release),
        WM_MBUTTONDOWN | WM_MBUTTONDBLCLK => MouseMessage::Button(Middle, Press),
        WM_MBUTTONUP => MouseMessage::Button(Middle, Release),
        WM_XBUTTONDOWN | WM_XBUTTONDBLCLK => MouseMessage::Button(xbutton()?, Press),
        WM_XBUTTONUP => MouseMessage::Button(xbutton()?, Release),
        _ => return None,
    };
    Some(decoded)
}

/// One raw notification, stamped on the OS tick clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawInputEvent {
    pub kind: InputEventKind,
    pub time_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEventKind {
    Key { vk_code: u32, phase: ButtonPhase },
    Button { button: MouseButton, phase: ButtonPhase },
    Move { x: i32, y: i32 },
    Wheel,
}

impl RawInputEvent {
    pub fn key(vk_code: u32, phase: ButtonPhase, time_ms: u64) -> Self {
        Self {
            kind: InputEventKind::Key { vk_code, phase },
            time_ms,
        }
    }

    pub fn button(button: MouseButton, phase: ButtonPhase, time_ms: u64) -> Self {
        Self {
            kind: InputEventKind::Button { button, phase },
            time_ms,
        }
    }

    pub fn moved(x: i32, y: i32, time_ms: u64) -> Self {
        Self {
            kind: InputEventKind::Move { x, y },
            time_ms,
        }
    }
}

/// A matched press/release pair, session-relative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalRecord {
    pub start_ms: u64,
    pub end_ms: u64,
    pub duration_ms: u64,
    pub suspect: bool,
}

impl IntervalRecord {
    pub fn between(start: SessionTime, end: SessionTime) -> Self {
        Self {
            start_ms: start.ms,
            end_ms: end.ms,
            duration_ms: end.ms.saturating_sub(start.ms),
            suspect: start.suspect || end.suspect || end.ms < start.ms,
        }
    }
}

impl CsvRecord for IntervalRecord {
    fn csv_fields(&self) -> Vec<String> {
        vec![
            self.start_ms.to_string(),
            self.end_ms.to_string(),
            self.duration_ms.to_string(),
            u8::from(self.suspect).to_string(),
        ]
    }
}

/// One pointer-move sample, session-relative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveSample {
    pub timestamp_ms: u64,
    pub x: i32,
    pub y: i32,
    /// `None` for the first move of a session
    pub delta_since_previous_ms: Option<u64>,
    pub suspect: bool,
}

impl MoveSample {
    pub fn has_predecessor(&self) -> bool {
        self.delta_since_previous_ms.is_some()
    }
}

impl CsvRecord for MoveSample {
    fn csv_fields(&self) -> Vec<String> {
        vec![
            self.timestamp_ms.to_string(),
            self.x.to_string(),
            self.y.to_string(),
            self.delta_since_previous_ms
                .map(|d| d.to_string())
                .unwrap_or_default(),
            u8::from(self.suspect).to_string(),
        ]
    }
}
