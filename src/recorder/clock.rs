//! Session clock
//!
//! Keyboard, mouse and screen events each arrive stamped by the OS tick
//! counter. The session clock fixes one epoch on that counter when recording
//! begins and rebases every stamp onto it, so all three streams share the
//! same session-relative timeline.

use serde::{Deserialize, Serialize};

/// Source of absolute OS tick milliseconds
pub trait TickSource: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// The system tick counter
///
/// On Windows this is `GetTickCount64`, the clock low-level hooks stamp their
/// events with. Elsewhere it is a process-wide monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTicks;

impl TickSource for SystemTicks {
    #[cfg(target_os = "windows")]
    fn now_ms(&self) -> u64 {
        unsafe { windows::Win32::System::SystemInformation::GetTickCount64() }
    }

    #[cfg(not(target_os = "windows"))]
    fn now_ms(&self) -> u64 {
        use std::sync::OnceLock;
        use std::time::Instant;

        static ORIGIN: OnceLock<Instant> = OnceLock::new();
        ORIGIN.get_or_init(Instant::now).elapsed().as_millis() as u64
    }
}

/// Extend a 32-bit hook timestamp into the 64-bit tick domain.
///
/// Picks the latest 64-bit tick not after `now_ms` whose low 32 bits equal
/// `tick32`.
pub fn widen_tick(tick32: u32, now_ms: u64) -> u64 {
    let candidate = (now_ms & !0xFFFF_FFFF) | u64::from(tick32);
    if candidate > now_ms && candidate >= 1 << 32 {
        candidate - (1 << 32)
    } else {
        candidate
    }
}

/// A rebased, session-relative timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTime {
    /// Milliseconds since the session epoch
    pub ms: u64,
    /// Set when the absolute stamp preceded the epoch and was clamped to zero
    pub suspect: bool,
}

impl SessionTime {
    pub const fn exact(ms: u64) -> Self {
        Self { ms, suspect: false }
    }
}

/// Epoch fixed at recording start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClock {
    epoch_ms: u64,
}

impl SessionClock {
    pub fn new(epoch_ms: u64) -> Self {
        Self { epoch_ms }
    }

    /// Fix the epoch at the current tick of `ticks`
    pub fn start(ticks: &dyn TickSource) -> Self {
        Self::new(ticks.now_ms())
    }

    pub fn epoch_ms(&self) -> u64 {
        self.epoch_ms
    }

    /// `absolute_ms - epoch`, clamped to zero and marked suspect when the
    /// stamp predates the epoch.
    pub fn rebase(&self, absolute_ms: u64) -> SessionTime {
        match absolute_ms.checked_sub(self.epoch_ms) {
            Some(ms) => SessionTime { ms, suspect: false },
            None => SessionTime {
                ms: 0,
                suspect: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebase_after_epoch() {
        let clock = SessionClock::new(10_000);
        assert_eq!(clock.rebase(10_250), SessionTime::exact(250));
        assert_eq!(clock.rebase(10_000), SessionTime::exact(0));
    }

    #[test]
    fn test_rebase_before_epoch_is_clamped_and_suspect() {
        let clock = SessionClock::new(10_000);
        let t = clock.rebase(9_000);
        assert_eq!(t.ms, 0);
        assert!(t.suspect);
    }

    #[test]
    fn test_widen_tick_same_epoch() {
        let now = (3u64 << 32) + 5_000;
        assert_eq!(widen_tick(4_000, now), (3u64 << 32) + 4_000);
    }

    #[test]
    fn test_widen_tick_across_wraparound() {
        // Hook stamped just before the low word wrapped, delivered just after.
        let now = (3u64 << 32) + 10;
        let stamped = u32::MAX - 5;
        assert_eq!(widen_tick(stamped, now), (2u64 << 32) + u64::from(stamped));
    }

    #[test]
    fn test_widen_tick_small_uptime() {
        // No earlier epoch to borrow from: keep the candidate.
        assert_eq!(widen_tick(900, 500), 900);
    }

    #[test]
    fn test_system_ticks_monotonic() {
        let ticks = SystemTicks;
        let a = ticks.now_ms();
        let b = ticks.now_ms();
        assert!(b >= a);
    }
}
