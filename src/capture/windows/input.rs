//! Low-level keyboard and mouse hooks
//!
//! Both hooks live on a dedicated thread that pumps messages until it is
//! sent `WM_QUIT`.

use crate::capture::input::hook::InputHook;
use crate::capture::input::router::InputRouter;
use crate::capture::input::types::{
    decode_keyboard_message, decode_mouse_message, MouseMessage, RawInputEvent,
};
use crate::recorder::channel::{RecordingError, RecordingResult};
use crate::recorder::clock::widen_tick;
use async_trait::async_trait;
use std::cell::RefCell;
use std::sync::Arc;
use std::thread::JoinHandle;
use windows::core::PCWSTR;
use windows::Win32::Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::SystemInformation::GetTickCount64;
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, GetMessageW, PeekMessageW, PostThreadMessageW,
    SetWindowsHookExW, TranslateMessage, UnhookWindowsHookEx, HHOOK, KBDLLHOOKSTRUCT, MSG,
    MSLLHOOKSTRUCT, PM_NOREMOVE, WH_KEYBOARD_LL, WH_MOUSE_LL, WM_QUIT,
};

thread_local! {
    // Hook procedures run on the thread that installed them.
    static ROUTER: RefCell<Option<Arc<InputRouter>>> = const { RefCell::new(None) };
}

fn dispatch(event: RawInputEvent) {
    let _ = ROUTER.try_with(|slot| {
        if let Ok(slot) = slot.try_borrow() {
            if let Some(router) = slot.as_ref() {
                router.handle(event);
            }
        }
    });
}

fn hook_time(time32: u32) -> u64 {
    widen_tick(time32, unsafe { GetTickCount64() })
}

unsafe extern "system" fn keyboard_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code >= 0 && lparam.0 != 0 {
        if let Some(phase) = decode_keyboard_message(wparam.0 as u32) {
            let info = &*(lparam.0 as *const KBDLLHOOKSTRUCT);
            dispatch(RawInputEvent::key(info.vkCode, phase, hook_time(info.time)));
        }
    }
    CallNextHookEx(HHOOK::default(), code, wparam, lparam)
}

unsafe extern "system" fn mouse_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code >= 0 && lparam.0 != 0 {
        let info = &*(lparam.0 as *const MSLLHOOKSTRUCT);
        let time_ms = hook_time(info.time);
        match decode_mouse_message(wparam.0 as u32, info.mouseData) {
            Some(MouseMessage::Move) => {
                dispatch(RawInputEvent::moved(info.pt.x, info.pt.y, time_ms));
            }
            Some(MouseMessage::Button(button, phase)) => {
                dispatch(RawInputEvent::button(button, phase, time_ms));
            }
            Some(MouseMessage::Wheel) | None => {}
        }
    }
    CallNextHookEx(HHOOK::default(), code, wparam, lparam)
}

/// Both low-level hooks, owned by the hook thread
struct HookGuard {
    keyboard: Option<HHOOK>,
    mouse: Option<HHOOK>,
}

impl HookGuard {
    fn install() -> RecordingResult<Self> {
        let module = unsafe { GetModuleHandleW(PCWSTR::null()) }
            .map_err(|e| RecordingError::HookInstall(format!("GetModuleHandleW: {}", e)))?;
        let instance = HINSTANCE(module.0);

        let mut guard = Self {
            keyboard: None,
            mouse: None,
        };

        let keyboard = unsafe { SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_proc), instance, 0) }
            .map_err(|e| RecordingError::HookInstall(format!("keyboard hook: {}", e)))?;
        guard.keyboard = Some(keyboard);

        // On failure the guard drops and unhooks the keyboard.
        let mouse = unsafe { SetWindowsHookExW(WH_MOUSE_LL, Some(mouse_proc), instance, 0) }
            .map_err(|e| RecordingError::HookInstall(format!("mouse hook: {}", e)))?;
        guard.mouse = Some(mouse);

        Ok(guard)
    }

    fn release(&mut self) {
        for (name, hook) in [("keyboard", self.keyboard.take()), ("mouse", self.mouse.take())] {
            if let Some(hook) = hook {
                if let Err(e) = unsafe { UnhookWindowsHookEx(hook) } {
                    tracing::warn!("Failed to remove {} hook: {}", name, e);
                }
            }
        }
    }
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Low-level keyboard and mouse hooks on a dedicated message-loop thread
#[derive(Default)]
pub struct WindowsInputHook {
    thread: Option<JoinHandle<()>>,
    thread_id: Option<u32>,
}

impl WindowsInputHook {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InputHook for WindowsInputHook {
    async fn install(&mut self, router: Arc<InputRouter>) -> RecordingResult<()> {
        if self.thread.is_some() {
            return Err(RecordingError::HookInstall("Hooks already installed".to_string()));
        }

        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel::<RecordingResult<u32>>();

        let handle = std::thread::Builder::new()
            .name("input-hooks".to_string())
            .spawn(move || {
                ROUTER.with(|slot| *slot.borrow_mut() = Some(router));

                let mut guard = match HookGuard::install() {
                    Ok(guard) => guard,
                    Err(e) => {
                        ROUTER.with(|slot| slot.borrow_mut().take());
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let mut msg = MSG::default();
                unsafe {
                    // Creates the thread's message queue so WM_QUIT can be posted.
                    let _ = PeekMessageW(&mut msg, HWND::default(), 0, 0, PM_NOREMOVE);
                }
                let _ = ready_tx.send(Ok(unsafe { GetCurrentThreadId() }));

                tracing::debug!("Input hook thread running");
                unsafe {
                    while GetMessageW(&mut msg, HWND::default(), 0, 0).0 > 0 {
                        let _ = TranslateMessage(&msg);
                        DispatchMessageW(&msg);
                    }
                }

                guard.release();
                ROUTER.with(|slot| slot.borrow_mut().take());
                tracing::debug!("Input hook thread exited");
            })?;

        let ready = ready_rx.await.unwrap_or_else(|_| {
            Err(RecordingError::HookInstall(
                "Hook thread exited during startup".to_string(),
            ))
        });

        match ready {
            Ok(thread_id) => {
                self.thread = Some(handle);
                self.thread_id = Some(thread_id);
                tracing::info!("Low-level input hooks installed");
                Ok(())
            }
            Err(e) => {
                let _ = handle.join();
                Err(e)
            }
        }
    }

    async fn release(&mut self) -> RecordingResult<()> {
        let Some(handle) = self.thread.take() else {
            return Ok(());
        };

        if let Some(thread_id) = self.thread_id.take() {
            unsafe { PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) }.map_err(|e| {
                RecordingError::PlatformError(format!("Failed to stop hook thread: {}", e))
            })?;
        }

        tokio::task::spawn_blocking(move || handle.join())
            .await
            .map_err(|e| RecordingError::PlatformError(format!("Failed to join hook thread: {}", e)))?
            .map_err(|_| RecordingError::PlatformError("Hook thread panicked".to_string()))?;

        tracing::info!("Low-level input hooks released");
        Ok(())
    }

    fn is_installed(&self) -> bool {
        self.thread.is_some()
    }
}
