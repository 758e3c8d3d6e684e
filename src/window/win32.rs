use crate::errors::{ReplayError, ReplayResult};
use crate::perception::types::Rect;
use crate::window::traits::{WindowHandle, WindowInfo, WindowManager};

/// Stand-in on platforms without a window backend.
pub struct UnavailableWindows;

impl UnavailableWindows {
    fn err<T>() -> ReplayResult<T> {
        Err(ReplayError::ProviderUnavailable("window management on this platform".into()))
    }
}

impl WindowManager for UnavailableWindows {
    fn list_windows(&self) -> ReplayResult<Vec<WindowInfo>> {
        Self::err()
    }
    fn foreground_window(&self) -> ReplayResult<Option<WindowInfo>> {
        Self::err()
    }
    fn geometry(&self, _handle: WindowHandle) -> ReplayResult<Rect> {
        Self::err()
    }
    fn set_geometry(&self, _handle: WindowHandle, _rect: Rect) -> ReplayResult<()> {
        Self::err()
    }
}

// ── Win32 implementation ────────────────────────────────────────────────────

#[cfg(windows)]
mod native {
    use super::*;
    use windows::Win32::Foundation::{BOOL, HWND, LPARAM, RECT};
    use windows::Win32::UI::WindowsAndMessaging::{
        EnumWindows, GetForegroundWindow, GetWindowRect, GetWindowTextLengthW, GetWindowTextW,
        IsIconic, IsWindowVisible, SetWindowPos, ShowWindow, SWP_NOACTIVATE, SWP_NOZORDER,
        SW_RESTORE,
    };

    /// Top-level windows through the Win32 API. `EnumWindows` reports
    /// windows in z-order, which is the order `list_windows` keeps.
    pub struct Win32Windows;

    fn to_hwnd(handle: WindowHandle) -> HWND {
        HWND(handle.0 as usize as *mut core::ffi::c_void)
    }

    fn to_handle(hwnd: HWND) -> WindowHandle {
        WindowHandle(hwnd.0 as usize as u64)
    }

    fn title_of(hwnd: HWND) -> String {
        // SAFETY: `hwnd` came from the window manager; stale handles make
        // these calls fail, not fault.
        unsafe {
            let len = GetWindowTextLengthW(hwnd);
            if len <= 0 {
                return String::new();
            }
            let mut buf = vec![0u16; len as usize + 1];
            let copied = GetWindowTextW(hwnd, &mut buf);
            String::from_utf16_lossy(&buf[..copied.max(0) as usize])
        }
    }

    fn rect_of(hwnd: HWND) -> ReplayResult<Rect> {
        let mut r = RECT::default();
        // SAFETY: `r` is a valid out-pointer for the duration of the call.
        unsafe { GetWindowRect(hwnd, &mut r) }
            .map_err(|e| ReplayError::Provider(format!("GetWindowRect: {e}")))?;
        Ok(Rect::new(
            r.left,
            r.top,
            (r.right - r.left).max(0) as u32,
            (r.bottom - r.top).max(0) as u32,
        ))
    }

    unsafe extern "system" fn collect(hwnd: HWND, lparam: LPARAM) -> BOOL {
        let out = &mut *(lparam.0 as *mut Vec<HWND>);
        if IsWindowVisible(hwnd).as_bool() {
            out.push(hwnd);
        }
        BOOL(1)
    }

    impl WindowManager for Win32Windows {
        fn list_windows(&self) -> ReplayResult<Vec<WindowInfo>> {
            let mut hwnds: Vec<HWND> = Vec::new();
            // SAFETY: `collect` only runs during this call, while `hwnds` is alive.
            unsafe { EnumWindows(Some(collect), LPARAM(&mut hwnds as *mut Vec<HWND> as isize)) }
                .map_err(|e| ReplayError::Provider(format!("EnumWindows: {e}")))?;

            Ok(hwnds
                .into_iter()
                .filter_map(|hwnd| {
                    let title = title_of(hwnd);
                    if title.is_empty() {
                        return None;
                    }
                    let rect = rect_of(hwnd).ok()?;
                    Some(WindowInfo {
                        handle: to_handle(hwnd),
                        title,
                        rect,
                    })
                })
                .collect())
        }

        fn foreground_window(&self) -> ReplayResult<Option<WindowInfo>> {
            // SAFETY: no arguments; returns a null handle when nothing is focused.
            let hwnd = unsafe { GetForegroundWindow() };
            if hwnd.0.is_null() {
                return Ok(None);
            }
            Ok(Some(WindowInfo {
                handle: to_handle(hwnd),
                title: title_of(hwnd),
                rect: rect_of(hwnd)?,
            }))
        }

        fn geometry(&self, handle: WindowHandle) -> ReplayResult<Rect> {
            rect_of(to_hwnd(handle))
        }

        fn set_geometry(&self, handle: WindowHandle, rect: Rect) -> ReplayResult<()> {
            let hwnd = to_hwnd(handle);
            // SAFETY: plain Win32 calls on a handle; invalid handles return errors.
            unsafe {
                if IsIconic(hwnd).as_bool() {
                    let _ = ShowWindow(hwnd, SW_RESTORE);
                }
                SetWindowPos(
                    hwnd,
                    HWND::default(),
                    rect.x,
                    rect.y,
                    rect.width as i32,
                    rect.height as i32,
                    SWP_NOZORDER | SWP_NOACTIVATE,
                )
            }
            .map_err(|e| ReplayError::Provider(format!("SetWindowPos: {e}")))
        }
    }
}

#[cfg(windows)]
pub use native::Win32Windows;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_reports_unavailable() {
        assert!(UnavailableWindows.list_windows().unwrap_err().is_unavailable());
        assert!(UnavailableWindows.find_window("x").unwrap_err().is_unavailable());
    }
}
