pub mod restore;
pub mod traits;
pub mod win32;

use std::sync::Arc;

pub use traits::{select_window, WindowHandle, WindowInfo, WindowManager};

/// The window backend for the current platform.
pub fn system_window_manager() -> Arc<dyn WindowManager> {
    #[cfg(windows)]
    {
        Arc::new(win32::Win32Windows)
    }
    #[cfg(not(windows))]
    {
        Arc::new(win32::UnavailableWindows)
    }
}
