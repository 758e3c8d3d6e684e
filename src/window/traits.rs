use serde::Serialize;

use crate::errors::ReplayResult;
use crate::perception::types::Rect;

/// Opaque platform window handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct WindowHandle(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowInfo {
    pub handle: WindowHandle,
    pub title: String,
    pub rect: Rect,
}

/// Desktop window enumeration and placement.
pub trait WindowManager: Send + Sync {
    /// Visible top-level windows, front-most first.
    fn list_windows(&self) -> ReplayResult<Vec<WindowInfo>>;

    fn foreground_window(&self) -> ReplayResult<Option<WindowInfo>>;

    fn geometry(&self, handle: WindowHandle) -> ReplayResult<Rect>;

    fn set_geometry(&self, handle: WindowHandle, rect: Rect) -> ReplayResult<()>;

    fn find_window(&self, title: &str) -> ReplayResult<Option<WindowInfo>> {
        let windows = self.list_windows()?;
        Ok(select_window(&windows, title).cloned())
    }
}

/// Picks the window a recorded title refers to. `windows` must be in
/// front-to-back order. An exact, case-sensitive title wins; otherwise the
/// front-most window whose title contains `title` ignoring case. An empty
/// title never matches.
pub fn select_window<'a>(windows: &'a [WindowInfo], title: &str) -> Option<&'a WindowInfo> {
    if title.is_empty() {
        return None;
    }
    if let Some(exact) = windows.iter().find(|w| w.title == title) {
        return Some(exact);
    }
    let needle = title.to_lowercase();
    windows
        .iter()
        .find(|w| !w.title.is_empty() && w.title.to_lowercase().contains(&needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn win(id: u64, title: &str) -> WindowInfo {
        WindowInfo {
            handle: WindowHandle(id),
            title: title.into(),
            rect: Rect::new(0, 0, 10, 10),
        }
    }

    #[test]
    fn exact_title_beats_front_most_substring() {
        let ws = [win(1, "notes.txt - Notepad++"), win(2, "Notepad")];
        assert_eq!(select_window(&ws, "Notepad").unwrap().handle, WindowHandle(2));
    }

    #[test]
    fn substring_match_is_case_insensitive_and_front_most() {
        let ws = [win(1, "Browser"), win(2, "a.txt - NOTEPAD"), win(3, "b.txt - Notepad")];
        assert_eq!(select_window(&ws, "notepad").unwrap().handle, WindowHandle(2));
    }

    #[test]
    fn exact_match_is_case_sensitive() {
        let ws = [win(1, "notepad - readme"), win(2, "NOTEPAD")];
        assert_eq!(select_window(&ws, "Notepad").unwrap().handle, WindowHandle(1));
    }

    #[test]
    fn empty_or_absent_titles_never_match() {
        let ws = [win(1, ""), win(2, "Terminal")];
        assert!(select_window(&ws, "").is_none());
        assert!(select_window(&ws, "Notepad").is_none());
    }
}
