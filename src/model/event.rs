use std::fmt;
use std::time::Duration;

use crate::model::anchor::AnchorSpec;
use crate::perception::types::Rect;

/// Wire names of every event kind, in file-format order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MouseMove,
    MouseClick,
    MouseScroll,
    KeyDown,
    KeyUp,
    Text,
    Wait,
    Screenshot,
    OcrRegion,
    OpenUrl,
    WaitForImage,
    WindowRestore,
}

impl EventKind {
    pub const ALL: [EventKind; 12] = [
        EventKind::MouseMove,
        EventKind::MouseClick,
        EventKind::MouseScroll,
        EventKind::KeyDown,
        EventKind::KeyUp,
        EventKind::Text,
        EventKind::Wait,
        EventKind::Screenshot,
        EventKind::OcrRegion,
        EventKind::OpenUrl,
        EventKind::WaitForImage,
        EventKind::WindowRestore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::MouseMove => "mouse_move",
            EventKind::MouseClick => "mouse_click",
            EventKind::MouseScroll => "mouse_scroll",
            EventKind::KeyDown => "key_down",
            EventKind::KeyUp => "key_up",
            EventKind::Text => "text",
            EventKind::Wait => "wait",
            EventKind::Screenshot => "screenshot",
            EventKind::OcrRegion => "ocr_region",
            EventKind::OpenUrl => "open_url",
            EventKind::WaitForImage => "wait_for_image",
            EventKind::WindowRestore => "window_restore",
        }
    }

    pub fn parse(etype: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == etype)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    /// Accepts any recorded identifier ("Button.right", "right", "RIGHT").
    /// Anything unrecognised is the left button.
    pub fn from_recorded(s: &str) -> Self {
        let lower = s.to_ascii_lowercase();
        if lower.contains("right") {
            MouseButton::Right
        } else if lower.contains("middle") {
            MouseButton::Middle
        } else {
            MouseButton::Left
        }
    }

    pub fn as_recorded(&self) -> &'static str {
        match self {
            MouseButton::Left => "Button.left",
            MouseButton::Right => "Button.right",
            MouseButton::Middle => "Button.middle",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClickAction {
    pub x: i32,
    pub y: i32,
    pub button: MouseButton,
    pub pressed: bool,
    pub anchor: Option<AnchorSpec>,
}

/// Geometry of the window that was in front when recording started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowGeometrySnapshot {
    pub title: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl WindowGeometrySnapshot {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

/// Kind-specific payload. Each variant carries exactly the fields its
/// `etype` needs.
#[derive(Debug, Clone, PartialEq)]
pub enum MacroAction {
    MouseMove { x: i32, y: i32 },
    MouseClick(ClickAction),
    MouseScroll { x: i32, y: i32, dx: i32, dy: i32 },
    KeyDown { key: String },
    KeyUp { key: String },
    Text { text: String },
    Wait,
    Screenshot { image_b64: String },
    OcrRegion { region: Rect },
    OpenUrl { url: String },
    WaitForImage { anchor_b64: String, timeout: Duration },
    WindowRestore(WindowGeometrySnapshot),
}

impl MacroAction {
    pub fn kind(&self) -> EventKind {
        match self {
            MacroAction::MouseMove { .. } => EventKind::MouseMove,
            MacroAction::MouseClick(_) => EventKind::MouseClick,
            MacroAction::MouseScroll { .. } => EventKind::MouseScroll,
            MacroAction::KeyDown { .. } => EventKind::KeyDown,
            MacroAction::KeyUp { .. } => EventKind::KeyUp,
            MacroAction::Text { .. } => EventKind::Text,
            MacroAction::Wait => EventKind::Wait,
            MacroAction::Screenshot { .. } => EventKind::Screenshot,
            MacroAction::OcrRegion { .. } => EventKind::OcrRegion,
            MacroAction::OpenUrl { .. } => EventKind::OpenUrl,
            MacroAction::WaitForImage { .. } => EventKind::WaitForImage,
            MacroAction::WindowRestore(_) => EventKind::WindowRestore,
        }
    }
}

/// One recorded step: wait `delay`, then perform `action`.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroEvent {
    pub delay: Duration,
    pub action: MacroAction,
}

impl MacroEvent {
    pub fn new(delay: Duration, action: MacroAction) -> Self {
        Self { delay, action }
    }

    pub fn kind(&self) -> EventKind {
        self.action.kind()
    }

    /// Anchor to relocate this step visually, if it has one.
    pub fn anchor(&self) -> Option<&AnchorSpec> {
        match &self.action {
            MacroAction::MouseClick(click) if click.pressed => click.anchor.as_ref(),
            _ => None,
        }
    }
}
