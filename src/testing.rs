//! In-memory desktop used by the unit tests: one monitor, stacked windows
//! with pixel content, and a journal of every provider call.
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::errors::{ReplayError, ReplayResult};
use crate::executor::clipboard::ClipboardWriter;
use crate::executor::Providers;
use crate::executor::input::InputInjector;
use crate::executor::keys::KeyCode;
use crate::model::MouseButton;
use crate::perception::traits::{ScreenCapturer, TextRecognizer};
use crate::perception::types::{Monitor, MonitorCapture, Rect};
use crate::window::traits::{WindowHandle, WindowInfo, WindowManager};

#[derive(Debug, Clone, PartialEq)]
pub enum Injected {
    Move(i32, i32),
    Button(i32, i32, MouseButton, bool),
    Scroll(i32, i32),
    Key(KeyCode, bool),
    Text(String),
    Url(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Input(Injected),
    SetGeometry(WindowHandle, Rect),
    Capture,
    Ocr,
    Clipboard(String),
}

struct FakeWindow {
    info: WindowInfo,
    content: Option<RgbaImage>,
}

struct State {
    width: u32,
    height: u32,
    /// Front-most first.
    windows: Vec<FakeWindow>,
    calls: Vec<Call>,
    /// Added to every requested window position, like a window manager
    /// that will not place windows exactly where asked.
    placement_shift: (i32, i32),
    ocr_text: Option<String>,
    input_available: bool,
    capture_available: bool,
    clipboard_available: bool,
}

pub struct FakeDesktop {
    state: Mutex<State>,
}

/// Random grey blocks; distinctive enough for template matching.
pub fn texture(w: u32, h: u32, block: u32, seed: u64) -> RgbaImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let bw = w.div_ceil(block);
    let bh = h.div_ceil(block);
    let cells: Vec<u8> = (0..bw * bh).map(|_| rng.gen()).collect();
    RgbaImage::from_fn(w, h, |x, y| {
        let v = cells[((y / block) * bw + x / block) as usize];
        Rgba([v, v.wrapping_mul(7), 255 - v, 255])
    })
}

impl FakeDesktop {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            state: Mutex::new(State {
                width,
                height,
                windows: Vec::new(),
                calls: Vec::new(),
                placement_shift: (0, 0),
                ocr_text: Some(String::new()),
                input_available: true,
                capture_available: true,
                clipboard_available: true,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Adds a window in front of all existing ones.
    pub fn add_window(&self, id: u64, title: &str, rect: Rect) {
        self.add_window_with_content(id, title, rect, None);
    }

    pub fn add_window_with_content(&self, id: u64, title: &str, rect: Rect, content: Option<RgbaImage>) {
        let info = WindowInfo {
            handle: WindowHandle(id),
            title: title.to_string(),
            rect,
        };
        self.lock().windows.insert(0, FakeWindow { info, content });
    }

    pub fn window_rect(&self, handle: WindowHandle) -> Option<Rect> {
        self.lock()
            .windows
            .iter()
            .find(|w| w.info.handle == handle)
            .map(|w| w.info.rect)
    }

    pub fn set_placement_shift(&self, dx: i32, dy: i32) {
        self.lock().placement_shift = (dx, dy);
    }

    pub fn set_ocr_text(&self, text: Option<&str>) {
        self.lock().ocr_text = text.map(str::to_string);
    }

    pub fn set_input_available(&self, available: bool) {
        self.lock().input_available = available;
    }

    pub fn set_capture_available(&self, available: bool) {
        self.lock().capture_available = available;
    }

    pub fn set_clipboard_available(&self, available: bool) {
        self.lock().clipboard_available = available;
    }

    /// Every provider slot backed by this desktop.
    pub fn providers(self: &Arc<Self>) -> Providers {
        Providers {
            input: self.clone(),
            capture: self.clone(),
            windows: self.clone(),
            ocr: self.clone(),
            clipboard: self.clone(),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn injected(&self) -> Vec<Injected> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Input(i) => Some(i.clone()),
                _ => None,
            })
            .collect()
    }

    fn inject(&self, event: Injected) -> ReplayResult<()> {
        let mut s = self.lock();
        if !s.input_available {
            return Err(ReplayError::ProviderUnavailable("fake input".into()));
        }
        s.calls.push(Call::Input(event));
        Ok(())
    }

    /// Renders the desktop: grey background, windows painted back to front.
    fn render(s: &State) -> RgbaImage {
        let mut screen = RgbaImage::from_pixel(s.width, s.height, Rgba([40, 40, 40, 255]));
        for w in s.windows.iter().rev() {
            let Some(content) = &w.content else { continue };
            for (cx, cy, px) in content.enumerate_pixels() {
                let x = w.info.rect.x + cx as i32;
                let y = w.info.rect.y + cy as i32;
                if x >= 0 && y >= 0 && (x as u32) < s.width && (y as u32) < s.height {
                    screen.put_pixel(x as u32, y as u32, *px);
                }
            }
        }
        screen
    }
}

impl InputInjector for FakeDesktop {
    fn move_to(&self, x: i32, y: i32) -> ReplayResult<()> {
        self.inject(Injected::Move(x, y))
    }
    fn button(&self, x: i32, y: i32, button: MouseButton, down: bool) -> ReplayResult<()> {
        self.inject(Injected::Button(x, y, button, down))
    }
    fn scroll(&self, dx: i32, dy: i32) -> ReplayResult<()> {
        self.inject(Injected::Scroll(dx, dy))
    }
    fn key(&self, key: KeyCode, down: bool) -> ReplayResult<()> {
        self.inject(Injected::Key(key, down))
    }
    fn type_text(&self, text: &str) -> ReplayResult<()> {
        self.inject(Injected::Text(text.to_string()))
    }
    fn open_url(&self, url: &str) -> ReplayResult<()> {
        self.inject(Injected::Url(url.to_string()))
    }
}

impl ScreenCapturer for FakeDesktop {
    fn capture_all(&self) -> ReplayResult<Vec<MonitorCapture>> {
        let mut s = self.lock();
        if !s.capture_available {
            return Err(ReplayError::ProviderUnavailable("fake capture".into()));
        }
        s.calls.push(Call::Capture);
        Ok(vec![MonitorCapture {
            monitor: Monitor {
                id: 0,
                origin_x: 0,
                origin_y: 0,
                width: s.width,
                height: s.height,
                scale_factor: 1.0,
            },
            image: Self::render(&s),
        }])
    }
}

impl WindowManager for FakeDesktop {
    fn list_windows(&self) -> ReplayResult<Vec<WindowInfo>> {
        Ok(self.lock().windows.iter().map(|w| w.info.clone()).collect())
    }

    fn foreground_window(&self) -> ReplayResult<Option<WindowInfo>> {
        Ok(self.lock().windows.first().map(|w| w.info.clone()))
    }

    fn geometry(&self, handle: WindowHandle) -> ReplayResult<Rect> {
        self.window_rect(handle)
            .ok_or_else(|| ReplayError::Provider(format!("no window {:?}", handle)))
    }

    fn set_geometry(&self, handle: WindowHandle, rect: Rect) -> ReplayResult<()> {
        let mut s = self.lock();
        let (dx, dy) = s.placement_shift;
        s.calls.push(Call::SetGeometry(handle, rect));
        let w = s
            .windows
            .iter_mut()
            .find(|w| w.info.handle == handle)
            .ok_or_else(|| ReplayError::Provider(format!("no window {:?}", handle)))?;
        w.info.rect = Rect::new(rect.x + dx, rect.y + dy, rect.width, rect.height);
        Ok(())
    }
}

#[async_trait]
impl TextRecognizer for FakeDesktop {
    async fn recognize(&self, _image: &RgbaImage) -> ReplayResult<String> {
        let mut s = self.lock();
        s.calls.push(Call::Ocr);
        s.ocr_text
            .clone()
            .ok_or_else(|| ReplayError::ProviderUnavailable("fake OCR".into()))
    }
}

impl ClipboardWriter for FakeDesktop {
    fn set_text(&self, text: &str) -> ReplayResult<()> {
        let mut s = self.lock();
        if !s.clipboard_available {
            return Err(ReplayError::ProviderUnavailable("fake clipboard".into()));
        }
        s.calls.push(Call::Clipboard(text.to_string()));
        Ok(())
    }
}
