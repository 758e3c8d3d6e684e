// Physical input injection.
use crate::errors::{ReplayError, ReplayResult};
use crate::executor::keys::KeyCode;
use crate::model::MouseButton;

/// Sink for synthetic mouse and keyboard input in global coordinates.
pub trait InputInjector: Send + Sync {
    fn move_to(&self, x: i32, y: i32) -> ReplayResult<()>;
    /// Moves to `(x, y)` and presses (`down`) or releases the button.
    fn button(&self, x: i32, y: i32, button: MouseButton, down: bool) -> ReplayResult<()>;
    /// Positive `dy` scrolls up, positive `dx` scrolls right.
    fn scroll(&self, dx: i32, dy: i32) -> ReplayResult<()>;
    fn key(&self, key: KeyCode, down: bool) -> ReplayResult<()>;
    fn type_text(&self, text: &str) -> ReplayResult<()>;
    fn open_url(&self, url: &str) -> ReplayResult<()>;
}

/// Stand-in used when the binary is built without native providers.
pub struct UnavailableInjector;

impl UnavailableInjector {
    fn err<T>() -> ReplayResult<T> {
        Err(ReplayError::ProviderUnavailable(
            "input injection (build with the `native` feature)".into(),
        ))
    }
}

impl InputInjector for UnavailableInjector {
    fn move_to(&self, _x: i32, _y: i32) -> ReplayResult<()> {
        Self::err()
    }
    fn button(&self, _x: i32, _y: i32, _button: MouseButton, _down: bool) -> ReplayResult<()> {
        Self::err()
    }
    fn scroll(&self, _dx: i32, _dy: i32) -> ReplayResult<()> {
        Self::err()
    }
    fn key(&self, _key: KeyCode, _down: bool) -> ReplayResult<()> {
        Self::err()
    }
    fn type_text(&self, _text: &str) -> ReplayResult<()> {
        Self::err()
    }
    fn open_url(&self, url: &str) -> ReplayResult<()> {
        open_in_browser(url)
    }
}

/// Hands `url` to the platform's default handler.
pub fn open_in_browser(url: &str) -> ReplayResult<()> {
    if url.trim().is_empty() {
        return Err(ReplayError::Provider("empty URL".into()));
    }
    #[cfg(target_os = "windows")]
    let mut cmd = {
        let mut c = std::process::Command::new("cmd");
        c.args(["/C", "start", ""]).arg(url);
        c
    };
    #[cfg(target_os = "macos")]
    let mut cmd = {
        let mut c = std::process::Command::new("open");
        c.arg(url);
        c
    };
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    let mut cmd = {
        let mut c = std::process::Command::new("xdg-open");
        c.arg(url);
        c
    };

    cmd.spawn().map(|_| ()).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            ReplayError::ProviderUnavailable(format!("URL opener: {e}"))
        }
        _ => ReplayError::Provider(format!("open {url}: {e}")),
    })
}

// ── enigo implementation ────────────────────────────────────────────────────

#[cfg(feature = "native")]
mod native {
    use std::sync::mpsc::{channel, Sender};
    use std::sync::Mutex;
    use std::thread;

    use enigo::{Axis, Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};

    use super::*;
    use crate::executor::keys::NamedKey;

    enum Command {
        Move(i32, i32),
        Button(i32, i32, MouseButton, bool),
        Scroll(i32, i32),
        Key(KeyCode, bool),
        Text(String),
    }

    type Reply = Sender<ReplayResult<()>>;

    /// Injects through `enigo`. The `Enigo` handle is not `Send` on every
    /// platform, so it lives on a dedicated thread fed over a channel.
    pub struct EnigoInjector {
        tx: Mutex<Sender<(Command, Reply)>>,
    }

    impl EnigoInjector {
        pub fn new() -> ReplayResult<Self> {
            let (tx, rx) = channel::<(Command, Reply)>();
            let (ready_tx, ready_rx) = channel::<ReplayResult<()>>();

            thread::Builder::new()
                .name("anchorplay-input".into())
                .spawn(move || {
                    let mut enigo = match Enigo::new(&Settings::default()) {
                        Ok(e) => {
                            let _ = ready_tx.send(Ok(()));
                            e
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(ReplayError::ProviderUnavailable(
                                format!("input simulator: {e}"),
                            )));
                            return;
                        }
                    };
                    while let Ok((cmd, reply)) = rx.recv() {
                        let _ = reply.send(run(&mut enigo, cmd));
                    }
                    tracing::debug!("input thread exiting");
                })?;

            ready_rx
                .recv()
                .map_err(|_| ReplayError::ProviderUnavailable("input thread died".into()))??;
            Ok(Self { tx: Mutex::new(tx) })
        }

        fn call(&self, cmd: Command) -> ReplayResult<()> {
            let (reply_tx, reply_rx) = channel();
            {
                let tx = self
                    .tx
                    .lock()
                    .map_err(|_| ReplayError::Provider("input channel poisoned".into()))?;
                tx.send((cmd, reply_tx))
                    .map_err(|_| ReplayError::ProviderUnavailable("input thread stopped".into()))?;
            }
            reply_rx
                .recv()
                .map_err(|_| ReplayError::ProviderUnavailable("input thread stopped".into()))?
        }
    }

    fn run(enigo: &mut Enigo, cmd: Command) -> ReplayResult<()> {
        let fail = |e: enigo::InputError| ReplayError::Provider(format!("input: {e}"));
        match cmd {
            Command::Move(x, y) => enigo.move_mouse(x, y, Coordinate::Abs).map_err(fail),
            Command::Button(x, y, button, down) => {
                enigo.move_mouse(x, y, Coordinate::Abs).map_err(fail)?;
                let button = match button {
                    MouseButton::Left => Button::Left,
                    MouseButton::Right => Button::Right,
                    MouseButton::Middle => Button::Middle,
                };
                let dir = if down { Direction::Press } else { Direction::Release };
                enigo.button(button, dir).map_err(fail)
            }
            Command::Scroll(dx, dy) => {
                if dy != 0 {
                    // enigo scrolls down for positive lengths
                    enigo.scroll(-dy, Axis::Vertical).map_err(fail)?;
                }
                if dx != 0 {
                    enigo.scroll(dx, Axis::Horizontal).map_err(fail)?;
                }
                Ok(())
            }
            Command::Key(key, down) => {
                let dir = if down { Direction::Press } else { Direction::Release };
                enigo.key(to_enigo_key(key), dir).map_err(fail)
            }
            Command::Text(text) => enigo.text(&text).map_err(fail),
        }
    }

    fn to_enigo_key(key: KeyCode) -> Key {
        match key {
            KeyCode::Char(c) => Key::Unicode(c),
            KeyCode::Named(named) => match named {
                NamedKey::Enter => Key::Return,
                NamedKey::Space => Key::Space,
                NamedKey::Tab => Key::Tab,
                NamedKey::Backspace => Key::Backspace,
                NamedKey::Escape => Key::Escape,
                NamedKey::Delete => Key::Delete,
                NamedKey::Shift => Key::Shift,
                NamedKey::Control => Key::Control,
                NamedKey::Alt => Key::Alt,
                NamedKey::Meta => Key::Meta,
                NamedKey::Left => Key::LeftArrow,
                NamedKey::Right => Key::RightArrow,
                NamedKey::Up => Key::UpArrow,
                NamedKey::Down => Key::DownArrow,
                NamedKey::Home => Key::Home,
                NamedKey::End => Key::End,
                NamedKey::PageUp => Key::PageUp,
                NamedKey::PageDown => Key::PageDown,
                NamedKey::Function(n) => match n {
                    1 => Key::F1,
                    2 => Key::F2,
                    3 => Key::F3,
                    4 => Key::F4,
                    5 => Key::F5,
                    6 => Key::F6,
                    7 => Key::F7,
                    8 => Key::F8,
                    9 => Key::F9,
                    10 => Key::F10,
                    11 => Key::F11,
                    _ => Key::F12,
                },
            },
        }
    }

    impl InputInjector for EnigoInjector {
        fn move_to(&self, x: i32, y: i32) -> ReplayResult<()> {
            self.call(Command::Move(x, y))
        }
        fn button(&self, x: i32, y: i32, button: MouseButton, down: bool) -> ReplayResult<()> {
            self.call(Command::Button(x, y, button, down))
        }
        fn scroll(&self, dx: i32, dy: i32) -> ReplayResult<()> {
            self.call(Command::Scroll(dx, dy))
        }
        fn key(&self, key: KeyCode, down: bool) -> ReplayResult<()> {
            self.call(Command::Key(key, down))
        }
        fn type_text(&self, text: &str) -> ReplayResult<()> {
            self.call(Command::Text(text.to_string()))
        }
        fn open_url(&self, url: &str) -> ReplayResult<()> {
            open_in_browser(url)
        }
    }
}

#[cfg(feature = "native")]
pub use native::EnigoInjector;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_reports_unavailable() {
        let stub = UnavailableInjector;
        assert!(stub.move_to(1, 1).unwrap_err().is_unavailable());
        assert!(stub.type_text("x").unwrap_err().is_unavailable());
        assert!(stub.key(KeyCode::Char('a'), true).unwrap_err().is_unavailable());
    }

    #[test]
    fn blank_url_is_rejected() {
        assert!(open_in_browser("  ").is_err());
    }
}
