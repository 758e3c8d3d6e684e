/// Recorded key names ("a", "Key.enter", "Key.shift_r") to injectable keys.
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NamedKey {
    Enter,
    Space,
    Tab,
    Backspace,
    Escape,
    Delete,
    Shift,
    Control,
    Alt,
    Meta,
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
    PageUp,
    PageDown,
    /// F1..=F12
    Function(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KeyCode {
    Char(char),
    Named(NamedKey),
}

/// Maps a recorded key identifier to a key, or `None` when it has no
/// injectable equivalent. Left/right modifier variants collapse onto the
/// generic modifier.
pub fn parse_recorded_key(raw: &str) -> Option<KeyCode> {
    let mut chars = raw.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Some(KeyCode::Char(c));
    }

    let name = raw.strip_prefix("Key.")?;
    let base = name
        .strip_suffix("_l")
        .or_else(|| name.strip_suffix("_r"))
        .or_else(|| name.strip_suffix("_gr"))
        .unwrap_or(name);

    let named = match base {
        "enter" => NamedKey::Enter,
        "space" => NamedKey::Space,
        "tab" => NamedKey::Tab,
        "backspace" => NamedKey::Backspace,
        "esc" | "escape" => NamedKey::Escape,
        "delete" => NamedKey::Delete,
        "shift" => NamedKey::Shift,
        "ctrl" => NamedKey::Control,
        "alt" => NamedKey::Alt,
        "cmd" => NamedKey::Meta,
        "left" => NamedKey::Left,
        "right" => NamedKey::Right,
        "up" => NamedKey::Up,
        "down" => NamedKey::Down,
        "home" => NamedKey::Home,
        "end" => NamedKey::End,
        "page_up" => NamedKey::PageUp,
        "page_down" => NamedKey::PageDown,
        f if f.starts_with('f') => match f[1..].parse::<u8>() {
            Ok(n @ 1..=12) => NamedKey::Function(n),
            _ => return None,
        },
        _ => return None,
    };
    Some(KeyCode::Named(named))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_characters_pass_through() {
        assert_eq!(parse_recorded_key("a"), Some(KeyCode::Char('a')));
        assert_eq!(parse_recorded_key("é"), Some(KeyCode::Char('é')));
        assert_eq!(parse_recorded_key(" "), Some(KeyCode::Char(' ')));
    }

    #[test]
    fn named_keys_and_modifier_sides() {
        assert_eq!(parse_recorded_key("Key.enter"), Some(KeyCode::Named(NamedKey::Enter)));
        assert_eq!(parse_recorded_key("Key.esc"), Some(KeyCode::Named(NamedKey::Escape)));
        assert_eq!(parse_recorded_key("Key.shift_r"), Some(KeyCode::Named(NamedKey::Shift)));
        assert_eq!(parse_recorded_key("Key.ctrl_l"), Some(KeyCode::Named(NamedKey::Control)));
        assert_eq!(parse_recorded_key("Key.alt_gr"), Some(KeyCode::Named(NamedKey::Alt)));
        assert_eq!(parse_recorded_key("Key.page_down"), Some(KeyCode::Named(NamedKey::PageDown)));
        assert_eq!(parse_recorded_key("Key.f12"), Some(KeyCode::Named(NamedKey::Function(12))));
    }

    #[test]
    fn unknown_names_are_unmapped() {
        assert_eq!(parse_recorded_key("Key.f13"), None);
        assert_eq!(parse_recorded_key("Key.media_play_pause"), None);
        assert_eq!(parse_recorded_key("<65>"), None);
        assert_eq!(parse_recorded_key(""), None);
    }
}
