//! Platform-neutral key vocabulary
//!
//! Workflows name keys the way X11 keysyms do (`Return`, `BackSpace`,
//! `Page_Up`, `F5`). Common aliases are accepted; each backend maps the
//! parsed [`Key`] to its own codes.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKey {
    Return,
    Tab,
    Space,
    BackSpace,
    Delete,
    Escape,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Shift,
    Control,
    Alt,
    Super,
    /// F1..=F12
    F(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Named(NamedKey),
    Char(char),
}

impl Key {
    /// `None` for empty input or names outside the vocabulary.
    pub fn parse(name: &str) -> Option<Self> {
        if name == " " {
            return Some(Key::Named(NamedKey::Space));
        }
        let name = name.trim();
        let mut chars = name.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return Some(Key::Char(c));
        }
        let lower = name.to_lowercase();
        let named = match lower.as_str() {
            "return" | "enter" => NamedKey::Return,
            "tab" => NamedKey::Tab,
            "space" => NamedKey::Space,
            "backspace" => NamedKey::BackSpace,
            "delete" | "del" => NamedKey::Delete,
            "escape" | "esc" => NamedKey::Escape,
            "up" | "arrow_up" | "uparrow" => NamedKey::Up,
            "down" | "arrow_down" | "downarrow" => NamedKey::Down,
            "left" | "arrow_left" | "leftarrow" => NamedKey::Left,
            "right" | "arrow_right" | "rightarrow" => NamedKey::Right,
            "home" => NamedKey::Home,
            "end" => NamedKey::End,
            "page_up" | "pageup" | "prior" => NamedKey::PageUp,
            "page_down" | "pagedown" | "next" => NamedKey::PageDown,
            "shift" => NamedKey::Shift,
            "ctrl" | "control" => NamedKey::Control,
            "alt" | "option" => NamedKey::Alt,
            "super" | "cmd" | "command" | "win" | "meta" => NamedKey::Super,
            f if f.starts_with('f') => match f[1..].parse::<u8>() {
                Ok(n @ 1..=12) => NamedKey::F(n),
                _ => return None,
            },
            _ => return None,
        };
        Some(Key::Named(named))
    }
}

impl NamedKey {
    /// X11 keysym name, as understood by xdotool.
    pub fn keysym(&self) -> String {
        match self {
            NamedKey::Return => "Return".into(),
            NamedKey::Tab => "Tab".into(),
            NamedKey::Space => "space".into(),
            NamedKey::BackSpace => "BackSpace".into(),
            NamedKey::Delete => "Delete".into(),
            NamedKey::Escape => "Escape".into(),
            NamedKey::Up => "Up".into(),
            NamedKey::Down => "Down".into(),
            NamedKey::Left => "Left".into(),
            NamedKey::Right => "Right".into(),
            NamedKey::Home => "Home".into(),
            NamedKey::End => "End".into(),
            NamedKey::PageUp => "Prior".into(),
            NamedKey::PageDown => "Next".into(),
            NamedKey::Shift => "Shift_L".into(),
            NamedKey::Control => "Control_L".into(),
            NamedKey::Alt => "Alt_L".into(),
            NamedKey::Super => "Super_L".into(),
            NamedKey::F(n) => format!("F{}", n),
        }
    }

    /// Linux input event code (linux/input-event-codes.h), used by ydotool.
    pub fn evdev_code(&self) -> u16 {
        match self {
            NamedKey::Return => 28,
            NamedKey::Tab => 15,
            NamedKey::Space => 57,
            NamedKey::BackSpace => 14,
            NamedKey::Delete => 111,
            NamedKey::Escape => 1,
            NamedKey::Up => 103,
            NamedKey::Down => 108,
            NamedKey::Left => 105,
            NamedKey::Right => 106,
            NamedKey::Home => 102,
            NamedKey::End => 107,
            NamedKey::PageUp => 104,
            NamedKey::PageDown => 109,
            NamedKey::Shift => 42,
            NamedKey::Control => 29,
            NamedKey::Alt => 56,
            NamedKey::Super => 125,
            NamedKey::F(n @ 1..=10) => 58 + *n as u16,
            NamedKey::F(11) => 87,
            NamedKey::F(_) => 88,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_aliases() {
        assert_eq!(Key::parse("Return"), Some(Key::Named(NamedKey::Return)));
        assert_eq!(Key::parse("enter"), Some(Key::Named(NamedKey::Return)));
        assert_eq!(Key::parse("Page_Up"), Some(Key::Named(NamedKey::PageUp)));
        assert_eq!(Key::parse("F5"), Some(Key::Named(NamedKey::F(5))));
        assert_eq!(Key::parse("a"), Some(Key::Char('a')));
        assert_eq!(Key::parse("F"), Some(Key::Char('F')));
        assert_eq!(Key::parse(" "), Some(Key::Named(NamedKey::Space)));
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!(Key::parse("a "), Some(Key::Char('a')));
        assert_eq!(Key::parse(" a"), Some(Key::Char('a')));
        assert_eq!(Key::parse(" Tab\n"), Some(Key::Named(NamedKey::Tab)));
        assert_eq!(Key::parse("   "), None);
    }

    #[test]
    fn rejects_unknown() {
        assert_eq!(Key::parse(""), None);
        assert_eq!(Key::parse("F13"), None);
        assert_eq!(Key::parse("hyperdrive"), None);
    }

    #[test]
    fn evdev_function_keys() {
        assert_eq!(NamedKey::F(1).evdev_code(), 59);
        assert_eq!(NamedKey::F(10).evdev_code(), 68);
        assert_eq!(NamedKey::F(12).evdev_code(), 88);
    }
}
