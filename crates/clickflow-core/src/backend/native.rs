//! In-process backend: enigo for input, xcap for capture
//!
//! A fresh `Enigo` is opened per call. Connections are cheap and this keeps
//! the backend `Send + Sync` on every platform.

use super::keys::{Key as KeyName, NamedKey};
use super::{crop, Backend, BackendInfo, InitError, MouseButton, Region};
use crate::error::{Error, Result};
use enigo::{Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};
use image::RgbaImage;
use xcap::Monitor;

pub const NAME: &str = "enigo";

pub struct NativeBackend;

impl NativeBackend {
    pub fn new() -> std::result::Result<Self, InitError> {
        Enigo::new(&Settings::default()).map_err(|e| InitError::Failed(e.to_string()))?;
        let monitors = Monitor::all().map_err(|e| InitError::Failed(e.to_string()))?;
        if monitors.is_empty() {
            return Err(InitError::Failed("no monitors found".to_string()));
        }
        Ok(Self)
    }

    fn enigo(&self, action: &str) -> Result<Enigo> {
        Enigo::new(&Settings::default()).map_err(|e| Error::action_failed(action, e))
    }
}

fn to_enigo_button(button: MouseButton) -> Button {
    match button {
        MouseButton::Left => Button::Left,
        MouseButton::Right => Button::Right,
        MouseButton::Middle => Button::Middle,
    }
}

fn to_enigo_key(key: KeyName) -> Key {
    match key {
        KeyName::Char(c) => Key::Unicode(c),
        KeyName::Named(named) => match named {
            NamedKey::Return => Key::Return,
            NamedKey::Tab => Key::Tab,
            NamedKey::Space => Key::Space,
            NamedKey::BackSpace => Key::Backspace,
            NamedKey::Delete => Key::Delete,
            NamedKey::Escape => Key::Escape,
            NamedKey::Up => Key::UpArrow,
            NamedKey::Down => Key::DownArrow,
            NamedKey::Left => Key::LeftArrow,
            NamedKey::Right => Key::RightArrow,
            NamedKey::Home => Key::Home,
            NamedKey::End => Key::End,
            NamedKey::PageUp => Key::PageUp,
            NamedKey::PageDown => Key::PageDown,
            NamedKey::Shift => Key::Shift,
            NamedKey::Control => Key::Control,
            NamedKey::Alt => Key::Alt,
            NamedKey::Super => Key::Meta,
            NamedKey::F(n) => match n {
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

impl Backend for NativeBackend {
    fn move_pointer(&self, x: i32, y: i32) -> Result<()> {
        let mut enigo = self.enigo("move_pointer")?;
        enigo
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(|e| Error::action_failed("move_pointer", e))
    }

    fn click(&self, x: i32, y: i32, button: MouseButton) -> Result<()> {
        let mut enigo = self.enigo("click")?;
        enigo
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(|e| Error::action_failed("click", e))?;
        enigo
            .button(to_enigo_button(button), Direction::Click)
            .map_err(|e| Error::action_failed("click", e))
    }

    fn type_text(&self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        let mut enigo = self.enigo("type_text")?;
        enigo.text(text).map_err(|e| Error::action_failed("type_text", e))
    }

    fn press_key(&self, key: &str) -> Result<()> {
        let parsed = KeyName::parse(key)
            .ok_or_else(|| Error::action_failed("press_key", format!("unknown key '{}'", key)))?;
        let mut enigo = self.enigo("press_key")?;
        enigo
            .key(to_enigo_key(parsed), Direction::Click)
            .map_err(|e| Error::action_failed("press_key", e))
    }

    fn capture(&self, region: Option<Region>) -> Result<RgbaImage> {
        let monitors = Monitor::all().map_err(|e| Error::action_failed("capture", e))?;
        let monitor = monitors
            .iter()
            .find(|m| m.is_primary().unwrap_or(false))
            .or_else(|| monitors.first())
            .ok_or_else(|| Error::action_failed("capture", "no monitors found"))?;
        let screen = monitor
            .capture_image()
            .map_err(|e| Error::action_failed("capture", e))?;
        crop(screen, region)
    }

    fn describe(&self) -> BackendInfo {
        BackendInfo::new(NAME, std::env::consts::OS)
    }
}
