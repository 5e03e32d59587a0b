//! macOS backend using System Events (via `osascript`) and `cliclick`
//!
//! Keyboard input goes through AppleScript; pointer input needs cliclick
//! (`brew install cliclick`). Capture uses the built-in `screencapture`.

use super::command;
use super::keys::{Key, NamedKey};
use super::{crop, Backend, BackendInfo, InitError, MouseButton, Region};
use crate::error::{Error, Result};
use image::RgbaImage;
use std::time::{SystemTime, UNIX_EPOCH};

pub const NAME: &str = "osascript";

/// macOS virtual key codes
pub mod key_codes {
    pub const RETURN: u8 = 36;
    pub const TAB: u8 = 48;
    pub const SPACE: u8 = 49;
    pub const DELETE: u8 = 51;
    pub const FORWARD_DELETE: u8 = 117;
    pub const ESCAPE: u8 = 53;
    pub const COMMAND: u8 = 55;
    pub const SHIFT: u8 = 56;
    pub const OPTION: u8 = 58;
    pub const CONTROL: u8 = 59;
    pub const ARROW_LEFT: u8 = 123;
    pub const ARROW_RIGHT: u8 = 124;
    pub const ARROW_DOWN: u8 = 125;
    pub const ARROW_UP: u8 = 126;
    pub const PAGE_UP: u8 = 116;
    pub const PAGE_DOWN: u8 = 121;
    pub const HOME: u8 = 115;
    pub const END: u8 = 119;
    pub const F_KEYS: [u8; 12] = [122, 120, 99, 118, 96, 97, 98, 100, 101, 109, 103, 111];
}

fn key_code(key: NamedKey) -> u8 {
    use key_codes::*;
    match key {
        NamedKey::Return => RETURN,
        NamedKey::Tab => TAB,
        NamedKey::Space => SPACE,
        NamedKey::BackSpace => DELETE,
        NamedKey::Delete => FORWARD_DELETE,
        NamedKey::Escape => ESCAPE,
        NamedKey::Up => ARROW_UP,
        NamedKey::Down => ARROW_DOWN,
        NamedKey::Left => ARROW_LEFT,
        NamedKey::Right => ARROW_RIGHT,
        NamedKey::Home => HOME,
        NamedKey::End => END,
        NamedKey::PageUp => PAGE_UP,
        NamedKey::PageDown => PAGE_DOWN,
        NamedKey::Shift => SHIFT,
        NamedKey::Control => CONTROL,
        NamedKey::Alt => OPTION,
        NamedKey::Super => COMMAND,
        NamedKey::F(n) => F_KEYS[(n.clamp(1, 12) - 1) as usize],
    }
}

/// Quote `text` as an AppleScript string literal.
fn applescript_string(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

pub struct OsascriptBackend;

impl OsascriptBackend {
    pub fn new() -> std::result::Result<Self, InitError> {
        if !cfg!(target_os = "macos") {
            return Err(InitError::UnsupportedPlatform(std::env::consts::OS));
        }
        command::require("osascript")?;
        command::require("cliclick")?;
        Ok(Self)
    }

    fn system_events(&self, action: &str, body: &str) -> Result<()> {
        let script = format!(r#"tell application "System Events" to {}"#, body);
        command::run(action, "osascript", &["-e", &script])?;
        Ok(())
    }
}

impl Backend for OsascriptBackend {
    fn move_pointer(&self, x: i32, y: i32) -> Result<()> {
        command::run("move_pointer", "cliclick", &[&format!("m:{},{}", x, y)])?;
        Ok(())
    }

    fn click(&self, x: i32, y: i32, button: MouseButton) -> Result<()> {
        let verb = match button {
            MouseButton::Left => "c",
            MouseButton::Right => "rc",
            // cliclick has no middle click
            MouseButton::Middle => {
                return Err(Error::action_failed("click", "middle button not supported by cliclick"))
            }
        };
        command::run("click", "cliclick", &[&format!("{}:{},{}", verb, x, y)])?;
        Ok(())
    }

    fn type_text(&self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.system_events("type_text", &format!("keystroke {}", applescript_string(text)))
    }

    fn press_key(&self, key: &str) -> Result<()> {
        match Key::parse(key) {
            Some(Key::Named(named)) => {
                self.system_events("press_key", &format!("key code {}", key_code(named)))
            }
            Some(Key::Char(c)) => self.system_events(
                "press_key",
                &format!("keystroke {}", applescript_string(&c.to_string())),
            ),
            None => Err(Error::action_failed("press_key", format!("unknown key '{}'", key))),
        }
    }

    fn capture(&self, region: Option<Region>) -> Result<RgbaImage> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let path = std::env::temp_dir().join(format!("clickflow-{}-{}.png", std::process::id(), nanos));
        let path_str = path.to_string_lossy().to_string();

        command::run("capture", "screencapture", &["-x", "-t", "png", &path_str])?;
        let loaded = image::open(&path);
        let _ = std::fs::remove_file(&path);
        let screen = loaded
            .map_err(|e| Error::action_failed("capture", e))?
            .to_rgba8();
        crop(screen, region)
    }

    fn describe(&self) -> BackendInfo {
        BackendInfo::new(NAME, "macos")
    }
}
