//! Wayland backend driving `ydotool`
//!
//! ydotool talks to the kernel uinput device, so it works under any
//! compositor as long as `ydotoold` is running. Keys are sent as evdev codes.
//! Capture uses `grim`.

use super::command::{self, capture_stdout};
use super::keys::Key;
use super::{crop, Backend, BackendInfo, InitError, MouseButton, Region};
use crate::error::{Error, Result};
use image::RgbaImage;

pub const NAME: &str = "ydotool";

pub struct YdotoolBackend;

impl YdotoolBackend {
    pub fn new() -> std::result::Result<Self, InitError> {
        if std::env::var_os("WAYLAND_DISPLAY").is_none() {
            return Err(InitError::MissingEnv("WAYLAND_DISPLAY"));
        }
        command::require("ydotool")?;
        Ok(Self)
    }
}

/// `ydotool click` takes a bitmask: 0x40 down, 0x80 up, low bits pick the
/// button.
fn click_code(button: MouseButton) -> &'static str {
    match button {
        MouseButton::Left => "0xC0",
        MouseButton::Right => "0xC1",
        MouseButton::Middle => "0xC2",
    }
}

impl Backend for YdotoolBackend {
    fn move_pointer(&self, x: i32, y: i32) -> Result<()> {
        let (x, y) = (x.to_string(), y.to_string());
        command::run(
            "move_pointer",
            "ydotool",
            &["mousemove", "--absolute", "-x", &x, "-y", &y],
        )?;
        Ok(())
    }

    fn click(&self, x: i32, y: i32, button: MouseButton) -> Result<()> {
        self.move_pointer(x, y)?;
        command::run("click", "ydotool", &["click", click_code(button)])?;
        Ok(())
    }

    fn type_text(&self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        command::run("type_text", "ydotool", &["type", "--", text])?;
        Ok(())
    }

    fn press_key(&self, key: &str) -> Result<()> {
        match Key::parse(key) {
            Some(Key::Named(named)) => {
                let code = named.evdev_code();
                let down = format!("{}:1", code);
                let up = format!("{}:0", code);
                command::run("press_key", "ydotool", &["key", &down, &up])?;
            }
            Some(Key::Char(c)) => {
                command::run("press_key", "ydotool", &["type", "--", &c.to_string()])?;
            }
            None => {
                return Err(Error::action_failed("press_key", format!("unknown key '{}'", key)))
            }
        }
        Ok(())
    }

    fn capture(&self, region: Option<Region>) -> Result<RgbaImage> {
        let screen = capture_stdout("grim", &["-t", "png", "-"])?;
        crop(screen, region)
    }

    fn describe(&self) -> BackendInfo {
        BackendInfo::new(NAME, "wayland")
    }
}
