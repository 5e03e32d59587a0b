//! X11 backend driving `xdotool`
//!
//! Screen capture shells out to ImageMagick's `import`, which writes PNG to
//! stdout.

use super::command::{self, capture_stdout};
use super::keys::Key;
use super::{crop, Backend, BackendInfo, InitError, MouseButton, Region};
use crate::error::{Error, Result};
use image::RgbaImage;

pub const NAME: &str = "xdotool";

/// Delay between synthesized keystrokes, in ms.
const TYPE_DELAY_MS: &str = "12";

pub struct XdotoolBackend {
    display: String,
}

impl XdotoolBackend {
    pub fn new() -> std::result::Result<Self, InitError> {
        let display = std::env::var("DISPLAY").map_err(|_| InitError::MissingEnv("DISPLAY"))?;
        command::require("xdotool")?;
        Ok(Self { display })
    }
}

fn button_number(button: MouseButton) -> &'static str {
    match button {
        MouseButton::Left => "1",
        MouseButton::Middle => "2",
        MouseButton::Right => "3",
    }
}

impl Backend for XdotoolBackend {
    fn move_pointer(&self, x: i32, y: i32) -> Result<()> {
        let (x, y) = (x.to_string(), y.to_string());
        command::run("move_pointer", "xdotool", &["mousemove", "--sync", &x, &y])?;
        Ok(())
    }

    fn click(&self, x: i32, y: i32, button: MouseButton) -> Result<()> {
        let (x, y) = (x.to_string(), y.to_string());
        command::run(
            "click",
            "xdotool",
            &["mousemove", "--sync", &x, &y, "click", button_number(button)],
        )?;
        Ok(())
    }

    fn type_text(&self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        command::run("type_text", "xdotool", &["type", "--delay", TYPE_DELAY_MS, "--", text])?;
        Ok(())
    }

    fn press_key(&self, key: &str) -> Result<()> {
        let keysym = match Key::parse(key) {
            Some(Key::Named(named)) => named.keysym(),
            Some(Key::Char(c)) => c.to_string(),
            None => return Err(Error::action_failed("press_key", format!("unknown key '{}'", key))),
        };
        command::run("press_key", "xdotool", &["key", "--", &keysym])?;
        Ok(())
    }

    fn capture(&self, region: Option<Region>) -> Result<RgbaImage> {
        let screen = capture_stdout("import", &["-window", "root", "png:-"])?;
        crop(screen, region)
    }

    fn describe(&self) -> BackendInfo {
        BackendInfo::new(NAME, format!("x11 {}", self.display))
    }
}
