//! Backend capability interface
//!
//! A backend injects pointer/keyboard input and captures the screen for one
//! toolkit/OS combination. The executor only ever talks to [`Backend`], so
//! any implementation can be swapped in, including test doubles.
//!
//! ## Built-in backends
//!
//! - **xdotool**: X11, drives the `xdotool` binary, captures with ImageMagick `import`
//! - **ydotool**: Wayland, drives `ydotool`, captures with `grim`
//! - **osascript**: macOS, System Events + `cliclick`, captures with `screencapture`
//! - **enigo**: in-process via enigo/xcap (`native` feature)

mod command;
pub mod keys;
pub mod osascript;
pub mod xdotool;
pub mod ydotool;

#[cfg(feature = "native")]
pub mod native;

use crate::error::{Error, Result};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use keys::{Key, NamedKey};

/// Input injection and screen capture.
///
/// Every call blocks until the OS action completes and never leaves work
/// running in the background. Failures are reported as
/// [`ErrorCode::ActionFailed`](crate::ErrorCode::ActionFailed).
pub trait Backend: Send + Sync {
    /// Move the pointer to absolute screen coordinates.
    fn move_pointer(&self, x: i32, y: i32) -> Result<()>;

    /// Move to `(x, y)` and click once.
    fn click(&self, x: i32, y: i32, button: MouseButton) -> Result<()>;

    /// Emit `text` as a keystroke sequence, in order.
    fn type_text(&self, text: &str) -> Result<()>;

    /// Emit a single named key (`"Return"`, `"F5"`, `"a"`...).
    fn press_key(&self, key: &str) -> Result<()>;

    /// Full screen, or the given region of it.
    fn capture(&self, region: Option<Region>) -> Result<RgbaImage>;

    fn describe(&self) -> BackendInfo;
}

/// Why a backend could not be brought up on this host. Expected
/// environment variance, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    #[error("`{0}` not found on PATH")]
    MissingTool(String),
    #[error("{0} is not set")]
    MissingEnv(&'static str),
    #[error("not supported on {0}")]
    UnsupportedPlatform(&'static str),
    #[error("{0}")]
    Failed(String),
}

/// What a backend says about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendInfo {
    /// Stable identifier matched against the registry priority list.
    pub name: String,
    /// Informational tag (display server, platform).
    pub display: String,
    pub available: bool,
}

impl BackendInfo {
    pub fn new(name: impl Into<String>, display: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display: display.into(),
            available: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

impl FromStr for MouseButton {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "middle" | "center" => Ok(Self::Middle),
            other => Err(Error::action_failed(
                "click",
                format!("unknown mouse button '{}'", other),
            )),
        }
    }
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Middle => "middle",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Screen rectangle: top-left corner plus size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
}

/// `x,y,width,height`
impl FromStr for Region {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<u32> = s
            .split(',')
            .map(|p| p.trim().parse::<u32>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::invalid_workflow(format!("Invalid region '{}': {}", s, e)))?;
        match parts.as_slice() {
            [x, y, w, h] => Ok(Self::new(*x, *y, *w, *h)),
            _ => Err(Error::invalid_workflow(format!(
                "Invalid region '{}': expected x,y,width,height",
                s
            ))),
        }
    }
}

/// Cut `region` out of a full-screen capture, clamped to the image bounds.
pub(crate) fn crop(image: RgbaImage, region: Option<Region>) -> Result<RgbaImage> {
    let Some(r) = region else {
        return Ok(image);
    };
    let (w, h) = image.dimensions();
    if r.x >= w || r.y >= h || r.width == 0 || r.height == 0 {
        return Err(Error::action_failed(
            "capture",
            format!("region {:?} outside {}x{} screen", r, w, h),
        ));
    }
    let width = r.width.min(w - r.x);
    let height = r.height.min(h - r.y);
    Ok(image::imageops::crop_imm(&image, r.x, r.y, width, height).to_image())
}
