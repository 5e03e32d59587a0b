//! Structured errors
//!
//! Every failure the engine reports carries a machine-readable [`ErrorCode`]
//! so front ends can tell environment problems (no backend, template missing)
//! apart from backend malfunction.

use serde::{Deserialize, Serialize};
use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BackendUnavailable,
    ActionFailed,
    TemplateNotFound,
    UnknownStep,
    EngineBusy,
    InvalidWorkflow,
    Io,
    Unknown,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            suggestions: Vec::new(),
            context: None,
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn backend_unavailable() -> Self {
        Self::new(ErrorCode::BackendUnavailable, "No input backend available").with_suggestions(
            vec![
                "Install xdotool (X11) or ydotool (Wayland)".to_string(),
                "Build with the `native` feature for in-process input".to_string(),
                "Run `cf backends` to see why each backend failed".to_string(),
            ],
        )
    }

    /// Backend call failed; `reason` is kept verbatim.
    pub fn action_failed(action: &str, reason: impl fmt::Display) -> Self {
        Self::new(ErrorCode::ActionFailed, format!("{} failed: {}", action, reason))
    }

    pub fn template_dir_missing(class: &str) -> Self {
        Self::new(
            ErrorCode::TemplateNotFound,
            format!("No template directory for class '{}'", class),
        )
    }

    pub fn template_dir_empty(class: &str) -> Self {
        Self::new(
            ErrorCode::TemplateNotFound,
            format!("Template directory for class '{}' is empty", class),
        )
    }

    pub fn template_not_on_screen(class: &str, attempts: u32) -> Self {
        Self::new(
            ErrorCode::TemplateNotFound,
            format!("Template for class '{}' not found on screen", class),
        )
        .with_context(serde_json::json!({ "class": class, "attempts": attempts }))
    }

    pub fn unknown_step(kind: &str) -> Self {
        Self::new(ErrorCode::UnknownStep, format!("Unknown step type: {}", kind))
    }

    pub fn engine_busy() -> Self {
        Self::new(ErrorCode::EngineBusy, "A workflow run is already active on this executor")
            .with_suggestions(vec!["Stop the active run or wait for it to finish".to_string()])
    }

    pub fn invalid_workflow(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidWorkflow, reason)
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Self::new(ErrorCode::Unknown, e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorCode::Io, e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::invalid_workflow(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Self::invalid_workflow(e.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Self::new(ErrorCode::Io, format!("image: {}", e))
    }
}
