//! Workflow steps
//!
//! A [`Step`] is what gets stored: a kind plus a loose parameter map. An
//! [`Action`] is what gets executed: the same step resolved into a typed
//! variant with defaults applied.

use crate::backend::MouseButton;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Step parameters. Values are kept as JSON scalars so numbers and booleans
/// survive a save/load cycle unchanged.
pub type Params = BTreeMap<String, serde_json::Value>;

pub const DEFAULT_DELAY_SECONDS: f64 = 1.0;
pub const DEFAULT_RETRIES: u32 = 3;

/// Closed set of step kinds, parsed case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepKind {
    Delay,
    TypeText,
    KeyPress,
    FindAndClick,
    /// Anything else, with the kind exactly as written.
    Unknown(String),
}

impl StepKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "delay" => Self::Delay,
            "typetext" | "type_text" => Self::TypeText,
            "keypress" | "key_press" => Self::KeyPress,
            "findandclick" | "find_and_click" | "findclick" => Self::FindAndClick,
            _ => Self::Unknown(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Delay => "Delay",
            Self::TypeText => "TypeText",
            Self::KeyPress => "KeyPress",
            Self::FindAndClick => "FindAndClick",
            Self::Unknown(raw) => raw,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl From<String> for StepKind {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<StepKind> for String {
    fn from(kind: StepKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of a workflow. Serialized as `{"type": ..., "params": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(rename = "type")]
    kind: StepKind,
    #[serde(default)]
    params: Params,
}

impl Step {
    pub fn new(kind: impl Into<String>, params: Params) -> Self {
        Self {
            kind: StepKind::parse(&kind.into()),
            params,
        }
    }

    pub fn delay(seconds: f64) -> Self {
        Self::new("Delay", Params::new()).with_param("seconds", seconds)
    }

    pub fn type_text(text: impl Into<String>) -> Self {
        Self::new("TypeText", Params::new()).with_param("text", text.into())
    }

    pub fn key_press(key: impl Into<String>) -> Self {
        Self::new("KeyPress", Params::new()).with_param("key", key.into())
    }

    pub fn find_and_click(class: impl Into<String>, retries: u32) -> Self {
        Self::new("FindAndClick", Params::new())
            .with_param("class", class.into())
            .with_param("retries", retries)
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn kind(&self) -> &StepKind {
        &self.kind
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Resolve the step into an executable action, applying defaults.
    pub fn action(&self) -> Action {
        let p = &self.params;
        match &self.kind {
            StepKind::Delay => Action::Delay {
                seconds: param_f64(p, "seconds").unwrap_or(DEFAULT_DELAY_SECONDS).max(0.0),
            },
            StepKind::TypeText => Action::TypeText {
                text: param_string(p, "text").unwrap_or_default(),
            },
            StepKind::KeyPress => Action::KeyPress {
                key: param_string(p, "key").unwrap_or_default(),
            },
            StepKind::FindAndClick => Action::FindAndClick {
                class: param_string(p, "class")
                    .or_else(|| param_string(p, "class_name"))
                    .unwrap_or_default(),
                retries: param_f64(p, "retries")
                    .map(|r| r.max(0.0) as u32)
                    .unwrap_or(DEFAULT_RETRIES),
                confidence: param_f64(p, "confidence").map(|c| c as f32),
                button: param_string(p, "button")
                    .and_then(|b| b.parse().ok())
                    .unwrap_or_default(),
            },
            StepKind::Unknown(raw) => Action::Unknown { kind: raw.clone() },
        }
    }

    /// `Delay {"seconds":2.0}` - used in progress messages.
    pub fn summary(&self) -> String {
        let params = serde_json::to_string(&self.params).unwrap_or_else(|_| "{}".to_string());
        format!("{} {}", self.kind, params)
    }
}

/// A step resolved into its typed form. One handler per variant in the
/// executor.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Delay {
        seconds: f64,
    },
    TypeText {
        text: String,
    },
    KeyPress {
        key: String,
    },
    FindAndClick {
        class: String,
        retries: u32,
        /// Overrides the engine's match threshold when set.
        confidence: Option<f32>,
        button: MouseButton,
    },
    Unknown {
        kind: String,
    },
}

fn param_f64(params: &Params, key: &str) -> Option<f64> {
    let value = params.get(key)?;
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        serde_json::Value::Null => return None,
        _ => None,
    };
    if parsed.is_none() {
        tracing::warn!(param = key, value = %value, "ignoring non-numeric parameter");
    }
    parsed
}

fn param_string(params: &Params, key: &str) -> Option<String> {
    match params.get(key)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_case_insensitive_with_aliases() {
        assert_eq!(StepKind::parse("DELAY"), StepKind::Delay);
        assert_eq!(StepKind::parse("type_text"), StepKind::TypeText);
        assert_eq!(StepKind::parse("KeyPress"), StepKind::KeyPress);
        assert_eq!(StepKind::parse("findClick"), StepKind::FindAndClick);
        assert_eq!(
            StepKind::parse("Frobnicate"),
            StepKind::Unknown("Frobnicate".to_string())
        );
    }

    #[test]
    fn defaults_apply_when_params_missing() {
        assert_eq!(
            Step::new("delay", Params::new()).action(),
            Action::Delay { seconds: 1.0 }
        );
        assert_eq!(
            Step::new("TypeText", Params::new()).action(),
            Action::TypeText { text: String::new() }
        );
        match Step::new("FindAndClick", Params::new()).with_param("class", "ok").action() {
            Action::FindAndClick { class, retries, confidence, button } => {
                assert_eq!(class, "ok");
                assert_eq!(retries, 3);
                assert_eq!(confidence, None);
                assert_eq!(button, MouseButton::Left);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn numeric_strings_are_coerced() {
        let step = Step::new("Delay", Params::new()).with_param("seconds", "2.5");
        assert_eq!(step.action(), Action::Delay { seconds: 2.5 });

        let step = Step::new("findandclick", Params::new())
            .with_param("class_name", "submit")
            .with_param("retries", "5")
            .with_param("button", "Right");
        match step.action() {
            Action::FindAndClick { class, retries, button, .. } => {
                assert_eq!(class, "submit");
                assert_eq!(retries, 5);
                assert_eq!(button, MouseButton::Right);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn garbage_falls_back_to_default() {
        let step = Step::new("Delay", Params::new()).with_param("seconds", "soon");
        assert_eq!(step.action(), Action::Delay { seconds: 1.0 });
    }

    #[test]
    fn serializes_as_type_and_params() {
        let json = serde_json::to_value(Step::key_press("Return")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "KeyPress", "params": {"key": "Return"}}));

        let step: Step = serde_json::from_value(serde_json::json!({"type": "Frobnicate"})).unwrap();
        assert_eq!(step.kind(), &StepKind::Unknown("Frobnicate".to_string()));
        assert!(step.params().is_empty());
    }

    #[test]
    fn summary_lists_kind_and_params() {
        assert_eq!(Step::type_text("hi").summary(), r#"TypeText {"text":"hi"}"#);
    }
}
