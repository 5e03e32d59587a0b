//! Workflow model - a named, ordered list of steps

use crate::error::{Error, Result};
use crate::step::Step;
use serde::{Deserialize, Serialize};

/// Name given to documents that do not carry one.
pub const UNNAMED: &str = "unnamed";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default = "unnamed")]
    pub name: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

fn unnamed() -> String {
    UNNAMED.to_string()
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn with_steps(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    /// Append a step. Insertion order is execution order.
    pub fn push(&mut self, step: Step) -> &mut Self {
        self.steps.push(step);
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid_workflow("Workflow name must not be empty"));
        }
        Ok(())
    }

    /// `{"name": ..., "steps": [{"type": ..., "params": {...}}, ...]}`
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "steps": self.steps,
        })
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        if !value.is_object() && !value.is_null() {
            return Err(Error::invalid_workflow("Workflow document must be a mapping"));
        }
        if value.is_null() {
            return Ok(Self::new(UNNAMED));
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::new(UNNAMED));
        }
        let value: serde_json::Value = serde_yaml::from_str(text)?;
        Self::from_value(value)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(text)?)
    }
}
