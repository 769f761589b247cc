//! Parameters the core asks the caller to fill in.
//!
//! The UI that actually asks the questions lives outside this crate. The
//! core only describes what it needs ([`Parameter`]) and reads back a flat
//! map of answers keyed by parameter name.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Answers returned by a prompt, keyed by [`Parameter::name`].
pub type Answers = Map<String, Value>;

/// Which configuration section an answer is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSection {
    Connection,
    Credentials,
    Source,
    /// Parser-specific settings, stored in the parser's own context.
    Parser,
    /// Choices the orchestrator itself persists (format override, update method).
    Inspection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    Text,
    Password,
    Number,
    Confirm,
    Select,
    /// A regular expression; the answer must compile.
    Regex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterOption {
    pub title: String,
    pub value: Value,
}

impl ParameterOption {
    pub fn new(title: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            title: title.into(),
            value: value.into(),
        }
    }
}

/// A single question for the prompt callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub message: String,
    pub kind: ParameterKind,
    pub target: ConfigSection,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ParameterOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

impl Parameter {
    pub fn new(
        name: impl Into<String>,
        message: impl Into<String>,
        kind: ParameterKind,
        target: ConfigSection,
    ) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            kind,
            target,
            options: Vec::new(),
            default_value: None,
        }
    }

    pub fn with_options(mut self, options: Vec<ParameterOption>) -> Self {
        self.options = options;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Pick this parameter's answer out of `answers`, falling back to the
    /// default. Select parameters only accept one of their options.
    pub fn answer_from(&self, answers: &Answers) -> Option<Value> {
        let value = answers
            .get(&self.name)
            .filter(|v| !v.is_null())
            .cloned()
            .or_else(|| self.default_value.clone())?;
        if self.kind == ParameterKind::Select
            && !self.options.is_empty()
            && !self.options.iter().any(|o| o.value == value)
        {
            return None;
        }
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn answer_prefers_explicit_value_over_default() {
        let p = Parameter::new("table", "Which table?", ParameterKind::Text, ConfigSection::Source)
            .with_default("*");
        let mut answers = Answers::new();
        assert_eq!(p.answer_from(&answers), Some(json!("*")));
        answers.insert("table".into(), json!("users"));
        assert_eq!(p.answer_from(&answers), Some(json!("users")));
    }

    #[test]
    fn select_rejects_values_outside_options() {
        let p = Parameter::new("mode", "Mode?", ParameterKind::Select, ConfigSection::Inspection)
            .with_options(vec![ParameterOption::new("A", "a"), ParameterOption::new("B", "b")]);
        let mut answers = Answers::new();
        answers.insert("mode".into(), json!("c"));
        assert_eq!(p.answer_from(&answers), None);
        answers.insert("mode".into(), json!("b"));
        assert_eq!(p.answer_from(&answers), Some(json!("b")));
    }

    #[test]
    fn null_answer_counts_as_missing() {
        let p = Parameter::new("x", "X?", ParameterKind::Text, ConfigSection::Source);
        let mut answers = Answers::new();
        answers.insert("x".into(), Value::Null);
        assert_eq!(p.answer_from(&answers), None);
    }
}
