//! The prompt callback: the single seam to the interactive layer.
//!
//! The core asks for missing values through a [`Prompter`] and treats the
//! answers as opaque JSON values. Anything resembling a UI lives on the
//! other side of this trait.

use async_trait::async_trait;
use serde_json::Value;

pub use stream_harness_core::prompt::{
    Answers, ConfigSection, Parameter, ParameterKind, ParameterOption,
};

use crate::error::Result;

/// Answers questions the core cannot resolve on its own.
///
/// Implementations may answer any subset of the parameters; unanswered
/// parameters fall back to their defaults or stop the inspection.
#[async_trait]
pub trait Prompter: Send + Sync {
    async fn prompt(&self, parameters: &[Parameter]) -> Result<Answers>;
}

/// A prompter with a fixed set of answers, e.g. from `--set name=value`
/// command-line flags.
#[derive(Debug, Clone, Default)]
pub struct StaticPrompter {
    answers: Answers,
}

impl StaticPrompter {
    pub fn new(answers: Answers) -> Self {
        Self { answers }
    }

    /// A prompter that never answers; every question falls back to its
    /// default.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from `name=value` pairs. Values that parse as JSON are kept as
    /// JSON (`true`, `3`, `"x"`), anything else becomes a string.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let answers = pairs
            .into_iter()
            .map(|(k, v)| {
                let raw = v.as_ref();
                let value = serde_json::from_str::<Value>(raw)
                    .ok()
                    .filter(|v| !v.is_object() && !v.is_array())
                    .unwrap_or_else(|| Value::String(raw.to_string()));
                (k.into(), value)
            })
            .collect();
        Self { answers }
    }
}

#[async_trait]
impl Prompter for StaticPrompter {
    async fn prompt(&self, parameters: &[Parameter]) -> Result<Answers> {
        Ok(parameters
            .iter()
            .filter_map(|p| self.answers.get(&p.name).map(|v| (p.name.clone(), v.clone())))
            .collect())
    }
}
