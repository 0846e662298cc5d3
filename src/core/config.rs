use super::error::{ClassifierError, Result};
use crate::pipelines::utils::DeviceRequest;
use std::fmt;

const PLACEHOLDER: &str = "{}";

/// Pattern that turns a bare class label into a natural-language hypothesis.
///
/// The template must contain exactly one `{}`, which is replaced by the label:
///
/// ```rust
/// use zero_shot_nli::HypothesisTemplate;
///
/// let template = HypothesisTemplate::new("This review is about {}.").unwrap();
/// assert_eq!(template.format("shipping"), "This review is about shipping.");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HypothesisTemplate {
    prefix: String,
    suffix: String,
}

impl HypothesisTemplate {
    pub const DEFAULT: &'static str = "This text is about {}";

    pub fn new(template: &str) -> Result<Self> {
        let occurrences = template.matches(PLACEHOLDER).count();
        if occurrences != 1 {
            return Err(ClassifierError::Configuration(format!(
                "hypothesis template must contain exactly one `{PLACEHOLDER}`, found {occurrences} in {template:?}"
            )));
        }

        // Exactly one match, so the split always yields two halves.
        let (prefix, suffix) = template
            .split_once(PLACEHOLDER)
            .unwrap_or((template, ""));

        Ok(Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        })
    }

    /// Substitute `label` into the insertion point.
    pub fn format(&self, label: &str) -> String {
        let mut hypothesis =
            String::with_capacity(self.prefix.len() + label.len() + self.suffix.len());
        hypothesis.push_str(&self.prefix);
        hypothesis.push_str(label);
        hypothesis.push_str(&self.suffix);
        hypothesis
    }
}

impl Default for HypothesisTemplate {
    fn default() -> Self {
        Self {
            prefix: "This text is about ".to_string(),
            suffix: String::new(),
        }
    }
}

impl fmt::Display for HypothesisTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{PLACEHOLDER}{}", self.prefix, self.suffix)
    }
}

/// Everything needed to construct a classifier. Built by
/// [`ZeroShotClassifierBuilder`](crate::pipelines::zero_shot::ZeroShotClassifierBuilder)
/// and not modified afterwards.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Hugging Face hub repo id, or a path to a local model directory.
    pub model: String,
    /// Hub revision (branch, tag or commit). Ignored for local directories.
    pub revision: Option<String>,
    pub hypothesis_template: HypothesisTemplate,
    /// Upper bound on tokens per (text, hypothesis) pair. Defaults to the
    /// model's own limit.
    pub max_length: Option<usize>,
    pub device: DeviceRequest,
}

impl ClassifierConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            revision: None,
            hypothesis_template: HypothesisTemplate::default(),
            max_length: None,
            device: DeviceRequest::default(),
        }
    }
}
