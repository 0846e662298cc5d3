use super::pipeline::ZeroShotClassifier;
use crate::core::{ClassifierConfig, HypothesisTemplate, Result};
use crate::models::{ModernBertSize, NliModernBertModel};
use crate::pipelines::utils::{DeviceRequest, DeviceSelectable};

/// Builds a [`ZeroShotClassifier`] backed by a ModernBERT NLI checkpoint.
///
/// ```rust,no_run
/// use zero_shot_nli::pipelines::utils::DeviceSelectable;
/// use zero_shot_nli::{ModernBertSize, ZeroShotClassifierBuilder};
///
/// # fn main() -> zero_shot_nli::Result<()> {
/// let classifier = ZeroShotClassifierBuilder::modernbert(ModernBertSize::Base)
///     .hypothesis_template("This example is about {}.")
///     .max_length(256)
///     .cpu()
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ZeroShotClassifierBuilder {
    config: ClassifierConfig,
    template: Option<String>,
}

impl ZeroShotClassifierBuilder {
    /// `model` is a hub repo id or a path to a local model directory.
    pub fn new(model: impl Into<String>) -> Self {
        Self::from_config(ClassifierConfig::new(model))
    }

    pub fn modernbert(size: ModernBertSize) -> Self {
        Self::new(size.repo_id())
    }

    pub fn from_config(config: ClassifierConfig) -> Self {
        Self {
            config,
            template: None,
        }
    }

    /// Hub branch, tag or commit to download.
    pub fn revision(mut self, revision: impl Into<String>) -> Self {
        self.config.revision = Some(revision.into());
        self
    }

    /// Template with a single `{}` for the class label. Validated in
    /// [`build`](Self::build).
    pub fn hypothesis_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn max_length(mut self, max_length: usize) -> Self {
        self.config.max_length = Some(max_length);
        self
    }

    pub fn build(self) -> Result<ZeroShotClassifier<NliModernBertModel>> {
        let mut config = self.config;
        if let Some(template) = self.template {
            config.hypothesis_template = HypothesisTemplate::new(&template)?;
        }
        ZeroShotClassifier::from_config(&config)
    }
}

impl DeviceSelectable for ZeroShotClassifierBuilder {
    fn device_request_mut(&mut self) -> &mut DeviceRequest {
        &mut self.config.device
    }
}
