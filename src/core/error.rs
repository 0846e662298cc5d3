use thiserror::Error;

/// Error type returned by every fallible operation in this crate.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// The model identifier could not be resolved, or one of its files could
    /// not be fetched or loaded.
    #[error("Failed to load model: {0}")]
    Load(String),

    /// The loaded model (or the classifier setup) cannot serve zero-shot
    /// predictions, e.g. its label mapping has no "entailment" entry.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The caller supplied an unusable request (empty text, no classes).
    #[error("Invalid input: {0}")]
    Input(String),

    /// Tokenization failed or the model returned logits of the wrong shape.
    #[error("Inference failed: {0}")]
    Inference(String),

    // Pass-through from dependencies
    #[error(transparent)]
    Candle(#[from] candle_core::Error),
}

pub type Result<T> = std::result::Result<T, ClassifierError>;

impl From<hf_hub::api::sync::ApiError> for ClassifierError {
    fn from(value: hf_hub::api::sync::ApiError) -> Self {
        ClassifierError::Load(value.to_string())
    }
}
