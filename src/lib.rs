//! # zero-shot-nli
//!
//! Zero-shot text classification on top of pretrained NLI models, running on
//! [candle](https://github.com/huggingface/candle).
//!
//! ```rust,no_run
//! use zero_shot_nli::ZeroShotClassifier;
//!
//! # fn main() -> zero_shot_nli::Result<()> {
//! let classifier = ZeroShotClassifier::new("MoritzLaurer/ModernBERT-base-zeroshot-v2.0")?;
//! let ranked = classifier.predict(
//!     "I love playing football on weekends",
//!     &["sports", "politics", "cooking"],
//! )?;
//! assert_eq!(ranked.len(), 3);
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod loaders;
pub mod models;
pub mod pipelines;

pub use crate::core::{ClassifierConfig, ClassifierError, HypothesisTemplate, Result};
pub use models::{EntailmentModel, LogitBatch, ModernBertSize, NliModernBertModel, TokenBatch};
pub use pipelines::zero_shot::{
    BatchPrediction, PredictionRequest, PredictionResult, ScoredClass, ZeroShotClassifier,
    ZeroShotClassifierBuilder,
};
