//! Zero-shot text classification.
//!
//! Classify text into categories chosen at call time, no training required.
//! Each category is phrased as a hypothesis and scored by an NLI model;
//! labels come back ranked by confidence.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use zero_shot_nli::pipelines::zero_shot::{ModernBertSize, ZeroShotClassifierBuilder};
//!
//! # fn main() -> zero_shot_nli::Result<()> {
//! let classifier = ZeroShotClassifierBuilder::modernbert(ModernBertSize::Base).build()?;
//! let labels = &["sports", "politics", "cooking"];
//!
//! let ranked = classifier.predict("I love playing football on weekends", labels)?;
//!
//! // sports: 0.9..., cooking: 0.0..., politics: 0.0...
//! for scored in &ranked {
//!     println!("{}: {:.4}", scored.label, scored.score);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Single-Label vs Multi-Label
//!
//! **Single-label** (`predict`): scores sum to 1.0, use when the classes are
//! mutually exclusive.
//!
//! **Multi-label** (`predict_multi_label`): independent probabilities, use
//! when several classes can apply.
//!
//! # Custom Models
//!
//! Any type implementing [`EntailmentModel`](crate::models::EntailmentModel)
//! can be plugged in with [`ZeroShotClassifier::from_parts`].

mod builder;
mod output;
mod pipeline;

pub use crate::models::ModernBertSize;
pub use builder::ZeroShotClassifierBuilder;
pub use output::{BatchPrediction, PredictionRequest, PredictionResult, ScoredClass};
pub use pipeline::ZeroShotClassifier;
