use super::builder::ZeroShotClassifierBuilder;
use super::output::{round_score, BatchPrediction, PredictionRequest, PredictionResult, ScoredClass};
use crate::core::{global_cache, ClassifierConfig, ClassifierError, HypothesisTemplate, Result};
use crate::loaders::{ModelSource, TokenizerLoader};
use crate::models::{EntailmentModel, LogitBatch, NliModernBertModel, TokenBatch, ENTAILMENT_LABEL};
use crate::pipelines::utils::build_cache_key;
use candle_core::{DType, IndexOp, D};
use candle_nn::ops::softmax;
use std::collections::HashSet;
use std::sync::Arc;
use tokenizers::{
    PaddingParams, PaddingStrategy, PostProcessor, Tokenizer, TruncationParams,
    TruncationStrategy,
};

/// Used when neither the caller nor the model states a length limit.
const DEFAULT_MAX_LENGTH: usize = 512;

/// Ranks candidate labels for a text with an NLI model.
///
/// Every label is turned into a hypothesis ("This text is about sports"),
/// paired with the text, and scored by the model. The entailment logits of
/// all pairs are softmaxed against each other, so the scores of one
/// prediction sum to 1.
///
/// The model and tokenizer are loaded once and never mutated afterwards, so a
/// classifier can be shared between threads (it is `Send + Sync` whenever the
/// model is).
///
/// ```rust,no_run
/// use zero_shot_nli::ZeroShotClassifier;
///
/// # fn main() -> zero_shot_nli::Result<()> {
/// let classifier = ZeroShotClassifier::new("MoritzLaurer/ModernBERT-base-zeroshot-v2.0")?;
/// let ranked = classifier.predict(
///     "I love playing football on weekends",
///     &["sports", "politics", "cooking"],
/// )?;
/// println!("{}: {:.4}", ranked[0].label, ranked[0].score);
/// # Ok(())
/// # }
/// ```
pub struct ZeroShotClassifier<M: EntailmentModel = NliModernBertModel> {
    model: Arc<M>,
    tokenizer: Tokenizer,
    template: HypothesisTemplate,
    max_length: usize,
}

impl ZeroShotClassifier<NliModernBertModel> {
    /// Load the model and tokenizer from a hub repo id or a local directory,
    /// with default settings.
    pub fn new(model_path: &str) -> Result<Self> {
        ZeroShotClassifierBuilder::new(model_path).build()
    }

    /// Load according to `config`. Weights are shared with any other
    /// classifier built for the same source and device.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        let source = ModelSource::resolve(&config.model, config.revision.as_deref());
        tracing::debug!(%source, device = %config.device, "building zero-shot classifier");
        let device = config.device.clone().resolve()?;
        let key = build_cache_key(&source, &device);

        let model = global_cache()
            .get_or_create(&key, || NliModernBertModel::load(&source, device.clone()))?;
        let tokenizer = TokenizerLoader::new(&source).load()?;

        Self::from_parts(
            model,
            tokenizer,
            config.hypothesis_template.clone(),
            config.max_length,
        )
    }
}

impl<M: EntailmentModel> ZeroShotClassifier<M> {
    /// Assemble a classifier around an already loaded model.
    ///
    /// `max_length` caps tokens per (text, hypothesis) pair; it is clamped to
    /// the model's own limit.
    pub fn from_parts(
        model: impl Into<Arc<M>>,
        tokenizer: Tokenizer,
        template: HypothesisTemplate,
        max_length: Option<usize>,
    ) -> Result<Self> {
        let model = model.into();
        let max_length = match (max_length, model.max_sequence_length()) {
            (Some(requested), Some(limit)) => requested.min(limit),
            (Some(requested), None) => requested,
            (None, Some(limit)) => limit,
            (None, None) => DEFAULT_MAX_LENGTH,
        };
        let tokenizer = configure_tokenizer(tokenizer, max_length)?;

        Ok(Self {
            model,
            tokenizer,
            template,
            max_length,
        })
    }

    /// Tokenize one (text, hypothesis) pair per class into a padded batch.
    /// Pairs that are too long lose tokens from the end of the text only.
    pub fn preprocess(&self, text: &str, classes: &[&str]) -> Result<TokenBatch> {
        validate_input(text, classes)?;

        let pairs: Vec<(&str, String)> = classes
            .iter()
            .map(|class| (text, self.template.format(class)))
            .collect();

        let encodings = self
            .tokenizer
            .encode_batch(pairs, true)
            .map_err(|e| ClassifierError::Inference(format!("tokenization failed: {e}")))?;

        TokenBatch::from_encodings(&encodings)
    }

    /// Softmax the entailment column across classes and rank the classes.
    pub fn post_process(&self, logits: &LogitBatch, classes: &[&str]) -> Result<PredictionResult> {
        let entailment_id = self.entailment_id()?;
        check_rows(logits, classes)?;

        let column = logits.column(entailment_id)?;
        let probabilities = softmax(&column, D::Minus1)?.to_vec1::<f32>()?;

        Ok(rank(classes, probabilities))
    }

    /// Rank `classes` for `text`. Runs exactly one forward pass.
    pub fn predict(&self, text: &str, classes: &[&str]) -> Result<PredictionResult> {
        let batch = self.preprocess(text, classes)?;
        tracing::debug!(
            classes = classes.len(),
            seq_len = batch.seq_len(),
            "running zero-shot inference"
        );
        let logits = self.model.forward(&batch)?;
        self.post_process(&logits, classes)
    }

    pub fn predict_request(&self, request: &PredictionRequest) -> Result<PredictionResult> {
        self.predict(&request.text, &request.class_refs())
    }

    /// Score every class independently: the entailment probability of each
    /// (text, hypothesis) pair, normalized within its own row. Scores do not
    /// sum to 1; use this when several labels may apply at once.
    pub fn predict_multi_label(&self, text: &str, classes: &[&str]) -> Result<PredictionResult> {
        let batch = self.preprocess(text, classes)?;
        let logits = self.model.forward(&batch)?;

        let entailment_id = self.entailment_id()?;
        check_rows(&logits, classes)?;
        if entailment_id >= logits.num_labels() {
            return Err(ClassifierError::Configuration(format!(
                "entailment index {entailment_id} is out of range for logits with {} labels",
                logits.num_labels()
            )));
        }

        let per_row = softmax(&logits.as_tensor().to_dtype(DType::F32)?, D::Minus1)?;
        let probabilities = per_row.i((.., entailment_id))?.to_vec1::<f32>()?;

        Ok(rank(classes, probabilities))
    }

    /// Classify several texts against the same classes, one forward pass per
    /// text. A failure for one text does not affect the others.
    pub fn predict_batch(&self, texts: &[&str], classes: &[&str]) -> Vec<BatchPrediction> {
        texts
            .iter()
            .map(|&text| BatchPrediction {
                text: text.to_string(),
                result: self.predict(text, classes),
            })
            .collect()
    }

    pub fn model(&self) -> &Arc<M> {
        &self.model
    }

    pub fn hypothesis_template(&self) -> &HypothesisTemplate {
        &self.template
    }

    /// Token budget per (text, hypothesis) pair.
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn device(&self) -> &candle_core::Device {
        self.model.device()
    }

    fn entailment_id(&self) -> Result<usize> {
        self.model.label_id(ENTAILMENT_LABEL).ok_or_else(|| {
            ClassifierError::Configuration(format!(
                "model label mapping has no '{ENTAILMENT_LABEL}' label"
            ))
        })
    }
}

fn validate_input(text: &str, classes: &[&str]) -> Result<()> {
    if text.trim().is_empty() {
        return Err(ClassifierError::Input("text must not be empty".into()));
    }
    if classes.is_empty() {
        return Err(ClassifierError::Input(
            "at least one candidate class is required".into(),
        ));
    }

    let mut seen = HashSet::with_capacity(classes.len());
    if !classes.iter().all(|class| seen.insert(*class)) {
        tracing::debug!(?classes, "duplicate classes are scored as separate hypotheses");
    }
    Ok(())
}

fn check_rows(logits: &LogitBatch, classes: &[&str]) -> Result<()> {
    if classes.is_empty() {
        return Err(ClassifierError::Input(
            "at least one candidate class is required".into(),
        ));
    }
    if logits.num_rows() != classes.len() {
        return Err(ClassifierError::Inference(format!(
            "model returned {} logit rows for {} classes",
            logits.num_rows(),
            classes.len()
        )));
    }
    Ok(())
}

fn rank(classes: &[&str], probabilities: Vec<f32>) -> PredictionResult {
    PredictionResult::rank(
        classes
            .iter()
            .zip(probabilities)
            .map(|(&label, probability)| ScoredClass::new(label, round_score(probability))),
    )
}

/// Pad every batch to its longest pair and truncate only the first sequence
/// (the text) of a pair that exceeds `max_length`.
fn configure_tokenizer(mut tokenizer: Tokenizer, max_length: usize) -> Result<Tokenizer> {
    let pair_overhead = tokenizer
        .get_post_processor()
        .map_or(0, |processor| processor.added_tokens(true));
    if max_length <= pair_overhead {
        return Err(ClassifierError::Configuration(format!(
            "max_length {max_length} leaves no room for text next to {pair_overhead} special tokens"
        )));
    }

    let existing = tokenizer.get_padding().cloned();
    let pad_id = existing
        .as_ref()
        .map(|p| p.pad_id)
        .or_else(|| tokenizer.token_to_id("[PAD]"))
        .or_else(|| tokenizer.token_to_id("<pad>"))
        .unwrap_or(0);
    let pad_token = existing
        .map(|p| p.pad_token)
        .or_else(|| tokenizer.id_to_token(pad_id))
        .unwrap_or_else(|| "[PAD]".to_string());

    tokenizer.with_padding(Some(PaddingParams {
        strategy: PaddingStrategy::BatchLongest,
        pad_id,
        pad_token,
        ..Default::default()
    }));
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            strategy: TruncationStrategy::OnlyFirst,
            stride: 0,
            ..Default::default()
        }))
        .map_err(|e| ClassifierError::Configuration(format!("invalid truncation: {e}")))?;

    Ok(tokenizer)
}
