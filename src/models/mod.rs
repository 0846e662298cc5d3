//! Model capability consumed by the classifier, and the tensors exchanged
//! with it.

pub mod modernbert;

pub use modernbert::{ModernBertSize, NliModernBertModel};

use crate::core::{ClassifierError, Result};
use candle_core::{DType, Device, IndexOp, Tensor};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use tokenizers::Encoding;

/// Label name the classifier reads scores from.
pub const ENTAILMENT_LABEL: &str = "entailment";

/// A sequence-pair classifier trained for natural-language inference.
///
/// Implementations must be read-only after construction: the classifier
/// shares one instance between threads without locking.
pub trait EntailmentModel {
    /// Run one forward pass. Returns one logit row per batch row.
    fn forward(&self, batch: &TokenBatch) -> Result<LogitBatch>;

    /// Output column for a label name such as `"entailment"`.
    fn label_id(&self, label: &str) -> Option<usize>;

    /// Longest token sequence the model accepts, if it has a limit.
    fn max_sequence_length(&self) -> Option<usize> {
        None
    }

    fn device(&self) -> &Device;
}

/// Tokenized (text, hypothesis) pairs, one row per candidate class, all of
/// the same length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBatch {
    input_ids: Vec<Vec<u32>>,
    attention_mask: Vec<Vec<u32>>,
    seq_len: usize,
}

impl TokenBatch {
    pub fn new(input_ids: Vec<Vec<u32>>, attention_mask: Vec<Vec<u32>>) -> Result<Self> {
        if input_ids.len() != attention_mask.len() {
            return Err(ClassifierError::Inference(format!(
                "token batch has {} rows but {} attention masks",
                input_ids.len(),
                attention_mask.len()
            )));
        }

        let seq_len = input_ids.first().map_or(0, Vec::len);
        let ragged = input_ids
            .iter()
            .zip(&attention_mask)
            .any(|(ids, mask)| ids.len() != seq_len || mask.len() != seq_len);
        if ragged {
            return Err(ClassifierError::Inference(
                "token batch rows are not padded to a uniform length".into(),
            ));
        }

        Ok(Self {
            input_ids,
            attention_mask,
            seq_len,
        })
    }

    pub fn from_encodings(encodings: &[Encoding]) -> Result<Self> {
        let input_ids = encodings.iter().map(|e| e.get_ids().to_vec()).collect();
        let attention_mask = encodings
            .iter()
            .map(|e| e.get_attention_mask().to_vec())
            .collect();
        Self::new(input_ids, attention_mask)
    }

    /// Number of rows (candidate classes).
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    pub fn input_ids(&self) -> &[Vec<u32>] {
        &self.input_ids
    }

    pub fn attention_mask(&self) -> &[Vec<u32>] {
        &self.attention_mask
    }

    /// `(input_ids, attention_mask)`, both shaped `(rows, seq_len)`.
    pub fn to_tensors(&self, device: &Device) -> Result<(Tensor, Tensor)> {
        let shape = (self.len(), self.seq_len);
        let input_ids = Tensor::from_vec(self.input_ids.concat(), shape, device)?;
        let attention_mask = Tensor::from_vec(self.attention_mask.concat(), shape, device)?;
        Ok((input_ids, attention_mask))
    }
}

/// Raw model scores shaped `(rows, num_labels)`.
#[derive(Debug, Clone)]
pub struct LogitBatch(Tensor);

impl LogitBatch {
    pub fn new(logits: Tensor) -> Result<Self> {
        if logits.rank() != 2 {
            return Err(ClassifierError::Inference(format!(
                "expected logits of shape (rows, labels), got {:?}",
                logits.dims()
            )));
        }
        Ok(Self(logits))
    }

    pub fn from_rows(rows: &[Vec<f32>], device: &Device) -> Result<Self> {
        let num_labels = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != num_labels) {
            return Err(ClassifierError::Inference(
                "logit rows have different widths".into(),
            ));
        }
        let logits = Tensor::from_vec(rows.concat(), (rows.len(), num_labels), device)?;
        Self::new(logits)
    }

    pub fn num_rows(&self) -> usize {
        self.0.dims()[0]
    }

    pub fn num_labels(&self) -> usize {
        self.0.dims()[1]
    }

    /// Scores of one output label for every row, as `f32`.
    pub fn column(&self, index: usize) -> Result<Tensor> {
        if index >= self.num_labels() {
            return Err(ClassifierError::Configuration(format!(
                "label index {index} is out of range for logits with {} labels",
                self.num_labels()
            )));
        }
        Ok(self.0.i((.., index))?.to_dtype(DType::F32)?)
    }

    pub fn as_tensor(&self) -> &Tensor {
        &self.0
    }
}

/// `label2id` section of a checkpoint's `config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelMap(HashMap<String, usize>);

impl LabelMap {
    pub fn new(label2id: HashMap<String, usize>) -> Self {
        Self(label2id)
    }

    /// Exact match first, then ASCII case-insensitive (MNLI checkpoints
    /// disagree on "entailment" vs "ENTAILMENT").
    pub fn get(&self, label: &str) -> Option<usize> {
        self.0.get(label).copied().or_else(|| {
            self.0
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(label))
                .map(|(_, &id)| id)
        })
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for LabelMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        // Some exported configs store the ids as strings.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(usize),
            Text(String),
        }

        let raw = HashMap::<String, RawId>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(label, id)| {
                let id = match id {
                    RawId::Number(n) => n,
                    RawId::Text(s) => s.parse::<usize>().map_err(|_| {
                        <D::Error as serde::de::Error>::custom(format!(
                            "invalid id {s:?} for label {label:?}"
                        ))
                    })?,
                };
                Ok((label, id))
            })
            .collect::<std::result::Result<HashMap<_, _>, D::Error>>()
            .map(Self)
    }
}
