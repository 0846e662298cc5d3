// Shared fixtures for the integration tests: a tiny word-level tokenizer and
// an NLI stand-in that scores hypotheses by keyword affinity.

#![allow(dead_code)]

use candle_core::Device;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokenizers::Tokenizer;
use zero_shot_nli::{
    EntailmentModel, HypothesisTemplate, LogitBatch, Result, TokenBatch, ZeroShotClassifier,
};

pub const PAD: u32 = 0;
pub const CLS: u32 = 2;
pub const SEP: u32 = 3;

const TOKENIZER_JSON: &str = r#"{
    "version": "1.0",
    "truncation": null,
    "padding": null,
    "added_tokens": [],
    "normalizer": {"type": "Lowercase"},
    "pre_tokenizer": {"type": "Whitespace"},
    "post_processor": {"type": "BertProcessing", "sep": ["[SEP]", 3], "cls": ["[CLS]", 2]},
    "decoder": null,
    "model": {
        "type": "WordLevel",
        "vocab": {
            "[PAD]": 0, "[UNK]": 1, "[CLS]": 2, "[SEP]": 3,
            "this": 4, "text": 5, "is": 6, "about": 7,
            "i": 8, "love": 9, "playing": 10, "football": 11, "on": 12, "weekends": 13,
            "sports": 14, "politics": 15, "cooking": 16,
            "the": 17, "election": 18, "results": 19, "were": 20, "surprising": 21,
            "recipe": 22, "needs": 23, "garlic": 24,
            "science": 25, "fiction": 26,
            "with": 27, "my": 28, "friends": 29, "and": 30, "family": 31,
            "every": 32, "single": 33, "week": 34
        },
        "unk_token": "[UNK]"
    }
}"#;

pub fn fixture_tokenizer() -> Tokenizer {
    Tokenizer::from_str(TOKENIZER_JSON).expect("fixture tokenizer parses")
}

/// Write the fixture tokenizer as `tokenizer.json` into a model directory.
pub fn write_fixture_tokenizer(dir: &Path) {
    std::fs::write(dir.join("tokenizer.json"), TOKENIZER_JSON).expect("tokenizer.json written");
}

pub fn token_id(word: &str) -> u32 {
    fixture_tokenizer()
        .token_to_id(word)
        .unwrap_or_else(|| panic!("'{word}' is not in the fixture vocabulary"))
}

/// Entailment logit of a pair is the summed affinity between its text tokens
/// and its hypothesis tokens; the not-entailment logit is its negation.
pub struct KeywordModel {
    affinity: HashMap<(u32, u32), f32>,
    labels: HashMap<String, usize>,
    max_sequence_length: Option<usize>,
    forward_calls: AtomicUsize,
    device: Device,
}

impl KeywordModel {
    pub fn new(pairs: &[(&str, &str, f32)]) -> Self {
        let affinity = pairs
            .iter()
            .map(|&(text_word, label_word, weight)| {
                ((token_id(text_word), token_id(label_word)), weight)
            })
            .collect();
        let labels = [("entailment", 0), ("not_entailment", 1)]
            .into_iter()
            .map(|(name, id)| (name.to_string(), id))
            .collect();
        Self {
            affinity,
            labels,
            max_sequence_length: None,
            forward_calls: AtomicUsize::new(0),
            device: Device::Cpu,
        }
    }

    /// Knows about sports, politics and cooking.
    pub fn topics() -> Self {
        Self::new(&[
            ("football", "sports", 4.0),
            ("playing", "sports", 1.0),
            ("weekends", "sports", 0.5),
            ("election", "politics", 4.0),
            ("results", "politics", 1.0),
            ("recipe", "cooking", 4.0),
            ("garlic", "cooking", 2.0),
        ])
    }

    pub fn with_max_sequence_length(mut self, limit: usize) -> Self {
        self.max_sequence_length = Some(limit);
        self
    }

    pub fn with_labels(mut self, labels: &[(&str, usize)]) -> Self {
        self.labels = labels
            .iter()
            .map(|&(name, id)| (name.to_string(), id))
            .collect();
        self
    }

    pub fn forward_calls(&self) -> usize {
        self.forward_calls.load(Ordering::SeqCst)
    }

    fn score_row(&self, ids: &[u32]) -> f32 {
        let mut segments = ids.split(|&id| id == SEP);
        let text: Vec<u32> = segments
            .next()
            .unwrap_or_default()
            .iter()
            .copied()
            .filter(|&id| id != CLS)
            .collect();
        let hypothesis = segments.next().unwrap_or_default();

        text.iter()
            .flat_map(|t| hypothesis.iter().map(move |h| (*t, *h)))
            .filter_map(|pair| self.affinity.get(&pair))
            .sum()
    }
}

impl EntailmentModel for KeywordModel {
    fn forward(&self, batch: &TokenBatch) -> Result<LogitBatch> {
        self.forward_calls.fetch_add(1, Ordering::SeqCst);
        let rows: Vec<Vec<f32>> = batch
            .input_ids()
            .iter()
            .map(|ids| {
                let entailment = self.score_row(ids);
                vec![entailment, -entailment]
            })
            .collect();
        LogitBatch::from_rows(&rows, &self.device)
    }

    fn label_id(&self, label: &str) -> Option<usize> {
        self.labels.get(label).copied()
    }

    fn max_sequence_length(&self) -> Option<usize> {
        self.max_sequence_length
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

pub fn topic_classifier() -> ZeroShotClassifier<KeywordModel> {
    classifier_with(KeywordModel::topics(), None)
}

pub fn classifier_with(
    model: KeywordModel,
    max_length: Option<usize>,
) -> ZeroShotClassifier<KeywordModel> {
    ZeroShotClassifier::from_parts(
        model,
        fixture_tokenizer(),
        HypothesisTemplate::default(),
        max_length,
    )
    .expect("fixture classifier builds")
}
