use crate::core::Result;
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// One classification request: a text and the labels to rank for it.
///
/// Deserializes from the `{"text": ..., "classes": [...]}` body shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub text: String,
    pub classes: Vec<String>,
}

impl PredictionRequest {
    pub fn new<S: Into<String>>(text: impl Into<String>, classes: impl IntoIterator<Item = S>) -> Self {
        Self {
            text: text.into(),
            classes: classes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn class_refs(&self) -> Vec<&str> {
        self.classes.iter().map(String::as_str).collect()
    }
}

/// A candidate label with its probability. Serializes as a `[label, score]`
/// pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "(String, f32)", from = "(String, f32)")]
pub struct ScoredClass {
    pub label: String,
    /// In `[0, 1]`, rounded to 4 decimal places.
    pub score: f32,
}

impl ScoredClass {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

impl From<ScoredClass> for (String, f32) {
    fn from(scored: ScoredClass) -> Self {
        (scored.label, scored.score)
    }
}

impl From<(String, f32)> for ScoredClass {
    fn from((label, score): (String, f32)) -> Self {
        Self { label, score }
    }
}

/// Labels ranked by descending score. Equal scores keep the order in which
/// the classes were supplied.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct PredictionResult {
    ranked: Vec<ScoredClass>,
}

impl PredictionResult {
    /// Stable-sort `scores` into ranking order.
    pub fn rank(scores: impl IntoIterator<Item = ScoredClass>) -> Self {
        let mut ranked: Vec<ScoredClass> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        Self { ranked }
    }

    /// Highest-scoring class.
    pub fn top(&self) -> Option<&ScoredClass> {
        self.ranked.first()
    }

    /// Score of the first class named `label`.
    pub fn score_of(&self, label: &str) -> Option<f32> {
        self.ranked
            .iter()
            .find(|scored| scored.label == label)
            .map(|scored| scored.score)
    }

    pub fn total(&self) -> f32 {
        self.ranked.iter().map(|scored| scored.score).sum()
    }

    pub fn into_vec(self) -> Vec<ScoredClass> {
        self.ranked
    }
}

impl Deref for PredictionResult {
    type Target = [ScoredClass];

    fn deref(&self) -> &Self::Target {
        &self.ranked
    }
}

impl IntoIterator for PredictionResult {
    type Item = ScoredClass;
    type IntoIter = std::vec::IntoIter<ScoredClass>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranked.into_iter()
    }
}

impl<'a> IntoIterator for &'a PredictionResult {
    type Item = &'a ScoredClass;
    type IntoIter = std::slice::Iter<'a, ScoredClass>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranked.iter()
    }
}

/// Outcome for one text of a batch; each text succeeds or fails on its own.
#[derive(Debug)]
pub struct BatchPrediction {
    pub text: String,
    pub result: Result<PredictionResult>,
}

/// Presentation precision for reported probabilities.
pub(crate) fn round_score(score: f32) -> f32 {
    (score * 10_000.0).round() / 10_000.0
}
