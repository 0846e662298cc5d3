//! ModernBERT sequence-pair classifier for NLI checkpoints.
//!
//! ModernBERT is an encoder-only Transformer with rotary position embeddings,
//! GeGLU feed-forward blocks and alternating global / sliding-window
//! attention. Only the sequence-classification path is implemented: pooled
//! hidden states go through the prediction head and a linear classifier that
//! emits one logit per NLI label.
//!
//! The `MoritzLaurer/ModernBERT-*-zeroshot-v2.0` checkpoints label their two
//! outputs `entailment` and `not_entailment`:
//!
//! ```json
//! "id2label": { "0": "entailment", "1": "not_entailment" },
//! "label2id": { "entailment": 0, "not_entailment": 1 },
//! "classifier_pooling": "mean",
//! "max_position_embeddings": 8192,
//! ```

use super::{EntailmentModel, LabelMap, LogitBatch, TokenBatch};
use crate::core::{ClassifierError, Result};
use crate::loaders::{JsonConfigLoader, ModelSource, WeightsLoader};
use candle_core::{DType, Device, IndexOp, Module, Tensor, D};
use candle_nn::{
    embedding, layer_norm_no_bias, linear, linear_no_bias, ops::softmax_last_dim, Embedding,
    LayerNorm, Linear, VarBuilder,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Architecture hyper-parameters and label metadata read from `config.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ModernBertConfig {
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub intermediate_size: usize,
    pub max_position_embeddings: usize,
    pub layer_norm_eps: f64,
    pub global_attn_every_n_layers: usize,
    pub global_rope_theta: f64,
    pub local_attention: usize,
    pub local_rope_theta: f64,
    #[serde(default)]
    pub classifier_pooling: ClassifierPooling,
    #[serde(default)]
    pub classifier_bias: bool,
    pub label2id: LabelMap,
    #[serde(default)]
    pub id2label: HashMap<String, String>,
}

impl ModernBertConfig {
    fn num_labels(&self) -> usize {
        if self.id2label.is_empty() {
            self.label2id.len()
        } else {
            self.id2label.len()
        }
    }

    fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierPooling {
    #[default]
    Cls,
    Mean,
}

/// Precomputed rotary tables for one rope theta.
#[derive(Debug)]
struct RotaryEmbedding {
    sin: Tensor,
    cos: Tensor,
}

impl RotaryEmbedding {
    fn new(config: &Config, theta: f64, device: &Device) -> Result<Self> {
        let dim = config.head_dim();
        let inv_freq: Vec<f32> = (0..dim)
            .step_by(2)
            .map(|i| (1.0 / theta.powf(i as f64 / dim as f64)) as f32)
            .collect();
        let half = inv_freq.len();
        let inv_freq = Tensor::from_vec(inv_freq, (1, half), device)?;

        let max_len = config.max_position_embeddings;
        let positions = Tensor::arange(0u32, max_len as u32, device)?
            .to_dtype(DType::F32)?
            .reshape((max_len, 1))?;
        let angles = positions.matmul(&inv_freq)?;

        Ok(Self {
            sin: angles.sin()?,
            cos: angles.cos()?,
        })
    }

    fn apply(&self, q: &Tensor, k: &Tensor) -> Result<(Tensor, Tensor)> {
        let seq_len = q.dim(2)?;
        let cos = self.cos.narrow(0, 0, seq_len)?;
        let sin = self.sin.narrow(0, 0, seq_len)?;
        let q = candle_nn::rotary_emb::rope(&q.contiguous()?, &cos, &sin)?;
        let k = candle_nn::rotary_emb::rope(&k.contiguous()?, &cos, &sin)?;
        Ok((q, k))
    }
}

type Config = ModernBertConfig;

#[derive(Debug)]
struct SelfAttention {
    wqkv: Linear,
    wo: Linear,
    num_heads: usize,
    head_dim: usize,
    rotary: Arc<RotaryEmbedding>,
}

impl SelfAttention {
    fn load(vb: VarBuilder, config: &Config, rotary: Arc<RotaryEmbedding>) -> Result<Self> {
        let hidden = config.hidden_size;
        Ok(Self {
            wqkv: linear_no_bias(hidden, hidden * 3, vb.pp("Wqkv"))?,
            wo: linear_no_bias(hidden, hidden, vb.pp("Wo"))?,
            num_heads: config.num_attention_heads,
            head_dim: config.head_dim(),
            rotary,
        })
    }

    fn forward(&self, xs: &Tensor, mask: &Tensor) -> Result<Tensor> {
        let (batch, seq_len, hidden) = xs.dims3()?;

        // (3, batch, heads, seq, head_dim)
        let qkv = xs
            .apply(&self.wqkv)?
            .reshape((batch, seq_len, 3, self.num_heads, self.head_dim))?
            .permute((2, 0, 3, 1, 4))?;
        let (q, k) = self.rotary.apply(&qkv.get(0)?, &qkv.get(1)?)?;
        let v = qkv.get(2)?.contiguous()?;

        let q = (q * (self.head_dim as f64).powf(-0.5))?;
        let scores = q
            .matmul(&k.transpose(D::Minus2, D::Minus1)?.contiguous()?)?
            .broadcast_add(mask)?;
        let probs = softmax_last_dim(&scores)?;

        Ok(probs
            .matmul(&v)?
            .transpose(1, 2)?
            .reshape((batch, seq_len, hidden))?
            .apply(&self.wo)?)
    }
}

/// GeGLU feed-forward block.
#[derive(Debug)]
struct GegluMlp {
    wi: Linear,
    wo: Linear,
}

impl GegluMlp {
    fn load(vb: VarBuilder, config: &Config) -> Result<Self> {
        Ok(Self {
            wi: linear_no_bias(
                config.hidden_size,
                config.intermediate_size * 2,
                vb.pp("Wi"),
            )?,
            wo: linear_no_bias(config.intermediate_size, config.hidden_size, vb.pp("Wo"))?,
        })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let xs = xs.apply(&self.wi)?;
        let halves = xs.chunk(2, D::Minus1)?;
        let gated = (halves[0].gelu_erf()? * &halves[1])?;
        Ok(gated.apply(&self.wo)?)
    }
}

#[derive(Debug)]
struct EncoderLayer {
    attn_norm: Option<LayerNorm>,
    attn: SelfAttention,
    mlp_norm: LayerNorm,
    mlp: GegluMlp,
    sliding_window: bool,
}

impl EncoderLayer {
    fn load(
        vb: VarBuilder,
        config: &Config,
        layer_idx: usize,
        rotary: Arc<RotaryEmbedding>,
    ) -> Result<Self> {
        let eps = config.layer_norm_eps;
        // The first layer reuses the embedding norm and has no attn_norm weights.
        let attn_norm = if layer_idx == 0 {
            None
        } else {
            Some(layer_norm_no_bias(config.hidden_size, eps, vb.pp("attn_norm"))?)
        };

        Ok(Self {
            attn_norm,
            attn: SelfAttention::load(vb.pp("attn"), config, rotary)?,
            mlp_norm: layer_norm_no_bias(config.hidden_size, eps, vb.pp("mlp_norm"))?,
            mlp: GegluMlp::load(vb.pp("mlp"), config)?,
            sliding_window: layer_idx % config.global_attn_every_n_layers != 0,
        })
    }

    fn forward(&self, xs: &Tensor, global_mask: &Tensor, window_mask: &Tensor) -> Result<Tensor> {
        let normed = match &self.attn_norm {
            Some(norm) => xs.apply(norm)?,
            None => xs.clone(),
        };

        let attn_out = if self.sliding_window {
            let mask = global_mask.broadcast_add(window_mask)?;
            self.attn.forward(&normed, &mask)?
        } else {
            self.attn.forward(&normed, global_mask)?
        };
        let xs = (xs + attn_out)?;

        let mlp_out = self.mlp.forward(&xs.apply(&self.mlp_norm)?)?;
        Ok((xs + mlp_out)?)
    }
}

/// Embeddings, encoder stack and final norm.
#[derive(Debug)]
struct Encoder {
    tok_embeddings: Embedding,
    embedding_norm: LayerNorm,
    layers: Vec<EncoderLayer>,
    final_norm: LayerNorm,
    local_attention: usize,
}

impl Encoder {
    fn load(vb: VarBuilder, config: &Config) -> Result<Self> {
        let device = vb.device().clone();
        let global_rotary = Arc::new(RotaryEmbedding::new(
            config,
            config.global_rope_theta,
            &device,
        )?);
        let local_rotary = Arc::new(RotaryEmbedding::new(
            config,
            config.local_rope_theta,
            &device,
        )?);

        let layers = (0..config.num_hidden_layers)
            .map(|idx| {
                let rotary = if idx % config.global_attn_every_n_layers == 0 {
                    global_rotary.clone()
                } else {
                    local_rotary.clone()
                };
                EncoderLayer::load(vb.pp(format!("layers.{idx}")), config, idx, rotary)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            tok_embeddings: embedding(
                config.vocab_size,
                config.hidden_size,
                vb.pp("embeddings.tok_embeddings"),
            )?,
            embedding_norm: layer_norm_no_bias(
                config.hidden_size,
                config.layer_norm_eps,
                vb.pp("embeddings.norm"),
            )?,
            layers,
            final_norm: layer_norm_no_bias(
                config.hidden_size,
                config.layer_norm_eps,
                vb.pp("final_norm"),
            )?,
            local_attention: config.local_attention,
        })
    }

    /// Additive mask shaped `(batch, 1, seq, seq)`: 0 for real tokens, a large
    /// negative value for padding.
    fn padding_mask(attention_mask: &Tensor) -> Result<Tensor> {
        let (batch, seq_len) = attention_mask.dims2()?;
        let keep = attention_mask
            .to_dtype(DType::F32)?
            .reshape((batch, 1, 1, seq_len))?
            .expand((batch, 1, seq_len, seq_len))?;
        // (1 - keep) * f32::MIN
        Ok(keep.affine(-1.0, 1.0)?.affine(f32::MIN as f64, 0.0)?)
    }

    /// Additive `(seq, seq)` mask hiding tokens outside the local window.
    fn window_mask(&self, seq_len: usize, device: &Device) -> Result<Tensor> {
        let half_window = self.local_attention / 2;
        let mask: Vec<f32> = (0..seq_len)
            .flat_map(|i| {
                (0..seq_len).map(move |j| {
                    if i.abs_diff(j) > half_window {
                        f32::NEG_INFINITY
                    } else {
                        0.0
                    }
                })
            })
            .collect();
        Ok(Tensor::from_vec(mask, (seq_len, seq_len), device)?)
    }

    fn forward(&self, input_ids: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let seq_len = input_ids.dim(1)?;
        let global_mask = Self::padding_mask(attention_mask)?;
        let window_mask = self.window_mask(seq_len, input_ids.device())?;

        let mut xs = input_ids
            .apply(&self.tok_embeddings)?
            .apply(&self.embedding_norm)?;
        for layer in &self.layers {
            xs = layer.forward(&xs, &global_mask, &window_mask)?;
        }
        Ok(xs.apply(&self.final_norm)?)
    }
}

/// Pooling, dense + GELU + norm head, then the label classifier.
#[derive(Debug)]
struct ClassificationHead {
    dense: Linear,
    norm: LayerNorm,
    classifier: Linear,
    pooling: ClassifierPooling,
}

impl ClassificationHead {
    fn load(vb: VarBuilder, config: &Config) -> Result<Self> {
        let hidden = config.hidden_size;
        let dense = if config.classifier_bias {
            linear(hidden, hidden, vb.pp("head.dense"))?
        } else {
            linear_no_bias(hidden, hidden, vb.pp("head.dense"))?
        };

        Ok(Self {
            dense,
            norm: layer_norm_no_bias(hidden, config.layer_norm_eps, vb.pp("head.norm"))?,
            classifier: linear(hidden, config.num_labels(), vb.pp("classifier"))?,
            pooling: config.classifier_pooling,
        })
    }

    fn forward(&self, hidden_states: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let pooled = match self.pooling {
            ClassifierPooling::Cls => hidden_states.i((.., 0, ..))?,
            ClassifierPooling::Mean => {
                let mask = attention_mask.to_dtype(DType::F32)?;
                let summed = hidden_states
                    .broadcast_mul(&mask.unsqueeze(D::Minus1)?)?
                    .sum(1)?;
                summed.broadcast_div(&mask.sum_keepdim(1)?)?
            }
        };

        Ok(self
            .dense
            .forward(&pooled)?
            .gelu_erf()?
            .apply(&self.norm)?
            .apply(&self.classifier)?)
    }
}

/// ModernBERT encoder with a sequence-classification head.
#[derive(Debug)]
pub struct ModernBertForSequenceClassification {
    encoder: Encoder,
    head: ClassificationHead,
}

impl ModernBertForSequenceClassification {
    pub fn load(vb: VarBuilder, config: &ModernBertConfig) -> Result<Self> {
        Ok(Self {
            encoder: Encoder::load(vb.pp("model"), config)?,
            head: ClassificationHead::load(vb, config)?,
        })
    }

    /// `input_ids` and `attention_mask` are `(batch, seq)`; returns logits
    /// shaped `(batch, num_labels)`.
    pub fn forward(&self, input_ids: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let hidden_states = self.encoder.forward(input_ids, attention_mask)?;
        self.head.forward(&hidden_states, attention_mask)
    }
}

/// Published zero-shot ModernBERT checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModernBertSize {
    Base,
    Large,
}

impl ModernBertSize {
    pub fn repo_id(&self) -> &'static str {
        match self {
            ModernBertSize::Base => "MoritzLaurer/ModernBERT-base-zeroshot-v2.0",
            ModernBertSize::Large => "MoritzLaurer/ModernBERT-large-zeroshot-v2.0",
        }
    }
}

impl fmt::Display for ModernBertSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.repo_id())
    }
}

/// A loaded ModernBERT NLI checkpoint, usable as an [`EntailmentModel`].
#[derive(Debug)]
pub struct NliModernBertModel {
    model: ModernBertForSequenceClassification,
    labels: LabelMap,
    max_position_embeddings: usize,
    device: Device,
}

impl NliModernBertModel {
    pub fn load(source: &ModelSource, device: Device) -> Result<Self> {
        let config: ModernBertConfig = JsonConfigLoader::new(source, "config.json").load()?;
        // Weights are stored as bf16 but loaded as f32 for CPU support.
        let vb = WeightsLoader::new(source).load(DType::F32, &device)?;
        // Missing or mis-shaped tensors surface here, not in the loaders.
        let model = ModernBertForSequenceClassification::load(vb, &config).map_err(|e| {
            ClassifierError::Load(format!("{source} is not a usable ModernBERT checkpoint: {e}"))
        })?;

        tracing::info!(
            %source,
            layers = config.num_hidden_layers,
            labels = config.num_labels(),
            device = ?device.location(),
            "loaded ModernBERT NLI model"
        );

        Ok(Self {
            model,
            labels: config.label2id,
            max_position_embeddings: config.max_position_embeddings,
            device,
        })
    }
}

impl EntailmentModel for NliModernBertModel {
    fn forward(&self, batch: &TokenBatch) -> Result<LogitBatch> {
        let (input_ids, attention_mask) = batch.to_tensors(&self.device)?;
        let logits = self
            .model
            .forward(&input_ids, &attention_mask)
            .map_err(|e| ClassifierError::Inference(format!("forward pass failed: {e}")))?;
        LogitBatch::new(logits)
    }

    fn label_id(&self, label: &str) -> Option<usize> {
        self.labels.get(label)
    }

    fn max_sequence_length(&self) -> Option<usize> {
        Some(self.max_position_embeddings)
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_nn::VarMap;

    const TINY_CONFIG: &str = r#"{
        "architectures": ["ModernBertForSequenceClassification"],
        "vocab_size": 32,
        "hidden_size": 8,
        "num_hidden_layers": 3,
        "num_attention_heads": 2,
        "intermediate_size": 12,
        "max_position_embeddings": 64,
        "layer_norm_eps": 1e-5,
        "global_attn_every_n_layers": 3,
        "global_rope_theta": 160000.0,
        "local_attention": 4,
        "local_rope_theta": 10000.0,
        "classifier_pooling": "mean",
        "classifier_bias": false,
        "id2label": {"0": "entailment", "1": "not_entailment"},
        "label2id": {"entailment": 0, "not_entailment": 1}
    }"#;

    #[test]
    fn parses_zeroshot_checkpoint_config() {
        let config: ModernBertConfig = serde_json::from_str(TINY_CONFIG).unwrap();
        assert_eq!(config.classifier_pooling, ClassifierPooling::Mean);
        assert_eq!(config.num_labels(), 2);
        assert_eq!(config.head_dim(), 4);
        assert_eq!(config.label2id.get("entailment"), Some(0));
    }

    #[test]
    fn randomly_initialised_model_emits_one_row_per_pair() {
        let config: ModernBertConfig = serde_json::from_str(TINY_CONFIG).unwrap();
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let model = ModernBertForSequenceClassification::load(vb, &config).unwrap();

        let batch = TokenBatch::new(
            vec![vec![1, 5, 6, 2, 7, 2], vec![1, 5, 2, 8, 2, 0]],
            vec![vec![1, 1, 1, 1, 1, 1], vec![1, 1, 1, 1, 1, 0]],
        )
        .unwrap();
        let (ids, mask) = batch.to_tensors(&Device::Cpu).unwrap();
        let logits = model.forward(&ids, &mask).unwrap();

        assert_eq!(logits.dims(), &[2, 2]);
        let values = logits.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert!(values.iter().all(|v| v.is_finite()));
    }
}
