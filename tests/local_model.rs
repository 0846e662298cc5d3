// Builds classifiers from model directories on disk: a tiny randomly
// initialised ModernBERT checkpoint next to the fixture tokenizer.

mod common;

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use zero_shot_nli::models::modernbert::{ModernBertConfig, ModernBertForSequenceClassification};
use zero_shot_nli::pipelines::utils::DeviceSelectable;
use zero_shot_nli::{ClassifierError, ZeroShotClassifier, ZeroShotClassifierBuilder};

const TINY_CONFIG: &str = r#"{
    "architectures": ["ModernBertForSequenceClassification"],
    "vocab_size": 40,
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

/// Model directory with config and tokenizer but no weights yet.
fn model_dir_without_weights() -> anyhow::Result<TempDir> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("config.json"), TINY_CONFIG)?;
    common::write_fixture_tokenizer(dir.path());
    Ok(dir)
}

fn write_random_weights(dir: &Path) -> anyhow::Result<()> {
    let config: ModernBertConfig = serde_json::from_str(TINY_CONFIG)?;
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    ModernBertForSequenceClassification::load(vb, &config)?;
    varmap.save(dir.join("model.safetensors"))?;
    Ok(())
}

fn local_model_dir() -> anyhow::Result<TempDir> {
    let dir = model_dir_without_weights()?;
    write_random_weights(dir.path())?;
    Ok(dir)
}

fn path_str(dir: &TempDir) -> &str {
    dir.path().to_str().expect("temp dir path is UTF-8")
}

#[test]
fn classifier_loads_from_a_local_directory() -> anyhow::Result<()> {
    let dir = local_model_dir()?;

    let classifier = ZeroShotClassifier::new(path_str(&dir))?;
    let result = classifier.predict(
        "I love playing football on weekends",
        &["sports", "politics", "cooking"],
    )?;

    assert_eq!(result.len(), 3);
    assert!((result.total() - 1.0).abs() < 1e-3);
    assert!(result.windows(2).all(|w| w[0].score >= w[1].score));
    assert_eq!(classifier.max_length(), 64);
    Ok(())
}

#[test]
fn second_build_reuses_the_loaded_model() -> anyhow::Result<()> {
    let dir = local_model_dir()?;

    let first = ZeroShotClassifier::new(path_str(&dir))?;
    let second = ZeroShotClassifierBuilder::new(path_str(&dir))
        .hypothesis_template("This example is about {}.")
        .build()?;

    assert!(Arc::ptr_eq(first.model(), second.model()));
    assert_eq!(second.hypothesis_template().format("sports"), "This example is about sports.");
    Ok(())
}

#[test]
fn corrupt_weights_fail_with_load_error() -> anyhow::Result<()> {
    let dir = model_dir_without_weights()?;
    std::fs::write(dir.path().join("model.safetensors"), b"\xff\xff\xff\xff junk")?;

    let err = ZeroShotClassifierBuilder::new(path_str(&dir))
        .cpu()
        .build()
        .err()
        .expect("corrupt weights must not load");

    assert!(matches!(err, ClassifierError::Load(_)), "{err}");
    Ok(())
}

#[test]
fn checkpoint_missing_tensors_fails_with_load_error() -> anyhow::Result<()> {
    let dir = model_dir_without_weights()?;
    let tensors = HashMap::from([(
        "classifier.weight".to_string(),
        Tensor::zeros((2, 8), DType::F32, &Device::Cpu)?,
    )]);
    candle_core::safetensors::save(&tensors, dir.path().join("model.safetensors"))?;

    let err = ZeroShotClassifierBuilder::new(path_str(&dir))
        .cpu()
        .build()
        .err()
        .expect("incomplete checkpoint must not load");

    assert!(matches!(err, ClassifierError::Load(_)), "{err}");
    Ok(())
}

#[test]
fn missing_weights_fail_with_load_error() -> anyhow::Result<()> {
    let dir = model_dir_without_weights()?;

    let err = ZeroShotClassifier::new(path_str(&dir))
        .err()
        .expect("a directory without weights must not load");

    assert!(matches!(err, ClassifierError::Load(_)), "{err}");
    Ok(())
}
