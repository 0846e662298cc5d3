//! Resolving a model identifier to files on disk and loading them.
//!
//! A model is identified either by a path to a local directory or by a
//! Hugging Face hub repo id. Both are expected to contain:
//! - `config.json` with the architecture and the `label2id` mapping
//! - `tokenizer.json`
//! - `model.safetensors` (or `pytorch_model.bin`)
//!
//! ## Main Types
//!
//! - [`ModelSource`] - where the model files live
//! - [`HfLoader`] - fetches one file from a source, retrying hub lock contention
//! - [`TokenizerLoader`] - loads a `tokenizers::Tokenizer`
//! - [`JsonConfigLoader`] - deserializes `config.json` into any serde type
//! - [`WeightsLoader`] - memory-maps the weights into a candle `VarBuilder`

use crate::core::{ClassifierError, ModelOptions, Result};
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use hf_hub::{api::sync::ApiBuilder, Repo, RepoType};
use serde::de::DeserializeOwned;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokenizers::Tokenizer;

const MAX_RETRIES: u32 = 3;

/// Where a model's files are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    Local(PathBuf),
    Hub {
        repo: String,
        revision: Option<String>,
    },
}

impl ModelSource {
    /// An existing directory wins over a hub repo id of the same name.
    pub fn resolve(model: &str, revision: Option<&str>) -> Self {
        let path = Path::new(model);
        if path.is_dir() {
            Self::Local(path.to_path_buf())
        } else {
            Self::Hub {
                repo: model.to_string(),
                revision: revision.map(str::to_string),
            }
        }
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Hub {
                repo,
                revision: Some(revision),
            } => write!(f, "{repo}@{revision}"),
            Self::Hub {
                repo,
                revision: None,
            } => write!(f, "{repo}"),
        }
    }
}

impl ModelOptions for ModelSource {
    fn cache_key(&self) -> String {
        self.to_string()
    }
}

#[derive(Debug, Clone)]
pub struct HfLoader {
    pub source: ModelSource,
    pub filename: String,
}

impl HfLoader {
    pub fn new(source: &ModelSource, filename: &str) -> Self {
        Self {
            source: source.clone(),
            filename: filename.into(),
        }
    }

    pub fn load(&self) -> Result<PathBuf> {
        match &self.source {
            ModelSource::Local(dir) => {
                let path = dir.join(&self.filename);
                if path.is_file() {
                    Ok(path)
                } else {
                    Err(ClassifierError::Load(format!(
                        "{} not found in {}",
                        self.filename,
                        dir.display()
                    )))
                }
            }
            ModelSource::Hub { repo, revision } => {
                self.load_from_hub(repo, revision.as_deref())
            }
        }
    }

    fn load_from_hub(&self, repo: &str, revision: Option<&str>) -> Result<PathBuf> {
        let api = ApiBuilder::new().with_progress(false).build()?;
        let repo = match revision {
            Some(revision) => {
                Repo::with_revision(repo.to_string(), RepoType::Model, revision.to_string())
            }
            None => Repo::new(repo.to_string(), RepoType::Model),
        };
        let api = api.repo(repo);

        let mut attempt = 0;
        loop {
            match api.get(&self.filename) {
                Ok(path) => return Ok(path),
                Err(e)
                    if e.to_string().contains("Lock acquisition failed")
                        && attempt < MAX_RETRIES - 1 =>
                {
                    // Another process is downloading the same file.
                    let wait_time = Duration::from_millis(100 * (1 << attempt));
                    tracing::debug!(file = %self.filename, ?wait_time, "hub cache locked, retrying");
                    std::thread::sleep(wait_time);
                    attempt += 1;
                }
                Err(e) => {
                    return Err(ClassifierError::Load(format!(
                        "could not fetch {} from {}: {e}",
                        self.filename, self.source
                    )))
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenizerLoader {
    pub tokenizer_file_loader: HfLoader,
}

impl TokenizerLoader {
    pub fn new(source: &ModelSource) -> Self {
        Self {
            tokenizer_file_loader: HfLoader::new(source, "tokenizer.json"),
        }
    }

    pub fn load(&self) -> Result<Tokenizer> {
        let tokenizer_file_path = self.tokenizer_file_loader.load()?;

        Tokenizer::from_file(&tokenizer_file_path).map_err(|e| {
            ClassifierError::Load(format!(
                "failed to parse tokenizer {}: {e}",
                tokenizer_file_path.display()
            ))
        })
    }
}

/// Reads `config.json` (or another JSON file) into whatever view of it the
/// caller needs. Unknown fields are ignored by serde.
#[derive(Debug, Clone)]
pub struct JsonConfigLoader {
    pub config_file_loader: HfLoader,
}

impl JsonConfigLoader {
    pub fn new(source: &ModelSource, filename: &str) -> Self {
        Self {
            config_file_loader: HfLoader::new(source, filename),
        }
    }

    pub fn load<T: DeserializeOwned>(&self) -> Result<T> {
        let path = self.config_file_loader.load()?;
        let content = std::fs::read_to_string(&path).map_err(|e| {
            ClassifierError::Load(format!("failed to read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            ClassifierError::Load(format!("failed to parse {}: {e}", path.display()))
        })
    }
}

#[derive(Debug, Clone)]
pub struct WeightsLoader {
    pub source: ModelSource,
}

impl WeightsLoader {
    pub fn new(source: &ModelSource) -> Self {
        Self {
            source: source.clone(),
        }
    }

    /// Prefer `model.safetensors`, fall back to the PyTorch pickle format.
    pub fn load(&self, dtype: DType, device: &Device) -> Result<VarBuilder<'static>> {
        match HfLoader::new(&self.source, "model.safetensors").load() {
            Ok(path) => {
                tracing::debug!(path = %path.display(), "memory-mapping safetensors weights");
                // SAFETY: the weight file is treated as read-only for the
                // lifetime of the process.
                unsafe { VarBuilder::from_mmaped_safetensors(&[&path], dtype, device) }.map_err(|e| {
                    ClassifierError::Load(format!("failed to map {}: {e}", path.display()))
                })
            }
            Err(safetensors_err) => {
                let path = HfLoader::new(&self.source, "pytorch_model.bin")
                    .load()
                    .map_err(|e| {
                        ClassifierError::Load(format!(
                            "no weights found for {}. Expected `model.safetensors` ({safetensors_err}) or `pytorch_model.bin` ({e})",
                            self.source
                        ))
                    })?;
                tracing::debug!(path = %path.display(), "loading pytorch weights");
                VarBuilder::from_pth(&path, dtype, device).map_err(|e| {
                    ClassifierError::Load(format!("failed to read {}: {e}", path.display()))
                })
            }
        }
    }
}
