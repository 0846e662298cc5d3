//! Classify a text from the command line.
//!
//! ```text
//! cargo run --example zero_shot -- "I love playing football on weekends" sports politics cooking
//! echo '{"text": "Goal!", "classes": ["sports", "politics"]}' | cargo run --example zero_shot -- --json
//! ```
//!
//! Logs go to stderr and respect `RUST_LOG`; results are printed to stdout as
//! JSON `[label, score]` pairs.

use clap::Parser;
use std::io::Read;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use zero_shot_nli::pipelines::utils::DeviceSelectable;
use zero_shot_nli::{ModernBertSize, PredictionRequest, ZeroShotClassifierBuilder};

/// Rank candidate labels for a text with a zero-shot NLI model.
#[derive(Parser, Debug)]
#[command(name = "zero_shot")]
struct Args {
    /// Text to classify.
    #[arg(conflicts_with = "json", requires = "classes")]
    text: Option<String>,

    /// Candidate labels.
    classes: Vec<String>,

    /// Read a `{"text": ..., "classes": [...]}` request, inline or from stdin.
    #[arg(long, value_name = "BODY")]
    json: Option<Option<String>>,

    /// Hub repo id or local model directory.
    #[arg(long, env = "ZERO_SHOT_MODEL", default_value = ModernBertSize::Base.repo_id())]
    model: String,

    /// Hypothesis template with one `{}` for the label.
    #[arg(long)]
    template: Option<String>,

    /// Run on CPU even when CUDA is available.
    #[arg(long)]
    cpu: bool,
}

impl Args {
    fn request(&self) -> anyhow::Result<PredictionRequest> {
        match (&self.json, &self.text) {
            (Some(Some(body)), _) => Ok(serde_json::from_str(body)?),
            (Some(None), _) => {
                let mut body = String::new();
                std::io::stdin().read_to_string(&mut body)?;
                Ok(serde_json::from_str(&body)?)
            }
            (None, Some(text)) => Ok(PredictionRequest::new(text.as_str(), &self.classes)),
            (None, None) => Ok(PredictionRequest::new(
                "I love playing football on weekends",
                ["sports", "politics", "cooking"],
            )),
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();
    let request = args.request()?;

    let mut builder = ZeroShotClassifierBuilder::new(args.model.as_str());
    if let Some(template) = &args.template {
        builder = builder.hypothesis_template(template.as_str());
    }
    if args.cpu {
        builder = builder.cpu();
    }
    let classifier = builder.build()?;

    let ranked = classifier.predict_request(&request)?;
    println!("{}", serde_json::to_string_pretty(&ranked)?);
    Ok(())
}
