//! finsent — financial tweet sentiment CLI
//!
//! Normalizes posts, classifies them with a pretrained financial sentiment
//! model, scores the model against a labeled dataset and drives fine-tuning.

use std::io::{self, BufRead, IsTerminal};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use finsent::config::{Backend, Config, Secrets};
use finsent::{
    CommandTrainer, Dataset, DatasetSplit, Evaluation, ModelSource, SentimentPipeline, normalize,
    pipeline,
};
use tracing::info;

/// Financial tweet sentiment
#[derive(Parser)]
#[command(name = "finsent")]
#[command(version = finsent::PKG_VERSION)]
#[command(about = "Normalize, classify and evaluate financial social-media posts")]
struct Args {
    /// Config file (default: ~/.finsent/config.toml, then /etc/finsent/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Model to use: hub repository ID or local checkpoint directory
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Classifier backend
    #[arg(short, long, global = true)]
    backend: Option<BackendArg>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Huggingface,
    Onnx,
}

impl From<BackendArg> for Backend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Huggingface => Backend::HuggingFace,
            BackendArg::Onnx => Backend::Onnx,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Normalize text (one post per line when read from stdin)
    Normalize {
        /// Text to normalize (or omit to read from stdin)
        text: Option<String>,
    },

    /// Classify text (one post per line when read from stdin)
    Classify {
        /// Text to classify (or omit to read from stdin)
        text: Option<String>,
        /// Print predictions as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Show the model's label table and the derived dataset remap
    Labels,

    /// Evaluate the model on the held-out split of a labeled TSV file
    Evaluate {
        /// Tab-separated file with `texts` and `label` columns
        dataset: PathBuf,
        /// Evaluate on every post instead of the held-out split
        #[arg(long)]
        all: bool,
        #[command(flatten)]
        split: SplitArgs,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fine-tune the model with the configured training program
    Finetune {
        /// Tab-separated file with `texts` and `label` columns
        dataset: PathBuf,
        #[command(flatten)]
        split: SplitArgs,
        /// Evaluate the base model on the held-out split first
        #[arg(long)]
        baseline: bool,
        /// Checkpoint directory (overrides config)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Load the checkpoint locally and evaluate it on the held-out split
        #[cfg(feature = "local-inference")]
        #[arg(long)]
        evaluate: bool,
    },
}

#[derive(clap::Args)]
struct SplitArgs {
    /// Share of each class held out for testing (overrides config)
    #[arg(long)]
    test_fraction: Option<f64>,
    /// Shuffle seed (overrides config)
    #[arg(long)]
    seed: Option<u64>,
    /// Write the held-out split as CSV (overrides config)
    #[arg(long)]
    export_test: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    tracing::debug!(version = %finsent::version_string(), "finsent starting");
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(model) = &args.model {
        match ModelSource::parse(model) {
            ModelSource::Local { path } => config.model.path = Some(path),
            ModelSource::HuggingFace { repo_id } => {
                config.model.id = repo_id;
                config.model.path = None;
            }
        }
    }
    if let Some(backend) = args.backend {
        config.model.backend = backend.into();
    }

    match args.command {
        Command::Normalize { text } => {
            for line in resolve_lines(text, "normalize")? {
                println!("{}", normalize(&line));
            }
        }

        Command::Classify { text, json } => {
            let lines = resolve_lines(text, "classify")?;
            let pipeline = load_pipeline(&config).await?;
            let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
            let predictions = pipeline.classify(&refs).await?;
            for (text, prediction) in lines.iter().zip(&predictions) {
                if json {
                    println!(
                        "{}",
                        serde_json::json!({
                            "text": text,
                            "label": prediction.label,
                            "score": prediction.score,
                        })
                    );
                } else {
                    println!("{}\t{:.4}\t{text}", prediction.label, prediction.score);
                }
            }
        }

        Command::Labels => {
            let pipeline = load_pipeline(&config).await?;
            let classifier = pipeline.classifier();
            println!("model: {}", classifier.source());
            println!("backend: {}", classifier.name());
            println!("\nmodel id  label");
            for (id, label) in classifier.labels().iter() {
                println!("{id:>8}  {label}");
            }
            println!("\ndataset label  sentiment  model id");
            for (dataset, model_id) in pipeline.aligner().dataset_to_model_map().iter().enumerate() {
                let sentiment = pipeline.aligner().dataset_to_canonical(dataset as i64)?;
                println!("{dataset:>13}  {:<9}  {model_id}", sentiment.as_str());
            }
        }

        Command::Evaluate {
            dataset,
            all,
            split,
            json,
        } => {
            let dataset = Dataset::from_tsv_path(&dataset)?;
            let pipeline = load_pipeline(&config).await?;
            let evaluation = if all {
                pipeline.evaluate(&dataset).await?
            } else {
                let split = split_dataset(&config, &dataset, &split)?;
                pipeline.evaluate(&split.test).await?
            };
            print_evaluation(&evaluation, json)?;
        }

        Command::Finetune {
            dataset,
            split,
            baseline,
            output,
            #[cfg(feature = "local-inference")]
            evaluate,
        } => {
            let program = config.training.program.clone().ok_or(
                "no training program configured (set [training] program in config.toml)",
            )?;
            let output_dir = output.unwrap_or_else(|| config.training.output_dir.clone());
            let trainer = CommandTrainer::new(program, config.training.args.clone(), &output_dir);

            let dataset = Dataset::from_tsv_path(&dataset)?;
            let split = split_dataset(&config, &dataset, &split)?;
            let pipeline = load_pipeline(&config).await?;

            if baseline {
                println!("baseline ({}):", pipeline.classifier().source());
                print_evaluation(&pipeline.evaluate(&split.test).await?, false)?;
            }

            let checkpoint = pipeline
                .fine_tune(&trainer, &split, &config.training.params)
                .await?;
            println!("checkpoint: {}", checkpoint.dir().display());

            #[cfg(feature = "local-inference")]
            {
                if evaluate {
                    let device = config.model.device.parse()?;
                    let handle = pipeline::load_checkpoint(&checkpoint, device)?;
                    let tuned = SentimentPipeline::new(handle)?
                        .with_batch_size(config.model.batch_size);
                    println!("fine-tuned ({}):", checkpoint.source());
                    print_evaluation(&tuned.evaluate(&split.test).await?, false)?;
                }
            }
        }
    }

    Ok(())
}

async fn load_pipeline(config: &Config) -> Result<SentimentPipeline, Box<dyn std::error::Error>> {
    let secrets = Secrets::load()?;
    let backend = config.backend(&secrets)?;
    info!(source = %backend.source, backend = ?backend.backend, "loading classifier");
    let handle = pipeline::load_classifier(&backend).await?;
    Ok(SentimentPipeline::new(handle)?.with_batch_size(config.model.batch_size))
}

fn split_dataset(
    config: &Config,
    dataset: &Dataset,
    args: &SplitArgs,
) -> Result<DatasetSplit, Box<dyn std::error::Error>> {
    let fraction = args.test_fraction.unwrap_or(config.data.test_fraction);
    let seed = args.seed.unwrap_or(config.data.seed);
    let split = dataset.train_test_split(fraction, seed)?;

    let export = args.export_test.as_deref().or(config.data.export_path.as_deref());
    if let Some(path) = export {
        export_test(&split, path)?;
    }
    Ok(split)
}

fn export_test(split: &DatasetSplit, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    split.test.write_csv_path(path)?;
    eprintln!("wrote {} held-out posts to {}", split.test.len(), path.display());
    Ok(())
}

fn print_evaluation(evaluation: &Evaluation, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(&evaluation.report)?);
    } else {
        println!("{}", evaluation.report);
    }
    Ok(())
}

/// Input lines from an optional CLI argument or stdin.
///
/// An argument wins; otherwise every non-empty stdin line is one post.
fn resolve_lines(arg: Option<String>, command: &str) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    if let Some(text) = arg {
        return Ok(vec![text]);
    }
    if io::stdin().is_terminal() {
        return Err(format!("{command}: no input provided (pass text as argument or via stdin)").into());
    }
    let mut lines = Vec::new();
    for line in io::stdin().lock().lines() {
        let line = line?;
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }
    Ok(lines)
}
