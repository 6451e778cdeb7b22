//! Fine-tuning through an external training program.
//!
//! The trainer writes the prepared train/eval sets as TSV next to the output
//! directory, runs the configured program with placeholder-expanded
//! arguments, and opens whatever checkpoint the program left behind.
//!
//! Recognised placeholders: `{model}`, `{train}`, `{eval}`, `{output}`,
//! `{epochs}`, `{batch_size}`, `{learning_rate}`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use super::traits::{Classifier, Trainer};
use crate::error::{FinsentError, ModelStage, Result};
use crate::training::{Checkpoint, TrainingParams, TrainingSet};

/// Lines of stderr kept in the error when the program fails.
const STDERR_TAIL_LINES: usize = 20;

/// `Trainer` that shells out to an external fine-tuning program.
#[derive(Debug, Clone)]
pub struct CommandTrainer {
    program: String,
    args: Vec<String>,
    output_dir: PathBuf,
}

/// Values substituted into the program's arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Placeholders {
    pub model: String,
    pub train: PathBuf,
    pub eval: PathBuf,
    pub output: PathBuf,
    pub params: TrainingParams,
}

impl Placeholders {
    /// Substitute every placeholder occurring in `arg`.
    pub fn expand(&self, arg: &str) -> String {
        arg.replace("{model}", &self.model)
            .replace("{train}", &self.train.display().to_string())
            .replace("{eval}", &self.eval.display().to_string())
            .replace("{output}", &self.output.display().to_string())
            .replace("{epochs}", &self.params.epochs.to_string())
            .replace("{batch_size}", &self.params.batch_size.to_string())
            .replace("{learning_rate}", &self.params.learning_rate.to_string())
    }
}

impl CommandTrainer {
    pub fn new(
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Arguments with placeholders expanded.
    pub fn expanded_args(&self, placeholders: &Placeholders) -> Vec<String> {
        self.args.iter().map(|a| placeholders.expand(a)).collect()
    }

    /// Write the training set where the program will find it.
    fn stage_data(&self, data: &TrainingSet) -> Result<(PathBuf, PathBuf)> {
        std::fs::create_dir_all(&self.output_dir)?;
        let train = self.output_dir.join("train.tsv");
        let eval = self.output_dir.join("eval.tsv");
        TrainingSet::write_tsv(&data.train, &train)?;
        TrainingSet::write_tsv(&data.eval, &eval)?;
        Ok((train, eval))
    }
}

#[async_trait]
impl Trainer for CommandTrainer {
    fn name(&self) -> &str {
        "command"
    }

    #[instrument(skip_all, fields(program = %self.program, train = data.train.len(), eval = data.eval.len()))]
    async fn fit(
        &self,
        base: &dyn Classifier,
        data: &TrainingSet,
        params: &TrainingParams,
    ) -> Result<Checkpoint> {
        let (train, eval) = self.stage_data(data)?;
        let placeholders = Placeholders {
            model: base.source().identifier(),
            train,
            eval,
            output: self.output_dir.clone(),
            params: params.clone(),
        };
        let args = self.expanded_args(&placeholders);

        info!(?args, "starting external training program");
        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .map_err(|e| {
                FinsentError::external(
                    ModelStage::Train,
                    format!("failed to run {}: {e}", self.program),
                )
            })?;

        debug!(stdout = %String::from_utf8_lossy(&output.stdout), "training program output");

        if !output.status.success() {
            return Err(FinsentError::external(
                ModelStage::Train,
                format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    stderr_tail(&output.stderr)
                ),
            ));
        }

        let checkpoint = Checkpoint::open(&self.output_dir)?;
        info!(dir = %checkpoint.dir().display(), "training finished");
        Ok(checkpoint)
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
