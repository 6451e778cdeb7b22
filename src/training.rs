//! Fine-tuning inputs and outputs.
//!
//! Training data is normalized and relabeled into the base model's own id
//! scheme before it crosses the trainer boundary. The trainer leaves a
//! checkpoint directory behind whose `config.json` is re-validated on open.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::{Dataset, DatasetSplit};
use crate::error::{FinsentError, ModelStage, Result};
use crate::labels::{LabelAligner, ModelLabelTable};
use crate::model::ModelSource;
use crate::normalize::Normalizer;

/// Hyperparameters handed to the external trainer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingParams {
    #[serde(default = "default_epochs")]
    pub epochs: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            learning_rate: default_learning_rate(),
        }
    }
}

fn default_epochs() -> u32 {
    3
}

fn default_batch_size() -> usize {
    16
}

fn default_learning_rate() -> f64 {
    2e-5
}

/// One normalized text with its label in the model's id scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrainingExample {
    pub text: String,
    pub label: u32,
}

/// Train and eval examples ready for the trainer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingSet {
    pub train: Vec<TrainingExample>,
    pub eval: Vec<TrainingExample>,
}

impl TrainingSet {
    /// Normalize and relabel a split for the model behind `aligner`.
    pub fn from_split(
        split: &DatasetSplit,
        normalizer: &Normalizer,
        aligner: &LabelAligner,
    ) -> Result<Self> {
        Ok(Self {
            train: examples(&split.train, normalizer, aligner)?,
            eval: examples(&split.test, normalizer, aligner)?,
        })
    }

    /// Write examples as TSV with a `text\tlabel` header.
    pub fn write_tsv(examples: &[TrainingExample], path: &Path) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(File::create(path)?);
        writer.write_record(["text", "label"])?;
        for example in examples {
            let label = example.label.to_string();
            writer.write_record([example.text.as_str(), label.as_str()])?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn examples(
    dataset: &Dataset,
    normalizer: &Normalizer,
    aligner: &LabelAligner,
) -> Result<Vec<TrainingExample>> {
    dataset
        .iter()
        .map(|post| {
            let label = post.label.ok_or_else(|| {
                FinsentError::InvalidInput(format!(
                    "cannot train on unlabeled post {:?}",
                    post.text
                ))
            })?;
            Ok(TrainingExample {
                text: normalizer.normalize(&post.text),
                label: aligner.canonical_to_model_id(label),
            })
        })
        .collect()
}

/// A fine-tuned model directory written by the external trainer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    dir: PathBuf,
    labels: ModelLabelTable,
}

impl Checkpoint {
    /// Open a checkpoint directory and validate its label table.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let config_path = dir.join("config.json");
        let json = std::fs::read_to_string(&config_path).map_err(|e| {
            FinsentError::external(
                ModelStage::Train,
                format!("checkpoint has no readable {}: {e}", config_path.display()),
            )
        })?;
        let labels = ModelLabelTable::from_config_json(&json)?;
        LabelAligner::from_model_table(&labels)?;
        Ok(Self { dir, labels })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn labels(&self) -> &ModelLabelTable {
        &self.labels
    }

    /// The checkpoint as a loadable model source.
    pub fn source(&self) -> ModelSource {
        ModelSource::local(&self.dir)
    }
}

/// Write a minimal `config.json` with the given label table (test helper for
/// trainer fakes).
#[doc(hidden)]
pub fn write_label_config(dir: &Path, labels: &ModelLabelTable) -> Result<()> {
    let id2label: serde_json::Map<String, serde_json::Value> = labels
        .iter()
        .map(|(id, label)| (id.to_string(), serde_json::Value::from(label)))
        .collect();
    let mut file = File::create(dir.join("config.json"))?;
    serde_json::to_writer_pretty(&mut file, &serde_json::json!({ "id2label": id2label }))?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Post, Sentiment};

    fn finbert() -> LabelAligner {
        LabelAligner::from_model_table(&ModelLabelTable::new([
            (0, "positive"),
            (1, "negative"),
            (2, "neutral"),
        ]))
        .unwrap()
    }

    #[test]
    fn training_set_is_normalized_and_relabeled() {
        let split = DatasetSplit {
            train: Dataset::new(vec![
                Post::labeled("$TSLA up 5%", Sentiment::Positive),
                Post::labeled("@sec probing", Sentiment::Negative),
            ]),
            test: Dataset::new(vec![Post::labeled("flat", Sentiment::Neutral)]),
        };
        let set = TrainingSet::from_split(&split, &Normalizer::new(), &finbert()).unwrap();
        assert_eq!(
            set.train,
            vec![
                TrainingExample {
                    text: "$cashtag up #number".into(),
                    label: 0
                },
                TrainingExample {
                    text: "@mention probing".into(),
                    label: 1
                },
            ]
        );
        assert_eq!(set.eval[0].label, 2);
    }

    #[test]
    fn unlabeled_posts_cannot_be_trained_on() {
        let split = DatasetSplit {
            train: Dataset::new(vec![Post::new("no label")]),
            test: Dataset::default(),
        };
        assert!(TrainingSet::from_split(&split, &Normalizer::new(), &finbert()).is_err());
    }

    #[test]
    fn writes_tsv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.tsv");
        let examples = vec![TrainingExample {
            text: "hello world".into(),
            label: 2,
        }];
        TrainingSet::write_tsv(&examples, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "text\tlabel\nhello world\t2\n");
    }

    #[test]
    fn checkpoint_round_trips_label_table() {
        let dir = tempfile::tempdir().unwrap();
        let labels = ModelLabelTable::new([(0, "positive"), (1, "negative"), (2, "neutral")]);
        write_label_config(dir.path(), &labels).unwrap();

        let checkpoint = Checkpoint::open(dir.path()).unwrap();
        assert_eq!(checkpoint.labels(), &labels);
        assert_eq!(checkpoint.source(), ModelSource::local(dir.path()));
    }

    #[test]
    fn checkpoint_without_config_is_a_train_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Checkpoint::open(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            FinsentError::ExternalModel {
                stage: ModelStage::Train,
                ..
            }
        ));
    }

    #[test]
    fn checkpoint_with_broken_labels_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let labels = ModelLabelTable::new([(0, "LABEL_0"), (1, "LABEL_1"), (2, "LABEL_2")]);
        write_label_config(dir.path(), &labels).unwrap();
        let err = Checkpoint::open(dir.path()).unwrap_err();
        assert!(matches!(err, FinsentError::UnrecognizedLabel(_)));
    }
}
