//! Alignment between dataset labels, canonical sentiments and model labels.
//!
//! Datasets encode sentiment as `0=negative, 1=positive, 2=neutral`. A
//! pretrained model has its own `id2label` table (FinBERT uses
//! `0=positive, 1=negative, 2=neutral`), so training labels must be remapped
//! before fine-tuning and model output strings mapped back before scoring.
//! The remap is always derived from the loaded model's table.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::{FinsentError, ModelStage, Result};
use crate::types::{Prediction, RawPrediction, Sentiment};

/// A model's own `id2label` table, as found in its `config.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelLabelTable {
    id2label: BTreeMap<u32, String>,
}

#[derive(Deserialize)]
struct ModelConfigLabels {
    #[serde(default)]
    id2label: Option<BTreeMap<String, String>>,
}

impl ModelLabelTable {
    /// Build a table from `(id, label)` pairs.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (u32, S)>,
        S: Into<String>,
    {
        Self {
            id2label: entries
                .into_iter()
                .map(|(id, label)| (id, label.into()))
                .collect(),
        }
    }

    /// Extract the `id2label` table from a model `config.json` document.
    pub fn from_config_json(json: &str) -> Result<Self> {
        let config: ModelConfigLabels = serde_json::from_str(json).map_err(|e| {
            FinsentError::external(ModelStage::Load, format!("invalid model config.json: {e}"))
        })?;
        let raw = config.id2label.ok_or_else(|| {
            FinsentError::UnrecognizedLabel("model config has no id2label table".to_string())
        })?;

        let mut id2label = BTreeMap::new();
        for (id, label) in raw {
            let id: u32 = id.trim().parse().map_err(|_| {
                FinsentError::UnrecognizedLabel(format!("model label id {id:?} is not an integer"))
            })?;
            id2label.insert(id, label);
        }
        Ok(Self { id2label })
    }

    /// Label string for a model id.
    pub fn label(&self, id: u32) -> Option<&str> {
        self.id2label.get(&id).map(String::as_str)
    }

    /// Iterate `(id, label)` in id order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.id2label.iter().map(|(id, label)| (*id, label.as_str()))
    }

    pub fn len(&self) -> usize {
        self.id2label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id2label.is_empty()
    }
}

/// Validated mapping between dataset ids, canonical sentiments and the
/// loaded model's ids and label strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelAligner {
    /// Indexed by `Sentiment::index()`.
    model_ids: [u32; 3],
    /// Indexed by `Sentiment::index()`.
    model_labels: [String; 3],
}

impl LabelAligner {
    /// Build the aligner from a model label table.
    ///
    /// The table must cover exactly ids `{0, 1, 2}` and name each canonical
    /// sentiment exactly once.
    pub fn from_model_table(table: &ModelLabelTable) -> Result<Self> {
        let ids: Vec<u32> = table.iter().map(|(id, _)| id).collect();
        if ids != [0, 1, 2] {
            return Err(FinsentError::UnrecognizedLabel(format!(
                "model label ids must be exactly 0, 1, 2; got {ids:?}"
            )));
        }

        let mut model_ids: [Option<u32>; 3] = [None; 3];
        let mut model_labels: [String; 3] = Default::default();
        for (id, label) in table.iter() {
            let sentiment = Sentiment::from_model_label(label)?;
            let slot = sentiment.index();
            if model_ids[slot].is_some() {
                return Err(FinsentError::UnrecognizedLabel(format!(
                    "model label table names {sentiment} more than once"
                )));
            }
            model_ids[slot] = Some(id);
            model_labels[slot] = label.to_string();
        }

        let mut resolved = [0u32; 3];
        for (slot, id) in model_ids.iter().enumerate() {
            resolved[slot] = id.ok_or_else(|| {
                FinsentError::UnrecognizedLabel(format!(
                    "model label table has no {}",
                    Sentiment::ALL[slot]
                ))
            })?;
        }

        Ok(Self {
            model_ids: resolved,
            model_labels,
        })
    }

    /// Dataset integer to canonical sentiment.
    pub fn dataset_to_canonical(&self, label: i64) -> Result<Sentiment> {
        Sentiment::from_dataset_label(label)
    }

    /// Model label string to canonical sentiment.
    ///
    /// Accepts the exact strings of the loaded table, then falls back to the
    /// case-insensitive canonical names. Anything else is an error.
    pub fn model_label_to_canonical(&self, label: &str) -> Result<Sentiment> {
        if let Some(slot) = self.model_labels.iter().position(|l| l == label) {
            return Ok(Sentiment::ALL[slot]);
        }
        Sentiment::from_model_label(label)
    }

    /// Canonical sentiment to the string the loaded model emits.
    pub fn canonical_to_model_label(&self, sentiment: Sentiment) -> &str {
        &self.model_labels[sentiment.index()]
    }

    /// Canonical sentiment to the loaded model's integer id.
    pub fn canonical_to_model_id(&self, sentiment: Sentiment) -> u32 {
        self.model_ids[sentiment.index()]
    }

    /// Loaded model's integer id to canonical sentiment.
    pub fn model_id_to_canonical(&self, id: u32) -> Result<Sentiment> {
        self.model_ids
            .iter()
            .position(|&m| m == id)
            .map(|slot| Sentiment::ALL[slot])
            .ok_or_else(|| FinsentError::UnrecognizedLabel(format!("model label id {id}")))
    }

    /// Dataset integer to the loaded model's integer id (used before fine-tuning).
    pub fn dataset_to_model_id(&self, label: i64) -> Result<u32> {
        Ok(self.canonical_to_model_id(Sentiment::from_dataset_label(label)?))
    }

    /// The full dataset→model remap, indexed by dataset label.
    pub fn dataset_to_model_map(&self) -> [u32; 3] {
        self.model_ids
    }

    /// Align a raw model output.
    pub fn align(&self, raw: &RawPrediction) -> Result<Prediction> {
        Ok(Prediction {
            label: self.model_label_to_canonical(&raw.label)?,
            score: raw.score,
        })
    }
}
