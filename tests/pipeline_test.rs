//! End-to-end pipeline tests with an in-process classifier.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use finsent::{
    Classifier, ClassifierHandle, Dataset, ModelLabelTable, ModelSource, RawPrediction, Result,
    Sentiment, SentimentPipeline,
};

// ============================================================================
// Mock classifier
// ============================================================================

/// Keyword classifier speaking FinBERT's label strings and id order.
struct KeywordClassifier {
    source: ModelSource,
    labels: ModelLabelTable,
    calls: AtomicUsize,
    seen: std::sync::Mutex<Vec<String>>,
}

impl KeywordClassifier {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            source: ModelSource::huggingface("ProsusAI/finbert"),
            labels: ModelLabelTable::new([(0, "Positive"), (1, "Negative"), (2, "Neutral")]),
            calls: AtomicUsize::new(0),
            seen: std::sync::Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    fn name(&self) -> &str {
        "keyword"
    }

    fn source(&self) -> &ModelSource {
        &self.source
    }

    fn labels(&self) -> &ModelLabelTable {
        &self.labels
    }

    async fn predict(&self, texts: &[&str]) -> Result<Vec<RawPrediction>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .extend(texts.iter().map(|t| t.to_string()));
        Ok(texts
            .iter()
            .map(|t| {
                let label = if t.contains("beat") || t.contains("soar") {
                    "Positive"
                } else if t.contains("miss") || t.contains("crash") {
                    "Negative"
                } else {
                    "Neutral"
                };
                RawPrediction::new(label, 0.8)
            })
            .collect())
    }
}

const TSV: &str = "\
id\ttexts\tlabel
1\t$AAPL earnings beat estimates https://t.co/a\t1
2\t@jim shares soar 12% premarket\t1
3\tRevenue miss sends $XYZ lower\t0
4\tMarkets crash &amp; burn\t0
5\tFed meeting scheduled for Tuesday\t2
6\t$SPY flat at 450.25\t2
7\tAnalysts expect a beat next quarter\t2
8\tGuidance miss but stock holds\t1
";

fn dataset() -> Dataset {
    Dataset::from_tsv_reader(TSV.as_bytes()).unwrap()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn classifier_sees_normalized_text_in_batches() {
    let classifier = KeywordClassifier::new();
    let handle: ClassifierHandle = classifier.clone();
    let pipeline = SentimentPipeline::new(handle).unwrap().with_batch_size(3);

    let dataset = dataset();
    let texts: Vec<&str> = dataset.iter().map(|p| p.text.as_str()).collect();
    let predictions = pipeline.classify(&texts).await.unwrap();

    assert_eq!(predictions.len(), 8);
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 3);

    let seen = classifier.seen.lock().unwrap();
    assert_eq!(seen[0], "$cashtag earnings beat estimates #link");
    assert_eq!(seen[1], "@mention shares soar #number premarket");
    assert_eq!(seen[3], "Markets crash burn");
    assert_eq!(seen[5], "$cashtag flat at #number");
}

#[tokio::test]
async fn evaluate_scores_against_dataset_labels() {
    let pipeline = SentimentPipeline::new(KeywordClassifier::new()).unwrap();
    let evaluation = pipeline.evaluate(&dataset()).await.unwrap();

    // Posts 7 (neutral, predicted positive) and 8 (positive, predicted negative) are wrong.
    let report = &evaluation.report;
    assert_eq!(report.confusion.total(), 8);
    assert!((report.accuracy - 0.75).abs() < 1e-9);

    let positive = report.class(Sentiment::Positive);
    assert_eq!(positive.support, 3);
    assert!((positive.precision - 2.0 / 3.0).abs() < 1e-9);
    assert!((positive.recall - 2.0 / 3.0).abs() < 1e-9);

    let negative = report.class(Sentiment::Negative);
    assert_eq!(negative.support, 2);
    assert!((negative.precision - 2.0 / 3.0).abs() < 1e-9);
    assert!((negative.recall - 1.0).abs() < 1e-9);

    let neutral = report.class(Sentiment::Neutral);
    assert!((neutral.precision - 1.0).abs() < 1e-9);
    assert!((neutral.recall - 2.0 / 3.0).abs() < 1e-9);

    assert_eq!(evaluation.predictions[6].label, Sentiment::Positive);
    assert_eq!(evaluation.predictions[7].label, Sentiment::Negative);
}

#[tokio::test]
async fn held_out_split_is_evaluated_and_exported() {
    let pipeline = SentimentPipeline::new(KeywordClassifier::new()).unwrap();
    let dataset = dataset();
    let split = dataset.train_test_split(0.34, 42).unwrap();
    assert_eq!(split.train.len() + split.test.len(), dataset.len());

    let evaluation = pipeline.evaluate(&split.test).await.unwrap();
    assert_eq!(evaluation.predictions.len(), split.test.len());
    assert_eq!(evaluation.report.confusion.total(), split.test.len());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.csv");
    split.test.write_csv_path(&path).unwrap();
    let csv = std::fs::read_to_string(&path).unwrap();
    assert!(csv.starts_with("texts,label\n"));
    assert_eq!(csv.lines().count(), split.test.len() + 1);
}

#[tokio::test]
async fn training_set_uses_model_ids() {
    let pipeline = SentimentPipeline::new(KeywordClassifier::new()).unwrap();
    let split = dataset().train_test_split(0.34, 1).unwrap();
    let data = pipeline.training_set(&split).unwrap();

    assert_eq!(data.train.len(), split.train.len());
    for (example, post) in data.train.iter().zip(split.train.iter()) {
        let expected = match post.label.unwrap() {
            Sentiment::Positive => 0,
            Sentiment::Negative => 1,
            Sentiment::Neutral => 2,
        };
        assert_eq!(example.label, expected);
        assert_eq!(example.text, finsent::normalize(&post.text));
    }
}

#[tokio::test]
async fn report_renders_all_rows() {
    let pipeline = SentimentPipeline::new(KeywordClassifier::new()).unwrap();
    let evaluation = pipeline.evaluate(&dataset()).await.unwrap();
    let text = evaluation.report.to_string();
    for row in ["negative", "positive", "neutral", "accuracy", "macro avg", "weighted avg"] {
        assert!(text.contains(row), "missing {row} row in:\n{text}");
    }
}

#[tokio::test]
async fn empty_posts_skip_the_model() {
    let classifier = KeywordClassifier::new();
    let handle: ClassifierHandle = classifier.clone();
    let pipeline = SentimentPipeline::new(handle).unwrap().with_batch_size(2);

    let predictions = pipeline
        .classify(&["🚀🚀🚀", "$TSLA soars", "%%% ***", "revenue miss"])
        .await
        .unwrap();

    assert_eq!(predictions.len(), 4);
    assert_eq!(predictions[0].label, Sentiment::Neutral);
    assert_eq!(predictions[0].score, 0.0);
    assert_eq!(predictions[1].label, Sentiment::Positive);
    assert_eq!(predictions[2].label, Sentiment::Neutral);
    assert_eq!(predictions[2].score, 0.0);
    assert_eq!(predictions[3].label, Sentiment::Negative);

    assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    let seen = classifier.seen.lock().unwrap();
    assert_eq!(*seen, ["$cashtag soars", "revenue miss"]);
}

#[tokio::test]
async fn all_empty_posts_make_no_model_call() {
    let classifier = KeywordClassifier::new();
    let handle: ClassifierHandle = classifier.clone();
    let pipeline = SentimentPipeline::new(handle).unwrap();

    let predictions = pipeline.classify(&["", "   ", "&amp;"]).await.unwrap();
    assert_eq!(predictions.len(), 3);
    assert!(predictions.iter().all(|p| p.label == Sentiment::Neutral));
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
}
