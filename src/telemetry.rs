//! Telemetry metric name constants.
//!
//! Consumers install their own `metrics` recorder; without one, all metric
//! calls are no-ops.
//!
//! All metrics are prefixed with `finsent_`. Counters end in `_total`,
//! histograms carry their unit (`_seconds`).
//!
//! # Common labels
//!
//! - `classifier` — backend name (e.g. "huggingface", "onnx")
//! - `stage` — model boundary stage ("load", "tokenize", "infer", "train")
//! - `sentiment` — canonical predicted class

/// Posts that went through classification.
///
/// Labels: `classifier`, `sentiment`.
pub const POSTS_CLASSIFIED_TOTAL: &str = "finsent_posts_classified_total";

/// Duration of one `predict` batch call in seconds.
///
/// Labels: `classifier`.
pub const PREDICT_DURATION_SECONDS: &str = "finsent_predict_duration_seconds";

/// Model outputs that did not map to a canonical sentiment.
///
/// Labels: `classifier`.
pub const UNRECOGNIZED_LABELS_TOTAL: &str = "finsent_unrecognized_labels_total";

/// Failures surfaced from the model boundary.
///
/// Labels: `classifier`, `stage`.
pub const EXTERNAL_ERRORS_TOTAL: &str = "finsent_external_errors_total";

/// Retries of transient failures.
///
/// Labels: `classifier`.
pub const RETRIES_TOTAL: &str = "finsent_retries_total";
