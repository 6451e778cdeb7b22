//! Labeled post collections: TSV loading, train/test split, CSV export.
//!
//! Input files are tab separated with a header row naming at least the
//! `texts` and `label` columns; other columns are ignored.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::error::{FinsentError, Result};
use crate::types::{Post, Sentiment};

/// Column holding the raw post text.
pub const TEXT_COLUMN: &str = "texts";
/// Column holding the dataset label (0, 1 or 2).
pub const LABEL_COLUMN: &str = "label";

/// An ordered collection of posts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    posts: Vec<Post>,
}

/// Result of [`Dataset::train_test_split`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSplit {
    pub train: Dataset,
    pub test: Dataset,
}

impl Dataset {
    pub fn new(posts: Vec<Post>) -> Self {
        Self { posts }
    }

    /// Load a TSV file.
    pub fn from_tsv_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            FinsentError::input_format(None, format!("cannot open {}: {e}", path.display()))
        })?;
        let dataset = Self::from_tsv_reader(file)?;
        info!(path = %path.display(), posts = dataset.len(), "loaded dataset");
        Ok(dataset)
    }

    /// Load TSV data from any reader.
    pub fn from_tsv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .from_reader(reader);

        let headers = reader.headers().map_err(|e| csv_input_error(&e))?.clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| {
                    FinsentError::input_format(Some(1), format!("missing column {name:?}"))
                })
        };
        let text_idx = column(TEXT_COLUMN)?;
        let label_idx = column(LABEL_COLUMN)?;

        let mut posts = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| csv_input_error(&e))?;
            let line = record.position().map(|p| p.line());

            let text = record
                .get(text_idx)
                .ok_or_else(|| FinsentError::input_format(line, "row has no text field"))?;
            let raw_label = record
                .get(label_idx)
                .ok_or_else(|| FinsentError::input_format(line, "row has no label field"))?
                .trim();
            let label: i64 = raw_label.parse().map_err(|_| {
                FinsentError::input_format(line, format!("label {raw_label:?} is not an integer"))
            })?;
            let label = Sentiment::from_dataset_label(label).map_err(|e| match line {
                Some(line) => FinsentError::UnrecognizedLabel(format!(
                    "dataset label {label} at line {line} (expected 0, 1 or 2)"
                )),
                None => e,
            })?;

            posts.push(Post::labeled(text, label));
        }

        Ok(Self { posts })
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn iter(&self) -> impl Iterator<Item = &Post> {
        self.posts.iter()
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// Number of posts per class, indexed by dataset label.
    pub fn label_counts(&self) -> [usize; 3] {
        let mut counts = [0; 3];
        for label in self.posts.iter().filter_map(|p| p.label) {
            counts[label.dataset_label() as usize] += 1;
        }
        counts
    }

    /// Stratified, seeded split into train and test parts.
    ///
    /// Each class contributes `round(n * test_fraction)` posts to the test
    /// part, clamped so that a class with at least two posts appears in both
    /// parts. Unlabeled posts are split as their own group.
    pub fn train_test_split(&self, test_fraction: f64, seed: u64) -> Result<DatasetSplit> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(FinsentError::InvalidInput(format!(
                "test fraction must be in (0, 1), got {test_fraction}"
            )));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut groups: [Vec<usize>; 4] = Default::default();
        for (idx, post) in self.posts.iter().enumerate() {
            let group = post.label.map_or(3, |l| l.dataset_label() as usize);
            groups[group].push(idx);
        }

        let mut train_idx = Vec::new();
        let mut test_idx = Vec::new();
        for mut group in groups {
            let n = group.len();
            if n == 0 {
                continue;
            }
            group.shuffle(&mut rng);
            let n_test = if n < 2 {
                0
            } else {
                ((n as f64 * test_fraction).round() as usize).clamp(1, n - 1)
            };
            test_idx.extend_from_slice(&group[..n_test]);
            train_idx.extend_from_slice(&group[n_test..]);
        }
        train_idx.shuffle(&mut rng);
        test_idx.shuffle(&mut rng);

        let pick = |idx: &[usize]| Dataset::new(idx.iter().map(|&i| self.posts[i].clone()).collect());
        let split = DatasetSplit {
            train: pick(&train_idx),
            test: pick(&test_idx),
        };
        debug!(
            train = split.train.len(),
            test = split.test.len(),
            seed,
            "split dataset"
        );
        Ok(split)
    }

    /// Write the posts as CSV with `texts,label` columns.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record([TEXT_COLUMN, LABEL_COLUMN])?;
        for post in &self.posts {
            let label = post
                .label
                .map(|l| l.dataset_label().to_string())
                .unwrap_or_default();
            writer.write_record([post.text.as_str(), label.as_str()])?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write the posts as CSV to a file.
    pub fn write_csv_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.write_csv(File::create(path)?)?;
        info!(path = %path.display(), posts = self.len(), "exported dataset");
        Ok(())
    }
}

impl FromIterator<Post> for Dataset {
    fn from_iter<I: IntoIterator<Item = Post>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

fn csv_input_error(err: &csv::Error) -> FinsentError {
    let line = err.position().map(|p| p.line());
    FinsentError::input_format(line, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "id\ttexts\tlabel\n\
        1\t$TSLA crushing it\t1\n\
        2\tterrible quarter for $AAPL\t0\n\
        3\tmarkets flat today\t2\n";

    fn labeled(n_per_class: usize) -> Dataset {
        let mut posts = Vec::new();
        for sentiment in Sentiment::ALL {
            for i in 0..n_per_class {
                posts.push(Post::labeled(format!("{sentiment} {i}"), sentiment));
            }
        }
        Dataset::new(posts)
    }

    #[test]
    fn loads_tsv_ignoring_extra_columns() {
        let dataset = Dataset::from_tsv_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.posts()[0], Post::labeled("$TSLA crushing it", Sentiment::Positive));
        assert_eq!(dataset.posts()[1].label, Some(Sentiment::Negative));
        assert_eq!(dataset.posts()[2].label, Some(Sentiment::Neutral));
        assert_eq!(dataset.label_counts(), [1, 1, 1]);
    }

    #[test]
    fn missing_column_is_an_input_format_error() {
        let err = Dataset::from_tsv_reader("text\tlabel\nhello\t1\n".as_bytes()).unwrap_err();
        match err {
            FinsentError::InputFormat { line, message } => {
                assert_eq!(line, Some(1));
                assert!(message.contains("texts"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unparsable_label_reports_line() {
        let data = "texts\tlabel\nok\t1\nbad\tpositive\n";
        let err = Dataset::from_tsv_reader(data.as_bytes()).unwrap_err();
        match err {
            FinsentError::InputFormat { line, .. } => assert_eq!(line, Some(3)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn ragged_row_is_an_input_format_error() {
        let data = "texts\tlabel\nok\t1\nmissing label\n";
        let err = Dataset::from_tsv_reader(data.as_bytes()).unwrap_err();
        assert!(matches!(err, FinsentError::InputFormat { .. }));
    }

    #[test]
    fn out_of_range_label_is_unrecognized() {
        let data = "texts\tlabel\nwhat\t5\n";
        let err = Dataset::from_tsv_reader(data.as_bytes()).unwrap_err();
        assert!(matches!(err, FinsentError::UnrecognizedLabel(_)));
        assert_eq!(
            err.to_string(),
            "unrecognized label: dataset label 5 at line 2 (expected 0, 1 or 2)"
        );
    }

    #[test]
    fn split_is_stratified_and_deterministic() {
        let dataset = labeled(10);
        let a = dataset.train_test_split(0.2, 42).unwrap();
        let b = dataset.train_test_split(0.2, 42).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.test.len(), 6);
        assert_eq!(a.train.len(), 24);
        assert_eq!(a.test.label_counts(), [2, 2, 2]);
        assert_eq!(a.train.label_counts(), [8, 8, 8]);
    }

    #[test]
    fn split_keeps_small_classes_in_both_parts() {
        let mut posts = labeled(1).posts().to_vec();
        posts.push(Post::labeled("another negative", Sentiment::Negative));
        let split = Dataset::new(posts).train_test_split(0.1, 7).unwrap();
        assert_eq!(split.test.label_counts(), [1, 0, 0]);
        assert_eq!(split.train.label_counts(), [1, 1, 1]);
    }

    #[test]
    fn split_rejects_bad_fraction() {
        let dataset = labeled(3);
        assert!(dataset.train_test_split(0.0, 1).is_err());
        assert!(dataset.train_test_split(1.0, 1).is_err());
        assert!(dataset.train_test_split(f64::NAN, 1).is_err());
    }

    #[test]
    fn writes_csv_export() {
        let dataset = Dataset::from_tsv_reader(SAMPLE.as_bytes()).unwrap();
        let mut out = Vec::new();
        dataset.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("texts,label"));
        assert_eq!(lines.next(), Some("$TSLA crushing it,1"));
        assert_eq!(lines.count(), 2);
    }
}
