//! Public types for the finsent API.

mod sentiment;

pub use sentiment::{NormalizedPost, Post, Prediction, RawPrediction, Sentiment};
