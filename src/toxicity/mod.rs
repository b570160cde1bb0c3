// Toxicity scoring behind a trait so providers can be swapped.
//
// ScoreProvider is the interface. The relay uses RemoteScoreProvider to reach
// the scoring service over HTTP; the scoring service uses OnnxScoreProvider to
// run the model locally. Scorer sits in front of either one and handles text
// normalization and the per-call timeout.

pub mod api;
pub mod download;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod remote;
pub mod scorer;
pub mod traits;
