// Local ONNX toxicity scorer (Detoxify unbiased-toxic-roberta).
//
// This is what the scoring service runs. Inference happens on the local CPU
// with no network dependency.
//
// Model: protectai/unbiased-toxic-roberta-onnx (quantized, ~126MB)
// Output: 7 toxicity categories with continuous 0-1 scores via sigmoid.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::debug;

use super::download::{TOXICITY_MODEL_FILE, TOXICITY_TOKENIZER_FILE};
use super::traits::{Category, CategoryScores, ScoreProvider};
use crate::error::ScoreError;
use crate::output::truncate_chars;

/// Labels output by unbiased-toxic-roberta, in the order the model returns them.
const LABEL_ORDER: [&str; 7] = [
    "toxicity",
    "severe_toxicity",
    "obscene",
    "identity_attack",
    "insult",
    "threat",
    "sexual_explicit",
];

/// RoBERTa pad token id.
const PAD_TOKEN_ID: i64 = 1;

/// Longest token sequence the model accepts, special tokens included.
const MAX_SEQUENCE_TOKENS: usize = 512;

/// Local ONNX-based score provider.
pub struct OnnxScoreProvider {
    // ort::Session::run takes &mut self, and spawn_blocking needs 'static
    // handles, hence Arc<Mutex<_>>. Inference is serialized through the lock.
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
}

impl OnnxScoreProvider {
    /// Load the ONNX model and tokenizer from the given directory.
    ///
    /// Run `toxguard download-model` first if the files don't exist.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let model_path = model_dir.join(TOXICITY_MODEL_FILE);
        let tokenizer_path = model_dir.join(TOXICITY_TOKENIZER_FILE);

        if !model_path.exists() {
            anyhow::bail!(
                "Model file not found: {}\nRun `toxguard download-model` to download it.",
                model_path.display()
            );
        }
        if !tokenizer_path.exists() {
            anyhow::bail!(
                "Tokenizer file not found: {}\nRun `toxguard download-model` to download it.",
                tokenizer_path.display()
            );
        }

        let session = Session::builder()
            .context("Failed to create ONNX session builder")?
            .commit_from_file(&model_path)
            .with_context(|| format!("Failed to load ONNX model from {}", model_path.display()))?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
        limit_sequence_length(&mut tokenizer)?;

        debug!("Loaded ONNX toxicity model from {}", model_dir.display());

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
        })
    }

    /// Batch inference: tokenize all texts, run one forward pass, apply
    /// sigmoid to logits. CPU-bound work runs on a blocking thread.
    pub async fn score_batch(&self, texts: &[String]) -> Result<Vec<CategoryScores>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let encodings: Vec<_> = texts
                .iter()
                .map(|t| {
                    tokenizer
                        .encode(t.as_str(), true)
                        .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))
                })
                .collect::<Result<Vec<_>>>()?;

            let batch_size = encodings.len();
            let max_len = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);

            // Right-padded flat tensors, shape [batch_size, max_len]
            let mut input_ids_flat: Vec<i64> = Vec::with_capacity(batch_size * max_len);
            let mut attention_mask_flat: Vec<i64> = Vec::with_capacity(batch_size * max_len);

            for enc in &encodings {
                let ids = enc.get_ids();
                input_ids_flat.extend(ids.iter().map(|&id| id as i64));
                attention_mask_flat.extend(enc.get_attention_mask().iter().map(|&m| m as i64));
                for _ in ids.len()..max_len {
                    input_ids_flat.push(PAD_TOKEN_ID);
                    attention_mask_flat.push(0);
                }
            }

            let shape = [batch_size as i64, max_len as i64];

            let input_ids_tensor = Tensor::from_array((shape, input_ids_flat))
                .context("Failed to create input_ids tensor")?;
            let attention_mask_tensor = Tensor::from_array((shape, attention_mask_flat))
                .context("Failed to create attention_mask tensor")?;

            let logits_data = {
                let mut session = session
                    .lock()
                    .map_err(|e| anyhow::anyhow!("Session lock poisoned: {}", e))?;

                let outputs = session
                    .run(ort::inputs! {
                        "input_ids" => input_ids_tensor,
                        "attention_mask" => attention_mask_tensor
                    })
                    .context("ONNX inference failed")?;

                // Output shape: [batch_size, 7], raw logits
                let (_out_shape, data) = outputs[0]
                    .try_extract_tensor::<f32>()
                    .context("Failed to extract output tensor")?;

                data.to_vec()
            };

            let mut results = Vec::with_capacity(batch_size);
            for (i, text) in texts.iter().enumerate() {
                let offset = i * LABEL_ORDER.len();
                let row = logits_data
                    .get(offset..offset + LABEL_ORDER.len())
                    .context("Model returned fewer outputs than expected")?;

                let probabilities: Vec<f64> =
                    row.iter().map(|&logit| sigmoid(logit as f64)).collect();
                let scores = map_outputs(&probabilities);

                debug!(
                    toxicity = scores.get(Category::Toxicity),
                    threat = scores.get(Category::Threat),
                    text_preview = %truncate_chars(text, 50),
                    "ONNX scored text"
                );

                results.push(scores);
            }

            Ok(results)
        })
        .await
        .context("spawn_blocking panicked")?
    }
}

#[async_trait]
impl ScoreProvider for OnnxScoreProvider {
    async fn score_text(&self, text: &str) -> Result<CategoryScores, ScoreError> {
        let mut results = self
            .score_batch(&[text.to_string()])
            .await
            .map_err(|e| ScoreError::Inference(format!("{e:#}")))?;
        results
            .pop()
            .ok_or_else(|| ScoreError::Inference("Model returned no scores".to_string()))
    }
}

/// Cap encodings at the model's position limit. 512 characters of emoji or
/// CJK text can tokenize to well over 512 ids.
fn limit_sequence_length(tokenizer: &mut Tokenizer) -> Result<()> {
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: MAX_SEQUENCE_TOKENS,
            ..Default::default()
        }))
        .map_err(|e| anyhow::anyhow!("Failed to configure tokenizer truncation: {}", e))?;
    Ok(())
}

/// Sigmoid activation: maps any real number to (0, 1).
fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Map model outputs (in LABEL_ORDER) to our categories by name.
/// `sexual_explicit` has no category and is dropped.
fn map_outputs(probabilities: &[f64]) -> CategoryScores {
    CategoryScores::from_pairs(
        LABEL_ORDER
            .iter()
            .zip(probabilities)
            .filter_map(|(label, &p)| Category::from_label(label).map(|c| (c, p))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid_zero() {
        let result = sigmoid(0.0);
        assert!((result - 0.5).abs() < 1e-10, "sigmoid(0) should be 0.5");
    }

    #[test]
    fn test_sigmoid_extremes() {
        assert!(sigmoid(10.0) > 0.999);
        assert!(sigmoid(-10.0) < 0.001);
    }

    #[test]
    fn test_sigmoid_symmetry() {
        for x in [0.5, 1.0, 2.0, 5.0] {
            let sum = sigmoid(x) + sigmoid(-x);
            assert!(
                (sum - 1.0).abs() < 1e-10,
                "sigmoid({x}) + sigmoid(-{x}) should equal 1.0"
            );
        }
    }

    #[test]
    fn test_map_outputs_by_label_name() {
        // toxicity, severe_toxicity, obscene, identity_attack, insult, threat, sexual_explicit
        let probabilities = vec![0.9, 0.1, 0.8, 0.3, 0.7, 0.05, 0.4];
        let scores = map_outputs(&probabilities);

        assert!((scores.get(Category::Toxicity) - 0.9).abs() < 1e-10);
        assert!((scores.get(Category::SevereToxicity) - 0.1).abs() < 1e-10);
        assert!((scores.get(Category::Obscene) - 0.8).abs() < 1e-10);
        assert!((scores.get(Category::IdentityAttack) - 0.3).abs() < 1e-10);
        assert!((scores.get(Category::Insult) - 0.7).abs() < 1e-10);
        assert!((scores.get(Category::Threat) - 0.05).abs() < 1e-10);
    }

    #[test]
    fn test_every_category_has_a_model_output() {
        for category in Category::ALL {
            assert!(
                LABEL_ORDER.contains(&category.as_str()),
                "{category} missing from model outputs"
            );
        }
    }

    #[test]
    fn test_tokenizer_truncates_to_model_limit() {
        let mut tokenizer = Tokenizer::new(tokenizers::models::bpe::BPE::default());
        assert!(tokenizer.get_truncation().is_none());

        limit_sequence_length(&mut tokenizer).unwrap();

        let truncation = tokenizer.get_truncation().unwrap();
        assert_eq!(truncation.max_length, MAX_SEQUENCE_TOKENS);
    }

    #[test]
    fn test_load_missing_model_is_actionable() {
        let dir = std::env::temp_dir().join("toxguard-test-no-model");
        let err = OnnxScoreProvider::load(&dir).err().unwrap();
        assert!(err.to_string().contains("download-model"));
    }
}
