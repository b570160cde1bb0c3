// Model download helper for the scoring service.
//
// Fetches the Detoxify unbiased-toxic-roberta ONNX export (~126MB) and its
// tokenizer from HuggingFace into a platform-appropriate directory
// (~/.local/share/toxguard/models/ on Linux) so they persist across runs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// HuggingFace repo for the toxicity model.
const TOXICITY_HF_URL: &str =
    "https://huggingface.co/protectai/unbiased-toxic-roberta-onnx/resolve/main";

pub const TOXICITY_MODEL_FILE: &str = "model_quantized.onnx";
pub const TOXICITY_TOKENIZER_FILE: &str = "tokenizer.json";

/// Returns the default directory for storing model files.
pub fn default_model_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("toxguard")
        .join("models")
}

/// Check whether both model files exist.
pub fn model_files_present(dir: &Path) -> bool {
    dir.join(TOXICITY_MODEL_FILE).exists() && dir.join(TOXICITY_TOKENIZER_FILE).exists()
}

/// Download the toxicity model and tokenizer. Skips files that already exist.
pub async fn download_model(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create model directory: {}", dir.display()))?;

    println!("\nToxicity model (unbiased-toxic-roberta):");

    for (file, large) in [(TOXICITY_TOKENIZER_FILE, false), (TOXICITY_MODEL_FILE, true)] {
        let dest = dir.join(file);
        if dest.exists() {
            info!(file, "Model file already exists, skipping");
            println!("  {file} (already exists)");
            continue;
        }
        if large {
            println!("  Downloading {file} (~126 MB)...");
        } else {
            println!("  Downloading {file}...");
        }
        download_file(&format!("{TOXICITY_HF_URL}/{file}"), &dest, large).await?;
    }

    Ok(())
}

/// Download a single file from a URL to a local path.
/// If `show_progress` is true, display a progress bar.
async fn download_file(url: &str, dest: &Path, show_progress: bool) -> Result<()> {
    let client = reqwest::Client::new();
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to download {}", url))?;

    if !response.status().is_success() {
        anyhow::bail!("Download failed with status {}: {}", response.status(), url);
    }

    let pb = if show_progress {
        Some(progress_bar(response.content_length())?)
    } else {
        None
    };

    let bytes = response
        .bytes()
        .await
        .context("Failed to read response body")?;

    if let Some(ref pb) = pb {
        pb.set_position(bytes.len() as u64);
    }

    std::fs::write(dest, &bytes).with_context(|| format!("Failed to write {}", dest.display()))?;

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    info!("Downloaded {} to {}", url, dest.display());
    Ok(())
}

fn progress_bar(total_size: Option<u64>) -> Result<ProgressBar> {
    let pb = match total_size {
        Some(size) => {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("    [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                    .context("Invalid progress bar template")?
                    .progress_chars("=> "),
            );
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("    {spinner} {bytes}")
                    .context("Invalid progress bar template")?,
            );
            pb
        }
    };
    Ok(pb)
}
