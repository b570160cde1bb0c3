use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::moderation::alert::DEFAULT_TELEGRAM_API_URL;
use crate::moderation::PipelineConfig;
use crate::resilience::BreakerConfig;
use crate::scoring::DEFAULT_THRESHOLD;
use crate::toxicity::remote::DEFAULT_TOXICITY_URL;

/// Central configuration loaded from environment variables.
///
/// All secrets come from env vars (never hardcoded). The .env file
/// is loaded automatically at startup via dotenvy.
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot token. Only the relay needs it.
    pub bot_token: String,
    /// Chat that receives moderator alerts.
    pub mod_chat_id: String,
    /// Telegram Bot API base URL (overridable for tests and local proxies).
    pub telegram_api_url: String,
    /// Scoring service endpoint the relay POSTs to.
    pub toxicity_url: String,
    /// Category score above which a message is flagged.
    pub threshold: f64,
    /// Per-attempt timeout for scoring calls.
    pub scoring_timeout: Duration,
    /// Per-attempt timeout for alert delivery.
    pub alert_timeout: Duration,
    /// Overall ceiling for one webhook request.
    pub request_deadline: Duration,
    pub breaker_failure_threshold: u32,
    pub breaker_recovery_timeout: Duration,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the raw value of
    /// one variable. Unset and empty values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let threshold = parse_or(&get, "TOX_THRESHOLD", DEFAULT_THRESHOLD)?;
        if !(0.0..=1.0).contains(&threshold) {
            anyhow::bail!("TOX_THRESHOLD must be between 0 and 1, got {threshold}");
        }

        let breaker_failure_threshold = parse_or(&get, "BREAKER_FAILURE_THRESHOLD", 5u32)?;
        if breaker_failure_threshold == 0 {
            anyhow::bail!("BREAKER_FAILURE_THRESHOLD must be at least 1");
        }

        // A stalled scoring call must hit its own timeout (which the breaker
        // counts) before the request deadline cancels it.
        let scoring_timeout = seconds_or(&get, "TIMEOUT", 5.0)?;
        let request_deadline = seconds_or(&get, "REQUEST_DEADLINE", 20.0)?;
        if scoring_timeout >= request_deadline {
            anyhow::bail!(
                "TIMEOUT ({}s) must be shorter than REQUEST_DEADLINE ({}s)",
                scoring_timeout.as_secs_f64(),
                request_deadline.as_secs_f64()
            );
        }

        let model_dir = get("TOXGUARD_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(crate::toxicity::download::default_model_dir);

        Ok(Self {
            bot_token: get("BOT_TOKEN").unwrap_or_default(),
            mod_chat_id: get("MOD_CHAT_ID").unwrap_or_default(),
            telegram_api_url: get("TELEGRAM_API_URL")
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API_URL.to_string()),
            toxicity_url: get("TOXICITY_URL").unwrap_or_else(|| DEFAULT_TOXICITY_URL.to_string()),
            threshold,
            scoring_timeout,
            alert_timeout: seconds_or(&get, "ALERT_TIMEOUT", 5.0)?,
            request_deadline,
            breaker_failure_threshold,
            breaker_recovery_timeout: seconds_or(&get, "BREAKER_RECOVERY_TIMEOUT", 30.0)?,
            model_dir,
        })
    }

    /// Check that the Telegram settings are configured.
    /// Call this before starting the relay.
    pub fn require_telegram(&self) -> Result<()> {
        if self.bot_token.is_empty() {
            anyhow::bail!(
                "BOT_TOKEN not set. Add it to your .env file.\n\
                 Get a token from @BotFather and set BOT_TOKEN=<token>."
            );
        }
        if self.mod_chat_id.is_empty() {
            anyhow::bail!(
                "MOD_CHAT_ID not set. Add it to your .env file.\n\
                 This is the chat id that receives moderator alerts."
            );
        }
        Ok(())
    }

    /// Check that the local model files are present.
    /// Call this before starting the scoring service.
    pub fn require_model(&self) -> Result<()> {
        if !crate::toxicity::download::model_files_present(&self.model_dir) {
            anyhow::bail!(
                "ONNX model files not found in {}\n\
                 Run `toxguard download-model` to download them.",
                self.model_dir.display()
            );
        }
        Ok(())
    }

    pub fn breaker(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.breaker_failure_threshold,
            recovery_timeout: self.breaker_recovery_timeout,
        }
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            threshold: self.threshold,
            alert_destination: self.mod_chat_id.clone(),
            alert_timeout: self.alert_timeout,
            request_deadline: self.request_deadline,
        }
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}

fn seconds_or<G>(get: &G, key: &str, default: f64) -> Result<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    let secs: f64 = parse_or(get, key, default)?;
    if !secs.is_finite() || secs <= 0.0 {
        anyhow::bail!("{key} must be a positive number of seconds, got {secs}");
    }
    Ok(Duration::from_secs_f64(secs))
}
