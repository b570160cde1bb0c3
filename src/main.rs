use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use toxguard::config::Config;
use toxguard::metrics::Metrics;
use toxguard::moderation::{ModerationPipeline, TelegramAlertSink};
use toxguard::toxicity::remote::RemoteScoreProvider;
use toxguard::toxicity::scorer::Scorer;
use toxguard::web::{self, RelayState};

/// toxguard: toxicity moderation relay for Telegram group chats.
///
/// Scores every group message and alerts moderators about toxic ones,
/// staying up (and staying quiet) when the scoring service is down.
#[derive(Parser)]
#[command(name = "toxguard", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay: Telegram webhook intake, scoring, moderator alerts
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8000")]
        port: u16,

        /// Address to bind to
        #[arg(long, default_value = "0.0.0.0")]
        bind: String,
    },

    /// Run the scoring service backed by the local ONNX model
    #[cfg(feature = "onnx")]
    Scorer {
        /// Port to listen on
        #[arg(long, default_value = "8080")]
        port: u16,

        /// Address to bind to
        #[arg(long, default_value = "0.0.0.0")]
        bind: String,
    },

    /// Score a piece of text with the local model and print the verdict
    #[cfg(feature = "onnx")]
    Score {
        /// Text to score
        text: String,
    },

    /// Download the ONNX toxicity model (~126 MB)
    DownloadModel,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (won't override existing env vars)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("toxguard=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, bind } => {
            let config = Config::load()?;
            config.require_telegram()?;

            let metrics = Arc::new(Metrics::new());
            let provider = RemoteScoreProvider::new(&config.toxicity_url, config.scoring_timeout)?;
            let scorer = Scorer::new(Arc::new(provider), config.scoring_timeout);
            let alerts = TelegramAlertSink::new(
                &config.telegram_api_url,
                &config.bot_token,
                config.alert_timeout,
            );
            let pipeline = ModerationPipeline::new(
                scorer,
                config.breaker(),
                Arc::new(alerts),
                Arc::clone(&metrics),
                config.pipeline(),
            );

            info!(
                toxicity_url = %config.toxicity_url,
                threshold = config.threshold,
                breaker_threshold = config.breaker_failure_threshold,
                "Relay configured"
            );

            let state = RelayState {
                pipeline: Arc::new(pipeline),
                metrics,
            };
            web::run_relay(state, port, &bind).await?;
        }

        #[cfg(feature = "onnx")]
        Commands::Scorer { port, bind } => {
            let config = Config::load()?;
            config.require_model()?;

            let provider = toxguard::toxicity::onnx::OnnxScoreProvider::load(&config.model_dir)?;
            info!(model_dir = %config.model_dir.display(), "Toxicity model loaded");

            let state = web::ScorerState {
                provider: Arc::new(provider),
                metrics: Arc::new(Metrics::new()),
            };
            web::run_scorer(state, port, &bind).await?;
        }

        #[cfg(feature = "onnx")]
        Commands::Score { text } => {
            use toxguard::toxicity::traits::ScoreProvider;

            let config = Config::load()?;
            config.require_model()?;

            let provider = toxguard::toxicity::onnx::OnnxScoreProvider::load(&config.model_dir)?;
            let normalized = toxguard::toxicity::scorer::normalize(&text);
            let categories = provider.score_text(normalized).await?;
            let verdict = toxguard::scoring::decide(&categories, config.threshold);

            toxguard::output::terminal::display_verdict(&text, &verdict, config.threshold);
        }

        Commands::DownloadModel => {
            let config = Config::load()?;
            let model_dir = &config.model_dir;

            println!("Downloading ONNX model...");
            println!("  Destination: {}", model_dir.display());

            toxguard::toxicity::download::download_model(model_dir).await?;

            println!("\n{}", "Model downloaded successfully.".bold());
            println!("You can now run `toxguard scorer` or `toxguard score <TEXT>`.");
        }
    }

    Ok(())
}
