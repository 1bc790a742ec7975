use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use epub_translator_core::{
    default_output_path, translate_archive, DocumentTranslator, HttpTransport, TokioSleeper,
    TranslationClient, TranslatorConfig,
};

#[derive(Debug, Parser)]
#[command(name = "epub-translate", version, about = "Translate the text of an EPUB book")]
struct Cli {
    /// EPUB file to translate
    input: PathBuf,

    /// Where to write the result (default: translated-<timestamp>-<input> next to the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON config file, applied before environment variables
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short = 't', long)]
    target_language: Option<String>,

    #[arg(long)]
    model: Option<String>,

    /// OpenAI-compatible chat completions endpoint
    #[arg(long)]
    api_url: Option<String>,

    #[arg(long)]
    max_retries: Option<u32>,

    /// Wait before the first retry, in milliseconds
    #[arg(long)]
    retry_base_ms: Option<u64>,

    /// Wait between consecutive requests, in milliseconds
    #[arg(long)]
    pacing_ms: Option<u64>,

    /// -v for debug output, -vv for trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn apply_to(&self, config: &mut TranslatorConfig) {
        if let Some(language) = &self.target_language {
            config.target_language = language.trim().to_string();
        }
        if let Some(model) = &self.model {
            config.model = model.trim().to_string();
        }
        if let Some(url) = &self.api_url {
            config.api_url = url.trim().to_string();
        }
        if let Some(max_retries) = self.max_retries {
            config.retry.max_retries = max_retries;
        }
        if let Some(base) = self.retry_base_ms {
            config.retry.base_delay_ms = base;
        }
        if let Some(pacing) = self.pacing_ms {
            config.pacing_ms = pacing;
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(cli: &Cli) -> Result<TranslatorConfig> {
    let mut config = match &cli.config {
        Some(path) => TranslatorConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => TranslatorConfig::default(),
    };
    config
        .apply_env(|key| std::env::var(key).ok())
        .context("invalid environment setting")?;
    cli.apply_to(&mut config);
    config.validate().context("configuration is incomplete")?;
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let dotenv_loaded = dotenv::dotenv();
    init_tracing(cli.verbose);

    if let Err(err) = dotenv_loaded {
        warn!("No .env file loaded ({err}); using the process environment");
    }

    let config = load_config(&cli)?;
    info!("Using {:?}", config);

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&cli.input, &Local::now()));

    let transport = HttpTransport::new(&config.api_url, &config.api_key, config.request_timeout())
        .context("failed to build HTTP client")?;
    let client = TranslationClient::new(
        transport,
        TokioSleeper,
        config.retry_policy(),
        config.model.clone(),
    );
    let translator = DocumentTranslator::new(client, TokioSleeper, config.pacing());

    let report = translate_archive(&cli.input, &output, &translator, &config.target_language)
        .await
        .with_context(|| format!("failed to translate {}", cli.input.display()))?;

    println!("Successfully translated EPUB to {}", report.output_path.display());
    println!(
        "{} documents, {} units translated, {} failed, {} blank",
        report.documents, report.units.translated, report.units.failed, report.units.blank
    );
    Ok(())
}
