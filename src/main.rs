use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use memegen::cli::CliOptions;
use memegen::config::{Credentials, setup_logging};
use memegen::gemini::GeminiClient;
use memegen::pipeline::MemeGenerator;
use memegen::replicate::ReplicateClient;
use memegen::store::HttpImageStore;
use tracing::{error, info, warn};

async fn run(cli: CliOptions, credentials: Credentials) -> anyhow::Result<ExitCode> {
    info!("Starting meme generation for theme: '{}'", cli.theme);
    info!("Number of memes: {}", cli.number);
    info!("Humor type: {}", cli.humor_type);
    if !cli.restrictions.is_empty() {
        info!("Restrictions: {}", cli.restrictions);
    }

    tokio::fs::create_dir_all(&cli.output_dir)
        .await
        .with_context(|| {
            format!(
                "failed to create output directory {}",
                cli.output_dir.display()
            )
        })?;

    let endpoints = cli.endpoints();
    let text = GeminiClient::with_default_span(&credentials.gemini_api_key, &endpoints)
        .context("failed to build Gemini client")?;
    let images = ReplicateClient::with_default_span(&credentials.replicate_api_token, &endpoints)
        .context("failed to build Replicate client")?;
    let store = HttpImageStore::with_default_span().context("failed to build image store")?;
    let generator = MemeGenerator::new(text, images, store, &cli.output_dir);

    let summary = generator
        .run_batch(&cli.theme, &cli.humor_type, &cli.restrictions, cli.number)
        .await;
    Ok(ExitCode::from(summary.exit_code()))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = CliOptions::parse();

    if setup_logging(cli.debug).is_err() {
        return ExitCode::FAILURE;
    }

    let credentials = match Credentials::validate(
        cli.gemini_api_key.as_deref(),
        cli.replicate_api_token.as_deref(),
    ) {
        Ok(credentials) => credentials,
        Err(err) => {
            error!("{}", err);
            error!("Set them in the environment or pass them as flags");
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        result = run(cli, credentials) => match result {
            Ok(code) => code,
            Err(err) => {
                error!("Unexpected error: {:#}", err);
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            warn!("Meme generation interrupted by user");
            ExitCode::SUCCESS
        }
    }
}
