//! CLI parser
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::ApiEndpoints;
use crate::constants::{
    DEFAULT_IMAGE_MODEL, DEFAULT_MAX_WAIT_SECS, DEFAULT_OVERLAY_MODEL, DEFAULT_TEXT_MODEL,
    GEMINI_API_BASE, REPLICATE_API_BASE,
};

#[derive(Parser, Debug)]
#[command(name = "memegen")]
#[command(about = "Generate memes using an AI pipeline with Gemini and Replicate APIs")]
/// CLI Options
pub struct CliOptions {
    #[clap(long, help = "Theme for the meme (e.g. \"cats\", \"programming\", \"office humor\")")]
    /// What the memes are about
    pub theme: String,

    #[clap(long, default_value_t = 1)]
    /// Number of memes to generate, defaults to `1`.
    pub number: usize,

    #[clap(long, default_value = "general")]
    /// Type of humor (e.g. "absurd", "witty", "dark", "wholesome"), defaults to `general`.
    pub humor_type: String,

    #[clap(long, default_value = "")]
    /// Restrictions or guidelines (e.g. "no profanity", "family-friendly").
    pub restrictions: String,

    #[clap(long, default_value = "output", env = "MEMEGEN_OUTPUT_DIR")]
    /// Directory to save generated memes, defaults to `output`.
    /// Env: MEMEGEN_OUTPUT_DIR
    pub output_dir: PathBuf,

    #[clap(long, help = "Enable debug logging", env = "MEMEGEN_DEBUG")]
    /// Enable debug logging. Env: MEMEGEN_DEBUG
    pub debug: bool,

    #[clap(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    /// Gemini API key. Env: GEMINI_API_KEY
    pub gemini_api_key: Option<String>,

    #[clap(long, env = "REPLICATE_API_TOKEN", hide_env_values = true)]
    /// Replicate API token. Env: REPLICATE_API_TOKEN
    pub replicate_api_token: Option<String>,

    #[clap(long, default_value = DEFAULT_TEXT_MODEL, env = "MEMEGEN_TEXT_MODEL")]
    /// Gemini model used for planning and meme text
    pub text_model: String,

    #[clap(long, default_value = DEFAULT_OVERLAY_MODEL, env = "MEMEGEN_OVERLAY_MODEL")]
    /// Gemini model asked to draw the text onto the image
    pub overlay_model: String,

    #[clap(long, default_value = DEFAULT_IMAGE_MODEL, env = "MEMEGEN_IMAGE_MODEL")]
    /// Replicate model for the base image
    pub image_model: String,

    #[clap(long, default_value = GEMINI_API_BASE, env = "GEMINI_API_BASE")]
    /// Gemini API base URL. Env: GEMINI_API_BASE
    pub gemini_api_base: String,

    #[clap(long, default_value = REPLICATE_API_BASE, env = "REPLICATE_API_BASE")]
    /// Replicate API base URL. Env: REPLICATE_API_BASE
    pub replicate_api_base: String,

    #[clap(long, default_value_t = DEFAULT_MAX_WAIT_SECS, env = "MEMEGEN_MAX_WAIT_SECS")]
    /// Seconds to wait on an unfinished image prediction, defaults to `300`.
    pub max_wait_secs: u64,
}

impl CliOptions {
    /// Endpoint and model settings for the API clients.
    pub fn endpoints(&self) -> ApiEndpoints {
        ApiEndpoints {
            gemini_api_base: self.gemini_api_base.clone(),
            replicate_api_base: self.replicate_api_base.clone(),
            text_model: self.text_model.clone(),
            overlay_model: self.overlay_model.clone(),
            image_model: self.image_model.clone(),
            max_wait: Duration::from_secs(self.max_wait_secs),
            ..Default::default()
        }
    }
}
