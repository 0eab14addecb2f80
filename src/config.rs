//! Config handling

use std::time::Duration;

use tracing::log::LevelFilter;
use tracing::{error, info};

use crate::constants::{
    DEFAULT_IMAGE_MODEL, DEFAULT_MAX_WAIT_SECS, DEFAULT_OVERLAY_MODEL, DEFAULT_TEXT_MODEL,
    FALLBACK_IMAGE_MODEL, GEMINI_API_BASE, GEMINI_API_KEY_VAR, POLL_INTERVAL, PREFER_WAIT,
    REPLICATE_API_BASE, REPLICATE_API_TOKEN_VAR,
};
use crate::error::MemeError;

/// Sets up logging based on the debug flag
pub fn setup_logging(debug: bool) -> Result<(), Box<std::io::Error>> {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut logger = simple_logger::SimpleLogger::new().with_level(level);
    if !debug {
        logger = logger
            .with_module_level("tracing", LevelFilter::Warn)
            .with_module_level("reqwest", LevelFilter::Warn)
            .with_module_level("rustls", LevelFilter::Info)
            .with_module_level("hyper_util", LevelFilter::Info)
            .with_module_level("h2", LevelFilter::Info);
    }
    logger.init().map_err(|err| {
        eprintln!("Failed to initialize logger: {}", err);
        Box::new(std::io::Error::other(err))
    })
}

/// API keys for both services.
#[derive(Clone)]
pub struct Credentials {
    /// Gemini API key
    pub gemini_api_key: String,
    /// Replicate API token
    pub replicate_api_token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("gemini_api_key", &"<redacted>")
            .field("replicate_api_token", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Checks both credentials are present and non-empty, naming any that aren't.
    pub fn validate(
        gemini_api_key: Option<&str>,
        replicate_api_token: Option<&str>,
    ) -> Result<Self, MemeError> {
        let present = |value: Option<&str>| {
            value
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        let gemini = present(gemini_api_key);
        let replicate = present(replicate_api_token);

        match (gemini, replicate) {
            (Some(gemini_api_key), Some(replicate_api_token)) => {
                info!("All required environment variables are present");
                Ok(Self {
                    gemini_api_key,
                    replicate_api_token,
                })
            }
            (gemini, replicate) => {
                let missing: Vec<&str> = [
                    (gemini.is_none(), GEMINI_API_KEY_VAR),
                    (replicate.is_none(), REPLICATE_API_TOKEN_VAR),
                ]
                .into_iter()
                .filter_map(|(missing, name)| missing.then_some(name))
                .collect();
                error!(
                    "Missing required environment variables: {}",
                    missing.join(", ")
                );
                Err(MemeError::Config(format!(
                    "missing required environment variables: {}",
                    missing.join(", ")
                )))
            }
        }
    }
}

/// Where the clients send requests, and which models they ask for.
#[derive(Clone, Debug)]
pub struct ApiEndpoints {
    /// Gemini REST base, up to and including the version
    pub gemini_api_base: String,
    /// Replicate REST base, up to and including the version
    pub replicate_api_base: String,
    /// Gemini model for JSON/text answers
    pub text_model: String,
    /// Gemini model that can return images
    pub overlay_model: String,
    /// Primary Replicate model
    pub image_model: String,
    /// Replicate model tried once when the primary fails
    pub fallback_image_model: String,
    /// Server-side wait requested on prediction creation, before falling back to polling
    pub prefer_wait: Duration,
    /// Gap between prediction status checks
    pub poll_interval: Duration,
    /// Give up on a prediction after this long
    pub max_wait: Duration,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            gemini_api_base: GEMINI_API_BASE.to_string(),
            replicate_api_base: REPLICATE_API_BASE.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            overlay_model: DEFAULT_OVERLAY_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            fallback_image_model: FALLBACK_IMAGE_MODEL.to_string(),
            prefer_wait: PREFER_WAIT,
            poll_interval: POLL_INTERVAL,
            max_wait: Duration::from_secs(DEFAULT_MAX_WAIT_SECS),
        }
    }
}
