//! Shared constants for the API clients and the pipeline
//!

use std::time::Duration;

/// Default Gemini REST endpoint
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default Replicate REST endpoint
pub const REPLICATE_API_BASE: &str = "https://api.replicate.com/v1";

/// Env var holding the Gemini key
pub const GEMINI_API_KEY_VAR: &str = "GEMINI_API_KEY";

/// Env var holding the Replicate token
pub const REPLICATE_API_TOKEN_VAR: &str = "REPLICATE_API_TOKEN";

/// Model used for planning, meme text and regeneration prompts
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";

/// Model asked to redraw the base image with the text on it
pub const DEFAULT_OVERLAY_MODEL: &str = "gemini-2.0-flash-preview-image-generation";

/// Primary image model
pub const DEFAULT_IMAGE_MODEL: &str = "black-forest-labs/flux-1.1-pro";

/// Tried once when the primary image model fails
pub const FALLBACK_IMAGE_MODEL: &str = "stability-ai/stable-diffusion:ac732df83cea7fff18b8472768c88ad041fa750ff7682a21affe81863cbe77e4";

/// Interval between prediction status checks
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// How long we wait on a prediction before giving up, in seconds
pub const DEFAULT_MAX_WAIT_SECS: u64 = 300;

/// Per-request timeout for API calls
pub const API_TIMEOUT: Duration = Duration::from_secs(60);

/// How long Replicate may hold a create request open before answering with an
/// unfinished prediction. Has to stay below [API_TIMEOUT].
pub const PREFER_WAIT: Duration = Duration::from_secs(50);

/// Per-request timeout for image downloads
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Some image hosts refuse requests without a browser-ish user agent
pub const DOWNLOAD_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Longest filename `sanitize_filename` will hand back
pub const MAX_FILENAME_LENGTH: usize = 200;
