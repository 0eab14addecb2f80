//! Error handling

use std::fmt;

/// Errors returned by the API clients, the image store and the pipeline stages.
#[derive(Debug)]
pub enum MemeError {
    /// Missing or invalid configuration, eg credentials
    Config(String),
    /// The request never got a usable HTTP response
    Transport(reqwest::Error),
    /// The service answered with a non-success status
    Api {
        /// Which service we were talking to
        service: &'static str,
        /// HTTP status code
        status: u16,
        /// Response body, for the logs
        body: String,
    },
    /// The response could not be turned into what we asked for
    MalformedResponse(String),
    /// The service answered but there was nothing usable in it
    NoResult(String),
    /// Polling gave up
    Timeout(String),
    /// Local filesystem failures
    Io(std::io::Error),
    /// The bytes we got aren't an image we can read
    Image(image::ImageError),
}

impl fmt::Display for MemeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::Transport(err) => write!(f, "Transport error: {err}"),
            Self::Api {
                service,
                status,
                body,
            } => write!(f, "{service} API error {status}: {body}"),
            Self::MalformedResponse(msg) => write!(f, "Malformed response: {msg}"),
            Self::NoResult(msg) => write!(f, "No result: {msg}"),
            Self::Timeout(msg) => write!(f, "Timed out: {msg}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
            Self::Image(err) => write!(f, "Image error: {err}"),
        }
    }
}

impl std::error::Error for MemeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Image(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for MemeError {
    fn from(err: reqwest::Error) -> Self {
        MemeError::Transport(err)
    }
}

impl From<std::io::Error> for MemeError {
    fn from(err: std::io::Error) -> Self {
        MemeError::Io(err)
    }
}

impl From<serde_json::Error> for MemeError {
    fn from(err: serde_json::Error) -> Self {
        MemeError::MalformedResponse(err.to_string())
    }
}

impl From<image::ImageError> for MemeError {
    fn from(err: image::ImageError) -> Self {
        MemeError::Image(err)
    }
}

/// Turns a non-success response into [MemeError::Api], keeping the body around for the logs.
pub(crate) async fn check_status(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, MemeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(MemeError::Api {
        service,
        status: status.as_u16(),
        body: truncate(&body, 512),
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
