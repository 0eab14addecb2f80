//! Image generation through Replicate predictions.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{Instrument, Span, error, info, info_span, warn};

use crate::config::ApiEndpoints;
use crate::constants::API_TIMEOUT;
use crate::error::{MemeError, check_status};

/// Something that turns a prompt into the URL of a generated image.
pub trait ImageGenerator {
    /// Generates an image and returns where it can be downloaded from.
    fn generate_image(&self, prompt: &str) -> impl Future<Output = Result<String, MemeError>>;
}

/// The shapes a prediction's `output` field comes back in.
///
/// Conversion to a URL ([ImageOutput::into_url]):
/// - `Url`: the string itself
/// - `List`: the first element, converted by these same rules; an empty list is an error
/// - `File`: the object's `url` field
/// - `Unrecognized`: the JSON text of the value (null is an error)
///
/// Whatever comes out has to parse as an absolute http(s) URL.
#[derive(Clone, Debug, PartialEq)]
pub enum ImageOutput {
    /// A bare URL
    Url(String),
    /// Multiple outputs, we only want the first
    List(Vec<Value>),
    /// A file object exposing `url`
    File {
        /// Where the file lives
        url: String,
    },
    /// Anything else
    Unrecognized(Value),
}

impl From<Value> for ImageOutput {
    fn from(value: Value) -> Self {
        match value {
            Value::String(url) => Self::Url(url),
            Value::Array(items) => Self::List(items),
            Value::Object(map) => match map.get("url").and_then(Value::as_str) {
                Some(url) => Self::File {
                    url: url.to_string(),
                },
                None => Self::Unrecognized(Value::Object(map)),
            },
            other => Self::Unrecognized(other),
        }
    }
}

impl ImageOutput {
    /// Normalizes to a single URL, or fails.
    pub fn into_url(self) -> Result<String, MemeError> {
        let candidate = match self {
            Self::Url(url) => url,
            Self::File { url } => url,
            Self::List(items) => {
                return match items.into_iter().next() {
                    Some(first) => Self::from(first).into_url(),
                    None => Err(MemeError::NoResult("prediction output is an empty list".into())),
                };
            }
            Self::Unrecognized(Value::Null) => {
                return Err(MemeError::NoResult("prediction has no output".into()));
            }
            Self::Unrecognized(other) => {
                let coerced = match other {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                warn!("Converting unexpected output format to string: {}", coerced);
                coerced
            }
        };
        validate_image_url(&candidate)
    }
}

fn validate_image_url(candidate: &str) -> Result<String, MemeError> {
    let trimmed = candidate.trim();
    match url::Url::parse(trimmed) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(trimmed.to_string()),
        Ok(url) => Err(MemeError::MalformedResponse(format!(
            "unsupported URL scheme {:?} in output {trimmed:?}",
            url.scheme()
        ))),
        Err(err) => Err(MemeError::MalformedResponse(format!(
            "output {trimmed:?} is not a URL: {err}"
        ))),
    }
}

/// Lifecycle state of a prediction.
#[derive(Clone, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum PredictionStatus {
    /// Queued
    #[default]
    Starting,
    /// Running
    Processing,
    /// Done, output is set
    Succeeded,
    /// Done, error is set
    Failed,
    /// Cancelled by someone
    Canceled,
    /// A status we don't know about
    Unknown(String),
}

impl From<String> for PredictionStatus {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "starting" => Self::Starting,
            "processing" => Self::Processing,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "canceled" | "cancelled" => Self::Canceled,
            _ => Self::Unknown(value),
        }
    }
}

impl fmt::Display for PredictionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => f.write_str("starting"),
            Self::Processing => f.write_str("processing"),
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed => f.write_str("failed"),
            Self::Canceled => f.write_str("canceled"),
            Self::Unknown(other) => f.write_str(other),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(default)]
    id: String,
    #[serde(default)]
    status: PredictionStatus,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Value,
}

impl Prediction {
    fn into_url(self) -> Result<String, MemeError> {
        ImageOutput::from(self.output).into_url()
    }

    fn failure(&self) -> MemeError {
        MemeError::NoResult(format!(
            "prediction {} {}: {}",
            self.id, self.status, self.error
        ))
    }
}

/// Input for the primary (flux) model.
fn primary_input(prompt: &str) -> Value {
    json!({
        "prompt": prompt,
        "aspect_ratio": "16:9",
        "output_format": "jpg",
        "safety_tolerance": 2,
        "prompt_upsampling": true
    })
}

/// Input for the fallback (stable diffusion) model.
fn fallback_input(prompt: &str) -> Value {
    json!({
        "prompt": prompt,
        "width": 1024,
        "height": 576,
        "num_outputs": 1,
        "scheduler": "K_EULER",
        "num_inference_steps": 20,
        "guidance_scale": 7.5
    })
}

/// `wait=<secs>`, kept within Replicate's 1 to 60 second range and well inside
/// the request timeout, so a queued prediction comes back unfinished instead of
/// timing out on our side.
fn prefer_header(wait: Duration) -> String {
    let ceiling = API_TIMEOUT.as_secs().saturating_sub(10).clamp(1, 60);
    format!("wait={}", wait.as_secs().clamp(1, ceiling))
}

/// [ImageGenerator] backed by Replicate, with one fallback model.
#[derive(Clone)]
pub struct ReplicateClient {
    http: reqwest::Client,
    api_token: String,
    api_base: String,
    model: String,
    fallback_model: String,
    prefer: String,
    poll_interval: Duration,
    max_wait: Duration,
    span: Span,
}

impl ReplicateClient {
    /// Builds a client; nothing is sent until the first call.
    pub fn new(api_token: &str, endpoints: &ApiEndpoints, span: Span) -> Result<Self, MemeError> {
        let http = reqwest::Client::builder().timeout(API_TIMEOUT).build()?;
        let client = Self {
            http,
            api_token: api_token.to_string(),
            api_base: endpoints.replicate_api_base.trim_end_matches('/').to_string(),
            model: endpoints.image_model.clone(),
            fallback_model: endpoints.fallback_image_model.clone(),
            prefer: prefer_header(endpoints.prefer_wait),
            poll_interval: endpoints.poll_interval,
            max_wait: endpoints.max_wait,
            span,
        };
        client
            .span
            .in_scope(|| info!("Replicate client initialized successfully"));
        Ok(client)
    }

    /// Client with the default `replicate` span
    pub fn with_default_span(api_token: &str, endpoints: &ApiEndpoints) -> Result<Self, MemeError> {
        Self::new(api_token, endpoints, info_span!("replicate"))
    }

    /// Polls a prediction until it finishes or `max_wait` runs out, returning the first output URL.
    pub async fn wait_for_completion(
        &self,
        prediction_id: &str,
        max_wait: Duration,
    ) -> Result<String, MemeError> {
        self.poll_prediction(prediction_id, max_wait)
            .instrument(self.span.clone())
            .await
    }

    async fn poll_prediction(
        &self,
        prediction_id: &str,
        max_wait: Duration,
    ) -> Result<String, MemeError> {
        let started = Instant::now();
        while started.elapsed() < max_wait {
            match self.get_prediction(prediction_id).await {
                Ok(prediction) => match prediction.status.clone() {
                    PredictionStatus::Succeeded => return prediction.into_url(),
                    PredictionStatus::Failed | PredictionStatus::Canceled => {
                        let err = prediction.failure();
                        error!("Prediction failed: {}", err);
                        return Err(err);
                    }
                    status @ (PredictionStatus::Starting | PredictionStatus::Processing) => {
                        info!("Prediction status: {}", status);
                    }
                    PredictionStatus::Unknown(status) => {
                        warn!("Unknown prediction status: {}", status);
                    }
                },
                Err(err) => error!("Error checking prediction status: {}", err),
            }
            let remaining = max_wait.saturating_sub(started.elapsed());
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
        }

        error!("Prediction {} timed out", prediction_id);
        Err(MemeError::Timeout(format!(
            "prediction {prediction_id} not finished after {}s",
            max_wait.as_secs_f64()
        )))
    }

    async fn get_prediction(&self, prediction_id: &str) -> Result<Prediction, MemeError> {
        let response = self
            .http
            .get(format!("{}/predictions/{}", self.api_base, prediction_id))
            .bearer_auth(&self.api_token)
            .send()
            .await?;
        let response = check_status("Replicate", response).await?;
        Ok(response.json().await?)
    }

    /// `owner/name` runs the latest version, `owner/name:version` pins one.
    async fn create_prediction(&self, model: &str, input: Value) -> Result<Prediction, MemeError> {
        let (endpoint, body) = match model.split_once(':') {
            Some((_, version)) => (
                format!("{}/predictions", self.api_base),
                json!({ "version": version, "input": input }),
            ),
            None => (
                format!("{}/models/{}/predictions", self.api_base, model),
                json!({ "input": input }),
            ),
        };
        let response = self
            .http
            .post(endpoint)
            .bearer_auth(&self.api_token)
            .header("Prefer", &self.prefer)
            .json(&body)
            .send()
            .await?;
        let response = check_status("Replicate", response).await?;
        Ok(response.json().await?)
    }

    /// Runs one model to completion and returns its output URL.
    async fn run(&self, model: &str, input: Value) -> Result<String, MemeError> {
        let prediction = self.create_prediction(model, input).await?;
        match prediction.status.clone() {
            PredictionStatus::Succeeded => prediction.into_url(),
            PredictionStatus::Failed | PredictionStatus::Canceled => Err(prediction.failure()),
            _ if prediction.id.is_empty() => Err(MemeError::MalformedResponse(
                "unfinished prediction without an id".to_string(),
            )),
            _ => self.poll_prediction(&prediction.id, self.max_wait).await,
        }
    }

    async fn generate_with_fallback(&self, prompt: &str) -> Result<String, MemeError> {
        let preview: String = prompt.trim().chars().take(100).collect();
        info!("Generating image with prompt: {}...", preview);

        let err = match self.run(&self.model, primary_input(prompt)).await {
            Ok(url) => {
                info!("Image generated successfully: {}", url);
                return Ok(url);
            }
            Err(err) => err,
        };
        error!("Error generating image with {}: {}", self.model, err);

        info!("Trying fallback model...");
        match self.run(&self.fallback_model, fallback_input(prompt)).await {
            Ok(url) => {
                info!("Fallback model succeeded: {}", url);
                Ok(url)
            }
            Err(fallback_err) => {
                error!("Fallback model also failed: {}", fallback_err);
                Err(fallback_err)
            }
        }
    }
}

impl ImageGenerator for ReplicateClient {
    async fn generate_image(&self, prompt: &str) -> Result<String, MemeError> {
        self.generate_with_fallback(prompt)
            .instrument(self.span.clone())
            .await
    }
}
