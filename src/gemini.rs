//! Text generation (and image-conditioned generation) against the Gemini REST API.

use std::future::Future;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use crate::config::ApiEndpoints;
use crate::constants::API_TIMEOUT;
use crate::error::{MemeError, check_status};
use crate::prompts;
use crate::replicate::ImageGenerator;
use crate::store::ImageStore;

/// A language model that can answer with JSON, text or an image.
pub trait TextGenerator {
    /// Asks for a JSON answer, optionally about an attached JPEG.
    fn generate_json(
        &self,
        prompt: &str,
        image: Option<&[u8]>,
    ) -> impl Future<Output = Result<Value, MemeError>>;

    /// Asks for a plain text answer, optionally about an attached JPEG.
    fn generate_text(
        &self,
        prompt: &str,
        image: Option<&[u8]>,
    ) -> impl Future<Output = Result<String, MemeError>>;

    /// Asks an image-capable model for a picture. `Ok(None)` means it answered without one.
    fn generate_image(
        &self,
        prompt: &str,
        image: Option<&[u8]>,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, MemeError>>;

    /// Redraws `image` with the meme text described by `prompt` and writes it to `output_path`.
    ///
    /// If the model won't return image bytes, it's asked for a detailed regeneration prompt
    /// instead, which goes to `images`, and the result is downloaded via `store`.
    fn generate_image_with_overlay<G: ImageGenerator, S: ImageStore>(
        &self,
        image: &[u8],
        prompt: &str,
        output_path: &Path,
        images: &G,
        store: &S,
    ) -> impl Future<Output = Result<(), MemeError>> {
        async move {
            let request = prompts::recreate_with_text_prompt(prompt);
            match self.generate_image(&request, Some(image)).await {
                Ok(Some(bytes)) => match store.save_bytes(&bytes, output_path).await {
                    Ok(()) => {
                        info!("Meme with text overlay saved to {}", output_path.display());
                        return Ok(());
                    }
                    Err(err) => warn!("Couldn't use image returned by the model: {}", err),
                },
                Ok(None) => warn!("Image model returned no image data"),
                Err(err) => warn!("Image generation model failed: {}", err),
            }

            info!("Falling back to prompt regeneration + image model");
            let regeneration = self
                .generate_text(&prompts::regeneration_prompt(prompt), Some(image))
                .await?;
            let url = images.generate_image(&regeneration).await?;
            store.save_from_url(&url, output_path).await?;
            info!("Fallback meme generation successful: {}", output_path.display());
            Ok(())
        }
    }
}

// -----------------------------
// generateContent wire types
// -----------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, alias = "inline_data")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default, alias = "mime_type")]
    mime_type: Option<String>,
    #[serde(default)]
    data: String,
}

impl GenerateContentResponse {
    fn first_parts(&self) -> &[Part] {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| content.parts.as_slice())
            .unwrap_or_default()
    }

    /// All text parts of the first candidate, concatenated.
    fn text(&self) -> Result<String, MemeError> {
        if self.candidates.is_empty() {
            let reason = self
                .prompt_feedback
                .as_ref()
                .and_then(|feedback| feedback.block_reason.clone())
                .unwrap_or_else(|| "no candidates".to_string());
            return Err(MemeError::NoResult(format!("Gemini returned nothing: {reason}")));
        }
        let text: String = self
            .first_parts()
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect();
        if text.trim().is_empty() {
            return Err(MemeError::NoResult("Gemini response has no text".to_string()));
        }
        Ok(text)
    }

    /// First inline image of the first candidate, base64-decoded.
    fn image_bytes(&self) -> Result<Option<Vec<u8>>, MemeError> {
        for part in self.first_parts() {
            if let Some(inline) = part.inline_data.as_ref()
                && !inline.data.is_empty()
            {
                debug!("Got inline image ({:?})", inline.mime_type);
                let bytes = general_purpose::STANDARD
                    .decode(&inline.data)
                    .map_err(|err| {
                        MemeError::MalformedResponse(format!("bad base64 image data: {err}"))
                    })?;
                return Ok(Some(bytes));
            } else if let Some(text) = part.text.as_deref() {
                info!("Gemini response: {}", text);
            }
        }
        Ok(None)
    }
}

/// Parses a model's JSON answer, falling back to whatever sits between the first `{` and the last `}`.
pub fn parse_json_lenient(text: &str) -> Result<Value, MemeError> {
    match serde_json::from_str(text) {
        Ok(value) => Ok(value),
        Err(err) => {
            error!("Failed to parse JSON response: {}", err);
            salvage_json(text).ok_or_else(|| {
                MemeError::MalformedResponse(format!("no JSON object found in response: {err}"))
            })
        }
    }
}

fn salvage_json(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

fn request_contents(prompt: &str, image: Option<&[u8]>) -> Value {
    let mut parts = Vec::with_capacity(2);
    if let Some(bytes) = image {
        parts.push(json!({
            "inlineData": {
                "mimeType": "image/jpeg",
                "data": general_purpose::STANDARD.encode(bytes),
            }
        }));
    }
    parts.push(json!({ "text": prompt }));
    json!([{ "role": "user", "parts": parts }])
}

/// [TextGenerator] backed by Gemini.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
    text_model: String,
    overlay_model: String,
    span: Span,
}

impl GeminiClient {
    /// Builds a client; nothing is sent until the first call.
    pub fn new(api_key: &str, endpoints: &ApiEndpoints, span: Span) -> Result<Self, MemeError> {
        let http = reqwest::Client::builder().timeout(API_TIMEOUT).build()?;
        let client = Self {
            http,
            api_key: api_key.to_string(),
            api_base: endpoints.gemini_api_base.trim_end_matches('/').to_string(),
            text_model: endpoints.text_model.clone(),
            overlay_model: endpoints.overlay_model.clone(),
            span,
        };
        client.span.in_scope(|| info!("Gemini client initialized successfully"));
        Ok(client)
    }

    /// Client with the default `gemini` span
    pub fn with_default_span(api_key: &str, endpoints: &ApiEndpoints) -> Result<Self, MemeError> {
        Self::new(api_key, endpoints, info_span!("gemini"))
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let model = model.trim().trim_start_matches("models/");
        format!("{}/models/{}:generateContent", self.api_base, model)
    }

    async fn generate_content(
        &self,
        model: &str,
        prompt: &str,
        image: Option<&[u8]>,
        generation_config: Option<Value>,
    ) -> Result<GenerateContentResponse, MemeError> {
        let mut body = json!({ "contents": request_contents(prompt, image) });
        if let Some(config) = generation_config {
            body["generationConfig"] = config;
        }

        let response = self
            .http
            .post(self.endpoint_for_model(model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let response = check_status("Gemini", response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|err| {
            MemeError::MalformedResponse(format!("failed to parse generateContent JSON: {err}"))
        })
    }

    async fn json_response(&self, prompt: &str, image: Option<&[u8]>) -> Result<Value, MemeError> {
        let response = self
            .generate_content(
                &self.text_model,
                prompt,
                image,
                Some(json!({ "responseMimeType": "application/json" })),
            )
            .await?;
        parse_json_lenient(&response.text()?)
    }

    async fn text_response(&self, prompt: &str, image: Option<&[u8]>) -> Result<String, MemeError> {
        self.generate_content(&self.text_model, prompt, image, None)
            .await?
            .text()
    }

    async fn image_response(
        &self,
        prompt: &str,
        image: Option<&[u8]>,
    ) -> Result<Option<Vec<u8>>, MemeError> {
        self.generate_content(
            &self.overlay_model,
            prompt,
            image,
            Some(json!({ "responseModalities": ["TEXT", "IMAGE"] })),
        )
        .await?
        .image_bytes()
    }
}

impl TextGenerator for GeminiClient {
    async fn generate_json(&self, prompt: &str, image: Option<&[u8]>) -> Result<Value, MemeError> {
        self.json_response(prompt, image)
            .instrument(self.span.clone())
            .await
            .inspect_err(|err| {
                let _enter = self.span.enter();
                error!("Error generating JSON response: {}", err);
            })
    }

    async fn generate_text(&self, prompt: &str, image: Option<&[u8]>) -> Result<String, MemeError> {
        self.text_response(prompt, image)
            .instrument(self.span.clone())
            .await
            .inspect_err(|err| {
                let _enter = self.span.enter();
                error!("Error generating text response: {}", err);
            })
    }

    async fn generate_image(
        &self,
        prompt: &str,
        image: Option<&[u8]>,
    ) -> Result<Option<Vec<u8>>, MemeError> {
        self.image_response(prompt, image)
            .instrument(self.span.clone())
            .await
    }
}
