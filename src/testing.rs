//! In-memory stand-ins for the API clients and the image store.

use std::cell::{Cell, RefCell};
use std::path::Path;

use serde_json::{Value, json};

use crate::error::MemeError;
use crate::gemini::TextGenerator;
use crate::replicate::ImageGenerator;
use crate::store::ImageStore;

/// Answers planning calls (no image attached) with `plan` and meme text calls with `meme_text`.
pub(crate) struct MockTextGenerator {
    plan: Value,
    meme_text: Value,
    failing_plans: Vec<usize>,
    text: Option<String>,
    image: Option<Vec<u8>>,
    image_error: bool,
    planning_calls: Cell<usize>,
    json_images: RefCell<Vec<Option<Vec<u8>>>>,
    text_calls: Cell<usize>,
    image_calls: Cell<usize>,
}

impl Default for MockTextGenerator {
    fn default() -> Self {
        Self {
            plan: json!({
                "visual_concept": "a cat at a desk glaring at a calendar",
                "visual_elements": ["cat", "desk", "calendar"],
                "mood": "grumpy",
                "style": "photo",
                "text_blocks_needed": 2,
                "humor_concept": "cats hate mondays",
            }),
            meme_text: json!({
                "text_blocks": [
                    {"text": "IT'S MONDAY", "position": "top"},
                    {"text": "AGAIN", "position": "bottom", "color": "yellow"},
                ]
            }),
            failing_plans: Vec::new(),
            text: Some("regenerated meme prompt".to_string()),
            image: None,
            image_error: false,
            planning_calls: Cell::new(0),
            json_images: RefCell::new(Vec::new()),
            text_calls: Cell::new(0),
            image_calls: Cell::new(0),
        }
    }
}

impl MockTextGenerator {
    pub(crate) fn with_plan(mut self, plan: Value) -> Self {
        self.plan = plan;
        self
    }

    pub(crate) fn with_meme_text(mut self, meme_text: Value) -> Self {
        self.meme_text = meme_text;
        self
    }

    /// Planning calls with these 1-based call numbers fail.
    pub(crate) fn failing_plans(mut self, calls: &[usize]) -> Self {
        self.failing_plans = calls.to_vec();
        self
    }

    pub(crate) fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub(crate) fn with_text_error(mut self) -> Self {
        self.text = None;
        self
    }

    pub(crate) fn with_image(mut self, image: Option<Vec<u8>>) -> Self {
        self.image = image;
        self.image_error = false;
        self
    }

    pub(crate) fn with_image_error(mut self) -> Self {
        self.image_error = true;
        self
    }

    /// The image attached to each JSON call, in order.
    pub(crate) fn json_images(&self) -> Vec<Option<Vec<u8>>> {
        self.json_images.borrow().clone()
    }

    pub(crate) fn text_calls(&self) -> usize {
        self.text_calls.get()
    }

    pub(crate) fn image_calls(&self) -> usize {
        self.image_calls.get()
    }
}

impl TextGenerator for MockTextGenerator {
    async fn generate_json(&self, _prompt: &str, image: Option<&[u8]>) -> Result<Value, MemeError> {
        self.json_images.borrow_mut().push(image.map(<[u8]>::to_vec));
        if image.is_some() {
            return Ok(self.meme_text.clone());
        }
        let call = self.planning_calls.get() + 1;
        self.planning_calls.set(call);
        if self.failing_plans.contains(&call) {
            return Err(MemeError::MalformedResponse(format!(
                "planning call {call} returned garbage"
            )));
        }
        Ok(self.plan.clone())
    }

    async fn generate_text(&self, _prompt: &str, _image: Option<&[u8]>) -> Result<String, MemeError> {
        self.text_calls.set(self.text_calls.get() + 1);
        self.text
            .clone()
            .ok_or_else(|| MemeError::NoResult("no text".to_string()))
    }

    async fn generate_image(
        &self,
        _prompt: &str,
        _image: Option<&[u8]>,
    ) -> Result<Option<Vec<u8>>, MemeError> {
        self.image_calls.set(self.image_calls.get() + 1);
        if self.image_error {
            return Err(MemeError::Api {
                service: "Gemini",
                status: 500,
                body: "overloaded".to_string(),
            });
        }
        Ok(self.image.clone())
    }
}

/// Hands out a fixed URL, or fails every time.
pub(crate) struct MockImageGenerator {
    url: Option<String>,
    prompts: RefCell<Vec<String>>,
}

impl Default for MockImageGenerator {
    fn default() -> Self {
        Self {
            url: Some("https://images.test/generated.jpg".to_string()),
            prompts: RefCell::new(Vec::new()),
        }
    }
}

impl MockImageGenerator {
    pub(crate) fn failing() -> Self {
        Self {
            url: None,
            ..Default::default()
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.prompts.borrow().len()
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl ImageGenerator for MockImageGenerator {
    async fn generate_image(&self, prompt: &str) -> Result<String, MemeError> {
        self.prompts.borrow_mut().push(prompt.to_string());
        self.url.clone().ok_or_else(|| {
            MemeError::Api {
                service: "Replicate",
                status: 422,
                body: "prediction failed".to_string(),
            }
        })
    }
}

/// Records saves. Only touches the filesystem when built with [MockImageStore::writing].
#[derive(Default)]
pub(crate) struct MockImageStore {
    write_files: bool,
    fail_downloads: bool,
    reject_bytes: bool,
    saved_bytes: RefCell<Vec<String>>,
    downloads: RefCell<Vec<(String, String)>>,
}

impl MockImageStore {
    /// What a "downloaded" file contains.
    pub(crate) const DOWNLOADED: &'static [u8] = b"downloaded image";

    pub(crate) fn writing() -> Self {
        Self {
            write_files: true,
            ..Default::default()
        }
    }

    pub(crate) fn failing_downloads() -> Self {
        Self {
            write_files: true,
            fail_downloads: true,
            ..Default::default()
        }
    }

    /// `save_bytes` refuses everything, as if the bytes weren't an image.
    pub(crate) fn rejecting_bytes() -> Self {
        Self {
            reject_bytes: true,
            ..Default::default()
        }
    }

    /// Paths successfully passed to `save_bytes`.
    pub(crate) fn saved_bytes(&self) -> Vec<String> {
        self.saved_bytes.borrow().clone()
    }

    /// `(url, path)` pairs passed to `save_from_url`.
    pub(crate) fn downloads(&self) -> Vec<(String, String)> {
        self.downloads.borrow().clone()
    }

    async fn write(&self, bytes: &[u8], path: &Path) -> Result<(), MemeError> {
        if !self.write_files {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }
}

impl ImageStore for MockImageStore {
    async fn save_from_url(&self, url: &str, path: &Path) -> Result<(), MemeError> {
        if self.fail_downloads {
            return Err(MemeError::Api {
                service: "image download",
                status: 404,
                body: "not found".to_string(),
            });
        }
        self.write(Self::DOWNLOADED, path).await?;
        self.downloads
            .borrow_mut()
            .push((url.to_string(), path.display().to_string()));
        Ok(())
    }

    async fn save_bytes(&self, bytes: &[u8], path: &Path) -> Result<(), MemeError> {
        if self.reject_bytes {
            return Err(MemeError::MalformedResponse(format!(
                "{} bytes are not an image",
                bytes.len()
            )));
        }
        self.write(bytes, path).await?;
        self.saved_bytes
            .borrow_mut()
            .push(path.display().to_string());
        Ok(())
    }
}
