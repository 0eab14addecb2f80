//! The plan → base image → meme text → overlay pipeline.

use std::fmt;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{Instrument, debug, error, info, info_span};

use crate::error::MemeError;
use crate::gemini::TextGenerator;
use crate::models::{GenerationRequest, MemePlan, MemeText, TextBlock};
use crate::prompts;
use crate::replicate::ImageGenerator;
use crate::store::ImageStore;
use crate::utils::{image_info, log_generation_stats};

/// A step of the pipeline, in the order they run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Ask the text model for a [MemePlan]
    Planning,
    /// Ask the image model for a base image
    BaseImage,
    /// Save the base image locally
    Download,
    /// Ask the text model for overlay text, looking at the base image
    TextGen,
    /// Draw the text onto the image
    Overlay,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Planning => "planning",
            Self::BaseImage => "base image",
            Self::Download => "download",
            Self::TextGen => "meme text",
            Self::Overlay => "text overlay",
        };
        f.write_str(name)
    }
}

/// Why a run stopped.
#[derive(Debug)]
pub struct StageFailure {
    /// 1-based run number within the batch
    pub index: usize,
    /// Where it stopped
    pub stage: Stage,
    /// What went wrong
    pub reason: MemeError,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "meme {}: {} stage failed: {}",
            self.index, self.stage, self.reason
        )
    }
}

impl std::error::Error for StageFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.reason)
    }
}

trait StageResult<T> {
    fn at(self, index: usize, stage: Stage) -> Result<T, StageFailure>;
}

impl<T> StageResult<T> for Result<T, MemeError> {
    fn at(self, index: usize, stage: Stage) -> Result<T, StageFailure> {
        self.map_err(|reason| {
            let failure = StageFailure {
                index,
                stage,
                reason,
            };
            error!("{}", failure);
            failure
        })
    }
}

/// Files left behind by a successful run.
#[derive(Clone, Debug)]
pub struct MemeArtifacts {
    /// The plan the meme was built from
    pub plan: MemePlan,
    /// The overlay text
    pub text_blocks: Vec<TextBlock>,
    /// Image before the text went on
    pub base_image: PathBuf,
    /// The finished meme
    pub final_meme: PathBuf,
}

/// Outcome of a batch of runs.
#[derive(Debug, Default)]
pub struct BatchSummary {
    /// How many memes were asked for
    pub requested: usize,
    /// Finished memes, in order
    pub succeeded: Vec<PathBuf>,
    /// Each failed run, in order
    pub failed: Vec<StageFailure>,
}

impl BatchSummary {
    /// Process exit status: 0 when at least one meme was made, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        u8::from(self.succeeded.is_empty())
    }
}

/// `<dir>/<kind>_<index>_<unixtime>.jpg`
pub fn artifact_path(output_dir: &Path, kind: &str, index: usize, timestamp: i64) -> PathBuf {
    output_dir.join(format!("{kind}_{index}_{timestamp}.jpg"))
}

fn unix_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Runs the whole pipeline for one or more memes.
pub struct MemeGenerator<T, I, S> {
    text: T,
    images: I,
    store: S,
    output_dir: PathBuf,
}

impl<T, I, S> MemeGenerator<T, I, S>
where
    T: TextGenerator,
    I: ImageGenerator,
    S: ImageStore,
{
    /// Wires the clients together; files go under `output_dir`.
    pub fn new(text: T, images: I, store: S, output_dir: impl Into<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        info!(
            "MemeGenerator initialized, writing to {}",
            output_dir.display()
        );
        Self {
            text,
            images,
            store,
            output_dir,
        }
    }

    /// Generates a single meme, stopping at the first stage that fails.
    pub async fn generate_meme(
        &self,
        request: &GenerationRequest,
    ) -> Result<MemeArtifacts, StageFailure> {
        self.run_stages(request)
            .instrument(info_span!("meme", index = request.index))
            .await
    }

    async fn run_stages(&self, request: &GenerationRequest) -> Result<MemeArtifacts, StageFailure> {
        let index = request.index;
        info!("[meme {}] Step 1: Planning meme concept...", index);
        let plan = self.plan_meme(request).await.at(index, Stage::Planning)?;
        info!("[meme {}] Meme plan: {}", index, plan.humor_concept);

        info!("[meme {}] Step 2: Generating base image...", index);
        let image_url = self
            .generate_base_image(&plan)
            .await
            .at(index, Stage::BaseImage)?;
        info!("[meme {}] Base image generated successfully", index);

        let base_image = artifact_path(
            &self.output_dir,
            "base_image",
            index,
            unix_timestamp(),
        );
        let image_bytes = self
            .download_base_image(&image_url, &base_image)
            .await
            .at(index, Stage::Download)?;

        info!("[meme {}] Step 3: Generating meme text...", index);
        let text_blocks = self
            .generate_meme_text(&plan, &image_bytes)
            .await
            .at(index, Stage::TextGen)?;
        info!("[meme {}] Generated {} text blocks", index, text_blocks.len());

        info!("[meme {}] Step 4: Applying text overlay...", index);
        let final_meme = self
            .apply_text_overlay(&image_bytes, &text_blocks, index)
            .await
            .at(index, Stage::Overlay)?;
        info!("[meme {}] Text overlay applied successfully", index);

        info!(
            "[meme {}] Meme generation completed successfully: {}",
            index,
            final_meme.display()
        );
        Ok(MemeArtifacts {
            plan,
            text_blocks,
            base_image,
            final_meme,
        })
    }

    async fn plan_meme(&self, request: &GenerationRequest) -> Result<MemePlan, MemeError> {
        let response = self
            .text
            .generate_json(&prompts::planning_prompt(request), None)
            .await?;
        if !matches!(&response, Value::Object(map) if !map.is_empty()) {
            return Err(MemeError::NoResult(format!(
                "planning returned no plan: {response}"
            )));
        }
        Ok(serde_json::from_value(response)?)
    }

    async fn generate_base_image(&self, plan: &MemePlan) -> Result<String, MemeError> {
        let url = self
            .images
            .generate_image(&prompts::base_image_prompt(plan))
            .await?;
        if url.trim().is_empty() {
            return Err(MemeError::NoResult("image generation returned an empty URL".into()));
        }
        Ok(url)
    }

    /// Saves the base image and reads it back, so later stages work from the local copy.
    async fn download_base_image(&self, url: &str, path: &Path) -> Result<Vec<u8>, MemeError> {
        self.store.save_from_url(url, path).await?;
        Ok(tokio::fs::read(path).await?)
    }

    async fn generate_meme_text(
        &self,
        plan: &MemePlan,
        image: &[u8],
    ) -> Result<Vec<TextBlock>, MemeError> {
        let response = self
            .text
            .generate_json(&prompts::meme_text_prompt(plan), Some(image))
            .await?;
        if response.get("text_blocks").is_none() {
            return Err(MemeError::NoResult(format!(
                "meme text response has no text_blocks: {response}"
            )));
        }
        let text: MemeText = serde_json::from_value(response)?;
        if text.text_blocks.is_empty() {
            return Err(MemeError::NoResult("meme text response has no text blocks".into()));
        }
        Ok(text.text_blocks)
    }

    async fn apply_text_overlay(
        &self,
        image: &[u8],
        blocks: &[TextBlock],
        index: usize,
    ) -> Result<PathBuf, MemeError> {
        let output_path = artifact_path(&self.output_dir, "final_meme", index, unix_timestamp());
        self.text
            .generate_image_with_overlay(
                image,
                &prompts::overlay_prompt(blocks),
                &output_path,
                &self.images,
                &self.store,
            )
            .await?;
        Ok(output_path)
    }

    /// Generates `number` memes one after the other; a failed run doesn't stop the rest.
    pub async fn run_batch(
        &self,
        theme: &str,
        humor_type: &str,
        restrictions: &str,
        number: usize,
    ) -> BatchSummary {
        let mut summary = BatchSummary {
            requested: number,
            ..Default::default()
        };

        for index in 1..=number {
            info!("Generating meme {}/{}...", index, number);
            let request = GenerationRequest {
                theme: theme.to_string(),
                humor_type: humor_type.to_string(),
                restrictions: restrictions.to_string(),
                index,
            };
            match self.generate_meme(&request).await {
                Ok(artifacts) => {
                    match image_info(&artifacts.final_meme) {
                        Ok(details) => info!(
                            "Successfully generated meme: {} ({}x{}, {})",
                            artifacts.final_meme.display(),
                            details.width,
                            details.height,
                            details.size_formatted()
                        ),
                        Err(err) => {
                            debug!(
                                "Couldn't read back {}: {}",
                                artifacts.final_meme.display(),
                                err
                            );
                            info!(
                                "Successfully generated meme: {}",
                                artifacts.final_meme.display()
                            );
                        }
                    }
                    summary.succeeded.push(artifacts.final_meme);
                }
                Err(failure) => {
                    error!("Failed to generate meme {}/{}: {}", index, number, failure);
                    summary.failed.push(failure);
                }
            }
        }

        log_generation_stats(&[
            ("Requested", summary.requested.to_string()),
            ("Succeeded", summary.succeeded.len().to_string()),
            ("Failed", summary.failed.len().to_string()),
            ("Output directory", self.output_dir.display().to_string()),
        ]);
        info!(
            "Meme generation complete! Successfully generated {}/{} memes",
            summary.succeeded.len(),
            summary.requested
        );
        if summary.succeeded.is_empty() {
            error!("No memes were generated successfully");
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockImageGenerator, MockImageStore, MockTextGenerator};

    fn request(index: usize) -> GenerationRequest {
        GenerationRequest {
            theme: "cats".to_string(),
            humor_type: "absurd".to_string(),
            restrictions: String::new(),
            index,
        }
    }

    fn generator(
        text: MockTextGenerator,
        images: MockImageGenerator,
        dir: &Path,
    ) -> MemeGenerator<MockTextGenerator, MockImageGenerator, MockImageStore> {
        MemeGenerator::new(text, images, MockImageStore::writing(), dir)
    }

    #[test]
    fn artifact_names() {
        assert_eq!(
            artifact_path(Path::new("output"), "base_image", 2, 1_700_000_000),
            PathBuf::from("output/base_image_2_1700000000.jpg")
        );
    }

    #[tokio::test]
    async fn happy_path_threads_artifacts_through() {
        let dir = tempfile::tempdir().expect("tempdir");
        let generator = generator(
            MockTextGenerator::default().with_image(Some(b"final".to_vec())),
            MockImageGenerator::default(),
            dir.path(),
        );

        let artifacts = generator.generate_meme(&request(1)).await.expect("meme");

        let base_name = artifacts
            .base_image
            .file_name()
            .and_then(|name| name.to_str())
            .expect("base name");
        assert!(base_name.starts_with("base_image_1_"));
        let final_name = artifacts
            .final_meme
            .file_name()
            .and_then(|name| name.to_str())
            .expect("final name");
        assert!(final_name.starts_with("final_meme_1_"));
        assert!(artifacts.final_meme.exists());
        assert_eq!(artifacts.plan.humor_concept, "cats hate mondays");
        assert_eq!(artifacts.text_blocks.len(), 2);

        let image_prompts = generator.images.prompts();
        assert_eq!(image_prompts.len(), 1);
        assert!(image_prompts[0].contains("a cat at a desk"));

        // the text stage saw the downloaded file's bytes, not the URL
        let attached = generator.text.json_images();
        assert_eq!(attached, vec![None, Some(MockImageStore::DOWNLOADED.to_vec())]);
    }

    #[tokio::test]
    async fn planning_failure_makes_no_image_calls() {
        let dir = tempfile::tempdir().expect("tempdir");
        let generator = generator(
            MockTextGenerator::default().failing_plans(&[1]),
            MockImageGenerator::default(),
            dir.path(),
        );

        let failure = generator
            .generate_meme(&request(1))
            .await
            .expect_err("should fail");

        assert_eq!(failure.stage, Stage::Planning);
        assert_eq!(generator.images.calls(), 0);
        assert!(generator.store.downloads().is_empty());
        assert_eq!(generator.text.json_images(), vec![None]);
        assert_eq!(generator.text.image_calls(), 0);
    }

    #[tokio::test]
    async fn failure_names_its_run_and_stage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let generator = generator(
            MockTextGenerator::default(),
            MockImageGenerator::failing(),
            dir.path(),
        );

        let failure = generator.generate_meme(&request(4)).await.expect_err("fail");
        assert_eq!(failure.index, 4);
        let message = failure.to_string();
        assert!(message.starts_with("meme 4: base image stage failed"), "{message}");
        assert!(message.contains("prediction failed"), "{message}");
    }

    #[tokio::test]
    async fn unreadable_final_image_still_counts_as_success() {
        let dir = tempfile::tempdir().expect("tempdir");
        let generator = generator(
            MockTextGenerator::default().with_image(Some(b"not decodable".to_vec())),
            MockImageGenerator::default(),
            dir.path(),
        );

        let summary = generator.run_batch("cats", "absurd", "", 1).await;
        assert_eq!(summary.succeeded.len(), 1);
        assert!(image_info(&summary.succeeded[0]).is_err());
        assert_eq!(summary.exit_code(), 0);
    }

    #[tokio::test]
    async fn empty_plan_is_a_planning_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let generator = generator(
            MockTextGenerator::default().with_plan(serde_json::json!({})),
            MockImageGenerator::default(),
            dir.path(),
        );

        let failure = generator.generate_meme(&request(1)).await.expect_err("fail");
        assert_eq!(failure.stage, Stage::Planning);
        assert_eq!(generator.images.calls(), 0);
    }

    #[tokio::test]
    async fn base_image_failure_stops_before_download() {
        let dir = tempfile::tempdir().expect("tempdir");
        let generator = generator(
            MockTextGenerator::default(),
            MockImageGenerator::failing(),
            dir.path(),
        );

        let failure = generator.generate_meme(&request(1)).await.expect_err("fail");
        assert_eq!(failure.stage, Stage::BaseImage);
        assert!(generator.store.downloads().is_empty());
        assert_eq!(generator.text.json_images(), vec![None]);
    }

    #[tokio::test]
    async fn download_failure_stops_before_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let generator = MemeGenerator::new(
            MockTextGenerator::default(),
            MockImageGenerator::default(),
            MockImageStore::failing_downloads(),
            dir.path(),
        );

        let failure = generator.generate_meme(&request(1)).await.expect_err("fail");
        assert_eq!(failure.stage, Stage::Download);
        assert_eq!(generator.text.json_images(), vec![None]);
    }

    #[tokio::test]
    async fn no_text_blocks_stops_before_overlay() {
        let dir = tempfile::tempdir().expect("tempdir");
        let generator = generator(
            MockTextGenerator::default().with_meme_text(serde_json::json!({"text_blocks": []})),
            MockImageGenerator::default(),
            dir.path(),
        );

        let failure = generator.generate_meme(&request(1)).await.expect_err("fail");
        assert_eq!(failure.stage, Stage::TextGen);
        assert_eq!(generator.text.image_calls(), 0);
        // base image stays on disk
        assert_eq!(generator.store.downloads().len(), 1);
    }

    #[tokio::test]
    async fn missing_text_blocks_key_fails_text_stage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let generator = generator(
            MockTextGenerator::default().with_meme_text(serde_json::json!({"captions": ["hi"]})),
            MockImageGenerator::default(),
            dir.path(),
        );

        let failure = generator.generate_meme(&request(1)).await.expect_err("fail");
        assert_eq!(failure.stage, Stage::TextGen);
    }

    #[tokio::test]
    async fn overlay_failure_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let generator = MemeGenerator::new(
            MockTextGenerator::default().with_image(None).with_text_error(),
            MockImageGenerator::default(),
            MockImageStore::writing(),
            dir.path(),
        );

        let failure = generator.generate_meme(&request(1)).await.expect_err("fail");
        assert_eq!(failure.stage, Stage::Overlay);
    }

    #[tokio::test]
    async fn batch_continues_after_a_failed_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let generator = generator(
            MockTextGenerator::default()
                .with_image(Some(b"final".to_vec()))
                .failing_plans(&[2]),
            MockImageGenerator::default(),
            dir.path(),
        );

        let summary = generator.run_batch("cats", "absurd", "", 3).await;

        assert_eq!(summary.requested, 3);
        assert_eq!(summary.succeeded.len(), 2);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].index, 2);
        assert_eq!(summary.failed[0].stage, Stage::Planning);
        assert_eq!(summary.exit_code(), 0);
        // runs 1 and 3 each made exactly one base image call
        assert_eq!(generator.images.calls(), 2);
    }

    #[tokio::test]
    async fn batch_with_no_successes_exits_nonzero() {
        let dir = tempfile::tempdir().expect("tempdir");
        let generator = generator(
            MockTextGenerator::default().failing_plans(&[1, 2]),
            MockImageGenerator::default(),
            dir.path(),
        );

        let summary = generator.run_batch("cats", "absurd", "", 2).await;
        assert!(summary.succeeded.is_empty());
        assert_eq!(summary.exit_code(), 1);
    }
}
