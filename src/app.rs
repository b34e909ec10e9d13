//! Application orchestration for style-referenced generation and edits.

use crate::ai::{GeminiImageClient, ImageGenerationService, InlineImage};
use crate::fetch::{FallbackFetcher, ImageFetcher};
use crate::image::{blob_from_data_url, normalize, to_data_url, LetterboxLayout};
use crate::jobs::{InMemoryJobStore, Job, JobRepository, JobStatus, JobUpdate};
use crate::models::{AspectRatio, Config, ImageBlob};
use crate::{Error, Result};
use std::time::Duration;
use tokio_retry::{strategy::FixedInterval, RetryIf};
use tracing::{error, info, warn};

const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Inputs for one style-referenced generation.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub sref_url: String,
    pub aspect_ratio: String,
}

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub job: Job,
    pub image: ImageBlob,
    /// How the style reference was letterboxed before upload.
    pub reference_layout: LetterboxLayout,
}

struct Generated {
    image: ImageBlob,
    data_url: String,
    reference_layout: LetterboxLayout,
}

/// Coordinates reference fetching, normalization, generation and job tracking.
pub struct Studio {
    fetcher: Box<dyn ImageFetcher>,
    generator: Box<dyn ImageGenerationService>,
    jobs: Box<dyn JobRepository>,
    generation_attempts: usize,
    retry_interval: Duration,
}

/// Injectable service bundle used to construct [`Studio`] in tests/harnesses.
pub struct StudioServices {
    pub fetcher: Box<dyn ImageFetcher>,
    pub generator: Box<dyn ImageGenerationService>,
    pub jobs: Box<dyn JobRepository>,
}

impl Studio {
    /// Build a studio from concrete service dependencies.
    ///
    /// Generation API calls are attempted once; see [`Studio::with_retry_policy`].
    pub fn with_services(services: StudioServices) -> Self {
        Self {
            fetcher: services.fetcher,
            generator: services.generator,
            jobs: services.jobs,
            generation_attempts: 1,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    /// Construct a studio from environment-derived configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        // Reuse one HTTP connection pool for proxies and Gemini.
        let http_client = reqwest::Client::new();

        let fetcher = FallbackFetcher::from_templates(&config.proxies, http_client.clone())?;
        info!(
            "Reference fetcher configured with {} proxies",
            fetcher.proxies().len()
        );

        info!("Image provider: Gemini (model: {})", config.image_model);
        let generator = GeminiImageClient::new_with_client(
            config.api_key.clone(),
            config.image_model.clone(),
            http_client,
        );

        Ok(Self::with_services(StudioServices {
            fetcher: Box::new(fetcher),
            generator: Box::new(generator),
            jobs: Box::new(InMemoryJobStore::new()),
        })
        .with_retry_policy(config.generation_attempts, DEFAULT_RETRY_INTERVAL))
    }

    /// Total attempts for each generation API call (minimum 1).
    pub fn with_retry_policy(mut self, attempts: usize, interval: Duration) -> Self {
        self.generation_attempts = attempts.max(1);
        self.retry_interval = interval;
        self
    }

    /// Generate an image of `request.prompt` in the style of the referenced image.
    ///
    /// Inputs are validated before any network or image work. Once a job is
    /// recorded it always ends `Completed` or `Failed`.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutcome> {
        let (sref_url, ratio) = validate_request(request)?;

        let job = self.jobs.submit_job(&request.prompt, sref_url).await?;
        info!("[{}] Generating at {} from {}", job.id, ratio, sref_url);

        match self.process(&job.id, &request.prompt, sref_url, ratio).await {
            Ok((job, generated)) => {
                info!("[{}] Generation completed", job.id);
                Ok(GenerationOutcome {
                    job,
                    image: generated.image,
                    reference_layout: generated.reference_layout,
                })
            }
            Err(e) => {
                error!("[{}] Generation failed: {}", job.id, e);
                let update = JobUpdate {
                    result_image_url: None,
                    error: Some(e.to_string()),
                };
                if let Err(update_err) = self
                    .jobs
                    .update_status(&job.id, JobStatus::Failed, update)
                    .await
                {
                    warn!("[{}] Could not record failure: {}", job.id, update_err);
                }
                Err(e)
            }
        }
    }

    /// Moves a submitted job through `Processing` to `Completed`.
    async fn process(
        &self,
        job_id: &str,
        prompt: &str,
        sref_url: &str,
        ratio: AspectRatio,
    ) -> Result<(Job, Generated)> {
        self.jobs
            .update_status(job_id, JobStatus::Processing, JobUpdate::default())
            .await?;

        let generated = self.run_pipeline(prompt, sref_url, ratio).await?;
        let job = self
            .jobs
            .update_status(
                job_id,
                JobStatus::Completed,
                JobUpdate {
                    result_image_url: Some(generated.data_url.clone()),
                    error: None,
                },
            )
            .await?;

        Ok((job, generated))
    }

    async fn run_pipeline(
        &self,
        prompt: &str,
        sref_url: &str,
        ratio: AspectRatio,
    ) -> Result<Generated> {
        let reference = self.fetcher.fetch_image(sref_url).await?;

        let normalized = normalize(reference, ratio).await?;
        info!(
            "Reference letterboxed to {}x{} ({})",
            normalized.layout.canvas_width,
            normalized.layout.canvas_height,
            normalized.blob.mime_type
        );

        let style = InlineImage::from_blob(&normalized.blob)?;
        let image = self
            .call_generator("generate", || self.generator.generate_styled(prompt, &style))
            .await?;

        Ok(Generated {
            data_url: to_data_url(&image)?,
            image,
            reference_layout: normalized.layout,
        })
    }

    /// Composite `overlay` into `base` following `instruction`.
    pub async fn edit(
        &self,
        base: &ImageBlob,
        overlay: &ImageBlob,
        instruction: &str,
    ) -> Result<ImageBlob> {
        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(Error::InvalidInput(
                "an edit instruction is required".to_string(),
            ));
        }

        let base = InlineImage::from_blob(base)?;
        let overlay = InlineImage::from_blob(overlay)?;

        info!("Editing image ({} + {})", base.mime_type, overlay.mime_type);
        self.call_generator("edit", || {
            self.generator.edit_image(&base, &overlay, instruction)
        })
        .await
    }

    /// Edit the image produced by a completed job.
    pub async fn edit_job_result(
        &self,
        job_id: &str,
        overlay: &ImageBlob,
        instruction: &str,
    ) -> Result<ImageBlob> {
        let job = self.jobs.get_job_status(job_id).await?;
        let result_url = match (job.status, job.result_image_url) {
            (JobStatus::Completed, Some(url)) => url,
            (status, _) => {
                return Err(Error::InvalidInput(format!(
                    "job {} has no generated image to edit (status {})",
                    job_id, status
                )))
            }
        };

        let base = blob_from_data_url(&result_url)?;
        self.edit(&base, overlay, instruction).await
    }

    async fn call_generator<F, Fut>(&self, label: &str, mut action: F) -> Result<ImageBlob>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<ImageBlob>>,
    {
        let strategy = FixedInterval::new(self.retry_interval).take(self.generation_attempts - 1);

        RetryIf::spawn(
            strategy,
            || {
                let attempt = action();
                async move {
                    attempt.await.map_err(|e| {
                        warn!("[{}] Generation API call failed: {}", label, e);
                        e
                    })
                }
            },
            is_retryable,
        )
        .await
    }
}

/// Errors worth another attempt against the generation API.
fn is_retryable(error: &Error) -> bool {
    matches!(error, Error::AiProvider(_) | Error::Http(_))
}

/// Checks the request and returns the trimmed sref URL with the parsed ratio.
fn validate_request(request: &GenerationRequest) -> Result<(&str, AspectRatio)> {
    let sref_url = request.sref_url.trim();
    if request.prompt.trim().is_empty() || sref_url.is_empty() {
        return Err(Error::InvalidInput(
            "both a prompt and an sref URL are required".to_string(),
        ));
    }

    let url = reqwest::Url::parse(sref_url).map_err(|_| {
        Error::InvalidInput(format!(
            "'{}' is not a valid URL; use a full address starting with http:// or https://",
            request.sref_url
        ))
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::InvalidInput(format!(
            "'{}' must use http:// or https://",
            request.sref_url
        )));
    }

    Ok((sref_url, request.aspect_ratio.parse()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::mock::RecordedRequest;
    use crate::ai::MockImageGenerationClient;
    use crate::fetch::MockImageFetcher;
    use std::sync::Arc;

    fn request(ratio: &str) -> GenerationRequest {
        GenerationRequest {
            prompt: "a lighthouse at dusk".to_string(),
            sref_url: "https://images.example.com/style.png".to_string(),
            aspect_ratio: ratio.to_string(),
        }
    }

    fn png(width: u32, height: u32) -> ImageBlob {
        let img = ::image::RgbaImage::from_pixel(width, height, ::image::Rgba([10, 20, 30, 255]));
        let mut bytes = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut bytes),
            ::image::ImageFormat::Png,
        )
        .unwrap();
        ImageBlob::new(bytes, "image/png")
    }

    /// Shares the mocks between the studio and the test body.
    struct Harness {
        studio: Studio,
        fetcher: Arc<MockImageFetcher>,
        generator: Arc<MockImageGenerationClient>,
        jobs: InMemoryJobStore,
    }

    struct SharedFetcher(Arc<MockImageFetcher>);
    struct SharedGenerator(Arc<MockImageGenerationClient>);

    #[async_trait::async_trait]
    impl ImageFetcher for SharedFetcher {
        async fn fetch_image(&self, url: &str) -> Result<ImageBlob> {
            self.0.fetch_image(url).await
        }
    }

    #[async_trait::async_trait]
    impl ImageGenerationService for SharedGenerator {
        async fn generate_styled(&self, prompt: &str, style: &InlineImage) -> Result<ImageBlob> {
            self.0.generate_styled(prompt, style).await
        }

        async fn edit_image(
            &self,
            base: &InlineImage,
            overlay: &InlineImage,
            instruction: &str,
        ) -> Result<ImageBlob> {
            self.0.edit_image(base, overlay, instruction).await
        }
    }

    fn harness(fetcher: MockImageFetcher, generator: MockImageGenerationClient) -> Harness {
        let fetcher = Arc::new(fetcher);
        let generator = Arc::new(generator);
        let jobs = InMemoryJobStore::new();

        let studio = Studio::with_services(StudioServices {
            fetcher: Box::new(SharedFetcher(fetcher.clone())),
            generator: Box::new(SharedGenerator(generator.clone())),
            jobs: Box::new(jobs.clone()),
        });

        Harness {
            studio,
            fetcher,
            generator,
            jobs,
        }
    }

    #[tokio::test]
    async fn test_generate_runs_full_pipeline() {
        let h = harness(
            MockImageFetcher::new().with_response(png(800, 800)),
            MockImageGenerationClient::new(),
        );

        let outcome = h.studio.generate(&request("16:9")).await.unwrap();

        assert_eq!(outcome.job.status, JobStatus::Completed);
        assert_eq!(outcome.reference_layout.canvas_width, 1422);
        assert_eq!(outcome.reference_layout.canvas_height, 800);
        assert!(outcome
            .job
            .result_image_url
            .as_deref()
            .unwrap()
            .starts_with("data:image/png;base64,"));

        match &h.generator.get_requests()[0] {
            RecordedRequest::Styled { prompt, style } => {
                assert_eq!(prompt, "a lighthouse at dusk");
                assert_eq!(style.mime_type, "image/png");
                let sent = crate::image::from_base64(&style.data).unwrap();
                let decoded = ::image::load_from_memory(&sent).unwrap();
                assert_eq!((decoded.width(), decoded.height()), (1422, 800));
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_ratio_rejected_before_fetch() {
        let h = harness(
            MockImageFetcher::new().with_response(png(10, 10)),
            MockImageGenerationClient::new(),
        );

        let err = h.studio.generate(&request("abc")).await.unwrap_err();

        assert!(matches!(err, Error::InvalidRatio(_)));
        assert_eq!(h.fetcher.get_fetch_count(), 0);
        assert_eq!(h.generator.get_call_count(), 0);
        assert!(h.jobs.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_url_rejected_before_fetch() {
        let h = harness(MockImageFetcher::new(), MockImageGenerationClient::new());

        let mut req = request("1:1");
        req.sref_url = "not a url".to_string();
        let err = h.studio.generate(&req).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        req.sref_url = "ftp://example.com/a.png".to_string();
        let err = h.studio.generate(&req).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        assert_eq!(h.fetcher.get_fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected() {
        let h = harness(MockImageFetcher::new(), MockImageGenerationClient::new());

        let mut req = request("1:1");
        req.prompt = "   ".to_string();
        assert!(matches!(
            h.studio.generate(&req).await.unwrap_err(),
            Error::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn test_fetch_failure_marks_job_failed() {
        let h = harness(MockImageFetcher::new(), MockImageGenerationClient::new());

        let err = h.studio.generate(&request("1:1")).await.unwrap_err();
        assert!(matches!(err, Error::Fetch(_)));
        assert_eq!(h.generator.get_call_count(), 0);

        assert_eq!(h.jobs.len(), 1);
        let fetcher_urls = h.fetcher.get_requested_urls();
        assert_eq!(fetcher_urls, vec!["https://images.example.com/style.png"]);
    }

    #[tokio::test]
    async fn test_undecodable_reference_is_decode_error() {
        let h = harness(
            MockImageFetcher::new()
                .with_response(ImageBlob::new(b"<html>".to_vec(), "image/png")),
            MockImageGenerationClient::new(),
        );

        let err = h.studio.generate(&request("1:1")).await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert_eq!(h.generator.get_call_count(), 0);
    }

    #[tokio::test]
    async fn test_generation_not_retried_by_default() {
        let h = harness(
            MockImageFetcher::new().with_response(png(4, 4)),
            MockImageGenerationClient::new().with_failures(1),
        );

        assert!(h.studio.generate(&request("1:1")).await.is_err());
        assert_eq!(h.generator.get_call_count(), 1);
    }

    #[tokio::test]
    async fn test_generation_retry_policy() {
        let mut h = harness(
            MockImageFetcher::new().with_response(png(4, 4)),
            MockImageGenerationClient::new().with_failures(1),
        );
        h.studio = h.studio.with_retry_policy(2, Duration::from_millis(1));

        let outcome = h.studio.generate(&request("1:1")).await.unwrap();
        assert_eq!(outcome.job.status, JobStatus::Completed);
        assert_eq!(h.generator.get_call_count(), 2);
        assert_eq!(h.fetcher.get_fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_edit_sends_both_images() {
        let h = harness(MockImageFetcher::new(), MockImageGenerationClient::new());
        let base = ImageBlob::new(vec![1, 2, 3], "image/png");
        let overlay = ImageBlob::new(vec![4, 5, 6], "image/jpeg");

        h.studio
            .edit(&base, &overlay, "  place the hat on the dog ")
            .await
            .unwrap();

        match &h.generator.get_requests()[0] {
            RecordedRequest::Edit {
                base,
                overlay,
                instruction,
            } => {
                assert_eq!(base.data, "AQID");
                assert_eq!(overlay.mime_type, "image/jpeg");
                assert_eq!(instruction, "place the hat on the dog");
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_edit_requires_instruction() {
        let h = harness(MockImageFetcher::new(), MockImageGenerationClient::new());
        let blob = ImageBlob::new(vec![1], "image/png");

        let err = h.studio.edit(&blob, &blob, "").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(h.generator.get_call_count(), 0);
    }

    #[tokio::test]
    async fn test_edit_job_result_uses_generated_image() {
        let generated = ImageBlob::new(vec![9, 9, 9], "image/webp");
        let h = harness(
            MockImageFetcher::new().with_response(png(4, 4)),
            MockImageGenerationClient::new().with_image_response(generated),
        );

        let outcome = h.studio.generate(&request("1:1")).await.unwrap();
        let overlay = ImageBlob::new(vec![1], "image/png");
        h.studio
            .edit_job_result(&outcome.job.id, &overlay, "add a moon")
            .await
            .unwrap();

        match &h.generator.get_requests()[1] {
            RecordedRequest::Edit { base, .. } => {
                assert_eq!(base.mime_type, "image/webp");
                assert_eq!(base.data, "CQkJ");
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_edit_job_result_requires_completed_job() {
        let h = harness(MockImageFetcher::new(), MockImageGenerationClient::new());

        let pending = h.jobs.submit_job("x", "https://a.com").await.unwrap();
        let overlay = ImageBlob::new(vec![1], "image/png");
        let err = h
            .studio
            .edit_job_result(&pending.id, &overlay, "add a moon")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = h
            .studio
            .edit_job_result("job_missing", &overlay, "add a moon")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::JobNotFound(_)));
    }

    #[tokio::test]
    async fn test_sref_url_is_trimmed_before_fetch() {
        let h = harness(
            MockImageFetcher::new().with_response(png(4, 4)),
            MockImageGenerationClient::new(),
        );

        let mut req = request("1:1");
        req.sref_url = "  https://images.example.com/style.png \n".to_string();
        let outcome = h.studio.generate(&req).await.unwrap();

        assert_eq!(
            h.fetcher.get_requested_urls(),
            vec!["https://images.example.com/style.png"]
        );
        assert_eq!(outcome.job.sref_url, "https://images.example.com/style.png");
    }

    /// Job store that refuses to record completions.
    struct RejectingCompletion {
        inner: InMemoryJobStore,
        submitted: Arc<std::sync::Mutex<Vec<String>>>,
    }

    #[async_trait::async_trait]
    impl JobRepository for RejectingCompletion {
        async fn submit_job(&self, prompt: &str, sref_url: &str) -> Result<Job> {
            let job = self.inner.submit_job(prompt, sref_url).await?;
            self.submitted.lock().unwrap().push(job.id.clone());
            Ok(job)
        }

        async fn get_job_status(&self, id: &str) -> Result<Job> {
            self.inner.get_job_status(id).await
        }

        async fn update_status(
            &self,
            id: &str,
            status: JobStatus,
            update: JobUpdate,
        ) -> Result<Job> {
            if status == JobStatus::Completed {
                return Err(Error::InvalidInput("store unavailable".to_string()));
            }
            self.inner.update_status(id, status, update).await
        }
    }

    #[tokio::test]
    async fn test_unrecorded_completion_marks_job_failed() {
        let jobs = InMemoryJobStore::new();
        let submitted = Arc::new(std::sync::Mutex::new(Vec::new()));
        let studio = Studio::with_services(StudioServices {
            fetcher: Box::new(MockImageFetcher::new().with_response(png(4, 4))),
            generator: Box::new(MockImageGenerationClient::new()),
            jobs: Box::new(RejectingCompletion {
                inner: jobs.clone(),
                submitted: submitted.clone(),
            }),
        });

        let err = studio.generate(&request("1:1")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let ids = submitted.lock().unwrap().clone();
        assert_eq!(ids.len(), 1);
        let job = jobs.get_job_status(&ids[0]).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("store unavailable"));
    }
}
