//! Vision-model recognizer: send the page image to a VLM and read back text.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient. Exponential backoff
//! (`retry_backoff_ms * 2^attempt`) with a 500 ms base and 3 retries waits
//! 500 ms → 1 s → 2 s before the page is given up and written empty. A
//! single wait never exceeds one minute.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, UnitError};
use crate::pipeline::encode;
use crate::pipeline::recognize::Recognizer;
use crate::prompts::transcription_prompt;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Upper bound for one retry wait.
const MAX_BACKOFF_MS: u64 = 60_000;

/// Wait before retry number `attempt` (1-based).
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    let factor = 1u64
        .checked_shl(attempt.saturating_sub(1))
        .unwrap_or(u64::MAX);
    base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS)
}

/// Default model when a provider is named without one.
pub const DEFAULT_VISION_MODEL: &str = "gpt-4.1-nano";

/// Recognizer backed by any edgequake-llm vision provider.
pub struct VisionRecognizer {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    options: CompletionOptions,
    max_retries: u32,
    retry_backoff_ms: u64,
    call_timeout: Duration,
}

impl VisionRecognizer {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            system_prompt: transcription_prompt(
                config.system_prompt.as_deref(),
                &config.language_code,
            ),
            options: build_options(config),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            call_timeout: Duration::from_secs(config.recognize_timeout_secs),
        }
    }
}

#[async_trait]
impl Recognizer for VisionRecognizer {
    fn name(&self) -> &str {
        "vision"
    }

    /// The request carries the system prompt and one user turn holding only
    /// the page image; the image is the whole question.
    async fn recognize(&self, index: usize, image: &DynamicImage) -> Result<String, UnitError> {
        let start = Instant::now();
        let owned = image.clone();
        let image_data = tokio::task::spawn_blocking(move || encode::encode_page(&owned))
            .await
            .map_err(|e| e.to_string())
            .and_then(|r| r.map_err(|e| e.to_string()))
            .map_err(|e| UnitError::RecognitionFailed {
                index,
                detail: format!("Image encoding failed: {e}"),
            })?;

        let messages = vec![
            ChatMessage::system(&self.system_prompt),
            ChatMessage::user_with_images("", vec![image_data]),
        ];

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.retry_backoff_ms, attempt);
                warn!(
                    "Page {}: retry {}/{} after {}ms",
                    index, attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match timeout(self.call_timeout, self.provider.chat(&messages, Some(&self.options))).await {
                Ok(Ok(response)) => {
                    debug!(
                        "Page {}: {} input tokens, {} output tokens, {:?}",
                        index,
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(response.content);
                }
                Ok(Err(e)) => {
                    let err_msg = format!("{}", e);
                    warn!("Page {}: attempt {} failed: {}", index, attempt + 1, err_msg);
                    last_err = Some(err_msg);
                }
                Err(_) => {
                    warn!(
                        "Page {}: attempt {} timed out after {}s",
                        index,
                        attempt + 1,
                        self.call_timeout.as_secs()
                    );
                    last_err = Some(format!("timed out after {}s", self.call_timeout.as_secs()));
                }
            }
        }

        Err(UnitError::RecognitionFailed {
            index,
            detail: format!(
                "{} retries exhausted: {}",
                self.max_retries,
                last_err.unwrap_or_else(|| "Unknown error".to_string())
            ),
        })
    }
}

/// Build `CompletionOptions` from the pipeline config.
fn build_options(config: &PipelineConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, PipelineError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        PipelineError::RecognizerNotConfigured {
            engine: format!("vision ({provider_name})"),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the vision provider, from most-specific to least-specific:
///
/// 1. a pre-built `config.provider`
/// 2. `config.provider_name` (+ `config.model`)
/// 3. `PAGEWISE_LLM_PROVIDER` + `PAGEWISE_MODEL` when both are set
/// 4. OpenAI when `OPENAI_API_KEY` is present
/// 5. whatever `ProviderFactory::from_env` detects
pub fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, PipelineError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_VISION_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("PAGEWISE_LLM_PROVIDER"),
        std::env::var("PAGEWISE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_VISION_MODEL);
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| PipelineError::RecognizerNotConfigured {
            engine: "vision".to_string(),
            hint: format!(
                "No vision provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
