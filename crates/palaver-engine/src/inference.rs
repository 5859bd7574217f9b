//! Contract of the downstream generation service.

use async_trait::async_trait;
use palaver_common::Result;
use palaver_store::SettingsRecord;

/// One text generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Fully composed prompt.
    pub prompt: String,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
}

impl GenerationRequest {
    /// A request using the model and temperature of `settings`.
    pub fn for_settings(prompt: String, settings: &SettingsRecord) -> Self {
        Self {
            prompt,
            model: settings.current_model.clone(),
            temperature: settings.temperature,
        }
    }
}

/// Single-shot text and image generation. No streaming, no retries.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait InferenceService: Send + Sync {
    /// Generates a text reply.
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// Generates an image from a description; returns encoded image bytes.
    async fn generate_image(&self, description: &str) -> Result<Vec<u8>>;
}
