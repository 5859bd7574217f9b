//! Google Gemini REST client.
//!
//! Each call picks one key at random from the configured pool and issues a
//! single `generateContent` request.

use crate::inference::{GenerationRequest, InferenceService};
use async_trait::async_trait;
use base64::Engine as _;
use palaver_common::{PalaverError, Result};
use palaver_config::InferenceConfig;
use rand::seq::SliceRandom;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

// API request/response types

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "responseModalities", skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<&'static str>>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(rename = "inlineData")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl GenerateContentResponse {
    fn parts(&self) -> impl Iterator<Item = &ResponsePart> {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| content.parts.iter())
            .into_iter()
            .flatten()
    }

    fn text(&self) -> Option<String> {
        let text: String = self.parts().filter_map(|part| part.text.as_deref()).collect();
        (!text.trim().is_empty()).then_some(text)
    }

    fn image(&self) -> Result<Option<Vec<u8>>> {
        let Some(inline) = self.parts().find_map(|part| part.inline_data.as_ref()) else {
            return Ok(None);
        };
        base64::engine::general_purpose::STANDARD
            .decode(&inline.data)
            .map(Some)
            .map_err(|e| PalaverError::service_with_source("Gemini returned undecodable image data", e))
    }
}

/// [`InferenceService`] backed by the Gemini API.
pub struct GeminiClient {
    client: Client,
    api_keys: Vec<String>,
    base_url: String,
    image_model: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("keys", &self.api_keys.len())
            .field("base_url", &self.base_url)
            .field("image_model", &self.image_model)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    /// Builds a client from configuration. At least one key is required.
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let api_keys: Vec<String> = config
            .api_keys
            .iter()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .collect();
        if api_keys.is_empty() {
            return Err(PalaverError::config("no Gemini API keys configured"));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| PalaverError::config_with_source("Failed to build HTTP client", e))?;

        Ok(Self {
            client,
            api_keys,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            image_model: config.image_model.clone(),
        })
    }

    fn pick_key(&self) -> Result<&str> {
        self.api_keys
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .ok_or_else(|| PalaverError::config("no Gemini API keys configured"))
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{model}:generateContent", self.base_url)
    }

    async fn call(&self, model: &str, body: &GenerateContentRequest) -> Result<GenerateContentResponse> {
        let key = self.pick_key()?;
        let response = self
            .client
            .post(self.endpoint(model))
            .query(&[("key", key)])
            .json(body)
            .send()
            .await
            .map_err(|e| PalaverError::service_with_source("Gemini request failed", e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PalaverError::service_with_source("Failed to read Gemini response", e))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<GenerateContentResponse>(&text)
                .ok()
                .and_then(|parsed| parsed.error)
                .map_or(text, |error| error.message);
            return Err(PalaverError::service(format!("Gemini returned {status}: {detail}")));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text)?;
        if let Some(error) = parsed.error {
            return Err(PalaverError::service(format!("Gemini error: {}", error.message)));
        }
        Ok(parsed)
    }

    fn image_prompt(description: &str) -> String {
        format!(
            "Generate a detailed image based on this description:\n{description}\n\
             Style: high quality, detailed, photorealistic\n\
             Lighting: professional, balanced\n\
             Composition: well-composed, dynamic"
        )
    }
}

#[async_trait]
impl InferenceService for GeminiClient {
    #[instrument(skip_all, fields(model = %request.model))]
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart {
                    text: request.prompt.clone(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                response_modalities: None,
            },
        };
        let response = self.call(&request.model, &body).await?;
        debug!(candidates = response.candidates.len(), "Gemini replied");
        response
            .text()
            .ok_or_else(|| PalaverError::service("Gemini returned no text"))
    }

    #[instrument(skip_all, fields(model = %self.image_model))]
    async fn generate_image(&self, description: &str) -> Result<Vec<u8>> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart {
                    text: Self::image_prompt(description),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.9,
                response_modalities: Some(vec!["TEXT", "IMAGE"]),
            },
        };
        let response = self.call(&self.image_model, &body).await?;
        response
            .image()?
            .ok_or_else(|| PalaverError::service("Gemini returned no image"))
    }
}
