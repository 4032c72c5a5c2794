use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, error, info};

use super::{AudioPayload, TranscribedSegment, TranscriptionProvider};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// `verbose_json` response body
#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    #[serde(default)]
    text: String,
    #[serde(default)]
    segments: Vec<Segment>,
}

#[derive(Debug, Deserialize)]
struct Segment {
    text: String,
    start: f64,
    end: f64,
    avg_logprob: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAIProvider {
    pub fn new(api_key: String, endpoint: Option<String>, model: String) -> Result<Self> {
        let client = reqwest::Client::new();
        let base_url = endpoint
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        info!(
            "Initialized OpenAI transcription provider with base URL: {} (model {})",
            base_url, model
        );

        Ok(Self {
            client,
            api_key,
            base_url,
            model,
        })
    }

    fn build_form(&self, audio: &AudioPayload, language: &str) -> Result<Form> {
        let file = Part::bytes(audio.bytes.clone())
            .file_name(audio.file_name.clone())
            .mime_str(&audio.mime_type)
            .context("Invalid audio MIME type")?;

        let mut form = Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment");

        if !language.is_empty() && language != "auto" {
            form = form.text("language", language.to_string());
        }

        Ok(form)
    }

    async fn request(&self, audio: &AudioPayload, language: &str) -> Result<Vec<TranscribedSegment>> {
        let url = format!("{}/audio/transcriptions", self.base_url);
        let form = self.build_form(audio, language)?;

        debug!(
            "Uploading {} bytes ({}) to OpenAI",
            audio.bytes.len(),
            audio.mime_type
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .context("Failed to send transcription request to OpenAI")?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .context("Failed to read transcription response body")?;

        if !status.is_success() {
            error!(
                "OpenAI transcription failed with status {}: {}",
                status, response_text
            );

            if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(&response_text) {
                return Err(anyhow::anyhow!(
                    "OpenAI API error: {}",
                    error_response.error.message
                ));
            }

            return Err(anyhow::anyhow!(
                "OpenAI transcription failed with status {}: {}",
                status,
                response_text
            ));
        }

        let transcription: VerboseTranscription = serde_json::from_str(&response_text)
            .context("Failed to parse transcription response")?;

        debug!("Raw transcription: {}", transcription.text);

        Ok(transcription
            .segments
            .into_iter()
            .map(|segment| TranscribedSegment {
                text: segment.text.trim().to_string(),
                start: segment.start,
                end: segment.end,
                avg_logprob: segment.avg_logprob,
            })
            .filter(|segment| !segment.text.is_empty())
            .collect())
    }
}

impl TranscriptionProvider for OpenAIProvider {
    fn name(&self) -> &'static str {
        "OpenAI API"
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn transcribe<'a>(
        &'a self,
        audio: &'a AudioPayload,
        language: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<TranscribedSegment>>> + Send + 'a>> {
        Box::pin(async move {
            info!("Transcribing {} via OpenAI API", audio.file_name);
            let segments = self.request(audio, language).await?;
            info!("Transcribed {} segments from audio", segments.len());
            Ok(segments)
        })
    }
}
