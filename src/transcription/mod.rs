use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::config::TranscriptionConfig;
use crate::error::{MeetError, MeetResult};
use crate::meeting::TranscriptEntry;

pub mod buffer;
pub mod providers;
pub mod wav;

pub use buffer::{AudioBatch, AudioBuffer, BufferSettings};
pub use providers::{AudioPayload, OpenAIProvider, TranscribedSegment, TranscriptionProvider};

/// Confidence used when the provider reports no log probability.
const DEFAULT_CONFIDENCE: f32 = 0.9;
const UNATTRIBUTED_SPEAKER: &str = "Speaker";
const UNATTRIBUTED_SPEAKER_ID: &str = "unknown";

pub struct Transcriber {
    provider: Box<dyn TranscriptionProvider>,
    language: String,
}

impl Transcriber {
    pub fn with_provider(provider_name: &str, config: ProviderConfig) -> Result<Self> {
        let language = config.language.clone().unwrap_or_else(|| "en".to_string());

        let provider: Box<dyn TranscriptionProvider> = match provider_name {
            "openai-api" => {
                let api_key = config
                    .api_key
                    .context("api_key is required for OpenAI API provider")?;

                let model = config.model.unwrap_or_else(|| "whisper-1".to_string());
                Box::new(OpenAIProvider::new(api_key, config.api_endpoint, model)?)
            }
            _ => bail!(
                "Unknown transcription provider '{}'. Supported providers: openai-api",
                provider_name
            ),
        };

        info!("Using {} for transcription", provider.name());

        Ok(Self { provider, language })
    }

    pub fn from_provider(provider: Box<dyn TranscriptionProvider>, language: &str) -> Self {
        Self {
            provider,
            language: language.to_string(),
        }
    }

    /// Build the configured transcriber. `None` when transcription is
    /// disabled or no API key is available.
    pub fn from_config(config: &TranscriptionConfig) -> Result<Option<Self>> {
        if !config.enabled {
            info!("Real-time transcription disabled by configuration");
            return Ok(None);
        }
        if config.api_key.is_none() {
            warn!("No OpenAI API key found - transcription disabled");
            return Ok(None);
        }

        let provider_name = config.provider.as_deref().unwrap_or("openai-api");
        Self::with_provider(provider_name, ProviderConfig::from(config)).map(Some)
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Transcribe buffered float samples, encoded as 16-bit WAV.
    pub async fn transcribe_samples(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> MeetResult<Vec<TranscriptEntry>> {
        let bytes = wav::encode_pcm16(samples, sample_rate)
            .map_err(|e| MeetError::Transcription(format!("Failed to encode WAV: {}", e)))?;
        self.transcribe(&AudioPayload::wav(bytes)).await
    }

    /// Transcribe a finished recording in its original container.
    pub async fn transcribe_recording(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> MeetResult<Vec<TranscriptEntry>> {
        self.transcribe(&AudioPayload::recording(bytes, mime_type))
            .await
    }

    pub async fn transcribe(&self, audio: &AudioPayload) -> MeetResult<Vec<TranscriptEntry>> {
        let segments = self
            .provider
            .transcribe(audio, &self.language)
            .await
            .map_err(|e| MeetError::Transcription(e.to_string()))?;

        let now = Utc::now();
        Ok(segments
            .into_iter()
            .map(|segment| segment_to_entry(segment, now))
            .collect())
    }
}

fn segment_to_entry(segment: TranscribedSegment, now: chrono::DateTime<Utc>) -> TranscriptEntry {
    let confidence = segment
        .avg_logprob
        .map(|logprob| logprob.exp() as f32)
        .unwrap_or(DEFAULT_CONFIDENCE);

    TranscriptEntry::new(
        UNATTRIBUTED_SPEAKER,
        UNATTRIBUTED_SPEAKER_ID,
        segment.text,
        now,
        confidence,
    )
    .with_offsets(segment.start, segment.end)
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub model: Option<String>,
    pub language: Option<String>,
    pub api_endpoint: Option<String>,
    pub api_key: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: None,
            language: Some("en".to_string()),
            api_endpoint: None,
            api_key: None,
        }
    }
}

impl From<&TranscriptionConfig> for ProviderConfig {
    fn from(config: &TranscriptionConfig) -> Self {
        Self {
            model: config.model.clone(),
            language: config.language.clone(),
            api_endpoint: config.api_endpoint.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    struct CannedProvider {
        segments: Vec<TranscribedSegment>,
        seen: Mutex<Vec<(String, String)>>,
    }

    impl TranscriptionProvider for CannedProvider {
        fn name(&self) -> &'static str {
            "canned"
        }

        fn is_available(&self) -> bool {
            true
        }

        fn transcribe<'a>(
            &'a self,
            audio: &'a AudioPayload,
            language: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<TranscribedSegment>>> + Send + 'a>> {
            Box::pin(async move {
                self.seen
                    .lock()
                    .unwrap()
                    .push((audio.file_name.clone(), language.to_string()));
                Ok(self.segments.clone())
            })
        }
    }

    #[tokio::test]
    async fn test_segments_become_entries() {
        let provider = CannedProvider {
            segments: vec![
                TranscribedSegment {
                    text: "Hello".into(),
                    start: 0.0,
                    end: 1.0,
                    avg_logprob: Some(-0.5),
                },
                TranscribedSegment {
                    text: "World".into(),
                    start: 1.0,
                    end: 2.5,
                    avg_logprob: None,
                },
            ],
            seen: Mutex::new(Vec::new()),
        };
        let transcriber = Transcriber::from_provider(Box::new(provider), "de");

        let entries = transcriber
            .transcribe_samples(&[0.0; 16], 16_000)
            .await
            .unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].speaker_name, "Speaker");
        assert_eq!(entries[0].speaker_id, "unknown");
        assert!((entries[0].confidence - (-0.5f64).exp() as f32).abs() < 1e-6);
        assert_eq!(entries[1].confidence, 0.9);
        assert_eq!(entries[1].start_offset, Some(1.0));
        assert_eq!(entries[1].end_offset, Some(2.5));
    }

    #[test]
    fn test_from_config_without_key_is_disabled() {
        let config = TranscriptionConfig::default();
        assert!(Transcriber::from_config(&config).unwrap().is_none());

        let config = TranscriptionConfig {
            enabled: false,
            api_key: Some("sk".into()),
            ..TranscriptionConfig::default()
        };
        assert!(Transcriber::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_unknown_provider() {
        let config = ProviderConfig {
            api_key: Some("sk".into()),
            ..ProviderConfig::default()
        };
        let err = Transcriber::with_provider("whisper-cpp", config).err().unwrap();
        assert!(err.to_string().contains("Unknown transcription provider"));
    }

    #[test]
    fn test_from_config_with_key() {
        let config = TranscriptionConfig {
            api_key: Some("sk".into()),
            ..TranscriptionConfig::default()
        };
        let transcriber = Transcriber::from_config(&config).unwrap().unwrap();
        assert_eq!(transcriber.provider_name(), "OpenAI API");
    }
}
