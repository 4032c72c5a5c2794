use anyhow::Result;
use std::future::Future;
use std::pin::Pin;

pub mod openai_api;

pub use openai_api::OpenAIProvider;

/// Encoded audio ready for upload.
#[derive(Debug, Clone)]
pub struct AudioPayload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
}

impl AudioPayload {
    pub fn wav(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            file_name: "audio.wav".to_string(),
            mime_type: "audio/wav".to_string(),
        }
    }

    /// Name the upload after the container so the provider can sniff it.
    pub fn recording(bytes: Vec<u8>, mime_type: &str) -> Self {
        let extension = mime_type
            .split(';')
            .next()
            .and_then(|essence| essence.split('/').nth(1))
            .filter(|ext| !ext.is_empty())
            .unwrap_or("webm");
        Self {
            bytes,
            file_name: format!("recording.{}", extension),
            mime_type: mime_type.to_string(),
        }
    }
}

/// One timed segment returned by a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscribedSegment {
    pub text: String,
    pub start: f64,
    pub end: f64,
    pub avg_logprob: Option<f64>,
}

pub trait TranscriptionProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_available(&self) -> bool;

    fn transcribe<'a>(
        &'a self,
        audio: &'a AudioPayload,
        language: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<TranscribedSegment>>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_file_name_follows_mime() {
        let payload = AudioPayload::recording(vec![1, 2], "audio/webm;codecs=opus");
        assert_eq!(payload.file_name, "recording.webm");

        let payload = AudioPayload::recording(vec![], "audio/ogg");
        assert_eq!(payload.file_name, "recording.ogg");

        let payload = AudioPayload::recording(vec![], "");
        assert_eq!(payload.file_name, "recording.webm");
    }
}
