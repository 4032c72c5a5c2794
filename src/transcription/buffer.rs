//! Timer-flushed queue of raw extension audio.
//!
//! Samples accumulate while the buffer runs. A batch is emitted on every
//! flush tick, as soon as more than `max_buffered_seconds` of audio is
//! queued, and once more when the buffer stops. Pushes while stopped are
//! dropped. Every batch carries the meeting its samples were buffered for.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TranscriptionConfig;

#[derive(Debug, Clone, Copy)]
pub struct BufferSettings {
    pub flush_interval: Duration,
    pub max_buffered_seconds: u32,
}

impl From<&TranscriptionConfig> for BufferSettings {
    fn from(config: &TranscriptionConfig) -> Self {
        Self {
            flush_interval: Duration::from_millis(config.chunk_duration_ms.max(1)),
            max_buffered_seconds: config.max_buffered_seconds,
        }
    }
}

/// Samples taken from the buffer in one flush.
#[derive(Debug, Clone)]
pub struct AudioBatch {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub meeting_id: Option<String>,
}

#[derive(Default)]
struct BufferState {
    samples: Vec<f32>,
    sample_rate: u32,
    target: Option<String>,
    timer: Option<CancellationToken>,
}

#[derive(Clone)]
pub struct AudioBuffer {
    state: Arc<Mutex<BufferState>>,
    settings: BufferSettings,
    batches: mpsc::UnboundedSender<AudioBatch>,
}

impl AudioBuffer {
    pub fn new(settings: BufferSettings, batches: mpsc::UnboundedSender<AudioBatch>) -> Self {
        Self {
            state: Arc::new(Mutex::new(BufferState::default())),
            settings,
            batches,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.timer.is_some()
    }

    /// Start accepting audio and arm the flush timer. No-op while running.
    pub async fn start(&self) {
        let token = {
            let mut state = self.state.lock().await;
            if state.timer.is_some() {
                return;
            }
            let token = CancellationToken::new();
            state.timer = Some(token.clone());
            token
        };

        info!(
            "Audio buffer started (flush every {:?}, cap {}s)",
            self.settings.flush_interval, self.settings.max_buffered_seconds
        );

        let buffer = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(buffer.settings.flush_interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let mut state = buffer.state.lock().await;
                        buffer.flush_locked(&mut state);
                    }
                }
            }
            debug!("Audio buffer timer stopped");
        });
    }

    /// Queue samples. Returns false when the buffer is stopped and the audio was dropped.
    pub async fn push(&self, samples: &[f32], sample_rate: u32) -> bool {
        let mut state = self.state.lock().await;
        if state.timer.is_none() {
            return false;
        }

        if !state.samples.is_empty() && state.sample_rate != sample_rate {
            warn!(
                "Sample rate changed from {}Hz to {}Hz, flushing buffered audio",
                state.sample_rate, sample_rate
            );
            self.flush_locked(&mut state);
        }

        state.sample_rate = sample_rate;
        state.samples.extend_from_slice(samples);

        let threshold = sample_rate as usize * self.settings.max_buffered_seconds as usize;
        if state.samples.len() > threshold {
            debug!(
                "Buffered {} samples exceeds {}, flushing early",
                state.samples.len(),
                threshold
            );
            self.flush_locked(&mut state);
        }

        true
    }

    /// Credit audio pushed from now on to `meeting_id`. Samples already
    /// queued are flushed under the previous meeting first.
    pub async fn retarget(&self, meeting_id: Option<String>) {
        let mut state = self.state.lock().await;
        if state.target == meeting_id {
            return;
        }
        self.flush_locked(&mut state);
        debug!("Audio buffer now collecting for {:?}", meeting_id);
        state.target = meeting_id;
    }

    /// Cancel the timer and flush whatever remains.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if let Some(token) = state.timer.take() {
            token.cancel();
            self.flush_locked(&mut state);
            info!("Audio buffer stopped");
        }
    }

    fn flush_locked(&self, state: &mut BufferState) {
        if state.samples.is_empty() {
            return;
        }

        let batch = AudioBatch {
            samples: std::mem::take(&mut state.samples),
            sample_rate: state.sample_rate,
            meeting_id: state.target.clone(),
        };

        debug!(
            "Flushing {} samples at {}Hz",
            batch.samples.len(),
            batch.sample_rate
        );

        if self.batches.send(batch).is_err() {
            warn!("Audio batch receiver dropped, discarding buffered audio");
        }
    }
}
