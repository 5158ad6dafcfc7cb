//! Voice capture for the chat input
//!
//! Recording is real: a stream is opened from an [`AudioSource`] and chunks
//! are buffered until stop. Speech-to-text is not. The only shipped
//! [`Transcriber`] is [`PlaceholderTranscriber`], which says so through
//! [`Transcriber::is_implemented`] and returns a fixed hint instead of text.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

pub const PLACEHOLDER_TRANSCRIPT: &str =
    "Voice message recorded - implement speech-to-text with your backend";

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("microphone unavailable: {0}")]
    PermissionDenied(String),
}

/// An open microphone stream
pub trait AudioStream: Send {
    /// Stop all tracks. Called exactly once per stream.
    fn release(&mut self);
}

#[async_trait]
pub trait AudioSource: Send + Sync {
    async fn open(&self) -> Result<Box<dyn AudioStream>, VoiceError>;
}

/// Source for environments without audio capture; access is always refused
pub struct NoMicrophone;

#[async_trait]
impl AudioSource for NoMicrophone {
    async fn open(&self) -> Result<Box<dyn AudioStream>, VoiceError> {
        Err(VoiceError::PermissionDenied(
            "no audio capture device is available".to_string(),
        ))
    }
}

/// Buffered audio from one recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub data: Vec<u8>,
    pub chunk_count: usize,
    pub mime_type: &'static str,
}

pub trait Transcriber: Send + Sync {
    fn is_implemented(&self) -> bool;
    fn transcribe(&self, clip: &AudioClip) -> String;
}

pub struct PlaceholderTranscriber;

impl Transcriber for PlaceholderTranscriber {
    fn is_implemented(&self) -> bool {
        false
    }

    fn transcribe(&self, _clip: &AudioClip) -> String {
        PLACEHOLDER_TRANSCRIPT.to_string()
    }
}

#[derive(Default)]
pub struct VoiceRecorder {
    stream: Option<Box<dyn AudioStream>>,
    chunks: Vec<Vec<u8>>,
}

impl VoiceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_recording(&self) -> bool {
        self.stream.is_some()
    }

    pub async fn start(&mut self, source: &dyn AudioSource) -> Result<(), VoiceError> {
        if self.is_recording() {
            return Ok(());
        }

        let stream = source.open().await?;
        self.chunks.clear();
        self.stream = Some(stream);
        info!("recording started");
        Ok(())
    }

    /// Buffer a chunk of audio; ignored while idle
    pub fn push_chunk(&mut self, chunk: Vec<u8>) {
        if self.is_recording() {
            self.chunks.push(chunk);
        }
    }

    /// Finish recording and turn the buffered audio into chat text.
    ///
    /// Returns `None` when nothing was being recorded.
    pub fn stop(&mut self, transcriber: &dyn Transcriber) -> Option<String> {
        let mut stream = self.stream.take()?;
        stream.release();

        let chunks = std::mem::take(&mut self.chunks);
        let clip = AudioClip {
            chunk_count: chunks.len(),
            data: chunks.concat(),
            mime_type: "audio/wav",
        };
        info!(bytes = clip.data.len(), chunks = clip.chunk_count, "recording stopped");

        if !transcriber.is_implemented() {
            debug!("speech-to-text not implemented, using placeholder");
        }
        Some(transcriber.transcribe(&clip))
    }

    /// Drop any recording in progress without transcribing it
    pub fn cancel(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.release();
            debug!("recording discarded");
        }
        self.chunks.clear();
    }
}

impl Drop for VoiceRecorder {
    fn drop(&mut self) {
        self.cancel();
    }
}
