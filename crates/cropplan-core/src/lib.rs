pub mod client;
pub mod config;
pub mod form;
pub mod session;
pub mod steps;
pub mod transcript;
pub mod voice;

// Re-export main types for convenience
pub use client::{PredictionBackend, PredictionClient, PredictionError, PredictionResponse};
pub use config::Config;
pub use form::{Crop, FarmingType, FormData, SoilField, SoilParameters};
pub use session::{Notice, PendingRequest, RequestTicket, Session};
pub use steps::{NextOutcome, StepState, TOTAL_STEPS};
pub use transcript::{ChatMessage, Sender, Transcript};
pub use voice::{AudioSource, NoMicrophone, PlaceholderTranscriber, Transcriber, VoiceRecorder};
