//! Planning session controller
//!
//! A [`Session`] owns everything one run through the form touches: the form
//! data, the step state, the chat transcript and the request bookkeeping.
//! Front ends call the named transitions below and render from the accessors.
//!
//! Requests are split into `begin_*` and `finish_*` halves so a UI can run
//! the network call on another task. Each begin hands out a
//! [`RequestTicket`]; a finish whose ticket is no longer current (the request
//! was cancelled or the session restarted) is dropped.

use crate::client::{PredictionBackend, PredictionError, PredictionResponse};
use crate::form::{Crop, FarmingType, FormData, SoilField};
use crate::steps::{NextOutcome, StepState, TOTAL_STEPS};
use crate::transcript::Transcript;
use crate::voice::{AudioSource, Transcriber, VoiceRecorder};
use std::path::PathBuf;
use tracing::{info, warn};

/// Prompt sent by the "Start Planning" action
pub const DEFAULT_PROMPT: &str = "Please give prediction based on form data.";
pub const FALLBACK_REPLY: &str = "Sorry, I couldn't process your request. Please try again.";

const CHAT_FAILED: &str = "Failed to get predictions. Please try again.";
const DIRECT_FAILED: &str = "Direct backend fetch failed.";
const MIC_FAILED: &str = "Could not access microphone. Please check permissions.";

/// Non-blocking notification for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub description: String,
}

impl Notice {
    pub fn error(description: &str) -> Self {
        Self {
            title: "Error".to_string(),
            description: description.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket(u64);

/// Everything a background task needs to run one request
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub ticket: RequestTicket,
    pub query: String,
    pub context: FormData,
}

pub struct Session {
    form: FormData,
    steps: StepState,
    transcript: Transcript,
    pub chat_input: String,
    is_loading: bool,
    chat_ticket: Option<RequestTicket>,
    direct_ticket: Option<RequestTicket>,
    next_ticket: u64,
    direct_result: Option<PredictionResponse>,
    notices: Vec<Notice>,
    recorder: VoiceRecorder,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            form: FormData::default(),
            steps: StepState::new(),
            transcript: Transcript::new(),
            chat_input: String::new(),
            is_loading: false,
            chat_ticket: None,
            direct_ticket: None,
            next_ticket: 0,
            direct_result: None,
            notices: Vec::new(),
            recorder: VoiceRecorder::new(),
        }
    }

    // Accessors

    pub fn form(&self) -> &FormData {
        &self.form
    }

    pub fn steps(&self) -> &StepState {
        &self.steps
    }

    pub fn current_step(&self) -> u8 {
        self.steps.current_step()
    }

    pub fn show_warning(&self) -> bool {
        self.steps.show_warning()
    }

    pub fn can_advance(&self) -> bool {
        self.steps.is_step_valid(&self.form) && !self.steps.is_last()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn is_direct_pending(&self) -> bool {
        self.direct_ticket.is_some()
    }

    pub fn direct_result(&self) -> Option<&PredictionResponse> {
        self.direct_result.as_ref()
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    // Form selections

    pub fn select_crop(&mut self, crop: Crop) {
        self.form.crop = Some(crop);
    }

    pub fn select_farming_type(&mut self, farming_type: FarmingType) {
        self.form.farming_type = Some(farming_type);
    }

    pub fn select_state(&mut self, state: &str) {
        self.form.set_state(state);
    }

    pub fn select_district(&mut self, district: &str) {
        self.form.set_district(district);
    }

    pub fn select_previous_crop(&mut self, crop: Crop) {
        self.form.previous_crop = Some(crop);
    }

    pub fn soil_value_mut(&mut self, field: SoilField) -> &mut String {
        self.form.soil_mut().get_mut(field)
    }

    pub fn set_soil_test_file(&mut self, path: Option<PathBuf>) {
        self.form.soil_test_file = path;
    }

    // Step transitions

    pub fn next(&mut self) -> NextOutcome {
        self.steps.next(&self.form)
    }

    pub fn previous(&mut self) {
        let leaving_chat = self.steps.is_last();
        self.steps.previous();
        if leaving_chat {
            self.cancel_in_flight();
        }
    }

    pub fn continue_anyway(&mut self) -> bool {
        self.steps.continue_anyway()
    }

    /// Start planning again: every piece of session state goes back to defaults
    pub fn restart(&mut self) {
        self.cancel_in_flight();
        self.recorder.cancel();
        self.form = FormData::default();
        self.steps.reset();
        self.transcript = Transcript::new();
        self.chat_input.clear();
        self.direct_result = None;
        self.notices.clear();
        info!("session restarted");
    }

    // Chat submission

    fn issue_ticket(&mut self) -> RequestTicket {
        self.next_ticket += 1;
        RequestTicket(self.next_ticket)
    }

    /// Append the user's message and mark a request as outstanding.
    ///
    /// Returns `None` for blank input or while another chat request is running.
    pub fn begin_chat(&mut self, message: &str) -> Option<PendingRequest> {
        if message.trim().is_empty() || self.is_loading {
            return None;
        }

        self.transcript.push_user(message);
        self.chat_input.clear();
        self.is_loading = true;

        let ticket = self.issue_ticket();
        self.chat_ticket = Some(ticket);
        info!(len = message.len(), "chat request started");

        Some(PendingRequest {
            ticket,
            query: message.to_string(),
            context: self.form.clone(),
        })
    }

    pub fn begin_chat_from_input(&mut self) -> Option<PendingRequest> {
        let message = self.chat_input.clone();
        self.begin_chat(&message)
    }

    /// "Start Planning" at the last step
    pub fn begin_start_planning(&mut self) -> Option<PendingRequest> {
        if self.current_step() != TOTAL_STEPS {
            return None;
        }
        self.begin_chat(DEFAULT_PROMPT)
    }

    /// Record the outcome of a chat request. Returns false if the ticket was stale.
    pub fn finish_chat(
        &mut self,
        ticket: RequestTicket,
        result: Result<PredictionResponse, PredictionError>,
    ) -> bool {
        if self.chat_ticket != Some(ticket) {
            warn!(?ticket, "dropping response for abandoned chat request");
            return false;
        }
        self.chat_ticket = None;

        match result {
            Ok(response) => {
                self.transcript.push_bot(response.bot_message());
                info!("chat response appended");
            }
            Err(e) => {
                warn!(error = %e, "chat request failed");
                self.transcript.push_bot(FALLBACK_REPLY);
                self.notices.push(Notice::error(CHAT_FAILED));
            }
        }

        self.is_loading = false;
        true
    }

    pub async fn submit_chat(&mut self, backend: &dyn PredictionBackend, message: &str) -> bool {
        let Some(request) = self.begin_chat(message) else {
            return false;
        };
        let result = backend.predict(&request.query, Some(&request.context)).await;
        self.finish_chat(request.ticket, result)
    }

    pub async fn start_planning(&mut self, backend: &dyn PredictionBackend) -> bool {
        if self.current_step() != TOTAL_STEPS {
            return false;
        }
        self.submit_chat(backend, DEFAULT_PROMPT).await
    }

    // Direct submit

    /// Send a form-derived query whose answer is kept apart from the transcript
    pub fn begin_direct_submit(&mut self) -> Option<PendingRequest> {
        if self.direct_ticket.is_some() {
            return None;
        }

        let ticket = self.issue_ticket();
        self.direct_ticket = Some(ticket);
        let query = self.form.direct_query();
        info!(query = %query, "direct request started");

        Some(PendingRequest {
            ticket,
            query,
            context: self.form.clone(),
        })
    }

    pub fn finish_direct_submit(
        &mut self,
        ticket: RequestTicket,
        result: Result<PredictionResponse, PredictionError>,
    ) -> bool {
        if self.direct_ticket != Some(ticket) {
            warn!(?ticket, "dropping response for abandoned direct request");
            return false;
        }
        self.direct_ticket = None;

        match result {
            Ok(response) => self.direct_result = Some(response),
            Err(e) => {
                warn!(error = %e, "direct request failed");
                self.notices.push(Notice::error(DIRECT_FAILED));
            }
        }
        true
    }

    pub async fn direct_submit(&mut self, backend: &dyn PredictionBackend) -> bool {
        let Some(request) = self.begin_direct_submit() else {
            return false;
        };
        let result = backend.predict(&request.query, Some(&request.context)).await;
        self.finish_direct_submit(request.ticket, result)
    }

    /// Abandon outstanding requests; late responses will be ignored
    pub fn cancel_in_flight(&mut self) {
        let had_chat = self.chat_ticket.take().is_some();
        let had_direct = self.direct_ticket.take().is_some();
        if had_chat || had_direct {
            info!(had_chat, had_direct, "in-flight request cancelled");
        }
        self.is_loading = false;
    }

    // Voice

    pub async fn start_recording(&mut self, source: &dyn AudioSource) -> bool {
        match self.recorder.start(source).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "microphone unavailable");
                self.notices.push(Notice::error(MIC_FAILED));
                false
            }
        }
    }

    /// Stop recording and place the transcript into the chat input
    pub fn stop_recording(&mut self, transcriber: &dyn Transcriber) -> bool {
        match self.recorder.stop(transcriber) {
            Some(text) => {
                self.chat_input = text;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::Sender;
    use crate::voice::testing::FakeMicrophone;
    use crate::voice::{NoMicrophone, PlaceholderTranscriber, PLACEHOLDER_TRANSCRIPT};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Backend returning a canned response (or a 503 when `response` is None)
    struct StubBackend {
        response: Option<PredictionResponse>,
        calls: AtomicUsize,
        queries: Mutex<Vec<String>>,
    }

    impl StubBackend {
        fn ok(response: PredictionResponse) -> Self {
            Self {
                response: Some(response),
                calls: AtomicUsize::new(0),
                queries: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                response: None,
                calls: AtomicUsize::new(0),
                queries: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PredictionBackend for StubBackend {
        async fn predict(
            &self,
            query: &str,
            _context: Option<&FormData>,
        ) -> Result<PredictionResponse, PredictionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push(query.to_string());
            self.response.clone().ok_or(PredictionError::Server {
                status: 503,
                body: "unavailable".to_string(),
            })
        }
    }

    fn yield_response() -> PredictionResponse {
        serde_json::from_value(json!({
            "prediction": "12 t/ha",
            "details": {},
            "explanation": "based on soil"
        }))
        .unwrap()
    }

    fn session_at_chat_step() -> Session {
        let mut session = Session::new();
        session.select_crop(Crop::Paddy);
        session.next();
        session.select_farming_type(FarmingType::Organic);
        session.next();
        session.next();
        session.select_previous_crop(Crop::Groundnut);
        session.next();
        session.next();
        assert_eq!(session.current_step(), 6);
        session
    }

    #[test]
    fn test_same_crop_rotation_warning() {
        let mut session = Session::new();
        session.select_crop(Crop::Paddy);
        session.next();
        session.select_farming_type(FarmingType::Inorganic);
        session.next();
        session.next();
        session.select_previous_crop(Crop::Paddy);

        assert_eq!(session.next(), NextOutcome::RotationWarning);
        assert!(session.show_warning());
        assert_eq!(session.current_step(), 4);

        assert!(session.continue_anyway());
        assert_eq!(session.current_step(), 5);
    }

    #[tokio::test]
    async fn test_restart_clears_everything() {
        let backend = StubBackend::ok(yield_response());
        let mut session = session_at_chat_step();
        session.submit_chat(&backend, "Predict yield").await;
        session.direct_submit(&backend).await;
        session.chat_input = "half typed".to_string();
        *session.soil_value_mut(SoilField::Ph) = "6.5".to_string();

        session.restart();

        assert_eq!(session.form(), &FormData::default());
        assert_eq!(session.form().state, "Andhra Pradesh");
        assert_eq!(session.form().district, "Kadapa");
        assert_eq!(session.current_step(), 1);
        assert!(!session.show_warning());
        assert!(session.transcript().is_empty());
        assert!(session.chat_input.is_empty());
        assert!(session.direct_result().is_none());
    }

    #[tokio::test]
    async fn test_whitespace_message_is_noop() {
        let backend = StubBackend::ok(yield_response());
        let mut session = session_at_chat_step();

        assert!(!session.submit_chat(&backend, "   \n\t").await);
        assert!(session.transcript().is_empty());
        assert_eq!(backend.calls(), 0);
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn test_successful_submission_appends_pair() {
        let backend = StubBackend::ok(yield_response());
        let mut session = session_at_chat_step();

        assert!(session.submit_chat(&backend, "Predict yield").await);

        let messages = session.transcript().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, Sender::User);
        assert_eq!(messages[0].content, "Predict yield");
        assert_eq!(messages[1].sender, Sender::Bot);
        assert!(messages[1].content.contains("12 t/ha"));
        assert!(messages[1].content.contains("{}"));
        assert!(messages[1].content.contains("based on soil"));
        assert!(!session.is_loading());
        assert!(session.notices().is_empty());
    }

    #[tokio::test]
    async fn test_failed_submission_appends_fallback_and_one_notice() {
        let backend = StubBackend::failing();
        let mut session = session_at_chat_step();

        assert!(session.submit_chat(&backend, "Predict yield").await);

        let messages = session.transcript().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, Sender::User);
        assert_eq!(messages[1].sender, Sender::Bot);
        assert_eq!(messages[1].content, FALLBACK_REPLY);
        assert_eq!(session.notices().len(), 1);
        assert_eq!(session.notices()[0].description, CHAT_FAILED);
        assert!(!session.is_loading());
    }

    #[test]
    fn test_second_chat_blocked_while_loading() {
        let mut session = session_at_chat_step();
        let first = session.begin_chat("one").unwrap();
        assert!(session.is_loading());
        assert!(session.begin_chat("two").is_none());
        assert_eq!(session.transcript().len(), 1);

        assert!(session.finish_chat(first.ticket, Ok(yield_response())));
        assert!(session.begin_chat("two").is_some());
    }

    #[test]
    fn test_cancelled_request_response_dropped() {
        let mut session = session_at_chat_step();
        let pending = session.begin_chat("Predict yield").unwrap();

        session.previous();
        assert_eq!(session.current_step(), 5);
        assert!(!session.is_loading());

        assert!(!session.finish_chat(pending.ticket, Ok(yield_response())));
        assert_eq!(session.transcript().len(), 1);
    }

    #[test]
    fn test_begin_chat_clears_input() {
        let mut session = session_at_chat_step();
        session.chat_input = "What fertilizer?".to_string();
        let pending = session.begin_chat_from_input().unwrap();
        assert_eq!(pending.query, "What fertilizer?");
        assert_eq!(pending.context.crop, Some(Crop::Paddy));
        assert!(session.chat_input.is_empty());
    }

    #[tokio::test]
    async fn test_start_planning_only_on_last_step() {
        let backend = StubBackend::ok(yield_response());
        let mut session = Session::new();
        assert!(!session.start_planning(&backend).await);
        assert_eq!(backend.calls(), 0);

        let mut session = session_at_chat_step();
        assert!(session.start_planning(&backend).await);
        assert_eq!(session.transcript().messages()[0].content, DEFAULT_PROMPT);
        assert_eq!(backend.queries.lock().unwrap()[0], DEFAULT_PROMPT);
    }

    #[tokio::test]
    async fn test_direct_submit_bypasses_transcript() {
        let backend = StubBackend::ok(yield_response());
        let mut session = session_at_chat_step();

        assert!(session.direct_submit(&backend).await);
        assert!(session.transcript().is_empty());
        assert_eq!(
            session.direct_result().and_then(|r| r.prediction.as_deref()),
            Some("12 t/ha")
        );
        assert_eq!(backend.queries.lock().unwrap()[0], "Predict paddy yield in Kadapa");
    }

    #[tokio::test]
    async fn test_direct_submit_failure_notifies() {
        let backend = StubBackend::failing();
        let mut session = session_at_chat_step();

        session.direct_submit(&backend).await;
        assert!(session.direct_result().is_none());
        assert_eq!(session.take_notices(), vec![Notice::error(DIRECT_FAILED)]);
        assert!(session.notices().is_empty());
    }

    #[tokio::test]
    async fn test_voice_fills_chat_input() {
        let mic = FakeMicrophone::default();
        let mut session = session_at_chat_step();

        assert!(session.start_recording(&mic).await);
        assert!(session.is_recording());
        session.recorder.push_chunk(vec![0; 8]);
        assert!(session.stop_recording(&PlaceholderTranscriber));

        assert_eq!(session.chat_input, PLACEHOLDER_TRANSCRIPT);
        assert_eq!(mic.released_count(), 1);
    }

    #[tokio::test]
    async fn test_microphone_denied_notice() {
        let mut session = session_at_chat_step();
        assert!(!session.start_recording(&NoMicrophone).await);
        assert!(!session.is_recording());
        assert_eq!(session.notices(), &[Notice::error(MIC_FAILED)]);
    }

    #[tokio::test]
    async fn test_restart_releases_microphone() {
        let mic = FakeMicrophone::default();
        let mut session = session_at_chat_step();
        session.start_recording(&mic).await;

        session.restart();
        assert!(!session.is_recording());
        assert_eq!(mic.released_count(), 1);
    }
}
