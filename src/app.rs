use cropplan_core::form::{districts_for_state, states};
use cropplan_core::{
    AudioSource, Config, Crop, FarmingType, NextOutcome, NoMicrophone, Notice, PendingRequest,
    PlaceholderTranscriber, PredictionClient, PredictionError, PredictionResponse, RequestTicket,
    Session, SoilField, Transcriber,
};
use ratatui::widgets::ListState;
use tokio::task::JoinHandle;
use tracing::{info, warn};

type PredictionTask = JoinHandle<Result<PredictionResponse, PredictionError>>;

/// How long a notice stays on screen, in ticks
const TOAST_TICKS: u8 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// Which list has focus on the region step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionFocus {
    State,
    District,
}

/// Editable rows on the soil step: the five readings, then the test file path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoilRow {
    Reading(SoilField),
    TestFile,
}

impl SoilRow {
    pub fn all() -> Vec<SoilRow> {
        let mut rows: Vec<SoilRow> = SoilField::all().into_iter().map(SoilRow::Reading).collect();
        rows.push(SoilRow::TestFile);
        rows
    }

    pub fn label(&self) -> &'static str {
        match self {
            SoilRow::Reading(field) => field.label(),
            SoilRow::TestFile => "Soil test file",
        }
    }

    pub fn placeholder(&self) -> &'static str {
        match self {
            SoilRow::Reading(field) => field.placeholder(),
            SoilRow::TestFile => "path to a soil test report",
        }
    }
}

pub struct Toast {
    pub notice: Notice,
    pub ticks_left: u8,
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub show_help: bool,

    pub session: Session,
    pub client: PredictionClient,
    pub microphone: Box<dyn AudioSource>,
    pub transcriber: Box<dyn Transcriber>,

    // Per-step selection cursors
    pub crop_state: ListState,
    pub farming_state: ListState,
    pub region_focus: RegionFocus,
    pub state_state: ListState,
    pub district_state: ListState,
    pub previous_crop_state: ListState,
    pub soil_state: ListState,
    pub soil_test_file_input: String,

    // Text editing (chat input or the selected soil row)
    pub cursor: usize,

    // Chat view
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    pub chat_task: Option<(RequestTicket, PredictionTask)>,
    pub direct_task: Option<(RequestTicket, PredictionTask)>,

    pub animation_frame: u8,
    pub toast: Option<Toast>,
}

impl App {
    pub fn new(config: &Config) -> Self {
        Self::with_client(PredictionClient::from_config(config))
    }

    pub fn with_client(client: PredictionClient) -> Self {
        info!(endpoint = %client.endpoint(), "starting planning session");

        let mut app = Self {
            should_quit: false,
            input_mode: InputMode::Normal,
            show_help: false,

            session: Session::new(),
            client,
            microphone: Box::new(NoMicrophone),
            transcriber: Box::new(PlaceholderTranscriber),

            crop_state: ListState::default(),
            farming_state: ListState::default(),
            region_focus: RegionFocus::State,
            state_state: ListState::default(),
            district_state: ListState::default(),
            previous_crop_state: ListState::default(),
            soil_state: ListState::default(),
            soil_test_file_input: String::new(),

            cursor: 0,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            chat_task: None,
            direct_task: None,

            animation_frame: 0,
            toast: None,
        };
        app.reset_cursors();
        app
    }

    fn reset_cursors(&mut self) {
        self.crop_state.select(Some(0));
        self.farming_state.select(Some(0));
        self.region_focus = RegionFocus::State;
        self.previous_crop_state.select(Some(0));
        self.soil_state.select(Some(0));
        self.soil_test_file_input.clear();
        self.sync_region_cursors();
        self.cursor = 0;
        self.chat_scroll = 0;
    }

    /// Point the region lists at the form's current state and district
    fn sync_region_cursors(&mut self) {
        let form = self.session.form();
        let state_idx = states().iter().position(|s| *s == form.state).unwrap_or(0);
        let district_idx = districts_for_state(&form.state)
            .iter()
            .position(|d| *d == form.district)
            .unwrap_or(0);
        self.state_state.select(Some(state_idx));
        self.district_state.select(Some(district_idx));
    }

    pub fn current_step(&self) -> u8 {
        self.session.current_step()
    }

    // Step navigation

    pub fn next_step(&mut self) {
        match self.session.next() {
            NextOutcome::Advanced(step) => {
                self.input_mode = InputMode::Normal;
                if step == cropplan_core::TOTAL_STEPS {
                    self.scroll_chat_to_bottom();
                }
            }
            NextOutcome::RotationWarning => info!("same crop as last season"),
            NextOutcome::Blocked | NextOutcome::AtEnd => {}
        }
    }

    pub fn previous_step(&mut self) {
        if self.session.steps().is_last() {
            self.abort_tasks();
        }
        self.session.previous();
        self.input_mode = InputMode::Normal;
    }

    pub fn continue_anyway(&mut self) {
        self.session.continue_anyway();
    }

    pub fn restart(&mut self) {
        self.abort_tasks();
        self.session.restart();
        self.input_mode = InputMode::Normal;
        self.reset_cursors();
    }

    // List selection, shared by every pick-one step

    fn list_len(&self) -> usize {
        match self.current_step() {
            1 | 4 => Crop::all().len(),
            2 => FarmingType::all().len(),
            3 => match self.region_focus {
                RegionFocus::State => states().len(),
                RegionFocus::District => districts_for_state(&self.session.form().state).len(),
            },
            5 => SoilRow::all().len(),
            _ => 0,
        }
    }

    fn active_list(&mut self) -> Option<&mut ListState> {
        match self.current_step() {
            1 => Some(&mut self.crop_state),
            2 => Some(&mut self.farming_state),
            3 => Some(match self.region_focus {
                RegionFocus::State => &mut self.state_state,
                RegionFocus::District => &mut self.district_state,
            }),
            4 => Some(&mut self.previous_crop_state),
            5 => Some(&mut self.soil_state),
            _ => None,
        }
    }

    pub fn list_down(&mut self) {
        let len = self.list_len();
        if let Some(state) = self.active_list() {
            if len > 0 {
                let i = state.selected().unwrap_or(0);
                state.select(Some((i + 1).min(len - 1)));
            }
        }
    }

    pub fn list_up(&mut self) {
        if let Some(state) = self.active_list() {
            let i = state.selected().unwrap_or(0);
            state.select(Some(i.saturating_sub(1)));
        }
    }

    pub fn toggle_region_focus(&mut self) {
        self.region_focus = match self.region_focus {
            RegionFocus::State => RegionFocus::District,
            RegionFocus::District => RegionFocus::State,
        };
    }

    /// Apply the highlighted option to the form
    pub fn choose_highlighted(&mut self) {
        match self.current_step() {
            1 => {
                if let Some(crop) = self.crop_state.selected().and_then(|i| Crop::all().get(i).copied()) {
                    self.session.select_crop(crop);
                }
            }
            2 => {
                if let Some(kind) = self
                    .farming_state
                    .selected()
                    .and_then(|i| FarmingType::all().get(i).copied())
                {
                    self.session.select_farming_type(kind);
                }
            }
            3 => match self.region_focus {
                RegionFocus::State => {
                    if let Some(state) = self.state_state.selected().and_then(|i| states().get(i).copied()) {
                        self.session.select_state(state);
                        self.sync_region_cursors();
                    }
                }
                RegionFocus::District => {
                    let districts = districts_for_state(&self.session.form().state);
                    if let Some(district) = self.district_state.selected().and_then(|i| districts.get(i).copied()) {
                        self.session.select_district(district);
                    }
                }
            },
            4 => {
                if let Some(crop) = self
                    .previous_crop_state
                    .selected()
                    .and_then(|i| Crop::all().get(i).copied())
                {
                    self.session.select_previous_crop(crop);
                }
            }
            5 => self.begin_soil_edit(),
            _ => {}
        }
    }

    // Soil step editing

    pub fn selected_soil_row(&self) -> SoilRow {
        self.soil_state
            .selected()
            .and_then(|i| SoilRow::all().get(i).copied())
            .unwrap_or(SoilRow::TestFile)
    }

    fn begin_soil_edit(&mut self) {
        self.cursor = self.soil_text().chars().count();
        self.input_mode = InputMode::Editing;
    }

    pub fn soil_text(&self) -> String {
        match self.selected_soil_row() {
            SoilRow::Reading(field) => self
                .session
                .form()
                .soil_parameters
                .as_ref()
                .map(|soil| soil.get(field).to_string())
                .unwrap_or_default(),
            SoilRow::TestFile => self.soil_test_file_input.clone(),
        }
    }

    /// Text buffer the editing keys operate on for the current step
    pub fn edit_buffer(&mut self) -> Option<&mut String> {
        match self.current_step() {
            5 => Some(match self.selected_soil_row() {
                SoilRow::Reading(field) => self.session.soil_value_mut(field),
                SoilRow::TestFile => &mut self.soil_test_file_input,
            }),
            6 => Some(&mut self.session.chat_input),
            _ => None,
        }
    }

    pub fn finish_soil_edit(&mut self) {
        if self.selected_soil_row() == SoilRow::TestFile {
            let path = self.soil_test_file_input.trim();
            self.session
                .set_soil_test_file((!path.is_empty()).then(|| path.into()));
        }
        self.input_mode = InputMode::Normal;
    }

    // Requests

    pub fn send_chat_input(&mut self) {
        if let Some(request) = self.session.begin_chat_from_input() {
            self.cursor = 0;
            let handle = self.spawn_request(&request);
            self.chat_task = Some((request.ticket, handle));
            self.scroll_chat_to_bottom();
        }
    }

    pub fn start_planning(&mut self) {
        if let Some(request) = self.session.begin_start_planning() {
            let handle = self.spawn_request(&request);
            self.chat_task = Some((request.ticket, handle));
            self.scroll_chat_to_bottom();
        }
    }

    pub fn direct_submit(&mut self) {
        if let Some(request) = self.session.begin_direct_submit() {
            let handle = self.spawn_request(&request);
            self.direct_task = Some((request.ticket, handle));
        }
    }

    fn spawn_request(&self, request: &PendingRequest) -> PredictionTask {
        let client = self.client.clone();
        let query = request.query.clone();
        let context = request.context.clone();
        tokio::spawn(async move { client.send_prediction_request(&query, Some(&context)).await })
    }

    /// Collect finished requests into the session (called on every tick)
    pub async fn poll_requests(&mut self) {
        if self.chat_task.as_ref().is_some_and(|(_, handle)| handle.is_finished()) {
            if let Some((ticket, handle)) = self.chat_task.take() {
                let result = handle.await.unwrap_or_else(|e| {
                    warn!(error = %e, "chat task ended without a result");
                    Err(PredictionError::Aborted(e.to_string()))
                });
                self.session.finish_chat(ticket, result);
                self.scroll_chat_to_bottom();
            }
        }

        if self.direct_task.as_ref().is_some_and(|(_, handle)| handle.is_finished()) {
            if let Some((ticket, handle)) = self.direct_task.take() {
                let result = handle.await.unwrap_or_else(|e| {
                    warn!(error = %e, "direct task ended without a result");
                    Err(PredictionError::Aborted(e.to_string()))
                });
                self.session.finish_direct_submit(ticket, result);
            }
        }
    }

    fn abort_tasks(&mut self) {
        if let Some((_, handle)) = self.chat_task.take() {
            handle.abort();
        }
        if let Some((_, handle)) = self.direct_task.take() {
            handle.abort();
        }
        self.session.cancel_in_flight();
    }

    pub fn shutdown(&mut self) {
        self.abort_tasks();
        self.session.restart();
    }

    // Voice

    pub async fn toggle_recording(&mut self) {
        if self.session.is_recording() {
            if self.session.stop_recording(self.transcriber.as_ref()) {
                self.cursor = self.session.chat_input.chars().count();
            }
        } else {
            self.session.start_recording(self.microphone.as_ref()).await;
        }
    }

    // Ticks

    pub async fn on_tick(&mut self) {
        self.poll_requests().await;

        if self.session.is_loading() || self.session.is_direct_pending() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }

        if let Some(toast) = &mut self.toast {
            toast.ticks_left = toast.ticks_left.saturating_sub(1);
            if toast.ticks_left == 0 {
                self.toast = None;
            }
        }
        if let Some(notice) = self.session.take_notices().pop() {
            self.toast = Some(Toast {
                notice,
                ticks_left: TOAST_TICKS,
            });
        }
    }

    // Chat scrolling

    pub fn scroll_chat_down(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_add(1);
    }

    pub fn scroll_chat_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    /// Scroll chat to bottom so the latest message (or "Thinking...") is visible
    pub fn scroll_chat_to_bottom(&mut self) {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        // Replies are unbounded; count wide and clamp to what a scroll offset can hold
        let mut total_lines: usize = 0;
        for msg in self.session.transcript().messages() {
            total_lines = total_lines.saturating_add(1); // "You:" / "CropBot:"
            for line in msg.content.lines() {
                let char_count = line.chars().count();
                total_lines = total_lines.saturating_add(char_count / wrap_width + 1);
            }
            total_lines = total_lines.saturating_add(1);
        }
        if self.session.is_loading() {
            total_lines = total_lines.saturating_add(2);
        }

        let total_lines = u16::try_from(total_lines).unwrap_or(u16::MAX);
        let visible_height = if self.chat_height > 0 { self.chat_height } else { 20 };
        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cropplan_core::steps::TOTAL_STEPS;

    fn app() -> App {
        App::with_client(PredictionClient::new("http://127.0.0.1:9/chat"))
    }

    fn walk_to_chat(app: &mut App) {
        app.choose_highlighted(); // Paddy
        app.next_step();
        app.choose_highlighted(); // organic
        app.next_step();
        app.next_step(); // default region
        app.list_down();
        app.choose_highlighted(); // Groundnut
        app.next_step();
        app.next_step();
    }

    #[test]
    fn test_walk_through_form() {
        let mut app = app();
        walk_to_chat(&mut app);
        assert_eq!(app.current_step(), TOTAL_STEPS);
        assert_eq!(app.session.form().crop, Some(Crop::Paddy));
        assert_eq!(app.session.form().previous_crop, Some(Crop::Groundnut));
    }

    #[test]
    fn test_next_blocked_until_chosen() {
        let mut app = app();
        app.next_step();
        assert_eq!(app.current_step(), 1);
        app.list_down();
        app.choose_highlighted();
        app.next_step();
        assert_eq!(app.current_step(), 2);
        assert_eq!(app.session.form().crop, Some(Crop::Groundnut));
    }

    #[test]
    fn test_district_selection() {
        let mut app = app();
        app.choose_highlighted();
        app.next_step();
        app.choose_highlighted();
        app.next_step();

        app.toggle_region_focus();
        app.list_down();
        app.list_down();
        app.choose_highlighted();
        assert_eq!(app.session.form().district, "Vijayawada");
    }

    #[test]
    fn test_soil_edit_and_test_file() {
        let mut app = app();
        walk_to_chat(&mut app);
        app.previous_step();
        assert_eq!(app.current_step(), 5);

        app.choose_highlighted();
        assert_eq!(app.input_mode, InputMode::Editing);
        app.edit_buffer().unwrap().push_str("6.8");
        app.finish_soil_edit();
        assert_eq!(app.session.form().soil_parameters.as_ref().unwrap().ph, "6.8");

        for _ in 0..SoilRow::all().len() {
            app.list_down();
        }
        assert_eq!(app.selected_soil_row(), SoilRow::TestFile);
        app.choose_highlighted();
        app.edit_buffer().unwrap().push_str("reports/kadapa.pdf");
        app.finish_soil_edit();
        assert_eq!(
            app.session.form().soil_test_file.as_deref(),
            Some(std::path::Path::new("reports/kadapa.pdf"))
        );
    }

    #[tokio::test]
    async fn test_leaving_chat_aborts_request() {
        let mut app = app();
        walk_to_chat(&mut app);
        app.session.chat_input = "Predict yield".to_string();
        app.send_chat_input();
        assert!(app.chat_task.is_some());
        assert!(app.session.is_loading());

        app.previous_step();
        assert!(app.chat_task.is_none());
        assert!(!app.session.is_loading());
    }

    #[tokio::test]
    async fn test_microphone_notice_becomes_toast() {
        let mut app = app();
        walk_to_chat(&mut app);
        app.toggle_recording().await;
        assert!(!app.session.is_recording());

        app.on_tick().await;
        let toast = app.toast.as_ref().unwrap();
        assert_eq!(toast.notice.title, "Error");
        assert!(toast.notice.description.contains("microphone"));
    }

    async fn wait_finished(task: &Option<(RequestTicket, PredictionTask)>) {
        while !task.as_ref().is_some_and(|(_, handle)| handle.is_finished()) {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_huge_reply_scrolls_without_overflow() {
        let mut app = app();
        walk_to_chat(&mut app);
        let request = app.session.begin_chat("Predict yield").unwrap();
        let reply = PredictionResponse {
            reply: Some("x\n".repeat(70_000)),
            ..PredictionResponse::default()
        };
        app.session.finish_chat(request.ticket, Ok(reply));

        app.chat_height = 20;
        app.scroll_chat_to_bottom();
        assert_eq!(app.chat_scroll, u16::MAX - 20);
    }

    #[tokio::test]
    async fn test_aborted_chat_task_keeps_direct_result() {
        let mut app = app();
        walk_to_chat(&mut app);

        let chat = app.session.begin_chat("Predict yield").unwrap();
        let handle = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok(PredictionResponse::default())
        });
        handle.abort();
        app.chat_task = Some((chat.ticket, handle));

        let direct = app.session.begin_direct_submit().unwrap();
        app.direct_task = Some((
            direct.ticket,
            tokio::spawn(async {
                Ok(PredictionResponse {
                    reply: Some("ok".to_string()),
                    ..PredictionResponse::default()
                })
            }),
        ));

        wait_finished(&app.chat_task).await;
        wait_finished(&app.direct_task).await;
        app.poll_requests().await;

        assert_eq!(app.session.direct_result().and_then(|r| r.reply.as_deref()), Some("ok"));
        assert_eq!(
            app.session.transcript().last().map(|m| m.content.as_str()),
            Some(cropplan_core::session::FALLBACK_REPLY)
        );
        assert!(!app.session.is_loading());
        assert_eq!(app.session.notices().len(), 1);
    }

    #[test]
    fn test_restart_resets_cursors() {
        let mut app = app();
        app.list_down();
        app.choose_highlighted();
        app.restart();
        assert_eq!(app.current_step(), 1);
        assert_eq!(app.crop_state.selected(), Some(0));
        assert_eq!(app.session.form().crop, None);
    }
}
