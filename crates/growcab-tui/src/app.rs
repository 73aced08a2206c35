use std::sync::Arc;
use std::time::{Duration, Instant};

use growcab_core::detect::extract_plant_from_response;
use growcab_core::intent::{classify, local_reply};
use growcab_core::plants::{self, PlantCard};
use growcab_core::{
    ChatClient, ChatContext, ChatError, ChatMessage, ChatRole, Config, Conversation, PollState,
    SensorPoller, Settings, StreamEnd, StreamSummary,
};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::tui::AppEvent;

const NOTIFICATION_TTL: Duration = Duration::from_secs(6);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Error,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub message: String,
    pub level: NotificationLevel,
    pub expires_at: Instant,
}

pub struct App {
    pub should_quit: bool,
    pub settings: Settings,

    // Sensor
    pub poller: Arc<SensorPoller>,
    pub sensor: PollState,

    // Chat
    pub chat: ChatClient,
    pub conversation: Conversation,
    pub input: String,
    pub input_cursor: usize, // in chars
    pub chat_cancel: Option<CancellationToken>,
    pub chat_scroll: u16,    // lines scrolled up from the bottom

    // Plant profile
    pub plant_idx: usize,
    pub detected_plant: Option<String>,

    pub notification: Option<Notification>,
    pub animation_frame: u8,

    events: UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(settings: Settings, events: UnboundedSender<AppEvent>) -> Self {
        let poller = Arc::new(SensorPoller::from_settings(&settings));
        let chat = ChatClient::from_settings(&settings);
        let plant_idx = plants::plants()
            .iter()
            .position(|p| p.id == settings.default_plant)
            .unwrap_or_else(|| {
                warn!(plant = %settings.default_plant, "unknown default plant, using fallback");
                plants::plants()
                    .iter()
                    .position(|p| p.id == plants::default_plant().id)
                    .unwrap_or(0)
            });

        Self {
            should_quit: false,
            settings,
            poller,
            sensor: PollState::default(),
            chat,
            conversation: Conversation::with_greeting(),
            input: String::new(),
            input_cursor: 0,
            chat_cancel: None,
            chat_scroll: 0,
            plant_idx,
            detected_plant: None,
            notification: None,
            animation_frame: 0,
            events,
        }
    }

    pub fn selected_plant(&self) -> &'static PlantCard {
        &plants::plants()[self.plant_idx]
    }

    pub fn is_streaming(&self) -> bool {
        self.chat_cancel.is_some()
    }

    pub fn apply_sensor(&mut self, state: PollState) {
        self.sensor = state;
    }

    pub fn refetch(&self) {
        let poller = Arc::clone(&self.poller);
        tokio::spawn(async move { poller.refetch().await });
    }

    pub fn next_plant(&mut self) {
        let count = plants::plants().len();
        self.select_plant((self.plant_idx + 1) % count);
    }

    pub fn prev_plant(&mut self) {
        let count = plants::plants().len();
        self.select_plant((self.plant_idx + count - 1) % count);
    }

    fn select_plant(&mut self, idx: usize) {
        // The streaming reply must stay the last message
        if self.is_streaming() {
            self.notify(NotificationLevel::Info, "Wait for the reply to finish before switching plants");
            return;
        }

        self.plant_idx = idx;
        let plant = self.selected_plant();
        self.conversation.push(ChatMessage::assistant(plant.setpoint_summary()));
        self.chat_scroll = 0;
        self.notification = None;

        if let Err(e) = Config::save_default_plant(plant.id) {
            warn!(error = %e, "could not persist selected plant");
        }
    }

    /// Submit the input line as a user turn and start streaming the reply.
    pub fn send_message(&mut self) {
        let content = self.input.trim().to_string();
        if content.is_empty() || self.is_streaming() {
            return;
        }

        self.conversation.push(ChatMessage::user(content));
        self.input.clear();
        self.input_cursor = 0;
        self.chat_scroll = 0;
        self.notification = None;

        let history = self.conversation.messages().to_vec();
        let context = ChatContext::new(self.selected_plant().id)
            .with_snapshot(self.sensor.data.as_ref());
        let cancel = CancellationToken::new();
        self.chat_cancel = Some(cancel.clone());

        let client = self.chat.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = client
                .send(&history, &context, &cancel, |delta| {
                    let _ = events.send(AppEvent::ChatDelta(delta.to_string()));
                })
                .await;
            let _ = events.send(AppEvent::ChatFinished(result));
        });
    }

    pub fn cancel_stream(&mut self) {
        if let Some(cancel) = &self.chat_cancel {
            cancel.cancel();
        }
    }

    pub fn apply_delta(&mut self, delta: &str) {
        if self.is_streaming() {
            self.conversation.append_assistant_delta(delta);
        }
    }

    pub fn finish_stream(&mut self, result: Result<StreamSummary, ChatError>) {
        self.chat_cancel = None;

        match result {
            Ok(summary) => {
                info!(end = ?summary.end, "assistant reply finished");
                if summary.end == StreamEnd::Cancelled {
                    self.notify(NotificationLevel::Info, "Reply cancelled");
                }
                if let Some(plant) = extract_plant_from_response(&summary.content) {
                    self.detected_plant = Some(plant);
                }
            }
            Err(e) => {
                warn!(error = %e, "assistant reply failed");
                let message = if e.is_service_unavailable() {
                    format!("{e}. Local tip: {}", self.offline_tip())
                } else {
                    e.to_string()
                };
                self.notify(NotificationLevel::Error, message);
            }
        }
    }

    /// Canned advice for the latest user question.
    fn offline_tip(&self) -> String {
        let question = self
            .conversation
            .messages()
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        local_reply(self.selected_plant(), classify(question))
    }

    pub fn notify(&mut self, level: NotificationLevel, message: impl Into<String>) {
        self.notification = Some(Notification {
            message: message.into(),
            level,
            expires_at: Instant::now() + NOTIFICATION_TTL,
        });
    }

    pub fn tick(&mut self) {
        self.animation_frame = (self.animation_frame + 1) % 4;
        if self
            .notification
            .as_ref()
            .is_some_and(|n| n.expires_at <= Instant::now())
        {
            self.notification = None;
        }
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    /// Stop background work before the terminal is restored.
    pub fn shutdown(&mut self) {
        self.cancel_stream();
        self.poller.stop_polling();
    }

    // Input line editing (cursor counted in chars)

    fn cursor_byte_index(&self) -> usize {
        self.input
            .char_indices()
            .nth(self.input_cursor)
            .map(|(i, _)| i)
            .unwrap_or(self.input.len())
    }

    pub fn insert_char(&mut self, c: char) {
        let idx = self.cursor_byte_index();
        self.input.insert(idx, c);
        self.input_cursor += 1;
    }

    pub fn delete_before_cursor(&mut self) {
        if self.input_cursor == 0 {
            return;
        }
        self.input_cursor -= 1;
        let idx = self.cursor_byte_index();
        self.input.remove(idx);
    }

    pub fn delete_at_cursor(&mut self) {
        if self.input_cursor < self.input.chars().count() {
            let idx = self.cursor_byte_index();
            self.input.remove(idx);
        }
    }

    pub fn cursor_left(&mut self) {
        self.input_cursor = self.input_cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        self.input_cursor = (self.input_cursor + 1).min(self.input.chars().count());
    }

    pub fn cursor_home(&mut self) {
        self.input_cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        self.input_cursor = self.input.chars().count();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn test_app() -> (App, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let settings = Settings::resolve(&Config::new(), |_| None);
        (App::new(settings, tx), rx)
    }

    #[test]
    fn test_starts_on_default_plant_with_greeting() {
        let (app, _rx) = test_app();
        assert_eq!(app.selected_plant().id, plants::DEFAULT_PLANT_ID);
        assert_eq!(app.conversation.len(), 1);
        assert!(!app.is_streaming());
    }

    #[test]
    fn test_input_editing_is_char_based() {
        let (mut app, _rx) = test_app();
        for c in "pH 6✓".chars() {
            app.insert_char(c);
        }
        app.cursor_left();
        app.delete_before_cursor();
        assert_eq!(app.input, "pH ✓");

        app.cursor_home();
        app.delete_at_cursor();
        assert_eq!(app.input, "H ✓");
        app.cursor_end();
        assert_eq!(app.input_cursor, 3);
    }

    #[test]
    fn test_deltas_ignored_when_not_streaming() {
        let (mut app, _rx) = test_app();
        app.apply_delta("stray");
        assert_eq!(app.conversation.len(), 1);
    }

    #[test]
    fn test_rate_limit_notifies_without_message() {
        let (mut app, _rx) = test_app();
        app.conversation.push_user("hi");
        app.chat_cancel = Some(CancellationToken::new());

        app.finish_stream(Err(ChatError::RateLimited));

        assert!(!app.is_streaming());
        assert_eq!(app.conversation.len(), 2);
        let notification = app.notification.expect("notified");
        assert_eq!(notification.level, NotificationLevel::Error);
        assert_eq!(notification.message, "Rate limits exceeded, please try again later.");
    }

    #[test]
    fn test_outage_notification_carries_local_tip() {
        let (mut app, _rx) = test_app();
        app.conversation.push_user("what pH should I use?");
        app.chat_cancel = Some(CancellationToken::new());

        app.finish_stream(Err(ChatError::StreamUnavailable));

        let message = app.notification.expect("notified").message;
        assert!(message.contains("Local tip:"));
        assert!(message.contains("prefers pH"));
    }

    #[test]
    fn test_streamed_reply_detects_plant() {
        let (mut app, _rx) = test_app();
        app.conversation.push_user("what should I grow?");
        app.chat_cancel = Some(CancellationToken::new());
        app.apply_delta("You could try basil.");
        app.finish_stream(Ok(StreamSummary {
            content: "You could try basil.".to_string(),
            end: StreamEnd::Done,
        }));

        assert_eq!(app.detected_plant.as_deref(), Some("Basil"));
        assert_eq!(app.conversation.len(), 3);
        assert!(app.notification.is_none());
    }

    #[test]
    fn test_plant_switch_blocked_while_streaming() {
        let (mut app, _rx) = test_app();
        let before = app.plant_idx;
        app.chat_cancel = Some(CancellationToken::new());
        app.next_plant();
        assert_eq!(app.plant_idx, before);
        assert_eq!(app.conversation.len(), 1);
    }
}
