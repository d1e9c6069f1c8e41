use std::sync::Arc;

use chat_core::{ChatSession, Completer, CompletionError, CredentialError, Notification};
use ratatui::layout::Rect;
use tokio::task::JoinHandle;
use tracing::debug;

/// Ticks a toast stays on screen
pub const TOAST_TICKS: u8 = 12;
/// Ticks a newly arrived turn is drawn dimmed
pub const FADE_TICKS: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Credential,
    Input,
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub notification: Notification,
    pub ticks_left: u8,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub focus: FocusPane,

    // Conversation and the client that answers it
    pub session: ChatSession,
    pub completer: Arc<dyn Completer>,
    pub model: String,
    pub query_task: Option<JoinHandle<Result<String, CompletionError>>>,

    // Chat input
    pub query_input: String,
    pub query_cursor: usize,

    // Credential form
    pub api_key_input: String,
    pub api_key_input_cursor: usize,

    // Chat log view
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    pub chat_area: Option<Rect>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation
    pub fade_from: usize,
    pub fade_ticks: u8,
    seen_turns: usize,

    pub toasts: Vec<Toast>,
}

impl App {
    pub fn new(session: ChatSession, completer: Arc<dyn Completer>, model: impl Into<String>) -> Self {
        let focus = if session.needs_credential() {
            FocusPane::Credential
        } else {
            FocusPane::Input
        };

        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            focus,

            session,
            completer,
            model: model.into(),
            query_task: None,

            query_input: String::new(),
            query_cursor: 0,

            api_key_input: String::new(),
            api_key_input_cursor: 0,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            chat_area: None,

            animation_frame: 0,
            fade_from: 0,
            fade_ticks: 0,
            seen_turns: 0,

            toasts: Vec::new(),
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.session.is_pending() || self.query_task.is_some()
    }

    pub fn show_credential_form(&self) -> bool {
        self.session.needs_credential()
    }

    /// Send the chat input. Ignored while a reply is outstanding.
    pub fn submit_query(&mut self) {
        if self.is_waiting() {
            debug!("submission ignored, response pending");
            return;
        }

        let pending = match self.session.start_turn(&self.query_input) {
            Ok(pending) => pending,
            Err(e) => {
                debug!(error = %e, "submission rejected");
                return;
            }
        };

        self.query_input.clear();
        self.query_cursor = 0;
        self.note_new_turns();
        self.scroll_to_bottom();

        let completer = Arc::clone(&self.completer);
        self.query_task = Some(tokio::spawn(async move {
            pending.run(completer.as_ref()).await
        }));
    }

    /// Pick up the reply if the background request has finished.
    pub async fn poll_completion(&mut self) {
        let finished = self
            .query_task
            .as_ref()
            .map(|task| task.is_finished())
            .unwrap_or(false);
        if finished {
            self.finish_pending().await;
        }
    }

    /// Wait for the outstanding request, however long it takes, and apply it.
    pub async fn finish_pending(&mut self) {
        let Some(task) = self.query_task.take() else {
            return;
        };

        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(CompletionError::Network(format!("completion task failed: {}", e))),
        };

        if let Some(notification) = self.session.finish_turn(outcome) {
            self.push_toast(notification);
        }
        if self.session.needs_credential() {
            self.focus = FocusPane::Credential;
        }
        self.note_new_turns();
        self.scroll_to_bottom();
    }

    pub fn submit_api_key(&mut self) {
        match self.session.save_credential(&self.api_key_input) {
            Ok(notification) => {
                self.push_toast(notification);
                self.api_key_input.clear();
                self.api_key_input_cursor = 0;
                self.focus = FocusPane::Input;
            }
            Err(CredentialError::Empty) => {
                self.push_toast(Notification::error("Please enter your API key."));
            }
            Err(e) => {
                self.push_toast(Notification::error(format!("Could not save API key: {}", e)));
            }
        }
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            FocusPane::Input if self.show_credential_form() => FocusPane::Credential,
            _ => FocusPane::Input,
        };
        self.input_mode = InputMode::Editing;
    }

    pub fn push_toast(&mut self, notification: Notification) {
        self.toasts.push(Toast {
            notification,
            ticks_left: TOAST_TICKS,
        });
    }

    /// Tick animation, toast and fade timers (called by Tick event)
    pub fn tick(&mut self) {
        if self.is_waiting() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }

        for toast in &mut self.toasts {
            toast.ticks_left = toast.ticks_left.saturating_sub(1);
        }
        self.toasts.retain(|t| t.ticks_left > 0);

        self.fade_ticks = self.fade_ticks.saturating_sub(1);
    }

    /// Whether the turn at `idx` only just arrived
    pub fn is_fading(&self, idx: usize) -> bool {
        self.fade_ticks > 0 && idx >= self.fade_from
    }

    fn note_new_turns(&mut self) {
        let len = self.session.conversation().len();
        if len > self.seen_turns {
            self.fade_from = self.seen_turns;
            self.fade_ticks = FADE_TICKS;
            self.seen_turns = len;
        }
    }

    pub fn scroll_down(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_add(1).min(self.max_scroll());
    }

    pub fn scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_half_page_down(&mut self) {
        let half = (self.chat_height / 2).max(1);
        self.chat_scroll = self.chat_scroll.saturating_add(half).min(self.max_scroll());
    }

    pub fn scroll_half_page_up(&mut self) {
        let half = (self.chat_height / 2).max(1);
        self.chat_scroll = self.chat_scroll.saturating_sub(half);
    }

    pub fn scroll_to_top(&mut self) {
        self.chat_scroll = 0;
    }

    /// Scroll chat to bottom so the latest turn (or "Thinking...") is visible
    pub fn scroll_to_bottom(&mut self) {
        self.chat_scroll = self.max_scroll();
    }

    fn max_scroll(&self) -> u16 {
        let visible_height = if self.chat_height > 0 { self.chat_height } else { 20 };
        self.total_chat_lines().saturating_sub(visible_height)
    }

    /// Approximate wrapped line count of the chat log
    fn total_chat_lines(&self) -> u16 {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 { self.chat_width as usize } else { 50 };

        let mut total_lines: u16 = 0;
        for turn in self.session.conversation().turns() {
            total_lines = total_lines.saturating_add(1); // Speaker line
            for line in turn.text().lines() {
                let char_count = line.chars().count();
                let wrapped = if char_count == 0 { 1 } else { char_count / wrap_width + 1 };
                total_lines = total_lines.saturating_add(wrapped as u16);
            }
            total_lines = total_lines.saturating_add(1); // Blank line after turn
        }

        if self.is_waiting() {
            total_lines = total_lines.saturating_add(2); // "AI:" + "Thinking..."
        }
        total_lines
    }
}
