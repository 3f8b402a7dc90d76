//! Message thread state: load/send lifecycle, optimistic echo and rollback,
//! and the character-reveal animation for bot replies.
//!
//! In-flight loads are tagged with the target chat and a request counter;
//! a response whose tag no longer matches the current selection is discarded
//! rather than misapplied. The reveal animation is an explicit tick sequence
//! owned by this controller and canceled whenever the conversation changes,
//! never a mutation of the stored message text.

use crate::api::{ApiError, ChatApi, FileUpload, Message, ProgressFn, Sender};
use chrono::Utc;
use std::time::Duration;

/// How long the CLI convenience path keeps a finished upload bar on screen
/// before the reply lands.
const UPLOAD_GRACE: Duration = Duration::from_millis(500);

/// Thread lifecycle per conversation selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadState {
    /// No conversation selected; the shell renders a placeholder.
    #[default]
    Idle,
    /// History fetch in progress; sending is blocked.
    Loading,
    /// History present; sends accepted.
    Ready,
}

/// Tag for an in-flight history load. Compared against the controller's
/// current selection when the result arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTag {
    request: u64,
    pub chat_id: String,
}

/// An optimistic send in flight: the temporary message to reconcile or roll
/// back once the backend answers.
#[derive(Debug, Clone)]
pub struct PendingSend {
    pub message_id: String,
    pub chat_id: String,
    pub has_file: bool,
}

/// Reveal animation state for one bot reply.
#[derive(Debug, Clone)]
struct Reveal {
    message_id: String,
    shown_chars: usize,
    total_chars: usize,
}

/// Controller for the visible message thread.
#[derive(Debug, Default)]
pub struct MessageThread {
    chat_id: Option<String>,
    state: ThreadState,
    messages: Vec<Message>,
    typing: bool,
    upload_progress: Option<f64>,
    uploading_message_id: Option<String>,
    reveal: Option<Reveal>,
    revealed: Vec<String>,
    last_error: Option<String>,
    next_request: u64,
}

impl MessageThread {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ThreadState {
        self.state
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn typing(&self) -> bool {
        self.typing
    }

    /// Upload completion in [0, 100] while an attachment is being displayed.
    pub fn upload_progress(&self) -> Option<f64> {
        self.upload_progress
    }

    /// Id of the optimistic message whose attachment is currently uploading.
    pub fn uploading_message_id(&self) -> Option<&str> {
        self.uploading_message_id.as_deref()
    }

    pub fn take_error(&mut self) -> Option<String> {
        self.last_error.take()
    }

    /// Select a conversation and enter `Loading`. Cancels any running reveal
    /// animation and invalidates responses to earlier loads.
    pub fn open(&mut self, chat_id: &str) -> LoadTag {
        self.next_request += 1;
        self.chat_id = Some(chat_id.to_string());
        self.state = ThreadState::Loading;
        self.messages.clear();
        self.reset_transient();
        LoadTag {
            request: self.next_request,
            chat_id: chat_id.to_string(),
        }
    }

    /// Deselect; back to the placeholder with no messages.
    pub fn close(&mut self) {
        self.next_request += 1;
        self.chat_id = None;
        self.state = ThreadState::Idle;
        self.messages.clear();
        self.reset_transient();
    }

    fn reset_transient(&mut self) {
        self.typing = false;
        self.upload_progress = None;
        self.uploading_message_id = None;
        self.reveal = None;
        self.revealed.clear();
    }

    /// Apply a history load result. Stale results (an older request, or a
    /// chat that is no longer selected) are discarded.
    pub fn apply_loaded(&mut self, tag: &LoadTag, result: Result<Vec<Message>, ApiError>) {
        if tag.request != self.next_request || self.chat_id.as_deref() != Some(tag.chat_id.as_str()) {
            log::debug!("discarding stale message load for chat {}", tag.chat_id);
            return;
        }
        self.state = ThreadState::Ready;
        match result {
            Ok(messages) => self.messages = messages,
            Err(e) => {
                log::warn!("failed to load messages: {}", e);
                self.messages.clear();
                self.last_error = Some("Failed to load messages".to_string());
            }
        }
    }

    /// Select `chat_id` and fetch its history in one await.
    pub async fn load(&mut self, api: &dyn ChatApi, token: &str, chat_id: &str) {
        let tag = self.open(chat_id);
        let result = api.list_messages(chat_id, token).await;
        self.apply_loaded(&tag, result);
    }

    /// True when the input bar may submit: a conversation is loaded, a model
    /// is chosen, the text is non-empty, and no send is already in flight.
    pub fn can_send(&self, model_selected: bool, text: &str) -> bool {
        self.state == ThreadState::Ready
            && self.chat_id.is_some()
            && model_selected
            && !text.trim().is_empty()
            && !self.typing
    }

    /// Append the optimistic user message and mark typing. The attachment's
    /// stored name stays empty until the server responds. Returns None when
    /// the thread cannot send (no chat, still loading, empty text).
    pub fn begin_send(&mut self, text: &str, file: Option<&FileUpload>) -> Option<PendingSend> {
        let chat_id = self.chat_id.clone()?;
        if self.state != ThreadState::Ready || text.trim().is_empty() {
            return None;
        }
        let message_id = format!("temp_{}", uuid::Uuid::new_v4());
        self.messages.push(Message {
            id: message_id.clone(),
            sender: Sender::User,
            text: text.trim().to_string(),
            image: None,
            timestamp: Utc::now(),
            file: file.map(FileUpload::file_info),
        });
        self.typing = true;
        if file.is_some() {
            self.upload_progress = Some(0.0);
            self.uploading_message_id = Some(message_id.clone());
        }
        Some(PendingSend {
            message_id,
            chat_id,
            has_file: file.is_some(),
        })
    }

    /// Advisory progress update from the upload callback.
    pub fn set_upload_progress(&mut self, pct: f64) {
        if self.uploading_message_id.is_some() {
            self.upload_progress = Some(pct.clamp(0.0, 100.0));
        }
    }

    /// Reconcile a send. On success the authoritative reply is appended and
    /// its reveal animation started; on failure the optimistic message is
    /// removed and exactly one synthetic error message appended. A result for
    /// a conversation that is no longer selected is discarded.
    pub fn apply_send(&mut self, pending: PendingSend, result: Result<Message, ApiError>) {
        if self.chat_id.as_deref() != Some(pending.chat_id.as_str()) {
            log::debug!("discarding send result for deselected chat {}", pending.chat_id);
            return;
        }
        self.typing = false;
        self.upload_progress = None;
        self.uploading_message_id = None;
        match result {
            Ok(reply) => {
                self.reveal = Some(Reveal {
                    message_id: reply.id.clone(),
                    shown_chars: 0,
                    total_chars: reply.text.chars().count(),
                });
                self.messages.push(reply);
            }
            Err(e) => {
                log::warn!("failed to send message: {}", e);
                self.messages.retain(|m| m.id != pending.message_id);
                self.messages.push(Message {
                    id: format!("error_{}", uuid::Uuid::new_v4()),
                    sender: Sender::Bot,
                    text: "Server error: failed to send message.".to_string(),
                    image: None,
                    timestamp: Utc::now(),
                    file: None,
                });
                self.reveal = None;
                self.last_error = Some(e.to_string());
            }
        }
    }

    /// Optimistic send, upload, and reconciliation in one await. Holds the
    /// full progress bar briefly after a file upload so the jump to 100 is
    /// visible before the reply lands.
    pub async fn send(
        &mut self,
        api: &dyn ChatApi,
        token: &str,
        text: &str,
        file: Option<FileUpload>,
        model_id: Option<&str>,
        on_progress: Option<ProgressFn>,
    ) -> bool {
        let Some(pending) = self.begin_send(text, file.as_ref()) else {
            return false;
        };
        let result = api
            .send_message(&pending.chat_id, text.trim(), token, file, model_id, on_progress)
            .await;
        if pending.has_file && result.is_ok() {
            tokio::time::sleep(UPLOAD_GRACE).await;
        }
        let ok = result.is_ok();
        self.apply_send(pending, result);
        ok
    }

    /// True while a bot reply is still revealing.
    pub fn revealing(&self) -> bool {
        self.reveal.is_some()
    }

    /// Advance the reveal animation by one character. At tick k the display
    /// shows the first min(k, N) characters; the tick after the last
    /// character marks the animation complete. Returns false once there is
    /// nothing left to animate.
    pub fn tick_reveal(&mut self) -> bool {
        let Some(reveal) = self.reveal.as_mut() else {
            return false;
        };
        if reveal.shown_chars < reveal.total_chars {
            reveal.shown_chars += 1;
        } else {
            let done = reveal.message_id.clone();
            self.reveal = None;
            self.revealed.push(done);
        }
        true
    }

    /// Text to display for `message`: the reveal prefix while its animation
    /// runs, the full authoritative text otherwise.
    pub fn display_text<'a>(&self, message: &'a Message) -> &'a str {
        match &self.reveal {
            Some(r) if r.message_id == message.id => {
                let end = message
                    .text
                    .char_indices()
                    .nth(r.shown_chars)
                    .map(|(i, _)| i)
                    .unwrap_or(message.text.len());
                &message.text[..end]
            }
            _ => &message.text,
        }
    }

    /// The copy affordance unlocks for bot messages that are not mid-reveal
    /// (historical messages were never animated; fresh ones must finish).
    pub fn copy_available(&self, message: &Message) -> bool {
        message.sender == Sender::Bot
            && !matches!(&self.reveal, Some(r) if r.message_id == message.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockClient;

    fn bot_message(id: &str, text: &str) -> Message {
        Message {
            id: id.to_string(),
            sender: Sender::Bot,
            text: text.to_string(),
            image: None,
            timestamp: Utc::now(),
            file: None,
        }
    }

    fn ready_thread(chat_id: &str) -> MessageThread {
        let mut thread = MessageThread::new();
        let tag = thread.open(chat_id);
        thread.apply_loaded(&tag, Ok(Vec::new()));
        thread
    }

    #[test]
    fn reveal_shows_char_prefixes_then_completes() {
        let mut thread = ready_thread("c1");
        let pending = thread.begin_send("hi", None).expect("send allowed");
        let reply = bot_message("b1", "héllo→");
        let total = reply.text.chars().count();
        thread.apply_send(pending, Ok(reply));

        let reply = thread.messages().last().unwrap().clone();
        assert_eq!(thread.display_text(&reply), "");
        assert!(!thread.copy_available(&reply));

        let prefixes: Vec<String> = (1..=total)
            .map(|_| {
                thread.tick_reveal();
                thread.display_text(&reply).to_string()
            })
            .collect();
        for (k, shown) in prefixes.iter().enumerate() {
            let expected: String = reply.text.chars().take(k + 1).collect();
            assert_eq!(shown, &expected);
        }
        // Still animating after showing the last character; one more tick completes.
        assert!(thread.revealing());
        assert!(thread.tick_reveal());
        assert!(!thread.revealing());
        assert!(thread.copy_available(&reply));
        assert!(!thread.tick_reveal());
        // The stored text was never touched.
        assert_eq!(reply.text, "héllo→");
    }

    #[test]
    fn send_failure_rolls_back_and_appends_one_error() {
        let mut thread = ready_thread("c1");
        let before = thread.messages().len();
        let pending = thread.begin_send("hello", None).expect("send allowed");
        let optimistic_id = pending.message_id.clone();
        assert!(thread.typing());

        thread.apply_send(pending, Err(ApiError::Api("network down".to_string())));
        assert_eq!(thread.messages().len(), before + 1);
        assert!(thread.messages().iter().all(|m| m.id != optimistic_id));
        let last = thread.messages().last().unwrap();
        assert_eq!(last.sender, Sender::Bot);
        assert!(last.id.starts_with("error_"));
        assert!(!thread.typing());
        assert!(thread.upload_progress().is_none());
        assert!(thread.take_error().is_some());
    }

    #[test]
    fn stale_load_results_are_discarded() {
        let mut thread = MessageThread::new();
        let stale = thread.open("a");
        let current = thread.open("b");

        thread.apply_loaded(&stale, Ok(vec![bot_message("m", "from chat a")]));
        assert_eq!(thread.state(), ThreadState::Loading);
        assert!(thread.messages().is_empty());

        thread.apply_loaded(&current, Ok(vec![bot_message("m", "from chat b")]));
        assert_eq!(thread.state(), ThreadState::Ready);
        assert_eq!(thread.messages().len(), 1);
    }

    #[test]
    fn send_result_for_deselected_chat_is_discarded() {
        let mut thread = ready_thread("a");
        let pending = thread.begin_send("hello", None).expect("send allowed");
        let tag = thread.open("b");
        thread.apply_loaded(&tag, Ok(Vec::new()));

        thread.apply_send(pending, Ok(bot_message("b1", "late reply")));
        assert!(thread.messages().is_empty());
        assert!(!thread.typing());
    }

    #[test]
    fn switching_chats_cancels_reveal() {
        let mut thread = ready_thread("a");
        let pending = thread.begin_send("hi", None).expect("send allowed");
        thread.apply_send(pending, Ok(bot_message("b1", "reply")));
        assert!(thread.revealing());
        thread.open("b");
        assert!(!thread.revealing());
    }

    #[test]
    fn gating_requires_ready_chat_model_and_text() {
        let mut thread = MessageThread::new();
        assert!(!thread.can_send(true, "hello"));
        let tag = thread.open("c1");
        assert!(!thread.can_send(true, "hello"), "loading blocks send");
        thread.apply_loaded(&tag, Ok(Vec::new()));
        assert!(!thread.can_send(false, "hello"), "model required");
        assert!(!thread.can_send(true, "   "), "text required");
        assert!(thread.can_send(true, "hello"));
        let _ = thread.begin_send("hello", None);
        assert!(!thread.can_send(true, "again"), "in-flight send blocks");
    }

    #[test]
    fn optimistic_attachment_has_no_stored_name() {
        let mut thread = ready_thread("c1");
        let file = FileUpload {
            filename: "report.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            bytes: vec![0u8; 1024],
        };
        let pending = thread.begin_send("see attached", Some(&file)).expect("send allowed");
        let info = thread
            .messages()
            .last()
            .and_then(|m| m.file.clone())
            .expect("attachment metadata");
        assert_eq!(info.filename, "report.pdf");
        assert_eq!(info.size, 1024);
        assert!(info.stored_as.is_empty());
        assert_eq!(thread.upload_progress(), Some(0.0));
        assert_eq!(thread.uploading_message_id(), Some(pending.message_id.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn send_against_mock_appends_reply_and_starts_reveal() {
        let api = MockClient::new();
        let mut thread = MessageThread::new();
        thread.load(&api, "tok", "1").await;
        assert_eq!(thread.state(), ThreadState::Ready);
        let before = thread.messages().len();

        let ok = thread.send(&api, "tok", "hello", None, Some("m1"), None).await;
        assert!(ok);
        assert_eq!(thread.messages().len(), before + 2);
        assert_eq!(thread.messages().last().unwrap().sender, Sender::Bot);
        assert!(thread.revealing());
        assert!(!thread.typing());
    }
}
