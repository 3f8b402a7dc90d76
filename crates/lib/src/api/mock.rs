//! In-memory stand-in for the remote API, used when debug mode is enabled.
//!
//! Mirrors the `ChatApi` contract over process-local state with artificial
//! latency and simulated upload progress, so every UI path exercised against
//! it behaves like the real backend. Rename/delete of an unknown id fail
//! with `ApiError::NotFound`, matching the remote 404 contract.

use super::{ApiError, Chat, ChatApi, FileInfo, FileUpload, LoginResponse, Message, Model, ProgressFn, Sender};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

const BOT_REPLIES: &[&str] = &[
    "That's an interesting question! Let me think about that.",
    "I can help you with that. Here's what I know...",
    "Great point! I'd love to explore this further.",
    "Let me process that information for you.",
    "That's a complex topic. Here's my perspective...",
    "I understand what you're asking. Let me explain...",
    "That's a good question! Here's what I can tell you...",
];

const REPLY_IMAGES: &[&str] = &[
    "https://picsum.photos/seed/1/1280/720",
    "https://picsum.photos/seed/2/1280/720",
    "https://picsum.photos/seed/3/1280/720",
    "https://picsum.photos/seed/4/1280/720",
    "https://picsum.photos/seed/5/1280/720",
];

/// Probability that a mock bot reply carries an image.
const IMAGE_PROBABILITY: f64 = 0.3;

struct MockState {
    chats: Vec<Chat>,
    messages: HashMap<String, Vec<Message>>,
}

/// Mock chat backend holding its state behind an async mutex.
pub struct MockClient {
    state: Mutex<MockState>,
}

/// Uniform value in [0, 1) from OS randomness; falls back to 0.5 so the mock
/// stays usable even if the entropy source fails.
fn rand_unit() -> f64 {
    let mut buf = [0u8; 8];
    if getrandom::getrandom(&mut buf).is_err() {
        return 0.5;
    }
    (u64::from_le_bytes(buf) >> 11) as f64 / (1u64 << 53) as f64
}

fn pick<'a>(items: &'a [&'a str]) -> &'a str {
    let idx = ((rand_unit() * items.len() as f64) as usize).min(items.len() - 1);
    items[idx]
}

fn bot_reply() -> Message {
    Message {
        id: format!("bot_{}", uuid::Uuid::new_v4()),
        sender: Sender::Bot,
        text: pick(BOT_REPLIES).to_string(),
        image: (rand_unit() < IMAGE_PROBABILITY).then(|| pick(REPLY_IMAGES).to_string()),
        timestamp: Utc::now(),
        file: None,
    }
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClient {
    /// A client pre-seeded with a few aged conversations and a greeting
    /// exchange, so grouping and history rendering have something to show.
    pub fn new() -> Self {
        let now = Utc::now();
        let chats = vec![
            Chat {
                id: "1".to_string(),
                created_at: now,
                title: "Today's Conversation".to_string(),
            },
            Chat {
                id: "2".to_string(),
                created_at: now - ChronoDuration::days(1),
                title: "Yesterday Chat".to_string(),
            },
            Chat {
                id: "3".to_string(),
                created_at: now - ChronoDuration::days(7),
                title: "Last Week Discussion".to_string(),
            },
            Chat {
                id: "4".to_string(),
                created_at: now - ChronoDuration::days(30),
                title: "Monthly Review".to_string(),
            },
        ];
        let mut messages = HashMap::new();
        messages.insert(
            "1".to_string(),
            vec![
                Message {
                    id: "1".to_string(),
                    sender: Sender::User,
                    text: "Hello! How are you today?".to_string(),
                    image: None,
                    timestamp: now,
                    file: None,
                },
                Message {
                    id: "2".to_string(),
                    sender: Sender::Bot,
                    text: "Hello! I'm doing great, thank you for asking. How can I help you today?"
                        .to_string(),
                    image: (rand_unit() < 0.5).then(|| REPLY_IMAGES[0].to_string()),
                    timestamp: now,
                    file: None,
                },
            ],
        );
        Self {
            state: Mutex::new(MockState { chats, messages }),
        }
    }
}

#[async_trait]
impl ChatApi for MockClient {
    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        if username.trim().is_empty() || password.is_empty() {
            return Err(ApiError::Api("Login failed".to_string()));
        }
        let user = crate::auth::SessionStore::debug_user();
        Ok(LoginResponse {
            username: user.username,
            token: user.token,
            profile_pic: user.profile_pic,
        })
    }

    async fn list_chats(&self, _token: &str) -> Result<Vec<Chat>, ApiError> {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(self.state.lock().await.chats.clone())
    }

    async fn create_chat(&self, _token: &str) -> Result<Chat, ApiError> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let chat = Chat {
            id: format!("debug_{}", Utc::now().timestamp_millis()),
            created_at: Utc::now(),
            title: "New Debug Chat".to_string(),
        };
        self.state.lock().await.chats.insert(0, chat.clone());
        Ok(chat)
    }

    async fn list_messages(&self, chat_id: &str, _token: &str) -> Result<Vec<Message>, ApiError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(self
            .state
            .lock()
            .await
            .messages
            .get(chat_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        _token: &str,
        file: Option<FileUpload>,
        _model_id: Option<&str>,
        on_progress: Option<ProgressFn>,
    ) -> Result<Message, ApiError> {
        let user_message = Message {
            id: format!("user_{}", uuid::Uuid::new_v4()),
            sender: Sender::User,
            text: text.to_string(),
            image: None,
            timestamp: Utc::now(),
            file: file.as_ref().map(|f| FileInfo {
                filename: f.filename.clone(),
                stored_as: format!("{}_{}", Utc::now().timestamp_millis(), f.filename),
                content_type: f.content_type.clone(),
                size: f.bytes.len() as u64,
            }),
        };
        self.state
            .lock()
            .await
            .messages
            .entry(chat_id.to_string())
            .or_default()
            .push(user_message);

        if file.is_some() {
            // Simulated upload: ragged increments on a timer, terminating at
            // exactly 100 before the reply is produced.
            if let Some(mut cb) = on_progress {
                let mut progress = 0.0_f64;
                while progress < 100.0 {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    progress = (progress + 5.0 + rand_unit() * 15.0).min(100.0);
                    cb(progress);
                }
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        } else {
            tokio::time::sleep(Duration::from_millis(
                1000 + (rand_unit() * 1500.0) as u64,
            ))
            .await;
        }

        let reply = bot_reply();
        self.state
            .lock()
            .await
            .messages
            .entry(chat_id.to_string())
            .or_default()
            .push(reply.clone());
        Ok(reply)
    }

    async fn rename_chat(&self, chat_id: &str, title: &str, _token: &str) -> Result<(), ApiError> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let mut state = self.state.lock().await;
        let chat = state
            .chats
            .iter_mut()
            .find(|c| c.id == chat_id)
            .ok_or(ApiError::NotFound)?;
        chat.title = title.to_string();
        Ok(())
    }

    async fn delete_chat(&self, chat_id: &str, _token: &str) -> Result<(), ApiError> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let mut state = self.state.lock().await;
        let idx = state
            .chats
            .iter()
            .position(|c| c.id == chat_id)
            .ok_or(ApiError::NotFound)?;
        state.chats.remove(idx);
        state.messages.remove(chat_id);
        Ok(())
    }

    async fn list_models(&self, _token: &str) -> Result<Vec<Model>, ApiError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(vec![
            Model {
                id: "Meta-Llama-3-8B.Q4_K_M.gguf".to_string(),
                name: "Llama 3 8B".to_string(),
            },
            Model {
                id: "Mistral-7B-Instruct-v0.2.Q4_K_M.gguf".to_string(),
                name: "Mistral 7B".to_string(),
            },
            Model {
                id: "GPT-4-Turbo.gguf".to_string(),
                name: "GPT-4 Turbo".to_string(),
            },
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    #[tokio::test(start_paused = true)]
    async fn upload_progress_is_monotone_and_ends_at_100() {
        let client = MockClient::new();
        let seen: Arc<StdMutex<Vec<f64>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let file = FileUpload {
            filename: "notes.txt".to_string(),
            content_type: "text/plain".to_string(),
            bytes: vec![0u8; 2048],
        };
        let reply = client
            .send_message(
                "1",
                "here is a file",
                "tok",
                Some(file),
                None,
                Some(Box::new(move |p| sink.lock().unwrap().push(p))),
            )
            .await
            .expect("send");
        assert_eq!(reply.sender, Sender::Bot);

        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress went backwards");
        assert_eq!(*seen.last().unwrap(), 100.0);
        assert!(seen.iter().all(|p| (0.0..=100.0).contains(p)));
    }

    #[tokio::test(start_paused = true)]
    async fn send_appends_user_message_then_reply() {
        let client = MockClient::new();
        let before = client.list_messages("1", "tok").await.expect("list").len();
        client
            .send_message("1", "hello", "tok", None, None, None)
            .await
            .expect("send");
        let after = client.list_messages("1", "tok").await.expect("list");
        assert_eq!(after.len(), before + 2);
        assert_eq!(after[after.len() - 2].sender, Sender::User);
        assert_eq!(after[after.len() - 1].sender, Sender::Bot);
    }

    #[tokio::test(start_paused = true)]
    async fn rename_and_delete_unknown_chat_report_not_found() {
        let client = MockClient::new();
        assert!(matches!(
            client.rename_chat("missing", "title", "tok").await,
            Err(ApiError::NotFound)
        ));
        assert!(matches!(
            client.delete_chat("missing", "tok").await,
            Err(ApiError::NotFound)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_removes_chat_and_history() {
        let client = MockClient::new();
        client.delete_chat("1", "tok").await.expect("delete");
        let chats = client.list_chats("tok").await.expect("list");
        assert!(chats.iter().all(|c| c.id != "1"));
        assert!(client.list_messages("1", "tok").await.expect("list").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn login_rejects_empty_credentials() {
        let client = MockClient::new();
        assert!(client.login("", "pw").await.is_err());
        let user = client.login("anyone", "pw").await.expect("login");
        assert_eq!(user.username, "Debug User");
        assert!(!user.token.is_empty());
    }
}
