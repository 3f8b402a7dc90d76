//! Chat backend API: wire types, error taxonomy, and the [`ChatApi`] trait
//! implemented by the remote HTTP client and the in-memory mock.

pub mod mock;
pub mod remote;

pub use mock::MockClient;
pub use remote::RemoteClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{0}")]
    Api(String),
    #[error("Chat not found")]
    NotFound,
    #[error("invalid response: {0}")]
    Parse(String),
}

/// A titled, timestamped conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// Attachment descriptor carried by a message. `stored_as` is assigned by
/// the backend; it is empty on optimistic client-side messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub filename: String,
    pub stored_as: String,
    pub content_type: String,
    pub size: u64,
}

/// One message in a conversation. Never mutated after creation; the reveal
/// animation is derived display state, not part of this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: Sender,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileInfo>,
}

/// Selectable inference model (read-only reference data).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub username: String,
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_pic: Option<String>,
}

/// File payload for `send_message`; bytes are read by the caller up front so
/// size and content type are known before the request starts.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    /// Optimistic attachment metadata: everything but the server-assigned
    /// stored name is known before the upload completes.
    pub fn file_info(&self) -> FileInfo {
        FileInfo {
            filename: self.filename.clone(),
            stored_as: String::new(),
            content_type: self.content_type.clone(),
            size: self.bytes.len() as u64,
        }
    }
}

/// Upload progress callback. Called with fractional completion in [0, 100]
/// as bytes go out; advisory display state only.
pub type ProgressFn = Box<dyn FnMut(f64) + Send>;

/// Operations against the chat backend. One implementation talks HTTP
/// ([`RemoteClient`]); the other runs fully in memory ([`MockClient`]) so
/// callers never branch on debug mode beyond picking the instance.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// POST /auth/login. A non-2xx response surfaces the body's error message.
    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError>;

    /// GET /chat/chats: all conversations for the token's user.
    async fn list_chats(&self, token: &str) -> Result<Vec<Chat>, ApiError>;

    /// POST /chat/chat/new: create an empty conversation.
    async fn create_chat(&self, token: &str) -> Result<Chat, ApiError>;

    /// GET /chat/chat/{id}/messages: ordered message history.
    async fn list_messages(&self, chat_id: &str, token: &str) -> Result<Vec<Message>, ApiError>;

    /// POST /chat/chat/{id}/send (multipart): returns the bot's reply.
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        token: &str,
        file: Option<FileUpload>,
        model_id: Option<&str>,
        on_progress: Option<ProgressFn>,
    ) -> Result<Message, ApiError>;

    /// POST /chat/chat/{id}/rename: `ApiError::NotFound` when the id is unknown.
    async fn rename_chat(&self, chat_id: &str, title: &str, token: &str) -> Result<(), ApiError>;

    /// DELETE /chat/chat/{id}/delete: `ApiError::NotFound` when the id is unknown.
    async fn delete_chat(&self, chat_id: &str, token: &str) -> Result<(), ApiError>;

    /// GET /chat/models: selectable models.
    async fn list_models(&self, token: &str) -> Result<Vec<Model>, ApiError>;
}
