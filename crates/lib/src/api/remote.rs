//! Remote chat backend client (JSON over HTTP, multipart upload).
//!
//! Every operation is a single request/response round trip against a fixed
//! base endpoint, authenticated with a bearer token except for login.

use super::{ApiError, Chat, ChatApi, FileUpload, LoginResponse, Message, Model, ProgressFn};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upload stream chunk size; progress is reported once per chunk as it is
/// handed to the transport.
const UPLOAD_CHUNK_BYTES: usize = 16 * 1024;

/// Client for the Parley backend HTTP API.
#[derive(Clone)]
pub struct RemoteClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatListResponse {
    chats: Vec<Chat>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct NewChatResponse {
    chat_id: String,
    created_at: DateTime<Utc>,
    title: String,
}

#[derive(Debug, Serialize)]
struct RenameRequest<'a> {
    title: &'a str,
}

impl RemoteClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// Parse a response body into `T`, mapping shape mismatches (including a
    /// non-array `chats` field) to `ApiError::Parse` rather than a transport error.
    async fn parse_body<T: serde::de::DeserializeOwned>(res: reqwest::Response) -> Result<T, ApiError> {
        let body = res.text().await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Parse(e.to_string()))
    }
}

#[async_trait]
impl ChatApi for RemoteClient {
    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let url = format!("{}/auth/login", self.base_url);
        let res = self
            .client
            .post(&url)
            .json(&LoginRequest { username, password })
            .send()
            .await?;
        if !res.status().is_success() {
            let message = res
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| "Login failed".to_string());
            return Err(ApiError::Api(message));
        }
        Self::parse_body(res).await
    }

    async fn list_chats(&self, token: &str) -> Result<Vec<Chat>, ApiError> {
        let url = format!("{}/chat/chats", self.base_url);
        let res = self.client.get(&url).bearer_auth(token).send().await?;
        if !res.status().is_success() {
            return Err(ApiError::Api("Failed to fetch chats".to_string()));
        }
        let data: ChatListResponse = Self::parse_body(res).await?;
        Ok(data.chats)
    }

    async fn create_chat(&self, token: &str) -> Result<Chat, ApiError> {
        let url = format!("{}/chat/chat/new", self.base_url);
        let res = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(ApiError::Api("Failed to create new chat".to_string()));
        }
        let data: NewChatResponse = Self::parse_body(res).await?;
        Ok(Chat {
            id: data.chat_id,
            created_at: data.created_at,
            title: data.title,
        })
    }

    async fn list_messages(&self, chat_id: &str, token: &str) -> Result<Vec<Message>, ApiError> {
        let url = format!("{}/chat/chat/{}/messages", self.base_url, chat_id);
        let res = self.client.get(&url).bearer_auth(token).send().await?;
        if !res.status().is_success() {
            return Err(ApiError::Api("Failed to fetch messages".to_string()));
        }
        let data: MessagesResponse = Self::parse_body(res).await?;
        Ok(data.messages)
    }

    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        token: &str,
        file: Option<FileUpload>,
        model_id: Option<&str>,
        on_progress: Option<ProgressFn>,
    ) -> Result<Message, ApiError> {
        let url = format!("{}/chat/chat/{}/send", self.base_url, chat_id);
        let mut form = reqwest::multipart::Form::new().text("text", text.to_string());
        if let Some(model) = model_id {
            form = form.text("model_id", model.to_string());
        }
        if let Some(file) = file {
            let FileUpload {
                filename,
                content_type,
                bytes,
            } = file;
            let total_len = bytes.len() as u64;
            let part = match on_progress {
                Some(mut cb) => {
                    let total = (total_len as f64).max(1.0);
                    let mut sent = 0usize;
                    let chunks: Vec<Vec<u8>> = bytes
                        .chunks(UPLOAD_CHUNK_BYTES)
                        .map(|c| c.to_vec())
                        .collect();
                    let stream = futures_util::stream::iter(chunks.into_iter().map(move |chunk| {
                        sent += chunk.len();
                        cb(((sent as f64 / total) * 100.0).min(100.0));
                        Ok::<Vec<u8>, std::io::Error>(chunk)
                    }));
                    reqwest::multipart::Part::stream_with_length(
                        reqwest::Body::wrap_stream(stream),
                        total_len,
                    )
                }
                None => reqwest::multipart::Part::bytes(bytes),
            }
            .file_name(filename)
            .mime_str(&content_type)?;
            form = form.part("file", part);
        }

        let res = self
            .client
            .post(&url)
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(ApiError::Api("Failed to send message".to_string()));
        }
        Self::parse_body(res).await
    }

    async fn rename_chat(&self, chat_id: &str, title: &str, token: &str) -> Result<(), ApiError> {
        let url = format!("{}/chat/chat/{}/rename", self.base_url, chat_id);
        let res = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&RenameRequest { title })
            .send()
            .await?;
        match res.status() {
            s if s.is_success() => Ok(()),
            reqwest::StatusCode::NOT_FOUND => Err(ApiError::NotFound),
            _ => Err(ApiError::Api("Failed to rename chat".to_string())),
        }
    }

    async fn delete_chat(&self, chat_id: &str, token: &str) -> Result<(), ApiError> {
        let url = format!("{}/chat/chat/{}/delete", self.base_url, chat_id);
        let res = self.client.delete(&url).bearer_auth(token).send().await?;
        match res.status() {
            s if s.is_success() => Ok(()),
            reqwest::StatusCode::NOT_FOUND => Err(ApiError::NotFound),
            _ => Err(ApiError::Api("Failed to delete chat".to_string())),
        }
    }

    async fn list_models(&self, token: &str) -> Result<Vec<Model>, ApiError> {
        let url = format!("{}/chat/models", self.base_url);
        let res = self.client.get(&url).bearer_auth(token).send().await?;
        if !res.status().is_success() {
            return Err(ApiError::Api("Failed to fetch models".to_string()));
        }
        Self::parse_body(res).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Sender;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = RemoteClient::new("http://localhost:8000/");
        assert_eq!(client.base_url, "http://localhost:8000");
    }

    #[test]
    fn chat_list_shape_check_rejects_non_array() {
        let err = serde_json::from_str::<ChatListResponse>(r#"{"chats": "not an array"}"#)
            .map_err(|e| ApiError::Parse(e.to_string()))
            .unwrap_err();
        assert!(matches!(err, ApiError::Parse(_)));
    }

    #[test]
    fn message_wire_shape_round_trips() {
        let raw = r#"{
            "id": "m1",
            "sender": "bot",
            "text": "hi",
            "image": null,
            "timestamp": "2026-08-01T12:00:00Z",
            "file": {"filename": "a.txt", "stored_as": "123_a.txt", "content_type": "text/plain", "size": 4}
        }"#;
        let msg: Message = serde_json::from_str(raw).expect("parse message");
        assert_eq!(msg.sender, Sender::Bot);
        assert_eq!(msg.file.as_ref().map(|f| f.size), Some(4));
    }
}
