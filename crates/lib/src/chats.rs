//! Conversation list state: loading, optimistic edits, and time-bucket grouping.
//!
//! Controller methods come in `begin_*`/`apply_*` pairs so the desktop shell
//! can run the network call on a background thread and feed the result back
//! on the UI thread; the async methods compose both halves for callers that
//! can simply await (the CLI). Failures become user-visible notices in
//! `last_error` and never propagate into the presentation layer.

use crate::api::{ApiError, Chat, ChatApi};
use chrono::{DateTime, Duration, NaiveTime, Utc};

/// Disjoint age buckets for the sidebar, each sorted newest-first.
/// `older` catches everything beyond 365 days instead of silently dropping it.
#[derive(Debug, Default, Clone)]
pub struct ChatGroups {
    pub today: Vec<Chat>,
    pub last_week: Vec<Chat>,
    pub last_month: Vec<Chat>,
    pub last_year: Vec<Chat>,
    pub older: Vec<Chat>,
}

impl ChatGroups {
    /// Bucket labels and contents in display order.
    pub fn sections(&self) -> [(&'static str, &[Chat]); 5] {
        [
            ("Today", self.today.as_slice()),
            ("Last Week", self.last_week.as_slice()),
            ("Last Month", self.last_month.as_slice()),
            ("Last Year", self.last_year.as_slice()),
            ("Older", self.older.as_slice()),
        ]
    }
}

/// Partition chats by creation time relative to the start of the current
/// calendar day. Buckets are checked in priority order, so each chat lands in
/// exactly the first bucket whose lower bound it satisfies.
pub fn group_chats(chats: &[Chat], now: DateTime<Utc>) -> ChatGroups {
    let today_start = now.date_naive().and_time(NaiveTime::MIN).and_utc();
    let week_start = today_start - Duration::days(7);
    let month_start = today_start - Duration::days(30);
    let year_start = today_start - Duration::days(365);

    let mut groups = ChatGroups::default();
    for chat in chats {
        let bucket = if chat.created_at >= today_start {
            &mut groups.today
        } else if chat.created_at >= week_start {
            &mut groups.last_week
        } else if chat.created_at >= month_start {
            &mut groups.last_month
        } else if chat.created_at >= year_start {
            &mut groups.last_year
        } else {
            &mut groups.older
        };
        bucket.push(chat.clone());
    }
    for bucket in [
        &mut groups.today,
        &mut groups.last_week,
        &mut groups.last_month,
        &mut groups.last_year,
        &mut groups.older,
    ] {
        bucket.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }
    groups
}

/// An optimistic rename in flight: remembers the previous title for revert.
#[derive(Debug)]
pub struct RenameOp {
    pub chat_id: String,
    previous_title: String,
}

/// An optimistic delete in flight.
#[derive(Debug)]
pub struct DeleteOp {
    pub chat_id: String,
}

/// Read-through cache of the user's conversations for the current session.
#[derive(Debug, Default)]
pub struct ChatList {
    chats: Vec<Chat>,
    loading: bool,
    last_error: Option<String>,
}

impl ChatList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Take the pending user-visible notice, clearing it.
    pub fn take_error(&mut self) -> Option<String> {
        self.last_error.take()
    }

    /// Drop all local state (logout or user switch).
    pub fn clear(&mut self) {
        self.chats.clear();
        self.loading = false;
        self.last_error = None;
    }

    pub fn begin_refresh(&mut self) {
        self.loading = true;
    }

    /// A malformed or failed listing degrades to an empty list plus a notice;
    /// the view layer never sees the failure as anything but state.
    pub fn apply_refresh(&mut self, result: Result<Vec<Chat>, ApiError>) {
        self.loading = false;
        match result {
            Ok(chats) => self.chats = chats,
            Err(e) => {
                log::warn!("failed to load chats: {}", e);
                self.chats.clear();
                self.last_error = Some("Failed to load chat history".to_string());
            }
        }
    }

    pub async fn refresh(&mut self, api: &dyn ChatApi, token: &str) {
        self.begin_refresh();
        let result = api.list_chats(token).await;
        self.apply_refresh(result);
    }

    /// Insert the freshly created chat at the front; returns its id so the
    /// caller can select it.
    pub fn apply_create(&mut self, result: Result<Chat, ApiError>) -> Option<String> {
        match result {
            Ok(chat) => {
                let id = chat.id.clone();
                self.chats.insert(0, chat);
                Some(id)
            }
            Err(e) => {
                log::warn!("failed to create chat: {}", e);
                self.last_error = Some("Failed to create new chat".to_string());
                None
            }
        }
    }

    pub async fn create(&mut self, api: &dyn ChatApi, token: &str) -> Option<String> {
        let result = api.create_chat(token).await;
        self.apply_create(result)
    }

    /// Apply the title edit optimistically. Returns None when the id is not
    /// in the local cache.
    pub fn begin_rename(&mut self, chat_id: &str, title: &str) -> Option<RenameOp> {
        let chat = self.chats.iter_mut().find(|c| c.id == chat_id)?;
        let op = RenameOp {
            chat_id: chat_id.to_string(),
            previous_title: std::mem::replace(&mut chat.title, title.to_string()),
        };
        Some(op)
    }

    /// Confirm or revert an optimistic rename. On failure the previous title
    /// is restored and the error surfaced.
    pub fn apply_rename(&mut self, op: RenameOp, result: Result<(), ApiError>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                if let Some(chat) = self.chats.iter_mut().find(|c| c.id == op.chat_id) {
                    chat.title = op.previous_title;
                }
                self.last_error = Some(e.to_string());
                false
            }
        }
    }

    pub async fn rename(&mut self, api: &dyn ChatApi, token: &str, chat_id: &str, title: &str) -> bool {
        let Some(op) = self.begin_rename(chat_id, title) else {
            return false;
        };
        let result = api.rename_chat(chat_id, title, token).await;
        self.apply_rename(op, result)
    }

    /// Remove the chat optimistically. Not reverted on failure; the remote
    /// treats a missing id as already deleted and a refresh restores anything
    /// that actually survived.
    pub fn begin_delete(&mut self, chat_id: &str) -> Option<DeleteOp> {
        let idx = self.chats.iter().position(|c| c.id == chat_id)?;
        self.chats.remove(idx);
        Some(DeleteOp {
            chat_id: chat_id.to_string(),
        })
    }

    pub fn apply_delete(&mut self, op: DeleteOp, result: Result<(), ApiError>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                log::warn!("failed to delete chat {}: {}", op.chat_id, e);
                self.last_error = Some(e.to_string());
                false
            }
        }
    }

    pub async fn delete(&mut self, api: &dyn ChatApi, token: &str, chat_id: &str) -> bool {
        let Some(op) = self.begin_delete(chat_id) else {
            return false;
        };
        let result = api.delete_chat(chat_id, token).await;
        self.apply_delete(op, result)
    }

    pub fn grouped(&self, now: DateTime<Utc>) -> ChatGroups {
        group_chats(&self.chats, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{FileUpload, LoginResponse, Message, Model, ProgressFn};
    use async_trait::async_trait;
    use chrono::TimeZone;

    /// Stub backend: listing yields a fixed set, mutations fail when asked to.
    struct StubApi {
        chats: Vec<Chat>,
        fail_mutations: bool,
    }

    #[async_trait]
    impl ChatApi for StubApi {
        async fn login(&self, _: &str, _: &str) -> Result<LoginResponse, ApiError> {
            Err(ApiError::Api("stub".to_string()))
        }

        async fn list_chats(&self, _: &str) -> Result<Vec<Chat>, ApiError> {
            Ok(self.chats.clone())
        }

        async fn create_chat(&self, _: &str) -> Result<Chat, ApiError> {
            Ok(chat("new", 0))
        }

        async fn list_messages(&self, _: &str, _: &str) -> Result<Vec<Message>, ApiError> {
            Ok(Vec::new())
        }

        async fn send_message(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: Option<FileUpload>,
            _: Option<&str>,
            _: Option<ProgressFn>,
        ) -> Result<Message, ApiError> {
            Err(ApiError::Api("stub".to_string()))
        }

        async fn rename_chat(&self, _: &str, _: &str, _: &str) -> Result<(), ApiError> {
            if self.fail_mutations {
                Err(ApiError::NotFound)
            } else {
                Ok(())
            }
        }

        async fn delete_chat(&self, _: &str, _: &str) -> Result<(), ApiError> {
            if self.fail_mutations {
                Err(ApiError::NotFound)
            } else {
                Ok(())
            }
        }

        async fn list_models(&self, _: &str) -> Result<Vec<Model>, ApiError> {
            Ok(Vec::new())
        }
    }

    fn chat(id: &str, age_days: i64) -> Chat {
        Chat {
            id: id.to_string(),
            created_at: Utc::now() - Duration::days(age_days),
            title: format!("chat {}", id),
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 26, 15, 30, 0).unwrap()
    }

    #[test]
    fn each_chat_lands_in_exactly_one_bucket() {
        let now = fixed_now();
        let chats: Vec<Chat> = [0i64, 1, 3, 7, 8, 29, 30, 31, 364, 365, 366, 1000]
            .iter()
            .enumerate()
            .map(|(i, days)| Chat {
                id: format!("c{}", i),
                created_at: now - Duration::days(*days),
                title: String::new(),
            })
            .collect();
        let groups = group_chats(&chats, now);
        let total: usize = groups.sections().iter().map(|(_, c)| c.len()).sum();
        assert_eq!(total, chats.len());
    }

    #[test]
    fn bucket_boundaries_follow_priority_order() {
        let now = fixed_now();
        let today_start = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        let mk = |id: &str, at: DateTime<Utc>| Chat {
            id: id.to_string(),
            created_at: at,
            title: String::new(),
        };
        let chats = vec![
            mk("today", today_start),
            mk("week", today_start - Duration::seconds(1)),
            mk("week-edge", today_start - Duration::days(7)),
            mk("month", today_start - Duration::days(7) - Duration::seconds(1)),
            mk("month-edge", today_start - Duration::days(30)),
            mk("year", today_start - Duration::days(30) - Duration::seconds(1)),
            mk("year-edge", today_start - Duration::days(365)),
            mk("older", today_start - Duration::days(365) - Duration::seconds(1)),
        ];
        let groups = group_chats(&chats, now);
        let ids = |chats: &[Chat]| chats.iter().map(|c| c.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&groups.today), ["today"]);
        assert_eq!(ids(&groups.last_week), ["week", "week-edge"]);
        assert_eq!(ids(&groups.last_month), ["month", "month-edge"]);
        assert_eq!(ids(&groups.last_year), ["year", "year-edge"]);
        assert_eq!(ids(&groups.older), ["older"]);
    }

    #[test]
    fn buckets_sort_newest_first() {
        let now = fixed_now();
        let chats = vec![chat("old", 3), chat("new", 1), chat("mid", 2)];
        let groups = group_chats(&chats, now);
        let ids: Vec<&str> = groups.last_week.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn refresh_failure_degrades_to_empty_with_notice() {
        struct BadApi;
        #[async_trait]
        impl ChatApi for BadApi {
            async fn login(&self, _: &str, _: &str) -> Result<LoginResponse, ApiError> {
                unreachable!()
            }
            async fn list_chats(&self, _: &str) -> Result<Vec<Chat>, ApiError> {
                Err(ApiError::Parse("chats: expected array".to_string()))
            }
            async fn create_chat(&self, _: &str) -> Result<Chat, ApiError> {
                unreachable!()
            }
            async fn list_messages(&self, _: &str, _: &str) -> Result<Vec<Message>, ApiError> {
                unreachable!()
            }
            async fn send_message(
                &self,
                _: &str,
                _: &str,
                _: &str,
                _: Option<FileUpload>,
                _: Option<&str>,
                _: Option<ProgressFn>,
            ) -> Result<Message, ApiError> {
                unreachable!()
            }
            async fn rename_chat(&self, _: &str, _: &str, _: &str) -> Result<(), ApiError> {
                unreachable!()
            }
            async fn delete_chat(&self, _: &str, _: &str) -> Result<(), ApiError> {
                unreachable!()
            }
            async fn list_models(&self, _: &str) -> Result<Vec<Model>, ApiError> {
                unreachable!()
            }
        }

        let mut list = ChatList::new();
        list.apply_refresh(Ok(vec![chat("a", 0)]));
        list.refresh(&BadApi, "tok").await;
        assert!(list.chats().is_empty());
        assert_eq!(list.take_error().as_deref(), Some("Failed to load chat history"));
        assert!(!list.loading());
    }

    #[tokio::test]
    async fn rename_is_optimistic_and_reverts_on_failure() {
        let api = StubApi {
            chats: Vec::new(),
            fail_mutations: true,
        };
        let mut list = ChatList::new();
        list.apply_refresh(Ok(vec![chat("draft", 0)]));

        let ok = list.rename(&api, "tok", "draft", "renamed").await;
        assert!(!ok);
        assert_eq!(list.chats()[0].title, "chat draft");
        assert!(list.take_error().is_some());
    }

    #[tokio::test]
    async fn second_rename_wins_after_confirmation() {
        let api = StubApi {
            chats: Vec::new(),
            fail_mutations: false,
        };
        let mut list = ChatList::new();
        list.apply_refresh(Ok(vec![chat("draft", 0)]));

        assert!(list.rename(&api, "tok", "draft", "a").await);
        assert!(list.rename(&api, "tok", "draft", "b").await);
        assert_eq!(list.chats()[0].title, "b");
    }

    #[tokio::test]
    async fn delete_removes_locally_and_surfaces_failure() {
        let api = StubApi {
            chats: Vec::new(),
            fail_mutations: true,
        };
        let mut list = ChatList::new();
        list.apply_refresh(Ok(vec![chat("a", 0), chat("b", 1)]));

        let ok = list.delete(&api, "tok", "a").await;
        assert!(!ok);
        assert_eq!(list.chats().len(), 1);
        assert_eq!(list.take_error().as_deref(), Some("Chat not found"));
    }

    #[tokio::test]
    async fn create_prepends_new_chat() {
        let api = StubApi {
            chats: Vec::new(),
            fail_mutations: false,
        };
        let mut list = ChatList::new();
        list.apply_refresh(Ok(vec![chat("a", 0)]));
        let id = list.create(&api, "tok").await;
        assert_eq!(id.as_deref(), Some("new"));
        assert_eq!(list.chats()[0].id, "new");
    }
}
