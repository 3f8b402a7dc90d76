//! Integration test: drive a full debug-mode session through the controllers
//! against the in-memory backend. Uses a paused clock so the mock's simulated
//! latency costs nothing.

use lib::api::{ChatApi, FileUpload, MockClient};
use lib::auth::SessionStore;
use lib::chats::ChatList;
use lib::models::ModelPicker;
use lib::thread::{MessageThread, ThreadState};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

fn temp_state_path() -> PathBuf {
    std::env::temp_dir().join(format!("parley-flow-{}.json", uuid::Uuid::new_v4()))
}

#[tokio::test(start_paused = true)]
async fn debug_session_covers_login_chat_and_teardown() {
    let api = MockClient::new();
    let state_path = temp_state_path();

    // Login with the mock backend and persist the session.
    let login = api.login("anyone", "secret").await.expect("login");
    let mut session = SessionStore::load(state_path.clone());
    session
        .login(lib::auth::User {
            username: login.username,
            token: login.token,
            profile_pic: login.profile_pic,
        })
        .expect("store session");
    session.set_debug_mode(true).expect("persist debug flag");
    let token = session.token().to_string();
    assert_eq!(token, "debug_token_123");

    // The seeded conversations land in the expected age buckets.
    let mut list = ChatList::new();
    list.refresh(&api, &token).await;
    assert_eq!(list.chats().len(), 4);
    let groups = list.grouped(chrono::Utc::now());
    assert_eq!(groups.today.len(), 1);
    assert_eq!(groups.today[0].title, "Today's Conversation");
    assert!(groups.last_week.iter().any(|c| c.title == "Yesterday Chat"));
    assert!(!groups.last_month.is_empty());

    // Models load and the first one is selectable.
    let mut picker = ModelPicker::new();
    picker.refresh(&api, &token).await;
    assert_eq!(picker.models().len(), 3);
    let first = picker.models()[0].id.clone();
    picker.select(&first);
    assert_eq!(picker.selected_name(), Some("Llama 3 8B"));

    // Open the seeded conversation and send a message.
    let mut thread = MessageThread::new();
    thread.load(&api, &token, "1").await;
    assert_eq!(thread.state(), ThreadState::Ready);
    assert_eq!(thread.messages().len(), 2);

    assert!(thread.can_send(picker.selected().is_some(), "hello there"));
    let sent = thread
        .send(&api, &token, "hello there", None, picker.selected(), None)
        .await;
    assert!(sent);
    assert_eq!(thread.messages().len(), 4);
    assert!(thread.revealing());
    while thread.tick_reveal() {}
    let reply = thread.messages().last().expect("reply");
    assert_eq!(thread.display_text(reply), reply.text);
    assert!(thread.copy_available(reply));

    // A file send reports monotone progress ending at 100.
    let seen: Arc<Mutex<Vec<f64>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let file = FileUpload {
        filename: "notes.txt".to_string(),
        content_type: "text/plain".to_string(),
        bytes: vec![0u8; 4096],
    };
    let sent = thread
        .send(
            &api,
            &token,
            "see attached",
            Some(file),
            picker.selected(),
            Some(Box::new(move |p| sink.lock().unwrap().push(p))),
        )
        .await;
    assert!(sent);
    let seen = seen.lock().unwrap();
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(seen.last().copied(), Some(100.0));
    drop(seen);
    // The optimistic user message keeps its placeholder attachment metadata.
    let user_msg = &thread.messages()[thread.messages().len() - 2];
    assert!(user_msg.id.starts_with("temp_"));
    let info = user_msg.file.as_ref().expect("attachment metadata");
    assert_eq!(info.size, 4096);
    assert!(info.stored_as.is_empty());

    // Create, rename, and delete a conversation.
    let new_id = list.create(&api, &token).await.expect("create");
    assert_eq!(list.chats()[0].id, new_id);
    assert!(list.rename(&api, &token, &new_id, "Renamed").await);
    assert_eq!(list.chats()[0].title, "Renamed");
    assert!(list.delete(&api, &token, &new_id).await);
    assert!(list.chats().iter().all(|c| c.id != new_id));

    // Logout clears the persisted session.
    session.logout();
    let restored = SessionStore::load(state_path);
    assert!(restored.user().is_none());
    assert!(!restored.debug_mode());
}

#[tokio::test(start_paused = true)]
async fn stale_history_load_is_not_applied_to_new_selection() {
    let api = MockClient::new();
    let mut thread = MessageThread::new();

    // Begin loading chat 1, then switch to an empty chat before it resolves.
    let stale = thread.open("1");
    let stale_result = api.list_messages("1", "tok").await;
    let current = thread.open("2");
    let current_result = api.list_messages("2", "tok").await;

    thread.apply_loaded(&stale, stale_result);
    assert_eq!(thread.state(), ThreadState::Loading);
    assert!(thread.messages().is_empty());

    thread.apply_loaded(&current, current_result);
    assert_eq!(thread.state(), ThreadState::Ready);
    assert!(thread.messages().is_empty());
}
