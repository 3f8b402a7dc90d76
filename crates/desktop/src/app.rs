//! Parley Desktop — egui app state and UI.

use eframe::egui;
use lib::api::{ApiError, Chat, ChatApi, FileUpload, LoginResponse, Message, MockClient, Model, ProgressFn, RemoteClient, Sender};
use lib::auth::SessionStore;
use lib::chats::{ChatList, DeleteOp, RenameOp};
use lib::models::ModelPicker;
use lib::thread::{LoadTag, MessageThread, PendingSend};
use lib::tools::{ToolWindow, TOOL_WINDOWS};
use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

const CHAT_INPUT_HEIGHT: f32 = 90.0;
const CHAT_MESSAGES_MIN_HEIGHT: f32 = 80.0;
const LOG_BUFFER_MAX_LINES: usize = 2000;

/// One revealed character per tick.
const REVEAL_TICK: Duration = Duration::from_millis(20);

/// Keep the finished upload bar on screen briefly before the reply lands.
const UPLOAD_GRACE: Duration = Duration::from_millis(500);

/// Ring buffer of log lines for the Logs screen. Written by DesktopLogger.
static LOG_LINES: OnceLock<Mutex<VecDeque<String>>> = OnceLock::new();

fn log_buffer() -> &'static Mutex<VecDeque<String>> {
    LOG_LINES.get_or_init(|| Mutex::new(VecDeque::new()))
}

fn push_log_line(line: String) {
    if let Ok(mut buf) = log_buffer().lock() {
        buf.push_back(line);
        while buf.len() > LOG_BUFFER_MAX_LINES {
            buf.pop_front();
        }
    }
}

/// Logger that appends to LOG_LINES for display in the Logs screen.
struct DesktopLogger;

impl log::Log for DesktopLogger {
    fn enabled(&self, _: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let line = format!("{} [{}] {}", chrono_lite(), record.level(), record.args());
        push_log_line(line);
    }

    fn flush(&self) {}
}

fn chrono_lite() -> String {
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = t.as_secs();
    let millis = t.subsec_millis();
    let h = (secs / 3600) % 24;
    let m = (secs / 60) % 60;
    let s = secs % 60;
    format!("{:02}:{:02}:{:02}.{:03}", h, m, s, millis)
}

static LOGGER: DesktopLogger = DesktopLogger;

#[derive(Clone, Copy, PartialEq, Eq, Default)]
enum Screen {
    #[default]
    Login,
    Chat,
    Logs,
}

/// Explicit color scheme selection, applied to the egui context every frame.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
enum Theme {
    #[default]
    Dark,
    Light,
}

/// Run `fut` on a background thread with its own runtime and deliver the
/// output through a channel polled by the UI thread each frame.
fn spawn_call<T, F>(fut: F) -> mpsc::Receiver<T>
where
    T: Send + 'static,
    F: std::future::Future<Output = T> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let result = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt.block_on(fut),
            Err(e) => {
                log::error!("failed to start runtime: {}", e);
                return;
            }
        };
        let _ = tx.send(result);
    });
    rx
}

pub struct ParleyApp {
    /// Persisted session (user + debug flag); restored at startup.
    session: SessionStore,
    /// Active backend: mock when debug mode is on, HTTP client otherwise.
    api: Arc<dyn ChatApi>,
    theme: Theme,
    current_screen: Screen,

    // Login screen state.
    login_username: String,
    login_password: String,
    login_debug: bool,
    login_error: Option<String>,
    login_receiver: Option<mpsc::Receiver<Result<LoginResponse, ApiError>>>,

    // Conversation sidebar.
    chat_list: ChatList,
    chats_receiver: Option<mpsc::Receiver<Result<Vec<Chat>, ApiError>>>,
    create_receiver: Option<mpsc::Receiver<Result<Chat, ApiError>>>,
    /// Chat being renamed and the edit buffer for the modal.
    rename_target: Option<(String, String)>,
    rename_receiver: Option<(RenameOp, mpsc::Receiver<Result<(), ApiError>>)>,
    /// Chat id pending delete confirmation.
    delete_target: Option<String>,
    delete_receiver: Option<(DeleteOp, mpsc::Receiver<Result<(), ApiError>>)>,

    // Message thread.
    thread: MessageThread,
    load_receiver: Option<(LoadTag, mpsc::Receiver<Result<Vec<Message>, ApiError>>)>,
    send_receiver: Option<(PendingSend, mpsc::Receiver<Result<Message, ApiError>>)>,
    /// Upload completion written by the progress callback on the send thread.
    upload_progress: Arc<Mutex<Option<f64>>>,
    last_reveal_tick: Instant,
    chat_input: String,
    /// Path typed into the attach field, staged into `attachment` on Attach.
    attach_path: String,
    attachment: Option<FileUpload>,
    /// Last user-visible error from any chat operation.
    chat_error: Option<String>,

    // Model picker.
    picker: ModelPicker,
    models_receiver: Option<mpsc::Receiver<Result<Vec<Model>, ApiError>>>,

    /// Currently open auxiliary tool window, if any.
    open_tool: Option<&'static ToolWindow>,
}

/// Backend for the current mode: offline mock in debug, HTTP otherwise.
fn make_api(debug: bool) -> Arc<dyn ChatApi> {
    if debug {
        return Arc::new(MockClient::new());
    }
    let (config, _) = lib::config::load_config(None).unwrap_or_default();
    let base_url = lib::config::resolve_base_url(&config);
    log::info!("using backend at {}", base_url);
    Arc::new(RemoteClient::new(base_url))
}

impl ParleyApp {
    /// Space between the screen title and the content below.
    const SCREEN_TITLE_BOTTOM_SPACING: f32 = 18.0;
    /// Space between the bottom of the content and the window edge.
    const SCREEN_FOOTER_SPACING: f32 = 24.0;

    pub fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let _ = LOG_LINES.get_or_init(|| Mutex::new(VecDeque::new()));
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Debug);
        log::info!("desktop started");

        let session = SessionStore::load_default();
        let api = make_api(session.debug_mode());
        let logged_in = session.user().is_some();
        let mut app = Self {
            session,
            api,
            theme: Theme::default(),
            current_screen: if logged_in { Screen::Chat } else { Screen::Login },
            login_username: String::new(),
            login_password: String::new(),
            login_debug: false,
            login_error: None,
            login_receiver: None,
            chat_list: ChatList::new(),
            chats_receiver: None,
            create_receiver: None,
            rename_target: None,
            rename_receiver: None,
            delete_target: None,
            delete_receiver: None,
            thread: MessageThread::new(),
            load_receiver: None,
            send_receiver: None,
            upload_progress: Arc::new(Mutex::new(None)),
            last_reveal_tick: Instant::now(),
            chat_input: String::new(),
            attach_path: String::new(),
            attachment: None,
            chat_error: None,
            picker: ModelPicker::new(),
            models_receiver: None,
            open_tool: None,
        };
        if logged_in {
            app.login_debug = app.session.debug_mode();
            app.start_chats_refresh();
            app.start_models_refresh();
        }
        app
    }

    fn token(&self) -> String {
        self.session.token().to_string()
    }

    // ---- background call starters ----

    fn start_login(&mut self) {
        if self.login_receiver.is_some() {
            return;
        }
        self.login_error = None;
        if self.login_debug {
            // Offline mode skips the server round trip entirely.
            self.api = make_api(true);
            if let Err(e) = self.session.login(SessionStore::debug_user()) {
                self.login_error = Some(e.to_string());
                return;
            }
            if let Err(e) = self.session.set_debug_mode(true) {
                self.login_error = Some(e.to_string());
                return;
            }
            self.enter_chat();
            return;
        }
        let username = self.login_username.trim().to_string();
        let password = self.login_password.clone();
        if username.is_empty() || password.is_empty() {
            self.login_error = Some("Username and password are required".to_string());
            return;
        }
        // A stale debug flag must not route a real login to the mock.
        self.api = make_api(false);
        let api = self.api.clone();
        self.login_receiver =
            Some(spawn_call(async move { api.login(&username, &password).await }));
    }

    fn enter_chat(&mut self) {
        self.login_password.clear();
        self.current_screen = Screen::Chat;
        self.start_chats_refresh();
        self.start_models_refresh();
    }

    fn start_chats_refresh(&mut self) {
        if self.chats_receiver.is_some() {
            return;
        }
        self.chat_list.begin_refresh();
        let api = self.api.clone();
        let token = self.token();
        self.chats_receiver = Some(spawn_call(async move { api.list_chats(&token).await }));
    }

    fn start_models_refresh(&mut self) {
        if self.models_receiver.is_some() {
            return;
        }
        self.picker.begin_refresh();
        let api = self.api.clone();
        let token = self.token();
        self.models_receiver = Some(spawn_call(async move { api.list_models(&token).await }));
    }

    fn start_create_chat(&mut self) {
        if self.create_receiver.is_some() {
            return;
        }
        let api = self.api.clone();
        let token = self.token();
        self.create_receiver = Some(spawn_call(async move { api.create_chat(&token).await }));
    }

    fn start_rename(&mut self, chat_id: String, title: String) {
        if self.rename_receiver.is_some() || title.trim().is_empty() {
            return;
        }
        let Some(op) = self.chat_list.begin_rename(&chat_id, title.trim()) else {
            return;
        };
        let api = self.api.clone();
        let token = self.token();
        let title = title.trim().to_string();
        let rx = spawn_call(async move { api.rename_chat(&chat_id, &title, &token).await });
        self.rename_receiver = Some((op, rx));
    }

    fn start_delete(&mut self, chat_id: String) {
        if self.delete_receiver.is_some() {
            return;
        }
        let Some(op) = self.chat_list.begin_delete(&chat_id) else {
            return;
        };
        if self.thread.chat_id() == Some(chat_id.as_str()) {
            self.thread.close();
        }
        let api = self.api.clone();
        let token = self.token();
        let rx = spawn_call(async move { api.delete_chat(&chat_id, &token).await });
        self.delete_receiver = Some((op, rx));
    }

    fn select_chat(&mut self, chat_id: String) {
        if self.thread.chat_id() == Some(chat_id.as_str()) {
            return;
        }
        let tag = self.thread.open(&chat_id);
        let api = self.api.clone();
        let token = self.token();
        let rx = spawn_call(async move { api.list_messages(&chat_id, &token).await });
        self.load_receiver = Some((tag, rx));
    }

    fn start_send(&mut self) {
        if self.send_receiver.is_some() {
            return;
        }
        let text = self.chat_input.trim().to_string();
        if !self.thread.can_send(self.picker.selected().is_some(), &text) {
            return;
        }
        let file = self.attachment.take();
        let Some(pending) = self.thread.begin_send(&text, file.as_ref()) else {
            return;
        };
        self.chat_input.clear();
        self.attach_path.clear();
        self.chat_error = None;

        let progress = self.upload_progress.clone();
        if let Ok(mut slot) = progress.lock() {
            *slot = file.as_ref().map(|_| 0.0);
        }
        let on_progress: Option<ProgressFn> = file.as_ref().map(|_| {
            let progress = progress.clone();
            Box::new(move |pct: f64| {
                if let Ok(mut slot) = progress.lock() {
                    *slot = Some(pct);
                }
            }) as ProgressFn
        });

        let api = self.api.clone();
        let token = self.token();
        let chat_id = pending.chat_id.clone();
        let model_id = self.picker.selected().map(str::to_string);
        let has_file = pending.has_file;
        let rx = spawn_call(async move {
            let result = api
                .send_message(&chat_id, &text, &token, file, model_id.as_deref(), on_progress)
                .await;
            if has_file && result.is_ok() {
                tokio::time::sleep(UPLOAD_GRACE).await;
            }
            result
        });
        self.send_receiver = Some((pending, rx));
    }

    fn logout(&mut self) {
        self.session.logout();
        self.api = make_api(false);
        self.chat_list.clear();
        self.picker.clear();
        self.thread.close();
        self.chats_receiver = None;
        self.create_receiver = None;
        self.rename_receiver = None;
        self.delete_receiver = None;
        self.load_receiver = None;
        self.send_receiver = None;
        self.rename_target = None;
        self.delete_target = None;
        self.chat_input.clear();
        self.attachment = None;
        self.attach_path.clear();
        self.chat_error = None;
        self.login_debug = false;
        self.open_tool = None;
        self.current_screen = Screen::Login;
    }

    // ---- per-frame polling ----

    fn poll_login(&mut self) {
        let Some(rx) = &self.login_receiver else { return };
        let Ok(result) = rx.try_recv() else { return };
        self.login_receiver = None;
        match result {
            Ok(login) => {
                let user = lib::auth::User {
                    username: login.username,
                    token: login.token,
                    profile_pic: login.profile_pic,
                };
                match self
                    .session
                    .login(user)
                    .and_then(|()| self.session.set_debug_mode(false))
                {
                    Ok(()) => self.enter_chat(),
                    Err(e) => self.login_error = Some(e.to_string()),
                }
            }
            Err(e) => {
                log::warn!("login failed: {}", e);
                self.login_error = Some(e.to_string());
            }
        }
    }

    fn poll_chats(&mut self) {
        if let Some(rx) = &self.chats_receiver {
            if let Ok(result) = rx.try_recv() {
                self.chats_receiver = None;
                self.chat_list.apply_refresh(result);
                if let Some(notice) = self.chat_list.take_error() {
                    self.chat_error = Some(notice);
                }
            }
        }
        if let Some(rx) = &self.create_receiver {
            if let Ok(result) = rx.try_recv() {
                self.create_receiver = None;
                if let Some(id) = self.chat_list.apply_create(result) {
                    self.select_chat(id);
                }
                if let Some(notice) = self.chat_list.take_error() {
                    self.chat_error = Some(notice);
                }
            }
        }
        if let Some((op, rx)) = self.rename_receiver.take() {
            match rx.try_recv() {
                Ok(result) => {
                    self.chat_list.apply_rename(op, result);
                    if let Some(notice) = self.chat_list.take_error() {
                        self.chat_error = Some(notice);
                    }
                }
                Err(mpsc::TryRecvError::Empty) => self.rename_receiver = Some((op, rx)),
                Err(mpsc::TryRecvError::Disconnected) => {
                    log::warn!("rename worker exited without a result");
                }
            }
        }
        if let Some((op, rx)) = self.delete_receiver.take() {
            match rx.try_recv() {
                Ok(result) => {
                    self.chat_list.apply_delete(op, result);
                    if let Some(notice) = self.chat_list.take_error() {
                        self.chat_error = Some(notice);
                    }
                }
                Err(mpsc::TryRecvError::Empty) => self.delete_receiver = Some((op, rx)),
                Err(mpsc::TryRecvError::Disconnected) => {
                    log::warn!("delete worker exited without a result");
                }
            }
        }
    }

    fn poll_models(&mut self) {
        let Some(rx) = &self.models_receiver else { return };
        let Ok(result) = rx.try_recv() else { return };
        self.models_receiver = None;
        self.picker.apply_refresh(result);
        if self.picker.selected().is_none() {
            if let Some(first) = self.picker.models().first().map(|m| m.id.clone()) {
                self.picker.select(&first);
            }
        }
        if let Some(notice) = self.picker.take_error() {
            self.chat_error = Some(notice);
        }
    }

    fn poll_thread(&mut self) {
        if let Some((tag, rx)) = self.load_receiver.take() {
            match rx.try_recv() {
                Ok(result) => {
                    self.thread.apply_loaded(&tag, result);
                    if let Some(notice) = self.thread.take_error() {
                        self.chat_error = Some(notice);
                    }
                }
                Err(mpsc::TryRecvError::Empty) => self.load_receiver = Some((tag, rx)),
                Err(mpsc::TryRecvError::Disconnected) => {
                    log::warn!("message load worker exited without a result");
                }
            }
        }
        if let Some(pct) = self.upload_progress.lock().ok().and_then(|slot| *slot) {
            self.thread.set_upload_progress(pct);
        }
        if let Some((pending, rx)) = self.send_receiver.take() {
            match rx.try_recv() {
                Ok(result) => {
                    if let Ok(mut slot) = self.upload_progress.lock() {
                        *slot = None;
                    }
                    self.thread.apply_send(pending, result);
                    self.last_reveal_tick = Instant::now();
                    if let Some(notice) = self.thread.take_error() {
                        self.chat_error = Some(notice);
                    }
                }
                Err(mpsc::TryRecvError::Empty) => self.send_receiver = Some((pending, rx)),
                Err(mpsc::TryRecvError::Disconnected) => {
                    log::warn!("send worker exited without a result");
                }
            }
        }
    }

    /// Advance the reveal animation and schedule the next repaint while it runs.
    fn tick_reveal(&mut self, ctx: &egui::Context) {
        if !self.thread.revealing() {
            return;
        }
        while self.last_reveal_tick.elapsed() >= REVEAL_TICK {
            self.last_reveal_tick += REVEAL_TICK;
            if !self.thread.tick_reveal() {
                break;
            }
        }
        ctx.request_repaint_after(REVEAL_TICK);
    }

    // ---- screens ----

    fn ui_login_screen(&mut self, ui: &mut egui::Ui) {
        ui.add_space(64.0);
        ui.vertical_centered(|ui| {
            ui.heading("Parley");
            ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);
            ui.label("Sign in to continue");
            ui.add_space(16.0);

            let logging_in = self.login_receiver.is_some();
            ui.add_enabled_ui(!logging_in && !self.login_debug, |ui| {
                ui.add_sized(
                    [280.0, 24.0],
                    egui::TextEdit::singleline(&mut self.login_username).hint_text("Username"),
                );
                ui.add_space(8.0);
                ui.add_sized(
                    [280.0, 24.0],
                    egui::TextEdit::singleline(&mut self.login_password)
                        .hint_text("Password")
                        .password(true),
                );
            });
            ui.add_space(8.0);
            ui.checkbox(&mut self.login_debug, "Use offline debug backend");
            ui.add_space(12.0);

            let label = if logging_in { "Signing in…" } else { "Sign in" };
            let clicked = ui
                .add_enabled(!logging_in, egui::Button::new(label).min_size(egui::vec2(280.0, 28.0)))
                .clicked();
            let submitted = ui.input(|i| i.key_pressed(egui::Key::Enter)) && !logging_in;
            if clicked || submitted {
                self.start_login();
            }

            if let Some(ref err) = self.login_error {
                ui.add_space(12.0);
                ui.colored_label(egui::Color32::RED, err);
            }
        });
    }

    fn ui_sidebar(&mut self, ui: &mut egui::Ui) {
        ui.add_space(24.0);
        ui.horizontal(|ui| {
            ui.heading("Chats");
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let busy = self.create_receiver.is_some();
                if ui.add_enabled(!busy, egui::Button::new("＋ New")).clicked() {
                    self.start_create_chat();
                }
            });
        });
        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);

        if self.chat_list.loading() && self.chat_list.chats().is_empty() {
            ui.label("Loading conversations…");
            return;
        }

        let selected = self.thread.chat_id().map(str::to_string);
        let groups = self.chat_list.grouped(chrono::Utc::now());
        let mut clicked_chat: Option<String> = None;
        let mut rename_chat: Option<(String, String)> = None;
        let mut delete_chat: Option<String> = None;

        egui::ScrollArea::vertical()
            .id_source("sidebar_scroll")
            .show(ui, |ui| {
                for (label, chats) in groups.sections() {
                    if chats.is_empty() {
                        continue;
                    }
                    ui.label(egui::RichText::new(label).strong().small());
                    ui.add_space(4.0);
                    for chat in chats {
                        let is_selected = selected.as_deref() == Some(chat.id.as_str());
                        let response = ui.selectable_label(is_selected, &chat.title);
                        if response.clicked() {
                            clicked_chat = Some(chat.id.clone());
                        }
                        let _ = response.context_menu(|ui| {
                            if ui.button("Rename").clicked() {
                                rename_chat = Some((chat.id.clone(), chat.title.clone()));
                                ui.close_menu();
                            }
                            if ui.button("Delete").clicked() {
                                delete_chat = Some(chat.id.clone());
                                ui.close_menu();
                            }
                        });
                    }
                    ui.add_space(12.0);
                }
                if self.chat_list.chats().is_empty() {
                    ui.label("No conversations yet.");
                }
            });

        if let Some(id) = clicked_chat {
            self.select_chat(id);
        }
        if let Some(target) = rename_chat {
            self.rename_target = Some(target);
        }
        if let Some(id) = delete_chat {
            self.delete_target = Some(id);
        }
        ui.add_space(Self::SCREEN_FOOTER_SPACING);
    }

    fn ui_tool_panel(&mut self, ui: &mut egui::Ui) {
        ui.add_space(24.0);
        ui.heading("Tools");
        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);
        for tool in TOOL_WINDOWS {
            let open = self.open_tool.map(|t| t.id) == Some(tool.id);
            if ui.selectable_label(open, tool.name).clicked() {
                self.open_tool = if open { None } else { Some(tool) };
            }
            ui.label(egui::RichText::new(tool.description).small().weak());
            ui.add_space(8.0);
        }
    }

    fn render_message(thread: &MessageThread, ui: &mut egui::Ui, m: &Message, upload_pct: Option<f64>, uploading: bool) {
        let is_user = m.sender == Sender::User;
        let frame = egui::Frame::none()
            .fill(if is_user {
                ui.style().visuals.extreme_bg_color
            } else {
                ui.style().visuals.panel_fill
            })
            .stroke(egui::Stroke::new(
                1.0,
                ui.style().visuals.widgets.noninteractive.bg_stroke.color,
            ))
            .rounding(egui::Rounding::same(8.0))
            .inner_margin(egui::Margin::same(8.0));

        frame.show(ui, |ui| {
            let text = thread.display_text(m);
            if is_user {
                ui.label(egui::RichText::new(text).strong());
            } else {
                ui.label(text);
            }
            if let Some(ref image) = m.image {
                ui.add_space(4.0);
                ui.hyperlink(image);
            }
            if let Some(ref file) = m.file {
                ui.add_space(4.0);
                ui.label(
                    egui::RichText::new(format!("📎 {} ({} bytes)", file.filename, file.size))
                        .small(),
                );
                if uploading {
                    if let Some(pct) = upload_pct {
                        ui.add(
                            egui::ProgressBar::new((pct / 100.0) as f32)
                                .text(format!("{:.0}%", pct)),
                        );
                    }
                }
            }
            if thread.copy_available(m) {
                ui.add_space(4.0);
                if ui.small_button("Copy").clicked() {
                    ui.output_mut(|o| o.copied_text = m.text.clone());
                }
            }
            ui.label(
                egui::RichText::new(m.timestamp.format("%H:%M").to_string())
                    .small()
                    .weak(),
            );
        });
    }

    fn ui_chat_screen(&mut self, ui: &mut egui::Ui) {
        use lib::thread::ThreadState;

        if self.thread.chat_id().is_none() {
            ui.add_space(24.0);
            ui.vertical_centered(|ui| {
                ui.heading("Welcome to Parley");
                ui.add_space(8.0);
                ui.label("Select a conversation or create a new one to get started.");
            });
            return;
        }

        ui.add_space(24.0);
        let title = self
            .thread
            .chat_id()
            .and_then(|id| self.chat_list.chats().iter().find(|c| c.id == id))
            .map(|c| c.title.clone())
            .unwrap_or_else(|| "Conversation".to_string());
        ui.heading(title);
        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);

        let row_height = ui.spacing().interact_size.y + 8.0;
        let bottom = CHAT_INPUT_HEIGHT + 8.0 + row_height + Self::SCREEN_FOOTER_SPACING;
        let messages_height = (ui.available_height() - bottom).max(CHAT_MESSAGES_MIN_HEIGHT);
        let messages_rect = ui
            .allocate_exact_size(
                egui::vec2(ui.available_width(), messages_height),
                egui::Sense::hover(),
            )
            .0;
        let mut messages_ui = ui.child_ui(messages_rect, egui::Layout::top_down(egui::Align::Min));

        let upload_pct = self.thread.upload_progress();
        let uploading_id = self.thread.uploading_message_id().map(str::to_string);
        egui::ScrollArea::vertical()
            .id_source("messages_scroll")
            .stick_to_bottom(true)
            .show(&mut messages_ui, |ui| {
                let content_width = ui.available_width();
                ui.allocate_exact_size(egui::vec2(content_width, 0.0), egui::Sense::hover());
                if self.thread.state() == ThreadState::Loading {
                    ui.label("Loading messages…");
                }
                for m in self.thread.messages() {
                    let uploading = uploading_id.as_deref() == Some(m.id.as_str());
                    Self::render_message(&self.thread, ui, m, upload_pct, uploading);
                    ui.add_space(8.0);
                }
                if self.thread.typing() && uploading_id.is_none() {
                    ui.label(egui::RichText::new("…").weak());
                }
            });

        ui.add_space(8.0);
        let can_send = self.thread.can_send(self.picker.selected().is_some(), &self.chat_input)
            && self.send_receiver.is_none();

        let input = ui.add_enabled_ui(self.send_receiver.is_none(), |ui| {
            ui.add_sized(
                [ui.available_width(), CHAT_INPUT_HEIGHT],
                egui::TextEdit::multiline(&mut self.chat_input)
                    .hint_text("Type a message…"),
            )
        });
        let response = input.inner;
        ui.add_space(8.0);

        let row_width = ui.available_width();
        let (rect, _) = ui.allocate_exact_size(egui::vec2(row_width, row_height), egui::Sense::hover());
        let mut row_ui = ui.child_ui(rect, egui::Layout::right_to_left(egui::Align::Center));
        let mut send_now = false;
        egui::Frame::none()
            .inner_margin(egui::Margin {
                left: 0.0,
                right: 8.0,
                top: 4.0,
                bottom: 4.0,
            })
            .show(&mut row_ui, |ui| {
                // Right-to-left layout: first added = rightmost.
                if ui.add_enabled(can_send, egui::Button::new("Send")).clicked() {
                    send_now = true;
                }

                ui.add_space(8.0);
                let selected_label = self.picker.selected_name().unwrap_or("Select model");
                let mut picked: Option<String> = None;
                ui.add_enabled_ui(!self.picker.loading(), |ui| {
                    egui::ComboBox::from_id_source("model_select")
                        .selected_text(selected_label)
                        .show_ui(ui, |ui| {
                            for model in self.picker.models() {
                                let selected = self.picker.selected() == Some(model.id.as_str());
                                if ui.selectable_label(selected, &model.name).clicked() {
                                    picked = Some(model.id.clone());
                                }
                            }
                        });
                });
                if let Some(id) = picked {
                    self.picker.select(&id);
                }

                ui.add_space(8.0);
                if let Some(ref file) = self.attachment {
                    let label = format!("📎 {}", file.filename);
                    if ui.button(format!("{} ✕", label)).clicked() {
                        self.attachment = None;
                    }
                } else {
                    if ui.button("Attach").clicked() && !self.attach_path.trim().is_empty() {
                        match load_attachment(self.attach_path.trim()) {
                            Ok(file) => self.attachment = Some(file),
                            Err(e) => self.chat_error = Some(format!("Attach failed: {}", e)),
                        }
                    }
                    ui.add_sized(
                        [220.0, ui.spacing().interact_size.y],
                        egui::TextEdit::singleline(&mut self.attach_path)
                            .hint_text("File path…"),
                    );
                }
            });

        if response.has_focus() {
            let modifiers = ui.input(|i| i.modifiers);
            if (modifiers.command || modifiers.ctrl)
                && ui.input(|i| i.key_pressed(egui::Key::Enter))
                && can_send
            {
                send_now = true;
            }
        }
        if send_now {
            self.start_send();
        }

        if let Some(ref err) = self.chat_error {
            ui.add_space(8.0);
            ui.colored_label(egui::Color32::RED, err);
        }
        ui.add_space(Self::SCREEN_FOOTER_SPACING);
    }

    fn ui_logs_screen(&self, ui: &mut egui::Ui) {
        ui.add_space(24.0);
        ui.heading("Logs");
        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);

        let lines: Vec<String> = log_buffer()
            .lock()
            .map(|b| b.iter().cloned().collect())
            .unwrap_or_default();

        let scroll_height = (ui.available_height() - Self::SCREEN_FOOTER_SPACING).max(0.0);
        egui::ScrollArea::vertical()
            .max_height(scroll_height)
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for line in &lines {
                    ui.label(egui::RichText::new(line.as_str()).family(egui::FontFamily::Monospace));
                }
                if lines.is_empty() {
                    ui.label("No log output yet.");
                }
            });
        ui.add_space(Self::SCREEN_FOOTER_SPACING);
    }

    // ---- modal windows ----

    fn ui_rename_modal(&mut self, ctx: &egui::Context) {
        let Some((chat_id, mut title)) = self.rename_target.take() else {
            return;
        };
        let mut keep_open = true;
        let mut confirmed = false;
        egui::Window::new("Rename conversation")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
            .show(ctx, |ui| {
                ui.add_sized(
                    [260.0, 24.0],
                    egui::TextEdit::singleline(&mut title),
                );
                ui.add_space(8.0);
                ui.horizontal(|ui| {
                    let valid = !title.trim().is_empty();
                    if ui.add_enabled(valid, egui::Button::new("Save")).clicked() {
                        confirmed = true;
                    }
                    if ui.button("Cancel").clicked() {
                        keep_open = false;
                    }
                });
            });
        if confirmed {
            self.start_rename(chat_id, title);
        } else if keep_open {
            self.rename_target = Some((chat_id, title));
        }
    }

    fn ui_delete_modal(&mut self, ctx: &egui::Context) {
        let Some(chat_id) = self.delete_target.take() else {
            return;
        };
        let title = self
            .chat_list
            .chats()
            .iter()
            .find(|c| c.id == chat_id)
            .map(|c| c.title.clone())
            .unwrap_or_else(|| chat_id.clone());
        let mut keep_open = true;
        let mut confirmed = false;
        egui::Window::new("Delete conversation")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
            .show(ctx, |ui| {
                ui.label(format!("Delete \"{}\"? This cannot be undone.", title));
                ui.add_space(8.0);
                ui.horizontal(|ui| {
                    if ui.button("Delete").clicked() {
                        confirmed = true;
                    }
                    if ui.button("Cancel").clicked() {
                        keep_open = false;
                    }
                });
            });
        if confirmed {
            self.start_delete(chat_id);
        } else if keep_open {
            self.delete_target = Some(chat_id);
        }
    }

    fn ui_tool_window(&mut self, ctx: &egui::Context) {
        let Some(tool) = self.open_tool else { return };
        let mut open = true;
        egui::Window::new(tool.name)
            .open(&mut open)
            .resizable(true)
            .default_size([360.0, 240.0])
            .show(ctx, |ui| {
                ui.label(tool.description);
                ui.add_space(8.0);
                ui.label(egui::RichText::new(format!("icon: {}", tool.icon)).small().weak());
                ui.separator();
                ui.label("Coming soon.");
            });
        if !open {
            self.open_tool = None;
        }
    }
}

impl eframe::App for ParleyApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.set_visuals(match self.theme {
            Theme::Dark => egui::Visuals::dark(),
            Theme::Light => egui::Visuals::light(),
        });

        self.poll_login();
        self.poll_chats();
        self.poll_models();
        self.poll_thread();
        self.tick_reveal(ctx);

        // Pending background work needs frames even without input.
        if self.login_receiver.is_some()
            || self.chats_receiver.is_some()
            || self.create_receiver.is_some()
            || self.rename_receiver.is_some()
            || self.delete_receiver.is_some()
            || self.models_receiver.is_some()
            || self.load_receiver.is_some()
            || self.send_receiver.is_some()
        {
            ctx.request_repaint_after(Duration::from_millis(50));
        }

        if self.current_screen == Screen::Login {
            egui::CentralPanel::default().show(ctx, |ui| {
                self.ui_login_screen(ui);
            });
            return;
        }

        // Header: title, user, theme and debug controls.
        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            egui::Frame::none()
                .inner_margin(egui::Margin::symmetric(24.0, 0.0))
                .show(ui, |ui| {
                    ui.add_space(12.0);
                    ui.horizontal(|ui| {
                        ui.heading("Parley");
                        if self.session.debug_mode() {
                            ui.label(egui::RichText::new("debug").small().weak());
                        }
                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            if ui.button("Log out").clicked() {
                                self.logout();
                                return;
                            }
                            ui.add_space(8.0);
                            let theme_label = match self.theme {
                                Theme::Dark => "Light mode",
                                Theme::Light => "Dark mode",
                            };
                            if ui.button(theme_label).clicked() {
                                self.theme = match self.theme {
                                    Theme::Dark => Theme::Light,
                                    Theme::Light => Theme::Dark,
                                };
                            }
                            ui.add_space(8.0);
                            let logs = self.current_screen == Screen::Logs;
                            if ui.selectable_label(logs, "Logs").clicked() {
                                self.current_screen =
                                    if logs { Screen::Chat } else { Screen::Logs };
                            }
                            ui.add_space(8.0);
                            if let Some(user) = self.session.user() {
                                ui.label(&user.username);
                            }
                        });
                    });
                    ui.add_space(12.0);
                });
        });
        if self.current_screen == Screen::Login {
            // logout happened inside the header closure
            return;
        }

        if self.current_screen == Screen::Logs {
            egui::CentralPanel::default().show(ctx, |ui| {
                egui::Frame::none()
                    .inner_margin(egui::Margin::symmetric(24.0, 0.0))
                    .show(ui, |ui| {
                        self.ui_logs_screen(ui);
                    });
            });
            return;
        }

        egui::SidePanel::left("sidebar")
            .resizable(false)
            .exact_width(260.0)
            .show(ctx, |ui| {
                egui::Frame::none()
                    .inner_margin(egui::Margin::symmetric(16.0, 0.0))
                    .show(ui, |ui| {
                        self.ui_sidebar(ui);
                    });
            });

        egui::SidePanel::right("tools_panel")
            .resizable(false)
            .exact_width(200.0)
            .show(ctx, |ui| {
                egui::Frame::none()
                    .inner_margin(egui::Margin::symmetric(16.0, 0.0))
                    .show(ui, |ui| {
                        self.ui_tool_panel(ui);
                    });
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::Frame::none()
                .inner_margin(egui::Margin::symmetric(24.0, 0.0))
                .show(ui, |ui| {
                    self.ui_chat_screen(ui);
                });
        });

        self.ui_rename_modal(ctx);
        self.ui_delete_modal(ctx);
        self.ui_tool_window(ctx);
    }
}

fn load_attachment(path: &str) -> anyhow::Result<FileUpload> {
    use anyhow::Context;
    let path = std::path::Path::new(path);
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());
    let content_type = match path.extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("txt") | Some("md") => "text/plain",
        Some("pdf") => "application/pdf",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    };
    Ok(FileUpload {
        filename,
        content_type: content_type.to_string(),
        bytes,
    })
}
