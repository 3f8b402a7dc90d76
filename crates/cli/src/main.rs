use clap::{Parser, Subcommand};
use lib::api::{ChatApi, FileUpload, MockClient, ProgressFn, RemoteClient, Sender};
use lib::auth::{SessionStore, User};
use lib::chats::ChatList;
use lib::models::ModelPicker;
use lib::thread::MessageThread;
use std::io::{self, Write};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Parley CLI", long_about = None)]
struct Cli {
    /// Use the built-in offline backend instead of the configured server.
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: PARLEY_CONFIG_PATH or ~/.parley/config.json)
    #[arg(long, short, global = true, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Log in and persist the session (prompts for the password).
    Login {
        /// Username to authenticate as.
        username: String,
    },

    /// Clear the persisted session.
    Logout,

    /// List conversations grouped by age.
    Chats,

    /// List the models the backend offers.
    Models,

    /// Chat interactively (creates a conversation unless --chat is given).
    Chat {
        /// Existing conversation id to continue.
        #[arg(long, value_name = "ID")]
        chat: Option<String>,

        /// Model id to use (default: first available).
        #[arg(long, value_name = "ID")]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("parley {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Login { username }) => {
            if let Err(e) = run_login(cli.config, cli.debug, username).await {
                log::error!("login failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Logout) => {
            let mut session = SessionStore::load_default();
            session.logout();
            println!("logged out");
        }
        Some(Commands::Chats) => {
            if let Err(e) = run_chats(cli.config, cli.debug).await {
                log::error!("chats failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Models) => {
            if let Err(e) = run_models(cli.config, cli.debug).await {
                log::error!("models failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat { chat, model }) => {
            if let Err(e) = run_chat(cli.config, cli.debug, chat, model).await {
                log::error!("chat failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

/// Pick the backend: the in-memory mock in debug mode, the configured HTTP
/// server otherwise.
fn make_api(
    config_path: Option<std::path::PathBuf>,
    debug: bool,
) -> anyhow::Result<Arc<dyn ChatApi>> {
    if debug {
        return Ok(Arc::new(MockClient::new()));
    }
    let (config, _) = lib::config::load_config(config_path)?;
    let base_url = lib::config::resolve_base_url(&config);
    log::debug!("using backend at {}", base_url);
    Ok(Arc::new(RemoteClient::new(base_url)))
}

/// Session for authenticated commands; debug mode substitutes the fixed
/// debug user so the offline backend works without logging in.
fn require_session(debug: bool) -> anyhow::Result<SessionStore> {
    let mut session = SessionStore::load_default();
    if debug && session.user().is_none() {
        session.login(SessionStore::debug_user())?;
        session.set_debug_mode(true)?;
    }
    if session.user().is_none() {
        anyhow::bail!("not logged in; run `parley login <username>` first");
    }
    Ok(session)
}

fn prompt(label: &str) -> anyhow::Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{}", label)?;
    stdout.flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

async fn run_login(
    config_path: Option<std::path::PathBuf>,
    debug: bool,
    username: String,
) -> anyhow::Result<()> {
    let api = make_api(config_path, debug)?;
    let password = prompt("password: ")?;
    let login = api
        .login(&username, &password)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let mut session = SessionStore::load_default();
    session.login(User {
        username: login.username.clone(),
        token: login.token,
        profile_pic: login.profile_pic,
    })?;
    session.set_debug_mode(debug)?;
    println!("logged in as {}", login.username);
    Ok(())
}

async fn run_chats(config_path: Option<std::path::PathBuf>, debug: bool) -> anyhow::Result<()> {
    let session = require_session(debug)?;
    let api = make_api(config_path, debug)?;
    let mut list = ChatList::new();
    list.refresh(api.as_ref(), session.token()).await;
    if let Some(notice) = list.take_error() {
        anyhow::bail!(notice);
    }
    let groups = list.grouped(chrono::Utc::now());
    for (label, chats) in groups.sections() {
        if chats.is_empty() {
            continue;
        }
        println!("{}", label);
        for chat in chats {
            println!(
                "  {}  {}  {}",
                chat.id,
                chat.created_at.format("%Y-%m-%d %H:%M"),
                chat.title
            );
        }
    }
    Ok(())
}

async fn run_models(config_path: Option<std::path::PathBuf>, debug: bool) -> anyhow::Result<()> {
    let session = require_session(debug)?;
    let api = make_api(config_path, debug)?;
    let mut picker = ModelPicker::new();
    picker.refresh(api.as_ref(), session.token()).await;
    if let Some(notice) = picker.take_error() {
        anyhow::bail!(notice);
    }
    for model in picker.models() {
        println!("{}  {}", model.id, model.name);
    }
    Ok(())
}

async fn run_chat(
    config_path: Option<std::path::PathBuf>,
    debug: bool,
    chat: Option<String>,
    model: Option<String>,
) -> anyhow::Result<()> {
    let session = require_session(debug)?;
    let api = make_api(config_path, debug)?;
    let token = session.token().to_string();

    let mut picker = ModelPicker::new();
    picker.refresh(api.as_ref(), &token).await;
    match model {
        Some(id) => {
            picker.select(&id);
            if picker.selected().is_none() {
                anyhow::bail!("unknown model {}; run `parley models`", id);
            }
        }
        None => {
            if let Some(first) = picker.models().first().map(|m| m.id.clone()) {
                picker.select(&first);
            }
        }
    }
    let Some(model_id) = picker.selected().map(str::to_string) else {
        anyhow::bail!("no models available");
    };
    println!("model: {}", picker.selected_name().unwrap_or(model_id.as_str()));

    let mut list = ChatList::new();
    let chat_id = match chat {
        Some(id) => id,
        None => list
            .create(api.as_ref(), &token)
            .await
            .ok_or_else(|| anyhow::anyhow!("failed to create conversation"))?,
    };

    let mut thread = MessageThread::new();
    thread.load(api.as_ref(), &token, &chat_id).await;
    if let Some(notice) = thread.take_error() {
        anyhow::bail!(notice);
    }
    for message in thread.messages() {
        print_message(&thread, message);
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut attachment: Option<FileUpload> = None;

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }
        if input.eq_ignore_ascii_case("/help") {
            println!("/attach <path>  attach a file to the next message");
            println!("/exit           leave the chat");
            continue;
        }
        if let Some(path) = input.strip_prefix("/attach ") {
            match load_attachment(path.trim()) {
                Ok(file) => {
                    println!("attached {} ({} bytes)", file.filename, file.bytes.len());
                    attachment = Some(file);
                }
                Err(e) => eprintln!("attach failed: {}", e),
            }
            continue;
        }

        let progress: Option<ProgressFn> = attachment.as_ref().map(|_| upload_progress_printer());
        let sent = thread
            .send(api.as_ref(), &token, input, attachment.take(), Some(&model_id), progress)
            .await;
        if let Some(notice) = thread.take_error() {
            eprintln!("chat error: {}", notice);
        }
        if sent {
            // The terminal prints the reply whole; skip the animation.
            while thread.tick_reveal() {}
            if let Some(reply) = thread.messages().last() {
                print_message(&thread, reply);
            }
        }
    }

    Ok(())
}

fn print_message(thread: &MessageThread, message: &lib::api::Message) {
    let who = match message.sender {
        Sender::User => ">",
        Sender::Bot => "<",
    };
    println!("{} {}", who, thread.display_text(message));
    if let Some(image) = &message.image {
        println!("  [image] {}", image);
    }
    if let Some(file) = &message.file {
        println!("  [file] {} ({} bytes)", file.filename, file.size);
    }
}

/// Progress callback that redraws one status line as the upload advances.
fn upload_progress_printer() -> ProgressFn {
    Box::new(|pct| {
        print!("\ruploading… {:.0}%", pct);
        let _ = io::stdout().flush();
        if pct >= 100.0 {
            println!();
        }
    })
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
