use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use homepage_client::api::{
    share_link, FeedbackForm, LoginRequest, ProjectQuery, RegisterRequest, ReplyForm,
};
use homepage_client::chat::{ChatSession, FileRef, SessionEvent};
use homepage_client::{AppState, Settings};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Command-line client for the personal homepage.
#[derive(Parser)]
#[command(name = "homepage", version, about, long_about = None)]
struct Cli {
    /// Debug logging (-v) or trace logging (-vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and remember the session token.
    Login {
        username: String,
        #[arg(long, env = "HOMEPAGE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account with an activation code.
    Register {
        username: String,
        #[arg(long)]
        nickname: String,
        #[arg(long)]
        code: String,
        #[arg(long, env = "HOMEPAGE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Ask the backend to send an activation code.
    #[command(name = "activate-code")]
    ActivateCode { username: String },
    /// Forget the session token.
    Logout,
    /// Show the signed-in user.
    Me,
    /// Share files through presigned links.
    Files {
        #[command(subcommand)]
        action: FilesCommand,
    },
    /// Send and read site feedback.
    Feedback {
        #[command(subcommand)]
        action: FeedbackCommand,
    },
    /// Manage the project showcase.
    Projects {
        #[command(subcommand)]
        action: ProjectsCommand,
    },
    /// Chat in an ephemeral room.
    Room {
        #[command(subcommand)]
        action: RoomCommand,
    },
    /// Ask the virtual assistant something.
    Ask {
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },
}

#[derive(Subcommand)]
enum FilesCommand {
    Upload {
        path: PathBuf,
        /// Custom download key.
        #[arg(long)]
        key: Option<String>,
        #[arg(long, default_value_t = 1)]
        max_download: u32,
    },
    Download {
        key: String,
        dest: PathBuf,
    },
    Info {
        key: String,
    },
    Delete {
        key: String,
    },
    /// Print the share link for a key.
    Link {
        key: String,
        #[arg(long, default_value = "http://localhost:3000")]
        origin: String,
    },
}

#[derive(Subcommand)]
enum FeedbackCommand {
    Categories,
    Submit {
        #[arg(long)]
        category: i64,
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        contact: Option<String>,
    },
    /// Look up feedback and its reply by receipt uuid.
    Show { uuid: String },
    Reply {
        feedback_id: i64,
        content: String,
    },
    /// Unread feedback (admin only).
    Unread,
}

#[derive(Subcommand)]
enum ProjectsCommand {
    Count,
    List {
        #[arg(long, default_value_t = 0)]
        start: u32,
        #[arg(long, default_value_t = 10)]
        end: u32,
        #[arg(long, default_value_t = 0)]
        status: i32,
        #[arg(long, default_value = "desc")]
        order: String,
    },
    /// Add a project from a JSON document.
    Add { json: String },
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum RoomCommand {
    Create,
    Join { room_id: String },
    /// Go back to the last room.
    Rejoin,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    let settings = Settings::new().context("failed to load configuration")?;

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level)),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(environment = %settings.environment, "configuration loaded");
    let state = AppState::new(settings)?;

    match cli.command {
        Commands::Login { username, password } => {
            let account = state.account();
            match account.login(&LoginRequest { username, password }).await? {
                Some(user) => println!("Logged in as {} ({})", user.nickname, user.username),
                None => println!("Login accepted but no token was issued"),
            }
        }
        Commands::Register {
            username,
            nickname,
            code,
            password,
        } => {
            state
                .account()
                .register(&RegisterRequest {
                    username,
                    password,
                    nickname,
                    active_code: code,
                })
                .await?;
            println!("Registered. You can log in now.");
        }
        Commands::ActivateCode { username } => {
            state.account().request_activation_code(&username).await?;
            println!("Activation code sent");
        }
        Commands::Logout => {
            state.account().logout().await?;
            println!("Logged out");
        }
        Commands::Me => {
            let account = state.account();
            if !account.is_logged_in() {
                bail!("not logged in");
            }
            let user = account.refresh().await?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        Commands::Files { action } => files(&state, action).await?,
        Commands::Feedback { action } => feedback(&state, action).await?,
        Commands::Projects { action } => projects(&state, action).await?,
        Commands::Room { action } => room(&state, action).await?,
        Commands::Ask { message } => ask(&state, &message.join(" ")).await?,
    }

    Ok(())
}

async fn files(state: &AppState, action: FilesCommand) -> anyhow::Result<()> {
    let api = &state.api;
    match action {
        FilesCommand::Upload {
            path,
            key,
            max_download,
        } => {
            let key = api.upload_file(&path, key, max_download).await?;
            println!("Uploaded. Download key: {}", key);
        }
        FilesCommand::Download { key, dest } => {
            let size = api.download_file(&key, &dest).await?;
            println!("Saved {} bytes to {}", size, dest.display());
        }
        FilesCommand::Info { key } => {
            let info = api.file_info(&key).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        FilesCommand::Delete { key } => {
            api.delete_file(&key).await?;
            println!("Deleted {}", key);
        }
        FilesCommand::Link { key, origin } => println!("{}", share_link(&origin, &key)),
    }
    Ok(())
}

async fn feedback(state: &AppState, action: FeedbackCommand) -> anyhow::Result<()> {
    let api = &state.api;
    match action {
        FeedbackCommand::Categories => {
            for category in api.feedback_categories().await? {
                println!("{:>4}  {}", category.id, category.name);
            }
        }
        FeedbackCommand::Submit {
            category,
            title,
            content,
            name,
            contact,
        } => {
            let uuid = api
                .save_feedback(&FeedbackForm {
                    category_id: Some(category),
                    title,
                    content,
                    name,
                    contact,
                })
                .await?;
            println!("Thanks! Keep this receipt to check for a reply: {}", uuid);
        }
        FeedbackCommand::Show { uuid } => {
            let item = api.feedback(&uuid).await?;
            println!("{}", serde_json::to_string_pretty(&item)?);
            match api.feedback_reply(&uuid).await? {
                Some(reply) => println!("Reply: {}", reply.content),
                None => println!("No reply yet"),
            }
        }
        FeedbackCommand::Reply {
            feedback_id,
            content,
        } => {
            api.add_reply(&ReplyForm {
                feedback_id,
                content,
            })
            .await?;
            println!("Reply saved");
        }
        FeedbackCommand::Unread => {
            let account = state.account();
            account.refresh().await?;
            if !account.is_admin() {
                bail!("unread feedback is only available to administrators");
            }
            let unread = api.unread_feedback().await?;
            println!("{}", serde_json::to_string_pretty(&unread)?);
        }
    }
    Ok(())
}

async fn projects(state: &AppState, action: ProjectsCommand) -> anyhow::Result<()> {
    let api = &state.api;
    match action {
        ProjectsCommand::Count => println!("{}", api.project_count().await?),
        ProjectsCommand::List {
            start,
            end,
            status,
            order,
        } => {
            let list = api
                .projects(&ProjectQuery {
                    start,
                    end,
                    status,
                    order,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&list)?);
        }
        ProjectsCommand::Add { json } => {
            let project: serde_json::Value =
                serde_json::from_str(&json).context("project must be a JSON object")?;
            api.add_project(&project).await?;
            println!("Project added");
        }
        ProjectsCommand::Delete { id } => {
            api.delete_project(id).await?;
            println!("Project {} deleted", id);
        }
    }
    Ok(())
}

async fn room(state: &AppState, action: RoomCommand) -> anyhow::Result<()> {
    let session = state.chat_session();
    let ready = match action {
        RoomCommand::Create => session.create_room().await,
        RoomCommand::Join { room_id } => session.join_room(&room_id).await,
        RoomCommand::Rejoin => session.rejoin_room(),
    };
    if !ready {
        let reason = state
            .notifications
            .latest()
            .map(|n| n.description)
            .unwrap_or_else(|| "no room to join".to_string());
        bail!(reason);
    }

    let room_id = session.current_room();
    println!("Room {} (type /file <key> <name> <size> to share, /quit to leave)", room_id);
    let mut events = session.subscribe();
    session.connect(&room_id)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    session.disconnect();
                    break;
                };
                if !handle_input(&session, line.trim()) {
                    session.disconnect();
                    break;
                }
            }
            event = events.recv() => match event {
                Ok(SessionEvent::Status { text, .. }) => println!("* {}", text),
                Ok(SessionEvent::Message(msg)) if !msg.send_by_self => {
                    match msg.file {
                        Some(file) => println!("> [file] {} ({} bytes, key {})", file.name, file.size, file.key),
                        None => println!("> {}", msg.content),
                    }
                }
                Ok(SessionEvent::Message(_)) => {}
                Ok(SessionEvent::Dialog { visible: true }) => {
                    bail!("{}", session.status_text());
                }
                Ok(SessionEvent::Dialog { .. }) => {}
                Err(e) => warn!(error = %e, "missed chat events"),
            }
        }
    }
    Ok(())
}

/// Returns false when the user asked to leave.
fn handle_input(session: &ChatSession, line: &str) -> bool {
    if line.is_empty() {
        return true;
    }
    if line == "/quit" {
        return false;
    }

    let result = match line.strip_prefix("/file ") {
        Some(args) => match parse_file_ref(args) {
            Some(file) => session.send_file_message(file),
            None => {
                println!("usage: /file <key> <name> <size>");
                return true;
            }
        },
        None => session.send_message(line),
    };
    if let Err(e) = result {
        println!("! {}", e.user_message());
    }
    true
}

fn parse_file_ref(args: &str) -> Option<FileRef> {
    let mut parts = args.split_whitespace();
    let key = parts.next()?.to_string();
    let name = parts.next()?.to_string();
    let size = parts.next()?.parse().ok()?;
    Some(FileRef { key, name, size })
}

async fn ask(state: &AppState, message: &str) -> anyhow::Result<()> {
    let mut conversation = state.conversation();
    let result = conversation
        .send_with(message, |text| {
            print!("{}", text);
            let _ = std::io::stdout().flush();
        })
        .await;
    println!();

    if let Err(e) = result {
        bail!(e.user_message());
    }
    if !conversation.emotions().is_empty() {
        info!(emotions = ?conversation.emotions(), "assistant emotions");
    }
    Ok(())
}
