//! forum-chat: terminal front-end for the forum client.
//! Account commands talk to the auth service, listing commands to the forum
//! service, and `chat` bridges stdin/stdout to the live chat channel.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use forum_client::config::{self, Config};
use forum_client::{
    AuthClient, ChatHistory, ConnectionState, FileStorage, ForumClient, RealtimeChannel,
    SessionStore,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long `chat` waits for the first connection before giving up.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "forum-chat")]
#[command(about = "Forum and live chat client")]
struct Cli {
    /// Config file (default: ~/.forum-chat/config.yaml)
    #[arg(long, env = "FORUM_CHAT_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Log in and remember the session
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the remembered session
    Logout,
    /// Show the remembered session
    Whoami,
    /// List categories
    Categories,
    /// List posts
    Posts,
    /// List the comments of a post
    Comments {
        #[arg(long)]
        post_id: i64,
    },
    /// Show recent chat messages
    History {
        #[arg(long, default_value = "50")]
        limit: usize,
    },
    /// Delete a chat message (admins only)
    DeleteMessage {
        #[arg(long)]
        id: i64,
    },
    /// Join the live chat: stdin lines are sent, messages are printed
    Chat,
}

fn resolve_config_path(flag: Option<PathBuf>) -> Result<PathBuf> {
    match flag {
        Some(path) => Ok(path),
        None => config::default_config_path()
            .context("unable to determine config path (set --config or FORUM_CHAT_CONFIG)"),
    }
}

fn session_store(cfg: &Config) -> Result<SessionStore> {
    let path = cfg
        .session_path()
        .context("unable to determine session path (set storage.session_path)")?;
    Ok(SessionStore::new(
        AuthClient::new(cfg.auth_url()),
        FileStorage::new(path),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "forum_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config)?;
    let cfg = config::load_or_default(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let session = session_store(&cfg)?;

    match cli.command {
        Commands::Register {
            email,
            username,
            password,
        } => {
            let result = session.register(&email, &username, &password).await?;
            println!(
                "{}",
                result
                    .message
                    .unwrap_or_else(|| "Registration successful! Please login.".into())
            );
        }
        Commands::Login { username, password } => {
            let s = session.authenticate(&username, &password).await?;
            println!("Logged in as {} ({})", s.username, s.role);
        }
        Commands::Logout => {
            session.logout();
            println!("Logged out");
        }
        Commands::Whoami => match session.current() {
            Some(s) => println!("{} (id {}, {})", s.username, s.user_id, s.role),
            None => println!("Not logged in"),
        },
        Commands::Categories => {
            let forum = ForumClient::new(cfg.forum_url(), session);
            for category in forum.categories().await? {
                println!("[{}] {}: {}", category.id, category.name, category.description);
            }
        }
        Commands::Posts => {
            let forum = ForumClient::new(cfg.forum_url(), session);
            for post in forum.posts().await? {
                println!("[{}] {}", post.id, post.title);
            }
        }
        Commands::Comments { post_id } => {
            let forum = ForumClient::new(cfg.forum_url(), session);
            for comment in forum.comments(post_id).await? {
                println!("[{}] {}", comment.id, comment.content);
            }
        }
        Commands::History { limit } => {
            let history = ChatHistory::from_config(&cfg, session);
            for entry in history.fetch(limit).await? {
                println!("{}: {}", entry.username, entry.content);
            }
        }
        Commands::DeleteMessage { id } => {
            ChatHistory::from_config(&cfg, session).delete(id).await?;
            println!("Deleted message {id}");
        }
        Commands::Chat => run_chat(&cfg, session).await?,
    }
    Ok(())
}

async fn run_chat(cfg: &Config, session: SessionStore) -> Result<()> {
    if !session.is_logged_in() {
        bail!("not logged in (run `forum-chat login` first)");
    }

    let channel = RealtimeChannel::from_config(cfg, session);
    channel.on_message(|msg| println!("{}: {}", msg.username, msg.content));
    channel.attach_to_session();

    let mut states = channel.state_changes();
    tokio::time::timeout(
        CONNECT_TIMEOUT,
        states.wait_for(|s| *s == ConnectionState::Open),
    )
    .await
    .with_context(|| format!("could not connect to {}", cfg.chat_url()))??;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if !line.is_empty() {
            channel.send(line);
        }
    }

    channel.shutdown().await;
    Ok(())
}
