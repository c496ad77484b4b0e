use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use flux_client::{ApiClient, ClientConfig, FileCredentialStore};
use flux_gateway::{ChatRoom, ConnectionState, RoomConfig};
use flux_types::api::{CreateChannelRequest, CreatePostRequest, UpdatePostRequest};
use flux_types::models::{Channel, Post};

#[derive(Parser)]
#[command(name = "flux", about = "Command-line client for the Flux backend")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new account
    Register {
        username: String,
        email: String,
        password: String,
    },
    /// Log in and store the credential pair
    Login { username: String, password: String },
    /// Log out and clear stored credentials
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Show another user's profile
    Profile { username: String },
    /// Posts feed
    #[command(subcommand)]
    Posts(PostsCommand),
    /// Chat channels
    #[command(subcommand)]
    Channels(ChannelsCommand),
    /// Join a channel's live chat room
    Chat { channel_id: i64 },
}

#[derive(Subcommand)]
enum PostsCommand {
    List,
    Get {
        id: i64,
    },
    Create {
        #[arg(long)]
        title: Option<String>,
        content: String,
    },
    Edit {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
    },
    Delete {
        id: i64,
    },
}

#[derive(Subcommand)]
enum ChannelsCommand {
    List,
    Search {
        query: String,
    },
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        private: bool,
    },
    Join {
        id: i64,
    },
    Leave {
        id: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flux=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = ClientConfig::from_env()?;
    let store = Arc::new(FileCredentialStore::open(
        FileCredentialStore::default_path(),
    )?);
    let client = ApiClient::new(config, store);

    match cli.command {
        Command::Register {
            username,
            email,
            password,
        } => {
            let user = client.register(&username, &email, &password).await?;
            println!("registered {} (id {})", user.username, user.id);
        }
        Command::Login { username, password } => {
            client.login(&username, &password).await?;
            println!("logged in as {username}");
        }
        Command::Logout => {
            client.logout().await?;
            println!("logged out");
        }
        Command::Whoami => {
            let user = client.current_user().await?;
            println!("{} <{}> ({})", user.username, user.email, user.role);
        }
        Command::Profile { username } => {
            let user = client.profile(&username).await?;
            println!("{} <{}> ({})", user.username, user.email, user.role);
        }
        Command::Posts(cmd) => run_posts(&client, cmd).await?,
        Command::Channels(cmd) => run_channels(&client, cmd).await?,
        Command::Chat { channel_id } => run_chat(&client, channel_id).await?,
    }

    Ok(())
}

async fn run_posts(client: &ApiClient, cmd: PostsCommand) -> anyhow::Result<()> {
    match cmd {
        PostsCommand::List => {
            for post in client.list_posts().await? {
                print_post(&post);
            }
        }
        PostsCommand::Get { id } => {
            let post = client.get_post(id).await?;
            print_post(&post);
            println!("{}", post.content);
        }
        PostsCommand::Create { title, content } => {
            let post = client
                .create_post(&CreatePostRequest { title, content })
                .await?;
            println!("created post {}", post.id);
        }
        PostsCommand::Edit { id, title, content } => {
            let post = client
                .update_post(id, &UpdatePostRequest { title, content })
                .await?;
            println!("updated post {}", post.id);
        }
        PostsCommand::Delete { id } => {
            client.delete_post(id).await?;
            println!("deleted post {id}");
        }
    }
    Ok(())
}

async fn run_channels(client: &ApiClient, cmd: ChannelsCommand) -> anyhow::Result<()> {
    match cmd {
        ChannelsCommand::List => {
            for channel in client.list_channels().await? {
                print_channel(&channel);
            }
        }
        ChannelsCommand::Search { query } => {
            for channel in client.search_channels(&query).await? {
                print_channel(&channel);
            }
        }
        ChannelsCommand::Create {
            name,
            description,
            private,
        } => {
            let channel = client
                .create_channel(&CreateChannelRequest {
                    name,
                    description,
                    is_public: !private,
                })
                .await?;
            println!("created channel {} (id {})", channel.name, channel.id);
        }
        ChannelsCommand::Join { id } => {
            client.join_channel(id).await?;
            println!("joined channel {id}");
        }
        ChannelsCommand::Leave { id } => {
            client.leave_channel(id).await?;
            println!("left channel {id}");
        }
    }
    Ok(())
}

/// Interactive room: print history and live messages, send stdin lines.
async fn run_chat(client: &ApiClient, channel_id: i64) -> anyhow::Result<()> {
    let detail = client
        .get_channel(channel_id)
        .await
        .context("failed to load channel")?;

    println!(
        "#{} — {} members, {} channel",
        detail.name,
        detail.members.len(),
        if detail.is_public { "public" } else { "private" }
    );
    for message in &detail.messages {
        println!("[{}] {}: {}", message.created_at, message.user, message.content);
    }

    let token_client = client.clone();
    let room = ChatRoom::connect(
        RoomConfig::new(client.config().ws_base.clone(), channel_id),
        Arc::new(move || token_client.access_token()),
        detail.messages,
    );

    // Print live messages as they arrive.
    let mut inbound = room.feed().subscribe();
    let printer = tokio::spawn(async move {
        while let Some(message) = inbound.recv().await {
            println!("[{}] {}: {}", message.created_at, message.user, message.content);
        }
    });

    // Surface connection drops.
    let mut state_rx = room.watch_state();
    let state_task = tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            match *state_rx.borrow() {
                ConnectionState::Connected => println!("* connected"),
                ConnectionState::Connecting => println!("* connecting..."),
                ConnectionState::Disconnected => println!("* connection lost"),
            }
        }
    });

    // Read lines from stdin until EOF.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if let Err(e) = room.send(&line) {
            warn!("message not sent: {e}");
            println!("* message dropped: {e}");
        }
    }

    room.close().await;
    printer.abort();
    state_task.abort();
    Ok(())
}

fn print_post(post: &Post) {
    println!(
        "#{} {} (user {}, {})",
        post.id,
        post.title.as_deref().unwrap_or("(untitled)"),
        post.user_id,
        post.created_at
    );
}

fn print_channel(channel: &Channel) {
    println!(
        "#{} {} — {} ({})",
        channel.id,
        channel.name,
        channel.description.as_deref().unwrap_or(""),
        if channel.is_public { "public" } else { "private" }
    );
}
