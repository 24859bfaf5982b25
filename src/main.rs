mod commands;
mod logging;
mod media;
mod output;
mod sync;
#[cfg(test)]
mod testing;

use chrono::{DateTime, Utc};
use clap::{error::ErrorKind, Parser, Subcommand};
use commands::App;
use output::Envelope;
use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use wacli_core::{
    config::{self, Config},
    error::WacliError,
    models::{ChatFilter, MessageFilter, DEFAULT_PAGE_SIZE},
    traits::ProtocolClient,
};

#[derive(Parser)]
#[command(
    name = "wacli",
    version,
    about = "WhatsApp from the command line. Every command prints one JSON object."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, global = true, default_value = "wacli.toml", env = "WACLI_CONFIG")]
    config: String,

    /// Store directory; overrides `store.dir` from the config file.
    #[arg(long, global = true, env = "WACLI_STORE")]
    store: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Pair this device with WhatsApp by scanning a QR code.
    Auth,
    /// Keep the local store in sync until interrupted.
    Sync,
    /// Query stored messages.
    Messages {
        #[command(subcommand)]
        action: MessagesCommand,
    },
    /// Query stored contacts.
    Contacts {
        #[command(subcommand)]
        action: ContactsCommand,
    },
    /// Query stored chats.
    Chats {
        #[command(subcommand)]
        action: ChatsCommand,
    },
    /// Send a text message.
    Send {
        /// Phone number or JID.
        #[arg(long)]
        to: String,
        #[arg(long)]
        message: String,
    },
    /// Work with message attachments.
    Media {
        #[command(subcommand)]
        action: MediaCommand,
    },
    /// Print the version.
    Version,
}

#[derive(Subcommand)]
enum MessagesCommand {
    /// List messages, newest first.
    List {
        #[arg(long)]
        chat: Option<String>,
        #[arg(long)]
        query: Option<String>,
        #[arg(long)]
        sender: Option<String>,
        /// Only messages after this time (RFC 3339).
        #[arg(long)]
        after: Option<DateTime<Utc>>,
        /// Only messages before this time (RFC 3339).
        #[arg(long)]
        before: Option<DateTime<Utc>>,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        page: u32,
    },
    /// Search message content.
    Search {
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        page: u32,
    },
}

#[derive(Subcommand)]
enum ContactsCommand {
    /// Search contacts by name or number.
    Search {
        #[arg(long)]
        query: String,
    },
}

#[derive(Subcommand)]
enum ChatsCommand {
    /// List chats by most recent activity.
    List {
        #[arg(long)]
        query: Option<String>,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        page: u32,
    },
}

#[derive(Subcommand)]
enum MediaCommand {
    /// Download one message's attachment.
    Download {
        /// Message ID.
        #[arg(long)]
        id: String,
        /// Chat JID, needed when the ID exists in several chats.
        #[arg(long)]
        chat: Option<String>,
        /// Output file or directory.
        #[arg(long)]
        output: Option<String>,
    },
}

impl Commands {
    fn is_sync(&self) -> bool {
        matches!(self, Commands::Sync)
    }

    /// Commands that open a network connection.
    fn uses_network(&self) -> bool {
        matches!(
            self,
            Commands::Auth | Commands::Send { .. } | Commands::Media { .. }
        )
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp
            | ErrorKind::DisplayVersion
            | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => e.exit(),
            _ => {
                let text = e.to_string();
                let message = first_line(&text).trim_start_matches("error: ");
                return emit(&Envelope::error_message(message));
            }
        },
    };

    if let Commands::Version = cli.command {
        return emit(&Envelope::success(&commands::version()));
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => return emit(&Envelope::failure(&e)),
    };

    let default_level = if cli.command.is_sync() { "info" } else { "warn" };
    let _guard = match logging::init(&config.log, default_level) {
        Ok(guard) => guard,
        Err(e) => {
            return emit(&Envelope::error_message(format!(
                "failed to initialize logging: {e:#}"
            )))
        }
    };

    let envelope = match run(cli.command, config).await {
        Ok(envelope) => envelope,
        Err(e) => Envelope::error_message(format!("failed to initialize: {e:#}")),
    };
    emit(&envelope)
}

fn emit(envelope: &Envelope) -> ExitCode {
    println!("{}", envelope.render());
    ExitCode::from(envelope.exit_code() as u8)
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default().trim()
}

fn load_config(cli: &Cli) -> Result<Config, WacliError> {
    let mut config = config::load(&cli.config)?;
    if let Some(store) = cli.store.as_deref().filter(|s| !s.trim().is_empty()) {
        config.store.dir = store.to_string();
    }
    Ok(config)
}

/// Open the store and client, then dispatch one command.
async fn run(command: Commands, config: Config) -> anyhow::Result<Envelope> {
    std::fs::create_dir_all(config.store.root())?;
    let store = Arc::new(wacli_store::Store::new(&config.store).await?);
    let client = wacli_whatsapp::open_client(&config.store).await?;
    let timeout = config.command.timeout();
    let app = App::new(store, client.clone(), config);

    if command.is_sync() {
        return Ok(Envelope::from_result(run_sync(&app).await));
    }

    let network = command.uses_network();
    let envelope = with_timeout(timeout, dispatch(&app, command)).await;
    if network {
        client.disconnect().await;
    }
    Ok(envelope)
}

async fn dispatch(app: &App, command: Commands) -> Envelope {
    match command {
        Commands::Auth => Envelope::from_result(app.auth().await),
        Commands::Messages { action } => match action {
            MessagesCommand::List {
                chat,
                query,
                sender,
                after,
                before,
                limit,
                page,
            } => Envelope::from_result(
                app.list_messages(MessageFilter {
                    after,
                    before,
                    sender,
                    chat_jid: chat,
                    query,
                    limit,
                    page,
                })
                .await,
            ),
            MessagesCommand::Search { query, limit, page } => {
                Envelope::from_result(app.search_messages(&query, limit, page).await)
            }
        },
        Commands::Contacts {
            action: ContactsCommand::Search { query },
        } => Envelope::from_result(app.search_contacts(&query).await),
        Commands::Chats {
            action: ChatsCommand::List { query, limit, page },
        } => Envelope::from_result(app.list_chats(ChatFilter { query, limit, page }).await),
        Commands::Send { to, message } => {
            Envelope::from_result(app.send_message(&to, &message).await)
        }
        Commands::Media {
            action: MediaCommand::Download { id, chat, output },
        } => Envelope::from_result(
            app.download_media(&id, chat.as_deref(), output.as_deref())
                .await,
        ),
        Commands::Sync | Commands::Version => Envelope::failure(&WacliError::Validation(
            "command is not a one-shot command".to_string(),
        )),
    }
}

async fn with_timeout(limit: std::time::Duration, fut: impl Future<Output = Envelope>) -> Envelope {
    match tokio::time::timeout(limit, fut).await {
        Ok(envelope) => envelope,
        Err(_) => Envelope::failure(&WacliError::Timeout(format!(
            "command did not finish within {}s",
            limit.as_secs()
        ))),
    }
}

async fn run_sync(app: &App) -> Result<sync::SyncSummary, WacliError> {
    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(cancel_on_signal(cancel.clone()));
    let result = app.sync(cancel).await;
    watcher.abort();
    result
}

/// Cancel `token` on Ctrl-C or SIGTERM.
async fn cancel_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("received Ctrl-C, shutting down"),
                    _ = term.recv() => info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {e}");
                let _ = tokio::signal::ctrl_c().await;
                info!("received Ctrl-C, shutting down");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received Ctrl-C, shutting down");
    }
    token.cancel();
}
