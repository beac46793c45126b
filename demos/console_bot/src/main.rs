//! Console Bot Demo
//!
//! Every line typed on stdin becomes a chat message from one simulated
//! sender, delivered over a single "console" connection. Replies are printed
//! back to the terminal.
//!
//! # Commands
//!
//! - `/ping`: replies pong (linked catalog)
//! - `/help`: lists commands (linked catalog)
//! - `/ban <id>`: admin only; fails without an id to show the failure notice
//! - `/guess`: a number guessing conversation built on `wait_for_next`
//! - `/rename`: asks for a new name, then for confirmation
//!
//! Anything else falls through to the unhandled-message listener.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package console-bot -- --role admin
//! cargo run --package console-bot -- --private
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use parley::core::{ApiError, ApiResult};
use parley::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

const CONNECTION: &str = "console";

// ============================================================================
// Command Line
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "console-bot", about = "Chat with Parley commands from the terminal")]
struct Args {
    /// Sender user id.
    #[arg(long, default_value_t = 10001)]
    user: i64,

    /// Group the messages are sent in.
    #[arg(long, default_value_t = 20001)]
    group: i64,

    /// Send private messages instead of group messages.
    #[arg(long)]
    private: bool,

    /// Sender role in the group: member, admin or owner.
    #[arg(long, default_value = "member")]
    role: MemberRole,

    /// Configuration file (defaults to ./parley.toml if present).
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    fn message(&self, text: String) -> NormalizedMessage {
        NormalizedMessage {
            message_type: if self.private { "private" } else { "group" }.to_string(),
            connection: CONNECTION.to_string(),
            user_id: self.user,
            group_id: (!self.private).then_some(self.group),
            role: (!self.private).then_some(self.role),
            text,
        }
    }
}

// ============================================================================
// Console Connection
// ============================================================================

/// Prints replies to stdout.
struct ConsoleBot {
    next_id: AtomicU64,
    connected: AtomicBool,
}

impl ConsoleBot {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            connected: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl Bot for ConsoleBot {
    fn id(&self) -> &str {
        CONNECTION
    }

    async fn send(&self, event: &InboundEvent, message: &str) -> ApiResult<String> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(ApiError::NotConnected);
        }

        let mut out = std::io::stdout().lock();
        let written = match event.group_id() {
            Some(group) => writeln!(out, "[bot -> group {group}] {message}"),
            None => writeln!(out, "[bot -> {}] {message}", event.user_id()),
        };
        written.map_err(|e| ApiError::Other(e.to_string()))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(id.to_string())
    }

    async fn on_disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        info!("Console connection closed");
    }
}

// ============================================================================
// Linked Commands
// ============================================================================

#[distributed_slice(COMMAND_CATALOG)]
#[linkme(crate = parley::framework::linkme)]
fn ping() -> CatalogEntry {
    CatalogEntry::free(
        CommandSpec::group("ping", ["/ping"]).description("replies pong"),
        CommandHandler::from_async(|event: Arc<InboundEvent>| async move {
            event.reply("pong").await?;
            event.stop_propagation();
            Ok(())
        }),
    )
}

#[distributed_slice(COMMAND_CATALOG)]
#[linkme(crate = parley::framework::linkme)]
fn private_ping() -> CatalogEntry {
    CatalogEntry::free(
        CommandSpec::private("ping", ["/ping"]).description("replies pong"),
        CommandHandler::from_async(|event: Arc<InboundEvent>| async move {
            event.reply("pong (private)").await?;
            event.stop_propagation();
            Ok(())
        }),
    )
}

#[distributed_slice(COMMAND_CATALOG)]
#[linkme(crate = parley::framework::linkme)]
fn help() -> CatalogEntry {
    CatalogEntry::free(
        CommandSpec::group("help", ["/help", "help"])
            .flags(MatchFlags::IGNORE_CASE)
            .priority(-1),
        CommandHandler::from_async(|event: Arc<InboundEvent>| async move {
            let help_text = "Commands:\n\
                /ping         - pong\n\
                /ban <id>     - admins only\n\
                /guess        - guess a number\n\
                /rename       - change your nickname";
            event.reply(help_text).await?;
            event.stop_propagation();
            Ok(())
        }),
    )
}

#[distributed_slice(COMMAND_CATALOG)]
#[linkme(crate = parley::framework::linkme)]
fn ban() -> CatalogEntry {
    CatalogEntry::free(
        CommandSpec::group("ban", [r"/ban(\s+\d+)?"])
            .description("bans a member, usage: /ban <user id>")
            .min_role(MemberRole::Admin)
            .priority(10),
        CommandHandler::from_async(|event: Arc<InboundEvent>| async move {
            let target: i64 = event
                .text()
                .trim_start_matches("/ban")
                .trim()
                .parse()
                .context("missing or invalid user id")?;
            event.reply(&format!("banned {target}")).await?;
            event.stop_propagation();
            Ok(())
        }),
    )
}

// ============================================================================
// Conversations
// ============================================================================

/// State shared by the conversation commands.
struct Games {
    rounds: AtomicU32,
}

impl CommandGroup for Games {
    fn create() -> anyhow::Result<Self> {
        Ok(Self {
            rounds: AtomicU32::new(0),
        })
    }
}

async fn guess(games: Arc<Games>, event: Arc<InboundEvent>, waits: ContinuationTable) -> HandlerResult {
    let round = games.rounds.fetch_add(1, Ordering::Relaxed) + 1;
    let secret = (event.user_id().unsigned_abs() + u64::from(round) * 7) % 9 + 1;

    event
        .reply(&format!("Round {round}: I'm thinking of a number from 1 to 9. Type 'quit' to give up."))
        .await?;
    event.stop_propagation();

    loop {
        let answer = match waits
            .wait_for_next(
                &event,
                [r"^[1-9]$", r"^quit$"],
                MatchMode::Regex,
                MatchFlags::IGNORE_CASE,
                Some(Duration::from_secs(60)),
            )
            .await
        {
            Ok(answer) => answer,
            Err(WaitError::Timeout) => {
                event.reply(&format!("Too slow! It was {secret}.")).await?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let Ok(n) = answer.text().parse::<u64>() else {
            answer.reply(&format!("Giving up? It was {secret}.")).await?;
            return Ok(());
        };

        match n.cmp(&secret) {
            std::cmp::Ordering::Less => answer.reply("Higher.").await?,
            std::cmp::Ordering::Greater => answer.reply("Lower.").await?,
            std::cmp::Ordering::Equal => {
                answer.reply("Correct!").await?;
                return Ok(());
            }
        };
    }
}

async fn rename(event: Arc<InboundEvent>, waits: ContinuationTable) -> HandlerResult {
    event.reply("What should I call you?").await?;
    event.stop_propagation();

    let name = waits
        .wait_for_next(&event, [r"\S.*"], MatchMode::Regex, MatchFlags::NONE, Some(Duration::from_secs(30)))
        .await?;
    name.reply(&format!("Call you '{}'? (y/n)", name.text().trim())).await?;

    let confirm = waits
        .wait_for_next(&event, ["yn"], MatchMode::Keyword, MatchFlags::IGNORE_CASE, Some(Duration::from_secs(30)))
        .await?;
    if confirm.text().to_lowercase().starts_with('y') {
        confirm.reply(&format!("Done, {}.", name.text().trim())).await?;
    } else {
        confirm.reply("Never mind.").await?;
    }
    Ok(())
}

fn register_conversations(engine: &DispatchEngine) -> Result<()> {
    let waits = engine.continuations().clone();
    for spec in [CommandSpec::group("guess", ["/guess"]), CommandSpec::private("guess", ["/guess"])] {
        let waits = waits.clone();
        engine.register(CatalogEntry::bound::<Games>(
            spec.description("number guessing game"),
            CommandHandler::async_method(move |games: Arc<Games>, event: Arc<InboundEvent>| {
                guess(games, event, waits.clone())
            }),
        ))?;
    }

    let rename_waits = waits.clone();
    engine.register_group_command(
        CommandSpec::group("rename", ["/rename"]).description("changes your nickname"),
        CommandHandler::from_async(move |event: Arc<InboundEvent>| rename(event, rename_waits.clone())),
    )?;
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = ParleyRuntime::builder();
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }
    let runtime = Arc::new(builder.build()?);

    let report = runtime.register_linked_catalog();
    register_conversations(runtime.engine())?;
    info!(linked = report.registered, stats = %runtime.stats().await, "Commands ready");

    runtime
        .on_unhandled(|event| async move {
            info!(user_id = event.user_id(), text = event.text(), "No command consumed the message");
        })
        .await;

    let connection = runtime.attach_bot(Arc::new(ConsoleBot::new())).await?;
    info!(connection = %connection, "Type messages, Ctrl+D to quit");

    let reader = {
        let runtime = Arc::clone(&runtime);
        let token = runtime.shutdown_token();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                let line = tokio::select! {
                    _ = token.cancelled() => break,
                    line = lines.next_line() => line,
                };
                match line {
                    Ok(Some(text)) if text.trim().is_empty() => continue,
                    Ok(Some(text)) => {
                        let runtime = Arc::clone(&runtime);
                        let message = args.message(text);
                        // Each message on its own task so waiting handlers see the next one.
                        tokio::spawn(async move {
                            if let Err(e) = runtime.handle_normalized(message).await {
                                error!(error = %e, "Failed to handle message");
                            }
                        });
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!(error = %e, "Failed to read stdin");
                        break;
                    }
                }
            }
            runtime.shutdown().await;
        })
    };

    runtime.run().await?;
    reader.abort();
    Ok(())
}
