//! # Telepost CLI
//!
//! Scheduled channel publishing for Telegram.
//!
//! Usage:
//!   telepost init                      # Create config and database
//!   telepost worker                    # Run the dispatch loop
//!   telepost status                    # Queue overview
//!   telepost channel add ...           # Register a destination channel
//!   telepost post add ...              # Create and schedule a post
//!   telepost cancel <publication-id>   # Cancel a pending publication

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use telepost_channels::TelegramPort;
use telepost_core::config::TelepostConfig;
use telepost_core::traits::SystemClock;
use telepost_core::types::{Channel, Post, RuleKind};
use telepost_engine::{DispatchLoop, Policy, ScheduleOutcome, schedule_post};
use telepost_ledger::{Ledger, slots};

#[derive(Parser)]
#[command(
    name = "telepost",
    version,
    about = "Scheduled channel publishing — ordered delivery, retries, catch-up"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the default config file and an empty ledger
    Init,

    /// Run the background dispatch worker until Ctrl+C
    Worker,

    /// Show publication counts by status
    Status,

    /// Manage destination channels
    Channel {
        #[command(subcommand)]
        action: ChannelAction,
    },

    /// Manage posts
    Post {
        #[command(subcommand)]
        action: PostAction,
    },

    /// Cancel a pending publication
    Cancel {
        publication_id: i64,
    },

    /// Manage the content blacklist
    Blacklist {
        #[command(subcommand)]
        action: BlacklistAction,
    },

    /// Show the audit trail for an entity
    Audit {
        /// "post" or "publication"
        entity: String,
        id: i64,
    },
}

#[derive(Subcommand)]
enum ChannelAction {
    /// Register a channel
    Add {
        /// Display title
        #[arg(short, long)]
        title: String,

        /// Chat id, @username, or t.me link
        #[arg(long)]
        chat: String,

        /// Bot token used to post into this chat
        #[arg(long)]
        token: String,

        /// Channel-local offset from UTC, minutes
        #[arg(long)]
        offset_minutes: Option<i32>,

        /// Preferred daily send time, HH:MM channel-local
        #[arg(long)]
        daily_time: Option<String>,
    },
    /// List registered channels
    List,
}

#[derive(Subcommand)]
enum PostAction {
    /// Create a post and schedule its publication
    Add {
        /// Destination channel id
        #[arg(long)]
        channel: i64,

        #[arg(short, long)]
        title: String,

        /// Message body, HTML
        #[arg(long)]
        text: String,

        /// Send time, RFC 3339 (e.g. 2026-09-01T10:00:00Z). Omit to use the
        /// channel's next free daily slot.
        #[arg(long)]
        at: Option<String>,
    },

    /// Check an existing post against the current policy without scheduling
    Validate {
        post_id: i64,
    },
}

#[derive(Subcommand)]
enum BlacklistAction {
    /// Add a rule
    Add {
        /// "word", "domain", or "regex"
        #[arg(short, long, default_value = "word")]
        kind: String,

        pattern: String,
    },
    /// List all rules
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "telepost=debug,telepost_engine=debug,telepost_ledger=debug,telepost_channels=debug"
    } else {
        "telepost=info,telepost_engine=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = if let Some(path) = &cli.config {
        TelepostConfig::load_from(std::path::Path::new(path))?
    } else {
        TelepostConfig::load()?
    };

    match cli.command {
        Commands::Init => {
            config.save()?;
            Ledger::open(&config.database_path())?;
            println!("Config: {}", TelepostConfig::default_path().display());
            println!("Ledger: {}", config.database_path().display());
        }

        Commands::Worker => {
            let ledger = Ledger::open(&config.database_path())?;
            let engine = DispatchLoop::new(
                ledger,
                TelegramPort::new(),
                SystemClock,
                config.scheduler.clone(),
            );
            tokio::select! {
                _ = engine.run() => {}
                _ = tokio::signal::ctrl_c() => {
                    println!("\nWorker stopped.");
                }
            }
        }

        Commands::Status => {
            let ledger = Ledger::open(&config.database_path())?;
            let counts = ledger.status_counts()?;
            if counts.is_empty() {
                println!("No publications yet.");
            }
            for (status, count) in counts {
                println!("{status:>10}  {count}");
            }
        }

        Commands::Channel { action } => {
            let ledger = Ledger::open(&config.database_path())?;
            match action {
                ChannelAction::Add {
                    title,
                    chat,
                    token,
                    offset_minutes,
                    daily_time,
                } => {
                    let mut channel = Channel::new(&title, &chat, &token);
                    if let Some(offset) = offset_minutes {
                        channel.utc_offset_minutes = offset;
                    }
                    if let Some(daily) = daily_time {
                        channel.daily_time = daily;
                    }
                    let id = ledger.create_channel(&channel)?;
                    println!("Channel {id} created: {title} -> {chat}");
                }
                ChannelAction::List => {
                    for channel in ledger.list_channels()? {
                        println!(
                            "{:>4}  {:<24} {:<20} daily {} (UTC{:+})",
                            channel.id,
                            channel.title,
                            channel.chat_id,
                            channel.daily_time,
                            channel.utc_offset_minutes / 60,
                        );
                    }
                }
            }
        }

        Commands::Post { action } => {
            let ledger = Ledger::open(&config.database_path())?;
            match action {
                PostAction::Add {
                    channel,
                    title,
                    text,
                    at,
                } => {
                    let dest = ledger.get_channel(channel)?;
                    let planned_at = match at {
                        Some(raw) => {
                            let requested = DateTime::parse_from_rfc3339(&raw)
                                .map_err(|e| anyhow::anyhow!("invalid --at time: {e}"))?
                                .with_timezone(&Utc);
                            slots::adjust_to_window(&dest, requested)
                        }
                        None => {
                            let slot = slots::next_slot(&dest, Utc::now(), &ledger)?;
                            slots::adjust_to_window(&dest, slot)
                        }
                    };

                    let post_id = ledger.create_post(&Post::new(channel, &title, &text))?;
                    let policy = Policy::load(&ledger, &config.policy)?;
                    match schedule_post(&ledger, post_id, planned_at, &policy)? {
                        ScheduleOutcome::Scheduled(publication_id) => {
                            println!(
                                "Post {post_id} scheduled: publication {publication_id} at {planned_at}"
                            );
                        }
                        ScheduleOutcome::Rejected(violations) => {
                            println!("Post {post_id} rejected by policy:");
                            for violation in violations {
                                println!("  - {violation}");
                            }
                            std::process::exit(1);
                        }
                    }
                }
                PostAction::Validate { post_id } => {
                    let post = ledger.get_post(post_id)?;
                    let policy = Policy::load(&ledger, &config.policy)?;
                    let violations = telepost_engine::validate(&post.rendered(), &policy);
                    if violations.is_empty() {
                        println!("Post {post_id} passes the current policy.");
                    } else {
                        for violation in violations {
                            println!("  - {violation}");
                        }
                        std::process::exit(1);
                    }
                }
            }
        }

        Commands::Cancel { publication_id } => {
            let ledger = Ledger::open(&config.database_path())?;
            if ledger.cancel_publication(publication_id)? {
                println!("Publication {publication_id} cancelled.");
            } else {
                println!("Publication {publication_id} is not pending; nothing to cancel.");
            }
        }

        Commands::Blacklist { action } => {
            let ledger = Ledger::open(&config.database_path())?;
            match action {
                BlacklistAction::Add { kind, pattern } => {
                    let id = ledger.add_blacklist_rule(RuleKind::parse(&kind), &pattern)?;
                    println!("Rule {id} added.");
                }
                BlacklistAction::List => {
                    for rule in ledger.blacklist_rules()? {
                        println!("{:>4}  {:<8} {}", rule.id, rule.kind.as_str(), rule.pattern);
                    }
                }
            }
        }

        Commands::Audit { entity, id } => {
            let ledger = Ledger::open(&config.database_path())?;
            for line in ledger.audit_entries(&entity, id)? {
                println!("{line}");
            }
        }
    }

    Ok(())
}
