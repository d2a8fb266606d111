use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use sentiment_cloud::config::Config;
use sentiment_cloud::engine::{CloudSession, SessionSettings};
use sentiment_cloud::guard::validate;
use sentiment_cloud::net::{identity, RestBackend};
use sentiment_cloud::render::layout::RandomRotation;
use sentiment_cloud::render::{Canvas, CloudLayoutEngine, PlacedTerm};
use sentiment_cloud::text::{aggregate, sanitize::sanitize_message, RankedTermSet};

/// How long networked commands wait for the history fetch.
const HISTORY_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Parser, Debug)]
#[command(name = "sentiment-cloud", version, about = "Community sentiment word cloud")]
struct Cli {
    /// Project scope (overrides SENTIMENT_SCOPE)
    #[arg(long, global = true)]
    scope: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch recent messages and print the cloud layout as JSON
    Cloud {
        #[arg(long)]
        pretty: bool,
    },
    /// Follow the live feed and print a new layout whenever it changes
    Watch {
        /// Stop after this many seconds
        #[arg(long, default_value_t = 60)]
        seconds: u64,
    },
    /// Submit a message
    Submit {
        text: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Show whether this user may submit right now
    Status,
    /// Print local and backend statistics
    Insights {
        /// Skip the backend summary
        #[arg(long)]
        local_only: bool,
    },
    /// Validate a message without submitting it
    Check {
        text: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Lay out messages read from a file (one per line) or stdin, offline
    Render {
        file: Option<PathBuf>,
        #[arg(long)]
        pretty: bool,
    },
}

#[derive(Serialize)]
struct CloudOutput<'a> {
    scope: &'a str,
    canvas: Canvas,
    messages: usize,
    terms: &'a RankedTermSet,
    placements: &'a [PlacedTerm],
}

fn main() -> Result<ExitCode> {
    env_logger::init();
    let cli = Cli::parse();
    let mut config = Config::load()?;
    if let Some(scope) = cli.scope {
        config.scope = scope;
    }

    match cli.command {
        Command::Cloud { pretty } => {
            let mut session = open_session(&config)?;
            let terms = session.terms().clone();
            let placements = session.placements().to_vec();
            print_json(
                &CloudOutput {
                    scope: session.scope(),
                    canvas: config.canvas,
                    messages: session.feed().len(),
                    terms: &terms,
                    placements: &placements,
                },
                pretty,
            )?;
        }
        Command::Watch { seconds } => {
            let mut session = open_session(&config)?;
            let deadline = Instant::now() + Duration::from_secs(seconds);
            loop {
                let terms = session.terms().clone();
                let placements = session.placements().to_vec();
                print_json(
                    &CloudOutput {
                        scope: session.scope(),
                        canvas: config.canvas,
                        messages: session.feed().len(),
                        terms: &terms,
                        placements: &placements,
                    },
                    false,
                )?;
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() || !session.wait_for_update(remaining) {
                    break;
                }
            }
        }
        Command::Submit { text, name } => {
            let mut session = connect(&config)?;
            let outcome = session.submit(&text, name.as_deref());
            println!("{}", outcome);
            if !outcome.is_accepted() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Status => {
            let mut session = connect(&config)?;
            let status = session.refresh_status();
            print_json(&status, true)?;
        }
        Command::Insights { local_only } => {
            let mut session = open_session(&config)?;
            let insights = session.insights(!local_only);
            print_json(&insights, true)?;
        }
        Command::Check { text, name } => {
            // same order as submit: rules apply to the stripped text
            let text = sanitize_message(text.trim()).unwrap_or_default();
            let name = name.and_then(|n| sanitize_message(n.trim()));
            let validation = validate(text.trim(), name.as_deref().map(str::trim));
            match validation.reason() {
                None => println!("ok"),
                Some(reason) => {
                    println!("{}", reason);
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Command::Render { file, pretty } => {
            let input = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("read failed: {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            let messages: Vec<String> = input.lines().filter_map(sanitize_message).collect();
            let terms = aggregate(&messages);
            let engine = CloudLayoutEngine::new(config.canvas);
            let placements = engine.layout(&terms, None, &mut RandomRotation::new());
            print_json(
                &CloudOutput {
                    scope: &config.scope,
                    canvas: config.canvas,
                    messages: messages.len(),
                    terms: &terms,
                    placements: &placements,
                },
                pretty,
            )?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn connect(config: &Config) -> Result<CloudSession<RestBackend>> {
    let (url, key) = config.backend()?;
    let backend = RestBackend::new(url, key, config.feed_poll)?;
    let user_key = identity::load_or_create(&config.identity_path).with_context(|| {
        format!("identifier unavailable: {}", config.identity_path.display())
    })?;
    Ok(CloudSession::new(
        Arc::new(backend),
        user_key,
        SessionSettings::from_config(config),
    ))
}

/// Connect, subscribe and wait for the history fetch.
fn open_session(config: &Config) -> Result<CloudSession<RestBackend>> {
    let mut session = connect(config)?;
    session.open();
    if !session.wait_for_history(HISTORY_TIMEOUT) {
        log::warn!("history not loaded after {:?}", HISTORY_TIMEOUT);
    }
    if let Some(error) = session.error() {
        eprintln!("warning: {}", error);
    }
    Ok(session)
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", out);
    Ok(())
}
