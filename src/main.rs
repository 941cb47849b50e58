//! CLI for Barker
//!
//! Subcommands:
//! - `relay`: run the development relay
//! - `listen`: print barks arriving for a user
//! - `bark`: send one bark
//! - `autobark`: send random barks at a fixed rate

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use barker::barks::{self, Bark};
use barker::config::{Settings, load_config};
use barker::relay::server;
use barker::utils::logging;
use barker::{Event, EventKind, Messenger};
use clap::Parser;
use tracing::{error, info, warn};

const POLL: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(name = "barker")]
enum Command {
    /// Run the development relay
    Relay {
        /// Serve WebSocket connections instead of plain TCP
        #[arg(long)]
        websocket: bool,
    },
    /// Print barks arriving in a user's inbox
    Listen {
        user: String,
        /// Host part of the inbox address
        #[arg(short = 'n', long, default_value = "localhost")]
        host: String,
        /// Subscribe to this address instead of the user's inbox
        #[arg(long)]
        address: Option<String>,
        /// Print each bark as a JSON object
        #[arg(long)]
        json: bool,
    },
    /// Send a bark from a user
    Bark {
        user: String,
        #[arg(required = true)]
        text: Vec<String>,
        #[arg(short = 'n', long, default_value = "localhost")]
        host: String,
    },
    /// Send random barks
    Autobark {
        /// Barks per second
        rate: f64,
        #[arg(short = 'n', long, default_value = "127.0.0.1")]
        host: String,
        /// Users to bark as
        #[arg(long, value_delimiter = ',', default_value = "rex,fido,ark3")]
        users: Vec<String>,
        /// File with one quote per line
        #[arg(long, default_value = "quotes.txt")]
        quotes: String,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cmd = Command::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    logging::init(&settings.log.level);

    let result = match cmd {
        Command::Relay { websocket } => run_relay(&settings, websocket).await,
        Command::Listen {
            user,
            host,
            address,
            json,
        } => {
            let address = address.unwrap_or_else(|| barks::inbox(&host, &user));
            run_listen(&settings, &address, json).await
        }
        Command::Bark { user, text, host } => {
            run_bark(&settings, &host, &user, &text.join(" ")).await
        }
        Command::Autobark {
            rate,
            host,
            users,
            quotes,
        } => run_autobark(&settings, rate, &host, &users, &quotes).await,
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run_relay(
    settings: &Settings,
    websocket: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    tokio::select! {
        result = server::start(settings, websocket) => {
            result?;
            error!("Relay exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }
    Ok(())
}

fn messenger(settings: &Settings) -> Messenger {
    let mut messenger = Messenger::from_settings(&settings.client);
    messenger.on(EventKind::Error, |event| {
        if let Event::Error(e) = event {
            warn!("{e}");
        }
        Ok(())
    });
    messenger
}

async fn run_listen(
    settings: &Settings,
    address: &str,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut messenger = messenger(settings);
    messenger.on(EventKind::Subscription, |_| {
        info!("Listening.");
        Ok(())
    });
    messenger.start(&settings.client.endpoint).await?;
    messenger.subscribe(address).await?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            flag.store(true, Ordering::SeqCst);
        }
    });

    while !interrupted.load(Ordering::SeqCst) {
        messenger.work(Some(POLL)).await?;
        while messenger.incoming() {
            let delivery = messenger.get()?;
            let body = delivery.message.text();
            if json {
                println!("{}", serde_json::to_string(&body)?);
            } else {
                println!("{}: {} ({})", body.sender, body.content, body.id);
            }
            messenger.accept(delivery.token).await?;
        }
    }

    messenger.stop().await?;
    Ok(())
}

async fn run_bark(
    settings: &Settings,
    host: &str,
    user: &str,
    text: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut messenger = messenger(settings);
    messenger.start(&settings.client.endpoint).await?;
    messenger.put(barks::bark_message(host, user, text, chrono::Utc::now())?)?;
    messenger.send().await?;
    messenger.stop().await?;
    Ok(())
}

async fn run_autobark(
    settings: &Settings,
    rate: f64,
    host: &str,
    users: &[String],
    quotes_file: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if !(rate.is_finite() && rate > 0.0) {
        return Err(format!("rate must be a positive number, got {rate}").into());
    }
    let quotes: Vec<String> = match std::fs::read_to_string(quotes_file) {
        Ok(text) => text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect(),
        Err(_) => vec![barks::DEFAULT_QUOTE.to_string()],
    };

    let mut messenger = messenger(settings);
    messenger.start(&settings.client.endpoint).await?;
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / rate));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let bark = barks::random_bark(&mut rand::thread_rng(), users, &quotes);
                let Some(Bark { user, text }) = bark else {
                    return Err("no users to bark as".into());
                };
                messenger.put(barks::bark_message(host, &user, &text, chrono::Utc::now())?)?;
                messenger.send().await?;
                info!("{user} barked: {text}");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received. Exiting gracefully.");
                break;
            }
        }
    }

    messenger.stop().await?;
    Ok(())
}
