use std::fs::{self, OpenOptions};
use std::sync::Mutex;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cropplan_core::{Config, PredictionBackend, PredictionClient};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "cropplan")]
#[command(version, about = "Plan a crop season and ask a local prediction service for yield estimates")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one query to the prediction service and print the answer
    Ask {
        /// Question to send, e.g. "Predict paddy yield in Kadapa"
        query: String,
        /// Prediction endpoint URL
        #[arg(long, env = "CROPPLAN_ENDPOINT")]
        endpoint: Option<String>,
        /// Request timeout in seconds
        #[arg(long, env = "CROPPLAN_TIMEOUT_SECS")]
        timeout: Option<u64>,
    },
    /// Show the saved configuration, or update it when flags are given
    Config {
        #[arg(long)]
        endpoint: Option<String>,
        #[arg(long)]
        timeout: Option<u64>,
        /// Send the form data alongside chat queries
        #[arg(long)]
        send_context: Option<bool>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => {
            init_file_logging()?;
            run_tui(load_config()).await
        }
        Some(Commands::Ask { query, endpoint, timeout }) => {
            init_stderr_logging();
            let mut config = load_config();
            if let Some(endpoint) = endpoint {
                config.endpoint = endpoint;
            }
            if let Some(timeout) = timeout {
                config.timeout_secs = timeout;
            }
            ask(&config, &query).await
        }
        Some(Commands::Config { endpoint, timeout, send_context }) => {
            init_stderr_logging();
            update_config(endpoint, timeout, send_context)
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// The TUI owns the terminal, so logs go to a file in the config dir
fn init_file_logging() -> Result<()> {
    let dir = Config::config_dir()?;
    fs::create_dir_all(&dir)?;
    let log_path = dir.join("cropplan.log");
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("opening log file {}", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

fn load_config() -> Config {
    Config::load().unwrap_or_else(|e| {
        warn!(error = %e, "could not load config, using defaults");
        Config::default().with_env_overrides()
    })
}

async fn run_tui(config: Config) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let mut app = App::new(&config);
    let mut events = EventHandler::new();

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;

            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event).await?,
                None => break,
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    app.shutdown();
    tui::restore()?;
    info!("session closed");
    result
}

async fn ask(config: &Config, query: &str) -> Result<()> {
    let client = PredictionClient::from_config(config);
    info!(endpoint = %client.endpoint(), "sending one-shot query");

    let response = client
        .predict(query, None)
        .await
        .with_context(|| format!("prediction request to {} failed", client.endpoint()))?;

    println!("{}", response.bot_message());
    Ok(())
}

fn update_config(endpoint: Option<String>, timeout: Option<u64>, send_context: Option<bool>) -> Result<()> {
    let path = Config::get_config_path()?;
    let mut config = Config::load_from(&path)?;

    let changed = endpoint.is_some() || timeout.is_some() || send_context.is_some();
    if let Some(endpoint) = endpoint {
        config.endpoint = endpoint;
    }
    if let Some(timeout) = timeout {
        config.timeout_secs = timeout;
    }
    if let Some(send_context) = send_context {
        config.send_form_context = send_context;
    }

    if changed {
        config.save_to(&path)?;
        info!(path = %path.display(), "config saved");
    }

    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
