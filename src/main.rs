use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod config;
mod native_messaging;
mod protocol;
mod provider;
mod scheduler;
mod session;
mod similarity;
mod ws;

use config::config::Settings;
use provider::segment::SegmentProvider;
use session::session::SessionDefaults;
use similarity::similarity::MatchGrade;

/// Language practice companion: pauses videos, plays back translated
/// transcript lines and scores how well you repeat them.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long = "config", value_name = "FILE", global = true)]
    settings_file: Option<PathBuf>,

    /// Append logs to this file instead of stderr
    #[arg(short, long, global = true)]
    log: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the WebSocket daemon the extension connects to (default)
    Serve {
        /// Address to bind, overriding the settings file
        #[arg(long)]
        listen: Option<String>,
    },
    /// Run as a Chrome native messaging host on stdin/stdout
    Native,
    /// Score how closely CANDIDATE matches REFERENCE
    Score { reference: String, candidate: String },
    /// Fetch a random translated transcript line for a video
    Segment {
        /// Video id or URL
        video_id: String,
        /// Target language, e.g. es-ES
        #[arg(long)]
        lang: Option<String>,
    },
    /// Show or change persisted settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the effective settings
    Show,
    /// Update one or more settings
    Set {
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        min: Option<u64>,
        #[arg(long)]
        max: Option<u64>,
        #[arg(long)]
        listen: Option<String>,
    },
}

fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    });
    builder.parse_default_env();

    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating log directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

// Chrome launches native hosts with the caller's origin as an argument.
fn launched_by_browser(args: &[String]) -> bool {
    args.iter()
        .skip(1)
        .any(|arg| arg.starts_with("chrome-extension://"))
}

fn default_native_log() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("say_it").join("native.log"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let cli = if launched_by_browser(&args) {
        Cli {
            settings_file: None,
            log: None,
            verbose: false,
            command: Some(Commands::Native),
        }
    } else {
        Cli::parse()
    };

    let native = matches!(cli.command, Some(Commands::Native));
    let log_file = match (&cli.log, native) {
        (Some(path), _) => Some(path.clone()),
        (None, true) => default_native_log(),
        (None, false) => None,
    };
    init_logging(cli.verbose, log_file.as_deref())?;

    let settings_path = match cli.settings_file {
        Some(path) => path,
        None => Settings::default_path()?,
    };
    let settings = Settings::load_from(&settings_path)?;

    match cli.command.unwrap_or(Commands::Serve { listen: None }) {
        Commands::Serve { listen } => run_daemon_mode(&settings, listen).await,
        Commands::Native => {
            let (provider, defaults) = session_parts(&settings)?;
            info!("Native messaging host started");
            native_messaging::run_native_host(provider, defaults).await
        }
        Commands::Score {
            reference,
            candidate,
        } => {
            let score = similarity::similarity::score(&reference, &candidate);
            let edits = similarity::similarity::levenshtein(
                &reference.to_lowercase(),
                &candidate.to_lowercase(),
            );
            println!(
                "Similarity: {:.1}% ({}, {} edits)",
                score,
                MatchGrade::from_score(score).as_str(),
                edits
            );
            Ok(())
        }
        Commands::Segment { video_id, lang } => {
            let lang = lang.unwrap_or_else(|| settings.language.clone());
            let provider = SegmentProvider::youtube(settings.request_timeout())?;
            let segment = provider.fetch_random_translated_segment(&video_id, &lang).await?;
            println!(
                "[{:.1}s] {}",
                segment.original_segment.start, segment.original_segment.text
            );
            println!("({}) {}", segment.target_lang, segment.translated_text);
            Ok(())
        }
        Commands::Config { command } => run_config(settings, &settings_path, command),
    }
}

fn session_parts(settings: &Settings) -> Result<(Arc<SegmentProvider>, SessionDefaults)> {
    let provider = SegmentProvider::youtube(settings.request_timeout())?;
    let defaults = SessionDefaults::from_settings(settings)?;
    Ok((Arc::new(provider), defaults))
}

/// WebSocket server; runs until interrupted.
async fn run_daemon_mode(settings: &Settings, listen: Option<String>) -> Result<()> {
    let listen = listen.unwrap_or_else(|| settings.listen.clone());
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("invalid listen address {}", listen))?;
    let (provider, defaults) = session_parts(settings)?;

    info!(
        "Pausing every {}-{}s, practising {}",
        defaults.schedule.min_interval_seconds(),
        defaults.schedule.max_interval_seconds(),
        defaults.language
    );

    tokio::select! {
        result = ws::websocket_server::start_websocket_server(addr, provider, defaults) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}

fn run_config(mut settings: Settings, path: &Path, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            println!("# {}", path.display());
            print!("{}", toml::to_string_pretty(&settings)?);
        }
        ConfigCommands::Set {
            language,
            min,
            max,
            listen,
        } => {
            if let Some(language) = language {
                settings.language = language;
            }
            if let Some(min) = min {
                settings.min_interval_seconds = min;
            }
            if let Some(max) = max {
                settings.max_interval_seconds = max;
            }
            if let Some(listen) = listen {
                settings.listen = listen;
            }
            settings.save_to(path)?;
            println!("Saved settings to {}", path.display());
        }
    }
    Ok(())
}
