use clap::{Parser, Subcommand};
use vitalink::session::{DataScreen, SessionKey};
use vitalink::sync::{ChannelEvent, ChannelStatus};
use vitalink_tools::ServiceOpts;

use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "vita-tool",
    version,
    about = "Vitals monitoring session management and data utility"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new monitoring session and print its key
    NewSession {
        #[command(flatten)]
        service: ServiceOpts,
    },
    /// Check whether a session key exists
    Check {
        #[command(flatten)]
        service: ServiceOpts,

        /// Session key to check
        key: String,
    },
    /// Fetch the historical snapshot for a session and print it
    Fetch {
        #[command(flatten)]
        service: ServiceOpts,

        /// Session key to fetch
        key: String,

        /// Print raw JSON, one row per line
        #[arg(long)]
        json: bool,
    },
    /// Stream live samples for a session to stdout until interrupted
    Watch {
        #[command(flatten)]
        service: ServiceOpts,

        /// Session key to watch
        key: String,
    },
}

fn parse_key(input: &str) -> Result<SessionKey, String> {
    SessionKey::parse(input).map_err(|_| format!("invalid session key: {:?}", input))
}

fn new_session(service: &ServiceOpts) -> Result<(), String> {
    let api = service.api_client().map_err(|e| e.to_string())?;
    let key = api.create_session().map_err(|e| e.to_string())?;
    println!("{}", key);
    Ok(())
}

fn check(service: &ServiceOpts, key: &str) -> Result<(), String> {
    let key = parse_key(key)?;
    let api = service.api_client().map_err(|e| e.to_string())?;
    api.check_session(&key)
        .map_err(|_| format!("session {} not found", key))?;
    println!("session {} ok", key);
    Ok(())
}

fn fetch(service: &ServiceOpts, key: &str, json: bool) -> Result<(), String> {
    let key = parse_key(key)?;
    let api = service.api_client().map_err(|e| e.to_string())?;
    let rows = api.fetch_samples(&key).map_err(|e| e.to_string())?;

    let mut screen = DataScreen::new(key);
    let generation = match screen.start() {
        Some(vitalink::session::Action::FetchSnapshot { generation, .. }) => generation,
        _ => unreachable!("fresh screen always starts with a fetch"),
    };
    // No live half here; the resolution action is irrelevant for a one-shot dump.
    let _ = screen.snapshot_loaded(generation, rows);

    for sample in screen.chronological() {
        if json {
            println!(
                "{}",
                serde_json::json!({
                    "timestamp": sample.timestamp,
                    "spo2": sample.spo2,
                    "pulse": sample.pulse,
                    "session_id": sample.session_id,
                })
            );
        } else {
            println!("{}", sample);
        }
    }
    Ok(())
}

fn watch(service: &ServiceOpts, key: &str) -> Result<(), String> {
    let key = parse_key(key)?;
    let api = service.api_client().map_err(|e| e.to_string())?;
    let sync = service.sync_client().map_err(|e| e.to_string())?;

    let mut screen = DataScreen::new(key.clone());
    let generation = match screen.start() {
        Some(vitalink::session::Action::FetchSnapshot { generation, .. }) => generation,
        _ => unreachable!("fresh screen always starts with a fetch"),
    };

    let rows = api.fetch_samples(&key).map_err(|e| e.to_string())?;
    eprintln!("{} historical samples", rows.len());
    let mut action = screen.snapshot_loaded(generation, rows);

    if let Some(vitalink::session::Action::LookupSession { key: lookup_key }) = action.clone() {
        let resolved = sync.session_id(&lookup_key).map_err(|e| e.to_string())?;
        action = screen.lookup_resolved(resolved);
    }

    let session_id = match action {
        Some(vitalink::session::Action::OpenChannel { session_id }) => session_id,
        _ => {
            eprintln!("no session identifier for {}; nothing to watch", key);
            return Ok(());
        }
    };

    let subscription = sync.subscribe(session_id).map_err(|e| e.to_string())?;
    screen.channel_opened(session_id);
    eprintln!("watching session {} (id {}), Ctrl-C to stop", key, session_id);

    loop {
        match subscription.events().recv_timeout(Duration::from_secs(1)) {
            Ok(ChannelEvent::Insert(sample)) => {
                println!("{}", sample);
            }
            Ok(ChannelEvent::Status(ChannelStatus::Joined)) => {
                eprintln!("channel joined");
            }
            Ok(ChannelEvent::Status(ChannelStatus::Closed)) => {
                eprintln!("channel closed");
                break;
            }
            Ok(ChannelEvent::Status(status)) => {
                eprintln!("channel status: {:?}", status);
            }
            Err(crossbeam::channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam::channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    if screen.teardown().is_some() {
        subscription.close();
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::NewSession { service } => new_session(service),
        Commands::Check { service, key } => check(service, key),
        Commands::Fetch { service, key, json } => fetch(service, key, *json),
        Commands::Watch { service, key } => watch(service, key),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{}", msg);
            ExitCode::FAILURE
        }
    }
}
