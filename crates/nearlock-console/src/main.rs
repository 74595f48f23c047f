//! Nearlock console
//!
//! Reads commands from stdin and feeds them to a running unlock service.
//! Logs go to stderr; command output goes to stdout.

use std::{path::PathBuf, time::Duration};

use clap::{Parser, ValueEnum};
use nearlock_app::{FilePreferences, Runtime, RuntimeHandle, SystemEnv};
use nearlock_console::{Command, ConsoleCollaborators, ConsoleError, commands, status_line};
use nearlock_core::{ServiceConfig, ServiceEvent, ServiceKind, UnlockService, UserId};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Which service flavour to run.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    /// Signed-in session.
    Regular,
    /// Login screen.
    Signin,
}

/// Drive a proximity unlock service from the terminal.
#[derive(Debug, Parser)]
#[command(name = "nearlock-console", version)]
struct Args {
    /// Preference file (CBOR). Created on first write.
    #[arg(long, default_value = "nearlock-prefs.cbor")]
    prefs: PathBuf,

    /// User to make active at startup.
    #[arg(long, value_parser = parse_user_id)]
    user: Option<UserId>,

    /// Service flavour.
    #[arg(long, value_enum, default_value_t = Kind::Regular)]
    kind: Kind,

    /// Wake grace window in milliseconds.
    #[arg(long, default_value_t = 5000)]
    wake_grace_ms: u64,

    /// Turn the feature off administratively.
    #[arg(long)]
    disabled: bool,

    /// Start with no radio adapter present.
    #[arg(long)]
    no_radio: bool,
}

impl Args {
    fn config(&self) -> ServiceConfig {
        ServiceConfig {
            kind: match self.kind {
                Kind::Regular => ServiceKind::Regular,
                Kind::Signin => ServiceKind::Signin,
            },
            wake_grace: Duration::from_millis(self.wake_grace_ms),
            feature_disabled: self.disabled,
            ..ServiceConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), ConsoleError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "nearlock=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    info!(version = env!("CARGO_PKG_VERSION"), prefs = %args.prefs.display(), "starting");

    let prefs = FilePreferences::open(&args.prefs)?;
    let service = UnlockService::new(args.config(), Some(prefs));
    let console = ConsoleCollaborators::new(Some(!args.no_radio));
    let (runtime, handle) = Runtime::new(SystemEnv, service, console.collaborators());
    let task = tokio::spawn(runtime.run());

    if let Some(user) = args.user {
        handle.send(ServiceEvent::ActiveUserChanged { user: Some(user) })?;
    }

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    write_line(&mut stdout, "type /help for commands").await?;

    while let Some(line) = lines.next_line().await? {
        if !run_command(commands::parse(&line), &console, &handle, &mut stdout).await? {
            break;
        }
    }

    handle.send(ServiceEvent::Shutdown)?;
    task.await?;
    info!("bye");
    Ok(())
}

/// Execute one command. Returns `false` when the console should exit.
async fn run_command(
    command: Command,
    console: &ConsoleCollaborators,
    handle: &RuntimeHandle,
    stdout: &mut Stdout,
) -> Result<bool, ConsoleError> {
    match command {
        Command::Quit => return Ok(false),
        Command::Empty => {},
        Command::Help => write_line(stdout, commands::HELP).await?,
        Command::Status => write_line(stdout, &status_line(&handle.status())).await?,
        Command::Trust { devices } => console.set_trusted(devices),
        Command::Unknown { input } => {
            write_line(stdout, &format!("unknown command: {input}")).await?;
        },
        Command::InvalidArgs { command, error } => {
            write_line(stdout, &format!("/{command}: {error}")).await?;
        },
        command => {
            let active_user = handle.status().active_user;
            let needs_user = command == Command::Attempt;
            match command.into_event(active_user.as_ref()) {
                Some(event) => handle.send(event)?,
                None if needs_user => write_line(stdout, "no active user").await?,
                None => write_line(stdout, "could not seal the secret").await?,
            }
        },
    }
    Ok(true)
}

fn parse_user_id(value: &str) -> Result<UserId, String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("user id must not be empty".to_string());
    }
    Ok(UserId::new(value))
}

async fn write_line(stdout: &mut Stdout, line: &str) -> Result<(), ConsoleError> {
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}
