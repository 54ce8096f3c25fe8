//! callbridge - console front end for the call coordinator
//!
//! Plays the presentation layer: prints affordances and coordinator events as
//! they change and turns scenario steps into the gestures a user would make.
//! The calling service and platform call UI are the in-memory ones from
//! `callbridge_core::sim`.

mod scenarios;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use callbridge_core::sim::{guest_token, LoopbackCallUi, LoopbackCallingService};
use callbridge_core::{CallCoordinator, Capabilities, CoordinatorBuilder, CoordinatorConfig, CoordinatorEvent, User};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "callbridge")]
#[command(about = "Drive the call coordinator through scripted call scenarios", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (TOML, or JSON by extension)
    #[arg(short, long, env = "CALLBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// User this device signs in as
    #[arg(short, long, default_value = "wilma")]
    user: User,

    /// Token to authorize with; a guest token is minted when omitted
    #[arg(long, env = "CALLBRIDGE_TOKEN")]
    token: Option<String>,

    /// Run without the platform call UI
    #[arg(long)]
    no_call_ui: bool,

    /// Disable video
    #[arg(long)]
    audio_only: bool,

    /// Answer incoming calls immediately (only without the platform call UI)
    #[arg(long)]
    auto_answer: bool,

    /// Default log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Call the other user; they answer, talk, and hang up
    Call {
        /// Seconds the call stays connected
        #[arg(long, default_value_t = 2)]
        talk_secs: u64,
    },
    /// The other user calls in and this device answers
    Receive {
        #[arg(long, default_value_t = 2)]
        talk_secs: u64,
    },
    /// The other user calls in and this device declines
    Decline,
    /// Dialing fails; the call button comes back
    DialFailure,
    /// Run every scenario in turn
    Demo,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<CoordinatorConfig> {
    let mut config = match &cli.config {
        Some(path) => CoordinatorConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => CoordinatorConfig::default(),
    };

    let mut capabilities = config.capabilities;
    if cli.no_call_ui {
        capabilities.supports_platform_call_ui = false;
    }
    if cli.audio_only {
        capabilities.supports_video = false;
    }
    config = config.with_capabilities(capabilities);
    if cli.auto_answer {
        config = config.with_auto_answer(true);
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Everything a scenario needs
pub struct Session {
    pub coordinator: Arc<CallCoordinator>,
    pub service: Arc<LoopbackCallingService>,
    pub call_ui: Option<Arc<LoopbackCallUi>>,
    pub user: User,
}

fn build_session(config: CoordinatorConfig, user: User) -> Result<Session> {
    let service = Arc::new(LoopbackCallingService::new());
    let mut builder = CoordinatorBuilder::new()
        .config(config.clone())
        .service(service.clone());

    let call_ui = config.capabilities.supports_platform_call_ui.then(|| Arc::new(LoopbackCallUi::new()));
    if let Some(call_ui) = &call_ui {
        builder = builder.call_ui(call_ui.clone());
    }

    let coordinator = builder.build().context("building coordinator")?;
    if let Some(call_ui) = &call_ui {
        call_ui.attach(&coordinator);
        call_ui.set_answer_incoming(true);
    }

    Ok(Session {
        coordinator,
        service,
        call_ui,
        user,
    })
}

/// Print affordance changes and coordinator events until the coordinator goes away
fn spawn_presentation(coordinator: &Arc<CallCoordinator>) {
    let mut affordances = coordinator.subscribe_affordances();
    tokio::spawn(async move {
        while affordances.changed().await.is_ok() {
            let a = *affordances.borrow_and_update();
            println!(
                "  [ui] call button {} | end-call {} | video {}",
                if a.call_enabled { "enabled" } else { "disabled" },
                if a.end_call_visible { "shown" } else { "hidden" },
                if a.media_visible { "shown" } else { "hidden" },
            );
        }
    });

    let mut events = coordinator.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn print_event(event: &CoordinatorEvent) {
    match event {
        CoordinatorEvent::RegistrationChanged { state, error: Some(error) } => {
            println!("  [event] registration {state}: {error}")
        }
        CoordinatorEvent::RegistrationChanged { state, error: None } => println!("  [event] registration {state}"),
        CoordinatorEvent::OutgoingCallStarted { remote_id, .. } => println!("  [event] calling {remote_id}"),
        CoordinatorEvent::IncomingCall { remote_id, .. } => println!("  [event] incoming call from {remote_id}"),
        CoordinatorEvent::IncomingCallDeclined { remote_id, .. } => {
            println!("  [event] declined a second call from {remote_id}")
        }
        CoordinatorEvent::StateChanged { previous, current, .. } => println!("  [event] {previous} -> {current}"),
        CoordinatorEvent::CallEnded { reason, .. } => println!("  [event] call ended ({reason})"),
        CoordinatorEvent::CallFailed { target, reason } => println!("  [event] call to {target} failed: {reason}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = load_config(&cli)?;
    let capabilities: Capabilities = config.capabilities;
    info!(
        user = %cli.user,
        call_ui = capabilities.supports_platform_call_ui,
        video = capabilities.supports_video,
        "Starting callbridge"
    );

    let session = build_session(config, cli.user)?;
    spawn_presentation(&session.coordinator);

    let token = match &cli.token {
        Some(token) => token.clone(),
        None => guest_token(&cli.user.display_name().to_lowercase())?,
    };
    session
        .coordinator
        .start(&token)
        .await
        .context("starting the coordinator")?;

    let result = match cli.command {
        Commands::Call { talk_secs } => scenarios::outgoing(&session, talk_secs).await,
        Commands::Receive { talk_secs } => scenarios::incoming(&session, talk_secs).await,
        Commands::Decline => scenarios::decline(&session).await,
        Commands::DialFailure => scenarios::dial_failure(&session).await,
        Commands::Demo => scenarios::demo(&session).await,
    };

    session.coordinator.shutdown().await;
    result
}
