use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod session;

use commands::{
    AnalyzeCommand, AuthCommand, ConfigCommand, GoalsCommand, LogCommand, ProgressCommand,
    SearchCommand, WatchCommand,
};
use config::Config;
use session::Session;

#[derive(Parser)]
#[command(name = "snap")]
#[command(version)]
#[command(
    about = "Log food and track macros, on this device or in your account",
    long_about = None
)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add, list and remove food log entries
    Log(LogCommand),

    /// Show or change daily macro goals
    Goals(GoalsCommand),

    /// Show progress toward today's goals
    Progress(ProgressCommand),

    /// Look up a food's nutrition
    Search(SearchCommand),

    /// Recognize the foods in a meal photo
    Analyze(AnalyzeCommand),

    /// Manage the account this device syncs with
    Auth(AuthCommand),

    /// Follow live updates of the account's food log
    Watch(WatchCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

fn main() {
    init_tracing();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "snap=warn,nutrisnap_core=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::load(cli.config)?;

    let Some(command) = cli.command else {
        println!("Use --help to see available commands");
        return Ok(());
    };

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(execute_command(command, &config))
}

async fn execute_command(
    command: Commands,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Config(cmd) => cmd.run(config),
        Commands::Auth(cmd) => Ok(cmd.run(config).await?),
        Commands::Search(cmd) => {
            let mut session = open_if(cmd.needs_session(), config).await;
            let result = cmd.run(config, session.as_mut()).await;
            finish(session, result)
        }
        Commands::Analyze(cmd) => {
            let mut session = open_if(cmd.needs_session(), config).await;
            let result = cmd.run(config, session.as_mut()).await;
            finish(session, result)
        }
        Commands::Log(cmd) => {
            let mut session = Session::open(config).await;
            let result = cmd.run(&mut session).await;
            finish(Some(session), result)
        }
        Commands::Goals(cmd) => {
            let mut session = Session::open(config).await;
            let result = cmd.run(&mut session).await;
            finish(Some(session), result)
        }
        Commands::Progress(cmd) => {
            let mut session = Session::open(config).await;
            let result = cmd.run(&mut session).await;
            finish(Some(session), result)
        }
        Commands::Watch(cmd) => {
            let mut session = Session::open(config).await;
            let result = cmd.run(&mut session).await;
            finish(Some(session), result)
        }
    }
}

async fn open_if(needed: bool, config: &Config) -> Option<Session> {
    if needed {
        Some(Session::open(config).await)
    } else {
        None
    }
}

/// Prints any notices raised during the command, then passes its result on.
fn finish(
    session: Option<Session>,
    result: Result<(), Box<dyn std::error::Error>>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(mut session) = session {
        session.print_notices();
    }
    result
}
