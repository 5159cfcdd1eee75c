//! Deckathon Supervisor - supervised automation script runs with live stage tracking.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use deckathon_supervisor::config::{ConfigLoader, EnvFileSummary, SupervisorConfig};
use deckathon_supervisor::display;
use deckathon_supervisor::script::RunEvent;
use deckathon_supervisor::supervisor::{
    ProcessSupervisor, RunMode, RunOutcome, RunRequest, RunResult,
};

/// Exit code reported when a run was cancelled.
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser)]
#[command(
    name = "deckathon-supervisor",
    about = "Run Deckathon automation scripts with live stage tracking",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a config file (overrides the default search).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch an automation script and follow its progress.
    Run {
        /// Directory the script runs in.
        #[arg(long)]
        project_dir: Option<PathBuf>,
        /// Custom API key passed to the script.
        #[arg(long)]
        api_key: Option<String>,
        /// Custom Chrome executable passed to the script.
        #[arg(long)]
        chrome_path: Option<String>,
        /// Print events as JSON lines.
        #[arg(long)]
        json: bool,
        #[command(subcommand)]
        mode: ModeCommand,
    },
    /// Show which defaults the project's .env file provides.
    Env {
        /// Directory containing the .env file.
        #[arg(long)]
        project_dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ModeCommand {
    /// Register a new account.
    CreateAccount,
    /// Drop out using existing portal credentials.
    Dropout {
        #[arg(long)]
        netname: String,
        #[arg(long)]
        password: String,
    },
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<SupervisorConfig, String> {
    let loader = path.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    loader.load().map_err(|e| e.to_string())
}

fn resolve_project_dir(cli_dir: Option<PathBuf>, config: &SupervisorConfig) -> PathBuf {
    cli_dir
        .or_else(|| config.project_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn exit_code_for(result: &RunResult) -> ExitCode {
    match result.outcome {
        RunOutcome::Success => ExitCode::SUCCESS,
        RunOutcome::Cancelled => ExitCode::from(EXIT_CANCELLED),
        _ => result
            .exit_code
            .and_then(|code| u8::try_from(code).ok())
            .filter(|code| *code != 0)
            .map_or(ExitCode::FAILURE, ExitCode::from),
    }
}

async fn run_command(
    config: SupervisorConfig,
    project_dir: PathBuf,
    request: RunRequest,
    json: bool,
) -> ExitCode {
    let mode = request.mode;
    let supervisor = ProcessSupervisor::new(config, project_dir);
    if !json {
        display::print_run_start(mode, supervisor.working_dir());
    }

    let sink = move |event: RunEvent| {
        if json {
            display::print_event_json(&event);
        } else {
            display::print_event(&event);
        }
    };

    let handle = match supervisor.start(request, sink) {
        Ok(handle) => handle,
        Err(e) => {
            display::print_error(&e.to_string());
            return ExitCode::FAILURE;
        }
    };

    let gate = handle.gate();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping script");
            gate.request();
        }
    });

    let result = match handle.wait().await {
        Ok(result) => result,
        Err(e) => {
            display::print_error(&e.to_string());
            return ExitCode::FAILURE;
        }
    };

    if json {
        match serde_json::to_string(&result) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize result"),
        }
    } else {
        display::print_run_end(&result);
        if mode == RunMode::CreateAccount {
            if let Some(creds) = &result.final_credentials {
                display::print_credentials(creds);
            }
        }
    }

    exit_code_for(&result)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match load_config(cli.config) {
        Ok(config) => config,
        Err(e) => {
            display::print_error(&e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Run {
            project_dir,
            api_key,
            chrome_path,
            json,
            mode,
        } => {
            let project_dir = resolve_project_dir(project_dir, &config);
            let mut request = match mode {
                ModeCommand::CreateAccount => RunRequest::create_account(),
                ModeCommand::Dropout { netname, password } => {
                    RunRequest::dropout(netname, password)
                }
            };
            if let Some(key) = api_key {
                request = request.with_api_key(key);
            }
            if let Some(path) = chrome_path {
                request = request.with_chrome_path(path);
            }
            tracing::info!(
                mode = %request.mode,
                project_dir = %project_dir.display(),
                "Starting supervised run"
            );
            run_command(config, project_dir, request, json).await
        }
        Commands::Env { project_dir } => {
            let project_dir = resolve_project_dir(project_dir, &config);
            match EnvFileSummary::load(&project_dir) {
                Ok(summary) => {
                    display::print_env_labels(&project_dir, &summary);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    display::print_error(&e.to_string());
                    ExitCode::FAILURE
                }
            }
        }
    }
}
