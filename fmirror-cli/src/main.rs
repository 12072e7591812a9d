use anyhow::{Context, Result};
use clap::Parser;
use fmirror_core::{expand_path, Config, Plan, RemoteFs, TaskState};
use fmirror_remote_sftp::{strategies, ConnectOptions, PasswordPrompt, SshRemote};
use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "fmirror",
    version,
    about = "Reflect local filesystem changes on a remote system in real time, automatically."
)]
struct Cli {
    /// Location of an fmirror configuration file (YAML, or JSON with a .json extension)
    #[arg(short, long, default_value = "fmirror.yaml")]
    config: String,

    /// More output; repeat for trace level
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Only warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn log_level(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .without_time()
        .init();
}

struct TerminalPrompt;

impl PasswordPrompt for TerminalPrompt {
    fn password(&self, target: &str) -> std::io::Result<String> {
        dialoguer::Password::new()
            .with_prompt(format!("Password for {target}"))
            .allow_empty_password(true)
            .interact()
            .map_err(|e| std::io::Error::other(e.to_string()))
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = Config::load(&cli.config).context(
        "couldn't load the fmirror configuration; place an fmirror.yaml in the working \
         directory or pass --config (run `fmirror -h` for usage)",
    )?;
    let plan = Plan::from_config(&cfg)?;

    let identity_file = cfg.identity_file.as_deref().map(expand_path);
    let opts = ConnectOptions {
        host: cfg.remote_host.clone(),
        user: cfg.username()?,
        strategies: strategies(cfg.password(), identity_file.as_deref()),
        allowed_fingerprints: cfg.host_fingerprints.clone(),
    };
    let remote = Arc::new(SshRemote::connect(opts, &TerminalPrompt).await?);

    let mut monitor = plan.start(remote.clone())?;
    info!("Watching for changes on {}; press Ctrl+C to stop", remote.target());

    let outcome = tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for the interrupt signal")?;
            info!("Stopping");
            match monitor.stop().await {
                TaskState::Error(reason) => Err(anyhow::anyhow!(reason)),
                _ => Ok(()),
            }
        }
        reason = monitor.failed() => Err(anyhow::anyhow!(reason)),
    };
    remote.disconnect().await;
    outcome
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level());
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            error!("Terminating.");
            ExitCode::FAILURE
        }
    }
}
