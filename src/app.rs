use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::api::LlamaClient;
use crate::config::Config;
use crate::runtime::{TerminalFrontend, TurnLoop};
use crate::shell::ShellSession;
use crate::state::{detect_shell_environment, system_preamble};

pub const LOG_FILTER_ENV: &str = "CHATSH_LOG";
pub const LOG_FILE_ENV: &str = "CHATSH_LOG_FILE";

pub type LiveTurnLoop = TurnLoop<LlamaClient, TerminalFrontend, ShellSession>;

pub struct App {
    turns: LiveTurnLoop,
}

impl App {
    /// Connects the model client, starts the shell and tokenizes the preamble.
    pub async fn new(config: Config) -> Result<Self> {
        let client = LlamaClient::new(&config)?;
        let shell = ShellSession::spawn(&config.shell, &config.working_dir)
            .await
            .context("failed to start the shell session")?;

        let environment = detect_shell_environment();
        tracing::info!(
            model = client.model(),
            shell = %config.shell.display(),
            %environment,
            budget = config.context_size,
            "starting chatsh"
        );

        let turns = TurnLoop::new(
            client,
            TerminalFrontend::new(),
            shell,
            system_preamble(&environment),
            config.context_size,
        )
        .await?;

        Ok(Self { turns })
    }

    pub async fn run(&mut self) -> Result<()> {
        let shutdown = CancellationToken::new();
        let watcher = task::spawn(watch_interrupt(shutdown.clone()));

        let result = self.turns.run(shutdown).await;
        watcher.abort();
        result
    }
}

async fn watch_interrupt(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("interrupt received"),
        Err(err) => {
            // Without a signal handler the only way out is end of input.
            tracing::warn!(error = %err, "failed to listen for interrupts");
            return;
        }
    }
    shutdown.cancel();
}

/// Routes `tracing` output to a file so it never interleaves with the
/// conversation. Nothing is installed unless `CHATSH_LOG` is set.
pub fn init_logging() -> Result<()> {
    let Ok(filter) = EnvFilter::try_from_env(LOG_FILTER_ENV) else {
        return Ok(());
    };

    let path = log_file_path();
    let file = open_log_file(&path)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install log subscriber: {err}"))?;

    tracing::debug!(path = %path.display(), "logging initialised");
    Ok(())
}

fn log_file_path() -> PathBuf {
    std::env::var_os(LOG_FILE_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("chatsh.log"))
}

fn open_log_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file '{}'", path.display()))
}
