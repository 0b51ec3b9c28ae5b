use anyhow::Result;
use chatsh::app::{init_logging, App};
use chatsh::config::{Config, Overrides};
use clap::Parser;
use std::num::NonZeroUsize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "chatsh")]
#[command(author, version, about = "Chat with a local model that can drive your shell")]
struct Cli {
    /// Model served by the llama.cpp endpoint (falls back to CHATSH_MODEL_PATH)
    #[arg(long, alias = "model_path")]
    model_path: Option<String>,

    /// Context window size in tokens (falls back to CHATSH_N_CTX, default 6144)
    #[arg(long, alias = "n_ctx")]
    n_ctx: Option<NonZeroUsize>,

    /// Base URL of the llama.cpp server (falls back to CHATSH_API_URL)
    #[arg(long)]
    api_url: Option<String>,

    /// Shell to drive (falls back to SHELL, then /bin/sh)
    #[arg(long)]
    shell: Option<PathBuf>,
}

impl Cli {
    fn overrides(self) -> Overrides {
        Overrides {
            model_path: self.model_path,
            context_size: self.n_ctx.map(NonZeroUsize::get),
            api_url: self.api_url,
            shell: self.shell,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.overrides())?;
    config.validate()?;
    init_logging()?;

    let mut app = App::new(config).await?;
    let result = app.run().await;

    // stdin is read on a blocking thread that would keep the runtime alive,
    // so leave through process::exit rather than returning.
    if let Err(err) = result {
        tracing::error!(error = %err, "session failed");
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
    std::process::exit(0);
}
