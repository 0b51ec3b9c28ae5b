use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::util::is_local_endpoint_url;

pub const DEFAULT_CONTEXT_SIZE: usize = 6144;
pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_SHELL: &str = "/bin/sh";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model_path: String,
    pub context_size: usize,
    pub api_url: String,
    pub api_key: Option<String>,
    pub shell: PathBuf,
    pub working_dir: PathBuf,
}

/// Values supplied on the command line; anything left `None` falls back to
/// the environment and then to the built-in default.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub model_path: Option<String>,
    pub context_size: Option<usize>,
    pub api_url: Option<String>,
    pub shell: Option<PathBuf>,
}

impl Config {
    pub fn load(overrides: Overrides) -> Result<Self> {
        let model_path = overrides
            .model_path
            .or_else(|| non_empty_env("CHATSH_MODEL_PATH"))
            .context("a model path is required (--model-path or CHATSH_MODEL_PATH)")?;

        let context_size = match overrides.context_size {
            Some(size) => size,
            None => match non_empty_env("CHATSH_N_CTX") {
                Some(raw) => raw
                    .trim()
                    .parse::<usize>()
                    .with_context(|| format!("Invalid CHATSH_N_CTX '{raw}'"))?,
                None => DEFAULT_CONTEXT_SIZE,
            },
        };

        let api_url = overrides
            .api_url
            .or_else(|| non_empty_env("CHATSH_API_URL"))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_key = non_empty_env("CHATSH_API_KEY");
        let shell = overrides
            .shell
            .or_else(|| non_empty_env("SHELL").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SHELL));

        Ok(Self {
            model_path,
            context_size,
            api_url,
            api_key,
            shell,
            working_dir: std::env::current_dir()?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.model_path.trim().is_empty() {
            bail!("Model path must not be empty");
        }

        if self.context_size == 0 {
            bail!("Context size must be a positive token count");
        }

        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            bail!(
                "Invalid CHATSH_API_URL '{}': expected http:// or https:// URL",
                self.api_url
            );
        }

        if !self.is_local_endpoint() && self.api_key.is_none() {
            bail!(
                "CHATSH_API_KEY must be set for non-local endpoints (url: '{}')",
                self.api_url
            );
        }

        if self.shell.as_os_str().is_empty() {
            bail!("Shell path must not be empty");
        }

        Ok(())
    }

    pub fn is_local_endpoint(&self) -> bool {
        is_local_endpoint_url(&self.api_url)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
