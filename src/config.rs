use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use url::Url;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_SETTLE_MS: u64 = 1500;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Connection settings shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct ConnectionArgs {
    /// Base URL of the roster API
    #[arg(long, global = true, env = "COHORT_ROSTER_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Where the session token is kept between runs
    #[arg(long, global = true, env = "COHORT_ROSTER_SESSION_FILE")]
    pub session_file: Option<PathBuf>,

    /// Per-request timeout in seconds (0 disables it)
    #[arg(long, global = true, env = "COHORT_ROSTER_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// How long the finished progress display stays up, in milliseconds
    #[arg(long, global = true, env = "COHORT_ROSTER_SETTLE_MS", default_value_t = DEFAULT_SETTLE_MS)]
    pub settle_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: Url,
    pub session_file: PathBuf,
    pub request_timeout: Option<Duration>,
    pub settle_delay: Duration,
}

impl ClientConfig {
    pub fn from_args(args: &ConnectionArgs) -> anyhow::Result<Self> {
        let api_url = Url::parse(&args.api_url)
            .with_context(|| format!("invalid API URL `{}`", args.api_url))?;
        if api_url.cannot_be_a_base() {
            anyhow::bail!("API URL `{}` must be an http(s) base URL", args.api_url);
        }

        let session_file = match &args.session_file {
            Some(path) => path.clone(),
            None => default_session_file()
                .context("no config directory found; pass --session-file")?,
        };

        Ok(Self {
            api_url,
            session_file,
            request_timeout: (args.timeout_secs > 0).then(|| Duration::from_secs(args.timeout_secs)),
            settle_delay: Duration::from_millis(args.settle_ms),
        })
    }
}

pub fn default_session_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| {
        dir.join("groupscholar")
            .join("cohort-roster")
            .join("session.json")
    })
}
