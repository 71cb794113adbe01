use std::path::PathBuf;

use clap::Args;

pub const DEFAULT_API_URL: &str = "https://api.wpvip.com";

#[derive(Debug, Clone, Args)]
pub struct BaseArgs {
    /// Output as JSON
    #[arg(short = 'j', long, global = true)]
    pub json: bool,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// API token (or via VIP_TOKEN)
    #[arg(long, env = "VIP_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Override API URL (or via VIP_API_URL)
    #[arg(long, env = "VIP_API_URL", hide_env_values = true, global = true)]
    pub api_url: Option<String>,

    /// Application id (or via VIP_APP)
    #[arg(long, env = "VIP_APP", global = true)]
    pub app: Option<i64>,

    /// Environment id (or via VIP_ENV)
    #[arg(long = "env", env = "VIP_ENV", global = true)]
    pub env_id: Option<i64>,

    /// Path to a .env file to load before running commands.
    #[arg(long, env = "VIP_ENV_FILE", hide_env_values = true, global = true)]
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct CLIArgs<T: Args> {
    #[command(flatten)]
    pub base: BaseArgs,

    #[command(flatten)]
    pub args: T,
}
