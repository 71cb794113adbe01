use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use serde::Serialize;

mod api;
mod job;
mod localize;
mod media;
mod poll;
mod progress;
mod report;
mod sql;

use crate::args::BaseArgs;
use crate::config;
use crate::http::ApiClient;
use crate::login::login;
use crate::ui::with_spinner;

use api::{fetch_target, MediaStatusFetcher, SqlStatusFetcher};
use job::ImportTarget;
use poll::{Outcome, Poller, Reconciler, StatusFetcher, TokioScheduler};
use progress::{HiddenRenderer, ProgressTracker, TerminalRenderer, RENDER_INTERVAL};

#[derive(Debug, Clone, Args)]
pub struct ImportArgs {
    #[command(subcommand)]
    command: ImportCommands,
}

#[derive(Debug, Clone, Subcommand)]
enum ImportCommands {
    /// SQL database imports
    Sql(SqlArgs),
    /// Media archive imports
    Media(MediaArgs),
}

#[derive(Debug, Clone, Args)]
struct SqlArgs {
    #[command(subcommand)]
    command: SqlCommands,
}

#[derive(Debug, Clone, Subcommand)]
enum SqlCommands {
    /// Follow the most recent SQL import until it finishes
    Status(StatusArgs),
}

#[derive(Debug, Clone, Args)]
struct MediaArgs {
    #[command(subcommand)]
    command: MediaCommands,
}

#[derive(Debug, Clone, Subcommand)]
enum MediaCommands {
    /// Follow the current media import until it finishes
    Status(StatusArgs),
}

#[derive(Debug, Clone, Args)]
struct StatusArgs {
    /// Seconds between status checks
    #[arg(long, value_name = "SECONDS", value_parser = parse_interval)]
    interval: Option<Duration>,
}

fn parse_interval(raw: &str) -> Result<Duration, String> {
    let secs: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("invalid interval '{raw}'"))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err("interval must be a positive number of seconds".to_string());
    }
    Ok(Duration::from_secs_f64(secs))
}

pub async fn run(base: BaseArgs, args: ImportArgs) -> Result<()> {
    match args.command {
        ImportCommands::Sql(SqlArgs {
            command: SqlCommands::Status(status),
        }) => {
            let (client, target) = prepare(&base).await?;
            watch(
                SqlStatusFetcher::new(client),
                sql::SqlImport::new(target.clone()),
                target,
                status.interval.unwrap_or(sql::POLL_INTERVAL),
                base.json,
                sql::explain,
            )
            .await
        }
        ImportCommands::Media(MediaArgs {
            command: MediaCommands::Status(status),
        }) => {
            let (client, target) = prepare(&base).await?;
            watch(
                MediaStatusFetcher::new(client),
                media::MediaImport::new(target.clone()),
                target,
                status.interval.unwrap_or(media::POLL_INTERVAL),
                base.json,
                media::explain,
            )
            .await
        }
    }
}

async fn prepare(base: &BaseArgs) -> Result<(ApiClient, ImportTarget)> {
    let (app_id, env_id) = resolve_ids(base, &config::load())?;
    let ctx = login(base)?;
    let client = ApiClient::new(&ctx)?;
    let target = with_spinner(
        "Loading environment...",
        fetch_target(&client, app_id, env_id),
    )
    .await?;
    tracing::debug!(app = %target.app_name, env = %target.env_type, "resolved import target");
    Ok((client, target))
}

/// Flags and env vars first, then the saved defaults.
fn resolve_ids(base: &BaseArgs, defaults: &config::Defaults) -> Result<(i64, i64)> {
    let app = match base.app {
        Some(id) => Some(id),
        None => defaults.app_id()?,
    };
    let env = match base.env_id {
        Some(id) => Some(id),
        None => defaults.env_id()?,
    };

    match (app, env) {
        (Some(app), Some(env)) => Ok((app, env)),
        (None, _) => bail!("--app is required (or set VIP_APP, or \"app\" in .vip/config.json)"),
        (_, None) => bail!("--env is required (or set VIP_ENV, or \"env\" in .vip/config.json)"),
    }
}

async fn watch<F, R>(
    fetcher: F,
    reconciler: R,
    target: ImportTarget,
    interval: Duration,
    json: bool,
    explain: fn(&Outcome<R::Job>) -> Option<String>,
) -> Result<()>
where
    F: StatusFetcher,
    R: Reconciler<Status = F::Status>,
    R::Job: Serialize,
{
    let tracker = if json {
        ProgressTracker::new(HiddenRenderer)
    } else {
        ProgressTracker::new(TerminalRenderer::stderr())
    };
    let render = (!json).then(|| tracker.start_rendering(RENDER_INTERVAL));
    let poller = Poller::new(
        fetcher,
        reconciler,
        TokioScheduler,
        tracker.clone(),
        target,
        interval,
    );

    let outcome = tokio::select! {
        outcome = poller.run() => Some(outcome),
        _ = interrupt() => None,
    };
    if let Some(render) = render {
        render.stop();
    }

    let Some(outcome) = outcome else {
        return report::interrupted(&tracker, json);
    };
    let explanation = explain(&outcome);
    report::conclude(&tracker, &outcome, explanation, json)
}

/// Resolves on ^C. Never resolves when the signal handler can't be installed.
async fn interrupt() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::debug!(error = %err, "unable to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(app: Option<i64>, env_id: Option<i64>) -> BaseArgs {
        BaseArgs {
            json: false,
            verbose: false,
            token: None,
            api_url: None,
            app,
            env_id,
            env_file: None,
        }
    }

    #[test]
    fn interval_must_be_positive_seconds() {
        assert_eq!(parse_interval("2.5"), Ok(Duration::from_millis(2500)));
        assert!(parse_interval("0").is_err());
        assert!(parse_interval("-1").is_err());
        assert!(parse_interval("soon").is_err());
    }

    #[test]
    fn flags_win_over_config() {
        let cfg: config::Defaults =
            serde_json::from_value(serde_json::json!({"app": 10, "env": "20"})).unwrap();

        assert_eq!(resolve_ids(&base(Some(1), None), &cfg).unwrap(), (1, 20));
        assert_eq!(resolve_ids(&base(None, None), &cfg).unwrap(), (10, 20));
    }

    #[test]
    fn malformed_saved_id_is_an_error_unless_overridden() {
        let cfg: config::Defaults =
            serde_json::from_value(serde_json::json!({"app": "my-site", "env": 2})).unwrap();

        let err = resolve_ids(&base(None, None), &cfg).unwrap_err();
        assert!(err.to_string().contains("must be a numeric id"));
        assert_eq!(resolve_ids(&base(Some(1), None), &cfg).unwrap(), (1, 2));
    }

    #[test]
    fn missing_ids_name_the_flag() {
        let cfg = config::Defaults::default();
        let err = resolve_ids(&base(None, Some(2)), &cfg).unwrap_err();
        assert!(err.to_string().contains("--app is required"));
        let err = resolve_ids(&base(Some(1), None), &cfg).unwrap_err();
        assert!(err.to_string().contains("--env is required"));
    }
}
