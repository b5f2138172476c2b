//! evcharge.online status CLI
//!
//! Reports the current state of matching sites, then optionally keeps
//! watching them. Every flag can also be given through the environment.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{ArgAction, Parser, builder::BoolishValueParser};
use evcharge_status::{
    error::Result,
    models::Config,
    notify::{FileNotifier, MultiNotifier, Notifier, SlackNotifier},
    pipeline::{StatusReporter, Watcher, initial_pass},
    services::{EvChargeClient, Fetcher},
    storage::open_store,
};
use tokio_util::sync::CancellationToken;

/// Loaded when present and no `--config` is given.
const DEFAULT_CONFIG: &str = "evcharge.toml";

/// Get or monitor status of an evcharge.online site
#[derive(Parser, Debug)]
#[command(name = "evcharge-status", version, about)]
struct Cli {
    /// A site name, or charge point ID
    #[arg(env = "EVCHARGE_SEARCH_KEY")]
    search_key: String,

    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep running, and report changes when observed
    #[arg(short, long, env = "EVCHARGE_WATCH", action = ArgAction::SetTrue,
          value_parser = BoolishValueParser::new())]
    watch: bool,

    /// Seconds to wait between status checks
    #[arg(short, long, env = "EVCHARGE_WATCH_PERIOD")]
    period: Option<u64>,

    /// Where to store the current state (path, file:// or dynamodb:// URI)
    #[arg(long, env = "EVCHARGE_STORE")]
    store: Option<String>,

    /// Output file for status updates; `-` for stdout
    #[arg(short, long, env = "EVCHARGE_OUTPUT")]
    output: Option<PathBuf>,

    /// Don't output current status when starting, only output changes
    #[arg(short, long, env = "EVCHARGE_QUIET", action = ArgAction::SetTrue,
          value_parser = BoolishValueParser::new())]
    quiet: bool,

    /// Hook URL for Slack
    #[arg(long, env = "SLACK_HOOK_URL", help_heading = "Slack options")]
    slack_hook_url: Option<String>,

    /// Bot or user token for Slack
    #[arg(long, env = "SLACK_TOKEN", help_heading = "Slack options")]
    slack_token: Option<String>,

    /// Channel ID of the Slack channel to post updates to
    #[arg(long, env = "SLACK_CHANNEL_ID", help_heading = "Slack options")]
    slack_channel_id: Option<String>,

    /// Emoji to use as the icon for the Slack bot messages
    #[arg(long, env = "SLACK_ICON_EMOJI", help_heading = "Slack options")]
    slack_icon_emoji: Option<String>,

    /// Username for the Slack bot messages
    #[arg(long, env = "SLACK_USERNAME", help_heading = "Slack options")]
    slack_username: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Layer command line and environment values over the file config.
    fn apply(&self, config: &mut Config) {
        config.watch.enabled |= self.watch;
        config.watch.quiet |= self.quiet;
        if let Some(period) = self.period {
            config.watch.period_secs = period;
        }
        if let Some(store) = &self.store {
            config.store.uri = store.clone();
        }
        if let Some(output) = &self.output {
            config.output.path = Some(output.clone());
        }

        let slack = &mut config.slack;
        for (target, value) in [
            (&mut slack.hook_url, &self.slack_hook_url),
            (&mut slack.token, &self.slack_token),
            (&mut slack.channel_id, &self.slack_channel_id),
            (&mut slack.icon_emoji, &self.slack_icon_emoji),
            (&mut slack.username, &self.slack_username),
        ] {
            if value.is_some() {
                *target = value.clone();
            }
        }
    }
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None if Path::new(DEFAULT_CONFIG).exists() => Ok(Config::load_or_default(DEFAULT_CONFIG)),
        None => Ok(Config::default()),
    }
}

fn build_notifier(config: &Config) -> Result<Arc<dyn Notifier>> {
    let file: Arc<dyn Notifier> = Arc::new(FileNotifier::from_path_option(config.output.path.clone()));
    if !config.slack.is_enabled() {
        return Ok(file);
    }

    let slack = SlackNotifier::new(&config.slack, &config.fetcher)?;
    log::info!("Slack notifications enabled");
    Ok(Arc::new(MultiNotifier::new(vec![file, Arc::new(slack)])))
}

/// Interrupt stops the loop after the current tick; SIGUSR1 reports state.
#[cfg_attr(not(unix), allow(unused_variables))]
fn spawn_signal_handlers(cancel: &CancellationToken, reporter: StatusReporter) -> Result<()> {
    let stop = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupt received, stopping after the current tick");
            stop.cancel();
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut usr1 = signal(SignalKind::user_defined1())?;
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = usr1.recv() => {
                        if received.is_none() {
                            break;
                        }
                        if let Err(e) = reporter.report().await {
                            log::error!("Status report failed: {e}");
                        }
                    }
                }
            }
        });
    }

    Ok(())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = load_config(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;

    let notifier = build_notifier(&config)?;
    let fetcher: Arc<dyn Fetcher> = Arc::new(EvChargeClient::new(&config.fetcher)?);
    let store = open_store(&config.store.uri, &config.retry).await?;

    let sites = initial_pass(
        &cli.search_key,
        fetcher.as_ref(),
        store.as_ref(),
        notifier.as_ref(),
        config.watch.quiet,
    )
    .await?;

    if !config.watch.enabled {
        return Ok(());
    }

    let watcher = Watcher::new(sites, config.watch.period(), fetcher, store, notifier);
    let cancel = CancellationToken::new();
    spawn_signal_handlers(&cancel, watcher.reporter())?;

    let summary = watcher.run(cancel.clone()).await?;
    cancel.cancel();

    log::info!(
        "Stopped after {} tick(s): {} change(s) at {} site(s), {} failed refresh(es)",
        summary.ticks,
        summary.changes,
        summary.changed_sites,
        summary.refresh_failures
    );
    Ok(())
}
