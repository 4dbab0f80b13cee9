use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tcseek_core::Notice;
use tcseek_daemon::channel::{Correlator, InteractiveChannel};
use tcseek_daemon::config::{self, Settings};
use tcseek_daemon::moodle::MoodleClient;
use tcseek_daemon::notify::{report, Notifier};
use tcseek_daemon::scheduler::Scheduler;
use tcseek_daemon::session::SessionCache;
use tcseek_daemon::source::SlotSource;
use tcseek_daemon::telegram::{spawn_listener, BotApi, TelegramChannel, TelegramNotifier};
use tcseek_daemon::workflow::Workflow;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "tcseek", version, about = "Watches Moodle TC booking pages and books exam slots")]
struct Cli {
    /// YAML file listing the monitored pages, seeker and transfer targets.
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Dotenv file with credentials. A missing file is ignored.
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    /// Overrides LOG_LEVEL, e.g. `debug` or `tcseek_daemon=trace`.
    #[arg(long)]
    log: Option<String>,

    /// Run every job once and exit.
    #[arg(long, default_value_t = false)]
    once: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_loaded = dotenvy::from_path(&cli.env_file).is_ok();
    let env = |k: &str| std::env::var(k).ok();

    let level = cli.log.clone().unwrap_or_else(|| config::log_level(&env));
    fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    if !env_loaded {
        warn!(path = %cli.env_file.display(), "no env file loaded, using process environment");
    }

    let settings = Settings::load(&cli.config, &env).context("load configuration")?;

    info!(
        config = %cli.config.display(),
        targets = settings.mode.target_count(),
        "starting tcseek"
    );

    let source: Arc<dyn SlotSource> = Arc::new(
        MoodleClient::connect(
            settings.moodle.clone(),
            SessionCache::new(&settings.session_cache_file),
        )
        .await
        .context("log in to Moodle")?,
    );

    let api = BotApi::new(&settings.telegram.bot_token).context("build telegram client")?;
    let chat_id = settings.telegram.chat_id;
    let correlator = Correlator::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let listener = spawn_listener(api.clone(), chat_id, correlator.clone(), shutdown_rx);

    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(api.clone(), chat_id));
    let channel: Arc<dyn InteractiveChannel> = Arc::new(TelegramChannel::new(api, chat_id, correlator));

    let targets = settings.mode.target_count();
    let workflow = Workflow::build(settings.mode, source, channel, Arc::clone(&notifier));

    if cli.once {
        workflow.run_once().await;
    } else {
        report(&*notifier, Notice::MonitoringStarted { targets }).await;
        let scheduler = Scheduler::new();
        workflow.schedule(&scheduler);

        shutdown_signal().await;
        scheduler.shutdown().await;
    }
    workflow.report_interrupted(&*notifier).await;

    let _ = shutdown_tx.send(true);
    if let Err(e) = listener.await {
        warn!(error = %e, "listener task ended abnormally");
    }
    info!("stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("shutdown requested");
}
