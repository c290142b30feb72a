//! Wiring & DI. Entry point: bootstrap adapters, inject into services, start timers.
//! No business logic here.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dotenv::dotenv;
use tg_notify::adapters::persistence::SqliteStore;
use tg_notify::adapters::telegram::BotApiSender;
use tg_notify::ports::{EventStore, MessageSender};
use tg_notify::shared::config::AppConfig;
use tg_notify::usecases::{BroadcastService, Fanout, ReminderService, Schedule, Scheduler};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_loaded = dotenv();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &env_loaded {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(_) => info!("no .env found"),
    }

    let cfg = AppConfig::load().map_err(|e| anyhow::anyhow!("config load failed: {}", e))?;

    let bot_token = cfg
        .bot_token
        .clone()
        .or_else(|| std::env::var("TG_NOTIFY_BOT_TOKEN").ok())
        .unwrap_or_default();
    if bot_token.is_empty() {
        anyhow::bail!("Set TG_NOTIFY_BOT_TOKEN (env or .env). Get from @BotFather");
    }

    // Invalid schedule configuration is fatal at startup, never retried.
    let drain_times = cfg
        .broadcast_times_or_default()
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    let data_dir = cfg.data_dir.as_deref().unwrap_or("./data").to_string();
    let store_impl = SqliteStore::connect(PathBuf::from(&data_dir))
        .await
        .map_err(|e| anyhow::anyhow!("SQLite connect failed: {}", e))?;
    info!(path = %store_impl.path().display(), "event store ready");
    let store: Arc<dyn EventStore> = Arc::new(store_impl);

    let send_timeout = Duration::from_secs(cfg.send_timeout_secs_or_default());
    let sender: Arc<dyn MessageSender> = Arc::new(
        BotApiSender::new(&bot_token, send_timeout).map_err(|e| anyhow::anyhow!("{}", e))?,
    );

    let fanout = Fanout::new(cfg.fanout_concurrency_or_default());
    info!(
        concurrency = cfg.fanout_concurrency_or_default(),
        "fan-out concurrency cap"
    );

    let reminders = Arc::new(ReminderService::new(
        Arc::clone(&store),
        Arc::clone(&sender),
        fanout.clone(),
    ));
    let broadcasts = Arc::new(BroadcastService::new(
        Arc::clone(&store),
        Arc::clone(&sender),
        fanout,
    ));

    let schedule = Schedule {
        scan_interval: Duration::from_secs(cfg.scan_interval_minutes_or_default() * 60),
        scan_initial_delay: Duration::from_secs(cfg.scan_initial_delay_secs_or_default()),
        drain_times,
    };
    let handles = Scheduler::new(reminders, broadcasts, schedule).spawn();

    info!("notification engine running; Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    // Stopping the timers is the whole shutdown story: there is no
    // persisted next-fire state, and the idempotency flags make the next
    // start pick up correctly.
    for handle in &handles {
        handle.abort();
    }
    info!("scheduler stopped");

    Ok(())
}
