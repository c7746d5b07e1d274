mod clock;
mod core;
mod http;
mod sampler;
#[cfg(test)]
mod testing;
mod tick;

use gamesense_proto::client::GameSenseClientFactory;
use gamesense_proto::config::{Config, PreferenceStore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::clock::ClockFormatter;
use crate::sampler::{CommandSongSampler, CommandVolumeSampler};
use crate::tick::TickScheduler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Log to a file; the daemon normally runs without a terminal
    let data_dir = gamesense_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(log_file)
                .with_ansi(false),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,gamesense_daemon=debug")
            }),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let prefs_path = PreferenceStore::default_path();
    let mut preferences = PreferenceStore::open(&prefs_path);
    info!("Preferences: {:?}", prefs_path);

    let shutdown = CancellationToken::new();

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            PreferenceStore::open(&prefs_path),
            shutdown.clone(),
        );
    }

    let scheduler = TickScheduler::new(
        CommandVolumeSampler::new(&config.samplers),
        CommandSongSampler::new(&config.samplers),
        GameSenseClientFactory::new(config.engine.clone()),
        ClockFormatter::new(config.clock.display_width),
        preferences.current().tick_rate,
    );

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            return;
        }
        info!("Interrupt received, shutting down");
        ctrl_c.cancel();
    });

    let mut core = crate::core::SchedulerCore::new(scheduler, preferences, shutdown);
    core.run().await?;

    info!("Daemon stopped");
    Ok(())
}
