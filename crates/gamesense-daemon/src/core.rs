use chrono::Local;
use gamesense_proto::client::DeviceApiFactory;
use gamesense_proto::config::PreferenceStore;
use tokio::time::{Duration, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::sampler::{SongSampler, VolumeSampler};
use crate::tick::TickScheduler;

/// Drives the scheduler from a timer.
///
/// Ticks are awaited one at a time inside a single task, so a slow engine
/// delays the next tick instead of overlapping it.  Preferences are read
/// fresh on every tick; a new `tickRate` tears the timer down and starts a
/// new one with empty scheduler state.
pub struct SchedulerCore<V, S, F: DeviceApiFactory> {
    scheduler: TickScheduler<V, S, F>,
    preferences: PreferenceStore,
    shutdown: CancellationToken,
}

impl<V, S, F> SchedulerCore<V, S, F>
where
    V: VolumeSampler,
    S: SongSampler,
    F: DeviceApiFactory,
{
    pub fn new(
        scheduler: TickScheduler<V, S, F>,
        preferences: PreferenceStore,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            scheduler,
            preferences,
            shutdown,
        }
    }

    #[cfg(test)]
    pub fn scheduler(&self) -> &TickScheduler<V, S, F> {
        &self.scheduler
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        let tick_rate = self.preferences.current().tick_rate;
        self.scheduler.reset(tick_rate);
        let mut interval = timer(tick_rate);
        info!("Scheduler: started, ticking every {} ms", tick_rate);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Scheduler: shutdown requested");
                    break;
                }
                _ = interval.tick() => {
                    let prefs = self.preferences.current().clone();
                    if prefs.tick_rate != self.scheduler.tick_rate_ms() {
                        info!(
                            "Scheduler: tick rate {} -> {} ms, restarting timer",
                            self.scheduler.tick_rate_ms(),
                            prefs.tick_rate
                        );
                        self.scheduler.reset(prefs.tick_rate);
                        interval = timer(prefs.tick_rate);
                        continue;
                    }
                    self.scheduler.on_tick(&prefs, &Local::now()).await;
                }
            }
        }

        Ok(())
    }
}

fn timer(tick_rate_ms: u64) -> Interval {
    let mut interval = tokio::time::interval(Duration::from_millis(tick_rate_ms.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
