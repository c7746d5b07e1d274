//! Per-tick event selection.
//!
//! Every tick produces at most one event for the device, picked in this
//! order:
//!
//! ```text
//!   volume changed?            → VOLUME   (ignores the debounce)
//!   debounce pending?          → nothing
//!   periodic clock due?        → CLOCK    (+2 s debounce)
//!   song playing?              → SONG     (+200 ms debounce)
//!   otherwise                  → CLOCK    (+200 ms debounce)
//! ```
//!
//! All durations are converted to ticks with [`ticks_for`], so the same
//! behaviour holds at any tick rate.  Delivery failures never stop the
//! scheduler: a connection-class error drops the client and the next
//! emission builds a new one through the factory.
use chrono::{DateTime, TimeZone};
use gamesense_proto::client::{DeviceApi, DeviceApiFactory, TransportError};
use gamesense_proto::config::Preferences;
use gamesense_proto::protocol::{DisplayEvent, EventKind, HandlerOptions};
use gamesense_proto::songs::SongInfo;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::clock::{ClockFormatter, ClockOptions, ScrollingText};
use crate::sampler::{SongSampler, VolumeSampler};

/// Spacing after a clock or song event.
pub const EVENT_SPACING_MS: u64 = 200;
/// How long the volume bar stays up before anything else is shown.
pub const VOLUME_HOLD_MS: u64 = 1_000;
pub const PERIODIC_CLOCK_INTERVAL_MS: u64 = 10_000;
pub const PERIODIC_CLOCK_HOLD_MS: u64 = 2_000;

/// `ceil(ms / tick_rate_ms)`
pub fn ticks_for(ms: u64, tick_rate_ms: u64) -> u32 {
    let ticks = ms.div_ceil(tick_rate_ms.max(1));
    u32::try_from(ticks).unwrap_or(u32::MAX)
}

/// Decision state carried from one tick to the next.
#[derive(Debug, Clone, Default)]
pub struct TickState {
    /// `None` until the first successful sample.
    pub last_volume: Option<u8>,
    /// Ticks to skip before anything but a volume change may be sent.
    pub wait_ticks: u32,
    pub periodic_clock_countdown: u32,
    pub current_song: Option<SongInfo>,
    pub scroll_state: Option<ScrollingText>,
    /// Millisecond part of the last song nonce.
    pub last_nonce: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Sent(EventKind),
    /// Chosen, but switched off in the preferences.
    Suppressed(EventKind),
    /// Chosen, but the device could not be reached or refused it.
    Failed(EventKind),
    /// Debounce in effect.
    Waiting,
}

pub struct TickScheduler<V, S, F: DeviceApiFactory> {
    volume: V,
    song: S,
    factory: F,
    client: Option<F::Client>,
    /// Handler options the current client registered with.
    registered_with: Option<HandlerOptions>,
    clock: ClockFormatter,
    state: TickState,
    tick_rate_ms: u64,
    engine_down: bool,
}

impl<V, S, F> TickScheduler<V, S, F>
where
    V: VolumeSampler,
    S: SongSampler,
    F: DeviceApiFactory,
{
    pub fn new(volume: V, song: S, factory: F, clock: ClockFormatter, tick_rate_ms: u64) -> Self {
        Self {
            volume,
            song,
            factory,
            client: None,
            registered_with: None,
            clock,
            state: TickState::default(),
            tick_rate_ms: tick_rate_ms.max(1),
            engine_down: false,
        }
    }

    pub fn tick_rate_ms(&self) -> u64 {
        self.tick_rate_ms
    }

    #[cfg(test)]
    pub fn state(&self) -> &TickState {
        &self.state
    }

    /// Start over at a new tick rate.  All tick counts are meaningless at a
    /// different rate, so the whole state goes.
    pub fn reset(&mut self, tick_rate_ms: u64) {
        self.tick_rate_ms = tick_rate_ms.max(1);
        self.state = TickState::default();
    }

    fn ticks(&self, ms: u64) -> u32 {
        ticks_for(ms, self.tick_rate_ms)
    }

    pub async fn on_tick<Tz>(&mut self, prefs: &Preferences, now: &DateTime<Tz>) -> TickOutcome
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        if let Some(volume) = self.volume.sample().await {
            let previous = self.state.last_volume.replace(volume);
            if previous.is_some_and(|p| p != volume) {
                if !prefs.volume {
                    return TickOutcome::Suppressed(EventKind::Volume);
                }
                self.state.wait_ticks = self.ticks(VOLUME_HOLD_MS);
                return self.deliver(prefs, DisplayEvent::Volume(volume)).await;
            }
        }

        if self.state.periodic_clock_countdown > 0 {
            self.state.periodic_clock_countdown -= 1;
        }
        if self.state.wait_ticks > 0 {
            self.state.wait_ticks -= 1;
            return TickOutcome::Waiting;
        }

        if prefs.clock_periodically && self.state.periodic_clock_countdown == 0 {
            let event = self.clock_event(prefs, now);
            self.state.periodic_clock_countdown = self.ticks(PERIODIC_CLOCK_INTERVAL_MS);
            self.state.wait_ticks = self.ticks(PERIODIC_CLOCK_HOLD_MS);
            return match event {
                Some(event) => self.deliver(prefs, event).await,
                None => TickOutcome::Suppressed(EventKind::Clock),
            };
        }

        if prefs.song_info {
            let playing = self.song.sample().await.filter(|s| !s.trim().is_empty());
            if let Some(full_name) = playing {
                let event = self.song_event(&full_name, now.timestamp_millis());
                self.state.wait_ticks = self.ticks(EVENT_SPACING_MS);
                return self.deliver(prefs, event).await;
            }
        }

        match self.clock_event(prefs, now) {
            Some(event) => self.deliver(prefs, event).await,
            None => TickOutcome::Suppressed(EventKind::Clock),
        }
    }

    /// `None` when the clock is switched off; no spacing is applied then.
    fn clock_event<Tz>(&mut self, prefs: &Preferences, now: &DateTime<Tz>) -> Option<DisplayEvent>
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        if !prefs.clock {
            return None;
        }
        let text = self.clock.render(
            now,
            ClockOptions::from_preferences(prefs),
            &prefs.language,
            &mut self.state.scroll_state,
        );
        self.state.wait_ticks = self.ticks(EVENT_SPACING_MS);
        Some(DisplayEvent::Clock(text))
    }

    fn song_event(&mut self, full_name: &str, now_ms: i64) -> DisplayEvent {
        let replace = self
            .state
            .current_song
            .as_ref()
            .map_or(true, |song| !song.is_same_track(full_name));
        if replace {
            debug!("Now playing: {}", full_name);
            self.state.current_song = Some(SongInfo::new(full_name));
        }
        let song = self
            .state
            .current_song
            .get_or_insert_with(|| SongInfo::new(full_name));

        // The engine ignores a payload identical to the previous one, so the
        // value must never repeat
        let stamp = now_ms.max(self.state.last_nonce + 1);
        self.state.last_nonce = stamp;

        DisplayEvent::Song {
            nonce: format!("{}{}", song.title(), stamp),
            title: song.title().to_string(),
            artist: song.artist().to_string(),
        }
    }

    // ── delivery ──────────────────────────────────────────────────────────────

    async fn deliver(&mut self, prefs: &Preferences, event: DisplayEvent) -> TickOutcome {
        let kind = event.kind();
        let client = match self.client.take() {
            Some(client) => client,
            None => match self.factory.create() {
                Ok(client) => {
                    self.registered_with = None;
                    client
                }
                Err(e) => {
                    self.connection_lost(kind, &e);
                    return TickOutcome::Failed(kind);
                }
            },
        };

        // One tick's worth of time for registration and send together
        let budget = Duration::from_millis(self.tick_rate_ms);
        let options = prefs.handler_options();
        let sent = tokio::time::timeout(budget, self.send_with(&client, options, &event))
            .await
            .unwrap_or_else(|_| {
                Err(TransportError::Timeout {
                    address: client.address().to_string(),
                })
            });

        match sent {
            Ok(()) => {
                if self.engine_down {
                    info!("GameSense engine reachable again");
                    self.engine_down = false;
                }
                self.client = Some(client);
                TickOutcome::Sent(kind)
            }
            Err(e) if e.is_connection_failure() => {
                // dropping `client` here; the next emission builds a fresh one
                self.connection_lost(kind, &e);
                TickOutcome::Failed(kind)
            }
            Err(e) => {
                warn!("Dropped {:?} event: {}", kind, e);
                self.client = Some(client);
                TickOutcome::Failed(kind)
            }
        }
    }

    async fn send_with(
        &mut self,
        client: &F::Client,
        options: HandlerOptions,
        event: &DisplayEvent,
    ) -> Result<(), TransportError> {
        if self.registered_with != Some(options) {
            client.register(options).await?;
            debug!("Registered screen handlers ({:?})", options);
            self.registered_with = Some(options);
        }
        client.send(event).await
    }

    fn connection_lost(&mut self, kind: EventKind, err: &TransportError) {
        if self.engine_down {
            debug!("Engine still unavailable, dropped {:?} event: {}", kind, err);
        } else {
            warn!("GameSense engine unavailable, dropped {:?} event: {}", kind, err);
            self.engine_down = true;
        }
    }
}
