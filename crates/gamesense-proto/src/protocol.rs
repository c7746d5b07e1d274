use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Game identifier registered with the engine.  Upper-case letters, digits,
/// hyphens and underscores only.
pub const GAME_NAME: &str = "GAMESENSE_ESSENTIALS";
pub const GAME_DISPLAY_NAME: &str = "GameSense Essentials";
pub const DEVELOPER: &str = "tricht";

pub const CLOCK_EVENT: &str = "CLOCK";
pub const SONG_EVENT: &str = "SONG";
pub const VOLUME_EVENT: &str = "VOLUME";

/// Engine icon ids used by the screen handlers.
pub const ICON_NONE: u32 = 0;
pub const ICON_CLOCK: u32 = 15;
pub const ICON_MUSIC: u32 = 23;

/// The engine drops a game after this long without events.  Ticks keep it
/// alive, so this only matters once the daemon has stopped.
pub const DEINITIALIZE_TIMER_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Clock,
    Song,
    Volume,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [EventKind::Clock, EventKind::Song, EventKind::Volume];

    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Clock => CLOCK_EVENT,
            Self::Song => SONG_EVENT,
            Self::Volume => VOLUME_EVENT,
        }
    }
}

/// One prioritized thing to show on the device screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayEvent {
    Clock(String),
    /// `nonce` is sent as the event value.  The engine ignores repeated
    /// identical payloads, so it must change on every emission.
    Song {
        nonce: String,
        title: String,
        artist: String,
    },
    Volume(u8),
}

impl DisplayEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Clock(_) => EventKind::Clock,
            Self::Song { .. } => EventKind::Song,
            Self::Volume(_) => EventKind::Volume,
        }
    }

    pub fn to_game_event(&self, game: &str) -> GameEvent {
        let data = match self {
            Self::Clock(text) => EventData {
                value: EventValue::Text(text.clone()),
                frame: None,
            },
            Self::Song {
                nonce,
                title,
                artist,
            } => EventData {
                value: EventValue::Text(nonce.clone()),
                frame: Some(Frame {
                    title: title.clone(),
                    artist: artist.clone(),
                }),
            },
            Self::Volume(volume) => EventData {
                value: EventValue::Number((*volume).min(100)),
                frame: None,
            },
        };
        GameEvent {
            game: game.to_string(),
            event: self.kind().event_name().to_string(),
            data,
        }
    }
}

/// Body of `POST /game_event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    pub game: String,
    pub event: String,
    pub data: EventData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub value: EventValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<Frame>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventValue {
    Number(u8),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub title: String,
    pub artist: String,
}

/// Body of `POST /game_metadata`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameMetadata {
    pub game: String,
    pub game_display_name: String,
    pub developer: String,
    pub deinitialize_timer_length_ms: u64,
}

impl GameMetadata {
    pub fn new(game: &str) -> Self {
        Self {
            game: game.to_string(),
            game_display_name: GAME_DISPLAY_NAME.to_string(),
            developer: DEVELOPER.to_string(),
            deinitialize_timer_length_ms: DEINITIALIZE_TIMER_MS,
        }
    }
}

/// Screen handler options that come from user preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerOptions {
    pub clock_icon: bool,
    pub song_icon: bool,
    /// Show the artist on the first line and the title on the second.
    pub song_flip: bool,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            clock_icon: true,
            song_icon: true,
            song_flip: false,
        }
    }
}

/// Body of `POST /bind_game_event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBinding {
    pub game: String,
    pub event: String,
    pub min_value: i32,
    pub max_value: i32,
    pub icon_id: u32,
    pub value_optional: bool,
    pub handlers: Vec<Value>,
}

impl EventBinding {
    pub fn for_kind(game: &str, kind: EventKind, options: HandlerOptions) -> Self {
        let (icon_id, handlers, value_optional) = match kind {
            EventKind::Clock => {
                let icon = if options.clock_icon { ICON_CLOCK } else { ICON_NONE };
                (icon, vec![clock_handler(icon)], true)
            }
            EventKind::Song => {
                let icon = if options.song_icon { ICON_MUSIC } else { ICON_NONE };
                (icon, vec![song_handler(icon, options.song_flip)], true)
            }
            EventKind::Volume => (ICON_NONE, vec![volume_handler()], false),
        };
        Self {
            game: game.to_string(),
            event: kind.event_name().to_string(),
            min_value: 0,
            max_value: 100,
            icon_id,
            value_optional,
            handlers,
        }
    }

    /// Bindings for every event the daemon emits.
    pub fn all(game: &str, options: HandlerOptions) -> Vec<Self> {
        EventKind::ALL
            .iter()
            .map(|kind| Self::for_kind(game, *kind, options))
            .collect()
    }
}

fn screen_handler(datas: Value) -> Value {
    json!({
        "device-type": "screened",
        "zone": "one",
        "mode": "screen",
        "datas": datas,
    })
}

fn clock_handler(icon_id: u32) -> Value {
    screen_handler(json!([{
        "has-text": true,
        "icon-id": icon_id,
        "length-millis": 0,
    }]))
}

fn song_handler(icon_id: u32, flip: bool) -> Value {
    let (first, second) = if flip {
        ("artist", "title")
    } else {
        ("title", "artist")
    };
    screen_handler(json!([{
        "icon-id": icon_id,
        "lines": [
            { "has-text": true, "context-frame-key": first },
            { "has-text": true, "context-frame-key": second },
        ],
        "length-millis": 0,
    }]))
}

fn volume_handler() -> Value {
    screen_handler(json!([{
        "has-text": false,
        "has-progress-bar": true,
        "length-millis": 1000,
    }]))
}
