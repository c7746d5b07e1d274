//! Track information as reported by the OS media session.
//!
//! Media sessions hand us one combined string, `"Artist - Title"`.  The
//! device screen shows title and artist on separate lines, so the string is
//! split once on the first `" - "`.

use serde::{Deserialize, Serialize};

pub const SEPARATOR: &str = " - ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongInfo {
    full_name: String,
    title: String,
    artist: String,
}

impl SongInfo {
    pub fn new(full_name: impl Into<String>) -> Self {
        let full_name = full_name.into();
        let (title, artist) = split_full_name(&full_name);
        Self {
            full_name,
            title,
            artist,
        }
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn artist(&self) -> &str {
        &self.artist
    }

    pub fn is_same_track(&self, full_name: &str) -> bool {
        self.full_name == full_name
    }
}

/// Split `"Artist - Title"` into `(title, artist)`.  Without a separator the
/// whole string is the title.
fn split_full_name(full_name: &str) -> (String, String) {
    match full_name.find(SEPARATOR) {
        Some(pos) => {
            let artist = full_name[..pos].trim().to_string();
            let title = full_name[pos + SEPARATOR.len()..].trim().to_string();
            if title.is_empty() {
                (artist, String::new())
            } else {
                (title, artist)
            }
        }
        None => (full_name.trim().to_string(), String::new()),
    }
}
