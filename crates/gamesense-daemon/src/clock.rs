//! Clock text for the device screen.
//!
//! Date patterns and AM/PM labels come from a per-language table.  A clock
//! that shows seconds is fed through [`ScrollingText`]: the engine drops
//! payloads identical to the previous one, and scrolling keeps every tick's
//! payload fresh.

use chrono::{DateTime, TimeZone, Timelike};
use gamesense_proto::config::Preferences;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Spaces appended to the source before the scroll cycle wraps around.
pub const SCROLL_GAP: &str = "   ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocaleFormat {
    pub code: &'static str,
    /// chrono strftime pattern
    pub date_pattern: &'static str,
    pub am: &'static str,
    pub pm: &'static str,
}

const LOCALES: &[LocaleFormat] = &[
    LocaleFormat { code: "tr", date_pattern: "%d.%m.%Y", am: "ÖÖ", pm: "ÖS" },
    LocaleFormat { code: "en", date_pattern: "%m/%d/%Y", am: "AM", pm: "PM" },
    LocaleFormat { code: "de", date_pattern: "%d.%m.%Y", am: "VM", pm: "NM" },
    LocaleFormat { code: "fr", date_pattern: "%d/%m/%Y", am: "AM", pm: "PM" },
    LocaleFormat { code: "it", date_pattern: "%d/%m/%Y", am: "AM", pm: "PM" },
    LocaleFormat { code: "es", date_pattern: "%d/%m/%Y", am: "a. m.", pm: "p. m." },
    LocaleFormat { code: "ru", date_pattern: "%d.%m.%Y", am: "ДП", pm: "ПП" },
    LocaleFormat { code: "zh", date_pattern: "%Y/%m/%d", am: "上午", pm: "下午" },
    LocaleFormat { code: "ja", date_pattern: "%Y/%m/%d", am: "午前", pm: "午後" },
];

const FALLBACK_LOCALE: LocaleFormat = LocaleFormat {
    code: "",
    date_pattern: "%Y-%m-%d",
    am: "AM",
    pm: "PM",
};

/// Look up a language code such as `de` or `de-AT`.  Unknown languages get
/// an ISO date and English AM/PM.
pub fn locale_format(code: &str) -> &'static LocaleFormat {
    let lang = code
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    LOCALES
        .iter()
        .find(|l| l.code == lang)
        .unwrap_or(&FALLBACK_LOCALE)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClockOptions {
    pub show_date: bool,
    pub show_seconds: bool,
    pub use_12h: bool,
}

impl ClockOptions {
    pub fn from_preferences(prefs: &Preferences) -> Self {
        Self {
            show_date: prefs.clock_show_date,
            show_seconds: prefs.clock_show_seconds,
            use_12h: prefs.clock_12h,
        }
    }
}

/// Plain clock text.  A pure function of the instant.
pub fn format_clock<Tz>(now: &DateTime<Tz>, options: ClockOptions, locale: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let locale = locale_format(locale);
    if options.show_date {
        return now.format(locale.date_pattern).to_string();
    }

    let mut pattern = String::from(if options.use_12h { "%I:%M" } else { "%H:%M" });
    if options.show_seconds {
        pattern.push_str(":%S");
    }
    let mut text = now.format(&pattern).to_string();
    if options.use_12h {
        let label = if now.hour() < 12 { locale.am } else { locale.pm };
        text.push(' ');
        text.push_str(label);
    }
    text
}

pub struct ClockFormatter {
    display_width: usize,
}

impl ClockFormatter {
    pub fn new(display_width: usize) -> Self {
        Self {
            display_width: display_width.max(1),
        }
    }

    /// Text to send for this tick.  `scroll` is the caller-owned cursor; it
    /// is replaced whenever the formatted text changes and advanced
    /// otherwise.
    pub fn render<Tz>(
        &self,
        now: &DateTime<Tz>,
        options: ClockOptions,
        locale: &str,
        scroll: &mut Option<ScrollingText>,
    ) -> String
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let text = format_clock(now, options, locale);
        if options.show_date || !options.show_seconds {
            return text;
        }

        if scroll.as_ref().map_or(true, |s| s.source() != text) {
            *scroll = Some(ScrollingText::new(text, self.display_width));
        }
        scroll.as_mut().and_then(|s| s.next()).unwrap_or_default()
    }
}

/// Endless sequence of fixed-width windows sliding over `source` (plus a
/// short gap), one column per item.  Text that already fits is yielded
/// unchanged.
#[derive(Debug, Clone)]
pub struct ScrollingText {
    source: String,
    cycle: Vec<char>,
    width: usize,
    window_start: usize,
}

impl ScrollingText {
    pub fn new(source: impl Into<String>, width: usize) -> Self {
        let source = source.into();
        let cycle = source.chars().chain(SCROLL_GAP.chars()).collect();
        Self {
            source,
            cycle,
            width: width.max(1),
            window_start: 0,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    #[cfg(test)]
    pub fn window_start(&self) -> usize {
        self.window_start
    }

    pub fn needs_scroll(&self) -> bool {
        self.source.width() > self.width
    }

    #[cfg(test)]
    pub fn restart(&mut self) {
        self.window_start = 0;
    }

    fn window(&self) -> String {
        let mut out = String::new();
        let mut used = 0;
        for i in 0..self.cycle.len() {
            let c = self.cycle[(self.window_start + i) % self.cycle.len()];
            let w = c.width().unwrap_or(0);
            if used + w > self.width && !out.is_empty() {
                break;
            }
            out.push(c);
            used += w;
        }
        out
    }
}

impl Iterator for ScrollingText {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if !self.needs_scroll() {
            return Some(self.source.clone());
        }
        let window = self.window();
        self.window_start = (self.window_start + 1) % self.cycle.len();
        Some(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
            .and_utc()
    }

    const TIME_24: ClockOptions = ClockOptions {
        show_date: false,
        show_seconds: false,
        use_12h: false,
    };

    #[test]
    fn test_date_patterns_per_locale() {
        let date = ClockOptions {
            show_date: true,
            ..TIME_24
        };
        let now = at(14, 5, 9);
        assert_eq!(format_clock(&now, date, "en"), "03/09/2024");
        assert_eq!(format_clock(&now, date, "de"), "09.03.2024");
        assert_eq!(format_clock(&now, date, "fr"), "09/03/2024");
        assert_eq!(format_clock(&now, date, "ja"), "2024/03/09");
        assert_eq!(format_clock(&now, date, "nl"), "2024-03-09");
        assert_eq!(format_clock(&now, date, "de-AT"), "09.03.2024");
    }

    #[test]
    fn test_date_mode_ignores_time_flags() {
        let now = at(14, 5, 9);
        let plain = ClockOptions {
            show_date: true,
            ..TIME_24
        };
        let all = ClockOptions {
            show_date: true,
            show_seconds: true,
            use_12h: true,
        };
        assert_eq!(format_clock(&now, plain, "en"), format_clock(&now, all, "en"));

        let formatter = ClockFormatter::new(4);
        let mut scroll = None;
        assert_eq!(formatter.render(&now, all, "en", &mut scroll), "03/09/2024");
        assert!(scroll.is_none());
    }

    #[test]
    fn test_time_patterns() {
        let now = at(14, 5, 9);
        assert_eq!(format_clock(&now, TIME_24, "en"), "14:05");
        let seconds = ClockOptions {
            show_seconds: true,
            ..TIME_24
        };
        assert_eq!(format_clock(&now, seconds, "en"), "14:05:09");
    }

    #[test]
    fn test_twelve_hour_labels() {
        let twelve = ClockOptions {
            use_12h: true,
            ..TIME_24
        };
        assert_eq!(format_clock(&at(14, 5, 0), twelve, "en"), "02:05 PM");
        assert_eq!(format_clock(&at(9, 0, 0), twelve, "tr"), "09:00 ÖÖ");
        assert_eq!(format_clock(&at(0, 30, 0), twelve, "es"), "12:30 a. m.");
        assert_eq!(format_clock(&at(12, 0, 0), twelve, "zh"), "12:00 下午");
        assert_eq!(format_clock(&at(23, 59, 0), twelve, "xx"), "11:59 PM");
    }

    #[test]
    fn test_without_seconds_output_is_stable() {
        let formatter = ClockFormatter::new(6);
        let now = at(14, 5, 9);
        let mut scroll = None;
        let first = formatter.render(&now, TIME_24, "en", &mut scroll);
        let second = formatter.render(&now, TIME_24, "en", &mut scroll);
        assert_eq!(first, "14:05");
        assert_eq!(first, second);
        assert!(scroll.is_none());
    }

    #[test]
    fn test_seconds_clock_scrolls_overlapping_windows() {
        let formatter = ClockFormatter::new(6);
        let seconds = ClockOptions {
            show_seconds: true,
            ..TIME_24
        };
        let now = at(14, 5, 9);
        let mut scroll = None;

        let first = formatter.render(&now, seconds, "en", &mut scroll);
        let second = formatter.render(&now, seconds, "en", &mut scroll);
        assert_eq!(first, "14:05:");
        assert_eq!(second, "4:05:0");
        assert_ne!(first, second);
        assert!(second.starts_with(&first[1..]));
        assert_eq!(scroll.as_ref().unwrap().source(), "14:05:09");
    }

    #[test]
    fn test_new_second_restarts_scroll() {
        let formatter = ClockFormatter::new(6);
        let seconds = ClockOptions {
            show_seconds: true,
            ..TIME_24
        };
        let mut scroll = None;
        formatter.render(&at(14, 5, 9), seconds, "en", &mut scroll);
        formatter.render(&at(14, 5, 9), seconds, "en", &mut scroll);
        assert_eq!(scroll.as_ref().unwrap().window_start(), 2);

        let next = formatter.render(&at(14, 5, 10), seconds, "en", &mut scroll);
        assert_eq!(next, "14:05:");
        assert_eq!(scroll.as_ref().unwrap().source(), "14:05:10");
        assert_eq!(scroll.as_ref().unwrap().window_start(), 1);
    }

    #[test]
    fn test_short_text_is_not_scrolled() {
        let mut text = ScrollingText::new("12:00", 8);
        assert!(!text.needs_scroll());
        assert_eq!(text.next().as_deref(), Some("12:00"));
        assert_eq!(text.next().as_deref(), Some("12:00"));
    }

    #[test]
    fn test_scroll_cycles_through_gap_and_restarts() {
        let mut text = ScrollingText::new("abcd", 3);
        let windows: Vec<String> = text.by_ref().take(8).collect();
        assert_eq!(
            windows,
            vec!["abc", "bcd", "cd ", "d  ", "   ", "  a", " ab", "abc"]
        );

        text.restart();
        assert_eq!(text.next().as_deref(), Some("abc"));
    }

    #[test]
    fn test_wide_characters_respect_display_width() {
        let mut text = ScrollingText::new("02:05 下午", 6);
        assert!(text.needs_scroll());
        for window in text.by_ref().take(12) {
            assert!(window.width() <= 6, "{window:?} is too wide");
        }
    }
}
