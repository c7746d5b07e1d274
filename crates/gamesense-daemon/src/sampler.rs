/// Host state samplers.
///
/// The scheduler only sees two traits; the implementations here shell out to
/// whatever the desktop offers (`wpctl`, `pactl`, `osascript`, `playerctl`)
/// with a hard timeout so a hung tool costs at most one tick.  Anything that
/// goes wrong is reported as "no sample".
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use gamesense_proto::config::SamplerConfig;
use gamesense_proto::platform;
use tracing::{debug, info};

/// Current output volume, 0-100.
pub trait VolumeSampler: Send {
    fn sample(&mut self) -> impl Future<Output = Option<u8>> + Send;
}

/// Currently playing track as `"Artist - Title"`, if any.
pub trait SongSampler: Send {
    fn sample(&mut self) -> impl Future<Output = Option<String>> + Send;
}

/// Volume backends are looked up again after this many samples, so a sound
/// server started after the daemon is picked up.
pub const BACKEND_REFRESH_SAMPLES: u32 = 25;

// ── command lines ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<PathBuf>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Split a configured command on whitespace.  No shell quoting.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let program = parts.next()?;
        Some(Self {
            program: PathBuf::from(program),
            args: parts.map(str::to_string).collect(),
        })
    }

    async fn run(&self, timeout: Duration) -> Option<String> {
        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(timeout, output).await {
            Ok(Ok(out)) if out.status.success() => {
                Some(String::from_utf8_lossy(&out.stdout).trim().to_string())
            }
            Ok(Ok(out)) => {
                debug!("{:?} exited with {:?}", self.program, out.status.code());
                None
            }
            Ok(Err(e)) => {
                debug!("{:?} failed to start: {}", self.program, e);
                None
            }
            Err(_) => {
                debug!("{:?} timed out after {:?}", self.program, timeout);
                None
            }
        }
    }
}

// ── volume ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeFormat {
    /// `Volume: 0.45` (PipeWire)
    Wpctl,
    /// `Volume: front-left: 29491 /  45% / -20.81 dB, ...` (PulseAudio)
    Pactl,
    /// bare integer percent (macOS)
    #[cfg_attr(not(target_os = "macos"), allow(dead_code))]
    Osascript,
    /// user-supplied command: any of the above, or a bare fraction
    Auto,
}

impl VolumeFormat {
    pub fn parse(&self, output: &str) -> Option<u8> {
        match self {
            Self::Wpctl => parse_wpctl(output),
            Self::Pactl => parse_pactl(output),
            Self::Osascript => parse_osascript(output),
            Self::Auto => parse_wpctl(output)
                .or_else(|| parse_pactl(output))
                .or_else(|| parse_plain(output)),
        }
    }
}

fn fraction_to_percent(fraction: f64) -> u8 {
    (fraction * 100.0).round().clamp(0.0, 100.0) as u8
}

pub fn parse_wpctl(output: &str) -> Option<u8> {
    let rest = output.trim().strip_prefix("Volume:")?;
    let fraction: f64 = rest.split_whitespace().next()?.parse().ok()?;
    Some(fraction_to_percent(fraction))
}

pub fn parse_pactl(output: &str) -> Option<u8> {
    let percent = output
        .split_whitespace()
        .find_map(|token| token.trim_end_matches(',').strip_suffix('%'))?;
    let value: u32 = percent.parse().ok()?;
    Some(value.min(100) as u8)
}

pub fn parse_osascript(output: &str) -> Option<u8> {
    // "missing value" when the output device has no volume control
    let value: u32 = output.trim().parse().ok()?;
    Some(value.min(100) as u8)
}

fn parse_plain(output: &str) -> Option<u8> {
    let text = output.trim();
    if let Some(percent) = text.strip_suffix('%') {
        return parse_osascript(percent);
    }
    let value: f64 = text.parse().ok()?;
    if text.contains('.') && value <= 1.0 {
        Some(fraction_to_percent(value))
    } else {
        Some(value.round().clamp(0.0, 100.0) as u8)
    }
}

#[derive(Debug, Clone)]
struct VolumeBackend {
    command: CommandLine,
    format: VolumeFormat,
}

fn detect_volume_backend() -> Option<VolumeBackend> {
    #[cfg(target_os = "macos")]
    let candidates: &[(&str, &[&str], VolumeFormat)] = &[(
        "osascript",
        &["-e", "output volume of (get volume settings)"],
        VolumeFormat::Osascript,
    )];
    #[cfg(not(target_os = "macos"))]
    let candidates: &[(&str, &[&str], VolumeFormat)] = &[
        ("wpctl", &["get-volume", "@DEFAULT_AUDIO_SINK@"], VolumeFormat::Wpctl),
        ("pactl", &["get-sink-volume", "@DEFAULT_SINK@"], VolumeFormat::Pactl),
    ];

    candidates.iter().find_map(|(name, args, format)| {
        platform::find_on_path(&[*name]).map(|program| VolumeBackend {
            command: CommandLine::new(program, args),
            format: *format,
        })
    })
}

pub struct CommandVolumeSampler {
    override_command: Option<CommandLine>,
    backend: Option<VolumeBackend>,
    samples_since_resolve: u32,
    timeout: Duration,
}

impl CommandVolumeSampler {
    pub fn new(config: &SamplerConfig) -> Self {
        Self {
            override_command: config.volume_command.as_deref().and_then(CommandLine::parse),
            backend: None,
            // resolve on the first sample
            samples_since_resolve: BACKEND_REFRESH_SAMPLES,
            timeout: Duration::from_millis(config.command_timeout_ms),
        }
    }

    fn resolve(&mut self) {
        let backend = match &self.override_command {
            Some(command) => Some(VolumeBackend {
                command: command.clone(),
                format: VolumeFormat::Auto,
            }),
            None => detect_volume_backend(),
        };
        match (&self.backend, &backend) {
            (None, Some(b)) => info!("Volume sampler using {:?}", b.command.program),
            (Some(_), None) => info!("Volume sampler lost its backend"),
            _ => {}
        }
        self.backend = backend;
        self.samples_since_resolve = 0;
    }
}

impl VolumeSampler for CommandVolumeSampler {
    async fn sample(&mut self) -> Option<u8> {
        if self.samples_since_resolve >= BACKEND_REFRESH_SAMPLES {
            self.resolve();
        }
        self.samples_since_resolve += 1;

        let backend = self.backend.as_ref()?;
        let output = backend.command.run(self.timeout).await?;
        backend.format.parse(&output)
    }
}

// ── song ──────────────────────────────────────────────────────────────────────

/// Tidy up `"{{artist}} - {{title}}"` output.  Players that report no artist
/// produce `" - Title"`; that is just the title.
pub fn clean_song_line(output: &str) -> Option<String> {
    let line = output.lines().next()?.trim();
    let line = line.strip_prefix("- ").unwrap_or(line);
    let line = line.strip_suffix(" -").unwrap_or(line).trim();
    if line.is_empty() || line == "-" {
        None
    } else {
        Some(line.to_string())
    }
}

pub struct CommandSongSampler {
    song_command: Option<CommandLine>,
    /// Gate: only report a song while this prints `Playing`.
    status_command: Option<CommandLine>,
    timeout: Duration,
}

impl CommandSongSampler {
    pub fn new(config: &SamplerConfig) -> Self {
        let timeout = Duration::from_millis(config.command_timeout_ms);
        if let Some(command) = config.song_command.as_deref().and_then(CommandLine::parse) {
            return Self {
                song_command: Some(command),
                status_command: None,
                timeout,
            };
        }

        match platform::find_on_path(&["playerctl"]) {
            Some(playerctl) => {
                info!("Song sampler using {:?}", playerctl);
                Self {
                    song_command: Some(CommandLine::new(
                        &playerctl,
                        &["metadata", "--format", "{{artist}} - {{title}}"],
                    )),
                    status_command: Some(CommandLine::new(&playerctl, &["status"])),
                    timeout,
                }
            }
            None => {
                info!("No media session tool found, song info disabled");
                Self {
                    song_command: None,
                    status_command: None,
                    timeout,
                }
            }
        }
    }
}

impl SongSampler for CommandSongSampler {
    async fn sample(&mut self) -> Option<String> {
        let song_command = self.song_command.as_ref()?;
        if let Some(status) = &self.status_command {
            let state = status.run(self.timeout).await?;
            if !state.eq_ignore_ascii_case("playing") {
                return None;
            }
        }
        let output = song_command.run(self.timeout).await?;
        clean_song_line(&output)
    }
}
