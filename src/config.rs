use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// Directory prefix the browser uses for its frame dumps.
pub const DEFAULT_SESSION_PREFIX: &str = "windowrecording-";

/// Settings for one recorder instance.
///
/// `base_dir` is the directory the browser process writes its
/// `windowrecording-*` dumps into. Each concurrent browser instance must use
/// its own base directory, otherwise session discovery cannot tell their
/// dumps apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderSettings {
    pub base_dir: PathBuf,
    pub session_prefix: String,
    pub poll: PollSettings,
    pub tools: ToolSettings,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            session_prefix: DEFAULT_SESSION_PREFIX.to_string(),
            poll: PollSettings::default(),
            tools: ToolSettings::default(),
        }
    }
}

impl RecorderSettings {
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Unable to read config at {}", path.display()))?;
            let parsed: Self = serde_json::from_str(&raw)
                .with_context(|| format!("Malformed config at {}", path.display()))?;
            Ok(parsed)
        } else {
            let settings = Self::default();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory {}", parent.display())
                })?;
            }
            let serialised = serde_json::to_string_pretty(&settings)?;
            fs::write(path, serialised)
                .with_context(|| format!("Failed to write default config to {}", path.display()))?;
            Ok(settings)
        }
    }
}

/// Quiescence-poll tuning for the post-capture frame flush.
///
/// The browser keeps writing frames briefly after the disable command
/// returns; completion is inferred from two consecutive identical directory
/// mtime samples. That heuristic can misread a long inter-frame gap as
/// completion, which is why the windows are configurable rather than
/// hard-coded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    /// Wait before the second mtime sample.
    pub initial_delay_ms: u64,
    /// Wait between subsequent samples while the directory is still changing.
    pub interval_ms: u64,
    /// Upper bound on the whole wait; exceeding it is a flush timeout.
    pub max_wait_ms: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            interval_ms: 5_000,
            max_wait_ms: 120_000,
        }
    }
}

impl PollSettings {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

/// Optional overrides for the two external encoder binaries; when unset they
/// are resolved from `PATH`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub ffmpeg: Option<PathBuf>,
    pub mp4fpsmod: Option<PathBuf>,
}

/// Default location of the recorder config file.
pub fn default_config_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("io", "pagereel", "Pagereel")
        .context("Unable to resolve platform config directory")?;
    Ok(dirs.config_dir().join("recorder.json"))
}
