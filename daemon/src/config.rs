//! Configuration loading and management

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};

use crate::state::{SessionSettings, WakeTimeout};
use crate::wake::WakePhrase;

const ENV_PREFIX: &str = "WAKE_VOICE_";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Start listening as soon as the daemon is up
    pub autostart: bool,

    /// Wake phrase, locale and timing for the listening session
    pub session: SessionSettings,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME").context("HOME is not set")?;
        Self::from_lookup(&home, |key| std::env::var(key).ok())
    }

    /// Build configuration from `home` and a variable lookup.
    ///
    /// `lookup` receives full variable names (`WAKE_VOICE_PHRASE`, ...).
    pub fn from_lookup<F>(home: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        let data_dir = match var("DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("wake-voice"),
        };

        let socket_path = var("SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("daemon.sock"));

        let defaults = SessionSettings::default();

        let wake_phrase = match var("PHRASE") {
            Some(phrase) => WakePhrase::new(&phrase).context("invalid WAKE_VOICE_PHRASE")?,
            None => defaults.wake_phrase,
        };

        let locale = var("LOCALE").unwrap_or(defaults.locale);
        if locale.trim().is_empty() {
            bail!("WAKE_VOICE_LOCALE must not be empty");
        }

        let wake_window_secs = parse_or(&var, "WAKE_WINDOW_SECS", defaults.wake_window_secs)?;
        if wake_window_secs == 0 {
            bail!("WAKE_VOICE_WAKE_WINDOW_SECS must be at least 1");
        }

        let session = SessionSettings {
            wake_phrase,
            locale,
            wake_window_secs,
            restart_delay: millis_or(&var, "RESTART_DELAY_MS", defaults.restart_delay)?,
            processing_delay: millis_or(&var, "PROCESSING_DELAY_MS", defaults.processing_delay)?,
            result_display: millis_or(&var, "RESULT_DISPLAY_MS", defaults.result_display)?,
            error_retry_delay: millis_or(&var, "ERROR_RETRY_MS", defaults.error_retry_delay)?,
            wake_timeout: parse_or(&var, "WAKE_TIMEOUT", defaults.wake_timeout)?,
        };

        Ok(Self {
            socket_path,
            data_dir,
            autostart: parse_or(&var, "AUTOSTART", true)?,
            session,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }
}

/// Parse an optional variable, falling back to `default` when unset
fn parse_or<T, V>(var: &V, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    V: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid {ENV_PREFIX}{name}={raw:?}: {e}")),
        None => Ok(default),
    }
}

fn millis_or<V>(var: &V, name: &str, default: Duration) -> Result<Duration>
where
    V: Fn(&str) -> Option<String>,
{
    let millis = parse_or(var, name, default.as_millis() as u64)?;
    Ok(Duration::from_millis(millis))
}
