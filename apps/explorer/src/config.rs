use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use client_core::{
    rotation::{DEFAULT_ADVANCE_PERIOD, DEFAULT_REFRESH_PERIOD, DEFAULT_WINDOW_SIZE},
    RotationSchedule, DEFAULT_FETCH_TIMEOUT, DEFAULT_IMAGE_ENDPOINT, DEFAULT_RECIPE_ENDPOINT,
};
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "explorer.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub recipe_endpoint: String,
    pub image_endpoint: String,
    pub window_size: usize,
    pub refresh_seconds: u64,
    pub advance_seconds: u64,
    pub fetch_timeout_seconds: u64,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            recipe_endpoint: DEFAULT_RECIPE_ENDPOINT.into(),
            image_endpoint: DEFAULT_IMAGE_ENDPOINT.into(),
            window_size: DEFAULT_WINDOW_SIZE,
            refresh_seconds: DEFAULT_REFRESH_PERIOD.as_secs(),
            advance_seconds: DEFAULT_ADVANCE_PERIOD.as_secs(),
            fetch_timeout_seconds: DEFAULT_FETCH_TIMEOUT.as_secs(),
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    pub fn schedule(&self) -> Result<RotationSchedule> {
        RotationSchedule::new(
            self.window_size,
            Duration::from_secs(self.refresh_seconds),
            Duration::from_secs(self.advance_seconds),
        )
        .context("invalid carousel settings")
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds.max(1))
    }
}

/// Defaults, then the TOML file, then `APP__*` environment variables.
/// An explicit `path` must exist; the default `explorer.toml` is optional.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let mut settings = match path {
        Some(path) => read_settings_file(path)?,
        None => {
            let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                read_settings_file(&default_path)?
            } else {
                Settings::default()
            }
        }
    };

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn read_settings_file(path: &Path) -> Result<Settings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file '{}'", path.display()))?;
    parse_settings(&raw).with_context(|| format!("invalid config file '{}'", path.display()))
}

fn parse_settings(raw: &str) -> Result<Settings> {
    Ok(toml::from_str::<Settings>(raw)?)
}

fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("APP__RECIPE_ENDPOINT") {
        settings.recipe_endpoint = v;
    }
    if let Some(v) = lookup("APP__IMAGE_ENDPOINT") {
        settings.image_endpoint = v;
    }

    if let Some(v) = lookup("APP__WINDOW_SIZE") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.window_size = parsed;
        }
    }
    if let Some(v) = lookup("APP__REFRESH_SECONDS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.refresh_seconds = parsed;
        }
    }
    if let Some(v) = lookup("APP__ADVANCE_SECONDS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.advance_seconds = parsed;
        }
    }
    if let Some(v) = lookup("APP__FETCH_TIMEOUT_SECONDS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.fetch_timeout_seconds = parsed;
        }
    }

    if let Some(v) = lookup("RUST_LOG") {
        settings.log_filter = v;
    }
    if let Some(v) = lookup("APP__LOG_FILTER") {
        settings.log_filter = v;
    }
}
