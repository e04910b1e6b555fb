//! Engine and compiler configuration
//!
//! Both configs are plain serde structs with sensible defaults. They can be
//! loaded from a JSON file and then adjusted from `TALEWEAVE_*` environment
//! variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::compiler::voices::{VoiceSpec, default_presets};
use crate::error::{ConfigError, ConfigResult};

/// A single sliding-window loop guard rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowRule {
    /// Number of most recent observations considered
    pub window: usize,
    /// Threshold the rule trips beyond
    pub limit: usize,
}

/// Loop guard configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Same address repeated more than `limit` times within `window` steps
    pub short: Option<WindowRule>,
    /// `limit` steps observed within `window` steps without a reset
    pub long: Option<WindowRule>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            short: Some(WindowRule {
                window: 12,
                limit: 3,
            }),
            long: Some(WindowRule {
                window: 400,
                limit: 400,
            }),
        }
    }
}

impl GuardConfig {
    /// A guard that never fires
    pub fn disabled() -> Self {
        Self {
            short: None,
            long: None,
        }
    }
}

/// Configuration for the execution engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum steps executed within a single `advance` call
    pub max_iterations: usize,

    /// Number of times an exhausted story restarts from the root
    pub max_loops: u32,

    /// Maximum checkpoints retained per session (oldest dropped)
    pub max_checkpoints: usize,

    /// Request speech audio for text lines
    pub generate_speech: bool,

    /// Generate images for prompt-only `<image>` tags
    pub generate_images: bool,

    /// Generate audio for prompt-only `<sound>`/`<audio>`/`<music>` tags
    pub generate_sounds: bool,

    /// Model preference list forwarded to the provider
    pub models: Vec<String>,

    /// Fixed clock in epoch milliseconds; wall clock when absent
    pub clock: Option<i64>,

    /// Loop guard thresholds
    pub guard: GuardConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            max_loops: 0,
            max_checkpoints: 50,
            generate_speech: false,
            generate_images: false,
            generate_sounds: false,
            models: Vec::new(),
            clock: None,
            guard: GuardConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load a config from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let data = std::fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Apply `TALEWEAVE_*` environment overrides
    pub fn with_env_overrides(mut self) -> ConfigResult<Self> {
        if let Some(value) = env_value("TALEWEAVE_MAX_ITERATIONS")? {
            self.max_iterations = value;
        }
        if let Some(value) = env_value("TALEWEAVE_MAX_LOOPS")? {
            self.max_loops = value;
        }
        if let Some(value) = env_value("TALEWEAVE_MAX_CHECKPOINTS")? {
            self.max_checkpoints = value;
        }
        if let Some(value) = env_flag("TALEWEAVE_GENERATE_SPEECH")? {
            self.generate_speech = value;
        }
        if let Some(value) = env_flag("TALEWEAVE_GENERATE_IMAGES")? {
            self.generate_images = value;
        }
        if let Some(value) = env_flag("TALEWEAVE_GENERATE_SOUNDS")? {
            self.generate_sounds = value;
        }
        if let Some(models) = env_list("TALEWEAVE_MODELS") {
            self.models = models;
        }
        Ok(self)
    }
}

/// Configuration for the compiler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileConfig {
    /// Resolve pending voices through the provider instead of presets
    pub generate_voices: bool,

    /// Generate a cover image when metadata has none
    pub generate_thumbnail: bool,

    /// Preset catalog used for deterministic voice assignment
    pub voice_presets: Vec<VoiceSpec>,

    /// Model preference list forwarded to the provider
    pub models: Vec<String>,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            generate_voices: false,
            generate_thumbnail: false,
            voice_presets: default_presets(),
            models: Vec::new(),
        }
    }
}

impl CompileConfig {
    /// Load a config from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let data = std::fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Apply `TALEWEAVE_*` environment overrides
    pub fn with_env_overrides(mut self) -> ConfigResult<Self> {
        if let Some(value) = env_flag("TALEWEAVE_GENERATE_VOICES")? {
            self.generate_voices = value;
        }
        if let Some(value) = env_flag("TALEWEAVE_GENERATE_THUMBNAIL")? {
            self.generate_thumbnail = value;
        }
        if let Some(models) = env_list("TALEWEAVE_MODELS") {
            self.models = models;
        }
        Ok(self)
    }
}

fn env_raw(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_value<T: FromStr>(key: &str) -> ConfigResult<Option<T>> {
    match env_raw(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                key: key.to_string(),
                value: raw,
            }),
        None => Ok(None),
    }
}

fn env_flag(key: &str) -> ConfigResult<Option<bool>> {
    match env_raw(key) {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidEnv {
                key: key.to_string(),
                value: raw,
            }),
        },
        None => Ok(None),
    }
}

fn env_list(key: &str) -> Option<Vec<String>> {
    env_raw(key).map(|raw| {
        raw.split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_json_fills_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("engine.json");
        std::fs::write(&path, r#"{"max_iterations": 42, "generate_speech": true}"#).unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.max_iterations, 42);
        assert!(config.generate_speech);
        assert_eq!(config.max_checkpoints, 50);
        assert_eq!(config.guard, GuardConfig::default());
    }

    #[test]
    fn test_invalid_json_is_reported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.json");
        std::fs::write(&path, "{ nope").unwrap();

        assert!(matches!(
            CompileConfig::load(&path),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_compile_defaults_carry_presets() {
        let config = CompileConfig::default();
        assert!(!config.voice_presets.is_empty());
        assert!(!config.generate_voices);
    }
}
