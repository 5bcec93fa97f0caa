//! Configuration loader plus strongly typed settings structures.
//!
//! Settings live in `config.toml` and the ordered audience rules in
//! `audiences.toml`, both inside a profile directory under `~/.scrollback`.
//! The shipped defaults are embedded and extracted on first run.

use anyhow::{Context, Result};
use include_dir::{include_dir, Dir};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::audience::AudienceCategory;

// Embed default configuration files at compile time
static DEFAULTS_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/defaults");
const DEFAULT_AUDIENCES: &str = include_str!("../defaults/audiences.toml");

pub const DEFAULT_CONFIRM_PATTERN: &str = r"^ *§[47]Press §[cf](SNEAK|SHIFT) §[47]to continue$";
pub const DEFAULT_SELECT_PATTERN: &str =
    r"^ *§[47cf](Select|CLICK) §[47cf]an option (§[47])?to continue$";
pub const DEFAULT_EMPTY_LINE_PATTERN: &str = r"^\s*(§r|À+)?\s*$";

/// Top-level configuration object aggregated from the profile's TOML files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub dialogue: DialogueConfig,
    #[serde(default)]
    pub timing_signal: TimingSignalConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(skip)] // Loaded from separate audiences.toml file
    pub audiences: Vec<AudienceRule>,
    #[serde(skip)] // Set at runtime, used for profile-specific lookups
    pub profile: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64, // Length of one engine tick
}

/// Screen dump handling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueConfig {
    #[serde(default = "default_enabled")]
    pub extraction: bool, // Page-detection mode: screens are split into dialogue and chat
    #[serde(default = "default_confirm_pattern")]
    pub confirm_pattern: String,
    #[serde(default = "default_select_pattern")]
    pub select_pattern: String,
    #[serde(default = "default_empty_line_pattern")]
    pub empty_line_pattern: String,
    #[serde(default = "default_signal_window_ticks")]
    pub signal_window_ticks: u64,
}

/// Status effect that accompanies dialogues waiting for a key press
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSignalConfig {
    #[serde(default = "default_signal_effect")]
    pub effect: String,
    #[serde(default = "default_signal_amplifier")]
    pub amplifier: u8,
    #[serde(default = "default_signal_duration")]
    pub duration_ticks: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mute: Vec<MutePattern>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rewrite: Vec<RewritePattern>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutePattern {
    pub pattern: String, // Regex over the plain text
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewritePattern {
    pub pattern: String, // Regex over the coded text
    pub replacement: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// One entry of the ordered audience rule list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudienceRule {
    pub category: AudienceCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreground: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub fast_parse: bool, // If true, split patterns on | and match literals with Aho-Corasick
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AudiencesFile {
    #[serde(default)]
    audience: Vec<AudienceRule>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4901
}

fn default_tick_millis() -> u64 {
    50
}

fn default_enabled() -> bool {
    true
}

fn default_confirm_pattern() -> String {
    DEFAULT_CONFIRM_PATTERN.to_string()
}

fn default_select_pattern() -> String {
    DEFAULT_SELECT_PATTERN.to_string()
}

fn default_empty_line_pattern() -> String {
    DEFAULT_EMPTY_LINE_PATTERN.to_string()
}

fn default_signal_window_ticks() -> u64 {
    20
}

fn default_signal_effect() -> String {
    "slowness".to_string()
}

fn default_signal_amplifier() -> u8 {
    3
}

fn default_signal_duration() -> u32 {
    32767
}

fn is_false(b: &bool) -> bool {
    !b
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tick_millis: default_tick_millis(),
        }
    }
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            extraction: true,
            confirm_pattern: default_confirm_pattern(),
            select_pattern: default_select_pattern(),
            empty_line_pattern: default_empty_line_pattern(),
            signal_window_ticks: default_signal_window_ticks(),
        }
    }
}

impl Default for TimingSignalConfig {
    fn default() -> Self {
        Self {
            effect: default_signal_effect(),
            amplifier: default_signal_amplifier(),
            duration_ticks: default_signal_duration(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            dialogue: DialogueConfig::default(),
            timing_signal: TimingSignalConfig::default(),
            chat: ChatConfig::default(),
            audiences: Self::default_audiences(),
            profile: None,
        }
    }
}

impl Config {
    /// Load config for a profile, extracting defaults on first run.
    ///
    /// `path` replaces the profile's config.toml; audiences still come from
    /// the profile directory.
    pub fn load(profile: Option<&str>, path: Option<&Path>) -> Result<Self> {
        // Idempotent - only creates missing files
        Self::extract_defaults(profile)?;

        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path(profile)?,
        };

        let contents = fs::read_to_string(&config_path)
            .context(format!("Failed to read config file: {:?}", config_path))?;
        let mut config: Config = toml::from_str(&contents)
            .context(format!("Failed to parse config file: {:?}", config_path))?;

        config.profile = profile.map(|s| s.to_string());
        config.audiences = Self::load_audiences(profile)?;

        tracing::info!(
            "Loaded config from {:?} ({} audience rules)",
            config_path,
            config.audiences.len()
        );

        Ok(config)
    }

    /// Load audiences.toml for a profile, falling back to the embedded rules
    pub fn load_audiences(profile: Option<&str>) -> Result<Vec<AudienceRule>> {
        let audiences_path = Self::audiences_path(profile)?;

        if audiences_path.exists() {
            let contents =
                fs::read_to_string(&audiences_path).context("Failed to read audiences.toml")?;
            Self::parse_audiences(&contents).context("Failed to parse audiences.toml")
        } else {
            Ok(Self::default_audiences())
        }
    }

    pub fn parse_audiences(contents: &str) -> Result<Vec<AudienceRule>> {
        let file: AudiencesFile = toml::from_str(contents)?;
        Ok(file.audience)
    }

    pub fn default_audiences() -> Vec<AudienceRule> {
        Self::parse_audiences(DEFAULT_AUDIENCES).unwrap_or_else(|e| {
            tracing::error!("Embedded audiences.toml is invalid: {}", e);
            Vec::new()
        })
    }

    /// Extract embedded default files into the profile directory.
    ///
    /// Never overwrites a file that already exists.
    fn extract_defaults(profile: Option<&str>) -> Result<()> {
        let profile_dir = Self::profile_dir(profile)?;
        fs::create_dir_all(&profile_dir)?;

        for file in DEFAULTS_DIR.files() {
            let filename = file
                .path()
                .file_name()
                .and_then(|n| n.to_str())
                .context("Invalid default filename")?;
            let target = profile_dir.join(filename);

            if !target.exists() {
                fs::write(&target, file.contents())
                    .context(format!("Failed to write {}", filename))?;
                tracing::info!("Extracted {} to {:?}", filename, target);
            }
        }

        Ok(())
    }

    /// Get the base scrollback directory (~/.scrollback/)
    /// Can be overridden with SCROLLBACK_DIR environment variable
    pub fn base_dir() -> Result<PathBuf> {
        if let Ok(custom_dir) = std::env::var("SCROLLBACK_DIR") {
            return Ok(PathBuf::from(custom_dir));
        }

        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(".scrollback"))
    }

    /// Returns: ~/.scrollback/{profile}/ or ~/.scrollback/default/
    fn profile_dir(profile: Option<&str>) -> Result<PathBuf> {
        let profile_name = profile.unwrap_or("default");
        Ok(Self::base_dir()?.join(profile_name))
    }

    pub fn config_path(profile: Option<&str>) -> Result<PathBuf> {
        Ok(Self::profile_dir(profile)?.join("config.toml"))
    }

    pub fn audiences_path(profile: Option<&str>) -> Result<PathBuf> {
        Ok(Self::profile_dir(profile)?.join("audiences.toml"))
    }
}
