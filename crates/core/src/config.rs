use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpanTreeError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Auto,
    Always,
    Never,
}

impl FromStr for ColorMode {
    type Err = SpanTreeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "always" | "on" | "true" => Ok(Self::Always),
            "never" | "off" | "false" => Ok(Self::Never),
            _ => Err(SpanTreeError::Parse(format!("unknown color mode: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Width in columns of the timeline bar.
    pub bar_width: usize,
    pub indent_width: usize,
    /// Upper bound on spans accepted from a single event.
    pub max_spans: usize,
    /// Spans lasting at least this long are flagged as slow.
    pub slow_span: Duration,
    pub color: ColorMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bar_width: 40,
            indent_width: 2,
            max_spans: 10_000,
            slow_span: Duration::from_millis(500),
            color: ColorMode::Auto,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        let config_path = config_file_path();
        if let Some(file_overrides) = load_file_overrides(&config_path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    bar_width: Option<usize>,
    indent_width: Option<usize>,
    max_spans: Option<usize>,
    slow_span: Option<String>,
    color: Option<String>,
}

pub fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("SPANTREE_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("spantree/config.toml")
}

fn load_file_overrides(path: &Path) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| SpanTreeError::Config(format!("failed reading {}: {e}", path.display())))?;
    let parsed = parse_file_overrides(&raw)
        .map_err(|e| SpanTreeError::Config(format!("failed parsing {}: {e}", path.display())))?;
    tracing::debug!(path = %path.display(), "loaded config file");
    Ok(Some(parsed))
}

fn parse_file_overrides(raw: &str) -> std::result::Result<ConfigOverrides, toml::de::Error> {
    toml::from_str(raw)
}

fn load_env_overrides() -> Result<ConfigOverrides> {
    Ok(ConfigOverrides {
        bar_width: env_number("SPANTREE_BAR_WIDTH")?,
        indent_width: env_number("SPANTREE_INDENT_WIDTH")?,
        max_spans: env_number("SPANTREE_MAX_SPANS")?,
        slow_span: env::var("SPANTREE_SLOW_SPAN").ok(),
        color: env::var("SPANTREE_COLOR").ok(),
    })
}

fn env_number(key: &str) -> Result<Option<usize>> {
    match env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|e| SpanTreeError::Config(format!("bad {key} in environment: {e}"))),
        Err(_) => Ok(None),
    }
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.bar_width {
        if v == 0 {
            return Err(SpanTreeError::Config(format!(
                "bar_width in {source} must be positive"
            )));
        }
        cfg.bar_width = v;
    }
    if let Some(v) = overrides.indent_width {
        cfg.indent_width = v;
    }
    if let Some(v) = overrides.max_spans {
        cfg.max_spans = v;
    }
    if let Some(v) = overrides.slow_span {
        cfg.slow_span = humantime::parse_duration(&v).map_err(|e| {
            SpanTreeError::Config(format!("bad slow_span in {source}: {e} (value={v})"))
        })?;
    }
    if let Some(v) = overrides.color {
        cfg.color = v.parse().map_err(|e| {
            SpanTreeError::Config(format!("bad color in {source}: {e} (value={v})"))
        })?;
    }
    Ok(())
}
