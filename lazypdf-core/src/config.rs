use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

/// User-tunable engine and shell settings, read from `config.toml`.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Delay between the last view change and the visibility sweep.
    #[serde(rename = "debounce_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub debounce: Duration,
    /// Prefetch band on each side of the viewport, as a fraction of its height.
    pub prefetch_ratio: f32,
    pub sweep_margin_px: f32,
    pub scroll_step_px: f32,
    pub log_filter: String,
    /// Directory or file of the pdfium shared library. Searched in the working directory
    /// and then system paths when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdfium_library: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(40),
            prefetch_ratio: 0.75,
            sweep_margin_px: 600.0,
            scroll_step_px: 80.0,
            log_filter: "info".to_string(),
            pdfium_library: None,
        }
    }
}

impl Config {
    pub fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("net", "lazypdf", "lazypdf")
    }

    pub fn default_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {:?}", path))?;
        config
            .validate()
            .with_context(|| format!("invalid config file {:?}", path))?;
        Ok(config)
    }

    /// Loads `explicit` (which must exist), else the default location if present, else
    /// the built-in defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.prefetch_ratio.is_finite() && self.prefetch_ratio >= 0.0,
            "prefetch_ratio must be a non-negative number, got {}",
            self.prefetch_ratio
        );
        ensure!(
            self.sweep_margin_px.is_finite() && self.sweep_margin_px >= 0.0,
            "sweep_margin_px must be a non-negative number, got {}",
            self.sweep_margin_px
        );
        ensure!(
            self.scroll_step_px.is_finite() && self.scroll_step_px > 0.0,
            "scroll_step_px must be positive, got {}",
            self.scroll_step_px
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let file = write_config("debounce_ms = 120\nlog_filter = \"lazypdf_core=debug\"\n");
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.debounce, Duration::from_millis(120));
        assert_eq!(config.log_filter, "lazypdf_core=debug");
        assert_eq!(config.prefetch_ratio, 0.75);
        assert_eq!(config.sweep_margin_px, 600.0);
        assert!(config.pdfium_library.is_none());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let file = write_config("debounce = 10\n");
        let err = Config::load(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse config file"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let file = write_config("scroll_step_px = 0.0\n");
        let err = Config::load(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("scroll_step_px must be positive"));
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(Config::load_or_default(Some(&missing)).is_err());
    }

    #[test]
    fn serialized_defaults_round_trip() {
        let text = toml::to_string(&Config::default()).unwrap();
        assert!(text.contains("debounce_ms = 40"));
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, Config::default());
    }
}
