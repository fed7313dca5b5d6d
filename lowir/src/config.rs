//! Configuration of lowering passes.
//!
//! Defaults are overridden by `lowir/lower_config.json` found in xdg config directories
//! and then by environment variables `LOWIR_DEBUG` and `LOWIR_UNSUPPORTED`.

use crate::error::LowerError;
use nanoserde::DeJson;
use std::path::{Path, PathBuf};

/// What to do with gradient nodes whose arithmetic mode has no lowering rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnsupportedPolicy {
    /// Log a warning and leave the node in the graph
    #[default]
    Warn,
    /// Stop the pass with [`LowerError::UnsupportedMode`]
    Error,
    /// Leave the node in the graph silently
    Ignore,
}

impl core::str::FromStr for UnsupportedPolicy {
    type Err = LowerError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" => Ok(UnsupportedPolicy::Warn),
            "error" => Ok(UnsupportedPolicy::Error),
            "ignore" => Ok(UnsupportedPolicy::Ignore),
            _ => Err(LowerError::parse_error(format!(
                "unsupported policy {s:?}, expected warn, error or ignore"
            ))),
        }
    }
}

// Config file as written on disk, missing fields keep their defaults
#[derive(DeJson, Debug, Default)]
struct ConfigFile {
    #[nserde(default)]
    debug: Option<u32>,
    #[nserde(default)]
    unsupported: Option<String>,
    #[nserde(default)]
    dce: Option<bool>,
    #[nserde(default)]
    verify: Option<bool>,
}

/// Lowering configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LowerConfig {
    /// Debug mask, bit 1 logs rewrites, bit 2 dumps graphs,
    /// bit 3 logs dead code elimination
    pub debug: u32,
    /// Handling of gradient modes without lowering rule
    pub unsupported: UnsupportedPolicy,
    /// Remove nodes left without uses after lowering
    pub dce: bool,
    /// Verify graph after optimization
    pub verify: bool,
}

impl Default for LowerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl LowerConfig {
    #[must_use]
    pub const fn new() -> LowerConfig {
        LowerConfig { debug: 0, unsupported: UnsupportedPolicy::Warn, dce: true, verify: true }
    }

    /// Defaults overridden by config file and environment variables.
    /// Config file that can not be found or parsed is skipped.
    #[must_use]
    pub fn load() -> LowerConfig {
        let mut config = LowerConfig::new();
        if let Some((path, file)) = find_config_file() {
            match config.apply_json(&file) {
                Ok(()) => log::debug!("Lowering config {path:?} successfully read and parsed."),
                Err(e) => log::debug!("Failed to parse {path:?}, {e}"),
            }
        } else {
            log::debug!("Failed to find lowir/lower_config.json, using defaults.");
        }
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Parses config from json, fields missing in json keep their defaults
    pub fn from_json(json: &str) -> Result<LowerConfig, LowerError> {
        let mut config = LowerConfig::new();
        config.apply_json(json)?;
        Ok(config)
    }

    fn apply_json(&mut self, json: &str) -> Result<(), LowerError> {
        let file = ConfigFile::deserialize_json(json)
            .map_err(|e| LowerError::parse_error(format!("{e:?}")))?;
        // Parse everything first, so that invalid file does not change anything
        let unsupported: Option<UnsupportedPolicy> =
            file.unsupported.as_deref().map(str::parse::<UnsupportedPolicy>).transpose()?;
        if let Some(debug) = file.debug {
            self.debug = debug;
        }
        if let Some(unsupported) = unsupported {
            self.unsupported = unsupported;
        }
        if let Some(dce) = file.dce {
            self.dce = dce;
        }
        if let Some(verify) = file.verify {
            self.verify = verify;
        }
        Ok(())
    }

    // Invalid values are ignored
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(x) = var("LOWIR_DEBUG") {
            if let Ok(x) = x.parse::<u32>() {
                self.debug = x;
            }
        }
        if let Some(x) = var("LOWIR_UNSUPPORTED") {
            match x.parse::<UnsupportedPolicy>() {
                Ok(policy) => self.unsupported = policy,
                Err(e) => log::warn!("Ignoring LOWIR_UNSUPPORTED, {e}"),
            }
        }
    }

    #[must_use]
    pub const fn debug_lower(&self) -> bool {
        self.debug % 2 == 1
    }

    #[must_use]
    pub const fn debug_graph(&self) -> bool {
        (self.debug >> 1) % 2 == 1
    }

    #[must_use]
    pub const fn debug_dce(&self) -> bool {
        (self.debug >> 2) % 2 == 1
    }
}

// Search through config directories and find lowir/lower_config.json,
// user config home is searched before system config directories
fn find_config_file() -> Option<(PathBuf, String)> {
    let bd = xdg::BaseDirectories::new()
        .map_err(|e| log::debug!("Failed to find config directories, {e}"))
        .ok()?;
    let mut dirs = vec![bd.get_config_home()];
    dirs.extend(bd.get_config_dirs());
    dirs.into_iter().find_map(|mut path| {
        path.push("lowir/lower_config.json");
        match read_config(&path) {
            Ok(file) => file.map(|file| (path, file)),
            Err(e) => {
                log::warn!("Failed to read {path:?}, {e}");
                None
            }
        }
    })
}

// Missing file is not an error
fn read_config(path: &Path) -> Result<Option<String>, LowerError> {
    match std::fs::read_to_string(path) {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
