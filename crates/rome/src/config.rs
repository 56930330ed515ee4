//! Configuration file support for rome.
//!
//! This module provides support for `rome.toml` configuration files that allow
//! users to persist project settings and avoid passing CLI flags repeatedly.
//!
//! ## Configuration File Location
//!
//! The configuration file is searched for in the following order:
//! 1. Current working directory (`./rome.toml`)
//! 2. Parent directories (up to the repository root or filesystem root)
//!
//! ## Example Configuration
//!
//! ```toml
//! [project]
//! project = "Pods/Pods.xcodeproj"
//! manifest = "Pods/rome-manifest.json"
//!
//! [build]
//! configuration = "Release"
//! build_dir = "build"
//! destination = "Rome"
//!
//! [simulators]
//! ios = "iPhone 15"
//! ```

use anyhow::{Context, Result};
use rome_sdk::{BuildSettings, PlatformFamily};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The default configuration file name.
pub const CONFIG_FILE_NAME: &str = "rome.toml";

/// Root configuration structure for `rome.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RomeConfig {
    /// Project and manifest locations.
    pub project: ProjectConfig,

    /// Build settings.
    pub build: BuildConfig,

    /// Simulator device profile overrides.
    pub simulators: SimulatorsConfig,
}

/// Project-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Path to the generated Xcode project.
    ///
    /// Defaults to `Pods/Pods.xcodeproj`.
    pub project: PathBuf,

    /// Target manifest written by the dependency tool.
    ///
    /// Defaults to `Pods/rome-manifest.json`.
    pub manifest: PathBuf,

    /// Directory holding one source directory per pod.
    ///
    /// Defaults to the directory containing the project.
    pub pods_root: Option<PathBuf>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            project: PathBuf::from("Pods/Pods.xcodeproj"),
            manifest: PathBuf::from("Pods/rome-manifest.json"),
            pods_root: None,
        }
    }
}

/// Build settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Xcode build configuration.
    ///
    /// Defaults to "Release".
    pub configuration: String,

    /// Working build directory, removed after every run.
    ///
    /// Defaults to `build`.
    pub build_dir: PathBuf,

    /// Directory receiving the frameworks.
    ///
    /// Defaults to `Rome`.
    pub destination: PathBuf,

    /// Frameworks whose name starts with this prefix are not copied.
    ///
    /// Defaults to "Pods".
    pub reserved_prefix: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            configuration: "Release".to_string(),
            build_dir: PathBuf::from("build"),
            destination: PathBuf::from("Rome"),
            reserved_prefix: "Pods".to_string(),
        }
    }
}

/// Simulator device profiles used for `-destination`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorsConfig {
    pub ios: Option<String>,
    pub tvos: Option<String>,
    pub watchos: Option<String>,
}

impl SimulatorsConfig {
    fn overrides(&self) -> Vec<(PlatformFamily, &str)> {
        [
            (PlatformFamily::Ios, self.ios.as_deref()),
            (PlatformFamily::Tvos, self.tvos.as_deref()),
            (PlatformFamily::Watchos, self.watchos.as_deref()),
        ]
        .into_iter()
        .filter_map(|(family, profile)| profile.map(|p| (family, p)))
        .collect()
    }
}

impl RomeConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from the specified file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: RomeConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Attempts to find and load configuration from the current directory
    /// or any parent directory.
    ///
    /// # Returns
    ///
    /// * `Ok(Some((config, path)))` - Found and loaded configuration with its path
    /// * `Ok(None)` - No configuration file found
    /// * `Err` - If a config file was found but couldn't be parsed
    pub fn discover() -> Result<Option<(Self, PathBuf)>> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&cwd)
    }

    /// Attempts to find and load configuration starting from the specified directory.
    pub fn discover_from(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.is_file() {
                let config = Self::load_from_file(&config_path)?;
                return Ok(Some((config, config_path)));
            }

            // Stop at repository root or filesystem root
            if current.join(".git").exists() || !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Saves the configuration to the specified file path.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Generates a starter configuration file as a formatted TOML string.
    ///
    /// This includes helpful comments explaining each configuration option.
    pub fn generate_starter_toml() -> String {
        r#"# rome configuration file
# CLI flags override these settings when provided.

[project]
# Xcode project generated by the dependency tool
project = "Pods/Pods.xcodeproj"

# Target manifest written next to the project
manifest = "Pods/rome-manifest.json"

# Directory containing one directory per pod (default: the project's directory)
# pods_root = "Pods"

[build]
# Xcode build configuration (default: Release)
configuration = "Release"

# Working directory for xcodebuild output, removed after each run
build_dir = "build"

# Where the finished frameworks are collected
destination = "Rome"

# Frameworks starting with this prefix belong to the dependency tool and are skipped
reserved_prefix = "Pods"

[simulators]
# Simulator device profiles used for simulator builds (optional)
# ios = "iPhone 5s"
# tvos = "Apple TV 1080p"
# watchos = "Apple Watch - 38mm"
"#
        .to_string()
    }
}

/// Configuration resolver that merges config file values with CLI arguments.
///
/// CLI arguments always take precedence over config file values.
#[derive(Debug, Default)]
pub struct ConfigResolver {
    /// Loaded configuration, if any.
    pub config: Option<RomeConfig>,

    /// Path to the loaded config file, if any.
    pub config_path: Option<PathBuf>,
}

impl ConfigResolver {
    /// Creates a resolver from an explicit config path, or by discovery.
    pub fn new(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Ok(Self {
                config: Some(RomeConfig::load_from_file(path)?),
                config_path: Some(path.to_path_buf()),
            });
        }
        match RomeConfig::discover()? {
            Some((config, path)) => Ok(Self {
                config: Some(config),
                config_path: Some(path),
            }),
            None => Ok(Self::default()),
        }
    }

    /// Directory relative config paths are resolved against.
    fn base_dir(&self) -> PathBuf {
        self.config_path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    /// Resolves a config file path against the config's directory.
    fn config_relative(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir().join(path)
        }
    }

    /// Resolves a CLI value, using config as fallback.
    ///
    /// # Returns
    ///
    /// The resolved value, preferring CLI over config over default.
    pub fn resolve<T, F>(&self, cli_value: Option<T>, config_getter: F, default: T) -> T
    where
        F: FnOnce(&RomeConfig) -> Option<T>,
    {
        cli_value
            .or_else(|| self.config.as_ref().and_then(config_getter))
            .unwrap_or(default)
    }

    fn resolve_path<F>(&self, cli_value: Option<PathBuf>, config_getter: F) -> PathBuf
    where
        F: FnOnce(&RomeConfig) -> PathBuf,
    {
        let config = self.config.clone().unwrap_or_default();
        match cli_value {
            Some(path) => path,
            None if self.config.is_some() => self.config_relative(&config_getter(&config)),
            None => config_getter(&config),
        }
    }

    /// Path of the Xcode project.
    pub fn project(&self, cli_value: Option<PathBuf>) -> PathBuf {
        self.resolve_path(cli_value, |c| c.project.project.clone())
    }

    /// Path of the target manifest.
    pub fn manifest(&self, cli_value: Option<PathBuf>) -> PathBuf {
        self.resolve_path(cli_value, |c| c.project.manifest.clone())
    }

    /// Directory holding per-pod directories, defaulting to the project's directory.
    pub fn pods_root(&self, cli_value: Option<PathBuf>, project: &Path) -> PathBuf {
        if let Some(path) = cli_value {
            return path;
        }
        match self.config.as_ref().and_then(|c| c.project.pods_root.clone()) {
            Some(path) => self.config_relative(&path),
            None => project
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        }
    }

    /// Builds the settings for a run from CLI values and config.
    pub fn build_settings(&self, cli: BuildOverrides) -> BuildSettings {
        let defaults = BuildConfig::default();
        let project = self.project(cli.project);
        let build_dir = self.resolve_path(cli.build_dir, |c| c.build.build_dir.clone());
        let destination = self.resolve_path(cli.destination, |c| c.build.destination.clone());
        let configuration = self.resolve(
            cli.configuration,
            |c| Some(c.build.configuration.clone()),
            defaults.configuration,
        );
        let reserved_prefix = self.resolve(
            None,
            |c| Some(c.build.reserved_prefix.clone()),
            defaults.reserved_prefix,
        );

        let mut settings = BuildSettings::new(project, build_dir, destination)
            .configuration(configuration)
            .reserved_prefix(reserved_prefix);
        if let Some(config) = &self.config {
            for (family, profile) in config.simulators.overrides() {
                settings = settings.simulator_profile(family, profile);
            }
        }
        settings
    }
}

/// Values given on the command line for `rome build`.
#[derive(Debug, Default)]
pub struct BuildOverrides {
    pub project: Option<PathBuf>,
    pub build_dir: Option<PathBuf>,
    pub destination: Option<PathBuf>,
    pub configuration: Option<String>,
}
