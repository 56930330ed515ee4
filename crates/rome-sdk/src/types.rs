//! Core types for rome-sdk.
//!
//! This module defines the data model shared by every stage of a run:
//!
//! - [`RomeError`] - Error types for build, merge, and copy operations
//! - [`PlatformFamily`] / [`PlatformPair`] - Platform selection and its SDK pair
//! - [`BuildTarget`] / [`ComponentSpec`] - What gets built
//! - [`BuildSettings`] - Per-run settings threaded through every call

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Error types for rome-sdk operations.
///
/// Missing artifacts and `lipo` runs without output are not errors; they are
/// recorded in [`crate::merge::MergeReport`].
///
/// # Example
///
/// ```ignore
/// use rome_sdk::{Orchestrator, RomeError};
///
/// match orchestrator.run(&metadata) {
///     Ok(report) => println!("Copied {} artifacts", report.artifacts.len()),
///     Err(RomeError::UnknownPlatform(name)) => {
///         eprintln!("Target uses unsupported platform '{}'", name);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum RomeError {
    /// A target declares a platform family that is not one of
    /// `ios`, `osx`, `tvos`, or `watchos`.
    #[error("Unknown platform '{0}'. Supported platforms: ios, osx, tvos, watchos")]
    UnknownPlatform(String),

    /// An external tool could not be started or exited with a nonzero status.
    ///
    /// The message carries the captured stdout and stderr verbatim.
    #[error("build error: {0}")]
    Build(String),

    /// The build phase finished without leaving a build directory behind.
    #[error(
        "The build directory was not found in the expected location: {}\n\n\
         xcodebuild produced no output. Check that the project builds into `build/` \
         next to the Pods directory.",
        .0.display()
    )]
    MissingBuildDirectory(PathBuf),

    /// A filesystem operation failed.
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The target manifest is well-formed JSON but describes something invalid.
    #[error("manifest error: {0}")]
    Manifest(String),

    /// The target manifest could not be parsed.
    #[error("serialization error: {0}. Check that the manifest is valid JSON")]
    Serialization(#[from] serde_json::Error),

    /// Invalid run settings.
    #[error("configuration error: {0}. Check rome.toml or CLI flags")]
    Config(String),
}

impl RomeError {
    /// Wraps an I/O error with a description of what was being attempted.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        RomeError::Io {
            context: context.into(),
            source,
        }
    }

    /// Returns `true` for errors the user can act on directly, as opposed to
    /// internal failures.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, RomeError::Io { .. })
    }
}

/// Platform family of a build target.
///
/// # Example
///
/// ```
/// use rome_sdk::PlatformFamily;
///
/// let family: PlatformFamily = "tvos".parse().unwrap();
/// assert_eq!(family, PlatformFamily::Tvos);
/// assert!("androidos".parse::<PlatformFamily>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformFamily {
    /// iPhone and iPad.
    Ios,
    /// macOS. Built once, never merged.
    Osx,
    /// Apple TV.
    Tvos,
    /// Apple Watch.
    Watchos,
}

impl PlatformFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformFamily::Ios => "ios",
            PlatformFamily::Osx => "osx",
            PlatformFamily::Tvos => "tvos",
            PlatformFamily::Watchos => "watchos",
        }
    }

    /// Returns the device/simulator SDK pair for this family, or `None`
    /// for desktop builds.
    pub fn pair(&self) -> Option<PlatformPair> {
        match self {
            PlatformFamily::Ios => Some(PlatformPair {
                device_sdk: "iphoneos",
                simulator_sdk: "iphonesimulator",
                simulator_platform: "iOS Simulator",
                runtime_platform: "iOS",
                default_profile: "iPhone 5s",
            }),
            PlatformFamily::Tvos => Some(PlatformPair {
                device_sdk: "appletvos",
                simulator_sdk: "appletvsimulator",
                simulator_platform: "tvOS Simulator",
                runtime_platform: "tvOS",
                default_profile: "Apple TV 1080p",
            }),
            PlatformFamily::Watchos => Some(PlatformPair {
                device_sdk: "watchos",
                simulator_sdk: "watchsimulator",
                simulator_platform: "watchOS Simulator",
                runtime_platform: "watchOS",
                default_profile: "Apple Watch - 38mm",
            }),
            PlatformFamily::Osx => None,
        }
    }
}

impl FromStr for PlatformFamily {
    type Err = RomeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ios" => Ok(PlatformFamily::Ios),
            "osx" | "macos" => Ok(PlatformFamily::Osx),
            "tvos" => Ok(PlatformFamily::Tvos),
            "watchos" => Ok(PlatformFamily::Watchos),
            other => Err(RomeError::UnknownPlatform(other.to_string())),
        }
    }
}

impl fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static device/simulator SDK names for one platform family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformPair {
    /// SDK for physical hardware (e.g. `iphoneos`).
    pub device_sdk: &'static str,
    /// SDK for the simulator (e.g. `iphonesimulator`).
    pub simulator_sdk: &'static str,
    /// Platform name used in `-destination` (e.g. `iOS Simulator`).
    pub simulator_platform: &'static str,
    /// Platform name of the simulator runtimes `simctl` reports (e.g. `iOS`).
    pub runtime_platform: &'static str,
    /// Simulator device profile used when none is configured.
    pub default_profile: &'static str,
}

/// One buildable artifact inside a [`BuildTarget`].
///
/// Several specs may share a root name (subspecs); identity is the
/// `(root_name, module_name)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentSpec {
    /// Name of the root spec; also the per-target directory in the build tree.
    pub root_name: String,
    /// Module name; also the framework and binary name.
    pub module_name: String,
}

impl ComponentSpec {
    pub fn new(root_name: impl Into<String>, module_name: impl Into<String>) -> Self {
        Self {
            root_name: root_name.into(),
            module_name: module_name.into(),
        }
    }
}

/// A logical build unit supplied by the metadata collaborator.
///
/// The platform is kept as the raw string the host tool reported so that an
/// unrecognised family surfaces as [`RomeError::UnknownPlatform`] when the
/// target is dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    /// Target name as reported by the host tool.
    pub name: String,
    /// Scheme passed to `xcodebuild -scheme`.
    pub label: String,
    /// Platform family name (`ios`, `osx`, `tvos`, `watchos`).
    pub platform: String,
    /// Minimum OS version, used for simulator destinations.
    pub deployment_target: Option<String>,
    /// Component specs in declaration order.
    pub specs: Vec<ComponentSpec>,
}

impl BuildTarget {
    /// Parses the target's platform family.
    pub fn family(&self) -> Result<PlatformFamily, RomeError> {
        self.platform.parse()
    }
}

/// Settings for one orchestrator run.
///
/// # Example
///
/// ```
/// use rome_sdk::BuildSettings;
///
/// let settings = BuildSettings::new("Pods/Pods.xcodeproj", "build", "Rome");
/// assert_eq!(settings.configuration, "Release");
/// assert_eq!(settings.reserved_prefix, "Pods");
/// ```
#[derive(Debug, Clone)]
pub struct BuildSettings {
    /// Path to the Xcode project to build.
    pub project: PathBuf,
    /// Working build tree, wiped at the start and end of a run.
    pub build_dir: PathBuf,
    /// Final output directory.
    pub destination: PathBuf,
    /// Build configuration (e.g. `Release`).
    pub configuration: String,
    /// Bundles whose file name starts with this prefix belong to the host
    /// tool and are never copied to the destination.
    pub reserved_prefix: String,
    /// Simulator profile overrides, keyed by family.
    pub simulator_profiles: Vec<(PlatformFamily, String)>,
}

impl BuildSettings {
    pub fn new(
        project: impl Into<PathBuf>,
        build_dir: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            project: project.into(),
            build_dir: build_dir.into(),
            destination: destination.into(),
            configuration: "Release".to_string(),
            reserved_prefix: "Pods".to_string(),
            simulator_profiles: Vec::new(),
        }
    }

    /// Sets the build configuration.
    pub fn configuration(mut self, configuration: impl Into<String>) -> Self {
        self.configuration = configuration.into();
        self
    }

    /// Sets the reserved bundle prefix.
    pub fn reserved_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.reserved_prefix = prefix.into();
        self
    }

    /// Overrides the simulator profile used for `family`.
    pub fn simulator_profile(mut self, family: PlatformFamily, profile: impl Into<String>) -> Self {
        self.simulator_profiles.retain(|(f, _)| *f != family);
        self.simulator_profiles.push((family, profile.into()));
        self
    }

    /// Returns the simulator profile for `family`, falling back to the
    /// family default.
    pub fn profile_for(&self, family: PlatformFamily) -> Option<&str> {
        self.simulator_profiles
            .iter()
            .find(|(f, _)| *f == family)
            .map(|(_, p)| p.as_str())
            .or_else(|| family.pair().map(|pair| pair.default_profile))
    }

    /// Checks the settings before anything touches the filesystem.
    pub fn validate(&self) -> Result<(), RomeError> {
        if self.configuration.trim().is_empty() {
            return Err(RomeError::Config(
                "build configuration must not be empty".to_string(),
            ));
        }
        if self.build_dir.as_os_str().is_empty() || self.destination.as_os_str().is_empty() {
            return Err(RomeError::Config(
                "build_dir and destination must both be set".to_string(),
            ));
        }
        if self.build_dir == self.destination {
            return Err(RomeError::Config(format!(
                "build_dir and destination must differ (both are {})",
                self.build_dir.display()
            )));
        }
        // The build dir is removed at the end of a run, the destination at the start.
        if self.destination.starts_with(&self.build_dir)
            || self.build_dir.starts_with(&self.destination)
        {
            return Err(RomeError::Config(format!(
                "build_dir ({}) and destination ({}) must not be nested in each other",
                self.build_dir.display(),
                self.destination.display()
            )));
        }
        if self.project.file_name().is_none() {
            return Err(RomeError::Config(format!(
                "project path has no file name: {}",
                self.project.display()
            )));
        }
        Ok(())
    }
}
