//! xcodebuild automation
//!
//! Builds one target for one platform family: device SDK then simulator SDK
//! for iOS, tvOS, and watchOS, or a single `macosx` build for macOS.

use tracing::info;

use super::common::{Invocation, ProcessExecutor, project_dir, run_checked};
use super::simctl::resolve_destination;
use crate::types::{BuildSettings, BuildTarget, PlatformFamily, RomeError};

/// SDK used for desktop builds.
pub const MACOSX_SDK: &str = "macosx";

/// Drives `xcodebuild` for a single target.
pub struct XcodeBuilder<'a> {
    executor: &'a dyn ProcessExecutor,
    settings: &'a BuildSettings,
}

impl<'a> XcodeBuilder<'a> {
    /// Creates a new builder
    ///
    /// # Arguments
    ///
    /// * `executor` - Runs the `xcodebuild` processes
    /// * `settings` - Project path and build configuration to use
    pub fn new(executor: &'a dyn ProcessExecutor, settings: &'a BuildSettings) -> Self {
        Self { executor, settings }
    }

    /// Builds `target` for every SDK of `family`.
    ///
    /// Device and simulator builds run one after the other; the first
    /// failing build aborts with its captured output.
    pub fn build(&self, target: &BuildTarget, family: PlatformFamily) -> Result<(), RomeError> {
        if target.specs.is_empty() {
            return Err(RomeError::Config(format!(
                "target '{}' has no component specs to build",
                target.name
            )));
        }

        match family.pair() {
            Some(pair) => {
                info!(target = %target.name, sdk = pair.device_sdk, "Building");
                self.build_sdk(target, pair.device_sdk, None)?;
                info!(target = %target.name, sdk = pair.simulator_sdk, "Building");
                self.build_sdk(target, pair.simulator_sdk, Some(family))?;
            }
            None => {
                info!(target = %target.name, sdk = MACOSX_SDK, "Building");
                self.build_sdk(target, MACOSX_SDK, None)?;
            }
        }
        Ok(())
    }

    /// Runs one `xcodebuild` for `target` with `sdk`.
    ///
    /// `simulator` is the family whose simulator destination to add, or
    /// `None` for device and desktop builds.
    pub fn build_sdk(
        &self,
        target: &BuildTarget,
        sdk: &str,
        simulator: Option<PlatformFamily>,
    ) -> Result<(), RomeError> {
        let invocation = self.invocation(target, sdk, simulator);
        run_checked(
            self.executor,
            &invocation,
            &format!("xcodebuild ({} for {})", target.label, sdk),
        )?;
        Ok(())
    }

    /// Builds the `xcodebuild` command line without running it.
    pub fn invocation(
        &self,
        target: &BuildTarget,
        sdk: &str,
        simulator: Option<PlatformFamily>,
    ) -> Invocation {
        // Runs from the project's directory, so only the file name is passed.
        let project_name = self
            .settings
            .project
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| self.settings.project.clone().into_os_string());

        let mut invocation = Invocation::new("xcodebuild")
            .arg("-project")
            .arg(project_name)
            .args(["-scheme", target.label.as_str()])
            .args(["-configuration", self.settings.configuration.as_str()])
            .args(["-sdk", sdk])
            .current_dir(project_dir(&self.settings.project));

        let deployment_target = target.deployment_target.as_deref();
        if let Some(family) = simulator
            && let Some(destination) = self.destination(family, deployment_target)
        {
            invocation = invocation.arg("-destination").arg(destination);
        }
        invocation
    }

    /// Destination specifier for the simulator of `family`.
    fn destination(
        &self,
        family: PlatformFamily,
        deployment_target: Option<&str>,
    ) -> Option<String> {
        let pair = family.pair()?;
        let profile = self.settings.profile_for(family)?;
        Some(resolve_destination(self.executor, &pair, profile, deployment_target))
    }
}
