//! Build tree path computation.
//!
//! `xcodebuild` writes each framework to
//! `{build_dir}/{configuration}-{sdk}/{root_name}/{module_name}.framework/{module_name}`.
//! Nothing here touches the filesystem.

use std::path::{Path, PathBuf};

/// File extension of framework bundles.
pub const FRAMEWORK_EXTENSION: &str = "framework";

/// Directory `xcodebuild` uses for one configuration/SDK combination.
///
/// macOS builds have no SDK suffix, so `sdk = None` yields `{build_dir}/{configuration}`.
pub fn products_dir(build_dir: &Path, configuration: &str, sdk: Option<&str>) -> PathBuf {
    match sdk {
        Some(sdk) => build_dir.join(format!("{}-{}", configuration, sdk)),
        None => build_dir.join(configuration),
    }
}

/// Path of the framework binary built for `(root_name, module_name)` with `sdk`.
///
/// # Example
///
/// ```
/// use rome_sdk::locator::artifact_path;
/// use std::path::Path;
///
/// let path = artifact_path(Path::new("build"), "Release", "iphoneos", "Core", "Core");
/// assert_eq!(path, Path::new("build/Release-iphoneos/Core/Core.framework/Core"));
/// ```
pub fn artifact_path(
    build_dir: &Path,
    configuration: &str,
    sdk: &str,
    root_name: &str,
    module_name: &str,
) -> PathBuf {
    products_dir(build_dir, configuration, Some(sdk))
        .join(root_name)
        .join(bundle_name(module_name))
        .join(module_name)
}

/// `{module_name}.framework`
pub fn bundle_name(module_name: &str) -> String {
    format!("{}.{}", module_name, FRAMEWORK_EXTENSION)
}
