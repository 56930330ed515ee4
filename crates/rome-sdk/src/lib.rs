//! Prebuilt frameworks for CocoaPods-style projects
//!
//! `rome-sdk` builds every umbrella target of a generated Xcode project for
//! its device and simulator SDKs, merges the two builds of each framework
//! into one universal binary with `lipo`, and collects the frameworks (plus
//! any prebuilt binaries the pods vendor) into a single flat directory.
//!
//! # Architecture
//!
//! - **Metadata** ([`metadata`]): targets, specs, and vendored binaries from
//!   the host dependency tool
//! - **Builders** ([`builders`]): `xcodebuild` invocation per SDK
//! - **Locator** ([`locator`]): where `xcodebuild` puts each framework
//! - **Merger** ([`merge`]): `lipo` plus relocation of the merged framework
//! - **Filesystem** ([`fs`]): explicit operations, real or in memory
//! - **Orchestrator** ([`orchestrator`]): runs all of the above in order
//!
//! # Example
//!
//! ```ignore
//! use rome_sdk::metadata::{Manifest, ManifestMetadata};
//! use rome_sdk::{BuildSettings, LocalFs, Orchestrator, SystemExecutor};
//!
//! fn main() -> Result<(), rome_sdk::RomeError> {
//!     let settings = BuildSettings::new("Pods/Pods.xcodeproj", "build", "Rome");
//!     let manifest = Manifest::load("Pods/rome-manifest.json".as_ref())?;
//!     let metadata = ManifestMetadata::new(manifest, "Pods");
//!
//!     let report = Orchestrator::new(&SystemExecutor, &LocalFs, &settings).run(&metadata)?;
//!     println!("Built targets: {:?}", report.built);
//!     Ok(())
//! }
//! ```

pub mod builders;
pub mod fs;
pub mod locator;
pub mod merge;
pub mod metadata;
pub mod orchestrator;
pub mod types;

// Re-export key types for convenience
pub use builders::{Invocation, ProcessExecutor, ProcessOutput, SystemExecutor, XcodeBuilder};
pub use fs::{FileSystem, FsOp, LocalFs, MemoryFs};
pub use merge::{BinaryMerger, MergeReport};
pub use metadata::{Manifest, ManifestMetadata, ProjectMetadata};
pub use orchestrator::{Orchestrator, RunReport};
pub use types::{BuildSettings, BuildTarget, ComponentSpec, PlatformFamily, PlatformPair, RomeError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
