//! End-to-end run: build every target, merge, and collect the results.
//!
//! A run goes through these phases, strictly one after the other:
//!
//! 1. **Reset** - the build directory is removed; `xcodebuild` recreates it
//! 2. **Build** - each target with specs is built per SDK ([`XcodeBuilder`])
//!    and, for device/simulator families, merged ([`BinaryMerger`])
//! 3. **Check** - the build directory must exist afterwards
//! 4. **Collect** - framework bundles in the build tree plus vendored
//!    artifacts, minus the host tool's own frameworks, deduplicated
//! 5. **Copy** - the destination is recreated and every artifact copied in
//! 6. **Cleanup** - the build directory is removed
//!
//! Any fatal error aborts the run immediately; there is no partial-output
//! guarantee.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::builders::common::ProcessExecutor;
use crate::builders::xcode::XcodeBuilder;
use crate::fs::{FileSystem, FsOp, Journal};
use crate::locator::FRAMEWORK_EXTENSION;
use crate::merge::{BinaryMerger, MergeReport};
use crate::metadata::ProjectMetadata;
use crate::types::{BuildSettings, BuildTarget, PlatformFamily, RomeError};

/// Summary of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Names of the targets that were built.
    pub built: Vec<String>,
    /// Merge outcome per merged target.
    pub merges: Vec<(String, MergeReport)>,
    /// Artifacts copied to the destination, in copy order.
    pub artifacts: Vec<PathBuf>,
    /// Filesystem operations applied by the run, in order.
    pub ops: Vec<FsOp>,
}

impl RunReport {
    /// Number of specs whose `lipo` step produced no output.
    pub fn merge_failures(&self) -> usize {
        self.merges.iter().map(|(_, m)| m.failed.len()).sum()
    }
}

/// Drives a complete build-merge-copy run.
///
/// # Example
///
/// ```ignore
/// use rome_sdk::{BuildSettings, LocalFs, Orchestrator, SystemExecutor};
/// use rome_sdk::metadata::{Manifest, ManifestMetadata};
///
/// let settings = BuildSettings::new("Pods/Pods.xcodeproj", "build", "Rome");
/// let manifest = Manifest::load("Pods/rome-manifest.json".as_ref())?;
/// let metadata = ManifestMetadata::new(manifest, "Pods");
///
/// let report = Orchestrator::new(&SystemExecutor, &LocalFs, &settings).run(&metadata)?;
/// println!("Copied {} artifacts", report.artifacts.len());
/// # Ok::<(), rome_sdk::RomeError>(())
/// ```
pub struct Orchestrator<'a> {
    executor: &'a dyn ProcessExecutor,
    fs: &'a dyn FileSystem,
    settings: &'a BuildSettings,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        executor: &'a dyn ProcessExecutor,
        fs: &'a dyn FileSystem,
        settings: &'a BuildSettings,
    ) -> Self {
        Self {
            executor,
            fs,
            settings,
        }
    }

    /// Runs all phases for the targets `metadata` reports.
    pub fn run(&self, metadata: &dyn ProjectMetadata) -> Result<RunReport, RomeError> {
        self.settings.validate()?;

        let targets = buildable_targets(metadata)?;
        let mut journal = Journal::new(self.fs);
        let mut report = RunReport::default();
        let build_dir = &self.settings.build_dir;

        info!("Building frameworks");
        if self.fs.is_dir(build_dir) {
            journal.apply(FsOp::RemoveDirAll(build_dir.clone()))?;
        }

        for (target, family) in &targets {
            let merge = self.build_target(&mut journal, target, *family)?;
            report.built.push(target.name.clone());
            if let Some(merge) = merge {
                report.merges.push((target.name.clone(), merge));
            }
        }

        if !self.fs.is_dir(build_dir) {
            return Err(RomeError::MissingBuildDirectory(build_dir.clone()));
        }

        let built = self.built_frameworks()?;
        info!("Built {}", pluralize(built.len(), "framework"));

        let destination = &self.settings.destination;
        if self.fs.is_dir(destination) {
            journal.apply(FsOp::RemoveDirAll(destination.clone()))?;
        }
        journal.apply(FsOp::CreateDirAll(destination.clone()))?;

        let mut artifacts = built;
        artifacts.extend(self.vendored_artifacts(metadata));
        let artifacts = dedup(artifacts);

        info!(
            "Copying {} to `{}`",
            pluralize(artifacts.len(), "framework"),
            destination.display()
        );
        for artifact in &artifacts {
            journal.apply(FsOp::CopyInto {
                from: artifact.clone(),
                dir: destination.clone(),
            })?;
        }

        if self.fs.is_dir(build_dir) {
            journal.apply(FsOp::RemoveDirAll(build_dir.clone()))?;
        }

        report.artifacts = artifacts;
        report.ops = journal.into_ops();
        Ok(report)
    }

    fn build_target(
        &self,
        journal: &mut Journal<'_>,
        target: &BuildTarget,
        family: PlatformFamily,
    ) -> Result<Option<MergeReport>, RomeError> {
        XcodeBuilder::new(self.executor, self.settings).build(target, family)?;

        match family.pair() {
            Some(pair) => {
                let merger = BinaryMerger::new(self.executor, self.fs, self.settings);
                merger
                    .merge_into(journal, target, pair.device_sdk, pair.simulator_sdk)
                    .map(Some)
            }
            None => Ok(None),
        }
    }

    /// Framework bundles in the build tree, excluding the host tool's own.
    fn built_frameworks(&self) -> Result<Vec<PathBuf>, RomeError> {
        let bundles = self
            .fs
            .find_bundles(&self.settings.build_dir, FRAMEWORK_EXTENSION)?;
        Ok(bundles
            .into_iter()
            .filter(|bundle| {
                let reserved = is_reserved(bundle, &self.settings.reserved_prefix);
                if reserved {
                    debug!(bundle = %bundle.display(), "skipping host tool framework");
                }
                !reserved
            })
            .collect())
    }

    /// Existing vendored libraries and frameworks of every spec of every target.
    fn vendored_artifacts(&self, metadata: &dyn ProjectMetadata) -> Vec<PathBuf> {
        let mut vendored = Vec::new();
        for target in metadata.targets() {
            for spec in metadata.specs(&target) {
                for path in metadata.vendored_artifacts(&target, &spec) {
                    if self.fs.exists(&path) {
                        vendored.push(path);
                    } else {
                        warn!(
                            spec = %spec.root_name,
                            path = %path.display(),
                            "vendored artifact not found, skipping"
                        );
                    }
                }
            }
        }
        vendored
    }
}

/// Targets that have specs, paired with their parsed platform family.
///
/// Fails on the first unknown family before anything is built.
fn buildable_targets(
    metadata: &dyn ProjectMetadata,
) -> Result<Vec<(BuildTarget, PlatformFamily)>, RomeError> {
    metadata
        .targets()
        .into_iter()
        .filter_map(|mut target| {
            let specs = metadata.specs(&target);
            if specs.is_empty() {
                debug!(target = %target.name, "no specs, skipping");
                return None;
            }
            target.specs = specs;
            Some(target.family().map(|family| (target, family)))
        })
        .collect()
}

/// Whether `bundle` is one of the host tool's own frameworks
/// (`Pods.framework`, `Pods_App.framework`, ...).
pub fn is_reserved(bundle: &Path, prefix: &str) -> bool {
    !prefix.is_empty()
        && bundle
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.starts_with(prefix))
}

/// Removes repeated paths, keeping the first occurrence.
pub fn dedup(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

fn pluralize(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{} {}", count, noun)
    } else {
        format!("{} {}s", count, noun)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_reserved() {
        assert!(is_reserved(Path::new("/b/Release-iphoneos/Pods_App/Pods_App.framework"), "Pods"));
        assert!(is_reserved(Path::new("/b/Pods.framework"), "Pods"));
        assert!(!is_reserved(Path::new("/b/Alamofire.framework"), "Pods"));
        assert!(!is_reserved(Path::new("/b/Pods.framework"), ""));
    }

    #[test]
    fn test_dedup_keeps_first() {
        let paths = vec![
            PathBuf::from("/b/A.framework"),
            PathBuf::from("/p/libB.a"),
            PathBuf::from("/b/A.framework"),
        ];
        assert_eq!(
            dedup(paths),
            vec![PathBuf::from("/b/A.framework"), PathBuf::from("/p/libB.a")]
        );
    }

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize(0, "framework"), "0 frameworks");
        assert_eq!(pluralize(1, "framework"), "1 framework");
        assert_eq!(pluralize(3, "framework"), "3 frameworks");
    }
}
