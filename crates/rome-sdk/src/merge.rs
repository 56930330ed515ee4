//! Universal framework creation.
//!
//! After a target has been built for both its device and simulator SDK, each
//! of its frameworks exists twice in the build tree. [`BinaryMerger`] combines
//! the two binaries with `lipo -create`, puts the result back into the device
//! framework, and lifts that framework to the top of the build directory:
//!
//! ```text
//! build/Release-iphoneos/Core/Core.framework/Core       ─┐
//! build/Release-iphonesimulator/Core/Core.framework/Core ─┴─ lipo
//!   ─▶ build/Core.framework/Core
//! ```
//!
//! The simulator copy of the framework is removed afterwards, leaving one
//! framework per spec. Specs that produced no binary for one of the SDKs are
//! skipped. A `lipo` run that leaves no output is logged and does not stop
//! the run; the device framework is lifted unchanged in that case.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::builders::common::{Invocation, ProcessExecutor};
use crate::fs::{FileSystem, FsOp, Journal};
use crate::locator::{artifact_path, bundle_name};
use crate::types::{BuildSettings, BuildTarget, ComponentSpec, RomeError};

/// Outcome of merging one target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Specs whose framework now holds a universal binary in the build directory.
    pub merged: Vec<ComponentSpec>,
    /// Specs missing the device or simulator binary.
    pub skipped: Vec<ComponentSpec>,
    /// Specs where `lipo` produced no output, with its captured log. Their
    /// device-only framework is still lifted into the build directory.
    pub failed: Vec<(ComponentSpec, String)>,
    /// Filesystem operations applied, in order.
    pub ops: Vec<FsOp>,
}

/// Merges device and simulator frameworks into universal ones.
pub struct BinaryMerger<'a> {
    executor: &'a dyn ProcessExecutor,
    fs: &'a dyn FileSystem,
    settings: &'a BuildSettings,
}

impl<'a> BinaryMerger<'a> {
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

    /// Merges every framework of `target` built for `device_sdk` and `simulator_sdk`.
    pub fn merge(
        &self,
        target: &BuildTarget,
        device_sdk: &str,
        simulator_sdk: &str,
    ) -> Result<MergeReport, RomeError> {
        let mut journal = Journal::new(self.fs);
        self.merge_into(&mut journal, target, device_sdk, simulator_sdk)
    }

    /// Like [`BinaryMerger::merge`], recording operations in an existing journal.
    pub fn merge_into(
        &self,
        journal: &mut Journal<'_>,
        target: &BuildTarget,
        device_sdk: &str,
        simulator_sdk: &str,
    ) -> Result<MergeReport, RomeError> {
        let start = journal.ops().len();
        let mut report = MergeReport::default();

        for spec in distinct_specs(&target.specs) {
            match self.merge_spec(journal, &spec, device_sdk, simulator_sdk)? {
                SpecOutcome::Merged => report.merged.push(spec),
                SpecOutcome::Skipped => report.skipped.push(spec),
                SpecOutcome::NoOutput(log) => report.failed.push((spec, log)),
            }
        }

        info!(
            target = %target.name,
            merged = report.merged.len(),
            skipped = report.skipped.len(),
            "Merged frameworks"
        );
        report.ops = journal.ops()[start..].to_vec();
        Ok(report)
    }

    fn merge_spec(
        &self,
        journal: &mut Journal<'_>,
        spec: &ComponentSpec,
        device_sdk: &str,
        simulator_sdk: &str,
    ) -> Result<SpecOutcome, RomeError> {
        let build_dir = &self.settings.build_dir;
        let configuration = &self.settings.configuration;
        let device_lib = artifact_path(
            build_dir,
            configuration,
            device_sdk,
            &spec.root_name,
            &spec.module_name,
        );
        let simulator_lib = artifact_path(
            build_dir,
            configuration,
            simulator_sdk,
            &spec.root_name,
            &spec.module_name,
        );

        if !(self.fs.is_file(&device_lib) && self.fs.is_file(&simulator_lib)) {
            debug!(
                spec = %spec.root_name,
                module = %spec.module_name,
                "no binary pair to merge"
            );
            return Ok(SpecOutcome::Skipped);
        }

        let executable = build_dir.join(&spec.root_name);
        let invocation = lipo_invocation(&executable, &device_lib, &simulator_lib);
        debug!(command = %invocation, "running lipo");
        let output = self.executor.run(&invocation)?;

        // artifact_path always ends in `{module}.framework/{module}`
        let (Some(device_framework), Some(simulator_framework)) = (
            device_lib.parent().map(Path::to_path_buf),
            simulator_lib.parent().map(Path::to_path_buf),
        ) else {
            return Ok(SpecOutcome::Skipped);
        };

        let outcome = if self.fs.is_file(&executable) {
            journal.apply(FsOp::Move {
                from: executable,
                to: device_lib.clone(),
            })?;
            SpecOutcome::Merged
        } else {
            let log = output.combined();
            warn!(
                module = %spec.module_name,
                "lipo produced no universal binary, keeping the device build:\n{}",
                log
            );
            SpecOutcome::NoOutput(log)
        };

        let flattened = merged_bundle_path(build_dir, &spec.module_name);
        if self.fs.exists(&flattened) {
            // Same-named bundles from different targets: last one wins.
            warn!(bundle = %flattened.display(), "replacing existing framework");
        }
        journal.apply(FsOp::Move {
            from: device_framework,
            to: flattened,
        })?;
        if self.fs.is_file(&simulator_lib) {
            journal.apply(FsOp::RemoveFile(simulator_lib))?;
        }
        // Leftover simulator bundle would otherwise be collected as a second copy.
        if self.fs.is_dir(&simulator_framework) {
            journal.apply(FsOp::RemoveDirAll(simulator_framework))?;
        }
        if self.fs.is_file(&device_lib) {
            journal.apply(FsOp::RemoveFile(device_lib))?;
        }
        Ok(outcome)
    }
}

enum SpecOutcome {
    Merged,
    Skipped,
    NoOutput(String),
}

/// `lipo -create -output <output> <device> <simulator>`
pub fn lipo_invocation(output: &Path, device_lib: &Path, simulator_lib: &Path) -> Invocation {
    Invocation::new("lipo")
        .arg("-create")
        .arg("-output")
        .arg(output)
        .arg(device_lib)
        .arg(simulator_lib)
}

/// Unique `(root_name, module_name)` pairs in first-seen order.
pub fn distinct_specs(specs: &[ComponentSpec]) -> Vec<ComponentSpec> {
    let mut seen = HashSet::new();
    specs
        .iter()
        .filter(|spec| seen.insert((*spec).clone()))
        .cloned()
        .collect()
}

/// Path of the framework for `module_name` once it has been flattened into `build_dir`.
pub fn merged_bundle_path(build_dir: &Path, module_name: &str) -> PathBuf {
    build_dir.join(bundle_name(module_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::common::ProcessOutput;
    use crate::fs::MemoryFs;
    use std::cell::RefCell;

    /// Fakes `lipo` by concatenating its inputs into the output path.
    struct FakeLipo<'f> {
        fs: &'f MemoryFs,
        produce_output: bool,
        calls: RefCell<Vec<Invocation>>,
    }

    impl<'f> FakeLipo<'f> {
        fn new(fs: &'f MemoryFs) -> Self {
            Self {
                fs,
                produce_output: true,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl ProcessExecutor for FakeLipo<'_> {
        fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, RomeError> {
            self.calls.borrow_mut().push(invocation.clone());
            let args = invocation.args_lossy();
            if !self.produce_output {
                return Ok(ProcessOutput::failure(
                    1,
                    format!("fatal error: {} and {} have the same architectures", args[3], args[4]),
                ));
            }
            let mut fat = self.fs.read_file(&args[3]).unwrap_or_default();
            fat.extend(self.fs.read_file(&args[4]).unwrap_or_default());
            self.fs.write_file(&args[2], fat);
            Ok(ProcessOutput::success(""))
        }
    }

    fn settings() -> BuildSettings {
        BuildSettings::new("/p/Pods.xcodeproj", "/b", "/out")
    }

    fn target(specs: Vec<ComponentSpec>) -> BuildTarget {
        BuildTarget {
            name: "Pods-App".to_string(),
            label: "Pods-App".to_string(),
            platform: "ios".to_string(),
            deployment_target: Some("9.0".to_string()),
            specs,
        }
    }

    fn seed(fs: &MemoryFs, sdk: &str, root: &str, module: &str, contents: &str) {
        let lib = artifact_path(Path::new("/b"), "Release", sdk, root, module);
        fs.write_file(&lib, contents);
        fs.write_file(lib.parent().unwrap().join("Info.plist"), sdk);
    }

    #[test]
    fn test_merge_flattens_framework() {
        let fs = MemoryFs::new();
        seed(&fs, "iphoneos", "Core", "Core", "arm64");
        seed(&fs, "iphonesimulator", "Core", "Core", "x86_64");
        let lipo = FakeLipo::new(&fs);
        let settings = settings();
        let merger = BinaryMerger::new(&lipo, &fs, &settings);

        let report = merger
            .merge(
                &target(vec![ComponentSpec::new("Core", "Core")]),
                "iphoneos",
                "iphonesimulator",
            )
            .unwrap();

        assert_eq!(report.merged, vec![ComponentSpec::new("Core", "Core")]);
        assert_eq!(fs.read_file("/b/Core.framework/Core"), Some(b"arm64x86_64".to_vec()));
        assert_eq!(fs.read_file("/b/Core.framework/Info.plist"), Some(b"iphoneos".to_vec()));
        assert!(!fs.exists(Path::new("/b/Release-iphoneos/Core/Core.framework/Core")));
        assert!(!fs.exists(Path::new("/b/Release-iphonesimulator/Core/Core.framework")));
        assert!(!fs.exists(Path::new("/b/Core")));
        assert_eq!(
            report.ops,
            vec![
                FsOp::Move {
                    from: PathBuf::from("/b/Core"),
                    to: PathBuf::from("/b/Release-iphoneos/Core/Core.framework/Core"),
                },
                FsOp::Move {
                    from: PathBuf::from("/b/Release-iphoneos/Core/Core.framework"),
                    to: PathBuf::from("/b/Core.framework"),
                },
                FsOp::RemoveFile(PathBuf::from(
                    "/b/Release-iphonesimulator/Core/Core.framework/Core"
                )),
                FsOp::RemoveDirAll(PathBuf::from(
                    "/b/Release-iphonesimulator/Core/Core.framework"
                )),
            ]
        );

        let args = lipo.calls.borrow()[0].args_lossy();
        assert_eq!(
            args,
            vec![
                "-create",
                "-output",
                "/b/Core",
                "/b/Release-iphoneos/Core/Core.framework/Core",
                "/b/Release-iphonesimulator/Core/Core.framework/Core",
            ]
        );
    }

    #[test]
    fn test_merge_skips_missing_simulator_binary() {
        let fs = MemoryFs::new();
        seed(&fs, "iphoneos", "Resources", "Resources", "arm64");
        let lipo = FakeLipo::new(&fs);
        let settings = settings();
        let merger = BinaryMerger::new(&lipo, &fs, &settings);

        let report = merger
            .merge(
                &target(vec![ComponentSpec::new("Resources", "Resources")]),
                "iphoneos",
                "iphonesimulator",
            )
            .unwrap();

        assert!(report.merged.is_empty());
        assert_eq!(report.skipped.len(), 1);
        assert!(report.ops.is_empty());
        assert!(lipo.calls.borrow().is_empty());
        assert!(fs.is_file(Path::new(
            "/b/Release-iphoneos/Resources/Resources.framework/Resources"
        )));
    }

    #[test]
    fn test_merge_collapses_duplicate_specs() {
        let fs = MemoryFs::new();
        seed(&fs, "appletvos", "Kit", "Kit", "arm64");
        seed(&fs, "appletvsimulator", "Kit", "Kit", "x86_64");
        let lipo = FakeLipo::new(&fs);
        let settings = settings();
        let merger = BinaryMerger::new(&lipo, &fs, &settings);

        let specs = vec![
            ComponentSpec::new("Kit", "Kit"),
            ComponentSpec::new("Kit", "Kit"),
        ];
        let report = merger.merge(&target(specs), "appletvos", "appletvsimulator").unwrap();

        assert_eq!(report.merged.len(), 1);
        assert!(report.skipped.is_empty());
        assert_eq!(lipo.calls.borrow().len(), 1);
    }

    #[test]
    fn test_merge_soft_failure_keeps_going() {
        let fs = MemoryFs::new();
        seed(&fs, "iphoneos", "A", "A", "arm64");
        seed(&fs, "iphonesimulator", "A", "A", "arm64");
        let mut lipo = FakeLipo::new(&fs);
        lipo.produce_output = false;
        let settings = settings();
        let merger = BinaryMerger::new(&lipo, &fs, &settings);

        let report = merger
            .merge(
                &target(vec![ComponentSpec::new("A", "A")]),
                "iphoneos",
                "iphonesimulator",
            )
            .unwrap();

        assert!(report.merged.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].1.contains("same architectures"));
        assert_eq!(
            report.ops,
            vec![
                FsOp::Move {
                    from: PathBuf::from("/b/Release-iphoneos/A/A.framework"),
                    to: PathBuf::from("/b/A.framework"),
                },
                FsOp::RemoveFile(PathBuf::from("/b/Release-iphonesimulator/A/A.framework/A")),
                FsOp::RemoveDirAll(PathBuf::from("/b/Release-iphonesimulator/A/A.framework")),
            ]
        );
        assert_eq!(fs.read_file("/b/A.framework/A"), Some(b"arm64".to_vec()));
        assert!(!fs.exists(Path::new("/b/Release-iphonesimulator/A/A.framework")));
    }

    #[test]
    fn test_merge_rerun_is_noop() {
        let fs = MemoryFs::new();
        seed(&fs, "iphoneos", "Core", "Core", "arm64");
        seed(&fs, "iphonesimulator", "Core", "Core", "x86_64");
        let lipo = FakeLipo::new(&fs);
        let settings = settings();
        let merger = BinaryMerger::new(&lipo, &fs, &settings);
        let t = target(vec![ComponentSpec::new("Core", "Core")]);

        merger.merge(&t, "iphoneos", "iphonesimulator").unwrap();
        let second = merger.merge(&t, "iphoneos", "iphonesimulator").unwrap();

        assert!(second.merged.is_empty());
        assert!(second.ops.is_empty());
        assert_eq!(fs.read_file("/b/Core.framework/Core"), Some(b"arm64x86_64".to_vec()));
    }

    #[test]
    fn test_distinct_specs_keeps_order() {
        let specs = vec![
            ComponentSpec::new("B", "B"),
            ComponentSpec::new("A", "A"),
            ComponentSpec::new("B", "B"),
            ComponentSpec::new("A", "AModule"),
        ];
        assert_eq!(
            distinct_specs(&specs),
            vec![
                ComponentSpec::new("B", "B"),
                ComponentSpec::new("A", "A"),
                ComponentSpec::new("A", "AModule"),
            ]
        );
    }
}
