//! Target metadata supplied by the host dependency tool.
//!
//! The orchestrator only needs three things from the host: the build
//! targets, the component specs of each target, and the prebuilt binaries
//! each spec vendors. [`ProjectMetadata`] is that narrow interface;
//! [`ManifestMetadata`] implements it over a JSON manifest written by the
//! host tool next to the generated project.
//!
//! ## Manifest Format
//!
//! ```json
//! {
//!   "targets": [
//!     {
//!       "name": "Pods-App",
//!       "platform": "ios",
//!       "deployment_target": "9.0",
//!       "specs": [
//!         { "name": "Alamofire" },
//!         { "name": "Firebase/Core", "module_name": "Firebase",
//!           "vendored_frameworks": ["Frameworks/FirebaseCore.framework"] }
//!       ]
//!     }
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::{BuildTarget, ComponentSpec, RomeError};

/// Read-only view of the host project.
pub trait ProjectMetadata {
    /// All umbrella targets, in host order.
    fn targets(&self) -> Vec<BuildTarget>;

    /// Component specs of `target`, in declaration order.
    fn specs(&self, target: &BuildTarget) -> Vec<ComponentSpec> {
        target.specs.clone()
    }

    /// Prebuilt libraries and frameworks shipped with `spec` inside `target`.
    fn vendored_artifacts(&self, target: &BuildTarget, spec: &ComponentSpec) -> Vec<PathBuf>;
}

/// Root of the manifest document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub targets: Vec<TargetEntry>,
}

/// One umbrella target in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetEntry {
    pub name: String,
    /// Scheme to build; defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub platform: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_target: Option<String>,
    #[serde(default)]
    pub specs: Vec<SpecEntry>,
}

/// One spec (or subspec) in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecEntry {
    /// Full spec name, e.g. `Firebase/Core`.
    pub name: String,
    /// Module name of the root spec; derived from the root name if absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_name: Option<String>,
    /// Static libraries, relative to the pod directory.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vendored_libraries: Vec<PathBuf>,
    /// Framework bundles, relative to the pod directory.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vendored_frameworks: Vec<PathBuf>,
}

impl SpecEntry {
    /// Name of the root spec (`Firebase` for `Firebase/Core`).
    pub fn root_name(&self) -> &str {
        self.name.split('/').next().unwrap_or(&self.name)
    }

    pub fn component(&self) -> ComponentSpec {
        let root = self.root_name();
        let module = self
            .module_name
            .clone()
            .unwrap_or_else(|| module_name_for(root));
        ComponentSpec::new(root, module)
    }
}

/// Derives a C99 identifier from a spec name, the way the host tool
/// names modules by default (`ReactiveObjC-iOS` becomes `ReactiveObjC_iOS`).
///
/// # Example
///
/// ```
/// use rome_sdk::metadata::module_name_for;
///
/// assert_eq!(module_name_for("ReactiveObjC-iOS"), "ReactiveObjC_iOS");
/// assert_eq!(module_name_for("1PasswordExtension"), "_1PasswordExtension");
/// ```
pub fn module_name_for(name: &str) -> String {
    let mut module: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if module.starts_with(|c: char| c.is_ascii_digit()) {
        module.insert(0, '_');
    }
    module
}

impl Manifest {
    /// Parses and validates a manifest from JSON.
    pub fn from_json(contents: &str) -> Result<Self, RomeError> {
        let manifest: Manifest = serde_json::from_str(contents)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Reads a manifest from `path`.
    pub fn load(path: &Path) -> Result<Self, RomeError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RomeError::io(format!("reading manifest {}", path.display()), e))?;
        Self::from_json(&contents)
    }

    fn validate(&self) -> Result<(), RomeError> {
        for (index, target) in self.targets.iter().enumerate() {
            if target.name.trim().is_empty() {
                return Err(RomeError::Manifest(format!(
                    "target #{} has an empty name",
                    index + 1
                )));
            }
            if let Some(spec) = target.specs.iter().find(|s| s.root_name().is_empty()) {
                return Err(RomeError::Manifest(format!(
                    "target '{}' has a spec with an empty root name: '{}'",
                    target.name, spec.name
                )));
            }
        }
        Ok(())
    }

    fn target(&self, name: &str) -> Option<&TargetEntry> {
        self.targets.iter().find(|t| t.name == name)
    }
}

impl TargetEntry {
    pub fn to_target(&self) -> BuildTarget {
        BuildTarget {
            name: self.name.clone(),
            label: self.label.clone().unwrap_or_else(|| self.name.clone()),
            platform: self.platform.clone(),
            deployment_target: self.deployment_target.clone(),
            specs: self.specs.iter().map(SpecEntry::component).collect(),
        }
    }
}

/// [`ProjectMetadata`] backed by a [`Manifest`].
///
/// Vendored paths are resolved against `{pods_root}/{root_name}/` unless
/// they are absolute.
#[derive(Debug, Clone)]
pub struct ManifestMetadata {
    manifest: Manifest,
    pods_root: PathBuf,
}

impl ManifestMetadata {
    pub fn new(manifest: Manifest, pods_root: impl Into<PathBuf>) -> Self {
        Self {
            manifest,
            pods_root: pods_root.into(),
        }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn pod_dir(&self, root_name: &str) -> PathBuf {
        self.pods_root.join(root_name)
    }
}

impl ProjectMetadata for ManifestMetadata {
    fn targets(&self) -> Vec<BuildTarget> {
        self.manifest
            .targets
            .iter()
            .map(TargetEntry::to_target)
            .collect()
    }

    fn vendored_artifacts(&self, target: &BuildTarget, spec: &ComponentSpec) -> Vec<PathBuf> {
        let Some(entry) = self.manifest.target(&target.name) else {
            return Vec::new();
        };
        let pod_dir = self.pod_dir(&spec.root_name);

        entry
            .specs
            .iter()
            .filter(|s| s.component() == *spec)
            .flat_map(|s| s.vendored_libraries.iter().chain(&s.vendored_frameworks))
            .map(|path| {
                if path.is_absolute() {
                    path.clone()
                } else {
                    pod_dir.join(path)
                }
            })
            .collect()
    }
}
