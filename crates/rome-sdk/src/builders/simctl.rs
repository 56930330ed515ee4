//! Simulator destination resolution.
//!
//! `xcodebuild -destination` with `OS=<version>` only matches a runtime of
//! exactly that version, which is rarely installed for old deployment
//! targets. Instead the installed simulators are listed with
//! `xcrun simctl list devices available -j` and the newest one matching the
//! device profile whose runtime is at least the deployment target is chosen
//! by id.
//!
//! ## Device List Format
//!
//! ```json
//! {
//!   "devices": {
//!     "com.apple.CoreSimulator.SimRuntime.iOS-17-2": [
//!       { "udid": "5A1B...", "name": "iPhone 15", "isAvailable": true }
//!     ]
//!   }
//! }
//! ```
//!
//! Older Xcode releases key runtimes as `"iOS 9.3"`; both forms are accepted.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::{debug, warn};

use super::common::{Invocation, ProcessExecutor, run_checked};
use crate::types::{PlatformPair, RomeError};

const RUNTIME_PREFIX: &str = "com.apple.CoreSimulator.SimRuntime.";

/// A dotted OS version such as `9.0` or `17.2.1`.
///
/// Missing trailing components compare as zero, so `9` equals `9.0`.
#[derive(Debug, Clone)]
pub struct OsVersion(Vec<u32>);

impl OsVersion {
    /// Parses `17.2` or `17-2`; `None` if any component is not a number.
    pub fn parse(version: &str) -> Option<Self> {
        let parts = version
            .split(['.', '-'])
            .map(|p| p.trim().parse().ok())
            .collect::<Option<Vec<u32>>>()?;
        if parts.is_empty() {
            None
        } else {
            Some(Self(parts))
        }
    }

    fn component(&self, index: usize) -> u32 {
        self.0.get(index).copied().unwrap_or(0)
    }
}

impl Ord for OsVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        (0..len)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for OsVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for OsVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OsVersion {}

/// One installed simulator device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Simulator {
    pub udid: String,
    pub name: String,
    /// Runtime platform, e.g. `iOS`.
    pub platform: String,
    pub version: OsVersion,
}

#[derive(Debug, Deserialize)]
struct DeviceList {
    #[serde(default)]
    devices: BTreeMap<String, Vec<DeviceEntry>>,
}

#[derive(Debug, Deserialize)]
struct DeviceEntry {
    udid: String,
    name: String,
    #[serde(rename = "isAvailable", default = "available_by_default")]
    is_available: bool,
}

fn available_by_default() -> bool {
    true
}

/// Splits a runtime key into its platform and version.
fn parse_runtime(key: &str) -> Option<(String, OsVersion)> {
    let (platform, version) = match key.strip_prefix(RUNTIME_PREFIX) {
        Some(identifier) => identifier.split_once('-')?,
        None => key.split_once(' ')?,
    };
    Some((platform.to_string(), OsVersion::parse(version)?))
}

/// Parses the JSON printed by `simctl list devices -j`.
///
/// Runtimes whose key cannot be understood are ignored.
pub fn parse_device_list(json: &str) -> Result<Vec<Simulator>, RomeError> {
    let list: DeviceList = serde_json::from_str(json)?;
    let mut simulators = Vec::new();
    for (runtime, devices) in list.devices {
        let Some((platform, version)) = parse_runtime(&runtime) else {
            debug!(runtime = %runtime, "ignoring unrecognised simulator runtime");
            continue;
        };
        simulators.extend(devices.into_iter().filter(|d| d.is_available).map(|d| Simulator {
            udid: d.udid,
            name: d.name,
            platform: platform.clone(),
            version: version.clone(),
        }));
    }
    Ok(simulators)
}

/// Lists the available simulators with `xcrun simctl`.
pub fn list_simulators(executor: &dyn ProcessExecutor) -> Result<Vec<Simulator>, RomeError> {
    let invocation =
        Invocation::new("xcrun").args(["simctl", "list", "devices", "available", "-j"]);
    let output = run_checked(executor, &invocation, "simctl device listing")?;
    parse_device_list(&output.stdout)
}

/// The newest simulator named `profile` on `platform` whose runtime is at
/// least `minimum`.
pub fn select_simulator<'s>(
    simulators: &'s [Simulator],
    platform: &str,
    profile: &str,
    minimum: Option<&OsVersion>,
) -> Option<&'s Simulator> {
    simulators
        .iter()
        .filter(|s| s.platform == platform && s.name == profile)
        .filter(|s| minimum.is_none_or(|min| s.version >= *min))
        .max_by(|a, b| a.version.cmp(&b.version))
}

/// `-destination` value for a simulator build.
///
/// Yields `id=<udid>` for an installed simulator that can run the
/// deployment target, otherwise `platform=<X> Simulator,name=<profile>` and
/// leaves the choice of runtime to `xcodebuild`.
pub fn resolve_destination(
    executor: &dyn ProcessExecutor,
    pair: &PlatformPair,
    profile: &str,
    deployment_target: Option<&str>,
) -> String {
    let minimum = deployment_target.and_then(OsVersion::parse);
    match list_simulators(executor) {
        Ok(simulators) => {
            if let Some(simulator) =
                select_simulator(&simulators, pair.runtime_platform, profile, minimum.as_ref())
            {
                debug!(
                    name = %simulator.name,
                    udid = %simulator.udid,
                    "using installed simulator"
                );
                return format!("id={}", simulator.udid);
            }
            warn!(
                profile,
                deployment_target = deployment_target.unwrap_or("-"),
                "no installed {} simulator matches, letting xcodebuild choose",
                pair.runtime_platform
            );
        }
        Err(e) => warn!(error = %e, "could not list simulators"),
    }
    simulator_destination(pair.simulator_platform, profile)
}

/// Formats a name-based `xcodebuild -destination` value.
///
/// # Example
///
/// ```
/// use rome_sdk::builders::simctl::simulator_destination;
///
/// assert_eq!(
///     simulator_destination("iOS Simulator", "iPhone 5s"),
///     "platform=iOS Simulator,name=iPhone 5s"
/// );
/// ```
pub fn simulator_destination(platform: &str, profile: &str) -> String {
    format!("platform={},name={}", platform, profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::common::ProcessOutput;
    use crate::types::PlatformFamily;

    const DEVICES: &str = r#"{
      "devices": {
        "com.apple.CoreSimulator.SimRuntime.iOS-16-4": [
          { "udid": "IPHONE15-16", "name": "iPhone 15", "isAvailable": true },
          { "udid": "IPHONE5S-16", "name": "iPhone 5s", "isAvailable": true }
        ],
        "com.apple.CoreSimulator.SimRuntime.iOS-17-2": [
          { "udid": "IPHONE15-17", "name": "iPhone 15", "isAvailable": true },
          { "udid": "BROKEN", "name": "iPhone 5s", "isAvailable": false }
        ],
        "com.apple.CoreSimulator.SimRuntime.tvOS-17-2": [
          { "udid": "TV-17", "name": "Apple TV 4K (3rd generation)" }
        ],
        "iOS 9.3": [
          { "udid": "IPHONE5S-9", "name": "iPhone 5s" }
        ],
        "com.apple.CoreSimulator.SimRuntime.xrOS": [
          { "udid": "VISION", "name": "Apple Vision Pro" }
        ]
      }
    }"#;

    struct Simctl(ProcessOutput);

    impl ProcessExecutor for Simctl {
        fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, RomeError> {
            assert_eq!(invocation.program, "xcrun");
            Ok(self.0.clone())
        }
    }

    fn ios() -> PlatformPair {
        PlatformFamily::Ios.pair().unwrap()
    }

    #[test]
    fn test_os_version_ordering() {
        let v = |s| OsVersion::parse(s).unwrap();
        assert_eq!(v("9"), v("9.0"));
        assert!(v("17.2") > v("16.4"));
        assert!(v("10.0") > v("9.3"));
        assert!(v("17-2") == v("17.2"));
        assert!(OsVersion::parse("latest").is_none());
    }

    #[test]
    fn test_parse_device_list() {
        let simulators = parse_device_list(DEVICES).unwrap();

        assert_eq!(simulators.len(), 5);
        assert!(simulators.iter().all(|s| s.udid != "BROKEN" && s.udid != "VISION"));
        let legacy = simulators.iter().find(|s| s.udid == "IPHONE5S-9").unwrap();
        assert_eq!(legacy.platform, "iOS");
        assert_eq!(legacy.version, OsVersion::parse("9.3").unwrap());
    }

    #[test]
    fn test_select_newest_runtime_at_least_deployment_target() {
        let simulators = parse_device_list(DEVICES).unwrap();
        let min = OsVersion::parse("12.0");

        let chosen = select_simulator(&simulators, "iOS", "iPhone 15", min.as_ref()).unwrap();
        assert_eq!(chosen.udid, "IPHONE15-17");

        let chosen = select_simulator(&simulators, "iOS", "iPhone 5s", min.as_ref()).unwrap();
        assert_eq!(chosen.udid, "IPHONE5S-16");

        let min = OsVersion::parse("18.0");
        assert!(select_simulator(&simulators, "iOS", "iPhone 15", min.as_ref()).is_none());
        assert!(select_simulator(&simulators, "tvOS", "iPhone 15", None).is_none());
    }

    #[test]
    fn test_resolve_destination_uses_udid() {
        let executor = Simctl(ProcessOutput::success(DEVICES));

        let destination = resolve_destination(&executor, &ios(), "iPhone 5s", Some("9.0"));

        assert_eq!(destination, "id=IPHONE5S-16");
    }

    #[test]
    fn test_resolve_destination_falls_back_to_name() {
        let executor = Simctl(ProcessOutput::success(DEVICES));
        assert_eq!(
            resolve_destination(&executor, &ios(), "iPhone 5s", Some("18.0")),
            "platform=iOS Simulator,name=iPhone 5s"
        );

        let failing = Simctl(ProcessOutput::failure(72, "xcrun: error: unable to find utility"));
        assert_eq!(
            resolve_destination(&failing, &ios(), "iPhone 15", Some("9.0")),
            "platform=iOS Simulator,name=iPhone 15"
        );

        let garbage = Simctl(ProcessOutput::success("not json"));
        assert_eq!(
            resolve_destination(&garbage, &ios(), "iPhone 15", None),
            "platform=iOS Simulator,name=iPhone 15"
        );
    }
}
