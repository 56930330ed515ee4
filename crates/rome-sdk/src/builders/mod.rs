//! Build automation for Apple platforms.
//!
//! ## Overview
//!
//! A target is built once per SDK of its platform family:
//!
//! | Family | Device SDK | Simulator SDK |
//! |--------|------------|---------------|
//! | `ios` | `iphoneos` | `iphonesimulator` |
//! | `tvos` | `appletvos` | `appletvsimulator` |
//! | `watchos` | `watchos` | `watchsimulator` |
//! | `osx` | `macosx` | - |
//!
//! Simulator builds target an installed simulator chosen by [`simctl`], so
//! the deployment target only has to be a lower bound on its runtime.
//!
//! ## Common Utilities
//!
//! The [`common`] module provides the process runner used by both the
//! builder and the binary merger:
//!
//! - [`ProcessExecutor`] - pluggable process execution, faked in tests
//! - [`run_checked`] - consistent failure messages carrying captured output
//!
//! ## Example
//!
//! ```ignore
//! use rome_sdk::builders::{SystemExecutor, XcodeBuilder};
//! use rome_sdk::{BuildSettings, PlatformFamily};
//!
//! let settings = BuildSettings::new("Pods/Pods.xcodeproj", "build", "Rome");
//! let builder = XcodeBuilder::new(&SystemExecutor, &settings);
//! builder.build(&target, PlatformFamily::Ios)?;
//! # Ok::<(), rome_sdk::RomeError>(())
//! ```

pub mod common;
pub mod simctl;
pub mod xcode;

pub use common::{Invocation, ProcessExecutor, ProcessOutput, SystemExecutor, run_checked};
pub use xcode::XcodeBuilder;
