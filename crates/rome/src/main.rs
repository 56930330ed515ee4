use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use rome_sdk::{
    LocalFs, Manifest, ManifestMetadata, Orchestrator, ProjectMetadata, RomeError, RunReport,
    SystemExecutor,
};

use config::{BuildOverrides, CONFIG_FILE_NAME, ConfigResolver, RomeConfig};

mod config;

/// Prebuilds the frameworks of a dependency-managed Xcode project.
#[derive(Parser, Debug)]
#[command(
    name = "rome",
    author,
    version,
    about = "Build universal frameworks for Xcode dependencies",
    long_about = None
)]
struct Cli {
    /// Path to rome.toml (discovered from the current directory if omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build every target, merge device and simulator binaries, and copy the frameworks.
    Build {
        #[arg(long, help = "Target manifest written by the dependency tool")]
        manifest: Option<PathBuf>,
        #[arg(long, help = "Xcode project containing the umbrella targets")]
        project: Option<PathBuf>,
        #[arg(long, help = "Directory containing one directory per pod")]
        pods_root: Option<PathBuf>,
        #[arg(long, help = "Working build directory (removed after the run)")]
        build_dir: Option<PathBuf>,
        #[arg(long, help = "Directory receiving the frameworks")]
        destination: Option<PathBuf>,
        #[arg(long, help = "Xcode build configuration, e.g. Release")]
        configuration: Option<String>,
    },
    /// List the targets and specs the manifest describes.
    List {
        #[arg(long, help = "Target manifest written by the dependency tool")]
        manifest: Option<PathBuf>,
    },
    /// Scaffold a starter rome.toml.
    Init {
        #[arg(long, default_value = CONFIG_FILE_NAME)]
        output: PathBuf,
        #[arg(long, help = "Overwrite an existing file")]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli) {
        match err.downcast_ref::<RomeError>() {
            Some(rome) if rome.is_user_facing() => eprintln!("[!] {}", rome),
            _ => eprintln!("[!] {:#}", err),
        }
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Build {
            manifest,
            project,
            pods_root,
            build_dir,
            destination,
            configuration,
        } => {
            let resolver = ConfigResolver::new(cli.config.as_deref())?;
            if let Some(path) = &resolver.config_path {
                tracing::debug!(config = %path.display(), "loaded configuration");
            }
            let settings = resolver.build_settings(BuildOverrides {
                project,
                build_dir,
                destination,
                configuration,
            });
            let pods_root = resolver.pods_root(pods_root, &settings.project);
            let metadata = load_metadata(&resolver.manifest(manifest), pods_root)?;

            let report = Orchestrator::new(&SystemExecutor, &LocalFs, &settings).run(&metadata)?;
            print_summary(&report, &settings.destination);
        }
        Command::List { manifest } => {
            let resolver = ConfigResolver::new(cli.config.as_deref())?;
            let project = resolver.project(None);
            let pods_root = resolver.pods_root(None, &project);
            let metadata = load_metadata(&resolver.manifest(manifest), pods_root)?;
            print_targets(&metadata);
        }
        Command::Init { output, force } => {
            if output.exists() && !force {
                bail!(
                    "{} already exists; pass --force to overwrite it",
                    output.display()
                );
            }
            std::fs::write(&output, RomeConfig::generate_starter_toml())
                .with_context(|| format!("writing {:?}", output))?;
            println!("Wrote starter config to {}", output.display());
        }
    }
    Ok(())
}

fn load_metadata(manifest: &Path, pods_root: PathBuf) -> Result<ManifestMetadata> {
    let manifest = Manifest::load(manifest)?;
    Ok(ManifestMetadata::new(manifest, pods_root))
}

fn print_summary(report: &RunReport, destination: &Path) {
    println!(
        "Built {} target(s); copied {} artifact(s) to {}",
        report.built.len(),
        report.artifacts.len(),
        destination.display()
    );
    for artifact in &report.artifacts {
        if let Some(name) = artifact.file_name() {
            println!("  {}", name.to_string_lossy());
        }
    }
    let failures = report.merge_failures();
    if failures > 0 {
        println!(
            "{} framework(s) could not be merged; their device build was copied instead",
            failures
        );
    }
}

fn print_targets(metadata: &dyn ProjectMetadata) {
    let targets = metadata.targets();
    if targets.is_empty() {
        println!("No targets in manifest");
        return;
    }
    for target in targets {
        let deployment = target
            .deployment_target
            .as_deref()
            .map(|dt| format!(" {}", dt))
            .unwrap_or_default();
        println!("{} ({}{})", target.name, target.platform, deployment);
        for spec in metadata.specs(&target) {
            println!("  {} -> {}.framework", spec.root_name, spec.module_name);
            for artifact in metadata.vendored_artifacts(&target, &spec) {
                println!("    vendored: {}", artifact.display());
            }
        }
    }
}
