use anyhow::{Context, Result};
use clap::Parser;
use cmsi::commands;
use cmsi::config::{Config, DEFAULT_TIMEOUT_SECS, PathOverrides};
use cmsi::domain::model::{PackageDescriptor, PackageKind, PackageVersion};
use cmsi::domain::service::InstallOptions;
use cmsi::runtime::RealRuntime;
use std::path::PathBuf;
use std::time::Duration;

/// cmsi - CMS package installer
///
/// Download and install plugins, themes and core releases into a site.
///
/// Examples:
///   cmsi install akismet                       # Latest akismet plugin
///   cmsi install astra --kind theme --version 4.6.3
///   cmsi install my-theme --kind theme --source https://example.test/my-theme.git
///   cmsi apply packages.json                   # Everything listed in a manifest
#[derive(Parser, Debug)]
#[command(author, version = env!("CMSI_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project base folder (defaults to the current directory; also via CMSI_BASE)
    #[arg(
        long = "base",
        short = 'b',
        env = "CMSI_BASE",
        value_name = "PATH",
        global = true
    )]
    pub base: Option<PathBuf>,

    /// Plugins folder (defaults to <base>/wp-content/plugins)
    #[arg(long = "plugins", value_name = "PATH", global = true)]
    pub plugins: Option<PathBuf>,

    /// Themes folder (defaults to <base>/wp-content/themes)
    #[arg(long = "themes", value_name = "PATH", global = true)]
    pub themes: Option<PathBuf>,

    /// Scratch folder for downloads (defaults to <base>/.cmsi-tmp; also via CMSI_TEMP)
    #[arg(long = "temp", env = "CMSI_TEMP", value_name = "PATH", global = true)]
    pub temp: Option<PathBuf>,

    /// Base URL for plugin and theme downloads (defaults to https://downloads.wordpress.org)
    #[arg(long = "registry-url", value_name = "URL", global = true)]
    pub registry_url: Option<String>,

    /// Base URL for core downloads (defaults to https://wordpress.org)
    #[arg(long = "core-url", value_name = "URL", global = true)]
    pub core_url: Option<String>,

    /// Network timeout in seconds
    #[arg(
        long = "timeout",
        value_name = "SECS",
        default_value_t = DEFAULT_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u64).range(1..),
        global = true
    )]
    pub timeout: u64,

    /// Run build steps for registry packages too
    #[arg(long = "build-all", global = true)]
    pub build_all: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Install a single package
    Install(InstallArgs),

    /// Install every package listed in a JSON manifest
    Apply(ApplyArgs),
}

#[derive(clap::Args, Debug)]
pub struct InstallArgs {
    /// Package name, also the name of its folder
    #[arg(value_name = "NAME")]
    pub name: String,

    /// Version to install
    #[arg(long = "version", value_name = "VERSION", default_value = "latest")]
    pub package_version: PackageVersion,

    /// Package kind: plugin, theme or core
    #[arg(long = "kind", value_name = "KIND", default_value = "plugin")]
    pub kind: PackageKind,

    /// Explicit archive or git URL instead of the registry
    #[arg(long = "source", value_name = "URL")]
    pub source: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ApplyArgs {
    /// Path to the manifest
    #[arg(value_name = "MANIFEST")]
    pub manifest: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let cwd = std::env::current_dir().context("Failed to determine the current directory")?;
    let paths = PathOverrides {
        base: cli.base,
        plugins: cli.plugins,
        themes: cli.themes,
        temp: cli.temp,
    }
    .resolve(&cwd)?;
    let config = Config::new(
        RealRuntime,
        cli.registry_url,
        cli.core_url,
        Duration::from_secs(cli.timeout),
        InstallOptions {
            build_registry_packages: cli.build_all,
        },
    )?;

    match cli.command {
        Commands::Install(args) => {
            let descriptor =
                PackageDescriptor::new(args.name, args.package_version, args.source, args.kind)?;
            commands::install(config, paths, descriptor).await?
        }
        Commands::Apply(args) => commands::apply(config, paths, &args.manifest).await?,
    }
    Ok(())
}
