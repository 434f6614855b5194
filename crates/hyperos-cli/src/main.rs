//! hyperos command line entry point.
//!
//! No hypervisor is linked into this binary. `ensure` provisions or loads a
//! bundle and reports its state; `inspect` prints the configuration a
//! runtime would be handed for an existing bundle.

mod cli;

use clap::Parser;
use cli::{Cli, Command, EnsureCommand, InspectCommand};
use hyperos_core::{BundleManager, ManagerConfig, StaticInstaller};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Summary printed by `ensure`.
#[derive(Debug, Serialize)]
struct BundleSummary {
    bundle: String,
    kind: String,
    dir: String,
    state: String,
    identity: String,
    installer: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr, stdout carries the JSON result
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("hyperos=info".parse()?))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = ManagerConfig::from_env();
    if let Some(root) = cli.root {
        config.root_dir = root;
    }
    tracing::debug!(?config, "Configuration loaded");

    let manager = BundleManager::new(config)?;

    match cli.command {
        Command::Ensure(command) => ensure(&manager, command).await,
        Command::Inspect(command) => inspect(&manager, command).await,
    }
}

async fn ensure(manager: &BundleManager, command: EnsureCommand) -> anyhow::Result<()> {
    let profile = command.machine.profile()?;
    let installer = match command.installer_image() {
        Some(image) => StaticInstaller::new(image),
        None => StaticInstaller::none(),
    };

    let machine = manager.ensure_bundle(profile, &installer).await?;

    let summary = BundleSummary {
        bundle: machine.profile().bundle_name().to_owned(),
        kind: machine.profile().kind().to_string(),
        dir: machine.layout().dir().display().to_string(),
        state: machine.state().to_string(),
        identity: machine.identity().to_string(),
        installer: machine
            .profile()
            .installer()
            .map(|image| image.path.display().to_string()),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn inspect(manager: &BundleManager, command: InspectCommand) -> anyhow::Result<()> {
    let profile = command.machine.profile()?;
    let machine = manager.load(profile).await?;
    let config = machine.configuration(manager.budgeter()).await?;

    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
