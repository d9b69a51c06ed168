//! monswitch command-line entry point.
//!
//! ```text
//! monswitch [--config <path>] run                 switch inputs on trigger-device changes
//! monswitch [--config <path>] list                print monitors and their inputs
//! monswitch generate-config [--output <path>]     suggest a config for this desk
//! ```
//!
//! Logging goes to stderr through `tracing-subscriber`.  The level comes from
//! the config's `log_level` and is overridden by `RUST_LOG`.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use monswitch::application::dispatch::{BackgroundTask, SharedConfig};
use monswitch::application::generate_config::{generate_config, inspect_monitors};
use monswitch::infrastructure::device_notifications::DeviceNotificationSource;
use monswitch::infrastructure::display_api::DisplayApi;
use monswitch::infrastructure::storage::config::{self, SwitchConfig, TriggerDevice};

#[derive(Debug, Parser)]
#[command(
    name = "monswitch",
    about = "Switches monitor inputs over DDC/CI when a USB device connects or disconnects",
    version
)]
struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true, env = "MONSWITCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Watch the trigger device and switch monitor inputs until Ctrl-C.
    Run,
    /// Print every monitor's identity and input data.
    List,
    /// Print (or write) a configuration suggested for the connected monitors.
    GenerateConfig {
        /// Write the configuration here instead of printing it.
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Device class to watch in the generated configuration.
        #[arg(long, value_enum, default_value_t = TriggerArg::Keyboard)]
        trigger: TriggerArg,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TriggerArg {
    Keyboard,
    Mouse,
}

impl From<TriggerArg> for TriggerDevice {
    fn from(arg: TriggerArg) -> Self {
        match arg {
            TriggerArg::Keyboard => TriggerDevice::Keyboard,
            TriggerArg::Mouse => TriggerDevice::Mouse,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let loaded = config::load_config(cli.config.as_deref());

    let log_level = loaded.as_ref().map_or("info", |c| c.log_level.as_str());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Run => {
            let config = loaded.context("failed to load configuration")?;
            run(config).await
        }
        Command::List => list().await,
        Command::GenerateConfig { output, trigger } => generate(output, trigger.into()).await,
    }
}

async fn run(config: SwitchConfig) -> anyhow::Result<()> {
    let (display_api, notifications) = native_backends()?;
    if config.monitors.is_empty() {
        warn!("no monitor rules configured; notifications will have no effect");
    }
    info!(rules = config.monitors.len(), trigger = %config.trigger_device, "monswitch starting");

    let mut task = BackgroundTask::new(
        display_api,
        notifications,
        SharedConfig::new(config),
        Arc::new(AtomicBool::new(true)),
    );
    task.restart().await;

    info!("monswitch ready.  Press Ctrl-C to exit.");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutdown signal received");

    task.shutdown().await;
    info!("monswitch stopped");
    Ok(())
}

async fn list() -> anyhow::Result<()> {
    let (display_api, _) = native_backends()?;
    let reports = tokio::task::spawn_blocking(move || inspect_monitors(&display_api))
        .await?
        .context("failed to enumerate monitors")?;

    if reports.is_empty() {
        println!("no DDC/CI-capable monitors found");
    }
    for (index, report) in reports.iter().enumerate() {
        println!("monitor #{index}");
        println!("  device:        {}", report.identity.device);
        println!("  description:   {}", report.identity.description);
        println!("  adapter:       {}", report.identity.adapter.as_deref().unwrap_or("-"));
        println!("  serial number: {}", report.identity.serial_number.as_deref().unwrap_or("-"));
        match &report.inputs {
            Some(inputs) => {
                let valid: Vec<String> = inputs.valid_inputs.iter().map(|i| format!("{i:#04x}")).collect();
                println!("  inputs:        {}", valid.join(" "));
                println!("  selected:      {:#04x}", inputs.selected_input);
            }
            None => println!("  inputs:        unavailable"),
        }
    }
    Ok(())
}

async fn generate(output: Option<PathBuf>, trigger: TriggerDevice) -> anyhow::Result<()> {
    let (display_api, _) = native_backends()?;
    let generated = tokio::task::spawn_blocking(move || generate_config(&display_api, trigger))
        .await?
        .context("failed to enumerate monitors")?;

    match output {
        Some(path) => {
            config::save_config(&generated, &path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(rules = generated.monitors.len(), "configuration written to {}", path.display());
        }
        None => print!("{}", config::to_toml(&generated)?),
    }
    Ok(())
}

type Backends = (Arc<dyn DisplayApi>, Arc<dyn DeviceNotificationSource>);

#[cfg(target_os = "windows")]
fn native_backends() -> anyhow::Result<Backends> {
    use monswitch::infrastructure::device_notifications::NativeDeviceNotifications;
    use monswitch::infrastructure::display_api::NativeDisplayApi;

    Ok((Arc::new(NativeDisplayApi::new()), Arc::new(NativeDeviceNotifications::new())))
}

#[cfg(not(target_os = "windows"))]
fn native_backends() -> anyhow::Result<Backends> {
    anyhow::bail!("monswitch needs the Windows DDC/CI and device notification APIs; this platform is not supported")
}
