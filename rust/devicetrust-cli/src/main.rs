use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use devicetrust_core::api;
use devicetrust_core::capture::CaptureNotification;
use devicetrust_core::config::default_config_path;
use devicetrust_core::{
    DeviceAssessment, DeviceSnapshot, DeviceTrustConfig, IndicatorTable, IntegrityAssessor,
    Platform,
};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const CONFIG_ENV: &str = "DEVICETRUST_CONFIG";

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Device integrity assessment and capture guard CLI",
    long_about = None
)]
struct Cli {
    /// Configuration file (default: $DEVICETRUST_CONFIG or the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assess device integrity and print the result as JSON
    Assess {
        /// Evaluate facts from a host-collected snapshot instead of this machine
        #[arg(short, long)]
        snapshot: Option<PathBuf>,
        /// Indicator platform: android or ios
        #[arg(short, long)]
        platform: Option<Platform>,
        /// Print the full verdict with matched evidence
        #[arg(short, long)]
        verbose: bool,
    },
    /// Print the effective indicator table
    Indicators {
        /// Indicator platform: android or ios
        #[arg(short, long)]
        platform: Option<Platform>,
    },
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Drive a capture guard from stdin (screenshot, recording-started,
    /// recording-stopped, enable, disable)
    Capture,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(default_config_path)
}

fn load_config(path: &Path, platform: Option<Platform>) -> Result<DeviceTrustConfig> {
    let mut config = DeviceTrustConfig::load_or_default(path)?;
    if platform.is_some() {
        config.platform = platform;
    }
    Ok(config)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let encoded = serde_json::to_string_pretty(value)?;
    println!("{encoded}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let path = config_path(cli.config);

    match cli.command {
        Commands::Assess {
            snapshot,
            platform,
            verbose,
        } => {
            cmd_assess(&path, snapshot, platform, verbose).await?;
        }
        Commands::Indicators { platform } => {
            cmd_indicators(&path, platform)?;
        }
        Commands::Config { action } => {
            cmd_config(&path, action)?;
        }
        Commands::Capture => {
            cmd_capture(&path)?;
        }
    }

    Ok(())
}

// =============================================================================
// Assess Command Implementation
// =============================================================================

async fn cmd_assess(
    config_path: &Path,
    snapshot: Option<PathBuf>,
    platform: Option<Platform>,
    verbose: bool,
) -> Result<()> {
    let config = load_config(config_path, platform)?;

    let assessor = match snapshot {
        Some(file) => {
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read snapshot: {}", file.display()))?;
            let snapshot = DeviceSnapshot::from_json(&raw)
                .with_context(|| format!("Invalid snapshot: {}", file.display()))?;
            IntegrityAssessor::new(Arc::new(snapshot), IndicatorTable::from_config(&config))
        }
        None => IntegrityAssessor::from_config(&config),
    };

    let verdict = assessor
        .spawn_assessment()
        .await
        .map_err(|_| anyhow!("assessment worker exited without a verdict"))?;

    if verbose {
        print_json(&verdict)
    } else {
        print_json(&DeviceAssessment::from(verdict))
    }
}

// =============================================================================
// Indicators & Config Commands
// =============================================================================

fn cmd_indicators(config_path: &Path, platform: Option<Platform>) -> Result<()> {
    let config = load_config(config_path, platform)?;
    print_json(&IndicatorTable::from_config(&config))
}

fn cmd_config(config_path: &Path, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init { force } => {
            if config_path.exists() && !force {
                bail!(
                    "Config already exists at {} (use --force to overwrite)",
                    config_path.display()
                );
            }
            DeviceTrustConfig::default().persist(config_path)?;
            println!("Config written to {}", config_path.display());
        }
        ConfigAction::Show => {
            let config = DeviceTrustConfig::load_or_default(config_path)?;
            println!("# {}", config_path.display());
            print_json(&config)?;
        }
    }
    Ok(())
}

// =============================================================================
// Capture Command Implementation
// =============================================================================

enum CaptureCommand {
    Enable,
    Disable,
    Notify(CaptureNotification),
}

fn parse_capture_command(line: &str) -> Option<CaptureCommand> {
    match line {
        "enable" => Some(CaptureCommand::Enable),
        "disable" => Some(CaptureCommand::Disable),
        "screenshot" => Some(CaptureCommand::Notify(CaptureNotification::ScreenshotDetected)),
        "recording-started" => Some(CaptureCommand::Notify(
            CaptureNotification::CapturedChanged { captured: true },
        )),
        "recording-stopped" => Some(CaptureCommand::Notify(
            CaptureNotification::CapturedChanged { captured: false },
        )),
        _ => None,
    }
}

fn cmd_capture(config_path: &Path) -> Result<()> {
    api::configure(DeviceTrustConfig::load_or_default(config_path)?);
    let (id, mut events) = api::subscribe_capture_events();

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_capture_command(line) {
            Some(CaptureCommand::Enable) => {
                api::set_capture_guard(true);
                writeln!(stdout, "guard: armed")?;
            }
            Some(CaptureCommand::Disable) => {
                api::set_capture_guard(false);
                writeln!(stdout, "guard: disarmed")?;
            }
            Some(CaptureCommand::Notify(notification)) => {
                if !api::forward_capture_notification(notification) {
                    writeln!(stdout, "ignored: {line}")?;
                }
            }
            None => {
                eprintln!("Unknown capture command: {line}");
                continue;
            }
        }

        api::flush_capture_events();
        while let Ok(event) = events.try_recv() {
            writeln!(stdout, "event: {event}")?;
        }
        stdout.flush()?;
    }

    api::set_capture_guard(false);
    api::unsubscribe_capture_events(id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_capture_commands() {
        assert!(matches!(
            parse_capture_command("screenshot"),
            Some(CaptureCommand::Notify(CaptureNotification::ScreenshotDetected))
        ));
        assert!(matches!(
            parse_capture_command("recording-stopped"),
            Some(CaptureCommand::Notify(CaptureNotification::CapturedChanged {
                captured: false
            }))
        ));
        assert!(matches!(parse_capture_command("enable"), Some(CaptureCommand::Enable)));
        assert!(parse_capture_command("SCREENSHOT").is_none());
    }

    #[test]
    fn test_explicit_config_path_wins() {
        let path = config_path(Some(PathBuf::from("/tmp/custom.json")));
        assert_eq!(path, PathBuf::from("/tmp/custom.json"));
    }
}
