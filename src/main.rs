//! # Pi RC Boat
//!
//! Drive a twin-thruster RC boat from an Xbox controller on a Raspberry Pi.
//!
//! Usage: `pi-rc-boat [CONFIG.toml]`. Without a path the built-in defaults
//! are used (identical to `config/default.toml`).

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use pi_rc_boat::actuator::{ServoActuator, ThrusterActuator};
use pi_rc_boat::config::{Config, LoggingConfig};
use pi_rc_boat::control::{ControlLoop, LoopExit, Pair};
use pi_rc_boat::controller::xbox::XboxController;
use pi_rc_boat::pwm::gpio::RppalDriver;
use pi_rc_boat::shutdown;

/// Main entry point for the boat
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load the configuration (first argument) or use the defaults
///    - Set up logging to the console and, if configured, a log file
///    - Install the Ctrl+C / SIGTERM handlers, so a signal at any later
///      point still releases the pins
///    - Arm both ESCs and center both servos
///    - Wait for the controller to connect
///
/// 2. **Main Loop**
///    - Map controller events to thruster and servo commands
///    - Handle Ctrl+C / SIGTERM for graceful shutdown
///
/// 3. **Graceful Shutdown**
///    - Stop both thrusters and return the servos to their start angle
///    - Release all PWM channels
///
/// # Errors
///
/// Returns error if:
/// - The configuration file cannot be read or is invalid
/// - A GPIO pin or PWM channel cannot be claimed
/// - No controller shows up within the discovery timeout
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path).with_context(|| format!("Failed to load configuration from {}", path))?,
        None => Config::default(),
    };

    let _log_guard = init_logging(&config.logging)?;
    info!("Pi RC Boat v{} starting...", env!("CARGO_PKG_VERSION"));

    // Signals are handled from here on, so every exit path releases the pins
    let mut shutdown = shutdown::listen().context("Failed to install signal handlers")?;

    let Some(thrusters) = shutdown.guard(arm_thrusters(&config)).await.transpose()? else {
        info!("Shutdown requested while arming, thrusters released");
        return Ok(());
    };
    let servos = Pair::new(
        ServoActuator::new(&config.servo_left, RppalDriver::new()?).context("Failed to set up left servo")?,
        ServoActuator::new(&config.servo_right, RppalDriver::new()?).context("Failed to set up right servo")?,
    );
    let mut control = ControlLoop::new(servos, thrusters, &config);

    let controller = shutdown.guard(XboxController::from_config(&config.controller)).await;
    let mut controller = match controller {
        Some(Ok(controller)) => controller,
        Some(Err(e)) => {
            control.release();
            return Err(e.into());
        }
        None => {
            control.release();
            info!("Shutdown requested while waiting for the controller");
            return Ok(());
        }
    };

    info!("Ready. Press Ctrl+C to exit");
    let exit = control.run(&mut controller, shutdown.requested()).await;
    control.release();

    match exit {
        LoopExit::StreamEnded => warn!("Controller disconnected, boat stopped"),
        LoopExit::Shutdown => info!("Shutdown requested, boat stopped"),
    }
    Ok(())
}

/// Install the tracing subscriber.
///
/// `RUST_LOG` overrides the configured level. The returned guard flushes the
/// log file and must be held until exit.
fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if config.file.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return Ok(None);
    }

    let (dir, file_name) = split_log_path(&config.file)?;
    let (file_writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(std::io::stdout.and(file_writer))
        .init();
    Ok(Some(guard))
}

/// Directory and file name of the log file; a bare name goes to the working directory.
fn split_log_path(path: &str) -> Result<(PathBuf, OsString)> {
    let path = Path::new(path);
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("Log file path {} has no file name", path.display()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, file_name.to_os_string()))
}

/// Arm both ESCs, left first. An ESC already armed is released if the other fails.
async fn arm_thrusters(config: &Config) -> Result<Pair<ThrusterActuator<RppalDriver>>> {
    let left = ThrusterActuator::arm(&config.thruster_left, RppalDriver::new()?)
        .await
        .context("Failed to arm left thruster")?;
    let right = ThrusterActuator::arm(&config.thruster_right, RppalDriver::new()?)
        .await
        .context("Failed to arm right thruster")?;
    Ok(Pair::new(left, right))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_log_path_with_directory() {
        let (dir, name) = split_log_path("/var/log/boat/boat.log").unwrap();
        assert_eq!(dir, PathBuf::from("/var/log/boat"));
        assert_eq!(name, OsString::from("boat.log"));
    }

    #[test]
    fn test_split_log_path_bare_name() {
        let (dir, name) = split_log_path("boat.log").unwrap();
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(name, OsString::from("boat.log"));
    }

    #[test]
    fn test_split_log_path_rejects_directory() {
        assert!(split_log_path("/").is_err());
        assert!(split_log_path("logs/..").is_err());
    }

    #[test]
    fn test_log_file_written_through_appender() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boat.log");
        let (parent, name) = split_log_path(path.to_str().unwrap()).unwrap();
        let appender = tracing_appender::rolling::never(parent, name);
        let (mut writer, guard) = tracing_appender::non_blocking(appender);

        use std::io::Write;
        writer.write_all(b"hello\n").unwrap();
        drop(guard);

        assert_eq!(std::fs::read_to_string(path).unwrap(), "hello\n");
    }
}
