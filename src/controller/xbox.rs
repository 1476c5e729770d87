//! # Xbox Controller Module
//!
//! Finds an Xbox Wireless Controller (xpadneo driver) among the Linux input
//! devices and streams its events asynchronously.
//!
//! ## Controller Detection
//!
//! The controller is matched by its evdev device name, by default
//! `"Xbox Wireless Controller"`. Bluetooth controllers may take a while to
//! connect after boot, so discovery polls until a timeout expires.

use std::cmp::Ordering;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use evdev::{Device, EventStream};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::event::ControlEvent;
use super::InputSource;
use crate::config::ControllerConfig;
use crate::error::{BoatError, Result};

/// Xbox controller handle
///
/// Implements [`InputSource`] over the device's async event stream. Once the
/// device disappears the source ends and stays ended.
pub struct XboxController {
    stream: EventStream,
    device_path: String,
    name: Option<String>,
    ended: bool,
}

impl std::fmt::Debug for XboxController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XboxController")
            .field("device_path", &self.device_path)
            .field("name", &self.name)
            .field("ended", &self.ended)
            .finish_non_exhaustive()
    }
}

impl XboxController {
    /// Open the controller described by the configuration.
    ///
    /// Uses `device_path` when set, otherwise searches by `device_name`.
    pub async fn from_config(config: &ControllerConfig) -> Result<Self> {
        if !config.device_path.is_empty() {
            return Self::open_path(&config.device_path);
        }
        Self::find(
            &config.device_name,
            Duration::from_secs(config.discovery_timeout_s),
            Duration::from_secs(config.discovery_poll_s),
        )
        .await
    }

    /// Open a specific `/dev/input/eventX` device.
    ///
    /// # Errors
    ///
    /// Returns `Controller` if the device cannot be opened or streamed.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let device = Device::open(path)
            .map_err(|e| BoatError::Controller(format!("Failed to open {}: {}", path.display(), e)))?;
        Self::from_device(device, path)
    }

    /// Poll the input devices until one named `name` appears.
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` if no such device shows up within `timeout`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::time::Duration;
    /// use pi_rc_boat::controller::xbox::XboxController;
    ///
    /// # async fn run() -> pi_rc_boat::error::Result<()> {
    /// let controller = XboxController::find(
    ///     "Xbox Wireless Controller",
    ///     Duration::from_secs(120),
    ///     Duration::from_secs(5),
    /// )
    /// .await?;
    /// println!("Connected to: {}", controller.device_path());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn find(name: &str, timeout: Duration, poll: Duration) -> Result<Self> {
        // Timeouts too large to represent never expire
        let deadline = Instant::now().checked_add(timeout);
        info!("Waiting for input device '{}'", name);

        loop {
            let mut devices: Vec<_> = evdev::enumerate().collect();
            // Lowest event number wins when several matching controllers are connected
            devices.sort_by(|a, b| device_order(&a.0, &b.0));

            for (path, device) in devices {
                debug!("Found input device: {} ({:?})", path.display(), device.name());
                if device.name() == Some(name) {
                    return Self::from_device(device, &path);
                }
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(BoatError::DeviceNotFound {
                    name: name.to_string(),
                    timeout_s: timeout.as_secs(),
                });
            }
            sleep(poll).await;
        }
    }

    fn from_device(device: Device, path: &Path) -> Result<Self> {
        let name = device.name().map(str::to_string);
        let stream = device
            .into_event_stream()
            .map_err(|e| BoatError::Controller(format!("Failed to stream {}: {}", path.display(), e)))?;
        let device_path = path.to_string_lossy().to_string();
        info!("Controller connected: {} ({})", name.as_deref().unwrap_or("unnamed"), device_path);

        Ok(Self {
            stream,
            device_path,
            name,
            ended: false,
        })
    }

    /// Get the device path of this controller
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Get controller name from evdev
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Number of an `eventN` device node.
fn event_number(path: &Path) -> Option<u32> {
    path.file_name()?.to_str()?.strip_prefix("event")?.parse().ok()
}

/// Orders `/dev/input/eventN` nodes numerically, other paths after them by name.
fn device_order(a: &Path, b: &Path) -> Ordering {
    let key = |path: &Path| event_number(path).unwrap_or(u32::MAX);
    key(a).cmp(&key(b)).then_with(|| a.cmp(b))
}

#[async_trait]
impl InputSource for XboxController {
    async fn next_event(&mut self) -> Option<ControlEvent> {
        if self.ended {
            return None;
        }
        loop {
            match self.stream.next_event().await {
                Ok(raw) => {
                    if let Some(event) = ControlEvent::decode(&raw) {
                        return Some(event);
                    }
                }
                Err(e) => {
                    warn!("Controller {} lost: {}", self.device_path, e);
                    self.ended = true;
                    return None;
                }
            }
        }
    }
}
