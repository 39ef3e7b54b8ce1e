use std::sync::Arc;

use tracing::{info, Span};

use crate::app::adb::bridge::Device;
use crate::app::error::RecorderError;
use crate::app::models::ConnectStrategy;

/// Picks the session device out of the bridge's list.
pub struct DeviceSelector {
    strategy: ConnectStrategy,
    span: Span,
}

impl DeviceSelector {
    pub fn new(strategy: ConnectStrategy, span: Span) -> Self {
        Self { strategy, span }
    }

    pub fn select(&self, devices: &[Arc<dyn Device>]) -> Result<Arc<dyn Device>, RecorderError> {
        let first = devices.first().ok_or(RecorderError::NoDeviceConnected)?;
        let device = match &self.strategy {
            ConnectStrategy::First => Arc::clone(first),
            ConnectStrategy::Serial(serial) => devices
                .iter()
                .find(|device| device.serial() == serial.0)
                .cloned()
                .ok_or_else(|| RecorderError::DeviceNotFound(serial.0.clone()))?,
        };
        info!(parent: &self.span, serial = device.serial(), "using device");
        Ok(device)
    }
}
