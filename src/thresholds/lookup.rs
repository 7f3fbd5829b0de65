use tracing::warn;

use crate::common::error::{Error, Result};
use crate::common::model::Device;
use crate::data::{ConfigurationStore, RuntimeStore};

/// Finds a device by id, or by name when `device_id` is negative, and checks that
/// the runtime store knows it under the same name.
pub fn resolve_device(
    config: &dyn ConfigurationStore,
    runtime: &dyn RuntimeStore,
    device_id: i32,
    device_name: &str,
) -> Result<Device> {
    let device = if device_id < 0 {
        config.device_by_name(device_name)?.ok_or_else(|| {
            Error::DeviceNotFound(format!("name {} not in config database", device_name))
        })?
    } else {
        config.device_by_id(device_id)?.ok_or_else(|| {
            Error::DeviceNotFound(format!("id {} not in config database", device_id))
        })?
    };

    let runtime_device = runtime.runtime_device(device.id)?.ok_or_else(|| {
        Error::DeviceNotFound(format!("id {} not in runtime database", device.id))
    })?;

    if runtime_device.name != device.name {
        warn!(
            "Device names do not match in config ({}) and runtime ({}) databases",
            device.name, runtime_device.name
        );
        return Err(Error::DeviceIdentityMismatch {
            config: device.name,
            runtime: runtime_device.name,
        });
    }

    Ok(device)
}

/// Same as `resolve_device` but refuses digital devices, which carry no thresholds.
pub fn resolve_analog_device(
    config: &dyn ConfigurationStore,
    runtime: &dyn RuntimeStore,
    device_id: i32,
    device_name: &str,
) -> Result<Device> {
    let device = resolve_device(config, runtime, device_id, device_name)?;

    if !device.is_analog() {
        return Err(Error::NotAnalogDevice(device.name));
    }

    Ok(device)
}
