use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use crate::common::error::Error;
use crate::common::model::{Application, Device};
use crate::data::{ConfigurationStore, RuntimeStore};
use crate::hardware::{HardwareInterface, PointHandle};
use crate::thresholds::{lookup, naming};

fn default_unreachable_tolerance() -> usize {
    2
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RestoreOptions {
    /// Unreachable control points skipped before the restore gives up.
    #[serde(default = "default_unreachable_tolerance")]
    pub unreachable_tolerance: usize,
    /// Skip read-only control points instead of failing.
    #[serde(default)]
    pub force_write: bool,
    #[serde(default = "default_true")]
    pub release: bool,
    #[serde(default = "default_true")]
    pub verify: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        RestoreOptions {
            unreachable_tolerance: default_unreachable_tolerance(),
            force_write: false,
            release: default_true(),
            verify: default_true(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestoreStage {
    AppLookup,
    DeviceEnumeration,
    ThresholdCollection,
    ReachabilityCheck,
    Apply,
    Verify,
    Release,
    Disconnect,
}

impl fmt::Display for RestoreStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RestoreStage::AppLookup => "application lookup",
            RestoreStage::DeviceEnumeration => "device enumeration",
            RestoreStage::ThresholdCollection => "threshold collection",
            RestoreStage::ReachabilityCheck => "reachability check",
            RestoreStage::Apply => "apply",
            RestoreStage::Verify => "verify",
            RestoreStage::Release => "release",
            RestoreStage::Disconnect => "disconnect",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Restore failed during {stage}: {error}")]
pub struct RestoreFailure {
    pub stage: RestoreStage,
    #[source]
    pub error: Error,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RestoreReport {
    pub application_id: i32,
    pub restored: usize,
    /// Control points left untouched, either unreachable or read-only.
    pub skipped_points: Vec<String>,
    pub released: bool,
}

struct RestoreItem {
    point: String,
    enable: String,
    value: f64,
}

struct RestoreTarget<'a> {
    point: PointHandle<'a>,
    enable: PointHandle<'a>,
    value: f64,
}

trait AtStage<T> {
    fn at(self, stage: RestoreStage) -> Result<T, RestoreFailure>;
}

impl<T> AtStage<T> for Result<T, Error> {
    fn at(self, stage: RestoreStage) -> Result<T, RestoreFailure> {
        self.map_err(|error| RestoreFailure { stage, error })
    }
}

/// Reapplies the active thresholds of every device of an application.
pub struct ThresholdRestorer<'a> {
    config: &'a dyn ConfigurationStore,
    runtime: &'a dyn RuntimeStore,
    hardware: &'a dyn HardwareInterface,
    options: RestoreOptions,
}

impl<'a> ThresholdRestorer<'a> {
    pub fn new(
        config: &'a dyn ConfigurationStore,
        runtime: &'a dyn RuntimeStore,
        hardware: &'a dyn HardwareInterface,
        options: RestoreOptions,
    ) -> Self {
        ThresholdRestorer {
            config,
            runtime,
            hardware,
            options,
        }
    }

    pub fn restore(&self, application_id: i32) -> Result<RestoreReport, RestoreFailure> {
        let (application, devices) = self
            .lookup_application(application_id)
            .at(RestoreStage::AppLookup)?;

        let devices = self
            .enumerate_devices(devices)
            .at(RestoreStage::DeviceEnumeration)?;

        let items = self
            .collect_thresholds(&devices)
            .at(RestoreStage::ThresholdCollection)?;

        let mut report = RestoreReport {
            application_id,
            ..Default::default()
        };

        //Every handle below disconnects when this scope exits, whatever the outcome
        let targets = self
            .connect_targets(items, &mut report)
            .at(RestoreStage::ReachabilityCheck)?;

        let targets = self
            .apply(targets, &mut report)
            .at(RestoreStage::Apply)?;

        if self.options.verify {
            Self::verify(&targets).at(RestoreStage::Verify)?;
        }

        report.restored = targets.len();

        if self.options.release {
            match self.release(&application) {
                Ok(()) => report.released = true,
                Err(err) => warn!(
                    "Failed to release application {} ({}): {}",
                    application.id,
                    naming::release_point(&application),
                    err
                ),
            }
        }

        drop(targets);
        debug!(
            "{} done for application {}",
            RestoreStage::Disconnect,
            application_id
        );

        info!(
            "Restored {} thresholds for application {} ({}), skipped {}",
            report.restored,
            application.id,
            application.name,
            report.skipped_points.len()
        );

        Ok(report)
    }

    fn lookup_application(&self, application_id: i32) -> Result<(Application, Vec<Device>), Error> {
        let application = self
            .config
            .application(application_id)?
            .ok_or(Error::ApplicationNotFound(application_id))?;

        let devices = self.config.application_devices(application_id)?;

        if devices.is_empty() {
            return Err(Error::ApplicationHasNoChannels(application_id));
        }

        Ok((application, devices))
    }

    fn enumerate_devices(&self, devices: Vec<Device>) -> Result<Vec<Device>, Error> {
        devices
            .into_iter()
            .map(|d| lookup::resolve_device(self.config, self.runtime, d.id, &d.name))
            .collect()
    }

    /// Inactive values are never connected.
    fn collect_thresholds(&self, devices: &[Device]) -> Result<Vec<RestoreItem>, Error> {
        let mut items = vec![];

        for device in devices {
            for threshold in self.runtime.thresholds(device.id)? {
                if !threshold.active {
                    continue;
                }

                let point = naming::threshold_point(device, &threshold.key);
                items.push(RestoreItem {
                    enable: naming::enable_point(&point),
                    point,
                    value: threshold.value,
                });
            }
        }

        debug!("Collected {} active thresholds", items.len());
        Ok(items)
    }

    fn connect_targets(
        &self,
        items: Vec<RestoreItem>,
        report: &mut RestoreReport,
    ) -> Result<Vec<RestoreTarget<'a>>, Error> {
        let mut targets = vec![];
        let mut unreachable = vec![];

        for item in items {
            let point = PointHandle::open(self.hardware, &item.point);
            let enable = PointHandle::open(self.hardware, &item.enable);

            match (point, enable) {
                (Ok(point), Ok(enable)) => targets.push(RestoreTarget {
                    point,
                    enable,
                    value: item.value,
                }),
                (point, enable) => {
                    if point.is_err() {
                        unreachable.push(item.point);
                    }
                    if enable.is_err() {
                        unreachable.push(item.enable);
                    }
                }
            }
        }

        if unreachable.len() > self.options.unreachable_tolerance {
            return Err(Error::ControlPointUnreachable(unreachable.join(", ")));
        }

        for name in &unreachable {
            warn!("Skipping unreachable control point {}", name);
        }
        report.skipped_points.extend(unreachable);

        Ok(targets)
    }

    fn apply(
        &self,
        targets: Vec<RestoreTarget<'a>>,
        report: &mut RestoreReport,
    ) -> Result<Vec<RestoreTarget<'a>>, Error> {
        let mut writable = Vec::with_capacity(targets.len());

        //Nothing is written until every point is known to accept writes
        for target in targets {
            let read_only = [&target.point, &target.enable]
                .into_iter()
                .find(|handle| !handle.is_writable())
                .map(|handle| handle.name().to_string());

            match read_only {
                None => writable.push(target),
                Some(name) if self.options.force_write => {
                    warn!("Skipping read-only control point {}", name);
                    report.skipped_points.push(name);
                }
                Some(name) => return Err(Error::ControlPointReadOnly(name)),
            }
        }

        for target in &writable {
            target.point.write(target.value)?;
            target.enable.write(1.0)?;
        }

        Ok(writable)
    }

    fn verify(targets: &[RestoreTarget<'_>]) -> Result<(), Error> {
        for target in targets {
            let actual = target.point.read()?;

            if actual != target.value {
                return Err(Error::VerificationMismatch {
                    point: target.point.name().to_string(),
                    expected: target.value,
                    actual,
                });
            }
        }

        Ok(())
    }

    fn release(&self, application: &Application) -> Result<(), Error> {
        let release = PointHandle::open(self.hardware, &naming::release_point(application))?;
        release.write(1.0)
    }
}
