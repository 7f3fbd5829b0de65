use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

use crate::common::error::{Error, Result};
use crate::common::model::{Device, ThresholdEntry};
use crate::data::{ChangeRecord, RuntimeStore};
use crate::hardware::{write_with_enable, HardwareInterface};
use crate::protocol::ThresholdChangeRequest;
use crate::thresholds::naming;
use crate::thresholds::validation::{index_stored, validate_entries};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeOptions {
    /// Count control point failures as success, values still get stored.
    #[serde(default)]
    pub force_write: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChangeOutcome {
    pub log: String,
    /// `point=value` for every control point that refused the write.
    pub failed_points: Vec<String>,
    /// Set when neither the values nor their history could be stored.
    pub persistence_error: Option<String>,
}

impl ChangeOutcome {
    pub fn success(&self) -> bool {
        self.failed_points.is_empty() && self.persistence_error.is_none()
    }

    /// Failed points lead so they survive truncation to the wire text field.
    pub fn failure_message(&self) -> String {
        let mut message = String::new();
        if !self.failed_points.is_empty() {
            let _ = writeln!(message, "Failed: {}", self.failed_points.join(", "));
        }
        if let Some(err) = &self.persistence_error {
            let _ = writeln!(message, "Not stored: {}", err);
        }
        message.push_str(&self.log);
        message
    }
}

/// A decoded change request bound to the device it was checked against.
#[derive(Clone, Debug)]
pub struct ChangePlan {
    device: Device,
    entries: Vec<ThresholdEntry>,
    disable: bool,
    user: String,
    reason: String,
}

impl ChangePlan {
    pub fn new(device: Device, request: &ThresholdChangeRequest) -> Result<Self> {
        if request.device_id >= 0 && request.device_id != device.id {
            return Err(Error::MalformedMessage(format!(
                "change record targets device {} but device {} was checked",
                request.device_id, device.id
            )));
        }

        Ok(ChangePlan {
            entries: request.tables.build_entries(),
            disable: request.disable,
            user: request.user_name.clone(),
            reason: request.reason.clone(),
            device,
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn entries(&self) -> &[ThresholdEntry] {
        &self.entries
    }

    pub fn validate(&self, runtime: &dyn RuntimeStore) -> Result<()> {
        let stored = index_stored(runtime.thresholds(self.device.id)?);
        validate_entries(&self.device.name, &self.entries, &stored)
    }

    /// Writes every entry to its control point, then stores all values with one
    /// history record per (table, slot) in a single transaction. Validation runs
    /// again first so that a change landing between `validate` and `execute` can't
    /// slip past the ordering check.
    pub fn execute(
        &self,
        runtime: &dyn RuntimeStore,
        hardware: &dyn HardwareInterface,
        options: ChangeOptions,
    ) -> Result<ChangeOutcome> {
        let stored = index_stored(runtime.thresholds(self.device.id)?);
        validate_entries(&self.device.name, &self.entries, &stored)?;

        let now = SystemTime::now();
        let secs_since_epoch = now
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();

        let mut log = format!(
            "=== Threshold Change for device \"{}\" ===\n",
            self.device.name
        );
        let _ = writeln!(log, "User: {}", self.user);
        let _ = writeln!(log, "Reason: {}", self.reason);
        let _ = writeln!(log, "Date: {}\n", humantime::format_rfc3339_seconds(now));

        let mut failed_points = vec![];

        for entry in &self.entries {
            let point = naming::threshold_point(&self.device, &entry.key);
            let enable = naming::enable_point(&point);

            if let Err(err) = write_with_enable(hardware, &point, &enable, entry.value, !self.disable)
            {
                if options.force_write {
                    warn!("Ignoring failed write of {} to {}: {}", entry.value, point, err);
                } else {
                    warn!("Failed to write {} to {}: {}", entry.value, point, err);
                    failed_points.push(format!("{}={}", point, entry.value));
                }
            }

            let prev = stored
                .get(&entry.key)
                .map(|t| t.value.to_string())
                .unwrap_or_else(|| "none".to_string());
            let _ = writeln!(
                log,
                "{}: table={} slot={} integrator={} side={} prev={} new={}",
                point,
                entry.key.table,
                entry.key.slot,
                entry.key.integrator,
                entry.key.side.label(),
                prev,
                entry.value
            );
        }

        let persistence_error = match runtime.record_change(&ChangeRecord {
            device_id: self.device.id,
            entries: &self.entries,
            user: &self.user,
            reason: &self.reason,
            secs_since_epoch,
        }) {
            Ok(history) => {
                debug!("Appended {} history records", history.len());
                None
            }
            Err(err) => {
                error!("Couldn't store thresholds of {}: {}", self.device.name, err);
                Some(err.to_string())
            }
        };

        log.push_str("===");
        info!("{}", log);

        Ok(ChangeOutcome {
            log,
            failed_points,
            persistence_error,
        })
    }
}
