use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::common::error::{Error, Result};
use crate::hardware::{ControlPoint, HardwareInterface};

/// Initial behaviour of the loopback gateway, read from the server config.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HardwareSeed {
    #[serde(default)]
    pub read_only: Vec<String>,
    #[serde(default)]
    pub unreachable: Vec<String>,
}

#[derive(Debug, Default)]
struct PointTable {
    values: HashMap<String, f64>,
    read_only: HashSet<String>,
    unreachable: HashSet<String>,
    stuck: HashSet<String>,
    connections: HashMap<u64, String>,
}

/// In-process gateway keeping control point values in memory.
#[derive(Debug, Default)]
pub struct LoopbackHardware {
    table: Mutex<PointTable>,
    next_token: AtomicU64,
}

impl LoopbackHardware {
    pub fn from_seed(seed: &HardwareSeed) -> Self {
        let hardware = LoopbackHardware::default();
        {
            let mut table = hardware.lock();
            table.read_only.extend(seed.read_only.iter().cloned());
            table.unreachable.extend(seed.unreachable.iter().cloned());
        }
        hardware
    }

    fn lock(&self) -> MutexGuard<'_, PointTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_read_only(&self, name: &str) {
        self.lock().read_only.insert(name.to_string());
    }

    pub fn set_unreachable(&self, name: &str) {
        self.lock().unreachable.insert(name.to_string());
    }

    /// Writes to a stuck point succeed but leave its value unchanged.
    pub fn set_stuck(&self, name: &str) {
        self.lock().stuck.insert(name.to_string());
    }

    pub fn set_value(&self, name: &str, value: f64) {
        self.lock().values.insert(name.to_string(), value);
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.lock().values.get(name).copied()
    }

    pub fn open_connections(&self) -> usize {
        self.lock().connections.len()
    }

    fn check_connected(table: &PointTable, point: &ControlPoint) -> Result<()> {
        match table.connections.get(&point.token) {
            Some(name) if *name == point.name => Ok(()),
            _ => Err(Error::ControlPointUnreachable(format!(
                "{} is not connected",
                point.name
            ))),
        }
    }
}

impl HardwareInterface for LoopbackHardware {
    fn connect(&self, name: &str) -> Result<ControlPoint> {
        let mut table = self.lock();

        if table.unreachable.contains(name) {
            return Err(Error::ControlPointUnreachable(name.to_string()));
        }

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        table.connections.insert(token, name.to_string());

        Ok(ControlPoint {
            name: name.to_string(),
            token,
        })
    }

    fn read(&self, point: &ControlPoint) -> Result<f64> {
        let table = self.lock();
        Self::check_connected(&table, point)?;

        Ok(table.values.get(&point.name).copied().unwrap_or_default())
    }

    fn write(&self, point: &ControlPoint, value: f64) -> Result<()> {
        let mut table = self.lock();
        Self::check_connected(&table, point)?;

        if table.read_only.contains(&point.name) {
            return Err(Error::ControlPointReadOnly(point.name.clone()));
        }

        if !table.stuck.contains(&point.name) {
            table.values.insert(point.name.clone(), value);
        }
        debug!("Wrote {} to {}", value, point.name);
        Ok(())
    }

    fn is_writable(&self, point: &ControlPoint) -> bool {
        !self.lock().read_only.contains(&point.name)
    }

    fn disconnect(&self, point: &ControlPoint) {
        self.lock().connections.remove(&point.token);
    }
}
