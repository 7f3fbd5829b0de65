use serde::{Deserialize, Serialize};
use std::fmt;

pub const INTEGRATOR_COUNT: u8 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    Analog,
    Digital,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Analog => "analog",
            DeviceKind::Digital => "digital",
        }
    }

    pub fn from_db(raw: &str) -> Option<Self> {
        match raw {
            "analog" => Some(DeviceKind::Analog),
            "digital" => Some(DeviceKind::Digital),
            _ => None,
        }
    }
}

/// A device as known by the configuration store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: i32,
    pub name: String,
    pub kind: DeviceKind,
    pub device_type: String,
}

impl Device {
    pub fn is_analog(&self) -> bool {
        self.kind == DeviceKind::Analog
    }

    //BPMs expose position/charge faults instead of plain integrator channels
    pub fn is_bpm(&self) -> bool {
        self.device_type == "BPMS"
    }
}

/// The runtime store's view of a device, must agree with the configuration store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuntimeDevice {
    pub id: i32,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub pv_prefix: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ThresholdTableKind {
    Legacy = 0,
    Idle = 1,
    Current = 2,
    Alternate = 3,
}

impl ThresholdTableKind {
    pub const ALL: [ThresholdTableKind; 4] = [
        ThresholdTableKind::Legacy,
        ThresholdTableKind::Idle,
        ThresholdTableKind::Current,
        ThresholdTableKind::Alternate,
    ];

    pub fn slot_count(&self) -> u8 {
        match self {
            ThresholdTableKind::Legacy | ThresholdTableKind::Idle => 1,
            ThresholdTableKind::Current | ThresholdTableKind::Alternate => 8,
        }
    }

    pub fn from_repr(raw_value: u8) -> Option<Self> {
        match raw_value {
            0 => Some(Self::Legacy),
            1 => Some(Self::Idle),
            2 => Some(Self::Current),
            3 => Some(Self::Alternate),
            _ => None,
        }
    }
}

impl fmt::Display for ThresholdTableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThresholdTableKind::Legacy => "legacy",
            ThresholdTableKind::Idle => "idle",
            ThresholdTableKind::Current => "current",
            ThresholdTableKind::Alternate => "alternate",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Side {
    Low = 0,
    High = 1,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Low, Side::High];

    pub fn from_repr(raw_value: u8) -> Option<Self> {
        match raw_value {
            0 => Some(Self::Low),
            1 => Some(Self::High),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Side::Low => "LOLO",
            Side::High => "HIHI",
        }
    }
}

/// Address of a single threshold value inside a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ThresholdKey {
    pub table: ThresholdTableKind,
    pub slot: u8,
    pub integrator: u8,
    pub side: Side,
}

impl ThresholdKey {
    pub fn new(table: ThresholdTableKind, slot: u8, integrator: u8, side: Side) -> Self {
        ThresholdKey {
            table,
            slot,
            integrator,
            side,
        }
    }

    pub fn with_side(&self, side: Side) -> Self {
        ThresholdKey { side, ..*self }
    }

    pub fn is_valid(&self) -> bool {
        self.slot < self.table.slot_count() && self.integrator < INTEGRATOR_COUNT
    }
}

/// A value requested by an operator, always considered active once applied.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdEntry {
    pub key: ThresholdKey,
    pub value: f64,
}

/// A value as persisted in the runtime store.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredThreshold {
    pub key: ThresholdKey,
    pub value: f64,
    pub active: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlotValue {
    pub integrator: u8,
    pub side: Side,
    pub value: f64,
}

/// Audit entry for one (table, slot) touched by a change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub device_id: i32,
    pub table: ThresholdTableKind,
    pub slot: u8,
    pub user: String,
    pub reason: String,
    pub secs_since_epoch: i64,
    pub values: Vec<SlotValue>,
}

impl HistoryRecord {
    pub fn value(&self, integrator: u8, side: Side) -> Option<f64> {
        self.values
            .iter()
            .find(|v| v.integrator == integrator && v.side == side)
            .map(|v| v.value)
    }
}
