use rusqlite::{params, Connection};

use crate::common::error::Result;
use crate::common::model::{Application, Device, HistoryRecord, RuntimeDevice, ThresholdKey};

pub fn insert_device(conn: &Connection, device: &Device) -> Result<()> {
    let query = "INSERT OR REPLACE INTO devices (id, name, kind, device_type) VALUES (?, ?, ?, ?)";

    let _rows = conn.execute(
        query,
        params![
            device.id,
            device.name,
            device.kind.as_str(),
            device.device_type
        ],
    )?;
    Ok(())
}

pub fn insert_application(conn: &Connection, application: &Application) -> Result<()> {
    let query =
        "INSERT OR REPLACE INTO applications (id, name, description, pv_prefix) VALUES (?, ?, ?, ?)";

    let _rows = conn.execute(
        query,
        params![
            application.id,
            application.name,
            application.description,
            application.pv_prefix
        ],
    )?;
    Ok(())
}

pub fn insert_analog_channel(
    conn: &Connection,
    application_id: i32,
    device_id: i32,
    channel: i32,
) -> Result<()> {
    let query =
        "INSERT INTO analog_channels (application_id, device_id, channel) VALUES (?, ?, ?)";

    let _rows = conn.execute(query, params![application_id, device_id, channel])?;
    Ok(())
}

pub fn insert_runtime_device(conn: &Connection, device: &RuntimeDevice) -> Result<()> {
    let query = "INSERT OR REPLACE INTO runtime_devices (id, name) VALUES (?, ?)";

    let _rows = conn.execute(query, params![device.id, device.name])?;
    Ok(())
}

/// Inserts or overwrites a threshold row with an explicit active flag.
pub fn upsert_threshold(
    conn: &Connection,
    device_id: i32,
    key: &ThresholdKey,
    value: f64,
    active: bool,
) -> Result<()> {
    let query = "INSERT INTO threshold_values (device_id, table_kind, slot, integrator, side, value, active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(device_id, table_kind, slot, integrator, side)
                 DO UPDATE SET value = excluded.value, active = excluded.active";

    let _rows = conn.execute(
        query,
        params![
            device_id,
            key.table as u8,
            key.slot,
            key.integrator,
            key.side as u8,
            value,
            active
        ],
    )?;
    Ok(())
}

pub fn insert_history(conn: &Connection, record: &HistoryRecord) -> Result<()> {
    let values_json = serde_json::to_string(&record.values)?;
    let query = "INSERT INTO threshold_history (device_id, table_kind, slot, user, reason, timestamp, slot_values)
                 VALUES (?, ?, ?, ?, ?, ?, ?)";

    let _rows = conn.execute(
        query,
        params![
            record.device_id,
            record.table as u8,
            record.slot,
            record.user,
            record.reason,
            record.secs_since_epoch,
            values_json
        ],
    )?;
    Ok(())
}
