use rusqlite::{params, Connection, OptionalExtension, Row, Rows};

use crate::common::error::{Error, Result};
use crate::common::model::{
    Application, Device, DeviceKind, HistoryRecord, RuntimeDevice, Side, SlotValue,
    StoredThreshold, ThresholdKey, ThresholdTableKind,
};

fn device_from_row(row: &Row) -> rusqlite::Result<(i32, String, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn build_device((id, name, kind, device_type): (i32, String, String, String)) -> Result<Device> {
    let kind = DeviceKind::from_db(&kind)
        .ok_or_else(|| Error::Persistence(format!("device {} has unknown kind {}", id, kind)))?;

    Ok(Device {
        id,
        name,
        kind,
        device_type,
    })
}

pub fn get_device_by_id(conn: &Connection, id: i32) -> Result<Option<Device>> {
    let row = conn
        .query_row(
            "SELECT id, name, kind, device_type FROM devices WHERE id = ?",
            [id],
            device_from_row,
        )
        .optional()?;

    row.map(build_device).transpose()
}

pub fn get_device_by_name(conn: &Connection, name: &str) -> Result<Option<Device>> {
    let row = conn
        .query_row(
            "SELECT id, name, kind, device_type FROM devices WHERE name = ?",
            [name],
            device_from_row,
        )
        .optional()?;

    row.map(build_device).transpose()
}

pub fn get_application(conn: &Connection, id: i32) -> Result<Option<Application>> {
    let application = conn
        .query_row(
            "SELECT id, name, description, pv_prefix FROM applications WHERE id = ?",
            [id],
            |row| {
                Ok(Application {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    pv_prefix: row.get(3)?,
                })
            },
        )
        .optional()?;

    Ok(application)
}

pub fn get_application_devices(conn: &Connection, application_id: i32) -> Result<Vec<Device>> {
    let mut stmt = conn.prepare(
        "SELECT d.id, d.name, d.kind, d.device_type
         FROM analog_channels c
         JOIN devices d ON d.id = c.device_id
         WHERE c.application_id = ?
         ORDER BY c.channel",
    )?;

    let mut rows = stmt.query([application_id])?;
    let mut result = vec![];

    while let Some(row) = rows.next()? {
        result.push(build_device(device_from_row(row)?)?);
    }

    Ok(result)
}

pub fn get_runtime_device(conn: &Connection, id: i32) -> Result<Option<RuntimeDevice>> {
    let device = conn
        .query_row(
            "SELECT id, name FROM runtime_devices WHERE id = ?",
            [id],
            |row| {
                Ok(RuntimeDevice {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )
        .optional()?;

    Ok(device)
}

fn build_key(table: u8, slot: u8, integrator: u8, side: u8) -> Result<ThresholdKey> {
    let table = ThresholdTableKind::from_repr(table)
        .ok_or_else(|| Error::Persistence(format!("unknown threshold table {}", table)))?;
    let side = Side::from_repr(side)
        .ok_or_else(|| Error::Persistence(format!("unknown threshold side {}", side)))?;

    Ok(ThresholdKey::new(table, slot, integrator, side))
}

fn collect_thresholds(mut rows: Rows<'_>) -> Result<Vec<StoredThreshold>> {
    let mut result = vec![];

    while let Some(row) = rows.next()? {
        let key = build_key(row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)?;

        result.push(StoredThreshold {
            key,
            value: row.get(4)?,
            active: row.get(5)?,
        });
    }

    Ok(result)
}

pub fn get_thresholds(conn: &Connection, device_id: i32) -> Result<Vec<StoredThreshold>> {
    let mut stmt = conn.prepare(
        "SELECT table_kind, slot, integrator, side, value, active
         FROM threshold_values
         WHERE device_id = ?
         ORDER BY table_kind, slot, integrator, side",
    )?;

    let thresholds = collect_thresholds(stmt.query([device_id])?)?;
    Ok(thresholds)
}

pub fn get_slot_thresholds(
    conn: &Connection,
    device_id: i32,
    table: ThresholdTableKind,
    slot: u8,
) -> Result<Vec<StoredThreshold>> {
    let mut stmt = conn.prepare(
        "SELECT table_kind, slot, integrator, side, value, active
         FROM threshold_values
         WHERE device_id = ? AND table_kind = ? AND slot = ?
         ORDER BY integrator, side",
    )?;

    let thresholds = collect_thresholds(stmt.query(params![device_id, table as u8, slot])?)?;
    Ok(thresholds)
}

pub fn get_history(conn: &Connection, device_id: i32) -> Result<Vec<HistoryRecord>> {
    let mut stmt = conn.prepare(
        "SELECT table_kind, slot, user, reason, timestamp, slot_values
         FROM threshold_history
         WHERE device_id = ?
         ORDER BY id",
    )?;

    let mut rows = stmt.query(params![device_id])?;
    let mut result = vec![];

    while let Some(row) = rows.next()? {
        let table: u8 = row.get(0)?;
        let table = ThresholdTableKind::from_repr(table)
            .ok_or_else(|| Error::Persistence(format!("unknown threshold table {}", table)))?;
        let values: String = row.get(5)?;
        let values: Vec<SlotValue> = serde_json::from_str(&values)?;

        result.push(HistoryRecord {
            device_id,
            table,
            slot: row.get(1)?,
            user: row.get(2)?,
            reason: row.get(3)?,
            secs_since_epoch: row.get(4)?,
            values,
        });
    }

    Ok(result)
}
