use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::common::error::Result;
use crate::common::model::{
    Application, Device, HistoryRecord, RuntimeDevice, SlotValue, StoredThreshold,
    ThresholdEntry, ThresholdKey,
};

pub mod read;
mod tables;
mod write;

/// Read-only view of the machine configuration: devices, applications and their channels.
pub trait ConfigurationStore: Send + Sync {
    fn device_by_id(&self, id: i32) -> Result<Option<Device>>;

    fn device_by_name(&self, name: &str) -> Result<Option<Device>>;

    fn application(&self, id: i32) -> Result<Option<Application>>;

    /// Devices wired to the application's analog channels, in channel order.
    fn application_devices(&self, application_id: i32) -> Result<Vec<Device>>;
}

/// A validated change as it is stored: the new values of one device, grouped by
/// (table, slot) in entry order, and who made it.
#[derive(Clone, Copy, Debug)]
pub struct ChangeRecord<'a> {
    pub device_id: i32,
    pub entries: &'a [ThresholdEntry],
    pub user: &'a str,
    pub reason: &'a str,
    pub secs_since_epoch: i64,
}

/// Persisted threshold values and their audit trail.
pub trait RuntimeStore: Send + Sync {
    fn runtime_device(&self, id: i32) -> Result<Option<RuntimeDevice>>;

    fn thresholds(&self, device_id: i32) -> Result<Vec<StoredThreshold>>;

    /// Marks every value active and appends one history record per (table, slot).
    /// Either all of it is stored or none of it. Returns the appended records.
    fn record_change(&self, change: &ChangeRecord<'_>) -> Result<Vec<HistoryRecord>>;

    fn history(&self, device_id: i32) -> Result<Vec<HistoryRecord>>;
}

fn build_db(path: &Path, schema: &[(&str, &str)]) -> Result<Pool<SqliteConnectionManager>> {
    //Foreign keys are enforced, values and history need a runtime device row
    let db = SqliteConnectionManager::file(path)
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));

    let db_pool = Pool::new(db)?;

    let conn = db_pool.get()?;

    for (name, table) in schema {
        conn.execute(table, [])?;
        debug!("Built {} table", name);
    }

    Ok(db_pool)
}

#[derive(Clone)]
pub struct SqliteConfigurationStore {
    path: PathBuf,
    db: Arc<Pool<SqliteConnectionManager>>,
}

impl std::fmt::Debug for SqliteConfigurationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConfigurationStore")
            .field("path", &self.path)
            .finish()
    }
}

impl SqliteConfigurationStore {
    #[instrument]
    pub fn open(path: PathBuf) -> Result<Self> {
        let db = build_db(
            &path,
            &[
                ("device", tables::DEVICE_TABLE),
                ("application", tables::APPLICATION_TABLE),
                ("analog channel", tables::ANALOG_CHANNEL_TABLE),
            ],
        )?;

        Ok(SqliteConfigurationStore {
            path,
            db: Arc::new(db),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn insert_device(&self, device: &Device) -> Result<()> {
        let conn = self.db.get()?;
        write::insert_device(&conn, device)
    }

    pub fn insert_application(&self, application: &Application) -> Result<()> {
        let conn = self.db.get()?;
        write::insert_application(&conn, application)
    }

    pub fn insert_analog_channel(
        &self,
        application_id: i32,
        device_id: i32,
        channel: i32,
    ) -> Result<()> {
        let conn = self.db.get()?;
        write::insert_analog_channel(&conn, application_id, device_id, channel)
    }
}

impl ConfigurationStore for SqliteConfigurationStore {
    fn device_by_id(&self, id: i32) -> Result<Option<Device>> {
        let conn = self.db.get()?;
        read::get_device_by_id(&conn, id)
    }

    fn device_by_name(&self, name: &str) -> Result<Option<Device>> {
        let conn = self.db.get()?;
        read::get_device_by_name(&conn, name)
    }

    fn application(&self, id: i32) -> Result<Option<Application>> {
        let conn = self.db.get()?;
        read::get_application(&conn, id)
    }

    fn application_devices(&self, application_id: i32) -> Result<Vec<Device>> {
        let conn = self.db.get()?;
        read::get_application_devices(&conn, application_id)
    }
}

#[derive(Clone)]
pub struct SqliteRuntimeStore {
    path: PathBuf,
    db: Arc<Pool<SqliteConnectionManager>>,
}

impl std::fmt::Debug for SqliteRuntimeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRuntimeStore")
            .field("path", &self.path)
            .finish()
    }
}

impl SqliteRuntimeStore {
    #[instrument]
    pub fn open(path: PathBuf) -> Result<Self> {
        let db = build_db(
            &path,
            &[
                ("runtime device", tables::RUNTIME_DEVICE_TABLE),
                ("threshold", tables::THRESHOLD_TABLE),
                ("history", tables::HISTORY_TABLE),
            ],
        )?;

        Ok(SqliteRuntimeStore {
            path,
            db: Arc::new(db),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn insert_runtime_device(&self, device: &RuntimeDevice) -> Result<()> {
        let conn = self.db.get()?;
        write::insert_runtime_device(&conn, device)
    }

    /// Seeds a single value with an explicit active flag.
    pub fn insert_threshold(
        &self,
        device_id: i32,
        key: &ThresholdKey,
        value: f64,
        active: bool,
    ) -> Result<()> {
        let conn = self.db.get()?;
        write::upsert_threshold(&conn, device_id, key, value, active)
    }
}

impl RuntimeStore for SqliteRuntimeStore {
    fn runtime_device(&self, id: i32) -> Result<Option<RuntimeDevice>> {
        let conn = self.db.get()?;
        read::get_runtime_device(&conn, id)
    }

    fn thresholds(&self, device_id: i32) -> Result<Vec<StoredThreshold>> {
        let conn = self.db.get()?;
        read::get_thresholds(&conn, device_id)
    }

    fn record_change(&self, change: &ChangeRecord<'_>) -> Result<Vec<HistoryRecord>> {
        let mut conn = self.db.get()?;
        let tx = conn.transaction()?;
        let mut appended = vec![];

        for group in change
            .entries
            .chunk_by(|a, b| a.key.table == b.key.table && a.key.slot == b.key.slot)
        {
            for entry in group {
                write::upsert_threshold(&tx, change.device_id, &entry.key, entry.value, true)?;
            }

            let first = group[0].key;
            let values = read::get_slot_thresholds(&tx, change.device_id, first.table, first.slot)?
                .into_iter()
                .map(|t| SlotValue {
                    integrator: t.key.integrator,
                    side: t.key.side,
                    value: t.value,
                })
                .collect();

            let record = HistoryRecord {
                device_id: change.device_id,
                table: first.table,
                slot: first.slot,
                user: change.user.to_string(),
                reason: change.reason.to_string(),
                secs_since_epoch: change.secs_since_epoch,
                values,
            };
            write::insert_history(&tx, &record)?;
            appended.push(record);
        }

        tx.commit()?;
        debug!(
            "Stored {} threshold values and {} history records for device {}",
            change.entries.len(),
            appended.len(),
            change.device_id
        );
        Ok(appended)
    }

    fn history(&self, device_id: i32) -> Result<Vec<HistoryRecord>> {
        let conn = self.db.get()?;
        read::get_history(&conn, device_id)
    }
}
