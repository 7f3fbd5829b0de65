pub const DEVICE_TABLE: &str = "CREATE TABLE IF NOT EXISTS devices (
                                id INTEGER PRIMARY KEY,
                                name TEXT NOT NULL UNIQUE,
                                kind TEXT NOT NULL,
                                device_type TEXT NOT NULL DEFAULT ''
                            );";

pub const APPLICATION_TABLE: &str = "CREATE TABLE IF NOT EXISTS applications (
                                id INTEGER PRIMARY KEY,
                                name TEXT NOT NULL,
                                description TEXT NOT NULL DEFAULT '',
                                pv_prefix TEXT NOT NULL
                            );";

pub const ANALOG_CHANNEL_TABLE: &str = "CREATE TABLE IF NOT EXISTS analog_channels (
                                id INTEGER PRIMARY KEY AUTOINCREMENT,
                                application_id INTEGER NOT NULL REFERENCES applications(id),
                                device_id INTEGER NOT NULL REFERENCES devices(id),
                                channel INTEGER NOT NULL
                            );";

pub const RUNTIME_DEVICE_TABLE: &str = "CREATE TABLE IF NOT EXISTS runtime_devices (
                                id INTEGER PRIMARY KEY,
                                name TEXT NOT NULL
                            );";

//Foreign keys are switched on for every pooled connection, see `build_db`
pub const THRESHOLD_TABLE: &str = "CREATE TABLE IF NOT EXISTS threshold_values (
                                device_id INTEGER NOT NULL REFERENCES runtime_devices(id),
                                table_kind INTEGER NOT NULL,
                                slot INTEGER NOT NULL,
                                integrator INTEGER NOT NULL,
                                side INTEGER NOT NULL,
                                value REAL NOT NULL,
                                active INTEGER NOT NULL DEFAULT 0,
                                PRIMARY KEY (device_id, table_kind, slot, integrator, side)
                            );";

pub const HISTORY_TABLE: &str = "CREATE TABLE IF NOT EXISTS threshold_history (
                                id INTEGER PRIMARY KEY AUTOINCREMENT,
                                device_id INTEGER NOT NULL REFERENCES runtime_devices(id),
                                table_kind INTEGER NOT NULL,
                                slot INTEGER NOT NULL,
                                user TEXT NOT NULL,
                                reason TEXT NOT NULL,
                                timestamp INTEGER NOT NULL,
                                slot_values TEXT NOT NULL
                            );";
