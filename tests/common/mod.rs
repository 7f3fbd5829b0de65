use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use mps_threshold_server::common::model::{
    Application, Device, DeviceKind, RuntimeDevice, Side, ThresholdKey, ThresholdTableKind,
};
use mps_threshold_server::data::{SqliteConfigurationStore, SqliteRuntimeStore};
use mps_threshold_server::hardware::LoopbackHardware;
use mps_threshold_server::server::{ServerConfig, ServerContext, ThresholdServer};

pub const HEARTBEAT_POINT: &str = "MPS:THR:HEARTBEAT";

pub struct TestServer {
    pub addr: SocketAddr,
    pub runtime: SqliteRuntimeStore,
    pub hardware: Arc<LoopbackHardware>,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
    _dir: tempfile::TempDir,
}

fn analog(id: i32, name: &str, device_type: &str) -> Device {
    Device {
        id,
        name: name.to_string(),
        kind: DeviceKind::Analog,
        device_type: device_type.to_string(),
    }
}

/// Devices: 7 `BPM7` (BPM), 8 `BLM8`, 9 `DIO9` (digital).
/// Applications: 5 owns BLM8, 42 owns nothing.
fn seed(config: &SqliteConfigurationStore, runtime: &SqliteRuntimeStore) {
    let devices = [
        analog(7, "BPM7", "BPMS"),
        analog(8, "BLM8", "BLM"),
        Device {
            id: 9,
            name: "DIO9".to_string(),
            kind: DeviceKind::Digital,
            device_type: "DIO".to_string(),
        },
    ];

    for device in &devices {
        config.insert_device(device).unwrap();
        runtime
            .insert_runtime_device(&RuntimeDevice {
                id: device.id,
                name: device.name.clone(),
            })
            .unwrap();
    }

    for (id, pv_prefix) in [(5, "MPLN:LI21:MP05"), (42, "MPLN:LI22:MP42")] {
        config
            .insert_application(&Application {
                id,
                name: format!("card{}", id),
                description: String::new(),
                pv_prefix: pv_prefix.to_string(),
            })
            .unwrap();
    }
    config.insert_analog_channel(5, 8, 0).unwrap();

    let key = ThresholdKey::new(ThresholdTableKind::Current, 0, 0, Side::High);
    runtime.insert_threshold(8, &key, 20.0, true).unwrap();
    runtime
        .insert_threshold(8, &key.with_side(Side::Low), -1.0, false)
        .unwrap();
}

impl TestServer {
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();

        let mut config = ServerConfig::new(dir.path().join("mps_config.db"));
        config.ip = "127.0.0.1".parse().unwrap();
        config.port = 0;
        config.housekeeping_interval = Duration::from_millis(20);
        config.heartbeat_point = Some(HEARTBEAT_POINT.to_string());

        let config_store = SqliteConfigurationStore::open(config.config_db.clone()).unwrap();
        let runtime = SqliteRuntimeStore::open(config.runtime_db_path()).unwrap();
        seed(&config_store, &runtime);

        let hardware = Arc::new(LoopbackHardware::default());
        let context = ServerContext::new(
            &config,
            Arc::new(config_store),
            Arc::new(runtime.clone()),
            hardware.clone(),
        );

        let server = ThresholdServer::bind(&config, context).await.unwrap();
        let addr = server.local_addr().unwrap();

        let (shutdown, stop) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            server
                .run_until(async {
                    let _ = stop.await;
                })
                .await
                .unwrap();
        });

        TestServer {
            addr,
            runtime,
            hardware,
            shutdown,
            handle,
            _dir: dir,
        }
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        self.handle.await.unwrap();
    }
}
