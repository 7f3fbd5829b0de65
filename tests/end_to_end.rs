mod common;

use std::time::Duration;

use common::{TestServer, HEARTBEAT_POINT};
use mps_threshold_server::client::ThresholdClient;
use mps_threshold_server::common::model::{Side, ThresholdKey, ThresholdTableKind};
use mps_threshold_server::data::RuntimeStore;
use mps_threshold_server::protocol::{
    read_message, write_message, Request, RequestKind, Response, ResponseStatus,
    ThresholdChangeRequest, PROTOCOL_VERSION,
};
use tokio::net::TcpStream;

fn current(slot: u8, integrator: u8, side: Side) -> ThresholdKey {
    ThresholdKey::new(ThresholdTableKind::Current, slot, integrator, side)
}

fn change(device_id: i32, values: &[(ThresholdKey, f64)]) -> ThresholdChangeRequest {
    let mut request = ThresholdChangeRequest {
        device_id,
        user_name: "operator".to_string(),
        reason: "end to end".to_string(),
        ..Default::default()
    };
    for (key, value) in values {
        request.tables.set(key, *value, true).unwrap();
    }
    request
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn device_check_by_name_and_id() {
    let server = TestServer::start().await;
    let mut client = ThresholdClient::connect(server.addr).await.unwrap();

    let missing = client.check_device(-1, "BPM1B").await.unwrap();
    assert_eq!(missing.status, ResponseStatus::BadDevice);
    assert!(missing.status_message.contains("BPM1B"));

    let found = client.check_device(7, "").await.unwrap();
    assert_eq!(found.status, ResponseStatus::Ok);
    assert_eq!(found.device_id, 7);
    assert!(found.status_message.contains("Analog device"));

    let by_name = client.check_device(-1, "DIO9").await.unwrap();
    assert_eq!(by_name.device_id, 9);
    assert!(by_name.status_message.contains("Digital device"));

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn change_then_conflicting_partial_change() {
    let server = TestServer::start().await;
    let mut client = ThresholdClient::connect(server.addr).await.unwrap();

    let (response, result) = client
        .change_thresholds(
            7,
            "",
            &change(
                7,
                &[(current(0, 0, Side::Low), 1.0), (current(0, 0, Side::High), 5.0)],
            ),
        )
        .await
        .unwrap();
    assert_eq!(response.status, ResponseStatus::Ok);
    assert!(result.unwrap().is_ok());

    let history = server.runtime.history(7).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].value(0, Side::Low), Some(1.0));
    assert_eq!(history[0].value(0, Side::High), Some(5.0));
    assert_eq!(server.hardware.value("BPM7:X_T0_LOLO"), Some(1.0));
    assert_eq!(server.hardware.value("BPM7:X_T0_HIHI_EN"), Some(1.0));

    let (response, result) = client
        .change_thresholds(7, "", &change(7, &[(current(0, 0, Side::Low), 6.0)]))
        .await
        .unwrap();
    assert_eq!(response.status, ResponseStatus::Ok);
    let result = result.unwrap();
    assert!(!result.is_ok());
    assert!(result.message.contains("HIHI"));
    assert!(result.message.contains("LOLO"));

    assert_eq!(server.runtime.history(7).unwrap().len(), 1);
    assert_eq!(server.hardware.value("BPM7:X_T0_LOLO"), Some(1.0));

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_control_points_are_reported() {
    let server = TestServer::start().await;
    server.hardware.set_read_only("BPM7:Y_T2_HIHI");
    let mut client = ThresholdClient::connect(server.addr).await.unwrap();

    let (_, result) = client
        .change_thresholds(7, "", &change(7, &[(current(2, 1, Side::High), 3.0)]))
        .await
        .unwrap();

    let result = result.unwrap();
    assert!(!result.is_ok());
    assert!(result.message.contains("BPM7:Y_T2_HIHI=3"));
    assert_eq!(server.runtime.history(7).unwrap().len(), 1);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_points_survive_a_long_change_log() {
    let server = TestServer::start().await;
    server.hardware.set_read_only("BLM8:I3_T7_ALT_HIHI");
    let mut client = ThresholdClient::connect(server.addr).await.unwrap();

    let mut values = vec![];
    for slot in 0..8 {
        for integrator in 0..4 {
            let key = ThresholdKey::new(ThresholdTableKind::Alternate, slot, integrator, Side::High);
            values.push((key, 9.0));
        }
    }

    let (response, result) = client
        .change_thresholds(8, "", &change(8, &values))
        .await
        .unwrap();
    assert_eq!(response.status, ResponseStatus::Ok);

    let result = result.unwrap();
    assert!(!result.is_ok());
    assert!(result.message.starts_with("Failed: BLM8:I3_T7_ALT_HIHI=9"));
    assert_eq!(server.runtime.history(8).unwrap().len(), 8);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn change_completes_after_client_hangs_up() {
    let server = TestServer::start().await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    write_message(&mut stream, &Request::new(RequestKind::ChangeThreshold, 7, ""))
        .await
        .unwrap();
    let response: Response = read_message(&mut stream).await.unwrap();
    assert!(response.is_ok());

    write_message(&mut stream, &change(7, &[(current(4, 2, Side::High), 7.5)]))
        .await
        .unwrap();
    drop(stream);

    let mut history = vec![];
    for _ in 0..100 {
        history = server.runtime.history(7).unwrap();
        if !history.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(history.len(), 1);
    assert_eq!(history[0].slot, 4);
    assert_eq!(history[0].value(2, Side::High), Some(7.5));
    assert_eq!(server.hardware.value("BPM7:TMIT_T4_HIHI"), Some(7.5));
    assert_eq!(server.hardware.value("BPM7:TMIT_T4_HIHI_EN"), Some(1.0));

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn thresholds_are_not_changed_for_other_devices() {
    let server = TestServer::start().await;
    let mut client = ThresholdClient::connect(server.addr).await.unwrap();

    let (response, result) = client
        .change_thresholds(9, "", &change(9, &[(current(0, 0, Side::Low), 1.0)]))
        .await
        .unwrap();
    assert_eq!(response.status, ResponseStatus::BadDevice);
    assert!(result.is_none());

    let (response, result) = client
        .change_thresholds(7, "", &change(8, &[(current(0, 0, Side::Low), 1.0)]))
        .await
        .unwrap();
    assert_eq!(response.status, ResponseStatus::Ok);
    assert!(!result.unwrap().is_ok());
    assert!(server.runtime.history(7).unwrap().is_empty());
    assert!(server.runtime.history(8).unwrap().is_empty());

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn get_thresholds_reports_stored_values() {
    let server = TestServer::start().await;
    let mut client = ThresholdClient::connect(server.addr).await.unwrap();

    let (response, record) = client.get_thresholds(8, "").await.unwrap();
    assert_eq!(response.status, ResponseStatus::Ok);
    let record = record.unwrap();
    assert_eq!(record.device_id, 8);
    assert_eq!(record.device_name, "BLM8");
    assert_eq!(record.tables.get(&current(0, 0, Side::High)), Some((true, 20.0)));
    assert_eq!(record.tables.get(&current(0, 0, Side::Low)), Some((false, -1.0)));
    assert_eq!(record.tables.build_entries().len(), 1);

    let (response, record) = client.get_thresholds(9, "").await.unwrap();
    assert_eq!(response.status, ResponseStatus::BadDevice);
    assert!(response.status_message.contains("digital"));
    assert!(record.is_none());

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unknown_request_type_keeps_connection_open() {
    let server = TestServer::start().await;
    let mut client = ThresholdClient::connect(server.addr).await.unwrap();

    client
        .send_raw(&Request {
            version: PROTOCOL_VERSION,
            kind: 99,
            device_id: 7,
            device_name: String::new(),
        })
        .await
        .unwrap();

    let response = client.check_device(7, "").await.unwrap();
    assert_eq!(response.status, ResponseStatus::Ok);
    assert_eq!(response.device_id, 7);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn version_tags_are_checked() {
    let server = TestServer::start().await;
    let mut client = ThresholdClient::connect(server.addr).await.unwrap();

    client
        .send_raw(&Request {
            version: 1,
            kind: RequestKind::DeviceCheck as u16,
            device_id: 7,
            device_name: String::new(),
        })
        .await
        .unwrap();
    let response = client.read_response().await.unwrap();
    assert_eq!(response.status, ResponseStatus::BadRequest);
    assert!(response.status_message.contains("Unsupported protocol version 1"));

    client
        .send_raw(&Request {
            version: 0,
            kind: RequestKind::DeviceCheck as u16,
            device_id: 7,
            device_name: String::new(),
        })
        .await
        .unwrap();
    assert!(client.read_response().await.unwrap().is_ok());

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn restore_application_thresholds() {
    let server = TestServer::start().await;
    let mut client = ThresholdClient::connect(server.addr).await.unwrap();

    let restored = client.restore(5).await.unwrap();
    assert_eq!(restored.status, ResponseStatus::Ok);
    assert_eq!(restored.device_id, 5);
    assert_eq!(server.hardware.value("BLM8:I0_T0_HIHI"), Some(20.0));
    assert_eq!(server.hardware.value("BLM8:I0_T0_HIHI_EN"), Some(1.0));
    assert_eq!(server.hardware.value("BLM8:I0_T0_LOLO"), None);
    assert_eq!(server.hardware.value("MPLN:LI21:MP05:THR_LOADED"), Some(1.0));

    let empty = client.restore(42).await.unwrap();
    assert_eq!(empty.status, ResponseStatus::RestoreInvalidApp);
    assert!(empty.status_message.contains("no devices"));

    let unknown = client.restore(99).await.unwrap();
    assert_eq!(unknown.status, ResponseStatus::RestoreInvalidApp);

    server.hardware.set_read_only("BLM8:I0_T0_HIHI");
    let failed = client.restore(5).await.unwrap();
    assert_eq!(failed.status, ResponseStatus::RestoreFail);

    assert_eq!(server.hardware.open_connections(), 0);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_clients_are_served() {
    let server = TestServer::start().await;
    let mut tasks = tokio::task::JoinSet::new();

    for n in 0..8 {
        let addr = server.addr;
        tasks.spawn(async move {
            let mut client = ThresholdClient::connect(addr).await.unwrap();
            if n % 4 == 0 {
                let integrator = (n / 4) as u8;
                let (_, result) = client
                    .change_thresholds(
                        8,
                        "",
                        &change(8, &[(current(1, integrator, Side::Low), 2.0)]),
                    )
                    .await
                    .unwrap();
                assert!(result.unwrap().is_ok());
            } else {
                let response = client.check_device(8, "").await.unwrap();
                assert!(response.is_ok());
            }
        });
    }

    while let Some(result) = tasks.join_next().await {
        result.unwrap();
    }

    let history = server.runtime.history(8).unwrap();
    assert_eq!(history.len(), 2);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn heartbeat_is_written_between_accepts() {
    let server = TestServer::start().await;

    tokio::time::sleep(Duration::from_millis(200)).await;

    let beats = server.hardware.value(HEARTBEAT_POINT).unwrap_or_default();
    assert!(beats >= 1.0);

    server.stop().await;
}
