use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task;
use tracing::{debug, info, warn};

use crate::common::error::{Error, Result};
use crate::common::model::{Device, StoredThreshold};
use crate::protocol::codec::truncate_text;
use crate::protocol::messages::DEVICE_NAME_LEN;
use crate::protocol::{
    read_message, write_message, Request, RequestKind, Response, ResponseStatus,
    ThresholdChangeRequest, ThresholdChangeResponse,
};
use crate::server::ServerContext;
use crate::thresholds::change::ChangePlan;
use crate::thresholds::lookup;
use crate::thresholds::restore::{RestoreFailure, RestoreStage, ThresholdRestorer};
use crate::thresholds::table::ThresholdArrays;

/// Runs `f` on the blocking pool while `guard` is held. The work finishes even if
/// the awaiting connection goes away.
async fn run_blocking<G, T, F>(guard: G, f: F) -> Result<T>
where
    G: Send + 'static,
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let result = task::spawn_blocking(move || {
        let _guard = guard;
        f()
    })
    .await?;

    Ok(result)
}

fn lookup_status(err: &Error) -> ResponseStatus {
    match err {
        Error::DeviceNotFound(_)
        | Error::DeviceIdentityMismatch { .. }
        | Error::NotAnalogDevice(_) => ResponseStatus::BadDevice,
        _ => ResponseStatus::BadRequest,
    }
}

fn device_label(request: &Request) -> String {
    if request.device_id < 0 {
        format!("name={}", request.device_name)
    } else {
        format!("id={}", request.device_id)
    }
}

fn invalid_device_response(request: &Request, err: &Error) -> Response {
    Response::new(
        lookup_status(err),
        0,
        &format!("Device not valid ({}, {})", device_label(request), err),
    )
}

fn valid_device_message(device: &Device) -> String {
    let info = if device.is_analog() {
        "Analog device"
    } else {
        "Digital device"
    };
    format!(
        "Device is valid (name={}, id={}, info={})",
        device.name, device.id, info
    )
}

fn restore_status(failure: &RestoreFailure) -> ResponseStatus {
    match failure.stage {
        RestoreStage::AppLookup => ResponseStatus::RestoreInvalidApp,
        RestoreStage::DeviceEnumeration => ResponseStatus::RestoreInvalidDevice,
        _ => ResponseStatus::RestoreFail,
    }
}

/// Serves requests from one client until it disconnects. Exchanges are handled
/// one after another.
pub async fn serve_connection<S>(context: Arc<ServerContext>, mut stream: S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let request: Request = match read_message(&mut stream).await {
            Ok(request) => request,
            Err(Error::ConnectionClosed) => {
                debug!("Client closed the connection");
                return Ok(());
            }
            Err(err @ Error::MalformedMessage(_)) => {
                warn!("Malformed request: {}", err);
                let response = Response::new(ResponseStatus::BadRequest, 0, &err.to_string());
                //The peer may already be gone
                let _ = write_message(&mut stream, &response).await;
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        if !request.is_supported_version() {
            let err = Error::UnsupportedProtocolVersion(request.version);
            warn!("{}", err);
            let response =
                Response::new(ResponseStatus::BadRequest, request.device_id, &err.to_string());
            write_message(&mut stream, &response).await?;
            continue;
        }

        let Some(kind) = request.request_kind() else {
            warn!("Invalid request type: {}", request.kind);
            continue;
        };
        debug!(
            "{:?} runs as a {}",
            kind,
            if kind.is_writer() { "writer" } else { "reader" }
        );

        match kind {
            RequestKind::DeviceCheck => {
                info!("Request for device check ({})", device_label(&request));
                device_check(&context, &request, &mut stream).await?;
            }
            RequestKind::GetThreshold => {
                info!("Request for current device thresholds ({})", device_label(&request));
                get_thresholds(&context, &request, &mut stream).await?;
            }
            RequestKind::ChangeThreshold => {
                info!("Request for change device thresholds ({})", device_label(&request));
                change_thresholds(&context, &request, &mut stream).await?;
            }
            RequestKind::RestoreAppThresholds => {
                info!("Request for restore app thresholds (app={})", request.device_id);
                restore_application(&context, &request, &mut stream).await?;
            }
        }
    }
}

async fn device_check<S>(
    context: &Arc<ServerContext>,
    request: &Request,
    stream: &mut S,
) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let guard = context.coordinator.begin_read().await;
    let ctx = Arc::clone(context);
    let (device_id, device_name) = (request.device_id, request.device_name.clone());

    let resolved = run_blocking(guard, move || {
        lookup::resolve_device(
            ctx.config_store.as_ref(),
            ctx.runtime_store.as_ref(),
            device_id,
            &device_name,
        )
    })
    .await?;

    let response = match resolved {
        Ok(device) => Response::new(ResponseStatus::Ok, device.id, &valid_device_message(&device)),
        Err(err) => {
            warn!("Device check failed: {}", err);
            invalid_device_response(request, &err)
        }
    };

    write_message(stream, &response).await
}

/// Resolves an analog device and answers the leading `Response` of a threshold
/// exchange. Returns the device only when the exchange may go on, with its stored
/// thresholds when `load_thresholds` is set.
async fn check_analog_device<S>(
    context: &Arc<ServerContext>,
    request: &Request,
    stream: &mut S,
    load_thresholds: bool,
) -> Result<Option<(Device, Vec<StoredThreshold>)>>
where
    S: AsyncWrite + Unpin,
{
    let guard = context.coordinator.begin_read().await;
    let ctx = Arc::clone(context);
    let (device_id, device_name) = (request.device_id, request.device_name.clone());

    let resolved = run_blocking(guard, move || {
        let device = lookup::resolve_analog_device(
            ctx.config_store.as_ref(),
            ctx.runtime_store.as_ref(),
            device_id,
            &device_name,
        )?;
        let stored = if load_thresholds {
            ctx.runtime_store.thresholds(device.id)?
        } else {
            vec![]
        };
        Ok::<_, Error>((device, stored))
    })
    .await?;

    match resolved {
        Ok((device, stored)) => {
            let response = Response::new(
                ResponseStatus::Ok,
                device.id,
                &format!("Device is valid (name={}, id={})", device.name, device.id),
            );
            write_message(stream, &response).await?;
            Ok(Some((device, stored)))
        }
        Err(err) => {
            warn!("Analog device check failed: {}", err);
            write_message(stream, &invalid_device_response(request, &err)).await?;
            Ok(None)
        }
    }
}

async fn get_thresholds<S>(
    context: &Arc<ServerContext>,
    request: &Request,
    stream: &mut S,
) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let Some((device, stored)) = check_analog_device(context, request, stream, true).await? else {
        return Ok(());
    };

    let record = ThresholdChangeRequest {
        tables: ThresholdArrays::from_stored(&stored),
        disable: false,
        device_id: device.id,
        device_name: truncate_text(&device.name, DEVICE_NAME_LEN),
        user_name: String::new(),
        reason: String::new(),
    };

    debug!("Sending {} stored thresholds of {}", stored.len(), device.name);
    write_message(stream, &record).await
}

async fn change_thresholds<S>(
    context: &Arc<ServerContext>,
    request: &Request,
    stream: &mut S,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let Some((device, _)) = check_analog_device(context, request, stream, false).await? else {
        return Ok(());
    };

    //No section is held while waiting for the client
    let record: ThresholdChangeRequest = match read_message(stream).await {
        Ok(record) => record,
        Err(err @ Error::MalformedMessage(_)) => {
            warn!("Malformed threshold change record: {}", err);
            let _ = write_message(stream, &ThresholdChangeResponse::failed(&err.to_string())).await;
            return Err(err);
        }
        Err(err) => return Err(err),
    };

    let plan = match ChangePlan::new(device, &record) {
        Ok(plan) => plan,
        Err(err) => {
            warn!("Refusing threshold change: {}", err);
            return write_message(stream, &ThresholdChangeResponse::failed(&err.to_string())).await;
        }
    };

    let guard = context.coordinator.begin_read().await;
    let ctx = Arc::clone(context);
    let to_validate = plan.clone();
    let validated = run_blocking(guard, move || to_validate.validate(ctx.runtime_store.as_ref())).await?;

    if let Err(err) = validated {
        warn!("{}", err);
        return write_message(stream, &ThresholdChangeResponse::failed(&err.to_string())).await;
    }
    debug!(
        "Validated {} thresholds for {}, waiting for the writer lock",
        plan.entries().len(),
        plan.device().name
    );

    let guard = context.coordinator.begin_write().await;
    let ctx = Arc::clone(context);
    let executed = run_blocking(guard, move || {
        plan.execute(
            ctx.runtime_store.as_ref(),
            ctx.hardware.as_ref(),
            ctx.change_options,
        )
    })
    .await?;

    let response = match executed {
        Ok(outcome) if outcome.success() => ThresholdChangeResponse::ok(),
        Ok(outcome) => {
            if !outcome.failed_points.is_empty() {
                warn!(
                    "Failed to update the following control points: {}",
                    outcome.failed_points.join(", ")
                );
            }
            ThresholdChangeResponse::failed(&outcome.failure_message())
        }
        Err(err) => {
            warn!("Threshold change aborted: {}", err);
            ThresholdChangeResponse::failed(&err.to_string())
        }
    };

    write_message(stream, &response).await
}

async fn restore_application<S>(
    context: &Arc<ServerContext>,
    request: &Request,
    stream: &mut S,
) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let application_id = request.device_id;
    let guard = context.coordinator.begin_read().await;
    let ctx = Arc::clone(context);

    let restored = run_blocking(guard, move || {
        ThresholdRestorer::new(
            ctx.config_store.as_ref(),
            ctx.runtime_store.as_ref(),
            ctx.hardware.as_ref(),
            ctx.restore_options,
        )
        .restore(application_id)
    })
    .await?;

    let response = match restored {
        Ok(report) if report.skipped_points.is_empty() => Response::new(
            ResponseStatus::Ok,
            application_id,
            &format!("Thresholds restored for app {}", application_id),
        ),
        Ok(report) => Response::new(
            ResponseStatus::Ok,
            application_id,
            &format!(
                "Thresholds restored for app {}, skipped: {}",
                application_id,
                report.skipped_points.join(", ")
            ),
        ),
        Err(failure) => {
            warn!("{}", failure);
            Response::new(restore_status(&failure), application_id, &failure.to_string())
        }
    };

    write_message(stream, &response).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_errors_map_to_bad_device() {
        assert_eq!(
            lookup_status(&Error::DeviceNotFound("id 3".to_string())),
            ResponseStatus::BadDevice
        );
        assert_eq!(
            lookup_status(&Error::NotAnalogDevice("DIO1".to_string())),
            ResponseStatus::BadDevice
        );
        assert_eq!(
            lookup_status(&Error::Persistence("disk I/O error".to_string())),
            ResponseStatus::BadRequest
        );
    }

    #[test]
    fn restore_failures_map_by_stage() {
        let failure = |stage| RestoreFailure {
            stage,
            error: Error::ApplicationNotFound(1),
        };

        assert_eq!(
            restore_status(&failure(RestoreStage::AppLookup)),
            ResponseStatus::RestoreInvalidApp
        );
        assert_eq!(
            restore_status(&failure(RestoreStage::DeviceEnumeration)),
            ResponseStatus::RestoreInvalidDevice
        );
        assert_eq!(
            restore_status(&failure(RestoreStage::Verify)),
            ResponseStatus::RestoreFail
        );
    }

    #[test]
    fn invalid_device_message_names_the_lookup_key() {
        let request = Request::new(RequestKind::DeviceCheck, -1, "BPM1B");
        let response = invalid_device_response(
            &request,
            &Error::DeviceNotFound("name BPM1B not in config database".to_string()),
        );

        assert_eq!(response.status, ResponseStatus::BadDevice);
        assert_eq!(response.device_id, 0);
        assert!(response.status_message.starts_with("Device not valid (name=BPM1B"));
    }
}
