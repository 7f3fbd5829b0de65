//! Async client for the threshold protocol, used by operator tools.

use tokio::net::{TcpStream, ToSocketAddrs};

use crate::common::error::Result;
use crate::protocol::{
    read_message, write_message, Request, RequestKind, Response, ThresholdChangeRequest,
    ThresholdChangeResponse,
};

pub struct ThresholdClient {
    stream: TcpStream,
}

impl ThresholdClient {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(ThresholdClient { stream })
    }

    /// Sends a request as is, without waiting for an answer.
    pub async fn send_raw(&mut self, request: &Request) -> Result<()> {
        write_message(&mut self.stream, request).await
    }

    pub async fn read_response(&mut self) -> Result<Response> {
        read_message(&mut self.stream).await
    }

    async fn exchange(&mut self, request: &Request) -> Result<Response> {
        self.send_raw(request).await?;
        self.read_response().await
    }

    /// Pass a negative `device_id` to look the device up by name.
    pub async fn check_device(&mut self, device_id: i32, device_name: &str) -> Result<Response> {
        self.exchange(&Request::new(RequestKind::DeviceCheck, device_id, device_name))
            .await
    }

    /// Stored thresholds of an analog device, `None` when the server refused the device.
    pub async fn get_thresholds(
        &mut self,
        device_id: i32,
        device_name: &str,
    ) -> Result<(Response, Option<ThresholdChangeRequest>)> {
        let response = self
            .exchange(&Request::new(RequestKind::GetThreshold, device_id, device_name))
            .await?;

        if !response.is_ok() {
            return Ok((response, None));
        }

        let record = read_message(&mut self.stream).await?;
        Ok((response, Some(record)))
    }

    pub async fn change_thresholds(
        &mut self,
        device_id: i32,
        device_name: &str,
        change: &ThresholdChangeRequest,
    ) -> Result<(Response, Option<ThresholdChangeResponse>)> {
        let response = self
            .exchange(&Request::new(RequestKind::ChangeThreshold, device_id, device_name))
            .await?;

        if !response.is_ok() {
            return Ok((response, None));
        }

        write_message(&mut self.stream, change).await?;
        let result = read_message(&mut self.stream).await?;
        Ok((response, Some(result)))
    }

    pub async fn restore(&mut self, application_id: i32) -> Result<Response> {
        self.exchange(&Request::new(
            RequestKind::RestoreAppThresholds,
            application_id,
            "",
        ))
        .await
    }
}
