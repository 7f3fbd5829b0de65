use crate::common::error::{Error, Result};
use crate::protocol::codec::{truncate_text, Decoder, Encoder};
use crate::protocol::{RequestKind, ResponseStatus, WireMessage, PROTOCOL_VERSION};
use crate::thresholds::table::{ThresholdArrays, MULTI_SLOT_CELLS, SINGLE_SLOT_CELLS};

pub const DEVICE_NAME_LEN: usize = 50;
pub const USER_NAME_LEN: usize = 50;
pub const REASON_LEN: usize = 200;
pub const STATUS_MESSAGE_LEN: usize = 200;
pub const CHANGE_MESSAGE_LEN: usize = 1000;

/// First record of every exchange.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub version: u16,
    pub kind: u16,
    /// Device id, or application id for restores. Negative means "look up by name".
    pub device_id: i32,
    pub device_name: String,
}

impl Request {
    pub fn new(kind: RequestKind, device_id: i32, device_name: &str) -> Self {
        Request {
            version: PROTOCOL_VERSION,
            kind: kind as u16,
            device_id,
            device_name: device_name.to_string(),
        }
    }

    pub fn request_kind(&self) -> Option<RequestKind> {
        RequestKind::from_code(self.kind)
    }

    //Untagged requests come from clients predating explicit versioning
    pub fn is_supported_version(&self) -> bool {
        self.version == 0 || self.version == PROTOCOL_VERSION
    }
}

impl WireMessage for Request {
    const SIZE: usize = 4 + 4 + DEVICE_NAME_LEN;

    fn encode(&self) -> Result<Vec<u8>> {
        let type_word = ((self.version as u32) << 16) | self.kind as u32;

        let mut encoder = Encoder::with_capacity(Self::SIZE);
        encoder.put_i32(type_word as i32);
        encoder.put_i32(self.device_id);
        encoder.put_str("device name", &self.device_name, DEVICE_NAME_LEN)?;
        encoder.finish(Self::SIZE)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut decoder = Decoder::new(bytes, Self::SIZE)?;
        let type_word = decoder.get_i32()? as u32;

        Ok(Request {
            version: (type_word >> 16) as u16,
            kind: (type_word & 0xffff) as u16,
            device_id: decoder.get_i32()?,
            device_name: decoder.get_str("device name", DEVICE_NAME_LEN)?,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub status: ResponseStatus,
    pub device_id: i32,
    pub status_message: String,
}

impl Response {
    /// Builds a response, cutting the message down to the field width.
    pub fn new(status: ResponseStatus, device_id: i32, status_message: &str) -> Self {
        Response {
            status,
            device_id,
            status_message: truncate_text(status_message, STATUS_MESSAGE_LEN),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }
}

impl WireMessage for Response {
    const SIZE: usize = 4 + 4 + STATUS_MESSAGE_LEN;

    fn encode(&self) -> Result<Vec<u8>> {
        let mut encoder = Encoder::with_capacity(Self::SIZE);
        encoder.put_i32(self.status as i32);
        encoder.put_i32(self.device_id);
        encoder.put_str("status message", &self.status_message, STATUS_MESSAGE_LEN)?;
        encoder.finish(Self::SIZE)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut decoder = Decoder::new(bytes, Self::SIZE)?;
        let raw_status = decoder.get_i32()?;
        let status = ResponseStatus::from_code(raw_status).ok_or_else(|| {
            Error::MalformedMessage(format!("unknown response status {}", raw_status))
        })?;

        Ok(Response {
            status,
            device_id: decoder.get_i32()?,
            status_message: decoder.get_str("status message", STATUS_MESSAGE_LEN)?,
        })
    }
}

/// Threshold tables plus the change metadata. The server also uses this record to
/// report the stored thresholds of a device (user and reason left empty).
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ThresholdChangeRequest {
    pub tables: ThresholdArrays,
    pub disable: bool,
    pub device_id: i32,
    pub device_name: String,
    pub user_name: String,
    pub reason: String,
}

impl WireMessage for ThresholdChangeRequest {
    const SIZE: usize = 2 * (SINGLE_SLOT_CELLS * (4 + 8))
        + 2 * (MULTI_SLOT_CELLS * (4 + 8))
        + 4
        + 4
        + DEVICE_NAME_LEN
        + USER_NAME_LEN
        + REASON_LEN;

    fn encode(&self) -> Result<Vec<u8>> {
        let tables = &self.tables;
        let mut encoder = Encoder::with_capacity(Self::SIZE);

        encoder.put_i32_slice(&tables.legacy_active);
        encoder.put_f64_slice(&tables.legacy_value);
        encoder.put_i32_slice(&tables.idle_active);
        encoder.put_f64_slice(&tables.idle_value);
        encoder.put_i32_slice(&tables.current_active);
        encoder.put_f64_slice(&tables.current_value);
        encoder.put_i32_slice(&tables.alternate_active);
        encoder.put_f64_slice(&tables.alternate_value);

        encoder.put_i32(self.disable as i32);
        encoder.put_i32(self.device_id);
        encoder.put_str("device name", &self.device_name, DEVICE_NAME_LEN)?;
        encoder.put_str("user name", &self.user_name, USER_NAME_LEN)?;
        encoder.put_str("reason", &self.reason, REASON_LEN)?;
        encoder.finish(Self::SIZE)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut decoder = Decoder::new(bytes, Self::SIZE)?;

        let tables = ThresholdArrays {
            legacy_active: decoder.get_i32_array()?,
            legacy_value: decoder.get_f64_array()?,
            idle_active: decoder.get_i32_array()?,
            idle_value: decoder.get_f64_array()?,
            current_active: decoder.get_i32_array()?,
            current_value: decoder.get_f64_array()?,
            alternate_active: decoder.get_i32_array()?,
            alternate_value: decoder.get_f64_array()?,
        };

        Ok(ThresholdChangeRequest {
            tables,
            disable: decoder.get_i32()? != 0,
            device_id: decoder.get_i32()?,
            device_name: decoder.get_str("device name", DEVICE_NAME_LEN)?,
            user_name: decoder.get_str("user name", USER_NAME_LEN)?,
            reason: decoder.get_str("reason", REASON_LEN)?,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ThresholdChangeResponse {
    /// 0 on success, 1 on failure.
    pub status: i32,
    pub message: String,
}

impl ThresholdChangeResponse {
    pub fn ok() -> Self {
        ThresholdChangeResponse {
            status: 0,
            message: "OK".to_string(),
        }
    }

    pub fn failed(message: &str) -> Self {
        ThresholdChangeResponse {
            status: 1,
            message: truncate_text(message, CHANGE_MESSAGE_LEN),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 0
    }
}

impl WireMessage for ThresholdChangeResponse {
    const SIZE: usize = 4 + CHANGE_MESSAGE_LEN;

    fn encode(&self) -> Result<Vec<u8>> {
        let mut encoder = Encoder::with_capacity(Self::SIZE);
        encoder.put_i32(self.status);
        encoder.put_str("message", &self.message, CHANGE_MESSAGE_LEN)?;
        encoder.finish(Self::SIZE)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut decoder = Decoder::new(bytes, Self::SIZE)?;

        Ok(ThresholdChangeResponse {
            status: decoder.get_i32()?,
            message: decoder.get_str("message", CHANGE_MESSAGE_LEN)?,
        })
    }
}
