use crate::common::error::{Error, Result};

/// Appends little endian fields to a fixed size record.
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn with_capacity(size: usize) -> Self {
        Encoder {
            buf: Vec::with_capacity(size),
        }
    }

    pub fn put_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_i32_slice(&mut self, values: &[i32]) {
        for value in values {
            self.put_i32(*value);
        }
    }

    pub fn put_f64_slice(&mut self, values: &[f64]) {
        for value in values {
            self.put_f64(*value);
        }
    }

    /// Writes `value` zero padded to `capacity` bytes, longer strings are refused.
    pub fn put_str(&mut self, field: &str, value: &str, capacity: usize) -> Result<()> {
        let bytes = value.as_bytes();

        if bytes.len() > capacity {
            return Err(Error::MalformedMessage(format!(
                "{} is {} bytes long, capacity is {}",
                field,
                bytes.len(),
                capacity
            )));
        }

        self.buf.extend_from_slice(bytes);
        self.buf.resize(self.buf.len() + capacity - bytes.len(), 0);
        Ok(())
    }

    pub fn finish(self, expected_size: usize) -> Result<Vec<u8>> {
        if self.buf.len() != expected_size {
            return Err(Error::MalformedMessage(format!(
                "encoded {} bytes, record size is {}",
                self.buf.len(),
                expected_size
            )));
        }
        Ok(self.buf)
    }
}

/// Reads little endian fields out of a record whose size was already checked.
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8], expected_size: usize) -> Result<Self> {
        if data.len() != expected_size {
            return Err(Error::MalformedMessage(format!(
                "received {} bytes, record size is {}",
                data.len(),
                expected_size
            )));
        }

        Ok(Decoder { data, pos: 0 })
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.pos + N;
        let bytes = self
            .data
            .get(self.pos..end)
            .and_then(|slice| <[u8; N]>::try_from(slice).ok())
            .ok_or_else(|| Error::MalformedMessage("record ended early".to_string()))?;
        self.pos = end;
        Ok(bytes)
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take::<4>()?))
    }

    pub fn get_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.take::<8>()?))
    }

    pub fn get_i32_array<const N: usize>(&mut self) -> Result<[i32; N]> {
        let mut values = [0; N];
        for value in values.iter_mut() {
            *value = self.get_i32()?;
        }
        Ok(values)
    }

    pub fn get_f64_array<const N: usize>(&mut self) -> Result<[f64; N]> {
        let mut values = [0.0; N];
        for value in values.iter_mut() {
            *value = self.get_f64()?;
        }
        Ok(values)
    }

    /// Reads a fixed width string, trailing zero bytes are stripped.
    pub fn get_str(&mut self, field: &str, capacity: usize) -> Result<String> {
        let end = self.pos + capacity;
        let raw = self
            .data
            .get(self.pos..end)
            .ok_or_else(|| Error::MalformedMessage("record ended early".to_string()))?;
        self.pos = end;

        let content_len = raw.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);

        String::from_utf8(raw[..content_len].to_vec())
            .map_err(|_| Error::MalformedMessage(format!("{} is not valid UTF-8", field)))
    }
}

/// Cuts human readable text so it fits a fixed width field, on a char boundary.
pub fn truncate_text(text: &str, capacity: usize) -> String {
    if text.len() <= capacity {
        return text.to_string();
    }

    let mut end = capacity;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
