use crate::common::error::Result;

pub mod loopback;

pub use loopback::{HardwareSeed, LoopbackHardware};

/// An open connection to a named control point.
#[derive(Debug, PartialEq, Eq)]
pub struct ControlPoint {
    pub name: String,
    pub token: u64,
}

/// Gateway to live control points.
pub trait HardwareInterface: Send + Sync {
    /// Fails with `ControlPointUnreachable` when the point does not answer.
    fn connect(&self, name: &str) -> Result<ControlPoint>;

    fn read(&self, point: &ControlPoint) -> Result<f64>;

    fn write(&self, point: &ControlPoint, value: f64) -> Result<()>;

    fn is_writable(&self, point: &ControlPoint) -> bool;

    fn disconnect(&self, point: &ControlPoint);
}

/// Scoped control point connection, disconnected when dropped.
pub struct PointHandle<'a> {
    hardware: &'a dyn HardwareInterface,
    point: ControlPoint,
}

impl<'a> PointHandle<'a> {
    pub fn open(hardware: &'a dyn HardwareInterface, name: &str) -> Result<Self> {
        let point = hardware.connect(name)?;
        Ok(PointHandle { hardware, point })
    }

    pub fn name(&self) -> &str {
        &self.point.name
    }

    pub fn read(&self) -> Result<f64> {
        self.hardware.read(&self.point)
    }

    pub fn write(&self, value: f64) -> Result<()> {
        self.hardware.write(&self.point, value)
    }

    pub fn is_writable(&self) -> bool {
        self.hardware.is_writable(&self.point)
    }
}

impl Drop for PointHandle<'_> {
    fn drop(&mut self) {
        self.hardware.disconnect(&self.point);
    }
}

impl std::fmt::Debug for PointHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointHandle")
            .field("point", &self.point)
            .finish()
    }
}

/// Writes a value followed by its enable flag.
pub fn write_with_enable(
    hardware: &dyn HardwareInterface,
    point_name: &str,
    enable_name: &str,
    value: f64,
    enable: bool,
) -> Result<()> {
    let point = PointHandle::open(hardware, point_name)?;
    let enable_point = PointHandle::open(hardware, enable_name)?;

    point.write(value)?;
    enable_point.write(if enable { 1.0 } else { 0.0 })
}
