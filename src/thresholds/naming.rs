use crate::common::model::{Application, Device, ThresholdKey, ThresholdTableKind};

const ENABLE_SUFFIX: &str = "_EN";
const RELEASE_SUFFIX: &str = "THR_LOADED";

fn integrator_label(device: &Device, integrator: u8) -> String {
    if device.is_bpm() {
        match integrator {
            0 => return "X".to_string(),
            1 => return "Y".to_string(),
            2 => return "TMIT".to_string(),
            _ => {}
        }
    }
    format!("I{}", integrator)
}

fn table_label(table: ThresholdTableKind, slot: u8) -> String {
    match table {
        ThresholdTableKind::Legacy => "L1".to_string(),
        ThresholdTableKind::Idle => "IDL".to_string(),
        ThresholdTableKind::Current => format!("T{}", slot),
        ThresholdTableKind::Alternate => format!("T{}_ALT", slot),
    }
}

/// Control point holding the threshold value, e.g. `BPM1B:X_T3_HIHI`.
pub fn threshold_point(device: &Device, key: &ThresholdKey) -> String {
    format!(
        "{}:{}_{}_{}",
        device.name,
        integrator_label(device, key.integrator),
        table_label(key.table, key.slot),
        key.side.label()
    )
}

pub fn enable_point(threshold_point: &str) -> String {
    format!("{}{}", threshold_point, ENABLE_SUFFIX)
}

/// Control point the application waits on before using restored thresholds.
pub fn release_point(application: &Application) -> String {
    format!("{}:{}", application.pv_prefix, RELEASE_SUFFIX)
}
