use crate::common::error::{Error, Result};
use crate::common::model::{
    Side, StoredThreshold, ThresholdEntry, ThresholdKey, ThresholdTableKind, INTEGRATOR_COUNT,
};

/// Cells in the legacy and idle tables: 2 rows (low, high) x 4 integrators.
pub const SINGLE_SLOT_CELLS: usize = 8;
/// Cells in the current and alternate tables: 16 rows (slots 0-7 low, then high) x 4 integrators.
pub const MULTI_SLOT_CELLS: usize = 64;

/// Flat active/value arrays for the four threshold tables, laid out exactly as on the wire.
#[derive(Clone, Debug, PartialEq)]
pub struct ThresholdArrays {
    pub legacy_active: [i32; SINGLE_SLOT_CELLS],
    pub legacy_value: [f64; SINGLE_SLOT_CELLS],
    pub idle_active: [i32; SINGLE_SLOT_CELLS],
    pub idle_value: [f64; SINGLE_SLOT_CELLS],
    pub current_active: [i32; MULTI_SLOT_CELLS],
    pub current_value: [f64; MULTI_SLOT_CELLS],
    pub alternate_active: [i32; MULTI_SLOT_CELLS],
    pub alternate_value: [f64; MULTI_SLOT_CELLS],
}

impl Default for ThresholdArrays {
    fn default() -> Self {
        ThresholdArrays {
            legacy_active: [0; SINGLE_SLOT_CELLS],
            legacy_value: [0.0; SINGLE_SLOT_CELLS],
            idle_active: [0; SINGLE_SLOT_CELLS],
            idle_value: [0.0; SINGLE_SLOT_CELLS],
            current_active: [0; MULTI_SLOT_CELLS],
            current_value: [0.0; MULTI_SLOT_CELLS],
            alternate_active: [0; MULTI_SLOT_CELLS],
            alternate_value: [0.0; MULTI_SLOT_CELLS],
        }
    }
}

impl ThresholdArrays {
    pub fn active(&self, table: ThresholdTableKind) -> &[i32] {
        match table {
            ThresholdTableKind::Legacy => &self.legacy_active,
            ThresholdTableKind::Idle => &self.idle_active,
            ThresholdTableKind::Current => &self.current_active,
            ThresholdTableKind::Alternate => &self.alternate_active,
        }
    }

    pub fn values(&self, table: ThresholdTableKind) -> &[f64] {
        match table {
            ThresholdTableKind::Legacy => &self.legacy_value,
            ThresholdTableKind::Idle => &self.idle_value,
            ThresholdTableKind::Current => &self.current_value,
            ThresholdTableKind::Alternate => &self.alternate_value,
        }
    }

    fn table_mut(&mut self, table: ThresholdTableKind) -> (&mut [i32], &mut [f64]) {
        match table {
            ThresholdTableKind::Legacy => (&mut self.legacy_active, &mut self.legacy_value),
            ThresholdTableKind::Idle => (&mut self.idle_active, &mut self.idle_value),
            ThresholdTableKind::Current => (&mut self.current_active, &mut self.current_value),
            ThresholdTableKind::Alternate => {
                (&mut self.alternate_active, &mut self.alternate_value)
            }
        }
    }

    /// Position of a key in its table's flat arrays, `None` when out of bounds.
    pub fn cell_index(key: &ThresholdKey) -> Option<usize> {
        if !key.is_valid() {
            return None;
        }

        let slots = key.table.slot_count() as usize;
        let row = match key.side {
            Side::Low => key.slot as usize,
            Side::High => key.slot as usize + slots,
        };

        Some(row * INTEGRATOR_COUNT as usize + key.integrator as usize)
    }

    pub fn get(&self, key: &ThresholdKey) -> Option<(bool, f64)> {
        let index = Self::cell_index(key)?;
        let active = *self.active(key.table).get(index)?;
        let value = *self.values(key.table).get(index)?;
        Some((active != 0, value))
    }

    pub fn set(&mut self, key: &ThresholdKey, value: f64, active: bool) -> Result<()> {
        let index = Self::cell_index(key).ok_or_else(|| {
            Error::MalformedMessage(format!("threshold {:?} is out of table bounds", key))
        })?;

        let (active_cells, value_cells) = self.table_mut(key.table);

        match (active_cells.get_mut(index), value_cells.get_mut(index)) {
            (Some(active_cell), Some(value_cell)) => {
                *active_cell = active as i32;
                *value_cell = value;
                Ok(())
            }
            _ => Err(Error::MalformedMessage(format!(
                "table {} is shorter than expected",
                key.table
            ))),
        }
    }

    /// Expands the arrays into the ordered list of active entries: legacy low/high,
    /// idle low/high, then per slot current low/high and alternate low/high.
    pub fn build_entries(&self) -> Vec<ThresholdEntry> {
        let mut entries = vec![];

        for table in [ThresholdTableKind::Legacy, ThresholdTableKind::Idle] {
            for side in Side::ALL {
                self.collect_row(table, 0, side, &mut entries);
            }
        }

        for slot in 0..ThresholdTableKind::Current.slot_count() {
            for table in [ThresholdTableKind::Current, ThresholdTableKind::Alternate] {
                for side in Side::ALL {
                    self.collect_row(table, slot, side, &mut entries);
                }
            }
        }

        entries
    }

    fn collect_row(
        &self,
        table: ThresholdTableKind,
        slot: u8,
        side: Side,
        entries: &mut Vec<ThresholdEntry>,
    ) {
        for integrator in 0..INTEGRATOR_COUNT {
            let key = ThresholdKey::new(table, slot, integrator, side);

            if let Some((true, value)) = self.get(&key) {
                entries.push(ThresholdEntry { key, value });
            }
        }
    }

    /// Inverse of `build_entries` over stored rows, inactive rows keep their value.
    pub fn from_stored(stored: &[StoredThreshold]) -> Self {
        let mut arrays = ThresholdArrays::default();

        for threshold in stored {
            //Rows outside the table dimensions can't be represented on the wire
            let _ = arrays.set(&threshold.key, threshold.value, threshold.active);
        }

        arrays
    }
}
