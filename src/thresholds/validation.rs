use std::collections::{BTreeMap, HashMap};

use crate::common::error::{Error, Result};
use crate::common::model::{Side, StoredThreshold, ThresholdEntry, ThresholdKey, ThresholdTableKind};

/// New values requested for one (table, slot, integrator), either side may be missing.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PairChange {
    pub low: Option<f64>,
    pub high: Option<f64>,
}

pub type StoredThresholds = HashMap<ThresholdKey, StoredThreshold>;

pub fn index_stored(stored: Vec<StoredThreshold>) -> StoredThresholds {
    stored.into_iter().map(|t| (t.key, t)).collect()
}

pub fn group_pairs(entries: &[ThresholdEntry]) -> BTreeMap<(ThresholdTableKind, u8, u8), PairChange> {
    let mut pairs: BTreeMap<(ThresholdTableKind, u8, u8), PairChange> = BTreeMap::new();

    for entry in entries {
        let pair = pairs
            .entry((entry.key.table, entry.key.slot, entry.key.integrator))
            .or_default();

        match entry.key.side {
            Side::Low => pair.low = Some(entry.value),
            Side::High => pair.high = Some(entry.value),
        }
    }

    pairs
}

/// Checks LOLO < HIHI for every pair touched by `entries`. When only one side is
/// supplied the other one is taken from the stored value, active or not. The whole
/// batch must pass before anything gets written.
pub fn validate_entries(
    device_name: &str,
    entries: &[ThresholdEntry],
    stored: &StoredThresholds,
) -> Result<()> {
    for ((table, slot, integrator), pair) in group_pairs(entries) {
        let violation = |low: f64, high: f64, detail: String| Error::ThresholdOrderingViolation {
            device: device_name.to_string(),
            table,
            integrator,
            slot,
            low,
            high,
            detail,
        };

        let stored_value = |side: Side| {
            stored
                .get(&ThresholdKey::new(table, slot, integrator, side))
                .map(|t| t.value)
        };

        match (pair.low, pair.high) {
            (Some(low), Some(high)) => {
                //Negated comparison also refuses NaN
                if !(low < high) {
                    return Err(violation(
                        low,
                        high,
                        format!(
                            "HIHI threshold (value={}) smaller or equal to LOLO (value={}), cannot proceed",
                            high, low
                        ),
                    ));
                }
            }
            (Some(low), None) => {
                if let Some(high) = stored_value(Side::High) {
                    if !(low < high) {
                        return Err(violation(
                            low,
                            high,
                            format!(
                                "Specified LOLO value ({}) is greater or equal than the stored HIHI value ({})",
                                low, high
                            ),
                        ));
                    }
                }
            }
            (None, Some(high)) => {
                if let Some(low) = stored_value(Side::Low) {
                    if !(low < high) {
                        return Err(violation(
                            low,
                            high,
                            format!(
                                "Specified HIHI value ({}) is smaller or equal than the stored LOLO value ({})",
                                high, low
                            ),
                        ));
                    }
                }
            }
            (None, None) => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry(side: Side, value: f64) -> ThresholdEntry {
        ThresholdEntry {
            key: ThresholdKey::new(ThresholdTableKind::Current, 0, 0, side),
            value,
        }
    }

    fn stored(side: Side, value: f64, active: bool) -> StoredThresholds {
        index_stored(vec![StoredThreshold {
            key: ThresholdKey::new(ThresholdTableKind::Current, 0, 0, side),
            value,
            active,
        }])
    }

    #[test]
    fn partial_low_is_checked_against_stored_high() {
        let stored = stored(Side::High, 10.0, true);

        let err = validate_entries("BPM1", &[entry(Side::Low, 12.0)], &stored).unwrap_err();
        match err {
            Error::ThresholdOrderingViolation { low, high, .. } => {
                assert_eq!(low, 12.0);
                assert_eq!(high, 10.0);
            }
            other => panic!("unexpected error {other}"),
        }

        assert!(validate_entries("BPM1", &[entry(Side::Low, 5.0)], &stored).is_ok());
    }

    #[test]
    fn partial_high_is_checked_against_inactive_stored_low() {
        let stored = stored(Side::Low, 3.0, false);

        let err = validate_entries("BPM1", &[entry(Side::High, 3.0)], &stored).unwrap_err();
        assert!(err.to_string().contains("HIHI"));
        assert!(err.to_string().contains("LOLO"));
        assert!(validate_entries("BPM1", &[entry(Side::High, 3.5)], &stored).is_ok());
    }

    #[test]
    fn partial_change_without_stored_counterpart_passes() {
        assert!(validate_entries("BPM1", &[entry(Side::Low, 100.0)], &HashMap::new()).is_ok());
    }

    #[test]
    fn error_names_device_table_integrator_and_slot() {
        let entries = vec![
            ThresholdEntry {
                key: ThresholdKey::new(ThresholdTableKind::Alternate, 6, 2, Side::Low),
                value: 4.0,
            },
            ThresholdEntry {
                key: ThresholdKey::new(ThresholdTableKind::Alternate, 6, 2, Side::High),
                value: 1.0,
            },
        ];

        let message = validate_entries("PBLM7", &entries, &HashMap::new())
            .unwrap_err()
            .to_string();

        assert!(message.contains("PBLM7"));
        assert!(message.contains("alternate"));
        assert!(message.contains("integrator 2"));
        assert!(message.contains("threshold 6"));
    }

    #[test]
    fn one_bad_pair_fails_the_whole_batch() {
        let entries = vec![
            entry(Side::Low, 1.0),
            entry(Side::High, 2.0),
            ThresholdEntry {
                key: ThresholdKey::new(ThresholdTableKind::Idle, 0, 1, Side::Low),
                value: 9.0,
            },
            ThresholdEntry {
                key: ThresholdKey::new(ThresholdTableKind::Idle, 0, 1, Side::High),
                value: 9.0,
            },
        ];

        assert!(validate_entries("D", &entries, &HashMap::new()).is_err());
    }

    proptest! {
        #[test]
        fn full_pairs_pass_iff_low_below_high(low in -1e6f64..1e6, high in -1e6f64..1e6) {
            let result = validate_entries(
                "D",
                &[entry(Side::Low, low), entry(Side::High, high)],
                &HashMap::new(),
            );

            if low < high {
                prop_assert!(result.is_ok());
            } else {
                let is_violation = matches!(result, Err(Error::ThresholdOrderingViolation { .. }));
                prop_assert!(is_violation);
            }
        }

        #[test]
        fn incoming_pair_ignores_stored_values(low in -100f64..0.0, high in 1f64..100.0, stale in -1e3f64..1e3) {
            let mut baseline = stored(Side::High, stale, true);
            baseline.extend(stored(Side::Low, stale, true));

            prop_assert!(validate_entries(
                "D",
                &[entry(Side::Low, low), entry(Side::High, high)],
                &baseline,
            ).is_ok());
        }
    }
}
