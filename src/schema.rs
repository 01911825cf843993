//! Native and legacy JSON schemas for experiment logs, and the legacy
//! schema converter (component G — a thin, pure-function collaborator).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The native "sysid"-tagged experiment log.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NativeDocument {
    pub sysid: String,
    pub test: String,
    pub units: String,
    #[serde(rename = "unitsPerRotation")]
    pub units_per_rotation: f64,
    #[serde(rename = "slow-forward")]
    pub slow_forward: Vec<Vec<f64>>,
    #[serde(rename = "slow-backward")]
    pub slow_backward: Vec<Vec<f64>>,
    #[serde(rename = "fast-forward")]
    pub fast_forward: Vec<Vec<f64>>,
    #[serde(rename = "fast-backward")]
    pub fast_backward: Vec<Vec<f64>>,
}

impl NativeDocument {
    /// Parse a value already known to carry the `sysid` tag.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(Error::Json)
    }
}

/// Require the top-level `sysid` tag before attempting a full parse, so a
/// missing tag is reported as [`Error::SchemaMismatch`] rather than a
/// generic JSON decode error.
pub fn require_sysid_tag(value: &Value) -> Result<()> {
    match value.get("sysid") {
        Some(_) => Ok(()),
        None => Err(Error::SchemaMismatch),
    }
}

/// The legacy "frc-char"-style schema: same four direction arrays, but each
/// row carries an extra leading battery-voltage column the native schema
/// dropped, and there is no `sysid` tag.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyDocument {
    pub test: String,
    pub units: String,
    #[serde(rename = "unitsPerRotation")]
    pub units_per_rotation: f64,
    #[serde(rename = "slow-forward")]
    pub slow_forward: Vec<Vec<f64>>,
    #[serde(rename = "slow-backward")]
    pub slow_backward: Vec<Vec<f64>>,
    #[serde(rename = "fast-forward")]
    pub fast_forward: Vec<Vec<f64>>,
    #[serde(rename = "fast-backward")]
    pub fast_backward: Vec<Vec<f64>>,
}

const SYSID_TAG: &str = "0.1.0";

/// Legacy rows are `[t, batteryVoltage, V, p, v]`; drop the battery column
/// at index 1, keeping the leading timestamp.
fn drop_battery_column(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    rows.iter()
        .map(|row| {
            let mut row = row.clone();
            if row.len() > 1 {
                row.remove(1);
            }
            row
        })
        .collect()
}

/// Translate a legacy-schema document into the native schema. Pure function;
/// the caller decides whether/where to write the result.
pub fn convert_legacy(doc: LegacyDocument) -> NativeDocument {
    NativeDocument {
        sysid: SYSID_TAG.to_string(),
        test: doc.test,
        units: doc.units,
        units_per_rotation: doc.units_per_rotation,
        slow_forward: drop_battery_column(&doc.slow_forward),
        slow_backward: drop_battery_column(&doc.slow_backward),
        fast_forward: drop_battery_column(&doc.fast_forward),
        fast_backward: drop_battery_column(&doc.fast_backward),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sysid_tag_is_schema_mismatch() {
        let value = serde_json::json!({"test": "Simple"});
        assert!(matches!(require_sysid_tag(&value), Err(Error::SchemaMismatch)));
    }

    #[test]
    fn present_sysid_tag_passes() {
        let value = serde_json::json!({"sysid": "1.0.0"});
        assert!(require_sysid_tag(&value).is_ok());
    }

    #[test]
    fn legacy_conversion_drops_battery_column_and_stamps_tag() {
        let legacy = LegacyDocument {
            test: "Simple".to_string(),
            units: "Rotations".to_string(),
            units_per_rotation: 1.0,
            slow_forward: vec![vec![0.0, 12.0, 1.0, 0.0, 0.1]],
            slow_backward: vec![],
            fast_forward: vec![],
            fast_backward: vec![],
        };
        let native = convert_legacy(legacy);
        assert_eq!(native.sysid, SYSID_TAG);
        assert_eq!(native.slow_forward, vec![vec![0.0, 1.0, 0.0, 0.1]]);
    }
}
