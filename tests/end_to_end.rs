//! Drives a full synthetic experiment log through `AnalysisManager`: schema
//! parsing, quasistatic trimming, median-filtered finite differencing, step
//! trimming, dataset assembly, feedforward OLS, and feedback synthesis.

use serde_json::json;
use sysid_core::types::{DatasetKey, Settings};
use sysid_core::AnalysisManager;

const KS: f64 = 0.2;
const KV: f64 = 3.0;
const KA: f64 = 0.4;

/// One logged row `[t, V, p, v]` for a velocity that is exactly linear in
/// time over the run, so the pipeline's own finite-difference acceleration
/// estimate recovers `slope` exactly (a central-difference stencil is exact
/// on a linear function regardless of window width or spacing).
fn row(t: f64, v0: f64, slope: f64, dt: f64) -> Vec<f64> {
    let v = v0 + slope * t;
    let voltage = KS * v.signum() + KV * v + KA * slope;
    let position = v0 * t + 0.5 * slope * t * t;
    let _ = dt;
    vec![t, voltage, position, v]
}

fn linear_run(n: usize, dt: f64, v0: f64, slope: f64) -> Vec<Vec<f64>> {
    (0..n).map(|i| row(i as f64 * dt, v0, slope, dt)).collect()
}

fn write_log(path: &std::path::Path) {
    let doc = json!({
        "sysid": "0.1.0",
        "test": "Simple",
        "units": "Rotations",
        "unitsPerRotation": 1.0,
        "slow-forward": linear_run(51, 1.0, 0.3, 0.01),
        "slow-backward": linear_run(51, 1.0, -0.3, -0.01),
        "fast-forward": linear_run(21, 0.1, 0.5, 2.0),
        "fast-backward": linear_run(21, 0.1, -0.5, -2.0),
    });
    std::fs::write(path, serde_json::to_string_pretty(&doc).unwrap()).unwrap();
}

#[test]
fn recovers_feedforward_and_feedback_gains_from_a_synthetic_log() {
    let dir = std::env::temp_dir().join(format!(
        "sysid-core-e2e-{:?}",
        std::thread::current().id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("simple.json");
    write_log(&path);

    let mut manager = AnalysisManager::new(&path, Settings::default()).unwrap();
    assert_eq!(manager.analysis_type().display_name(), "Simple");

    let combined = manager.filtered_datasets().get(&DatasetKey::Combined).unwrap();
    assert!(!combined.quasistatic.is_empty());
    assert!(!combined.dynamic.is_empty());

    let gains = manager.calculate().unwrap();
    assert_eq!(gains.feedforward.beta.len(), 3);
    assert!((gains.feedforward.ks() - KS).abs() < 1e-6, "Ks = {}", gains.feedforward.ks());
    assert!((gains.feedforward.kv() - KV).abs() < 1e-6, "Kv = {}", gains.feedforward.kv());
    assert!((gains.feedforward.ka() - KA).abs() < 1e-6, "Ka = {}", gains.feedforward.ka());
    assert!(gains.feedforward.r_squared > 0.999);
    assert!(gains.track_width.is_none());

    // Plant is physical (Kv, Ka > 0), so pole-placement position gains come back positive.
    assert!(gains.feedback.kp > 0.0);
    assert!(gains.feedback.kd > 0.0);

    // Selecting a direction-specific dataset and recalculating should also succeed.
    *manager.settings_mut() = Settings {
        dataset: DatasetKey::Forward,
        ..*manager.settings()
    };
    let forward_gains = manager.calculate().unwrap();
    assert!((forward_gains.feedforward.kv() - KV).abs() < 1e-6);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn rejects_a_log_missing_the_sysid_tag() {
    let dir = std::env::temp_dir().join(format!(
        "sysid-core-e2e-bad-{:?}",
        std::thread::current().id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("untagged.json");
    std::fs::write(&path, json!({"test": "Simple"}).to_string()).unwrap();

    let result = AnalysisManager::new(&path, Settings::default());
    assert!(matches!(result, Err(sysid_core::Error::SchemaMismatch)));

    std::fs::remove_dir_all(&dir).ok();
}
