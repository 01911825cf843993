//! `AnalysisManager`: loads an experiment log, dispatches per mechanism
//! family, and drives the feedforward/feedback `Calculate` pipeline.

use crate::error::{Error, Result};
use crate::feedback;
use crate::feedforward;
use crate::filtering::{
    apply_median_filter, estimate_acceleration, trim_quasistatic_data, trim_step_voltage_data,
};
use crate::schema::{require_sysid_tag, NativeDocument};
use crate::trackwidth::calculate_track_width;
use crate::types::{
    AnalysisType, Dataset, DatasetKey, DrivetrainSample, FeedforwardGains, GeneralSample, Gains,
    PreparedData, Settings, Units,
};
use std::collections::HashMap;
use std::path::Path;

/// Bundle of everything one `PrepareData` pass produces, replacing the
/// source's mutable scratch accumulators with an explicit return value.
#[derive(Clone, Debug, Default)]
pub struct PreparedBundle {
    pub raw_datasets: HashMap<DatasetKey, Dataset>,
    pub filtered_datasets: HashMap<DatasetKey, Dataset>,
    pub start_times: HashMap<DatasetKey, f64>,
    pub min_duration: f64,
    pub max_duration: f64,
    pub track_width: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

fn general_rows_to_samples(rows: &[Vec<f64>]) -> Result<Vec<GeneralSample>> {
    rows.iter()
        .map(|row| {
            if row.len() != 4 {
                return Err(Error::InsufficientData(format!(
                    "general mechanism row needs 4 columns, got {}",
                    row.len()
                )));
            }
            Ok(GeneralSample {
                t: row[0],
                voltage: row[1],
                position: row[2],
                velocity: row[3],
            })
        })
        .collect()
}

fn drivetrain_rows_to_samples(rows: &[Vec<f64>]) -> Result<Vec<DrivetrainSample>> {
    rows.iter()
        .map(|row| {
            if row.len() != 9 {
                return Err(Error::InsufficientData(format!(
                    "drivetrain row needs 9 columns, got {}",
                    row.len()
                )));
            }
            Ok(DrivetrainSample {
                t: row[0],
                voltage_left: row[1],
                voltage_right: row[2],
                position_left: row[3],
                position_right: row[4],
                velocity_left: row[5],
                velocity_right: row[6],
                heading: row[7],
                heading_rate: row[8],
            })
        })
        .collect()
}

/// Sign-align voltage to velocity and scale position/velocity by `factor`.
fn general_to_prepared(samples: &[GeneralSample], factor: f64) -> Vec<PreparedData> {
    samples
        .iter()
        .map(|s| {
            PreparedData::new(
                s.t,
                s.voltage.copysign(s.velocity),
                s.position * factor,
                s.velocity * factor,
            )
        })
        .collect()
}

fn side_to_prepared(samples: &[DrivetrainSample], side: Side, factor: f64) -> Vec<PreparedData> {
    samples
        .iter()
        .map(|s| {
            let (v, p, vel) = match side {
                Side::Left => (s.voltage_left, s.position_left, s.velocity_left),
                Side::Right => (s.voltage_right, s.position_right, s.velocity_right),
            };
            PreparedData::new(s.t, v.copysign(vel), p * factor, vel * factor)
        })
        .collect()
}

fn angular_to_prepared(samples: &[DrivetrainSample]) -> Vec<PreparedData> {
    samples
        .iter()
        .map(|s| {
            let voltage = (s.voltage_left + s.voltage_right).copysign(s.heading_rate);
            PreparedData::new(s.t, voltage, s.heading, s.heading_rate)
        })
        .collect()
}

fn set_cos(run: &mut [PreparedData], to_radians: f64) {
    for p in run.iter_mut() {
        p.cos = (p.position * to_radians).cos();
    }
}

fn duration(run: &[PreparedData]) -> Result<f64> {
    match (run.first(), run.last()) {
        (Some(first), Some(last)) => Ok(last.t - first.t),
        _ => Err(Error::InsufficientData("run is empty".into())),
    }
}

/// Raw acceleration estimate plus a median-filtered one, both over `window`.
fn condition_run(run: &[PreparedData], window: usize, median_filter: bool) -> Result<(Vec<PreparedData>, Vec<PreparedData>)> {
    let raw = estimate_acceleration(run, window);
    let filtered = if median_filter {
        let smoothed = apply_median_filter(run, window)?;
        estimate_acceleration(&smoothed, window)
    } else {
        raw.clone()
    };
    Ok((raw, filtered))
}

struct FourRuns {
    slow_forward: Vec<PreparedData>,
    slow_backward: Vec<PreparedData>,
    fast_forward: Vec<PreparedData>,
    fast_backward: Vec<PreparedData>,
}

/// `(rawDatasets, filteredDatasets, startTimes, minDuration, maxDuration)`.
type PipelineOutput = (
    HashMap<DatasetKey, Dataset>,
    HashMap<DatasetKey, Dataset>,
    HashMap<DatasetKey, f64>,
    f64,
    f64,
);

/// Shared pipeline body for general mechanisms, each drivetrain side, and
/// the angular-drivetrain target variables: trim, condition, step-trim,
/// assemble the Forward/Backward/Combined datasets.
fn run_pipeline(
    mut runs: FourRuns,
    settings: &Settings,
    motion_threshold: f64,
    median_filter: bool,
    arm_to_radians: Option<f64>,
) -> Result<PipelineOutput> {
    trim_quasistatic_data(&mut runs.slow_forward, motion_threshold);
    trim_quasistatic_data(&mut runs.slow_backward, motion_threshold);

    let window = settings.window_size;
    let (mut slow_fwd_raw, mut slow_fwd_filt) = condition_run(&runs.slow_forward, window, median_filter)?;
    let (mut slow_bwd_raw, mut slow_bwd_filt) = condition_run(&runs.slow_backward, window, median_filter)?;
    let (mut fast_fwd_raw, mut fast_fwd_filt) = condition_run(&runs.fast_forward, window, median_filter)?;
    let (mut fast_bwd_raw, mut fast_bwd_filt) = condition_run(&runs.fast_backward, window, median_filter)?;

    if let Some(to_radians) = arm_to_radians {
        for run in [
            &mut slow_fwd_raw,
            &mut slow_fwd_filt,
            &mut slow_bwd_raw,
            &mut slow_bwd_filt,
            &mut fast_fwd_raw,
            &mut fast_fwd_filt,
            &mut fast_bwd_raw,
            &mut fast_bwd_filt,
        ] {
            set_cos(run, to_radians);
        }
    }

    let max_step_time = duration(&fast_fwd_raw)?.max(duration(&fast_bwd_raw)?);

    trim_step_voltage_data(&mut fast_fwd_raw, window, settings.step_test_duration, f64::INFINITY, max_step_time)?;
    trim_step_voltage_data(&mut fast_bwd_raw, window, settings.step_test_duration, f64::INFINITY, max_step_time)?;

    let fwd_outcome = trim_step_voltage_data(&mut fast_fwd_filt, window, settings.step_test_duration, f64::INFINITY, max_step_time)?;
    let shared_duration = if settings.step_test_duration > 0.0 {
        settings.step_test_duration
    } else {
        fwd_outcome.step_test_duration
    };
    let bwd_outcome = trim_step_voltage_data(&mut fast_bwd_filt, window, shared_duration, fwd_outcome.min_time, max_step_time)?;

    let min_duration = fwd_outcome.min_time.min(bwd_outcome.min_time);
    let max_duration = fwd_outcome.step_test_duration.max(bwd_outcome.step_test_duration);

    let mut raw = HashMap::new();
    raw.insert(DatasetKey::Forward, Dataset { quasistatic: slow_fwd_raw.clone(), dynamic: fast_fwd_raw.clone() });
    raw.insert(DatasetKey::Backward, Dataset { quasistatic: slow_bwd_raw.clone(), dynamic: fast_bwd_raw.clone() });
    raw.insert(
        DatasetKey::Combined,
        Dataset::combined(&raw[&DatasetKey::Forward], &raw[&DatasetKey::Backward]),
    );

    let mut filtered = HashMap::new();
    filtered.insert(DatasetKey::Forward, Dataset { quasistatic: slow_fwd_filt.clone(), dynamic: fast_fwd_filt.clone() });
    filtered.insert(DatasetKey::Backward, Dataset { quasistatic: slow_bwd_filt.clone(), dynamic: fast_bwd_filt.clone() });
    filtered.insert(
        DatasetKey::Combined,
        Dataset::combined(&filtered[&DatasetKey::Forward], &filtered[&DatasetKey::Backward]),
    );

    let mut start_times = HashMap::new();
    if let Some(p) = slow_fwd_filt.first() {
        start_times.insert(DatasetKey::Forward, p.t);
    }
    if let Some(p) = slow_bwd_filt.first() {
        start_times.insert(DatasetKey::Backward, p.t);
    }

    Ok((raw, filtered, start_times, min_duration, max_duration))
}

fn prepare_general(
    kind: AnalysisType,
    doc: &NativeDocument,
    settings: &Settings,
    units: Units,
    factor: f64,
) -> Result<PreparedBundle> {
    let runs = FourRuns {
        slow_forward: general_to_prepared(&general_rows_to_samples(&doc.slow_forward)?, factor),
        slow_backward: general_to_prepared(&general_rows_to_samples(&doc.slow_backward)?, factor),
        fast_forward: general_to_prepared(&general_rows_to_samples(&doc.fast_forward)?, factor),
        fast_backward: general_to_prepared(&general_rows_to_samples(&doc.fast_backward)?, factor),
    };

    let arm_to_radians = (kind == AnalysisType::Arm).then(|| units.to_radians_factor());

    let (raw_datasets, filtered_datasets, start_times, min_duration, max_duration) =
        run_pipeline(runs, settings, settings.motion_threshold, true, arm_to_radians)?;

    Ok(PreparedBundle {
        raw_datasets,
        filtered_datasets,
        start_times,
        min_duration,
        max_duration,
        track_width: None,
    })
}

fn prepare_linear_drivetrain(doc: &NativeDocument, settings: &Settings, factor: f64) -> Result<PreparedBundle> {
    let slow_fwd = drivetrain_rows_to_samples(&doc.slow_forward)?;
    let slow_bwd = drivetrain_rows_to_samples(&doc.slow_backward)?;
    let fast_fwd = drivetrain_rows_to_samples(&doc.fast_forward)?;
    let fast_bwd = drivetrain_rows_to_samples(&doc.fast_backward)?;

    let mut raw_all = HashMap::new();
    let mut filtered_all = HashMap::new();
    let mut start_times = HashMap::new();
    let mut min_duration = f64::INFINITY;
    let mut max_duration = 0.0f64;

    for (side, (fwd_key, bwd_key, combined_key)) in [
        (Side::Left, (DatasetKey::LeftForward, DatasetKey::LeftBackward, DatasetKey::LeftCombined)),
        (Side::Right, (DatasetKey::RightForward, DatasetKey::RightBackward, DatasetKey::RightCombined)),
    ] {
        let runs = FourRuns {
            slow_forward: side_to_prepared(&slow_fwd, side, factor),
            slow_backward: side_to_prepared(&slow_bwd, side, factor),
            fast_forward: side_to_prepared(&fast_fwd, side, factor),
            fast_backward: side_to_prepared(&fast_bwd, side, factor),
        };
        let (raw, filtered, times, min_d, max_d) = run_pipeline(runs, settings, settings.motion_threshold, true, None)?;

        min_duration = min_duration.min(min_d);
        max_duration = max_duration.max(max_d);
        for (k, v) in times {
            start_times.insert(k, v);
        }

        raw_all.insert(fwd_key, raw[&DatasetKey::Forward].clone());
        raw_all.insert(bwd_key, raw[&DatasetKey::Backward].clone());
        raw_all.insert(combined_key, raw[&DatasetKey::Combined].clone());
        filtered_all.insert(fwd_key, filtered[&DatasetKey::Forward].clone());
        filtered_all.insert(bwd_key, filtered[&DatasetKey::Backward].clone());
        filtered_all.insert(combined_key, filtered[&DatasetKey::Combined].clone());
    }

    // Merged datasets are the concatenation of left and right, not an
    // element-wise average — matches how the per-side datasets are built.
    for (merged, left, right) in [
        (DatasetKey::Forward, DatasetKey::LeftForward, DatasetKey::RightForward),
        (DatasetKey::Backward, DatasetKey::LeftBackward, DatasetKey::RightBackward),
        (DatasetKey::Combined, DatasetKey::LeftCombined, DatasetKey::RightCombined),
    ] {
        raw_all.insert(merged, Dataset::combined(&raw_all[&left], &raw_all[&right]));
        filtered_all.insert(merged, Dataset::combined(&filtered_all[&left], &filtered_all[&right]));
    }

    Ok(PreparedBundle {
        raw_datasets: raw_all,
        filtered_datasets: filtered_all,
        start_times,
        min_duration,
        max_duration,
        track_width: None,
    })
}

fn prepare_angular_drivetrain(doc: &NativeDocument, settings: &Settings, factor: f64) -> Result<PreparedBundle> {
    let slow_fwd_samples = drivetrain_rows_to_samples(&doc.slow_forward)?;
    let slow_bwd_samples = drivetrain_rows_to_samples(&doc.slow_backward)?;
    let fast_fwd_samples = drivetrain_rows_to_samples(&doc.fast_forward)?;
    let fast_bwd_samples = drivetrain_rows_to_samples(&doc.fast_backward)?;

    let track_width = {
        let first = slow_fwd_samples
            .first()
            .ok_or_else(|| Error::InsufficientData("slow-forward run is empty".into()))?;
        let last = slow_fwd_samples
            .last()
            .ok_or_else(|| Error::InsufficientData("slow-forward run is empty".into()))?;
        calculate_track_width(
            last.position_left - first.position_left,
            last.position_right - first.position_right,
            last.heading - first.heading,
        )?
    };

    let runs = FourRuns {
        slow_forward: angular_to_prepared(&slow_fwd_samples)
            .into_iter()
            .map(|mut p| {
                p.position *= factor;
                p.velocity *= factor;
                p
            })
            .collect(),
        slow_backward: angular_to_prepared(&slow_bwd_samples)
            .into_iter()
            .map(|mut p| {
                p.position *= factor;
                p.velocity *= factor;
                p
            })
            .collect(),
        fast_forward: angular_to_prepared(&fast_fwd_samples)
            .into_iter()
            .map(|mut p| {
                p.position *= factor;
                p.velocity *= factor;
                p
            })
            .collect(),
        fast_backward: angular_to_prepared(&fast_bwd_samples)
            .into_iter()
            .map(|mut p| {
                p.position *= factor;
                p.velocity *= factor;
                p
            })
            .collect(),
    };

    let (raw_datasets, filtered_datasets, start_times, min_duration, max_duration) =
        run_pipeline(runs, settings, settings.motion_threshold, false, None)?;

    Ok(PreparedBundle {
        raw_datasets,
        filtered_datasets,
        start_times,
        min_duration,
        max_duration,
        track_width: Some(track_width),
    })
}

/// Owns a parsed experiment log, the datasets derived from it, and drives
/// the feedforward/feedback `Calculate` pipeline. Single-threaded and
/// synchronous; construct a fresh manager for a new input file.
pub struct AnalysisManager {
    json: NativeDocument,
    analysis_type: AnalysisType,
    units: Units,
    units_per_rotation: f64,
    settings: Settings,
    bundle: PreparedBundle,
}

impl AnalysisManager {
    pub fn new(path: &Path, settings: Settings) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        require_sysid_tag(&value)?;
        let json = NativeDocument::from_value(value)?;

        let analysis_type = AnalysisType::from_display_name(&json.test)
            .ok_or_else(|| Error::UnknownAnalysisType(json.test.clone()))?;
        let units = Units::parse(&json.units)
            .ok_or_else(|| Error::UnknownAnalysisType(format!("units: {}", json.units)))?;
        let units_per_rotation = json.units_per_rotation;

        let mut settings = settings;
        settings.step_test_duration = 0.0;

        let mut manager = Self {
            json,
            analysis_type,
            units,
            units_per_rotation,
            settings,
            bundle: PreparedBundle::default(),
        };
        manager.prepare_data()?;
        Ok(manager)
    }

    /// Re-entry point after settings/unit changes. On failure the manager's
    /// datasets are left empty and `calculate` will fail with `InsufficientData`.
    pub fn prepare_data(&mut self) -> Result<()> {
        let factor = self.units_per_rotation;
        let result = match self.analysis_type {
            AnalysisType::Simple | AnalysisType::Elevator | AnalysisType::Arm => {
                prepare_general(self.analysis_type, &self.json, &self.settings, self.units, factor)
            }
            AnalysisType::Drivetrain => prepare_linear_drivetrain(&self.json, &self.settings, factor),
            AnalysisType::DrivetrainAngular => prepare_angular_drivetrain(&self.json, &self.settings, factor),
        };

        match result {
            Ok(bundle) => {
                self.bundle = bundle;
                Ok(())
            }
            Err(err) => {
                log::warn!("PrepareData failed for {}: {err}", self.analysis_type.display_name());
                self.bundle = PreparedBundle::default();
                Err(err)
            }
        }
    }

    pub fn analysis_type(&self) -> AnalysisType {
        self.analysis_type
    }

    pub fn raw_datasets(&self) -> &HashMap<DatasetKey, Dataset> {
        &self.bundle.raw_datasets
    }

    pub fn filtered_datasets(&self) -> &HashMap<DatasetKey, Dataset> {
        &self.bundle.filtered_datasets
    }

    pub fn track_width(&self) -> Option<f64> {
        self.bundle.track_width
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Rewrite `(units, unitsPerRotation)` and re-run `PrepareData`.
    pub fn override_units(&mut self, units: Units, units_per_rotation: f64) -> Result<()> {
        self.units = units;
        self.units_per_rotation = units_per_rotation;
        self.prepare_data()
    }

    /// Reload `(units, unitsPerRotation)` from the stored JSON and re-run `PrepareData`.
    pub fn reset_units_from_json(&mut self) -> Result<()> {
        self.units = Units::parse(&self.json.units)
            .ok_or_else(|| Error::UnknownAnalysisType(format!("units: {}", self.json.units)))?;
        self.units_per_rotation = self.json.units_per_rotation;
        self.prepare_data()
    }

    /// Fit the feedforward model and feedback gains for `settings.dataset`.
    pub fn calculate(&self) -> Result<Gains> {
        let dataset = self
            .bundle
            .filtered_datasets
            .get(&self.settings.dataset)
            .ok_or_else(|| Error::InsufficientData("selected dataset was never prepared".into()))?;
        if dataset.quasistatic.is_empty() && dataset.dynamic.is_empty() {
            return Err(Error::InsufficientData("selected dataset is empty".into()));
        }

        let feedforward: FeedforwardGains = feedforward::fit(self.analysis_type, dataset)?;
        log::debug!(
            "feedforward fit for {}: rmse={:.5} r2={:.5}",
            self.analysis_type.display_name(),
            feedforward.rmse,
            feedforward.r_squared
        );

        let feedback = feedback::compute(
            self.settings.feedback_mode,
            feedforward.kv(),
            feedforward.ka(),
            &self.settings,
        )?;
        let feedback = feedback::convert_to_encoder_ticks(feedback, &self.settings.encoder, self.units_per_rotation);

        Ok(Gains {
            feedforward,
            feedback,
            track_width: self.bundle.track_width,
        })
    }
}
