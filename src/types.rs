//! Core data model: samples, prepared points, datasets, settings, and gains.

use serde::{Deserialize, Serialize};

/// One raw logged row for a general (non-drivetrain) mechanism: `(t, V, p, ṗ)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneralSample {
    pub t: f64,
    pub voltage: f64,
    pub position: f64,
    pub velocity: f64,
}

/// One raw logged row for a drivetrain: `(t, Vl, Vr, pl, pr, vl, vr, θ, θ̇)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DrivetrainSample {
    pub t: f64,
    pub voltage_left: f64,
    pub voltage_right: f64,
    pub position_left: f64,
    pub position_right: f64,
    pub velocity_left: f64,
    pub velocity_right: f64,
    pub heading: f64,
    pub heading_rate: f64,
}

/// A conditioned sample: raw signal plus derived `dt`, `acceleration`, and `cos`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PreparedData {
    pub t: f64,
    pub voltage: f64,
    pub position: f64,
    pub velocity: f64,
    pub dt: f64,
    pub acceleration: f64,
    /// `cos(position)` in radians; only meaningful for Arm, else 0.
    pub cos: f64,
}

impl PreparedData {
    pub fn new(t: f64, voltage: f64, position: f64, velocity: f64) -> Self {
        Self {
            t,
            voltage,
            position,
            velocity,
            dt: 0.0,
            acceleration: 0.0,
            cos: 0.0,
        }
    }
}

/// A labeled sequence of conditioned points from one test run.
pub type TestRun = Vec<PreparedData>;

/// The four canonical test-run labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestLabel {
    SlowForward,
    SlowBackward,
    FastForward,
    FastBackward,
}

impl TestLabel {
    pub fn json_key(self) -> &'static str {
        match self {
            TestLabel::SlowForward => "slow-forward",
            TestLabel::SlowBackward => "slow-backward",
            TestLabel::FastForward => "fast-forward",
            TestLabel::FastBackward => "fast-backward",
        }
    }
}

/// A quasistatic/dynamic pair of conditioned runs, ready for fitting.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub quasistatic: Vec<PreparedData>,
    pub dynamic: Vec<PreparedData>,
}

impl Dataset {
    /// All points used for a feedforward fit: quasistatic points followed by
    /// the dynamic (step) points.
    pub fn combined_points(&self) -> Vec<PreparedData> {
        let mut points = self.quasistatic.clone();
        points.extend(self.dynamic.iter().copied());
        points
    }

    /// Concatenate a forward and backward dataset: forward points then backward points.
    pub fn combined(forward: &Dataset, backward: &Dataset) -> Dataset {
        let mut quasistatic = forward.quasistatic.clone();
        quasistatic.extend(backward.quasistatic.iter().copied());
        let mut dynamic = forward.dynamic.clone();
        dynamic.extend(backward.dynamic.iter().copied());
        Dataset {
            quasistatic,
            dynamic,
        }
    }
}

/// Dataset direction key. A tagged enum, not a string map, per the source's
/// design note: each dataset family is a small closed set of directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatasetKey {
    Forward,
    Backward,
    Combined,
    LeftForward,
    LeftBackward,
    LeftCombined,
    RightForward,
    RightBackward,
    RightCombined,
}

/// Mechanism family, carrying the shape of its regressor and raw schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisType {
    Simple,
    Elevator,
    Arm,
    Drivetrain,
    DrivetrainAngular,
}

impl AnalysisType {
    /// Number of feedforward coefficients this type's regressor produces.
    pub fn independent_variables(self) -> usize {
        match self {
            AnalysisType::Simple | AnalysisType::Drivetrain | AnalysisType::DrivetrainAngular => 3,
            AnalysisType::Elevator | AnalysisType::Arm => 4,
        }
    }

    /// Number of columns in one raw logged row.
    pub fn raw_columns(self) -> usize {
        match self {
            AnalysisType::Simple | AnalysisType::Elevator | AnalysisType::Arm => 4,
            AnalysisType::Drivetrain | AnalysisType::DrivetrainAngular => 9,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            AnalysisType::Simple => "Simple",
            AnalysisType::Elevator => "Elevator",
            AnalysisType::Arm => "Arm",
            AnalysisType::Drivetrain => "Drivetrain",
            AnalysisType::DrivetrainAngular => "Drivetrain (Angular)",
        }
    }

    /// Feedforward coefficient names in fit order.
    pub fn beta_labels(self) -> &'static [&'static str] {
        match self {
            AnalysisType::Simple | AnalysisType::Drivetrain | AnalysisType::DrivetrainAngular => {
                &["Ks", "Kv", "Ka"]
            }
            AnalysisType::Elevator => &["Ks", "Kg", "Kv", "Ka"],
            AnalysisType::Arm => &["Ks", "Kcos", "Kv", "Ka"],
        }
    }

    pub fn from_display_name(name: &str) -> Option<Self> {
        match name {
            "Simple" => Some(AnalysisType::Simple),
            "Elevator" => Some(AnalysisType::Elevator),
            "Arm" => Some(AnalysisType::Arm),
            "Drivetrain" => Some(AnalysisType::Drivetrain),
            "Drivetrain (Angular)" => Some(AnalysisType::DrivetrainAngular),
            _ => None,
        }
    }
}

/// Angular unit the logged positions/velocities are expressed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Units {
    Radians,
    Degrees,
    Rotations,
    Meters,
    Feet,
    Inches,
}

impl Units {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Radians" => Some(Units::Radians),
            "Degrees" => Some(Units::Degrees),
            "Rotations" => Some(Units::Rotations),
            "Meters" => Some(Units::Meters),
            "Feet" => Some(Units::Feet),
            "Inches" => Some(Units::Inches),
            _ => None,
        }
    }

    /// Multiply a value in this unit by this to get radians. Linear units have
    /// no angular meaning and are never used to compute `cos`.
    pub fn to_radians_factor(self) -> f64 {
        match self {
            Units::Radians => 1.0,
            Units::Degrees => std::f64::consts::PI / 180.0,
            Units::Rotations => 2.0 * std::f64::consts::PI,
            Units::Meters | Units::Feet | Units::Inches => 0.0,
        }
    }
}

/// Feedback controller mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackMode {
    Position,
    Velocity,
}

/// Gain-synthesis method for the feedback loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackSynthesis {
    PolePlacement,
    Lqr,
}

/// Controller preset: loop period, actuator effort limit, sensing delays.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControllerPreset {
    pub period_secs: f64,
    pub max_control_effort: f64,
    pub encoder_position_delay_secs: f64,
    pub encoder_velocity_delay_secs: f64,
    /// Desired closed-loop time constant for pole-placement synthesis; the
    /// discrete pole is placed at `exp(-period / tau)`.
    pub pole_placement_tau_secs: f64,
}

impl ControllerPreset {
    pub fn pole_placement_tau(&self) -> f64 {
        self.pole_placement_tau_secs
    }
}

impl Default for ControllerPreset {
    fn default() -> Self {
        Self {
            period_secs: 0.02,
            max_control_effort: 12.0,
            encoder_position_delay_secs: 0.0,
            encoder_velocity_delay_secs: 0.0,
            pole_placement_tau_secs: 0.1,
        }
    }
}

/// LQR cost weights. `q_position`/`q_velocity` bound max allowable error in
/// each state; `q_effort` bounds max allowable control effort.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LqrWeights {
    pub q_position: f64,
    pub q_velocity: f64,
    pub q_effort: f64,
}

impl Default for LqrWeights {
    fn default() -> Self {
        Self {
            q_position: 1.0,
            q_velocity: 1.5,
            q_effort: 7.0,
        }
    }
}

/// Gain-unit conversion to encoder ticks.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncoderConversion {
    pub convert_gains_to_enc_ticks: bool,
    pub gearing: f64,
    pub cpr: f64,
}

impl Default for EncoderConversion {
    fn default() -> Self {
        Self {
            convert_gains_to_enc_ticks: false,
            gearing: 1.0,
            cpr: 1.0,
        }
    }
}

/// Pipeline configuration controlling trimming, filtering, and gain synthesis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub motion_threshold: f64,
    pub window_size: usize,
    pub step_test_duration: f64,
    pub velocity_threshold: f64,
    pub preset: ControllerPreset,
    pub lqr: LqrWeights,
    pub encoder: EncoderConversion,
    pub dataset: DatasetKey,
    pub feedback_mode: FeedbackMode,
    pub synthesis: FeedbackSynthesis,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            motion_threshold: 0.2,
            window_size: 9,
            step_test_duration: 0.0,
            velocity_threshold: 0.2,
            preset: ControllerPreset::default(),
            lqr: LqrWeights::default(),
            encoder: EncoderConversion::default(),
            dataset: DatasetKey::Combined,
            feedback_mode: FeedbackMode::Position,
            synthesis: FeedbackSynthesis::PolePlacement,
        }
    }
}

/// Feedforward fit result: coefficients in `AnalysisType::beta_labels()` order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeedforwardGains {
    pub beta: Vec<f64>,
    pub rmse: f64,
    pub r_squared: f64,
}

impl FeedforwardGains {
    pub fn ks(&self) -> f64 {
        self.beta[0]
    }

    /// `Kv` is always the second-to-last coefficient across all mechanism types.
    pub fn kv(&self) -> f64 {
        self.beta[self.beta.len() - 2]
    }

    /// `Ka` is always the last coefficient.
    pub fn ka(&self) -> f64 {
        self.beta[self.beta.len() - 1]
    }
}

/// Feedback gains closing the loop around the identified plant.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeedbackGains {
    pub kp: f64,
    pub kd: f64,
}

/// Full identification result for one `Calculate` invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Gains {
    pub feedforward: FeedforwardGains,
    pub feedback: FeedbackGains,
    pub track_width: Option<f64>,
}
