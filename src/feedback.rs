//! Feedback gain synthesis from an identified `(Kv, Ka)` plant: either pole
//! placement at the controller preset's characteristic time constant, or a
//! discrete LQR solved by Riccati iteration.

use crate::error::{Error, Result};
use crate::types::{EncoderConversion, FeedbackGains, FeedbackMode, FeedbackSynthesis, Settings};
use nalgebra::{Matrix2, Matrix2x1, Vector2};

fn check_physical(kv: f64, ka: f64) -> Result<()> {
    if kv <= 0.0 || ka <= 0.0 {
        return Err(Error::NonPhysicalPlant { kv, ka });
    }
    Ok(())
}

/// Discretize the scalar velocity plant `vdot = a*v + b*u` at period `t`.
fn discretize_scalar(a: f64, b: f64, t: f64) -> (f64, f64) {
    let ad = (a * t).exp();
    let bd = b * (ad - 1.0) / a;
    (ad, bd)
}

/// Discretize the position-velocity plant `[x,v]' = [[0,1],[0,a]][x,v] +
/// [0,b]u` at period `t`, using the closed-form block transition matrix.
fn discretize_position(a: f64, b: f64, t: f64) -> (Matrix2<f64>, Matrix2x1<f64>) {
    let ad = (a * t).exp();
    let ad_pos = Matrix2::new(1.0, (ad - 1.0) / a, 0.0, ad);
    let bd = Matrix2x1::new(
        (b / a) * ((ad - 1.0) / a - t),
        b * (ad - 1.0) / a,
    );
    (ad_pos, bd)
}

fn pole_placement_velocity(ad: f64, bd: f64, pole: f64) -> f64 {
    (ad - pole) / bd
}

/// Ackermann's formula for a 2-state, single-input system.
fn pole_placement_position(ad: Matrix2<f64>, bd: Matrix2x1<f64>, p1: f64, p2: f64) -> (f64, f64) {
    let ctrb = Matrix2::from_columns(&[bd, ad * bd]);
    let ctrb_inv = ctrb.try_inverse().expect("controllable by construction");
    let phi = ad * ad - ad * (p1 + p2) + Matrix2::identity() * (p1 * p2);
    let last_row = Vector2::new(0.0, 1.0);
    let k = (last_row.transpose() * ctrb_inv * phi).transpose();
    (k[0], k[1])
}

/// Solve the scalar discrete Riccati equation by fixed-point iteration.
fn dare_scalar(a: f64, b: f64, q: f64, r: f64) -> f64 {
    let mut p = q;
    for _ in 0..200 {
        let s = r + b * b * p;
        let p_next = q + a * a * p - (a * b * p).powi(2) / s;
        if (p_next - p).abs() < 1e-15 {
            p = p_next;
            break;
        }
        p = p_next;
    }
    (a * b * p) / (r + b * b * p)
}

/// Solve the 2-state discrete Riccati equation by fixed-point iteration.
fn dare_2x2(
    a: Matrix2<f64>,
    b: Matrix2x1<f64>,
    q: Matrix2<f64>,
    r: f64,
) -> (f64, f64) {
    let mut p = q;
    for _ in 0..200 {
        let s = r + (b.transpose() * p * b)[(0, 0)];
        let k_gain = (p * b) / s;
        let p_next = q + a.transpose() * p * a
            - a.transpose() * p * b * (1.0 / s) * (b.transpose() * p * a);
        let delta = (p_next - p)
            .iter()
            .fold(0.0f64, |acc, v| acc.max(v.abs()));
        p = p_next;
        if delta < 1e-15 {
            let _ = k_gain;
            break;
        }
    }
    let s = r + (b.transpose() * p * b)[(0, 0)];
    let k = (b.transpose() * p * a) * (1.0 / s);
    (k[(0, 0)], k[(0, 1)])
}

/// Compute `(Kp, Kd)` for the position loop.
fn position_gains(kv: f64, ka: f64, settings: &Settings) -> FeedbackGains {
    let a = -kv / ka;
    let b = 1.0 / ka;
    let t = settings.preset.period_secs;
    let (ad, bd) = discretize_position(a, b, t);

    let (kp, kd) = match settings.synthesis {
        FeedbackSynthesis::PolePlacement => {
            let pole = (-t / settings.preset.pole_placement_tau()).exp();
            pole_placement_position(ad, bd, pole, pole)
        }
        FeedbackSynthesis::Lqr => {
            let q = Matrix2::new(
                1.0 / settings.lqr.q_position.powi(2),
                0.0,
                0.0,
                1.0 / settings.lqr.q_velocity.powi(2),
            );
            let r = 1.0 / settings.lqr.q_effort.powi(2);
            dare_2x2(ad, bd, q, r)
        }
    };
    FeedbackGains { kp, kd }
}

/// Compute `(Kp, 0)` for the velocity loop.
fn velocity_gains(kv: f64, ka: f64, settings: &Settings) -> FeedbackGains {
    let a = -kv / ka;
    let b = 1.0 / ka;
    let t = settings.preset.period_secs;
    let (ad, bd) = discretize_scalar(a, b, t);

    let kp = match settings.synthesis {
        FeedbackSynthesis::PolePlacement => {
            let pole = (-t / settings.preset.pole_placement_tau()).exp();
            pole_placement_velocity(ad, bd, pole)
        }
        FeedbackSynthesis::Lqr => {
            let q = 1.0 / settings.lqr.q_velocity.powi(2);
            let r = 1.0 / settings.lqr.q_effort.powi(2);
            dare_scalar(ad, bd, q, r)
        }
    };
    FeedbackGains { kp, kd: 0.0 }
}

/// Compute feedback gains for the mode selected in `settings`, failing if
/// the identified plant is non-physical (`Kv <= 0` or `Ka <= 0`).
pub fn compute(mode: FeedbackMode, kv: f64, ka: f64, settings: &Settings) -> Result<FeedbackGains> {
    check_physical(kv, ka)?;
    Ok(match mode {
        FeedbackMode::Position => position_gains(kv, ka, settings),
        FeedbackMode::Velocity => velocity_gains(kv, ka, settings),
    })
}

/// Convert gains from native units to encoder ticks, if requested.
pub fn convert_to_encoder_ticks(
    gains: FeedbackGains,
    conversion: &EncoderConversion,
    units_per_rotation: f64,
) -> FeedbackGains {
    if !conversion.convert_gains_to_enc_ticks {
        return gains;
    }
    let factor = conversion.gearing * conversion.cpr * units_per_rotation;
    FeedbackGains {
        kp: gains.kp * factor,
        kd: gains.kd * factor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ControllerPreset, LqrWeights};

    fn settings_with(mode: FeedbackMode, synthesis: FeedbackSynthesis) -> Settings {
        Settings {
            feedback_mode: mode,
            synthesis,
            ..Settings::default()
        }
    }

    #[test]
    fn rejects_non_physical_plant() {
        let settings = Settings::default();
        assert!(matches!(
            compute(FeedbackMode::Position, 0.0, 1.0, &settings),
            Err(Error::NonPhysicalPlant { .. })
        ));
        assert!(matches!(
            compute(FeedbackMode::Position, 1.0, -1.0, &settings),
            Err(Error::NonPhysicalPlant { .. })
        ));
    }

    #[test]
    fn pole_placement_velocity_gain_is_positive_and_stabilizing() {
        let settings = settings_with(FeedbackMode::Velocity, FeedbackSynthesis::PolePlacement);
        let gains = compute(FeedbackMode::Velocity, 2.0, 0.5, &settings).unwrap();
        assert!(gains.kp > 0.0);
        assert_eq!(gains.kd, 0.0);
    }

    #[test]
    fn lqr_position_gains_are_both_positive() {
        let settings = settings_with(FeedbackMode::Position, FeedbackSynthesis::Lqr);
        let gains = compute(FeedbackMode::Position, 2.0, 0.5, &settings).unwrap();
        assert!(gains.kp > 0.0);
        assert!(gains.kd > 0.0);
    }

    #[test]
    fn encoder_tick_conversion_scales_gains() {
        let gains = FeedbackGains { kp: 1.0, kd: 2.0 };
        let conversion = EncoderConversion {
            convert_gains_to_enc_ticks: true,
            gearing: 10.0,
            cpr: 2048.0,
        };
        let converted = convert_to_encoder_ticks(gains, &conversion, 1.0);
        assert!((converted.kp - 10.0 * 2048.0).abs() < 1e-6);
        assert!((converted.kd - 2.0 * 10.0 * 2048.0).abs() < 1e-6);
    }

    #[test]
    fn unconverted_when_flag_is_false() {
        let gains = FeedbackGains { kp: 1.0, kd: 2.0 };
        let conversion = EncoderConversion::default();
        let converted = convert_to_encoder_ticks(gains, &conversion, 1.0);
        assert_eq!(converted, gains);
    }

    #[test]
    fn lqr_weights_default_are_sane() {
        let w = LqrWeights::default();
        assert!(w.q_position > 0.0 && w.q_velocity > 0.0 && w.q_effort > 0.0);
    }

    #[test]
    fn preset_default_period_is_positive() {
        assert!(ControllerPreset::default().period_secs > 0.0);
    }
}
