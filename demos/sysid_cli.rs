//! Thin demo CLI: load an experiment log, fit feedforward/feedback gains,
//! print the result as JSON. Not the end-user characterization tool — a
//! driver for exercising `sysid_core::AnalysisManager` from the command line.

use clap::Parser;
use std::path::PathBuf;
use sysid_core::types::{DatasetKey, FeedbackMode, FeedbackSynthesis, Settings};
use sysid_core::AnalysisManager;

#[derive(Parser, Debug)]
#[command(name = "sysid")]
#[command(about = "Fit feedforward/feedback gains from a logged characterization run", long_about = None)]
struct Args {
    /// Path to a sysid-tagged experiment log (native schema)
    log_path: PathBuf,

    /// Dataset direction to fit against
    #[arg(long, default_value = "combined")]
    dataset: String,

    /// Feedback loop mode (position, velocity)
    #[arg(long, default_value = "position")]
    feedback_mode: String,

    /// Feedback gain synthesis method (pole-placement, lqr)
    #[arg(long, default_value = "pole-placement")]
    synthesis: String,

    /// Median-filter / finite-difference window size, must be odd
    #[arg(long, default_value = "9")]
    window_size: usize,
}

fn parse_dataset(s: &str) -> DatasetKey {
    match s {
        "forward" => DatasetKey::Forward,
        "backward" => DatasetKey::Backward,
        "left-forward" => DatasetKey::LeftForward,
        "left-backward" => DatasetKey::LeftBackward,
        "left-combined" => DatasetKey::LeftCombined,
        "right-forward" => DatasetKey::RightForward,
        "right-backward" => DatasetKey::RightBackward,
        "right-combined" => DatasetKey::RightCombined,
        _ => DatasetKey::Combined,
    }
}

fn parse_feedback_mode(s: &str) -> FeedbackMode {
    match s {
        "velocity" => FeedbackMode::Velocity,
        _ => FeedbackMode::Position,
    }
}

fn parse_synthesis(s: &str) -> FeedbackSynthesis {
    match s {
        "lqr" => FeedbackSynthesis::Lqr,
        _ => FeedbackSynthesis::PolePlacement,
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let settings = Settings {
        dataset: parse_dataset(&args.dataset),
        feedback_mode: parse_feedback_mode(&args.feedback_mode),
        synthesis: parse_synthesis(&args.synthesis),
        window_size: args.window_size,
        ..Settings::default()
    };

    let manager = AnalysisManager::new(&args.log_path, settings)?;
    log::info!("loaded {} log: {}", manager.analysis_type().display_name(), args.log_path.display());

    let gains = manager.calculate()?;
    println!("{}", serde_json::to_string_pretty(&gains)?);
    Ok(())
}
