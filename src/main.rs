use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vio_init::imu::ImuParameters;
use vio_init::imu_init::{InitializationWindow, InitializerConfig, DEFAULT_MAX_ITERATIONS};
use vio_init::simulation::{SimulationConfig, SyntheticWindow};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let num_keyframes: usize = match std::env::args().nth(1) {
        Some(arg) => arg.parse().with_context(|| format!("invalid keyframe count {:?}", arg))?,
        None => SimulationConfig::default().num_keyframes,
    };
    let scale: f64 = match std::env::args().nth(2) {
        Some(arg) => arg.parse().with_context(|| format!("invalid scale {:?}", arg))?,
        None => SimulationConfig::default().scale,
    };
    if num_keyframes < 2 || !(scale > 0.0) {
        bail!("need at least 2 keyframes and a positive scale");
    }

    let config = SimulationConfig {
        num_keyframes,
        scale,
        ..SimulationConfig::default()
    };
    let synthetic = SyntheticWindow::generic(&config);
    println!(
        "Simulated {} keyframes, {} landmarks, true scale {:.3}",
        synthetic.keyframes.len(),
        synthetic.landmarks.len(),
        config.scale
    );

    // Feed keyframes one at a time, retrying as the window grows
    let mut imu_params = ImuParameters::default();
    let mut window = InitializationWindow::new(InitializerConfig::default());
    window.set_first_keyframe(Arc::clone(&synthetic.keyframes[0]));
    for (kf, factor) in synthetic.keyframes[1..].iter().zip(&synthetic.factors) {
        window.push_keyframe(Arc::clone(kf), factor.clone())?;
        if window.try_initialize(&mut imu_params, DEFAULT_MAX_ITERATIONS) {
            info!("initialized after {} keyframes", window.len());
            break;
        }
    }

    let Some(summary) = window.summary() else {
        warn!("initialization did not succeed: {:?}", window.last_error());
        bail!("window of {} keyframes could not be initialized", window.len());
    };

    let est = &summary.estimate;
    println!("scale      {:.6} (true {:.6})", est.scale, synthetic.truth.scale);
    println!(
        "gravity    [{:.4}, {:.4}, {:.4}] (true [{:.4}, {:.4}, {:.4}])",
        est.gravity.x,
        est.gravity.y,
        est.gravity.z,
        synthetic.truth.gravity.x,
        synthetic.truth.gravity.y,
        synthetic.truth.gravity.z
    );
    println!(
        "gyro bias  [{:.6}, {:.6}, {:.6}]",
        est.bias.gyro.x, est.bias.gyro.y, est.bias.gyro.z
    );
    println!(
        "accel bias [{:.6}, {:.6}, {:.6}]",
        est.bias.accel.x, est.bias.accel.y, est.bias.accel.z
    );
    for (kf, truth) in window
        .initialized_keyframes()
        .unwrap_or_default()
        .iter()
        .zip(&synthetic.truth.velocities)
    {
        let v = kf.velocity();
        println!(
            "{} v = [{:.4}, {:.4}, {:.4}] (error {:.2e})",
            kf.id,
            v.x,
            v.y,
            v.z,
            (v - truth).norm()
        );
    }
    for warning in &est.warnings {
        println!("warning: {}", warning);
    }
    println!("{} landmarks rescaled", summary.landmarks_rescaled);

    Ok(())
}
