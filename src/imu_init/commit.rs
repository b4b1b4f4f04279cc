//! Writing a finished estimate into the shared map state.

use std::collections::HashSet;
use std::sync::Arc;

use crate::imu::{ImuParameters, SpeedAndBias};
use crate::map::{KeyFrame, LandmarkId};

use super::initializer::InitializationEstimate;

/// Apply `estimate` to the window.
///
/// Each entity is written under its own exclusive lock with a whole-value
/// replacement: keyframe state, keyframe pose translation, every distinct
/// landmark position (exactly once, however many keyframes observe it) and
/// the gravity vector. Returns the number of landmarks rescaled.
pub fn commit(
    estimate: &InitializationEstimate,
    keyframes: &[Arc<KeyFrame>],
    imu_params: &mut ImuParameters,
) -> usize {
    for (kf, velocity) in keyframes.iter().zip(&estimate.velocities) {
        kf.set_state(SpeedAndBias::new(*velocity, estimate.bias));
        kf.rescale_translation(estimate.scale);
    }

    let mut rescaled: HashSet<LandmarkId> = HashSet::new();
    for kf in keyframes {
        for landmark in kf.landmarks() {
            if rescaled.insert(landmark.id) {
                landmark.rescale(estimate.scale);
            }
        }
    }

    imu_params.gravity = estimate.gravity;
    rescaled.len()
}
