//! Accumulates keyframes until the window can be initialized.
//!
//! The front end seeds the window with its first keyframe, then pushes every
//! new keyframe together with the factor linking it to the previous one and
//! retries initialization as the window grows. Once a run commits, the
//! window stays initialized and further attempts are no-ops.

use std::sync::Arc;

use tracing::debug;

use crate::imu::{ImuInitState, ImuParameters, InertialFactor};
use crate::map::KeyFrame;

use super::config::InitializerConfig;
use super::error::InitError;
use super::initializer::{InitializationSummary, VisualInertialInitializer};

pub struct InitializationWindow {
    keyframes: Vec<Arc<KeyFrame>>,
    factors: Vec<InertialFactor>,
    state: ImuInitState,
    initializer: VisualInertialInitializer,
    summary: Option<InitializationSummary>,
    last_error: Option<InitError>,
}

impl InitializationWindow {
    pub fn new(config: InitializerConfig) -> Self {
        Self {
            keyframes: Vec::new(),
            factors: Vec::new(),
            state: ImuInitState::NotInitialized,
            initializer: VisualInertialInitializer::new(config),
            summary: None,
            last_error: None,
        }
    }

    /// Start a new window at `keyframe`, discarding anything accumulated.
    pub fn set_first_keyframe(&mut self, keyframe: Arc<KeyFrame>) {
        self.keyframes.clear();
        self.factors.clear();
        self.keyframes.push(keyframe);
        self.state = ImuInitState::NotInitialized;
        self.summary = None;
        self.last_error = None;
    }

    /// Append `keyframe` and the factor linking the previous keyframe to it.
    pub fn push_keyframe(&mut self, keyframe: Arc<KeyFrame>, factor: InertialFactor) -> Result<(), InitError> {
        let last = self.keyframes.last().ok_or(InitError::EmptyWindow)?;
        if keyframe.timestamp_ns() <= last.timestamp_ns() {
            return Err(InitError::NonMonotonicTimestamps {
                index: self.keyframes.len(),
            });
        }

        self.keyframes.push(keyframe);
        self.factors.push(factor);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    pub fn state(&self) -> ImuInitState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state == ImuInitState::Initialized
    }

    /// Attempt initialization over the current window.
    ///
    /// On failure nothing is written and the caller may push more keyframes
    /// and retry.
    pub fn try_initialize(&mut self, imu_params: &mut ImuParameters, max_iterations: usize) -> bool {
        if self.is_initialized() {
            return true;
        }

        match self
            .initializer
            .initialize(&self.keyframes, &self.factors, imu_params, max_iterations)
        {
            Ok(summary) => {
                self.state = ImuInitState::Initialized;
                self.summary = Some(summary);
                self.last_error = None;
                true
            }
            Err(e) => {
                debug!("IMU init over {} keyframes deferred: {}", self.keyframes.len(), e);
                self.state = ImuInitState::Initializing;
                self.last_error = Some(e);
                false
            }
        }
    }

    /// The initialized keyframes, once a run has committed.
    pub fn initialized_keyframes(&self) -> Option<&[Arc<KeyFrame>]> {
        self.is_initialized().then_some(self.keyframes.as_slice())
    }

    pub fn summary(&self) -> Option<&InitializationSummary> {
        self.summary.as_ref()
    }

    pub fn last_error(&self) -> Option<&InitError> {
        self.last_error.as_ref()
    }
}

impl Default for InitializationWindow {
    fn default() -> Self {
        Self::new(InitializerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imu_init::DEFAULT_MAX_ITERATIONS;
    use crate::simulation::{SimulationConfig, SyntheticWindow};
    use approx::assert_relative_eq;

    fn fill(window: &mut InitializationWindow, synthetic: &SyntheticWindow, count: usize) {
        window.set_first_keyframe(Arc::clone(&synthetic.keyframes[0]));
        for k in 1..count {
            window
                .push_keyframe(Arc::clone(&synthetic.keyframes[k]), synthetic.factors[k - 1].clone())
                .unwrap();
        }
    }

    #[test]
    fn test_push_requires_first_keyframe() {
        let synthetic = SyntheticWindow::falling_body();
        let mut window = InitializationWindow::default();

        assert_eq!(
            window.push_keyframe(Arc::clone(&synthetic.keyframes[1]), synthetic.factors[0].clone()),
            Err(InitError::EmptyWindow)
        );
        assert!(window.is_empty());
    }

    #[test]
    fn test_push_rejects_out_of_order_keyframe() {
        let synthetic = SyntheticWindow::falling_body();
        let mut window = InitializationWindow::default();
        fill(&mut window, &synthetic, 2);

        let result = window.push_keyframe(Arc::clone(&synthetic.keyframes[0]), synthetic.factors[0].clone());

        assert_eq!(result, Err(InitError::NonMonotonicTimestamps { index: 2 }));
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn test_grows_until_initialized() {
        let synthetic = SyntheticWindow::generic(&SimulationConfig::default());
        let mut window = InitializationWindow::default();
        let mut params = ImuParameters::default();

        fill(&mut window, &synthetic, 2);
        assert!(!window.try_initialize(&mut params, DEFAULT_MAX_ITERATIONS));
        assert_eq!(window.state(), ImuInitState::Initializing);
        assert!(matches!(
            window.last_error(),
            Some(InitError::InsufficientFrames { found: 2, .. })
        ));
        assert!(window.initialized_keyframes().is_none());

        for k in 2..synthetic.keyframes.len() {
            window
                .push_keyframe(Arc::clone(&synthetic.keyframes[k]), synthetic.factors[k - 1].clone())
                .unwrap();
        }
        assert!(window.try_initialize(&mut params, DEFAULT_MAX_ITERATIONS));
        assert!(window.is_initialized());
        assert_eq!(window.initialized_keyframes().map(<[_]>::len), Some(synthetic.keyframes.len()));

        let scale = window.summary().unwrap().estimate.scale;
        assert_relative_eq!(scale, synthetic.truth.scale, epsilon = 1e-3);

        // A second attempt must not rescale again
        let center = synthetic.keyframes[1].camera_center();
        assert!(window.try_initialize(&mut params, DEFAULT_MAX_ITERATIONS));
        assert_eq!(synthetic.keyframes[1].camera_center(), center);
    }

    #[test]
    fn test_set_first_keyframe_resets() {
        let synthetic = SyntheticWindow::falling_body();
        let mut window = InitializationWindow::default();
        let mut params = ImuParameters::default();
        fill(&mut window, &synthetic, 3);
        assert!(window.try_initialize(&mut params, DEFAULT_MAX_ITERATIONS));

        window.set_first_keyframe(Arc::clone(&synthetic.keyframes[2]));

        assert_eq!(window.len(), 1);
        assert_eq!(window.state(), ImuInitState::NotInitialized);
        assert!(window.summary().is_none());
    }
}
