use crate::config::Config;
use nalgebra as na;

/// Running estimate of how far ICP moves a scan away from its prediction,
/// turned into a maximum correspondence distance.
#[derive(Debug, Clone)]
pub struct AdaptiveThreshold {
    // configurable parameters
    min_threshold: f64,
    multiplier: f64,
    min_motion_threshold: f64,
    max_range: f64,

    // running statistic
    model_sse: f64,
    num_samples: usize,
}

impl AdaptiveThreshold {
    pub fn new(
        initial_threshold: f64,
        min_threshold: f64,
        multiplier: f64,
        min_motion_threshold: f64,
        max_range: f64,
    ) -> AdaptiveThreshold {
        // seeded with one sample that reproduces `initial_threshold`
        let initial_sigma = initial_threshold / multiplier;
        AdaptiveThreshold {
            min_threshold,
            multiplier,
            min_motion_threshold,
            max_range,
            model_sse: initial_sigma * initial_sigma,
            num_samples: 0,
        }
    }

    pub fn from_config(config: &Config) -> AdaptiveThreshold {
        AdaptiveThreshold::new(
            config.initial_threshold,
            config.min_threshold,
            config.threshold_multiplier,
            config.min_motion_threshold,
            config.max_range,
        )
    }

    /// Number of corrections folded in so far, not counting the seed.
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Root mean square of the accepted corrections and the seed sample.
    pub fn model_deviation(&self) -> f64 {
        (self.model_sse / (self.num_samples + 1) as f64).sqrt()
    }

    pub fn current_threshold(&self) -> f64 {
        (self.multiplier * self.model_deviation()).max(self.min_threshold)
    }

    /// Translation norm plus the chord swept at `max_range` by the rotation.
    pub fn model_error(&self, current_deviation: &na::Isometry3<f64>) -> f64 {
        let theta = current_deviation.rotation.angle();
        let delta_rot = 2.0 * self.max_range * (theta / 2.0).sin();
        let delta_trans = current_deviation.translation.vector.norm();
        delta_rot + delta_trans
    }

    /// Folds the correction ICP applied on top of the prediction into the
    /// statistic. Corrections at or below `min_motion_threshold` are ignored.
    pub fn update(&mut self, current_deviation: &na::Isometry3<f64>) {
        let model_error = self.model_error(current_deviation);
        if model_error > self.min_motion_threshold {
            self.model_sse += model_error * model_error;
            self.num_samples += 1;
        }
    }
}
